use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use sansio::Protocol;
use shared::error::{Error, Result};
use socks::{Digest, Socks5Proxy};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::candidate::Candidate;
use crate::connector::{ConnectRole, Connector};
use crate::element::{JingleTransportInfo, TransportInfo};
use crate::manager::builder::create_transport_info;
use crate::reconciler::{BytestreamSession, ReconcileEvent, ReconcileInput, Reconciler};
use crate::selection::{SelectionOutcome, select_from_peer_candidates};
use crate::session::SessionContext;
use crate::transport::S5bTransport;
use crate::xmpp::XmppConnection;

pub(crate) const COMMAND_CHANNEL_SIZE: usize = 32;

/// Live sessions by Jingle session id.
pub(crate) type SessionMap<S> = Arc<Mutex<HashMap<String, mpsc::Sender<Command<S>>>>>;

pub(crate) type Completion<S> = oneshot::Sender<Result<BytestreamSession<S>>>;

pub(crate) enum Command<S> {
    Start {
        their_candidates: Vec<Candidate>,
        their_digest: Digest,
        done: Completion<S>,
    },
    Inbound {
        info: JingleTransportInfo,
        reply: oneshot::Sender<Result<()>>,
    },
    Selected(SelectionOutcome<S>),
    OwnCandidateConnected(Result<S>),
    ActivationAcknowledged(Result<()>),
    Cancel,
}

/// Everything a session driver talks to besides its own channel.
pub(crate) struct Collaborators<S> {
    pub(crate) connector: Arc<dyn Connector<Socket = S>>,
    pub(crate) xmpp: Arc<dyn XmppConnection>,
    pub(crate) proxy: Arc<Socks5Proxy>,
    pub(crate) sessions: SessionMap<S>,
    pub(crate) connect_timeout: Duration,
    pub(crate) establish_timeout: Duration,
}

impl<S> Clone for Collaborators<S> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            xmpp: Arc::clone(&self.xmpp),
            proxy: Arc::clone(&self.proxy),
            sessions: Arc::clone(&self.sessions),
            connect_timeout: self.connect_timeout,
            establish_timeout: self.establish_timeout,
        }
    }
}

/// Owns the [`Reconciler`] of one session and performs its I/O.
///
/// Races, connections and acknowledgement waits run in spawned tasks and report back
/// through the command channel, so the reconciler is only ever touched by this task.
pub(crate) struct SessionDriver<S> {
    ctx: SessionContext,
    stream_id: String,
    our_digest: Digest,
    reconciler: Reconciler<S>,
    collaborators: Collaborators<S>,

    commands: mpsc::WeakSender<Command<S>>,
    outbound: mpsc::UnboundedSender<TransportInfo>,
    writer: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,

    started: bool,
    done: Option<Completion<S>>,
    outcome: Option<Result<BytestreamSession<S>>>,
    digest_released: bool,
}

impl<S: Send + 'static> SessionDriver<S> {
    /// Spawns the driver of a new session and returns its command channel.
    pub(crate) fn spawn(
        ctx: SessionContext,
        transport: &S5bTransport,
        collaborators: Collaborators<S>,
    ) -> mpsc::Sender<Command<S>> {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(
            ctx.clone(),
            transport.stream_id().to_owned(),
            Arc::clone(&collaborators.xmpp),
            outbound_rx,
            tx.downgrade(),
        ));

        let reconciler = Reconciler::new(
            ctx.is_initiator(),
            ctx.remote.clone(),
            transport.our_candidates().to_vec(),
            collaborators.establish_timeout,
        );
        let driver = SessionDriver {
            stream_id: transport.stream_id().to_owned(),
            our_digest: transport.our_digest().clone(),
            ctx,
            reconciler,
            collaborators,

            commands: tx.downgrade(),
            outbound,
            writer,
            tasks: vec![],

            started: false,
            done: None,
            outcome: None,
            digest_released: false,
        };
        tokio::spawn(driver.run(rx));

        tx
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command<S>>) {
        debug!(
            "session {} stream {}: driver started",
            self.ctx.session_id, self.stream_id
        );
        loop {
            let deadline = self.reconciler.poll_timeout();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Cancel) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = sleep_until(deadline) => {
                    if let Err(err) = self.reconciler.handle_timeout(Instant::now()) {
                        trace!("timeout ignored: {err}");
                    }
                }
            }
            self.flush();
        }
        self.shutdown();
    }

    fn handle_command(&mut self, command: Command<S>) {
        let result = match command {
            Command::Start {
                their_candidates,
                their_digest,
                done,
            } => {
                self.start(their_candidates, their_digest, done);
                Ok(())
            }
            Command::Inbound { info, reply } => {
                let result = self.handle_inbound(info);
                if let Err(err) = &result {
                    warn!("session {}: rejecting transport-info: {err}", self.ctx.session_id);
                }
                if reply.send(result).is_err() {
                    trace!("inbound transport-info answered after its caller left");
                }
                Ok(())
            }
            Command::Selected(outcome) => self
                .reconciler
                .handle_event(ReconcileInput::LocalSelection(outcome)),
            Command::OwnCandidateConnected(result) => self
                .reconciler
                .handle_event(ReconcileInput::OwnCandidateConnected(result)),
            Command::ActivationAcknowledged(result) => self
                .reconciler
                .handle_event(ReconcileInput::ActivationAcknowledged(result)),
            Command::Cancel => Ok(()),
        };
        if let Err(err) = result {
            debug!("session {}: late result dropped: {err}", self.ctx.session_id);
        }
    }

    fn start(&mut self, their_candidates: Vec<Candidate>, their_digest: Digest, done: Completion<S>) {
        if self.started {
            let _ = done.send(Err(Error::ErrAlreadyEstablishing));
            return;
        }
        self.started = true;

        if let Some(outcome) = self.outcome.take() {
            let _ = done.send(outcome);
            return;
        }
        self.done = Some(done);

        if let Err(err) = self
            .reconciler
            .handle_event(ReconcileInput::Start(Instant::now()))
        {
            self.complete(Err(err));
            return;
        }

        info!(
            "session {}: racing {} peer candidates",
            self.ctx.session_id,
            their_candidates.len()
        );
        let connector = Arc::clone(&self.collaborators.connector);
        let timeout = self.collaborators.connect_timeout;
        self.spawn_reporting(async move {
            let outcome = select_from_peer_candidates(
                &their_candidates,
                &their_digest,
                connector.as_ref(),
                timeout,
            )
            .await;
            Command::Selected(outcome)
        });
    }

    fn handle_inbound(&mut self, info: JingleTransportInfo) -> Result<()> {
        if info.stream_id != self.stream_id {
            return Err(Error::ErrUnknownSession);
        }
        self.reconciler.handle_read(info.info)
    }

    fn flush(&mut self) {
        while let Some(info) = self.reconciler.poll_write() {
            if self.outbound.send(info).is_err() {
                warn!("session {}: writer stopped", self.ctx.session_id);
            }
        }
        while let Some(event) = self.reconciler.poll_event() {
            match event {
                ReconcileEvent::ConnectOwnCandidate(candidate) => {
                    self.connect_own_candidate(candidate)
                }
                ReconcileEvent::Ready(session) => self.complete(Ok(session)),
                ReconcileEvent::Failed(err) => self.complete(Err(err)),
            }
        }
    }

    fn connect_own_candidate(&mut self, candidate: Candidate) {
        let connector = Arc::clone(&self.collaborators.connector);
        let digest = self.our_digest.clone();
        let role = ConnectRole::OwnCandidate {
            stream_id: self.stream_id.clone(),
            target: self.ctx.remote.clone(),
        };
        let timeout = self.collaborators.connect_timeout;
        self.spawn_reporting(async move {
            let result = connector.connect(&candidate, &digest, &role, timeout).await;
            Command::OwnCandidateConnected(result)
        });
    }

    fn complete(&mut self, outcome: Result<BytestreamSession<S>>) {
        self.release_digest();
        match self.done.take() {
            Some(done) => {
                if done.send(outcome).is_err() {
                    debug!("session {}: establish() no longer waiting", self.ctx.session_id);
                }
            }
            None => self.outcome = Some(outcome),
        }
    }

    /// Runs `task` and feeds its result back to this driver.
    fn spawn_reporting<F>(&mut self, task: F)
    where
        F: Future<Output = Command<S>> + Send + 'static,
    {
        let commands = self.commands.clone();
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(tokio::spawn(async move {
            let command = task.await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(command).await;
            }
        }));
    }

    fn release_digest(&mut self) {
        if self.digest_released {
            return;
        }
        self.digest_released = true;
        if let Err(err) = self.collaborators.proxy.unregister_digest(&self.our_digest) {
            warn!("failed to unregister digest {}: {err}", self.our_digest);
        }
    }

    fn shutdown(&mut self) {
        debug!(
            "session {} stream {}: driver stopped",
            self.ctx.session_id, self.stream_id
        );
        let _ = self.reconciler.close();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.writer.abort();
        self.release_digest();

        if let Some(done) = self.done.take() {
            let _ = done.send(Err(Error::ErrSessionCancelled));
        }

        if let Ok(mut sessions) = self.collaborators.sessions.lock() {
            let ours = match (sessions.get(&self.ctx.session_id), self.commands.upgrade()) {
                (Some(registered), Some(me)) => registered.same_channel(&me),
                _ => false,
            };
            if ours {
                sessions.remove(&self.ctx.session_id);
            }
        }
    }
}

/// Sends queued transport-info one after the other.
///
/// The acknowledgement of candidate-activated is reported back to the driver; other send
/// failures are logged only.
async fn write_loop<S: Send + 'static>(
    ctx: SessionContext,
    stream_id: String,
    xmpp: Arc<dyn XmppConnection>,
    mut outbound: mpsc::UnboundedReceiver<TransportInfo>,
    commands: mpsc::WeakSender<Command<S>>,
) {
    while let Some(info) = outbound.recv().await {
        let name = info.name();
        let activation = matches!(info, TransportInfo::CandidateActivated { .. });
        let requires_ack = info.requires_ack();
        let stanza = create_transport_info(&ctx, &stream_id, info);

        trace!("session {}: sending {name}", ctx.session_id);
        let result = if requires_ack {
            xmpp.send_and_await(stanza).await
        } else {
            xmpp.send(stanza).await
        };

        if activation {
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::ActivationAcknowledged(result)).await;
            }
        } else if let Err(err) = result {
            warn!("session {}: sending {name} failed: {err}", ctx.session_id);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
