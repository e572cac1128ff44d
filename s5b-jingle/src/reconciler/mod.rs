//! Sans-I/O reconciliation of both candidate selections.
//!
//! [`Reconciler`] owns "our selection" (the peer candidate our race connected to) and
//! "their selection" (the candidate of ours the peer reported with candidate-used) and
//! turns them into exactly one outcome: a ready [`BytestreamSession`] or a failure.
//!
//! It implements [`sansio::Protocol`] and performs no I/O. The driver:
//!
//! 1. feeds inbound transport-info to `handle_read()`; an `Err` is answered to the peer
//!    as a stanza error and leaves the state untouched
//! 2. feeds local progress ([`ReconcileInput`]) to `handle_event()`
//! 3. sends every [`TransportInfo`] returned by `poll_write()` to the peer, in order
//! 4. acts on every [`ReconcileEvent`] returned by `poll_event()`
//! 5. calls `handle_timeout()` when `poll_timeout()` expires
//!
//! # Lifecycle
//!
//! ```text
//! AwaitingSelections --both failed----------------------------------> Failed
//!        |
//!        +--our selection, not a proxy----------------------------> Ready
//!        +--our selection, proxy---> AwaitingPeerActivation --------> Ready
//!        +--their selection-------> ConnectingOwnCandidate
//!                                      +--not a proxy---------------> Ready
//!                                      +--proxy--> AwaitingActivationAck --> Ready
//!                                      +--error---------------------> Failed
//! ```
//!
//! Ready and Failed are emitted at most once. After `close()` nothing is emitted.
//!
//! # Example
//!
//! ```rust
//! use s5b_jingle::{Candidate, CandidateType, ReconcileEvent, ReconcileInput, Reconciler,
//!     SelectionOutcome, TransportInfo};
//! use sansio::Protocol;
//! use std::time::{Duration, Instant};
//!
//! let peer = "juliet@capulet.lit/balcony".parse().unwrap();
//! let theirs = Candidate::new("c1", "10.0.0.2", 1080, peer, 8_257_636, CandidateType::Direct);
//!
//! let mut reconciler = Reconciler::<&str>::new(
//!     true,
//!     "juliet@capulet.lit/balcony".parse().unwrap(),
//!     vec![],
//!     Duration::from_secs(30),
//! );
//! reconciler.handle_event(ReconcileInput::Start(Instant::now())).unwrap();
//! reconciler
//!     .handle_event(ReconcileInput::LocalSelection(SelectionOutcome::Candidate {
//!         candidate: theirs,
//!         socket: "socket",
//!     }))
//!     .unwrap();
//! assert_eq!(
//!     reconciler.poll_write(),
//!     Some(TransportInfo::CandidateUsed { cid: "c1".to_owned() })
//! );
//!
//! // the peer could not reach any of our candidates
//! reconciler.handle_read(TransportInfo::CandidateError).unwrap();
//! assert!(matches!(reconciler.poll_event(), Some(ReconcileEvent::Ready(_))));
//! ```


use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use shared::Jid;
use shared::error::{Error, Result};

use crate::candidate::Candidate;
use crate::element::TransportInfo;
use crate::selection::{Nomination, SelectionOutcome, nominate};

/// A connected bytestream handed to the application.
pub struct BytestreamSession<S> {
    socket: S,
    direct: bool,
    candidate: Candidate,
}

impl<S> fmt::Debug for BytestreamSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytestreamSession")
            .field("direct", &self.direct)
            .field("candidate", &self.candidate)
            .finish()
    }
}

impl<S> BytestreamSession<S> {
    pub fn new(socket: S, direct: bool, candidate: Candidate) -> Self {
        Self {
            socket,
            direct,
            candidate,
        }
    }

    /// Whether the data flows without a third-party proxy in between.
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// The nominated candidate carrying the stream.
    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn into_socket(self) -> S {
        self.socket
    }
}

/// Local progress fed to [`Reconciler::handle_event`].
#[derive(Debug)]
pub enum ReconcileInput<S> {
    /// Negotiation started; arms the establishment deadline.
    Start(Instant),
    /// Result of our candidate race.
    LocalSelection(SelectionOutcome<S>),
    /// Result of a [`ReconcileEvent::ConnectOwnCandidate`] request.
    OwnCandidateConnected(Result<S>),
    /// The peer's answer to our candidate-activated.
    ActivationAcknowledged(Result<()>),
}

/// Work requested from the driver, and the final outcome.
#[derive(Debug)]
pub enum ReconcileEvent<S> {
    /// Connect to this candidate of ours with our digest, then report
    /// [`ReconcileInput::OwnCandidateConnected`].
    ConnectOwnCandidate(Candidate),
    Ready(BytestreamSession<S>),
    Failed(Error),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReconcileState {
    AwaitingSelections,
    ConnectingOwnCandidate,
    AwaitingActivationAck,
    AwaitingPeerActivation,
    Ready,
    Failed,
    Closed,
}

impl ReconcileState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReconcileState::Ready | ReconcileState::Failed | ReconcileState::Closed
        )
    }
}

pub struct Reconciler<S> {
    is_initiator: bool,
    remote: Jid,
    our_candidates: Vec<Candidate>,
    establish_timeout: Duration,

    ours: SelectionOutcome<S>,
    local_selection_done: bool,
    theirs: SelectionOutcome<()>,
    state: ReconcileState,

    nominated: Option<Candidate>,
    pending_socket: Option<S>,
    early_activation: Option<String>,
    deadline: Option<Instant>,

    write_outs: VecDeque<TransportInfo>,
    event_outs: VecDeque<ReconcileEvent<S>>,
}

impl<S> Reconciler<S> {
    pub fn new(
        is_initiator: bool,
        remote: Jid,
        our_candidates: Vec<Candidate>,
        establish_timeout: Duration,
    ) -> Self {
        Self {
            is_initiator,
            remote,
            our_candidates,
            establish_timeout,

            ours: SelectionOutcome::NotYetDecided,
            local_selection_done: false,
            theirs: SelectionOutcome::NotYetDecided,
            state: ReconcileState::AwaitingSelections,

            nominated: None,
            pending_socket: None,
            early_activation: None,
            deadline: None,

            write_outs: VecDeque::new(),
            event_outs: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// The peer's selection among our candidates, as far as it is known.
    pub fn their_selection(&self) -> &SelectionOutcome<()> {
        &self.theirs
    }

    pub fn nominated(&self) -> Option<&Candidate> {
        self.nominated.as_ref()
    }

    /// Decides the nominated candidate once both selections are known and moves on.
    ///
    /// Safe to call any number of times: only the first call after both selections are
    /// decided has an effect.
    pub fn reconcile(&mut self) {
        if self.state != ReconcileState::AwaitingSelections {
            return;
        }
        let Some(nomination) = nominate(&self.ours, &self.theirs, self.is_initiator) else {
            trace!("selections not complete yet");
            return;
        };

        match nomination {
            Nomination::Neither => {
                info!("no candidate succeeded on either side");
                self.fail(Error::ErrNoCandidateSucceeded);
            }
            Nomination::Theirs => {
                let Some(candidate) = self.theirs.candidate().cloned() else {
                    return;
                };
                info!("their choice {candidate} nominated, connecting to it");
                // our race socket is not needed anymore
                self.ours = SelectionOutcome::NotYetDecided;
                self.nominated = Some(candidate.clone());
                self.state = ReconcileState::ConnectingOwnCandidate;
                self.event_outs
                    .push_back(ReconcileEvent::ConnectOwnCandidate(candidate));
            }
            Nomination::Ours => {
                let SelectionOutcome::Candidate { candidate, socket } =
                    std::mem::take(&mut self.ours)
                else {
                    return;
                };
                self.nominated = Some(candidate.clone());
                if candidate.is_proxy() {
                    info!("our choice {candidate} nominated, waiting for candidate-activated");
                    self.pending_socket = Some(socket);
                    self.state = ReconcileState::AwaitingPeerActivation;
                    if let Some(cid) = self.early_activation.take() {
                        if let Err(err) = self.peer_activated(cid) {
                            warn!("ignoring early candidate-activated: {err}");
                        }
                    }
                } else {
                    info!("our choice {candidate} nominated, direct connection");
                    self.ready(socket, true, candidate);
                }
            }
        }
    }

    fn peer_activated(&mut self, cid: String) -> Result<()> {
        match self.state {
            ReconcileState::AwaitingPeerActivation => {
                let Some(candidate) = self.nominated.clone() else {
                    return Err(Error::ErrOutOfOrder);
                };
                if candidate.id() != cid {
                    return Err(Error::ErrUnknownCandidate(cid));
                }
                let Some(socket) = self.pending_socket.take() else {
                    return Err(Error::ErrOutOfOrder);
                };
                let direct = candidate.jid().is_bare_equal(&self.remote);
                self.ready(socket, direct, candidate);
                Ok(())
            }
            ReconcileState::AwaitingSelections if self.early_activation.is_none() => {
                debug!("candidate-activated {cid} before nomination, keeping it");
                self.early_activation = Some(cid);
                Ok(())
            }
            _ => Err(Error::ErrOutOfOrder),
        }
    }

    fn ready(&mut self, socket: S, direct: bool, candidate: Candidate) {
        if self.state.is_terminal() {
            return;
        }
        info!("bytestream ready over {candidate} (direct: {direct})");
        self.state = ReconcileState::Ready;
        self.deadline = None;
        self.event_outs.push_back(ReconcileEvent::Ready(BytestreamSession::new(
            socket, direct, candidate,
        )));
    }

    fn fail(&mut self, err: Error) {
        if self.state.is_terminal() {
            return;
        }
        warn!("transport failed: {err}");
        self.state = ReconcileState::Failed;
        self.deadline = None;
        self.pending_socket = None;
        self.event_outs.push_back(ReconcileEvent::Failed(err));
    }

    fn handle_local_selection(&mut self, outcome: SelectionOutcome<S>) -> Result<()> {
        if self.local_selection_done {
            return Err(Error::ErrOutOfOrder);
        }
        match &outcome {
            SelectionOutcome::NotYetDecided => return Ok(()),
            SelectionOutcome::Candidate { candidate, .. } => {
                self.write_outs.push_back(TransportInfo::CandidateUsed {
                    cid: candidate.id().to_owned(),
                });
            }
            SelectionOutcome::Failed => self.write_outs.push_back(TransportInfo::CandidateError),
        }
        self.local_selection_done = true;
        self.ours = outcome;
        self.reconcile();
        Ok(())
    }

    fn handle_own_candidate_connected(&mut self, result: Result<S>) -> Result<()> {
        if self.state != ReconcileState::ConnectingOwnCandidate {
            return Err(Error::ErrOutOfOrder);
        }
        let Some(candidate) = self.nominated.clone() else {
            return Err(Error::ErrOutOfOrder);
        };

        match result {
            Err(err) => {
                warn!("could not connect to our candidate {candidate}: {err}");
                if candidate.is_proxy() {
                    self.write_outs.push_back(TransportInfo::ProxyError);
                }
                let err = match err {
                    Error::ErrProxyActivation(reason) => Error::ErrProxyActivation(reason),
                    other => Error::ErrCandidateConnect(other.to_string()),
                };
                self.fail(err);
            }
            Ok(socket) if candidate.is_proxy() => {
                debug!("proxy {candidate} activated, sending candidate-activated");
                self.pending_socket = Some(socket);
                self.state = ReconcileState::AwaitingActivationAck;
                self.write_outs.push_back(TransportInfo::CandidateActivated {
                    cid: candidate.id().to_owned(),
                });
            }
            Ok(socket) => self.ready(socket, true, candidate),
        }
        Ok(())
    }

    fn handle_activation_acknowledged(&mut self, result: Result<()>) -> Result<()> {
        if self.state != ReconcileState::AwaitingActivationAck {
            return Err(Error::ErrOutOfOrder);
        }

        match (result, self.pending_socket.take(), self.nominated.clone()) {
            (Ok(()), Some(socket), Some(candidate)) => self.ready(socket, false, candidate),
            (Ok(()), _, _) => return Err(Error::ErrOutOfOrder),
            (Err(err), _, _) => self.fail(Error::ErrProxyActivation(err.to_string())),
        }
        Ok(())
    }
}

impl<S> sansio::Protocol<TransportInfo, (), ReconcileInput<S>> for Reconciler<S> {
    type Rout = ();
    type Wout = TransportInfo;
    type Eout = ReconcileEvent<S>;
    type Error = Error;
    type Time = Instant;

    /// Processes a transport-info received from the peer.
    ///
    /// # Errors
    ///
    /// - [`Error::ErrOutOfOrder`]: a second candidate-used or candidate-error, or a
    ///   candidate-activated the state does not expect. The first selection is kept.
    /// - [`Error::ErrUnknownCandidate`]: the id names none of our candidates.
    /// - [`Error::ErrConnectionClosed`]: the reconciler was closed.
    fn handle_read(&mut self, msg: TransportInfo) -> Result<()> {
        if self.state == ReconcileState::Closed {
            return Err(Error::ErrConnectionClosed);
        }
        trace!("received {}", msg.name());

        match msg {
            TransportInfo::CandidateUsed { cid } => {
                if self.theirs.is_decided() {
                    warn!("peer sent candidate-used {cid} after selecting already");
                    return Err(Error::ErrOutOfOrder);
                }
                let candidate = self
                    .our_candidates
                    .iter()
                    .find(|c| c.id() == cid)
                    .cloned()
                    .ok_or(Error::ErrUnknownCandidate(cid))?;
                debug!("peer selected our candidate {candidate}");
                self.theirs = SelectionOutcome::Candidate {
                    candidate,
                    socket: (),
                };
                self.reconcile();
                Ok(())
            }
            TransportInfo::CandidateError => {
                if self.theirs.is_decided() {
                    warn!("peer sent candidate-error after selecting already");
                    return Err(Error::ErrOutOfOrder);
                }
                debug!("peer could not reach any of our candidates");
                self.theirs = SelectionOutcome::Failed;
                self.reconcile();
                Ok(())
            }
            TransportInfo::CandidateActivated { cid } => self.peer_activated(cid),
            TransportInfo::ProxyError => {
                self.fail(Error::ErrPeerProxyError);
                Ok(())
            }
        }
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    /// Transport-info to send to the peer, in order.
    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_outs.pop_front()
    }

    fn handle_event(&mut self, evt: ReconcileInput<S>) -> Result<()> {
        if self.state == ReconcileState::Closed {
            return Err(Error::ErrConnectionClosed);
        }

        match evt {
            ReconcileInput::Start(now) => {
                if self.deadline.is_none() && !self.state.is_terminal() {
                    self.deadline = Some(now + self.establish_timeout);
                }
                Ok(())
            }
            ReconcileInput::LocalSelection(outcome) => self.handle_local_selection(outcome),
            ReconcileInput::OwnCandidateConnected(result) => {
                self.handle_own_candidate_connected(result)
            }
            ReconcileInput::ActivationAcknowledged(result) => {
                self.handle_activation_acknowledged(result)
            }
        }
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.event_outs.pop_front()
    }

    /// Fails the negotiation with [`Error::ErrTimeout`] once the deadline passed.
    fn handle_timeout(&mut self, now: Self::Time) -> Result<()> {
        if self.state == ReconcileState::Closed {
            return Err(Error::ErrConnectionClosed);
        }
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                self.deadline = None;
                self.fail(Error::ErrTimeout);
            }
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        self.deadline
    }

    /// Abandons the negotiation. Sockets held for a pending activation are dropped.
    fn close(&mut self) -> Result<()> {
        self.state = ReconcileState::Closed;
        self.ours = SelectionOutcome::NotYetDecided;
        self.pending_socket = None;
        self.deadline = None;
        self.write_outs.clear();
        self.event_outs.clear();
        Ok(())
    }
}
