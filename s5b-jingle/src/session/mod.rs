//! One SOCKS5 bytestream negotiation, from offer to connected socket.

mod context;
pub(crate) mod driver;

pub use context::SessionContext;

use log::debug;
use shared::error::{Error, Result};
use tokio::sync::{mpsc, oneshot};

use crate::element::TransportElement;
use crate::reconciler::BytestreamSession;
use crate::transport::S5bTransport;
use driver::{Command, SessionMap};

/// Handle to a negotiation created by [`S5bTransportManager`](crate::S5bTransportManager).
///
/// The negotiation itself runs in a background task. Dropping the handle cancels it.
pub struct NegotiationSession<S> {
    ctx: SessionContext,
    transport: S5bTransport,
    commands: mpsc::Sender<Command<S>>,
    sessions: SessionMap<S>,
    started: bool,
}

impl<S> NegotiationSession<S> {
    pub(crate) fn new(
        ctx: SessionContext,
        transport: S5bTransport,
        commands: mpsc::Sender<Command<S>>,
        sessions: SessionMap<S>,
    ) -> Self {
        Self {
            ctx,
            transport,
            commands,
            sessions,
            started: false,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn transport(&self) -> &S5bTransport {
        &self.transport
    }

    /// Our offer, to be put into session-initiate or session-accept.
    pub fn transport_element(&self) -> TransportElement {
        self.transport.to_element()
    }

    /// Records the responder's offer carried by session-accept.
    pub fn handle_session_accept(&mut self, accept: &TransportElement) -> Result<()> {
        if self.started {
            return Err(Error::ErrOutOfOrder);
        }
        self.transport.handle_session_accept(&self.ctx, accept)
    }

    /// Races the peer's candidates and completes once a bytestream is ready or the
    /// negotiation failed.
    ///
    /// The initiator calls this after [`handle_session_accept`](Self::handle_session_accept),
    /// the responder right after sending session-accept.
    pub async fn establish(&mut self) -> Result<BytestreamSession<S>> {
        if self.started {
            return Err(Error::ErrAlreadyEstablishing);
        }
        let their_digest = self
            .transport
            .their_digest()
            .cloned()
            .ok_or(Error::ErrMissingPeerOffer)?;
        self.started = true;

        let (done, completion) = oneshot::channel();
        self.commands
            .send(Command::Start {
                their_candidates: self.transport.their_candidates().to_vec(),
                their_digest,
                done,
            })
            .await
            .map_err(|_| Error::ErrSessionCancelled)?;

        completion.await.map_err(|_| Error::ErrSessionCancelled)?
    }

    /// Abandons the negotiation. In-flight connection attempts are aborted and our digest
    /// is released from the local proxy.
    pub async fn cancel(&self) {
        self.deregister();
        if self.commands.send(Command::Cancel).await.is_err() {
            debug!("session {} already stopped", self.ctx.session_id);
        }
    }

    /// Stops dispatching inbound transport-info to this negotiation.
    fn deregister(&self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            let ours = sessions
                .get(&self.ctx.session_id)
                .is_some_and(|registered| registered.same_channel(&self.commands));
            if ours {
                sessions.remove(&self.ctx.session_id);
            }
        }
    }
}

impl<S> Drop for NegotiationSession<S> {
    fn drop(&mut self) {
        self.deregister();
        // the driver also stops once every sender is gone
        if self.commands.try_send(Command::Cancel).is_err() {
            debug!(
                "session {}: driver gone or busy on drop",
                self.ctx.session_id
            );
        }
    }
}
