//! Connecting to a single candidate.
//!
//! There are two reasons to dial a candidate. During the race we try the peer's candidates
//! with the peer's digest ([`ConnectRole::PeerCandidate`]). When the peer's choice of one of
//! our candidates wins the nomination we complete that choice with our own digest
//! ([`ConnectRole::OwnCandidate`]): a candidate served by our local proxy yields the socket
//! the peer already opened, a remote proxy is dialed and then activated.

#[cfg(test)]
mod connector_test;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use shared::Jid;
use shared::error::{Error, Result};
use socks::{Digest, Socks5Proxy, client};
use tokio::net::TcpStream;

use crate::candidate::Candidate;
use crate::element::ProxyActivation;
use crate::xmpp::XmppConnection;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectRole {
    /// Dialing a candidate the peer offered, using the peer's digest.
    PeerCandidate,
    /// Dialing our own candidate so the peer's choice completes, using our digest.
    OwnCandidate {
        /// Stream id to activate on a remote proxy.
        stream_id: String,
        /// The peer, i.e. the activation target.
        target: Jid,
    },
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Socket: Send + 'static;

    /// Connects to `candidate`, bounded by `timeout` as a whole.
    async fn connect(
        &self,
        candidate: &Candidate,
        digest: &Digest,
        role: &ConnectRole,
        timeout: Duration,
    ) -> Result<Self::Socket>;
}

/// Connects over SOCKS5, using the local proxy and the XMPP connection for own candidates.
pub struct Socks5Connector {
    proxy: Arc<Socks5Proxy>,
    xmpp: Arc<dyn XmppConnection>,
}

impl Socks5Connector {
    pub fn new(proxy: Arc<Socks5Proxy>, xmpp: Arc<dyn XmppConnection>) -> Self {
        Self { proxy, xmpp }
    }

    async fn connect_own(
        &self,
        candidate: &Candidate,
        digest: &Digest,
        stream_id: &str,
        target: &Jid,
        timeout: Duration,
    ) -> Result<TcpStream> {
        let local = self.xmpp.local_jid();
        if candidate.jid() == &local {
            trace!("collecting socket of local proxy for {digest}");
            return self.proxy.accepted_socket_for(digest, timeout).await;
        }

        let activation = ProxyActivation {
            from: local,
            proxy: candidate.jid().clone(),
            sid: stream_id.to_owned(),
            target: target.clone(),
        };
        let dial_and_activate = async {
            let socket =
                client::connect(candidate.host(), candidate.port(), digest, timeout).await?;
            self.xmpp
                .activate_proxy(activation)
                .await
                .map_err(|err| Error::ErrProxyActivation(err.to_string()))?;
            Ok::<_, Error>(socket)
        };
        let socket = tokio::time::timeout(timeout, dial_and_activate)
            .await
            .map_err(|_| Error::ErrTimeout)??;
        debug!("activated proxy {} for stream {stream_id}", candidate.jid());

        Ok(socket)
    }
}

#[async_trait]
impl Connector for Socks5Connector {
    type Socket = TcpStream;

    async fn connect(
        &self,
        candidate: &Candidate,
        digest: &Digest,
        role: &ConnectRole,
        timeout: Duration,
    ) -> Result<TcpStream> {
        match role {
            ConnectRole::PeerCandidate => {
                client::connect(candidate.host(), candidate.port(), digest, timeout).await
            }
            ConnectRole::OwnCandidate { stream_id, target } => {
                self.connect_own(candidate, digest, stream_id, target, timeout)
                    .await
            }
        }
    }
}
