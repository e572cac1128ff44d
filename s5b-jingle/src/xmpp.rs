//! The XMPP side of the negotiation, provided by the owner of the connection.

use async_trait::async_trait;
use shared::Jid;
use shared::error::Result;

use crate::element::{JingleTransportInfo, ProxyActivation, StreamHost};

/// Stanza I/O the transport negotiation needs from an XMPP connection.
///
/// Errors returned by the server or the peer are expected as
/// [`Error::ErrStanza`](shared::error::Error::ErrStanza), missing answers as
/// [`Error::ErrNoResponse`](shared::error::Error::ErrNoResponse).
#[async_trait]
pub trait XmppConnection: Send + Sync {
    /// Full address of the authenticated local entity.
    fn local_jid(&self) -> Jid;

    /// Sends a transport-info without waiting for its result.
    async fn send(&self, info: JingleTransportInfo) -> Result<()>;

    /// Sends a transport-info and waits for the peer's IQ result or error.
    async fn send_and_await(&self, info: JingleTransportInfo) -> Result<()>;

    /// Asks a SOCKS5 proxy to start relaying the bytestream and waits for its answer.
    async fn activate_proxy(&self, activation: ProxyActivation) -> Result<()>;

    /// Finds SOCKS5 proxies announced by the server (XEP-0065 service discovery).
    async fn discover_proxies(&self) -> Result<Vec<Jid>>;

    /// Asks one proxy for its network address.
    async fn query_stream_hosts(&self, proxy: &Jid) -> Result<Vec<StreamHost>>;
}
