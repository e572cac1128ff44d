//! Per-connection entry point of the SOCKS5 bytestream transport.
//!
//! The owner of an XMPP connection creates one [`S5bTransportManager`] for it, calls
//! [`on_authenticated`](S5bTransportManager::on_authenticated) once the stream is up, creates
//! a [`NegotiationSession`] per Jingle content and routes every inbound S5B transport-info to
//! [`handle_transport_info`](S5bTransportManager::handle_transport_info).

#[cfg(test)]
mod manager_test;

pub mod builder;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use shared::error::{Error, Result};
use shared::util::generate_stream_id;
use socks::Socks5Proxy;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::candidate::{Candidate, CandidateType};
use crate::config::S5bConfig;
use crate::connector::{Connector, Socks5Connector};
use crate::element::{JingleTransportInfo, StreamHost, TransportElement};
use crate::session::driver::{Collaborators, Command, SessionDriver, SessionMap};
use crate::session::{NegotiationSession, SessionContext};
use crate::transport::S5bTransport;
use crate::xmpp::XmppConnection;

/// Local preference of candidates on external proxies.
const PROXY_LOCAL_PREFERENCE: u16 = 0;

pub struct S5bTransportManager<S = TcpStream> {
    config: S5bConfig,
    xmpp: Arc<dyn XmppConnection>,
    proxy: Arc<Socks5Proxy>,
    connector: Arc<dyn Connector<Socket = S>>,

    local_stream_hosts: tokio::sync::Mutex<Option<Vec<StreamHost>>>,
    available_stream_hosts: tokio::sync::Mutex<Option<Vec<StreamHost>>>,

    sessions: SessionMap<S>,
}

impl S5bTransportManager<TcpStream> {
    /// Creates a manager that dials candidates over real SOCKS5 connections.
    pub fn new(xmpp: Arc<dyn XmppConnection>, proxy: Arc<Socks5Proxy>, config: S5bConfig) -> Self {
        let connector = Arc::new(Socks5Connector::new(Arc::clone(&proxy), Arc::clone(&xmpp)));
        Self::with_connector(xmpp, proxy, connector, config)
    }
}

impl<S: Send + 'static> S5bTransportManager<S> {
    pub fn with_connector(
        xmpp: Arc<dyn XmppConnection>,
        proxy: Arc<Socks5Proxy>,
        connector: Arc<dyn Connector<Socket = S>>,
        config: S5bConfig,
    ) -> Self {
        Self {
            config,
            xmpp,
            proxy,
            connector,

            local_stream_hosts: tokio::sync::Mutex::new(None),
            available_stream_hosts: tokio::sync::Mutex::new(None),

            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &S5bConfig {
        &self.config
    }

    pub fn proxy(&self) -> &Arc<Socks5Proxy> {
        &self.proxy
    }

    /// Starts the local proxy and warms the stream host caches.
    pub async fn on_authenticated(&self) -> Result<()> {
        if self.config.use_local_candidates {
            self.local_stream_hosts().await?;
        }
        if self.config.use_external_candidates {
            self.available_stream_hosts().await;
        }
        Ok(())
    }

    /// Cancels every negotiation, stops the local proxy and forgets cached stream hosts.
    pub async fn on_connection_closed(&self) -> Result<()> {
        let sessions: Vec<_> = self.sessions.lock()?.drain().collect();
        for (session_id, commands) in sessions {
            debug!("cancelling session {session_id}: connection closed");
            if commands.send(Command::Cancel).await.is_err() {
                debug!("session {session_id} already stopped");
            }
        }

        self.proxy.stop().await?;
        *self.local_stream_hosts.lock().await = None;
        *self.available_stream_hosts.lock().await = None;
        Ok(())
    }

    /// Stream hosts served by our local proxy, starting the proxy on first use.
    pub async fn local_stream_hosts(&self) -> Result<Vec<StreamHost>> {
        let mut cache = self.local_stream_hosts.lock().await;
        if let Some(hosts) = cache.as_ref() {
            return Ok(hosts.clone());
        }

        let addr = self.proxy.start().await?;
        let jid = self.xmpp.local_jid();
        let hosts: Vec<StreamHost> = self
            .proxy
            .local_addresses()
            .into_iter()
            .map(|ip| StreamHost {
                jid: jid.clone(),
                host: ip.to_string(),
                port: addr.port(),
            })
            .collect();
        debug!("{} local stream hosts on port {}", hosts.len(), addr.port());

        *cache = Some(hosts.clone());
        Ok(hosts)
    }

    /// Stream hosts of the SOCKS5 proxies announced by our server.
    ///
    /// Proxies that do not answer are skipped. A failed discovery yields no hosts and is
    /// retried on the next call.
    pub async fn available_stream_hosts(&self) -> Vec<StreamHost> {
        let mut cache = self.available_stream_hosts.lock().await;
        if let Some(hosts) = cache.as_ref() {
            return hosts.clone();
        }

        let proxies = match self.xmpp.discover_proxies().await {
            Ok(proxies) => proxies,
            Err(err) => {
                warn!("socks5 proxy discovery failed: {err}");
                return vec![];
            }
        };

        let mut hosts = vec![];
        for proxy in &proxies {
            match self.xmpp.query_stream_hosts(proxy).await {
                Ok(found) => hosts.extend(found),
                Err(err) => warn!("dropping proxy {proxy}: {err}"),
            }
        }
        info!(
            "{} stream hosts on {} discovered proxies",
            hosts.len(),
            proxies.len()
        );

        *cache = Some(hosts.clone());
        hosts
    }

    /// Our candidates: local stream hosts first, then external proxies.
    pub async fn collect_candidates(&self) -> Vec<Candidate> {
        let mut candidates = vec![];

        if self.config.use_local_candidates {
            match self.local_stream_hosts().await {
                Ok(hosts) => candidates.extend(hosts.into_iter().map(|h| {
                    Candidate::with_local_preference(
                        h.host,
                        h.port,
                        h.jid,
                        CandidateType::Direct,
                        self.config.local_preference,
                    )
                })),
                Err(err) => warn!("no local candidates: {err}"),
            }
        }

        if self.config.use_external_candidates {
            candidates.extend(self.available_stream_hosts().await.into_iter().map(|h| {
                Candidate::with_local_preference(
                    h.host,
                    h.port,
                    h.jid,
                    CandidateType::Proxy,
                    PROXY_LOCAL_PREFERENCE,
                )
            }));
        }

        candidates
    }

    /// Prepares our offer for session-initiate.
    ///
    /// Our digest is registered with the local proxy before this returns, so the peer can
    /// connect as soon as it sees the offer.
    pub async fn create_transport_for_initiator(
        &self,
        ctx: SessionContext,
    ) -> Result<NegotiationSession<S>> {
        let candidates = self.collect_candidates().await;
        let transport =
            S5bTransport::for_initiator(&ctx, generate_stream_id(), self.config.mode, candidates);
        self.open(ctx, transport)
    }

    /// Prepares our answer to the peer's offer, for session-accept.
    pub async fn create_transport_for_responder(
        &self,
        ctx: SessionContext,
        offer: &TransportElement,
    ) -> Result<NegotiationSession<S>> {
        let candidates = self.collect_candidates().await;
        let transport = S5bTransport::for_responder(&ctx, offer, candidates);
        self.open(ctx, transport)
    }

    fn open(&self, ctx: SessionContext, transport: S5bTransport) -> Result<NegotiationSession<S>> {
        self.proxy.register_digest(transport.our_digest().clone())?;

        let commands = SessionDriver::spawn(ctx.clone(), &transport, self.collaborators());
        let replaced = self
            .sessions
            .lock()?
            .insert(ctx.session_id.clone(), commands.clone());
        if replaced.is_some() {
            warn!("session {} replaced an earlier transport", ctx.session_id);
        }
        info!(
            "session {}: offering {} candidates on stream {}",
            ctx.session_id,
            transport.our_candidates().len(),
            transport.stream_id()
        );

        Ok(NegotiationSession::new(
            ctx,
            transport,
            commands,
            Arc::clone(&self.sessions),
        ))
    }

    fn collaborators(&self) -> Collaborators<S> {
        Collaborators {
            connector: Arc::clone(&self.connector),
            xmpp: Arc::clone(&self.xmpp),
            proxy: Arc::clone(&self.proxy),
            sessions: Arc::clone(&self.sessions),
            connect_timeout: self.config.connect_timeout,
            establish_timeout: self.config.establish_timeout,
        }
    }

    /// Routes an inbound transport-info to its negotiation.
    ///
    /// An `Err` is to be answered to the sender as an IQ error, see
    /// [`StanzaError`](crate::element::StanzaError).
    pub async fn handle_transport_info(&self, info: JingleTransportInfo) -> Result<()> {
        let commands = self
            .sessions
            .lock()?
            .get(&info.session_id)
            .cloned()
            .ok_or(Error::ErrUnknownSession)?;

        let (reply, answer) = oneshot::channel();
        commands
            .send(Command::Inbound { info, reply })
            .await
            .map_err(|_| Error::ErrUnknownSession)?;
        answer.await.map_err(|_| Error::ErrUnknownSession)?
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .map(|sessions| sessions.contains_key(session_id))
            .unwrap_or(false)
    }
}
