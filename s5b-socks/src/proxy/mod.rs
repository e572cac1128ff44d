//! Local SOCKS5 proxy.
//!
//! Each entity runs one [`Socks5Proxy`] per XMPP connection. Its address is offered to peers
//! as a direct stream host; a peer that picks it connects here and identifies the session by
//! its destination digest. Only digests registered with [`Socks5Proxy::register_digest`] are
//! accepted. The accepted socket is parked until the owning session collects it with
//! [`Socks5Proxy::accepted_socket_for`].
//!
//! ```rust,ignore
//! use s5b_socks::{Digest, ProxyConfig, Socks5Proxy};
//! use std::time::Duration;
//!
//! let proxy = Socks5Proxy::new(ProxyConfig::default().with_port(0));
//! let addr = proxy.start().await?;
//!
//! let digest = Digest::new(&sid, &initiator, &target);
//! proxy.register_digest(digest.clone())?;
//! // ... offer addr to the peer ...
//! let socket = proxy.accepted_socket_for(&digest, Duration::from_secs(10)).await?;
//! proxy.unregister_digest(&digest)?;
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{PORT_SEARCH_ATTEMPTS, ProxyConfig};
use crate::digest::Digest;
use crate::proto::{Reply, read_connect_request, write_reply};
use crate::socket::ListenerSocket;
use shared::error::{Error, Result};

/// Parking spot for the one connection allowed per registered digest.
struct Slot {
    tx: Option<oneshot::Sender<TcpStream>>,
    rx: Option<oneshot::Receiver<TcpStream>>,
}

type Registry = Arc<Mutex<HashMap<Digest, Slot>>>;

struct Running {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

pub struct Socks5Proxy {
    config: ProxyConfig,
    registry: Registry,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl Socks5Proxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Binds the listener and starts accepting. Starting a running proxy returns its
    /// current address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(r) = running.as_ref() {
            return Ok(r.local_addr);
        }

        let listener = self.bind()?;
        let local_addr = listener.local_addr()?;
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.registry),
            self.config.handshake_timeout,
        ));
        info!("socks5 proxy listening on {local_addr}");

        *running = Some(Running {
            local_addr,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Stops accepting and forgets every registered digest.
    pub async fn stop(&self) -> Result<()> {
        if let Some(r) = self.running.lock().await.take() {
            r.accept_task.abort();
            info!("socks5 proxy on {} stopped", r.local_addr);
        }
        self.registry.lock()?.clear();
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    pub async fn port(&self) -> Option<u16> {
        self.local_addr().await.map(|addr| addr.port())
    }

    /// Addresses to advertise as local stream hosts.
    pub fn local_addresses(&self) -> Vec<IpAddr> {
        if !self.config.local_addresses.is_empty() {
            self.config.local_addresses.clone()
        } else if !self.config.bind_ip.is_unspecified() {
            vec![self.config.bind_ip]
        } else {
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]
        }
    }

    /// Allows one inbound connection for `digest`. Registering a digest twice keeps the
    /// first registration.
    pub fn register_digest(&self, digest: Digest) -> Result<()> {
        let mut registry = self.registry.lock()?;
        registry.entry(digest).or_insert_with(|| {
            let (tx, rx) = oneshot::channel();
            Slot {
                tx: Some(tx),
                rx: Some(rx),
            }
        });
        Ok(())
    }

    /// Forgets `digest`, closing any connection accepted for it but never collected.
    pub fn unregister_digest(&self, digest: &Digest) -> Result<()> {
        if self.registry.lock()?.remove(digest).is_some() {
            trace!("socks5 proxy unregistered {digest}");
        }
        Ok(())
    }

    pub fn is_registered(&self, digest: &Digest) -> bool {
        self.registry
            .lock()
            .map(|r| r.contains_key(digest))
            .unwrap_or(false)
    }

    /// Waits up to `timeout` for the peer to connect with `digest` and hands over the socket.
    ///
    /// The socket can be collected once; a second call fails with
    /// [`Error::ErrTargetNotConnected`].
    pub async fn accepted_socket_for(&self, digest: &Digest, timeout: Duration) -> Result<TcpStream> {
        let rx = {
            let mut registry = self.registry.lock()?;
            let slot = registry
                .get_mut(digest)
                .ok_or(Error::ErrDigestNotRegistered)?;
            slot.rx.take().ok_or(Error::ErrTargetNotConnected)?
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(_)) => Err(Error::ErrDigestNotRegistered),
            Err(_) => Err(Error::ErrTargetNotConnected),
        }
    }

    fn bind(&self) -> Result<TcpListener> {
        let attempts = if self.config.port_search && self.config.port != 0 {
            PORT_SEARCH_ATTEMPTS
        } else {
            1
        };

        let mut last_err = None;
        for offset in 0..attempts {
            let Some(port) = self.config.port.checked_add(offset) else {
                break;
            };
            let addr = SocketAddr::new(self.config.bind_ip, port);
            match ListenerSocket::new(addr)
                .into_std()
                .and_then(TcpListener::from_std)
            {
                Ok(listener) => return Ok(listener),
                Err(err) => {
                    trace!("socks5 proxy cannot bind {addr}: {err}");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.map_or(Error::ErrProxyNotRunning, Error::from))
    }
}

impl Drop for Socks5Proxy {
    fn drop(&mut self) {
        if let Some(r) = self.running.get_mut().take() {
            r.accept_task.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, registry: Registry, handshake_timeout: Duration) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    match tokio::time::timeout(handshake_timeout, serve(stream, registry)).await {
                        Ok(Ok(digest)) => debug!("socks5 proxy accepted {peer} for {digest}"),
                        Ok(Err(err)) => warn!("socks5 proxy rejected {peer}: {err}"),
                        Err(_) => warn!("socks5 proxy handshake with {peer} timed out"),
                    }
                });
            }
            Err(err) => warn!("socks5 proxy accept failed: {err}"),
        }
    }
}

async fn serve(mut stream: TcpStream, registry: Registry) -> Result<Digest> {
    let digest = read_connect_request(&mut stream).await?;

    let tx = {
        let mut registry = registry.lock()?;
        registry.get_mut(&digest).and_then(|slot| slot.tx.take())
    };
    let Some(tx) = tx else {
        write_reply(&mut stream, Reply::NotAllowed, None).await?;
        return Err(Error::ErrDigestNotRegistered);
    };

    write_reply(&mut stream, Reply::Succeeded, Some(&digest)).await?;
    tx.send(stream).map_err(|_| Error::ErrConnectionClosed)?;
    Ok(digest)
}
