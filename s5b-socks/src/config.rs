//! Configuration for the local SOCKS5 proxy.
//!
//! ```rust
//! use s5b_socks::ProxyConfig;
//! use std::net::{IpAddr, Ipv4Addr};
//! use std::time::Duration;
//!
//! let config = ProxyConfig::default()
//!     .with_port(7777)
//!     .with_port_search(true)
//!     .with_local_addresses(vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))])
//!     .with_handshake_timeout(Duration::from_secs(5));
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default port the local proxy listens on.
pub const DEFAULT_PROXY_PORT: u16 = 7777;

/// Number of consecutive ports tried when port search is enabled.
pub(crate) const PORT_SEARCH_ATTEMPTS: u16 = 64;

/// Default upper bound for a client to finish the SOCKS5 handshake.
pub(crate) const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`Socks5Proxy`](crate::Socks5Proxy).
///
/// # Fields
///
/// - `bind_ip`: address the listener binds to (default: `0.0.0.0`)
/// - `port`: first port to try (default: 7777, `0` picks an ephemeral port)
/// - `port_search`: try the following ports when `port` is taken (default: true)
/// - `local_addresses`: addresses advertised as local stream hosts
/// - `handshake_timeout`: how long an inbound client may take to send its CONNECT request
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub bind_ip: IpAddr,
    pub port: u16,
    pub port_search: bool,

    /// Addresses advertised to peers as local stream hosts.
    ///
    /// When empty, the proxy advertises its bind address, or the IPv4 loopback address when
    /// bound to the unspecified address.
    pub local_addresses: Vec<IpAddr>,

    pub handshake_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PROXY_PORT,
            port_search: true,
            local_addresses: Vec::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_ip(mut self, bind_ip: IpAddr) -> Self {
        self.bind_ip = bind_ip;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// When enabled and the configured port is in use, the proxy tries the next ports
    /// before giving up.
    pub fn with_port_search(mut self, port_search: bool) -> Self {
        self.port_search = port_search;
        self
    }

    pub fn with_local_addresses(mut self, local_addresses: Vec<IpAddr>) -> Self {
        self.local_addresses = local_addresses;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}
