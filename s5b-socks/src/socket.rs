//! Listener socket construction for the local proxy.
//!
//! ```rust,ignore
//! use s5b_socks::ListenerSocket;
//! use std::net::SocketAddr;
//!
//! let bind_addr: SocketAddr = "0.0.0.0:7777".parse()?;
//! let std_listener = ListenerSocket::new(bind_addr).into_std()?;
//! let listener = tokio::net::TcpListener::from_std(std_listener)?;
//! ```

use std::io;
use std::net::{SocketAddr, TcpListener};

use socket2::{Domain, Protocol, Socket, Type};

/// Pending connections queued by the kernel before `accept`.
const LISTEN_BACKLOG: i32 = 128;

/// A builder for the TCP listener the local SOCKS5 proxy accepts on.
///
/// The resulting listener is:
///
/// - Bound to the given address
/// - Configured with `SO_REUSEADDR` so a restarted proxy can rebind its port
/// - Set to non-blocking mode for async compatibility
#[derive(Debug, Clone)]
pub struct ListenerSocket {
    bind_addr: SocketAddr,
    reuse_address: bool,
}

impl ListenerSocket {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            reuse_address: true,
        }
    }

    pub fn with_reuse_address(mut self, reuse_address: bool) -> Self {
        self.reuse_address = reuse_address;
        self
    }

    /// Converts this builder into a bound, listening `std::net::TcpListener`.
    pub fn into_std(self) -> io::Result<TcpListener> {
        let domain = if self.bind_addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

        socket.set_reuse_address(self.reuse_address)?;
        socket.set_nonblocking(true)?;
        socket.bind(&self.bind_addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;

        Ok(socket.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_listener_socket_builder() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let builder = ListenerSocket::new(addr).with_reuse_address(false);
        assert_eq!(builder.bind_addr, addr);
        assert!(!builder.reuse_address);
    }

    #[test]
    fn test_listener_socket_binds_ephemeral() -> io::Result<()> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = ListenerSocket::new(addr).into_std()?;
        let local = listener.local_addr()?;
        assert_eq!(local.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_ne!(local.port(), 0);
        Ok(())
    }
}
