//! # s5b-socks
//!
//! SOCKS5 plumbing for XMPP SOCKS5 bytestreams (XEP-0065).
//!
//! Bytestreams use a narrow profile of SOCKS5: no authentication, a single CONNECT request
//! whose destination is a domain name carrying the session [`Digest`] and port 0. This
//! crate provides the three pieces the Jingle transport negotiates with:
//!
//! - [`Digest`]: `hex(SHA-1(sid ++ initiator ++ target))`
//! - [`client::connect`]: dial a stream host and request a digest
//! - [`Socks5Proxy`]: a local proxy that only admits registered digests and parks the
//!   accepted socket for the session that registered it
//!
//! ## Example
//!
//! ```rust,ignore
//! use s5b_socks::{client, Digest, ProxyConfig, Socks5Proxy};
//! use std::time::Duration;
//!
//! let proxy = Socks5Proxy::new(ProxyConfig::default().with_port(0));
//! let addr = proxy.start().await?;
//!
//! let digest = Digest::new("sid", "a@x.lit/r", "b@y.lit/r");
//! proxy.register_digest(digest.clone())?;
//!
//! let outbound = client::connect("127.0.0.1", addr.port(), &digest, Duration::from_secs(5)).await?;
//! let inbound = proxy.accepted_socket_for(&digest, Duration::from_secs(5)).await?;
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod client;
mod config;
mod digest;
pub mod proto;
mod proxy;
mod socket;

pub use config::{DEFAULT_PROXY_PORT, ProxyConfig};
pub use digest::Digest;
pub use proxy::Socks5Proxy;
pub use socket::ListenerSocket;
