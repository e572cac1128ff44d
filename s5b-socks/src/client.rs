//! SOCKS5 client used to reach stream hosts.

use std::time::Duration;

use log::{debug, trace};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

use crate::digest::Digest;
use shared::error::{Error, Result};

/// Connects to the SOCKS5 stream host at `host:port` and requests the bytestream
/// identified by `digest`.
///
/// `timeout` bounds the TCP connect and the whole handshake. On success the returned
/// stream carries the raw bytestream.
pub async fn connect(host: &str, port: u16, digest: &Digest, timeout: Duration) -> Result<TcpStream> {
    trace!("socks5 connecting to {host}:{port} for {digest}");

    let stream = tokio::time::timeout(
        timeout,
        Socks5Stream::connect((host, port), (digest.as_str(), 0)),
    )
    .await
    .map_err(|_| Error::ErrTimeout)?
    .map_err(socks_error)?;

    debug!("socks5 connected to {host}:{port} for {digest}");
    Ok(stream.into_inner())
}

fn socks_error(err: tokio_socks::Error) -> Error {
    match err {
        tokio_socks::Error::Io(e) => Error::from(e),
        other => Error::ErrSocksClient(other.to_string()),
    }
}
