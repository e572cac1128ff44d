//! Server side of the SOCKS5 handshake as used by bytestreams.
//!
//! Bytestream peers never authenticate and always send a CONNECT request whose destination
//! is a domain name carrying the session [`Digest`] with port 0. Anything else is answered
//! with the matching failure reply and rejected.
//!
//! ```text
//! client                          proxy
//!   | 05 01 00                      |   greeting, one method: no auth
//!   |                      05 00    |   method selected
//!   | 05 01 00 03 28 <digest> 00 00 |   CONNECT digest:0
//!   |   05 00 00 03 28 <digest> 00 00   reply: succeeded
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::digest::Digest;
use shared::error::{Error, Result};

pub const SOCKS_VERSION: u8 = 0x05;

pub const AUTH_NONE: u8 = 0x00;
pub const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// Reply codes from RFC 1928 section 6 that the proxy sends.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Reply {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    NotAllowed = 0x02,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

/// Encodes a reply. Successful replies echo the requested digest as the bound address,
/// failures bind `0.0.0.0:0`.
pub fn encode_reply(reply: Reply, digest: Option<&Digest>) -> Bytes {
    let mut buf = BytesMut::with_capacity(7 + digest.map_or(4, |d| d.as_str().len()));
    buf.put_u8(SOCKS_VERSION);
    buf.put_u8(reply as u8);
    buf.put_u8(0x00);
    match digest {
        Some(d) => {
            buf.put_u8(ATYP_DOMAIN);
            buf.put_u8(d.as_str().len() as u8);
            buf.put_slice(d.as_str().as_bytes());
        }
        None => {
            buf.put_u8(ATYP_IPV4);
            buf.put_u32(0);
        }
    }
    buf.put_u16(0);
    buf.freeze()
}

pub async fn write_reply<S>(stream: &mut S, reply: Reply, digest: Option<&Digest>) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&encode_reply(reply, digest)).await?;
    stream.flush().await?;
    Ok(())
}

/// Negotiates the authentication method and reads the CONNECT request, returning the
/// requested digest. Protocol violations are answered before the error is returned.
pub async fn read_connect_request<S>(stream: &mut S) -> Result<Digest>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS_VERSION {
        return Err(Error::ErrSocksVersion(head[0]));
    }

    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;
    if !methods.contains(&AUTH_NONE) {
        stream
            .write_all(&[SOCKS_VERSION, AUTH_NO_ACCEPTABLE])
            .await?;
        return Err(Error::ErrSocksNoAcceptableAuth);
    }
    stream.write_all(&[SOCKS_VERSION, AUTH_NONE]).await?;
    stream.flush().await?;

    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    let [version, cmd, _reserved, atyp] = request;
    if version != SOCKS_VERSION {
        return Err(Error::ErrSocksVersion(version));
    }
    if cmd != CMD_CONNECT {
        write_reply(stream, Reply::CommandNotSupported, None).await?;
        return Err(Error::ErrSocksCommand(cmd));
    }
    if atyp != ATYP_DOMAIN {
        write_reply(stream, Reply::AddressTypeNotSupported, None).await?;
        return Err(Error::ErrSocksAddressType(atyp));
    }

    let len = stream.read_u8().await? as usize;
    let mut addr = vec![0u8; len];
    stream.read_exact(&mut addr).await?;
    let _port = stream.read_u16().await?;

    let addr = String::from_utf8(addr).map_err(|e| Error::Other(e.to_string()))?;
    Ok(Digest::from(addr))
}
