#![allow(dead_code)]

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("i/o timeout")]
    ErrTimeout,
    #[error("connection closed")]
    ErrConnectionClosed,
    #[error("no response received")]
    ErrNoResponse,
    #[error("remote entity returned error: {0}")]
    ErrStanza(String),
    #[error("invalid jid: {0}")]
    ErrInvalidJid(String),

    //Jingle session errors
    #[error("jingle: unknown session")]
    ErrUnknownSession,
    #[error("jingle: out of order")]
    ErrOutOfOrder,
    #[error("jingle: session cancelled")]
    ErrSessionCancelled,
    #[error("jingle: transport establishment already started")]
    ErrAlreadyEstablishing,
    #[error("jingle: transport has no peer offer yet")]
    ErrMissingPeerOffer,

    //S5B transport errors
    #[error("jingle s5b: unknown candidate {0}")]
    ErrUnknownCandidate(String),
    #[error("jingle s5b: no candidate succeeded on either side")]
    ErrNoCandidateSucceeded,
    #[error("jingle s5b: connecting to nominated candidate failed: {0}")]
    ErrCandidateConnect(String),
    #[error("jingle s5b: proxy activation failed: {0}")]
    ErrProxyActivation(String),
    #[error("jingle s5b: peer reported proxy error")]
    ErrPeerProxyError,

    //Local proxy errors
    #[error("socks5 proxy: not running")]
    ErrProxyNotRunning,
    #[error("socks5 proxy: digest not registered")]
    ErrDigestNotRegistered,
    #[error("socks5 proxy: target never connected")]
    ErrTargetNotConnected,

    //SOCKS5 handshake errors
    #[error("socks5: unsupported version {0}")]
    ErrSocksVersion(u8),
    #[error("socks5: no acceptable authentication method")]
    ErrSocksNoAcceptableAuth,
    #[error("socks5: unsupported command {0}")]
    ErrSocksCommand(u8),
    #[error("socks5: unsupported address type {0}")]
    ErrSocksAddressType(u8),
    #[error("socks5: connect rejected with reply {0}")]
    ErrSocksReply(u8),
    #[error("socks5 client: {0}")]
    ErrSocksClient(String),

    #[error("mutex poison: {0}")]
    PoisonError(String),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Std(#[source] StdError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn from_std<T>(error: T) -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        Error::Std(StdError(Box::new(error)))
    }

    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        if let Error::Std(s) = self {
            return s.0.downcast_ref();
        }

        None
    }
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

/// An escape hatch to preserve stack traces when we don't know the error.
///
/// Collaborators such as the XMPP connection produce errors local to their own crate;
/// `Error::from_std` keeps the underlying error around instead of flattening it to a string.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StdError(pub Box<dyn std::error::Error + Send + Sync>);

impl PartialEq for StdError {
    fn eq(&self, _: &Self) -> bool {
        false
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}
