//! Wire-level values exchanged with the peer and the server.
//!
//! These types mirror the protocol elements one to one and derive `serde` so the XMPP layer
//! can map them to and from XML. Runtime values such as [`Candidate`] stay separate; the
//! functions at the bottom of this module convert between the two.


use std::fmt;

use serde::{Deserialize, Serialize};
use shared::Jid;
use shared::error::Error;

use crate::candidate::{Candidate, CandidateType};

/// Port assumed when a candidate omits it.
pub const DEFAULT_CANDIDATE_PORT: u16 = 1080;

/// Transport mode of the bytestream.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Tcp => write!(f, "tcp"),
            Mode::Udp => write!(f, "udp"),
        }
    }
}

/// `<candidate/>` of a transport offer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateElement {
    pub cid: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub jid: Jid,
    pub priority: u32,
    #[serde(rename = "type", default)]
    pub candidate_type: CandidateType,
}

/// `<transport/>` carried in session-initiate and session-accept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportElement {
    pub sid: String,
    #[serde(default)]
    pub mode: Mode,
    pub dstaddr: String,
    #[serde(default)]
    pub candidates: Vec<CandidateElement>,
}

/// Payload of a transport-info.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportInfo {
    /// "I will connect to your candidate with this id."
    CandidateUsed { cid: String },
    /// "None of your candidates worked."
    CandidateError,
    /// "The proxy you nominated is relaying now."
    CandidateActivated { cid: String },
    /// "Activating the proxy failed."
    ProxyError,
}

impl TransportInfo {
    /// Whether the sender waits for the peer's IQ result before moving on.
    pub fn requires_ack(&self) -> bool {
        matches!(
            self,
            TransportInfo::CandidateUsed { .. } | TransportInfo::CandidateActivated { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransportInfo::CandidateUsed { .. } => "candidate-used",
            TransportInfo::CandidateError => "candidate-error",
            TransportInfo::CandidateActivated { .. } => "candidate-activated",
            TransportInfo::ProxyError => "proxy-error",
        }
    }
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Creator {
    #[default]
    Initiator,
    Responder,
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Senders {
    #[default]
    Both,
    Initiator,
    Responder,
    None,
}

/// Identifies the content a transport belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub creator: Creator,
    pub name: String,
    pub senders: Senders,
}

/// A `jingle` IQ with action transport-info wrapping one [`TransportInfo`].
///
/// Exactly one of `initiator` and `responder` is set, naming the sender's role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JingleTransportInfo {
    pub from: Jid,
    pub to: Jid,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<Jid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<Jid>,
    pub content: ContentInfo,
    pub stream_id: String,
    pub info: TransportInfo,
}

/// A stream host as announced by a SOCKS5 proxy (XEP-0065 `<streamhost/>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamHost {
    pub jid: Jid,
    pub host: String,
    pub port: u16,
}

/// Bytestream `<activate/>` request sent to a proxy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyActivation {
    pub from: Jid,
    pub proxy: Jid,
    pub sid: String,
    pub target: Jid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCondition {
    BadRequest,
    ItemNotFound,
    UnexpectedRequest,
    InternalServerError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JingleErrorCondition {
    UnknownSession,
    OutOfOrder,
}

/// Error answer to an inbound transport-info.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanzaError {
    pub condition: ErrorCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jingle_condition: Option<JingleErrorCondition>,
}

impl From<&Error> for StanzaError {
    fn from(err: &Error) -> Self {
        let (condition, jingle_condition) = match err {
            Error::ErrUnknownSession => (
                ErrorCondition::ItemNotFound,
                Some(JingleErrorCondition::UnknownSession),
            ),
            Error::ErrOutOfOrder => (
                ErrorCondition::UnexpectedRequest,
                Some(JingleErrorCondition::OutOfOrder),
            ),
            Error::ErrUnknownCandidate(_) => (ErrorCondition::ItemNotFound, None),
            Error::ErrInvalidJid(_) => (ErrorCondition::BadRequest, None),
            _ => (ErrorCondition::InternalServerError, None),
        };
        StanzaError {
            condition,
            jingle_condition,
        }
    }
}

pub fn candidate_from_element(element: &CandidateElement) -> Candidate {
    Candidate::new(
        element.cid.clone(),
        element.host.clone(),
        element.port.unwrap_or(DEFAULT_CANDIDATE_PORT),
        element.jid.clone(),
        element.priority,
        element.candidate_type,
    )
}

pub fn candidate_to_element(candidate: &Candidate) -> CandidateElement {
    CandidateElement {
        cid: candidate.id().to_owned(),
        host: candidate.host().to_owned(),
        port: Some(candidate.port()),
        jid: candidate.jid().clone(),
        priority: candidate.priority(),
        candidate_type: candidate.candidate_type(),
    }
}
