
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shared::Jid;
use shared::error::{Error, Result};
use shared::util::generate_candidate_id;

/// Multiplier of the type preference in the candidate priority.
pub(crate) const TYPE_PREFERENCE_WEIGHT: u32 = 1 << 16;

/// Represents the type of a stream host candidate.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateType {
    /// A stream host served by the offering entity itself.
    #[default]
    Direct,
    /// A direct connection established with help such as NAT traversal.
    Assisted,
    /// A tunnel, e.g. Teredo.
    Tunnel,
    /// A SOCKS5 proxy run by a third party, which must be activated before use.
    Proxy,
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Direct => "direct",
            CandidateType::Assisted => "assisted",
            CandidateType::Tunnel => "tunnel",
            CandidateType::Proxy => "proxy",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CandidateType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "direct" => Ok(CandidateType::Direct),
            "assisted" => Ok(CandidateType::Assisted),
            "tunnel" => Ok(CandidateType::Tunnel),
            "proxy" => Ok(CandidateType::Proxy),
            _ => Err(Error::Other(format!("unknown candidate type {s}"))),
        }
    }
}

impl CandidateType {
    /// Returns the preference weight of a `CandidateType`.
    ///
    /// XEP-0260 2.4 recommends 126 for direct, 120 for assisted, 110 for tunnel
    /// and 10 for proxy candidates.
    #[must_use]
    pub const fn preference(self) -> u32 {
        match self {
            Self::Direct => 126,
            Self::Assisted => 120,
            Self::Tunnel => 110,
            Self::Proxy => 10,
        }
    }

    /// Only proxies relay data, and only after the nominating side activated them.
    pub fn requires_activation(self) -> bool {
        self == Self::Proxy
    }
}

/// `priority = 2^16 * type preference + local preference`
pub fn compute_priority(candidate_type: CandidateType, local_preference: u16) -> u32 {
    TYPE_PREFERENCE_WEIGHT * candidate_type.preference() + u32::from(local_preference)
}

/// One stream host a party offers. Candidates are immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub(crate) id: String,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) jid: Jid,
    pub(crate) priority: u32,
    pub(crate) candidate_type: CandidateType,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{} ({}) prio {}",
            self.id, self.candidate_type, self.host, self.port, self.jid, self.priority
        )
    }
}

impl Candidate {
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        jid: Jid,
        priority: u32,
        candidate_type: CandidateType,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            jid,
            priority,
            candidate_type,
        }
    }

    /// Builds a candidate with a fresh id and the priority derived from its type.
    pub fn with_local_preference(
        host: impl Into<String>,
        port: u16,
        jid: Jid,
        candidate_type: CandidateType,
        local_preference: u16,
    ) -> Self {
        Self::new(
            generate_candidate_id(),
            host,
            port,
            jid,
            compute_priority(candidate_type, local_preference),
            candidate_type,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The entity serving this stream host.
    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn candidate_type(&self) -> CandidateType {
        self.candidate_type
    }

    pub fn is_proxy(&self) -> bool {
        self.candidate_type.requires_activation()
    }
}
