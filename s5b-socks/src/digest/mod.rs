//! Destination-address digests.
//!
//! A SOCKS5 bytestream is addressed by `hex(SHA-1(sid ++ initiator ++ target))`. The digest is
//! sent as the domain name of the SOCKS5 CONNECT request and the proxy only accepts
//! connections whose digest was registered beforehand.
//!
//! ```rust
//! use s5b_socks::Digest;
//!
//! let d = Digest::new(
//!     "vxf9n471bn46",
//!     "requester@example.com/foo",
//!     "target@example.org/bar",
//! );
//! assert_eq!(d.as_str(), "98b8d688d0f5d895fd41c5e7309a2e9e33ba32ff");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest as _, Sha1};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Computes the digest binding `session_id` to the ordered pair (`initiator`, `target`).
    pub fn new(session_id: &str, initiator: impl fmt::Display, target: impl fmt::Display) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(session_id.as_bytes());
        hasher.update(initiator.to_string().as_bytes());
        hasher.update(target.to_string().as_bytes());
        Digest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Digest {
    fn from(s: String) -> Self {
        Digest(s)
    }
}

impl From<&str> for Digest {
    fn from(s: &str) -> Self {
        Digest(s.to_owned())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
