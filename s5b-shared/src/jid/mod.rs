//! XMPP entity addresses.
//!
//! A [`Jid`] has the form `[node@]domain[/resource]`. Full equality compares every part;
//! trust decisions made during proxy activation use [`Jid::is_bare_equal`], which ignores
//! the resource.
//!
//! ```rust
//! use s5b_shared::Jid;
//!
//! let full: Jid = "romeo@montague.lit/orchard".parse().unwrap();
//! let bare: Jid = "romeo@montague.lit".parse().unwrap();
//!
//! assert_ne!(full, bare);
//! assert!(full.is_bare_equal(&bare));
//! assert_eq!(full.bare(), bare);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    node: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    pub fn new(node: Option<&str>, domain: &str, resource: Option<&str>) -> Result<Self> {
        if domain.is_empty() || domain.contains(['@', '/']) {
            return Err(Error::ErrInvalidJid(domain.to_owned()));
        }
        if let Some(n) = node {
            if n.is_empty() || n.contains(['@', '/']) {
                return Err(Error::ErrInvalidJid(n.to_owned()));
            }
        }
        if let Some(r) = resource {
            if r.is_empty() {
                return Err(Error::ErrInvalidJid(format!("{domain}/")));
            }
        }

        Ok(Jid {
            node: node.map(str::to_owned),
            domain: domain.to_owned(),
            resource: resource.map(str::to_owned),
        })
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// Returns this address without its resource.
    pub fn bare(&self) -> Jid {
        Jid {
            node: self.node.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    pub fn is_bare_equal(&self, other: &Jid) -> bool {
        self.node == other.node && self.domain == other.domain
    }
}

impl FromStr for Jid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (rest, resource) = match s.split_once('/') {
            Some((rest, resource)) => (rest, Some(resource)),
            None => (s, None),
        };
        let (node, domain) = match rest.split_once('@') {
            Some((node, domain)) => (Some(node), domain),
            None => (None, rest),
        };

        Jid::new(node, domain, resource).map_err(|_| Error::ErrInvalidJid(s.to_owned()))
    }
}

impl TryFrom<String> for Jid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(node) = &self.node {
            write!(f, "{node}@")?;
        }
        write!(f, "{}", self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}
