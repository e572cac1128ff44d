//! Configuration for SOCKS5 bytestream transport negotiation.
//!
//! ```rust
//! use s5b_jingle::S5bConfig;
//! use std::time::Duration;
//!
//! // Only offer the local proxy, give each candidate 5 seconds.
//! let config = S5bConfig::default()
//!     .with_use_external_candidates(false)
//!     .with_connect_timeout(Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::element::Mode;

/// Time allowed to connect to one candidate, including the SOCKS5 handshake.
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a whole negotiation, from start until ready or failed.
pub(crate) const DEFAULT_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Local preference given to candidates served by our own proxy.
pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 100;

/// Collects the knobs of [`S5bTransportManager`](crate::S5bTransportManager) into a single
/// structure.
#[derive(Clone, Debug)]
pub struct S5bConfig {
    /// Offer the local SOCKS5 proxy as direct candidates.
    ///
    /// Default: true
    pub use_local_candidates: bool,

    /// Offer stream hosts of external SOCKS5 proxies discovered on the server.
    ///
    /// Default: true
    pub use_external_candidates: bool,

    /// Bound for connecting to a single candidate. The candidate race tries candidates one
    /// after the other, so its worst case is the number of candidates times this value.
    pub connect_timeout: Duration,

    /// Bound for the whole negotiation. A session that is neither ready nor failed when it
    /// expires fails with a timeout, which covers a peer that never answers.
    pub establish_timeout: Duration,

    /// Local preference used for direct candidates in the priority formula.
    pub local_preference: u16,

    pub mode: Mode,
}

impl Default for S5bConfig {
    fn default() -> Self {
        Self {
            use_local_candidates: true,
            use_external_candidates: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            establish_timeout: DEFAULT_ESTABLISH_TIMEOUT,
            local_preference: DEFAULT_LOCAL_PREFERENCE,
            mode: Mode::Tcp,
        }
    }
}

impl S5bConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_use_local_candidates(mut self, use_local_candidates: bool) -> Self {
        self.use_local_candidates = use_local_candidates;
        self
    }

    pub fn with_use_external_candidates(mut self, use_external_candidates: bool) -> Self {
        self.use_external_candidates = use_external_candidates;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_establish_timeout(mut self, timeout: Duration) -> Self {
        self.establish_timeout = timeout;
        self
    }

    pub fn with_local_preference(mut self, local_preference: u16) -> Self {
        self.local_preference = local_preference;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}
