//! Choosing a candidate.
//!
//! Each side races the peer's candidates ([`select_from_peer_candidates`]) and reports the
//! result to the peer. Once both results are known, [`nominate`] decides deterministically
//! which one carries the data, so that both sides reach the same decision.


use std::time::Duration;

use log::{debug, warn};
use socks::Digest;

use crate::candidate::Candidate;
use crate::connector::{ConnectRole, Connector};

/// Outcome of choosing one candidate of the other side.
///
/// Our own outcome carries the socket the race opened; the peer's outcome, learnt from
/// candidate-used, carries `()`.
#[derive(Debug)]
pub enum SelectionOutcome<S> {
    NotYetDecided,
    Candidate { candidate: Candidate, socket: S },
    Failed,
}

impl<S> Default for SelectionOutcome<S> {
    fn default() -> Self {
        SelectionOutcome::NotYetDecided
    }
}

impl<S> SelectionOutcome<S> {
    pub fn is_decided(&self) -> bool {
        !matches!(self, SelectionOutcome::NotYetDecided)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SelectionOutcome::Failed)
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            SelectionOutcome::Candidate { candidate, .. } => Some(candidate),
            _ => None,
        }
    }
}

/// Which selection carries the data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Nomination {
    /// Our selection, i.e. one of the peer's candidates.
    Ours,
    /// The peer's selection, i.e. one of our candidates.
    Theirs,
    /// Neither side found a working candidate.
    Neither,
}

/// Decides the nominated selection, or `None` while either side is undecided.
///
/// The higher priority wins. Equal priorities go to the initiator's selection. A failed
/// side yields to the other one.
pub fn nominate<A, B>(
    ours: &SelectionOutcome<A>,
    theirs: &SelectionOutcome<B>,
    is_initiator: bool,
) -> Option<Nomination> {
    let nomination = match (ours, theirs) {
        (SelectionOutcome::NotYetDecided, _) | (_, SelectionOutcome::NotYetDecided) => {
            return None;
        }
        (SelectionOutcome::Failed, SelectionOutcome::Failed) => Nomination::Neither,
        (SelectionOutcome::Failed, _) => Nomination::Theirs,
        (_, SelectionOutcome::Failed) => Nomination::Ours,
        (
            SelectionOutcome::Candidate { candidate: our, .. },
            SelectionOutcome::Candidate {
                candidate: their, ..
            },
        ) => {
            if our.priority() > their.priority() {
                Nomination::Ours
            } else if our.priority() < their.priority() {
                Nomination::Theirs
            } else if is_initiator {
                Nomination::Ours
            } else {
                Nomination::Theirs
            }
        }
    };
    Some(nomination)
}

/// Tries the peer's candidates in the order they were offered and returns the first one
/// that connects. Remaining candidates are not attempted.
pub async fn select_from_peer_candidates<C>(
    candidates: &[Candidate],
    digest: &Digest,
    connector: &C,
    timeout: Duration,
) -> SelectionOutcome<C::Socket>
where
    C: Connector + ?Sized,
{
    for candidate in candidates {
        match connector
            .connect(candidate, digest, &ConnectRole::PeerCandidate, timeout)
            .await
        {
            Ok(socket) => {
                debug!("connected to peer candidate {candidate}");
                return SelectionOutcome::Candidate {
                    candidate: candidate.clone(),
                    socket,
                };
            }
            Err(err) => warn!("could not connect to peer candidate {candidate}: {err}"),
        }
    }

    warn!("failed to connect to any of {} peer candidates", candidates.len());
    SelectionOutcome::Failed
}
