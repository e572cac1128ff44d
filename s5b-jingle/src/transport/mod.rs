
use log::warn;
use socks::Digest;

use crate::candidate::Candidate;
use crate::element::{Mode, TransportElement, candidate_from_element, candidate_to_element};
use crate::session::SessionContext;
use shared::error::{Error, Result};

/// Negotiation state of one SOCKS5 bytestream transport.
///
/// `our_*` is what we offered, `their_*` is what the peer offered. The peer's side is known
/// from the start for the responder and arrives with session-accept for the initiator.
#[derive(Clone, Debug)]
pub struct S5bTransport {
    pub(crate) stream_id: String,
    pub(crate) mode: Mode,
    pub(crate) our_digest: Digest,
    pub(crate) their_digest: Option<Digest>,
    pub(crate) our_candidates: Vec<Candidate>,
    pub(crate) their_candidates: Vec<Candidate>,
}

impl S5bTransport {
    pub fn for_initiator(
        ctx: &SessionContext,
        stream_id: impl Into<String>,
        mode: Mode,
        our_candidates: Vec<Candidate>,
    ) -> Self {
        let stream_id = stream_id.into();
        Self {
            our_digest: Digest::new(&stream_id, &ctx.local, &ctx.remote),
            stream_id,
            mode,
            their_digest: None,
            our_candidates,
            their_candidates: Vec::new(),
        }
    }

    /// Adopts stream id and mode of the peer's offer. Their candidates keep the order of
    /// the offer.
    pub fn for_responder(
        ctx: &SessionContext,
        offer: &TransportElement,
        our_candidates: Vec<Candidate>,
    ) -> Self {
        let mut transport = Self {
            our_digest: Digest::new(&offer.sid, &ctx.local, &ctx.remote),
            stream_id: offer.sid.clone(),
            mode: offer.mode,
            their_digest: None,
            our_candidates,
            their_candidates: Vec::new(),
        };
        transport.set_their_offer(ctx, offer);
        transport
    }

    /// Records the responder's transport from session-accept.
    pub fn handle_session_accept(
        &mut self,
        ctx: &SessionContext,
        accept: &TransportElement,
    ) -> Result<()> {
        if accept.sid != self.stream_id {
            return Err(Error::Other(format!(
                "session-accept for stream {} on transport {}",
                accept.sid, self.stream_id
            )));
        }
        if self.their_digest.is_some() {
            return Err(Error::ErrOutOfOrder);
        }
        self.set_their_offer(ctx, accept);
        Ok(())
    }

    fn set_their_offer(&mut self, ctx: &SessionContext, offer: &TransportElement) {
        let their_digest = Digest::from(offer.dstaddr.as_str());
        let expected = Digest::new(&offer.sid, &ctx.remote, &ctx.local);
        if their_digest != expected {
            warn!(
                "peer {} announced dstaddr {their_digest}, expected {expected}",
                ctx.remote
            );
        }
        self.their_digest = Some(their_digest);
        self.their_candidates = offer.candidates.iter().map(candidate_from_element).collect();
    }

    /// Our offer, as sent in session-initiate or session-accept.
    pub fn to_element(&self) -> TransportElement {
        TransportElement {
            sid: self.stream_id.clone(),
            mode: self.mode,
            dstaddr: self.our_digest.to_string(),
            candidates: self.our_candidates.iter().map(candidate_to_element).collect(),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn our_digest(&self) -> &Digest {
        &self.our_digest
    }

    pub fn their_digest(&self) -> Option<&Digest> {
        self.their_digest.as_ref()
    }

    pub fn our_candidates(&self) -> &[Candidate] {
        &self.our_candidates
    }

    pub fn their_candidates(&self) -> &[Candidate] {
        &self.their_candidates
    }

    pub fn our_candidate(&self, cid: &str) -> Option<&Candidate> {
        self.our_candidates.iter().find(|c| c.id() == cid)
    }

    pub fn has_their_offer(&self) -> bool {
        self.their_digest.is_some()
    }
}
