use shared::Jid;

use crate::element::ContentInfo;

/// What a transport needs to know about the Jingle session and content it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    pub local: Jid,
    pub remote: Jid,
    pub initiator: Jid,
    pub content: ContentInfo,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        local: Jid,
        remote: Jid,
        initiator: Jid,
        content: ContentInfo,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            local,
            remote,
            initiator,
            content,
        }
    }

    pub fn is_initiator(&self) -> bool {
        self.local == self.initiator
    }

    pub fn responder(&self) -> &Jid {
        if self.is_initiator() {
            &self.remote
        } else {
            &self.local
        }
    }
}
