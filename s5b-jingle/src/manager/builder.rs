use crate::element::{JingleTransportInfo, TransportInfo};
use crate::session::SessionContext;

/// Wraps `info` in the envelope addressed from us to the peer.
///
/// The initiator is named in the envelope when we are the initiator, the responder
/// otherwise.
pub fn create_transport_info(
    ctx: &SessionContext,
    stream_id: &str,
    info: TransportInfo,
) -> JingleTransportInfo {
    let (initiator, responder) = if ctx.is_initiator() {
        (Some(ctx.local.clone()), None)
    } else {
        (None, Some(ctx.local.clone()))
    };

    JingleTransportInfo {
        from: ctx.local.clone(),
        to: ctx.remote.clone(),
        session_id: ctx.session_id.clone(),
        initiator,
        responder,
        content: ctx.content.clone(),
        stream_id: stream_id.to_owned(),
        info,
    }
}

pub fn create_candidate_used(
    ctx: &SessionContext,
    stream_id: &str,
    cid: &str,
) -> JingleTransportInfo {
    create_transport_info(
        ctx,
        stream_id,
        TransportInfo::CandidateUsed {
            cid: cid.to_owned(),
        },
    )
}

pub fn create_candidate_error(ctx: &SessionContext, stream_id: &str) -> JingleTransportInfo {
    create_transport_info(ctx, stream_id, TransportInfo::CandidateError)
}

pub fn create_candidate_activated(
    ctx: &SessionContext,
    stream_id: &str,
    cid: &str,
) -> JingleTransportInfo {
    create_transport_info(
        ctx,
        stream_id,
        TransportInfo::CandidateActivated {
            cid: cid.to_owned(),
        },
    )
}

pub fn create_proxy_error(ctx: &SessionContext, stream_id: &str) -> JingleTransportInfo {
    create_transport_info(ctx, stream_id, TransportInfo::ProxyError)
}
