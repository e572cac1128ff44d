//! # s5b-jingle
//!
//! Negotiation of the Jingle SOCKS5 Bytestreams transport (XEP-0260) between two XMPP
//! entities.
//!
//! Both sides offer candidates (stream hosts they can be reached through), race the other
//! side's candidates in offer order, report their pick with candidate-used or
//! candidate-error, and then agree on a single nominated candidate: the higher priority
//! wins, ties go to the initiator's pick. A nominated external proxy is activated before
//! data flows.
//!
//! ## Layers
//!
//! - [`Reconciler`]: the sans-I/O decision core (`sansio::Protocol`)
//! - [`select_from_peer_candidates`] and [`Connector`]: the candidate race
//! - [`NegotiationSession`]: one negotiation driven by a background task
//! - [`S5bTransportManager`]: per-connection entry point, candidate discovery and dispatch
//!   of inbound transport-info
//!
//! The XMPP connection itself stays outside; it is reached through [`XmppConnection`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use s5b_jingle::{S5bConfig, S5bTransportManager, SessionContext};
//! use s5b_socks::{ProxyConfig, Socks5Proxy};
//! use std::sync::Arc;
//!
//! let manager = S5bTransportManager::new(xmpp, Arc::new(Socks5Proxy::new(ProxyConfig::default())), S5bConfig::default());
//! manager.on_authenticated().await?;
//!
//! // initiator
//! let mut session = manager.create_transport_for_initiator(ctx).await?;
//! send_session_initiate(session.transport_element());
//! session.handle_session_accept(&accepted_transport)?;
//! let stream = session.establish().await?;
//!
//! // every inbound S5B transport-info
//! if let Err(err) = manager.handle_transport_info(info).await {
//!     reply_with(StanzaError::from(&err));
//! }
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod candidate;
mod config;
pub mod connector;
pub mod element;
mod manager;
mod reconciler;
pub mod selection;
mod session;
mod transport;
mod xmpp;

pub use candidate::{Candidate, CandidateType, compute_priority};
pub use config::S5bConfig;
pub use connector::{ConnectRole, Connector, Socks5Connector};
pub use element::{
    ContentInfo, Creator, JingleTransportInfo, Mode, ProxyActivation, Senders, StanzaError,
    StreamHost, TransportElement, TransportInfo,
};
pub use manager::{S5bTransportManager, builder};
pub use reconciler::{
    BytestreamSession, ReconcileEvent, ReconcileInput, ReconcileState, Reconciler,
};
pub use selection::{Nomination, SelectionOutcome, nominate, select_from_peer_candidates};
pub use session::{NegotiationSession, SessionContext};
pub use transport::S5bTransport;
pub use xmpp::XmppConnection;
