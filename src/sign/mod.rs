//! Sign protocol: pairings, session proposals and everything a settled
//! session can carry.

mod engine;
mod events;
mod requests;
mod responses;
mod validation;
mod wallet_service;

pub use engine::SignEngine;
pub use events::{ExpiredSequence, NoTelemetry, SignEvent, Telemetry, TelemetryEvent};
pub use responses::LINK_MODE_RESPONSE_EVENT;
pub use validation::{
    is_chain_authorized, is_event_authorized, is_method_authorized,
    validate_proposal_namespaces, validate_required_namespaces,
    validate_session_namespaces,
};
pub use wallet_service::{HttpWalletServiceClient, WalletServiceClient, find_wallet_service};
