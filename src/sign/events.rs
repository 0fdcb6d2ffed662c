use serde_json::Value;

use crate::rpc::{JsonRpcErrorObject, JsonRpcResponse, RequestId};
use crate::storage::{ProposalRecord, Session};
use crate::types::{Namespaces, Topic};

/// Everything the Sign engine reports to the host application.
#[derive(Clone, Debug, PartialEq)]
pub enum SignEvent {
    /// Wallet side: a dApp proposed a session.
    SessionProposal(ProposalRecord),
    /// dApp side: the wallet settled the session.
    SessionApproved(Session),
    SessionRejected {
        proposer_public_key: String,
        reason: JsonRpcErrorObject,
    },
    /// Wallet side: the dApp acknowledged our settle request.
    SessionSettled(Session),
    SessionSettleFailed {
        topic: Topic,
        reason: JsonRpcErrorObject,
    },
    SessionRequest {
        topic: Topic,
        id: RequestId,
        chain_id: String,
        method: String,
        params: Value,
    },
    SessionRequestResponse {
        topic: Topic,
        chain_id: String,
        method: String,
        response: JsonRpcResponse,
    },
    /// The peer changed the namespaces.
    SessionUpdate {
        topic: Topic,
        namespaces: Namespaces,
    },
    /// Outcome of an update we sent.
    SessionUpdateResponse {
        topic: Topic,
        result: Result<Namespaces, JsonRpcErrorObject>,
    },
    SessionExtend {
        topic: Topic,
        expiry: u64,
    },
    SessionEvent {
        topic: Topic,
        chain_id: String,
        name: String,
        data: Value,
    },
    SessionDelete {
        topic: Topic,
        reason: String,
    },
    PairingDelete {
        topic: Topic,
    },
    Expired(ExpiredSequence),
    Error {
        topic: Option<Topic>,
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExpiredSequence {
    Pairing(Topic),
    Session(Topic),
    Proposal(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub topic: Topic,
    pub request_id: RequestId,
}

/// Sink for delivery telemetry. Only link mode traffic is reported since it
/// gets no delivery ack from the relay.
pub trait Telemetry: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

pub struct NoTelemetry;

impl Telemetry for NoTelemetry {
    fn record(&self, event: TelemetryEvent) {
        log::trace!("telemetry {} for {}", event.name, event.request_id);
    }
}
