/// Types
///
/// Wire params of the Sign and Notify protocols and the relay-level metadata
/// that travels next to every encrypted payload. There are some tests with
/// actual payloads to ensure that decoding works.
///
use std::collections::HashMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DAY, FIVE_MINUTES, MONTH, THIRTY_SECONDS};
use crate::rpc::RequestId;

/// Hex encoded channel identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Topic(pub String);

impl Topic {
    pub fn new(topic: impl Into<String>) -> Self {
        Topic(topic.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Topic(value)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Topic(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    Relay,
    LinkMode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal: Option<String>,
    #[serde(rename = "linkMode", default)]
    pub link_mode: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub metadata: Metadata,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relay {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Default for Relay {
    fn default() -> Self {
        Relay {
            protocol: crate::constants::RELAY_PROTOCOL.to_string(),
            data: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<String>>,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

pub type Namespaces = HashMap<String, Namespace>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionProposeParams {
    pub relays: Vec<Relay>,
    pub proposer: Participant,
    #[serde(rename = "requiredNamespaces", default)]
    pub required_namespaces: Namespaces,
    #[serde(rename = "optionalNamespaces", default)]
    pub optional_namespaces: Namespaces,
    #[serde(
        rename = "sessionProperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session_properties: Option<HashMap<String, String>>,
    #[serde(
        rename = "scopedProperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub scoped_properties: Option<HashMap<String, String>>,
    #[serde(rename = "expiryTimestamp", default)]
    pub expiry_timestamp: Option<u64>,
    #[serde(rename = "pairingTopic", default)]
    pub pairing_topic: Option<Topic>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionProposeResponse {
    pub relay: Relay,
    #[serde(rename = "responderPublicKey")]
    pub responder_public_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSettleParams {
    pub relay: Relay,
    pub controller: Participant,
    pub namespaces: Namespaces,
    pub expiry: u64,
    #[serde(
        rename = "sessionProperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session_properties: Option<HashMap<String, String>>,
    #[serde(
        rename = "scopedProperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub scoped_properties: Option<HashMap<String, String>>,
    #[serde(rename = "pairingTopic", default)]
    pub pairing_topic: Option<Topic>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRequestParams {
    pub request: SessionRequest,
    #[serde(rename = "chainId")]
    pub chain_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub method: String,
    pub params: Value,
    #[serde(
        rename = "expiryTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry_timestamp: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdateParams {
    pub namespaces: Namespaces,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionExtendParams {
    pub expiry: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEventParams {
    pub event: SessionEvent,
    #[serde(rename = "chainId")]
    pub chain_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub name: String,
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionDeleteParams {
    pub code: i64,
    pub message: String,
}

pub type PairingDeleteParams = SessionDeleteParams;

/// Tag attached by the relay to every published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum IrnTag {
    PairingDelete = 1000,
    PairingDeleteResponse = 1001,
    PairingPing = 1002,
    PairingPingResponse = 1003,

    SessionPropose = 1100,
    SessionProposeApproveResponse = 1101,
    SessionProposeRejectResponse = 1120,
    SessionSettle = 1102,
    SessionSettleResponse = 1103,
    SessionUpdate = 1104,
    SessionUpdateResponse = 1105,
    SessionExtend = 1106,
    SessionExtendResponse = 1107,
    SessionRequest = 1108,
    SessionRequestResponse = 1109,
    SessionEvent = 1110,
    SessionEventResponse = 1111,
    SessionDelete = 1112,
    SessionDeleteResponse = 1113,
    SessionPing = 1114,
    SessionPingResponse = 1115,

    NotifySubscribe = 4000,
    NotifySubscribeResponse = 4001,
    NotifyMessage = 4002,
    NotifyMessageResponse = 4003,
    NotifyDelete = 4004,
    NotifyDeleteResponse = 4005,
    NotifyUpdate = 4008,
    NotifyUpdateResponse = 4009,
    NotifyWatchSubscriptions = 4010,
    NotifyWatchSubscriptionsResponse = 4011,
    NotifySubscriptionsChanged = 4012,
    NotifySubscriptionsChangedResponse = 4013,
    NotifyGetNotifications = 4014,
    NotifyGetNotificationsResponse = 4015,

    UnsupportedMethod = 0,
}

impl IrnTag {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Relay routing metadata for one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrnParams {
    pub tag: IrnTag,
    pub ttl: u64,
    pub correlation_id: Option<RequestId>,
    pub prompt: bool,
}

impl IrnParams {
    pub fn new(tag: IrnTag, ttl: u64) -> Self {
        Self {
            tag,
            ttl,
            correlation_id: None,
            prompt: false,
        }
    }

    pub fn with_correlation_id(mut self, id: RequestId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }
}

// https://specs.walletconnect.com/2.0/specs/clients/sign/rpc-methods#methods
pub mod ttl {
    use super::*;

    pub const PAIRING_DELETE: u64 = DAY;
    pub const PAIRING_PING: u64 = THIRTY_SECONDS;
    pub const SESSION_PROPOSE: u64 = FIVE_MINUTES;
    pub const SESSION_SETTLE: u64 = FIVE_MINUTES;
    pub const SESSION_UPDATE: u64 = DAY;
    pub const SESSION_EXTEND: u64 = DAY;
    pub const SESSION_REQUEST: u64 = FIVE_MINUTES;
    pub const SESSION_EVENT: u64 = FIVE_MINUTES;
    pub const SESSION_DELETE: u64 = DAY;
    pub const SESSION_PING: u64 = THIRTY_SECONDS;
    pub const NOTIFY: u64 = MONTH;
    pub const NOTIFY_GET_NOTIFICATIONS: u64 = FIVE_MINUTES;
}

/// Message as delivered by the relay `irn_fetchMessages` / subscription
/// payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub topic: Topic,
    pub message: String,
    #[serde(default)]
    pub tag: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<bool>,
    #[serde(rename = "publishedAt")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<u64>,
    // TODO verify the attestation once the verify server client lands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
}

impl EncryptedMessage {
    pub fn new(topic: Topic, message: String, params: &IrnParams) -> Self {
        Self {
            topic,
            message,
            tag: params.tag.as_u16(),
            ttl: Some(params.ttl),
            prompt: Some(params.prompt),
            published_at: None,
            attestation: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FetchMessageResult {
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    pub messages: Vec<EncryptedMessage>,
}
