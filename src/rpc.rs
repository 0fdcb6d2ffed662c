//! JSON-RPC 2.0 envelopes exchanged with peers through the relay.

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

static LAST_REQUEST_ID: AtomicI64 = AtomicI64::new(0);

/// Request id. The high digits carry the unix time in milliseconds at which
/// the id was generated, the last three digits are random. Ids generated by
/// one process are strictly increasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl RequestId {
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let extra: i64 = rand::thread_rng().gen_range(0..1000);
        let candidate = millis * 1000 + extra;

        let previous = LAST_REQUEST_ID
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        RequestId(candidate.max(previous + 1))
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.0 / 1000
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId(value)
    }
}

// Some peers send ids as strings
impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            String(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(RequestId(n)),
            Raw::String(s) => s
                .parse::<i64>()
                .map(RequestId)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub id: RequestId,
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Display, params: Value) -> Self {
        Self::with_id(RequestId::generate(), method, params)
    }

    pub fn with_id(id: RequestId, method: impl Display, params: Value) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResult {
    pub id: RequestId,
    pub jsonrpc: String,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub id: RequestId,
    pub jsonrpc: String,
    pub error: JsonRpcErrorObject,
}

/// A JSON-RPC error object (code, message, and optional data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl JsonRpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Error codes of the Sign protocol, plus the JSON-RPC invalid params code.
pub mod codes {
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INVALID_METHOD: i64 = 1001;
    pub const INVALID_EVENT: i64 = 1002;
    pub const INVALID_UPDATE_REQUEST: i64 = 1003;
    pub const INVALID_EXTEND_REQUEST: i64 = 1004;
    pub const INVALID_SESSION_SETTLE_REQUEST: i64 = 1005;
    pub const UNAUTHORIZED_METHOD: i64 = 3001;
    pub const UNAUTHORIZED_EVENT: i64 = 3002;
    pub const UNAUTHORIZED_UPDATE_REQUEST: i64 = 3003;
    pub const UNAUTHORIZED_EXTEND_REQUEST: i64 = 3004;
    pub const USER_REJECTED: i64 = 5000;
    pub const UNSUPPORTED_CHAINS: i64 = 5100;
    pub const UNSUPPORTED_NAMESPACE_KEY: i64 = 5104;
    pub const USER_DISCONNECTED: i64 = 6000;
    pub const SESSION_SETTLEMENT_FAILED: i64 = 7000;
    pub const NO_SESSION_FOR_TOPIC: i64 = 7001;
    pub const SESSION_REQUEST_EXPIRED: i64 = 8000;
}

/// Response to a request, correlated by the request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponse {
    // Error goes first, a result object never carries an `error` field
    Error(JsonRpcError),
    Result(JsonRpcResult),
}

impl JsonRpcResponse {
    pub fn result(id: RequestId, result: Value) -> Self {
        JsonRpcResponse::Result(JsonRpcResult {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
        })
    }

    pub fn error(id: RequestId, error: JsonRpcErrorObject) -> Self {
        JsonRpcResponse::Error(JsonRpcError {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            error,
        })
    }

    pub fn id(&self) -> RequestId {
        match self {
            JsonRpcResponse::Result(r) => r.id,
            JsonRpcResponse::Error(e) => e.id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JsonRpcResponse::Error(_))
    }
}

/// Anything that can arrive on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}
