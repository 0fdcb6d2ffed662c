use std::fmt::{self, Display};
use std::time::Duration;

use crate::rpc::{JsonRpcErrorObject, RequestId};
use crate::types::Topic;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    RelayProtocolNotMentioned,
    InvalidUri,
    SymKeyNotMentioned,
    PathEndNotFound,
    InvalidProjectId,
    NoInternetConnection,
    /// Relay unreachable or the relay rejected the call.
    Relay(String),
    Encryption(String),
    Decryption(String),
    /// The peer answered with a JSON-RPC error.
    Peer(JsonRpcErrorObject),
    Timeout {
        request_id: RequestId,
        after: Duration,
    },
    NoSequence(Topic),
    PairingAlreadyExists(Topic),
    ProposalNotFound(String),
    ProposalExpired(String),
    SessionNotAcknowledged(Topic),
    NotController(Topic),
    UnauthorizedChain(String),
    UnauthorizedMethod(String),
    UnauthorizedEvent(String),
    InvalidNamespaces(String),
    InvalidExpiry(u64),
    RequestExpired(RequestId),
    InvalidAccount(String),
    AccountNotRegistered(String),
    InvalidJwt(String),
    Unregister {
        step: &'static str,
        source: Box<Error>,
    },
    Storage(String),
    InternalError(String),
    ParseInt(std::num::ParseIntError),
    SerdeJsonError(serde_json::Error),
    FromHexError(alloy::hex::FromHexError),
    Base64Error(base64ct::Error),
    Url(url::ParseError),
    Reqwest(reqwest::Error),
    FromUtf8Error(std::string::FromUtf8Error),
    FmtError(std::fmt::Error),
    SignatureError(ed25519_dalek::SignatureError),
    TimeError(time::error::Format),
    SystemTimeError(std::time::SystemTimeError),
    Anyhow(anyhow::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RelayProtocolNotMentioned => {
                write!(f, "pairing uri has no relay-protocol")
            }
            Error::InvalidUri => write!(f, "invalid pairing uri"),
            Error::SymKeyNotMentioned => write!(f, "pairing uri has no symKey"),
            Error::PathEndNotFound => write!(f, "pairing uri has no query"),
            Error::InvalidProjectId => write!(f, "project id must not be empty"),
            Error::NoInternetConnection => write!(f, "no internet connection"),
            Error::Relay(e) => write!(f, "relay error: {e}"),
            Error::Encryption(e) => write!(f, "encryption error: {e}"),
            Error::Decryption(e) => write!(f, "decryption error: {e}"),
            Error::Peer(e) => write!(f, "peer error {}: {}", e.code, e.message),
            Error::Timeout { request_id, after } => {
                write!(f, "request {request_id} timed out after {after:?}")
            }
            Error::NoSequence(topic) => write!(f, "no sequence for topic {topic}"),
            Error::PairingAlreadyExists(topic) => {
                write!(f, "pairing {topic} already exists")
            }
            Error::ProposalNotFound(key) => {
                write!(f, "no proposal for proposer {key}")
            }
            Error::ProposalExpired(key) => {
                write!(f, "proposal from {key} has expired")
            }
            Error::SessionNotAcknowledged(topic) => {
                write!(f, "session {topic} is not acknowledged")
            }
            Error::NotController(topic) => {
                write!(f, "not the controller of session {topic}")
            }
            Error::UnauthorizedChain(chain) => {
                write!(f, "chain {chain} is not authorized")
            }
            Error::UnauthorizedMethod(method) => {
                write!(f, "method {method} is not authorized")
            }
            Error::UnauthorizedEvent(event) => {
                write!(f, "event {event} is not authorized")
            }
            Error::InvalidNamespaces(e) => write!(f, "invalid namespaces: {e}"),
            Error::InvalidExpiry(expiry) => write!(f, "invalid expiry {expiry}"),
            Error::RequestExpired(id) => write!(f, "request {id} has expired"),
            Error::InvalidAccount(account) => {
                write!(f, "invalid account {account}")
            }
            Error::AccountNotRegistered(account) => {
                write!(f, "account {account} is not registered")
            }
            Error::InvalidJwt(e) => write!(f, "invalid jwt: {e}"),
            Error::Unregister { step, source } => {
                write!(f, "unregister failed at {step}: {source}")
            }
            Error::Storage(e) => write!(f, "storage error: {e}"),
            Error::InternalError(e) => write!(f, "{e}"),
            Error::ParseInt(e) => write!(f, "{e}"),
            Error::SerdeJsonError(e) => write!(f, "{e}"),
            Error::FromHexError(e) => write!(f, "{e}"),
            Error::Base64Error(e) => write!(f, "{e}"),
            Error::Url(e) => write!(f, "{e}"),
            Error::Reqwest(e) => write!(f, "{e}"),
            Error::FromUtf8Error(e) => write!(f, "{e}"),
            Error::FmtError(e) => write!(f, "{e}"),
            Error::SignatureError(e) => write!(f, "{e}"),
            Error::TimeError(e) => write!(f, "{e}"),
            Error::SystemTimeError(e) => write!(f, "{e}"),
            Error::Anyhow(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::InternalError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::InternalError(e)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Error::ParseInt(e)
    }
}

impl From<JsonRpcErrorObject> for Error {
    fn from(e: JsonRpcErrorObject) -> Self {
        Error::Peer(e)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Anyhow(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Reqwest(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerdeJsonError(e)
    }
}

impl From<alloy::hex::FromHexError> for Error {
    fn from(e: alloy::hex::FromHexError) -> Self {
        Error::FromHexError(e)
    }
}

impl From<base64ct::Error> for Error {
    fn from(e: base64ct::Error) -> Self {
        Error::Base64Error(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Url(e)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Error::FromUtf8Error(e)
    }
}

impl From<std::fmt::Error> for Error {
    fn from(e: std::fmt::Error) -> Self {
        Error::FmtError(e)
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        Error::SignatureError(e)
    }
}

impl From<time::error::Format> for Error {
    fn from(e: time::error::Format) -> Self {
        Error::TimeError(e)
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(e: std::time::SystemTimeError) -> Self {
        Error::SystemTimeError(e)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::Storage(e.to_string())
    }
}
