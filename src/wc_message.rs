use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    notify::types::{
        NotifyDeleteParams, NotifyGetNotificationsParams, NotifyMessageParams,
        NotifySubscribeParams, NotifySubscriptionsChangedParams,
        NotifyUpdateParams, NotifyWatchSubscriptionsParams,
    },
    rpc::{JsonRpcRequest, JsonRpcResponse, RequestId},
    types::{
        IrnParams, IrnTag, PairingDeleteParams, SessionDeleteParams,
        SessionEventParams, SessionExtendParams, SessionProposeParams,
        SessionRequestParams, SessionSettleParams, SessionUpdateParams, Topic,
        TransportType, ttl,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WcMethod {
    #[serde(rename = "wc_pairingDelete")]
    PairingDelete,

    #[serde(rename = "wc_pairingPing")]
    PairingPing,

    #[serde(rename = "wc_sessionPropose")]
    SessionPropose,

    #[serde(rename = "wc_sessionSettle")]
    SessionSettle,

    #[serde(rename = "wc_sessionUpdate")]
    SessionUpdate,

    #[serde(rename = "wc_sessionExtend")]
    SessionExtend,

    #[serde(rename = "wc_sessionRequest")]
    SessionRequest,

    #[serde(rename = "wc_sessionEvent")]
    SessionEvent,

    #[serde(rename = "wc_sessionDelete")]
    SessionDelete,

    #[serde(rename = "wc_sessionPing")]
    SessionPing,

    #[serde(rename = "wc_notifySubscribe")]
    NotifySubscribe,

    #[serde(rename = "wc_notifyMessage")]
    NotifyMessage,

    #[serde(rename = "wc_notifyDelete")]
    NotifyDelete,

    #[serde(rename = "wc_notifyUpdate")]
    NotifyUpdate,

    #[serde(rename = "wc_notifyWatchSubscriptions")]
    NotifyWatchSubscriptions,

    #[serde(rename = "wc_notifySubscriptionsChanged")]
    NotifySubscriptionsChanged,

    #[serde(rename = "wc_notifyGetNotifications")]
    NotifyGetNotifications,
}

impl Display for WcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_plain::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&name)
    }
}

impl FromStr for WcMethod {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_plain::from_str(s)
            .map_err(|e| Error::InternalError(format!("unknown method {s}: {e}")))
    }
}

impl WcMethod {
    pub fn is_notify(&self) -> bool {
        matches!(
            self,
            WcMethod::NotifySubscribe
                | WcMethod::NotifyMessage
                | WcMethod::NotifyDelete
                | WcMethod::NotifyUpdate
                | WcMethod::NotifyWatchSubscriptions
                | WcMethod::NotifySubscriptionsChanged
                | WcMethod::NotifyGetNotifications
        )
    }

    pub fn request_tag(&self) -> IrnTag {
        match self {
            WcMethod::PairingDelete => IrnTag::PairingDelete,
            WcMethod::PairingPing => IrnTag::PairingPing,
            WcMethod::SessionPropose => IrnTag::SessionPropose,
            WcMethod::SessionSettle => IrnTag::SessionSettle,
            WcMethod::SessionUpdate => IrnTag::SessionUpdate,
            WcMethod::SessionExtend => IrnTag::SessionExtend,
            WcMethod::SessionRequest => IrnTag::SessionRequest,
            WcMethod::SessionEvent => IrnTag::SessionEvent,
            WcMethod::SessionDelete => IrnTag::SessionDelete,
            WcMethod::SessionPing => IrnTag::SessionPing,
            WcMethod::NotifySubscribe => IrnTag::NotifySubscribe,
            WcMethod::NotifyMessage => IrnTag::NotifyMessage,
            WcMethod::NotifyDelete => IrnTag::NotifyDelete,
            WcMethod::NotifyUpdate => IrnTag::NotifyUpdate,
            WcMethod::NotifyWatchSubscriptions => {
                IrnTag::NotifyWatchSubscriptions
            }
            WcMethod::NotifySubscriptionsChanged => {
                IrnTag::NotifySubscriptionsChanged
            }
            WcMethod::NotifyGetNotifications => IrnTag::NotifyGetNotifications,
        }
    }

    /// Tag for the response to this method. A rejected proposal carries its
    /// own tag.
    pub fn response_tag(&self, is_error: bool) -> IrnTag {
        match self {
            WcMethod::PairingDelete => IrnTag::PairingDeleteResponse,
            WcMethod::PairingPing => IrnTag::PairingPingResponse,
            WcMethod::SessionPropose if is_error => {
                IrnTag::SessionProposeRejectResponse
            }
            WcMethod::SessionPropose => IrnTag::SessionProposeApproveResponse,
            WcMethod::SessionSettle => IrnTag::SessionSettleResponse,
            WcMethod::SessionUpdate => IrnTag::SessionUpdateResponse,
            WcMethod::SessionExtend => IrnTag::SessionExtendResponse,
            WcMethod::SessionRequest => IrnTag::SessionRequestResponse,
            WcMethod::SessionEvent => IrnTag::SessionEventResponse,
            WcMethod::SessionDelete => IrnTag::SessionDeleteResponse,
            WcMethod::SessionPing => IrnTag::SessionPingResponse,
            WcMethod::NotifySubscribe => IrnTag::NotifySubscribeResponse,
            WcMethod::NotifyMessage => IrnTag::NotifyMessageResponse,
            WcMethod::NotifyDelete => IrnTag::NotifyDeleteResponse,
            WcMethod::NotifyUpdate => IrnTag::NotifyUpdateResponse,
            WcMethod::NotifyWatchSubscriptions => {
                IrnTag::NotifyWatchSubscriptionsResponse
            }
            WcMethod::NotifySubscriptionsChanged => {
                IrnTag::NotifySubscriptionsChangedResponse
            }
            WcMethod::NotifyGetNotifications => {
                IrnTag::NotifyGetNotificationsResponse
            }
        }
    }

    // Responses share the ttl of their request
    pub fn ttl(&self) -> u64 {
        match self {
            WcMethod::PairingDelete => ttl::PAIRING_DELETE,
            WcMethod::PairingPing => ttl::PAIRING_PING,
            WcMethod::SessionPropose => ttl::SESSION_PROPOSE,
            WcMethod::SessionSettle => ttl::SESSION_SETTLE,
            WcMethod::SessionUpdate => ttl::SESSION_UPDATE,
            WcMethod::SessionExtend => ttl::SESSION_EXTEND,
            WcMethod::SessionRequest => ttl::SESSION_REQUEST,
            WcMethod::SessionEvent => ttl::SESSION_EVENT,
            WcMethod::SessionDelete => ttl::SESSION_DELETE,
            WcMethod::SessionPing => ttl::SESSION_PING,
            WcMethod::NotifyGetNotifications => ttl::NOTIFY_GET_NOTIFICATIONS,
            WcMethod::NotifySubscribe
            | WcMethod::NotifyMessage
            | WcMethod::NotifyDelete
            | WcMethod::NotifyUpdate
            | WcMethod::NotifyWatchSubscriptions
            | WcMethod::NotifySubscriptionsChanged => ttl::NOTIFY,
        }
    }

    pub fn request_params(&self) -> IrnParams {
        IrnParams::new(self.request_tag(), self.ttl())
            .with_prompt(matches!(
                self,
                WcMethod::SessionPropose | WcMethod::SessionRequest
            ))
    }

    pub fn response_params(&self, is_error: bool) -> IrnParams {
        IrnParams::new(self.response_tag(is_error), self.ttl())
    }
}

/// Typed params of a request, decoded by method.
#[derive(Clone, Debug, PartialEq)]
pub enum WcParams {
    PairingDelete(PairingDeleteParams),
    PairingPing,
    SessionPropose(SessionProposeParams),
    SessionSettle(SessionSettleParams),
    SessionUpdate(SessionUpdateParams),
    SessionExtend(SessionExtendParams),
    SessionRequest(SessionRequestParams),
    SessionEvent(SessionEventParams),
    SessionDelete(SessionDeleteParams),
    SessionPing,
    NotifySubscribe(NotifySubscribeParams),
    NotifyMessage(NotifyMessageParams),
    NotifyDelete(NotifyDeleteParams),
    NotifyUpdate(NotifyUpdateParams),
    NotifyWatchSubscriptions(NotifyWatchSubscriptionsParams),
    NotifySubscriptionsChanged(NotifySubscriptionsChangedParams),
    NotifyGetNotifications(NotifyGetNotificationsParams),
}

impl WcParams {
    pub fn decode(method: WcMethod, params: &Value) -> Result<Self> {
        fn typed<T: serde::de::DeserializeOwned>(params: &Value) -> Result<T> {
            Ok(serde_json::from_value::<T>(params.clone())?)
        }

        Ok(match method {
            WcMethod::PairingDelete => WcParams::PairingDelete(typed(params)?),
            WcMethod::PairingPing => WcParams::PairingPing,
            WcMethod::SessionPropose => WcParams::SessionPropose(typed(params)?),
            WcMethod::SessionSettle => WcParams::SessionSettle(typed(params)?),
            WcMethod::SessionUpdate => WcParams::SessionUpdate(typed(params)?),
            WcMethod::SessionExtend => WcParams::SessionExtend(typed(params)?),
            WcMethod::SessionRequest => WcParams::SessionRequest(typed(params)?),
            WcMethod::SessionEvent => WcParams::SessionEvent(typed(params)?),
            WcMethod::SessionDelete => WcParams::SessionDelete(typed(params)?),
            WcMethod::SessionPing => WcParams::SessionPing,
            WcMethod::NotifySubscribe => {
                WcParams::NotifySubscribe(typed(params)?)
            }
            WcMethod::NotifyMessage => WcParams::NotifyMessage(typed(params)?),
            WcMethod::NotifyDelete => WcParams::NotifyDelete(typed(params)?),
            WcMethod::NotifyUpdate => WcParams::NotifyUpdate(typed(params)?),
            WcMethod::NotifyWatchSubscriptions => {
                WcParams::NotifyWatchSubscriptions(typed(params)?)
            }
            WcMethod::NotifySubscriptionsChanged => {
                WcParams::NotifySubscriptionsChanged(typed(params)?)
            }
            WcMethod::NotifyGetNotifications => {
                WcParams::NotifyGetNotifications(typed(params)?)
            }
        })
    }

    pub fn method(&self) -> WcMethod {
        match self {
            WcParams::PairingDelete(_) => WcMethod::PairingDelete,
            WcParams::PairingPing => WcMethod::PairingPing,
            WcParams::SessionPropose(_) => WcMethod::SessionPropose,
            WcParams::SessionSettle(_) => WcMethod::SessionSettle,
            WcParams::SessionUpdate(_) => WcMethod::SessionUpdate,
            WcParams::SessionExtend(_) => WcMethod::SessionExtend,
            WcParams::SessionRequest(_) => WcMethod::SessionRequest,
            WcParams::SessionEvent(_) => WcMethod::SessionEvent,
            WcParams::SessionDelete(_) => WcMethod::SessionDelete,
            WcParams::SessionPing => WcMethod::SessionPing,
            WcParams::NotifySubscribe(_) => WcMethod::NotifySubscribe,
            WcParams::NotifyMessage(_) => WcMethod::NotifyMessage,
            WcParams::NotifyDelete(_) => WcMethod::NotifyDelete,
            WcParams::NotifyUpdate(_) => WcMethod::NotifyUpdate,
            WcParams::NotifyWatchSubscriptions(_) => {
                WcMethod::NotifyWatchSubscriptions
            }
            WcParams::NotifySubscriptionsChanged(_) => {
                WcMethod::NotifySubscriptionsChanged
            }
            WcParams::NotifyGetNotifications(_) => {
                WcMethod::NotifyGetNotifications
            }
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(match self {
            WcParams::PairingDelete(p) => serde_json::to_value(p)?,
            WcParams::PairingPing | WcParams::SessionPing => {
                Value::Object(Default::default())
            }
            WcParams::SessionPropose(p) => serde_json::to_value(p)?,
            WcParams::SessionSettle(p) => serde_json::to_value(p)?,
            WcParams::SessionUpdate(p) => serde_json::to_value(p)?,
            WcParams::SessionExtend(p) => serde_json::to_value(p)?,
            WcParams::SessionRequest(p) => serde_json::to_value(p)?,
            WcParams::SessionEvent(p) => serde_json::to_value(p)?,
            WcParams::SessionDelete(p) => serde_json::to_value(p)?,
            WcParams::NotifySubscribe(p) => serde_json::to_value(p)?,
            WcParams::NotifyMessage(p) => serde_json::to_value(p)?,
            WcParams::NotifyDelete(p) => serde_json::to_value(p)?,
            WcParams::NotifyUpdate(p) => serde_json::to_value(p)?,
            WcParams::NotifyWatchSubscriptions(p) => serde_json::to_value(p)?,
            WcParams::NotifySubscriptionsChanged(p) => {
                serde_json::to_value(p)?
            }
            WcParams::NotifyGetNotifications(p) => serde_json::to_value(p)?,
        })
    }

    pub fn into_request(self) -> Result<JsonRpcRequest> {
        Ok(JsonRpcRequest::new(self.method(), self.to_value()?))
    }
}

/// Request received from a peer.
#[derive(Clone, Debug, PartialEq)]
pub struct WcRequest {
    pub topic: Topic,
    pub id: RequestId,
    pub method: String,
    pub params: Value,
    pub transport_type: TransportType,
}

impl WcRequest {
    pub fn wc_method(&self) -> Result<WcMethod> {
        WcMethod::from_str(&self.method)
    }

    pub fn decode(&self) -> Result<WcParams> {
        WcParams::decode(self.wc_method()?, &self.params)
    }
}

impl Display for WcRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} on {}", self.method, self.id, self.topic)
    }
}

/// Response received from a peer, joined with the request it answers.
#[derive(Clone, Debug, PartialEq)]
pub struct WcResponse {
    pub topic: Topic,
    pub method: String,
    /// Params of the original request.
    pub params: Value,
    pub response: JsonRpcResponse,
    pub transport_type: TransportType,
}

impl WcResponse {
    pub fn id(&self) -> RequestId {
        self.response.id()
    }

    pub fn wc_method(&self) -> Result<WcMethod> {
        WcMethod::from_str(&self.method)
    }

    pub fn request_params(&self) -> Result<WcParams> {
        WcParams::decode(self.wc_method()?, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::JsonRpcMessage;

    #[test]
    fn test_method_names() {
        assert_eq!(WcMethod::SessionPropose.to_string(), "wc_sessionPropose");
        assert_eq!(
            WcMethod::from_str("wc_notifyWatchSubscriptions").unwrap(),
            WcMethod::NotifyWatchSubscriptions
        );
        assert!(WcMethod::from_str("wc_sessionAuthenticate").is_err());
    }

    #[test]
    fn test_tags_and_ttls() {
        assert_eq!(WcMethod::SessionPropose.response_tag(false).as_u16(), 1101);
        assert_eq!(WcMethod::SessionPropose.response_tag(true).as_u16(), 1120);
        assert_eq!(WcMethod::SessionRequest.response_tag(true).as_u16(), 1109);
        assert_eq!(WcMethod::SessionPing.ttl(), 30);
        assert_eq!(WcMethod::SessionDelete.ttl(), 86400);
        assert_eq!(WcMethod::NotifySubscribe.ttl(), 2592000);
        assert_eq!(WcMethod::NotifyGetNotifications.ttl(), 300);
        assert!(WcMethod::SessionRequest.request_params().prompt);
        assert!(!WcMethod::SessionPing.request_params().prompt);
    }

    #[test]
    fn test_decode_wc_session_propose() {
        let req = "{\"id\":1743510684985756,\"jsonrpc\":\"2.0\",\"method\":\"wc_sessionPropose\",\"params\":{\"requiredNamespaces\":{},\"optionalNamespaces\":{\"eip155\":{\"chains\":[\"eip155:137\",\"eip155:1\",\"eip155:10\",\"eip155:324\",\"eip155:42161\",\"eip155:8453\",\"eip155:84532\",\"eip155:1301\",\"eip155:80094\",\"eip155:11155111\",\"eip155:100\",\"eip155:295\",\"eip155:1313161554\",\"eip155:5000\"],\"methods\":[\"personal_sign\",\"eth_accounts\",\"eth_requestAccounts\",\"eth_sendRawTransaction\",\"eth_sendTransaction\",\"eth_sign\",\"eth_signTransaction\",\"eth_signTypedData\",\"eth_signTypedData_v3\",\"eth_signTypedData_v4\",\"wallet_addEthereumChain\",\"wallet_getAssets\",\"wallet_getCallsStatus\",\"wallet_getCapabilities\",\"wallet_getPermissions\",\"wallet_grantPermissions\",\"wallet_registerOnboarding\",\"wallet_requestPermissions\",\"wallet_revokePermissions\",\"wallet_scanQRCode\",\"wallet_sendCalls\",\"wallet_switchEthereumChain\",\"wallet_watchAsset\"],\"events\":[\"chainChanged\",\"accountsChanged\"]}},\"relays\":[{\"protocol\":\"irn\"}],\"pairingTopic\":\"d0bb3bf179a70fd10245144ac7355c52a767806c9b2d852b99fc7be935934882\",\"proposer\":{\"publicKey\":\"04f1c07b7205c273b6af5b85ac267cbe28c22d036873ffe4621abc4d9213430e\",\"metadata\":{\"name\":\"AppKit Lab\",\"description\":\"AppKit Lab is the test environment for Reown's AppKit\",\"url\":\"https://appkit-lab.reown.com\",\"icons\":[\"https://appkit-lab.reown.com/favicon.svg\"]}},\"expiryTimestamp\":1743510984,\"id\":1743510684985756}}";

        let request = match serde_json::from_str::<JsonRpcMessage>(req).unwrap() {
            JsonRpcMessage::Request(r) => r,
            other => panic!("expected request, got {other:?}"),
        };
        let request = WcRequest {
            topic: Topic::from("d0bb3bf179a70fd10245144ac7355c52a767806c9b2d852b99fc7be935934882"),
            id: request.id,
            method: request.method,
            params: request.params,
            transport_type: TransportType::Relay,
        };

        assert_eq!(request.id, RequestId(1743510684985756));
        assert_eq!(request.wc_method().unwrap(), WcMethod::SessionPropose);
        let WcParams::SessionPropose(params) = request.decode().unwrap() else {
            panic!("expected session propose");
        };
        assert_eq!(
            params.pairing_topic,
            Some(Topic::from(
                "d0bb3bf179a70fd10245144ac7355c52a767806c9b2d852b99fc7be935934882"
            ))
        );
        assert_eq!(
            params.proposer.public_key,
            "04f1c07b7205c273b6af5b85ac267cbe28c22d036873ffe4621abc4d9213430e"
        )
    }

    #[test]
    fn test_ping_params_are_empty_object() {
        let request = WcParams::SessionPing.into_request().unwrap();
        assert_eq!(request.method, "wc_sessionPing");
        assert_eq!(request.params, serde_json::json!({}));
    }
}
