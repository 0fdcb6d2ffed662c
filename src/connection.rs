use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::relay::{RelayConnection, RelayEvent, check_subscription_ids};
use crate::relay_auth::RelayAuth;
use crate::rpc::{JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::types::{FetchMessageResult, IrnParams, Topic};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum RelayMethod {
    #[serde(rename = "irn_publish")]
    Publish,

    #[serde(rename = "irn_subscribe")]
    Subscribe,

    #[serde(rename = "irn_batchSubscribe")]
    BatchSubscribe,

    #[serde(rename = "irn_unsubscribe")]
    Unsubscribe,

    #[serde(rename = "irn_fetchMessages")]
    FetchMessages,

    #[serde(rename = "wc_proposeSession")]
    ProposeSession,

    #[serde(rename = "wc_approveSession")]
    ApproveSession,
}

impl Display for RelayMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_plain::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(&name)
    }
}

pub fn publish_params(topic: &Topic, message: &str, params: &IrnParams) -> Value {
    let mut value = json!({
        "topic": topic,
        "message": message,
        "ttl": params.ttl,
        "tag": params.tag.as_u16(),
        "prompt": params.prompt,
    });
    if let Some(correlation_id) = params.correlation_id {
        value["correlationId"] = json!(correlation_id);
    }
    value
}

/// Relay client over the HTTP JSON-RPC endpoint. Inbound messages are
/// polled with `irn_fetchMessages`.
pub struct HttpRelayConnection {
    client: Client,
    rpc: String,
    jwt: String,
    project_id: String,
    subscriptions: Mutex<HashMap<Topic, String>>,
    connected: AtomicBool,
    events: broadcast::Sender<RelayEvent>,
    resubscribe: broadcast::Sender<()>,
}

impl HttpRelayConnection {
    pub fn new(
        rpc: &str,
        jwt_audience: &str,
        client_seed: [u8; 32],
        project_id: &str,
    ) -> Result<Self> {
        if project_id.is_empty() {
            return Err(Error::InvalidProjectId);
        }

        let jwt = RelayAuth::new(client_seed).sign_jwt(jwt_audience)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (resubscribe, _) = broadcast::channel(16);

        Ok(Self {
            client: Client::new(),
            rpc: rpc.to_string(),
            jwt,
            project_id: project_id.to_string(),
            subscriptions: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            events,
            resubscribe,
        })
    }

    async fn request(&self, method: RelayMethod, params: Value) -> Result<Value> {
        let rpc_request = JsonRpcRequest::new(method, params);
        log::trace!("relay request: {rpc_request:?}");

        let response = self
            .client
            .post(&self.rpc)
            .query(&[("projectId", &self.project_id)])
            .bearer_auth(&self.jwt)
            .json(&rpc_request)
            .send()
            .await
            .map_err(|e| Error::Relay(e.to_string()))?
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| Error::Relay(e.to_string()))?;

        match response {
            JsonRpcResponse::Result(r) => Ok(r.result),
            JsonRpcResponse::Error(e) => Err(Error::Relay(format!(
                "{method} failed with {}: {}",
                e.error.code, e.error.message
            ))),
        }
    }

    pub async fn fetch_messages(&self, topic: &Topic) -> Result<FetchMessageResult> {
        let result = self
            .request(RelayMethod::FetchMessages, json!({ "topic": topic }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Drains every subscribed topic once and broadcasts what arrived.
    pub async fn poll_once(&self) -> Result<usize> {
        let subscriptions: Vec<(Topic, String)> = self
            .subscriptions
            .lock()?
            .iter()
            .map(|(t, id)| (t.clone(), id.clone()))
            .collect();

        let mut delivered = 0;
        for (topic, subscription_id) in subscriptions {
            loop {
                let result = self.fetch_messages(&topic).await?;
                for message in result.messages {
                    delivered += 1;
                    // No receivers is fine, nobody is listening yet
                    let _ = self.events.send(RelayEvent {
                        subscription_id: subscription_id.clone(),
                        topic: message.topic,
                        message: message.message,
                        published_at: message.published_at.unwrap_or_default(),
                        tag: message.tag,
                    });
                }
                if !result.has_more {
                    break;
                }
            }
        }
        Ok(delivered)
    }

    fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if connected && !was {
            log::info!("relay reachable again, requesting resubscribe");
            let _ = self.resubscribe.send(());
        } else if !connected && was {
            log::warn!("relay unreachable");
        }
    }

    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match this.poll_once().await {
                    Ok(delivered) => {
                        this.set_connected(true);
                        if delivered > 0 {
                            log::debug!("fetched {delivered} messages");
                        }
                    }
                    Err(e) => {
                        log::debug!("polling failed: {e}");
                        this.set_connected(false);
                    }
                }
                tokio::time::sleep(interval).await;
            }
        })
    }
}

#[async_trait]
impl RelayConnection for HttpRelayConnection {
    async fn publish(
        &self,
        topic: &Topic,
        message: &str,
        params: &IrnParams,
    ) -> Result<()> {
        self.request(RelayMethod::Publish, publish_params(topic, message, params))
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<String> {
        let result = self
            .request(RelayMethod::Subscribe, json!({ "topic": topic }))
            .await?;
        let id: String = serde_json::from_value(result)?;
        self.subscriptions.lock()?.insert(topic.clone(), id.clone());
        Ok(id)
    }

    async fn batch_subscribe(&self, topics: &[Topic]) -> Result<Vec<String>> {
        let result = self
            .request(RelayMethod::BatchSubscribe, json!({ "topics": topics }))
            .await?;
        let ids: Vec<String> = serde_json::from_value(result)?;
        check_subscription_ids(topics, &ids)?;

        let mut subscriptions = self.subscriptions.lock()?;
        for (topic, id) in topics.iter().zip(ids.iter()) {
            subscriptions.insert(topic.clone(), id.clone());
        }
        Ok(ids)
    }

    async fn unsubscribe(&self, topic: &Topic) -> Result<()> {
        let id = self.subscriptions.lock()?.get(topic).cloned();
        let mut params = json!({ "topic": topic });
        if let Some(id) = id {
            params["id"] = json!(id);
        }
        self.request(RelayMethod::Unsubscribe, params).await?;
        self.subscriptions.lock()?.remove(topic);
        Ok(())
    }

    async fn propose_session(
        &self,
        pairing_topic: &Topic,
        session_proposal: &str,
        correlation_id: RequestId,
    ) -> Result<()> {
        self.request(
            RelayMethod::ProposeSession,
            json!({
                "pairingTopic": pairing_topic,
                "sessionProposal": session_proposal,
                "correlationId": correlation_id,
            }),
        )
        .await?;
        Ok(())
    }

    async fn approve_session(
        &self,
        pairing_topic: &Topic,
        session_topic: &Topic,
        session_proposal_response: &str,
        session_settlement_request: &str,
        correlation_id: RequestId,
    ) -> Result<()> {
        self.request(
            RelayMethod::ApproveSession,
            json!({
                "pairingTopic": pairing_topic,
                "sessionTopic": session_topic,
                "sessionProposalResponse": session_proposal_response,
                "sessionSettlementRequest": session_settlement_request,
                "correlationId": correlation_id,
            }),
        )
        .await?;
        Ok(())
    }

    fn subscription_events(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    fn resubscribe_events(&self) -> broadcast::Receiver<()> {
        self.resubscribe.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IrnTag;

    #[test]
    fn test_method_names() {
        assert_eq!(RelayMethod::Publish.to_string(), "irn_publish");
        assert_eq!(RelayMethod::BatchSubscribe.to_string(), "irn_batchSubscribe");
        assert_eq!(RelayMethod::ApproveSession.to_string(), "wc_approveSession");
    }

    #[test]
    fn test_publish_params() {
        let params = IrnParams::new(IrnTag::SessionRequestResponse, 300)
            .with_correlation_id(RequestId(42));
        let value = publish_params(
            &Topic::from("399de3bd2499b8fe10647e3c3ce4bb96d6fa1db18ee6f3fec4042167509e0a49"),
            "AAAA",
            &params,
        );
        assert_eq!(
            value,
            json!({
                "topic": "399de3bd2499b8fe10647e3c3ce4bb96d6fa1db18ee6f3fec4042167509e0a49",
                "message": "AAAA",
                "ttl": 300,
                "prompt": false,
                "tag": 1109,
                "correlationId": 42
            })
        );
    }

    #[test]
    fn test_empty_project_id() {
        let result = HttpRelayConnection::new(
            "https://relay.walletconnect.org/rpc",
            "https://relay.walletconnect.org",
            [0; 32],
            "",
        );
        assert!(matches!(result, Err(Error::InvalidProjectId)));
    }

    #[tokio::test]
    async fn test_resubscribe_on_reconnect() {
        let conn = HttpRelayConnection::new(
            "https://relay.walletconnect.org/rpc",
            "https://relay.walletconnect.org",
            [0; 32],
            "35d44d49c2dee217a3eb24bb4410acc7",
        )
        .unwrap();
        let mut ticks = conn.resubscribe_events();

        conn.set_connected(true);
        assert!(ticks.try_recv().is_err());

        conn.set_connected(false);
        conn.set_connected(true);
        assert!(ticks.try_recv().is_ok());
    }
}
