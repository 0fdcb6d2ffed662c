//! Transport seams the interactor is built on.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::rpc::RequestId;
use crate::types::{IrnParams, Topic};

/// Message delivered by the relay on a subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEvent {
    pub subscription_id: String,
    pub topic: Topic,
    /// Encoded envelope.
    pub message: String,
    pub published_at: u64,
    pub tag: u16,
}

/// Physical relay transport.
#[async_trait]
pub trait RelayConnection: Send + Sync {
    async fn publish(
        &self,
        topic: &Topic,
        message: &str,
        params: &IrnParams,
    ) -> Result<()>;

    /// Returns the relay subscription id.
    async fn subscribe(&self, topic: &Topic) -> Result<String>;

    /// Returns one subscription id per topic.
    async fn batch_subscribe(&self, topics: &[Topic]) -> Result<Vec<String>>;

    async fn unsubscribe(&self, topic: &Topic) -> Result<()>;

    /// Publishes a session proposal on the pairing topic.
    async fn propose_session(
        &self,
        pairing_topic: &Topic,
        session_proposal: &str,
        correlation_id: RequestId,
    ) -> Result<()>;

    /// Publishes the proposal response on the pairing topic and the settle
    /// request on the session topic in one call.
    async fn approve_session(
        &self,
        pairing_topic: &Topic,
        session_topic: &Topic,
        session_proposal_response: &str,
        session_settlement_request: &str,
        correlation_id: RequestId,
    ) -> Result<()>;

    fn subscription_events(&self) -> broadcast::Receiver<RelayEvent>;

    /// Ticks every time the transport reconnects.
    fn resubscribe_events(&self) -> broadcast::Receiver<()>;
}

/// Connectivity hook consulted before every publish and subscribe.
pub trait NetworkState: Send + Sync {
    fn is_available(&self) -> bool;
}

pub struct AlwaysOnline;

impl NetworkState for AlwaysOnline {
    fn is_available(&self) -> bool {
        true
    }
}

/// Opens a peer universal link carrying an envelope, for link mode.
pub trait LinkModeOpener: Send + Sync {
    fn open(&self, universal_link: &str, topic: &Topic, envelope: &str) -> Result<()>;
}

/// Batch subscribe answers with one id per topic, in order.
pub(crate) fn check_subscription_ids(topics: &[Topic], ids: &[String]) -> Result<()> {
    if ids.len() != topics.len() {
        return Err(Error::Relay(format!(
            "relay returned {} subscription ids for {} topics",
            ids.len(),
            topics.len()
        )));
    }
    Ok(())
}
