//! Single choke point for outbound JSON-RPC traffic and inbound correlation.
//!
//! Every request goes through [`JsonRpcHistory::set_request`] before it is
//! encrypted and published, so a request that is already in flight is dropped
//! instead of being sent twice. Inbound envelopes are decrypted, recorded and
//! fanned out to engines on the `requests` and `responses` streams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::backoff::{ConditionalExponentialBackoffStrategy, OperationClass};
use crate::codec::{Codec, EncodingType, EnvelopeType};
use crate::constants::BATCH_SUBSCRIBE_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::history::JsonRpcHistory;
use crate::keys::KeyManagementRepository;
use crate::relay::{
    AlwaysOnline, LinkModeOpener, NetworkState, RelayConnection, RelayEvent,
    check_subscription_ids,
};
use crate::rpc::{
    JsonRpcErrorObject, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use crate::types::{IrnParams, IrnTag, Topic, TransportType};
use crate::wc_message::{WcRequest, WcResponse};

const STREAM_CAPACITY: usize = 1024;

/// Outcome of a request publish that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The relay acknowledged the publish.
    Acknowledged,
    /// A request with the same id is already in flight on the topic. Nothing
    /// was published.
    Dropped,
}

/// Inbound envelope that could not be handled.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractorError {
    pub topic: Topic,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingCorrelation {
    pub request_id: RequestId,
    pub topic: Topic,
    pub started_at: Instant,
}

/// Waits for the response to one request. Subscribe before publishing so the
/// response cannot slip past.
pub struct ResponseWaiter {
    correlation: PendingCorrelation,
    receiver: broadcast::Receiver<WcResponse>,
}

impl ResponseWaiter {
    pub fn correlation(&self) -> &PendingCorrelation {
        &self.correlation
    }

    /// Resolves with the response carrying our request id, whatever else
    /// arrives in between.
    pub async fn wait(mut self, timeout: Duration) -> Result<WcResponse> {
        let request_id = self.correlation.request_id;
        let topic = self.correlation.topic.clone();

        let result = tokio::time::timeout(timeout, async {
            loop {
                match self.receiver.recv().await {
                    Ok(response) => {
                        if response.id() == request_id && response.topic == topic {
                            return Ok(response);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("response waiter for {request_id} lagged by {skipped}");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        return Err(Error::Relay("response stream closed".to_string()));
                    }
                }
            }
        })
        .await;

        match result {
            Ok(response) => response,
            Err(_) => {
                log::debug!(
                    "request {request_id} on {topic} timed out after {:?}",
                    self.correlation.started_at.elapsed()
                );
                Err(Error::Timeout {
                    request_id,
                    after: timeout,
                })
            }
        }
    }
}

pub struct RelayJsonRpcInteractor {
    relay: Arc<dyn RelayConnection>,
    codec: Codec,
    history: Arc<JsonRpcHistory>,
    backoff: ConditionalExponentialBackoffStrategy,
    network: Arc<dyn NetworkState>,
    link_mode: Option<Arc<dyn LinkModeOpener>>,
    batch_size: usize,
    // topic -> relay subscription id
    subscriptions: Mutex<HashMap<Topic, String>>,
    requests: broadcast::Sender<WcRequest>,
    responses: broadcast::Sender<WcResponse>,
    internal_errors: broadcast::Sender<InteractorError>,
}

impl RelayJsonRpcInteractor {
    pub fn new(
        relay: Arc<dyn RelayConnection>,
        keys: Arc<dyn KeyManagementRepository>,
        history: Arc<JsonRpcHistory>,
    ) -> Self {
        let (requests, _) = broadcast::channel(STREAM_CAPACITY);
        let (responses, _) = broadcast::channel(STREAM_CAPACITY);
        let (internal_errors, _) = broadcast::channel(STREAM_CAPACITY);

        Self {
            relay,
            codec: Codec::new(keys),
            history,
            backoff: ConditionalExponentialBackoffStrategy::default(),
            network: Arc::new(AlwaysOnline),
            link_mode: None,
            batch_size: BATCH_SUBSCRIBE_CHUNK_SIZE,
            subscriptions: Mutex::new(HashMap::new()),
            requests,
            responses,
            internal_errors,
        }
    }

    pub fn with_backoff(mut self, backoff: ConditionalExponentialBackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_network_state(mut self, network: Arc<dyn NetworkState>) -> Self {
        self.network = network;
        self
    }

    pub fn with_link_mode_opener(mut self, opener: Arc<dyn LinkModeOpener>) -> Self {
        self.link_mode = Some(opener);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn keys(&self) -> &Arc<dyn KeyManagementRepository> {
        self.codec.keys()
    }

    pub fn history(&self) -> &Arc<JsonRpcHistory> {
        &self.history
    }

    pub fn backoff(&self) -> &ConditionalExponentialBackoffStrategy {
        &self.backoff
    }

    pub fn requests(&self) -> broadcast::Receiver<WcRequest> {
        self.requests.subscribe()
    }

    pub fn responses(&self) -> broadcast::Receiver<WcResponse> {
        self.responses.subscribe()
    }

    pub fn internal_errors(&self) -> broadcast::Receiver<InteractorError> {
        self.internal_errors.subscribe()
    }

    pub fn subscribed_topics(&self) -> Result<Vec<Topic>> {
        let mut topics: Vec<Topic> = self.subscriptions.lock()?.keys().cloned().collect();
        topics.sort();
        Ok(topics)
    }

    pub fn check_network_connectivity(&self) -> Result<()> {
        if self.network.is_available() {
            Ok(())
        } else {
            Err(Error::NoInternetConnection)
        }
    }

    async fn wait_for_backoff(&self, class: OperationClass) {
        if let Some(delay) = self.backoff.should_backoff(class) {
            log::debug!("backing off {class:?} for {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }

    fn record_outcome<T>(&self, class: OperationClass, result: &Result<T>) {
        match result {
            Ok(_) => self.backoff.on_success(class),
            Err(_) => self.backoff.on_failure(class),
        }
    }

    pub fn response_waiter(&self, request_id: RequestId, topic: &Topic) -> ResponseWaiter {
        ResponseWaiter {
            correlation: PendingCorrelation {
                request_id,
                topic: topic.clone(),
                started_at: Instant::now(),
            },
            receiver: self.responses.subscribe(),
        }
    }

    pub async fn publish_json_rpc_request(
        &self,
        topic: &Topic,
        params: IrnParams,
        request: &JsonRpcRequest,
        envelope_type: EnvelopeType,
    ) -> Result<Delivery> {
        self.check_network_connectivity()?;

        let body = serde_json::to_string(request)?;
        if !self.history.set_request(
            request.id,
            topic,
            &request.method,
            &body,
            TransportType::Relay,
        )? {
            log::debug!("dropping {} {}: already in flight", request.method, request.id);
            return Ok(Delivery::Dropped);
        }

        let message = self.codec.encrypt(topic, &body, envelope_type)?;
        log::trace!("publishing {body} on {topic}");

        self.wait_for_backoff(OperationClass::Publish).await;
        let result = self.relay.publish(topic, &message, &params).await;
        self.record_outcome(OperationClass::Publish, &result);

        match result {
            Ok(()) => {
                log::debug!("published {} {} on {topic}", request.method, request.id);
                Ok(Delivery::Acknowledged)
            }
            Err(e) => {
                log::warn!("publish of {} {} failed: {e}", request.method, request.id);
                Err(e)
            }
        }
    }

    pub async fn publish_json_rpc_response(
        &self,
        topic: &Topic,
        params: IrnParams,
        response: &JsonRpcResponse,
        envelope_type: EnvelopeType,
    ) -> Result<()> {
        self.check_network_connectivity()?;

        let body = serde_json::to_string(response)?;
        let message = self.codec.encrypt(topic, &body, envelope_type)?;

        self.wait_for_backoff(OperationClass::Publish).await;
        let result = self.relay.publish(topic, &message, &params).await;
        self.record_outcome(OperationClass::Publish, &result);
        result?;

        if self
            .history
            .update_request_with_response(response.id(), &body)?
            .is_none()
        {
            log::debug!("no pending request {} for our response", response.id());
        }
        Ok(())
    }

    fn response_irn_params(request: &WcRequest, is_error: bool) -> IrnParams {
        match request.wc_method() {
            Ok(method) => method.response_params(is_error),
            Err(_) => IrnParams::new(IrnTag::UnsupportedMethod, crate::constants::DAY),
        }
    }

    pub async fn respond_with_params(&self, request: &WcRequest, result: Value) -> Result<()> {
        let response = JsonRpcResponse::result(request.id, result);
        let params = Self::response_irn_params(request, false);
        self.publish_json_rpc_response(&request.topic, params, &response, EnvelopeType::Zero)
            .await
    }

    pub async fn respond_with_success(&self, request: &WcRequest) -> Result<()> {
        self.respond_with_params(request, Value::Bool(true)).await
    }

    pub async fn respond_with_error(
        &self,
        request: &WcRequest,
        error: JsonRpcErrorObject,
    ) -> Result<()> {
        let response = JsonRpcResponse::error(request.id, error);
        let params = Self::response_irn_params(request, true);
        self.publish_json_rpc_response(&request.topic, params, &response, EnvelopeType::Zero)
            .await
    }

    pub async fn subscribe(&self, topic: &Topic) -> Result<()> {
        self.check_network_connectivity()?;

        self.wait_for_backoff(OperationClass::Subscribe).await;
        let result = self.relay.subscribe(topic).await;
        self.record_outcome(OperationClass::Subscribe, &result);

        let subscription_id = result?;
        log::debug!("subscribed to {topic}");
        self.subscriptions
            .lock()?
            .insert(topic.clone(), subscription_id);
        Ok(())
    }

    /// Subscribes in chunks of at most `batch_size` topics and hands back the
    /// topics that were asked for. A failing chunk fails the whole call, but
    /// chunks that already succeeded stay subscribed at the relay.
    pub async fn batch_subscribe(&self, topics: Vec<Topic>) -> Result<Vec<Topic>> {
        self.check_network_connectivity()?;

        for chunk in topics.chunks(self.batch_size) {
            self.wait_for_backoff(OperationClass::BatchSubscribe).await;
            let result = self
                .relay
                .batch_subscribe(chunk)
                .await
                .and_then(|ids| check_subscription_ids(chunk, &ids).map(|_| ids));
            self.record_outcome(OperationClass::BatchSubscribe, &result);

            match result {
                Ok(ids) => {
                    let mut subscriptions = self.subscriptions.lock()?;
                    for (topic, id) in chunk.iter().zip(ids) {
                        subscriptions.insert(topic.clone(), id);
                    }
                }
                Err(e) => {
                    log::warn!("batch subscribe of {} topics failed: {e}", chunk.len());
                    return Err(e);
                }
            }
        }

        Ok(topics)
    }

    /// Unsubscribes and forgets the topic's history.
    pub async fn unsubscribe(&self, topic: &Topic) -> Result<()> {
        self.check_network_connectivity()?;

        self.wait_for_backoff(OperationClass::Unsubscribe).await;
        let result = self.relay.unsubscribe(topic).await;
        self.record_outcome(OperationClass::Unsubscribe, &result);
        result?;

        self.subscriptions.lock()?.remove(topic);
        self.history.delete_by_topic(topic)?;
        log::debug!("unsubscribed from {topic}");
        Ok(())
    }

    pub async fn resubscribe(&self) -> Result<Vec<Topic>> {
        let topics = self.subscribed_topics()?;
        if topics.is_empty() {
            return Ok(topics);
        }
        log::info!("resubscribing to {} topics", topics.len());
        self.batch_subscribe(topics).await
    }

    pub async fn propose_session(
        &self,
        pairing_topic: &Topic,
        request: &JsonRpcRequest,
    ) -> Result<Delivery> {
        self.check_network_connectivity()?;

        let body = serde_json::to_string(request)?;
        if !self.history.set_request(
            request.id,
            pairing_topic,
            &request.method,
            &body,
            TransportType::Relay,
        )? {
            return Ok(Delivery::Dropped);
        }

        let message = self.codec.encrypt(pairing_topic, &body, EnvelopeType::Zero)?;

        self.wait_for_backoff(OperationClass::Publish).await;
        let result = self
            .relay
            .propose_session(pairing_topic, &message, request.id)
            .await;
        self.record_outcome(OperationClass::Publish, &result);
        result?;
        Ok(Delivery::Acknowledged)
    }

    pub async fn approve_session(
        &self,
        pairing_topic: &Topic,
        session_topic: &Topic,
        proposal_response: &JsonRpcResponse,
        settle_request: &JsonRpcRequest,
    ) -> Result<Delivery> {
        self.check_network_connectivity()?;

        let settle_body = serde_json::to_string(settle_request)?;
        if !self.history.set_request(
            settle_request.id,
            session_topic,
            &settle_request.method,
            &settle_body,
            TransportType::Relay,
        )? {
            return Ok(Delivery::Dropped);
        }

        let response_body = serde_json::to_string(proposal_response)?;
        let response_message = self
            .codec
            .encrypt(pairing_topic, &response_body, EnvelopeType::Zero)?;
        let settle_message = self
            .codec
            .encrypt(session_topic, &settle_body, EnvelopeType::Zero)?;

        self.wait_for_backoff(OperationClass::Publish).await;
        let result = self
            .relay
            .approve_session(
                pairing_topic,
                session_topic,
                &response_message,
                &settle_message,
                settle_request.id,
            )
            .await;
        self.record_outcome(OperationClass::Publish, &result);
        result?;

        self.history
            .update_request_with_response(proposal_response.id(), &response_body)?;
        Ok(Delivery::Acknowledged)
    }

    fn link_mode_opener(&self) -> Result<&Arc<dyn LinkModeOpener>> {
        self.link_mode
            .as_ref()
            .ok_or_else(|| Error::InternalError("link mode is not configured".to_string()))
    }

    /// Sends a request through the peer's universal link instead of the relay.
    pub fn dispatch_request_via_link_mode(
        &self,
        topic: &Topic,
        request: &JsonRpcRequest,
        universal_link: &str,
    ) -> Result<Delivery> {
        let opener = self.link_mode_opener()?;

        let body = serde_json::to_string(request)?;
        if !self.history.set_request(
            request.id,
            topic,
            &request.method,
            &body,
            TransportType::LinkMode,
        )? {
            return Ok(Delivery::Dropped);
        }

        let envelope = self.codec.encrypt_with_encoding(
            topic,
            &body,
            EnvelopeType::Zero,
            EncodingType::Base64Url,
        )?;
        opener.open(universal_link, topic, &envelope)?;
        Ok(Delivery::Acknowledged)
    }

    pub fn dispatch_response_via_link_mode(
        &self,
        topic: &Topic,
        response: &JsonRpcResponse,
        universal_link: &str,
    ) -> Result<()> {
        let opener = self.link_mode_opener()?;

        let body = serde_json::to_string(response)?;
        let envelope = self.codec.encrypt_with_encoding(
            topic,
            &body,
            EnvelopeType::Zero,
            EncodingType::Base64Url,
        )?;
        opener.open(universal_link, topic, &envelope)?;
        self.history.update_request_with_response(response.id(), &body)?;
        Ok(())
    }

    /// Feeds an envelope that arrived through a deep link.
    pub fn on_link_mode_envelope(&self, topic: &Topic, envelope: &str) {
        self.handle_inbound(topic, envelope, TransportType::LinkMode, EncodingType::Base64Url);
    }

    fn report(&self, topic: &Topic, message: String) {
        log::warn!("inbound message on {topic} dropped: {message}");
        let _ = self.internal_errors.send(InteractorError {
            topic: topic.clone(),
            message,
        });
    }

    pub fn handle_relay_event(&self, event: &RelayEvent) {
        self.handle_inbound(
            &event.topic,
            &event.message,
            TransportType::Relay,
            EncodingType::Base64,
        );
    }

    fn handle_inbound(
        &self,
        topic: &Topic,
        envelope: &str,
        transport_type: TransportType,
        encoding: EncodingType,
    ) {
        let body = match self.codec.decrypt_with_encoding(topic, envelope, encoding) {
            Ok(body) => body,
            Err(e) => return self.report(topic, e.to_string()),
        };
        log::trace!("received {body} on {topic}");

        let message = match serde_json::from_str::<JsonRpcMessage>(&body) {
            Ok(message) => message,
            Err(e) => return self.report(topic, format!("not json-rpc: {e}")),
        };

        match message {
            JsonRpcMessage::Request(request) => {
                match self.history.set_request(
                    request.id,
                    topic,
                    &request.method,
                    &body,
                    transport_type,
                ) {
                    Ok(true) => {}
                    Ok(false) => {
                        log::debug!("duplicate request {} on {topic}", request.id);
                        return;
                    }
                    Err(e) => return self.report(topic, e.to_string()),
                }

                let _ = self.requests.send(WcRequest {
                    topic: topic.clone(),
                    id: request.id,
                    method: request.method,
                    params: request.params,
                    transport_type,
                });
            }
            JsonRpcMessage::Response(response) => {
                let record = match self
                    .history
                    .update_request_with_response(response.id(), &body)
                {
                    Ok(Some(record)) => record,
                    Ok(None) => {
                        log::debug!("stale response {} on {topic}", response.id());
                        return;
                    }
                    Err(e) => return self.report(topic, e.to_string()),
                };

                let params = serde_json::from_str::<JsonRpcRequest>(&record.body)
                    .map(|request| request.params)
                    .unwrap_or_default();

                let _ = self.responses.send(WcResponse {
                    topic: topic.clone(),
                    method: record.method,
                    params,
                    response,
                    transport_type: record.transport_type,
                });
            }
        }
    }

    /// Pumps relay events into the inbound path and resubscribes on every
    /// reconnect tick.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        let mut events = self.relay.subscription_events();
        let mut ticks = self.relay.resubscribe_events();

        tokio::spawn(async move {
            let mut ticks_open = true;
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => this.handle_relay_event(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            log::warn!("relay event stream lagged by {skipped}");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    tick = ticks.recv(), if ticks_open => match tick {
                        Ok(()) | Err(RecvError::Lagged(_)) => {
                            let this = this.clone();
                            tokio::spawn(async move {
                                if let Err(e) = this.resubscribe().await {
                                    log::warn!("resubscribe failed: {e}");
                                }
                            });
                        }
                        Err(RecvError::Closed) => ticks_open = false,
                    },
                }
            }
            log::debug!("relay event stream closed");
        })
    }
}
