use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::events::{ExpiredSequence, NoTelemetry, SignEvent, Telemetry};
use super::validation::{
    is_chain_authorized, is_event_authorized, is_method_authorized,
    validate_extend, validate_proposal_namespaces, validate_required_namespaces,
    validate_session_namespaces,
};
use super::wallet_service::{
    HttpWalletServiceClient, WalletServiceClient, find_wallet_service,
};
use crate::codec::EnvelopeType;
use crate::constants::{DEFAULT_CALL_TIMEOUT_SECS, FIVE_MINUTES, WEEK};
use crate::error::{Error, Result};
use crate::interactor::{Delivery, RelayJsonRpcInteractor, ResponseWaiter};
use crate::rpc::{
    JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse, RequestId, codes,
};
use crate::storage::{
    MetadataType, Pairing, ProposalRecord, Session, SignStorage, TempNamespaces,
};
use crate::types::{
    Metadata, Namespaces, Participant, Relay, SessionDeleteParams, SessionEvent,
    SessionEventParams, SessionExtendParams, SessionProposeParams,
    SessionProposeResponse, SessionRequest, SessionRequestParams,
    SessionSettleParams, SessionUpdateParams, Topic, TransportType,
};
use crate::utils::{
    UriParameters, parse_uri, random_bytes32, topic_from_sym_key, unix_timestamp,
};
use crate::wc_message::{WcMethod, WcParams};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Pairing and session state machine, shared by dApps and wallets.
pub struct SignEngine {
    pub(super) interactor: Arc<RelayJsonRpcInteractor>,
    pub(super) storage: SignStorage,
    pub(super) metadata: Metadata,
    pub(super) events: broadcast::Sender<SignEvent>,
    pub(super) telemetry: Arc<dyn Telemetry>,
    pub(super) wallet_service: Arc<dyn WalletServiceClient>,
    pub(super) call_timeout: Duration,
}

impl SignEngine {
    pub fn new(
        interactor: Arc<RelayJsonRpcInteractor>,
        storage: SignStorage,
        metadata: Metadata,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            interactor,
            storage,
            metadata,
            events,
            telemetry: Arc::new(NoTelemetry),
            wallet_service: Arc::new(HttpWalletServiceClient::new()),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_wallet_service_client(
        mut self,
        client: Arc<dyn WalletServiceClient>,
    ) -> Self {
        self.wallet_service = client;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn events(&self) -> broadcast::Receiver<SignEvent> {
        self.events.subscribe()
    }

    pub fn storage(&self) -> &SignStorage {
        &self.storage
    }

    pub fn interactor(&self) -> &Arc<RelayJsonRpcInteractor> {
        &self.interactor
    }

    pub(super) fn emit(&self, event: SignEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    pub(super) fn emit_error(&self, topic: Option<Topic>, error: &Error) {
        log::warn!("sign engine error: {error}");
        self.emit(SignEvent::Error {
            topic,
            message: error.to_string(),
        });
    }

    /// Dispatches inbound traffic. Every message runs in its own task so a
    /// failing handler does not affect the others.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        let mut requests = self.interactor.requests();
        let mut responses = self.interactor.responses();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = requests.recv() => match request {
                        Ok(request) => {
                            if WcMethod::from_str(&request.method).is_ok_and(|m| m.is_notify()) {
                                continue;
                            }
                            let this = this.clone();
                            tokio::spawn(async move {
                                let topic = request.topic.clone();
                                if let Err(e) = this.on_request(request).await {
                                    this.emit_error(Some(topic), &e);
                                }
                            });
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            log::warn!("sign engine skipped {skipped} requests");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    response = responses.recv() => match response {
                        Ok(response) => {
                            if response.wc_method().is_ok_and(|m| m.is_notify()) {
                                continue;
                            }
                            let this = this.clone();
                            tokio::spawn(async move {
                                let topic = response.topic.clone();
                                if let Err(e) = this.on_response(response).await {
                                    this.emit_error(Some(topic), &e);
                                }
                            });
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            log::warn!("sign engine skipped {skipped} responses");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// Subscribes again to every stored pairing and session, after a restart.
    pub async fn restore_subscriptions(&self) -> Result<Vec<Topic>> {
        let mut topics: Vec<Topic> = self
            .storage
            .sequences
            .get_pairings()?
            .into_iter()
            .map(|p| p.topic)
            .collect();
        topics.extend(
            self.storage
                .sequences
                .get_sessions()?
                .into_iter()
                .map(|s| s.topic),
        );

        if topics.is_empty() {
            return Ok(topics);
        }
        self.interactor.batch_subscribe(topics).await
    }

    /// dApp side: opens a pairing and returns it with its `wc:` uri.
    pub async fn create_pairing(&self) -> Result<Pairing> {
        let sym_key = random_bytes32();
        let topic = topic_from_sym_key(&sym_key);
        let expiry = unix_timestamp()? + FIVE_MINUTES;

        let mut uri = UriParameters::new(topic.clone(), sym_key, expiry);
        uri.methods = Some(vec![WcMethod::SessionPropose.to_string()]);

        self.interactor.keys().set_sym_key(&topic, sym_key)?;
        let pairing = Pairing {
            topic: topic.clone(),
            expiry,
            relay: Relay::default(),
            uri: uri.to_uri(),
            methods: uri.methods.clone(),
            peer_metadata: None,
            is_active: false,
        };
        self.storage.sequences.insert_pairing(pairing.clone())?;
        self.interactor.subscribe(&topic).await?;

        log::info!("created pairing {topic}");
        Ok(pairing)
    }

    /// Wallet side: joins the pairing encoded in a `wc:` uri.
    pub async fn pair(&self, uri: &str) -> Result<Pairing> {
        let params = parse_uri(uri.to_string())?;
        if let Some(existing) = self.storage.sequences.get_pairing(&params.topic)? {
            if existing.is_active {
                return Err(Error::PairingAlreadyExists(params.topic));
            }
        }

        let expiry = match params.expiry_timestamp {
            Some(expiry) => expiry,
            None => unix_timestamp()? + FIVE_MINUTES,
        };
        self.interactor.keys().set_sym_key(&params.topic, params.sym_key)?;
        let pairing = Pairing {
            topic: params.topic.clone(),
            expiry,
            relay: Relay {
                protocol: params.relay.protocol,
                data: params.relay.data,
            },
            uri: uri.to_string(),
            methods: params.methods,
            peer_metadata: None,
            is_active: false,
        };
        self.storage.sequences.insert_pairing(pairing.clone())?;
        self.interactor.subscribe(&params.topic).await?;

        log::info!("paired on {}", params.topic);
        Ok(pairing)
    }

    /// dApp side: proposes a session over an existing pairing.
    pub async fn connect(
        &self,
        required_namespaces: Namespaces,
        optional_namespaces: Namespaces,
        session_properties: Option<HashMap<String, String>>,
        pairing_topic: &Topic,
    ) -> Result<ProposalRecord> {
        if self.storage.sequences.get_pairing(pairing_topic)?.is_none() {
            return Err(Error::NoSequence(pairing_topic.clone()));
        }
        validate_proposal_namespaces(&required_namespaces)?;
        validate_proposal_namespaces(&optional_namespaces)?;

        let proposer_public_key =
            self.interactor.keys().generate_and_store_x25519_key_pair()?;
        let expiry = unix_timestamp()? + FIVE_MINUTES;
        let params = SessionProposeParams {
            relays: vec![Relay::default()],
            proposer: Participant {
                public_key: proposer_public_key.clone(),
                metadata: self.metadata.clone(),
            },
            required_namespaces,
            optional_namespaces,
            session_properties,
            scoped_properties: None,
            expiry_timestamp: Some(expiry),
            pairing_topic: Some(pairing_topic.clone()),
        };

        let request = WcParams::SessionPropose(params.clone()).into_request()?;
        let proposal = ProposalRecord {
            request_id: request.id,
            pairing_topic: pairing_topic.clone(),
            proposer_public_key: proposer_public_key.clone(),
            params,
            expiry,
        };
        self.storage.proposals.insert_proposal(proposal.clone())?;

        if let Err(e) = self.interactor.propose_session(pairing_topic, &request).await {
            self.forget_own_proposal(&proposer_public_key)?;
            return Err(e);
        }
        Ok(proposal)
    }

    /// Wallet side: accepts a proposal and settles the session.
    pub async fn approve(
        &self,
        proposer_public_key: &str,
        namespaces: Namespaces,
        session_properties: Option<HashMap<String, String>>,
        scoped_properties: Option<HashMap<String, String>>,
    ) -> Result<Session> {
        let proposal = self
            .storage
            .proposals
            .get_proposal(proposer_public_key)?
            .ok_or_else(|| Error::ProposalNotFound(proposer_public_key.to_string()))?;

        let now = unix_timestamp()?;
        if proposal.expiry <= now {
            self.storage.proposals.delete_proposal(proposer_public_key)?;
            return Err(Error::ProposalExpired(proposer_public_key.to_string()));
        }
        validate_session_namespaces(&namespaces)?;
        validate_required_namespaces(&proposal.params.required_namespaces, &namespaces)?;

        let keys = self.interactor.keys();
        let self_public_key = keys.generate_and_store_x25519_key_pair()?;
        let session_topic =
            keys.generate_topic_from_key_agreement(&self_public_key, proposer_public_key)?;

        let relay = Relay::default();
        let proposal_response = JsonRpcResponse::result(
            proposal.request_id,
            serde_json::to_value(SessionProposeResponse {
                relay: relay.clone(),
                responder_public_key: self_public_key.clone(),
            })?,
        );

        let expiry = now + WEEK;
        let settle_request = WcParams::SessionSettle(SessionSettleParams {
            relay: relay.clone(),
            controller: Participant {
                public_key: self_public_key.clone(),
                metadata: self.metadata.clone(),
            },
            namespaces: namespaces.clone(),
            expiry,
            session_properties: session_properties.clone(),
            scoped_properties: scoped_properties.clone(),
            pairing_topic: Some(proposal.pairing_topic.clone()),
        })
        .into_request()?;

        let session = Session {
            topic: session_topic.clone(),
            pairing_topic: proposal.pairing_topic.clone(),
            expiry,
            relay,
            self_public_key: self_public_key.clone(),
            peer_public_key: proposer_public_key.to_string(),
            controller_key: self_public_key,
            self_metadata: self.metadata.clone(),
            peer_metadata: proposal.params.proposer.metadata.clone(),
            namespaces,
            required_namespaces: proposal.params.required_namespaces.clone(),
            optional_namespaces: proposal.params.optional_namespaces.clone(),
            session_properties,
            scoped_properties,
            is_acknowledged: false,
            namespaces_updated_at: 0,
            transport_type: TransportType::Relay,
        };
        self.storage.sequences.insert_session(session.clone())?;
        self.storage.metadata.upsert_metadata(
            &session_topic,
            session.peer_metadata.clone(),
            MetadataType::Peer,
        )?;

        let published = async {
            self.interactor.subscribe(&session_topic).await?;
            self.interactor
                .approve_session(
                    &proposal.pairing_topic,
                    &session_topic,
                    &proposal_response,
                    &settle_request,
                )
                .await
        };
        if let Err(e) = published.await {
            self.delete_session_sequence(&session_topic).await?;
            return Err(e);
        }

        self.storage.proposals.delete_proposal(proposer_public_key)?;
        if self.storage.sequences.get_pairing(&proposal.pairing_topic)?.is_some() {
            self.storage
                .sequences
                .activate_pairing(&proposal.pairing_topic, expiry)?;
        }

        log::info!("approved session {session_topic}");
        Ok(session)
    }

    /// Wallet side: turns a proposal down.
    pub async fn reject(
        &self,
        proposer_public_key: &str,
        reason: JsonRpcErrorObject,
    ) -> Result<()> {
        let proposal = self
            .storage
            .proposals
            .get_proposal(proposer_public_key)?
            .ok_or_else(|| Error::ProposalNotFound(proposer_public_key.to_string()))?;

        let response = JsonRpcResponse::error(proposal.request_id, reason);
        self.interactor
            .publish_json_rpc_response(
                &proposal.pairing_topic,
                WcMethod::SessionPropose.response_params(true),
                &response,
                EnvelopeType::Zero,
            )
            .await?;
        self.storage.proposals.delete_proposal(proposer_public_key)
    }

    pub(super) fn acknowledged_session(&self, topic: &Topic) -> Result<Session> {
        let session = self
            .storage
            .sequences
            .get_session(topic)?
            .ok_or_else(|| Error::NoSequence(topic.clone()))?;
        if !session.is_acknowledged {
            return Err(Error::SessionNotAcknowledged(topic.clone()));
        }
        Ok(session)
    }

    pub(super) fn peer_link(session: &Session) -> Option<String> {
        session
            .peer_metadata
            .redirect
            .as_ref()
            .filter(|redirect| redirect.link_mode)
            .and_then(|redirect| redirect.universal.clone())
    }

    /// Sends a `wc_sessionRequest`, through a wallet service when the wallet
    /// advertises one for the method.
    pub async fn request(
        &self,
        topic: &Topic,
        chain_id: &str,
        method: &str,
        params: Value,
        expiry_timestamp: Option<u64>,
    ) -> Result<RequestId> {
        let session = self.acknowledged_session(topic)?;
        if !is_chain_authorized(&session.namespaces, chain_id) {
            return Err(Error::UnauthorizedChain(chain_id.to_string()));
        }
        if !is_method_authorized(&session.namespaces, chain_id, method) {
            return Err(Error::UnauthorizedMethod(method.to_string()));
        }

        let now = unix_timestamp()?;
        let expires_in = match expiry_timestamp {
            Some(expiry) if expiry <= now || expiry > now + WEEK => {
                return Err(Error::InvalidExpiry(expiry));
            }
            Some(expiry) => expiry - now,
            None => FIVE_MINUTES,
        };

        let request = WcParams::SessionRequest(SessionRequestParams {
            request: SessionRequest {
                method: method.to_string(),
                params: params.clone(),
                expiry_timestamp,
            },
            chain_id: chain_id.to_string(),
        })
        .into_request()?;

        if let Some(url) =
            find_wallet_service(session.scoped_properties.as_ref(), chain_id, method)
        {
            log::debug!("routing {method} to wallet service {url}");
            let inner = JsonRpcRequest::with_id(request.id, method, params);
            let response = self.wallet_service.execute(&url, &inner).await?;
            self.emit(SignEvent::SessionRequestResponse {
                topic: topic.clone(),
                chain_id: chain_id.to_string(),
                method: method.to_string(),
                response,
            });
            return Ok(request.id);
        }

        let waiter = self.interactor.response_waiter(request.id, topic);
        match Self::peer_link(&session) {
            Some(link) if session.transport_type == TransportType::LinkMode => {
                self.interactor
                    .dispatch_request_via_link_mode(topic, &request, &link)?;
            }
            _ => {
                // The relay keeps messages for at least five minutes
                let mut params = WcMethod::SessionRequest.request_params();
                params.ttl = expires_in.max(FIVE_MINUTES);
                let delivery = self
                    .interactor
                    .publish_json_rpc_request(topic, params, &request, EnvelopeType::Zero)
                    .await?;
                if delivery == Delivery::Dropped {
                    return Ok(request.id);
                }
            }
        }

        self.expire_request_after(
            waiter,
            chain_id,
            method,
            Duration::from_secs(expires_in),
        );
        Ok(request.id)
    }

    /// Answers our own request with an expiry error when the wallet stays
    /// silent past its expiry. A late answer is then dropped as stale.
    fn expire_request_after(
        &self,
        waiter: ResponseWaiter,
        chain_id: &str,
        method: &str,
        after: Duration,
    ) {
        let history = self.interactor.history().clone();
        let events = self.events.clone();
        let chain_id = chain_id.to_string();
        let method = method.to_string();

        tokio::spawn(async move {
            let topic = waiter.correlation().topic.clone();
            let request_id = waiter.correlation().request_id;
            match waiter.wait(after).await {
                // Answered in time, the response handler reports it
                Ok(_) => {}
                Err(Error::Timeout { .. }) => {
                    let response = JsonRpcResponse::error(
                        request_id,
                        JsonRpcErrorObject::new(
                            codes::SESSION_REQUEST_EXPIRED,
                            "Session request expired",
                        ),
                    );
                    let closed = serde_json::to_string(&response)
                        .map_err(Error::from)
                        .and_then(|body| {
                            history.update_request_with_response(request_id, &body)
                        });
                    match closed {
                        Ok(Some(_)) => {
                            log::info!("request {request_id} on {topic} expired");
                            let _ = events.send(SignEvent::SessionRequestResponse {
                                topic,
                                chain_id,
                                method,
                                response,
                            });
                        }
                        Ok(None) => {
                            log::debug!("request {request_id} was answered meanwhile");
                        }
                        Err(e) => log::warn!("expiring request {request_id} failed: {e}"),
                    }
                }
                Err(e) => log::warn!("waiting for request {request_id} failed: {e}"),
            }
        });
    }

    /// Wallet side: answers a pending `wc_sessionRequest`. An expired request
    /// is answered with an expiry error instead.
    pub async fn respond(&self, topic: &Topic, response: JsonRpcResponse) -> Result<()> {
        let session = self.acknowledged_session(topic)?;
        let record = self
            .interactor
            .history()
            .get_record_by_id(response.id())?
            .filter(|r| &r.topic == topic && r.response.is_none())
            .ok_or_else(|| {
                Error::InternalError(format!("no pending request {}", response.id()))
            })?;

        let request: JsonRpcRequest = serde_json::from_str(&record.body)?;
        let params: SessionRequestParams = serde_json::from_value(request.params)?;
        if let Some(expiry) = params.request.expiry_timestamp {
            if expiry < unix_timestamp()? {
                let expired = JsonRpcResponse::error(
                    request.id,
                    JsonRpcErrorObject::new(
                        codes::SESSION_REQUEST_EXPIRED,
                        "Session request expired",
                    ),
                );
                self.interactor
                    .publish_json_rpc_response(
                        topic,
                        WcMethod::SessionRequest.response_params(true),
                        &expired,
                        EnvelopeType::Zero,
                    )
                    .await?;
                return Err(Error::RequestExpired(request.id));
            }
        }

        match Self::peer_link(&session) {
            Some(link) if record.transport_type == TransportType::LinkMode => self
                .interactor
                .dispatch_response_via_link_mode(topic, &response, &link),
            _ => {
                self.interactor
                    .publish_json_rpc_response(
                        topic,
                        WcMethod::SessionRequest.response_params(response.is_error()),
                        &response,
                        EnvelopeType::Zero,
                    )
                    .await
            }
        }
    }

    /// Controller side: replaces the session namespaces. The change is staged
    /// until the peer acknowledges it.
    pub async fn update(&self, topic: &Topic, namespaces: Namespaces) -> Result<RequestId> {
        let session = self.acknowledged_session(topic)?;
        if !session.is_self_controller() {
            return Err(Error::NotController(topic.clone()));
        }
        validate_session_namespaces(&namespaces)?;
        validate_required_namespaces(&session.required_namespaces, &namespaces)?;

        let request = WcParams::SessionUpdate(SessionUpdateParams {
            namespaces: namespaces.clone(),
        })
        .into_request()?;
        self.storage.sequences.insert_temp_namespaces(TempNamespaces {
            topic: topic.clone(),
            request_id: request.id,
            namespaces,
            timestamp: request.id.timestamp_ms() as u64,
        })?;

        self.interactor
            .publish_json_rpc_request(
                topic,
                WcMethod::SessionUpdate.request_params(),
                &request,
                EnvelopeType::Zero,
            )
            .await?;
        Ok(request.id)
    }

    /// Controller side: pushes the expiry a week out.
    pub async fn extend(&self, topic: &Topic) -> Result<u64> {
        let session = self.acknowledged_session(topic)?;
        if !session.is_self_controller() {
            return Err(Error::NotController(topic.clone()));
        }

        let now = unix_timestamp()?;
        let expiry = now + WEEK;
        validate_extend(expiry, session.expiry, now)?;

        let request = WcParams::SessionExtend(SessionExtendParams { expiry }).into_request()?;
        self.interactor
            .publish_json_rpc_request(
                topic,
                WcMethod::SessionExtend.request_params(),
                &request,
                EnvelopeType::Zero,
            )
            .await?;
        self.storage.sequences.update_session_expiry(topic, expiry)?;
        Ok(expiry)
    }

    /// Controller side: emits a session event such as `chainChanged`.
    pub async fn emit_event(
        &self,
        topic: &Topic,
        chain_id: &str,
        name: &str,
        data: Value,
    ) -> Result<()> {
        let session = self.acknowledged_session(topic)?;
        if !session.is_self_controller() {
            return Err(Error::NotController(topic.clone()));
        }
        if !is_chain_authorized(&session.namespaces, chain_id) {
            return Err(Error::UnauthorizedChain(chain_id.to_string()));
        }
        if !is_event_authorized(&session.namespaces, chain_id, name) {
            return Err(Error::UnauthorizedEvent(name.to_string()));
        }

        let request = WcParams::SessionEvent(SessionEventParams {
            event: SessionEvent {
                name: name.to_string(),
                data,
            },
            chain_id: chain_id.to_string(),
        })
        .into_request()?;
        self.interactor
            .publish_json_rpc_request(
                topic,
                WcMethod::SessionEvent.request_params(),
                &request,
                EnvelopeType::Zero,
            )
            .await?;
        Ok(())
    }

    /// Pings a session or pairing and waits for the answer.
    pub async fn ping(&self, topic: &Topic) -> Result<()> {
        let method = if self.storage.sequences.get_session(topic)?.is_some() {
            WcMethod::SessionPing
        } else if self.storage.sequences.get_pairing(topic)?.is_some() {
            WcMethod::PairingPing
        } else {
            return Err(Error::NoSequence(topic.clone()));
        };

        let request = JsonRpcRequest::new(method, json!({}));
        let waiter = self.interactor.response_waiter(request.id, topic);
        self.interactor
            .publish_json_rpc_request(topic, method.request_params(), &request, EnvelopeType::Zero)
            .await?;

        match waiter.wait(self.call_timeout).await?.response {
            JsonRpcResponse::Result(_) => Ok(()),
            JsonRpcResponse::Error(e) => Err(Error::Peer(e.error)),
        }
    }

    /// Deletes a session or pairing and tells the peer.
    pub async fn disconnect(&self, topic: &Topic) -> Result<()> {
        let reason = SessionDeleteParams {
            code: codes::USER_DISCONNECTED,
            message: "User disconnected.".to_string(),
        };

        if self.storage.sequences.get_session(topic)?.is_some() {
            let request = WcParams::SessionDelete(reason).into_request()?;
            self.interactor
                .publish_json_rpc_request(
                    topic,
                    WcMethod::SessionDelete.request_params(),
                    &request,
                    EnvelopeType::Zero,
                )
                .await?;
            self.delete_session_sequence(topic).await
        } else if self.storage.sequences.get_pairing(topic)?.is_some() {
            let request = WcParams::PairingDelete(reason).into_request()?;
            self.interactor
                .publish_json_rpc_request(
                    topic,
                    WcMethod::PairingDelete.request_params(),
                    &request,
                    EnvelopeType::Zero,
                )
                .await?;
            self.delete_pairing_sequence(topic).await
        } else {
            Err(Error::NoSequence(topic.clone()))
        }
    }

    /// Unsubscribes and drops everything held for the topic. Local state goes
    /// even when the relay cannot be reached.
    async fn forget_topic(&self, topic: &Topic) -> Result<()> {
        if let Err(e) = self.interactor.unsubscribe(topic).await {
            log::warn!("could not unsubscribe from {topic}: {e}");
            self.interactor.history().delete_by_topic(topic)?;
        }
        self.interactor.keys().remove_keys(topic)?;
        self.storage.metadata.delete_metadata(topic)
    }

    pub(super) async fn delete_session_sequence(&self, topic: &Topic) -> Result<()> {
        self.storage.sequences.delete_session(topic)?;
        self.forget_topic(topic).await
    }

    /// Drops a proposal together with the key pair `connect` made for it.
    /// Proposals received from a peer hold no key pair of ours.
    pub(super) fn forget_own_proposal(&self, proposer_public_key: &str) -> Result<()> {
        self.storage.proposals.delete_proposal(proposer_public_key)?;
        self.interactor.keys().remove_key_pair(proposer_public_key)
    }

    pub(super) async fn delete_pairing_sequence(&self, topic: &Topic) -> Result<()> {
        self.storage.sequences.delete_pairing(topic)?;
        self.forget_topic(topic).await
    }

    /// Removes every pairing, session and proposal that expired at `now`.
    pub async fn expire_sequences(&self, now: u64) -> Result<Vec<ExpiredSequence>> {
        let mut expired = vec![];

        for pairing in self.storage.sequences.get_pairings()? {
            if pairing.expiry <= now {
                self.delete_pairing_sequence(&pairing.topic).await?;
                expired.push(ExpiredSequence::Pairing(pairing.topic));
            }
        }
        for session in self.storage.sequences.get_sessions()? {
            if session.is_expired(now) {
                self.delete_session_sequence(&session.topic).await?;
                expired.push(ExpiredSequence::Session(session.topic));
            }
        }
        for proposal in self.storage.proposals.get_proposals()? {
            if proposal.expiry <= now {
                self.forget_own_proposal(&proposal.proposer_public_key)?;
                expired.push(ExpiredSequence::Proposal(proposal.proposer_public_key));
            }
        }

        for sequence in &expired {
            log::debug!("expired {sequence:?}");
            self.emit(SignEvent::Expired(sequence.clone()));
        }
        Ok(expired)
    }
}
