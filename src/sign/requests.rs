//! Handlers for requests sent to us by the peer.

use super::engine::SignEngine;
use super::events::SignEvent;
use super::validation::{
    is_chain_authorized, is_event_authorized, is_method_authorized,
    validate_extend, validate_proposal_namespaces, validate_required_namespaces,
    validate_session_namespaces,
};
use crate::constants::{FIVE_MINUTES, MONTH};
use crate::error::{Error, Result};
use crate::rpc::{JsonRpcErrorObject, codes};
use crate::storage::{MetadataType, ProposalRecord, Session};
use crate::types::{
    PairingDeleteParams, SessionDeleteParams, SessionEventParams,
    SessionExtendParams, SessionProposeParams, SessionRequestParams,
    SessionSettleParams, SessionUpdateParams,
};
use crate::utils::unix_timestamp;
use crate::wc_message::{WcParams, WcRequest};

impl SignEngine {
    pub(super) async fn on_request(&self, request: WcRequest) -> Result<()> {
        log::debug!("inbound {request}");

        let params = match request.decode() {
            Ok(params) => params,
            Err(e) => {
                let known = self.storage.sequences.get_session(&request.topic)?.is_some()
                    || self.storage.sequences.get_pairing(&request.topic)?.is_some();
                if known {
                    let code = match request.wc_method() {
                        Ok(_) => codes::INVALID_PARAMS,
                        Err(_) => codes::INVALID_METHOD,
                    };
                    self.interactor
                        .respond_with_error(&request, JsonRpcErrorObject::new(code, e.to_string()))
                        .await?;
                }
                return Err(e);
            }
        };

        match params {
            WcParams::SessionPropose(p) => self.on_session_propose(request, p).await,
            WcParams::SessionSettle(p) => self.on_session_settle(request, p).await,
            WcParams::SessionRequest(p) => self.on_session_request(request, p).await,
            WcParams::SessionUpdate(p) => self.on_session_update(request, p).await,
            WcParams::SessionExtend(p) => self.on_session_extend(request, p).await,
            WcParams::SessionEvent(p) => self.on_session_event(request, p).await,
            WcParams::SessionDelete(p) => self.on_session_delete(request, p).await,
            WcParams::PairingDelete(p) => self.on_pairing_delete(request, p).await,
            WcParams::SessionPing | WcParams::PairingPing => {
                self.interactor.respond_with_success(&request).await
            }
            _ => Ok(()),
        }
    }

    async fn reply_error(&self, request: &WcRequest, code: i64, message: &str) -> Result<()> {
        self.interactor
            .respond_with_error(request, JsonRpcErrorObject::new(code, message))
            .await
    }

    /// Looks up the session, answering `NO_SESSION_FOR_TOPIC` when missing.
    async fn session_for(&self, request: &WcRequest) -> Result<Option<Session>> {
        let session = self.storage.sequences.get_session(&request.topic)?;
        if session.is_none() {
            self.reply_error(
                request,
                codes::NO_SESSION_FOR_TOPIC,
                &format!("No matching session with topic {}", request.topic),
            )
            .await?;
        }
        Ok(session)
    }

    async fn on_session_propose(
        &self,
        request: WcRequest,
        params: SessionProposeParams,
    ) -> Result<()> {
        let namespaces_ok = validate_proposal_namespaces(&params.required_namespaces)
            .and_then(|_| validate_proposal_namespaces(&params.optional_namespaces));
        if let Err(e) = namespaces_ok {
            self.reply_error(&request, codes::UNSUPPORTED_NAMESPACE_KEY, &e.to_string())
                .await?;
            return Err(e);
        }

        let now = unix_timestamp()?;
        let expiry = params.expiry_timestamp.unwrap_or(now + FIVE_MINUTES);
        if expiry <= now {
            return Err(Error::ProposalExpired(params.proposer.public_key));
        }

        let proposal = ProposalRecord {
            request_id: request.id,
            pairing_topic: request.topic.clone(),
            proposer_public_key: params.proposer.public_key.clone(),
            expiry,
            params,
        };
        self.storage.proposals.insert_proposal(proposal.clone())?;
        self.storage.metadata.upsert_metadata(
            &request.topic,
            proposal.params.proposer.metadata.clone(),
            MetadataType::Peer,
        )?;
        if self.storage.sequences.get_pairing(&request.topic)?.is_some() {
            self.storage
                .sequences
                .activate_pairing(&request.topic, now + MONTH)?;
        }

        self.emit(SignEvent::SessionProposal(proposal));
        Ok(())
    }

    /// dApp side: the wallet settled the session we proposed.
    async fn on_session_settle(
        &self,
        request: WcRequest,
        params: SessionSettleParams,
    ) -> Result<()> {
        let topic = request.topic.clone();
        let self_public_key = self
            .interactor
            .keys()
            .get_self_public_key(&topic)?
            .ok_or_else(|| Error::NoSequence(topic.clone()))?;

        let Some(proposal) = self.storage.proposals.get_proposal(&self_public_key)? else {
            self.reply_error(&request, codes::SESSION_SETTLEMENT_FAILED, "Proposal not found")
                .await?;
            return Err(Error::ProposalNotFound(self_public_key));
        };

        let namespaces_ok = validate_session_namespaces(&params.namespaces).and_then(|_| {
            validate_required_namespaces(&proposal.params.required_namespaces, &params.namespaces)
        });
        if let Err(e) = namespaces_ok {
            self.reply_error(&request, codes::SESSION_SETTLEMENT_FAILED, &e.to_string())
                .await?;
            return Err(e);
        }

        let session = Session {
            topic: topic.clone(),
            pairing_topic: proposal.pairing_topic.clone(),
            expiry: params.expiry,
            relay: params.relay,
            self_public_key: self_public_key.clone(),
            peer_public_key: params.controller.public_key.clone(),
            controller_key: params.controller.public_key,
            self_metadata: self.metadata.clone(),
            peer_metadata: params.controller.metadata.clone(),
            namespaces: params.namespaces,
            required_namespaces: proposal.params.required_namespaces,
            optional_namespaces: proposal.params.optional_namespaces,
            session_properties: params.session_properties,
            scoped_properties: params.scoped_properties,
            is_acknowledged: true,
            namespaces_updated_at: request.id.timestamp_ms() as u64,
            transport_type: request.transport_type,
        };
        self.storage.sequences.insert_session(session.clone())?;
        self.storage.metadata.upsert_metadata(
            &topic,
            params.controller.metadata,
            MetadataType::Peer,
        )?;
        self.storage.proposals.delete_proposal(&self_public_key)?;

        self.interactor.respond_with_success(&request).await?;
        log::info!("session {topic} settled");
        self.emit(SignEvent::SessionApproved(session));
        Ok(())
    }

    async fn on_session_request(
        &self,
        request: WcRequest,
        params: SessionRequestParams,
    ) -> Result<()> {
        let Some(session) = self.session_for(&request).await? else {
            return Ok(());
        };

        if !is_chain_authorized(&session.namespaces, &params.chain_id) {
            return self
                .reply_error(&request, codes::UNSUPPORTED_CHAINS, "Unsupported chain")
                .await;
        }
        if !is_method_authorized(&session.namespaces, &params.chain_id, &params.request.method) {
            return self
                .reply_error(&request, codes::UNAUTHORIZED_METHOD, "Unauthorized method")
                .await;
        }
        if let Some(expiry) = params.request.expiry_timestamp {
            if expiry < unix_timestamp()? {
                return self
                    .reply_error(
                        &request,
                        codes::SESSION_REQUEST_EXPIRED,
                        "Session request expired",
                    )
                    .await;
            }
        }

        self.emit(SignEvent::SessionRequest {
            topic: request.topic,
            id: request.id,
            chain_id: params.chain_id,
            method: params.request.method,
            params: params.request.params,
        });
        Ok(())
    }

    async fn on_session_update(
        &self,
        request: WcRequest,
        params: SessionUpdateParams,
    ) -> Result<()> {
        let Some(session) = self.session_for(&request).await? else {
            return Ok(());
        };
        if !session.is_peer_controller() {
            return self
                .reply_error(
                    &request,
                    codes::UNAUTHORIZED_UPDATE_REQUEST,
                    "Unauthorized update request",
                )
                .await;
        }

        let valid = validate_session_namespaces(&params.namespaces).and_then(|_| {
            validate_required_namespaces(&session.required_namespaces, &params.namespaces)
        });
        if let Err(e) = valid {
            return self
                .reply_error(&request, codes::INVALID_UPDATE_REQUEST, &e.to_string())
                .await;
        }

        // Updates can overtake each other on the relay
        let timestamp = request.id.timestamp_ms() as u64;
        if timestamp <= session.namespaces_updated_at {
            return self
                .reply_error(&request, codes::INVALID_UPDATE_REQUEST, "Update request is stale")
                .await;
        }

        self.storage.sequences.update_session_namespaces(
            &request.topic,
            params.namespaces.clone(),
            timestamp,
        )?;
        self.interactor.respond_with_success(&request).await?;
        self.emit(SignEvent::SessionUpdate {
            topic: request.topic,
            namespaces: params.namespaces,
        });
        Ok(())
    }

    async fn on_session_extend(
        &self,
        request: WcRequest,
        params: SessionExtendParams,
    ) -> Result<()> {
        let Some(session) = self.session_for(&request).await? else {
            return Ok(());
        };
        if !session.is_peer_controller() {
            return self
                .reply_error(
                    &request,
                    codes::UNAUTHORIZED_EXTEND_REQUEST,
                    "Unauthorized extend request",
                )
                .await;
        }
        if let Err(e) = validate_extend(params.expiry, session.expiry, unix_timestamp()?) {
            return self
                .reply_error(&request, codes::INVALID_EXTEND_REQUEST, &e.to_string())
                .await;
        }

        self.storage
            .sequences
            .update_session_expiry(&request.topic, params.expiry)?;
        self.interactor.respond_with_success(&request).await?;
        self.emit(SignEvent::SessionExtend {
            topic: request.topic,
            expiry: params.expiry,
        });
        Ok(())
    }

    async fn on_session_event(
        &self,
        request: WcRequest,
        params: SessionEventParams,
    ) -> Result<()> {
        let Some(session) = self.session_for(&request).await? else {
            return Ok(());
        };
        let authorized = session.is_peer_controller()
            && is_chain_authorized(&session.namespaces, &params.chain_id)
            && is_event_authorized(&session.namespaces, &params.chain_id, &params.event.name);
        if !authorized {
            return self
                .reply_error(&request, codes::UNAUTHORIZED_EVENT, "Unauthorized event")
                .await;
        }

        self.interactor.respond_with_success(&request).await?;
        self.emit(SignEvent::SessionEvent {
            topic: request.topic,
            chain_id: params.chain_id,
            name: params.event.name,
            data: params.event.data,
        });
        Ok(())
    }

    async fn on_session_delete(
        &self,
        request: WcRequest,
        params: SessionDeleteParams,
    ) -> Result<()> {
        if self.storage.sequences.get_session(&request.topic)?.is_none() {
            log::debug!("delete for unknown session {}", request.topic);
            return Ok(());
        }

        self.delete_session_sequence(&request.topic).await?;
        self.emit(SignEvent::SessionDelete {
            topic: request.topic,
            reason: params.message,
        });
        Ok(())
    }

    async fn on_pairing_delete(
        &self,
        request: WcRequest,
        _params: PairingDeleteParams,
    ) -> Result<()> {
        if self.storage.sequences.get_pairing(&request.topic)?.is_none() {
            log::debug!("delete for unknown pairing {}", request.topic);
            return Ok(());
        }

        self.delete_pairing_sequence(&request.topic).await?;
        self.emit(SignEvent::PairingDelete {
            topic: request.topic,
        });
        Ok(())
    }
}
