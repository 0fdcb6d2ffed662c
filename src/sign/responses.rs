//! Handlers for the peer's answers to requests we sent.

use super::engine::SignEngine;
use super::events::{SignEvent, TelemetryEvent};
use crate::error::Result;
use crate::rpc::JsonRpcResponse;
use crate::types::{
    SessionProposeParams, SessionProposeResponse, SessionRequestParams, TransportType,
};
use crate::utils::unix_timestamp;
use crate::wc_message::{WcMethod, WcResponse};

pub const LINK_MODE_RESPONSE_EVENT: &str = "session_request_response_link_mode";

impl SignEngine {
    pub(super) async fn on_response(&self, response: WcResponse) -> Result<()> {
        log::debug!("response {} for {} on {}", response.id(), response.method, response.topic);

        match response.wc_method()? {
            WcMethod::SessionPropose => self.on_session_proposal_response(response).await,
            WcMethod::SessionSettle => self.on_session_settle_response(response).await,
            WcMethod::SessionUpdate => self.on_session_update_response(response).await,
            WcMethod::SessionRequest => self.on_session_request_response(response),
            _ => Ok(()),
        }
    }

    /// dApp side. Approval moves us to the session topic and retires the
    /// pairing, rejection drops the proposal.
    pub(super) async fn on_session_proposal_response(&self, response: WcResponse) -> Result<()> {
        let params: SessionProposeParams = serde_json::from_value(response.params)?;
        let proposer_public_key = params.proposer.public_key;

        match response.response {
            JsonRpcResponse::Result(result) => {
                let approval: SessionProposeResponse = serde_json::from_value(result.result)?;
                let session_topic = self.interactor.keys().generate_topic_from_key_agreement(
                    &proposer_public_key,
                    &approval.responder_public_key,
                )?;
                self.interactor.subscribe(&session_topic).await?;
                log::info!("proposal accepted, waiting for settle on {session_topic}");

                self.delete_pairing_sequence(&response.topic).await
            }
            JsonRpcResponse::Error(error) => {
                self.forget_own_proposal(&proposer_public_key)?;
                log::info!("proposal {proposer_public_key} rejected: {}", error.error.message);
                self.emit(SignEvent::SessionRejected {
                    proposer_public_key,
                    reason: error.error,
                });
                Ok(())
            }
        }
    }

    /// Wallet side. The dApp either acknowledges the settlement or we tear the
    /// session down completely.
    pub(super) async fn on_session_settle_response(&self, response: WcResponse) -> Result<()> {
        let topic = response.topic;
        let session = match self.storage.sequences.get_session(&topic)? {
            Some(session) if !session.is_expired(unix_timestamp()?) => session,
            _ => {
                log::debug!("settle response for gone session {topic}");
                return Ok(());
            }
        };

        match response.response {
            JsonRpcResponse::Result(_) => {
                self.storage.sequences.acknowledge_session(&topic)?;
                self.emit(SignEvent::SessionSettled(crate::storage::Session {
                    is_acknowledged: true,
                    ..session
                }));
            }
            JsonRpcResponse::Error(error) => {
                self.delete_session_sequence(&topic).await?;
                self.emit(SignEvent::SessionSettleFailed {
                    topic,
                    reason: error.error,
                });
            }
        }
        Ok(())
    }

    /// Controller side. Only the newest staged update may be committed.
    pub(super) async fn on_session_update_response(&self, response: WcResponse) -> Result<()> {
        let topic = response.topic.clone();
        if !self.storage.sequences.is_session_valid(&topic)? {
            log::debug!("update response for invalid session {topic}");
            return Ok(());
        }

        // Ids grow with time and stay ordered within one millisecond
        let latest = self.storage.sequences.latest_temp_namespaces(&topic)?;
        if latest.is_some_and(|latest| response.id() < latest.request_id) {
            log::debug!("stale update response {} on {topic}", response.id());
            return Ok(());
        }
        let Some(staged) = self
            .storage
            .sequences
            .get_temp_namespaces(&topic, response.id())?
        else {
            log::debug!("no staged update for {} on {topic}", response.id());
            return Ok(());
        };

        match response.response {
            JsonRpcResponse::Result(_) => {
                self.storage.sequences.update_session_namespaces(
                    &topic,
                    staged.namespaces.clone(),
                    staged.timestamp,
                )?;
                self.storage
                    .sequences
                    .delete_temp_namespaces_until(&topic, staged.request_id)?;
                self.emit(SignEvent::SessionUpdateResponse {
                    topic,
                    result: Ok(staged.namespaces),
                });
            }
            JsonRpcResponse::Error(error) => {
                self.storage
                    .sequences
                    .delete_temp_namespaces_until(&topic, staged.request_id)?;
                self.emit(SignEvent::SessionUpdateResponse {
                    topic,
                    result: Err(error.error),
                });
            }
        }
        Ok(())
    }

    pub(super) fn on_session_request_response(&self, response: WcResponse) -> Result<()> {
        let params: SessionRequestParams = serde_json::from_value(response.params)?;

        // Link mode has no relay ack, so delivery is reported here
        if response.transport_type == TransportType::LinkMode {
            self.telemetry.record(TelemetryEvent {
                name: LINK_MODE_RESPONSE_EVENT,
                topic: response.topic.clone(),
                request_id: response.response.id(),
            });
        }

        self.emit(SignEvent::SessionRequestResponse {
            topic: response.topic,
            chain_id: params.chain_id,
            method: params.request.method,
            response: response.response,
        });
        Ok(())
    }
}
