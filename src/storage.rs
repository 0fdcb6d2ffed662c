//! Sequence, proposal and metadata persistence for the Sign engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rpc::RequestId;
use crate::types::{
    Metadata, Namespaces, Relay, SessionProposeParams, Topic, TransportType,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pairing {
    pub topic: Topic,
    pub expiry: u64,
    pub relay: Relay,
    pub uri: String,
    pub methods: Option<Vec<String>>,
    pub peer_metadata: Option<Metadata>,
    /// Set once a proposal went through the pairing.
    pub is_active: bool,
}

/// Proposal waiting for the wallet's answer, keyed by the proposer public key.
#[derive(Clone, Debug, PartialEq)]
pub struct ProposalRecord {
    pub request_id: RequestId,
    pub pairing_topic: Topic,
    pub proposer_public_key: String,
    pub params: SessionProposeParams,
    pub expiry: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub topic: Topic,
    pub pairing_topic: Topic,
    pub expiry: u64,
    pub relay: Relay,
    pub self_public_key: String,
    pub peer_public_key: String,
    pub controller_key: String,
    pub self_metadata: Metadata,
    pub peer_metadata: Metadata,
    pub namespaces: Namespaces,
    pub required_namespaces: Namespaces,
    pub optional_namespaces: Namespaces,
    pub session_properties: Option<HashMap<String, String>>,
    pub scoped_properties: Option<HashMap<String, String>>,
    pub is_acknowledged: bool,
    /// Millisecond timestamp of the last applied namespace update.
    pub namespaces_updated_at: u64,
    pub transport_type: TransportType,
}

impl Session {
    pub fn is_self_controller(&self) -> bool {
        self.controller_key == self.self_public_key
    }

    pub fn is_peer_controller(&self) -> bool {
        self.controller_key == self.peer_public_key
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry <= now
    }
}

/// Namespaces sent in an update that the peer has not acknowledged yet.
#[derive(Clone, Debug, PartialEq)]
pub struct TempNamespaces {
    pub topic: Topic,
    pub request_id: RequestId,
    pub namespaces: Namespaces,
    /// Millisecond timestamp carried by the request id.
    pub timestamp: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataType {
    SelfApp,
    Peer,
}

pub trait SequenceStorageRepository: Send + Sync {
    fn insert_pairing(&self, pairing: Pairing) -> Result<()>;
    fn get_pairing(&self, topic: &Topic) -> Result<Option<Pairing>>;
    fn get_pairings(&self) -> Result<Vec<Pairing>>;
    fn activate_pairing(&self, topic: &Topic, expiry: u64) -> Result<()>;
    fn delete_pairing(&self, topic: &Topic) -> Result<()>;

    fn insert_session(&self, session: Session) -> Result<()>;
    fn get_session(&self, topic: &Topic) -> Result<Option<Session>>;
    fn get_sessions(&self) -> Result<Vec<Session>>;
    /// Whether the session exists and is acknowledged.
    fn is_session_valid(&self, topic: &Topic) -> Result<bool>;
    fn acknowledge_session(&self, topic: &Topic) -> Result<()>;
    fn update_session_namespaces(
        &self,
        topic: &Topic,
        namespaces: Namespaces,
        updated_at: u64,
    ) -> Result<()>;
    fn update_session_expiry(&self, topic: &Topic, expiry: u64) -> Result<()>;
    fn delete_session(&self, topic: &Topic) -> Result<()>;

    fn insert_temp_namespaces(&self, temp: TempNamespaces) -> Result<()>;
    fn get_temp_namespaces(
        &self,
        topic: &Topic,
        request_id: RequestId,
    ) -> Result<Option<TempNamespaces>>;
    /// Newest staged write on the topic, by request id.
    fn latest_temp_namespaces(&self, topic: &Topic) -> Result<Option<TempNamespaces>>;
    /// Drops staged writes on the topic up to and including `request_id`.
    fn delete_temp_namespaces_until(
        &self,
        topic: &Topic,
        request_id: RequestId,
    ) -> Result<()>;
}

pub trait ProposalStorageRepository: Send + Sync {
    fn insert_proposal(&self, proposal: ProposalRecord) -> Result<()>;
    fn get_proposal(&self, proposer_public_key: &str) -> Result<Option<ProposalRecord>>;
    fn get_proposals(&self) -> Result<Vec<ProposalRecord>>;
    fn delete_proposal(&self, proposer_public_key: &str) -> Result<()>;
}

pub trait MetadataStorageRepository: Send + Sync {
    fn upsert_metadata(
        &self,
        topic: &Topic,
        metadata: Metadata,
        kind: MetadataType,
    ) -> Result<()>;
    fn get_metadata(&self, topic: &Topic, kind: MetadataType) -> Result<Option<Metadata>>;
    fn delete_metadata(&self, topic: &Topic) -> Result<()>;
}

#[derive(Default)]
struct StorageState {
    pairings: HashMap<Topic, Pairing>,
    sessions: HashMap<Topic, Session>,
    temp_namespaces: HashMap<Topic, Vec<TempNamespaces>>,
    proposals: HashMap<String, ProposalRecord>,
    metadata: HashMap<(Topic, MetadataType), Metadata>,
}

#[derive(Default)]
pub struct InMemoryStorage {
    state: Mutex<StorageState>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceStorageRepository for InMemoryStorage {
    fn insert_pairing(&self, pairing: Pairing) -> Result<()> {
        self.state
            .lock()?
            .pairings
            .insert(pairing.topic.clone(), pairing);
        Ok(())
    }

    fn get_pairing(&self, topic: &Topic) -> Result<Option<Pairing>> {
        Ok(self.state.lock()?.pairings.get(topic).cloned())
    }

    fn get_pairings(&self) -> Result<Vec<Pairing>> {
        Ok(self.state.lock()?.pairings.values().cloned().collect())
    }

    fn activate_pairing(&self, topic: &Topic, expiry: u64) -> Result<()> {
        let mut state = self.state.lock()?;
        let pairing = state
            .pairings
            .get_mut(topic)
            .ok_or_else(|| Error::NoSequence(topic.clone()))?;
        pairing.is_active = true;
        pairing.expiry = expiry;
        Ok(())
    }

    fn delete_pairing(&self, topic: &Topic) -> Result<()> {
        self.state.lock()?.pairings.remove(topic);
        Ok(())
    }

    fn insert_session(&self, session: Session) -> Result<()> {
        self.state
            .lock()?
            .sessions
            .insert(session.topic.clone(), session);
        Ok(())
    }

    fn get_session(&self, topic: &Topic) -> Result<Option<Session>> {
        Ok(self.state.lock()?.sessions.get(topic).cloned())
    }

    fn get_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.state.lock()?.sessions.values().cloned().collect())
    }

    fn is_session_valid(&self, topic: &Topic) -> Result<bool> {
        Ok(self
            .state
            .lock()?
            .sessions
            .get(topic)
            .is_some_and(|s| s.is_acknowledged))
    }

    fn acknowledge_session(&self, topic: &Topic) -> Result<()> {
        let mut state = self.state.lock()?;
        let session = state
            .sessions
            .get_mut(topic)
            .ok_or_else(|| Error::NoSequence(topic.clone()))?;
        session.is_acknowledged = true;
        Ok(())
    }

    fn update_session_namespaces(
        &self,
        topic: &Topic,
        namespaces: Namespaces,
        updated_at: u64,
    ) -> Result<()> {
        let mut state = self.state.lock()?;
        let session = state
            .sessions
            .get_mut(topic)
            .ok_or_else(|| Error::NoSequence(topic.clone()))?;
        session.namespaces = namespaces;
        session.namespaces_updated_at = updated_at;
        Ok(())
    }

    fn update_session_expiry(&self, topic: &Topic, expiry: u64) -> Result<()> {
        let mut state = self.state.lock()?;
        let session = state
            .sessions
            .get_mut(topic)
            .ok_or_else(|| Error::NoSequence(topic.clone()))?;
        session.expiry = expiry;
        Ok(())
    }

    fn delete_session(&self, topic: &Topic) -> Result<()> {
        let mut state = self.state.lock()?;
        state.sessions.remove(topic);
        state.temp_namespaces.remove(topic);
        Ok(())
    }

    fn insert_temp_namespaces(&self, temp: TempNamespaces) -> Result<()> {
        self.state
            .lock()?
            .temp_namespaces
            .entry(temp.topic.clone())
            .or_default()
            .push(temp);
        Ok(())
    }

    fn get_temp_namespaces(
        &self,
        topic: &Topic,
        request_id: RequestId,
    ) -> Result<Option<TempNamespaces>> {
        Ok(self
            .state
            .lock()?
            .temp_namespaces
            .get(topic)
            .and_then(|staged| staged.iter().find(|t| t.request_id == request_id))
            .cloned())
    }

    fn latest_temp_namespaces(&self, topic: &Topic) -> Result<Option<TempNamespaces>> {
        Ok(self
            .state
            .lock()?
            .temp_namespaces
            .get(topic)
            .and_then(|staged| staged.iter().max_by_key(|t| t.request_id))
            .cloned())
    }

    fn delete_temp_namespaces_until(
        &self,
        topic: &Topic,
        request_id: RequestId,
    ) -> Result<()> {
        let mut state = self.state.lock()?;
        if let Some(staged) = state.temp_namespaces.get_mut(topic) {
            staged.retain(|t| t.request_id > request_id);
            if staged.is_empty() {
                state.temp_namespaces.remove(topic);
            }
        }
        Ok(())
    }
}

impl ProposalStorageRepository for InMemoryStorage {
    fn insert_proposal(&self, proposal: ProposalRecord) -> Result<()> {
        self.state
            .lock()?
            .proposals
            .insert(proposal.proposer_public_key.clone(), proposal);
        Ok(())
    }

    fn get_proposal(&self, proposer_public_key: &str) -> Result<Option<ProposalRecord>> {
        Ok(self.state.lock()?.proposals.get(proposer_public_key).cloned())
    }

    fn get_proposals(&self) -> Result<Vec<ProposalRecord>> {
        Ok(self.state.lock()?.proposals.values().cloned().collect())
    }

    fn delete_proposal(&self, proposer_public_key: &str) -> Result<()> {
        self.state.lock()?.proposals.remove(proposer_public_key);
        Ok(())
    }
}

impl MetadataStorageRepository for InMemoryStorage {
    fn upsert_metadata(
        &self,
        topic: &Topic,
        metadata: Metadata,
        kind: MetadataType,
    ) -> Result<()> {
        self.state
            .lock()?
            .metadata
            .insert((topic.clone(), kind), metadata);
        Ok(())
    }

    fn get_metadata(&self, topic: &Topic, kind: MetadataType) -> Result<Option<Metadata>> {
        Ok(self
            .state
            .lock()?
            .metadata
            .get(&(topic.clone(), kind))
            .cloned())
    }

    fn delete_metadata(&self, topic: &Topic) -> Result<()> {
        self.state.lock()?.metadata.retain(|(t, _), _| t != topic);
        Ok(())
    }
}

/// Storage handles used by the Sign engine.
#[derive(Clone)]
pub struct SignStorage {
    pub sequences: Arc<dyn SequenceStorageRepository>,
    pub proposals: Arc<dyn ProposalStorageRepository>,
    pub metadata: Arc<dyn MetadataStorageRepository>,
}

impl SignStorage {
    pub fn in_memory() -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        Self {
            sequences: storage.clone(),
            proposals: storage.clone(),
            metadata: storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(topic: &Topic, id: i64) -> TempNamespaces {
        TempNamespaces {
            topic: topic.clone(),
            request_id: RequestId(id),
            namespaces: Namespaces::new(),
            timestamp: RequestId(id).timestamp_ms() as u64,
        }
    }

    #[test]
    fn test_temp_namespaces_staging() {
        let storage = InMemoryStorage::new();
        let topic = Topic::from("session");

        storage.insert_temp_namespaces(temp(&topic, 1_000_000)).unwrap();
        storage.insert_temp_namespaces(temp(&topic, 2_000_000)).unwrap();

        let latest = storage.latest_temp_namespaces(&topic).unwrap().unwrap();
        assert_eq!(latest.request_id, RequestId(2_000_000));
        assert!(storage
            .get_temp_namespaces(&topic, RequestId(1_000_000))
            .unwrap()
            .is_some());

        storage
            .delete_temp_namespaces_until(&topic, RequestId(1_000_000))
            .unwrap();
        assert!(storage
            .get_temp_namespaces(&topic, RequestId(1_000_000))
            .unwrap()
            .is_none());
        assert!(storage.latest_temp_namespaces(&topic).unwrap().is_some());

        storage
            .delete_temp_namespaces_until(&topic, RequestId(2_000_000))
            .unwrap();
        assert!(storage.latest_temp_namespaces(&topic).unwrap().is_none());

        // Same millisecond, the id still tells them apart
        storage.insert_temp_namespaces(temp(&topic, 3_000_001)).unwrap();
        storage.insert_temp_namespaces(temp(&topic, 3_000_002)).unwrap();
        let latest = storage.latest_temp_namespaces(&topic).unwrap().unwrap();
        assert_eq!(latest.request_id, RequestId(3_000_002));
        storage
            .delete_temp_namespaces_until(&topic, RequestId(3_000_001))
            .unwrap();
        assert!(storage
            .get_temp_namespaces(&topic, RequestId(3_000_002))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_missing_sequence() {
        let storage = InMemoryStorage::new();
        let topic = Topic::from("missing");
        assert!(matches!(
            storage.acknowledge_session(&topic),
            Err(Error::NoSequence(_))
        ));
        assert!(!storage.is_session_valid(&topic).unwrap());
    }

    #[test]
    fn test_metadata_is_deleted_with_topic() {
        let storage = InMemoryStorage::new();
        let topic = Topic::from("t");
        let metadata = Metadata {
            name: "dapp".to_string(),
            description: String::new(),
            url: "https://dapp.example".to_string(),
            icons: vec![],
            redirect: None,
        };
        storage
            .upsert_metadata(&topic, metadata.clone(), MetadataType::Peer)
            .unwrap();
        storage
            .upsert_metadata(&topic, metadata.clone(), MetadataType::SelfApp)
            .unwrap();
        assert_eq!(
            storage.get_metadata(&topic, MetadataType::Peer).unwrap(),
            Some(metadata)
        );

        storage.delete_metadata(&topic).unwrap();
        assert!(storage.get_metadata(&topic, MetadataType::Peer).unwrap().is_none());
        assert!(storage.get_metadata(&topic, MetadataType::SelfApp).unwrap().is_none());
    }
}
