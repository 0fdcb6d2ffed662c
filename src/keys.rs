//! Key material per topic.
//!
//! Private keys never leave the store: callers refer to key pairs by their
//! hex public key and to symmetric keys by topic.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::hex;

use crate::error::{Error, Result};
use crate::types::Topic;
use crate::utils::{
    derive_sym_key, random_bytes32, topic_from_sym_key, x25519_public_key,
};

pub trait KeyManagementRepository: Send + Sync {
    /// Generates an X25519 key pair and returns the hex public key.
    fn generate_and_store_x25519_key_pair(&self) -> Result<String>;

    /// Derives the shared key between our key pair and the peer public key.
    fn generate_sym_key_from_key_agreement(
        &self,
        self_public_key: &str,
        peer_public_key: &str,
    ) -> Result<[u8; 32]>;

    /// Derives the shared key, stores it under its topic (sha256 of the key)
    /// and returns the topic.
    fn generate_topic_from_key_agreement(
        &self,
        self_public_key: &str,
        peer_public_key: &str,
    ) -> Result<Topic>;

    fn set_sym_key(&self, topic: &Topic, sym_key: [u8; 32]) -> Result<()>;

    fn get_sym_key(&self, topic: &Topic) -> Result<Option<[u8; 32]>>;

    /// Associates one of our public keys with a topic, for type 1 envelopes.
    fn set_self_public_key(&self, topic: &Topic, public_key: &str) -> Result<()>;

    fn get_self_public_key(&self, topic: &Topic) -> Result<Option<String>>;

    /// Removes every key held for the topic.
    fn remove_keys(&self, topic: &Topic) -> Result<()>;

    /// Removes a key pair that no topic refers to.
    fn remove_key_pair(&self, public_key: &str) -> Result<()>;

    fn has_keys(&self, topic: &Topic) -> Result<bool>;
}

#[derive(Default)]
struct KeyStoreState {
    // public key hex -> private key
    key_pairs: HashMap<String, [u8; 32]>,
    sym_keys: HashMap<Topic, [u8; 32]>,
    self_public_keys: HashMap<Topic, String>,
}

#[derive(Default)]
pub struct InMemoryKeyStore {
    state: Mutex<KeyStoreState>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn private_key(&self, public_key: &str) -> Result<[u8; 32]> {
        self.state
            .lock()?
            .key_pairs
            .get(public_key)
            .copied()
            .ok_or_else(|| {
                Error::Encryption(format!("no private key for {public_key}"))
            })
    }
}

impl KeyManagementRepository for InMemoryKeyStore {
    fn generate_and_store_x25519_key_pair(&self) -> Result<String> {
        let private_key = random_bytes32();
        let public_key = hex::encode(x25519_public_key(private_key));
        self.state
            .lock()?
            .key_pairs
            .insert(public_key.clone(), private_key);
        Ok(public_key)
    }

    fn generate_sym_key_from_key_agreement(
        &self,
        self_public_key: &str,
        peer_public_key: &str,
    ) -> Result<[u8; 32]> {
        let private_key = self.private_key(self_public_key)?;
        let peer = hex::decode_to_array::<_, 32>(peer_public_key)?;
        derive_sym_key(private_key, peer)
    }

    fn generate_topic_from_key_agreement(
        &self,
        self_public_key: &str,
        peer_public_key: &str,
    ) -> Result<Topic> {
        let sym_key = self
            .generate_sym_key_from_key_agreement(self_public_key, peer_public_key)?;
        let topic = topic_from_sym_key(&sym_key);

        let mut state = self.state.lock()?;
        state.sym_keys.insert(topic.clone(), sym_key);
        state
            .self_public_keys
            .insert(topic.clone(), self_public_key.to_string());
        Ok(topic)
    }

    fn set_sym_key(&self, topic: &Topic, sym_key: [u8; 32]) -> Result<()> {
        self.state.lock()?.sym_keys.insert(topic.clone(), sym_key);
        Ok(())
    }

    fn get_sym_key(&self, topic: &Topic) -> Result<Option<[u8; 32]>> {
        Ok(self.state.lock()?.sym_keys.get(topic).copied())
    }

    fn set_self_public_key(&self, topic: &Topic, public_key: &str) -> Result<()> {
        self.state
            .lock()?
            .self_public_keys
            .insert(topic.clone(), public_key.to_string());
        Ok(())
    }

    fn get_self_public_key(&self, topic: &Topic) -> Result<Option<String>> {
        Ok(self.state.lock()?.self_public_keys.get(topic).cloned())
    }

    fn remove_keys(&self, topic: &Topic) -> Result<()> {
        let mut state = self.state.lock()?;
        state.sym_keys.remove(topic);
        if let Some(public_key) = state.self_public_keys.remove(topic) {
            // Key pairs stay when another topic still refers to them
            let shared = state.self_public_keys.values().any(|k| *k == public_key);
            if !shared {
                state.key_pairs.remove(&public_key);
            }
        }
        Ok(())
    }

    fn remove_key_pair(&self, public_key: &str) -> Result<()> {
        let mut state = self.state.lock()?;
        if state.self_public_keys.values().any(|k| k == public_key) {
            log::debug!("key pair {public_key} is still in use");
        } else {
            state.key_pairs.remove(public_key);
        }
        Ok(())
    }

    fn has_keys(&self, topic: &Topic) -> Result<bool> {
        let state = self.state.lock()?;
        Ok(state.sym_keys.contains_key(topic)
            || state.self_public_keys.contains_key(topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_agreement_is_symmetric() {
        let alice = InMemoryKeyStore::new();
        let bob = InMemoryKeyStore::new();

        let alice_key = alice.generate_and_store_x25519_key_pair().unwrap();
        let bob_key = bob.generate_and_store_x25519_key_pair().unwrap();

        let alice_topic = alice
            .generate_topic_from_key_agreement(&alice_key, &bob_key)
            .unwrap();
        let bob_topic = bob
            .generate_topic_from_key_agreement(&bob_key, &alice_key)
            .unwrap();

        assert_eq!(alice_topic, bob_topic);
        assert_eq!(
            alice.get_sym_key(&alice_topic).unwrap(),
            bob.get_sym_key(&bob_topic).unwrap()
        );
        assert_eq!(
            alice.get_self_public_key(&alice_topic).unwrap(),
            Some(alice_key)
        );
    }

    #[test]
    fn test_remove_keys() {
        let store = InMemoryKeyStore::new();
        let topic = Topic::from("t1");
        store.set_sym_key(&topic, [1u8; 32]).unwrap();
        assert!(store.has_keys(&topic).unwrap());

        store.remove_keys(&topic).unwrap();
        assert!(!store.has_keys(&topic).unwrap());
        assert_eq!(store.get_sym_key(&topic).unwrap(), None);
    }

    #[test]
    fn test_remove_key_pair() {
        let store = InMemoryKeyStore::new();
        let peer = hex::encode(x25519_public_key([9u8; 32]));
        let unused = store.generate_and_store_x25519_key_pair().unwrap();
        let in_use = store.generate_and_store_x25519_key_pair().unwrap();
        store.generate_topic_from_key_agreement(&in_use, &peer).unwrap();

        store.remove_key_pair(&unused).unwrap();
        store.remove_key_pair(&in_use).unwrap();

        assert!(store.generate_sym_key_from_key_agreement(&unused, &peer).is_err());
        assert!(store.generate_sym_key_from_key_agreement(&in_use, &peer).is_ok());
    }

    #[test]
    fn test_unknown_key_pair() {
        let store = InMemoryKeyStore::new();
        let err = store
            .generate_sym_key_from_key_agreement(&hex::encode([1u8; 32]), &hex::encode([2u8; 32]))
            .unwrap_err();
        assert!(matches!(err, Error::Encryption(_)));
    }
}
