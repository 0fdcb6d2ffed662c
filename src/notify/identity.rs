//! Collaborators the Notify engine reaches outside the relay: DID documents
//! of apps and the notify server, the keyserver, and the wallet that signs
//! the identity CACAO.

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::cacao::Cacao;
use crate::error::{Error, Result};
use crate::utils::{AccountId, encode_iss};

const DID_JSON_PATH: &str = "/.well-known/did.json";
const IDENTITY_PATH: &str = "/identity";

/// Public keys published by a domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DidKeys {
    /// Ed25519 key the domain signs its JWTs with.
    pub authentication: [u8; 32],
    /// X25519 key used to derive the first encrypted topic.
    pub key_agreement: [u8; 32],
}

impl DidKeys {
    pub fn authentication_did_key(&self) -> String {
        encode_iss(&self.authentication)
    }
}

#[derive(Debug, Deserialize)]
pub struct DidDocument {
    pub id: String,
    #[serde(rename = "verificationMethod", default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(rename = "keyAgreement", default)]
    pub key_agreement: Vec<String>,
    #[serde(default)]
    pub authentication: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "publicKeyJwk")]
    pub public_key_jwk: PublicKeyJwk,
}

#[derive(Debug, Deserialize)]
pub struct PublicKeyJwk {
    pub x: String,
}

impl DidDocument {
    fn key(&self, references: &[String], purpose: &str) -> Result<[u8; 32]> {
        let method = references
            .iter()
            .find_map(|reference| {
                self.verification_method
                    .iter()
                    .find(|method| &method.id == reference)
            })
            .ok_or_else(|| {
                Error::InternalError(format!("{} has no {purpose} key", self.id))
            })?;

        let bytes = Base64UrlUnpadded::decode_vec(&method.public_key_jwk.x)?;
        bytes.as_slice().try_into().map_err(|_| {
            Error::InternalError(format!(
                "{purpose} key of {} is {} bytes",
                self.id,
                bytes.len()
            ))
        })
    }

    pub fn keys(&self) -> Result<DidKeys> {
        Ok(DidKeys {
            authentication: self.key(&self.authentication, "authentication")?,
            key_agreement: self.key(&self.key_agreement, "key agreement")?,
        })
    }
}

#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Result<DidKeys>;
}

/// Reads `did:web` documents over HTTPS.
pub struct HttpDidResolver {
    client: Client,
}

impl HttpDidResolver {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpDidResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DidResolver for HttpDidResolver {
    async fn resolve(&self, domain: &str) -> Result<DidKeys> {
        let url = format!("https://{domain}{DID_JSON_PATH}");
        log::debug!("resolving {url}");

        let document: DidDocument = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        document.keys()
    }
}

/// Keyserver registry of identity keys.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn register_identity(&self, keyserver_url: &str, cacao: &Cacao) -> Result<()>;

    /// `id_auth` is an `unregister_identity` JWT signed by the identity key.
    async fn unregister_identity(&self, keyserver_url: &str, id_auth: &str) -> Result<()>;
}

pub struct HttpKeyserverClient {
    client: Client,
}

impl HttpKeyserverClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpKeyserverClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityClient for HttpKeyserverClient {
    async fn register_identity(&self, keyserver_url: &str, cacao: &Cacao) -> Result<()> {
        self.client
            .post(format!("{keyserver_url}{IDENTITY_PATH}"))
            .json(&json!({ "cacao": cacao }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn unregister_identity(&self, keyserver_url: &str, id_auth: &str) -> Result<()> {
        self.client
            .delete(format!("{keyserver_url}{IDENTITY_PATH}"))
            .json(&json!({ "idAuth": id_auth }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Signs a CAIP-122 message with the account's wallet. Returns the signature
/// as the wallet encodes it, e.g. a 0x prefixed EIP-191 signature.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    async fn sign_message(&self, account: &AccountId, message: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_did_document_keys() {
        let auth = [7u8; 32];
        let agreement = [9u8; 32];
        let document: DidDocument = serde_json::from_value(json!({
            "@context": ["https://www.w3.org/ns/did/v1"],
            "id": "did:web:notify.example",
            "verificationMethod": [
                {
                    "id": "did:web:notify.example#wc-notify-subscribe-key",
                    "type": "JsonWebKey2020",
                    "controller": "did:web:notify.example",
                    "publicKeyJwk": {
                        "kty": "OKP",
                        "crv": "X25519",
                        "x": Base64UrlUnpadded::encode_string(&agreement)
                    }
                },
                {
                    "id": "did:web:notify.example#wc-notify-authentication-key",
                    "type": "JsonWebKey2020",
                    "controller": "did:web:notify.example",
                    "publicKeyJwk": {
                        "kty": "OKP",
                        "crv": "Ed25519",
                        "x": Base64UrlUnpadded::encode_string(&auth)
                    }
                }
            ],
            "authentication": ["did:web:notify.example#wc-notify-authentication-key"],
            "keyAgreement": ["did:web:notify.example#wc-notify-subscribe-key"]
        }))
        .unwrap();

        let keys = document.keys().unwrap();
        assert_eq!(keys.authentication, auth);
        assert_eq!(keys.key_agreement, agreement);
        assert!(keys.authentication_did_key().starts_with("did:key:z6Mk"));
    }

    #[test]
    fn test_missing_key_reference() {
        let document: DidDocument = serde_json::from_value(json!({
            "id": "did:web:app.example",
            "verificationMethod": [],
            "authentication": ["did:web:app.example#key-0"]
        }))
        .unwrap();
        assert!(document.keys().is_err());
    }
}
