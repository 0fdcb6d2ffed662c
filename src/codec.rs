//! Envelope encryption.
//!
//! Envelope layout before base64:
//!
//! ```text
//! type 0: 0x00 | iv(12) | sealed
//! type 1: 0x01 | sender public key(32) | iv(12) | sealed
//! type 2: 0x02 | plaintext json
//! ```

use std::sync::Arc;

use alloy::hex;
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{AeadCore, ChaCha20Poly1305, Key, Nonce};

use crate::error::{Error, Result};
use crate::keys::KeyManagementRepository;
use crate::types::Topic;
use crate::utils::topic_from_sym_key;

pub const IV_LENGTH: usize = 12;
pub const KEY_LENGTH: usize = 32;
pub const TYPE_LENGTH: usize = 1;
pub const TYPE_0: u8 = 0;
pub const TYPE_1: u8 = 1;
pub const TYPE_2: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeType {
    Zero,
    /// Carries the sender public key so the receiver can derive the key.
    One { sender_public_key: [u8; KEY_LENGTH] },
    /// Unencrypted, for link mode delivery.
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingType {
    #[default]
    Base64,
    Base64Url,
}

#[derive(Debug)]
pub struct EncryptedEnvelope {
    pub type_byte: u8,
    pub sealed: Vec<u8>,
    pub iv: Vec<u8>,
    // only for type 1 message - helps the receiver derive the sym key
    pub sender_public_key: Option<Vec<u8>>,
}

impl EncryptedEnvelope {
    pub fn serialize(&self, encoding: EncodingType) -> Result<String> {
        let mut bytes = vec![self.type_byte];

        match self.type_byte {
            TYPE_2 => {
                bytes.extend_from_slice(&self.sealed);
            }
            TYPE_1 => {
                let sender = self.sender_public_key.as_ref().ok_or_else(|| {
                    Error::Encryption(
                        "missing sender public key for type 1 envelope".into(),
                    )
                })?;
                bytes.extend_from_slice(sender);
                bytes.extend_from_slice(&self.iv);
                bytes.extend_from_slice(&self.sealed);
            }
            _ => {
                bytes.extend_from_slice(&self.iv);
                bytes.extend_from_slice(&self.sealed);
            }
        }

        Ok(match encoding {
            EncodingType::Base64 => Base64::encode_string(&bytes),
            EncodingType::Base64Url => Base64UrlUnpadded::encode_string(&bytes),
        })
    }

    pub fn deserialize(encoded: &str, encoding: EncodingType) -> Result<Self> {
        let bytes = match encoding {
            EncodingType::Base64 => Base64::decode_vec(encoded),
            EncodingType::Base64Url => Base64UrlUnpadded::decode_vec(encoded),
        }
        .map_err(|e| Error::Decryption(e.to_string()))?;

        let type_byte = *bytes
            .first()
            .ok_or_else(|| Error::Decryption("empty envelope".into()))?;
        let slice1 = TYPE_LENGTH;

        let too_short = || {
            Error::Decryption(format!(
                "envelope of type {type_byte} too short: {} bytes",
                bytes.len()
            ))
        };

        match type_byte {
            TYPE_0 => {
                let slice2 = slice1 + IV_LENGTH;
                if bytes.len() < slice2 {
                    return Err(too_short());
                }
                Ok(EncryptedEnvelope {
                    type_byte,
                    iv: bytes[slice1..slice2].to_vec(),
                    sealed: bytes[slice2..].to_vec(),
                    sender_public_key: None,
                })
            }
            TYPE_1 => {
                let slice2 = slice1 + KEY_LENGTH;
                let slice3 = slice2 + IV_LENGTH;
                if bytes.len() < slice3 {
                    return Err(too_short());
                }
                Ok(EncryptedEnvelope {
                    type_byte,
                    sender_public_key: Some(bytes[slice1..slice2].to_vec()),
                    iv: bytes[slice2..slice3].to_vec(),
                    sealed: bytes[slice3..].to_vec(),
                })
            }
            TYPE_2 => Ok(EncryptedEnvelope {
                type_byte,
                iv: vec![],
                sealed: bytes[slice1..].to_vec(),
                sender_public_key: None,
            }),
            other => Err(Error::Decryption(format!("unknown envelope type {other}"))),
        }
    }
}

pub fn seal(sym_key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(sym_key));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Encryption(e.to_string()))?;
    Ok((nonce.to_vec(), sealed))
}

pub fn open(sym_key: &[u8; 32], iv: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(sym_key));
    cipher
        .decrypt(Nonce::from_slice(iv), sealed)
        .map_err(|_| Error::Decryption("authentication tag mismatch".into()))
}

/// Encrypts and decrypts payloads with the key registered for a topic.
pub struct Codec {
    keys: Arc<dyn KeyManagementRepository>,
}

impl Codec {
    pub fn new(keys: Arc<dyn KeyManagementRepository>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &Arc<dyn KeyManagementRepository> {
        &self.keys
    }

    pub fn encrypt(
        &self,
        topic: &Topic,
        message: &str,
        envelope_type: EnvelopeType,
    ) -> Result<String> {
        self.encrypt_with_encoding(
            topic,
            message,
            envelope_type,
            EncodingType::Base64,
        )
    }

    pub fn encrypt_with_encoding(
        &self,
        topic: &Topic,
        message: &str,
        envelope_type: EnvelopeType,
        encoding: EncodingType,
    ) -> Result<String> {
        let envelope = match envelope_type {
            EnvelopeType::Two => EncryptedEnvelope {
                type_byte: TYPE_2,
                sealed: message.as_bytes().to_vec(),
                iv: vec![],
                sender_public_key: None,
            },
            EnvelopeType::Zero | EnvelopeType::One { .. } => {
                let sym_key = self.keys.get_sym_key(topic)?.ok_or_else(|| {
                    Error::Encryption(format!("no key for topic {topic}"))
                })?;
                let (iv, sealed) = seal(&sym_key, message.as_bytes())?;
                match envelope_type {
                    EnvelopeType::One { sender_public_key } => EncryptedEnvelope {
                        type_byte: TYPE_1,
                        sealed,
                        iv,
                        sender_public_key: Some(sender_public_key.to_vec()),
                    },
                    _ => EncryptedEnvelope {
                        type_byte: TYPE_0,
                        sealed,
                        iv,
                        sender_public_key: None,
                    },
                }
            }
        };

        envelope.serialize(encoding)
    }

    pub fn decrypt(&self, topic: &Topic, envelope: &str) -> Result<String> {
        self.decrypt_with_encoding(topic, envelope, EncodingType::Base64)
    }

    pub fn decrypt_with_encoding(
        &self,
        topic: &Topic,
        envelope: &str,
        encoding: EncodingType,
    ) -> Result<String> {
        let envelope = EncryptedEnvelope::deserialize(envelope, encoding)?;

        let plaintext = match envelope.type_byte {
            TYPE_2 => envelope.sealed,
            TYPE_1 => {
                let sender = envelope.sender_public_key.as_ref().ok_or_else(|| {
                    Error::Decryption("missing sender public key".into())
                })?;
                let self_public_key =
                    self.keys.get_self_public_key(topic)?.ok_or_else(|| {
                        Error::Decryption(format!(
                            "no public key registered for topic {topic}"
                        ))
                    })?;
                let sym_key = self.keys.generate_sym_key_from_key_agreement(
                    &self_public_key,
                    &hex::encode(sender),
                )?;
                // Replies to a type 1 envelope go to the derived topic
                self.keys
                    .set_sym_key(&topic_from_sym_key(&sym_key), sym_key)?;
                open(&sym_key, &envelope.iv, &envelope.sealed)?
            }
            _ => {
                let sym_key = self.keys.get_sym_key(topic)?.ok_or_else(|| {
                    Error::Decryption(format!("no key for topic {topic}"))
                })?;
                open(&sym_key, &envelope.iv, &envelope.sealed)?
            }
        };

        String::from_utf8(plaintext).map_err(|e| Error::Decryption(e.to_string()))
    }
}
