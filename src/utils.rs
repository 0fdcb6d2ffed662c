use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::hex;
use alloy::primitives::Address;
use base64ct::{Base64, Encoding};
use hkdf::Hkdf;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use url::form_urlencoded;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{
    constants::{
        DID_DELIMITER, DID_METHOD_KEY, DID_METHOD_PKH, DID_METHOD_WEB, DID_PREFIX,
        MULTICODEC_ED25519_BASE, MULTICODEC_ED25519_HEADER,
        MULTICODEC_ED25519_LENGTH, PAIRING_URI_VERSION, RELAY_PROTOCOL,
    },
    error::{Error, Result},
    types::Topic,
};

#[derive(Debug, PartialEq)]
pub struct UriParameters {
    pub protocol: String,
    pub topic: Topic,
    pub version: u32,
    pub sym_key: [u8; 32],
    pub relay: RelayProtocolOptions,
    pub methods: Option<Vec<String>>,
    pub expiry_timestamp: Option<u64>,
}

#[derive(Debug, PartialEq)]
pub struct RelayProtocolOptions {
    pub protocol: String,
    pub data: Option<String>,
}

impl UriParameters {
    pub fn new(topic: Topic, sym_key: [u8; 32], expiry_timestamp: u64) -> Self {
        Self {
            protocol: String::new(),
            topic,
            version: PAIRING_URI_VERSION,
            sym_key,
            relay: RelayProtocolOptions {
                protocol: RELAY_PROTOCOL.to_string(),
                data: None,
            },
            methods: None,
            expiry_timestamp: Some(expiry_timestamp),
        }
    }

    /// Renders the `wc:` pairing uri shown to the wallet.
    pub fn to_uri(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("relay-protocol", &self.relay.protocol);
        if let Some(data) = &self.relay.data {
            query.append_pair("relay-data", data);
        }
        query.append_pair("symKey", &hex::encode(self.sym_key));
        if let Some(expiry) = self.expiry_timestamp {
            query.append_pair("expiryTimestamp", &expiry.to_string());
        }
        if let Some(methods) = &self.methods {
            query.append_pair("methods", &methods.join(","));
        }
        format!("wc:{}@{}?{}", self.topic, self.version, query.finish())
    }
}

pub fn parse_uri(mut input: String) -> Result<UriParameters> {
    if !input.contains("wc:") {
        if let Ok(decoded_bytes) = Base64::decode_vec(&input) {
            if let Ok(decoded_str) = String::from_utf8(decoded_bytes) {
                if decoded_str.contains("wc:") {
                    input = decoded_str;
                }
            }
        }
    }

    // Strip schema prefixes
    if input.contains("wc://") {
        input = input.replacen("wc://", "", 1);
    } else if input.contains("wc:") {
        input = input.replacen("wc:", "", 1);
    }

    let path_end = input.find('?').ok_or(Error::PathEndNotFound)?;
    let path = &input[..path_end];
    let query_string = &input[path_end + 1..];

    let required_values: Vec<&str> = path.split('@').collect();

    if required_values.len() != 2 {
        return Err(Error::InvalidUri);
    }

    let mut query_params: HashMap<String, String> = HashMap::new();
    for (key, value) in form_urlencoded::parse(query_string.as_bytes()) {
        query_params.insert(key.into(), value.into());
    }

    let methods = query_params
        .get("methods")
        .map(|m| m.split(',').map(|s| s.to_string()).collect());

    let sym_key = query_params
        .get("symKey")
        .ok_or(Error::SymKeyNotMentioned)?;

    Ok(UriParameters {
        protocol: String::new(),
        topic: Topic::new(parse_topic(required_values[0])),
        version: required_values[1].parse()?,
        sym_key: hex::decode_to_array::<_, 32>(sym_key)?,
        relay: parse_relay_params(&query_params)?,
        methods,
        expiry_timestamp: query_params
            .get("expiryTimestamp")
            .and_then(|v| v.parse().ok()),
    })
}

pub fn parse_topic(topic: &str) -> String {
    topic.strip_prefix("//").unwrap_or(topic).to_string()
}

pub fn parse_relay_params(
    params: &HashMap<String, String>,
) -> Result<RelayProtocolOptions> {
    let protocol_key = "relay-protocol";
    let data_key = "relay-data";

    let protocol = params
        .get(protocol_key)
        .ok_or(Error::RelayProtocolNotMentioned)?
        .clone();
    let data = params.get(data_key).cloned();

    Ok(RelayProtocolOptions { protocol, data })
}

pub fn random_bytes32() -> [u8; 32] {
    let mut random_value = [0u8; 32];
    OsRng.fill_bytes(&mut random_value);
    random_value
}

pub fn sha256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Sha256::digest(data.as_ref()).into()
}

/// Topic of a symmetric key: the hex sha256 of the key.
pub fn topic_from_sym_key(sym_key: &[u8; 32]) -> Topic {
    Topic::new(hex::encode(sha256(sym_key)))
}

/// Topic a peer listens on for type 1 envelopes addressed to its key
/// agreement key.
pub fn topic_from_public_key(public_key: &[u8; 32]) -> Topic {
    Topic::new(hex::encode(sha256(public_key)))
}

pub fn x25519_public_key(private_key: [u8; 32]) -> [u8; 32] {
    PublicKey::from(&StaticSecret::from(private_key)).to_bytes()
}

/// X25519 agreement followed by HKDF-SHA256 without salt or info.
pub fn derive_sym_key(
    self_private_key: [u8; 32],
    peer_public_key: [u8; 32],
) -> Result<[u8; 32]> {
    let secret = StaticSecret::from(self_private_key);
    let shared = secret.diffie_hellman(&PublicKey::from(peer_public_key));

    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut sym_key = [0u8; 32];
    hk.expand(&[], &mut sym_key)
        .map_err(|e| Error::Encryption(e.to_string()))?;
    Ok(sym_key)
}

pub fn unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

pub fn unix_timestamp_ms() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64)
}

/// `did:key` of an Ed25519 public key.
pub fn encode_iss(public_key: &[u8; 32]) -> String {
    let combined = [MULTICODEC_ED25519_HEADER.as_slice(), public_key].concat();
    let multicodec = format!(
        "{}{}",
        MULTICODEC_ED25519_BASE,
        bs58::encode(combined).into_string()
    );

    [DID_PREFIX, DID_METHOD_KEY, &multicodec].join(DID_DELIMITER)
}

/// Inverse of [`encode_iss`].
pub fn decode_iss(iss: &str) -> Result<[u8; 32]> {
    let prefix = format!(
        "{DID_PREFIX}{DID_DELIMITER}{DID_METHOD_KEY}{DID_DELIMITER}{MULTICODEC_ED25519_BASE}"
    );
    let encoded = iss
        .strip_prefix(&prefix)
        .ok_or_else(|| Error::InvalidJwt(format!("not an ed25519 did:key: {iss}")))?;
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| Error::InvalidJwt(e.to_string()))?;

    let header_len = MULTICODEC_ED25519_HEADER.len();
    if bytes.len() != header_len + MULTICODEC_ED25519_LENGTH
        || bytes[..header_len] != MULTICODEC_ED25519_HEADER
    {
        return Err(Error::InvalidJwt(format!("bad multicodec key: {iss}")));
    }

    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(&bytes[header_len..]);
    Ok(public_key)
}

pub fn encode_did_web(domain: &str) -> String {
    [DID_PREFIX, DID_METHOD_WEB, domain].join(DID_DELIMITER)
}

/// CAIP-10 account id, `namespace:reference:address`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId {
    pub namespace: String,
    pub reference: String,
    pub address: String,
}

impl AccountId {
    pub fn chain_id(&self) -> String {
        format!("{}:{}", self.namespace, self.reference)
    }

    pub fn did_pkh(&self) -> String {
        [DID_PREFIX, DID_METHOD_PKH, &self.to_string()].join(DID_DELIMITER)
    }

    pub fn from_did_pkh(did: &str) -> Result<Self> {
        let prefix = format!("{DID_PREFIX}{DID_DELIMITER}{DID_METHOD_PKH}{DID_DELIMITER}");
        did.strip_prefix(&prefix)
            .ok_or_else(|| Error::InvalidAccount(did.to_string()))?
            .parse()
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.reference, self.address)
    }
}

impl FromStr for AccountId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidAccount(s.to_string()));
        }

        if parts[0] == "eip155" {
            Address::from_str(parts[2])
                .map_err(|_| Error::InvalidAccount(s.to_string()))?;
        }

        Ok(AccountId {
            namespace: parts[0].to_string(),
            reference: parts[1].to_string(),
            address: parts[2].to_string(),
        })
    }
}

/// Whether `chain` is a CAIP-2 id, `namespace:reference`.
pub fn is_caip2(chain: &str) -> bool {
    match chain.split_once(':') {
        Some((namespace, reference)) => {
            !namespace.is_empty()
                && !reference.is_empty()
                && !reference.contains(':')
        }
        None => false,
    }
}
