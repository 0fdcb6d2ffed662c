/// Relay Auth
///
/// Ed25519 JWTs: the relay authorization token and the generic signer and
/// verifier used for Notify DID-JWTs.
///
use alloy::hex;
use base64ct::{Base64UrlUnpadded, Encoding};
use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey, ed25519::signature::SignerMut};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    constants::{CRYPTO_JWT_TTL, JWT_DELIMITER, JWT_IRIDIUM_ALG, JWT_IRIDIUM_TYP},
    error::{Error, Result},
    utils::{decode_iss, encode_iss, random_bytes32, unix_timestamp},
};

pub struct RelayAuth {
    client_seed: [u8; 32],
}

impl RelayAuth {
    pub fn new(client_seed: [u8; 32]) -> Self {
        Self { client_seed }
    }

    // https://github.com/WalletConnect/walletconnect-monorepo/blob/1e618504de2c1802359ffec486120784c04bd240/packages/core/src/controllers/crypto.ts#L59
    pub fn get_client_id(&self) -> String {
        let key_pair = Keypair::from_seed(self.client_seed);
        encode_iss(&key_pair.public_key)
    }

    // https://github.com/WalletConnect/walletconnect-monorepo/blob/b39a5d4e62f5517ef47a70b5b93f27585b7132e8/packages/core/src/controllers/crypto.ts#L73
    pub fn sign_jwt(&self, aud: &str) -> Result<String> {
        let keypair = Keypair::from_seed(self.client_seed);

        let sub = random_bytes32(); // randomSessionIdentifier;
        sign_jwt(&hex::encode(sub), aud, CRYPTO_JWT_TTL, &keypair, None)
    }
}

// Only used for JWT signing, not used for encryption
#[derive(Debug, Clone)]
pub struct Keypair {
    pub seed: [u8; 32],
    pub secret_key: [u8; 64],
    pub public_key: [u8; 32],
}

impl Keypair {
    pub fn generate() -> Self {
        Keypair::from_seed(random_bytes32())
    }

    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        let mut signing_key = SigningKey::from(self.seed);
        signing_key.sign(data).to_bytes()
    }

    pub fn from_bytes64_secret(secret_key: [u8; 64]) -> Result<Self> {
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&secret_key[..32]);

        let keypair = Keypair::from_seed(seed);
        if keypair.secret_key != secret_key {
            return Err(Error::InvalidJwt(
                "public key does not match the signing key".to_string(),
            ));
        }
        Ok(keypair)
    }

    // https://github.com/WalletConnect/walletconnect-utils/blob/4d8eb66bcea89857c630017774845e872a66922a/relay/relay-auth/src/api.ts#L14
    pub fn from_seed(seed: [u8; 32]) -> Keypair {
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = signing_key.verifying_key().to_bytes();

        let mut secret_key = [0u8; 64];

        secret_key[..32].copy_from_slice(&seed);
        secret_key[32..].copy_from_slice(&public_key);

        Keypair {
            seed,
            secret_key,
            public_key,
        }
    }

    pub fn did_key(&self) -> String {
        encode_iss(&self.public_key)
    }
}

#[derive(Serialize, Deserialize)]
pub struct IridiumJWTHeader<'a> {
    pub alg: &'a str,
    pub typ: &'a str,
}

#[derive(Serialize, Deserialize)]
pub struct IridiumJWTPayload {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

fn encode_json<T: ?Sized + Serialize>(val: &T) -> Result<String> {
    Ok(Base64UrlUnpadded::encode_string(
        serde_json::to_string(val)?.as_bytes(),
    ))
}

/// Signs any claims set with the keypair.
pub fn encode_jwt<C: Serialize>(claims: &C, keypair: &Keypair) -> Result<String> {
    let header = IridiumJWTHeader {
        alg: JWT_IRIDIUM_ALG,
        typ: JWT_IRIDIUM_TYP,
    };
    let h = encode_json(&header)?;
    let p = encode_json(claims)?;
    let jwt_head_payload = format!("{h}{JWT_DELIMITER}{p}");

    let signature = keypair.sign(jwt_head_payload.as_bytes());
    let sig_encoded = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{jwt_head_payload}{JWT_DELIMITER}{sig_encoded}"))
}

/// Decodes the claims and checks the signature against the `iss` did:key.
/// Expiry and audience checks are left to the caller.
pub fn decode_jwt<C: DeserializeOwned>(jwt: &str) -> Result<C> {
    let parts: Vec<&str> = jwt.split(JWT_DELIMITER).collect();
    let [h, p, s] = parts.as_slice() else {
        return Err(Error::InvalidJwt(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    };

    let header: Value = serde_json::from_slice(&Base64UrlUnpadded::decode_vec(h)?)?;
    if header["alg"] != JWT_IRIDIUM_ALG {
        return Err(Error::InvalidJwt(format!("unsupported alg {}", header["alg"])));
    }

    let claims: Value = serde_json::from_slice(&Base64UrlUnpadded::decode_vec(p)?)?;
    let iss = claims["iss"]
        .as_str()
        .ok_or_else(|| Error::InvalidJwt("missing iss".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&decode_iss(iss)?)?;

    let signature_bytes: [u8; 64] = Base64UrlUnpadded::decode_vec(s)?
        .try_into()
        .map_err(|_| Error::InvalidJwt("bad signature length".to_string()))?;
    verifying_key.verify(
        format!("{h}{JWT_DELIMITER}{p}").as_bytes(),
        &Signature::from_bytes(&signature_bytes),
    )?;

    Ok(serde_json::from_value(claims)?)
}

pub fn sign_jwt(
    sub: &str,
    aud: &str,
    ttl: u64,
    keypair: &Keypair,
    iat_opt: Option<u64>,
) -> Result<String> {
    let iat = match iat_opt {
        Some(iat) => iat,
        None => unix_timestamp()?,
    };

    let payload = IridiumJWTPayload {
        iss: keypair.did_key(),
        sub: sub.to_string(),
        aud: aud.to_string(),
        iat,
        exp: iat + ttl,
    };

    encode_jwt(&payload, keypair)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_1() {
        let wk = RelayAuth::new([0; 32]);
        let client_id = wk.get_client_id();
        assert_eq!(
            client_id,
            "did:key:z6MkiTBz1ymuepAQ4HEHYSF1H8quG5GLVVQR3djdX3mDooWp"
        );
    }

    #[test]
    fn test_2() {
        let wk = RelayAuth::new([
            23, 113, 199, 94, 246, 41, 119, 10, 250, 248, 253, 136, 173, 241,
            191, 149, 165, 249, 17, 42, 46, 189, 120, 175, 78, 88, 53, 83, 254,
            16, 32, 150,
        ]);
        let client_id = wk.get_client_id();
        assert_eq!(
            client_id,
            "did:key:z6MkriJMhx6cLMiwwfuJ3NCGw8C8UjB9KoVHB7QSBaBxMx3y"
        );
    }

    #[test]
    fn test_relay_jwt_verifies() {
        let keypair = Keypair::from_seed([0; 32]);
        let jwt = sign_jwt("sub", "https://relay.walletconnect.org", 60, &keypair, Some(1000))
            .unwrap();

        let payload: IridiumJWTPayload = decode_jwt(&jwt).unwrap();
        assert_eq!(payload.iss, keypair.did_key());
        assert_eq!(payload.aud, "https://relay.walletconnect.org");
        assert_eq!(payload.exp, 1060);
    }

    #[test]
    fn test_tampered_jwt_is_rejected() {
        let keypair = Keypair::generate();
        let jwt = sign_jwt("sub", "aud", 60, &keypair, None).unwrap();

        let mut parts: Vec<String> = jwt.split('.').map(String::from).collect();
        let forged = IridiumJWTPayload {
            iss: keypair.did_key(),
            sub: "other".to_string(),
            aud: "aud".to_string(),
            iat: 0,
            exp: u64::MAX,
        };
        parts[1] = encode_json(&forged).unwrap();

        assert!(decode_jwt::<IridiumJWTPayload>(&parts.join(".")).is_err());
        assert!(decode_jwt::<IridiumJWTPayload>("a.b").is_err());
    }

    #[test]
    fn test_secret_round_trip() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_bytes64_secret(keypair.secret_key).unwrap();
        assert_eq!(restored.public_key, keypair.public_key);

        let mut bad = keypair.secret_key;
        bad[40] ^= 1;
        assert!(Keypair::from_bytes64_secret(bad).is_err());
    }
}
