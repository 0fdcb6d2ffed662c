/// Notify DID-JWTs
///
/// Every Notify request and response carries an Ed25519 JWT whose claims bind
/// the identity key (`iss`), the account (`sub`) and the action (`act`).
///
use serde::{Deserialize, Serialize};

use super::types::{Notification, ServerSubscription};
use crate::constants::FIVE_MINUTES;
use crate::error::{Error, Result};
use crate::relay_auth::{Keypair, decode_jwt, encode_jwt};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyClaims {
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ksu: Option<String>,
    pub aud: String,
    pub sub: String,
    pub act: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Space separated scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lmt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aft: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urf: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbs: Option<Vec<ServerSubscription>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<Notification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfs: Option<Vec<Notification>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mre: Option<bool>,
}

impl NotifyClaims {
    /// Claims issued by `issuer`, valid for five minutes from `iat`.
    pub fn new(
        act: &str,
        issuer: &Keypair,
        aud: impl Into<String>,
        sub: impl Into<String>,
        iat: u64,
    ) -> Self {
        Self {
            iat,
            exp: iat + FIVE_MINUTES,
            iss: issuer.did_key(),
            aud: aud.into(),
            sub: sub.into(),
            act: act.to_string(),
            ..Default::default()
        }
    }

    pub fn sign(&self, issuer: &Keypair) -> Result<String> {
        encode_jwt(self, issuer)
    }

    pub fn scopes(&self) -> Vec<String> {
        self.scp
            .as_deref()
            .map(|scp| scp.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

/// Decodes a JWT and checks signature, expiry, action and, when given, the
/// issuer.
pub fn verify_claims(
    jwt: &str,
    expected_act: &str,
    expected_iss: Option<&str>,
    now: u64,
) -> Result<NotifyClaims> {
    let claims: NotifyClaims = decode_jwt(jwt)?;

    if claims.act != expected_act {
        return Err(Error::InvalidJwt(format!(
            "expected act {expected_act}, got {}",
            claims.act
        )));
    }
    if claims.exp < now {
        return Err(Error::InvalidJwt(format!("{} expired at {}", claims.act, claims.exp)));
    }
    if let Some(iss) = expected_iss {
        if claims.iss != iss {
            return Err(Error::InvalidJwt(format!("unexpected issuer {}", claims.iss)));
        }
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{NOTIFY_SUBSCRIPTION_ACT, NOTIFY_UPDATE_ACT};

    const SUB: &str = "did:pkh:eip155:1:0x0000000000000000000000000000000000000123";

    fn signed(issuer: &Keypair, iat: u64) -> String {
        NotifyClaims {
            scp: Some("alerts promotions".to_string()),
            ..NotifyClaims::new(NOTIFY_SUBSCRIPTION_ACT, issuer, "did:key:app", SUB, iat)
        }
        .sign(issuer)
        .unwrap()
    }

    #[test]
    fn test_verify_claims() {
        let identity = Keypair::from_seed([3; 32]);
        let jwt = signed(&identity, 1000);

        let claims =
            verify_claims(&jwt, NOTIFY_SUBSCRIPTION_ACT, Some(&identity.did_key()), 1100).unwrap();
        assert_eq!(claims.exp, 1300);
        assert_eq!(claims.sub, SUB);
        assert_eq!(claims.scopes(), vec!["alerts", "promotions"]);
        assert!(claims.lmt.is_none());
    }

    #[test]
    fn test_rejects_wrong_act_expiry_and_issuer() {
        let identity = Keypair::from_seed([3; 32]);
        let jwt = signed(&identity, 1000);

        assert!(verify_claims(&jwt, NOTIFY_UPDATE_ACT, None, 1100).is_err());
        assert!(verify_claims(&jwt, NOTIFY_SUBSCRIPTION_ACT, None, 1301).is_err());

        let other = Keypair::from_seed([4; 32]);
        assert!(matches!(
            verify_claims(&jwt, NOTIFY_SUBSCRIPTION_ACT, Some(&other.did_key()), 1100),
            Err(Error::InvalidJwt(_))
        ));
    }

    #[test]
    fn test_optional_claims_are_omitted() {
        let identity = Keypair::from_seed([3; 32]);
        let claims = NotifyClaims::new(NOTIFY_UPDATE_ACT, &identity, "aud", SUB, 0);
        let value = serde_json::to_value(&claims).unwrap();
        assert!(value.get("app").is_none());
        assert!(value.get("sbs").is_none());
        assert_eq!(value["act"], NOTIFY_UPDATE_ACT);
    }
}
