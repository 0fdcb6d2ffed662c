/// CACAO
///
/// Chain agnostic capability objects, used to register a Notify identity key
/// at the keyserver. The payload is rendered as a CAIP-122 message which the
/// account owner signs.
///
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::Result;
use crate::utils::AccountId;

pub const CACAO_HEADER_TYPE: &str = "caip122";
pub const CACAO_VERSION: &str = "1";
pub const EIP191_SIGNATURE_TYPE: &str = "eip191";

const NOTIFICATIONS_INFO_URL: &str = "https://walletconnect.com/notifications";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cacao {
    #[serde(rename = "h")]
    pub header: CacaoHeader,
    #[serde(rename = "p")]
    pub payload: CacaoPayload,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<CacaoSignature>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacaoHeader {
    #[serde(rename = "t")]
    pub header_type: String, // "caip122"
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacaoPayload {
    pub domain: String,
    #[serde(rename = "aud")]
    pub uri: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(rename = "iat", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    /// did:pkh of the signing account.
    pub iss: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacaoSignature {
    #[serde(rename = "t")]
    pub signature_type: String, // "eip191"
    #[serde(rename = "s")]
    pub signature: String,
}

impl CacaoPayload {
    /// Payload registering `identity_key` (a did:key) for `account`. A
    /// limited registration only covers `domain`.
    pub fn identity_registration(
        account: &AccountId,
        identity_key: &str,
        keyserver_url: &str,
        domain: &str,
        is_limited: bool,
        nonce: String,
        issued_at: OffsetDateTime,
    ) -> Result<Self> {
        let statement = if is_limited {
            format!(
                "I further authorize this app to send me notifications for {domain}. Read more at {NOTIFICATIONS_INFO_URL}"
            )
        } else {
            format!(
                "I further authorize this app to view and manage my notifications for ALL apps. Read more at {NOTIFICATIONS_INFO_URL}"
            )
        };

        Ok(Self {
            domain: domain.to_string(),
            uri: keyserver_url.to_string(),
            version: CACAO_VERSION.to_string(),
            statement: Some(statement),
            nonce: Some(nonce),
            issued_at: Some(issued_at.format(&Rfc3339)?),
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: vec![identity_key.to_string()],
            iss: account.did_pkh(),
        })
    }

    pub fn caip122_message(&self) -> Result<String> {
        let account = AccountId::from_did_pkh(&self.iss)?;
        let chain_name = match account.namespace.as_str() {
            "eip155" => "Ethereum",
            other => other,
        };

        let mut message = format!(
            "{} wants you to sign in with your {} account:\n{}\n\n",
            self.domain, chain_name, account.address
        );

        if let Some(statement) = &self.statement {
            writeln!(message, "{statement}\n")?;
        }

        write!(
            message,
            "URI: {}\nVersion: {}\nChain ID: {}",
            self.uri, self.version, account.reference,
        )?;

        if let Some(nonce) = &self.nonce {
            write!(message, "\nNonce: {nonce}")?;
        }

        if let Some(issued_at) = &self.issued_at {
            write!(message, "\nIssued At: {issued_at}")?;
        }

        if let Some(expiration_time) = &self.expiration_time {
            write!(message, "\nExpiration Time: {expiration_time}")?;
        }

        if let Some(not_before) = &self.not_before {
            write!(message, "\nNot Before: {not_before}")?;
        }

        if let Some(request_id) = &self.request_id {
            write!(message, "\nRequest ID: {request_id}")?;
        }

        if !self.resources.is_empty() {
            write!(message, "\nResources:")?;
            for resource in &self.resources {
                write!(message, "\n- {resource}")?;
            }
        }

        Ok(message)
    }
}

impl Cacao {
    pub fn new(payload: CacaoPayload, signature: String) -> Self {
        Self {
            header: CacaoHeader {
                header_type: CACAO_HEADER_TYPE.to_string(),
            },
            payload,
            signature: Some(CacaoSignature {
                signature_type: EIP191_SIGNATURE_TYPE.to_string(),
                signature,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_registration_message() {
        let account: AccountId = "eip155:1:0x0000000000000000000000000000000000000123"
            .parse()
            .unwrap();
        let issued_at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let payload = CacaoPayload::identity_registration(
            &account,
            "did:key:z6MkiTBz1ymuepAQ4HEHYSF1H8quG5GLVVQR3djdX3mDooWp",
            "https://keys.walletconnect.org",
            "app.example",
            true,
            "abc".to_string(),
            issued_at,
        )
        .unwrap();

        assert_eq!(
            payload.caip122_message().unwrap(),
            "app.example wants you to sign in with your Ethereum account:\n\
             0x0000000000000000000000000000000000000123\n\n\
             I further authorize this app to send me notifications for app.example. Read more at https://walletconnect.com/notifications\n\n\
             URI: https://keys.walletconnect.org\n\
             Version: 1\n\
             Chain ID: 1\n\
             Nonce: abc\n\
             Issued At: 2023-11-14T22:13:20Z\n\
             Resources:\n\
             - did:key:z6MkiTBz1ymuepAQ4HEHYSF1H8quG5GLVVQR3djdX3mDooWp"
        );
    }

    #[test]
    fn test_cacao_wire_format() {
        let account: AccountId = "eip155:1:0x0000000000000000000000000000000000000123"
            .parse()
            .unwrap();
        let payload = CacaoPayload::identity_registration(
            &account,
            "did:key:identity",
            "https://keys.walletconnect.org",
            "app.example",
            false,
            "abc".to_string(),
            OffsetDateTime::UNIX_EPOCH,
        )
        .unwrap();
        let value = serde_json::to_value(Cacao::new(payload, "0xsig".to_string())).unwrap();

        assert_eq!(value["h"]["t"], "caip122");
        assert_eq!(value["s"]["t"], "eip191");
        assert_eq!(value["p"]["aud"], "https://keys.walletconnect.org");
        assert_eq!(
            value["p"]["iss"],
            "did:pkh:eip155:1:0x0000000000000000000000000000000000000123"
        );
        assert!(value["p"].get("exp").is_none());
    }
}
