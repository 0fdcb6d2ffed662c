//! Requests a wallet serves over HTTP instead of through the relay.
//!
//! The wallet advertises services in the session `scopedProperties`, keyed by
//! chain id or namespace:
//!
//! ```json
//! { "eip155": "{\"walletService\":[{\"url\":\"https://...\",\"methods\":[\"wallet_getAssets\"]}]}" }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::rpc::{JsonRpcRequest, JsonRpcResponse};

#[derive(Deserialize)]
struct ScopedProperty {
    #[serde(rename = "walletService", default)]
    wallet_service: Vec<WalletService>,
}

#[derive(Deserialize)]
struct WalletService {
    url: String,
    #[serde(default)]
    methods: Vec<String>,
}

fn service_url(property: &str, method: &str) -> Option<Url> {
    let property: ScopedProperty = serde_json::from_str(property).ok()?;
    property
        .wallet_service
        .into_iter()
        .find(|service| service.methods.iter().any(|m| m == method))
        .and_then(|service| Url::parse(&service.url).ok())
}

/// Service url for `method` on `chain_id`. An exact chain entry wins over the
/// namespace entry. Anything malformed means no match.
pub fn find_wallet_service(
    scoped_properties: Option<&HashMap<String, String>>,
    chain_id: &str,
    method: &str,
) -> Option<Url> {
    let properties = scoped_properties?;

    if let Some(url) = properties
        .get(chain_id)
        .and_then(|property| service_url(property, method))
    {
        return Some(url);
    }

    let namespace = chain_id.split(':').next()?;
    properties
        .get(namespace)
        .and_then(|property| service_url(property, method))
}

#[async_trait]
pub trait WalletServiceClient: Send + Sync {
    async fn execute(&self, url: &Url, request: &JsonRpcRequest) -> Result<JsonRpcResponse>;
}

pub struct HttpWalletServiceClient {
    client: Client,
}

impl HttpWalletServiceClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpWalletServiceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletServiceClient for HttpWalletServiceClient {
    async fn execute(&self, url: &Url, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Relay(format!("wallet service: {e}")))?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(url: &str, methods: &[&str]) -> String {
        serde_json::json!({
            "walletService": [{ "url": url, "methods": methods }]
        })
        .to_string()
    }

    #[test]
    fn test_exact_chain_wins() {
        let properties = HashMap::from([
            (
                "eip155".to_string(),
                service("https://namespace.example/rpc", &["wallet_getAssets"]),
            ),
            (
                "eip155:1".to_string(),
                service("https://mainnet.example/rpc", &["wallet_getAssets"]),
            ),
        ]);

        let url = find_wallet_service(Some(&properties), "eip155:1", "wallet_getAssets");
        assert_eq!(url.unwrap().as_str(), "https://mainnet.example/rpc");

        let url = find_wallet_service(Some(&properties), "eip155:10", "wallet_getAssets");
        assert_eq!(url.unwrap().as_str(), "https://namespace.example/rpc");
    }

    #[test]
    fn test_no_match() {
        let properties = HashMap::from([
            (
                "eip155".to_string(),
                service("https://namespace.example/rpc", &["wallet_getAssets"]),
            ),
            ("solana".to_string(), "{not json".to_string()),
        ]);

        assert!(find_wallet_service(Some(&properties), "eip155:1", "eth_sign").is_none());
        let url = find_wallet_service(Some(&properties), "solana:mainnet", "wallet_getAssets");
        assert!(url.is_none());
        assert!(find_wallet_service(None, "eip155:1", "wallet_getAssets").is_none());
    }
}
