use std::time::Duration;

use crate::backoff::ConditionalExponentialBackoffStrategy;
use crate::connection::HttpRelayConnection;
use crate::constants::{
    BATCH_SUBSCRIBE_CHUNK_SIZE, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_KEYSERVER_URL,
    DEFAULT_NOTIFY_SERVER_DOMAIN, DEFAULT_RELAY_AUTH_AUDIENCE, DEFAULT_RELAY_RPC_URL,
};
use crate::error::{Error, Result};
use crate::types::Metadata;
use crate::utils::random_bytes32;

/// Everything a [`CoreClient`](crate::client::CoreClient) needs to start.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    pub relay_rpc_url: String,
    pub relay_auth_audience: String,
    /// Get one from https://cloud.reown.com
    pub project_id: String,
    /// Seed of the relay client key. Generate it once and keep it, the relay
    /// identifies the client by it.
    pub client_seed: [u8; 32],
    pub metadata: Metadata,
    pub batch_subscribe_size: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub call_timeout: Duration,
    pub keyserver_url: String,
    pub notify_server_domain: String,
}

impl CoreConfig {
    pub fn new(project_id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            relay_rpc_url: DEFAULT_RELAY_RPC_URL.to_string(),
            relay_auth_audience: DEFAULT_RELAY_AUTH_AUDIENCE.to_string(),
            project_id: project_id.into(),
            client_seed: random_bytes32(),
            metadata,
            batch_subscribe_size: BATCH_SUBSCRIBE_CHUNK_SIZE,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            keyserver_url: DEFAULT_KEYSERVER_URL.to_string(),
            notify_server_domain: DEFAULT_NOTIFY_SERVER_DOMAIN.to_string(),
        }
    }

    pub fn with_relay(
        mut self,
        rpc_url: impl Into<String>,
        auth_audience: impl Into<String>,
    ) -> Self {
        self.relay_rpc_url = rpc_url.into();
        self.relay_auth_audience = auth_audience.into();
        self
    }

    pub fn with_client_seed(mut self, client_seed: [u8; 32]) -> Self {
        self.client_seed = client_seed;
        self
    }

    pub fn with_batch_subscribe_size(mut self, size: usize) -> Self {
        self.batch_subscribe_size = size;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_keyserver_url(mut self, url: impl Into<String>) -> Self {
        self.keyserver_url = url.into();
        self
    }

    pub fn with_notify_server_domain(mut self, domain: impl Into<String>) -> Self {
        self.notify_server_domain = domain.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(Error::InvalidProjectId);
        }
        if self.batch_subscribe_size == 0 {
            return Err(Error::InternalError(
                "batch subscribe size must be positive".to_string(),
            ));
        }
        if self.backoff_base > self.backoff_max {
            return Err(Error::InternalError(format!(
                "backoff base {:?} exceeds max {:?}",
                self.backoff_base, self.backoff_max
            )));
        }
        Ok(())
    }

    pub fn backoff(&self) -> ConditionalExponentialBackoffStrategy {
        ConditionalExponentialBackoffStrategy::new(self.backoff_base, self.backoff_max)
    }

    /// Relay connection over the HTTP JSON-RPC endpoint.
    pub fn connect_relay(&self) -> Result<HttpRelayConnection> {
        HttpRelayConnection::new(
            &self.relay_rpc_url,
            &self.relay_auth_audience,
            self.client_seed,
            &self.project_id,
        )
    }
}
