use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::config::CoreConfig;
use crate::error::Result;
use crate::history::JsonRpcHistory;
use crate::interactor::RelayJsonRpcInteractor;
use crate::keys::{InMemoryKeyStore, KeyManagementRepository};
use crate::notify::{DidResolver, IdentityClient, NotifyEngine, NotifyStorageRepository};
use crate::relay::RelayConnection;
use crate::sign::SignEngine;
use crate::storage::SignStorage;

/// Wires the interactor and the protocol engines around one relay
/// connection. Background tasks live until [`CoreClient::shutdown`].
pub struct CoreClient {
    config: CoreConfig,
    interactor: Arc<RelayJsonRpcInteractor>,
    sign: Arc<SignEngine>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CoreClient {
    /// Starts a client with in-memory keys and storage.
    pub fn init(config: CoreConfig, relay: Arc<dyn RelayConnection>) -> Result<Self> {
        Self::init_with(
            config,
            relay,
            Arc::new(InMemoryKeyStore::new()),
            SignStorage::in_memory(),
        )
    }

    pub fn init_with(
        config: CoreConfig,
        relay: Arc<dyn RelayConnection>,
        keys: Arc<dyn KeyManagementRepository>,
        storage: SignStorage,
    ) -> Result<Self> {
        config.validate()?;

        let interactor = Arc::new(
            RelayJsonRpcInteractor::new(relay, keys, Arc::new(JsonRpcHistory::new()))
                .with_backoff(config.backoff())
                .with_batch_size(config.batch_subscribe_size),
        );
        let sign = Arc::new(
            SignEngine::new(interactor.clone(), storage, config.metadata.clone())
                .with_call_timeout(config.call_timeout),
        );

        let tasks = vec![interactor.start(), sign.start()];
        log::info!("client {} started", config.metadata.name);

        Ok(Self {
            config,
            interactor,
            sign,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn interactor(&self) -> &Arc<RelayJsonRpcInteractor> {
        &self.interactor
    }

    pub fn sign(&self) -> &Arc<SignEngine> {
        &self.sign
    }

    /// Starts a Notify engine on the client's interactor.
    pub fn notify(
        &self,
        storage: Arc<dyn NotifyStorageRepository>,
        resolver: Arc<dyn DidResolver>,
        identity: Arc<dyn IdentityClient>,
    ) -> Result<Arc<NotifyEngine>> {
        let engine = Arc::new(
            NotifyEngine::new(self.interactor.clone(), storage, resolver, identity)
                .with_keyserver_url(self.config.keyserver_url.clone())
                .with_notify_server_domain(self.config.notify_server_domain.clone())
                .with_call_timeout(self.config.call_timeout),
        );
        self.tasks.lock()?.push(engine.start());
        Ok(engine)
    }

    /// Stops every background task. Engines stay usable for outbound calls
    /// but no longer see inbound traffic.
    pub fn shutdown(&self) -> Result<()> {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock()?.drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        log::info!("client {} stopped {} tasks", self.config.metadata.name, tasks.len());
        Ok(())
    }
}

impl Drop for CoreClient {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::notify::{HttpDidResolver, HttpKeyserverClient, InMemoryNotifyStorage};
    use crate::test_utils::{MockRelay, MockRelayHub, init_logger};
    use crate::types::Metadata;

    fn config(name: &str) -> CoreConfig {
        CoreConfig::new(
            "project",
            Metadata {
                name: name.to_string(),
                description: format!("{name} app"),
                url: format!("https://{name}.example"),
                icons: vec![],
                redirect: None,
            },
        )
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
        .with_call_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = CoreConfig::new("", config("x").metadata);
        let result = CoreClient::init(config, MockRelay::standalone());
        assert!(matches!(result, Err(Error::InvalidProjectId)));
    }

    #[tokio::test]
    async fn test_two_clients_pair_and_ping() {
        init_logger();
        let hub = MockRelayHub::new();
        let dapp = CoreClient::init(config("dapp"), hub.connect()).unwrap();
        let wallet = CoreClient::init(config("wallet"), hub.connect()).unwrap();

        let pairing = dapp.sign().create_pairing().await.unwrap();
        wallet.sign().pair(&pairing.uri).await.unwrap();
        dapp.sign().ping(&pairing.topic).await.unwrap();

        dapp.shutdown().unwrap();
        wallet.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_inbound_handling() {
        init_logger();
        let hub = MockRelayHub::new();
        let dapp = CoreClient::init(
            config("dapp").with_call_timeout(Duration::from_millis(100)),
            hub.connect(),
        )
        .unwrap();
        let wallet = CoreClient::init(config("wallet"), hub.connect()).unwrap();
        let _notify = wallet
            .notify(
                Arc::new(InMemoryNotifyStorage::new()),
                Arc::new(HttpDidResolver::new()),
                Arc::new(HttpKeyserverClient::new()),
            )
            .unwrap();
        assert_eq!(wallet.tasks.lock().unwrap().len(), 3);

        let pairing = dapp.sign().create_pairing().await.unwrap();
        wallet.sign().pair(&pairing.uri).await.unwrap();
        wallet.shutdown().unwrap();
        assert!(wallet.tasks.lock().unwrap().is_empty());

        // Nobody answers the ping any more
        let result = dapp.sign().ping(&pairing.topic).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }
}
