//! # walletconnect-core
//!
//! A Rust implementation of the [WalletConnect v2 protocols](https://specs.walletconnect.com/2.0/):
//! the relay JSON-RPC interactor, the Sign pairing and session engine, and
//! the Notify engine.
//!
//! ## Features
//! - Encrypted envelopes (type 0, 1 and 2) keyed per topic
//! - Request history with duplicate suppression and response correlation
//! - Chunked batch subscribe, exponential backoff, resubscribe on reconnect
//! - Sign: pairing, session proposal, settlement, requests, update, extend,
//!   events, ping and delete, with link mode and wallet service routing
//! - Notify: DID-JWT authenticated subscribe, update, delete, watch
//!   subscriptions, notification history and identity unregistration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use walletconnect_core::{CoreClient, CoreConfig, types::Metadata};
//!
//! # async fn run() -> walletconnect_core::Result<()> {
//! // Get project_id from https://cloud.reown.com
//! let config = CoreConfig::new(
//!     "xxxx",
//!     Metadata {
//!         name: "My Wallet Name".to_string(),
//!         description: "My wallet interacts with dapp".to_string(),
//!         url: "https://my-wallet-site.com".to_string(),
//!         icons: vec![],
//!         redirect: None,
//!     },
//! )
//! // Generate random once, store it and reuse it for all connections
//! .with_client_seed([123u8; 32]);
//!
//! let relay = Arc::new(config.connect_relay()?);
//! relay.spawn_polling(std::time::Duration::from_secs(2));
//! let client = CoreClient::init(config, relay)?;
//!
//! let uri_from_dapp = "wc:e4b9eb7a1372bf88abc46c37acac3687301afdfd0d2a4c2355945d66a1164464@2?relay-protocol=irn&symKey=d7430284e1b70853829a010518a088cde0e163bcad5f24425e3b17578b2b402d&expiryTimestamp=1749783095";
//! client.sign().pair(uri_from_dapp).await?;
//!
//! let mut events = client.sign().events();
//! while let Ok(event) = events.recv().await {
//!     println!("event: {event:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//! MIT OR Apache-2.0

pub mod backoff;
pub mod cacao;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod history;
pub mod interactor;
pub mod keys;
pub mod notify;
pub mod relay;
pub mod relay_auth;
pub mod rpc;
pub mod sign;
pub mod storage;
pub mod types;
pub mod utils;
pub mod wc_message;

#[cfg(test)]
mod test_utils;

/// Exposed for easy access
pub use client::CoreClient;
pub use config::CoreConfig;
pub use connection::HttpRelayConnection;
pub use error::{Error, Result};
pub use interactor::{Delivery, RelayJsonRpcInteractor};
pub use notify::{NotifyEngine, NotifyEvent};
pub use sign::{SignEngine, SignEvent};
