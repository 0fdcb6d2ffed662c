//! Notify protocol: an account registers an identity key at the keyserver,
//! then subscribes to apps and receives their notifications over the relay.
//! Every request and response carries a DID-JWT signed by the sender.

mod engine;
mod identity;
mod jwt;
mod storage;
pub mod types;

pub use engine::{NotifyEngine, NotifyEvent};
pub use identity::{
    DidDocument, DidKeys, DidResolver, HttpDidResolver, HttpKeyserverClient, IdentityClient,
    MessageSigner,
};
pub use jwt::{NotifyClaims, verify_claims};
pub use storage::{InMemoryNotifyStorage, NotifyStorageRepository};
