pub const JWT_IRIDIUM_ALG: &str = "EdDSA";
pub const JWT_IRIDIUM_TYP: &str = "JWT";

pub const JWT_DELIMITER: &str = ".";

pub const DID_DELIMITER: &str = ":";
pub const DID_PREFIX: &str = "did";
pub const DID_METHOD_KEY: &str = "key";
pub const DID_METHOD_PKH: &str = "pkh";
pub const DID_METHOD_WEB: &str = "web";

pub const MULTICODEC_ED25519_BASE: &str = "z";
pub const MULTICODEC_ED25519_HEADER: [u8; 2] = [0xed, 0x01];
pub const MULTICODEC_ED25519_LENGTH: usize = 32;

pub const KEY_PAIR_SEED_LENGTH: usize = 32;

// https://github.com/WalletConnect/walletconnect-monorepo/blob/b39a5d4e62f5517ef47a70b5b93f27585b7132e8/packages/core/src/controllers/crypto.ts
pub const CRYPTO_JWT_TTL: u64 = 86400; // ONE_DAY

pub const RELAY_PROTOCOL: &str = "irn";
pub const PAIRING_URI_VERSION: u32 = 2;

pub const DEFAULT_RELAY_RPC_URL: &str = "https://relay.walletconnect.org/rpc";
pub const DEFAULT_RELAY_AUTH_AUDIENCE: &str = "https://relay.walletconnect.org";
pub const DEFAULT_KEYSERVER_URL: &str = "https://keys.walletconnect.org";
pub const DEFAULT_NOTIFY_SERVER_DOMAIN: &str = "notify.walletconnect.com";

/// Relay rejects batch subscriptions above this size.
pub const BATCH_SUBSCRIBE_CHUNK_SIZE: usize = 500;

pub const THIRTY_SECONDS: u64 = 30;
pub const FIVE_MINUTES: u64 = 300;
pub const DAY: u64 = 86400;
pub const WEEK: u64 = 7 * DAY;
pub const MONTH: u64 = 30 * DAY;

pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

// Notify JWT actions
pub const NOTIFY_SUBSCRIPTION_ACT: &str = "notify_subscription";
pub const NOTIFY_SUBSCRIPTION_RESPONSE_ACT: &str = "notify_subscription_response";
pub const NOTIFY_UPDATE_ACT: &str = "notify_update";
pub const NOTIFY_UPDATE_RESPONSE_ACT: &str = "notify_update_response";
pub const NOTIFY_DELETE_ACT: &str = "notify_delete";
pub const NOTIFY_DELETE_RESPONSE_ACT: &str = "notify_delete_response";
pub const NOTIFY_WATCH_SUBSCRIPTIONS_ACT: &str = "notify_watch_subscriptions";
pub const NOTIFY_WATCH_SUBSCRIPTIONS_RESPONSE_ACT: &str =
    "notify_watch_subscriptions_response";
pub const NOTIFY_SUBSCRIPTIONS_CHANGED_ACT: &str = "notify_subscriptions_changed";
pub const NOTIFY_SUBSCRIPTIONS_CHANGED_RESPONSE_ACT: &str =
    "notify_subscriptions_changed_response";
pub const NOTIFY_MESSAGE_ACT: &str = "notify_message";
pub const NOTIFY_MESSAGE_RESPONSE_ACT: &str = "notify_message_response";
pub const NOTIFY_GET_NOTIFICATIONS_ACT: &str = "notify_get_notifications";
pub const NOTIFY_GET_NOTIFICATIONS_RESPONSE_ACT: &str =
    "notify_get_notifications_response";
pub const UNREGISTER_IDENTITY_ACT: &str = "unregister_identity";
