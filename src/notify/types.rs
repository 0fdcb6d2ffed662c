//! Notify wire params and the records kept for registered accounts.

use serde::{Deserialize, Serialize};

use crate::types::Topic;
use crate::utils::AccountId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifySubscribeParams {
    #[serde(rename = "subscriptionAuth")]
    pub subscription_auth: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifyMessageParams {
    #[serde(rename = "messageAuth")]
    pub message_auth: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifyDeleteParams {
    #[serde(rename = "deleteAuth")]
    pub delete_auth: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifyUpdateParams {
    #[serde(rename = "updateAuth")]
    pub update_auth: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifyWatchSubscriptionsParams {
    #[serde(rename = "watchSubscriptionsAuth")]
    pub watch_subscriptions_auth: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifySubscriptionsChangedParams {
    #[serde(rename = "subscriptionsChangedAuth")]
    pub subscriptions_changed_auth: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifyGetNotificationsParams {
    pub auth: String,
}

/// Result of every Notify call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifyResponseAuth {
    #[serde(rename = "responseAuth")]
    pub response_auth: String,
}

/// Subscription as listed by the notify server in `sbs` claims.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerSubscription {
    #[serde(rename = "appDomain")]
    pub app_domain: String,
    #[serde(rename = "appAuthenticationKey")]
    pub app_authentication_key: String,
    #[serde(rename = "symKey")]
    pub sym_key: String,
    pub account: String,
    #[serde(default)]
    pub scope: Vec<String>,
    pub expiry: u64,
}

/// Notification as carried in `msg` and `nfs` claims.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub sent_at: u64,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub is_read: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    pub topic: Topic,
    pub account: AccountId,
    pub app_domain: String,
    /// did:key of the key the app signs with.
    pub app_authentication_key: String,
    pub scopes: Vec<String>,
    pub expiry: u64,
}

/// The topic we watch for `wc_notifySubscriptionsChanged`, and who may
/// publish on it.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchedTopic {
    pub topic: Topic,
    pub server_authentication_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegisteredAccount {
    pub account: AccountId,
    /// Seed of the Ed25519 identity key registered at the keyserver.
    pub identity_seed: [u8; 32],
    /// Limited accounts only see subscriptions of `app_domain`.
    pub is_limited: bool,
    pub app_domain: String,
    pub watch: Option<WatchedTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NotifyMessage {
    pub topic: Topic,
    pub notification: Notification,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_server_subscription() {
        let value = json!({
            "appDomain": "app.example",
            "appAuthenticationKey": "did:key:z6MkiTBz1ymuepAQ4HEHYSF1H8quG5GLVVQR3djdX3mDooWp",
            "symKey": "11".repeat(32),
            "account": "eip155:1:0x0000000000000000000000000000000000000123",
            "scope": ["alerts", "promotions"],
            "expiry": 1750000000
        });

        let subscription: ServerSubscription = serde_json::from_value(value).unwrap();
        assert_eq!(subscription.app_domain, "app.example");
        assert_eq!(subscription.scope, vec!["alerts", "promotions"]);
    }

    #[test]
    fn test_notification_type_field() {
        let notification: Notification = serde_json::from_value(json!({
            "id": "n1",
            "sent_at": 1750000000,
            "type": "alerts",
            "title": "Hello",
            "body": "World"
        }))
        .unwrap();
        assert_eq!(notification.notification_type, "alerts");
        assert!(!notification.is_read);
        assert_eq!(
            serde_json::to_value(&notification).unwrap()["type"],
            "alerts"
        );
    }
}
