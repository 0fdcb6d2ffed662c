use std::collections::HashMap;
use std::sync::Mutex;

use super::types::{NotifyMessage, RegisteredAccount, Subscription};
use crate::error::Result;
use crate::types::Topic;
use crate::utils::AccountId;

pub trait NotifyStorageRepository: Send + Sync {
    fn upsert_account(&self, account: RegisteredAccount) -> Result<()>;
    fn get_account(&self, account: &AccountId) -> Result<Option<RegisteredAccount>>;
    fn get_accounts(&self) -> Result<Vec<RegisteredAccount>>;
    fn delete_account(&self, account: &AccountId) -> Result<()>;

    fn upsert_subscription(&self, subscription: Subscription) -> Result<()>;
    fn get_subscription(&self, topic: &Topic) -> Result<Option<Subscription>>;
    fn get_subscriptions(&self, account: &AccountId) -> Result<Vec<Subscription>>;
    /// Replaces every subscription of the account and returns the replaced
    /// ones.
    fn replace_subscriptions(
        &self,
        account: &AccountId,
        subscriptions: Vec<Subscription>,
    ) -> Result<Vec<Subscription>>;
    fn delete_subscription(&self, topic: &Topic) -> Result<()>;

    fn upsert_message(&self, message: NotifyMessage) -> Result<()>;
    fn get_messages(&self, topic: &Topic) -> Result<Vec<NotifyMessage>>;
    fn delete_messages(&self, topic: &Topic) -> Result<()>;
}

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, RegisteredAccount>,
    subscriptions: HashMap<Topic, Subscription>,
    // topic -> notification id -> message
    messages: HashMap<Topic, HashMap<String, NotifyMessage>>,
}

#[derive(Default)]
pub struct InMemoryNotifyStorage {
    state: Mutex<State>,
}

impl InMemoryNotifyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotifyStorageRepository for InMemoryNotifyStorage {
    fn upsert_account(&self, account: RegisteredAccount) -> Result<()> {
        self.state
            .lock()?
            .accounts
            .insert(account.account.clone(), account);
        Ok(())
    }

    fn get_account(&self, account: &AccountId) -> Result<Option<RegisteredAccount>> {
        Ok(self.state.lock()?.accounts.get(account).cloned())
    }

    fn get_accounts(&self) -> Result<Vec<RegisteredAccount>> {
        Ok(self.state.lock()?.accounts.values().cloned().collect())
    }

    fn delete_account(&self, account: &AccountId) -> Result<()> {
        self.state.lock()?.accounts.remove(account);
        Ok(())
    }

    fn upsert_subscription(&self, subscription: Subscription) -> Result<()> {
        self.state
            .lock()?
            .subscriptions
            .insert(subscription.topic.clone(), subscription);
        Ok(())
    }

    fn get_subscription(&self, topic: &Topic) -> Result<Option<Subscription>> {
        Ok(self.state.lock()?.subscriptions.get(topic).cloned())
    }

    fn get_subscriptions(&self, account: &AccountId) -> Result<Vec<Subscription>> {
        let state = self.state.lock()?;
        let mut subscriptions: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|s| &s.account == account)
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| a.app_domain.cmp(&b.app_domain));
        Ok(subscriptions)
    }

    fn replace_subscriptions(
        &self,
        account: &AccountId,
        subscriptions: Vec<Subscription>,
    ) -> Result<Vec<Subscription>> {
        let mut state = self.state.lock()?;
        let replaced: Vec<Topic> = state
            .subscriptions
            .values()
            .filter(|s| &s.account == account)
            .map(|s| s.topic.clone())
            .collect();
        let replaced = replaced
            .iter()
            .filter_map(|topic| state.subscriptions.remove(topic))
            .collect();

        for subscription in subscriptions {
            state
                .subscriptions
                .insert(subscription.topic.clone(), subscription);
        }
        Ok(replaced)
    }

    fn delete_subscription(&self, topic: &Topic) -> Result<()> {
        self.state.lock()?.subscriptions.remove(topic);
        Ok(())
    }

    fn upsert_message(&self, message: NotifyMessage) -> Result<()> {
        self.state
            .lock()?
            .messages
            .entry(message.topic.clone())
            .or_default()
            .insert(message.notification.id.clone(), message);
        Ok(())
    }

    fn get_messages(&self, topic: &Topic) -> Result<Vec<NotifyMessage>> {
        let state = self.state.lock()?;
        let mut messages: Vec<NotifyMessage> = state
            .messages
            .get(topic)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        messages.sort_by_key(|m| m.notification.sent_at);
        Ok(messages)
    }

    fn delete_messages(&self, topic: &Topic) -> Result<()> {
        self.state.lock()?.messages.remove(topic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::types::Notification;

    fn account(n: u8) -> AccountId {
        format!("eip155:1:0x{}", format!("{n:02x}").repeat(20)).parse().unwrap()
    }

    fn subscription(topic: &str, account: AccountId) -> Subscription {
        Subscription {
            topic: Topic::from(topic),
            account,
            app_domain: format!("{topic}.example"),
            app_authentication_key: "did:key:app".to_string(),
            scopes: vec![],
            expiry: 0,
        }
    }

    #[test]
    fn test_replace_subscriptions_only_touches_the_account() {
        let storage = InMemoryNotifyStorage::new();
        storage.upsert_subscription(subscription("a", account(1))).unwrap();
        storage.upsert_subscription(subscription("b", account(1))).unwrap();
        storage.upsert_subscription(subscription("c", account(2))).unwrap();

        let mut replaced = storage
            .replace_subscriptions(&account(1), vec![subscription("d", account(1))])
            .unwrap();
        replaced.sort_by(|a, b| a.topic.cmp(&b.topic));

        assert_eq!(
            replaced.iter().map(|s| s.topic.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let remaining: Vec<_> = storage
            .get_subscriptions(&account(1))
            .unwrap()
            .into_iter()
            .map(|s| s.topic)
            .collect();
        assert_eq!(remaining, vec![Topic::from("d")]);
        assert!(storage.get_subscription(&Topic::from("c")).unwrap().is_some());
    }

    #[test]
    fn test_messages_are_keyed_by_id() {
        let storage = InMemoryNotifyStorage::new();
        let topic = Topic::from("a");
        for (id, sent_at) in [("n2", 20), ("n1", 10), ("n2", 20)] {
            storage
                .upsert_message(NotifyMessage {
                    topic: topic.clone(),
                    notification: Notification {
                        id: id.to_string(),
                        sent_at,
                        notification_type: "alerts".to_string(),
                        title: id.to_string(),
                        body: String::new(),
                        icon: None,
                        url: None,
                        is_read: false,
                    },
                })
                .unwrap();
        }

        let ids: Vec<_> = storage
            .get_messages(&topic)
            .unwrap()
            .into_iter()
            .map(|m| m.notification.id)
            .collect();
        assert_eq!(ids, vec!["n1", "n2"]);

        storage.delete_messages(&topic).unwrap();
        assert!(storage.get_messages(&topic).unwrap().is_empty());
    }
}
