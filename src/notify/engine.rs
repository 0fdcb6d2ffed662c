use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::hex;
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::identity::{DidResolver, IdentityClient, MessageSigner};
use super::jwt::{NotifyClaims, verify_claims};
use super::storage::NotifyStorageRepository;
use super::types::{
    NotificationPage, NotifyDeleteParams, NotifyGetNotificationsParams, NotifyMessage,
    NotifyMessageParams, NotifyResponseAuth, NotifySubscribeParams,
    NotifySubscriptionsChangedParams, NotifyUpdateParams, NotifyWatchSubscriptionsParams,
    RegisteredAccount, ServerSubscription, Subscription, WatchedTopic,
};
use crate::cacao::{Cacao, CacaoPayload};
use crate::codec::EnvelopeType;
use crate::constants::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_KEYSERVER_URL, DEFAULT_NOTIFY_SERVER_DOMAIN,
    NOTIFY_DELETE_ACT, NOTIFY_DELETE_RESPONSE_ACT, NOTIFY_GET_NOTIFICATIONS_ACT,
    NOTIFY_GET_NOTIFICATIONS_RESPONSE_ACT, NOTIFY_MESSAGE_ACT, NOTIFY_MESSAGE_RESPONSE_ACT,
    NOTIFY_SUBSCRIPTION_ACT, NOTIFY_SUBSCRIPTION_RESPONSE_ACT,
    NOTIFY_SUBSCRIPTIONS_CHANGED_ACT, NOTIFY_SUBSCRIPTIONS_CHANGED_RESPONSE_ACT,
    NOTIFY_UPDATE_ACT, NOTIFY_UPDATE_RESPONSE_ACT, NOTIFY_WATCH_SUBSCRIPTIONS_ACT,
    NOTIFY_WATCH_SUBSCRIPTIONS_RESPONSE_ACT, UNREGISTER_IDENTITY_ACT,
};
use crate::error::{Error, Result};
use crate::interactor::{Delivery, RelayJsonRpcInteractor};
use crate::relay_auth::Keypair;
use crate::rpc::JsonRpcResponse;
use crate::types::Topic;
use crate::utils::{
    AccountId, encode_did_web, random_bytes32, topic_from_public_key,
    topic_from_sym_key, unix_timestamp,
};
use crate::wc_message::{WcMethod, WcParams, WcRequest};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum NotifyEvent {
    Message(NotifyMessage),
    /// The notify server pushed a new subscription list for a watched
    /// account.
    SubscriptionsChanged {
        account: AccountId,
        subscriptions: Vec<Subscription>,
    },
    Error {
        topic: Option<Topic>,
        message: String,
    },
}

/// Topics of a first contact with a domain: requests go to the topic derived
/// from its key agreement key, responses come back on the topic of the
/// shared key.
struct KeyAgreementTopics {
    request_topic: Topic,
    response_topic: Topic,
    self_public_key: [u8; 32],
}

/// DID-JWT authenticated subscriptions to app notifications.
pub struct NotifyEngine {
    interactor: Arc<RelayJsonRpcInteractor>,
    storage: Arc<dyn NotifyStorageRepository>,
    resolver: Arc<dyn DidResolver>,
    identity: Arc<dyn IdentityClient>,
    keyserver_url: String,
    notify_server_domain: String,
    events: broadcast::Sender<NotifyEvent>,
    call_timeout: Duration,
}

impl NotifyEngine {
    pub fn new(
        interactor: Arc<RelayJsonRpcInteractor>,
        storage: Arc<dyn NotifyStorageRepository>,
        resolver: Arc<dyn DidResolver>,
        identity: Arc<dyn IdentityClient>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            interactor,
            storage,
            resolver,
            identity,
            keyserver_url: DEFAULT_KEYSERVER_URL.to_string(),
            notify_server_domain: DEFAULT_NOTIFY_SERVER_DOMAIN.to_string(),
            events,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_keyserver_url(mut self, keyserver_url: impl Into<String>) -> Self {
        self.keyserver_url = keyserver_url.into();
        self
    }

    pub fn with_notify_server_domain(mut self, domain: impl Into<String>) -> Self {
        self.notify_server_domain = domain.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn events(&self) -> broadcast::Receiver<NotifyEvent> {
        self.events.subscribe()
    }

    pub fn storage(&self) -> &Arc<dyn NotifyStorageRepository> {
        &self.storage
    }

    fn emit(&self, event: NotifyEvent) {
        let _ = self.events.send(event);
    }

    fn registered(&self, account: &AccountId) -> Result<RegisteredAccount> {
        self.storage
            .get_account(account)?
            .ok_or_else(|| Error::AccountNotRegistered(account.to_string()))
    }

    fn claims(
        &self,
        act: &str,
        identity: &Keypair,
        account: &AccountId,
        aud: impl Into<String>,
    ) -> Result<NotifyClaims> {
        Ok(NotifyClaims {
            ksu: Some(self.keyserver_url.clone()),
            ..NotifyClaims::new(act, identity, aud, account.did_pkh(), unix_timestamp()?)
        })
    }

    /// Registers a fresh identity key for `account` at the keyserver and
    /// returns its did:key. An account registered with the same scope keeps
    /// its identity.
    pub async fn register(
        &self,
        account: &AccountId,
        app_domain: &str,
        is_limited: bool,
        signer: &dyn MessageSigner,
    ) -> Result<String> {
        if let Some(existing) = self.storage.get_account(account)? {
            if existing.is_limited == is_limited && existing.app_domain == app_domain {
                return Ok(Keypair::from_seed(existing.identity_seed).did_key());
            }
        }

        let identity = Keypair::generate();
        let payload = CacaoPayload::identity_registration(
            account,
            &identity.did_key(),
            &self.keyserver_url,
            app_domain,
            is_limited,
            hex::encode(random_bytes32()),
            OffsetDateTime::now_utc(),
        )?;
        let signature = signer.sign_message(account, &payload.caip122_message()?).await?;
        self.identity
            .register_identity(&self.keyserver_url, &Cacao::new(payload, signature))
            .await?;

        self.storage.upsert_account(RegisteredAccount {
            account: account.clone(),
            identity_seed: identity.seed,
            is_limited,
            app_domain: app_domain.to_string(),
            watch: None,
        })?;
        log::info!("registered notify identity for {account}");
        Ok(identity.did_key())
    }

    fn key_agreement_topics(&self, peer_key_agreement: &[u8; 32]) -> Result<KeyAgreementTopics> {
        let keys = self.interactor.keys();
        let self_public_key = keys.generate_and_store_x25519_key_pair()?;
        let response_topic = keys
            .generate_topic_from_key_agreement(&self_public_key, &hex::encode(peer_key_agreement))?;
        let sym_key = keys
            .get_sym_key(&response_topic)?
            .ok_or_else(|| Error::Encryption(format!("no key for topic {response_topic}")))?;

        let request_topic = topic_from_public_key(peer_key_agreement);
        keys.set_sym_key(&request_topic, sym_key)?;

        let self_public_key: [u8; 32] = hex::decode(&self_public_key)?
            .as_slice()
            .try_into()
            .map_err(|_| Error::Encryption("public key must be 32 bytes".to_string()))?;

        Ok(KeyAgreementTopics {
            request_topic,
            response_topic,
            self_public_key,
        })
    }

    /// Publishes a Notify request and verifies the `responseAuth` JWT of its
    /// response.
    async fn call(
        &self,
        params: WcParams,
        request_topic: &Topic,
        response_topic: &Topic,
        envelope_type: EnvelopeType,
        expected_act: &str,
        expected_iss: &str,
    ) -> Result<NotifyClaims> {
        let method = params.method();
        let request = params.into_request()?;

        let waiter = self.interactor.response_waiter(request.id, response_topic);
        let delivery = self
            .interactor
            .publish_json_rpc_request(
                request_topic,
                method.request_params(),
                &request,
                envelope_type,
            )
            .await?;
        if delivery == Delivery::Dropped {
            return Err(Error::InternalError(format!(
                "{method} {} is already in flight",
                request.id
            )));
        }

        let response = waiter.wait(self.call_timeout).await;
        // Once answered or timed out a late reply is stale
        self.interactor
            .history()
            .delete_record(request_topic, request.id)?;

        match response?.response {
            JsonRpcResponse::Result(result) => {
                let auth: NotifyResponseAuth = serde_json::from_value(result.result)?;
                verify_claims(
                    &auth.response_auth,
                    expected_act,
                    Some(expected_iss),
                    unix_timestamp()?,
                )
            }
            JsonRpcResponse::Error(e) => Err(Error::Peer(e.error)),
        }
    }

    /// Replaces the account's subscriptions with the server's list, keeping
    /// relay subscriptions and topic keys in step.
    async fn apply_server_subscriptions(
        &self,
        registered: &RegisteredAccount,
        server_subscriptions: Vec<ServerSubscription>,
    ) -> Result<Vec<Subscription>> {
        let keys = self.interactor.keys();

        let mut subscriptions = Vec::with_capacity(server_subscriptions.len());
        for subscription in server_subscriptions {
            let sym_key: [u8; 32] = hex::decode(&subscription.sym_key)?
                .as_slice()
                .try_into()
                .map_err(|_| {
                    Error::InvalidJwt(format!(
                        "sym key of {} must be 32 bytes",
                        subscription.app_domain
                    ))
                })?;
            let topic = topic_from_sym_key(&sym_key);
            keys.set_sym_key(&topic, sym_key)?;

            subscriptions.push(Subscription {
                topic,
                account: registered.account.clone(),
                app_domain: subscription.app_domain,
                app_authentication_key: subscription.app_authentication_key,
                scopes: subscription.scope,
                expiry: subscription.expiry,
            });
        }

        let replaced = self
            .storage
            .replace_subscriptions(&registered.account, subscriptions.clone())?;

        let added: Vec<Topic> = subscriptions
            .iter()
            .filter(|s| !replaced.iter().any(|r| r.topic == s.topic))
            .map(|s| s.topic.clone())
            .collect();
        if !added.is_empty() {
            self.interactor.batch_subscribe(added).await?;
        }

        for removed in replaced
            .iter()
            .filter(|r| !subscriptions.iter().any(|s| s.topic == r.topic))
        {
            self.interactor.unsubscribe(&removed.topic).await?;
            keys.remove_keys(&removed.topic)?;
            self.storage.delete_messages(&removed.topic)?;
        }

        log::debug!(
            "{} has {} subscriptions",
            registered.account,
            subscriptions.len()
        );
        Ok(subscriptions)
    }

    /// Asks the notify server for the account's subscriptions and keeps
    /// listening for changes to them.
    pub async fn watch_subscriptions(&self, account: &AccountId) -> Result<Vec<Subscription>> {
        let mut registered = self.registered(account)?;
        let identity = Keypair::from_seed(registered.identity_seed);

        let server = self.resolver.resolve(&self.notify_server_domain).await?;
        let server_key = server.authentication_did_key();
        let topics = self.key_agreement_topics(&server.key_agreement)?;

        let mut claims = self.claims(
            NOTIFY_WATCH_SUBSCRIPTIONS_ACT,
            &identity,
            account,
            server_key.clone(),
        )?;
        if registered.is_limited {
            claims.app = Some(encode_did_web(&registered.app_domain));
        }
        let params = WcParams::NotifyWatchSubscriptions(NotifyWatchSubscriptionsParams {
            watch_subscriptions_auth: claims.sign(&identity)?,
        });

        self.interactor.subscribe(&topics.response_topic).await?;
        let response = match self
            .call(
                params,
                &topics.request_topic,
                &topics.response_topic,
                EnvelopeType::One {
                    sender_public_key: topics.self_public_key,
                },
                NOTIFY_WATCH_SUBSCRIPTIONS_RESPONSE_ACT,
                &server_key,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.leave_response_topic(&topics.response_topic).await?;
                return Err(e);
            }
        };

        let subscriptions = self
            .apply_server_subscriptions(&registered, response.sbs.unwrap_or_default())
            .await?;

        let previous = registered.watch.replace(WatchedTopic {
            topic: topics.response_topic.clone(),
            server_authentication_key: server_key,
        });
        self.storage.upsert_account(registered)?;

        // Changes now arrive on the new topic only
        if let Some(previous) = previous.filter(|w| w.topic != topics.response_topic) {
            self.leave_response_topic(&previous.topic).await?;
        }
        Ok(subscriptions)
    }

    async fn leave_response_topic(&self, topic: &Topic) -> Result<()> {
        if let Err(e) = self.interactor.unsubscribe(topic).await {
            log::warn!("leaving {topic} failed: {e}");
        }
        self.interactor.keys().remove_keys(topic)
    }

    /// Subscribes the account to an app and returns the account's
    /// subscriptions as the app's server now sees them.
    pub async fn subscribe(
        &self,
        account: &AccountId,
        app_domain: &str,
        scopes: &[String],
    ) -> Result<Vec<Subscription>> {
        let registered = self.registered(account)?;
        let identity = Keypair::from_seed(registered.identity_seed);

        let app = self.resolver.resolve(app_domain).await?;
        let app_key = app.authentication_did_key();
        let topics = self.key_agreement_topics(&app.key_agreement)?;

        let claims = NotifyClaims {
            app: Some(encode_did_web(app_domain)),
            scp: Some(scopes.join(" ")),
            ..self.claims(NOTIFY_SUBSCRIPTION_ACT, &identity, account, app_key.clone())?
        };
        let params = WcParams::NotifySubscribe(NotifySubscribeParams {
            subscription_auth: claims.sign(&identity)?,
        });

        self.interactor.subscribe(&topics.response_topic).await?;
        let response = self
            .call(
                params,
                &topics.request_topic,
                &topics.response_topic,
                EnvelopeType::One {
                    sender_public_key: topics.self_public_key,
                },
                NOTIFY_SUBSCRIPTION_RESPONSE_ACT,
                &app_key,
            )
            .await;

        // The response topic only served this exchange
        self.leave_response_topic(&topics.response_topic).await?;

        let response = response?;
        self.apply_server_subscriptions(&registered, response.sbs.unwrap_or_default())
            .await
    }

    fn subscription(&self, topic: &Topic) -> Result<(Subscription, RegisteredAccount)> {
        let subscription = self
            .storage
            .get_subscription(topic)?
            .ok_or_else(|| Error::NoSequence(topic.clone()))?;
        let registered = self.registered(&subscription.account)?;
        Ok((subscription, registered))
    }

    pub async fn update(&self, topic: &Topic, scopes: &[String]) -> Result<Subscription> {
        let (subscription, registered) = self.subscription(topic)?;
        let identity = Keypair::from_seed(registered.identity_seed);

        let claims = NotifyClaims {
            app: Some(encode_did_web(&subscription.app_domain)),
            scp: Some(scopes.join(" ")),
            ..self.claims(
                NOTIFY_UPDATE_ACT,
                &identity,
                &registered.account,
                subscription.app_authentication_key.clone(),
            )?
        };
        let params = WcParams::NotifyUpdate(NotifyUpdateParams {
            update_auth: claims.sign(&identity)?,
        });

        self.call(
            params,
            topic,
            topic,
            EnvelopeType::Zero,
            NOTIFY_UPDATE_RESPONSE_ACT,
            &subscription.app_authentication_key,
        )
        .await?;

        let updated = Subscription {
            scopes: scopes.to_vec(),
            ..subscription
        };
        self.storage.upsert_subscription(updated.clone())?;
        Ok(updated)
    }

    /// Unsubscribes from an app and drops the topic with its notifications.
    pub async fn delete(&self, topic: &Topic) -> Result<()> {
        let (subscription, registered) = self.subscription(topic)?;
        let identity = Keypair::from_seed(registered.identity_seed);

        let claims = NotifyClaims {
            app: Some(encode_did_web(&subscription.app_domain)),
            ..self.claims(
                NOTIFY_DELETE_ACT,
                &identity,
                &registered.account,
                subscription.app_authentication_key.clone(),
            )?
        };
        let params = WcParams::NotifyDelete(NotifyDeleteParams {
            delete_auth: claims.sign(&identity)?,
        });

        self.call(
            params,
            topic,
            topic,
            EnvelopeType::Zero,
            NOTIFY_DELETE_RESPONSE_ACT,
            &subscription.app_authentication_key,
        )
        .await?;

        self.forget_subscription(topic).await
    }

    async fn forget_subscription(&self, topic: &Topic) -> Result<()> {
        self.interactor.unsubscribe(topic).await?;
        self.interactor.keys().remove_keys(topic)?;
        self.storage.delete_messages(topic)?;
        self.storage.delete_subscription(topic)
    }

    /// Pages through past notifications of a subscription. Fetched
    /// notifications are stored like pushed ones.
    pub async fn get_notifications(
        &self,
        topic: &Topic,
        limit: u64,
        after: Option<String>,
        unread_first: bool,
    ) -> Result<NotificationPage> {
        let (subscription, registered) = self.subscription(topic)?;
        let identity = Keypair::from_seed(registered.identity_seed);

        let claims = NotifyClaims {
            app: Some(encode_did_web(&subscription.app_domain)),
            lmt: Some(limit),
            aft: after,
            urf: Some(unread_first),
            ..self.claims(
                NOTIFY_GET_NOTIFICATIONS_ACT,
                &identity,
                &registered.account,
                subscription.app_authentication_key.clone(),
            )?
        };
        let params = WcParams::NotifyGetNotifications(NotifyGetNotificationsParams {
            auth: claims.sign(&identity)?,
        });

        let response = self
            .call(
                params,
                topic,
                topic,
                EnvelopeType::Zero,
                NOTIFY_GET_NOTIFICATIONS_RESPONSE_ACT,
                &subscription.app_authentication_key,
            )
            .await?;

        let notifications = response.nfs.unwrap_or_default();
        for notification in &notifications {
            self.storage.upsert_message(NotifyMessage {
                topic: topic.clone(),
                notification: notification.clone(),
            })?;
        }

        Ok(NotificationPage {
            notifications,
            has_more: response.mre.unwrap_or(false),
        })
    }

    pub fn messages(&self, topic: &Topic) -> Result<Vec<NotifyMessage>> {
        self.storage.get_messages(topic)
    }

    pub fn subscriptions(&self, account: &AccountId) -> Result<Vec<Subscription>> {
        self.storage.get_subscriptions(account)
    }

    /// Tears the account down: identity, watch topic, account record, then
    /// every subscription. Stops at the first failing step.
    pub async fn unregister(&self, account: &AccountId) -> Result<()> {
        let registered = self.registered(account)?;

        self.unregister_identity(&registered)
            .await
            .map_err(unregister_step("unregister_identity"))?;
        self.stop_watching_subscriptions(&registered)
            .await
            .map_err(unregister_step("stop_watching_subscriptions"))?;
        self.storage
            .delete_account(account)
            .map_err(unregister_step("delete_account"))?;
        self.delete_subscriptions(account)
            .await
            .map_err(unregister_step("delete_subscriptions"))?;

        log::info!("unregistered {account}");
        Ok(())
    }

    async fn unregister_identity(&self, registered: &RegisteredAccount) -> Result<()> {
        let identity = Keypair::from_seed(registered.identity_seed);
        let id_auth = self
            .claims(
                UNREGISTER_IDENTITY_ACT,
                &identity,
                &registered.account,
                self.keyserver_url.clone(),
            )?
            .sign(&identity)?;
        self.identity
            .unregister_identity(&self.keyserver_url, &id_auth)
            .await
    }

    async fn stop_watching_subscriptions(&self, registered: &RegisteredAccount) -> Result<()> {
        if let Some(watch) = &registered.watch {
            self.interactor.unsubscribe(&watch.topic).await?;
            self.interactor.keys().remove_keys(&watch.topic)?;
        }
        Ok(())
    }

    async fn delete_subscriptions(&self, account: &AccountId) -> Result<()> {
        for subscription in self.storage.get_subscriptions(account)? {
            self.forget_subscription(&subscription.topic).await?;
        }
        Ok(())
    }

    /// Handles notify requests pushed by app and notify servers.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        let mut requests = self.interactor.requests();

        tokio::spawn(async move {
            loop {
                match requests.recv().await {
                    Ok(request) => {
                        if !WcMethod::from_str(&request.method).is_ok_and(|m| m.is_notify()) {
                            continue;
                        }
                        let this = this.clone();
                        tokio::spawn(async move {
                            let topic = request.topic.clone();
                            if let Err(e) = this.on_request(request).await {
                                log::warn!("notify request on {topic} failed: {e}");
                                this.emit(NotifyEvent::Error {
                                    topic: Some(topic),
                                    message: e.to_string(),
                                });
                            }
                        });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("notify engine skipped {skipped} requests");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn on_request(&self, request: WcRequest) -> Result<()> {
        match request.decode()? {
            WcParams::NotifyMessage(params) => self.on_message(&request, params).await,
            WcParams::NotifySubscriptionsChanged(params) => {
                self.on_subscriptions_changed(&request, params).await
            }
            _ => {
                log::debug!("ignoring {request}");
                Ok(())
            }
        }
    }

    async fn on_message(&self, request: &WcRequest, params: NotifyMessageParams) -> Result<()> {
        let (subscription, registered) = self.subscription(&request.topic)?;
        let claims = verify_claims(
            &params.message_auth,
            NOTIFY_MESSAGE_ACT,
            Some(&subscription.app_authentication_key),
            unix_timestamp()?,
        )?;
        if claims.sub != registered.account.did_pkh() {
            return Err(Error::InvalidJwt(format!(
                "message for {} on a subscription of {}",
                claims.sub, registered.account
            )));
        }
        let notification = claims
            .msg
            .ok_or_else(|| Error::InvalidJwt("notify message without msg".to_string()))?;

        let message = NotifyMessage {
            topic: request.topic.clone(),
            notification,
        };
        self.storage.upsert_message(message.clone())?;

        let identity = Keypair::from_seed(registered.identity_seed);
        let receipt = NotifyClaims {
            app: Some(encode_did_web(&subscription.app_domain)),
            ..self.claims(
                NOTIFY_MESSAGE_RESPONSE_ACT,
                &identity,
                &registered.account,
                subscription.app_authentication_key.clone(),
            )?
        };
        self.respond_with_auth(request, receipt.sign(&identity)?).await?;

        self.emit(NotifyEvent::Message(message));
        Ok(())
    }

    async fn on_subscriptions_changed(
        &self,
        request: &WcRequest,
        params: NotifySubscriptionsChangedParams,
    ) -> Result<()> {
        let (registered, watch) = self
            .storage
            .get_accounts()?
            .into_iter()
            .find(|account| {
                account
                    .watch
                    .as_ref()
                    .is_some_and(|watch| watch.topic == request.topic)
            })
            .and_then(|account| {
                let watch = account.watch.clone()?;
                Some((account, watch))
            })
            .ok_or_else(|| Error::NoSequence(request.topic.clone()))?;

        let claims = verify_claims(
            &params.subscriptions_changed_auth,
            NOTIFY_SUBSCRIPTIONS_CHANGED_ACT,
            Some(&watch.server_authentication_key),
            unix_timestamp()?,
        )?;
        let subscriptions = self
            .apply_server_subscriptions(&registered, claims.sbs.unwrap_or_default())
            .await?;

        let identity = Keypair::from_seed(registered.identity_seed);
        let receipt = self.claims(
            NOTIFY_SUBSCRIPTIONS_CHANGED_RESPONSE_ACT,
            &identity,
            &registered.account,
            watch.server_authentication_key,
        )?;
        self.respond_with_auth(request, receipt.sign(&identity)?).await?;

        self.emit(NotifyEvent::SubscriptionsChanged {
            account: registered.account,
            subscriptions,
        });
        Ok(())
    }

    async fn respond_with_auth(&self, request: &WcRequest, response_auth: String) -> Result<()> {
        let result = serde_json::to_value(NotifyResponseAuth { response_auth })?;
        self.interactor.respond_with_params(request, result).await
    }
}

fn unregister_step(step: &'static str) -> impl FnOnce(Error) -> Error {
    move |source| {
        log::warn!("unregister stopped at {step}: {source}");
        Error::Unregister {
            step,
            source: Box::new(source),
        }
    }
}

