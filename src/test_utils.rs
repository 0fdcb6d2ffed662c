//! In-process relay for tests. Clients connected to one hub see each other's
//! publishes, like two apps talking through the real relay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::relay::{NetworkState, RelayConnection, RelayEvent};
use crate::rpc::RequestId;
use crate::types::{IrnParams, IrnTag, Topic};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayCall {
    Publish { topic: Topic, params: IrnParams },
    Subscribe(Topic),
    BatchSubscribe(Vec<Topic>),
    Unsubscribe(Topic),
    ProposeSession { pairing_topic: Topic, correlation_id: RequestId },
    ApproveSession { pairing_topic: Topic, session_topic: Topic },
}

#[derive(Default)]
struct HubState {
    subscribers: HashMap<Topic, Vec<(usize, broadcast::Sender<RelayEvent>)>>,
    // messages nobody else was subscribed to yet: topic -> (sender, event)
    mailbox: HashMap<Topic, Vec<(usize, RelayEvent)>>,
}

#[derive(Default)]
pub struct MockRelayHub {
    state: Mutex<HubState>,
    next_id: AtomicUsize,
}

impl MockRelayHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect(self: &Arc<Self>) -> Arc<MockRelay> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockRelay::with_hub(id, Some(self.clone())))
    }

    fn attach(&self, client: usize, topic: &Topic, sender: &broadcast::Sender<RelayEvent>) {
        let mut state = self.state.lock().unwrap();
        let subscribers = state.subscribers.entry(topic.clone()).or_default();
        if !subscribers.iter().any(|(id, _)| *id == client) {
            subscribers.push((client, sender.clone()));
        }

        if let Some(pending) = state.mailbox.remove(topic) {
            let (mine, keep): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|(from, _)| *from != client);
            for (_, event) in mine {
                let _ = sender.send(event);
            }
            if !keep.is_empty() {
                state.mailbox.insert(topic.clone(), keep);
            }
        }
    }

    fn detach(&self, client: usize, topic: &Topic) {
        let mut state = self.state.lock().unwrap();
        if let Some(subscribers) = state.subscribers.get_mut(topic) {
            subscribers.retain(|(id, _)| *id != client);
        }
    }

    fn deliver(&self, from: usize, topic: &Topic, message: &str, tag: IrnTag) {
        let event = RelayEvent {
            subscription_id: format!("sub-{topic}"),
            topic: topic.clone(),
            message: message.to_string(),
            published_at: 0,
            tag: tag.as_u16(),
        };

        let mut state = self.state.lock().unwrap();
        let mut delivered = false;
        if let Some(subscribers) = state.subscribers.get(topic) {
            for (id, sender) in subscribers {
                if *id != from {
                    delivered = true;
                    let _ = sender.send(event.clone());
                }
            }
        }
        if !delivered {
            state
                .mailbox
                .entry(topic.clone())
                .or_default()
                .push((from, event));
        }
    }
}

pub struct MockRelay {
    id: usize,
    hub: Option<Arc<MockRelayHub>>,
    events: broadcast::Sender<RelayEvent>,
    resubscribe: broadcast::Sender<()>,
    calls: Mutex<Vec<RelayCall>>,
    fail_publish: AtomicBool,
    fail_batch_call: Mutex<Option<usize>>,
    drop_last_batch_id: AtomicBool,
    batch_calls: AtomicUsize,
}

impl MockRelay {
    fn with_hub(id: usize, hub: Option<Arc<MockRelayHub>>) -> Self {
        let (events, _) = broadcast::channel(1024);
        let (resubscribe, _) = broadcast::channel(16);
        Self {
            id,
            hub,
            events,
            resubscribe,
            calls: Mutex::new(vec![]),
            fail_publish: AtomicBool::new(false),
            fail_batch_call: Mutex::new(None),
            drop_last_batch_id: AtomicBool::new(false),
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// A relay that acknowledges everything and delivers nothing.
    pub fn standalone() -> Arc<Self> {
        Arc::new(Self::with_hub(0, None))
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Fails the batch subscribe call with this zero based index.
    pub fn fail_batch_subscribe_call(&self, index: usize) {
        *self.fail_batch_call.lock().unwrap() = Some(index);
    }

    /// Answers batch subscribe with one id fewer than topics.
    pub fn drop_last_batch_id(&self, drop: bool) {
        self.drop_last_batch_id.store(drop, Ordering::SeqCst);
    }

    pub fn trigger_reconnect(&self) {
        let _ = self.resubscribe.send(());
    }

    pub fn calls(&self) -> Vec<RelayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RelayCall::Publish { .. }))
            .count()
    }

    pub fn published_tags(&self) -> Vec<u16> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                RelayCall::Publish { params, .. } => Some(params.tag.as_u16()),
                _ => None,
            })
            .collect()
    }

    pub fn batch_subscribe_calls(&self) -> Vec<Vec<Topic>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RelayCall::BatchSubscribe(topics) => Some(topics),
                _ => None,
            })
            .collect()
    }

    pub fn unsubscribed(&self) -> Vec<Topic> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RelayCall::Unsubscribe(topic) => Some(topic),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RelayCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RelayConnection for MockRelay {
    async fn publish(&self, topic: &Topic, message: &str, params: &IrnParams) -> Result<()> {
        self.record(RelayCall::Publish {
            topic: topic.clone(),
            params: *params,
        });
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(Error::Relay("publish rejected".to_string()));
        }
        if let Some(hub) = &self.hub {
            hub.deliver(self.id, topic, message, params.tag);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<String> {
        self.record(RelayCall::Subscribe(topic.clone()));
        if let Some(hub) = &self.hub {
            hub.attach(self.id, topic, &self.events);
        }
        Ok(format!("sub-{topic}"))
    }

    async fn batch_subscribe(&self, topics: &[Topic]) -> Result<Vec<String>> {
        self.record(RelayCall::BatchSubscribe(topics.to_vec()));
        let index = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_batch_call.lock().unwrap() == Some(index) {
            return Err(Error::Relay("batch subscribe rejected".to_string()));
        }
        if let Some(hub) = &self.hub {
            for topic in topics {
                hub.attach(self.id, topic, &self.events);
            }
        }
        let mut ids: Vec<String> = topics.iter().map(|t| format!("sub-{t}")).collect();
        if self.drop_last_batch_id.load(Ordering::SeqCst) {
            ids.pop();
        }
        Ok(ids)
    }

    async fn unsubscribe(&self, topic: &Topic) -> Result<()> {
        self.record(RelayCall::Unsubscribe(topic.clone()));
        if let Some(hub) = &self.hub {
            hub.detach(self.id, topic);
        }
        Ok(())
    }

    async fn propose_session(
        &self,
        pairing_topic: &Topic,
        session_proposal: &str,
        correlation_id: RequestId,
    ) -> Result<()> {
        self.record(RelayCall::ProposeSession {
            pairing_topic: pairing_topic.clone(),
            correlation_id,
        });
        if let Some(hub) = &self.hub {
            hub.deliver(self.id, pairing_topic, session_proposal, IrnTag::SessionPropose);
        }
        Ok(())
    }

    async fn approve_session(
        &self,
        pairing_topic: &Topic,
        session_topic: &Topic,
        session_proposal_response: &str,
        session_settlement_request: &str,
        _correlation_id: RequestId,
    ) -> Result<()> {
        self.record(RelayCall::ApproveSession {
            pairing_topic: pairing_topic.clone(),
            session_topic: session_topic.clone(),
        });
        if let Some(hub) = &self.hub {
            hub.deliver(
                self.id,
                pairing_topic,
                session_proposal_response,
                IrnTag::SessionProposeApproveResponse,
            );
            hub.deliver(
                self.id,
                session_topic,
                session_settlement_request,
                IrnTag::SessionSettle,
            );
        }
        Ok(())
    }

    fn subscription_events(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    fn resubscribe_events(&self) -> broadcast::Receiver<()> {
        self.resubscribe.subscribe()
    }
}

pub struct TestNetwork(pub AtomicBool);

impl TestNetwork {
    pub fn online() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(true)))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl NetworkState for TestNetwork {
    fn is_available(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
