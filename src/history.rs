//! Ledger of requests sent and received, keyed by (topic, id).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;

use crate::error::Result;
use crate::rpc::RequestId;
use crate::types::{Topic, TransportType};

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcHistoryRecord {
    pub id: RequestId,
    pub topic: Topic,
    pub method: String,
    pub body: String,
    pub response: Option<String>,
    pub transport_type: TransportType,
}

#[derive(Default)]
pub struct JsonRpcHistory {
    records: Mutex<HashMap<(Topic, RequestId), JsonRpcHistoryRecord>>,
}

impl JsonRpcHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record unless one already exists for (topic, id). Returns
    /// `false` for duplicates.
    pub fn set_request(
        &self,
        id: RequestId,
        topic: &Topic,
        method: &str,
        body: &str,
        transport_type: TransportType,
    ) -> Result<bool> {
        let mut records = self.records.lock()?;
        match records.entry((topic.clone(), id)) {
            Entry::Occupied(_) => {
                log::debug!("duplicate request {id} on {topic}");
                Ok(false)
            }
            Entry::Vacant(entry) => {
                entry.insert(JsonRpcHistoryRecord {
                    id,
                    topic: topic.clone(),
                    method: method.to_string(),
                    body: body.to_string(),
                    response: None,
                    transport_type,
                });
                Ok(true)
            }
        }
    }

    /// Attaches a response to the pending record with this id. Returns `None`
    /// when there is no such record or it was already answered.
    pub fn update_request_with_response(
        &self,
        id: RequestId,
        response: &str,
    ) -> Result<Option<JsonRpcHistoryRecord>> {
        let mut records = self.records.lock()?;
        let record = records
            .values_mut()
            .find(|record| record.id == id && record.response.is_none());

        Ok(record.map(|record| {
            record.response = Some(response.to_string());
            record.clone()
        }))
    }

    pub fn get_record_by_id(
        &self,
        id: RequestId,
    ) -> Result<Option<JsonRpcHistoryRecord>> {
        Ok(self
            .records
            .lock()?
            .values()
            .find(|record| record.id == id)
            .cloned())
    }

    pub fn get_pending_records_by_topic(
        &self,
        topic: &Topic,
    ) -> Result<Vec<JsonRpcHistoryRecord>> {
        let mut pending: Vec<_> = self
            .records
            .lock()?
            .values()
            .filter(|record| &record.topic == topic && record.response.is_none())
            .cloned()
            .collect();
        pending.sort_by_key(|record| record.id);
        Ok(pending)
    }

    /// Drops one record once its exchange is over.
    pub fn delete_record(&self, topic: &Topic, id: RequestId) -> Result<()> {
        self.records.lock()?.remove(&(topic.clone(), id));
        Ok(())
    }

    pub fn delete_by_topic(&self, topic: &Topic) -> Result<()> {
        self.records.lock()?.retain(|(t, _), _| t != topic);
        Ok(())
    }

    pub fn delete_by_topics(&self, topics: &[Topic]) -> Result<()> {
        self.records
            .lock()?
            .retain(|(t, _), _| !topics.contains(t));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_set_request_is_single_flight() {
        let history = JsonRpcHistory::new();
        let topic = Topic::from("t");

        assert!(
            history
                .set_request(RequestId(1), &topic, "wc_sessionPing", "{}", TransportType::Relay)
                .unwrap()
        );
        assert!(
            !history
                .set_request(RequestId(1), &topic, "wc_sessionPing", "{}", TransportType::Relay)
                .unwrap()
        );
        // Same id on another topic is a different record
        let other = Topic::from("u");
        assert!(
            history
                .set_request(RequestId(1), &other, "wc_sessionPing", "{}", TransportType::Relay)
                .unwrap()
        );
    }

    #[test]
    fn test_concurrent_set_request() {
        let history = Arc::new(JsonRpcHistory::new());
        let topic = Topic::from("t");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let history = history.clone();
                let topic = topic.clone();
                std::thread::spawn(move || {
                    history
                        .set_request(RequestId(7), &topic, "m", "{}", TransportType::Relay)
                        .unwrap()
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();
        assert_eq!(inserted, 1);
    }

    #[test]
    fn test_update_with_response() {
        let history = JsonRpcHistory::new();
        let topic = Topic::from("t");
        history
            .set_request(RequestId(5), &topic, "wc_sessionRequest", "{}", TransportType::LinkMode)
            .unwrap();

        assert!(
            history
                .update_request_with_response(RequestId(6), "{}")
                .unwrap()
                .is_none()
        );

        let record = history
            .update_request_with_response(RequestId(5), "{\"result\":true}")
            .unwrap()
            .unwrap();
        assert_eq!(record.method, "wc_sessionRequest");
        assert_eq!(record.transport_type, TransportType::LinkMode);
        assert_eq!(record.response.as_deref(), Some("{\"result\":true}"));

        // Late duplicate
        assert!(
            history
                .update_request_with_response(RequestId(5), "{}")
                .unwrap()
                .is_none()
        );
        assert!(history.get_pending_records_by_topic(&topic).unwrap().is_empty());
    }

    #[test]
    fn test_delete_by_topics() {
        let history = JsonRpcHistory::new();
        for (i, topic) in ["a", "b", "c", "d"].iter().enumerate() {
            let topic = Topic::from(*topic);
            history
                .set_request(RequestId(i as i64), &topic, "m", "{}", TransportType::Relay)
                .unwrap();
        }

        history.delete_by_topic(&Topic::from("a")).unwrap();
        assert!(history.get_record_by_id(RequestId(0)).unwrap().is_none());

        history
            .delete_by_topics(&[Topic::from("b"), Topic::from("c")])
            .unwrap();
        assert!(history.get_record_by_id(RequestId(1)).unwrap().is_none());
        assert!(history.get_record_by_id(RequestId(2)).unwrap().is_none());

        // Only the exact (topic, id) pair goes
        history.delete_record(&Topic::from("a"), RequestId(3)).unwrap();
        assert!(history.get_record_by_id(RequestId(3)).unwrap().is_some());
        history.delete_record(&Topic::from("d"), RequestId(3)).unwrap();
        assert!(history.get_record_by_id(RequestId(3)).unwrap().is_none());
    }
}
