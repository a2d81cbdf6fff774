//! Topic subscription bookkeeping.
//!
//! The registry lives inside the connection manager's state lock so that the
//! connection state and the set of live subscriptions always change together.

use std::collections::HashMap;

use super::types::{SubscriptionId, Topic};

/// At most one live subscription per topic, keyed both ways so inbound
/// `MESSAGE` frames can be routed by their `subscription` header.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_topic: HashMap<Topic, SubscriptionId>,
    by_id: HashMap<SubscriptionId, Topic>,
    next_seq: u64,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new subscription for `topic`.
    ///
    /// Returns the handle to send in `SUBSCRIBE`, or `None` if the topic is
    /// already subscribed.
    pub fn insert(&mut self, topic: Topic) -> Option<SubscriptionId> {
        if self.by_topic.contains_key(&topic) {
            return None;
        }
        let id = SubscriptionId::from_seq(self.next_seq);
        self.next_seq += 1;
        self.by_id.insert(id.clone(), topic.clone());
        self.by_topic.insert(topic, id.clone());
        Some(id)
    }

    /// Forget `topic`, returning its handle for `UNSUBSCRIBE`.
    pub fn remove(&mut self, topic: &Topic) -> Option<SubscriptionId> {
        let id = self.by_topic.remove(topic)?;
        self.by_id.remove(&id);
        Some(id)
    }

    /// Topic of a live subscription handle.
    pub fn topic_for(&self, id: &str) -> Option<&Topic> {
        self.by_id.get(id)
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.by_topic.contains_key(topic)
    }

    /// Remove every subscription, returning the handles that were live.
    ///
    /// Handle numbering continues so that late frames for a cleared handle
    /// can never match a fresh subscription.
    pub fn drain(&mut self) -> Vec<(Topic, SubscriptionId)> {
        self.by_id.clear();
        let mut drained: Vec<_> = self.by_topic.drain().collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        drained
    }

    /// All subscribed topics, sorted.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.by_topic.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Get the total number of topics.
    pub fn len(&self) -> usize {
        self.by_topic.len()
    }

    /// Check if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }
}
