//! Subscription registry
//!
//! Maps each topic to its consumers in registration order. The registry
//! decides when wire traffic is needed: `add` yields a `subscribe` only for
//! the first consumer of a topic, `remove` yields an `unsubscribe` only when
//! the last one leaves. The caller sends what it is given.

use crate::core::codec::OutboundMessage;
use crate::traits::TopicHandler;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Identifies one consumer of one topic
pub type ConsumerId = u64;

struct TopicEntry {
    message_type: String,
    consumers: Vec<(ConsumerId, Box<dyn TopicHandler>)>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    topics: HashMap<String, TopicEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer; returns the wire `subscribe` if this is the
    /// topic's first consumer.
    pub fn add(
        &mut self,
        topic: &str,
        message_type: &str,
        id: ConsumerId,
        handler: Box<dyn TopicHandler>,
    ) -> Option<OutboundMessage> {
        match self.topics.get_mut(topic) {
            Some(entry) => {
                if entry.message_type != message_type {
                    warn!(
                        topic,
                        existing = %entry.message_type,
                        requested = message_type,
                        "Topic already subscribed with a different type, keeping the existing one"
                    );
                }
                entry.consumers.push((id, handler));
                None
            }
            None => {
                self.topics.insert(
                    topic.to_string(),
                    TopicEntry {
                        message_type: message_type.to_string(),
                        consumers: vec![(id, handler)],
                    },
                );
                Some(OutboundMessage::Subscribe {
                    topic: topic.to_string(),
                    message_type: message_type.to_string(),
                })
            }
        }
    }

    /// Remove a consumer; returns the wire `unsubscribe` if the topic has
    /// no consumers left. Unknown topics or ids are ignored.
    pub fn remove(&mut self, topic: &str, id: ConsumerId) -> Option<OutboundMessage> {
        let entry = self.topics.get_mut(topic)?;
        let before = entry.consumers.len();
        entry.consumers.retain(|(consumer_id, _)| *consumer_id != id);
        if entry.consumers.len() == before {
            debug!(topic, id, "Consumer already removed");
            return None;
        }

        if entry.consumers.is_empty() {
            self.topics.remove(topic);
            return Some(OutboundMessage::Unsubscribe {
                topic: topic.to_string(),
            });
        }
        None
    }

    /// Deliver `message` to every consumer of `topic`, in registration order
    ///
    /// A consumer that errors or panics is logged and skipped; the others
    /// still receive the message. Returns the number of successful deliveries.
    pub fn dispatch(&mut self, topic: &str, message: &Value) -> usize {
        let Some(entry) = self.topics.get_mut(topic) else {
            debug!(topic, "No consumers for topic, dropping message");
            return 0;
        };

        let mut delivered = 0;
        for (id, handler) in entry.consumers.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(topic, consumer = *id, error = %e, "Topic consumer failed");
                }
                Err(_) => {
                    warn!(topic, consumer = *id, "Topic consumer panicked");
                }
            }
        }
        delivered
    }

    /// One `subscribe` per live topic, for restoring wire state after a reconnect
    pub fn resubscribe_messages(&self) -> Vec<OutboundMessage> {
        let mut topics: Vec<_> = self.topics.iter().collect();
        topics.sort_by(|a, b| a.0.cmp(b.0));
        topics
            .into_iter()
            .map(|(topic, entry)| OutboundMessage::Subscribe {
                topic: topic.clone(),
                message_type: entry.message_type.clone(),
            })
            .collect()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn consumer_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |entry| entry.consumers.len())
    }
}
