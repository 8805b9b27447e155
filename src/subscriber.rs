//! Topic-indexed dispatch filter
//!
//! Each engine owns a subscriber: a set of topics it is interested in, kept in
//! lockstep with the relay's subscription state. Inbound requests are offered
//! to every engine, but an engine only consumes those whose topic is in its
//! set. Two engines share one relay without cross-talk this way.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::relay::{Relay, RelayError};
use crate::topic::Topic;

/// One engine's slice of the relay's subscriptions
pub struct Subscriber {
    relay: Arc<Relay>,
    topics: Mutex<HashSet<Topic>>,
}

impl Subscriber {
    /// Create an empty subscriber over a relay
    pub fn new(relay: Arc<Relay>) -> Self {
        Subscriber {
            relay,
            topics: Mutex::new(HashSet::new()),
        }
    }

    /// Add a topic and subscribe the relay to it
    ///
    /// The topic enters the set before the relay call so a delivery racing the
    /// ack still passes the filter; it is rolled back if the call fails.
    pub async fn set_subscription(&self, topic: Topic) -> Result<(), RelayError> {
        self.topics.lock().unwrap().insert(topic.clone());
        if let Err(e) = self.relay.subscribe(&topic).await {
            self.topics.lock().unwrap().remove(&topic);
            return Err(e);
        }
        Ok(())
    }

    /// Remove a topic and unsubscribe the relay from it
    pub async fn remove_subscription(&self, topic: &Topic) -> Result<(), RelayError> {
        self.topics.lock().unwrap().remove(topic);
        self.relay.unsubscribe(topic).await
    }

    /// Whether this engine consumes messages on the topic
    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.topics.lock().unwrap().contains(topic)
    }

    /// Snapshot of the subscribed topics
    pub fn topics(&self) -> Vec<Topic> {
        self.topics.lock().unwrap().iter().cloned().collect()
    }
}
