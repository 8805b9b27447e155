//! Sequence store
//!
//! Persistent map of topic to pending/settled sequence. The store is the
//! exclusive owner of sequence records; engines always re-read through it.
//! Backends must make `migrate` atomic per entry: a restart may never observe
//! the old topic removed without the new one inserted.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::topic::Topic;

/// Errors from sequence storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The target topic is already taken by another sequence
    #[error("a sequence already exists for topic {0}")]
    TopicOccupied(Topic),

    /// No sequence under the given topic
    #[error("no sequence for topic {0}")]
    NotFound(Topic),
}

/// Storage backend for one kind of sequence
///
/// Implementations guard every operation with their own synchronization;
/// engines call into the store between suspension points only.
pub trait SequenceStorage<T>: Send + Sync {
    /// Read the sequence at a topic
    fn get(&self, topic: &Topic) -> Option<T>;

    /// Insert a new sequence; refuses to shadow a live topic
    fn insert(&self, topic: Topic, entry: T) -> Result<(), StoreError>;

    /// Replace the sequence at a topic in place
    fn update(&self, topic: &Topic, entry: T) -> Result<(), StoreError>;

    /// Remove and return the sequence at a topic
    fn remove(&self, topic: &Topic) -> Option<T>;

    /// Move a sequence from one topic to another in a single atomic step
    fn migrate(&self, from: &Topic, to: Topic, entry: T) -> Result<(), StoreError>;

    /// Every topic currently holding a sequence
    fn topics(&self) -> Vec<Topic>;

    /// Every stored sequence
    fn entries(&self) -> Vec<T>;
}

/// In-memory storage backend
#[derive(Default)]
pub struct MemorySequenceStore<T> {
    entries: Mutex<HashMap<Topic, T>>,
}

impl<T> MemorySequenceStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        MemorySequenceStore {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync> SequenceStorage<T> for MemorySequenceStore<T> {
    fn get(&self, topic: &Topic) -> Option<T> {
        self.entries.lock().unwrap().get(topic).cloned()
    }

    fn insert(&self, topic: Topic, entry: T) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&topic) {
            return Err(StoreError::TopicOccupied(topic));
        }
        entries.insert(topic, entry);
        Ok(())
    }

    fn update(&self, topic: &Topic, entry: T) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(topic) {
            Some(slot) => {
                *slot = entry;
                Ok(())
            }
            None => Err(StoreError::NotFound(topic.clone())),
        }
    }

    fn remove(&self, topic: &Topic) -> Option<T> {
        self.entries.lock().unwrap().remove(topic)
    }

    fn migrate(&self, from: &Topic, to: Topic, entry: T) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        if from != &to && entries.contains_key(&to) {
            return Err(StoreError::TopicOccupied(to));
        }
        if entries.remove(from).is_none() {
            return Err(StoreError::NotFound(from.clone()));
        }
        entries.insert(to, entry);
        Ok(())
    }

    fn topics(&self) -> Vec<Topic> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    fn entries(&self) -> Vec<T> {
        self.entries.lock().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let store = MemorySequenceStore::new();
        let topic = Topic::generate();

        store.insert(topic.clone(), "entry").unwrap();
        assert_eq!(store.get(&topic), Some("entry"));
        assert_eq!(store.topics(), vec![topic]);
    }

    #[test]
    fn test_insert_refuses_duplicate_topic() {
        let store = MemorySequenceStore::new();
        let topic = Topic::generate();

        store.insert(topic.clone(), "a").unwrap();
        assert_eq!(
            store.insert(topic.clone(), "b"),
            Err(StoreError::TopicOccupied(topic.clone()))
        );
        assert_eq!(store.get(&topic), Some("a"));
    }

    #[test]
    fn test_update_requires_existing_entry() {
        let store = MemorySequenceStore::new();
        let topic = Topic::generate();

        assert!(store.update(&topic, "x").is_err());
        store.insert(topic.clone(), "a").unwrap();
        store.update(&topic, "b").unwrap();
        assert_eq!(store.get(&topic), Some("b"));
    }

    #[test]
    fn test_migrate_moves_atomically() {
        let store = MemorySequenceStore::new();
        let from = Topic::generate();
        let to = Topic::generate();

        store.insert(from.clone(), "pending").unwrap();
        store.migrate(&from, to.clone(), "settled").unwrap();

        assert_eq!(store.get(&from), None);
        assert_eq!(store.get(&to), Some("settled"));
        assert_eq!(store.topics(), vec![to]);
    }

    #[test]
    fn test_migrate_refuses_occupied_target() {
        let store = MemorySequenceStore::new();
        let from = Topic::generate();
        let to = Topic::generate();

        store.insert(from.clone(), "a").unwrap();
        store.insert(to.clone(), "b").unwrap();

        assert_eq!(
            store.migrate(&from, to.clone(), "c"),
            Err(StoreError::TopicOccupied(to.clone()))
        );
        // nothing moved
        assert_eq!(store.get(&from), Some("a"));
        assert_eq!(store.get(&to), Some("b"));
    }

    #[test]
    fn test_migrate_missing_source() {
        let store: MemorySequenceStore<&str> = MemorySequenceStore::new();
        let from = Topic::generate();
        let to = Topic::generate();

        assert_eq!(
            store.migrate(&from, to, "x"),
            Err(StoreError::NotFound(from))
        );
    }
}
