//! The durable counter store seam
//!
//! The ledger persists through this trait and nothing else; a production
//! backend (typically a cloud document store) lives outside this crate.
//! Delivery is assumed at-least-once: increments may
//! rarely be replayed, which the ledger tolerates by deduplicating
//! accepted shares on their submission id.

use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Named documents plus atomic increment-by-delta on numeric fields.
///
/// `field` may be a dot-separated path into nested objects, e.g.
/// `stats.shares_accepted`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Fetch a document, `None` when absent
    async fn get_doc(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Create or replace a document
    async fn set_doc(&self, key: &str, doc: Value) -> Result<(), StoreError>;

    /// Atomically add `delta` to a numeric field, creating the document
    /// and field as needed. Concurrent increments must never lose updates.
    async fn increment(&self, key: &str, field: &str, delta: f64) -> Result<(), StoreError>;
}

/// In-process store for local operation and tests
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get_doc(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.docs.read().get(key).cloned())
    }

    async fn set_doc(&self, key: &str, doc: Value) -> Result<(), StoreError> {
        self.docs.write().insert(key.to_string(), doc);
        Ok(())
    }

    async fn increment(&self, key: &str, field: &str, delta: f64) -> Result<(), StoreError> {
        let mut docs = self.docs.write();
        let doc = docs.entry(key.to_string()).or_insert_with(|| json!({}));
        let path: Vec<&str> = field.split('.').collect();
        bump(doc, &path, delta)
            .ok_or_else(|| StoreError::Unavailable(format!("{}.{} is not numeric", key, field)))
    }
}

/// Descend the dot path, creating objects along the way, and add the delta
/// to the leaf.
fn bump(node: &mut Value, path: &[&str], delta: f64) -> Option<()> {
    match path {
        [] => None,
        [leaf] => {
            let obj = node.as_object_mut()?;
            let entry = obj.entry(leaf.to_string()).or_insert_with(|| json!(0.0));
            let current = entry.as_f64().unwrap_or(0.0);
            *entry = json!(current + delta);
            Some(())
        }
        [head, rest @ ..] => {
            let obj = node.as_object_mut()?;
            let child = obj.entry(head.to_string()).or_insert_with(|| json!({}));
            bump(child, rest, delta)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get_doc("users/u1").await.unwrap().is_none());

        store
            .set_doc("users/u1", json!({"total_shares_found": 3}))
            .await
            .unwrap();
        let doc = store.get_doc("users/u1").await.unwrap().unwrap();
        assert_eq!(doc["total_shares_found"], 3);
    }

    #[tokio::test]
    async fn test_increment_creates_doc_and_field() {
        let store = MemoryStore::new();
        store.increment("users/u1", "count", 1.0).await.unwrap();
        store.increment("users/u1", "count", 2.0).await.unwrap();

        let doc = store.get_doc("users/u1").await.unwrap().unwrap();
        assert_eq!(doc["count"].as_f64().unwrap(), 3.0);
    }

    #[tokio::test]
    async fn test_increment_dot_path() {
        let store = MemoryStore::new();
        store
            .increment("sessions/s1", "stats.shares_accepted", 1.0)
            .await
            .unwrap();

        let doc = store.get_doc("sessions/s1").await.unwrap().unwrap();
        assert_eq!(doc["stats"]["shares_accepted"].as_f64().unwrap(), 1.0);
    }
}
