//! In-process [`KvStore`] with clock-driven expiry.
//!
//! Only meaningful for a single worker (tests, local tooling). Expired entries
//! are dropped lazily on access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{KvStore, StoreError};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: u64,
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries.values().filter(|entry| entry.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Keys currently held, including ones that expired but were not touched yet.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> Result<(), StoreError> {
        let expires_at = self.clock.now().saturating_add(seconds);
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at - now))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        Ok(entries
            .remove(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = MemoryStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn values_expire_with_the_clock() {
        let (clock, store) = store();
        store.set_ex("k", "v", 30).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.ttl("k").await.unwrap(), Some(30));

        clock.advance(29);
        assert_eq!(store.ttl("k").await.unwrap(), Some(1));

        clock.advance(1);
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn take_removes_the_key() {
        let (_clock, store) = store();
        store.set_ex("token", "payload", 60).await.unwrap();
        assert_eq!(store.take("token").await.unwrap().as_deref(), Some("payload"));
        assert_eq!(store.take("token").await.unwrap(), None);
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn del_is_idempotent() {
        let (_clock, store) = store();
        store.del("missing").await.unwrap();
        store.set_ex("k", "v", 5).await.unwrap();
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
