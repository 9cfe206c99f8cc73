//! Suppresses reuse of an accepted TOTP code while it can still be accepted.
//!
//! One marker per `(user, code)` pair, so accepting a newer code never
//! re-opens an older one that is still inside the window.

use std::sync::Arc;
use uuid::Uuid;

use crate::store::{KvStore, StoreError};

const KEY_PREFIX: &str = "mfa:replay";

#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn KvStore>,
    ttl_seconds: u64,
}

impl ReplayGuard {
    /// `ttl_seconds` must cover the whole span a code is accepted for,
    /// `(2 × window + 1) × step`.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, ttl_seconds: u64) -> Self {
        Self { store, ttl_seconds }
    }

    fn key(user_id: Uuid, code: &str) -> String {
        format!("{KEY_PREFIX}:{user_id}:{code}")
    }

    /// # Errors
    /// Returns [`StoreError`] if the store cannot be read.
    pub async fn was_used_recently(&self, user_id: Uuid, code: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&Self::key(user_id, code)).await?.is_some())
    }

    /// # Errors
    /// Returns [`StoreError`] if the store cannot be written.
    pub async fn mark_used(&self, user_id: Uuid, code: &str) -> Result<(), StoreError> {
        self.store
            .set_ex(&Self::key(user_id, code), "1", self.ttl_seconds)
            .await
    }
}
