use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};

use crate::cli::commands::store;
use crate::ratelimit::RateLimits;
use crate::store::{KvStore, RedisStore};

/// Settings shared by every action that talks to the key-value store.
#[derive(Clone)]
pub struct GlobalArgs {
    pub redis_url: SecretString,
    pub store_timeout: Duration,
    pub rate_limits: Arc<RateLimits>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(options: store::Options) -> Self {
        Self {
            redis_url: options.redis_url,
            store_timeout: options.timeout,
            rate_limits: Arc::new(options.rate_limits),
        }
    }

    /// Connect to the configured Redis.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or Redis does not answer in time.
    pub async fn connect_store(&self) -> Result<Arc<dyn KvStore>> {
        let store = RedisStore::connect(self.redis_url.expose_secret(), self.store_timeout)
            .await
            .context("Could not connect to the key-value store")?;
        Ok(Arc::new(store))
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("redis_url", &"***")
            .field("store_timeout", &self.store_timeout)
            .field("rate_limits", &self.rate_limits.iter().count())
            .finish()
    }
}
