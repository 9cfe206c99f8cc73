//! Shared key-value store used for quota records, replay markers and login
//! handoff tokens.
//!
//! Flow Overview:
//! 1) Every mechanism namespaces its keys (`ratelimit:`, `mfa:replay:`, `mfa:login:`).
//! 2) Values are written with an expiry; the store enforces it.
//! 3) Callers treat any [`StoreError`] as "state unknown" and fail closed.
//!
//! Individual commands are atomic; check-then-act sequences across commands are not.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),
    #[error("Key-value store timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Corrupt value stored at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// `GET key`
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// `SET key value EX seconds`
    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> Result<(), StoreError>;

    /// `DEL key`
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Remaining time to live in seconds, `None` if the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Read and delete a key. Backends that can do this in one command override it.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.del(key).await?;
        }
        Ok(value)
    }
}
