//! Quota records and the store keys they live under.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::descriptor::{ActionKind, RateLimitDescriptor};

const KEY_PREFIX: &str = "ratelimit";

/// Usage counter for one `(action kind, identity)` pair, as persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub usage: u64,
    pub window_start: u64,
}

impl QuotaRecord {
    /// Epoch second at which the window closes.
    #[must_use]
    pub fn window_end(&self, descriptor: RateLimitDescriptor) -> u64 {
        self.window_start.saturating_add(descriptor.window_seconds)
    }

    #[must_use]
    pub fn is_expired(&self, descriptor: RateLimitDescriptor, now: u64) -> bool {
        now >= self.window_end(descriptor)
    }
}

/// Quota as seen by a caller at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuotaStatus {
    pub limit: u64,
    pub remaining: u64,
    pub usage: u64,
    pub window_start: u64,
    /// Epoch seconds of the window end.
    pub reset_at: u64,
    pub usable: bool,
}

impl QuotaStatus {
    /// Full quota for a window opening at `now`.
    #[must_use]
    pub fn fresh(descriptor: RateLimitDescriptor, now: u64) -> Self {
        Self {
            limit: descriptor.limit,
            remaining: descriptor.limit,
            usage: 0,
            window_start: now,
            reset_at: now.saturating_add(descriptor.window_seconds),
            usable: true,
        }
    }

    #[must_use]
    pub fn from_record(descriptor: RateLimitDescriptor, record: QuotaRecord) -> Self {
        Self {
            limit: descriptor.limit,
            remaining: descriptor.limit.saturating_sub(record.usage),
            usage: record.usage,
            window_start: record.window_start,
            reset_at: record.window_end(descriptor),
            usable: record.usage < descriptor.limit,
        }
    }

    /// Seconds until the window closes, at least one.
    #[must_use]
    pub fn retry_after(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now).max(1)
    }
}

/// Hash a client identifier so raw addresses never reach the store.
#[must_use]
pub fn hash_identity(identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Store key for a quota record.
#[must_use]
pub fn quota_key(kind: ActionKind, identity: &str) -> String {
    format!("{KEY_PREFIX}:{}:{}", kind.as_str(), hash_identity(identity))
}
