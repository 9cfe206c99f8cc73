use std::sync::Arc;
use tracing::{debug, warn};

use super::descriptor::{ActionKind, RateLimitDescriptor, RateLimits};
use super::ledger::{QuotaRecord, QuotaStatus, quota_key};
use crate::clock::Clock;
use crate::store::{KvStore, StoreError};

/// Fixed-window quota tracking over a shared [`KvStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    limits: Arc<RateLimits>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, limits: Arc<RateLimits>) -> Self {
        Self {
            store,
            clock,
            limits,
        }
    }

    #[must_use]
    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Current quota for `identity` without consuming any of it.
    ///
    /// Records whose window has elapsed are deleted and reported as fresh.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the store cannot be read; callers must fail closed.
    pub async fn check(&self, kind: ActionKind, identity: &str) -> Result<QuotaStatus, StoreError> {
        let descriptor = self.limits.get(kind);
        let key = quota_key(kind, identity);
        let (status, _) = self.load(&key, descriptor).await?;
        Ok(status)
    }

    /// Consume `amount` units of quota.
    ///
    /// When quota remains, the returned status is the post-consumption state and
    /// is always usable, even if this call used up the last unit. When no quota
    /// remains nothing is written and the exhausted status is returned.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the store cannot be read or written; callers must fail closed.
    pub async fn consume(
        &self,
        kind: ActionKind,
        identity: &str,
        amount: u64,
    ) -> Result<QuotaStatus, StoreError> {
        let descriptor = self.limits.get(kind);
        let key = quota_key(kind, identity);
        let (before, record) = self.load(&key, descriptor).await?;

        if amount == 0 {
            return Ok(before);
        }

        if before.remaining == 0 {
            warn!(action = %kind, key = %key, reset_at = before.reset_at, "Rate limit exceeded");
            return Ok(before);
        }

        let now = self.clock.now();
        let (updated, ttl) = match record {
            None => (
                QuotaRecord {
                    usage: amount.min(descriptor.limit),
                    window_start: now,
                },
                descriptor.window_seconds,
            ),
            Some(record) => {
                // Keep the window anchored: reuse whatever TTL the store still holds.
                let ttl = match self.store.ttl(&key).await? {
                    Some(ttl) => ttl,
                    None => record.window_end(descriptor).saturating_sub(now),
                };
                (
                    QuotaRecord {
                        usage: record.usage.saturating_add(amount).min(descriptor.limit),
                        window_start: record.window_start,
                    },
                    ttl.max(1),
                )
            }
        };

        self.write(&key, updated, ttl).await?;

        let (mut after, _) = self.load(&key, descriptor).await?;
        after.usable = true;
        debug!(
            action = %kind,
            usage = after.usage,
            remaining = after.remaining,
            "Consumed rate limit quota"
        );
        Ok(after)
    }

    /// Drop any quota held for `identity`.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the store cannot be written.
    pub async fn reset(&self, kind: ActionKind, identity: &str) -> Result<(), StoreError> {
        self.store.del(&quota_key(kind, identity)).await
    }

    async fn load(
        &self,
        key: &str,
        descriptor: RateLimitDescriptor,
    ) -> Result<(QuotaStatus, Option<QuotaRecord>), StoreError> {
        let now = self.clock.now();
        let Some(raw) = self.store.get(key).await? else {
            return Ok((QuotaStatus::fresh(descriptor, now), None));
        };

        let record = match serde_json::from_str::<QuotaRecord>(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(key = %key, "Discarding unreadable quota record: {err}");
                self.store.del(key).await?;
                return Ok((QuotaStatus::fresh(descriptor, now), None));
            }
        };

        if record.is_expired(descriptor, now) {
            self.store.del(key).await?;
            return Ok((QuotaStatus::fresh(descriptor, now), None));
        }

        Ok((QuotaStatus::from_record(descriptor, record), Some(record)))
    }

    async fn write(&self, key: &str, record: QuotaRecord, ttl: u64) -> Result<(), StoreError> {
        let value = serde_json::to_string(&record).map_err(|err| StoreError::Corrupt {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        self.store.set_ex(key, &value, ttl).await
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    const START: u64 = 1_700_000_000;

    fn limiter() -> (Arc<ManualClock>, Arc<MemoryStore>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let limits = RateLimits::with_overrides("user_login=3/30").unwrap();
        let limiter = RateLimiter::new(store.clone(), clock.clone(), Arc::new(limits));
        (clock, store, limiter)
    }

    #[tokio::test]
    async fn login_scenario() {
        let (clock, _store, limiter) = limiter();

        for expected in [2, 1, 0] {
            let status = limiter
                .consume(ActionKind::UserLogin, "ip-A", 1)
                .await
                .unwrap();
            assert!(status.usable);
            assert_eq!(status.remaining, expected);
            assert_eq!(status.reset_at, START + 30);
        }

        clock.advance(10);
        let rejected = limiter
            .consume(ActionKind::UserLogin, "ip-A", 1)
            .await
            .unwrap();
        assert!(!rejected.usable);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.usage, 3);

        clock.advance(21);
        let fresh = limiter
            .consume(ActionKind::UserLogin, "ip-A", 1)
            .await
            .unwrap();
        assert!(fresh.usable);
        assert_eq!(fresh.remaining, 2);
        assert_eq!(fresh.window_start, START + 31);
    }

    #[tokio::test]
    async fn exhausted_consume_does_not_write() {
        let (_clock, _store, limiter) = limiter();
        for _ in 0..3 {
            limiter.consume(ActionKind::UserLogin, "ip-B", 1).await.unwrap();
        }
        for _ in 0..5 {
            let status = limiter.consume(ActionKind::UserLogin, "ip-B", 1).await.unwrap();
            assert!(!status.usable);
            assert_eq!(status.usage, 3);
        }
        let status = limiter.check(ActionKind::UserLogin, "ip-B").await.unwrap();
        assert_eq!(status.usage, 3);
        assert!(!status.usable);
    }

    #[tokio::test]
    async fn window_is_not_extended_by_writes() {
        let (clock, store, limiter) = limiter();
        limiter.consume(ActionKind::UserLogin, "ip-C", 1).await.unwrap();
        clock.advance(20);
        limiter.consume(ActionKind::UserLogin, "ip-C", 1).await.unwrap();

        let key = quota_key(ActionKind::UserLogin, "ip-C");
        assert_eq!(store.ttl(&key).await.unwrap(), Some(10));

        clock.advance(10);
        let status = limiter.check(ActionKind::UserLogin, "ip-C").await.unwrap();
        assert_eq!(status.usage, 0);
        assert!(status.usable);
    }

    #[tokio::test]
    async fn stale_records_are_deleted_on_check() {
        let (clock, store, limiter) = limiter();
        let key = quota_key(ActionKind::UserLogin, "ip-D");
        // A record that outlived its window because the store kept it longer.
        let record = QuotaRecord {
            usage: 3,
            window_start: START,
        };
        store
            .set_ex(&key, &serde_json::to_string(&record).unwrap(), 3600)
            .await
            .unwrap();
        assert!(!limiter.check(ActionKind::UserLogin, "ip-D").await.unwrap().usable);

        clock.advance(30);
        let status = limiter.check(ActionKind::UserLogin, "ip-D").await.unwrap();
        assert_eq!(status.usage, 0);
        assert!(status.usable);
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn identities_and_actions_are_isolated() {
        let (_clock, _store, limiter) = limiter();
        for _ in 0..3 {
            limiter.consume(ActionKind::UserLogin, "ip-E", 1).await.unwrap();
        }
        assert!(limiter.check(ActionKind::UserLogin, "ip-F").await.unwrap().usable);
        assert!(limiter.check(ActionKind::UserLoginMfa, "ip-E").await.unwrap().usable);
    }

    #[tokio::test]
    async fn usage_is_capped_at_the_limit() {
        let (_clock, _store, limiter) = limiter();
        let status = limiter.consume(ActionKind::UserLogin, "ip-G", 10).await.unwrap();
        assert!(status.usable);
        assert_eq!(status.usage, 3);
        assert_eq!(status.remaining, 0);
    }

    #[tokio::test]
    async fn corrupt_records_self_heal() {
        let (_clock, store, limiter) = limiter();
        let key = quota_key(ActionKind::UserLogin, "ip-H");
        store.set_ex(&key, "not json", 30).await.unwrap();
        let status = limiter.consume(ActionKind::UserLogin, "ip-H", 1).await.unwrap();
        assert_eq!(status.usage, 1);
    }

    #[tokio::test]
    async fn reset_clears_quota() {
        let (_clock, _store, limiter) = limiter();
        for _ in 0..3 {
            limiter.consume(ActionKind::UserLogin, "ip-I", 1).await.unwrap();
        }
        limiter.reset(ActionKind::UserLogin, "ip-I").await.unwrap();
        assert_eq!(limiter.check(ActionKind::UserLogin, "ip-I").await.unwrap().remaining, 3);
    }

    struct DownStore;

    #[async_trait]
    impl KvStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn set_ex(&self, _key: &str, _value: &str, _seconds: u64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn del(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn ttl(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let limiter = RateLimiter::new(
            Arc::new(DownStore),
            Arc::new(ManualClock::new(START)),
            Arc::new(RateLimits::builtin()),
        );
        assert!(limiter.check(ActionKind::GetUser, "ip").await.is_err());
        assert!(limiter.consume(ActionKind::GetUser, "ip", 1).await.is_err());
    }
}
