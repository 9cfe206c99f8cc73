use crate::{
    cli::globals::GlobalArgs,
    clock::{Clock, SystemClock},
    ratelimit::{ActionKind, QuotaStatus, RateLimiter},
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Check,
    Consume(u64),
    Reset,
}

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub kind: ActionKind,
    pub identity: String,
    pub mode: Mode,
}

#[derive(Debug, Serialize)]
struct QuotaReport {
    action: ActionKind,
    #[serde(flatten)]
    status: QuotaStatus,
    retry_after: Option<u64>,
}

/// Inspect, consume or reset one identity's quota against the configured store.
/// # Errors
/// Returns an error if the store cannot be reached.
pub async fn execute(args: Args) -> Result<()> {
    let store = args.globals.connect_store().await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let limiter = RateLimiter::new(store, clock, args.globals.rate_limits.clone());

    let report = apply(&limiter, args.kind, &args.identity, args.mode).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn apply(
    limiter: &RateLimiter,
    kind: ActionKind,
    identity: &str,
    mode: Mode,
) -> Result<QuotaReport> {
    let status = match mode {
        Mode::Check => limiter.check(kind, identity).await,
        Mode::Consume(amount) => limiter.consume(kind, identity, amount).await,
        Mode::Reset => {
            limiter
                .reset(kind, identity)
                .await
                .with_context(|| format!("Could not reset {kind} quota"))?;
            limiter.check(kind, identity).await
        }
    }
    .with_context(|| format!("Could not read {kind} quota"))?;

    let retry_after = (!status.usable).then(|| status.retry_after(limiter.now()));
    Ok(QuotaReport {
        action: kind,
        status,
        retry_after,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::RateLimits;
    use crate::store::{KvStore, MemoryStore};

    fn limiter() -> RateLimiter {
        let clock = Arc::new(ManualClock::new(5_000));
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new(clock.clone()));
        RateLimiter::new(store, clock, Arc::new(RateLimits::builtin()))
    }

    #[tokio::test]
    async fn consume_until_exhausted_then_reset() {
        let limiter = limiter();
        let kind = ActionKind::UserRegister;

        let first = apply(&limiter, kind, "10.0.0.9", Mode::Consume(2)).await.unwrap();
        assert_eq!(first.status.remaining, 0);
        assert!(first.status.usable);
        assert_eq!(first.retry_after, None);

        let checked = apply(&limiter, kind, "10.0.0.9", Mode::Check).await.unwrap();
        assert!(!checked.status.usable);
        assert_eq!(checked.retry_after, Some(30));

        let reset = apply(&limiter, kind, "10.0.0.9", Mode::Reset).await.unwrap();
        assert!(reset.status.usable);
        assert_eq!(reset.status.remaining, 2);
    }

    #[tokio::test]
    async fn report_serializes_flat() {
        let limiter = limiter();
        let report = apply(&limiter, ActionKind::GetUser, "10.0.0.9", Mode::Check)
            .await
            .unwrap();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["action"], "get_user");
        assert_eq!(value["limit"], 10);
        assert_eq!(value["remaining"], 10);
        assert!(value["retry_after"].is_null());
    }
}
