//! Per-identity, per-action rate limiting.
//!
//! Flow Overview:
//! 1) Look up the `(limit, window)` descriptor for the action kind.
//! 2) Read the quota record for `(action kind, sha256(identity))`.
//! 3) Expired records are deleted and treated as absent.
//! 4) If quota remains, bump usage and write it back with the TTL the store still holds.
//!
//! Consumption is get-then-set, so two workers racing on the same identity can
//! both pass the last unit. That overshoot is tolerated.

pub mod descriptor;
pub mod headers;
pub mod ledger;
mod limiter;

pub use descriptor::{ActionKind, RateLimitDescriptor, RateLimits};
pub use headers::RateLimitHeaders;
pub use ledger::{QuotaRecord, QuotaStatus};
pub use limiter::RateLimiter;
