//! # Camp Fyre Guard (Request Admission & Identity Assurance)
//!
//! `campfyre-guard` is the admission control plane of the Camp Fyre platform. It
//! decides whether a request may run at all (rate limiting) and whether an
//! account holder has proven possession of their second factor (MFA).
//!
//! ## Rate Limiting
//!
//! Every rate-limited operation has an action kind with a fixed
//! `(limit, window)` descriptor. Usage is tracked per `(action kind, hashed
//! identity)` in a shared key-value store, so every worker sees the same
//! counters.
//!
//! - **Fixed Windows:** A window opens on the first consumption and closes
//!   `window` seconds later. Writes keep the remaining TTL, they never extend it.
//! - **Soft Limit:** Consumption is get-then-set. Concurrent workers may
//!   overshoot the limit by a small amount under contention.
//! - **Fail Closed:** If the store cannot be reached the request is rejected.
//!
//! ## Multi-Factor Authentication
//!
//! Accounts move through `disabled → pending verification → active`. Codes are
//! either time-based one-time passwords or single-use backup codes
//! (`xxxxxx-xxxxxx-xxxxxx`). Once an account is active, an accepted TOTP code
//! is remembered for the length of the drift window so it cannot be replayed.
//!
//! Logins for active accounts are split in two: a password check issues an
//! IP-bound handoff token, and the second request redeems it together with a
//! code. Every rejection collapses into a single outcome so callers cannot
//! tell a wrong code from a replayed one, or an expired token from a stolen one.

pub mod api;
pub mod cli;
pub mod clock;
pub mod mfa;
pub mod ratelimit;
pub mod store;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
