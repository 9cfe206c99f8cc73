//! Quota disclosure headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header::RETRY_AFTER};

use super::ledger::QuotaStatus;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds of the window end.
    pub reset: u64,
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    /// `Retry-After` is only set when the status is not usable.
    #[must_use]
    pub fn from_status(status: &QuotaStatus, now: u64) -> Self {
        Self {
            limit: status.limit,
            remaining: status.remaining,
            reset: status.reset_at,
            retry_after: (!status.usable).then(|| status.retry_after(now)),
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        for (legacy, standard, value) in [
            (X_RATELIMIT_LIMIT, RATELIMIT_LIMIT, self.limit),
            (X_RATELIMIT_REMAINING, RATELIMIT_REMAINING, self.remaining),
            (X_RATELIMIT_RESET, RATELIMIT_RESET, self.reset),
        ] {
            headers.insert(legacy, HeaderValue::from(value));
            headers.insert(standard, HeaderValue::from(value));
        }
        if let Some(seconds) = self.retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
    }

    #[must_use]
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        self.apply(&mut headers);
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(usable: bool) -> QuotaStatus {
        QuotaStatus {
            limit: 3,
            remaining: u64::from(usable),
            usage: if usable { 2 } else { 3 },
            window_start: 1_000,
            reset_at: 1_030,
            usable,
        }
    }

    #[test]
    fn usable_status_has_no_retry_after() {
        let headers = RateLimitHeaders::from_status(&status(true), 1_010).to_header_map();
        assert_eq!(headers["x-ratelimit-limit"], "3");
        assert_eq!(headers["ratelimit-remaining"], "1");
        assert_eq!(headers["x-ratelimit-reset"], "1030");
        assert!(headers.get(RETRY_AFTER).is_none());
    }

    #[test]
    fn exhausted_status_sets_retry_after() {
        let headers = RateLimitHeaders::from_status(&status(false), 1_010).to_header_map();
        assert_eq!(headers["ratelimit-remaining"], "0");
        assert_eq!(headers[RETRY_AFTER], "20");
    }
}
