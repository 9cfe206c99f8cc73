//! Key-value store and rate limit table arguments.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

use crate::ratelimit::RateLimits;

pub const ARG_REDIS_URL: &str = "redis-url";
pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";
pub const ARG_RATE_LIMITS: &str = "rate-limits";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Redis URL for quota records, replay markers and login tokens")
                .env("CAMPFYRE_REDIS_URL")
                .default_value("redis://127.0.0.1:6379/0")
                .global(true),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long(ARG_STORE_TIMEOUT_MS)
                .help("Timeout for every key-value store command, in milliseconds")
                .env("CAMPFYRE_STORE_TIMEOUT_MS")
                .default_value("500")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMITS)
                .long(ARG_RATE_LIMITS)
                .help("Rate limit overrides, example: user_login=5/60,get_user=20/20")
                .env("CAMPFYRE_RATE_LIMITS")
                .global(true),
        )
}

pub struct Options {
    pub redis_url: SecretString,
    pub timeout: Duration,
    pub rate_limits: RateLimits,
}

impl Options {
    /// # Errors
    /// Returns an error if the rate limit overrides are malformed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let redis_url = matches
            .get_one::<String>(ARG_REDIS_URL)
            .cloned()
            .context("missing required argument: --redis-url")?;
        let timeout_ms = matches
            .get_one::<u64>(ARG_STORE_TIMEOUT_MS)
            .copied()
            .unwrap_or(500);
        let rate_limits = match matches.get_one::<String>(ARG_RATE_LIMITS) {
            Some(overrides) => RateLimits::with_overrides(overrides)
                .context("invalid --rate-limits")?,
            None => RateLimits::builtin(),
        };

        Ok(Self {
            redis_url: SecretString::from(redis_url),
            timeout: Duration::from_millis(timeout_ms),
            rate_limits,
        })
    }
}
