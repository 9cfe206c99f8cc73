use crate::{
    api::{self, Services, handlers::TrustedProxies},
    cli::globals::GlobalArgs,
    clock::{Clock, SystemClock},
    mfa::{MfaConfig, MfaController},
    ratelimit::RateLimiter,
    users::{PgUserStore, UserStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub proxies: TrustedProxies,
    pub globals: GlobalArgs,
    pub mfa: MfaConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if Postgres or Redis cannot be reached, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(args.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let store = args.globals.connect_store().await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool));

    let limiter = Arc::new(RateLimiter::new(
        store.clone(),
        clock.clone(),
        args.globals.rate_limits.clone(),
    ));
    let mfa = Arc::new(MfaController::new(&args.mfa, users, store.clone(), clock));

    let router = api::router(Services {
        store,
        limiter,
        mfa,
        proxies: args.proxies,
    });

    api::serve(args.port, router).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_url(args.dsn.expose_secret())),
        ("trusted_proxies", args.proxies.hops().to_string()),
        ("redis", redact_url(args.globals.redis_url.expose_secret())),
        (
            "store_timeout",
            format!("{}ms", args.globals.store_timeout.as_millis()),
        ),
        ("mfa_issuer", args.mfa.issuer().to_string()),
        (
            "mfa_step",
            format!("{}s x{}", args.mfa.step_seconds(), args.mfa.window()),
        ),
        (
            "backup_codes",
            args.mfa.backup_code_count().to_string(),
        ),
        (
            "login_token_ttl",
            format!("{}s", args.mfa.login_token_ttl_seconds()),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-url".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
