use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

use crate::mfa::{DEFAULT_ISSUER, MfaConfig};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("mfa-issuer")
                .long("mfa-issuer")
                .help("Issuer shown in authenticator apps")
                .env("CAMPFYRE_MFA_ISSUER")
                .default_value(DEFAULT_ISSUER)
                .global(true),
        )
        .arg(
            Arg::new("mfa-step")
                .long("mfa-step")
                .help("TOTP time step in seconds")
                .env("CAMPFYRE_MFA_STEP")
                .default_value("30")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("mfa-window")
                .long("mfa-window")
                .help("Adjacent TOTP steps accepted on either side of the current one")
                .env("CAMPFYRE_MFA_WINDOW")
                .default_value("2")
                .global(true)
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new("mfa-secret-length")
                .long("mfa-secret-length")
                .help("TOTP secret length in bytes (minimum 16)")
                .env("CAMPFYRE_MFA_SECRET_LENGTH")
                .default_value("20")
                .global(true)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("backup-code-count")
                .long("backup-code-count")
                .help("Backup codes issued per enrollment or reset")
                .env("CAMPFYRE_BACKUP_CODE_COUNT")
                .default_value("5")
                .global(true)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("login-token-ttl")
                .long("login-token-ttl")
                .help("Lifetime of an MFA login token in seconds")
                .env("CAMPFYRE_LOGIN_TOKEN_TTL")
                .default_value("60")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Build and validate the MFA configuration.
///
/// # Errors
/// Returns an error if the resulting configuration is invalid.
pub fn parse(matches: &ArgMatches) -> Result<MfaConfig> {
    let mut config = MfaConfig::new();
    if let Some(issuer) = matches.get_one::<String>("mfa-issuer") {
        config = config.with_issuer(issuer.clone());
    }
    if let Some(step) = matches.get_one::<u64>("mfa-step") {
        config = config.with_step_seconds(*step);
    }
    if let Some(window) = matches.get_one::<u8>("mfa-window") {
        config = config.with_window(*window);
    }
    if let Some(length) = matches.get_one::<usize>("mfa-secret-length") {
        config = config.with_secret_length(*length);
    }
    if let Some(count) = matches.get_one::<usize>("backup-code-count") {
        config = config.with_backup_code_count(*count);
    }
    if let Some(ttl) = matches.get_one::<u64>("login-token-ttl") {
        config = config.with_login_token_ttl_seconds(*ttl);
    }
    config.validate()?;
    Ok(config)
}
