//! Multi-factor authentication: TOTP, backup codes, replay suppression and the
//! login handoff, tied together by [`MfaController`].
//!
//! Flow Overview:
//! 1) `enable` creates a secret and a backup code set; the account is pending.
//! 2) The first accepted TOTP code marks the account verified (active).
//! 3) Later TOTP codes must also pass the replay guard, which then remembers them.
//! 4) Backup codes are single use; resetting the set discards every earlier code.
//! 5) Logins on active accounts go through a one-time, IP-bound handoff token.

pub mod backup;
pub mod code;
pub mod controller;
pub mod handoff;
pub mod replay;
pub mod totp;

use anyhow::{Result, bail};
use serde::Serialize;
use utoipa::ToSchema;

pub use self::backup::BackupCodeVault;
pub use self::code::ParsedCode;
pub use self::controller::{
    DisableOutcome, EnableOutcome, Enrollment, LoginStep, MfaController,
};
pub use self::handoff::LoginHandoff;
pub use self::replay::ReplayGuard;
pub use self::totp::TotpEngine;

pub const DEFAULT_ISSUER: &str = "Camp Fyre";
pub const DEFAULT_STEP_SECONDS: u64 = 30;
pub const DEFAULT_WINDOW: u8 = 2;
pub const DEFAULT_SECRET_LENGTH: usize = 20;
pub const MIN_SECRET_LENGTH: usize = 16;
pub const DEFAULT_BACKUP_CODE_COUNT: usize = 5;
pub const DEFAULT_LOGIN_TOKEN_TTL_SECONDS: u64 = 60;

/// Account-level MFA lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MfaState {
    Disabled,
    PendingVerification,
    Active,
}

impl MfaState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::PendingVerification => "pending_verification",
            Self::Active => "active",
        }
    }
}

#[derive(Clone, Debug)]
pub struct MfaConfig {
    issuer: String,
    step_seconds: u64,
    window: u8,
    secret_length: usize,
    backup_code_count: usize,
    login_token_ttl_seconds: u64,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MfaConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            step_seconds: DEFAULT_STEP_SECONDS,
            window: DEFAULT_WINDOW,
            secret_length: DEFAULT_SECRET_LENGTH,
            backup_code_count: DEFAULT_BACKUP_CODE_COUNT,
            login_token_ttl_seconds: DEFAULT_LOGIN_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_step_seconds(mut self, step_seconds: u64) -> Self {
        self.step_seconds = step_seconds;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: u8) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_secret_length(mut self, secret_length: usize) -> Self {
        self.secret_length = secret_length;
        self
    }

    #[must_use]
    pub fn with_backup_code_count(mut self, backup_code_count: usize) -> Self {
        self.backup_code_count = backup_code_count;
        self
    }

    #[must_use]
    pub fn with_login_token_ttl_seconds(mut self, ttl: u64) -> Self {
        self.login_token_ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn step_seconds(&self) -> u64 {
        self.step_seconds
    }

    #[must_use]
    pub fn window(&self) -> u8 {
        self.window
    }

    #[must_use]
    pub fn secret_length(&self) -> usize {
        self.secret_length
    }

    #[must_use]
    pub fn backup_code_count(&self) -> usize {
        self.backup_code_count
    }

    #[must_use]
    pub fn login_token_ttl_seconds(&self) -> u64 {
        self.login_token_ttl_seconds
    }

    /// # Errors
    /// Returns an error for an empty issuer, zero step/count/TTL, or a secret
    /// shorter than 128 bits.
    pub fn validate(&self) -> Result<()> {
        if self.issuer.trim().is_empty() {
            bail!("MFA issuer must not be empty");
        }
        if self.step_seconds == 0 {
            bail!("MFA step must be greater than zero");
        }
        if self.secret_length < MIN_SECRET_LENGTH {
            bail!(
                "MFA secret length must be at least {MIN_SECRET_LENGTH} bytes, got {}",
                self.secret_length
            );
        }
        if self.backup_code_count == 0 {
            bail!("Backup code count must be greater than zero");
        }
        if self.login_token_ttl_seconds == 0 {
            bail!("Login token TTL must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MfaConfig::new();
        assert_eq!(config.issuer(), "Camp Fyre");
        assert_eq!(config.step_seconds(), 30);
        assert_eq!(config.window(), 2);
        assert_eq!(config.backup_code_count(), 5);
        assert_eq!(config.login_token_ttl_seconds(), 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn short_secrets_are_rejected() {
        let config = MfaConfig::new().with_secret_length(10);
        assert!(config.validate().is_err());
        assert!(MfaConfig::new().with_secret_length(16).validate().is_ok());
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(MfaConfig::new().with_step_seconds(0).validate().is_err());
        assert!(MfaConfig::new().with_backup_code_count(0).validate().is_err());
        assert!(MfaConfig::new().with_login_token_ttl_seconds(0).validate().is_err());
        assert!(MfaConfig::new().with_issuer(" ").validate().is_err());
    }

    #[test]
    fn state_names() {
        assert_eq!(MfaState::PendingVerification.as_str(), "pending_verification");
        assert_eq!(
            serde_json::to_string(&MfaState::Active).unwrap(),
            "\"active\""
        );
    }
}
