//! Account-level MFA lifecycle.
//!
//! Flow Overview:
//! 1) `enable` is only valid while disabled; a second call reports `AlreadyEnabled`.
//! 2) `verify_code` routes backup-shaped codes to the vault and the rest to TOTP.
//! 3) `disable` asks for proof of possession only once the account is verified.
//! 4) `begin_login` / `complete_login` wrap the handoff token around `verify_code`.
//!
//! Rejections (wrong code, replay, spent backup code) are a plain `false` and
//! never touch persisted state.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    BackupCodeVault, LoginHandoff, MfaConfig, MfaState, ParsedCode, ReplayGuard, TotpEngine,
};
use crate::clock::Clock;
use crate::store::KvStore;
use crate::users::{BackupCode, MfaRecord, UserStore};

/// Material shown to the user once, right after enabling MFA.
#[derive(Debug, Serialize, ToSchema)]
pub struct Enrollment {
    /// Base32 TOTP secret.
    pub secret: String,
    pub otpauth_url: String,
    pub qr_code_url: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug)]
pub enum EnableOutcome {
    AlreadyEnabled,
    Enabled(Enrollment),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisableOutcome {
    NotEnabled,
    CodeRequired,
    CodeRejected,
    Disabled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginStep {
    /// No second factor needed; the caller may establish a session.
    Complete,
    /// Submit `token` together with an MFA code to finish logging in.
    MfaRequired { token: String },
}

#[derive(Clone)]
pub struct MfaController {
    users: Arc<dyn UserStore>,
    totp: TotpEngine,
    vault: BackupCodeVault,
    replay: ReplayGuard,
    handoff: LoginHandoff,
    clock: Arc<dyn Clock>,
}

impl MfaController {
    #[must_use]
    pub fn new(
        config: &MfaConfig,
        users: Arc<dyn UserStore>,
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let totp = TotpEngine::new(config);
        let replay = ReplayGuard::new(kv.clone(), totp.acceptance_seconds());
        Self {
            vault: BackupCodeVault::new(users.clone(), config.backup_code_count()),
            handoff: LoginHandoff::new(kv, config.login_token_ttl_seconds()),
            users,
            totp,
            replay,
            clock,
        }
    }

    #[must_use]
    pub fn totp(&self) -> &TotpEngine {
        &self.totp
    }

    async fn load(&self, user_id: Uuid) -> Result<MfaRecord> {
        self.users
            .load_mfa(user_id)
            .await
            .context("failed to load MFA state")?
            .ok_or_else(|| anyhow!("user {user_id} not found"))
    }

    /// # Errors
    /// Returns an error if the user is unknown or the store fails.
    pub async fn state(&self, user_id: Uuid) -> Result<MfaState> {
        Ok(self.load(user_id).await?.state())
    }

    /// Generate a secret and backup codes and move the account to pending verification.
    ///
    /// # Errors
    /// Returns an error if the user is unknown, generation fails, or the store fails.
    pub async fn enable(&self, user_id: Uuid) -> Result<EnableOutcome> {
        let record = self.load(user_id).await?;
        if record.enabled {
            return Ok(EnableOutcome::AlreadyEnabled);
        }

        let secret = self.totp.generate_secret()?;
        let codes = self.vault.generate()?;
        let provisioning = self.totp.provisioning(&secret, &record.handle)?;

        // Conditional write; a concurrent enable may have won.
        if !self
            .users
            .enable_mfa(user_id, &secret, &codes)
            .await
            .context("failed to persist MFA enrollment")?
        {
            return Ok(EnableOutcome::AlreadyEnabled);
        }

        info!("MFA enabled for user {user_id}, pending verification");
        Ok(EnableOutcome::Enabled(Enrollment {
            secret: provisioning.secret,
            otpauth_url: provisioning.otpauth_url,
            qr_code_url: provisioning.qr_code_url,
            backup_codes: codes.into_iter().map(|code| code.code).collect(),
        }))
    }

    /// Check a TOTP or backup code for `user_id`.
    ///
    /// # Errors
    /// Returns an error if the user is unknown or a store fails.
    pub async fn verify_code(&self, user_id: Uuid, code: &str) -> Result<bool> {
        let record = self.load(user_id).await?;
        self.verify_record(user_id, &record, code).await
    }

    async fn verify_record(&self, user_id: Uuid, record: &MfaRecord, code: &str) -> Result<bool> {
        let Some(secret) = record.secret.as_ref().filter(|_| record.enabled) else {
            return Ok(false);
        };

        match ParsedCode::parse(code) {
            ParsedCode::Backup(code) => {
                let accepted = self.vault.consume(user_id, record, &code).await?;
                if accepted {
                    info!("Backup code used by user {user_id}");
                }
                Ok(accepted)
            }
            ParsedCode::Totp(code) => {
                if !self.totp.verify(secret, &code, self.clock.now())? {
                    return Ok(false);
                }

                if record.verified {
                    if self.replay.was_used_recently(user_id, &code).await? {
                        warn!("Replayed TOTP code rejected for user {user_id}");
                        return Ok(false);
                    }
                } else {
                    self.users
                        .mark_mfa_verified(user_id)
                        .await
                        .context("failed to mark MFA verified")?;
                    info!("MFA verified for user {user_id}");
                }

                // Recorded on the first acceptance too, so an immediate resubmission is a replay.
                self.replay.mark_used(user_id, &code).await?;
                Ok(true)
            }
        }
    }

    /// Turn MFA off. `code` is required once the account is verified.
    ///
    /// # Errors
    /// Returns an error if the user is unknown or a store fails.
    pub async fn disable(&self, user_id: Uuid, code: Option<&str>) -> Result<DisableOutcome> {
        let record = self.load(user_id).await?;
        if !record.enabled {
            return Ok(DisableOutcome::NotEnabled);
        }

        if record.verified {
            let Some(code) = code.map(str::trim).filter(|code| !code.is_empty()) else {
                return Ok(DisableOutcome::CodeRequired);
            };
            if !self.verify_record(user_id, &record, code).await? {
                return Ok(DisableOutcome::CodeRejected);
            }
        }

        self.users
            .clear_mfa(user_id)
            .await
            .context("failed to clear MFA state")?;

        info!("MFA disabled for user {user_id}");
        Ok(DisableOutcome::Disabled)
    }

    /// Fresh backup codes, `None` when MFA is disabled.
    ///
    /// # Errors
    /// Returns an error if the user is unknown or a store fails.
    pub async fn reset_backup_codes(&self, user_id: Uuid) -> Result<Option<Vec<String>>> {
        let record = self.load(user_id).await?;
        if !record.enabled {
            return Ok(None);
        }
        let codes = self.vault.reset(user_id).await?;
        info!("Backup codes reset for user {user_id}");
        Ok(Some(codes))
    }

    /// Stored backup codes with their used flags, `None` when MFA is disabled.
    ///
    /// # Errors
    /// Returns an error if the user is unknown or the store fails.
    pub async fn backup_codes(&self, user_id: Uuid) -> Result<Option<Vec<BackupCode>>> {
        let record = self.load(user_id).await?;
        Ok(record.enabled.then_some(record.backup_codes))
    }

    /// Called after a successful password check.
    ///
    /// # Errors
    /// Returns an error if the user is unknown or a store fails.
    pub async fn begin_login(&self, user_id: Uuid, source_ip: &str) -> Result<LoginStep> {
        let record = self.load(user_id).await?;
        if record.state() != MfaState::Active {
            return Ok(LoginStep::Complete);
        }
        let token = self.handoff.issue(source_ip, user_id).await?;
        Ok(LoginStep::MfaRequired { token })
    }

    /// Redeem a handoff token and check the code. Returns the user on success.
    ///
    /// # Errors
    /// Returns an error if a store fails.
    pub async fn complete_login(
        &self,
        source_ip: &str,
        token: &str,
        code: &str,
    ) -> Result<Option<Uuid>> {
        let Some(user_id) = self.handoff.redeem(source_ip, token).await? else {
            return Ok(None);
        };
        Ok(self
            .verify_code(user_id, code)
            .await?
            .then_some(user_id))
    }
}
