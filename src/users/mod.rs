//! MFA fields of the user record.
//!
//! The user document itself belongs to the platform's document store; this
//! module only reads and updates the MFA columns, one field group at a time.

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::mfa::MfaState;

pub use self::memory::MemoryUserStore;
pub use self::postgres::PgUserStore;

/// One persisted backup code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BackupCode {
    pub code: String,
    pub used: bool,
}

impl BackupCode {
    #[must_use]
    pub fn unused(code: String) -> Self {
        Self { code, used: false }
    }
}

/// MFA fields of a user, as read from the store.
#[derive(Debug)]
pub struct MfaRecord {
    /// Account label shown in authenticator apps.
    pub handle: String,
    pub enabled: bool,
    pub verified: bool,
    pub secret: Option<SecretString>,
    pub backup_codes: Vec<BackupCode>,
}

impl MfaRecord {
    #[must_use]
    pub fn state(&self) -> MfaState {
        match (self.enabled, self.verified) {
            (false, _) => MfaState::Disabled,
            (true, false) => MfaState::PendingVerification,
            (true, true) => MfaState::Active,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Read the MFA fields, `None` for unknown users.
    async fn load_mfa(&self, user_id: Uuid) -> Result<Option<MfaRecord>>;

    /// Set `enabled=true, verified=false`, the secret and the backup codes, but
    /// only if MFA is currently disabled. Returns `false` when it was already enabled.
    async fn enable_mfa(
        &self,
        user_id: Uuid,
        secret: &SecretString,
        codes: &[BackupCode],
    ) -> Result<bool>;

    /// Flip `verified` to true on an enabled account.
    async fn mark_mfa_verified(&self, user_id: Uuid) -> Result<()>;

    /// Replace the whole backup code set.
    async fn replace_backup_codes(&self, user_id: Uuid, codes: &[BackupCode]) -> Result<()>;

    /// Mark `code` used if it exists and is unused. Returns whether it flipped.
    async fn use_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool>;

    /// Clear enabled, verified, the secret and every backup code.
    async fn clear_mfa(&self, user_id: Uuid) -> Result<()>;
}
