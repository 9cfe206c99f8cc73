//! Backup code generation and single-use consumption.
//!
//! Codes are three groups of six lowercase hex characters (`a1b2c3-d4e5f6-07890a`)
//! drawn from the OS RNG. Regenerating a set discards every earlier code, used
//! or not.

use anyhow::{Context, Result};
use rand::{RngCore, rngs::OsRng};
use std::sync::Arc;
use subtle::{Choice, ConstantTimeEq};
use uuid::Uuid;

use crate::users::{BackupCode, MfaRecord, UserStore};

const GROUPS: usize = 3;
const GROUP_BYTES: usize = 3;

#[derive(Clone)]
pub struct BackupCodeVault {
    users: Arc<dyn UserStore>,
    count: usize,
}

impl BackupCodeVault {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, count: usize) -> Self {
        Self { users, count }
    }

    /// A fresh, unpersisted set of the configured size.
    ///
    /// # Errors
    /// Returns an error if the system RNG fails.
    pub fn generate(&self) -> Result<Vec<BackupCode>> {
        generate_codes(&mut OsRng, self.count)
    }

    /// Replace the user's set with a fresh one and return the new codes.
    ///
    /// # Errors
    /// Returns an error if generation or persistence fails.
    pub async fn reset(&self, user_id: Uuid) -> Result<Vec<String>> {
        let codes = self.generate()?;
        self.users
            .replace_backup_codes(user_id, &codes)
            .await
            .context("failed to persist backup codes")?;
        Ok(codes.into_iter().map(|code| code.code).collect())
    }

    /// Consume `code` (already lowercased) against the codes in `record`.
    ///
    /// Returns `false` for unknown and already used codes.
    ///
    /// # Errors
    /// Returns an error if the user store cannot be updated.
    pub async fn consume(&self, user_id: Uuid, record: &MfaRecord, code: &str) -> Result<bool> {
        let Some(stored) = find_code(&record.backup_codes, code) else {
            return Ok(false);
        };
        if stored.used {
            return Ok(false);
        }
        // The store re-checks `used`, so two concurrent consumers cannot both win.
        self.users.use_backup_code(user_id, &stored.code).await
    }
}

/// Case-insensitive lookup that compares against every stored code.
fn find_code<'a>(codes: &'a [BackupCode], candidate: &str) -> Option<&'a BackupCode> {
    let candidate = candidate.to_ascii_lowercase();
    let mut found = None;
    for stored in codes {
        let matched: Choice = stored
            .code
            .to_ascii_lowercase()
            .as_bytes()
            .ct_eq(candidate.as_bytes());
        if bool::from(matched) && found.is_none() {
            found = Some(stored);
        }
    }
    found
}

pub(crate) fn generate_codes<R: RngCore + ?Sized>(rng: &mut R, count: usize) -> Result<Vec<BackupCode>> {
    let mut codes = Vec::with_capacity(count);
    for _ in 0..count {
        let mut raw = [0u8; GROUPS * GROUP_BYTES];
        rng.try_fill_bytes(&mut raw)
            .context("failed to generate backup code")?;
        let code = raw
            .chunks(GROUP_BYTES)
            .map(hex::encode)
            .collect::<Vec<_>>()
            .join("-");
        codes.push(BackupCode::unused(code));
    }
    Ok(codes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mfa::code::is_backup_code;
    use crate::users::MemoryUserStore;
    use secrecy::SecretString;

    async fn vault_with_user() -> (Arc<MemoryUserStore>, BackupCodeVault, Uuid) {
        let users = Arc::new(MemoryUserStore::new());
        let user_id = users.insert_user("admin").await;
        let vault = BackupCodeVault::new(users.clone(), 5);
        let codes = vault.generate().unwrap();
        users
            .enable_mfa(user_id, &SecretString::from("JBSWY3DPEHPK3PXP".to_string()), &codes)
            .await
            .unwrap();
        (users, vault, user_id)
    }

    #[test]
    fn generated_codes_have_backup_shape() {
        let codes = generate_codes(&mut OsRng, 5).unwrap();
        assert_eq!(codes.len(), 5);
        for code in &codes {
            assert!(is_backup_code(&code.code), "{}", code.code);
            assert_eq!(code.code, code.code.to_ascii_lowercase());
            assert!(!code.used);
        }
    }

    #[tokio::test]
    async fn code_is_accepted_exactly_once() {
        let (users, vault, user_id) = vault_with_user().await;
        let record = users.load_mfa(user_id).await.unwrap().unwrap();
        let code = record.backup_codes[0].code.clone();

        assert!(vault.consume(user_id, &record, &code).await.unwrap());

        let record = users.load_mfa(user_id).await.unwrap().unwrap();
        assert!(record.backup_codes[0].used);
        assert!(!vault.consume(user_id, &record, &code).await.unwrap());
    }

    #[tokio::test]
    async fn matching_is_case_insensitive() {
        let (users, vault, user_id) = vault_with_user().await;
        let record = users.load_mfa(user_id).await.unwrap().unwrap();
        let upper = record.backup_codes[1].code.to_ascii_uppercase();
        assert!(vault.consume(user_id, &record, &upper).await.unwrap());
    }

    #[tokio::test]
    async fn stale_record_cannot_double_spend() {
        let (users, vault, user_id) = vault_with_user().await;
        let stale = users.load_mfa(user_id).await.unwrap().unwrap();
        let code = stale.backup_codes[2].code.clone();
        assert!(vault.consume(user_id, &stale, &code).await.unwrap());
        assert!(!vault.consume(user_id, &stale, &code).await.unwrap());
    }

    #[tokio::test]
    async fn reset_invalidates_previous_codes() {
        let (users, vault, user_id) = vault_with_user().await;
        let before = users.load_mfa(user_id).await.unwrap().unwrap();
        let old_code = before.backup_codes[0].code.clone();

        let fresh = vault.reset(user_id).await.unwrap();
        assert_eq!(fresh.len(), 5);
        assert!(!fresh.contains(&old_code));

        let after = users.load_mfa(user_id).await.unwrap().unwrap();
        assert!(!vault.consume(user_id, &after, &old_code).await.unwrap());
        assert!(vault.consume(user_id, &after, &fresh[0]).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let (users, vault, user_id) = vault_with_user().await;
        let record = users.load_mfa(user_id).await.unwrap().unwrap();
        assert!(!vault
            .consume(user_id, &record, "000000-000000-000000")
            .await
            .unwrap());
    }
}
