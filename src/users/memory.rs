use anyhow::{Result, anyhow};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BackupCode, MfaRecord, UserStore};

#[derive(Debug, Default)]
struct StoredUser {
    handle: String,
    enabled: bool,
    verified: bool,
    secret: Option<String>,
    backup_codes: Vec<BackupCode>,
}

/// In-process [`UserStore`] for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, StoredUser>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with MFA disabled and return its id.
    pub async fn insert_user(&self, handle: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.users.lock().await.insert(
            user_id,
            StoredUser {
                handle: handle.to_string(),
                ..StoredUser::default()
            },
        );
        user_id
    }
}

fn unknown_user(user_id: Uuid) -> anyhow::Error {
    anyhow!("user {user_id} not found")
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn load_mfa(&self, user_id: Uuid) -> Result<Option<MfaRecord>> {
        let users = self.users.lock().await;
        Ok(users.get(&user_id).map(|user| MfaRecord {
            handle: user.handle.clone(),
            enabled: user.enabled,
            verified: user.verified,
            secret: user.secret.clone().map(SecretString::from),
            backup_codes: user.backup_codes.clone(),
        }))
    }

    async fn enable_mfa(
        &self,
        user_id: Uuid,
        secret: &SecretString,
        codes: &[BackupCode],
    ) -> Result<bool> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(&user_id).ok_or_else(|| unknown_user(user_id))?;
        if user.enabled {
            return Ok(false);
        }
        user.enabled = true;
        user.verified = false;
        user.secret = Some(secret.expose_secret().to_string());
        user.backup_codes = codes.to_vec();
        Ok(true)
    }

    async fn mark_mfa_verified(&self, user_id: Uuid) -> Result<()> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(&user_id).ok_or_else(|| unknown_user(user_id))?;
        if user.enabled {
            user.verified = true;
        }
        Ok(())
    }

    async fn replace_backup_codes(&self, user_id: Uuid, codes: &[BackupCode]) -> Result<()> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(&user_id).ok_or_else(|| unknown_user(user_id))?;
        user.backup_codes = codes.to_vec();
        Ok(())
    }

    async fn use_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(&user_id).ok_or_else(|| unknown_user(user_id))?;
        match user
            .backup_codes
            .iter_mut()
            .find(|stored| stored.code == code && !stored.used)
        {
            Some(stored) => {
                stored.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_mfa(&self, user_id: Uuid) -> Result<()> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(&user_id).ok_or_else(|| unknown_user(user_id))?;
        user.enabled = false;
        user.verified = false;
        user.secret = None;
        user.backup_codes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enable_is_conditional() {
        let store = MemoryUserStore::new();
        let user_id = store.insert_user("admin").await;
        let secret = SecretString::from("JBSWY3DPEHPK3PXP".to_string());
        let codes = vec![BackupCode::unused("aaaaaa-bbbbbb-cccccc".to_string())];

        assert!(store.enable_mfa(user_id, &secret, &codes).await.unwrap());
        assert!(!store.enable_mfa(user_id, &secret, &[]).await.unwrap());

        let record = store.load_mfa(user_id).await.unwrap().unwrap();
        assert!(record.enabled);
        assert!(!record.verified);
        assert_eq!(record.backup_codes, codes);
        assert_eq!(record.secret.unwrap().expose_secret(), "JBSWY3DPEHPK3PXP");
    }

    #[tokio::test]
    async fn backup_codes_flip_once() {
        let store = MemoryUserStore::new();
        let user_id = store.insert_user("admin").await;
        let codes = vec![BackupCode::unused("aaaaaa-bbbbbb-cccccc".to_string())];
        store.replace_backup_codes(user_id, &codes).await.unwrap();

        assert!(store.use_backup_code(user_id, "aaaaaa-bbbbbb-cccccc").await.unwrap());
        assert!(!store.use_backup_code(user_id, "aaaaaa-bbbbbb-cccccc").await.unwrap());
        assert!(!store.use_backup_code(user_id, "000000-000000-000000").await.unwrap());
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let store = MemoryUserStore::new();
        let user_id = store.insert_user("admin").await;
        let secret = SecretString::from("JBSWY3DPEHPK3PXP".to_string());
        store.enable_mfa(user_id, &secret, &[]).await.unwrap();
        store.mark_mfa_verified(user_id).await.unwrap();
        store.clear_mfa(user_id).await.unwrap();

        let record = store.load_mfa(user_id).await.unwrap().unwrap();
        assert!(!record.enabled);
        assert!(!record.verified);
        assert!(record.secret.is_none());
        assert!(record.backup_codes.is_empty());
    }

    #[tokio::test]
    async fn unknown_users() {
        let store = MemoryUserStore::new();
        assert!(store.load_mfa(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.clear_mfa(Uuid::new_v4()).await.is_err());
    }
}
