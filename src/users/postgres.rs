//! `PostgreSQL` [`UserStore`]. Only MFA columns on `users` and the
//! `user_mfa_backup_codes` table are ever written.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use super::{BackupCode, MfaRecord, UserStore};

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation
    )
}

async fn insert_backup_codes(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    codes: &[BackupCode],
) -> Result<()> {
    sqlx::query("DELETE FROM user_mfa_backup_codes WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(db_span("DELETE"))
        .await
        .context("failed to delete backup codes")?;

    let query = r"
        INSERT INTO user_mfa_backup_codes (user_id, position, code, used)
        VALUES ($1, $2, $3, $4)
    ";
    for (position, code) in codes.iter().enumerate() {
        let position = i32::try_from(position).context("too many backup codes")?;
        sqlx::query(query)
            .bind(user_id)
            .bind(position)
            .bind(&code.code)
            .bind(code.used)
            .execute(&mut **tx)
            .instrument(db_span("INSERT"))
            .await
            .context("failed to insert backup code")?;
    }
    Ok(())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn load_mfa(&self, user_id: Uuid) -> Result<Option<MfaRecord>> {
        let query = r"
            SELECT handle, mfa_enabled, mfa_verified, mfa_secret
            FROM users
            WHERE id = $1
            LIMIT 1
        ";
        let Some(row) = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .context("failed to load MFA state")?
        else {
            return Ok(None);
        };

        let codes = sqlx::query(
            r"
            SELECT code, used
            FROM user_mfa_backup_codes
            WHERE user_id = $1
            ORDER BY position
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .instrument(db_span("SELECT"))
        .await
        .context("failed to load backup codes")?;

        let secret: Option<String> = row.try_get("mfa_secret")?;
        Ok(Some(MfaRecord {
            handle: row.try_get("handle")?,
            enabled: row.try_get("mfa_enabled")?,
            verified: row.try_get("mfa_verified")?,
            secret: secret.map(SecretString::from),
            backup_codes: codes
                .into_iter()
                .map(|row| {
                    Ok(BackupCode {
                        code: row.try_get("code")?,
                        used: row.try_get("used")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?,
        }))
    }

    async fn enable_mfa(
        &self,
        user_id: Uuid,
        secret: &SecretString,
        codes: &[BackupCode],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE users
            SET mfa_enabled = TRUE,
                mfa_verified = FALSE,
                mfa_secret = $2
            WHERE id = $1
              AND mfa_enabled = FALSE
            ",
        )
        .bind(user_id)
        .bind(secret.expose_secret())
        .execute(&mut *tx)
        .instrument(db_span("UPDATE"))
        .await
        .context("failed to enable MFA")?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_backup_codes(&mut tx, user_id, codes).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn mark_mfa_verified(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET mfa_verified = TRUE WHERE id = $1 AND mfa_enabled = TRUE")
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE"))
            .await
            .context("failed to mark MFA verified")?;
        Ok(())
    }

    async fn replace_backup_codes(&self, user_id: Uuid, codes: &[BackupCode]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_backup_codes(&mut tx, user_id, codes).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn use_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool> {
        let query = r"
            UPDATE user_mfa_backup_codes
            SET used = TRUE,
                used_at = NOW()
            WHERE user_id = $1
              AND code = $2
              AND used = FALSE
            RETURNING user_id
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE"))
            .await
            .context("failed to consume backup code")?;
        Ok(row.is_some())
    }

    async fn clear_mfa(&self, user_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            UPDATE users
            SET mfa_enabled = FALSE,
                mfa_verified = FALSE,
                mfa_secret = NULL
            WHERE id = $1
            ",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(db_span("UPDATE"))
        .await
        .context("failed to disable MFA")?;

        insert_backup_codes(&mut tx, user_id, &[]).await?;
        tx.commit().await?;
        Ok(())
    }
}
