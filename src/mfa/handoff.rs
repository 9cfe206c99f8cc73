//! Short-lived, IP-bound token bridging a password check to the MFA step.
//!
//! Flow Overview:
//! 1) After a password check on an MFA-active account, `issue` stores
//!    `{source_ip, user_id}` under a random 256-bit token with a short TTL.
//! 2) The client submits the token with its code; `redeem` takes the entry
//!    (read + delete) so it can be used once at most.
//! 3) Unknown, expired and IP-mismatched tokens all come back as `None`.

use anyhow::{Context, Result};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{KvStore, StoreError};

const KEY_PREFIX: &str = "mfa:login";
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct Handoff {
    source_ip: String,
    user_id: Uuid,
}

#[derive(Clone)]
pub struct LoginHandoff {
    store: Arc<dyn KvStore>,
    ttl_seconds: u64,
}

impl LoginHandoff {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, ttl_seconds: u64) -> Self {
        Self { store, ttl_seconds }
    }

    fn key(token: &str) -> String {
        format!("{KEY_PREFIX}:{token}")
    }

    /// Issue a token for `user_id`, bound to `source_ip`.
    ///
    /// # Errors
    /// Returns an error if the RNG fails or the store cannot be written.
    pub async fn issue(&self, source_ip: &str, user_id: Uuid) -> Result<String> {
        let mut raw = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut raw)
            .context("failed to generate login token")?;
        let token = hex::encode(raw);

        let payload = serde_json::to_string(&Handoff {
            source_ip: source_ip.to_string(),
            user_id,
        })
        .context("failed to encode login handoff")?;

        self.store
            .set_ex(&Self::key(&token), &payload, self.ttl_seconds)
            .await
            .context("failed to store login handoff")?;

        debug!("Issued MFA login token for user {user_id}");
        Ok(token)
    }

    /// Redeem `token` from `source_ip`. The token is consumed whatever the outcome.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the store cannot be reached.
    pub async fn redeem(&self, source_ip: &str, token: &str) -> Result<Option<Uuid>, StoreError> {
        if token.is_empty() || token.len() > TOKEN_BYTES * 2 {
            return Ok(None);
        }

        let Some(payload) = self.store.take(&Self::key(token)).await? else {
            return Ok(None);
        };

        let handoff: Handoff = match serde_json::from_str(&payload) {
            Ok(handoff) => handoff,
            Err(err) => {
                warn!("Discarding unreadable login handoff: {err}");
                return Ok(None);
            }
        };

        if handoff.source_ip != source_ip {
            warn!(
                "Login token for user {} presented from a different address",
                handoff.user_id
            );
            return Ok(None);
        }

        Ok(Some(handoff.user_id))
    }
}
