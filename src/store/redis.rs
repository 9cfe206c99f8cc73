//! Redis-backed [`KvStore`].
//!
//! Every command runs under the configured timeout. A timed out or failed
//! command is reported, never retried.

use ::redis::{AsyncCommands, Client, RedisResult, aio::ConnectionManager};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

use super::{KvStore, StoreError};

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisStore {
    /// Open a managed connection to `url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server cannot be reached in time.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let conn = match timeout(op_timeout, ConnectionManager::new(client)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => return Err(StoreError::Unavailable(err.to_string())),
            Err(_) => return Err(StoreError::Timeout(op_timeout)),
        };
        debug!("Redis connection established");
        Ok(Self {
            conn,
            timeout: op_timeout,
        })
    }

    async fn run<T, F>(&self, command: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>> + Send,
    {
        match timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                error!("Redis {command} failed: {err}");
                Err(StoreError::Unavailable(err.to_string()))
            }
            Err(_) => {
                error!("Redis {command} timed out after {:?}", self.timeout);
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Redis reports `-2` for a missing key and `-1` for a key without expiry.
fn ttl_from_reply(reply: i64) -> Option<u64> {
    u64::try_from(reply).ok().filter(|seconds| *seconds > 0)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run("GET", async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.run("SET", async move {
            conn.set_ex::<_, _, ()>(key, value, seconds).await
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.run("DEL", async move { conn.del::<_, ()>(key).await })
            .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        let reply = self
            .run("TTL", async move { conn.ttl::<_, i64>(key).await })
            .await?;
        Ok(ttl_from_reply(reply))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run("GETDEL", async move {
            conn.get_del::<_, Option<String>>(key).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_reply_mapping() {
        assert_eq!(ttl_from_reply(-2), None);
        assert_eq!(ttl_from_reply(-1), None);
        assert_eq!(ttl_from_reply(0), None);
        assert_eq!(ttl_from_reply(17), Some(17));
    }

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let result = RedisStore::connect("not a redis url", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
