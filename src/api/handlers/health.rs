use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

use crate::GIT_COMMIT_HASH;
use crate::store::KvStore;

const PING_KEY: &str = "health:ping";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    store: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Key-value store is reachable", body = Health),
        (status = 503, description = "Key-value store is unreachable", body = Health)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(store: Extension<Arc<dyn KvStore>>) -> impl IntoResponse {
    let ping_span = info_span!("kv.ping", db.system = "redis", db.operation = "TTL");
    let result = store.0.ttl(PING_KEY).instrument(ping_span).await;
    if let Err(err) = &result {
        error!("Failed to reach key-value store: {err}");
    }

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: if result.is_ok() {
            "ok".to_string()
        } else {
            "error".to_string()
        },
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    match format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>() {
        Ok(value) => {
            debug!("X-App header: {:?}", value);
            headers.insert("x-app", value);
        }
        Err(err) => error!("Failed to parse X-App header: {}", err),
    }

    let status = if result.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, headers, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn reports_store_ok() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
        let response = health(Extension(store)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let x_app = response.headers()["x-app"].to_str().unwrap();
        assert!(x_app.starts_with(env!("CARGO_PKG_NAME")));
    }
}
