//! HTTP surface for the rate limiter and the MFA controller.
//!
//! Flow Overview:
//! 1) Each request gets a ULID `x-request-id` (unless one came in) and a trace span.
//! 2) The caller is the TCP peer, or the client named by the trusted proxy hops.
//! 3) Handlers consume their action's quota before anything else.
//! 4) `/v1/me/*` handlers read the [`handlers::Principal`] set by the host's auth layer.
//! 5) The server stops on Ctrl-C / SIGTERM after in-flight requests finish.

use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post, put},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handlers::TrustedProxies;
use crate::mfa::MfaController;
use crate::ratelimit::RateLimiter;
use crate::store::KvStore;

pub mod handlers;
mod openapi;

pub use openapi::{ApiDoc, openapi};

/// Everything the handlers need, shared across requests.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn KvStore>,
    pub limiter: Arc<RateLimiter>,
    pub mfa: Arc<MfaController>,
    pub proxies: TrustedProxies,
}

/// Build the application router with shared services attached as extensions.
#[must_use]
pub fn router(services: Services) -> Router {
    let request_id = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/v1/me/mfa",
            post(handlers::mfa::enable).delete(handlers::mfa::disable),
        )
        .route("/v1/me/mfa/verify", put(handlers::mfa::verify))
        .route("/v1/me/mfa/backup-codes", get(handlers::mfa::backup_codes))
        .route(
            "/v1/me/mfa/backup-codes/reset",
            post(handlers::mfa::reset_backup_codes),
        )
        .route("/v1/auth/login/mfa", post(handlers::login::login_mfa))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    request_id.clone(),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(services.store))
                .layer(Extension(services.limiter))
                .layer(Extension(services.mfa))
                .layer(Extension(services.proxies)),
        )
}

/// Serve `router` on `[::]:port` until a shutdown signal arrives.
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve(port: u16, router: Router) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
