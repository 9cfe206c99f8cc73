//! Second step of a login on an MFA-active account.
//!
//! The host's password endpoint calls [`MfaController::begin_login`] and hands
//! the token to the client; this endpoint redeems it together with a code.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::admission::{ClientIdentity, admit, internal_error};
use crate::mfa::MfaController;
use crate::ratelimit::{ActionKind, RateLimiter};

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginMfaRequest {
    pub token: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginMfaResponse {
    pub user_id: Uuid,
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/mfa",
    request_body = LoginMfaRequest,
    responses(
        (status = 200, description = "Second factor accepted", body = LoginMfaResponse),
        (status = 400, description = "Missing payload"),
        (status = 401, description = "Invalid token or code"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn login_mfa(
    client: ClientIdentity,
    limiter: Extension<Arc<RateLimiter>>,
    mfa: Extension<Arc<MfaController>>,
    payload: Option<Json<LoginMfaRequest>>,
) -> Response {
    let quota = match admit(&limiter, ActionKind::UserLoginMfa, &client).await {
        Ok(quota) => quota,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, quota, "Missing payload".to_string()).into_response();
    };

    match mfa
        .complete_login(client.as_str(), request.token.trim(), &request.code)
        .await
    {
        Ok(Some(user_id)) => {
            (StatusCode::OK, quota, Json(LoginMfaResponse { user_id })).into_response()
        }
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            quota,
            "Invalid token or code".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to complete MFA login: {err:#}");
            internal_error(quota)
        }
    }
}
