//! Account MFA endpoints under `/v1/me/mfa`.
//!
//! Flow Overview:
//! 1) Consume the action's quota (429 / 500 before anything else runs).
//! 2) Require the authenticated principal (401).
//! 3) Call the controller and map its outcome to a status code.
//!
//! Every response carries the quota disclosure headers.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::admission::{ClientIdentity, admit, internal_error};
use super::principal::{Principal, require_principal};
use crate::mfa::{DisableOutcome, EnableOutcome, Enrollment, MfaController};
use crate::ratelimit::{ActionKind, RateLimiter};
use crate::users::BackupCode;

#[derive(ToSchema, Deserialize, Debug)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct DisableRequest {
    /// Required once the enrollment has been verified.
    pub code: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<BackupCode>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ResetBackupCodesResponse {
    pub backup_codes: Vec<String>,
}

fn mfa_not_enabled(quota: HeaderMap) -> Response {
    (StatusCode::BAD_REQUEST, quota, "MFA not enabled".to_string()).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/me/mfa",
    responses(
        (status = 200, description = "MFA enabled, pending verification", body = Enrollment),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "MFA already enabled"),
        (status = 429, description = "Rate limited")
    ),
    tag = "mfa"
)]
pub async fn enable(
    client: ClientIdentity,
    principal: Option<Extension<Principal>>,
    limiter: Extension<Arc<RateLimiter>>,
    mfa: Extension<Arc<MfaController>>,
) -> Response {
    let quota = match admit(&limiter, ActionKind::EnableMfa, &client).await {
        Ok(quota) => quota,
        Err(response) => return response,
    };
    let principal = match require_principal(principal, &quota) {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match mfa.enable(principal.user_id).await {
        Ok(EnableOutcome::Enabled(enrollment)) => {
            (StatusCode::OK, quota, Json(enrollment)).into_response()
        }
        Ok(EnableOutcome::AlreadyEnabled) => (
            StatusCode::CONFLICT,
            quota,
            "MFA already enabled".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to enable MFA: {err:#}");
            internal_error(quota)
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/mfa",
    request_body = DisableRequest,
    responses(
        (status = 204, description = "MFA disabled"),
        (status = 400, description = "MFA not enabled or code required"),
        (status = 401, description = "Unauthorized or code incorrect"),
        (status = 429, description = "Rate limited")
    ),
    tag = "mfa"
)]
pub async fn disable(
    client: ClientIdentity,
    principal: Option<Extension<Principal>>,
    limiter: Extension<Arc<RateLimiter>>,
    mfa: Extension<Arc<MfaController>>,
    payload: Option<Json<DisableRequest>>,
) -> Response {
    let quota = match admit(&limiter, ActionKind::DisableMfa, &client).await {
        Ok(quota) => quota,
        Err(response) => return response,
    };
    let principal = match require_principal(principal, &quota) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    match mfa.disable(principal.user_id, request.code.as_deref()).await {
        Ok(DisableOutcome::Disabled) => (StatusCode::NO_CONTENT, quota).into_response(),
        Ok(DisableOutcome::NotEnabled) => mfa_not_enabled(quota),
        Ok(DisableOutcome::CodeRequired) => (
            StatusCode::BAD_REQUEST,
            quota,
            "MFA code required".to_string(),
        )
            .into_response(),
        Ok(DisableOutcome::CodeRejected) => (
            StatusCode::UNAUTHORIZED,
            quota,
            "MFA code incorrect".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to disable MFA: {err:#}");
            internal_error(quota)
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/me/mfa/verify",
    request_body = VerifyRequest,
    responses(
        (status = 204, description = "Code accepted"),
        (status = 400, description = "Missing code"),
        (status = 401, description = "Unauthorized or code incorrect"),
        (status = 429, description = "Rate limited")
    ),
    tag = "mfa"
)]
pub async fn verify(
    client: ClientIdentity,
    principal: Option<Extension<Principal>>,
    limiter: Extension<Arc<RateLimiter>>,
    mfa: Extension<Arc<MfaController>>,
    payload: Option<Json<VerifyRequest>>,
) -> Response {
    let quota = match admit(&limiter, ActionKind::VerifyMfa, &client).await {
        Ok(quota) => quota,
        Err(response) => return response,
    };
    let principal = match require_principal(principal, &quota) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload.filter(|Json(request)| !request.code.trim().is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            quota,
            "MFA code required".to_string(),
        )
            .into_response();
    };

    match mfa.verify_code(principal.user_id, &request.code).await {
        Ok(true) => (StatusCode::NO_CONTENT, quota).into_response(),
        Ok(false) => (
            StatusCode::UNAUTHORIZED,
            quota,
            "MFA code incorrect".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to verify MFA code: {err:#}");
            internal_error(quota)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/mfa/backup-codes",
    responses(
        (status = 200, description = "Stored backup codes", body = BackupCodesResponse),
        (status = 400, description = "MFA not enabled"),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "Rate limited")
    ),
    tag = "mfa"
)]
pub async fn backup_codes(
    client: ClientIdentity,
    principal: Option<Extension<Principal>>,
    limiter: Extension<Arc<RateLimiter>>,
    mfa: Extension<Arc<MfaController>>,
) -> Response {
    let quota = match admit(&limiter, ActionKind::GetBackupCodes, &client).await {
        Ok(quota) => quota,
        Err(response) => return response,
    };
    let principal = match require_principal(principal, &quota) {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match mfa.backup_codes(principal.user_id).await {
        Ok(Some(backup_codes)) => (
            StatusCode::OK,
            quota,
            Json(BackupCodesResponse { backup_codes }),
        )
            .into_response(),
        Ok(None) => mfa_not_enabled(quota),
        Err(err) => {
            error!("Failed to load backup codes: {err:#}");
            internal_error(quota)
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/me/mfa/backup-codes/reset",
    responses(
        (status = 200, description = "Fresh backup codes; earlier ones are void", body = ResetBackupCodesResponse),
        (status = 400, description = "MFA not enabled"),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "Rate limited")
    ),
    tag = "mfa"
)]
pub async fn reset_backup_codes(
    client: ClientIdentity,
    principal: Option<Extension<Principal>>,
    limiter: Extension<Arc<RateLimiter>>,
    mfa: Extension<Arc<MfaController>>,
) -> Response {
    let quota = match admit(&limiter, ActionKind::ResetBackupCodes, &client).await {
        Ok(quota) => quota,
        Err(response) => return response,
    };
    let principal = match require_principal(principal, &quota) {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match mfa.reset_backup_codes(principal.user_id).await {
        Ok(Some(backup_codes)) => (
            StatusCode::OK,
            quota,
            Json(ResetBackupCodesResponse { backup_codes }),
        )
            .into_response(),
        Ok(None) => mfa_not_enabled(quota),
        Err(err) => {
            error!("Failed to reset backup codes: {err:#}");
            internal_error(quota)
        }
    }
}
