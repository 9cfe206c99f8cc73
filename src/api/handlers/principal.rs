//! Authenticated caller, as established by the host's authentication layer.
//!
//! Sessions and password checks live outside this crate. Whatever authenticates
//! the request inserts a [`Principal`] extension before the `/v1/me` routes run.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
}

/// The request principal, or a 401 carrying the quota headers already computed.
pub fn require_principal(
    principal: Option<Extension<Principal>>,
    quota: &HeaderMap,
) -> Result<Principal, Response> {
    principal.map(|Extension(principal)| principal).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            quota.clone(),
            "Unauthorized".to_string(),
        )
            .into_response()
    })
}
