use utoipa::OpenApi;

use super::handlers::{health, login, mfa};

/// `OpenAPI` document for every served route, rendered by Swagger UI at `/docs`.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        mfa::enable,
        mfa::disable,
        mfa::verify,
        mfa::backup_codes,
        mfa::reset_backup_codes,
        login::login_mfa,
    ),
    tags(
        (name = "health", description = "Liveness and store reachability"),
        (name = "mfa", description = "Multi-factor authentication of the current account"),
        (name = "auth", description = "Second step of an MFA login")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_all_routes() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        for path in [
            "/health",
            "/v1/me/mfa",
            "/v1/me/mfa/verify",
            "/v1/me/mfa/backup-codes",
            "/v1/me/mfa/backup-codes/reset",
            "/v1/auth/login/mfa",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
