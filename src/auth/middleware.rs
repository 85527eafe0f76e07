use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::store::AppState;
use crate::validation;

/// Caller identity, asserted by the upstream identity provider through the
/// configured header. Whether the user exists is decided by the service.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub email: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let email = extract_identity(parts, &state.config.identity_header)
            .ok_or(ApiError::Unauthorized)?;
        validation::check_email(&email).map_err(|_| ApiError::Unauthorized)?;
        Ok(Self { email })
    }
}

fn extract_identity(parts: &Parts, header: &str) -> Option<String> {
    let value = parts.headers.get(header)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_lowercase())
}
