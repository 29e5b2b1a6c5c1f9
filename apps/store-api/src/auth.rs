//! Bearer-token authentication for /api routes.
//!
//! A single static service token (config `API_TOKEN`); webhook routes are
//! NOT behind this layer - their authenticity comes from the HMAC
//! signature instead.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

/// Middleware rejecting requests without a valid `Authorization: Bearer`
/// header.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("expected Bearer token".to_string()))?;

    if !constant_time_eq(token.as_bytes(), state.config.api_token.as_bytes()) {
        return Err(ApiError::Unauthorized("invalid token".to_string()));
    }

    Ok(next.run(request).await)
}

/// Comparison that doesn't leak the match prefix length through timing.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}
