//! Webhook ingestion from the external sales channel.
//!
//! ## Authenticity
//! Every delivery carries `X-Store-Hmac`: base64 HMAC-SHA256 of the RAW
//! request body under the shared secret. Verification runs against the
//! exact bytes received - before JSON parsing, which could re-order keys
//! and change the text. Comparison is constant-time via `Mac::verify_slice`.
//!
//! ## Delivery Semantics
//! The channel retries until it sees 200, so:
//! - known topics route to the idempotent sync repository upserts
//! - unknown topics are acknowledged with 200 and logged, because failing
//!   them would just make the channel retry forever
//! - only a bad signature (401) or malformed payload (400) is refused

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{info, warn};

use tally_core::{ExternalOrder, ExternalProduct};
use tally_db::OrderSyncOutcome;

use crate::error::{ApiError, ApiResult};
use crate::response::Envelope;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-store-hmac";

/// `POST /webhooks/*topic`
///
/// Topic arrives as the path remainder, e.g. `/webhooks/orders/create`.
pub async fn handle(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Envelope<serde_json::Value>>> {
    verify_signature(&headers, &body, &state.config.webhook_secret)?;

    let ctx = state.sync_context();
    let store_id = state.config.store_id.clone();

    let data = match topic.as_str() {
        "products/create" | "products/update" => {
            let payload: ExternalProduct = parse_payload(&body)?;
            let product = state.db.sync().upsert_product(&ctx, &store_id, payload).await?;
            serde_json::json!({ "local_id": product.id, "sku": product.sku })
        }

        "orders/create" | "orders/updated" => {
            let payload: ExternalOrder = parse_payload(&body)?;
            let outcome = state.db.sync().upsert_order(&ctx, &store_id, payload).await?;
            let action = match &outcome {
                OrderSyncOutcome::Created(_) => "created",
                OrderSyncOutcome::Updated(_) => "updated",
                OrderSyncOutcome::Unchanged(_) => "unchanged",
            };
            serde_json::json!({ "local_id": outcome.header().id, "action": action })
        }

        other => {
            // Acknowledge so the channel stops retrying something we will
            // never handle.
            info!(topic = %other, "Ignoring webhook topic");
            serde_json::json!({ "ignored": true })
        }
    };

    Ok(Json(Envelope::ok("Webhook processed", data)))
}

/// Checks the HMAC signature header against the raw body.
fn verify_signature(headers: &HeaderMap, body: &Bytes, secret: &str) -> ApiResult<()> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing webhook signature".to_string()))?;

    let signature = BASE64
        .decode(signature)
        .map_err(|_| ApiError::Unauthorized("malformed webhook signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Internal(format!("webhook secret unusable: {e}")))?;
    mac.update(body);

    // verify_slice is constant-time
    mac.verify_slice(&signature).map_err(|_| {
        warn!("Webhook signature verification failed");
        ApiError::Unauthorized("invalid webhook signature".to_string())
    })
}

fn parse_payload<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid payload: {e}")))
}

/// Computes the signature the channel would send for `body`. Used by
/// integration tests and by outbound sync if we ever push back.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn headers_with(signature: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(signature).unwrap());
        headers
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = Bytes::from_static(b"{\"hello\":\"world\"}");
        let signature = sign_body(SECRET, &body);
        assert!(verify_signature(&headers_with(&signature), &body, SECRET).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign_body(SECRET, b"{\"amount\":\"10.00\"}");
        let tampered = Bytes::from_static(b"{\"amount\":\"99.00\"}");
        assert!(verify_signature(&headers_with(&signature), &tampered, SECRET).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = Bytes::from_static(b"{}");
        let signature = sign_body("other-secret", &body);
        assert!(verify_signature(&headers_with(&signature), &body, SECRET).is_err());
    }

    #[test]
    fn test_missing_header_rejected() {
        let body = Bytes::from_static(b"{}");
        assert!(verify_signature(&HeaderMap::new(), &body, SECRET).is_err());
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let body = Bytes::from_static(b"{}");
        assert!(verify_signature(&headers_with("not base64 !!!"), &body, SECRET).is_err());
    }
}
