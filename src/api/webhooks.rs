use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{GrantCreditsRequest, GrantCreditsResponse};
use crate::telemetry;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Payment-Signature";

/// Verify a payment gateway signature (`sha256=<hex>` over the raw body)
fn verify_payment_signature(secret: &str, signature_header: &str, payload: &[u8]) -> bool {
    let signature = match signature_header.strip_prefix("sha256=") {
        Some(sig) => sig,
        None => return false,
    };

    let expected = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);

    // Use constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// POST /webhooks/payments - apply a successful credit purchase
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<GrantCreditsResponse>), ApiError> {
    let secret = state.config.payments.webhook_secret.as_deref().ok_or_else(|| {
        tracing::warn!("Payment webhook received but no webhook secret is configured");
        ApiError::service_unavailable("Payment webhooks are not configured")
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Payment webhook missing {} header", SIGNATURE_HEADER);
            ApiError::unauthorized("Missing webhook signature")
        })?;

    if !verify_payment_signature(secret, signature, &body) {
        tracing::warn!("Payment webhook signature verification failed");
        return Err(ApiError::unauthorized("Invalid webhook signature"));
    }

    let payload: GrantCreditsRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!("Failed to parse payment webhook payload: {}", e);
        ApiError::bad_request("Invalid payment payload")
    })?;

    let outcome = match state
        .scheduler
        .grant_credits(&payload.user_id, payload.credits, &payload.payment_id, Utc::now())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            telemetry::record_credit_grant("rejected");
            return Err(err.into());
        }
    };

    telemetry::record_credit_grant(if outcome.duplicate { "duplicate" } else { "applied" });

    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(GrantCreditsResponse {
            duplicate: outcome.duplicate,
            balance: outcome.balance,
        }),
    ))
}
