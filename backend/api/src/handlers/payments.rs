use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::middlewares::auth::JwtClaims;
use crate::models::payment::PaystackWebhookEvent;
use crate::services::{payment_service::PaymentService, AppState};

fn service(state: &AppState) -> PaymentService {
    PaymentService::new(state.mongo.clone(), state.config.paystack.clone())
}

pub async fn initialize(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Initializing activation payment for user: {}", claims.sub);

    match service(&state).initialize(&claims.sub).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("already activated") {
                StatusCode::CONFLICT
            } else if msg.contains("not configured") {
                StatusCode::SERVICE_UNAVAILABLE
            } else if msg.contains("gateway") {
                StatusCode::BAD_GATEWAY
            } else if msg.contains("not found") {
                StatusCode::NOT_FOUND
            } else {
                tracing::error!("Payment initialization failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(
        "Verifying payment: {} for user: {}",
        reference,
        claims.sub
    );

    match service(&state).verify(&claims.sub, &reference).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("not configured") {
                StatusCode::SERVICE_UNAVAILABLE
            } else if msg.contains("gateway") {
                StatusCode::BAD_GATEWAY
            } else if msg.contains("not found") {
                StatusCode::NOT_FOUND
            } else {
                tracing::error!("Payment verification failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).history(&claims.sub).await {
        Ok(records) => Ok((StatusCode::OK, Json(records))),
        Err(e) => {
            tracing::error!("Failed to load payment history: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Unauthenticated Paystack webhook. The HMAC signature over the raw body is
/// the only trust anchor, so it is checked before the payload is decoded.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let signature = headers
        .get("x-paystack-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing signature".to_string()))?;

    let svc = service(&state);
    if svc.verify_webhook_signature(&body, signature).is_err() {
        tracing::warn!("Webhook with invalid signature rejected");
        return Err((StatusCode::UNAUTHORIZED, "Invalid signature".to_string()));
    }

    let event: PaystackWebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid payload: {}", e)))?;

    match svc.handle_webhook(event).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(e) => {
            // Paystack retries on non-2xx; a processing failure here should
            // trigger that retry.
            tracing::error!("Webhook processing failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
