//! Payment gateway webhooks
//!
//! Events are authenticated against the raw body, so this handler takes
//! `Bytes` rather than `Json`.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::payments::{apply_payment_status, fetch_payment_by_intent};
use crate::api::MessageResponse;
use crate::app::AppState;
use crate::domain::payments::PaymentStatus;
use crate::error::ApiError;
use crate::middleware::request_id::request_id;
use crate::services::cache::keys;
use crate::services::payments::{verify_webhook_signature, WebhookEvent};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Processed event ids are remembered for longer than the gateway retries
const PROCESSED_EVENT_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Our payment status for the events we act on
fn event_payment_status(event_type: &str) -> Option<PaymentStatus> {
    match event_type {
        "payment_intent.succeeded" => Some(PaymentStatus::Succeeded),
        "payment_intent.payment_failed" | "payment_intent.canceled" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

/// POST /webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = request_id(&headers).unwrap_or("-").to_string();

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing webhook signature"))?;

    verify_webhook_signature(
        &body,
        signature,
        &state.settings.stripe_webhook_secret,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(request_id = %request_id, error = %e, "Rejected webhook");
        ApiError::bad_request(e.to_string())
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid webhook payload: {}", e)))?;

    let Some(next) = event_payment_status(&event.event_type) else {
        tracing::debug!(request_id = %request_id, event_type = %event.event_type, "Ignoring webhook event");
        return Ok(MessageResponse::new("Event ignored"));
    };

    let seen_key = keys::webhook_event(&event.id);
    if state.cache.get::<bool>(&seen_key).await.is_some() {
        tracing::info!(request_id = %request_id, event_id = %event.id, "Duplicate webhook event");
        return Ok(MessageResponse::new("Event already processed"));
    }

    let intent_id = event
        .payment_intent_id()
        .ok_or_else(|| ApiError::bad_request("Event has no payment intent"))?;

    // Intents we did not create (other integrations on the same account) are acknowledged
    let Some(payment) = fetch_payment_by_intent(&state.db, intent_id).await? else {
        tracing::warn!(request_id = %request_id, intent_id = %intent_id, "Webhook for unknown payment intent");
        return Ok(MessageResponse::new("Unknown payment intent"));
    };

    let payment = apply_payment_status(&state, payment, next).await?;
    state.cache.set_logged(&seen_key, &true, PROCESSED_EVENT_TTL).await;

    tracing::info!(
        request_id = %request_id,
        event_id = %event.id,
        event_type = %event.event_type,
        payment_id = %payment.id,
        status = %payment.status,
        "Webhook processed"
    );

    Ok(MessageResponse::new("Event processed"))
}
