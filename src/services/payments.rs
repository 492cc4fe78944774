//! Payment gateway integration.
//!
//! [`PaymentGateway`] is the seam the booking routes talk to; [`StripeClient`]
//! implements it over the Stripe REST API. Webhook payloads are authenticated
//! with [`verify_webhook_signature`].

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{error, instrument};

use crate::error::ApiError;

/// A gateway-side payment attempt
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Refund {
    pub id: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Stored in `payments.gateway`
    fn name(&self) -> &'static str;

    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &[(&str, String)],
        idempotency_key: &str,
    ) -> Result<PaymentIntent, ApiError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ApiError>;

    /// Void an unpaid intent so it can no longer be charged
    async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent, ApiError>;

    async fn refund(&self, intent_id: &str) -> Result<Refund, ApiError>;
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    pub fn new(http: Client, base_url: &str, secret_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ApiError::upstream(format!("Invalid Stripe response: {}", e)));
        }

        let message = response
            .json::<StripeErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| format!("Stripe error: {}", status));

        error!(status = %status, message = %message, "Stripe request failed");
        if status.is_client_error() && status != reqwest::StatusCode::UNAUTHORIZED {
            Err(ApiError::bad_request(message))
        } else {
            Err(ApiError::upstream(message))
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    fn name(&self) -> &'static str {
        "stripe"
    }

    #[instrument(skip(self, metadata))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &[(&str, String)],
        idempotency_key: &str,
    ) -> Result<PaymentIntent, ApiError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        form.extend(
            metadata
                .iter()
                .map(|(k, v)| (format!("metadata[{}]", k), v.clone())),
        );

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::upstream(format!("Stripe unreachable: {}", e)))?;

        Self::parse(response).await
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ApiError> {
        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{}", self.base_url, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ApiError::upstream(format!("Stripe unreachable: {}", e)))?;

        Self::parse(response).await
    }

    #[instrument(skip(self))]
    async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent, ApiError> {
        let response = self
            .http
            .post(format!("{}/v1/payment_intents/{}/cancel", self.base_url, intent_id))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", format!("cancel-{}", intent_id))
            .form(&[("cancellation_reason", "abandoned")])
            .send()
            .await
            .map_err(|e| ApiError::upstream(format!("Stripe unreachable: {}", e)))?;

        Self::parse(response).await
    }

    #[instrument(skip(self))]
    async fn refund(&self, intent_id: &str) -> Result<Refund, ApiError> {
        let response = self
            .http
            .post(format!("{}/v1/refunds", self.base_url))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", format!("refund-{}", intent_id))
            .form(&[("payment_intent", intent_id)])
            .send()
            .await
            .map_err(|e| ApiError::upstream(format!("Stripe unreachable: {}", e)))?;

        Self::parse(response).await
    }
}

// =============================================================================
// Webhooks
// =============================================================================

/// Maximum age of a signed webhook, in seconds
pub const WEBHOOK_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Malformed signature header")]
    MalformedHeader,

    #[error("Webhook timestamp outside the tolerance window")]
    Expired,

    #[error("No matching signature")]
    SignatureMismatch,
}

/// Verify a `Stripe-Signature` header (`t=...,v1=...`) against the raw body.
///
/// The signed message is `"{t}.{body}"` under HMAC-SHA256 with the endpoint secret;
/// any `v1` entry may match.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse().map_err(|_| WebhookError::MalformedHeader)?);
            }
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    if (now - timestamp).abs() > WEBHOOK_TOLERANCE_SECONDS {
        return Err(WebhookError::Expired);
    }

    let matched = signatures.iter().any(|signature| {
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(signature).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Webhook envelope; only payment intent events carry an object we act on
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    pub fn payment_intent_id(&self) -> Option<&str> {
        self.data.object.get("id")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &[u8], timestamp: i64, secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signatures() {
        let body = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let header = format!("t=1700000000,v1={}", sign(body, 1_700_000_000, SECRET));

        assert_eq!(verify_webhook_signature(body, &header, SECRET, 1_700_000_100), Ok(()));
    }

    #[test]
    fn any_v1_entry_may_match() {
        let body = b"{}";
        let header = format!(
            "t=1700000000,v1={},v1={},v0=deadbeef",
            sign(body, 1_700_000_000, "old_secret"),
            sign(body, 1_700_000_000, SECRET)
        );
        assert_eq!(verify_webhook_signature(body, &header, SECRET, 1_700_000_000), Ok(()));
    }

    #[test]
    fn rejects_tampering_and_stale_events() {
        let body = b"{\"amount\":100}";
        let header = format!("t=1700000000,v1={}", sign(body, 1_700_000_000, SECRET));

        assert_eq!(
            verify_webhook_signature(b"{\"amount\":999}", &header, SECRET, 1_700_000_000),
            Err(WebhookError::SignatureMismatch)
        );
        assert_eq!(
            verify_webhook_signature(body, &header, "whsec_other", 1_700_000_000),
            Err(WebhookError::SignatureMismatch)
        );
        assert_eq!(
            verify_webhook_signature(body, &header, SECRET, 1_700_000_000 + 301),
            Err(WebhookError::Expired)
        );
        assert_eq!(
            verify_webhook_signature(body, "v1=abc", SECRET, 1_700_000_000),
            Err(WebhookError::MalformedHeader)
        );
        assert_eq!(
            verify_webhook_signature(body, "t=1700000000", SECRET, 1_700_000_000),
            Err(WebhookError::MalformedHeader)
        );
    }

    #[test]
    fn parses_payment_intent_events() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "id": "evt_3Nabc",
                "object": "event",
                "type": "payment_intent.succeeded",
                "data": {"object": {"id": "pi_3Nabc", "object": "payment_intent", "status": "succeeded"}}
            }"#,
        )
        .unwrap();

        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.payment_intent_id(), Some("pi_3Nabc"));
    }
}
