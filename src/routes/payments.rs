//! Payment routes
//!
//! Checkout creates (or reuses) a gateway payment intent for a pending booking.
//! Status changes arrive through the webhook or an explicit sync; both go
//! through [`apply_payment_status`].

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::bookings::{authorize_booking, fetch_booking, fetch_payments, BookingRow};
use crate::api::{Created, DataResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::bookings::BookingStatus;
use crate::domain::payments::{
    open_intent_action, settle_success, CheckoutResponse, OpenIntentAction, PaymentResponse,
    PaymentStatus, SuccessOutcome,
};
use crate::domain::pricing::to_minor_units;
use crate::error::ApiError;
use crate::services::payments::{PaymentGateway, PaymentIntent};

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PaymentRow {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub gateway: String,
    pub gateway_payment_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub refund_id: Option<String>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRow {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::parse(&self.status)
    }
}

impl From<PaymentRow> for PaymentResponse {
    fn from(row: PaymentRow) -> Self {
        let status = row.status();
        Self {
            id: row.id,
            booking_id: row.booking_id,
            gateway: row.gateway,
            gateway_payment_id: row.gateway_payment_id,
            amount: row.amount,
            currency: row.currency,
            status,
            refund_id: row.refund_id,
            refund_requested_at: row.refund_requested_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) const PAYMENT_COLUMNS: &str = "id, booking_id, gateway, gateway_payment_id, amount, \
    currency, status, refund_id, refund_requested_at, created_at, updated_at";

pub(crate) async fn fetch_payment_by_intent(
    db: &sqlx::PgPool,
    intent_id: &str,
) -> Result<Option<PaymentRow>, ApiError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payments WHERE gateway_payment_id = $1",
        PAYMENT_COLUMNS
    ))
    .bind(intent_id)
    .fetch_optional(db)
    .await?;

    Ok(row)
}

/// Refund a succeeded payment at the gateway and record it.
///
/// The gateway call is keyed by intent, so repeating it after a partial
/// failure does not refund twice.
pub(crate) async fn refund_payment(
    state: &AppState,
    payment: PaymentRow,
) -> Result<PaymentRow, ApiError> {
    let refund = state.payments.refund(&payment.gateway_payment_id).await?;

    let refunded = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        UPDATE payments SET status = 'refunded', refund_id = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'succeeded'
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    ))
    .bind(payment.id)
    .bind(&refund.id)
    .fetch_optional(&state.db)
    .await?;

    tracing::info!(
        payment_id = %payment.id,
        booking_id = %payment.booking_id,
        refund_id = %refund.id,
        refund_status = %refund.status,
        "Payment refunded"
    );

    match refunded {
        Some(row) => Ok(row),
        None => fetch_payment_by_intent(&state.db, &payment.gateway_payment_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Payment not found")),
    }
}

/// Move a payment to `next` if the transition is allowed.
///
/// A success confirms a pending booking in the same transaction. A success for
/// a booking that was cancelled, or already paid by another payment, is flagged
/// for refund and refunded straight away. A flagged payment that is seen again
/// retries the refund.
pub(crate) async fn apply_payment_status(
    state: &AppState,
    payment: PaymentRow,
    next: PaymentStatus,
) -> Result<PaymentRow, ApiError> {
    let current = payment.status();
    if !current.accepts(next) {
        if current == PaymentStatus::Succeeded && payment.refund_requested_at.is_some() {
            tracing::info!(payment_id = %payment.id, "Retrying requested refund");
            return refund_payment(state, payment).await;
        }
        tracing::debug!(
            payment_id = %payment.id,
            current = current.as_str(),
            next = next.as_str(),
            "Ignoring payment status change"
        );
        return Ok(payment);
    }

    let mut tx = state.db.begin().await?;

    // Bookings are locked before their payments, as in cancellation
    let booking_status: String =
        sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(payment.booking_id)
            .fetch_one(&mut *tx)
            .await?;
    let booking_status = BookingStatus::parse(&booking_status).unwrap_or(BookingStatus::Pending);

    let updated = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        UPDATE payments SET status = $2, updated_at = NOW()
        WHERE id = $1 AND status = $3
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    ))
    .bind(payment.id)
    .bind(next.as_str())
    .bind(current.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(mut updated) = updated else {
        // Lost a race with another update; report whatever is stored now
        tx.rollback().await?;
        return fetch_payment_by_intent(&state.db, &payment.gateway_payment_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Payment not found"));
    };

    if next == PaymentStatus::Succeeded {
        let paid_by_other: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM payments
                WHERE booking_id = $1 AND id <> $2
                AND status = 'succeeded' AND refund_requested_at IS NULL
            )
            "#,
        )
        .bind(updated.booking_id)
        .bind(updated.id)
        .fetch_one(&mut *tx)
        .await?;

        match settle_success(booking_status, paid_by_other) {
            SuccessOutcome::ConfirmBooking => {
                sqlx::query(
                    "UPDATE bookings SET status = 'confirmed', updated_at = NOW() WHERE id = $1",
                )
                .bind(updated.booking_id)
                .execute(&mut *tx)
                .await?;
            }
            SuccessOutcome::KeepBooking => {}
            SuccessOutcome::Refund(reason) => {
                updated = sqlx::query_as::<_, PaymentRow>(&format!(
                    r#"
                    UPDATE payments SET refund_requested_at = NOW(), updated_at = NOW()
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    PAYMENT_COLUMNS
                ))
                .bind(updated.id)
                .fetch_one(&mut *tx)
                .await?;

                tracing::warn!(
                    payment_id = %updated.id,
                    booking_id = %updated.booking_id,
                    reason = reason.as_str(),
                    "Payment succeeded but is not needed; refunding"
                );
            }
        }
    }

    tx.commit().await?;

    tracing::info!(
        payment_id = %updated.id,
        booking_id = %updated.booking_id,
        status = next.as_str(),
        "Payment status updated"
    );

    if updated.refund_requested_at.is_some() {
        return refund_payment(state, updated).await;
    }
    Ok(updated)
}

/// A booking's open intent, as found at checkout
#[derive(Debug)]
pub(crate) enum OpenIntent {
    Reuse(PaymentIntent),
    /// No longer chargeable; record this status and start a new intent
    Closed(PaymentStatus),
}

/// Look up an open intent at the gateway. One that no longer charges the
/// booking's total is cancelled so it cannot be paid alongside its replacement.
pub(crate) async fn resolve_open_intent(
    gateway: &dyn PaymentGateway,
    intent_id: &str,
    amount_minor: i64,
    currency: &str,
) -> Result<OpenIntent, ApiError> {
    let intent = gateway.retrieve_intent(intent_id).await?;
    let same_charge =
        intent.amount == amount_minor && intent.currency.eq_ignore_ascii_case(currency);

    match open_intent_action(&intent.status, same_charge) {
        OpenIntentAction::Reuse => Ok(OpenIntent::Reuse(intent)),
        OpenIntentAction::Wait => Err(ApiError::conflict(
            "A payment for this booking is being processed",
        )),
        OpenIntentAction::Settle => Ok(OpenIntent::Closed(PaymentStatus::from_intent_status(
            &intent.status,
        ))),
        OpenIntentAction::Cancel => {
            let cancelled = gateway.cancel_intent(&intent.id).await?;
            tracing::info!(
                intent_id = %intent.id,
                old_amount = intent.amount,
                new_amount = amount_minor,
                "Cancelled payment intent for an outdated amount"
            );
            Ok(OpenIntent::Closed(PaymentStatus::from_intent_status(
                &cancelled.status,
            )))
        }
    }
}

fn idempotency_key(booking: &BookingRow, attempt: usize) -> String {
    format!("booking-{}-{}-{}", booking.id, booking.total_price, attempt)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /bookings/:id/payments
///
/// Start checkout for a pending booking. An open intent is reused so repeated
/// clicks do not create duplicate charges.
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = fetch_booking(&state.db, booking_id).await?;
    if booking.user_id != auth.user_id {
        return Err(ApiError::not_found("Booking not found"));
    }
    if booking.status() != BookingStatus::Pending {
        return Err(ApiError::conflict("Booking is not awaiting payment"));
    }

    let existing = fetch_payments(&state.db, booking.id).await?;
    if let Some(open) = existing
        .iter()
        .find(|p| p.status() == PaymentStatus::Pending)
    {
        let open_intent = resolve_open_intent(
            state.payments.as_ref(),
            &open.gateway_payment_id,
            to_minor_units(booking.total_price),
            &booking.currency,
        )
        .await?;

        match open_intent {
            OpenIntent::Reuse(intent) => {
                tracing::info!(booking_id = %booking.id, payment_id = %open.id, "Reusing open payment intent");
                return Ok(Created(CheckoutResponse {
                    payment: open.clone().into(),
                    client_secret: intent.client_secret,
                }));
            }
            OpenIntent::Closed(status) => {
                let settled = apply_payment_status(&state, open.clone(), status).await?;
                if settled.status() == PaymentStatus::Succeeded {
                    return Err(ApiError::conflict("Booking has already been paid"));
                }
            }
        }
    }

    let intent = state
        .payments
        .create_intent(
            to_minor_units(booking.total_price),
            &booking.currency,
            &[
                ("booking_id", booking.id.to_string()),
                ("reference", booking.reference.clone()),
            ],
            &idempotency_key(&booking, existing.len()),
        )
        .await?;

    let payment = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        INSERT INTO payments (id, booking_id, gateway, gateway_payment_id, amount, currency, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending')
        ON CONFLICT (gateway_payment_id) DO UPDATE SET updated_at = NOW()
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(booking.id)
    .bind(state.payments.name())
    .bind(&intent.id)
    .bind(booking.total_price)
    .bind(&booking.currency)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        booking_id = %booking.id,
        payment_id = %payment.id,
        intent_id = %intent.id,
        amount = %payment.amount,
        "Payment intent created"
    );

    Ok(Created(CheckoutResponse {
        payment: payment.into(),
        client_secret: intent.client_secret,
    }))
}

/// GET /bookings/:id/payments
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = fetch_booking(&state.db, booking_id).await?;
    authorize_booking(&state.db, &auth, &booking).await?;

    let payments: Vec<PaymentResponse> = fetch_payments(&state.db, booking.id)
        .await?
        .into_iter()
        .map(PaymentResponse::from)
        .collect();

    Ok(Json(DataResponse::new(payments)))
}

/// POST /payments/:id/sync
///
/// Pull the intent status from the gateway, for when a webhook was missed.
/// Also retries a refund that was requested but did not go through.
pub async fn sync_payment(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payments WHERE id = $1",
        PAYMENT_COLUMNS
    ))
    .bind(payment_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Payment not found"))?;

    let booking = fetch_booking(&state.db, payment.booking_id).await?;
    authorize_booking(&state.db, &auth, &booking)
        .await
        .map_err(|_| ApiError::not_found("Payment not found"))?;

    let intent = state.payments.retrieve_intent(&payment.gateway_payment_id).await?;
    let next = PaymentStatus::from_intent_status(&intent.status);
    let payment = apply_payment_status(&state, payment, next).await?;

    Ok(Json(DataResponse::new(PaymentResponse::from(payment))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payments::Refund;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Gateway holding one intent; records cancellations and refunds
    struct FakeGateway {
        intent: Mutex<PaymentIntent>,
        cancelled: Mutex<Vec<String>>,
        refunded: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn with_intent(status: &str, amount: i64) -> Self {
            Self {
                intent: Mutex::new(PaymentIntent {
                    id: "pi_open".to_string(),
                    client_secret: Some("pi_open_secret".to_string()),
                    status: status.to_string(),
                    amount,
                    currency: "eur".to_string(),
                }),
                cancelled: Mutex::new(Vec::new()),
                refunded: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn create_intent(
            &self,
            _: i64,
            _: &str,
            _: &[(&str, String)],
            _: &str,
        ) -> Result<PaymentIntent, ApiError> {
            Err(ApiError::upstream("not used"))
        }

        async fn retrieve_intent(&self, _: &str) -> Result<PaymentIntent, ApiError> {
            Ok(self.intent.lock().clone())
        }

        async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent, ApiError> {
            self.cancelled.lock().push(intent_id.to_string());
            let mut intent = self.intent.lock();
            intent.status = "canceled".to_string();
            Ok(intent.clone())
        }

        async fn refund(&self, intent_id: &str) -> Result<Refund, ApiError> {
            self.refunded.lock().push(intent_id.to_string());
            Ok(Refund {
                id: format!("re_{}", intent_id),
                status: "succeeded".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn checkout_reuses_a_fresh_intent() {
        let gateway = FakeGateway::with_intent("requires_payment_method", 24_950);

        let open = resolve_open_intent(&gateway, "pi_open", 24_950, "EUR").await.unwrap();
        match open {
            OpenIntent::Reuse(intent) => {
                assert_eq!(intent.client_secret.as_deref(), Some("pi_open_secret"))
            }
            other => panic!("expected reuse, got {:?}", other),
        }
        assert!(gateway.cancelled.lock().is_empty());
    }

    #[tokio::test]
    async fn checkout_cancels_an_intent_for_an_old_amount() {
        let gateway = FakeGateway::with_intent("requires_payment_method", 19_900);

        let open = resolve_open_intent(&gateway, "pi_open", 24_950, "EUR").await.unwrap();
        assert!(matches!(open, OpenIntent::Closed(PaymentStatus::Failed)));
        assert_eq!(*gateway.cancelled.lock(), vec!["pi_open".to_string()]);
    }

    #[tokio::test]
    async fn checkout_waits_for_processing_payments() {
        let gateway = FakeGateway::with_intent("processing", 19_900);

        let result = resolve_open_intent(&gateway, "pi_open", 24_950, "EUR").await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));
        assert!(gateway.cancelled.lock().is_empty());
    }

    #[tokio::test]
    async fn checkout_records_a_paid_intent() {
        let gateway = FakeGateway::with_intent("succeeded", 24_950);

        let open = resolve_open_intent(&gateway, "pi_open", 24_950, "EUR").await.unwrap();
        assert!(matches!(open, OpenIntent::Closed(PaymentStatus::Succeeded)));
        assert!(gateway.cancelled.lock().is_empty());
        assert!(gateway.refunded.lock().is_empty());
    }

    fn row(status: &str) -> PaymentRow {
        PaymentRow {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            gateway: "stripe".to_string(),
            gateway_payment_id: "pi_123".to_string(),
            amount: Decimal::new(24_950, 2),
            currency: "EUR".to_string(),
            status: status.to_string(),
            refund_id: None,
            refund_requested_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rows_map_to_responses() {
        let response = PaymentResponse::from(row("succeeded"));
        assert_eq!(response.status, PaymentStatus::Succeeded);
        assert_eq!(response.amount.to_string(), "249.50");

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("refund_id").is_none());
        assert!(json.get("refund_requested_at").is_none());
    }

    #[test]
    fn unknown_statuses_read_as_pending() {
        assert_eq!(row("processing").status(), PaymentStatus::Pending);
    }
}
