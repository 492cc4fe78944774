//! Payment domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bookings::BookingStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "refunded" => Self::Refunded,
            _ => Self::Pending,
        }
    }

    /// Map a gateway payment-intent status onto ours.
    ///
    /// A fresh intent sits in `requires_payment_method` until the customer pays,
    /// and returns there after a declined attempt, so only `canceled` is final.
    pub fn from_intent_status(status: &str) -> Self {
        match status {
            "succeeded" => Self::Succeeded,
            "canceled" => Self::Failed,
            // requires_payment_method, requires_confirmation, requires_action,
            // processing, requires_capture
            _ => Self::Pending,
        }
    }

    /// Whether moving to `next` is a real change that should be persisted.
    /// Refunded is final; a succeeded payment only moves on by refund.
    pub fn accepts(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Succeeded) | (Pending, Failed) | (Failed, Succeeded) | (Succeeded, Refunded)
        )
    }
}

/// What checkout does with a booking's open intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenIntentAction {
    /// Hand the same client secret out again
    Reuse,
    /// The charge no longer matches the booking; cancel it and start over
    Cancel,
    /// The customer's payment is in flight; wait for it to settle
    Wait,
    /// The intent already reached a final status; record it
    Settle,
}

/// Decide from the gateway's intent status and whether the intent still charges
/// the booking's total.
pub fn open_intent_action(intent_status: &str, same_charge: bool) -> OpenIntentAction {
    match intent_status {
        "succeeded" | "canceled" => OpenIntentAction::Settle,
        "processing" => OpenIntentAction::Wait,
        _ if same_charge => OpenIntentAction::Reuse,
        _ => OpenIntentAction::Cancel,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundReason {
    BookingCancelled,
    AlreadyPaid,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookingCancelled => "booking_cancelled",
            Self::AlreadyPaid => "already_paid",
        }
    }
}

/// Effect of a payment succeeding on its booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessOutcome {
    ConfirmBooking,
    /// The booking was confirmed some other way; nothing to do
    KeepBooking,
    Refund(RefundReason),
}

/// `paid_by_other` is whether another payment of the same booking already
/// succeeded. Only the first success is kept.
pub fn settle_success(booking: BookingStatus, paid_by_other: bool) -> SuccessOutcome {
    match booking {
        BookingStatus::Cancelled => SuccessOutcome::Refund(RefundReason::BookingCancelled),
        _ if paid_by_other => SuccessOutcome::Refund(RefundReason::AlreadyPaid),
        BookingStatus::Pending => SuccessOutcome::ConfirmBooking,
        BookingStatus::Confirmed | BookingStatus::CheckedIn => SuccessOutcome::KeepBooking,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub gateway: String,
    pub gateway_payment_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    /// Set when a refund was decided but has not gone through yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned when a checkout is started; the client confirms with the secret
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub payment: PaymentResponse,
    pub client_secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_statuses_map_onto_payment_statuses() {
        assert_eq!(PaymentStatus::from_intent_status("succeeded"), PaymentStatus::Succeeded);
        assert_eq!(PaymentStatus::from_intent_status("canceled"), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_intent_status("processing"), PaymentStatus::Pending);
    }

    #[test]
    fn unpaid_intents_stay_pending() {
        for status in [
            "requires_payment_method",
            "requires_confirmation",
            "requires_action",
            "requires_capture",
        ] {
            assert_eq!(PaymentStatus::from_intent_status(status), PaymentStatus::Pending, "{status}");
        }
    }

    #[test]
    fn checkout_reuses_only_matching_unpaid_intents() {
        assert_eq!(open_intent_action("requires_payment_method", true), OpenIntentAction::Reuse);
        assert_eq!(open_intent_action("requires_action", true), OpenIntentAction::Reuse);
        assert_eq!(open_intent_action("requires_payment_method", false), OpenIntentAction::Cancel);
        assert_eq!(open_intent_action("requires_confirmation", false), OpenIntentAction::Cancel);
        assert_eq!(open_intent_action("processing", true), OpenIntentAction::Wait);
        assert_eq!(open_intent_action("processing", false), OpenIntentAction::Wait);
        assert_eq!(open_intent_action("succeeded", true), OpenIntentAction::Settle);
        assert_eq!(open_intent_action("canceled", false), OpenIntentAction::Settle);
    }

    #[test]
    fn first_success_confirms_and_later_ones_are_refunded() {
        assert_eq!(
            settle_success(BookingStatus::Pending, false),
            SuccessOutcome::ConfirmBooking
        );
        assert_eq!(
            settle_success(BookingStatus::Confirmed, true),
            SuccessOutcome::Refund(RefundReason::AlreadyPaid)
        );
        assert_eq!(
            settle_success(BookingStatus::Pending, true),
            SuccessOutcome::Refund(RefundReason::AlreadyPaid)
        );
        assert_eq!(
            settle_success(BookingStatus::Confirmed, false),
            SuccessOutcome::KeepBooking
        );
        assert_eq!(
            settle_success(BookingStatus::CheckedIn, false),
            SuccessOutcome::KeepBooking
        );
    }

    #[test]
    fn success_on_a_cancelled_booking_is_refunded() {
        for paid_by_other in [false, true] {
            assert_eq!(
                settle_success(BookingStatus::Cancelled, paid_by_other),
                SuccessOutcome::Refund(RefundReason::BookingCancelled)
            );
        }
    }

    #[test]
    fn repeated_updates_are_not_changes() {
        assert!(PaymentStatus::Pending.accepts(PaymentStatus::Succeeded));
        assert!(!PaymentStatus::Succeeded.accepts(PaymentStatus::Succeeded));
        assert!(!PaymentStatus::Succeeded.accepts(PaymentStatus::Failed));
        assert!(!PaymentStatus::Refunded.accepts(PaymentStatus::Succeeded));
        assert!(PaymentStatus::Succeeded.accepts(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Failed.accepts(PaymentStatus::Failed));
    }
}
