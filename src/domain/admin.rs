//! Admin domain types
//!
//! Types for back-office operations over users and bookings, plus audit logging.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bookings::BookingStatus;
use super::users::{Role, UserResponse};

/// Admin action types for audit logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    UpdateUser,
    ChangeUserRole,
    DeleteUser,
    UpdateBookingStatus,
    CancelBooking,
    VerifyTicket,
}

impl std::fmt::Display for AdminAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// Target types for audit logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditTargetType {
    User,
    Booking,
    Ticket,
}

impl std::fmt::Display for AuditTargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// Response DTO for audit log
#[derive(Debug, Clone, Serialize)]
pub struct AdminAuditLogResponse {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub admin_email: Option<String>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin dashboard stats
#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub admin_users: i64,
    pub recent_signups_7d: i64,
    pub total_bookings: i64,
    pub pending_bookings: i64,
    pub confirmed_bookings: i64,
    pub checked_in_bookings: i64,
    pub cancelled_bookings: i64,
    pub recent_bookings_7d: i64,
    pub revenue: Vec<RevenueByCurrency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueByCurrency {
    pub currency: String,
    pub collected: Decimal,
    pub refunded: Decimal,
    pub net: Decimal,
}

/// Query params for audit log
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    #[serde(default)]
    pub admin_id: Option<Uuid>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub target_id: Option<Uuid>,
    #[serde(default)]
    pub from_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to_date: Option<DateTime<Utc>>,
}

/// Query params for the user list
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminUserQuery {
    /// Matches email or name
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminUpdateUserRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// User with booking activity, for the user detail view
#[derive(Debug, Clone, Serialize)]
pub struct AdminUserDetail {
    #[serde(flatten)]
    pub user: UserResponse,
    pub booking_count: i64,
    pub active_booking_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_labels_are_snake_case() {
        assert_eq!(AdminAction::UpdateBookingStatus.to_string(), "update_booking_status");
        assert_eq!(AuditTargetType::Booking.to_string(), "booking");
    }
}
