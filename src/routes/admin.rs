//! Admin routes
//!
//! Protected back-office endpoints for:
//! - Dashboard statistics
//! - User management
//! - Booking management (status changes follow the booking lifecycle)
//! - Read-only views of the airline, airport and flight status mirrors
//! - Audit log viewing
//!
//! All routes require the `admin` role. Every mutation writes an audit entry.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

use super::auth::{fetch_user, UserRow, USER_COLUMNS};
use super::bookings::{booking_detail, cancel_booking_row, fetch_booking, BookingRow, BOOKING_COLUMNS};
use super::flights::{FlightStatusRow, FLIGHT_STATUS_COLUMNS};
use super::reference::{list_airlines_page, list_airports_page};
use crate::api::{DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAdmin;
use crate::domain::admin::*;
use crate::domain::bookings::{validate_transition, BookingQuery, BookingResponse, BookingStatus};
use crate::domain::checkin::validate_check_in;
use crate::domain::reference::{FlightStatus, ReferenceQuery};
use crate::domain::users::{Role, UserResponse};
use crate::error::ApiError;

// ============================================================================
// Audit Logging
// ============================================================================

/// Client details recorded with each audit entry
#[derive(Debug, Clone, Default)]
pub struct AuditMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditMeta {
    fn from_parts(parts: &Parts) -> Self {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        // First hop of X-Forwarded-For is the client when behind a proxy
        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .or_else(|| header("x-real-ip"))
            .map(str::to_string);

        Self {
            ip_address,
            user_agent: header("user-agent").map(str::to_string),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuditMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Log an admin action to the audit log
pub(crate) async fn log_admin_action(
    db: &sqlx::PgPool,
    admin_id: Uuid,
    action: AdminAction,
    target_type: AuditTargetType,
    target_id: Option<Uuid>,
    details: serde_json::Value,
    meta: &AuditMeta,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO admin_audit_log (id, admin_id, action, target_type, target_id, details, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(admin_id)
    .bind(action.to_string())
    .bind(target_type.to_string())
    .bind(target_id)
    .bind(&details)
    .bind(meta.ip_address.as_deref())
    .bind(meta.user_agent.as_deref())
    .execute(db)
    .await?;

    tracing::info!(
        admin_id = %admin_id,
        action = %action,
        target_type = %target_type,
        target_id = ?target_id,
        "Admin action logged"
    );

    Ok(())
}

/// Audit failures are logged rather than failing an action that already happened
async fn audit(
    state: &AppState,
    admin: &RequireAdmin,
    meta: &AuditMeta,
    action: AdminAction,
    target_type: AuditTargetType,
    target_id: Option<Uuid>,
    details: serde_json::Value,
) {
    if let Err(e) = log_admin_action(
        &state.db,
        admin.user_id(),
        action,
        target_type,
        target_id,
        details,
        meta,
    )
    .await
    {
        tracing::error!(error = %e, action = %action, "Failed to write audit log");
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AuditLogRow {
    id: Uuid,
    admin_id: Uuid,
    admin_email: Option<String>,
    action: String,
    target_type: String,
    target_id: Option<Uuid>,
    details: serde_json::Value,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditLogRow> for AdminAuditLogResponse {
    fn from(r: AuditLogRow) -> Self {
        Self {
            id: r.id,
            admin_id: r.admin_id,
            admin_email: r.admin_email,
            action: r.action,
            target_type: r.target_type,
            target_id: r.target_id,
            details: r.details,
            ip_address: r.ip_address,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserCountsRow {
    total_users: i64,
    admin_users: i64,
    recent_signups_7d: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct BookingCountsRow {
    total_bookings: i64,
    pending_bookings: i64,
    confirmed_bookings: i64,
    checked_in_bookings: i64,
    cancelled_bookings: i64,
    recent_bookings_7d: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct RevenueRow {
    currency: String,
    collected: Decimal,
    refunded: Decimal,
}

impl From<RevenueRow> for RevenueByCurrency {
    fn from(r: RevenueRow) -> Self {
        Self {
            currency: r.currency,
            collected: r.collected,
            refunded: r.refunded,
            net: r.collected - r.refunded,
        }
    }
}

/// `%term%` for ILIKE, or `None` when there is nothing to match
fn like_pattern(q: Option<&str>) -> Option<String> {
    q.map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q))
}

// ============================================================================
// Admin Dashboard
// ============================================================================

/// GET /admin/check
///
/// 200 for admins, 403 otherwise. Lets the frontend gate the back-office.
pub async fn check_admin(_admin: RequireAdmin) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(serde_json::json!({ "is_admin": true })))
}

/// GET /admin/stats
pub async fn get_admin_stats(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
) -> Result<impl IntoResponse, ApiError> {
    let users = sqlx::query_as::<_, UserCountsRow>(
        r#"
        SELECT
            COUNT(*) AS total_users,
            COUNT(*) FILTER (WHERE role = 'admin') AS admin_users,
            COUNT(*) FILTER (WHERE created_at > NOW() - INTERVAL '7 days') AS recent_signups_7d
        FROM users
        "#,
    )
    .fetch_one(&state.db)
    .await?;

    let bookings = sqlx::query_as::<_, BookingCountsRow>(
        r#"
        SELECT
            COUNT(*) AS total_bookings,
            COUNT(*) FILTER (WHERE status = 'pending') AS pending_bookings,
            COUNT(*) FILTER (WHERE status = 'confirmed') AS confirmed_bookings,
            COUNT(*) FILTER (WHERE status = 'checked_in') AS checked_in_bookings,
            COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled_bookings,
            COUNT(*) FILTER (WHERE created_at > NOW() - INTERVAL '7 days') AS recent_bookings_7d
        FROM bookings
        "#,
    )
    .fetch_one(&state.db)
    .await?;

    // Refunded payments were collected first, so they count on both sides
    let revenue = sqlx::query_as::<_, RevenueRow>(
        r#"
        SELECT
            currency,
            COALESCE(SUM(amount) FILTER (WHERE status IN ('succeeded', 'refunded')), 0) AS collected,
            COALESCE(SUM(amount) FILTER (WHERE status = 'refunded'), 0) AS refunded
        FROM payments
        GROUP BY currency
        ORDER BY currency
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let stats = AdminDashboardStats {
        total_users: users.total_users,
        admin_users: users.admin_users,
        recent_signups_7d: users.recent_signups_7d,
        total_bookings: bookings.total_bookings,
        pending_bookings: bookings.pending_bookings,
        confirmed_bookings: bookings.confirmed_bookings,
        checked_in_bookings: bookings.checked_in_bookings,
        cancelled_bookings: bookings.cancelled_bookings,
        recent_bookings_7d: bookings.recent_bookings_7d,
        revenue: revenue.into_iter().map(RevenueByCurrency::from).collect(),
    };

    Ok(Json(DataResponse::new(stats)))
}

// ============================================================================
// User Management
// ============================================================================

/// GET /admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<AdminUserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pattern = like_pattern(filter.q.as_deref());
    let role = filter.role.map(|r| r.as_str());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM users
        WHERE ($1::text IS NULL OR email ILIKE $1 OR (first_name || ' ' || last_name) ILIKE $1)
        AND ($2::text IS NULL OR role = $2)
        "#,
    )
    .bind(&pattern)
    .bind(role)
    .fetch_one(&state.db)
    .await?;

    let rows = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {} FROM users
        WHERE ($1::text IS NULL OR email ILIKE $1 OR (first_name || ' ' || last_name) ILIKE $1)
        AND ($2::text IS NULL OR role = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
        USER_COLUMNS
    ))
    .bind(&pattern)
    .bind(role)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data: Vec<UserResponse> = rows.into_iter().map(UserResponse::from).collect();
    Ok(Paginated::new(data, &pagination, total))
}

async fn user_detail(db: &sqlx::PgPool, user: UserRow) -> Result<AdminUserDetail, ApiError> {
    let (booking_count, active_booking_count): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE status IN ('pending', 'confirmed', 'checked_in'))
        FROM bookings WHERE user_id = $1
        "#,
    )
    .bind(user.id)
    .fetch_one(db)
    .await?;

    Ok(AdminUserDetail {
        user: user.into(),
        booking_count,
        active_booking_count,
    })
}

/// GET /admin/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = fetch_user(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(DataResponse::new(user_detail(&state.db, user).await?)))
}

/// PATCH /admin/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    meta: AuditMeta,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if matches!(req.first_name.as_deref(), Some(n) if n.trim().is_empty())
        || matches!(req.last_name.as_deref(), Some(n) if n.trim().is_empty())
    {
        return Err(ApiError::bad_request("Names cannot be blank"));
    }

    let existing = fetch_user(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let previous_role = Role::parse(&existing.role);

    let role_change = req.role.filter(|r| *r != previous_role);
    if role_change.is_some() && user_id == admin.user_id() {
        return Err(ApiError::forbidden("Admins cannot change their own role"));
    }

    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        UPDATE users SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            phone = CASE WHEN $4::text IS NULL THEN phone ELSE NULLIF($4, '') END,
            role = COALESCE($5, role),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(req.phone.as_deref().map(str::trim))
    .bind(role_change.map(|r| r.as_str()))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    let action = if role_change.is_some() {
        AdminAction::ChangeUserRole
    } else {
        AdminAction::UpdateUser
    };
    audit(
        &state,
        &admin,
        &meta,
        action,
        AuditTargetType::User,
        Some(user_id),
        serde_json::json!({
            "email": row.email,
            "previous_role": previous_role.as_str(),
            "role": row.role,
            "fields": {
                "first_name": req.first_name.is_some(),
                "last_name": req.last_name.is_some(),
                "phone": req.phone.is_some(),
            },
        }),
    )
    .await;

    Ok(Json(DataResponse::new(user_detail(&state.db, row).await?)))
}

/// Why a user cannot be deleted, if anything stops it.
///
/// Active bookings still fly; any payment row is financial history that the
/// delete would cascade away.
fn deletion_blocker(active_bookings: i64, payments: i64) -> Option<String> {
    if active_bookings > 0 {
        Some(format!(
            "User holds {} active booking(s); cancel them first",
            active_bookings
        ))
    } else if payments > 0 {
        Some(format!("User has {} payment record(s)", payments))
    } else {
        None
    }
}

/// DELETE /admin/users/:id
///
/// Refused for the caller, for users with active bookings and for users with
/// any payment history.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    meta: AuditMeta,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if user_id == admin.user_id() {
        return Err(ApiError::forbidden("Admins cannot delete their own account"));
    }

    let user = fetch_user(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let mut tx = state.db.begin().await?;

    // Row locks keep new bookings and payments out until the delete commits
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let (active_bookings, payments): (i64, i64) = sqlx::query_as(
        r#"
        WITH owned AS (
            SELECT id, status FROM bookings WHERE user_id = $1 FOR UPDATE
        )
        SELECT
            (SELECT COUNT(*) FROM owned WHERE status IN ('pending', 'confirmed', 'checked_in')),
            (SELECT COUNT(*) FROM payments WHERE booking_id IN (SELECT id FROM owned))
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(reason) = deletion_blocker(active_bookings, payments) {
        tx.rollback().await?;
        return Err(ApiError::conflict(reason));
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    audit(
        &state,
        &admin,
        &meta,
        AdminAction::DeleteUser,
        AuditTargetType::User,
        Some(user_id),
        serde_json::json!({ "email": user.email }),
    )
    .await;

    Ok(NoContent)
}

// ============================================================================
// Booking Management
// ============================================================================

/// GET /admin/bookings
///
/// `q` matches the reference, contact email or flight number.
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<BookingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pattern = like_pattern(filter.q.as_deref());
    let status = filter.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM bookings
        WHERE ($1::text IS NULL OR reference ILIKE $1 OR contact_email ILIKE $1 OR flight_number ILIKE $1)
        AND ($2::text IS NULL OR status = $2)
        "#,
    )
    .bind(&pattern)
    .bind(status)
    .fetch_one(&state.db)
    .await?;

    let rows = sqlx::query_as::<_, BookingRow>(&format!(
        r#"
        SELECT {} FROM bookings
        WHERE ($1::text IS NULL OR reference ILIKE $1 OR contact_email ILIKE $1 OR flight_number ILIKE $1)
        AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
        BOOKING_COLUMNS
    ))
    .bind(&pattern)
    .bind(status)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data: Vec<BookingResponse> = rows.into_iter().map(BookingResponse::from).collect();
    Ok(Paginated::new(data, &pagination, total))
}

/// GET /admin/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = fetch_booking(&state.db, booking_id).await?;
    Ok(Json(DataResponse::new(booking_detail(&state.db, booking).await?)))
}

/// Checks an admin status change against the same rules customers face.
/// Check-in keeps its time window.
fn validate_status_change(
    booking: &BookingRow,
    next: BookingStatus,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    validate_transition(booking.status(), next)?;
    if next == BookingStatus::CheckedIn {
        validate_check_in(booking.status(), booking.departure_at, now)?;
    }
    Ok(())
}

/// PATCH /admin/bookings/:id/status
///
/// Cancelling goes through the same path as a customer cancellation, so a paid
/// booking is refunded.
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    meta: AuditMeta,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<UpdateBookingStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = fetch_booking(&state.db, booking_id).await?;
    let previous = booking.status();
    validate_status_change(&booking, req.status, Utc::now())?;

    let updated = if req.status == BookingStatus::Cancelled {
        cancel_booking_row(&state, &booking, req.reason.as_deref()).await?
    } else {
        sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            UPDATE bookings SET
                status = $3,
                checked_in_at = CASE WHEN $3 = 'checked_in' THEN NOW() ELSE checked_in_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(booking.id)
        .bind(previous.as_str())
        .bind(req.status.as_str())
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::conflict("Booking was modified concurrently; try again"))?
    };

    tracing::info!(
        admin_id = %admin.user_id(),
        booking_id = %booking.id,
        from = previous.as_str(),
        to = req.status.as_str(),
        "Booking status changed by admin"
    );

    audit(
        &state,
        &admin,
        &meta,
        AdminAction::UpdateBookingStatus,
        AuditTargetType::Booking,
        Some(booking.id),
        serde_json::json!({
            "reference": booking.reference,
            "from": previous.as_str(),
            "to": req.status.as_str(),
            "reason": req.reason,
        }),
    )
    .await;

    Ok(Json(DataResponse::new(booking_detail(&state.db, updated).await?)))
}

// ============================================================================
// Reference Data Mirrors
// ============================================================================

/// GET /admin/airlines
pub async fn list_airlines(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ReferenceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    list_airlines_page(&state.db, &pagination, &filter).await
}

/// GET /admin/airports
pub async fn list_airports(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ReferenceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    list_airports_page(&state.db, &pagination, &filter).await
}

/// GET /admin/flights
///
/// Mirrored flight statuses, most recent first.
pub async fn list_flights(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ReferenceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pattern = like_pattern(filter.q.as_deref());

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM flight_statuses WHERE ($1::text IS NULL OR flight_iata ILIKE $1)",
    )
    .bind(&pattern)
    .fetch_one(&state.db)
    .await?;

    let rows = sqlx::query_as::<_, FlightStatusRow>(&format!(
        r#"
        SELECT {} FROM flight_statuses
        WHERE ($1::text IS NULL OR flight_iata ILIKE $1)
        ORDER BY flight_date DESC, fetched_at DESC
        LIMIT $2 OFFSET $3
        "#,
        FLIGHT_STATUS_COLUMNS
    ))
    .bind(&pattern)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data: Vec<FlightStatus> = rows.into_iter().map(FlightStatus::from).collect();
    Ok(Paginated::new(data, &pagination, total))
}

// ============================================================================
// Audit Log
// ============================================================================

/// GET /admin/audit-log
pub async fn list_audit_log(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM admin_audit_log a
        WHERE ($1::uuid IS NULL OR a.admin_id = $1)
        AND ($2::text IS NULL OR a.action = $2)
        AND ($3::text IS NULL OR a.target_type = $3)
        AND ($4::uuid IS NULL OR a.target_id = $4)
        AND ($5::timestamptz IS NULL OR a.created_at >= $5)
        AND ($6::timestamptz IS NULL OR a.created_at <= $6)
        "#,
    )
    .bind(filter.admin_id)
    .bind(&filter.action)
    .bind(&filter.target_type)
    .bind(filter.target_id)
    .bind(filter.from_date)
    .bind(filter.to_date)
    .fetch_one(&state.db)
    .await?;

    let rows = sqlx::query_as::<_, AuditLogRow>(
        r#"
        SELECT
            a.id, a.admin_id, u.email AS admin_email,
            a.action, a.target_type, a.target_id, a.details, a.ip_address, a.created_at
        FROM admin_audit_log a
        LEFT JOIN users u ON a.admin_id = u.id
        WHERE ($1::uuid IS NULL OR a.admin_id = $1)
        AND ($2::text IS NULL OR a.action = $2)
        AND ($3::text IS NULL OR a.target_type = $3)
        AND ($4::uuid IS NULL OR a.target_id = $4)
        AND ($5::timestamptz IS NULL OR a.created_at >= $5)
        AND ($6::timestamptz IS NULL OR a.created_at <= $6)
        ORDER BY a.created_at DESC
        LIMIT $7 OFFSET $8
        "#,
    )
    .bind(filter.admin_id)
    .bind(&filter.action)
    .bind(&filter.target_type)
    .bind(filter.target_id)
    .bind(filter.from_date)
    .bind(filter.to_date)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data: Vec<AdminAuditLogResponse> =
        rows.into_iter().map(AdminAuditLogResponse::from).collect();
    Ok(Paginated::new(data, &pagination, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::bookings::tests::booking_row;
    use axum::http::Request;

    fn meta_for(request: Request<()>) -> AuditMeta {
        let (parts, _) = request.into_parts();
        AuditMeta::from_parts(&parts)
    }

    #[test]
    fn audit_meta_prefers_forwarded_client() {
        let meta = meta_for(
            Request::builder()
                .header("x-forwarded-for", "203.0.113.7, 10.0.0.2")
                .header("x-real-ip", "10.0.0.2")
                .header("user-agent", "scanner/1.0")
                .body(())
                .unwrap(),
        );
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("scanner/1.0"));

        let meta = meta_for(Request::builder().header("x-real-ip", "10.0.0.9").body(()).unwrap());
        assert_eq!(meta.ip_address.as_deref(), Some("10.0.0.9"));

        let meta = meta_for(Request::builder().body(()).unwrap());
        assert!(meta.ip_address.is_none());
        assert!(meta.user_agent.is_none());
    }

    #[test]
    fn admin_check_in_keeps_the_window() {
        let now = Utc::now();
        let in_window = booking_row("confirmed", now + chrono::Duration::hours(6));
        assert!(validate_status_change(&in_window, BookingStatus::CheckedIn, now).is_ok());

        let too_early = booking_row("confirmed", now + chrono::Duration::days(3));
        assert!(matches!(
            validate_status_change(&too_early, BookingStatus::CheckedIn, now),
            Err(ApiError::Unprocessable(_))
        ));

        let too_late = booking_row("confirmed", now + chrono::Duration::minutes(30));
        assert!(matches!(
            validate_status_change(&too_late, BookingStatus::CheckedIn, now),
            Err(ApiError::Unprocessable(_))
        ));

        // Other changes are not tied to the window
        assert!(validate_status_change(&too_early, BookingStatus::Cancelled, now).is_ok());
        assert!(validate_status_change(&in_window, BookingStatus::Confirmed, now).is_err());
    }

    #[test]
    fn users_with_bookings_or_payments_are_kept() {
        assert!(deletion_blocker(0, 0).is_none());
        assert!(deletion_blocker(1, 0).unwrap().contains("1 active booking"));
        assert!(deletion_blocker(0, 2).unwrap().contains("2 payment record"));
        assert!(deletion_blocker(3, 4).unwrap().contains("active booking"));
    }

    #[test]
    fn like_patterns_ignore_blank_terms() {
        assert_eq!(like_pattern(Some(" k7qx ")), Some("%k7qx%".to_string()));
        assert_eq!(like_pattern(Some("  ")), None);
        assert_eq!(like_pattern(None), None);
    }

    #[test]
    fn revenue_nets_out_refunds() {
        let revenue = RevenueByCurrency::from(RevenueRow {
            currency: "EUR".to_string(),
            collected: Decimal::new(100_000, 2),
            refunded: Decimal::new(25_050, 2),
        });
        assert_eq!(revenue.net, Decimal::new(74_950, 2));
    }
}
