//! Booking routes
//!
//! Bookings are created against a cached offer, priced server-side and start
//! out `pending` until a payment succeeds.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::admin::{log_admin_action, AuditMeta};
use super::flights::{load_offer, occupied_seats};
use super::payments::{refund_payment, PaymentRow, PAYMENT_COLUMNS};
use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{AuthContext, RequireAuth};
use crate::domain::admin::{AdminAction, AuditTargetType};
use crate::domain::bookings::{
    assign_seats, generate_reference, normalize_reference, validate_cancellation, BookingDetail,
    BookingQuery, BookingResponse, BookingStatus, CancelBookingRequest, CreateBookingRequest,
    PassengerResponse, PassengerType,
};
use crate::domain::checkin::validate_check_in;
use crate::domain::payments::PaymentResponse;
use crate::domain::pricing::PriceBreakdown;
use crate::domain::seatmap::SeatMap;
use crate::domain::users::{normalize_email, validate_email};
use crate::error::ApiError;

const REFERENCE_ATTEMPTS: usize = 5;

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct BookingRow {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub status: String,
    pub provider: String,
    pub provider_offer_id: String,
    pub flight_key: String,
    pub flight_number: String,
    pub airline_code: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub cabin_class: String,
    pub seats: Vec<String>,
    pub itinerary: serde_json::Value,
    pub contact_email: String,
    pub currency: String,
    pub base_fare: Decimal,
    pub taxes: Decimal,
    pub seat_fees: Decimal,
    pub total_price: Decimal,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRow {
    pub fn status(&self) -> BookingStatus {
        BookingStatus::parse(&self.status).unwrap_or(BookingStatus::Pending)
    }
}

impl From<BookingRow> for BookingResponse {
    fn from(row: BookingRow) -> Self {
        let status = row.status();
        Self {
            id: row.id,
            reference: row.reference,
            user_id: row.user_id,
            status,
            provider: row.provider,
            provider_offer_id: row.provider_offer_id,
            flight_number: row.flight_number,
            airline_code: row.airline_code,
            origin: row.origin,
            destination: row.destination,
            departure_at: row.departure_at,
            arrival_at: row.arrival_at,
            cabin_class: row.cabin_class,
            seats: row.seats,
            itinerary: row.itinerary,
            contact_email: row.contact_email,
            currency: row.currency,
            base_fare: row.base_fare,
            taxes: row.taxes,
            seat_fees: row.seat_fees,
            total_price: row.total_price,
            checked_in_at: row.checked_in_at,
            cancelled_at: row.cancelled_at,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) const BOOKING_COLUMNS: &str = "id, reference, user_id, status, provider, \
    provider_offer_id, flight_key, flight_number, airline_code, origin, destination, \
    departure_at, arrival_at, cabin_class, seats, itinerary, contact_email, currency, \
    base_fare, taxes, seat_fees, total_price, checked_in_at, cancelled_at, \
    cancellation_reason, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PassengerRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub passenger_type: String,
    pub passport_number: Option<String>,
    pub nationality: Option<String>,
    pub seat: Option<String>,
}

impl PassengerRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl From<PassengerRow> for PassengerResponse {
    fn from(row: PassengerRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            passenger_type: PassengerType::parse(&row.passenger_type),
            passport_number: row.passport_number,
            nationality: row.nationality,
            seat: row.seat,
        }
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

pub(crate) async fn fetch_booking(db: &sqlx::PgPool, booking_id: Uuid) -> Result<BookingRow, ApiError> {
    sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {} FROM bookings WHERE id = $1",
        BOOKING_COLUMNS
    ))
    .bind(booking_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Booking not found"))
}

pub(crate) async fn is_admin_user(db: &sqlx::PgPool, user_id: Uuid) -> Result<bool, ApiError> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(role.as_deref() == Some("admin"))
}

/// Owners and admins may act on a booking; returns whether the caller acts as admin.
/// The token role only gates the database check, so a demoted admin is refused.
/// Other users get a 404 so booking ids are not confirmed to exist.
pub(crate) async fn authorize_booking(
    db: &sqlx::PgPool,
    auth: &AuthContext,
    booking: &BookingRow,
) -> Result<bool, ApiError> {
    if booking.user_id == auth.user_id {
        return Ok(false);
    }
    if auth.is_admin() && is_admin_user(db, auth.user_id).await? {
        return Ok(true);
    }
    Err(ApiError::not_found("Booking not found"))
}

pub(crate) async fn fetch_passengers(
    db: &sqlx::PgPool,
    booking_id: Uuid,
) -> Result<Vec<PassengerRow>, ApiError> {
    let rows = sqlx::query_as::<_, PassengerRow>(
        r#"
        SELECT id, first_name, last_name, date_of_birth, passenger_type,
               passport_number, nationality, seat
        FROM passengers WHERE booking_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(booking_id)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

pub(crate) async fn fetch_payments(
    db: &sqlx::PgPool,
    booking_id: Uuid,
) -> Result<Vec<PaymentRow>, ApiError> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payments WHERE booking_id = $1 ORDER BY created_at",
        PAYMENT_COLUMNS
    ))
    .bind(booking_id)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

pub(crate) async fn booking_detail(
    db: &sqlx::PgPool,
    booking: BookingRow,
) -> Result<BookingDetail, ApiError> {
    let (passengers, payments) =
        tokio::try_join!(fetch_passengers(db, booking.id), fetch_payments(db, booking.id))?;

    Ok(BookingDetail {
        booking: booking.into(),
        passengers: passengers.into_iter().map(PassengerResponse::from).collect(),
        payments: payments.into_iter().map(PaymentResponse::from).collect(),
    })
}

/// Mark the booking cancelled, then refund its succeeded payments.
///
/// The status change and the refund requests commit together before the
/// gateway is called. A refund that fails stays requested on the payment and
/// is retried by the next sync or webhook for it.
pub(crate) async fn cancel_booking_row(
    state: &AppState,
    booking: &BookingRow,
    reason: Option<&str>,
) -> Result<BookingRow, ApiError> {
    validate_cancellation(booking.status(), booking.departure_at, Utc::now())?;

    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    let mut tx = state.db.begin().await?;

    let row = sqlx::query_as::<_, BookingRow>(&format!(
        r#"
        UPDATE bookings SET
            status = 'cancelled',
            cancelled_at = NOW(),
            cancellation_reason = $3,
            updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING {}
        "#,
        BOOKING_COLUMNS
    ))
    .bind(booking.id)
    .bind(&booking.status)
    .bind(reason)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::conflict("Booking was modified concurrently; try again"))?;

    let to_refund = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        UPDATE payments SET
            refund_requested_at = COALESCE(refund_requested_at, NOW()),
            updated_at = NOW()
        WHERE booking_id = $1 AND status = 'succeeded'
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    ))
    .bind(booking.id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        booking_id = %row.id,
        reference = %row.reference,
        refunds = to_refund.len(),
        "Booking cancelled"
    );

    for payment in to_refund {
        let payment_id = payment.id;
        if let Err(e) = refund_payment(state, payment).await {
            tracing::error!(
                booking_id = %row.id,
                payment_id = %payment_id,
                error = %e,
                "Refund failed; left requested for retry"
            );
        }
    }

    Ok(row)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /bookings
///
/// Book a cached offer. Seats are checked and reserved under a per-flight
/// advisory lock so two bookings cannot take the same seat.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let offer = load_offer(&state, req.offer_id).await?;

    let outbound = offer
        .outbound()
        .ok_or_else(|| ApiError::internal("Cached offer has no itinerary"))?;
    let (first, last) = match (outbound.segments.first(), outbound.segments.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(ApiError::internal("Cached offer has no segments")),
    };

    let departure_at = first.departure_at.and_utc();
    let arrival_at = last.arrival_at.and_utc();
    if departure_at <= Utc::now() {
        return Err(ApiError::unprocessable("This flight has already departed"));
    }

    let contact_email = match req.contact_email.as_deref() {
        Some(email) => {
            validate_email(email).map_err(ApiError::bad_request)?;
            normalize_email(email)
        }
        None => auth.email.clone(),
    };

    let flight_key = first.flight_key();
    let itinerary = serde_json::to_value(&offer.itineraries)
        .map_err(|e| ApiError::internal(format!("Failed to serialize itinerary: {}", e)))?;

    let mut tx = state.db.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&flight_key)
        .execute(&mut *tx)
        .await?;

    let occupied = occupied_seats(&mut *tx, &flight_key).await?;
    let seat_map = SeatMap::generate(offer.cabin, &occupied);
    let (seats, seat_fees) = assign_seats(&req.passengers, &seat_map).map_err(ApiError::bad_request)?;

    let passenger_types: Vec<PassengerType> =
        req.passengers.iter().map(|p| p.passenger_type).collect();
    let price = PriceBreakdown::compute(&offer, &passenger_types, seat_fees);

    let mut booking = None;
    for _ in 0..REFERENCE_ATTEMPTS {
        let reference = generate_reference(&mut rand::thread_rng());
        let inserted = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            INSERT INTO bookings (
                id, reference, user_id, status, provider, provider_offer_id, flight_key,
                flight_number, airline_code, origin, destination, departure_at, arrival_at,
                cabin_class, seats, itinerary, contact_email, currency,
                base_fare, taxes, seat_fees, total_price
            )
            VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (reference) DO NOTHING
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&reference)
        .bind(auth.user_id)
        .bind(&offer.provider)
        .bind(&offer.provider_offer_id)
        .bind(&flight_key)
        .bind(first.designator())
        .bind(&first.carrier_code)
        .bind(&first.origin)
        .bind(&last.destination)
        .bind(departure_at)
        .bind(arrival_at)
        .bind(offer.cabin.as_str())
        .bind(seats.iter().flatten().cloned().collect::<Vec<String>>())
        .bind(&itinerary)
        .bind(&contact_email)
        .bind(&price.currency)
        .bind(price.base_fare)
        .bind(price.taxes)
        .bind(price.seat_fees)
        .bind(price.total)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_some() {
            booking = inserted;
            break;
        }
        tracing::debug!(reference = %reference, "Booking reference collision, retrying");
    }
    let booking =
        booking.ok_or_else(|| ApiError::internal("Could not allocate a unique booking reference"))?;

    for (passenger, seat) in req.passengers.iter().zip(&seats) {
        sqlx::query(
            r#"
            INSERT INTO passengers (id, booking_id, first_name, last_name, date_of_birth,
                                    passenger_type, passport_number, nationality, seat)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(booking.id)
        .bind(passenger.first_name.trim())
        .bind(passenger.last_name.trim())
        .bind(passenger.date_of_birth)
        .bind(passenger.passenger_type.as_str())
        .bind(passenger.passport_number.as_deref())
        .bind(passenger.nationality.as_deref())
        .bind(seat.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        booking_id = %booking.id,
        reference = %booking.reference,
        user_id = %auth.user_id,
        flight_key = %booking.flight_key,
        total = %booking.total_price,
        "Booking created"
    );

    let detail = booking_detail(&state.db, booking).await?;
    Ok(Created(detail))
}

/// GET /bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<BookingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = filter.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM bookings WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(auth.user_id)
    .bind(status)
    .fetch_one(&state.db)
    .await?;

    let rows = sqlx::query_as::<_, BookingRow>(&format!(
        r#"
        SELECT {} FROM bookings
        WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY departure_at DESC
        LIMIT $3 OFFSET $4
        "#,
        BOOKING_COLUMNS
    ))
    .bind(auth.user_id)
    .bind(status)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data: Vec<BookingResponse> = rows.into_iter().map(BookingResponse::from).collect();
    Ok(Paginated::new(data, &pagination, total))
}

/// GET /bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = fetch_booking(&state.db, booking_id).await?;
    authorize_booking(&state.db, &auth, &booking).await?;

    let detail = booking_detail(&state.db, booking).await?;
    Ok(Json(DataResponse::new(detail)))
}

/// GET /bookings/reference/:reference
pub async fn get_booking_by_reference(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let reference = normalize_reference(&reference)
        .ok_or_else(|| ApiError::bad_request("Invalid booking reference"))?;

    let booking = sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {} FROM bookings WHERE reference = $1",
        BOOKING_COLUMNS
    ))
    .bind(&reference)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Booking not found"))?;

    authorize_booking(&state.db, &auth, &booking).await?;

    let detail = booking_detail(&state.db, booking).await?;
    Ok(Json(DataResponse::new(detail)))
}

/// POST /bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    meta: AuditMeta,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<CancelBookingRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();

    let booking = fetch_booking(&state.db, booking_id).await?;
    let as_admin = authorize_booking(&state.db, &auth, &booking).await?;

    let cancelled = cancel_booking_row(&state, &booking, req.reason.as_deref()).await?;

    if as_admin {
        if let Err(e) = log_admin_action(
            &state.db,
            auth.user_id,
            AdminAction::CancelBooking,
            AuditTargetType::Booking,
            Some(booking.id),
            serde_json::json!({ "reference": booking.reference, "reason": req.reason }),
            &meta,
        )
        .await
        {
            tracing::error!(error = %e, "Failed to write audit log");
        }
    }

    let detail = booking_detail(&state.db, cancelled).await?;
    Ok(Json(DataResponse::new(detail)))
}

/// POST /bookings/:id/check-in
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = fetch_booking(&state.db, booking_id).await?;
    if booking.user_id != auth.user_id {
        return Err(ApiError::not_found("Booking not found"));
    }

    validate_check_in(booking.status(), booking.departure_at, Utc::now())?;

    let row = sqlx::query_as::<_, BookingRow>(&format!(
        r#"
        UPDATE bookings SET status = 'checked_in', checked_in_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'confirmed'
        RETURNING {}
        "#,
        BOOKING_COLUMNS
    ))
    .bind(booking.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::conflict("Booking was modified concurrently; try again"))?;

    tracing::info!(booking_id = %row.id, reference = %row.reference, "Passenger checked in");

    let detail = booking_detail(&state.db, row).await?;
    Ok(Json(DataResponse::new(detail)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn booking_row(status: &str, departure_at: DateTime<Utc>) -> BookingRow {
        BookingRow {
            id: Uuid::new_v4(),
            reference: "K7QX2M".to_string(),
            user_id: Uuid::new_v4(),
            status: status.to_string(),
            provider: "amadeus".to_string(),
            provider_offer_id: "1".to_string(),
            flight_key: "BA117-2026-11-02T09:30".to_string(),
            flight_number: "BA117".to_string(),
            airline_code: "BA".to_string(),
            origin: "LHR".to_string(),
            destination: "JFK".to_string(),
            departure_at,
            arrival_at: departure_at + Duration::hours(8),
            cabin_class: "economy".to_string(),
            seats: vec!["14C".to_string()],
            itinerary: serde_json::json!([]),
            contact_email: "ada@example.com".to_string(),
            currency: "GBP".to_string(),
            base_fare: Decimal::new(40_000, 2),
            taxes: Decimal::new(9_000, 2),
            seat_fees: Decimal::ZERO,
            total_price: Decimal::new(49_000, 2),
            checked_in_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rows_expose_their_status() {
        let departure = Utc::now() + Duration::days(3);
        assert_eq!(booking_row("checked_in", departure).status(), BookingStatus::CheckedIn);
        assert_eq!(booking_row("bogus", departure).status(), BookingStatus::Pending);

        let response = BookingResponse::from(booking_row("confirmed", departure));
        assert_eq!(response.status, BookingStatus::Confirmed);
        assert_eq!(response.provider_offer_id, "1");
    }
}
