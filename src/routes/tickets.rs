//! E-ticket routes
//!
//! Tickets exist once a booking is paid. The QR payload is a signed token so
//! gate staff can verify it without trusting the document it was printed on.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::admin::{log_admin_action, AuditMeta};
use super::bookings::{authorize_booking, fetch_booking, fetch_passengers, BookingRow, PassengerRow};
use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::{RequireAdmin, RequireAuth};
use crate::domain::admin::{AdminAction, AuditTargetType};
use crate::domain::bookings::BookingStatus;
use crate::error::ApiError;
use crate::services::tickets::{
    decode_ticket_payload, encode_ticket_payload, render_qr_svg, render_ticket_pdf, TicketClaims,
    TicketData, TicketPassenger,
};

#[derive(Debug, Deserialize)]
pub struct VerifyTicketRequest {
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct TicketVerification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub booking_id: Option<Uuid>,
    pub reference: Option<String>,
    pub status: Option<BookingStatus>,
    pub flight_number: Option<String>,
    pub departure_at: Option<DateTime<Utc>>,
    pub passengers: Vec<String>,
}

impl TicketVerification {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            booking_id: None,
            reference: None,
            status: None,
            flight_number: None,
            departure_at: None,
            passengers: Vec::new(),
        }
    }
}

/// Why a decoded ticket should not board, if anything
fn rejection_reason(claims: &TicketClaims, booking: &BookingRow) -> Option<&'static str> {
    if claims.reference != booking.reference {
        return Some("Ticket does not match the booking");
    }
    match booking.status() {
        BookingStatus::Cancelled => Some("Booking has been cancelled"),
        BookingStatus::Pending => Some("Booking has not been paid"),
        BookingStatus::Confirmed | BookingStatus::CheckedIn => None,
    }
}

/// Load a booking the caller may see and that has been ticketed
async fn ticketed_booking(
    state: &AppState,
    auth: &RequireAuth,
    booking_id: Uuid,
) -> Result<(BookingRow, Vec<PassengerRow>), ApiError> {
    let booking = fetch_booking(&state.db, booking_id).await?;
    authorize_booking(&state.db, auth, &booking).await?;

    if !booking.status().is_ticketed() {
        return Err(ApiError::unprocessable(
            "Tickets are issued once the booking is confirmed",
        ));
    }

    let passengers = fetch_passengers(&state.db, booking.id).await?;
    Ok((booking, passengers))
}

fn qr_payload(state: &AppState, booking: &BookingRow, passengers: &[PassengerRow]) -> Result<String, ApiError> {
    let claims = TicketClaims::new(
        booking.id,
        &booking.reference,
        &booking.flight_number,
        booking.departure_at,
        booking.arrival_at,
        passengers.iter().map(PassengerRow::full_name).collect(),
    );
    Ok(encode_ticket_payload(&claims, &state.settings.ticket_signing_secret)?)
}

/// GET /bookings/:id/ticket
pub async fn get_ticket_pdf(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (booking, passengers) = ticketed_booking(&state, &auth, booking_id).await?;
    let payload = qr_payload(&state, &booking, &passengers)?;

    let airline_name: Option<String> =
        sqlx::query_scalar("SELECT name FROM airlines WHERE iata_code = $1")
            .bind(&booking.airline_code)
            .fetch_optional(&state.db)
            .await?;

    let ticket = TicketData {
        reference: booking.reference.clone(),
        status: booking.status.clone(),
        airline_code: booking.airline_code.clone(),
        airline_name,
        flight_number: booking.flight_number.clone(),
        origin: booking.origin.clone(),
        destination: booking.destination.clone(),
        departure_at: booking.departure_at,
        arrival_at: booking.arrival_at,
        cabin_class: booking.cabin_class.clone(),
        passengers: passengers
            .iter()
            .map(|p| TicketPassenger {
                name: p.full_name(),
                passenger_type: p.passenger_type.clone(),
                seat: p.seat.clone(),
            })
            .collect(),
        qr_payload: payload,
    };

    let reference = booking.reference.clone();
    let pdf = tokio::task::spawn_blocking(move || render_ticket_pdf(&ticket))
        .await
        .map_err(|e| ApiError::internal(format!("Ticket rendering task failed: {}", e)))??;

    tracing::info!(booking_id = %booking.id, reference = %reference, bytes = pdf.len(), "Ticket rendered");

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"ticket-{}.pdf\"", reference),
            ),
        ],
        pdf,
    ))
}

/// GET /bookings/:id/ticket/qr
pub async fn get_ticket_qr(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (booking, passengers) = ticketed_booking(&state, &auth, booking_id).await?;
    let payload = qr_payload(&state, &booking, &passengers)?;
    let svg = render_qr_svg(&payload)?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

/// POST /tickets/verify
///
/// Decode a scanned QR payload and check it against the live booking.
pub async fn verify_ticket(
    State(state): State<Arc<AppState>>,
    admin: RequireAdmin,
    meta: AuditMeta,
    Json(req): Json<VerifyTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = match decode_ticket_payload(&req.payload, &state.settings.ticket_signing_secret) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::info!(admin_id = %admin.user_id(), error = %e, "Ticket failed verification");
            return Ok(Json(DataResponse::new(TicketVerification::rejected(
                "Ticket signature is invalid or the ticket has expired",
            ))));
        }
    };

    let booking = match claims.booking_id() {
        Some(id) => sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            super::bookings::BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&state.db)
        .await?,
        None => None,
    };
    let Some(booking) = booking else {
        return Ok(Json(DataResponse::new(TicketVerification::rejected(
            "Booking no longer exists",
        ))));
    };

    let reason = rejection_reason(&claims, &booking);
    let result = TicketVerification {
        valid: reason.is_none(),
        reason: reason.map(str::to_string),
        booking_id: Some(booking.id),
        reference: Some(booking.reference.clone()),
        status: Some(booking.status()),
        flight_number: Some(booking.flight_number.clone()),
        departure_at: Some(booking.departure_at),
        passengers: claims.passengers.clone(),
    };

    if let Err(e) = log_admin_action(
        &state.db,
        admin.user_id(),
        AdminAction::VerifyTicket,
        AuditTargetType::Ticket,
        Some(booking.id),
        serde_json::json!({ "reference": booking.reference, "valid": result.valid }),
        &meta,
    )
    .await
    {
        tracing::error!(error = %e, "Failed to write audit log");
    }

    Ok(Json(DataResponse::new(result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::bookings::tests::booking_row;
    use chrono::Duration;

    fn booking(status: &str) -> BookingRow {
        booking_row(status, Utc::now() + Duration::hours(6))
    }

    fn claims_for(booking: &BookingRow) -> TicketClaims {
        TicketClaims::new(
            booking.id,
            &booking.reference,
            &booking.flight_number,
            booking.departure_at,
            booking.arrival_at,
            vec!["Ada Lovelace".to_string()],
        )
    }

    #[test]
    fn paid_bookings_verify() {
        let confirmed = booking("confirmed");
        assert_eq!(rejection_reason(&claims_for(&confirmed), &confirmed), None);

        let checked_in = booking("checked_in");
        assert_eq!(rejection_reason(&claims_for(&checked_in), &checked_in), None);
    }

    #[test]
    fn cancelled_or_mismatched_tickets_are_rejected() {
        let cancelled = booking("cancelled");
        assert_eq!(
            rejection_reason(&claims_for(&cancelled), &cancelled),
            Some("Booking has been cancelled")
        );

        let confirmed = booking("confirmed");
        let mut claims = claims_for(&confirmed);
        claims.reference = "ZZZZZZ".to_string();
        assert_eq!(
            rejection_reason(&claims, &confirmed),
            Some("Ticket does not match the booking")
        );
    }
}
