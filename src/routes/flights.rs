//! Flight search, offers, seat maps and live status

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::domain::flights::{FlightOffer, FlightSearchParams, FlightSearchQuery};
use crate::domain::reference::{normalize_flight_iata, FlightStatus};
use crate::domain::seatmap::SeatMap;
use crate::error::ApiError;
use crate::services::cache::keys;

const FLIGHT_STATUS_TTL: Duration = Duration::from_secs(300);

// ============================================================================
// Shared Helpers
// ============================================================================

/// An offer previously returned by a search; expired offers cannot be booked
pub(crate) async fn load_offer(state: &AppState, offer_id: Uuid) -> Result<FlightOffer, ApiError> {
    state
        .cache
        .get::<FlightOffer>(&keys::offer(offer_id))
        .await
        .ok_or_else(|| ApiError::not_found("Offer not found or expired; search again"))
}

/// Seats held by non-cancelled bookings on a flight
pub(crate) async fn occupied_seats<'e, E>(executor: E, flight_key: &str) -> Result<HashSet<String>, ApiError>
where
    E: sqlx::PgExecutor<'e>,
{
    let seats: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT seat FROM bookings, unnest(seats) AS seat
        WHERE flight_key = $1 AND status <> 'cancelled'
        "#,
    )
    .bind(flight_key)
    .fetch_all(executor)
    .await?;

    Ok(seats.into_iter().collect())
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FlightStatusRow {
    pub flight_iata: String,
    pub flight_date: NaiveDate,
    pub status: String,
    pub airline_name: Option<String>,
    pub departure_airport: Option<String>,
    pub departure_scheduled: Option<DateTime<Utc>>,
    pub departure_estimated: Option<DateTime<Utc>>,
    pub departure_gate: Option<String>,
    pub departure_terminal: Option<String>,
    pub arrival_airport: Option<String>,
    pub arrival_scheduled: Option<DateTime<Utc>>,
    pub arrival_estimated: Option<DateTime<Utc>>,
    pub delay_minutes: Option<i32>,
}

impl From<FlightStatusRow> for FlightStatus {
    fn from(row: FlightStatusRow) -> Self {
        Self {
            flight_iata: row.flight_iata,
            flight_date: row.flight_date,
            status: row.status,
            airline_name: row.airline_name,
            departure_airport: row.departure_airport,
            departure_scheduled: row.departure_scheduled,
            departure_estimated: row.departure_estimated,
            departure_gate: row.departure_gate,
            departure_terminal: row.departure_terminal,
            arrival_airport: row.arrival_airport,
            arrival_scheduled: row.arrival_scheduled,
            arrival_estimated: row.arrival_estimated,
            delay_minutes: row.delay_minutes,
        }
    }
}

pub(crate) const FLIGHT_STATUS_COLUMNS: &str = "flight_iata, flight_date, status, airline_name, \
    departure_airport, departure_scheduled, departure_estimated, departure_gate, departure_terminal, \
    arrival_airport, arrival_scheduled, arrival_estimated, delay_minutes";

async fn upsert_flight_status(
    db: &sqlx::PgPool,
    status: &FlightStatus,
    raw: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO flight_statuses (
            flight_iata, flight_date, status, airline_name,
            departure_airport, departure_scheduled, departure_estimated, departure_gate, departure_terminal,
            arrival_airport, arrival_scheduled, arrival_estimated, delay_minutes, raw, fetched_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())
        ON CONFLICT (flight_iata, flight_date) DO UPDATE SET
            status = EXCLUDED.status,
            airline_name = EXCLUDED.airline_name,
            departure_airport = EXCLUDED.departure_airport,
            departure_scheduled = EXCLUDED.departure_scheduled,
            departure_estimated = EXCLUDED.departure_estimated,
            departure_gate = EXCLUDED.departure_gate,
            departure_terminal = EXCLUDED.departure_terminal,
            arrival_airport = EXCLUDED.arrival_airport,
            arrival_scheduled = EXCLUDED.arrival_scheduled,
            arrival_estimated = EXCLUDED.arrival_estimated,
            delay_minutes = EXCLUDED.delay_minutes,
            raw = EXCLUDED.raw,
            fetched_at = NOW()
        "#,
    )
    .bind(&status.flight_iata)
    .bind(status.flight_date)
    .bind(&status.status)
    .bind(&status.airline_name)
    .bind(&status.departure_airport)
    .bind(status.departure_scheduled)
    .bind(status.departure_estimated)
    .bind(&status.departure_gate)
    .bind(&status.departure_terminal)
    .bind(&status.arrival_airport)
    .bind(status.arrival_scheduled)
    .bind(status.arrival_estimated)
    .bind(status.delay_minutes)
    .bind(raw)
    .execute(db)
    .await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /flights/search
///
/// Searches every provider, compares prices and caches each offer so it can be
/// booked later.
pub async fn search_flights(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FlightSearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = FlightSearchQuery::from_params(
        params,
        &state.settings.default_currency,
        FlightSearchQuery::today(),
    )
    .map_err(ApiError::bad_request)?;

    let search_key = keys::search(&query.cache_key());
    if let Some(offers) = state.cache.get::<Vec<FlightOffer>>(&search_key).await {
        return Ok(Json(DataResponse::new(offers)));
    }

    let offers = state.flight_search.search(&query).await?;

    let ttl = state.cache.default_ttl();
    for offer in &offers {
        state.cache.set_logged(&keys::offer(offer.id), offer, ttl).await;
    }
    state.cache.set_logged(&search_key, &offers, ttl).await;

    tracing::info!(
        origin = %query.origin,
        destination = %query.destination,
        departure_date = %query.departure_date,
        offers = offers.len(),
        "Flight search completed"
    );

    Ok(Json(DataResponse::new(offers)))
}

/// GET /flights/offers/:offer_id
pub async fn get_offer(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let offer = load_offer(&state, offer_id).await?;
    Ok(Json(DataResponse::new(offer)))
}

#[derive(Debug, Serialize)]
pub struct SeatMapResponse {
    pub offer_id: Uuid,
    pub flight_number: String,
    pub flight_key: String,
    pub available_seats: usize,
    pub seat_map: SeatMap,
}

/// GET /flights/offers/:offer_id/seats
///
/// Seat map for the first flight of the offer with seats from existing bookings
/// marked unavailable.
pub async fn get_seat_map(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let offer = load_offer(&state, offer_id).await?;
    let segment = offer
        .first_segment()
        .ok_or_else(|| ApiError::internal("Cached offer has no segments"))?;

    let flight_key = segment.flight_key();
    let occupied = occupied_seats(&state.db, &flight_key).await?;
    let seat_map = SeatMap::generate(offer.cabin, &occupied);

    Ok(Json(DataResponse::new(SeatMapResponse {
        offer_id,
        flight_number: segment.designator(),
        flight_key,
        available_seats: seat_map.available_count(),
        seat_map,
    })))
}

/// GET /flights/status/:flight_iata
///
/// Live status from the aviation data API, falling back to the last mirrored
/// record when the API is unavailable.
pub async fn get_flight_status(
    State(state): State<Arc<AppState>>,
    Path(flight_iata): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let flight_iata = normalize_flight_iata(&flight_iata)
        .ok_or_else(|| ApiError::bad_request("Invalid flight number"))?;

    let cache_key = keys::flight_status(&flight_iata);
    if let Some(status) = state.cache.get::<FlightStatus>(&cache_key).await {
        return Ok(Json(DataResponse::new(status)));
    }

    let mut upstream_error = None;
    let live = if state.aviation.is_enabled() {
        match state.aviation.flight_status(&flight_iata).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(flight_iata = %flight_iata, error = %e, "Live flight status unavailable");
                upstream_error = Some(e);
                None
            }
        }
    } else {
        None
    };

    if let Some((status, raw)) = live {
        upsert_flight_status(&state.db, &status, &raw).await?;
        state
            .cache
            .set_logged(&cache_key, &status, FLIGHT_STATUS_TTL)
            .await;
        return Ok(Json(DataResponse::new(status)));
    }

    let mirrored = sqlx::query_as::<_, FlightStatusRow>(&format!(
        "SELECT {} FROM flight_statuses WHERE flight_iata = $1 ORDER BY flight_date DESC LIMIT 1",
        FLIGHT_STATUS_COLUMNS
    ))
    .bind(&flight_iata)
    .fetch_optional(&state.db)
    .await?;

    match (mirrored, upstream_error) {
        (Some(row), _) => Ok(Json(DataResponse::new(FlightStatus::from(row)))),
        (None, Some(e)) => Err(e),
        (None, None) => Err(ApiError::not_found(format!(
            "No status found for flight {}",
            flight_iata
        ))),
    }
}
