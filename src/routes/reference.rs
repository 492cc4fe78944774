//! Airline and airport lookups
//!
//! Served from the mirror tables; an exact-code miss is fetched from the aviation
//! data API and stored. There are no write routes.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::{DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::domain::flights::normalize_iata;
use crate::domain::reference::{normalize_airline_code, Airline, Airport, ReferenceQuery};
use crate::error::ApiError;
use crate::services::cache::keys;

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AirlineRow {
    iata_code: String,
    icao_code: Option<String>,
    name: String,
    country: Option<String>,
}

impl From<AirlineRow> for Airline {
    fn from(row: AirlineRow) -> Self {
        Self {
            iata_code: row.iata_code,
            icao_code: row.icao_code,
            name: row.name,
            country: row.country,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AirportRow {
    iata_code: String,
    icao_code: Option<String>,
    name: String,
    city: Option<String>,
    country: Option<String>,
    timezone: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<AirportRow> for Airport {
    fn from(row: AirportRow) -> Self {
        Self {
            iata_code: row.iata_code,
            icao_code: row.icao_code,
            name: row.name,
            city: row.city,
            country: row.country,
            timezone: row.timezone,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

fn search_term(query: &ReferenceQuery) -> Option<String> {
    query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Listing (shared with the admin mirror views)
// ============================================================================

pub(crate) async fn list_airlines_page(
    db: &sqlx::PgPool,
    pagination: &PaginationParams,
    filter: &ReferenceQuery,
) -> Result<Paginated<Airline>, ApiError> {
    let q = search_term(filter);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM airlines
        WHERE ($1::text IS NULL OR iata_code ILIKE $1 OR name ILIKE '%' || $1 || '%'
               OR country ILIKE '%' || $1 || '%')
        "#,
    )
    .bind(&q)
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, AirlineRow>(
        r#"
        SELECT iata_code, icao_code, name, country FROM airlines
        WHERE ($1::text IS NULL OR iata_code ILIKE $1 OR name ILIKE '%' || $1 || '%'
               OR country ILIKE '%' || $1 || '%')
        ORDER BY name
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&q)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(db)
    .await?;

    let data = rows.into_iter().map(Airline::from).collect();
    Ok(Paginated::new(data, pagination, total))
}

pub(crate) async fn list_airports_page(
    db: &sqlx::PgPool,
    pagination: &PaginationParams,
    filter: &ReferenceQuery,
) -> Result<Paginated<Airport>, ApiError> {
    let q = search_term(filter);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM airports
        WHERE ($1::text IS NULL OR iata_code ILIKE $1 OR name ILIKE '%' || $1 || '%'
               OR city ILIKE '%' || $1 || '%' OR country ILIKE '%' || $1 || '%')
        "#,
    )
    .bind(&q)
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, AirportRow>(
        r#"
        SELECT iata_code, icao_code, name, city, country, timezone, latitude, longitude
        FROM airports
        WHERE ($1::text IS NULL OR iata_code ILIKE $1 OR name ILIKE '%' || $1 || '%'
               OR city ILIKE '%' || $1 || '%' OR country ILIKE '%' || $1 || '%')
        ORDER BY name
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&q)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(db)
    .await?;

    let data = rows.into_iter().map(Airport::from).collect();
    Ok(Paginated::new(data, pagination, total))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /airlines
pub async fn list_airlines(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ReferenceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    list_airlines_page(&state.db, &pagination, &filter).await
}

/// GET /airlines/:iata
pub async fn get_airline(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_airline_code(&code)
        .ok_or_else(|| ApiError::bad_request("Airline codes are two characters"))?;

    let cache_key = keys::airline(&code);
    if let Some(airline) = state.cache.get::<Airline>(&cache_key).await {
        return Ok(Json(DataResponse::new(airline)));
    }

    let mirrored = sqlx::query_as::<_, AirlineRow>(
        "SELECT iata_code, icao_code, name, country FROM airlines WHERE iata_code = $1",
    )
    .bind(&code)
    .fetch_optional(&state.db)
    .await?;

    let airline = match mirrored {
        Some(row) => Airline::from(row),
        None if state.aviation.is_enabled() => {
            let (airline, raw) = state
                .aviation
                .airline(&code)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("Airline {} not found", code)))?;

            sqlx::query(
                r#"
                INSERT INTO airlines (iata_code, icao_code, name, country, raw, fetched_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (iata_code) DO UPDATE SET
                    icao_code = EXCLUDED.icao_code,
                    name = EXCLUDED.name,
                    country = EXCLUDED.country,
                    raw = EXCLUDED.raw,
                    fetched_at = NOW()
                "#,
            )
            .bind(&airline.iata_code)
            .bind(&airline.icao_code)
            .bind(&airline.name)
            .bind(&airline.country)
            .bind(&raw)
            .execute(&state.db)
            .await?;

            tracing::info!(iata_code = %airline.iata_code, "Airline mirrored");
            airline
        }
        None => return Err(ApiError::not_found(format!("Airline {} not found", code))),
    };

    state
        .cache
        .set_logged(&cache_key, &airline, state.cache.default_ttl())
        .await;
    Ok(Json(DataResponse::new(airline)))
}

/// GET /airports
pub async fn list_airports(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ReferenceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    list_airports_page(&state.db, &pagination, &filter).await
}

/// GET /airports/:iata
pub async fn get_airport(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let code = normalize_iata(&code)
        .ok_or_else(|| ApiError::bad_request("Airport codes are three letters"))?;

    let cache_key = keys::airport(&code);
    if let Some(airport) = state.cache.get::<Airport>(&cache_key).await {
        return Ok(Json(DataResponse::new(airport)));
    }

    let mirrored = sqlx::query_as::<_, AirportRow>(
        r#"
        SELECT iata_code, icao_code, name, city, country, timezone, latitude, longitude
        FROM airports WHERE iata_code = $1
        "#,
    )
    .bind(&code)
    .fetch_optional(&state.db)
    .await?;

    let airport = match mirrored {
        Some(row) => Airport::from(row),
        None if state.aviation.is_enabled() => {
            let (airport, raw) = state
                .aviation
                .airport(&code)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("Airport {} not found", code)))?;

            sqlx::query(
                r#"
                INSERT INTO airports (iata_code, icao_code, name, city, country, timezone,
                                      latitude, longitude, raw, fetched_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
                ON CONFLICT (iata_code) DO UPDATE SET
                    icao_code = EXCLUDED.icao_code,
                    name = EXCLUDED.name,
                    city = EXCLUDED.city,
                    country = EXCLUDED.country,
                    timezone = EXCLUDED.timezone,
                    latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    raw = EXCLUDED.raw,
                    fetched_at = NOW()
                "#,
            )
            .bind(&airport.iata_code)
            .bind(&airport.icao_code)
            .bind(&airport.name)
            .bind(&airport.city)
            .bind(&airport.country)
            .bind(&airport.timezone)
            .bind(airport.latitude)
            .bind(airport.longitude)
            .bind(&raw)
            .execute(&state.db)
            .await?;

            tracing::info!(iata_code = %airport.iata_code, "Airport mirrored");
            airport
        }
        None => return Err(ApiError::not_found(format!("Airport {} not found", code))),
    };

    state
        .cache
        .set_logged(&cache_key, &airport, state.cache.default_ttl())
        .await;
    Ok(Json(DataResponse::new(airport)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_terms_are_ignored() {
        assert_eq!(search_term(&ReferenceQuery { q: Some("  ".to_string()) }), None);
        assert_eq!(
            search_term(&ReferenceQuery { q: Some(" heathrow ".to_string()) }),
            Some("heathrow".to_string())
        );
    }
}
