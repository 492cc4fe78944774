//! AviationStack client for airline and airport lookups and live flight status.
//!
//! Every lookup returns the normalised record together with the raw JSON, which
//! is kept in the mirror tables.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, instrument};

use crate::domain::reference::{Airline, Airport, FlightStatus};
use crate::error::ApiError;

#[derive(Clone)]
pub struct AviationClient {
    http: Client,
    base_url: String,
    access_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

impl AviationClient {
    pub fn new(http: Client, base_url: &str, access_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.access_key.is_some()
    }

    /// First record of a filtered list endpoint, as raw JSON
    async fn first(&self, path: &str, filter: (&str, &str)) -> Result<Option<serde_json::Value>, ApiError> {
        let access_key = self
            .access_key
            .as_deref()
            .ok_or_else(|| ApiError::upstream("Aviation data API is not configured"))?;

        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, filter = filter.1, "Aviation data request");

        let response = self
            .http
            .get(&url)
            .query(&[("access_key", access_key), filter, ("limit", "1")])
            .send()
            .await
            .map_err(|e| ApiError::upstream(format!("Aviation data request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::upstream(format!("Aviation data API returned {}", status)));
        }

        let page: Page = response
            .json()
            .await
            .map_err(|e| ApiError::upstream(format!("Invalid aviation data response: {}", e)))?;

        Ok(page.data.into_iter().next())
    }

    #[instrument(skip(self))]
    pub async fn airline(&self, iata: &str) -> Result<Option<(Airline, serde_json::Value)>, ApiError> {
        self.lookup("airlines", ("iata_code", iata), map_airline).await
    }

    #[instrument(skip(self))]
    pub async fn airport(&self, iata: &str) -> Result<Option<(Airport, serde_json::Value)>, ApiError> {
        self.lookup("airports", ("iata_code", iata), map_airport).await
    }

    #[instrument(skip(self))]
    pub async fn flight_status(
        &self,
        flight_iata: &str,
    ) -> Result<Option<(FlightStatus, serde_json::Value)>, ApiError> {
        self.lookup("flights", ("flight_iata", flight_iata), map_flight_status)
            .await
    }

    async fn lookup<R, T>(
        &self,
        path: &str,
        filter: (&str, &str),
        map: fn(R) -> Option<T>,
    ) -> Result<Option<(T, serde_json::Value)>, ApiError>
    where
        R: DeserializeOwned,
    {
        let Some(raw) = self.first(path, filter).await? else {
            return Ok(None);
        };

        let record: R = serde_json::from_value(raw.clone())
            .map_err(|e| ApiError::upstream(format!("Unexpected {} record: {}", path, e)))?;

        Ok(map(record).map(|value| (value, raw)))
    }
}

// =============================================================================
// Record mapping
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawAirline {
    #[serde(default)]
    airline_name: Option<String>,
    #[serde(default)]
    iata_code: Option<String>,
    #[serde(default)]
    icao_code: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
}

fn map_airline(raw: RawAirline) -> Option<Airline> {
    Some(Airline {
        iata_code: raw.iata_code?.to_ascii_uppercase(),
        icao_code: raw.icao_code,
        name: raw.airline_name?,
        country: raw.country_name,
    })
}

#[derive(Debug, Deserialize)]
struct RawAirport {
    #[serde(default)]
    airport_name: Option<String>,
    #[serde(default)]
    iata_code: Option<String>,
    #[serde(default)]
    icao_code: Option<String>,
    #[serde(default)]
    city_iata_code: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    latitude: Option<serde_json::Value>,
    #[serde(default)]
    longitude: Option<serde_json::Value>,
}

/// Coordinates arrive as either strings or numbers
fn coordinate(value: Option<serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn map_airport(raw: RawAirport) -> Option<Airport> {
    Some(Airport {
        iata_code: raw.iata_code?.to_ascii_uppercase(),
        icao_code: raw.icao_code,
        name: raw.airport_name?,
        city: raw.city_iata_code,
        country: raw.country_name,
        timezone: raw.timezone,
        latitude: coordinate(raw.latitude),
        longitude: coordinate(raw.longitude),
    })
}

#[derive(Debug, Deserialize)]
struct RawFlight {
    flight_date: NaiveDate,
    #[serde(default)]
    flight_status: Option<String>,
    departure: RawFlightEndpoint,
    arrival: RawFlightEndpoint,
    #[serde(default)]
    airline: Option<RawFlightAirline>,
    flight: RawFlightNumber,
}

#[derive(Debug, Deserialize)]
struct RawFlightEndpoint {
    #[serde(default)]
    iata: Option<String>,
    #[serde(default)]
    terminal: Option<String>,
    #[serde(default)]
    gate: Option<String>,
    #[serde(default)]
    delay: Option<i32>,
    #[serde(default)]
    scheduled: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    estimated: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Deserialize)]
struct RawFlightAirline {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFlightNumber {
    #[serde(default)]
    iata: Option<String>,
}

fn utc(value: Option<DateTime<FixedOffset>>) -> Option<DateTime<Utc>> {
    value.map(|v| v.with_timezone(&Utc))
}

fn map_flight_status(raw: RawFlight) -> Option<FlightStatus> {
    Some(FlightStatus {
        flight_iata: raw.flight.iata?.to_ascii_uppercase(),
        flight_date: raw.flight_date,
        status: raw.flight_status.unwrap_or_else(|| "unknown".to_string()),
        airline_name: raw.airline.and_then(|a| a.name),
        departure_airport: raw.departure.iata,
        departure_scheduled: utc(raw.departure.scheduled),
        departure_estimated: utc(raw.departure.estimated),
        departure_gate: raw.departure.gate,
        departure_terminal: raw.departure.terminal,
        arrival_airport: raw.arrival.iata,
        arrival_scheduled: utc(raw.arrival.scheduled),
        arrival_estimated: utc(raw.arrival.estimated),
        delay_minutes: raw.arrival.delay.or(raw.departure.delay),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_airline_records() {
        let raw = json!({
            "id": "1",
            "airline_name": "British Airways",
            "iata_code": "BA",
            "icao_code": "BAW",
            "country_name": "United Kingdom",
            "status": "active"
        });
        let airline = map_airline(serde_json::from_value(raw).unwrap()).unwrap();
        assert_eq!(airline.iata_code, "BA");
        assert_eq!(airline.icao_code.as_deref(), Some("BAW"));
        assert_eq!(airline.name, "British Airways");

        let nameless = json!({"iata_code": "ZZ"});
        assert!(map_airline(serde_json::from_value(nameless).unwrap()).is_none());
    }

    #[test]
    fn maps_airport_coordinates_from_strings_or_numbers() {
        let raw = json!({
            "airport_name": "Heathrow",
            "iata_code": "LHR",
            "icao_code": "EGLL",
            "latitude": "51.4775",
            "longitude": -0.461389,
            "timezone": "Europe/London",
            "country_name": "United Kingdom",
            "city_iata_code": "LON"
        });
        let airport = map_airport(serde_json::from_value(raw).unwrap()).unwrap();
        assert_eq!(airport.latitude, Some(51.4775));
        assert_eq!(airport.longitude, Some(-0.461389));
        assert_eq!(airport.city.as_deref(), Some("LON"));
    }

    #[test]
    fn maps_flight_status() {
        let raw = json!({
            "flight_date": "2026-11-02",
            "flight_status": "active",
            "departure": {
                "airport": "Heathrow", "iata": "LHR", "terminal": "5", "gate": "B32",
                "delay": 12,
                "scheduled": "2026-11-02T08:30:00+00:00",
                "estimated": "2026-11-02T08:42:00+00:00"
            },
            "arrival": {
                "airport": "John F Kennedy International", "iata": "JFK", "terminal": "7",
                "gate": null, "delay": null,
                "scheduled": "2026-11-02T11:40:00-05:00",
                "estimated": null
            },
            "airline": {"name": "British Airways", "iata": "BA"},
            "flight": {"number": "117", "iata": "BA117"}
        });
        let status = map_flight_status(serde_json::from_value(raw).unwrap()).unwrap();

        assert_eq!(status.flight_iata, "BA117");
        assert_eq!(status.status, "active");
        assert_eq!(status.delay_minutes, Some(12));
        assert_eq!(status.departure_gate.as_deref(), Some("B32"));
        assert_eq!(
            status.arrival_scheduled.unwrap().to_rfc3339(),
            "2026-11-02T16:40:00+00:00"
        );
        assert!(status.arrival_estimated.is_none());
    }

    #[tokio::test]
    async fn disabled_without_access_key() {
        let client = AviationClient::new(Client::new(), "http://localhost:1/v1/", None);
        assert!(!client.is_enabled());
        assert!(matches!(client.airline("BA").await, Err(ApiError::Upstream(_))));
    }
}
