//! Airline, airport and flight-status records mirrored from the aviation data API

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Airline {
    pub iata_code: String,
    pub icao_code: Option<String>,
    pub name: String,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Airport {
    pub iata_code: String,
    pub icao_code: Option<String>,
    pub name: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Live status of a flight on a given day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightStatus {
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

/// `?q=` search over code, name and city
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReferenceQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// Normalise a flight designator like `ba 117` to `BA117`
pub fn normalize_flight_iata(raw: &str) -> Option<String> {
    let code: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    let valid = (3..=8).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_alphanumeric())
        && code.chars().take(2).all(|c| c.is_ascii_alphanumeric())
        && code.chars().skip(2).any(|c| c.is_ascii_digit());

    valid.then_some(code)
}

/// Two-character airline designator such as `BA` or `U2`
pub fn normalize_airline_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    (code.len() == 2 && code.chars().all(|c| c.is_ascii_alphanumeric())).then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flight_designators() {
        assert_eq!(normalize_flight_iata("ba 117"), Some("BA117".to_string()));
        assert_eq!(normalize_flight_iata("U24821"), Some("U24821".to_string()));
        assert_eq!(normalize_flight_iata("BA"), None);
        assert_eq!(normalize_flight_iata("BA-117"), None);
        assert_eq!(normalize_flight_iata("BAXYZ"), None);
    }

    #[test]
    fn airline_codes() {
        assert_eq!(normalize_airline_code(" ba"), Some("BA".to_string()));
        assert_eq!(normalize_airline_code("u2"), Some("U2".to_string()));
        assert_eq!(normalize_airline_code("BAW"), None);
    }
}
