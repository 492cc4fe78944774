//! Flight search types
//!
//! Offers from every provider are normalised into [`FlightOffer`] before they are
//! compared, cached and booked.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cabin class requested by the traveller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Economy => "economy",
            Self::PremiumEconomy => "premium_economy",
            Self::Business => "business",
            Self::First => "first",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "economy" => Some(Self::Economy),
            "premium_economy" => Some(Self::PremiumEconomy),
            "business" => Some(Self::Business),
            "first" => Some(Self::First),
            _ => None,
        }
    }

    /// Premium cabins share the forward section of the seat map
    pub fn is_forward_cabin(&self) -> bool {
        matches!(self, Self::Business | Self::First)
    }
}

/// Query params for `GET /flights/search`
#[derive(Debug, Clone, Deserialize)]
pub struct FlightSearchParams {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    #[serde(default)]
    pub adults: Option<u32>,
    #[serde(default)]
    pub cabin: Option<CabinClass>,
    #[serde(default)]
    pub max_stops: Option<u32>,
}

/// Validated, normalised search sent to every provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlightSearchQuery {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub adults: u32,
    pub cabin: CabinClass,
    pub max_stops: Option<u32>,
    pub currency: String,
}

pub const MAX_PASSENGERS: u32 = 9;

impl FlightSearchQuery {
    pub fn from_params(
        params: FlightSearchParams,
        currency: &str,
        today: NaiveDate,
    ) -> Result<Self, String> {
        let origin = normalize_iata(&params.origin)
            .ok_or_else(|| format!("Invalid origin airport code: {}", params.origin))?;
        let destination = normalize_iata(&params.destination)
            .ok_or_else(|| format!("Invalid destination airport code: {}", params.destination))?;

        if origin == destination {
            return Err("Origin and destination must differ".to_string());
        }
        if params.departure_date < today {
            return Err("Departure date is in the past".to_string());
        }
        if let Some(ret) = params.return_date {
            if ret < params.departure_date {
                return Err("Return date must be on or after the departure date".to_string());
            }
        }

        let adults = params.adults.unwrap_or(1);
        if adults == 0 || adults > MAX_PASSENGERS {
            return Err(format!("Adults must be between 1 and {}", MAX_PASSENGERS));
        }

        Ok(Self {
            origin,
            destination,
            departure_date: params.departure_date,
            return_date: params.return_date,
            adults,
            cabin: params.cabin.unwrap_or_default(),
            max_stops: params.max_stops,
            currency: currency.to_uppercase(),
        })
    }

    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Stable cache key for this search
    pub fn cache_key(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}-{}-{}-{}",
            self.origin,
            self.destination,
            self.departure_date,
            self.return_date.map(|d| d.to_string()).unwrap_or_default(),
            self.adults,
            self.cabin.as_str(),
            self.max_stops.map(|s| s.to_string()).unwrap_or_default(),
            self.currency,
        )
    }
}

/// Uppercase a 3-letter IATA code, rejecting anything else
pub fn normalize_iata(code: &str) -> Option<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

/// One leg flown by a single aircraft
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightSegment {
    pub carrier_code: String,
    #[serde(default)]
    pub carrier_name: Option<String>,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    /// Local time at the departure airport as reported by the provider
    pub departure_at: NaiveDateTime,
    pub arrival_at: NaiveDateTime,
    pub duration_minutes: i64,
}

impl FlightSegment {
    /// e.g. `BA117`
    pub fn designator(&self) -> String {
        format!("{}{}", self.carrier_code, self.flight_number)
    }

    /// Identity of the physical flight, shared by every booking on it
    pub fn flight_key(&self) -> String {
        format!("{}-{}", self.designator(), self.departure_at.format("%Y-%m-%dT%H:%M"))
    }
}

/// Outbound or return journey
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Itinerary {
    pub duration_minutes: i64,
    pub segments: Vec<FlightSegment>,
}

impl Itinerary {
    pub fn stops(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }
}

/// Price for all passengers on the offer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferPrice {
    pub currency: String,
    pub base: Decimal,
    pub taxes: Decimal,
    pub total: Decimal,
}

/// A bookable offer from one provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightOffer {
    pub id: Uuid,
    pub provider: String,
    pub provider_offer_id: String,
    pub validating_carrier: String,
    pub cabin: CabinClass,
    pub passengers: u32,
    #[serde(default)]
    pub seats_available: Option<u32>,
    pub itineraries: Vec<Itinerary>,
    pub price: OfferPrice,
    /// Every provider selling this same flight, filled in by price comparison
    #[serde(default)]
    pub compared_providers: Vec<String>,
}

impl FlightOffer {
    pub fn outbound(&self) -> Option<&Itinerary> {
        self.itineraries.first()
    }

    pub fn first_segment(&self) -> Option<&FlightSegment> {
        self.outbound().and_then(|i| i.segments.first())
    }

    pub fn total_duration_minutes(&self) -> i64 {
        self.itineraries.iter().map(|i| i.duration_minutes).sum()
    }

    pub fn max_stops(&self) -> usize {
        self.itineraries.iter().map(Itinerary::stops).max().unwrap_or(0)
    }

    /// Key identifying the same set of flights regardless of who sells them
    pub fn identity(&self) -> String {
        let legs: Vec<String> = self
            .itineraries
            .iter()
            .flat_map(|i| i.segments.iter())
            .map(FlightSegment::flight_key)
            .collect();
        format!("{}|{}|{}", legs.join(","), self.cabin.as_str(), self.price.currency)
    }
}

/// Parse an ISO-8601 duration such as `PT7H10M` or `P1DT2H` into minutes
pub fn parse_iso_duration_minutes(s: &str) -> Option<i64> {
    let rest = s.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    let mut minutes = 0i64;
    let mut number = String::new();

    for c in date_part.chars() {
        match c {
            '0'..='9' => number.push(c),
            'D' => {
                minutes += number.parse::<i64>().ok()? * 24 * 60;
                number.clear();
            }
            _ => return None,
        }
    }
    if !number.is_empty() {
        return None;
    }

    for c in time_part.chars() {
        match c {
            '0'..='9' => number.push(c),
            'H' => {
                minutes += number.parse::<i64>().ok()? * 60;
                number.clear();
            }
            'M' => {
                minutes += number.parse::<i64>().ok()?;
                number.clear();
            }
            'S' => number.clear(),
            _ => return None,
        }
    }
    if !number.is_empty() {
        return None;
    }

    Some(minutes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::str::FromStr;

    pub fn segment(carrier: &str, number: &str, from: &str, to: &str, dep: &str) -> FlightSegment {
        let departure_at = NaiveDateTime::parse_from_str(dep, "%Y-%m-%dT%H:%M").unwrap();
        FlightSegment {
            carrier_code: carrier.to_string(),
            carrier_name: None,
            flight_number: number.to_string(),
            origin: from.to_string(),
            destination: to.to_string(),
            departure_at,
            arrival_at: departure_at + chrono::Duration::hours(2),
            duration_minutes: 120,
        }
    }

    pub fn offer(provider: &str, total: &str, segments: Vec<FlightSegment>) -> FlightOffer {
        let total = Decimal::from_str(total).unwrap();
        let duration = segments.iter().map(|s| s.duration_minutes).sum();
        FlightOffer {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            provider_offer_id: format!("{}-offer", provider),
            validating_carrier: segments[0].carrier_code.clone(),
            cabin: CabinClass::Economy,
            passengers: 1,
            seats_available: Some(9),
            itineraries: vec![Itinerary {
                duration_minutes: duration,
                segments,
            }],
            price: OfferPrice {
                currency: "USD".to_string(),
                base: total * Decimal::from_str("0.8").unwrap(),
                taxes: total * Decimal::from_str("0.2").unwrap(),
                total,
            },
            compared_providers: vec![],
        }
    }

    fn params(origin: &str, destination: &str, date: NaiveDate) -> FlightSearchParams {
        FlightSearchParams {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date: date,
            return_date: None,
            adults: None,
            cabin: None,
            max_stops: None,
        }
    }

    #[test]
    fn iso_durations() {
        assert_eq!(parse_iso_duration_minutes("PT7H10M"), Some(430));
        assert_eq!(parse_iso_duration_minutes("PT02H26M"), Some(146));
        assert_eq!(parse_iso_duration_minutes("PT45M"), Some(45));
        assert_eq!(parse_iso_duration_minutes("P1DT2H"), Some(26 * 60));
        assert_eq!(parse_iso_duration_minutes("7H"), None);
        assert_eq!(parse_iso_duration_minutes("PT7X"), None);
    }

    #[test]
    fn search_query_normalises_and_validates() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 11, 2).unwrap();

        let q = FlightSearchQuery::from_params(params(" lhr", "jfk ", date), "usd", today).unwrap();
        assert_eq!(q.origin, "LHR");
        assert_eq!(q.destination, "JFK");
        assert_eq!(q.adults, 1);
        assert_eq!(q.cabin, CabinClass::Economy);
        assert_eq!(q.currency, "USD");

        assert!(FlightSearchQuery::from_params(params("LHR", "LHR", date), "USD", today).is_err());
        assert!(FlightSearchQuery::from_params(params("LH", "JFK", date), "USD", today).is_err());

        let past = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        assert!(FlightSearchQuery::from_params(params("LHR", "JFK", past), "USD", today).is_err());

        let mut p = params("LHR", "JFK", date);
        p.return_date = Some(NaiveDate::from_ymd_opt(2026, 11, 1).unwrap());
        assert!(FlightSearchQuery::from_params(p, "USD", today).is_err());

        // Day trips
        let mut p = params("LHR", "CDG", date);
        p.return_date = Some(date);
        let q = FlightSearchQuery::from_params(p, "USD", today).unwrap();
        assert_eq!(q.return_date, Some(date));

        let mut p = params("LHR", "JFK", date);
        p.adults = Some(10);
        assert!(FlightSearchQuery::from_params(p, "USD", today).is_err());
    }

    #[test]
    fn identity_ignores_provider_and_price() {
        let a = offer("amadeus", "420.00", vec![segment("BA", "117", "LHR", "JFK", "2026-11-02T08:30")]);
        let b = offer("duffel", "399.00", vec![segment("BA", "117", "LHR", "JFK", "2026-11-02T08:30")]);
        let c = offer("duffel", "399.00", vec![segment("BA", "117", "LHR", "JFK", "2026-11-03T08:30")]);

        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.first_segment().unwrap().flight_key(), "BA117-2026-11-02T08:30");
    }
}
