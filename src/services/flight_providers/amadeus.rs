//! Amadeus self-service flight offers API

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{upstream_error, FlightProvider};
use crate::config::AmadeusSettings;
use crate::domain::flights::{
    parse_iso_duration_minutes, CabinClass, FlightOffer, FlightSearchQuery, FlightSegment,
    Itinerary, OfferPrice,
};
use crate::error::ApiError;

const PROVIDER: &str = "amadeus";
const MAX_RESULTS: u32 = 50;
/// Refresh the token this long before Amadeus says it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct AmadeusProvider {
    http: Client,
    settings: AmadeusSettings,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl AmadeusProvider {
    pub fn new(http: Client, settings: AmadeusSettings) -> Self {
        Self {
            http,
            settings,
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// OAuth2 client-credentials token, reused until shortly before expiry
    async fn access_token(&self) -> Result<String, ApiError> {
        let cached = self.token.read().clone();
        if let Some(cached) = cached {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token);
            }
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let url = format!("{}/v1/security/oauth2/token", self.settings.api_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::upstream(format!("Amadeus token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(upstream_error(PROVIDER, response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::upstream(format!("Invalid Amadeus token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *self.token.write() = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        debug!(expires_in = token.expires_in, "Fetched Amadeus access token");
        Ok(token.access_token)
    }
}

#[async_trait]
impl FlightProvider for AmadeusProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip(self, query), fields(provider = PROVIDER))]
    async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<FlightOffer>, ApiError> {
        let token = self.access_token().await?;

        let mut params: Vec<(&str, String)> = vec![
            ("originLocationCode", query.origin.clone()),
            ("destinationLocationCode", query.destination.clone()),
            ("departureDate", query.departure_date.to_string()),
            ("adults", query.adults.to_string()),
            ("travelClass", travel_class(query.cabin).to_string()),
            ("currencyCode", query.currency.clone()),
            ("max", MAX_RESULTS.to_string()),
        ];
        if let Some(return_date) = query.return_date {
            params.push(("returnDate", return_date.to_string()));
        }
        if query.max_stops == Some(0) {
            params.push(("nonStop", "true".to_string()));
        }

        let url = format!("{}/v2/shopping/flight-offers", self.settings.api_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&params)
            .send()
            .await
            .map_err(|e| ApiError::upstream(format!("Amadeus search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(upstream_error(PROVIDER, response).await);
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ApiError::upstream(format!("Invalid Amadeus search response: {}", e)))?;

        Ok(map_offers(body, query))
    }
}

fn travel_class(cabin: CabinClass) -> &'static str {
    match cabin {
        CabinClass::Economy => "ECONOMY",
        CabinClass::PremiumEconomy => "PREMIUM_ECONOMY",
        CabinClass::Business => "BUSINESS",
        CabinClass::First => "FIRST",
    }
}

// =============================================================================
// Response mapping
// =============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RawOffer>,
    #[serde(default)]
    dictionaries: Dictionaries,
}

#[derive(Debug, Default, Deserialize)]
struct Dictionaries {
    #[serde(default)]
    carriers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOffer {
    id: String,
    #[serde(default)]
    number_of_bookable_seats: Option<u32>,
    itineraries: Vec<RawItinerary>,
    price: RawPrice,
    #[serde(default)]
    validating_airline_codes: Vec<String>,
    #[serde(default)]
    traveler_pricings: Vec<RawTravelerPricing>,
}

#[derive(Debug, Deserialize)]
struct RawItinerary {
    #[serde(default)]
    duration: Option<String>,
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSegment {
    departure: RawEndpoint,
    arrival: RawEndpoint,
    carrier_code: String,
    number: String,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndpoint {
    iata_code: String,
    at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrice {
    currency: String,
    base: Decimal,
    #[serde(default)]
    grand_total: Option<Decimal>,
    total: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTravelerPricing {
    #[serde(default)]
    fare_details_by_segment: Vec<RawFareDetail>,
}

#[derive(Debug, Deserialize)]
struct RawFareDetail {
    #[serde(default)]
    cabin: Option<String>,
}

fn map_offers(body: SearchResponse, query: &FlightSearchQuery) -> Vec<FlightOffer> {
    let carriers = &body.dictionaries.carriers;
    body.data
        .into_iter()
        .filter_map(|raw| map_offer(raw, carriers, query))
        .collect()
}

fn map_offer(
    raw: RawOffer,
    carriers: &HashMap<String, String>,
    query: &FlightSearchQuery,
) -> Option<FlightOffer> {
    let itineraries: Vec<Itinerary> = raw
        .itineraries
        .into_iter()
        .map(|itinerary| {
            let segments: Vec<FlightSegment> = itinerary
                .segments
                .into_iter()
                .map(|s| {
                    let duration_minutes = s
                        .duration
                        .as_deref()
                        .and_then(parse_iso_duration_minutes)
                        .unwrap_or_else(|| (s.arrival.at - s.departure.at).num_minutes());
                    FlightSegment {
                        carrier_name: carriers.get(&s.carrier_code).cloned(),
                        carrier_code: s.carrier_code,
                        flight_number: s.number,
                        origin: s.departure.iata_code,
                        destination: s.arrival.iata_code,
                        departure_at: s.departure.at,
                        arrival_at: s.arrival.at,
                        duration_minutes,
                    }
                })
                .collect();
            let duration_minutes = itinerary
                .duration
                .as_deref()
                .and_then(parse_iso_duration_minutes)
                .unwrap_or_else(|| segments.iter().map(|s| s.duration_minutes).sum());
            Itinerary {
                duration_minutes,
                segments,
            }
        })
        .filter(|i| !i.segments.is_empty())
        .collect();

    let first = itineraries.first()?.segments.first()?;
    let validating_carrier = raw
        .validating_airline_codes
        .first()
        .cloned()
        .unwrap_or_else(|| first.carrier_code.clone());

    let cabin = raw
        .traveler_pricings
        .iter()
        .flat_map(|t| t.fare_details_by_segment.iter())
        .find_map(|d| d.cabin.as_deref().and_then(CabinClass::parse))
        .unwrap_or(query.cabin);

    let total = raw.price.grand_total.unwrap_or(raw.price.total);

    Some(FlightOffer {
        id: Uuid::new_v4(),
        provider: PROVIDER.to_string(),
        provider_offer_id: raw.id,
        validating_carrier,
        cabin,
        passengers: query.adults,
        seats_available: raw.number_of_bookable_seats,
        itineraries,
        price: OfferPrice {
            currency: raw.price.currency,
            base: raw.price.base,
            taxes: total - raw.price.base,
            total,
        },
        compared_providers: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    const FIXTURE: &str = r#"{
        "data": [{
            "type": "flight-offer",
            "id": "1",
            "numberOfBookableSeats": 4,
            "itineraries": [{
                "duration": "PT8H10M",
                "segments": [{
                    "departure": {"iataCode": "LHR", "terminal": "5", "at": "2026-11-02T08:30:00"},
                    "arrival": {"iataCode": "JFK", "terminal": "7", "at": "2026-11-02T11:40:00"},
                    "carrierCode": "BA",
                    "number": "117",
                    "duration": "PT8H10M"
                }]
            }],
            "price": {"currency": "USD", "total": "612.40", "base": "410.00", "grandTotal": "612.40"},
            "validatingAirlineCodes": ["BA"],
            "travelerPricings": [{"fareDetailsBySegment": [{"segmentId": "1", "cabin": "ECONOMY"}]}]
        }, {
            "type": "flight-offer",
            "id": "2",
            "itineraries": [],
            "price": {"currency": "USD", "total": "1.00", "base": "1.00"}
        }],
        "dictionaries": {"carriers": {"BA": "BRITISH AIRWAYS"}}
    }"#;

    fn query() -> FlightSearchQuery {
        FlightSearchQuery {
            origin: "LHR".to_string(),
            destination: "JFK".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            return_date: None,
            adults: 2,
            cabin: CabinClass::Economy,
            max_stops: None,
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn maps_search_response() {
        let body: SearchResponse = serde_json::from_str(FIXTURE).unwrap();
        let offers = map_offers(body, &query());

        assert_eq!(offers.len(), 1, "offers without itineraries are dropped");
        let offer = &offers[0];
        assert_eq!(offer.provider, "amadeus");
        assert_eq!(offer.provider_offer_id, "1");
        assert_eq!(offer.passengers, 2);
        assert_eq!(offer.seats_available, Some(4));
        assert_eq!(offer.cabin, CabinClass::Economy);
        assert_eq!(offer.price.total, Decimal::from_str("612.40").unwrap());
        assert_eq!(offer.price.taxes, Decimal::from_str("202.40").unwrap());

        let segment = offer.first_segment().unwrap();
        assert_eq!(segment.designator(), "BA117");
        assert_eq!(segment.carrier_name.as_deref(), Some("BRITISH AIRWAYS"));
        assert_eq!(segment.duration_minutes, 490);
        assert_eq!(segment.flight_key(), "BA117-2026-11-02T08:30");
    }

    #[test]
    fn travel_classes() {
        assert_eq!(travel_class(CabinClass::PremiumEconomy), "PREMIUM_ECONOMY");
        assert_eq!(travel_class(CabinClass::First), "FIRST");
    }
}
