//! Duffel offer requests API

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::{upstream_error, FlightProvider};
use crate::config::DuffelSettings;
use crate::domain::flights::{
    parse_iso_duration_minutes, CabinClass, FlightOffer, FlightSearchQuery, FlightSegment,
    Itinerary, OfferPrice,
};
use crate::error::ApiError;

const PROVIDER: &str = "duffel";
const API_VERSION: &str = "v2";

#[derive(Clone)]
pub struct DuffelProvider {
    http: Client,
    settings: DuffelSettings,
}

impl DuffelProvider {
    pub fn new(http: Client, settings: DuffelSettings) -> Self {
        Self { http, settings }
    }
}

#[derive(Debug, Serialize)]
struct OfferRequestBody<'a> {
    data: OfferRequest<'a>,
}

#[derive(Debug, Serialize)]
struct OfferRequest<'a> {
    slices: Vec<SliceRequest<'a>>,
    passengers: Vec<PassengerRequest>,
    cabin_class: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_connections: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SliceRequest<'a> {
    origin: &'a str,
    destination: &'a str,
    departure_date: String,
}

#[derive(Debug, Serialize)]
struct PassengerRequest {
    #[serde(rename = "type")]
    kind: &'static str,
}

fn build_request(query: &FlightSearchQuery) -> OfferRequestBody<'_> {
    let mut slices = vec![SliceRequest {
        origin: &query.origin,
        destination: &query.destination,
        departure_date: query.departure_date.to_string(),
    }];
    if let Some(return_date) = query.return_date {
        slices.push(SliceRequest {
            origin: &query.destination,
            destination: &query.origin,
            departure_date: return_date.to_string(),
        });
    }

    OfferRequestBody {
        data: OfferRequest {
            slices,
            passengers: (0..query.adults).map(|_| PassengerRequest { kind: "adult" }).collect(),
            cabin_class: query.cabin.as_str(),
            max_connections: query.max_stops,
        },
    }
}

#[async_trait]
impl FlightProvider for DuffelProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip(self, query), fields(provider = PROVIDER))]
    async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<FlightOffer>, ApiError> {
        let url = format!("{}/air/offer_requests", self.settings.api_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.access_token)
            .header("Duffel-Version", API_VERSION)
            .query(&[("return_offers", "true")])
            .json(&build_request(query))
            .send()
            .await
            .map_err(|e| ApiError::upstream(format!("Duffel search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(upstream_error(PROVIDER, response).await);
        }

        let body: OfferRequestResponse = response
            .json()
            .await
            .map_err(|e| ApiError::upstream(format!("Invalid Duffel response: {}", e)))?;

        Ok(map_offers(body, query))
    }
}

// =============================================================================
// Response mapping
// =============================================================================

#[derive(Debug, Deserialize)]
struct OfferRequestResponse {
    data: OfferRequestData,
}

#[derive(Debug, Deserialize)]
struct OfferRequestData {
    #[serde(default)]
    offers: Vec<RawOffer>,
}

#[derive(Debug, Deserialize)]
struct RawOffer {
    id: String,
    total_amount: Decimal,
    total_currency: String,
    #[serde(default)]
    base_amount: Option<Decimal>,
    #[serde(default)]
    tax_amount: Option<Decimal>,
    owner: RawCarrier,
    slices: Vec<RawSlice>,
}

#[derive(Debug, Deserialize)]
struct RawCarrier {
    iata_code: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSlice {
    #[serde(default)]
    duration: Option<String>,
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    origin: RawPlace,
    destination: RawPlace,
    departing_at: NaiveDateTime,
    arriving_at: NaiveDateTime,
    marketing_carrier: RawCarrier,
    marketing_carrier_flight_number: String,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    passengers: Vec<RawSegmentPassenger>,
}

#[derive(Debug, Deserialize)]
struct RawPlace {
    iata_code: String,
}

#[derive(Debug, Deserialize)]
struct RawSegmentPassenger {
    #[serde(default)]
    cabin_class: Option<String>,
}

fn map_offers(body: OfferRequestResponse, query: &FlightSearchQuery) -> Vec<FlightOffer> {
    body.data
        .offers
        .into_iter()
        .filter_map(|raw| map_offer(raw, query))
        .collect()
}

fn map_offer(raw: RawOffer, query: &FlightSearchQuery) -> Option<FlightOffer> {
    let cabin = raw
        .slices
        .iter()
        .flat_map(|s| s.segments.iter())
        .flat_map(|s| s.passengers.iter())
        .find_map(|p| p.cabin_class.as_deref().and_then(CabinClass::parse))
        .unwrap_or(query.cabin);

    let itineraries: Vec<Itinerary> = raw
        .slices
        .into_iter()
        .map(|slice| {
            let segments: Vec<FlightSegment> = slice
                .segments
                .into_iter()
                .map(|s| FlightSegment {
                    duration_minutes: s
                        .duration
                        .as_deref()
                        .and_then(parse_iso_duration_minutes)
                        .unwrap_or_else(|| (s.arriving_at - s.departing_at).num_minutes()),
                    carrier_code: s.marketing_carrier.iata_code,
                    carrier_name: s.marketing_carrier.name,
                    flight_number: s.marketing_carrier_flight_number,
                    origin: s.origin.iata_code,
                    destination: s.destination.iata_code,
                    departure_at: s.departing_at,
                    arrival_at: s.arriving_at,
                })
                .collect();
            let duration_minutes = slice
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

    if itineraries.is_empty() {
        return None;
    }

    let total = raw.total_amount;
    let (base, taxes) = match (raw.base_amount, raw.tax_amount) {
        (Some(base), Some(taxes)) => (base, taxes),
        (Some(base), None) => (base, total - base),
        (None, Some(taxes)) => (total - taxes, taxes),
        (None, None) => (total, Decimal::ZERO),
    };

    Some(FlightOffer {
        id: Uuid::new_v4(),
        provider: PROVIDER.to_string(),
        provider_offer_id: raw.id,
        validating_carrier: raw.owner.iata_code,
        cabin,
        passengers: query.adults,
        seats_available: None,
        itineraries,
        price: OfferPrice {
            currency: raw.total_currency,
            base,
            taxes,
            total,
        },
        compared_providers: vec![],
    })
}
