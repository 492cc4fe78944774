//! Flight search across third-party providers.
//!
//! Each provider turns a [`FlightSearchQuery`] into normalised [`FlightOffer`]s.
//! [`FlightSearchService`] fans a search out to every configured provider and
//! merges the answers through price comparison.

pub mod amadeus;
pub mod duffel;

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::domain::flights::{FlightOffer, FlightSearchQuery};
use crate::domain::pricing::compare_offers;
use crate::error::ApiError;

pub use amadeus::AmadeusProvider;
pub use duffel::DuffelProvider;

#[async_trait]
pub trait FlightProvider: Send + Sync {
    /// Short name stored on offers and bookings, e.g. `amadeus`
    fn name(&self) -> &'static str;

    async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<FlightOffer>, ApiError>;
}

/// Aggregates every enabled provider
#[derive(Clone)]
pub struct FlightSearchService {
    providers: Vec<Arc<dyn FlightProvider>>,
}

impl FlightSearchService {
    pub fn new(providers: Vec<Arc<dyn FlightProvider>>) -> Self {
        Self { providers }
    }

    /// Enable the providers whose credentials are configured
    pub fn from_settings(settings: &Settings, http: reqwest::Client) -> Self {
        let mut providers: Vec<Arc<dyn FlightProvider>> = Vec::new();

        if let Some(amadeus) = &settings.amadeus {
            providers.push(Arc::new(AmadeusProvider::new(http.clone(), amadeus.clone())));
        }
        if let Some(duffel) = &settings.duffel {
            providers.push(Arc::new(DuffelProvider::new(http, duffel.clone())));
        }

        if providers.is_empty() {
            warn!("No flight providers configured; searches will fail");
        }

        Self::new(providers)
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Search all providers concurrently and compare the results.
    ///
    /// A failing provider is skipped; the search only fails when none answered.
    #[instrument(skip(self), fields(origin = %query.origin, destination = %query.destination))]
    pub async fn search(&self, query: &FlightSearchQuery) -> Result<Vec<FlightOffer>, ApiError> {
        if self.providers.is_empty() {
            return Err(ApiError::upstream("No flight providers are configured"));
        }

        let results = join_all(self.providers.iter().map(|p| p.search(query))).await;

        let mut offers = Vec::new();
        let mut answered = 0usize;
        for (provider, result) in self.providers.iter().zip(results) {
            match result {
                Ok(found) => {
                    info!(provider = provider.name(), offers = found.len(), "Provider answered");
                    answered += 1;
                    offers.extend(found);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Provider search failed");
                }
            }
        }

        if answered == 0 {
            return Err(ApiError::upstream("Every flight provider failed"));
        }

        if let Some(max_stops) = query.max_stops {
            offers.retain(|o| o.max_stops() <= max_stops as usize);
        }

        Ok(compare_offers(offers))
    }
}

/// Map a non-success provider response onto an upstream error
pub(crate) async fn upstream_error(provider: &str, response: reqwest::Response) -> ApiError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(300).collect();
    ApiError::upstream(format!("{} returned {}: {}", provider, status, snippet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flights::tests::{offer, segment};
    use chrono::NaiveDate;

    struct StaticProvider {
        name: &'static str,
        offers: Vec<FlightOffer>,
    }

    #[async_trait]
    impl FlightProvider for StaticProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _: &FlightSearchQuery) -> Result<Vec<FlightOffer>, ApiError> {
            Ok(self.offers.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl FlightProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn search(&self, _: &FlightSearchQuery) -> Result<Vec<FlightOffer>, ApiError> {
            Err(ApiError::upstream("timeout"))
        }
    }

    fn query(max_stops: Option<u32>) -> FlightSearchQuery {
        FlightSearchQuery {
            origin: "LHR".to_string(),
            destination: "JFK".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            return_date: None,
            adults: 1,
            cabin: Default::default(),
            max_stops,
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn merges_providers_and_skips_failures() {
        let ba = || segment("BA", "117", "LHR", "JFK", "2026-11-02T08:30");
        let service = FlightSearchService::new(vec![
            Arc::new(StaticProvider {
                name: "amadeus",
                offers: vec![offer("amadeus", "420.00", vec![ba()])],
            }),
            Arc::new(FailingProvider),
            Arc::new(StaticProvider {
                name: "duffel",
                offers: vec![
                    offer("duffel", "399.00", vec![ba()]),
                    offer("duffel", "350.00", vec![segment("VS", "3", "LHR", "JFK", "2026-11-02T11:00")]),
                ],
            }),
        ]);

        let offers = service.search(&query(None)).await.unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].validating_carrier, "VS");
        assert_eq!(offers[1].provider, "duffel");
        assert_eq!(offers[1].compared_providers, vec!["amadeus", "duffel"]);
    }

    #[tokio::test]
    async fn fails_only_when_every_provider_fails() {
        let service = FlightSearchService::new(vec![Arc::new(FailingProvider)]);
        assert!(matches!(
            service.search(&query(None)).await,
            Err(ApiError::Upstream(_))
        ));

        let service = FlightSearchService::new(vec![]);
        assert!(service.search(&query(None)).await.is_err());
    }

    #[tokio::test]
    async fn filters_by_max_stops() {
        let service = FlightSearchService::new(vec![Arc::new(StaticProvider {
            name: "amadeus",
            offers: vec![
                offer("amadeus", "300.00", vec![
                    segment("AA", "1", "LHR", "ORD", "2026-11-02T08:00"),
                    segment("AA", "2", "ORD", "JFK", "2026-11-02T14:00"),
                ]),
                offer("amadeus", "500.00", vec![segment("BA", "117", "LHR", "JFK", "2026-11-02T08:30")]),
            ],
        })]);

        let direct = service.search(&query(Some(0))).await.unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].validating_carrier, "BA");

        let any = service.search(&query(None)).await.unwrap();
        assert_eq!(any.len(), 2);
    }
}
