//! Clients for Redis and the third-party APIs, plus e-ticket rendering.

pub mod aviation;
pub mod cache;
pub mod flight_providers;
pub mod payments;
pub mod tickets;

pub use aviation::AviationClient;
pub use cache::RedisCache;
pub use flight_providers::FlightSearchService;
pub use payments::{PaymentGateway, StripeClient};
