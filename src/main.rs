mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use services::{AviationClient, FlightSearchService, RedisCache, StripeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting SkyBooker backend"
    );

    // Create database pool (runs migrations)
    let pool = db::create_pool(&settings).await?;

    // Create Redis cache
    let cache = RedisCache::new(&settings.redis_url, settings.redis_cache_ttl_seconds).await?;
    tracing::info!("Redis cache initialized");

    // One HTTP client for every third-party API
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.external_api_timeout_seconds))
        .user_agent(concat!("skybooker-backend/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let flight_search = FlightSearchService::from_settings(&settings, http_client.clone());
    let providers = flight_search.provider_names();
    if providers.is_empty() {
        tracing::warn!("No flight providers configured - searches will fail");
    } else {
        tracing::info!(providers = ?providers, "Flight providers enabled");
    }

    let aviation = AviationClient::new(
        http_client.clone(),
        &settings.aviationstack_api_url,
        settings.aviationstack_access_key.clone(),
    );
    if !aviation.is_enabled() {
        tracing::warn!("AVIATIONSTACK_ACCESS_KEY not set - reference data served from the database only");
    }

    let payments = Arc::new(StripeClient::new(
        http_client,
        &settings.stripe_api_url,
        &settings.stripe_secret_key,
    ));

    // Create application state
    let state = app::AppState::new(
        pool,
        settings.clone(),
        cache,
        flight_search,
        aviation,
        payments,
    );

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
