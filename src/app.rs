use axum::{http::HeaderValue, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::SessionKeys;
use crate::config::Settings;
use crate::middleware::request_id_layer;
use crate::routes;
use crate::services::{AviationClient, FlightSearchService, PaymentGateway, RedisCache};

/// Largest request body accepted; booking payloads are well below this
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub cache: RedisCache,
    pub sessions: SessionKeys,
    pub flight_search: FlightSearchService,
    pub aviation: AviationClient,
    pub payments: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        settings: Settings,
        cache: RedisCache,
        flight_search: FlightSearchService,
        aviation: AviationClient,
        payments: Arc<dyn PaymentGateway>,
    ) -> Arc<Self> {
        let sessions = SessionKeys::from_settings(&settings);
        Arc::new(Self {
            db,
            settings,
            cache,
            sessions,
            flight_search,
            aviation,
            payments,
        })
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // Spans at DEBUG keep INFO output to the handlers' own events
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let (set_request_id, propagate_request_id) = request_id_layer();

    // Routes at root level, no /api prefix
    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let max_age = if settings.env.is_dev() {
        std::time::Duration::from_secs(86400)
    } else {
        std::time::Duration::from_secs(3600)
    };

    // Credentials are allowed so the session cookie travels with cross-origin requests
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::COOKIE,
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderName::from_static("idempotency-key"),
        ]))
        .allow_credentials(true)
        .max_age(max_age)
}
