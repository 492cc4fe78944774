use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub redis: String,
    pub flight_providers: Vec<&'static str>,
    pub aviation_data: bool,
}

/// Overall status: the database is critical, Redis only degrades the service
fn overall_status(db_ok: bool, redis_ok: bool) -> (&'static str, StatusCode) {
    match (db_ok, redis_ok) {
        (true, true) => ("healthy", StatusCode::OK),
        (true, false) => ("degraded", StatusCode::OK),
        (false, _) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// GET /health - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (db_ok, redis_result) = tokio::join!(db::health_check(&state.db), state.cache.health_check());
    let redis_ok = redis_result.is_ok();

    let (status, status_code) = overall_status(db_ok, redis_ok);
    let label = |ok: bool| if ok { "ok" } else { "error" }.to_string();

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: label(db_ok),
                redis: label(redis_ok),
                flight_providers: state.flight_search.provider_names(),
                aviation_data: state.aviation.is_enabled(),
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_failure_is_unhealthy() {
        assert_eq!(overall_status(true, true), ("healthy", StatusCode::OK));
        assert_eq!(overall_status(true, false), ("degraded", StatusCode::OK));
        assert_eq!(
            overall_status(false, true),
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
        );
    }
}
