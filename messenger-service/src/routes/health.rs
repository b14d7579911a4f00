use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use messenger_shared::{HealthCheck, HealthResponse, HealthStatus};
use std::sync::Arc;

use crate::store::Store;
use crate::AppState;

/// Probe the database through the store.
pub fn database_check<S: Store>(store: &S) -> HealthCheck {
    match store.ping() {
        Ok(()) => HealthCheck {
            name: "postgres".into(),
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(e) => HealthCheck {
            name: "postgres".into(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
        },
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let response = HealthResponse::healthy("messenger-service", env!("CARGO_PKG_VERSION"))
        .with_checks(vec![database_check(state.store.as_ref())]);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
