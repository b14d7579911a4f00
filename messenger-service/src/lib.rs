pub mod config;
pub mod engine;
pub mod models;
pub mod routes;
pub mod schema;
pub mod socket;
pub mod store;
pub mod transport;

use std::sync::Arc;

use crate::socket::Gateway;
use crate::store::PgStore;

pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<PgStore>,
    pub gateway: Gateway<PgStore>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}
