//! Defines the HTTP route Prometheus scrapes.

use std::sync::Arc;

use axum::{routing::get, Router};

use super::handlers::scrape;
use crate::services::data_aggregator::DataAggregator;

pub const METRICS_PATH: &str = "/metrics";

pub fn metrics_router() -> Router<Arc<DataAggregator>> {
    Router::new().route(METRICS_PATH, get(scrape))
}
