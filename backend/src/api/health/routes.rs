//! Defines the configurable route of the health endpoint.

use std::sync::Arc;

use axum::{routing::get, Router};

use super::handlers::health_check;
use crate::services::data_aggregator::DataAggregator;

pub fn health_router(path: &str) -> Router<Arc<DataAggregator>> {
    Router::new().route(path, get(health_check))
}
