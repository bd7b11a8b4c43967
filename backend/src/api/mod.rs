//! Central module for organizing the application's HTTP endpoints.
//!
//! This module acts as a top-level container for the scrape endpoint and the
//! optional health check, and assembles them into a single router.

pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::Router;

use crate::config::HealthConfig;
use crate::services::data_aggregator::DataAggregator;

/// Builds the application router. The health route is only mounted when it is
/// enabled in the configuration.
pub fn router(aggregator: Arc<DataAggregator>, health: &HealthConfig) -> Router {
    let mut app = metrics::routes::metrics_router();
    if health.active {
        app = app.merge(health::routes::health_router(&health.path));
    }

    app.with_state(aggregator)
}
