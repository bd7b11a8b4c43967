//! Handler for the health endpoint.
//!
//! A `get_info` round trip decides the answer: `200 ok` while the node
//! responds, `500` with the error text otherwise.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use tracing::warn;

use crate::services::data_aggregator::DataAggregator;

pub async fn health_check(
    State(aggregator): State<Arc<DataAggregator>>,
) -> (StatusCode, String) {
    match aggregator.node().get_info().await {
        Ok(_) => (StatusCode::OK, "ok".to_string()),
        Err(err) => {
            warn!(%err, "health check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
