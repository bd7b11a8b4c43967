//! Handler functions for the scrape endpoint.
//!
//! A scrape refreshes the polling collectors against the node and renders the
//! registry, including the counters kept up to date by the stream monitors.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::services::data_aggregator::DataAggregator;

pub async fn scrape(State(aggregator): State<Arc<DataAggregator>>) -> Response {
    match aggregator.render().await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(%err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
