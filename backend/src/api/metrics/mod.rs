//! Module for the Prometheus scrape endpoint.

pub mod handlers;
pub mod routes;
