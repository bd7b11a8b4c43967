//! Module for the optional health endpoint.
//!
//! The endpoint reports healthy only while the node answers a `get_info`
//! call, so a supervisor can restart the exporter when LND goes away.

pub mod handlers;
pub mod routes;
