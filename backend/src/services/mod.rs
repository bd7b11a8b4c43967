//! Module for core business logic services.
//!
//! This module holds the algorithms that turn node data into metrics (HTLC
//! correlation, inbound fee estimation, policy statistics), the stream
//! monitors and polling collectors built on them, the node connection
//! manager and the aggregator that ties everything together.

pub mod collectors;
pub mod data_aggregator;
pub mod fee_estimator;
pub mod htlc_monitor;
pub mod node_manager;
pub mod payments_monitor;
pub mod stats_compiler;
pub mod stream_worker;
