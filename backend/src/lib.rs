//! `lnmon` exports HTLC, payment, fee and channel graph analytics of an LND
//! node as Prometheus metrics.
//!
//! The binary wires the modules below together; they are exposed as a library
//! so the monitors and collectors can be driven from integration tests.

pub mod api;
pub mod config;
pub mod errors;
pub mod logging;
pub mod services;
