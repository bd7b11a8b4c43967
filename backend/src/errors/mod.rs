//! Global application error types and handlers.
//!
//! This module defines the error type shared by the collectors, the stream
//! monitors and the HTTP surface. Fatal errors travel through the aggregator's
//! error sink; everything else is propagated with `?` to the caller.

use adapters::{AdapterError, HtlcKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} event stream terminated")]
    StreamTerminated(&'static str),

    #[error("{stream} stream exited: {source}")]
    StreamExited {
        stream: &'static str,
        #[source]
        source: AdapterError,
    },

    #[error("Unknown event type for htlc {0}")]
    UnknownEventType(HtlcKey),

    #[error("Htlc {0} failed without a usable failure reason")]
    UnlabeledFailure(HtlcKey),

    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    #[error("Node {node} is not an endpoint of channel {channel_id}")]
    ForeignChannel { node: String, channel_id: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MonitorError {
    /// Returns true if the error is a deadline being exceeded on a node call.
    /// Those are expected under load and are not escalated.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MonitorError::Adapter(err) if err.is_timeout())
    }
}
