//! Custom error types specific to the `adapters` crate.
//!
//! This module defines errors that can occur during node connection, RPC calls,
//! event subscriptions or data conversions within the adapter layer, providing a
//! unified error handling mechanism for all node interactions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("GetInfo error: {0}")]
    GetInfoError(String),

    #[error("ListChannels error: {0}")]
    ListChannelsError(String),

    #[error("GetNodeInfo error: {0}")]
    GetNodeInfoError(String),

    #[error("DescribeGraph error: {0}")]
    DescribeGraphError(String),

    #[error("Subscribe error: {0}")]
    SubscribeError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),
}

impl AdapterError {
    /// Returns true if the call failed because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AdapterError::Timeout(_))
    }
}
