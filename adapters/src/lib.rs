//! Core `adapters` crate for abstracting Lightning Network node interactions.
//!
//! This crate defines the `NodeAdapter` trait, which outlines the functionality
//! the monitoring agent needs from a Lightning node: point-in-time snapshot
//! queries and long-lived event subscriptions. The concrete LND implementation
//! lives in [`lnd`].

pub mod errors;
pub mod lnd;
pub mod models;

use async_trait::async_trait;
use secp256k1::PublicKey;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use errors::AdapterError;
pub use models::*;

/// A live event subscription.
///
/// Events and stream level errors are delivered on separate channels. The
/// `events` channel closing without an error means the node ended the stream.
#[derive(Debug)]
pub struct Subscription<T> {
    pub events: mpsc::Receiver<T>,
    pub errors: mpsc::Receiver<AdapterError>,
}

impl<T> Subscription<T> {
    /// Creates a subscription together with the sending halves used by the
    /// producer side.
    pub fn channel(
        buffer: usize,
    ) -> (mpsc::Sender<T>, mpsc::Sender<AdapterError>, Subscription<T>) {
        let (event_tx, events) = mpsc::channel(buffer);
        let (err_tx, errors) = mpsc::channel(1);
        (event_tx, err_tx, Subscription { events, errors })
    }
}

#[async_trait]
pub trait NodeAdapter: Send + Sync {
    async fn get_info(&self) -> Result<NodeSummary, AdapterError>;

    async fn list_channels(&self) -> Result<Vec<Channel>, AdapterError>;

    async fn get_node_info(
        &self,
        pubkey: &PublicKey,
        include_channels: bool,
    ) -> Result<NodeInfo, AdapterError>;

    async fn describe_graph(&self) -> Result<Vec<ChannelEdge>, AdapterError>;

    /// Subscribes to the node's HTLC event stream. The subscription is torn
    /// down once `ctx` is cancelled.
    async fn subscribe_htlc_events(
        &self,
        ctx: CancellationToken,
    ) -> Result<Subscription<HtlcEvent>, AdapterError>;

    /// Subscribes to final updates of outgoing payments. The subscription is
    /// torn down once `ctx` is cancelled.
    async fn track_payments(
        &self,
        ctx: CancellationToken,
    ) -> Result<Subscription<Payment>, AdapterError>;
}
