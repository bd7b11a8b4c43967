//! Collectors that build their metrics from point-in-time node snapshots.
//!
//! Each collector owns its prometheus metrics (registered once by the
//! aggregator) and refreshes their samples on every scrape.

pub mod channels;
pub mod graph;

use adapters::NodeAdapter;
use async_trait::async_trait;

use crate::errors::MonitorError;

pub use channels::ChannelsCollector;
pub use graph::GraphCollector;

#[async_trait]
pub trait ScrapeCollector: Send + Sync {
    fn name(&self) -> &'static str;

    /// The metric families this collector produces.
    fn collectors(&self) -> Vec<Box<dyn prometheus::core::Collector>>;

    /// Fetches a fresh snapshot from the node and updates the samples. On
    /// error the previous samples are left untouched.
    async fn refresh(&self, node: &dyn NodeAdapter) -> Result<(), MonitorError>;
}
