//! Owns every metric source of the exporter and the registry they are
//! exposed through.
//!
//! The aggregator builds the polling collectors and the two stream monitors,
//! registers all of their metric families once, starts and stops the
//! monitors, and answers scrapes. Scrapes are serialised: each one refreshes
//! every polling collector against the node before the registry is encoded.

use std::sync::Arc;

use adapters::NodeAdapter;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::errors::MonitorError;
use crate::services::collectors::{ChannelsCollector, GraphCollector, ScrapeCollector};
use crate::services::htlc_monitor::HtlcMonitor;
use crate::services::payments_monitor::PaymentsMonitor;
use crate::services::stream_worker::report;

pub struct DataAggregator {
    node: Arc<dyn NodeAdapter>,
    registry: Registry,
    collectors: Vec<Box<dyn ScrapeCollector>>,
    htlcs: HtlcMonitor,
    payments: PaymentsMonitor,
    errors: mpsc::Sender<MonitorError>,
    scrape_lock: Mutex<()>,
}

impl DataAggregator {
    /// Builds and registers every collector. Fatal errors from the monitors
    /// and the scrape path are sent to `errors`.
    pub fn new(
        node: Arc<dyn NodeAdapter>,
        inbound_fee_base_sat: u64,
        errors: mpsc::Sender<MonitorError>,
    ) -> Result<Self, MonitorError> {
        let collectors: Vec<Box<dyn ScrapeCollector>> = vec![
            Box::new(ChannelsCollector::new(inbound_fee_base_sat)?),
            Box::new(GraphCollector::new()?),
        ];
        let htlcs = HtlcMonitor::new(node.clone(), errors.clone())?;
        let payments = PaymentsMonitor::new(node.clone(), errors.clone())?;

        let registry = Registry::new();
        let metrics = collectors
            .iter()
            .flat_map(|c| c.collectors())
            .chain(htlcs.collectors())
            .chain(payments.collectors());
        for metric in metrics {
            registry.register(metric)?;
        }

        Ok(Self {
            node,
            registry,
            collectors,
            htlcs,
            payments,
            errors,
            scrape_lock: Mutex::new(()),
        })
    }

    pub fn node(&self) -> &Arc<dyn NodeAdapter> {
        &self.node
    }

    pub fn htlc_monitor(&self) -> &HtlcMonitor {
        &self.htlcs
    }

    /// Starts both stream monitors. If the second one cannot start the first
    /// is stopped again.
    pub async fn start(&self) -> Result<(), MonitorError> {
        info!("Starting data aggregator");

        self.htlcs.start().await?;
        if let Err(err) = self.payments.start().await {
            self.htlcs.stop().await;
            return Err(err);
        }

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping data aggregator");

        self.payments.stop().await;
        self.htlcs.stop().await;
    }

    /// Refreshes every polling collector. A failing collector keeps its
    /// previous samples; timeouts are only logged.
    pub async fn refresh(&self) {
        let _scrape = self.scrape_lock.lock().await;
        self.refresh_collectors().await;
    }

    /// Refreshes the polling collectors and renders the whole registry in
    /// the Prometheus text format. The scrape lock is held until the registry
    /// is gathered so a concurrent refresh never shows up half done.
    pub async fn render(&self) -> Result<String, MonitorError> {
        let families = {
            let _scrape = self.scrape_lock.lock().await;
            self.refresh_collectors().await;
            self.registry.gather()
        };

        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;

        String::from_utf8(buf).map_err(|e| {
            MonitorError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Must be called with the scrape lock held.
    async fn refresh_collectors(&self) {
        for collector in &self.collectors {
            if let Err(err) = collector.refresh(self.node.as_ref()).await {
                if err.is_timeout() {
                    warn!(collector = collector.name(), %err, "collector refresh timed out");
                    continue;
                }

                error!(collector = collector.name(), %err, "collector refresh failed");
                report(&self.errors, err);
            }
        }
    }
}
