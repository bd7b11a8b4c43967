//! Correlates the node's HTLC event stream into resolution metrics.
//!
//! Forward events open an entry in the active table keyed by the incoming and
//! outgoing circuit; settle and fail events close it. Every resolution bumps
//! the outcome counter, and resolutions of forwards and sends that can be
//! matched to their forward event also record how long the HTLC was in
//! flight. HTLCs are only tracked in memory, so resolutions of HTLCs that were
//! forwarded before we started are counted without a latency sample.
//!
//! Entries whose resolution never arrives stay in the table; there is no
//! eviction.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use adapters::{HtlcEvent, HtlcEventKind, HtlcEventType, HtlcKey, NodeAdapter};
use prometheus::core::Collector;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::MonitorError;
use crate::services::stream_worker::StreamWorker;

pub const OUTCOME_SETTLED: &str = "settled";
pub const OUTCOME_FAILED: &str = "failed";

pub const TYPE_FORWARD: &str = "forward";
pub const TYPE_RECEIVE: &str = "receive";
pub const TYPE_SEND: &str = "send";

/// Failure reason used when a downstream node failed the HTLC back to us and
/// the actual reason is not known locally.
pub const FAILURE_REASON_EXTERNAL: &str = "failed_back";

const HTLC_LABELS: [&str; 4] = ["outcome", "chan_in", "chan_out", "type"];
const RESOLVED_LABELS: [&str; 5] = ["outcome", "chan_in", "chan_out", "type", "failure_reason"];

/// Resolution time buckets: 1s/10s/1m/2m/5m/10m and 1h/5h/1d/7d. An HTLC that
/// does not resolve quickly usually takes very long.
const RESOLUTION_BUCKETS: [f64; 10] = [
    1.0,
    10.0,
    60.0,
    60.0 * 2.0,
    60.0 * 5.0,
    60.0 * 10.0,
    60.0 * 60.0,
    60.0 * 60.0 * 5.0,
    60.0 * 60.0 * 24.0,
    60.0 * 60.0 * 24.0 * 7.0,
];

/// Metric families fed by the HTLC stream. Clones share the underlying
/// atomic series.
#[derive(Clone)]
pub struct HtlcMetrics {
    pub resolved: IntCounterVec,
    pub resolution_time: HistogramVec,
}

impl HtlcMetrics {
    pub fn new() -> Result<Self, MonitorError> {
        let resolved = IntCounterVec::new(
            Opts::new("resolved_htlcs", "count of resolved htlcs")
                .namespace("lnd")
                .subsystem("htlcs"),
            &RESOLVED_LABELS,
        )?;
        let resolution_time = HistogramVec::new(
            HistogramOpts::new("resolution_time", "the time (in seconds) taken to resolve a htlc")
                .namespace("lnd")
                .subsystem("htlcs")
                .buckets(RESOLUTION_BUCKETS.to_vec()),
            &HTLC_LABELS,
        )?;

        Ok(Self {
            resolved,
            resolution_time,
        })
    }

    pub fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.resolved.clone()),
            Box::new(self.resolution_time.clone()),
        ]
    }
}

/// Labels identifying one resolution. Settled HTLCs carry an empty failure
/// reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionLabels {
    pub outcome: &'static str,
    pub direction: &'static str,
    pub chan_in: String,
    pub chan_out: String,
    pub failure_reason: String,
}

impl ResolutionLabels {
    fn for_event(
        event: &HtlcEvent,
        failure_reason: Option<&str>,
    ) -> Result<Self, MonitorError> {
        let key = event.key();
        let direction = match event.event_type {
            HtlcEventType::Forward => TYPE_FORWARD,
            HtlcEventType::Receive => TYPE_RECEIVE,
            HtlcEventType::Send => TYPE_SEND,
            HtlcEventType::Unknown => return Err(MonitorError::UnknownEventType(key)),
        };

        let (outcome, failure_reason) = match failure_reason {
            None => (OUTCOME_SETTLED, String::new()),
            Some(reason) => {
                let reason = reason.trim().replace(' ', "_").to_lowercase();
                if reason.is_empty() {
                    return Err(MonitorError::UnlabeledFailure(key));
                }
                (OUTCOME_FAILED, reason)
            }
        };

        Ok(Self {
            outcome,
            direction,
            chan_in: key.incoming.chan_id.to_string(),
            chan_out: key.outgoing.chan_id.to_string(),
            failure_reason,
        })
    }

    pub fn counter_values(&self) -> [&str; 5] {
        [
            self.outcome,
            &self.chan_in,
            &self.chan_out,
            self.direction,
            &self.failure_reason,
        ]
    }

    pub fn histogram_values(&self) -> [&str; 4] {
        [self.outcome, &self.chan_in, &self.chan_out, self.direction]
    }
}

/// The correlation state: HTLCs forwarded but not yet resolved, with the time
/// their forward was observed. Owned by the worker task alone.
pub struct HtlcTracker {
    active: HashMap<HtlcKey, SystemTime>,
    metrics: HtlcMetrics,
}

impl HtlcTracker {
    pub fn new(metrics: HtlcMetrics) -> Self {
        Self {
            active: HashMap::new(),
            metrics,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, key: &HtlcKey) -> bool {
        self.active.contains_key(key)
    }

    pub fn process_event(&mut self, event: &HtlcEvent) -> Result<(), MonitorError> {
        match &event.event {
            HtlcEventKind::Forward => {
                // Receives have no upstream hop to time.
                if event.event_type == HtlcEventType::Receive {
                    return Ok(());
                }

                // The switch may replay forwards; keep the earliest timestamp.
                match self.active.entry(event.key()) {
                    Entry::Occupied(_) => info!(key = %event.key(), "htlc replayed"),
                    Entry::Vacant(entry) => {
                        entry.insert(event.timestamp());
                    }
                }
                Ok(())
            }
            HtlcEventKind::Settle => self.record_resolution(event, None),
            HtlcEventKind::ForwardFail => {
                self.record_resolution(event, Some(FAILURE_REASON_EXTERNAL))
            }
            HtlcEventKind::LinkFail { failure_detail } => {
                self.record_resolution(event, Some(failure_detail.as_str()))
            }
            HtlcEventKind::Subscribed | HtlcEventKind::FinalHtlc | HtlcEventKind::Other => Ok(()),
        }
    }

    fn record_resolution(
        &mut self,
        event: &HtlcEvent,
        failure_reason: Option<&str>,
    ) -> Result<(), MonitorError> {
        let labels = ResolutionLabels::for_event(event, failure_reason)?;

        self.metrics
            .resolved
            .with_label_values(&labels.counter_values())
            .inc();

        if event.event_type == HtlcEventType::Receive {
            return Ok(());
        }

        let key = event.key();
        let Some(forwarded_at) = self.active.remove(&key) else {
            info!(%key, "resolved htlc: original forward not found");
            return Ok(());
        };

        let elapsed = event
            .timestamp()
            .duration_since(forwarded_at)
            .unwrap_or_default();
        debug!(%key, outcome = labels.outcome, elapsed_secs = elapsed.as_secs_f64(), "htlc resolved");

        self.metrics
            .resolution_time
            .with_label_values(&labels.histogram_values())
            .observe(elapsed.as_secs_f64());

        Ok(())
    }
}

/// Runs an [`HtlcTracker`] over the node's HTLC event subscription.
pub struct HtlcMonitor {
    node: Arc<dyn NodeAdapter>,
    metrics: HtlcMetrics,
    errors: mpsc::Sender<MonitorError>,
    worker: StreamWorker,
}

impl HtlcMonitor {
    pub fn new(
        node: Arc<dyn NodeAdapter>,
        errors: mpsc::Sender<MonitorError>,
    ) -> Result<Self, MonitorError> {
        Ok(Self {
            node,
            metrics: HtlcMetrics::new()?,
            errors,
            worker: StreamWorker::new("htlc"),
        })
    }

    pub fn metrics(&self) -> &HtlcMetrics {
        &self.metrics
    }

    pub fn collectors(&self) -> Vec<Box<dyn Collector>> {
        self.metrics.collectors()
    }

    /// Subscribes to HTLC events and starts the consumer task.
    pub async fn start(&self) -> Result<(), MonitorError> {
        info!("Starting htlc monitor");

        let ctx = CancellationToken::new();
        let subscription = match self.node.subscribe_htlc_events(ctx.clone()).await {
            Ok(subscription) => subscription,
            Err(err) => {
                ctx.cancel();
                return Err(err.into());
            }
        };

        let mut tracker = HtlcTracker::new(self.metrics.clone());
        self.worker
            .spawn(ctx, subscription, self.errors.clone(), move |event| {
                tracker.process_event(&event)
            })
            .await
    }

    /// Stops the consumer task and waits for it to exit.
    pub async fn stop(&self) {
        info!("Stopping htlc monitor");
        self.worker.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const T0: u64 = 1_700_000_000_000_000_000;
    const SECOND: u64 = 1_000_000_000;

    fn event(event_type: HtlcEventType, kind: HtlcEventKind, timestamp_ns: u64) -> HtlcEvent {
        HtlcEvent {
            incoming_channel_id: 100,
            outgoing_channel_id: 200,
            incoming_htlc_id: 1,
            outgoing_htlc_id: 2,
            timestamp_ns,
            event_type,
            event: kind,
        }
    }

    fn tracker() -> (HtlcTracker, HtlcMetrics) {
        let metrics = HtlcMetrics::new().unwrap();
        (HtlcTracker::new(metrics.clone()), metrics)
    }

    fn resolved(metrics: &HtlcMetrics, values: [&str; 5]) -> u64 {
        metrics.resolved.with_label_values(&values).get()
    }

    fn latency(metrics: &HtlcMetrics, values: [&str; 4]) -> (u64, f64) {
        let h = metrics.resolution_time.with_label_values(&values);
        (h.get_sample_count(), h.get_sample_sum())
    }

    fn total_resolved(metrics: &HtlcMetrics) -> u64 {
        metrics
            .resolved
            .collect()
            .iter()
            .flat_map(|mf| mf.get_metric())
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }

    fn total_observations(metrics: &HtlcMetrics) -> u64 {
        metrics
            .resolution_time
            .collect()
            .iter()
            .flat_map(|mf| mf.get_metric())
            .map(|m| m.get_histogram().get_sample_count())
            .sum()
    }

    #[test]
    fn duplicate_forward_is_idempotent() {
        let (mut tracker, metrics) = tracker();
        let fwd = event(HtlcEventType::Forward, HtlcEventKind::Forward, T0);
        let replay = event(HtlcEventType::Forward, HtlcEventKind::Forward, T0 + 3 * SECOND);

        tracker.process_event(&fwd).unwrap();
        tracker.process_event(&replay).unwrap();

        assert_eq!(tracker.active_count(), 1);
        assert_eq!(total_resolved(&metrics), 0);
        assert_eq!(total_observations(&metrics), 0);

        // The earliest timestamp is kept.
        tracker
            .process_event(&event(HtlcEventType::Forward, HtlcEventKind::Settle, T0 + 10 * SECOND))
            .unwrap();
        assert_eq!(
            latency(&metrics, ["settled", "100", "200", "forward"]),
            (1, 10.0)
        );
    }

    #[test]
    fn settle_without_forward_counts_without_latency() {
        let (mut tracker, metrics) = tracker();

        tracker
            .process_event(&event(HtlcEventType::Forward, HtlcEventKind::Settle, T0))
            .unwrap();

        assert_eq!(resolved(&metrics, ["settled", "100", "200", "forward", ""]), 1);
        assert_eq!(total_resolved(&metrics), 1);
        assert_eq!(total_observations(&metrics), 0);
    }

    #[test]
    fn settle_records_resolution_latency() {
        let (mut tracker, metrics) = tracker();

        tracker
            .process_event(&event(HtlcEventType::Forward, HtlcEventKind::Forward, T0))
            .unwrap();
        tracker
            .process_event(&event(HtlcEventType::Forward, HtlcEventKind::Settle, T0 + 5 * SECOND))
            .unwrap();

        let (count, sum) = latency(&metrics, ["settled", "100", "200", "forward"]);
        assert_eq!(count, 1);
        assert!((sum - 5.0).abs() < 1e-9);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn forward_fail_uses_external_reason() {
        let (mut tracker, metrics) = tracker();

        tracker
            .process_event(&event(HtlcEventType::Send, HtlcEventKind::Forward, T0))
            .unwrap();
        tracker
            .process_event(&event(HtlcEventType::Send, HtlcEventKind::ForwardFail, T0 + SECOND))
            .unwrap();

        assert_eq!(resolved(&metrics, ["failed", "100", "200", "send", "failed_back"]), 1);
        assert_eq!(latency(&metrics, ["failed", "100", "200", "send"]), (1, 1.0));
    }

    #[test]
    fn link_fail_reason_is_normalized() {
        let (mut tracker, metrics) = tracker();
        let fail = HtlcEventKind::LinkFail {
            failure_detail: "Insufficient Balance".to_string(),
        };

        tracker
            .process_event(&event(HtlcEventType::Forward, fail, T0))
            .unwrap();

        assert_eq!(
            resolved(&metrics, ["failed", "100", "200", "forward", "insufficient_balance"]),
            1
        );
    }

    #[test]
    fn link_fail_without_reason_is_an_error() {
        let (mut tracker, _) = tracker();
        let fail = HtlcEventKind::LinkFail {
            failure_detail: "  ".to_string(),
        };

        let err = tracker
            .process_event(&event(HtlcEventType::Forward, fail, T0))
            .unwrap_err();

        assert!(matches!(err, MonitorError::UnlabeledFailure(_)));
    }

    #[test]
    fn receives_are_counted_but_never_tracked() {
        let (mut tracker, metrics) = tracker();

        tracker
            .process_event(&event(HtlcEventType::Receive, HtlcEventKind::Forward, T0))
            .unwrap();
        assert_eq!(tracker.active_count(), 0);

        tracker
            .process_event(&event(HtlcEventType::Receive, HtlcEventKind::Settle, T0 + SECOND))
            .unwrap();

        assert_eq!(resolved(&metrics, ["settled", "100", "200", "receive", ""]), 1);
        assert_eq!(total_observations(&metrics), 0);
    }

    #[test]
    fn receive_resolution_leaves_forward_record_alone() {
        let (mut tracker, _) = tracker();
        let fwd = event(HtlcEventType::Forward, HtlcEventKind::Forward, T0);

        tracker.process_event(&fwd).unwrap();
        tracker
            .process_event(&event(HtlcEventType::Receive, HtlcEventKind::Settle, T0))
            .unwrap();

        assert!(tracker.is_active(&fwd.key()));
    }

    #[test]
    fn unknown_event_type_is_an_error() {
        let (mut tracker, metrics) = tracker();

        let err = tracker
            .process_event(&event(HtlcEventType::Unknown, HtlcEventKind::Settle, T0))
            .unwrap_err();

        assert!(matches!(err, MonitorError::UnknownEventType(_)));
        assert_eq!(total_resolved(&metrics), 0);
    }

    #[test]
    fn informational_events_are_ignored() {
        let (mut tracker, metrics) = tracker();

        for kind in [
            HtlcEventKind::Subscribed,
            HtlcEventKind::FinalHtlc,
            HtlcEventKind::Other,
        ] {
            tracker
                .process_event(&event(HtlcEventType::Unknown, kind, T0))
                .unwrap();
        }

        assert_eq!(tracker.active_count(), 0);
        assert_eq!(total_resolved(&metrics), 0);
    }

    #[test]
    fn resolution_before_forward_timestamp_clamps_to_zero() {
        let (mut tracker, metrics) = tracker();

        tracker
            .process_event(&event(HtlcEventType::Forward, HtlcEventKind::Forward, T0))
            .unwrap();
        tracker
            .process_event(&event(HtlcEventType::Forward, HtlcEventKind::Settle, T0 - SECOND))
            .unwrap();

        assert_eq!(latency(&metrics, ["settled", "100", "200", "forward"]), (1, 0.0));
    }
}
