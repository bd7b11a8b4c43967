//! Tracks final payment updates for throughput, success rate and the number
//! of HTLC attempts each payment needed.

use std::sync::Arc;

use adapters::{NodeAdapter, Payment, PaymentStatus};
use prometheus::core::Collector;
use prometheus::{exponential_buckets, Histogram, HistogramOpts, IntCounterVec, Opts};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::MonitorError;
use crate::services::stream_worker::StreamWorker;

#[derive(Clone)]
pub struct PaymentMetrics {
    pub total_payments: IntCounterVec,
    pub total_htlc_attempts: IntCounterVec,
    pub attempts_per_payment: Histogram,
}

impl PaymentMetrics {
    pub fn new() -> Result<Self, MonitorError> {
        Ok(Self {
            total_payments: IntCounterVec::new(
                Opts::new(
                    "lnd_total_payments",
                    "Total number of payments initiated, labeled by final status",
                ),
                &["status"],
            )?,
            total_htlc_attempts: IntCounterVec::new(
                Opts::new(
                    "lnd_total_htlc_attempts",
                    "Total number of HTLC attempts across all payments, labeled by final payment status",
                ),
                &["status"],
            )?,
            attempts_per_payment: Histogram::with_opts(
                HistogramOpts::new(
                    "lnd_payment_attempts_per_payment",
                    "Histogram tracking the number of attempts per payment",
                )
                .buckets(exponential_buckets(1.0, 2.0, 10)?),
            )?,
        })
    }

    pub fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.total_payments.clone()),
            Box::new(self.total_htlc_attempts.clone()),
            Box::new(self.attempts_per_payment.clone()),
        ]
    }

    /// Records one final payment update with all of its HTLC attempts.
    pub fn record(&self, payment: &Payment) {
        // Only terminal updates are subscribed to, anything else is unexpected.
        let status = match payment.status {
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            _ => "unknown",
        };

        self.total_payments.with_label_values(&[status]).inc();
        self.total_htlc_attempts
            .with_label_values(&[status])
            .inc_by(payment.htlc_attempts as u64);
        self.attempts_per_payment
            .observe(payment.htlc_attempts as f64);

        debug!(
            payment_hash = %payment.payment_hash,
            status,
            attempts = payment.htlc_attempts,
            "payment updated"
        );
    }
}

pub struct PaymentsMonitor {
    node: Arc<dyn NodeAdapter>,
    metrics: PaymentMetrics,
    errors: mpsc::Sender<MonitorError>,
    worker: StreamWorker,
}

impl PaymentsMonitor {
    pub fn new(
        node: Arc<dyn NodeAdapter>,
        errors: mpsc::Sender<MonitorError>,
    ) -> Result<Self, MonitorError> {
        Ok(Self {
            node,
            metrics: PaymentMetrics::new()?,
            errors,
            worker: StreamWorker::new("payments"),
        })
    }

    pub fn metrics(&self) -> &PaymentMetrics {
        &self.metrics
    }

    pub fn collectors(&self) -> Vec<Box<dyn Collector>> {
        self.metrics.collectors()
    }

    pub async fn start(&self) -> Result<(), MonitorError> {
        info!("Starting payments monitor");

        let ctx = CancellationToken::new();
        let subscription = match self.node.track_payments(ctx.clone()).await {
            Ok(subscription) => subscription,
            Err(err) => {
                ctx.cancel();
                return Err(err.into());
            }
        };

        let metrics = self.metrics.clone();
        self.worker
            .spawn(ctx, subscription, self.errors.clone(), move |payment| {
                metrics.record(&payment);
                Ok(())
            })
            .await
    }

    pub async fn stop(&self) {
        info!("Stopping payments monitor");
        self.worker.stop().await;
    }
}
