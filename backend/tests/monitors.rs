mod common;

use std::sync::Arc;
use std::time::Duration;

use adapters::{AdapterError, HtlcEventKind, HtlcEventType, NodeAdapter, Payment, PaymentStatus};
use lnmon::errors::MonitorError;
use lnmon::services::htlc_monitor::HtlcMonitor;
use lnmon::services::payments_monitor::PaymentsMonitor;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::timeout;

use common::{eventually, forward_event, ScriptedNode, SECOND, T0};

fn htlc_monitor() -> (Arc<ScriptedNode>, HtlcMonitor, mpsc::Receiver<MonitorError>) {
    let node = Arc::new(ScriptedNode::new());
    let (error_tx, error_rx) = mpsc::channel(10);
    let monitor = HtlcMonitor::new(node.clone() as Arc<dyn NodeAdapter>, error_tx).unwrap();
    (node, monitor, error_rx)
}

async fn next_error(errors: &mut mpsc::Receiver<MonitorError>) -> MonitorError {
    timeout(Duration::from_secs(1), errors.recv())
        .await
        .expect("no error reported")
        .expect("error sink closed")
}

#[tokio::test]
async fn forward_and_settle_are_correlated() {
    let (node, monitor, mut errors) = htlc_monitor();
    monitor.start().await.unwrap();
    let feed = node.take_htlc_feed();

    feed.events
        .send(forward_event(HtlcEventKind::Forward, T0))
        .await
        .unwrap();
    feed.events
        .send(forward_event(HtlcEventKind::Settle, T0 + 5 * SECOND))
        .await
        .unwrap();

    let metrics = monitor.metrics().clone();
    eventually(|| {
        metrics
            .resolved
            .with_label_values(&["settled", "7", "9", "forward", ""])
            .get()
            == 1
    })
    .await;

    let latency = metrics
        .resolution_time
        .with_label_values(&["settled", "7", "9", "forward"]);
    assert_eq!(latency.get_sample_count(), 1);
    assert_eq!(latency.get_sample_sum(), 5.0);

    monitor.stop().await;
    assert!(matches!(errors.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn link_failure_is_labelled_with_its_reason() {
    let (node, monitor, _errors) = htlc_monitor();
    monitor.start().await.unwrap();
    let feed = node.take_htlc_feed();

    feed.events
        .send(forward_event(HtlcEventKind::Forward, T0))
        .await
        .unwrap();
    feed.events
        .send(forward_event(
            HtlcEventKind::LinkFail {
                failure_detail: "INSUFFICIENT BALANCE".to_string(),
            },
            T0 + SECOND,
        ))
        .await
        .unwrap();

    let metrics = monitor.metrics().clone();
    eventually(|| {
        metrics
            .resolved
            .with_label_values(&["failed", "7", "9", "forward", "insufficient_balance"])
            .get()
            == 1
    })
    .await;

    monitor.stop().await;
}

#[tokio::test]
async fn stream_error_is_reported_and_subscription_cancelled() {
    let (node, monitor, mut errors) = htlc_monitor();
    monitor.start().await.unwrap();
    let feed = node.take_htlc_feed();

    feed.errors
        .send(AdapterError::StreamError("connection reset".to_string()))
        .await
        .unwrap();

    let err = next_error(&mut errors).await;
    assert!(matches!(
        err,
        MonitorError::StreamExited {
            stream: "htlc",
            source: AdapterError::StreamError(_)
        }
    ));

    eventually(|| feed.ctx.is_cancelled()).await;
    monitor.stop().await;
    assert!(matches!(errors.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn closed_stream_is_reported_as_terminated() {
    let (node, monitor, mut errors) = htlc_monitor();
    monitor.start().await.unwrap();
    let feed = node.take_htlc_feed();

    drop(feed.events);

    let err = next_error(&mut errors).await;
    assert!(matches!(err, MonitorError::StreamTerminated("htlc")));
    eventually(|| feed.ctx.is_cancelled()).await;

    monitor.stop().await;
}

#[tokio::test]
async fn unknown_event_type_stops_the_worker() {
    let (node, monitor, mut errors) = htlc_monitor();
    monitor.start().await.unwrap();
    let feed = node.take_htlc_feed();

    let mut event = forward_event(HtlcEventKind::Settle, T0);
    event.event_type = HtlcEventType::Unknown;
    feed.events.send(event).await.unwrap();

    let err = next_error(&mut errors).await;
    assert!(matches!(err, MonitorError::UnknownEventType(_)));
    eventually(|| feed.ctx.is_cancelled()).await;

    monitor.stop().await;
}

#[tokio::test]
async fn stop_before_start_is_a_no_op() {
    let (_node, monitor, mut errors) = htlc_monitor();

    monitor.stop().await;
    monitor.stop().await;

    assert!(matches!(errors.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn stop_is_quiet_and_idempotent() {
    let (node, monitor, mut errors) = htlc_monitor();
    monitor.start().await.unwrap();
    let feed = node.take_htlc_feed();

    monitor.stop().await;
    monitor.stop().await;

    assert!(feed.ctx.is_cancelled());
    assert!(matches!(errors.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn second_start_is_rejected() {
    let (node, monitor, _errors) = htlc_monitor();
    monitor.start().await.unwrap();

    let err = monitor.start().await.unwrap_err();
    assert!(matches!(err, MonitorError::AlreadyStarted("htlc")));

    let first = node.take_htlc_feed();
    let second = node.take_htlc_feed();
    assert!(second.ctx.is_cancelled());
    assert!(!first.ctx.is_cancelled());

    monitor.stop().await;
    assert!(first.ctx.is_cancelled());
}

#[tokio::test]
async fn payments_are_counted_by_status() {
    let node = Arc::new(ScriptedNode::new());
    let (error_tx, mut errors) = mpsc::channel(10);
    let monitor = PaymentsMonitor::new(node.clone() as Arc<dyn NodeAdapter>, error_tx).unwrap();
    monitor.start().await.unwrap();
    let feed = node.take_payment_feed();

    for (status, htlc_attempts) in [
        (PaymentStatus::Succeeded, 1),
        (PaymentStatus::Failed, 4),
        (PaymentStatus::Succeeded, 2),
    ] {
        feed.events
            .send(Payment {
                payment_hash: "ab".repeat(32),
                status,
                htlc_attempts,
            })
            .await
            .unwrap();
    }

    let metrics = monitor.metrics().clone();
    eventually(|| metrics.attempts_per_payment.get_sample_count() == 3).await;

    assert_eq!(metrics.total_payments.with_label_values(&["succeeded"]).get(), 2);
    assert_eq!(metrics.total_payments.with_label_values(&["failed"]).get(), 1);
    assert_eq!(metrics.total_htlc_attempts.with_label_values(&["succeeded"]).get(), 3);
    assert_eq!(metrics.total_htlc_attempts.with_label_values(&["failed"]).get(), 4);

    drop(feed.events);
    let err = next_error(&mut errors).await;
    assert!(matches!(err, MonitorError::StreamTerminated("payments")));

    monitor.stop().await;
}
