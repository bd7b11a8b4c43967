//! In-memory node used to drive the monitors and collectors.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use adapters::{
    AdapterError, Channel, ChannelEdge, HtlcEvent, HtlcEventKind, HtlcEventType, NodeAdapter,
    NodeInfo, NodeSummary, Payment, RoutingPolicy, Subscription,
};
use async_trait::async_trait;
use secp256k1::PublicKey;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const OURS: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
pub const PEER: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

pub const T0: u64 = 1_700_000_000_000_000_000;
pub const SECOND: u64 = 1_000_000_000;

/// Sending halves of one subscription handed out by [`ScriptedNode`].
pub struct Feed<T> {
    pub events: mpsc::Sender<T>,
    pub errors: mpsc::Sender<AdapterError>,
    pub ctx: CancellationToken,
}

#[derive(Default)]
pub struct ScriptedNode {
    htlc_feeds: Mutex<Vec<Feed<HtlcEvent>>>,
    payment_feeds: Mutex<Vec<Feed<Payment>>>,
    graph_error: Mutex<Option<AdapterError>>,
}

impl ScriptedNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the oldest HTLC subscription that has not been taken yet.
    pub fn take_htlc_feed(&self) -> Feed<HtlcEvent> {
        self.htlc_feeds.lock().unwrap().remove(0)
    }

    pub fn take_payment_feed(&self) -> Feed<Payment> {
        self.payment_feeds.lock().unwrap().remove(0)
    }

    /// Makes the next `describe_graph` call fail with `err`.
    pub fn fail_graph_with(&self, err: AdapterError) {
        *self.graph_error.lock().unwrap() = Some(err);
    }

    fn open<T>(feeds: &Mutex<Vec<Feed<T>>>, ctx: CancellationToken) -> Subscription<T> {
        let (events, errors, subscription) = Subscription::channel(16);
        feeds.lock().unwrap().push(Feed {
            events,
            errors,
            ctx,
        });
        subscription
    }
}

pub fn key(s: &str) -> PublicKey {
    PublicKey::from_str(s).unwrap()
}

fn our_edge() -> ChannelEdge {
    ChannelEdge {
        channel_id: 7,
        node1_pub: key(OURS),
        node2_pub: key(PEER),
        node1_policy: Some(RoutingPolicy {
            time_lock_delta: 80,
            min_htlc_msat: 1_000,
            max_htlc_msat: 1_980_000_000,
            fee_base_msat: 0,
            fee_rate_milli_msat: 10,
            disabled: false,
        }),
        node2_policy: Some(RoutingPolicy {
            time_lock_delta: 40,
            min_htlc_msat: 1_000,
            max_htlc_msat: 1_980_000_000,
            fee_base_msat: 1_000,
            fee_rate_milli_msat: 100,
            disabled: false,
        }),
    }
}

#[async_trait]
impl NodeAdapter for ScriptedNode {
    async fn get_info(&self) -> Result<NodeSummary, AdapterError> {
        Ok(NodeSummary {
            identity_pubkey: key(OURS),
            alias: "scripted".to_string(),
            num_active_channels: 1,
        })
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, AdapterError> {
        Ok(vec![Channel {
            chan_id: 7,
            remote_balance_sat: 1_000_000,
        }])
    }

    async fn get_node_info(
        &self,
        _pubkey: &PublicKey,
        _include_channels: bool,
    ) -> Result<NodeInfo, AdapterError> {
        Ok(NodeInfo {
            channels: vec![our_edge()],
        })
    }

    async fn describe_graph(&self) -> Result<Vec<ChannelEdge>, AdapterError> {
        if let Some(err) = self.graph_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(vec![our_edge()])
    }

    async fn subscribe_htlc_events(
        &self,
        ctx: CancellationToken,
    ) -> Result<Subscription<HtlcEvent>, AdapterError> {
        Ok(Self::open(&self.htlc_feeds, ctx))
    }

    async fn track_payments(
        &self,
        ctx: CancellationToken,
    ) -> Result<Subscription<Payment>, AdapterError> {
        Ok(Self::open(&self.payment_feeds, ctx))
    }
}

pub fn forward_event(kind: HtlcEventKind, timestamp_ns: u64) -> HtlcEvent {
    HtlcEvent {
        incoming_channel_id: 7,
        outgoing_channel_id: 9,
        incoming_htlc_id: 1,
        outgoing_htlc_id: 4,
        timestamp_ns,
        event_type: HtlcEventType::Forward,
        event: kind,
    }
}

/// Polls `cond` until it holds, failing the test after a second.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
