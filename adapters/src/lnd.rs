//! LND-specific adapter implementation for Lightning Network node interactions.
//!
//! This file contains the concrete implementation of the `NodeAdapter` trait for
//! LND on top of the `tonic_lnd` gRPC client. It includes the authenticated
//! client wrapper, the pump that turns a gRPC server stream into a
//! [`Subscription`], and the conversion of LND's protobuf messages into the
//! generic models of this crate.

use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use secp256k1::PublicKey;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tonic_lnd::lnrpc::payment::PaymentStatus as LndPaymentStatus;
use tonic_lnd::lnrpc::{
    ChannelGraphRequest, GetInfoRequest, GetInfoResponse, ListChannelsRequest, NodeInfoRequest,
};
use tonic_lnd::routerrpc::htlc_event::{Event, EventType};
use tonic_lnd::routerrpc::{SubscribeHtlcEventsRequest, TrackPaymentsRequest};
use tonic_lnd::{lnrpc, routerrpc, Client};
use tracing::debug;

use crate::errors::AdapterError;
use crate::models::*;
use crate::{NodeAdapter, Subscription};

/// Capacity of the event channel between the stream pump and its consumer.
const STREAM_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct LndConnection {
    /// gRPC address of the node, e.g. `https://localhost:10009`.
    pub address: String,
    pub macaroon_path: PathBuf,
    pub cert_path: PathBuf,
    /// Deadline for request/response calls. Subscriptions are not bounded.
    pub timeout: Duration,
}

pub struct LndNode {
    client: Mutex<Client>,
    timeout: Duration,
}

impl LndNode {
    pub async fn connect(connection: LndConnection) -> Result<Self, AdapterError> {
        let client = tonic_lnd::connect(
            connection.address,
            connection.cert_path,
            connection.macaroon_path,
        )
        .await
        .map_err(|err| AdapterError::ConnectionError(err.to_string()))?;

        Ok(Self {
            client: Mutex::new(client),
            timeout: connection.timeout,
        })
    }

    /// Bounds a single call by the configured deadline.
    async fn call<T, E: Display>(
        &self,
        method: &'static str,
        fut: impl Future<Output = Result<T, E>>,
        on_error: fn(String) -> AdapterError,
    ) -> Result<T, AdapterError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(|err| on_error(err.to_string())),
            Err(_) => Err(AdapterError::Timeout(format!(
                "{} did not answer within {:?}",
                method, self.timeout
            ))),
        }
    }
}

/// Forwards converted stream items until the stream ends, fails, or `ctx` is
/// cancelled. Dropping the stream on exit cancels the RPC on the node.
///
/// A failure is sent on `errors` before `events` is dropped.
async fn pump<S, W, E, T>(
    mut stream: S,
    ctx: CancellationToken,
    events: mpsc::Sender<T>,
    errors: mpsc::Sender<AdapterError>,
    convert: fn(W) -> Result<T, AdapterError>,
) where
    S: Stream<Item = Result<W, E>> + Unpin,
    W: Send,
    E: Display + Send,
{
    loop {
        let item = tokio::select! {
            _ = ctx.cancelled() => {
                debug!("subscription cancelled");
                return;
            }
            item = stream.next() => item,
        };

        let item = match item {
            Some(Ok(item)) => convert(item),
            Some(Err(status)) => Err(AdapterError::StreamError(status.to_string())),
            // Dropping `events` tells the consumer the stream ended.
            None => return,
        };

        match item {
            Ok(item) => {
                if events.send(item).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = errors.send(err).await;
                return;
            }
        }
    }
}

fn spawn_pump<S, W, E, T>(
    stream: S,
    ctx: CancellationToken,
    convert: fn(W) -> Result<T, AdapterError>,
) -> Subscription<T>
where
    S: Stream<Item = Result<W, E>> + Send + 'static,
    W: Send + 'static,
    E: Display + Send + 'static,
    T: Send + 'static,
{
    let (event_tx, err_tx, subscription) = Subscription::channel(STREAM_BUFFER);
    tokio::spawn(pump(Box::pin(stream), ctx, event_tx, err_tx, convert));
    subscription
}

fn parse_pubkey(s: &str) -> Result<PublicKey, AdapterError> {
    PublicKey::from_str(s)
        .map_err(|err| AdapterError::DecodeError(format!("invalid pubkey {}: {}", s, err)))
}

/// LND reports some amounts as signed integers; they are never negative in
/// practice.
fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn convert_info(info: GetInfoResponse) -> Result<NodeSummary, AdapterError> {
    Ok(NodeSummary {
        identity_pubkey: parse_pubkey(&info.identity_pubkey)?,
        alias: info.alias,
        num_active_channels: info.num_active_channels,
    })
}

fn convert_policy(p: lnrpc::RoutingPolicy) -> RoutingPolicy {
    RoutingPolicy {
        time_lock_delta: p.time_lock_delta,
        min_htlc_msat: non_negative(p.min_htlc),
        max_htlc_msat: p.max_htlc_msat,
        fee_base_msat: non_negative(p.fee_base_msat),
        fee_rate_milli_msat: non_negative(p.fee_rate_milli_msat),
        disabled: p.disabled,
    }
}

fn convert_edge(e: lnrpc::ChannelEdge) -> Result<ChannelEdge, AdapterError> {
    Ok(ChannelEdge {
        channel_id: e.channel_id,
        node1_pub: parse_pubkey(&e.node1_pub)?,
        node2_pub: parse_pubkey(&e.node2_pub)?,
        node1_policy: e.node1_policy.map(convert_policy),
        node2_policy: e.node2_policy.map(convert_policy),
    })
}

fn convert_htlc_event(e: routerrpc::HtlcEvent) -> Result<HtlcEvent, AdapterError> {
    let event_type = match e.event_type() {
        EventType::Send => HtlcEventType::Send,
        EventType::Receive => HtlcEventType::Receive,
        EventType::Forward => HtlcEventType::Forward,
        EventType::Unknown => HtlcEventType::Unknown,
    };

    let event = match e.event {
        Some(Event::ForwardEvent(_)) => HtlcEventKind::Forward,
        Some(Event::SettleEvent(_)) => HtlcEventKind::Settle,
        Some(Event::ForwardFailEvent(_)) => HtlcEventKind::ForwardFail,
        Some(Event::LinkFailEvent(link_fail)) => HtlcEventKind::LinkFail {
            failure_detail: link_fail.failure_detail().as_str_name().to_string(),
        },
        Some(Event::SubscribedEvent(_)) => HtlcEventKind::Subscribed,
        Some(Event::FinalHtlcEvent(_)) => HtlcEventKind::FinalHtlc,
        None => HtlcEventKind::Other,
    };

    Ok(HtlcEvent {
        incoming_channel_id: e.incoming_channel_id,
        outgoing_channel_id: e.outgoing_channel_id,
        incoming_htlc_id: e.incoming_htlc_id,
        outgoing_htlc_id: e.outgoing_htlc_id,
        timestamp_ns: e.timestamp_ns,
        event_type,
        event,
    })
}

fn convert_payment(p: lnrpc::Payment) -> Result<Payment, AdapterError> {
    let status = match p.status() {
        LndPaymentStatus::Initiated => PaymentStatus::Initiated,
        LndPaymentStatus::InFlight => PaymentStatus::InFlight,
        LndPaymentStatus::Succeeded => PaymentStatus::Succeeded,
        LndPaymentStatus::Failed => PaymentStatus::Failed,
        _ => PaymentStatus::Unknown,
    };

    Ok(Payment {
        payment_hash: p.payment_hash,
        status,
        htlc_attempts: p.htlcs.len(),
    })
}

#[async_trait]
impl NodeAdapter for LndNode {
    async fn get_info(&self) -> Result<NodeSummary, AdapterError> {
        let mut client = self.client.lock().await;
        let info = self
            .call(
                "getinfo",
                client.lightning().get_info(GetInfoRequest {}),
                AdapterError::GetInfoError,
            )
            .await?
            .into_inner();

        convert_info(info)
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, AdapterError> {
        let mut client = self.client.lock().await;
        let resp = self
            .call(
                "listchannels",
                client.lightning().list_channels(ListChannelsRequest::default()),
                AdapterError::ListChannelsError,
            )
            .await?
            .into_inner();

        Ok(resp
            .channels
            .into_iter()
            .map(|c| Channel {
                chan_id: c.chan_id,
                remote_balance_sat: non_negative(c.remote_balance),
            })
            .collect())
    }

    async fn get_node_info(
        &self,
        pubkey: &PublicKey,
        include_channels: bool,
    ) -> Result<NodeInfo, AdapterError> {
        let request = NodeInfoRequest {
            pub_key: pubkey.to_string(),
            include_channels,
            ..Default::default()
        };

        let mut client = self.client.lock().await;
        let resp = self
            .call(
                "getnodeinfo",
                client.lightning().get_node_info(request),
                AdapterError::GetNodeInfoError,
            )
            .await?
            .into_inner();

        Ok(NodeInfo {
            channels: resp
                .channels
                .into_iter()
                .map(convert_edge)
                .collect::<Result<_, _>>()?,
        })
    }

    async fn describe_graph(&self) -> Result<Vec<ChannelEdge>, AdapterError> {
        let mut client = self.client.lock().await;
        let graph = self
            .call(
                "describegraph",
                client.lightning().describe_graph(ChannelGraphRequest::default()),
                AdapterError::DescribeGraphError,
            )
            .await?
            .into_inner();

        graph.edges.into_iter().map(convert_edge).collect()
    }

    async fn subscribe_htlc_events(
        &self,
        ctx: CancellationToken,
    ) -> Result<Subscription<HtlcEvent>, AdapterError> {
        let stream = self
            .client
            .lock()
            .await
            .router()
            .subscribe_htlc_events(SubscribeHtlcEventsRequest {})
            .await
            .map_err(|err| AdapterError::SubscribeError(err.to_string()))?
            .into_inner();

        Ok(spawn_pump(stream, ctx, convert_htlc_event))
    }

    async fn track_payments(
        &self,
        ctx: CancellationToken,
    ) -> Result<Subscription<Payment>, AdapterError> {
        // Only final updates are needed: every attempt is included in them.
        let request = TrackPaymentsRequest {
            no_inflight_updates: true,
        };

        let stream = self
            .client
            .lock()
            .await
            .router()
            .track_payments(request)
            .await
            .map_err(|err| AdapterError::SubscribeError(err.to_string()))?
            .into_inner();

        Ok(spawn_pump(stream, ctx, convert_payment))
    }
}
