//! Generic data models for the `adapters` crate.
//!
//! These models define common, abstracted representations of Lightning Network
//! entities (e.g. HTLC events, channels, routing policies, payments) that can be
//! used by any adapter implementation, allowing the backend services to interact
//! with a consistent data format.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use secp256k1::PublicKey;

/// Identifies one side of a forwarded HTLC: the channel it travels over and
/// the HTLC index on that channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CircuitKey {
    pub chan_id: u64,
    pub htlc_id: u64,
}

impl fmt::Display for CircuitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chan_id, self.htlc_id)
    }
}

/// Incoming and outgoing circuit of a single HTLC as seen by our node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HtlcKey {
    pub incoming: CircuitKey,
    pub outgoing: CircuitKey,
}

impl fmt::Display for HtlcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.incoming, self.outgoing)
    }
}

/// Direction of an HTLC relative to our node, as declared by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HtlcEventType {
    Unknown,
    Send,
    Receive,
    Forward,
}

/// Lifecycle stage reported by an HTLC event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtlcEventKind {
    /// The HTLC was offered to the next hop.
    Forward,
    /// The HTLC was settled.
    Settle,
    /// The HTLC was failed back to us by a downstream node.
    ForwardFail,
    /// The HTLC failed at our node. `failure_detail` is the node's own
    /// description of the failure.
    LinkFail { failure_detail: String },
    /// Confirmation that the subscription is live.
    Subscribed,
    /// The HTLC is irrevocably resolved on chain or off chain.
    FinalHtlc,
    /// An event without a payload this adapter recognises.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtlcEvent {
    pub incoming_channel_id: u64,
    pub outgoing_channel_id: u64,
    pub incoming_htlc_id: u64,
    pub outgoing_htlc_id: u64,
    /// Time the node observed the event, in nanoseconds since the unix epoch.
    pub timestamp_ns: u64,
    pub event_type: HtlcEventType,
    pub event: HtlcEventKind,
}

impl HtlcEvent {
    pub fn key(&self) -> HtlcKey {
        HtlcKey {
            incoming: CircuitKey {
                chan_id: self.incoming_channel_id,
                htlc_id: self.incoming_htlc_id,
            },
            outgoing: CircuitKey {
                chan_id: self.outgoing_channel_id,
                htlc_id: self.outgoing_htlc_id,
            },
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.timestamp_ns)
    }
}

/// Fee and HTLC limits a node advertises for forwarding over one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub time_lock_delta: u32,
    pub min_htlc_msat: u64,
    pub max_htlc_msat: u64,
    pub fee_base_msat: u64,
    pub fee_rate_milli_msat: u64,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEdge {
    pub channel_id: u64,
    pub node1_pub: PublicKey,
    pub node2_pub: PublicKey,
    /// Policy advertised by `node1_pub`.
    pub node1_policy: Option<RoutingPolicy>,
    /// Policy advertised by `node2_pub`.
    pub node2_policy: Option<RoutingPolicy>,
}

/// Graph view of a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub channels: Vec<ChannelEdge>,
}

/// Identity and high level state of the node we are connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub identity_pubkey: PublicKey,
    pub alias: String,
    pub num_active_channels: u32,
}

/// One of our own open channels, with the liquidity our peer holds in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub chan_id: u64,
    pub remote_balance_sat: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Unknown,
    Initiated,
    InFlight,
    Succeeded,
    Failed,
}

/// Final state of an outgoing payment together with all its HTLC attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub payment_hash: String,
    pub status: PaymentStatus,
    pub htlc_attempts: usize,
}
