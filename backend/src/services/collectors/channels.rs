//! Inbound fee gauges derived from our channels' remote policies and remote
//! liquidity.

use std::collections::HashMap;

use adapters::{NodeAdapter, NodeInfo, RoutingPolicy};
use async_trait::async_trait;
use prometheus::{GaugeVec, Opts};
use secp256k1::PublicKey;
use tracing::debug;

use super::ScrapeCollector;
use crate::errors::MonitorError;
use crate::services::fee_estimator::approximate_inbound_fee;

const SATS_PER_BTC: u64 = 100_000_000;

pub struct ChannelsCollector {
    inbound_fee: GaugeVec,
    base_amount_sat: u64,
}

impl ChannelsCollector {
    /// `base_amount_sat` is the first amount of the inbound fee series and
    /// must be non-zero.
    pub fn new(base_amount_sat: u64) -> Result<Self, MonitorError> {
        if base_amount_sat == 0 {
            return Err(MonitorError::Config(
                "inbound fee base amount must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            inbound_fee: GaugeVec::new(
                Opts::new("inbound_fee", "fee charged for forwarding to this node"),
                &["amount"],
            )?,
            base_amount_sat,
        })
    }
}

#[async_trait]
impl ScrapeCollector for ChannelsCollector {
    fn name(&self) -> &'static str {
        "channels"
    }

    fn collectors(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        vec![Box::new(self.inbound_fee.clone())]
    }

    async fn refresh(&self, node: &dyn NodeAdapter) -> Result<(), MonitorError> {
        let info = node.get_info().await?;
        let channels = node.list_channels().await?;
        let node_info = node.get_node_info(&info.identity_pubkey, true).await?;

        let policies = remote_policies(&info.identity_pubkey, &node_info)?;
        let balances: HashMap<u64, u64> = channels
            .iter()
            .map(|c| (c.chan_id, c.remote_balance_sat))
            .collect();

        let series = inbound_fee_series(self.base_amount_sat, &policies, &balances);
        debug!(points = series.len(), "computed inbound fee series");

        self.inbound_fee.reset();
        for (amount, proportional_fee) in series {
            let amount = format_btc(amount);
            self.inbound_fee
                .with_label_values(&[amount.as_str()])
                .set(proportional_fee);
        }

        Ok(())
    }
}

/// Collects the policies our peers advertise for forwarding to us, keyed by
/// channel id. Disabled and missing policies are left out.
pub fn remote_policies(
    our_pubkey: &PublicKey,
    node_info: &NodeInfo,
) -> Result<HashMap<u64, RoutingPolicy>, MonitorError> {
    let mut policies = HashMap::new();
    for edge in &node_info.channels {
        let policy = if edge.node1_pub == *our_pubkey {
            &edge.node2_policy
        } else if edge.node2_pub == *our_pubkey {
            &edge.node1_policy
        } else {
            return Err(MonitorError::ForeignChannel {
                node: our_pubkey.to_string(),
                channel_id: edge.channel_id,
            });
        };

        if let Some(policy) = policy.as_ref().filter(|p| !p.disabled) {
            policies.insert(edge.channel_id, policy.clone());
        }
    }

    Ok(policies)
}

/// Proportional inbound fee for `base_amount_sat` and its doublings, up to
/// the first amount our remote liquidity cannot carry.
pub fn inbound_fee_series(
    base_amount_sat: u64,
    policies: &HashMap<u64, RoutingPolicy>,
    balances: &HashMap<u64, u64>,
) -> Vec<(u64, f64)> {
    let mut series = Vec::new();
    let mut amount = base_amount_sat;
    while amount > 0 {
        let Some(fee) = approximate_inbound_fee(amount, policies, balances) else {
            break;
        };
        series.push((amount, fee as f64 / amount as f64));

        match amount.checked_mul(2) {
            Some(next) => amount = next,
            None => break,
        }
    }

    series
}

/// Renders a satoshi amount in BTC, e.g. `0.001 BTC`.
pub fn format_btc(amount_sat: u64) -> String {
    let whole = amount_sat / SATS_PER_BTC;
    let frac = amount_sat % SATS_PER_BTC;
    if frac == 0 {
        return format!("{} BTC", whole);
    }

    let frac = format!("{:08}", frac);
    format!("{}.{} BTC", whole, frac.trim_end_matches('0'))
}
