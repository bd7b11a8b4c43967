//! Approximation of the fee a sender pays on the last hop towards our node.
//!
//! The estimate assumes a multi-path sender with perfect knowledge of the
//! remote liquidity of every channel: the amount is split into shards and each
//! shard goes through the channel that is cheapest per satoshi at that point.
//! Real senders discover liquidity by trial and error, so the result is a
//! lower bound rather than a prediction.

use std::collections::{BTreeMap, HashMap};

use adapters::RoutingPolicy;

/// Fee in satoshis charged by `policy` for forwarding `amount_sat`.
fn forwarding_fee(policy: &RoutingPolicy, amount_sat: u64) -> u64 {
    let proportional =
        u128::from(amount_sat) * u128::from(policy.fee_rate_milli_msat) / 1_000_000;

    (policy.fee_base_msat / 1000).saturating_add(u64::try_from(proportional).unwrap_or(u64::MAX))
}

struct Shard {
    chan_id: u64,
    amount: u64,
    fee: u64,
    specific_fee: f64,
}

/// Returns the total fee in satoshis for receiving `amount_sat`, or `None` if
/// the remote liquidity of channels with a known policy cannot carry it.
///
/// `remote_policies` must only contain enabled policies. Channels with a
/// balance but no policy are ignored. Candidates are visited in ascending
/// channel id order and replaced only by a strictly cheaper one, so equal
/// specific fees resolve to the lowest channel id.
pub fn approximate_inbound_fee(
    amount_sat: u64,
    remote_policies: &HashMap<u64, RoutingPolicy>,
    remote_balances: &HashMap<u64, u64>,
) -> Option<u64> {
    let mut remaining_balances: BTreeMap<u64, u64> = remote_balances
        .iter()
        .map(|(chan_id, balance)| (*chan_id, *balance))
        .collect();

    let mut total_fee = 0u64;
    let mut amount_remaining = amount_sat;
    while amount_remaining > 0 {
        let mut best: Option<Shard> = None;

        for (chan_id, balance) in &remaining_balances {
            if *balance == 0 {
                continue;
            }
            let Some(policy) = remote_policies.get(chan_id) else {
                continue;
            };

            let amount = amount_remaining.min(*balance);
            let fee = forwarding_fee(policy, amount);
            let specific_fee = fee as f64 / amount as f64;

            if best.as_ref().map_or(true, |b| specific_fee < b.specific_fee) {
                best = Some(Shard {
                    chan_id: *chan_id,
                    amount,
                    fee,
                    specific_fee,
                });
            }
        }

        let shard = best?;
        amount_remaining -= shard.amount;
        total_fee = total_fee.saturating_add(shard.fee);
        if let Some(balance) = remaining_balances.get_mut(&shard.chan_id) {
            *balance -= shard.amount;
        }
    }

    Some(total_fee)
}
