//! Summary statistics over the routing policies of the whole channel graph.

use adapters::{ChannelEdge, NodeAdapter};
use async_trait::async_trait;
use prometheus::Gauge;

use super::ScrapeCollector;
use crate::errors::MonitorError;
use crate::services::stats_compiler::{StatsCompiler, StatsReport};

/// min/max/avg/median gauges for one policy field.
struct StatsGauges {
    min: Gauge,
    max: Gauge,
    avg: Gauge,
    median: Gauge,
}

impl StatsGauges {
    fn new(family: &str, subject: &str) -> Result<Self, MonitorError> {
        let gauge = |stat: &str| {
            Gauge::new(
                format!("lnd_graph_{}_{}", family, stat),
                format!("{} {}", stat, subject),
            )
        };

        Ok(Self {
            min: gauge("min")?,
            max: gauge("max")?,
            avg: gauge("avg")?,
            median: gauge("median")?,
        })
    }

    fn set(&self, report: &StatsReport) {
        self.min.set(report.min);
        self.max.set(report.max);
        self.avg.set(report.avg);
        self.median.set(report.median);
    }

    fn collectors(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        vec![
            Box::new(self.min.clone()),
            Box::new(self.max.clone()),
            Box::new(self.avg.clone()),
            Box::new(self.median.clone()),
        ]
    }
}

/// Reports for every policy field, in the order of [`GraphCollector`]'s
/// gauge families.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStats {
    pub timelock_delta: StatsReport,
    pub min_htlc_msat: StatsReport,
    pub max_htlc_msat: StatsReport,
    pub fee_base_msat: StatsReport,
    pub fee_rate_msat: StatsReport,
}

/// Feeds both directions of every edge into one compiler per policy field.
pub fn compile_policy_stats(edges: &[ChannelEdge]) -> PolicyStats {
    let num_policies = edges.len() * 2;

    let mut timelock = StatsCompiler::new(num_policies);
    let mut min_htlc = StatsCompiler::new(num_policies);
    let mut max_htlc = StatsCompiler::new(num_policies);
    let mut fee_base = StatsCompiler::new(num_policies);
    let mut fee_rate = StatsCompiler::new(num_policies);

    let policies = edges
        .iter()
        .flat_map(|edge| [&edge.node1_policy, &edge.node2_policy])
        .flatten();
    for policy in policies {
        timelock.observe(f64::from(policy.time_lock_delta));
        min_htlc.observe(policy.min_htlc_msat as f64);
        max_htlc.observe(policy.max_htlc_msat as f64);
        fee_base.observe(policy.fee_base_msat as f64);
        fee_rate.observe(policy.fee_rate_milli_msat as f64);
    }

    PolicyStats {
        timelock_delta: timelock.report(),
        min_htlc_msat: min_htlc.report(),
        max_htlc_msat: max_htlc.report(),
        fee_base_msat: fee_base.report(),
        fee_rate_msat: fee_rate.report(),
    }
}

pub struct GraphCollector {
    timelock_delta: StatsGauges,
    min_htlc_msat: StatsGauges,
    max_htlc_msat: StatsGauges,
    fee_base_msat: StatsGauges,
    fee_rate_msat: StatsGauges,
}

impl GraphCollector {
    pub fn new() -> Result<Self, MonitorError> {
        Ok(Self {
            timelock_delta: StatsGauges::new(
                "timelock_delta",
                "time lock delta for a channel routing policy",
            )?,
            min_htlc_msat: StatsGauges::new(
                "min_htlc_msat",
                "min htlc for a channel routing policy in msat",
            )?,
            max_htlc_msat: StatsGauges::new(
                "max_htlc_msat",
                "max htlc for a channel routing policy in msat",
            )?,
            fee_base_msat: StatsGauges::new(
                "fee_base_msat",
                "base fee for a channel routing policy in msat",
            )?,
            fee_rate_msat: StatsGauges::new(
                "fee_rate_msat",
                "fee rate for a channel routing policy in msat",
            )?,
        })
    }
}

#[async_trait]
impl ScrapeCollector for GraphCollector {
    fn name(&self) -> &'static str {
        "graph"
    }

    fn collectors(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        [
            &self.timelock_delta,
            &self.min_htlc_msat,
            &self.max_htlc_msat,
            &self.fee_base_msat,
            &self.fee_rate_msat,
        ]
        .into_iter()
        .flat_map(StatsGauges::collectors)
        .collect()
    }

    async fn refresh(&self, node: &dyn NodeAdapter) -> Result<(), MonitorError> {
        let edges = node.describe_graph().await?;
        let stats = compile_policy_stats(&edges);

        self.timelock_delta.set(&stats.timelock_delta);
        self.min_htlc_msat.set(&stats.min_htlc_msat);
        self.max_htlc_msat.set(&stats.max_htlc_msat);
        self.fee_base_msat.set(&stats.fee_base_msat);
        self.fee_rate_msat.set(&stats.fee_rate_msat);

        Ok(())
    }
}
