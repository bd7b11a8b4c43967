//! Central module for application-wide configuration settings.
//!
//! Every setting can be given on the command line or through an `LNMON_*`
//! environment variable. The configuration is parsed and validated once at
//! startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};
use secp256k1::PublicKey;

use crate::api::metrics::routes::METRICS_PATH;
use crate::errors::MonitorError;

/// Default first amount of the inbound fee series, in satoshis.
pub const DEFAULT_INBOUND_FEE_BASE_SAT: u64 = 100_000;

#[derive(Debug, Clone, Parser)]
#[command(name = "lnmon", version, about = "Prometheus exporter for an LND node")]
pub struct Config {
    #[command(flatten)]
    pub lnd: LndConfig,

    #[command(flatten)]
    pub prometheus: PrometheusConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Args)]
pub struct LndConfig {
    /// LND gRPC address.
    #[arg(long = "lnd.host", env = "LNMON_LND_HOST", default_value = "https://localhost:10009")]
    pub host: String,

    /// Path to the macaroon used to authenticate with LND.
    #[arg(long = "lnd.macaroonpath", env = "LNMON_LND_MACAROON_PATH")]
    pub macaroon_path: PathBuf,

    /// Path to LND's TLS certificate.
    #[arg(long = "lnd.tlspath", env = "LNMON_LND_TLS_PATH")]
    pub tls_path: PathBuf,

    /// Identity pubkey of the node we expect to connect to.
    #[arg(long = "lnd.pubkey", env = "LNMON_LND_PUBKEY")]
    pub pubkey: Option<PublicKey>,

    /// Timeout for a single LND call, in seconds.
    #[arg(long = "lnd.rpctimeout", env = "LNMON_LND_RPC_TIMEOUT", default_value_t = 30)]
    pub rpc_timeout_secs: u64,
}

impl LndConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

#[derive(Debug, Clone, Args)]
pub struct PrometheusConfig {
    /// Address the metrics endpoint listens on.
    #[arg(
        long = "prometheus.listenaddr",
        env = "LNMON_PROMETHEUS_LISTEN_ADDR",
        default_value = "127.0.0.1:9092"
    )]
    pub listen_addr: SocketAddr,

    /// First amount, in satoshis, of the doubling inbound fee series.
    #[arg(
        long = "prometheus.inboundfeebase",
        env = "LNMON_INBOUND_FEE_BASE_SAT",
        default_value_t = DEFAULT_INBOUND_FEE_BASE_SAT
    )]
    pub inbound_fee_base_sat: u64,
}

#[derive(Debug, Clone, Args)]
pub struct HealthConfig {
    /// Serve a health endpoint that checks the node is reachable.
    #[arg(long = "health.active", env = "LNMON_HEALTH_ACTIVE")]
    pub active: bool,

    #[arg(long = "health.path", env = "LNMON_HEALTH_PATH", default_value = "/health")]
    pub path: String,
}

#[derive(Debug, Clone, Args)]
pub struct LogConfig {
    /// Log filter directive, e.g. `info` or `lnmon=debug,adapters=info`.
    /// `RUST_LOG` takes precedence when set.
    #[arg(long = "log.level", env = "LNMON_LOG_LEVEL", default_value = "info")]
    pub level: String,

    /// Directory for rotated log files. Logs only go to stdout when unset.
    #[arg(long = "log.dir", env = "LNMON_LOG_DIR")]
    pub dir: Option<PathBuf>,

    /// Number of rotated log files to keep.
    #[arg(long = "log.maxfiles", env = "LNMON_LOG_MAX_FILES", default_value_t = 7)]
    pub max_files: usize,
}

impl Config {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.lnd.host.trim().is_empty() {
            return Err(MonitorError::Config("lnd host must be set".to_string()));
        }
        if self.lnd.rpc_timeout_secs == 0 {
            return Err(MonitorError::Config(
                "lnd rpc timeout must be greater than zero".to_string(),
            ));
        }
        if self.prometheus.inbound_fee_base_sat == 0 {
            return Err(MonitorError::Config(
                "inbound fee base amount must be greater than zero".to_string(),
            ));
        }
        if self.health.active && !self.health.path.starts_with('/') {
            return Err(MonitorError::Config(format!(
                "health path {:?} must start with '/'",
                self.health.path
            )));
        }
        if self.health.active && self.health.path == METRICS_PATH {
            return Err(MonitorError::Config(
                "health path conflicts with the metrics endpoint".to_string(),
            ));
        }
        if self.log.max_files == 0 {
            return Err(MonitorError::Config(
                "at least one log file must be retained".to_string(),
            ));
        }

        Ok(())
    }
}
