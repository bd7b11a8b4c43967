//! Main entry point for the lnmon exporter.
//!
//! This file parses the configuration, connects to LND, starts the stream
//! monitors and serves the metrics endpoint. The process runs until the
//! first fatal error or Ctrl-C, then stops the monitors and exits; restarting
//! is left to the supervisor.

use std::future::IntoFuture;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use lnmon::api;
use lnmon::config::Config;
use lnmon::errors::MonitorError;
use lnmon::logging::init_logging;
use lnmon::services::data_aggregator::DataAggregator;
use lnmon::services::node_manager;

/// Fatal errors beyond the first are only logged by their producers.
const ERROR_SINK_BUFFER: usize = 10;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    if let Err(err) = config.validate() {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    let _log_guard = match init_logging(&config.log) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "lnmon exited");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), MonitorError> {
    let (node, _) = node_manager::connect(&config.lnd).await?;

    let (error_tx, mut error_rx) = mpsc::channel(ERROR_SINK_BUFFER);
    let aggregator = Arc::new(DataAggregator::new(
        node,
        config.prometheus.inbound_fee_base_sat,
        error_tx,
    )?);
    aggregator.start().await?;

    let listener = match TcpListener::bind(config.prometheus.listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            aggregator.stop().await;
            return Err(err.into());
        }
    };
    info!(addr = %config.prometheus.listen_addr, "serving metrics");

    let app = api::router(aggregator.clone(), &config.health);
    let server = axum::serve(listener, app).into_future();

    let result = tokio::select! {
        err = error_rx.recv() => match err {
            Some(err) => Err(err),
            None => Ok(()),
        },
        res = server => match res {
            Ok(()) => Ok(()),
            Err(err) => Err(MonitorError::Io(err)),
        },
        res = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
            res.map_err(MonitorError::Io)
        }
    };

    aggregator.stop().await;
    result
}
