//! Manages the connection to the monitored Lightning node.
//!
//! This module turns the LND section of the configuration into an
//! authenticated `NodeAdapter`, verifies the node is reachable, and checks its
//! identity against the expected pubkey when one is configured.

use std::sync::Arc;

use adapters::lnd::{LndConnection, LndNode};
use adapters::{AdapterError, NodeAdapter, NodeSummary};
use secp256k1::PublicKey;
use tracing::info;

use crate::config::LndConfig;
use crate::errors::MonitorError;

/// Connects to LND and returns the adapter together with the node's identity.
pub async fn connect(
    cfg: &LndConfig,
) -> Result<(Arc<dyn NodeAdapter>, NodeSummary), MonitorError> {
    let node = LndNode::connect(LndConnection {
        address: cfg.host.clone(),
        macaroon_path: cfg.macaroon_path.clone(),
        cert_path: cfg.tls_path.clone(),
        timeout: cfg.rpc_timeout(),
    })
    .await?;

    let node: Arc<dyn NodeAdapter> = Arc::new(node);
    let summary = node.get_info().await?;
    validate_identity(cfg.pubkey.as_ref(), &summary)?;

    info!(
        pubkey = %summary.identity_pubkey,
        alias = %summary.alias,
        active_channels = summary.num_active_channels,
        "connected to lnd"
    );

    Ok((node, summary))
}

/// Checks that the node we reached is the node we were asked to monitor.
pub fn validate_identity(
    expected: Option<&PublicKey>,
    summary: &NodeSummary,
) -> Result<(), MonitorError> {
    match expected {
        Some(expected) if *expected != summary.identity_pubkey => {
            Err(AdapterError::ValidationError(format!(
                "the configured node id {} does not match the node's identity {} ({})",
                expected, summary.identity_pubkey, summary.alias
            ))
            .into())
        }
        _ => Ok(()),
    }
}
