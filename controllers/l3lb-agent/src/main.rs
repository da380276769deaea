//! l3lb Agent
//!
//! Node-local agent that binds the addresses of Kubernetes LoadBalancer
//! services to a host interface whenever a ready pod backing the service
//! runs on this node, and releases them when it no longer does.
//!
//! Routing the addresses to the node (BGP, ARP, static routes) is left to
//! other components.

mod backoff;
mod cluster;
mod config;
mod controller;
mod error;
mod model;
mod queue;
mod reconcile_helpers;
mod reconciler;
mod resync;
mod selector;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // Configuration errors are fatal before anything else starts
    let config = Config::from_env()?;

    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // kube's rustls stack needs a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting l3lb agent");
    info!("Configuration:");
    info!("  Node: {}", config.node_name);
    info!("  Interface: {}", config.interface);
    info!("  Prefix: {}", config.prefix);
    info!("  Selector match: {:?}", config.selector_match);
    info!("  Address source: {:?}", config.address_source);
    info!("  Watch backoff: {:?}", config.watch_backoff);
    match config.resync_interval {
        Some(interval) => info!("  Resync interval: {:?}", interval),
        None => info!("  Resync: disabled"),
    }
    info!("  Status patch: {}", if config.status_patch { "enabled" } else { "disabled" });

    // Initialize and run controller
    let controller = Controller::new(&config).await?;
    controller.run().await?;

    Ok(())
}
