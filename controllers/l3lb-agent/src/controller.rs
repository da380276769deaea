//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the watch
//! supervisors, the periodic resync and the reconciler together around a
//! single trigger queue:
//!
//! - One `WatchSupervisor` per watched kind (Services, Endpoints)
//! - An optional `ResyncTicker`
//! - One reconciliation loop consuming the queue
//!
//! SIGINT/SIGTERM enqueue the shutdown sentinel. Once the loop has drained
//! the queue, the background tasks are cancelled and joined.

use crate::cluster::{ClusterStateProvider, KubeClusterState};
use crate::config::Config;
use crate::error::ControllerError;
use crate::model::ResourceKind;
use crate::queue::{EventReceiver, EventSender, event_queue};
use crate::reconciler::Reconciler;
use crate::resync::ResyncTicker;
use crate::watcher::WatchSupervisor;
use ifaddr_client::{AddressBackend, IpCommandBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Main controller for the l3lb agent.
pub struct Controller {
    reconciler: Reconciler,
    cluster: Arc<dyn ClusterStateProvider>,
    sender: EventSender,
    receiver: EventReceiver,
    cancel: CancellationToken,
    watch_backoff: Duration,
    resync_interval: Option<Duration>,
}

impl Controller {
    /// Creates a controller talking to the Kubernetes API and the `ip` utility.
    pub async fn new(config: &Config) -> Result<Self, ControllerError> {
        info!("Initializing l3lb agent");

        let cluster = KubeClusterState::connect(
            config.in_cluster,
            config.node_name.clone(),
            config.address_source,
        )
        .await?;
        info!("Connected to Kubernetes API");

        let backend = IpCommandBackend::new(&config.ip_binary);
        Ok(Self::with_providers(config, Arc::new(cluster), Arc::new(backend)))
    }

    /// Creates a controller over arbitrary cluster and address providers.
    pub fn with_providers(
        config: &Config,
        cluster: Arc<dyn ClusterStateProvider>,
        backend: Arc<dyn AddressBackend>,
    ) -> Self {
        let reconciler =
            Reconciler::new(cluster.clone(), backend, config.prefix, config.interface.clone())
                .with_selector_match(config.selector_match)
                .with_status_patch(config.status_patch)
                .with_debug(config.debug);
        let (sender, receiver) = event_queue();

        Self {
            reconciler,
            cluster,
            sender,
            receiver,
            cancel: CancellationToken::new(),
            watch_backoff: config.watch_backoff,
            resync_interval: config.resync_interval,
        }
    }

    /// Handle that can enqueue triggers or request shutdown.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Runs until a shutdown signal is received.
    pub async fn run(self) -> Result<(), ControllerError> {
        let signals = spawn_signal_handler(self.sender())?;
        let result = self.run_until_shutdown().await;
        signals.abort();
        result
    }

    /// Runs until the shutdown sentinel is dequeued, without installing
    /// signal handlers.
    pub async fn run_until_shutdown(self) -> Result<(), ControllerError> {
        let Self {
            reconciler,
            cluster,
            sender,
            mut receiver,
            cancel,
            watch_backoff,
            resync_interval,
        } = self;

        let mut tasks: Vec<(String, JoinHandle<()>)> = Vec::new();
        for kind in [ResourceKind::Service, ResourceKind::Endpoints] {
            let supervisor =
                WatchSupervisor::new(kind, cluster.clone(), sender.clone(), watch_backoff);
            tasks.push((format!("{kind} watcher"), tokio::spawn(supervisor.run(cancel.clone()))));
        }
        if let Some(interval) = resync_interval {
            let ticker = ResyncTicker::new(interval, sender.clone());
            tasks.push(("resync ticker".to_string(), tokio::spawn(ticker.run(cancel.clone()))));
        }
        drop(sender);

        info!("l3lb agent running");

        info!("Performing startup reconciliation");
        if let Err(e) = reconciler.reconcile().await {
            warn!("Startup reconciliation failed (will retry on next trigger): {}", e);
        }

        let passes = run_consumer(&reconciler, &mut receiver).await;
        info!("Reconciliation loop stopped after {} passes, stopping background tasks", passes);

        cancel.cancel();
        let mut result = Ok(());
        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                error!("{} ended abnormally: {}", name, e);
                result = Err(ControllerError::Task(format!("{name}: {e}")));
            }
        }

        info!("l3lb agent stopped");
        result
    }
}

/// Runs one reconciliation per dequeued trigger until the queue reports
/// shutdown. Returns the number of passes run.
pub async fn run_consumer(reconciler: &Reconciler, receiver: &mut EventReceiver) -> usize {
    let mut passes = 0;
    while receiver.dequeue().await.is_some() {
        passes += 1;
        match reconciler.reconcile().await {
            Ok(report) => debug!(
                "Pass {} complete: {} candidates, {} status patches{}",
                passes,
                report.candidates.len(),
                report.status_patches,
                if report.gc_skipped { ", cleanup skipped" } else { "" }
            ),
            Err(e) => error!("Reconciliation failed: {}", e),
        }
    }
    passes
}

fn spawn_signal_handler(sender: EventSender) -> Result<JoinHandle<()>, ControllerError> {
    use tokio::signal::unix::{SignalKind, signal};

    let install = |kind: SignalKind| {
        signal(kind).map_err(|e| {
            ControllerError::Task(format!("failed to install signal handler: {e}"))
        })
    };
    let mut sigterm = install(SignalKind::terminate())?;
    let mut sigint = install(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
        if !sender.shutdown() {
            warn!("Reconciliation loop already stopped");
        }
    }))
}
