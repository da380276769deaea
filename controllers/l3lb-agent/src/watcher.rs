//! Kubernetes resource watchers.
//!
//! One `WatchSupervisor` runs per watched resource kind. It keeps a watch
//! open, forwards relevant events to the reconciler as opaque triggers and
//! reconnects after a fixed backoff whenever the watch fails:
//!
//! `Connecting -> Streaming -> (error) Backoff -> Connecting`
//!
//! The loop only ends when its cancellation token fires.

use crate::backoff::FixedBackoff;
use crate::cluster::ClusterStateProvider;
use crate::error::ControllerError;
use crate::model::{ResourceKind, WatchEvent};
use crate::queue::{EventSender, ReconcileTrigger};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Watches one resource kind and feeds the reconciliation queue.
pub struct WatchSupervisor {
    kind: ResourceKind,
    cluster: Arc<dyn ClusterStateProvider>,
    queue: EventSender,
    backoff: FixedBackoff,
}

impl WatchSupervisor {
    /// Creates a supervisor for `kind`.
    pub fn new(
        kind: ResourceKind,
        cluster: Arc<dyn ClusterStateProvider>,
        queue: EventSender,
        backoff: Duration,
    ) -> Self {
        Self {
            kind,
            cluster,
            queue,
            backoff: FixedBackoff::new(backoff),
        }
    }

    /// Runs until `cancel` fires. Watch failures are logged and retried forever.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Starting {} watcher", self.kind);

        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = self.stream_once() => outcome,
            };

            match outcome {
                Ok(()) => {
                    debug!("{} watch stream ended, reconnecting", self.kind);
                }
                Err(e) => {
                    let delay = self.backoff.next_backoff();
                    error!(
                        "{} watch failed ({} consecutive): {}; retrying in {:?}",
                        self.kind,
                        self.backoff.consecutive_failures(),
                        e,
                        delay
                    );
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("{} watcher stopped", self.kind);
    }

    /// Connect, then stream until the watch ends or fails.
    async fn stream_once(&mut self) -> Result<(), ControllerError> {
        let mut stream = self.cluster.watch(self.kind).await?;
        let recovered = self.backoff.consecutive_failures() > 0;
        self.backoff.reset();
        debug!("{} watch established", self.kind);

        // Events from the outage are gone; reconcile once to catch up
        if recovered {
            info!("{} watch recovered, queueing reconciliation", self.kind);
            if !self.queue.enqueue(ReconcileTrigger::new()) {
                warn!("Reconciliation queue closed, dropping {} recovery", self.kind);
            }
        }

        while let Some(event) = stream.next().await {
            self.handle_event(&event?);
        }
        Ok(())
    }

    fn handle_event(&self, event: &WatchEvent) {
        if !self.kind.forwards(event.event_type) {
            debug!("Ignoring {:?} {} {}", event.event_type, self.kind, event.name);
            return;
        }

        debug!(
            "{} {} {:?} at {}, queueing reconciliation",
            event.kind, event.name, event.event_type, event.observed_at
        );
        if !self.queue.enqueue(ReconcileTrigger::new()) {
            warn!("Reconciliation queue closed, dropping {} event", self.kind);
        }
    }
}
