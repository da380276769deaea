//! Periodic resync.
//!
//! Enqueues a trigger on a fixed interval so that failed mutations are
//! retried and out-of-band interface changes are repaired even when the
//! cluster is quiet.

use crate::queue::{EventSender, ReconcileTrigger};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed-interval trigger producer.
#[derive(Debug)]
pub struct ResyncTicker {
    interval: Duration,
    queue: EventSender,
}

impl ResyncTicker {
    /// Creates a ticker firing every `interval`.
    pub fn new(interval: Duration, queue: EventSender) -> Self {
        Self { interval, queue }
    }

    /// Runs until `cancel` fires or the queue is closed.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Starting periodic resync every {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already runs a pass
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    debug!("Periodic resync");
                    if !self.queue.enqueue(ReconcileTrigger::new()) {
                        warn!("Reconciliation queue closed, stopping resync");
                        break;
                    }
                }
            }
        }

        info!("Periodic resync stopped");
    }
}
