//! Reconciliation trigger queue.
//!
//! A single unbounded FIFO shared by every producer (watch supervisors, the
//! resync ticker, the signal handler) and the one reconciler consumer.
//! Triggers carry no payload: the reconciler always recomputes full state.

use tokio::sync::mpsc;

/// Opaque request for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileTrigger {
    _private: (),
}

impl ReconcileTrigger {
    /// Create a trigger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
enum QueueItem {
    Trigger(ReconcileTrigger),
    Shutdown,
}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn event_queue() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx, closed: false })
}

/// Producer handle. Cloneable; enqueueing never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl EventSender {
    /// Enqueue a trigger. Returns `false` once the consumer is gone.
    pub fn enqueue(&self, trigger: ReconcileTrigger) -> bool {
        self.tx.send(QueueItem::Trigger(trigger)).is_ok()
    }

    /// Enqueue the shutdown sentinel. Triggers queued before it are still delivered.
    pub fn shutdown(&self) -> bool {
        self.tx.send(QueueItem::Shutdown).is_ok()
    }
}

/// Consumer handle. Exactly one exists per queue.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<QueueItem>,
    closed: bool,
}

impl EventReceiver {
    /// Wait for the next trigger.
    ///
    /// Returns `None` when the shutdown sentinel is reached or every sender
    /// has been dropped; every later call returns `None` immediately.
    pub async fn dequeue(&mut self) -> Option<ReconcileTrigger> {
        if self.closed {
            return None;
        }
        match self.rx.recv().await {
            Some(QueueItem::Trigger(trigger)) => Some(trigger),
            Some(QueueItem::Shutdown) | None => {
                self.closed = true;
                self.rx.close();
                None
            }
        }
    }
}
