// Fan-out of accepted price ticks to downstream listeners

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::types::PriceTick;

/// Outcome of one `publish` call across all subscribers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: usize,
}

/// Broadcaster with a bounded buffer per subscriber.
///
/// A full buffer drops the newest tick for that subscriber only; the publisher never waits.
/// A subscriber whose handle was dropped is removed on the next publish.
#[derive(Debug)]
pub struct SubscriberHub {
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<PriceTick>>>,
    buffer: usize,
    dropped_total: AtomicU64,
}

/// Receiving side of a hub subscription. Dropping it detaches from the hub.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<PriceTick>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next tick. Returns `None` once the hub has removed this subscriber.
    pub async fn recv(&mut self) -> Option<PriceTick> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`]
    pub fn try_recv(&mut self) -> Option<PriceTick> {
        self.receiver.try_recv().ok()
    }
}

impl SubscriberHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
            dropped_total: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, sender);
        debug!(subscriber = %id, "Subscriber attached");
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    pub fn publish(&self, tick: &PriceTick) -> PublishReport {
        let mut report = PublishReport::default();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());

        subscribers.retain(|id, sender| match sender.try_send(tick.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = %id, "Subscriber detached");
                report.removed += 1;
                false
            }
        });

        if report.dropped > 0 {
            self.dropped_total.fetch_add(report.dropped as u64, Ordering::Relaxed);
        }
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Ticks dropped on full buffers since start
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}
