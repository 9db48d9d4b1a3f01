//! Event delivery between a download service and the tasks waiting on it.
//!
//! Services publish `DownloadEvent`s into an `EventHub`; each subscriber gets
//! them through its own `mpsc` channel, so completion state is only ever
//! touched on the receiving side. A `Subscription` removes its subscriber
//! when dropped.

use super::request::DownloadId;
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// The two notifications a download service pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TransferComplete,
    NotificationClicked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    TransferComplete(DownloadId),
    /// Terminal failure; delivered to `TransferComplete` subscribers.
    TransferFailed { id: DownloadId, reason: String },
    NotificationClicked(Vec<DownloadId>),
}

impl DownloadEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DownloadEvent::TransferComplete(_) | DownloadEvent::TransferFailed { .. } => {
                EventKind::TransferComplete
            }
            DownloadEvent::NotificationClicked(_) => EventKind::NotificationClicked,
        }
    }
}

struct Subscriber {
    kind: EventKind,
    sender: Sender<DownloadEvent>,
}

#[derive(Default)]
struct Registry {
    next_key: u64,
    subscribers: HashMap<u64, Subscriber>,
}

/// Fan-out point for download events.
#[derive(Clone, Default)]
pub struct EventHub {
    registry: Arc<Mutex<Registry>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Every update is a single insert or remove, so a poisoned map is still consistent.
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, kind: EventKind, sender: Sender<DownloadEvent>) -> Subscription {
        let mut registry = self.lock();
        let key = registry.next_key;
        registry.next_key += 1;
        registry.subscribers.insert(key, Subscriber { kind, sender });
        tracing::debug!(key, ?kind, "subscriber registered");

        Subscription {
            key,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every live subscriber of its kind.
    ///
    /// Returns the number of subscribers that received it. Subscribers whose
    /// receiving end is gone are dropped.
    pub fn publish(&self, event: DownloadEvent) -> usize {
        let kind = event.kind();
        let mut registry = self.lock();
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (key, subscriber) in registry.subscribers.iter() {
            if subscriber.kind != kind {
                continue;
            }
            if subscriber.sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*key);
            }
        }

        for key in dead {
            registry.subscribers.remove(&key);
            tracing::debug!(key, "dropped disconnected subscriber");
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// Registration token returned by `EventHub::subscribe`.
#[derive(Debug)]
pub struct Subscription {
    key: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Unregister now instead of at drop.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            registry.subscribers.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_publish_filters_by_kind() {
        let hub = EventHub::new();
        let (tx, rx) = mpsc::channel();
        let _complete = hub.subscribe(EventKind::TransferComplete, tx);

        assert_eq!(hub.publish(DownloadEvent::NotificationClicked(vec![DownloadId(1)])), 0);
        assert_eq!(hub.publish(DownloadEvent::TransferComplete(DownloadId(1))), 1);

        assert_eq!(rx.try_recv().unwrap(), DownloadEvent::TransferComplete(DownloadId(1)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_failure_goes_to_completion_subscribers() {
        let hub = EventHub::new();
        let (tx, rx) = mpsc::channel();
        let _complete = hub.subscribe(EventKind::TransferComplete, tx);

        let failed = DownloadEvent::TransferFailed {
            id: DownloadId(2),
            reason: "curl exited with status Some(22)".to_string(),
        };
        assert_eq!(hub.publish(failed.clone()), 1);
        assert_eq!(rx.try_recv().unwrap(), failed);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = EventHub::new();
        let (tx, _rx) = mpsc::channel();
        let subscription = hub.subscribe(EventKind::TransferComplete, tx);
        assert_eq!(hub.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_cancel_unsubscribes() {
        let hub = EventHub::new();
        let (tx, _rx) = mpsc::channel();
        hub.subscribe(EventKind::NotificationClicked, tx.clone()).cancel();
        let _kept = hub.subscribe(EventKind::NotificationClicked, tx);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_disconnected_receiver_is_pruned() {
        let hub = EventHub::new();
        let (tx, rx) = mpsc::channel();
        let _subscription = hub.subscribe(EventKind::TransferComplete, tx);
        drop(rx);

        assert_eq!(hub.publish(DownloadEvent::TransferComplete(DownloadId(3))), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_hub() {
        let (tx, _rx) = mpsc::channel();
        let subscription = {
            let hub = EventHub::new();
            hub.subscribe(EventKind::TransferComplete, tx)
        };
        drop(subscription);
    }
}
