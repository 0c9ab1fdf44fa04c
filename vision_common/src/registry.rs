//! Thread-safe subscriber membership.
//!
//! Each subscriber owns a bounded mpsc channel. Broadcasting snapshots the
//! current membership, then enqueues outside the lock with `try_send`: a full
//! or closed buffer removes that subscriber instead of ever blocking the
//! publisher. The serving layer observes removal as its receive half closing
//! and issues the standard channel-close signal to the client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::model::WireMessage;

struct Subscriber {
    tx: mpsc::Sender<Arc<str>>,
    connected_at: DateTime<Utc>,
}

/// Receive half handed to the serving layer on connect.
pub struct SubscriberHandle {
    id: usize,
    rx: mpsc::Receiver<Arc<str>>,
}

impl SubscriberHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Next outbound payload, in publish order. `None` once the registry has
    /// removed this subscriber (slow consumer or explicit unregister).
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }
}

pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<usize, Subscriber>>,
    next_id: AtomicUsize,
    buffer: usize,
}

impl SubscriberRegistry {
    /// `buffer` bounds the per-subscriber outgoing queue; overflowing it
    /// disconnects that subscriber.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            buffer: buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Subscriber>> {
        // Membership mutation cannot leave the map inconsistent, so a
        // poisoned lock is still usable.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a subscriber and enqueue its `connection_status` handshake before
    /// any other traffic.
    pub fn register(&self) -> SubscriberHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);

        if let Ok(welcome) = WireMessage::welcome(id).to_json() {
            // The buffer is freshly created, so this cannot fail.
            let _ = tx.try_send(Arc::from(welcome));
        }

        let count = {
            let mut subs = self.lock();
            subs.insert(
                id,
                Subscriber {
                    tx,
                    connected_at: Utc::now(),
                },
            );
            subs.len()
        };
        log::info!("Subscriber {} connected ({} active)", id, count);

        SubscriberHandle { id, rx }
    }

    /// Remove a subscriber. Idempotent; safe concurrently with `broadcast`.
    pub fn unregister(&self, id: usize) {
        let removed = {
            let mut subs = self.lock();
            subs.remove(&id).map(|s| (s.connected_at, subs.len()))
        };
        if let Some((connected_at, count)) = removed {
            let session = Utc::now().signed_duration_since(connected_at);
            log::info!(
                "Subscriber {} disconnected after {}s ({} active)",
                id,
                session.num_seconds(),
                count
            );
        }
    }

    /// Deliver one pre-serialized payload to every current subscriber.
    ///
    /// Registrations after the snapshot receive the next payload, not this
    /// one. Never blocks and never fails from the caller's perspective.
    pub fn broadcast(&self, payload: Arc<str>) {
        let snapshot: Vec<(usize, mpsc::Sender<Arc<str>>)> = {
            let subs = self.lock();
            subs.iter().map(|(id, s)| (*id, s.tx.clone())).collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if let Err(err) = tx.try_send(Arc::clone(&payload)) {
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        log::warn!("Subscriber {} is not keeping up, dropping it", id)
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        log::debug!("Subscriber {} channel closed during broadcast", id)
                    }
                }
                dead.push(id);
            }
        }
        for id in dead {
            self.unregister(id);
        }
    }

    /// Serialize and broadcast one wire message (keep-alive path).
    pub fn broadcast_message(&self, message: &WireMessage) {
        match message.to_json() {
            Ok(json) => self.broadcast(Arc::from(json)),
            Err(e) => log::error!("Failed to serialize wire message: {}", e),
        }
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &str) -> serde_json::Value {
        serde_json::from_str(payload).unwrap()
    }

    #[tokio::test]
    async fn handshake_is_first_message() {
        let registry = SubscriberRegistry::new(8);
        let mut handle = registry.register();

        let first = handle.recv().await.unwrap();
        let msg = parse(&first);
        assert_eq!(msg["type"], "connection_status");
        assert_eq!(msg["status"], "connected");
        assert_eq!(msg["client_id"], handle.id() as u64);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber_exactly_once() {
        let registry = SubscriberRegistry::new(8);
        let mut handles: Vec<_> = (0..3).map(|_| registry.register()).collect();
        for h in &mut handles {
            h.recv().await.unwrap(); // handshake
        }

        registry.broadcast(Arc::from(r#"{"type":"ping","timestamp":1}"#));

        for h in &mut handles {
            let msg = parse(&h.recv().await.unwrap());
            assert_eq!(msg["type"], "ping");
            // Nothing else pending.
            assert!(h.rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn per_subscriber_order_is_publish_order() {
        let registry = SubscriberRegistry::new(8);
        let mut handle = registry.register();
        handle.recv().await.unwrap();

        registry.broadcast(Arc::from("first"));
        registry.broadcast(Arc::from("second"));

        assert_eq!(&*handle.recv().await.unwrap(), "first");
        assert_eq!(&*handle.recv().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn slow_subscriber_is_removed_without_affecting_others() {
        let registry = SubscriberRegistry::new(2);
        let mut slow = registry.register();
        let mut fast = registry.register();
        fast.recv().await.unwrap();

        // Slow never reads: handshake + one broadcast fill its buffer, the
        // second broadcast overflows it.
        registry.broadcast(Arc::from("a"));
        fast.recv().await.unwrap();
        registry.broadcast(Arc::from("b"));
        fast.recv().await.unwrap();

        assert_eq!(registry.count(), 1);

        // The slow subscriber drains what was buffered, then sees the close.
        assert!(slow.recv().await.is_some()); // handshake
        assert!(slow.recv().await.is_some()); // "a"
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = SubscriberRegistry::new(4);
        let handle = registry.register();
        let id = handle.id();

        registry.unregister(id);
        registry.unregister(id);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn broadcast_survives_concurrent_churn() {
        let registry = Arc::new(SubscriberRegistry::new(256));
        let mut steady = registry.register();
        steady.recv().await.unwrap(); // handshake

        let broadcaster = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for i in 0..200 {
                    registry.broadcast(Arc::from(i.to_string()));
                    tokio::task::yield_now().await;
                }
            })
        };
        let churn = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..100 {
                    let handle = registry.register();
                    tokio::task::yield_now().await;
                    registry.unregister(handle.id());
                }
            })
        };

        broadcaster.await.unwrap();
        churn.await.unwrap();

        // The member that stayed connected throughout received every
        // payload exactly once, in publish order.
        for i in 0..200 {
            assert_eq!(&*steady.recv().await.unwrap(), i.to_string());
        }
        assert!(steady.rx.try_recv().is_err());
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn dropped_handle_is_pruned_on_next_broadcast() {
        let registry = SubscriberRegistry::new(4);
        let handle = registry.register();
        drop(handle);
        assert_eq!(registry.count(), 1);

        registry.broadcast(Arc::from("x"));
        assert_eq!(registry.count(), 0);
    }
}
