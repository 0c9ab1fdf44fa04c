//! Detection fan-out hub.
//!
//! Serializes each `DetectionEvent` exactly once and hands the shared
//! payload to the registry. Publishing is bounded and infallible: subscriber
//! faults become registry removals, never errors on the inference path.

use std::sync::Arc;

use crate::model::{DetectionEvent, WireMessage};
use crate::registry::SubscriberRegistry;

pub struct DetectionHub {
    registry: Arc<SubscriberRegistry>,
}

impl DetectionHub {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// Distribute one event to every current subscriber.
    pub fn publish(&self, event: DetectionEvent) {
        let frame_id = event.frame_id;
        match WireMessage::detection(event).to_json() {
            Ok(json) => {
                log::trace!("Broadcasting detection event for frame {}", frame_id);
                self.registry.broadcast(Arc::from(json));
            }
            Err(e) => {
                log::error!(
                    "Failed to serialize detection event for frame {}: {}",
                    frame_id,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DetectionEvent;

    fn event(frame_id: u64) -> DetectionEvent {
        DetectionEvent {
            frame_id,
            timestamp: 1_700_000_000_000,
            fps: 10.0,
            detections: vec![],
        }
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers_once() {
        let registry = Arc::new(SubscriberRegistry::new(8));
        let hub = DetectionHub::new(Arc::clone(&registry));

        let mut handles: Vec<_> = (0..3).map(|_| registry.register()).collect();
        for h in &mut handles {
            h.recv().await.unwrap(); // handshake
        }

        hub.publish(event(100));

        for h in &mut handles {
            let payload = h.recv().await.unwrap();
            let msg: serde_json::Value = serde_json::from_str(&payload).unwrap();
            assert_eq!(msg["type"], "ai_detection");
            assert_eq!(msg["data"]["frame_id"], 100);
            assert!(msg["data"]["detections"].as_array().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_no_op() {
        let registry = Arc::new(SubscriberRegistry::new(8));
        let hub = DetectionHub::new(registry);
        hub.publish(event(1));
    }

    #[tokio::test]
    async fn events_arrive_in_frame_order() {
        let registry = Arc::new(SubscriberRegistry::new(8));
        let hub = DetectionHub::new(Arc::clone(&registry));
        let mut handle = registry.register();
        handle.recv().await.unwrap();

        hub.publish(event(1));
        hub.publish(event(2));

        let first: serde_json::Value =
            serde_json::from_str(&handle.recv().await.unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&handle.recv().await.unwrap()).unwrap();
        assert_eq!(first["data"]["frame_id"], 1);
        assert_eq!(second["data"]["frame_id"], 2);
    }
}
