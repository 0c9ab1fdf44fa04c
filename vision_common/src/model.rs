//! Data model shared by the pipeline and the serving layer.
//!
//! `WireMessage` is the single source of truth for the shapes pushed to
//! subscribers; clients rely on these exact field names.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::ImageEncoder;
use serde::{Deserialize, Serialize};

/// One decoded video frame handed from the frame source to the inference
/// engine. The pixel buffer is opaque RGB24; `Bytes` keeps clones cheap for
/// the snapshot tap.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence_id: u64,
    pub captured_at: DateTime<Utc>,
    pub image: Bytes,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(sequence_id: u64, image: Bytes, width: u32, height: u32) -> Self {
        Self {
            sequence_id,
            captured_at: Utc::now(),
            image,
            width,
            height,
        }
    }

    /// Encode the raw RGB24 buffer as JPEG (snapshot endpoint, inference
    /// upload).
    pub fn to_jpeg(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut out = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 80);
        encoder.write_image(
            &self.image,
            self.width,
            self.height,
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(out)
    }
}

/// A single detected object, geometry normalized to `[0, 1]` relative to the
/// frame dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

/// Per-frame result record broadcast to subscribers. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub frame_id: u64,
    /// Epoch milliseconds at which the result was produced.
    pub timestamp: i64,
    /// Measured pipeline throughput at the time of this event.
    pub fps: f32,
    pub detections: Vec<Detection>,
}

/// Wire shapes pushed over the subscriber channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    ConnectionStatus {
        status: String,
        message: String,
        timestamp: i64,
        client_id: usize,
    },
    Ping {
        timestamp: i64,
    },
    AiDetection {
        data: DetectionEvent,
    },
}

impl WireMessage {
    /// Handshake sent to a subscriber immediately after it registers.
    pub fn welcome(client_id: usize) -> Self {
        WireMessage::ConnectionStatus {
            status: "connected".to_string(),
            message: "connected to vision relay server".to_string(),
            timestamp: Utc::now().timestamp_millis(),
            client_id,
        }
    }

    /// Keep-alive sent on a fixed interval regardless of detection activity.
    pub fn ping() -> Self {
        WireMessage::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn detection(data: DetectionEvent) -> Self {
        WireMessage::AiDetection { data }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Run-state of the pipeline, owned by the supervisor and read concurrently
/// through status snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> DetectionEvent {
        DetectionEvent {
            frame_id: 42,
            timestamp: 1_700_000_000_123,
            fps: 9.5,
            detections: vec![Detection {
                class_name: "person".to_string(),
                confidence: 0.873_21,
                x_center: 0.51,
                y_center: 0.4875,
                width: 0.125,
                height: 0.333_33,
            }],
        }
    }

    #[test]
    fn detection_event_round_trips_through_wire_json() {
        let msg = WireMessage::detection(sample_event());
        let json = msg.to_json().unwrap();
        let parsed: WireMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn detection_message_has_expected_shape() {
        let msg = WireMessage::AiDetection {
            data: DetectionEvent {
                frame_id: 100,
                timestamp: 1,
                fps: 0.0,
                detections: vec![],
            },
        };
        let value: serde_json::Value =
            serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "ai_detection");
        assert_eq!(value["data"]["frame_id"], 100);
        assert!(value["data"]["detections"].as_array().unwrap().is_empty());
    }

    #[test]
    fn ping_and_welcome_shapes() {
        let ping: serde_json::Value =
            serde_json::from_str(&WireMessage::ping().to_json().unwrap()).unwrap();
        assert_eq!(ping["type"], "ping");
        assert!(ping["timestamp"].is_i64());

        let welcome: serde_json::Value =
            serde_json::from_str(&WireMessage::welcome(7).to_json().unwrap()).unwrap();
        assert_eq!(welcome["type"], "connection_status");
        assert_eq!(welcome["status"], "connected");
        assert_eq!(welcome["client_id"], 7);
    }

    #[test]
    fn frame_encodes_to_jpeg() {
        let frame = Frame::new(1, Bytes::from(vec![0u8; 4 * 4 * 3]), 4, 4);
        let jpeg = frame.to_jpeg().unwrap();
        // JPEG SOI marker.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
