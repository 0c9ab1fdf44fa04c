//! Inference engine seam.
//!
//! The model is a black box behind `InferenceEngine`: frame in, detections
//! out. The HTTP adapter normalizes whatever prediction shape the hosted
//! model returns into the one internal `Detection` schema, so upstream
//! payload drift stops at this boundary.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use crate::errors::InferenceError;
use crate::model::{Detection, Frame};

pub trait InferenceEngine: Send + Sync + 'static {
    fn infer(
        &self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Vec<Detection>, InferenceError>> + Send;
}

/// Client for a hosted detection model: POSTs the JPEG-encoded frame and
/// parses the JSON prediction list.
pub struct HttpInferenceEngine {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
    api_key: Option<String>,
}

impl HttpInferenceEngine {
    pub fn new(
        endpoint: impl Into<String>,
        model_id: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model_id: model_id.into(),
            api_key,
        })
    }
}

impl InferenceEngine for HttpInferenceEngine {
    async fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
        let jpeg = frame.to_jpeg()?;

        let url = format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.model_id
        );
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }

        let response = request.send().await?.error_for_status()?;
        let payload: Value = response.json().await?;
        normalize_predictions(&payload, frame.width, frame.height)
    }
}

/// Convert a raw prediction payload into the internal schema.
///
/// Geometry arrives as pixel-center coordinates relative to the dimensions
/// the model saw (reported under `image`, falling back to the submitted
/// frame); class names arrive under `class_name` or `class` depending on the
/// model version. Output geometry is normalized to `[0, 1]`.
pub(crate) fn normalize_predictions(
    payload: &Value,
    frame_width: u32,
    frame_height: u32,
) -> Result<Vec<Detection>, InferenceError> {
    let dim = |key: &str, fallback: u32| -> f32 {
        payload
            .get("image")
            .and_then(|img| img.get(key))
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(fallback as f32)
    };
    let ref_width = dim("width", frame_width);
    let ref_height = dim("height", frame_height);
    if ref_width <= 0.0 || ref_height <= 0.0 {
        return Err(InferenceError::Payload(
            "non-positive reference dimensions".to_string(),
        ));
    }

    let raw: &[Value] = match payload.get("predictions") {
        Some(Value::Array(list)) => list.as_slice(),
        Some(other) => {
            log::warn!(
                "Prediction payload has non-list 'predictions' ({}), treating as empty",
                other
            );
            &[]
        }
        None => &[],
    };

    let number = |det: &Value, key: &str| -> f32 {
        det.get(key).and_then(Value::as_f64).unwrap_or(0.0) as f32
    };

    let mut detections = Vec::with_capacity(raw.len());
    for det in raw {
        if !det.is_object() {
            log::warn!("Skipping non-object prediction entry: {}", det);
            continue;
        }
        let class_name = det
            .get("class_name")
            .or_else(|| det.get("class"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        detections.push(Detection {
            class_name,
            confidence: number(det, "confidence").clamp(0.0, 1.0),
            x_center: (number(det, "x") / ref_width).clamp(0.0, 1.0),
            y_center: (number(det, "y") / ref_height).clamp(0.0, 1.0),
            width: (number(det, "width") / ref_width).clamp(0.0, 1.0),
            height: (number(det, "height") / ref_height).clamp(0.0, 1.0),
        });
    }
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pixel_geometry_is_normalized_by_frame_dimensions() {
        let payload = json!({
            "predictions": [
                {"class_name": "person", "confidence": 0.9,
                 "x": 320.0, "y": 240.0, "width": 64.0, "height": 120.0}
            ]
        });
        let dets = normalize_predictions(&payload, 640, 480).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_name, "person");
        assert!((dets[0].x_center - 0.5).abs() < 1e-6);
        assert!((dets[0].y_center - 0.5).abs() < 1e-6);
        assert!((dets[0].width - 0.1).abs() < 1e-6);
        assert!((dets[0].height - 0.25).abs() < 1e-6);
    }

    #[test]
    fn payload_image_dimensions_take_precedence() {
        let payload = json!({
            "image": {"width": 320, "height": 320},
            "predictions": [
                {"class": "dog", "confidence": 0.5,
                 "x": 160.0, "y": 80.0, "width": 32.0, "height": 32.0}
            ]
        });
        // The submitted frame was a different size; the model's reported
        // dimensions win.
        let dets = normalize_predictions(&payload, 640, 480).unwrap();
        assert_eq!(dets[0].class_name, "dog");
        assert!((dets[0].x_center - 0.5).abs() < 1e-6);
        assert!((dets[0].y_center - 0.25).abs() < 1e-6);
    }

    #[test]
    fn missing_predictions_yield_empty_list() {
        let payload = json!({"time": 0.05});
        assert!(normalize_predictions(&payload, 640, 480)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let payload = json!({
            "predictions": [
                "garbage",
                {"class": "cat", "confidence": 1.5, "x": 6400.0, "y": 10.0,
                 "width": 10.0, "height": 10.0}
            ]
        });
        let dets = normalize_predictions(&payload, 640, 480).unwrap();
        assert_eq!(dets.len(), 1);
        // Out-of-range values are clamped, not rejected.
        assert_eq!(dets[0].confidence, 1.0);
        assert_eq!(dets[0].x_center, 1.0);
    }

    #[test]
    fn zero_reference_dimensions_are_rejected() {
        let payload = json!({"image": {"width": 0, "height": 0}, "predictions": []});
        assert!(normalize_predictions(&payload, 640, 480).is_err());
    }
}
