use chrono::{DateTime, Utc};
use serde::Serialize;
use vision_common::PipelineState;

/// Body of `GET /api/v1/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub state: PipelineState,
    pub started_at: Option<DateTime<Utc>>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub subscribers: usize,
    pub last_error: Option<String>,
    pub frames_dropped: u64,
    pub ingest_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
