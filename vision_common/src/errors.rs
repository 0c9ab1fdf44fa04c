//! Error taxonomy for the pipeline seams.
//!
//! Subscriber faults never appear here: they are handled inside the registry
//! as membership removals and are not observable by the publisher.

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by `Supervisor::start`. Once the pipeline is RUNNING,
/// faults are reported through the status snapshot instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("frame source failed to start: {0}")]
    SourceStart(#[from] SourceError),

    #[error("no frame received within {0:?}")]
    StartTimeout(Duration),

    #[error("frame source ended before producing a frame")]
    SourceEnded,
}

/// Faults of the external media subsystem behind the `FrameSource` seam.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to spawn decoder process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("decoder process has no stdout pipe")]
    MissingStdout,
}

/// Faults of the external model behind the `InferenceEngine` seam. A
/// per-frame error is logged and skipped; it never stops the pipeline.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to encode frame for upload: {0}")]
    Encode(#[from] image::ImageError),

    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed prediction payload: {0}")]
    Payload(String),
}
