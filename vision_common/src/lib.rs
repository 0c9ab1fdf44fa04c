// Core library for the vision relay server.
//
// One inbound media stream is decoded into frames, driven through an
// inference engine, and the per-frame results are fanned out to every
// connected subscriber. The serving layer lives in the `vision_server`
// crate; everything here is transport-agnostic.

// Declare the modules to re-export
pub mod errors;
pub mod fps;
pub mod hub;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod source;

// Re-export the commonly used types
pub use errors::{InferenceError, PipelineError, SourceError};
pub use fps::FpsCounter;
pub use hub::DetectionHub;
pub use inference::{HttpInferenceEngine, InferenceEngine};
pub use model::{Detection, DetectionEvent, Frame, PipelineState, WireMessage};
pub use pipeline::{PipelineStatus, Supervisor, SupervisorConfig};
pub use registry::{SubscriberHandle, SubscriberRegistry};
pub use source::{FfmpegSource, FrameSource, QueueSource};
