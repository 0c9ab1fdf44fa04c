//! Connection lifecycle supervisor.
//!
//! Owns the start/stop ordering of the frame source and the inference
//! engine, and the only mutation path of `PipelineState`. Frames cross from
//! the ingestion task to the inference task through a capacity-1 channel:
//! when the engine is busy the newest frame is dropped, never queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::errors::PipelineError;
use crate::fps::FpsCounter;
use crate::hub::DetectionHub;
use crate::inference::InferenceEngine;
use crate::model::{DetectionEvent, Frame, PipelineState};
use crate::source::FrameSource;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Bounds both the source start call and the wait for the first frame.
    pub start_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(15),
        }
    }
}

/// Immutable snapshot of the pipeline run-state for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub started_at: Option<DateTime<Utc>>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub frames_dropped: u64,
}

struct StatusInner {
    state: PipelineState,
    started_at: Option<DateTime<Utc>>,
    last_frame_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct Shared {
    status: Mutex<StatusInner>,
    latest_frame: Mutex<Option<Frame>>,
    frames_dropped: AtomicU64,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, StatusInner> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fail(&self, message: impl Into<String>) {
        let mut st = self.status();
        st.state = PipelineState::Error;
        st.last_error = Some(message.into());
    }
}

struct RunHandles {
    shutdown: watch::Sender<bool>,
    ingest: JoinHandle<()>,
    infer: JoinHandle<()>,
}

pub struct Supervisor {
    hub: Arc<DetectionHub>,
    config: SupervisorConfig,
    shared: Arc<Shared>,
    run: Mutex<Option<RunHandles>>,
}

impl Supervisor {
    pub fn new(hub: Arc<DetectionHub>, config: SupervisorConfig) -> Self {
        Self {
            hub,
            config,
            shared: Arc::new(Shared {
                status: Mutex::new(StatusInner {
                    state: PipelineState::Stopped,
                    started_at: None,
                    last_frame_at: None,
                    last_error: None,
                }),
                latest_frame: Mutex::new(None),
                frames_dropped: AtomicU64::new(0),
            }),
            run: Mutex::new(None),
        }
    }

    /// Bring the pipeline up: start the source, spawn the workers, and wait
    /// for the first frame. On any failure no partial state is left running
    /// and the state ends ERROR.
    pub async fn start<S, E>(&self, mut source: S, engine: E) -> Result<(), PipelineError>
    where
        S: FrameSource,
        E: InferenceEngine,
    {
        {
            let mut st = self.shared.status();
            if matches!(st.state, PipelineState::Starting | PipelineState::Running) {
                return Err(PipelineError::AlreadyRunning);
            }
            st.state = PipelineState::Starting;
            st.last_error = None;
        }

        match timeout(self.config.start_timeout, source.start()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.shared.fail(format!("frame source failed to start: {e}"));
                return Err(PipelineError::SourceStart(e));
            }
            Err(_) => {
                source.stop().await;
                self.shared.fail("frame source start timed out");
                return Err(PipelineError::StartTimeout(self.config.start_timeout));
            }
        }

        // Single-slot hand-off: at most one frame in flight to the engine.
        let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(1);
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::clone(&self.shared);
        let mut ingest_shutdown = shutdown_rx.clone();
        let ingest = tokio::spawn(async move {
            let mut ready = Some(ready_tx);
            loop {
                tokio::select! {
                    _ = ingest_shutdown.changed() => break,
                    frame = source.next_frame() => {
                        let Some(frame) = frame else {
                            let mut st = shared.status();
                            if matches!(st.state, PipelineState::Starting | PipelineState::Running) {
                                st.state = PipelineState::Error;
                                st.last_error = Some("frame source disconnected".to_string());
                                log::error!("Frame source disconnected, pipeline entering error state");
                            }
                            break;
                        };

                        let now = Utc::now();
                        {
                            let mut st = shared.status();
                            st.last_frame_at = Some(now);
                            if st.state == PipelineState::Starting {
                                st.state = PipelineState::Running;
                                st.started_at = Some(now);
                                log::info!("First frame observed, pipeline is running");
                            }
                        }
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(());
                        }

                        *shared
                            .latest_frame
                            .lock()
                            .unwrap_or_else(|p| p.into_inner()) = Some(frame.clone());

                        match frame_tx.try_send(frame) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(dropped)) => {
                                shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                                log::debug!(
                                    "Inference busy, dropping frame {}",
                                    dropped.sequence_id
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
            source.stop().await;
        });

        let hub = Arc::clone(&self.hub);
        let mut infer_shutdown = shutdown_rx;
        let infer = tokio::spawn(async move {
            let mut fps = FpsCounter::default();
            loop {
                tokio::select! {
                    _ = infer_shutdown.changed() => break,
                    frame = frame_rx.recv() => {
                        let Some(frame) = frame else { break };
                        match engine.infer(&frame).await {
                            Ok(detections) => {
                                fps.tick();
                                hub.publish(DetectionEvent {
                                    frame_id: frame.sequence_id,
                                    timestamp: Utc::now().timestamp_millis(),
                                    fps: fps.fps(),
                                    detections,
                                });
                            }
                            Err(e) => {
                                // One bad frame is "no detections this
                                // frame", not a pipeline fault.
                                log::warn!(
                                    "Inference failed for frame {}: {}",
                                    frame.sequence_id,
                                    e
                                );
                            }
                        }
                    }
                }
            }
        });

        let run = RunHandles {
            shutdown: shutdown_tx,
            ingest,
            infer,
        };

        match timeout(self.config.start_timeout, ready_rx).await {
            Ok(Ok(())) => {
                *self.run.lock().unwrap_or_else(|p| p.into_inner()) = Some(run);
                Ok(())
            }
            Ok(Err(_)) => {
                // Ingestion ended before the first frame; it already
                // recorded the source fault.
                Self::teardown(run).await;
                Err(PipelineError::SourceEnded)
            }
            Err(_) => {
                Self::teardown(run).await;
                self.shared.fail(format!(
                    "no frame received within {:?}",
                    self.config.start_timeout
                ));
                Err(PipelineError::StartTimeout(self.config.start_timeout))
            }
        }
    }

    async fn teardown(run: RunHandles) {
        let _ = run.shutdown.send(true);
        let mut ingest = run.ingest;
        let mut infer = run.infer;
        if timeout(Duration::from_secs(5), &mut ingest).await.is_err() {
            ingest.abort();
        }
        if timeout(Duration::from_secs(5), &mut infer).await.is_err() {
            infer.abort();
        }
    }

    /// Stop the pipeline. Always succeeds; idempotent; safe while a publish
    /// or broadcast is mid-flight.
    pub async fn stop(&self) {
        let run = self.run.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(run) = run {
            log::info!("Stopping pipeline");
            Self::teardown(run).await;
        }
        let mut st = self.shared.status();
        if st.state != PipelineState::Stopped {
            st.state = PipelineState::Stopped;
        }
    }

    pub fn status(&self) -> PipelineStatus {
        let st = self.shared.status();
        PipelineStatus {
            state: st.state,
            started_at: st.started_at,
            last_frame_at: st.last_frame_at,
            last_error: st.last_error.clone(),
            frames_dropped: self.shared.frames_dropped.load(Ordering::Relaxed),
        }
    }

    /// Most recent ingested frame (snapshot endpoint).
    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared
            .latest_frame
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}
