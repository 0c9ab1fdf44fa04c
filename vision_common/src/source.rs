//! Frame source seam.
//!
//! The media transport is a black box behind `FrameSource`: something that,
//! once started, yields decoded frames until it stops or fails. The concrete
//! production adapter runs an `ffmpeg` child in RTSP-listen mode, which
//! accepts the single inbound publisher and emits rate-limited raw RGB24
//! frames on its stdout.

use std::future::Future;
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;

use crate::errors::SourceError;
use crate::model::Frame;

pub trait FrameSource: Send + 'static {
    /// Bring the transport up. Must not block indefinitely; the supervisor
    /// additionally bounds this call with its start timeout.
    fn start(&mut self) -> impl Future<Output = Result<(), SourceError>> + Send;

    /// Next decoded frame, or `None` once the stream has ended or failed.
    fn next_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send;

    /// Release transport resources. Idempotent.
    fn stop(&mut self) -> impl Future<Output = ()> + Send;
}

/// RTSP ingest via an `ffmpeg` child process listening for one publisher.
pub struct FfmpegSource {
    listen_url: String,
    width: u32,
    height: u32,
    max_fps: u32,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    next_seq: u64,
}

impl FfmpegSource {
    /// `listen_url` is the full RTSP URL to listen on, e.g.
    /// `rtsp://0.0.0.0:8554/live`. Frames are scaled to `width`x`height` and
    /// capped at `max_fps` before they reach the pipeline.
    pub fn new(listen_url: impl Into<String>, width: u32, height: u32, max_fps: u32) -> Self {
        Self {
            listen_url: listen_url.into(),
            width,
            height,
            max_fps: max_fps.max(1),
            child: None,
            stdout: None,
            next_seq: 0,
        }
    }
}

impl FrameSource for FfmpegSource {
    async fn start(&mut self) -> Result<(), SourceError> {
        log::info!("Starting RTSP ingest on {}", self.listen_url);
        let mut child = Command::new("ffmpeg")
            .args(["-nostdin", "-loglevel", "error"])
            .args(["-rtsp_flags", "listen"])
            .args(["-i", &self.listen_url])
            .args([
                "-vf",
                &format!(
                    "fps={},scale={}:{}",
                    self.max_fps, self.width, self.height
                ),
            ])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(SourceError::Spawn)?;

        let stdout = child.stdout.take().ok_or(SourceError::MissingStdout)?;
        self.stdout = Some(BufReader::new(stdout));
        self.child = Some(child);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        let reader = self.stdout.as_mut()?;
        let mut buf = vec![0u8; (self.width * self.height * 3) as usize];
        match reader.read_exact(&mut buf).await {
            Ok(_) => {
                self.next_seq += 1;
                Some(Frame::new(
                    self.next_seq,
                    Bytes::from(buf),
                    self.width,
                    self.height,
                ))
            }
            Err(e) => {
                // EOF means the publisher went away or ffmpeg died.
                log::warn!("RTSP ingest ended: {}", e);
                None
            }
        }
    }

    async fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                log::debug!("Failed to kill decoder process: {}", e);
            }
        }
    }
}

/// Channel-backed source for embedders and tests: frames pushed into the
/// sender come out of `next_frame`.
pub struct QueueSource {
    rx: mpsc::Receiver<Frame>,
}

impl QueueSource {
    pub fn channel(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

impl FrameSource for QueueSource {
    async fn start(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    async fn stop(&mut self) {
        self.rx.close();
    }
}
