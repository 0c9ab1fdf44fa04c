use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::sync::broadcast;
use tokio::time::interval;

use crate::vision_logic::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct VideoInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Archived recordings directory with age-based retention.
pub struct VideoStorage {
    output_dir: PathBuf,
    max_age: Duration,
}

impl VideoStorage {
    pub fn new(output_dir: PathBuf, max_age: Duration) -> Self {
        Self {
            output_dir,
            max_age,
        }
    }

    /// All `.mp4` recordings, newest first.
    pub async fn list(&self) -> std::io::Result<Vec<VideoInfo>> {
        let mut videos = Vec::new();
        if !self.output_dir.exists() {
            return Ok(videos);
        }

        let mut entries = fs::read_dir(&self.output_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "mp4") {
                let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let metadata = entry.metadata().await?;
                let modified = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);
                videos.push(VideoInfo {
                    filename: filename.to_string(),
                    size_bytes: metadata.len(),
                    modified: DateTime::from(modified),
                });
            }
        }

        videos.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(videos)
    }

    /// Open a recording for streaming. Rejects anything that is not a plain
    /// file name inside the output directory.
    pub async fn open(&self, filename: &str) -> std::io::Result<File> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(Error::new(ErrorKind::InvalidInput, "invalid filename"));
        }
        File::open(self.output_dir.join(filename)).await
    }

    /// Delete recordings older than the retention window. Returns how many
    /// files were removed.
    pub async fn sweep(&self) -> std::io::Result<usize> {
        if !self.output_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut entries = fs::read_dir(&self.output_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().map_or(false, |ext| ext == "mp4") {
                continue;
            }
            let metadata = entry.metadata().await?;
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let age = modified.elapsed().unwrap_or(Duration::ZERO);
            if age >= self.max_age {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        removed += 1;
                        log::info!("Removed expired recording {:?}", path);
                    }
                    Err(e) => log::warn!("Failed to remove recording {:?}: {}", path, e),
                }
            }
        }
        Ok(removed)
    }
}

/// Periodic retention sweep over the recordings directory.
pub async fn run_cleanup(app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let mut sweep_interval = interval(app_state.config.cleanup_interval);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Cleanup service received shutdown signal.");
                break;
            }
            _ = sweep_interval.tick() => {
                match app_state.storage.sweep().await {
                    Ok(0) => {}
                    Ok(n) => log::info!("Retention sweep removed {} recording(s)", n),
                    Err(e) => log::warn!("Retention sweep failed: {}", e),
                }
            }
        }
    }
}
