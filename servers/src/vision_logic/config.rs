use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Partial configuration collected from the CLI, environment variables and
/// the optional JSON config file. `None` means "not specified here".
#[derive(Parser, Deserialize, Debug, Clone, Default)]
#[clap(about = "RTSP vision relay server", version)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverrides {
    #[clap(long, env = "VISION_API_PORT", help = "Port to listen on for HTTP/WebSocket clients.")]
    pub api_port: Option<u16>,

    #[clap(long, env = "VISION_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "VISION_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "VISION_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "VISION_RTSP_PORT", help = "Port the RTSP ingest listens on for the camera publisher.")]
    pub rtsp_port: Option<u16>,

    #[clap(long, env = "VISION_RTSP_PATH", help = "RTSP mount path of the inbound stream.")]
    pub rtsp_path: Option<String>,

    #[clap(long, env = "VISION_FRAME_WIDTH", help = "Width frames are scaled to before inference.")]
    pub frame_width: Option<u32>,

    #[clap(long, env = "VISION_FRAME_HEIGHT", help = "Height frames are scaled to before inference.")]
    pub frame_height: Option<u32>,

    #[clap(long, env = "VISION_MAX_FPS", help = "Upper bound on frames per second entering the pipeline.")]
    pub max_fps: Option<u32>,

    #[clap(long, env = "VISION_INFERENCE_URL", help = "Base URL of the hosted detection model.")]
    pub inference_url: Option<String>,

    #[clap(long, env = "VISION_MODEL_ID", help = "Model identifier appended to the inference URL.")]
    pub model_id: Option<String>,

    #[clap(long, env = "VISION_API_KEY", help = "API key passed to the inference endpoint.")]
    pub api_key: Option<String>,

    #[clap(long, env = "VISION_INFERENCE_TIMEOUT_SECS", help = "Per-request timeout for inference calls.")]
    pub inference_timeout_secs: Option<u64>,

    #[clap(long, env = "VISION_OUTPUT_DIR", help = "Directory holding archived video recordings.")]
    pub output_dir: Option<PathBuf>,

    #[clap(long, env = "VISION_MAX_VIDEO_STORAGE_DAYS", help = "Archived recordings older than this are deleted.")]
    pub max_video_storage_days: Option<u64>,

    #[clap(long, env = "VISION_CLEANUP_INTERVAL_SECS", help = "Interval between archive retention sweeps.")]
    pub cleanup_interval_secs: Option<u64>,

    #[clap(long, env = "VISION_PING_INTERVAL_SECS", help = "Interval between keep-alive pings to subscribers.")]
    pub ping_interval_secs: Option<u64>,

    #[clap(long, env = "VISION_START_TIMEOUT_SECS", help = "Seconds to wait for the first frame before start() fails.")]
    pub start_timeout_secs: Option<u64>,

    #[clap(long, env = "VISION_SOURCE_STALL_SECS", help = "Seconds without frames before a running pipeline is reported stalled.")]
    pub source_stall_secs: Option<u64>,

    #[clap(long, env = "VISION_SUBSCRIBER_BUFFER", help = "Per-subscriber outgoing message buffer; overflow disconnects the subscriber.")]
    pub subscriber_buffer: Option<usize>,
}

impl ConfigOverrides {
    // Merge two override sets, where 'other' wins for Some values.
    pub fn merge(self, other: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            api_port: other.api_port.or(self.api_port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            rtsp_port: other.rtsp_port.or(self.rtsp_port),
            rtsp_path: other.rtsp_path.or(self.rtsp_path),
            frame_width: other.frame_width.or(self.frame_width),
            frame_height: other.frame_height.or(self.frame_height),
            max_fps: other.max_fps.or(self.max_fps),
            inference_url: other.inference_url.or(self.inference_url),
            model_id: other.model_id.or(self.model_id),
            api_key: other.api_key.or(self.api_key),
            inference_timeout_secs: other.inference_timeout_secs.or(self.inference_timeout_secs),
            output_dir: other.output_dir.or(self.output_dir),
            max_video_storage_days: other
                .max_video_storage_days
                .or(self.max_video_storage_days),
            cleanup_interval_secs: other.cleanup_interval_secs.or(self.cleanup_interval_secs),
            ping_interval_secs: other.ping_interval_secs.or(self.ping_interval_secs),
            start_timeout_secs: other.start_timeout_secs.or(self.start_timeout_secs),
            source_stall_secs: other.source_stall_secs.or(self.source_stall_secs),
            subscriber_buffer: other.subscriber_buffer.or(self.subscriber_buffer),
        }
    }
}

/// Fully-resolved configuration used by the server.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub rtsp_port: u16,
    pub rtsp_path: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub max_fps: u32,
    pub inference_url: String,
    pub model_id: String,
    pub api_key: Option<String>,
    pub inference_timeout: Duration,
    pub output_dir: PathBuf,
    pub max_video_storage_days: u64,
    pub cleanup_interval: Duration,
    pub ping_interval: Duration,
    pub start_timeout: Duration,
    pub source_stall: Duration,
    pub subscriber_buffer: usize,
}

impl Config {
    pub fn from_overrides(o: ConfigOverrides) -> Config {
        Config {
            api_port: o.api_port.unwrap_or(58000),
            log_dir: o.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: o.log_level.unwrap_or_else(|| "info".to_string()),
            rtsp_port: o.rtsp_port.unwrap_or(8554),
            rtsp_path: o.rtsp_path.unwrap_or_else(|| "/live".to_string()),
            frame_width: o.frame_width.unwrap_or(640),
            frame_height: o.frame_height.unwrap_or(480),
            max_fps: o.max_fps.unwrap_or(10),
            inference_url: o
                .inference_url
                .unwrap_or_else(|| "http://127.0.0.1:9001".to_string()),
            model_id: o.model_id.unwrap_or_else(|| "yolov8n-640".to_string()),
            api_key: o.api_key,
            inference_timeout: Duration::from_secs(o.inference_timeout_secs.unwrap_or(10)),
            output_dir: o.output_dir.unwrap_or_else(|| PathBuf::from("./videos")),
            max_video_storage_days: o.max_video_storage_days.unwrap_or(1),
            cleanup_interval: Duration::from_secs(o.cleanup_interval_secs.unwrap_or(3600)),
            ping_interval: Duration::from_secs(o.ping_interval_secs.unwrap_or(30)),
            start_timeout: Duration::from_secs(o.start_timeout_secs.unwrap_or(60)),
            source_stall: Duration::from_secs(o.source_stall_secs.unwrap_or(30)),
            subscriber_buffer: o.subscriber_buffer.unwrap_or(64),
        }
    }

    /// RTSP URL the ingest listens on for the single camera publisher.
    pub fn ingest_url(&self) -> String {
        format!("rtsp://0.0.0.0:{}{}", self.rtsp_port, self.rtsp_path)
    }
}

pub fn load_config() -> Config {
    // 1. Parse CLI/env early to get a potential config file path override.
    let cli_args = ConfigOverrides::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_vision.conf"));

    // 2. Load from the config file if present.
    let mut current = ConfigOverrides::default();
    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<ConfigOverrides>(&config_str) {
                Ok(file_config) => current = current.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    }

    // 3. Environment variables and CLI arguments win over the file.
    Config::from_overrides(current.merge(cli_args))
}
