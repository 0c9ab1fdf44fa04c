use std::sync::Arc;

use vision_common::{DetectionHub, Supervisor, SupervisorConfig, SubscriberRegistry};

use crate::vision_logic::config::Config;
use crate::vision_logic::storage::VideoStorage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SubscriberRegistry>,
    pub hub: Arc<DetectionHub>,
    pub supervisor: Arc<Supervisor>,
    pub storage: Arc<VideoStorage>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SubscriberRegistry::new(config.subscriber_buffer));
        let hub = Arc::new(DetectionHub::new(Arc::clone(&registry)));
        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&hub),
            SupervisorConfig {
                start_timeout: config.start_timeout,
            },
        ));
        let storage = Arc::new(VideoStorage::new(
            config.output_dir.clone(),
            std::time::Duration::from_secs(config.max_video_storage_days * 24 * 60 * 60),
        ));
        Self {
            config: Arc::new(config),
            registry,
            hub,
            supervisor,
            storage,
        }
    }
}
