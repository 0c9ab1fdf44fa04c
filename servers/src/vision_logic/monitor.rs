use crate::vision_logic::state::AppState;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::interval;
use vision_common::{PipelineState, WireMessage};

/// Periodic keep-alive pings to subscribers plus a stalled-source watchdog.
pub async fn run(app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let mut ping_interval = interval(app_state.config.ping_interval);
    let mut stall_interval = interval(app_state.config.source_stall);
    // The first tick of an interval fires immediately.
    ping_interval.tick().await;
    stall_interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Monitor service received shutdown signal.");
                break;
            }
            _ = ping_interval.tick() => {
                if app_state.registry.count() > 0 {
                    app_state.registry.broadcast_message(&WireMessage::ping());
                }
            }
            _ = stall_interval.tick() => {
                let status = app_state.supervisor.status();
                if status.state == PipelineState::Running {
                    if let Some(last) = status.last_frame_at {
                        let silent = Utc::now().signed_duration_since(last);
                        if silent.num_seconds() >= app_state.config.source_stall.as_secs() as i64 {
                            log::warn!(
                                "No frames for {} seconds while pipeline is running.",
                                silent.num_seconds()
                            );
                        }
                    }
                }
            }
        }
    }
}
