use anyhow::Result;
use tokio::signal;
use vision_common::{FfmpegSource, HttpInferenceEngine};

use vision_server::vision_logic::{config, downstream, logger, monitor, state, storage};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    logger::setup_logging(&config.log_dir, &config.log_level)?;

    log::info!(
        "Starting vision relay: api port {}, ingest {}",
        config.api_port,
        config.ingest_url()
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = state::AppState::new(config);

    let downstream_handle = tokio::spawn(downstream::run(
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    let monitor_handle = tokio::spawn(monitor::run(app_state.clone(), shutdown_tx.subscribe()));

    let cleanup_handle = tokio::spawn(storage::run_cleanup(
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    // Bring up the detection pipeline. The HTTP surface keeps serving even
    // when the camera has not connected yet, so a failed start only logs.
    let source = FfmpegSource::new(
        app_state.config.ingest_url(),
        app_state.config.frame_width,
        app_state.config.frame_height,
        app_state.config.max_fps,
    );
    let engine = HttpInferenceEngine::new(
        &app_state.config.inference_url,
        &app_state.config.model_id,
        app_state.config.api_key.clone(),
        app_state.config.inference_timeout,
    )?;
    if let Err(e) = app_state.supervisor.start(source, engine).await {
        log::error!("Pipeline failed to start: {}", e);
    }

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());
    app_state.supervisor.stop().await;

    // Wait for components to shut down
    let _ = tokio::try_join!(downstream_handle, monitor_handle, cleanup_handle);

    log::info!("Shutdown complete.");
    Ok(())
}
