use crate::vision_logic::model::{ErrorResponse, StatusResponse};
use crate::vision_logic::state::AppState;
use axum::{
    Json, Router,
    body::Body,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tokio_util::io::ReaderStream;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/status", get(status_handler))
        .route("/api/v1/snapshot", get(snapshot_handler))
        .route("/api/v1/videos", get(videos_handler))
        .route("/api/v1/video/{filename}", get(video_handler))
        .route("/api/v1/ws", get(ws_handler))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let addr = SocketAddr::from(([0, 0, 0, 0], app_state.config.api_port));
    let app = router(app_state);

    log::info!("Downstream server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Downstream server shutting down.");
        })
        .await
        .unwrap();
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.supervisor.status();
    Json(StatusResponse {
        state: status.state,
        started_at: status.started_at,
        last_frame_at: status.last_frame_at,
        subscribers: state.registry.count(),
        last_error: status.last_error,
        frames_dropped: status.frames_dropped,
        ingest_url: state.config.ingest_url(),
    })
}

/// Most recent ingested frame, re-encoded as JPEG.
async fn snapshot_handler(State(state): State<AppState>) -> impl IntoResponse {
    let Some(frame) = state.supervisor.latest_frame() else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no frame available".to_string(),
            }),
        )
            .into_response();
    };

    match frame.to_jpeg() {
        Ok(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Err(e) => {
            log::error!("Failed to encode snapshot: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to encode snapshot".to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn videos_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.list().await {
        Ok(videos) => Json(videos).into_response(),
        Err(e) => {
            log::error!("Failed to list recordings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to list recordings".to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn video_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    match state.storage.open(&filename).await {
        Ok(file) => {
            let stream = ReaderStream::new(file);
            (
                [(header::CONTENT_TYPE, "video/mp4")],
                Body::from_stream(stream),
            )
                .into_response()
        }
        Err(e) if e.kind() == ErrorKind::InvalidInput => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid filename".to_string(),
            }),
        )
            .into_response(),
        Err(e) if e.kind() == ErrorKind::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("recording not found: {}", filename),
            }),
        )
            .into_response(),
        Err(e) => {
            log::error!("Failed to open recording {}: {}", filename, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to open recording".to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut handle = state.registry.register();
    let client_id = handle.id();

    loop {
        tokio::select! {
            // Inbound traffic from the client. Anything textual is echoed
            // back; the protocol is one-directional otherwise.
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let echo = serde_json::json!({
                            "type": "echo",
                            "message": text.as_str(),
                        });
                        if socket.send(Message::Text(echo.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            // Outbound payloads from the registry, in publish order.
            payload = handle.recv() => {
                match payload {
                    Some(payload) => {
                        if socket.send(Message::Text(payload.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Removed by the registry (slow consumer); tell the
                        // client and stop.
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    state.registry.unregister(client_id);
    let _ = socket.close().await;
}
