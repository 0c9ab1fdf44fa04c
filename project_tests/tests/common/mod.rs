use std::net::SocketAddr;
use tempfile::TempDir;

use vision_server::vision_logic::config::{Config, ConfigOverrides};
use vision_server::vision_logic::downstream;
use vision_server::vision_logic::state::AppState;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub output_dir: TempDir,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self) -> String {
        format!("ws://{}/api/v1/ws", self.addr)
    }
}

/// Boot the real router on an ephemeral port with a throwaway recordings
/// directory. The pipeline is not started; tests drive the hub directly.
pub async fn spawn_server() -> TestServer {
    let output_dir = tempfile::tempdir().unwrap();
    let mut config = Config::from_overrides(ConfigOverrides::default());
    config.output_dir = output_dir.path().to_path_buf();

    let state = AppState::new(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let app = downstream::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        state,
        output_dir,
    }
}
