//! Shared utilities for gateway integration tests.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::NaiveTime;
use tempfile::TempDir;

use chat_gateway::auth::Role;
use chat_gateway::config::{AuthTokenEntry, Settings};
use chat_gateway::server::{create_router, AppState};

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    log_path: PathBuf,
    _log_dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn request_log(&self) -> String {
        std::fs::read_to_string(&self.log_path).unwrap_or_default()
    }
}

fn entry(token: &str, username: &str, role: Role) -> AuthTokenEntry {
    AuthTokenEntry {
        token: token.to_string(),
        username: username.to_string(),
        role,
    }
}

/// Settings with a whole-day access window so wall-clock time cannot
/// interfere, and one user per role.
pub fn test_settings(log_dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.request_log.path = log_dir.path().join("requests.log");
    settings.access_window.start = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
    settings.access_window.end = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap();
    settings.auth_tokens = vec![
        entry("tok-admin", "alice", Role::Admin),
        entry("tok-mod", "mo", Role::Moderator),
        entry("tok-host", "harry", Role::Host),
        entry("tok-guest", "gina", Role::Guest),
    ];
    settings
}

/// Bind an ephemeral port and serve the full router in the background.
pub async fn spawn_app(settings: Settings, log_dir: TempDir) -> TestApp {
    let log_path = settings.request_log.path.clone();
    let state = AppState::new(settings).expect("build app state");
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    TestApp {
        addr,
        client,
        log_path,
        _log_dir: log_dir,
    }
}

pub async fn spawn_default_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(&dir);
    spawn_app(settings, dir).await
}
