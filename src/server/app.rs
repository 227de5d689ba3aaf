//! Application server setup and lifecycle

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;

use crate::config::{RateLimitConfig, Settings};
use crate::middleware::{InMemoryRateLimitStore, RateLimitStore};

use super::routes::create_router;
use super::state::AppState;

/// The assembled application.
pub struct App {
    state: AppState,
    router: axum::Router,
}

impl App {
    pub fn new(settings: Settings) -> Result<Self> {
        let state = AppState::new(settings)?;
        let router = create_router(state.clone());
        Ok(Self { state, router })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind and serve until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.settings.server_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        tracing::info!(
            addr = %addr,
            environment = %self.state.settings.environment,
            "Server listening"
        );

        spawn_store_sweeper(self.state.rate_store.clone(), self.state.settings.rate_limit);

        // Connect info is required so the rate limiter can fall back to the
        // peer address when no forwarding header is present.
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Periodically drop rate-limit state for identities with no live sends.
fn spawn_store_sweeper(store: Arc<InMemoryRateLimitStore>, config: RateLimitConfig) {
    let period = Duration::from_secs(config.window_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.sweep(Instant::now()).await;
            tracing::debug!(
                tracked_identities = store.tracked_identities(),
                "Swept rate limit store"
            );
        }
    });
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down");
        }
    }
}
