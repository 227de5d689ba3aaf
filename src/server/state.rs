//! Shared application state

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::{AuthState, UserRegistry};
use crate::config::Settings;
use crate::middleware::{
    AccessWindowStage, InMemoryRateLimitStore, Pipeline, RateLimitStage, RequestLog,
    RequestLogStage, RoleGateStage,
};
use crate::services::MessageBoard;

/// Application state shared across handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub board: Arc<MessageBoard>,
    pub pipeline: Arc<Pipeline>,
    pub auth: AuthState,
    pub rate_store: Arc<InMemoryRateLimitStore>,
    pub started_at: Instant,
}

impl AppState {
    /// Build all collaborators from settings.
    ///
    /// Failing to open the request log is fatal here: starting a gateway
    /// that silently cannot record requests would defeat the first stage,
    /// while individual write failures later are merely logged.
    pub fn new(settings: Settings) -> Result<Self> {
        let request_log = RequestLog::open(&settings.request_log.path)?;
        let rate_store = Arc::new(InMemoryRateLimitStore::new(settings.rate_limit));

        let pipeline = Pipeline::standard(
            RequestLogStage::new(request_log),
            AccessWindowStage::new(settings.access_window),
            RateLimitStage::new(rate_store.clone(), settings.rate_limit),
            RoleGateStage::new(settings.access_control.clone()),
        );

        let registry = UserRegistry::from_entries(&settings.auth_tokens);

        Ok(Self {
            settings: Arc::new(settings),
            board: Arc::new(MessageBoard::new()),
            pipeline: Arc::new(pipeline),
            auth: AuthState {
                registry: Arc::new(registry),
            },
            rate_store,
            started_at: Instant::now(),
        })
    }
}
