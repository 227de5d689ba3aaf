//! Route definitions

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{conversations, health, messages};
use crate::auth::authenticate;
use crate::metrics::metrics_handler;
use crate::middleware::pipeline_middleware;

use super::state::AppState;

/// Build the application router.
///
/// Layers run outside-in: CORS first, then authentication so the guard
/// pipeline can see the resolved subject, then the pipeline itself. Every
/// route, including health and metrics, sits behind the pipeline.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route(
            "/messages",
            post(messages::send_message).get(messages::list_messages),
        );

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health::health_check))
        .route("/liveness", get(health::liveness))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(
            state.pipeline.clone(),
            pipeline_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            authenticate,
        ))
        .layer(cors)
        .with_state(state)
}
