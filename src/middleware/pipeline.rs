//! The guard pipeline.
//!
//! Every request passes through an ordered sequence of stages before it can
//! reach a handler. Each stage inspects the request and either lets it
//! continue or produces the terminal response itself. The order is fixed at
//! construction and is not configurable: the request log always observes a
//! request before any policy can reject it, and cheap wall-clock checks run
//! before per-identity bookkeeping.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::error::ErrorBody;
use crate::metrics;

use super::access_window::AccessWindowStage;
use super::rate_limit::RateLimitStage;
use super::request_log::RequestLogStage;
use super::role_gate::RoleGateStage;

/// Outcome of a single stage check.
pub enum StageVerdict {
    /// Hand the request to the next stage (or the handler).
    Continue,
    /// Stop here and send this response to the client.
    Terminal(Response),
}

/// Failures a stage cannot express as a policy decision.
///
/// These are defects or environmental problems, not client errors, and are
/// mapped to an opaque 500 so internals never leak into response bodies.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("no client identity available on the request")]
    MissingIdentity,
    #[error("malformed client identity: {0}")]
    MalformedIdentity(String),
}

/// A single checkpoint in the guard pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stable stage name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Inspect the request and decide whether it may proceed.
    async fn check(&self, request: &Request<Body>) -> Result<StageVerdict, StageError>;
}

/// An ordered chain of stages applied to every request.
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    fn new(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    /// Build the standard gateway pipeline.
    ///
    /// This is the only public constructor; the stage order is part of the
    /// gateway's contract and callers cannot rearrange it.
    pub fn standard(
        request_log: RequestLogStage,
        access_window: AccessWindowStage,
        rate_limit: RateLimitStage,
        role_gate: RoleGateStage,
    ) -> Self {
        Self::new(vec![
            Box::new(request_log),
            Box::new(access_window),
            Box::new(rate_limit),
            Box::new(role_gate),
        ])
    }

    /// Stage names in evaluation order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run the request through every stage in order.
    ///
    /// Returns the request back if all stages pass, otherwise the terminal
    /// response produced by the rejecting (or failing) stage. Stages after
    /// the terminal one are never consulted.
    pub async fn execute(&self, request: Request<Body>) -> Result<Request<Body>, Response> {
        metrics::record_request();

        for stage in &self.stages {
            match stage.check(&request).await {
                Ok(StageVerdict::Continue) => {}
                Ok(StageVerdict::Terminal(response)) => {
                    metrics::record_rejection(stage.name());
                    tracing::info!(
                        stage = stage.name(),
                        status = %response.status(),
                        path = %request.uri().path(),
                        "Request rejected by pipeline stage"
                    );
                    return Err(response);
                }
                Err(err) => {
                    metrics::record_stage_failure(stage.name());
                    tracing::error!(
                        stage = stage.name(),
                        error = %err,
                        path = %request.uri().path(),
                        "Pipeline stage failed unexpectedly"
                    );
                    return Err(internal_error_response());
                }
            }
        }

        Ok(request)
    }
}

/// Opaque response for stage failures. Details stay in the server log.
fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(
            "Internal server error",
            "The request could not be processed",
        )),
    )
        .into_response()
}

/// Axum middleware adapter driving the pipeline.
pub async fn pipeline_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match pipeline.execute(request).await {
        Ok(request) => next.run(request).await,
        Err(response) => response,
    }
}
