//! Per-identity message rate limiting, the third pipeline stage.
//!
//! Only POST requests count against the limit; reads are never throttled.
//! Each client identity gets an independent sliding window of send
//! timestamps: a request is admitted while fewer than the configured
//! ceiling of sends happened within the lookback window, and rejected
//! attempts are not themselves recorded, so a client cannot extend its own
//! lockout by retrying.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

use super::pipeline::{PipelineStage, StageError, StageVerdict};

/// Header consulted before falling back to the peer address.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// The identity rate limiting buckets by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIdentity(IpAddr);

impl ClientIdentity {
    pub fn new(ip: IpAddr) -> Self {
        Self(ip)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Derive the client identity for a request.
///
/// The first `X-Forwarded-For` entry wins when the header is present; a
/// present-but-unparseable entry is an upstream proxy defect, not a client
/// error, and surfaces as a stage failure. Without the header the socket
/// peer address is used.
pub fn client_identity(request: &Request<Body>) -> Result<ClientIdentity, StageError> {
    if let Some(forwarded) = request.headers().get(FORWARDED_FOR) {
        let raw = forwarded
            .to_str()
            .map_err(|_| StageError::MalformedIdentity("non-ascii x-forwarded-for".to_string()))?;
        let first = raw.split(',').next().unwrap_or("").trim();
        let ip = first
            .parse::<IpAddr>()
            .map_err(|_| StageError::MalformedIdentity(first.to_string()))?;
        return Ok(ClientIdentity(ip));
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| ClientIdentity(info.0.ip()))
        .ok_or(StageError::MissingIdentity)
}

/// Outcome of asking the store to admit one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admitted { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Sliding-window admission state, injectable for tests and for alternative
/// backends.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically prune, count, and (when admitted) record one send for the
    /// identity at time `now`.
    async fn admit(&self, identity: ClientIdentity, now: Instant) -> RateDecision;

    /// Drop identities whose windows hold no live timestamps.
    async fn sweep(&self, now: Instant);
}

/// In-process store keyed by client identity.
///
/// All bookkeeping for one identity happens under its map entry lock, so
/// concurrent sends from the same identity serialize and the ceiling holds
/// exactly.
pub struct InMemoryRateLimitStore {
    ceiling: u32,
    window: Duration,
    entries: DashMap<ClientIdentity, VecDeque<Instant>>,
}

impl InMemoryRateLimitStore {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            ceiling: config.max_requests,
            window: Duration::from_secs(config.window_seconds),
            entries: DashMap::new(),
        }
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.entries.len()
    }

    fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while stamps
            .front()
            .map_or(false, |&stamp| now.duration_since(stamp) >= window)
        {
            stamps.pop_front();
        }
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn admit(&self, identity: ClientIdentity, now: Instant) -> RateDecision {
        let mut stamps = self.entries.entry(identity).or_default();
        Self::prune(&mut stamps, now, self.window);

        if (stamps.len() as u32) < self.ceiling {
            stamps.push_back(now);
            RateDecision::Admitted {
                remaining: self.ceiling - stamps.len() as u32,
            }
        } else {
            RateDecision::Limited {
                retry_after: self.window,
            }
        }
    }

    async fn sweep(&self, now: Instant) {
        let window = self.window;
        self.entries.retain(|_, stamps| {
            Self::prune(stamps, now, window);
            !stamps.is_empty()
        });
    }
}

/// 429 payload sent to throttled callers.
#[derive(Debug, Serialize)]
pub struct RateRejection {
    error: String,
    message: String,
    retry_after: String,
    #[serde(skip)]
    retry_after_secs: u64,
}

impl RateRejection {
    fn new(ceiling: u32, window_seconds: u64, retry_after: Duration) -> Self {
        Self {
            error: "Rate limit exceeded".to_string(),
            message: format!(
                "You can only send {} messages {}",
                ceiling,
                window_phrase(window_seconds)
            ),
            retry_after: format!("{} seconds", retry_after.as_secs()),
            retry_after_secs: retry_after.as_secs(),
        }
    }
}

impl IntoResponse for RateRejection {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after_secs.to_string();
        (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after)],
            Json(self),
        )
            .into_response()
    }
}

fn window_phrase(window_seconds: u64) -> String {
    match window_seconds {
        60 => "per minute".to_string(),
        other => format!("per {} seconds", other),
    }
}

/// Pipeline stage enforcing the send ceiling.
pub struct RateLimitStage {
    store: Arc<dyn RateLimitStore>,
    ceiling: u32,
    window_seconds: u64,
}

impl RateLimitStage {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            ceiling: config.max_requests,
            window_seconds: config.window_seconds,
        }
    }
}

#[async_trait]
impl PipelineStage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    // Written in `async_trait`'s desugared form: the returned future must be
    // `Send`, but `Body` is `!Sync`, so `&Request<Body>` cannot be captured
    // by the future. All request inspection happens before it is built.
    fn check<'life0, 'life1, 'async_trait>(
        &'life0 self,
        request: &'life1 Request<Body>,
    ) -> Pin<Box<dyn Future<Output = Result<StageVerdict, StageError>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        if request.method() != Method::POST {
            return Box::pin(async move { Ok(StageVerdict::Continue) });
        }

        let identity = client_identity(request);
        Box::pin(async move {
            let identity = identity?;
            match self.store.admit(identity, Instant::now()).await {
                RateDecision::Admitted { remaining } => {
                    tracing::debug!(identity = %identity, remaining, "Send admitted");
                    Ok(StageVerdict::Continue)
                }
                RateDecision::Limited { retry_after } => {
                    tracing::debug!(identity = %identity, "Send rate limited");
                    Ok(StageVerdict::Terminal(
                        RateRejection::new(self.ceiling, self.window_seconds, retry_after)
                            .into_response(),
                    ))
                }
            }
        })
    }
}
