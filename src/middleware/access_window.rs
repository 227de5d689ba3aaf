//! Wall-clock access restriction, the second pipeline stage.
//!
//! Chat access is only permitted inside a configured time-of-day window on
//! the server's local clock. The window is closed-open: a request at the
//! opening instant is allowed, one at the closing instant is rejected.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Local, NaiveTime};
use serde::Serialize;

use crate::config::AccessWindowConfig;

use super::pipeline::{PipelineStage, StageError, StageVerdict};

/// The allowed `[start, end)` interval.
#[derive(Debug, Clone, Copy)]
pub struct AccessWindowPolicy {
    start: NaiveTime,
    end: NaiveTime,
}

impl AccessWindowPolicy {
    pub fn permits(&self, now: NaiveTime) -> bool {
        self.start <= now && now < self.end
    }

    /// Human-readable window bounds, e.g. "9 AM to 6 PM".
    pub fn describe(&self) -> String {
        format!("{} to {}", clock_label(self.start), clock_label(self.end))
    }
}

impl From<AccessWindowConfig> for AccessWindowPolicy {
    fn from(config: AccessWindowConfig) -> Self {
        Self {
            start: config.start,
            end: config.end,
        }
    }
}

fn clock_label(time: NaiveTime) -> String {
    use chrono::Timelike;
    if time.minute() == 0 && time.second() == 0 {
        time.format("%-I %p").to_string()
    } else {
        time.format("%-I:%M %p").to_string()
    }
}

/// 403 payload sent to callers outside the window.
#[derive(Debug, Serialize)]
pub struct WindowRejection {
    error: String,
    message: String,
    current_time: String,
}

impl WindowRejection {
    fn new(policy: &AccessWindowPolicy, now: NaiveTime) -> Self {
        Self {
            error: "Access forbidden".to_string(),
            message: format!("Chat access is restricted outside of {}", policy.describe()),
            current_time: now.format("%H:%M:%S").to_string(),
        }
    }
}

impl IntoResponse for WindowRejection {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, Json(self)).into_response()
    }
}

/// Pipeline stage enforcing the access window.
pub struct AccessWindowStage {
    policy: AccessWindowPolicy,
    clock: fn() -> NaiveTime,
}

impl AccessWindowStage {
    pub fn new(config: AccessWindowConfig) -> Self {
        Self {
            policy: config.into(),
            clock: local_wall_clock,
        }
    }

    #[cfg(test)]
    fn with_clock(config: AccessWindowConfig, clock: fn() -> NaiveTime) -> Self {
        Self {
            policy: config.into(),
            clock,
        }
    }
}

fn local_wall_clock() -> NaiveTime {
    Local::now().time()
}

#[async_trait]
impl PipelineStage for AccessWindowStage {
    fn name(&self) -> &'static str {
        "access_window"
    }

    async fn check(&self, _request: &Request<Body>) -> Result<StageVerdict, StageError> {
        let now = (self.clock)();
        if self.policy.permits(now) {
            Ok(StageVerdict::Continue)
        } else {
            Ok(StageVerdict::Terminal(
                WindowRejection::new(&self.policy, now).into_response(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(start: (u32, u32, u32), end: (u32, u32, u32)) -> AccessWindowPolicy {
        AccessWindowConfig {
            start: NaiveTime::from_hms_opt(start.0, start.1, start.2).unwrap(),
            end: NaiveTime::from_hms_opt(end.0, end.1, end.2).unwrap(),
        }
        .into()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_window_is_closed_open() {
        let policy = policy((9, 0, 0), (18, 0, 0));
        assert!(policy.permits(at(9, 0, 0)));
        assert!(policy.permits(at(12, 15, 30)));
        assert!(policy.permits(at(17, 59, 59)));
        assert!(!policy.permits(at(18, 0, 0)));
        assert!(!policy.permits(at(8, 59, 59)));
        assert!(!policy.permits(at(23, 30, 0)));
    }

    #[test]
    fn test_describe_whole_hours() {
        assert_eq!(policy((9, 0, 0), (18, 0, 0)).describe(), "9 AM to 6 PM");
        assert_eq!(policy((0, 0, 0), (12, 0, 0)).describe(), "12 AM to 12 PM");
    }

    #[test]
    fn test_describe_with_minutes() {
        assert_eq!(
            policy((9, 30, 0), (18, 45, 0)).describe(),
            "9:30 AM to 6:45 PM"
        );
    }

    fn evening() -> NaiveTime {
        at(20, 30, 45)
    }

    fn noon() -> NaiveTime {
        at(12, 0, 0)
    }

    #[tokio::test]
    async fn test_stage_rejects_outside_window_with_full_body() {
        let stage = AccessWindowStage::with_clock(AccessWindowConfig::default(), evening);
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let verdict = stage.check(&request).await.unwrap();
        let response = match verdict {
            StageVerdict::Terminal(response) => response,
            StageVerdict::Continue => panic!("expected rejection"),
        };
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Access forbidden");
        assert_eq!(
            body["message"],
            "Chat access is restricted outside of 9 AM to 6 PM"
        );
        assert_eq!(body["current_time"], "20:30:45");
    }

    #[tokio::test]
    async fn test_stage_allows_inside_window() {
        let stage = AccessWindowStage::with_clock(AccessWindowConfig::default(), noon);
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let verdict = stage.check(&request).await.unwrap();
        assert!(matches!(verdict, StageVerdict::Continue));
    }
}
