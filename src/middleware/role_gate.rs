//! Role-based access control, the final pipeline stage.
//!
//! Protected path prefixes require an authenticated subject holding one of
//! the allowed roles. Anonymous requests get a 401, authenticated requests
//! with an insufficient role a 403. Everything outside the protected
//! prefixes passes through untouched, whoever sent it.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

use crate::auth::{Role, Subject};
use crate::config::AccessControlConfig;
use crate::error::ErrorBody;

use super::pipeline::{PipelineStage, StageError, StageVerdict};

/// 403 payload for an authenticated caller whose role is not allowed.
#[derive(Debug, Serialize)]
pub struct RoleRejection {
    error: String,
    message: String,
    your_role: String,
}

impl RoleRejection {
    fn new(allowed_roles: &[Role], your_role: Role) -> Self {
        Self {
            error: "Permission denied".to_string(),
            message: format!(
                "Only {} users can access this resource",
                join_words(allowed_roles)
            ),
            your_role: your_role.to_string(),
        }
    }
}

impl IntoResponse for RoleRejection {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, Json(self)).into_response()
    }
}

fn anonymous_rejection() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new(
            "Authentication required",
            "You must be logged in to access this resource",
        )),
    )
        .into_response()
}

/// Render roles as prose: "admin", "admin and moderator",
/// "admin, moderator and host".
fn join_words(roles: &[Role]) -> String {
    match roles {
        [] => String::new(),
        [only] => only.to_string(),
        [head @ .., last] => {
            let head = head
                .iter()
                .map(Role::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} and {}", head, last)
        }
    }
}

/// Pipeline stage guarding protected path prefixes.
pub struct RoleGateStage {
    protected_paths: Vec<String>,
    allowed_roles: Vec<Role>,
}

impl RoleGateStage {
    pub fn new(config: AccessControlConfig) -> Self {
        Self {
            protected_paths: config.protected_paths,
            allowed_roles: config.allowed_roles,
        }
    }

    /// Prefix match on whole path segments, so `/api/messages` covers
    /// `/api/messages` and `/api/messages/42` but not `/api/messagesx`.
    fn is_protected(&self, path: &str) -> bool {
        self.protected_paths.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .map_or(false, |rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

#[async_trait]
impl PipelineStage for RoleGateStage {
    fn name(&self) -> &'static str {
        "role_gate"
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
        if !self.is_protected(request.uri().path()) {
            return Box::pin(async move { Ok(StageVerdict::Continue) });
        }

        let verdict = match request.extensions().get::<Subject>() {
            None => StageVerdict::Terminal(anonymous_rejection()),
            Some(subject) if self.allowed_roles.contains(&subject.role) => {
                StageVerdict::Continue
            }
            Some(subject) => StageVerdict::Terminal(
                RoleRejection::new(&self.allowed_roles, subject.role).into_response(),
            ),
        };
        Box::pin(async move { Ok(verdict) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> RoleGateStage {
        RoleGateStage::new(AccessControlConfig::default())
    }

    fn request_as(path: &str, subject: Option<Subject>) -> Request<Body> {
        let mut request = Request::builder().uri(path).body(Body::empty()).unwrap();
        if let Some(subject) = subject {
            request.extensions_mut().insert(subject);
        }
        request
    }

    fn subject(username: &str, role: Role) -> Subject {
        Subject {
            username: username.to_string(),
            role,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_prefix_matches_whole_segments_only() {
        let stage = stage();
        assert!(stage.is_protected("/api/messages"));
        assert!(stage.is_protected("/api/messages/42"));
        assert!(stage.is_protected("/api/conversations/abc/participants"));
        assert!(!stage.is_protected("/api/messagesx"));
        assert!(!stage.is_protected("/api"));
        assert!(!stage.is_protected("/health"));
    }

    #[test]
    fn test_join_words() {
        assert_eq!(join_words(&[Role::Admin]), "admin");
        assert_eq!(join_words(&[Role::Admin, Role::Moderator]), "admin and moderator");
        assert_eq!(
            join_words(&[Role::Admin, Role::Moderator, Role::Host]),
            "admin, moderator and host"
        );
    }

    #[tokio::test]
    async fn test_unprotected_path_passes_anonymously() {
        let verdict = stage().check(&request_as("/health", None)).await.unwrap();
        assert!(matches!(verdict, StageVerdict::Continue));
    }

    #[tokio::test]
    async fn test_protected_path_rejects_anonymous_with_401() {
        let verdict = stage()
            .check(&request_as("/api/messages", None))
            .await
            .unwrap();
        let response = match verdict {
            StageVerdict::Terminal(response) => response,
            StageVerdict::Continue => panic!("expected rejection"),
        };
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Authentication required");
        assert_eq!(
            body["message"],
            "You must be logged in to access this resource"
        );
    }

    #[tokio::test]
    async fn test_protected_path_rejects_disallowed_role_with_403() {
        for role in [Role::Guest, Role::Host] {
            let verdict = stage()
                .check(&request_as("/api/messages", Some(subject("sam", role))))
                .await
                .unwrap();
            let response = match verdict {
                StageVerdict::Terminal(response) => response,
                StageVerdict::Continue => panic!("expected rejection for {role}"),
            };
            assert_eq!(response.status(), StatusCode::FORBIDDEN);

            let body = body_json(response).await;
            assert_eq!(body["error"], "Permission denied");
            assert_eq!(
                body["message"],
                "Only admin and moderator users can access this resource"
            );
            assert_eq!(body["your_role"], role.to_string());
        }
    }

    #[tokio::test]
    async fn test_protected_path_admits_allowed_roles() {
        for role in [Role::Admin, Role::Moderator] {
            let verdict = stage()
                .check(&request_as(
                    "/api/conversations",
                    Some(subject("alice", role)),
                ))
                .await
                .unwrap();
            assert!(matches!(verdict, StageVerdict::Continue));
        }
    }
}
