//! Bearer-token authentication and the role model.
//!
//! Authentication here is a collaborator of the guard pipeline, not a stage
//! of it: it never rejects a request. It resolves the `Authorization` header
//! against a static registry and, on success, attaches a [`Subject`] to the
//! request extensions. Requests without a resolvable subject simply continue
//! as anonymous; whether anonymity is acceptable is decided downstream by
//! the role gate.

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::AuthTokenEntry;

/// The closed set of roles known to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    Host,
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Moderator => write!(f, "moderator"),
            Role::Host => write!(f, "host"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "host" => Ok(Role::Host),
            "guest" => Ok(Role::Guest),
            _ => anyhow::bail!(
                "Invalid role: {}. Expected: admin, moderator, host, or guest",
                s
            ),
        }
    }
}

/// An authenticated caller, attached to request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub username: String,
    pub role: Role,
}

/// Static token-to-subject registry built from configuration at startup.
#[derive(Debug, Default)]
pub struct UserRegistry {
    tokens: HashMap<String, Subject>,
}

impl UserRegistry {
    pub fn from_entries(entries: &[AuthTokenEntry]) -> Self {
        let tokens = entries
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    Subject {
                        username: entry.username.clone(),
                        role: entry.role,
                    },
                )
            })
            .collect();
        Self { tokens }
    }

    /// Look up the subject for a bearer token.
    pub fn resolve(&self, token: &str) -> Option<&Subject> {
        self.tokens.get(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Shared authentication state for the middleware layer.
#[derive(Clone)]
pub struct AuthState {
    pub registry: Arc<UserRegistry>,
}

/// Middleware that resolves the caller's identity.
///
/// Unknown or absent tokens are not an error: the request proceeds without
/// a [`Subject`] extension and is treated as anonymous.
pub async fn authenticate(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(request.headers()) {
        if let Some(subject) = state.registry.resolve(token) {
            tracing::debug!(username = %subject.username, role = %subject.role, "Authenticated request");
            request.extensions_mut().insert(subject.clone());
        } else {
            tracing::debug!("Unknown bearer token, continuing as anonymous");
        }
    }

    next.run(request).await
}

/// Extract the bearer token from an `Authorization` header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
