//! Application settings and configuration
//!
//! This module provides configuration management for the gateway, loading
//! settings from environment variables with sensible defaults. All values
//! are fixed at process start; nothing here is runtime-mutable.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::auth::Role;

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!(
                "Invalid environment: {}. Expected: development, staging, or production",
                s
            ),
        }
    }
}

/// Allowed time-of-day window for chat access.
///
/// The window is a closed-open interval `[start, end)` on the server's
/// local wall clock: a request arriving exactly at `start` is allowed,
/// exactly at `end` is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessWindowConfig {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for AccessWindowConfig {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).expect("valid window start"),
            end: NaiveTime::from_hms_opt(18, 0, 0).expect("valid window end"),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum POST requests admitted per identity within the lookback window.
    pub max_requests: u32,
    /// Lookback window in seconds.
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_seconds: 60,
        }
    }
}

/// Role-based access control configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlConfig {
    /// Path prefixes that require an elevated role.
    pub protected_paths: Vec<String>,
    /// Roles permitted on protected paths.
    pub allowed_roles: Vec<Role>,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            protected_paths: vec![
                "/api/conversations".to_string(),
                "/api/messages".to_string(),
            ],
            allowed_roles: vec![Role::Admin, Role::Moderator],
        }
    }
}

/// Durable request log configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLogConfig {
    /// Append-only log file receiving one line per request.
    pub path: PathBuf,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("requests.log"),
        }
    }
}

/// One static bearer-token credential, `token:username:role`.
///
/// The token itself may contain colons; the username and role may not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokenEntry {
    pub token: String,
    pub username: String,
    pub role: Role,
}

impl FromStr for AuthTokenEntry {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.rsplitn(3, ':');
        let role = fields.next().unwrap_or_default();
        let username = fields.next().unwrap_or_default();
        let token = fields.next().unwrap_or_default();

        if token.is_empty() || username.is_empty() {
            anyhow::bail!("Invalid auth token entry {:?}. Expected token:username:role", s);
        }

        Ok(Self {
            token: token.to_string(),
            username: username.to_string(),
            role: role
                .parse()
                .with_context(|| format!("Invalid role in auth token entry {:?}", s))?,
        })
    }
}

/// Main application settings
#[derive(Debug, Clone)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Server settings
    pub host: String,
    pub port: u16,

    // Guard pipeline
    pub access_window: AccessWindowConfig,
    pub rate_limit: RateLimitConfig,
    pub access_control: AccessControlConfig,
    pub request_log: RequestLogConfig,

    // Authentication collaborator
    pub auth_tokens: Vec<AuthTokenEntry>,

    /// Ephemeral bearer token generated at startup when no tokens are
    /// configured. Never read from the environment.
    pub ephemeral_token: Option<String>,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let defaults = Settings::default();

        let settings = Self {
            app_name: env_or_default("APP_NAME", &defaults.app_name),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: env_or_default("LOG_LEVEL", "info"),

            host: env_or_default("HOST", "0.0.0.0"),
            port: env_or_default("PORT", "8000")
                .parse()
                .context("Invalid PORT value")?,

            access_window: AccessWindowConfig {
                start: parse_time_of_day(&env_or_default("ACCESS_WINDOW_START", "09:00"))
                    .context("Invalid ACCESS_WINDOW_START value")?,
                end: parse_time_of_day(&env_or_default("ACCESS_WINDOW_END", "18:00"))
                    .context("Invalid ACCESS_WINDOW_END value")?,
            },

            rate_limit: RateLimitConfig {
                max_requests: env_or_default("RATE_LIMIT_MAX_REQUESTS", "5")
                    .parse()
                    .context("Invalid RATE_LIMIT_MAX_REQUESTS value")?,
                window_seconds: env_or_default("RATE_LIMIT_WINDOW_SECONDS", "60")
                    .parse()
                    .context("Invalid RATE_LIMIT_WINDOW_SECONDS value")?,
            },

            access_control: AccessControlConfig {
                protected_paths: match env::var("PROTECTED_PATHS") {
                    Ok(raw) => parse_list(&raw),
                    Err(_) => defaults.access_control.protected_paths.clone(),
                },
                allowed_roles: match env::var("ALLOWED_ROLES") {
                    Ok(raw) => parse_list(&raw)
                        .iter()
                        .map(|s| s.parse())
                        .collect::<Result<Vec<Role>>>()
                        .context("Invalid ALLOWED_ROLES value")?,
                    Err(_) => defaults.access_control.allowed_roles.clone(),
                },
            },

            request_log: RequestLogConfig {
                path: PathBuf::from(env_or_default("REQUEST_LOG_PATH", "requests.log")),
            },

            auth_tokens: match env::var("AUTH_TOKENS") {
                Ok(raw) => parse_list(&raw)
                    .iter()
                    .map(|s| s.parse())
                    .collect::<Result<Vec<AuthTokenEntry>>>()
                    .context("Invalid AUTH_TOKENS value")?,
                Err(_) => Vec::new(),
            },

            ephemeral_token: None,
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.rate_limit.max_requests == 0 {
            anyhow::bail!("Rate limit max_requests must be > 0");
        }
        if self.rate_limit.window_seconds == 0 {
            anyhow::bail!("Rate limit window_seconds must be > 0");
        }

        if self.access_window.start >= self.access_window.end {
            anyhow::bail!(
                "Access window start ({}) must be earlier than end ({})",
                self.access_window.start,
                self.access_window.end
            );
        }

        if self.access_control.protected_paths.is_empty() {
            anyhow::bail!("At least one protected path prefix is required");
        }
        for path in &self.access_control.protected_paths {
            if !path.starts_with('/') {
                anyhow::bail!("Protected path {:?} must start with '/'", path);
            }
        }

        if self.access_control.allowed_roles.is_empty() {
            anyhow::bail!("At least one allowed role is required");
        }

        if self.request_log.path.as_os_str().is_empty() {
            anyhow::bail!("Request log path cannot be empty");
        }

        Ok(())
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Generate and register an ephemeral admin token.
    ///
    /// Used for local development when no `AUTH_TOKENS` are configured.
    /// Returns the generated token.
    pub fn generate_ephemeral_token(&mut self) -> String {
        let token = format!("chat-{}", uuid::Uuid::new_v4().simple());
        self.auth_tokens.push(AuthTokenEntry {
            token: token.clone(),
            username: "admin".to_string(),
            role: Role::Admin,
        });
        self.ephemeral_token = Some(token.clone());
        token
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "chat-gateway".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            access_window: AccessWindowConfig::default(),
            rate_limit: RateLimitConfig::default(),
            access_control: AccessControlConfig::default(),
            request_log: RequestLogConfig::default(),
            auth_tokens: Vec::new(),
            ephemeral_token: None,
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a comma-separated list, trimming whitespace and dropping empties
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a wall-clock time of day, accepting `HH:MM:SS` or `HH:MM`
fn parse_time_of_day(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .with_context(|| format!("Expected HH:MM or HH:MM:SS, got {:?}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.app_name, "chat-gateway");
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.rate_limit.max_requests, 5);
        assert_eq!(settings.rate_limit.window_seconds, 60);
        assert_eq!(
            settings.access_window.start,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
        assert_eq!(
            settings.access_window.end,
            NaiveTime::from_hms_opt(18, 0, 0).unwrap()
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_access_control() {
        let access = AccessControlConfig::default();
        assert_eq!(
            access.protected_paths,
            vec!["/api/conversations", "/api/messages"]
        );
        assert_eq!(access.allowed_roles, vec![Role::Admin, Role::Moderator]);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(
            parse_time_of_day("09:00").unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time_of_day("18:30:15").unwrap(),
            NaiveTime::from_hms_opt(18, 30, 15).unwrap()
        );
        assert!(parse_time_of_day("9am").is_err());
    }

    #[test]
    fn test_auth_token_entry_parsing() {
        let entry: AuthTokenEntry = "sekrit:alice:admin".parse().unwrap();
        assert_eq!(entry.token, "sekrit");
        assert_eq!(entry.username, "alice");
        assert_eq!(entry.role, Role::Admin);

        // Tokens may themselves contain colons
        let entry: AuthTokenEntry = "chat:v1:abc123:bob:guest".parse().unwrap();
        assert_eq!(entry.token, "chat:v1:abc123");
        assert_eq!(entry.username, "bob");
        assert_eq!(entry.role, Role::Guest);

        assert!("no-fields-here".parse::<AuthTokenEntry>().is_err());
        assert!("tok:carol:wizard".parse::<AuthTokenEntry>().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let mut settings = Settings::default();
        settings.access_window.start = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
        settings.access_window.end = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let mut settings = Settings::default();
        settings.rate_limit.max_requests = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_protected_path() {
        let mut settings = Settings::default();
        settings.access_control.protected_paths = vec!["api/messages".to_string()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_generate_ephemeral_token() {
        let mut settings = Settings::default();
        let token = settings.generate_ephemeral_token();
        assert!(token.starts_with("chat-"));
        assert_eq!(settings.auth_tokens.len(), 1);
        assert_eq!(settings.auth_tokens[0].username, "admin");
        assert_eq!(settings.ephemeral_token.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn test_server_addr() {
        let settings = Settings::default();
        assert_eq!(settings.server_addr(), "0.0.0.0:8000");
    }
}
