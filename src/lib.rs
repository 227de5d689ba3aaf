//! Chat gateway with a guarded request pipeline.
//!
//! Every incoming request passes, in order, through a durable request log,
//! a wall-clock access window, a per-identity send rate limiter and a
//! role gate before any handler runs. Authentication is a separate layer
//! that resolves bearer tokens to subjects but never rejects on its own.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod services;

pub use config::Settings;
pub use error::ApiError;
pub use server::App;
