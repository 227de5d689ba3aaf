pub mod settings;

pub use settings::{
    AccessControlConfig, AccessWindowConfig, AuthTokenEntry, Environment, RateLimitConfig,
    RequestLogConfig, Settings,
};
