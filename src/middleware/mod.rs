//! The guard pipeline and its stages.

pub mod access_window;
pub mod pipeline;
pub mod rate_limit;
pub mod request_log;
pub mod role_gate;

pub use access_window::AccessWindowStage;
pub use pipeline::{pipeline_middleware, Pipeline, PipelineStage, StageError, StageVerdict};
pub use rate_limit::{
    ClientIdentity, InMemoryRateLimitStore, RateDecision, RateLimitStage, RateLimitStore,
};
pub use request_log::{RequestLog, RequestLogStage, RequestRecord};
pub use role_gate::RoleGateStage;
