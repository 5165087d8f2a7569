//! Safety controller: allowlists, operation caps, rate limiting, circuit
//! breaking, maintenance windows and confirmation thresholds that gate the
//! execution planner before it is allowed to apply actions against a real
//! integration.

pub mod allowlist;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod maintenance_window;
pub mod preflight;
pub mod rate_limiter;

pub use allowlist::Allowlist;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{ConfirmationThresholds, OperationCaps, SafetyConfig};
pub use error::{Error, Result};
pub use maintenance_window::MaintenanceWindow;
pub use preflight::{
    perform_preflight_check, Blocker, ConfirmationKind, PlanSummary, PreflightResult,
    Recommendation, Warning,
};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
