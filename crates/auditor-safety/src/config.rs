//! Environment-driven safety configuration (spec.md §6 "Environment-driven
//! safety config"). Every field is optional; defaults are documented here
//! rather than scattered across call sites.

use std::env;
use std::time::Duration;

use crate::allowlist::Allowlist;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{Error, Result};
use crate::maintenance_window::MaintenanceWindow;
use crate::rate_limiter::RateLimitConfig;

/// Per-run and per-integration operation caps.
#[derive(Debug, Clone, Copy)]
pub struct OperationCaps {
    /// spec.md invariant: `Σ actions ≤ maxOpsPerIntegration`.
    pub max_ops_per_integration: u32,
    /// Cap on total actions across every integration in the session.
    pub max_total_ops: u32,
    /// Cap on integrations processed concurrently.
    pub max_concurrent_integrations: u32,
}

impl Default for OperationCaps {
    fn default() -> Self {
        Self {
            max_ops_per_integration: 50,
            max_total_ops: 5_000,
            max_concurrent_integrations: 8,
        }
    }
}

/// Action-count thresholds above which an operator must pass
/// `--force-confirmation` (or the programmatic equivalent) before a run is
/// allowed to execute (vs. dry-run only).
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationThresholds {
    /// Destructive (`delete`) actions across the run.
    pub destructive_actions: u32,
    /// Total actions across the run.
    pub total_actions: u32,
    /// Actions touching integrations whose audit severity is high/critical.
    pub high_risk_actions: u32,
}

impl Default for ConfirmationThresholds {
    fn default() -> Self {
        Self {
            destructive_actions: 10,
            total_actions: 500,
            high_risk_actions: 25,
        }
    }
}

/// The full set of safety knobs for one session.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// Allowlist restricting which integrations/accounts may be touched.
    pub allowlist: Allowlist,
    /// Operation caps.
    pub caps: OperationCaps,
    /// Rate-limiter parameters.
    pub rate_limit: RateLimitConfig,
    /// Circuit-breaker parameters.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Confirmation thresholds.
    pub confirmation: ConfirmationThresholds,
    /// Optional maintenance window; when set, destructive runs outside the
    /// window generate a blocker unless `force_confirmation` is set.
    pub maintenance_window: Option<MaintenanceWindow>,
    /// Operator supplied `--force-confirmation` (or equivalent) to proceed
    /// despite warnings/soft blockers that allow an override.
    pub force_confirmation: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allowlist: Allowlist::disabled(),
            caps: OperationCaps::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            confirmation: ConfirmationThresholds::default(),
            maintenance_window: None,
            force_confirmation: false,
        }
    }
}

fn parse_env_u32(key: &str) -> Result<Option<u32>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|e| Error::InvalidConfig {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::InvalidConfig {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_env_f64(key: &str) -> Result<Option<f64>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|e| Error::InvalidConfig {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::InvalidConfig {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_env_list(key: &str) -> Vec<String> {
    env::var(key)
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl SafetyConfig {
    /// Build a `SafetyConfig` from the process environment, falling back
    /// to the documented defaults for anything unset.
    ///
    /// Recognized variables:
    /// `AUDITOR_ALLOWLIST`, `AUDITOR_ALLOWLIST_ACCOUNTS`,
    /// `AUDITOR_MAX_OPS_PER_INTEGRATION`, `AUDITOR_MAX_TOTAL_OPS`,
    /// `AUDITOR_MAX_CONCURRENT_INTEGRATIONS`,
    /// `AUDITOR_RATE_LIMIT_RPS`, `AUDITOR_RATE_LIMIT_BURST`,
    /// `AUDITOR_CB_FAILURE_THRESHOLD`, `AUDITOR_CB_RECOVERY_SECS`,
    /// `AUDITOR_CB_HALF_OPEN_MAX_CALLS`,
    /// `AUDITOR_CONFIRM_DESTRUCTIVE`, `AUDITOR_CONFIRM_TOTAL`,
    /// `AUDITOR_CONFIRM_HIGH_RISK`, `AUDITOR_MAINTENANCE_WINDOW`.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        let integration_ids = parse_env_list("AUDITOR_ALLOWLIST");
        let accounts = parse_env_list("AUDITOR_ALLOWLIST_ACCOUNTS");
        if !integration_ids.is_empty() || !accounts.is_empty() {
            cfg.allowlist = Allowlist::new(integration_ids, accounts);
        }

        if let Some(v) = parse_env_u32("AUDITOR_MAX_OPS_PER_INTEGRATION")? {
            cfg.caps.max_ops_per_integration = v;
        }
        if let Some(v) = parse_env_u32("AUDITOR_MAX_TOTAL_OPS")? {
            cfg.caps.max_total_ops = v;
        }
        if let Some(v) = parse_env_u32("AUDITOR_MAX_CONCURRENT_INTEGRATIONS")? {
            cfg.caps.max_concurrent_integrations = v;
        }

        if let Some(v) = parse_env_f64("AUDITOR_RATE_LIMIT_RPS")? {
            cfg.rate_limit.requests_per_second = v;
        }
        if let Some(v) = parse_env_u32("AUDITOR_RATE_LIMIT_BURST")? {
            cfg.rate_limit.burst_limit = u64::from(v);
        }

        if let Some(v) = parse_env_u32("AUDITOR_CB_FAILURE_THRESHOLD")? {
            cfg.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = parse_env_u32("AUDITOR_CB_RECOVERY_SECS")? {
            cfg.circuit_breaker.recovery_timeout = Duration::from_secs(u64::from(v));
        }
        if let Some(v) = parse_env_u32("AUDITOR_CB_HALF_OPEN_MAX_CALLS")? {
            cfg.circuit_breaker.half_open_max_calls = v;
        }

        if let Some(v) = parse_env_u32("AUDITOR_CONFIRM_DESTRUCTIVE")? {
            cfg.confirmation.destructive_actions = v;
        }
        if let Some(v) = parse_env_u32("AUDITOR_CONFIRM_TOTAL")? {
            cfg.confirmation.total_actions = v;
        }
        if let Some(v) = parse_env_u32("AUDITOR_CONFIRM_HIGH_RISK")? {
            cfg.confirmation.high_risk_actions = v;
        }

        if let Ok(raw) = env::var("AUDITOR_MAINTENANCE_WINDOW") {
            cfg.maintenance_window = MaintenanceWindow::parse(&raw);
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive_but_bounded() {
        let cfg = SafetyConfig::default();
        assert!(!cfg.allowlist.enabled);
        assert_eq!(cfg.caps.max_ops_per_integration, 50);
    }
}
