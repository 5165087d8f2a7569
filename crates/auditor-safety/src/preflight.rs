//! Preflight checks (spec.md §4.5 `performPreflightCheck`).
//!
//! Checks run in a fixed order so the blocker list is deterministic:
//! circuit breaker, allowlist, maintenance window, per-integration cap,
//! total-operation cap, concurrent-integration cap, confirmation
//! thresholds. Any failing check appends a blocker; a check within 80% of
//! its limit appends a warning instead of (or in addition to) passing.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::allowlist::Allowlist;
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::{ConfirmationThresholds, OperationCaps};
use crate::maintenance_window::MaintenanceWindow;

/// Summary of one integration's planned actions, as produced by the
/// execution planner — enough for the safety controller to evaluate caps
/// and thresholds without depending on `auditor-core`'s plan type.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    /// Integration the plan targets.
    pub integration_id: String,
    /// Total actions in the plan.
    pub total_actions: u32,
    /// Of those, how many are `delete` actions.
    pub destructive_actions: u32,
    /// Of those, how many target integrations with high/critical severity.
    pub high_risk_actions: u32,
}

/// Ratio of "used" to "limit" a warning threshold is triggered at.
const WARNING_RATIO: f64 = 0.8;

/// A blocking reason; any one of these present means `allowed = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Blocker {
    /// The circuit breaker is OPEN.
    CircuitBreakerOpen,
    /// One or more requested integrations fall outside the allowlist.
    AllowlistViolation {
        /// The offending integration ids.
        excluded: Vec<String>,
    },
    /// The current time is outside the configured maintenance window and
    /// the run was not force-confirmed.
    OutsideMaintenanceWindow,
    /// One integration's plan exceeds `max_ops_per_integration`.
    PerIntegrationCapExceeded {
        /// The offending integration.
        integration_id: String,
        /// Actions planned for it.
        actions: u32,
        /// The configured cap.
        cap: u32,
    },
    /// The session total exceeds `max_total_ops`.
    TotalCapExceeded {
        /// Total actions requested.
        total: u32,
        /// The configured cap.
        cap: u32,
    },
    /// More integrations were requested concurrently than
    /// `max_concurrent_integrations` allows.
    ConcurrencyCapExceeded {
        /// Integrations requested.
        requested: u32,
        /// The configured cap.
        cap: u32,
    },
    /// A confirmation threshold was crossed without `force_confirmation`.
    ConfirmationRequired {
        /// Which threshold tripped.
        threshold: ConfirmationKind,
        /// The measured value.
        measured: u32,
        /// The configured threshold.
        limit: u32,
    },
}

/// Which confirmation threshold a `Blocker::ConfirmationRequired` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationKind {
    /// Destructive (delete) action count.
    Destructive,
    /// Total action count.
    Total,
    /// High-risk action count.
    HighRisk,
}

/// A non-blocking warning; the run may still proceed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    /// Human-readable description.
    pub message: String,
}

/// An advisory recommendation (spec.md §4.5: "reduce batch, dry-run
/// first, run in maintenance window, use allowlist").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    /// Split the request into smaller batches.
    ReduceBatchSize,
    /// Run with `--dry-run` before applying.
    DryRunFirst,
    /// Re-run inside the configured maintenance window.
    RunInMaintenanceWindow,
    /// Scope the run with an allowlist.
    UseAllowlist,
}

/// Outcome of a preflight check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightResult {
    /// Whether the run may proceed (for non-dry-run execution).
    pub allowed: bool,
    /// Integration ids the check evaluated.
    pub scope: Vec<String>,
    /// Blocking reasons, if any.
    pub blockers: Vec<Blocker>,
    /// Non-blocking warnings.
    pub warnings: Vec<Warning>,
    /// Advisory recommendations.
    pub recommendations: Vec<Recommendation>,
}

/// Evaluate every configured safety check against a batch of plans.
///
/// `dry_run` callers should still call this (spec.md §7: "Safety blocker —
/// whole run rejected before execution; dry-run still allowed") but ignore
/// `allowed` for reporting purposes.
#[must_use]
pub fn perform_preflight_check(
    plans: &[PlanSummary],
    allowlist: &Allowlist,
    caps: OperationCaps,
    confirmation: ConfirmationThresholds,
    maintenance_window: Option<&MaintenanceWindow>,
    circuit_breaker: &CircuitBreaker,
    now: chrono::DateTime<chrono::Utc>,
    force_confirmation: bool,
) -> PreflightResult {
    let scope: Vec<String> = plans.iter().map(|p| p.integration_id.clone()).collect();
    let mut blockers = Vec::new();
    let mut warnings = Vec::new();
    let mut recommendations = Vec::new();

    // 1. Circuit breaker.
    if circuit_breaker.state() == CircuitState::Open {
        blockers.push(Blocker::CircuitBreakerOpen);
        recommendations.push(Recommendation::DryRunFirst);
    }

    // 2. Allowlist.
    let excluded = allowlist.excluded(scope.iter().map(String::as_str));
    if !excluded.is_empty() {
        blockers.push(Blocker::AllowlistViolation {
            excluded: excluded.into_iter().map(str::to_string).collect(),
        });
    } else if !allowlist.enabled {
        recommendations.push(Recommendation::UseAllowlist);
    }

    // 3. Maintenance window.
    if let Some(window) = maintenance_window {
        let time = NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second())
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("valid midnight"));
        let inside = window.contains(now.weekday(), time);
        if !inside && !force_confirmation {
            blockers.push(Blocker::OutsideMaintenanceWindow);
            recommendations.push(Recommendation::RunInMaintenanceWindow);
        }
    }

    // 4. Per-integration cap.
    for plan in plans {
        if plan.total_actions > caps.max_ops_per_integration {
            blockers.push(Blocker::PerIntegrationCapExceeded {
                integration_id: plan.integration_id.clone(),
                actions: plan.total_actions,
                cap: caps.max_ops_per_integration,
            });
        } else if is_near_limit(plan.total_actions, caps.max_ops_per_integration) {
            warnings.push(Warning {
                message: format!(
                    "integration {} is at {}/{} of its per-integration cap",
                    plan.integration_id, plan.total_actions, caps.max_ops_per_integration
                ),
            });
        }
    }

    // 5. Total-operation cap.
    let total: u32 = plans.iter().map(|p| p.total_actions).sum();
    if total > caps.max_total_ops {
        blockers.push(Blocker::TotalCapExceeded {
            total,
            cap: caps.max_total_ops,
        });
        recommendations.push(Recommendation::ReduceBatchSize);
    } else if is_near_limit(total, caps.max_total_ops) {
        warnings.push(Warning {
            message: format!(
                "total planned actions {}/{} approaching the session cap",
                total, caps.max_total_ops
            ),
        });
    }

    // 6. Concurrent-integration cap.
    let requested = plans.len() as u32;
    if requested > caps.max_concurrent_integrations {
        blockers.push(Blocker::ConcurrencyCapExceeded {
            requested,
            cap: caps.max_concurrent_integrations,
        });
        recommendations.push(Recommendation::ReduceBatchSize);
    }

    // 7. Confirmation thresholds.
    if !force_confirmation {
        let destructive: u32 = plans.iter().map(|p| p.destructive_actions).sum();
        let high_risk: u32 = plans.iter().map(|p| p.high_risk_actions).sum();

        check_confirmation(
            ConfirmationKind::Destructive,
            destructive,
            confirmation.destructive_actions,
            &mut blockers,
        );
        check_confirmation(
            ConfirmationKind::Total,
            total,
            confirmation.total_actions,
            &mut blockers,
        );
        check_confirmation(
            ConfirmationKind::HighRisk,
            high_risk,
            confirmation.high_risk_actions,
            &mut blockers,
        );
    }

    let allowed = blockers.is_empty();
    PreflightResult {
        allowed,
        scope,
        blockers,
        warnings,
        recommendations,
    }
}

fn check_confirmation(
    kind: ConfirmationKind,
    measured: u32,
    limit: u32,
    blockers: &mut Vec<Blocker>,
) {
    if measured > limit {
        blockers.push(Blocker::ConfirmationRequired {
            threshold: kind,
            measured,
            limit,
        });
    }
}

fn is_near_limit(value: u32, limit: u32) -> bool {
    if limit == 0 {
        return false;
    }
    f64::from(value) >= f64::from(limit) * WARNING_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use chrono::TimeZone;

    fn plan(id: &str, total: u32, destructive: u32, high_risk: u32) -> PlanSummary {
        PlanSummary {
            integration_id: id.to_string(),
            total_actions: total,
            destructive_actions: destructive,
            high_risk_actions: high_risk,
        }
    }

    #[test]
    fn allowlist_blocks_excluded_integration() {
        let allowlist = Allowlist::new(vec!["a".into(), "b".into()], vec![]);
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        let result = perform_preflight_check(
            &[plan("a", 1, 0, 0), plan("c", 1, 0, 0)],
            &allowlist,
            OperationCaps::default(),
            ConfirmationThresholds::default(),
            None,
            &cb,
            chrono::Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
            false,
        );
        assert!(!result.allowed);
        assert!(matches!(
            result.blockers[0],
            Blocker::AllowlistViolation { ref excluded } if excluded == &vec!["c".to_string()]
        ));
    }

    #[test]
    fn open_circuit_breaker_blocks_everything() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        });
        cb.record_failure();
        let result = perform_preflight_check(
            &[plan("a", 1, 0, 0)],
            &Allowlist::disabled(),
            OperationCaps::default(),
            ConfirmationThresholds::default(),
            None,
            &cb,
            chrono::Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
            false,
        );
        assert!(!result.allowed);
        assert!(matches!(result.blockers[0], Blocker::CircuitBreakerOpen));
    }

    #[test]
    fn per_integration_cap_exceeded_blocks() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        let caps = OperationCaps {
            max_ops_per_integration: 5,
            ..OperationCaps::default()
        };
        let result = perform_preflight_check(
            &[plan("a", 6, 0, 0)],
            &Allowlist::disabled(),
            caps,
            ConfirmationThresholds::default(),
            None,
            &cb,
            chrono::Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
            false,
        );
        assert!(!result.allowed);
    }

    #[test]
    fn near_limit_produces_warning_not_blocker() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        let caps = OperationCaps {
            max_ops_per_integration: 10,
            ..OperationCaps::default()
        };
        let result = perform_preflight_check(
            &[plan("a", 9, 0, 0)],
            &Allowlist::disabled(),
            caps,
            ConfirmationThresholds::default(),
            None,
            &cb,
            chrono::Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
            false,
        );
        assert!(result.allowed);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn force_confirmation_skips_maintenance_window_and_thresholds() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        let window = MaintenanceWindow::parse("Sat 00:00-23:59").unwrap();
        let result = perform_preflight_check(
            &[plan("a", 1, 100, 0)],
            &Allowlist::disabled(),
            OperationCaps::default(),
            ConfirmationThresholds::default(),
            Some(&window),
            &cb,
            chrono::Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(), // Monday
            true,
        );
        assert!(result.allowed);
    }
}
