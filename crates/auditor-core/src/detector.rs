//! Corruption detector: a pure function over an `IntegrationSnapshot` and
//! the active `BusinessRules` (spec.md §4.2).
//!
//! Rule categories are modeled as a closed enum rather than dispatched by
//! matching strings at runtime; `detect()` evaluates them in the fixed
//! order spec.md declares.

use serde_json::json;

use crate::model::{AuditResult, CorruptionEvent, IntegrationSnapshot, Severity};
use crate::rules::BusinessRules;

/// One category of corruption check, evaluated in this declaration order.
#[derive(Debug, Clone, Copy)]
enum DetectorRule {
    LicenseValidation,
    RequiredProperties,
    ResourceCounts,
    RequiredResources,
    OfflineConnections,
    StuckUpdate,
}

const RULE_ORDER: [DetectorRule; 6] = [
    DetectorRule::LicenseValidation,
    DetectorRule::RequiredProperties,
    DetectorRule::ResourceCounts,
    DetectorRule::RequiredResources,
    DetectorRule::OfflineConnections,
    DetectorRule::StuckUpdate,
];

/// Evaluate every rule category against `snapshot` under `rules`, in
/// order, accumulating corruption events.
#[must_use]
pub fn detect(snapshot: &IntegrationSnapshot, rules: &BusinessRules) -> AuditResult {
    let mut events = Vec::new();
    for rule in RULE_ORDER {
        match rule {
            DetectorRule::LicenseValidation => license_validation(snapshot, rules, &mut events),
            DetectorRule::RequiredProperties => required_properties(snapshot, rules, &mut events),
            DetectorRule::ResourceCounts => resource_counts(snapshot, rules, &mut events),
            DetectorRule::RequiredResources => required_resources(snapshot, rules, &mut events),
            DetectorRule::OfflineConnections => offline_connections(snapshot, &mut events),
            DetectorRule::StuckUpdate => stuck_update(snapshot, &mut events),
        }
    }

    let overall_severity = events
        .iter()
        .map(|e| e.severity)
        .max()
        .unwrap_or(Severity::Low);

    AuditResult {
        corruption_events: events,
        overall_severity,
    }
}

fn push(
    events: &mut Vec<CorruptionEvent>,
    snapshot: &IntegrationSnapshot,
    rule_id: &str,
    corruption_type: &str,
    severity: Severity,
    evidence: serde_json::Value,
) {
    events.push(CorruptionEvent {
        integration_id: snapshot.id.clone(),
        rule_id: rule_id.to_string(),
        corruption_type: corruption_type.to_string(),
        severity,
        evidence,
        suggested_actions: Vec::new(),
    });
}

fn license_validation(
    snapshot: &IntegrationSnapshot,
    rules: &BusinessRules,
    events: &mut Vec<CorruptionEvent>,
) {
    let lv = &rules.license_validation;
    let edition = snapshot.license_edition.trim();

    let edition_is_valid = lv.valid_editions.iter().any(|valid| {
        if lv.case_sensitive {
            valid == edition
        } else {
            valid.eq_ignore_ascii_case(edition)
        }
    });
    if !edition_is_valid {
        push(
            events,
            snapshot,
            "license-validation",
            "invalid-license-edition",
            Severity::High,
            json!({ "licenseEdition": edition, "validEditions": lv.valid_editions }),
        );
    }

    if let Ok(serialized) = serde_json::to_vec(&snapshot.settings) {
        if serialized.len() as u64 > lv.max_settings_size {
            push(
                events,
                snapshot,
                "license-validation",
                "settings-too-large",
                Severity::Medium,
                json!({ "size": serialized.len(), "max": lv.max_settings_size }),
            );
        }
    }

    if let Some(connector_edition) = snapshot.connector_edition() {
        let matches = if lv.case_sensitive {
            connector_edition.trim() == edition
        } else {
            connector_edition.trim().eq_ignore_ascii_case(edition)
        };
        if !matches {
            push(
                events,
                snapshot,
                "license-validation",
                "license-edition-mismatch",
                Severity::High,
                json!({ "connectorEdition": connector_edition, "licenseEdition": edition }),
            );
        }
    }
}

fn required_properties(
    snapshot: &IntegrationSnapshot,
    rules: &BusinessRules,
    events: &mut Vec<CorruptionEvent>,
) {
    let req = &rules.required_properties;

    let top_level = serde_json::to_value(snapshot).unwrap_or_default();
    for key in &req.top_level {
        if top_level.get(key).is_none() {
            push(
                events,
                snapshot,
                "required-properties",
                "missing-required-property",
                Severity::Medium,
                json!({ "path": key }),
            );
        }
    }

    for key in &req.settings_level {
        if snapshot.settings.get(key).is_none() {
            push(
                events,
                snapshot,
                "required-properties",
                "missing-required-property",
                Severity::Medium,
                json!({ "path": format!("settings.{key}") }),
            );
        }
    }

    for (idx, section) in snapshot.sections().iter().enumerate() {
        for key in &req.section_properties {
            if section.get(key).is_none() {
                push(
                    events,
                    snapshot,
                    "required-properties",
                    "missing-required-property",
                    Severity::Medium,
                    json!({ "path": format!("settings.sections[{idx}].{key}") }),
                );
            }
        }
    }
}

fn resource_counts(
    snapshot: &IntegrationSnapshot,
    rules: &BusinessRules,
    events: &mut Vec<CorruptionEvent>,
) {
    let Some(expectations) = rules.edition_requirements.get(snapshot.license_edition.trim()) else {
        return;
    };
    let tolerance = rules.tolerances.resource_count_tolerance;
    let store_count = i64::from(snapshot.store_count);

    check_count(
        snapshot,
        events,
        "imports-count-mismatch",
        i64::from(expectations.imports_per_store) * store_count,
        snapshot.imports.len() as i64,
        tolerance,
    );
    check_count(
        snapshot,
        events,
        "exports-count-mismatch",
        i64::from(expectations.exports_per_store) * store_count,
        snapshot.exports.len() as i64,
        tolerance,
    );
    check_count(
        snapshot,
        events,
        "flows-count-mismatch",
        i64::from(expectations.flows_per_store) * store_count,
        snapshot.flows.len() as i64,
        tolerance,
    );
}

fn check_count(
    snapshot: &IntegrationSnapshot,
    events: &mut Vec<CorruptionEvent>,
    corruption_type: &str,
    expected: i64,
    observed: i64,
    tolerance: i64,
) {
    let delta = observed - expected;
    if delta.abs() > tolerance {
        push(
            events,
            snapshot,
            "resource-counts",
            corruption_type,
            Severity::Medium,
            json!({ "expected": expected, "observed": observed, "delta": delta }),
        );
    }
}

fn required_resources(
    snapshot: &IntegrationSnapshot,
    rules: &BusinessRules,
    events: &mut Vec<CorruptionEvent>,
) {
    let Some(required) = rules
        .required_resources
        .get(snapshot.license_edition.trim())
    else {
        return;
    };

    check_required(
        snapshot,
        events,
        &required.required_imports,
        &snapshot.imports,
    );
    check_required(
        snapshot,
        events,
        &required.required_exports,
        &snapshot.exports,
    );
    check_required(snapshot, events, &required.required_flows, &snapshot.flows);
}

fn check_required(
    snapshot: &IntegrationSnapshot,
    events: &mut Vec<CorruptionEvent>,
    required_names: &[String],
    present: &[crate::model::NamedResource],
) {
    for name in required_names {
        let found = present.iter().any(|r| &r.name == name || &r.id == name);
        if !found {
            push(
                events,
                snapshot,
                "required-resources",
                "missing-required-resource",
                Severity::Medium,
                json!({ "missing": [name] }),
            );
        }
    }
}

fn offline_connections(snapshot: &IntegrationSnapshot, events: &mut Vec<CorruptionEvent>) {
    for connection in &snapshot.connections {
        if connection.offline {
            push(
                events,
                snapshot,
                "offline-connections",
                "offline-connection",
                Severity::Medium,
                json!({ "connectionId": connection.id }),
            );
        }
    }
}

fn stuck_update(snapshot: &IntegrationSnapshot, events: &mut Vec<CorruptionEvent>) {
    if snapshot.update_in_progress {
        push(
            events,
            snapshot,
            "stuck-update",
            "stuck-in-update-process",
            Severity::High,
            json!({}),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_rules() -> BusinessRules {
        BusinessRules::parse(
            r#"{
                "editionRequirements": {"starter": {"importsPerStore": 1, "exportsPerStore": 1, "flowsPerStore": 1}},
                "licenseValidation": {"validEditions": ["starter"], "maxSettingsSize": 100000}
            }"#,
        )
        .unwrap()
    }

    fn base_snapshot() -> IntegrationSnapshot {
        IntegrationSnapshot {
            id: "test-001".into(),
            email: "a@b.com".into(),
            user_id: "u1".into(),
            version: "1.0".into(),
            store_count: 1,
            license_edition: "starter".into(),
            update_in_progress: false,
            settings: json!({ "connectorEdition": "starter" }),
            imports: vec![crate::model::NamedResource {
                id: "i1".into(),
                name: "imp".into(),
                extra: Default::default(),
            }],
            exports: vec![crate::model::NamedResource {
                id: "e1".into(),
                name: "exp".into(),
                extra: Default::default(),
            }],
            flows: vec![crate::model::NamedResource {
                id: "f1".into(),
                name: "flow".into(),
                extra: Default::default(),
            }],
            connections: vec![],
            source_row: None,
        }
    }

    #[test]
    fn license_edition_mismatch_scenario() {
        let rules = base_rules();
        let mut snapshot = base_snapshot();
        snapshot.settings = json!({ "connectorEdition": "premium" });
        let result = detect(&snapshot, &rules);
        assert!(result
            .corruption_events
            .iter()
            .any(|e| e.corruption_type == "license-edition-mismatch"));
        assert_eq!(result.overall_severity, Severity::High);
    }

    #[test]
    fn stuck_update_scenario() {
        let rules = base_rules();
        let mut snapshot = base_snapshot();
        snapshot.update_in_progress = true;
        let result = detect(&snapshot, &rules);
        assert!(result
            .corruption_events
            .iter()
            .any(|e| e.corruption_type == "stuck-in-update-process"));
    }

    #[test]
    fn missing_imports_for_edition_scenario() {
        let rules = base_rules();
        let mut snapshot = base_snapshot();
        snapshot.store_count = 2;
        snapshot.imports = vec![];
        let result = detect(&snapshot, &rules);
        let event = result
            .corruption_events
            .iter()
            .find(|e| e.corruption_type == "imports-count-mismatch")
            .unwrap();
        assert_eq!(event.evidence["expected"], 2);
        assert_eq!(event.evidence["observed"], 0);
        assert_eq!(event.evidence["delta"], -2);
    }

    #[test]
    fn offline_connection_scenario() {
        let rules = base_rules();
        let mut snapshot = base_snapshot();
        snapshot.connections.push(crate::model::Connection {
            id: "c1".into(),
            name: "conn".into(),
            offline: true,
            extra: Default::default(),
        });
        let result = detect(&snapshot, &rules);
        assert!(result
            .corruption_events
            .iter()
            .any(|e| e.corruption_type == "offline-connection"));
    }

    #[test]
    fn store_count_zero_yields_zero_expected_counts() {
        let rules = base_rules();
        let mut snapshot = base_snapshot();
        snapshot.store_count = 0;
        snapshot.imports = vec![];
        snapshot.exports = vec![];
        snapshot.flows = vec![];
        let result = detect(&snapshot, &rules);
        assert!(!result
            .corruption_events
            .iter()
            .any(|e| e.corruption_type.ends_with("-count-mismatch")));
    }

    #[test]
    fn clean_snapshot_has_no_events_and_low_severity() {
        let rules = base_rules();
        let snapshot = base_snapshot();
        let result = detect(&snapshot, &rules);
        assert!(result.corruption_events.is_empty());
        assert_eq!(result.overall_severity, Severity::Low);
    }
}
