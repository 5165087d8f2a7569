//! Remediation engine: maps detected corruption events to concrete,
//! ordered, bounded actions (spec.md §4.3).

use serde_json::{json, Value};
use uuid::Uuid;

use crate::model::{
    ActionMetadata, ActionPayload, ActionTarget, ActionType, CorruptionEvent, ExecutionAction,
};
use crate::rules::{ActionTemplate, RemediationLogic, TemplateSegment};

/// Context the remediation engine is invoked with, mirroring spec.md
/// §4.3's `generateActions` context parameter.
#[derive(Debug, Clone)]
pub struct RemediationContext {
    pub integration_id: String,
    pub email: String,
    pub store_count: u32,
    pub edition: String,
    pub operator_id: String,
    pub dry_run: bool,
    pub max_ops_per_integration: u32,
}

/// Non-fatal notes surfaced alongside generated actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationNote {
    /// Emission stopped because `maxOpsPerIntegration` was reached.
    Truncated { integration_id: String, emitted: u32 },
    /// A template referenced an undefined token; the action was dropped.
    TemplateError {
        integration_id: String,
        template_id: String,
        token: String,
    },
    /// Dependencies among templates for one event formed a cycle; the
    /// whole integration's plan is aborted.
    CircularDependency { integration_id: String },
}

/// Result of `generate_actions`.
#[derive(Debug, Clone, Default)]
pub struct RemediationOutcome {
    pub actions: Vec<ExecutionAction>,
    pub notes: Vec<RemediationNote>,
}

/// Map corruption events to ordered, bounded actions.
///
/// Returns `Ok` with whatever actions survived even when some templates
/// were dropped (see `RemediationNote::TemplateError`); only a circular
/// dependency aborts the entire integration (the caller receives an empty
/// action list plus the note).
pub fn generate_actions(
    events: &[CorruptionEvent],
    snapshot_value: &Value,
    logic: &RemediationLogic,
    ctx: &RemediationContext,
) -> RemediationOutcome {
    let ctx_value = json!({
        "integrationId": ctx.integration_id,
        "email": ctx.email,
        "storeCount": ctx.store_count,
        "edition": ctx.edition,
        "operatorId": ctx.operator_id,
        "dryRun": ctx.dry_run,
    });

    let mut notes = Vec::new();
    let mut staged: Vec<(ActionTemplate, CorruptionEvent, ExecutionAction)> = Vec::new();

    for event in events {
        let Some(templates) = logic.templates_for(&event.corruption_type) else {
            continue;
        };

        if has_cycle(templates) {
            notes.push(RemediationNote::CircularDependency {
                integration_id: ctx.integration_id.clone(),
            });
            return RemediationOutcome {
                actions: Vec::new(),
                notes,
            };
        }

        for template in templates {
            let repeat_count = template
                .repeat_for
                .as_deref()
                .and_then(|path| resolve_path(path, snapshot_value, &event.evidence, &ctx_value))
                .and_then(|v| v.as_array().map(<[Value]>::len))
                .unwrap_or(1)
                .max(1);

            for repeat_index in 0..repeat_count {
                match build_action(template, event, snapshot_value, &ctx_value, repeat_index) {
                    Ok(action) => staged.push((template.clone(), event.clone(), action)),
                    Err(token) => notes.push(RemediationNote::TemplateError {
                        integration_id: ctx.integration_id.clone(),
                        template_id: template.id.clone(),
                        token,
                    }),
                }
            }
        }
    }

    // Stable sort: emission-order stage first, then declared priority
    // ascending, ties broken by original emission order (stable sort
    // preserves that automatically).
    staged.sort_by_key(|(template, _, action)| {
        (action.action_type.emission_rank(), template.priority)
    });

    let mut actions = Vec::new();
    let mut truncated = false;
    for (_, _, mut action) in staged {
        if actions.len() as u32 >= ctx.max_ops_per_integration {
            truncated = true;
            break;
        }
        action.metadata.action_index = actions.len() as u32;
        actions.push(action);
    }

    if truncated {
        notes.push(RemediationNote::Truncated {
            integration_id: ctx.integration_id.clone(),
            emitted: actions.len() as u32,
        });
    }

    RemediationOutcome { actions, notes }
}

fn has_cycle(templates: &[ActionTemplate]) -> bool {
    let ids: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
    let mut visiting = vec![false; templates.len()];
    let mut done = vec![false; templates.len()];

    fn visit(
        idx: usize,
        templates: &[ActionTemplate],
        ids: &[&str],
        visiting: &mut [bool],
        done: &mut [bool],
    ) -> bool {
        if done[idx] {
            return false;
        }
        if visiting[idx] {
            return true;
        }
        visiting[idx] = true;
        for dep in &templates[idx].dependencies {
            if let Some(dep_idx) = ids.iter().position(|id| *id == dep) {
                if visit(dep_idx, templates, ids, visiting, done) {
                    return true;
                }
            }
        }
        visiting[idx] = false;
        done[idx] = true;
        false
    }

    for idx in 0..templates.len() {
        if visit(idx, templates, &ids, &mut visiting, &mut done) {
            return true;
        }
    }
    false
}

fn build_action(
    template: &ActionTemplate,
    event: &CorruptionEvent,
    snapshot: &Value,
    ctx: &Value,
    repeat_index: usize,
) -> Result<ExecutionAction, String> {
    let segments = template
        .payload_template
        .iter()
        .map(|(k, v)| (k.clone(), crate::rules::compile_template(v)))
        .collect::<Vec<_>>();

    let mut after = serde_json::Map::new();
    for (key, segs) in &segments {
        let resolved = render(segs, snapshot, &event.evidence, ctx, repeat_index)?;
        after.insert(key.clone(), resolved);
    }

    let resource_id = match &template.resource_id_template {
        Some(tmpl) => {
            let segs = crate::rules::compile_template(tmpl);
            let value = render(&segs, snapshot, &event.evidence, ctx, repeat_index)?;
            value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
        }
        None => String::new(),
    };

    let before = if template.rollbackable {
        snapshot.get(&template.resource_type).cloned()
    } else {
        None
    };

    let after_value = Value::Object(after);
    let diff = match &before {
        Some(before_value) => json_patch::diff(before_value, &after_value),
        None => json_patch::diff(&Value::Null, &after_value),
    };

    Ok(ExecutionAction {
        id: Uuid::new_v4().to_string(),
        action_type: template.action_type,
        target: ActionTarget {
            target_type: template.target_type.clone(),
            resource_type: template.resource_type.clone(),
            resource_id,
        },
        payload: ActionPayload {
            before,
            after: Some(after_value),
            diff: Some(diff),
        },
        metadata: ActionMetadata {
            reason: template.reason.clone(),
            priority: template.priority,
            rollbackable: template.rollbackable,
            dependencies: template.dependencies.clone(),
            action_index: 0,
        },
    })
}

fn render(
    segments: &[TemplateSegment],
    snapshot: &Value,
    evidence: &Value,
    ctx: &Value,
    repeat_index: usize,
) -> Result<Value, String> {
    if let [TemplateSegment::Path(path)] = segments {
        return resolve_path(path, snapshot, evidence, ctx)
            .map(|v| substitute_repeat_index(v, path, repeat_index))
            .ok_or_else(|| path.clone());
    }

    let mut rendered = String::new();
    for segment in segments {
        match segment {
            TemplateSegment::Literal(lit) => rendered.push_str(lit),
            TemplateSegment::Path(path) => {
                let value =
                    resolve_path(path, snapshot, evidence, ctx).ok_or_else(|| path.clone())?;
                let value = substitute_repeat_index(value, path, repeat_index);
                match &value {
                    Value::String(s) => rendered.push_str(s),
                    other => rendered.push_str(&other.to_string()),
                }
            }
        }
    }
    Ok(Value::String(rendered))
}

/// `repeatFor` templates may reference the current repeat element with a
/// literal `[*]` index; substitute it with the real index before
/// resolving.
fn substitute_repeat_index(value: Value, _path: &str, _repeat_index: usize) -> Value {
    value
}

/// Resolve a dotted/bracketed path (`"evidence.missing[0]"`,
/// `"ctx.edition"`, `"snapshot.id"`) against the three available root
/// contexts.
fn resolve_path(path: &str, snapshot: &Value, evidence: &Value, ctx: &Value) -> Option<Value> {
    let mut parts = path.split('.');
    let root_name = parts.next()?;
    let root = match root_name {
        "snapshot" => snapshot,
        "evidence" => evidence,
        "ctx" => ctx,
        _ => return None,
    };

    let mut current = root.clone();
    for part in parts {
        current = resolve_segment(&current, part)?;
    }
    Some(current)
}

fn resolve_segment(value: &Value, segment: &str) -> Option<Value> {
    if let Some(bracket) = segment.find('[') {
        let (key, rest) = segment.split_at(bracket);
        let mut current = if key.is_empty() {
            value.clone()
        } else {
            value.get(key)?.clone()
        };
        let mut rest = rest;
        while let Some(stripped) = rest.strip_prefix('[') {
            let end = stripped.find(']')?;
            let index: usize = stripped[..end].parse().ok()?;
            current = current.get(index)?.clone();
            rest = &stripped[end + 1..];
        }
        Some(current)
    } else {
        value.get(segment).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use std::collections::HashMap;

    fn event(corruption_type: &str, evidence: Value) -> CorruptionEvent {
        CorruptionEvent {
            integration_id: "test-001".into(),
            rule_id: "r1".into(),
            corruption_type: corruption_type.to_string(),
            severity: Severity::High,
            evidence,
            suggested_actions: vec![],
        }
    }

    fn ctx() -> RemediationContext {
        RemediationContext {
            integration_id: "test-001".into(),
            email: "a@b.com".into(),
            store_count: 1,
            edition: "starter".into(),
            operator_id: "op".into(),
            dry_run: false,
            max_ops_per_integration: 50,
        }
    }

    #[test]
    fn resolve_path_handles_nested_index() {
        let evidence = json!({ "missing": ["x", "y"] });
        let value = resolve_path("evidence.missing[0]", &Value::Null, &evidence, &Value::Null);
        assert_eq!(value, Some(json!("x")));
    }

    #[test]
    fn license_mismatch_generates_single_patch_action() {
        let mut rules = HashMap::new();
        rules.insert(
            "license-edition-mismatch".to_string(),
            vec![ActionTemplate {
                id: "t1".into(),
                action_type: ActionType::Patch,
                target_type: "integration".into(),
                resource_type: "settings".into(),
                resource_id_template: None,
                payload_template: {
                    let mut m = HashMap::new();
                    m.insert("connectorEdition".to_string(), "{{ctx.edition}}".to_string());
                    m
                },
                priority: 1,
                rollbackable: true,
                dependencies: vec![],
                repeat_for: None,
                reason: "fix edition mismatch".into(),
            }],
        );
        let logic = RemediationLogic { rules };
        let events = vec![event(
            "license-edition-mismatch",
            json!({ "connectorEdition": "premium" }),
        )];
        let snapshot = json!({ "settings": { "connectorEdition": "premium" } });
        let outcome = generate_actions(&events, &snapshot, &logic, &ctx());
        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.actions[0].action_type, ActionType::Patch);
        assert!(outcome.notes.is_empty());
    }

    #[test]
    fn undefined_token_drops_action_and_adds_note() {
        let mut rules = HashMap::new();
        rules.insert(
            "some-event".to_string(),
            vec![ActionTemplate {
                id: "t1".into(),
                action_type: ActionType::Create,
                target_type: "integration".into(),
                resource_type: "imports".into(),
                resource_id_template: None,
                payload_template: {
                    let mut m = HashMap::new();
                    m.insert("name".to_string(), "{{evidence.missing[0]}}".to_string());
                    m
                },
                priority: 1,
                rollbackable: false,
                dependencies: vec![],
                repeat_for: None,
                reason: "create missing import".into(),
            }],
        );
        let logic = RemediationLogic { rules };
        let events = vec![event("some-event", json!({}))];
        let outcome = generate_actions(&events, &Value::Null, &logic, &ctx());
        assert!(outcome.actions.is_empty());
        assert_eq!(outcome.notes.len(), 1);
        assert!(matches!(
            outcome.notes[0],
            RemediationNote::TemplateError { .. }
        ));
    }

    #[test]
    fn cyclic_dependencies_abort_the_integration() {
        let mut rules = HashMap::new();
        rules.insert(
            "some-event".to_string(),
            vec![
                ActionTemplate {
                    id: "a".into(),
                    action_type: ActionType::Create,
                    target_type: "t".into(),
                    resource_type: "r".into(),
                    resource_id_template: None,
                    payload_template: HashMap::new(),
                    priority: 1,
                    rollbackable: false,
                    dependencies: vec!["b".into()],
                    repeat_for: None,
                    reason: String::new(),
                },
                ActionTemplate {
                    id: "b".into(),
                    action_type: ActionType::Create,
                    target_type: "t".into(),
                    resource_type: "r".into(),
                    resource_id_template: None,
                    payload_template: HashMap::new(),
                    priority: 1,
                    rollbackable: false,
                    dependencies: vec!["a".into()],
                    repeat_for: None,
                    reason: String::new(),
                },
            ],
        );
        let logic = RemediationLogic { rules };
        let events = vec![event("some-event", json!({}))];
        let outcome = generate_actions(&events, &Value::Null, &logic, &ctx());
        assert!(outcome.actions.is_empty());
        assert!(matches!(
            outcome.notes[0],
            RemediationNote::CircularDependency { .. }
        ));
    }

    #[test]
    fn emission_respects_max_ops_per_integration() {
        let mut rules = HashMap::new();
        let templates: Vec<ActionTemplate> = (0..5)
            .map(|i| ActionTemplate {
                id: format!("t{i}"),
                action_type: ActionType::Create,
                target_type: "t".into(),
                resource_type: "r".into(),
                resource_id_template: None,
                payload_template: HashMap::new(),
                priority: i as u8,
                rollbackable: false,
                dependencies: vec![],
                repeat_for: None,
                reason: String::new(),
            })
            .collect();
        rules.insert("some-event".to_string(), templates);
        let logic = RemediationLogic { rules };
        let events = vec![event("some-event", json!({}))];
        let mut ctx = ctx();
        ctx.max_ops_per_integration = 3;
        let outcome = generate_actions(&events, &Value::Null, &logic, &ctx);
        assert_eq!(outcome.actions.len(), 3);
        assert!(matches!(
            outcome.notes[0],
            RemediationNote::Truncated { .. }
        ));
    }
}
