//! Execution planner: sequences actions, attaches a rollback plan, and
//! bounds per-integration action counts (spec.md §4.4).

use uuid::Uuid;

use crate::model::{
    ActionMetadata, ActionPayload, ActionTarget, ActionType, ExecutionAction, ExecutionPlan,
    PlanSafety, RollbackPlan,
};

/// Options controlling plan construction.
#[derive(Debug, Clone, Copy)]
pub struct PlanOptions {
    pub max_ops_per_integration: u32,
    pub abort_on_first_failure: bool,
}

/// Build an `ExecutionPlan` from the remediation engine's action list.
///
/// The caller is responsible for bounding/ordering `actions` (the
/// remediation engine already does this); this function attaches the
/// rollback plan and the derived summary.
#[must_use]
pub fn create_execution_plan(
    integration_id: &str,
    actions: Vec<ExecutionAction>,
    options: PlanOptions,
) -> ExecutionPlan {
    let summary = ExecutionPlan::summarize(&actions);
    let rollback_plan = compute_rollback_plan(&actions);

    ExecutionPlan {
        plan_id: Uuid::new_v4().to_string(),
        integration_id: integration_id.to_string(),
        actions,
        summary,
        safety: PlanSafety {
            max_ops_per_integration: options.max_ops_per_integration,
            rollback_plan,
            abort_on_first_failure: options.abort_on_first_failure,
        },
    }
}

/// Compute the reverse-ordered sequence of inverse actions for a forward
/// action list, per the forward→inverse table in spec.md §4.4.
#[must_use]
pub fn compute_rollback_plan(actions: &[ExecutionAction]) -> RollbackPlan {
    let mut partial = false;
    let mut inverses = Vec::new();

    for action in actions.iter().rev() {
        if !action.metadata.rollbackable {
            partial = true;
            continue;
        }
        match inverse_action(action) {
            Some(inverse) => inverses.push(inverse),
            None => partial = true,
        }
    }

    RollbackPlan {
        actions: inverses,
        partial,
    }
}

fn inverse_action(action: &ExecutionAction) -> Option<ExecutionAction> {
    let (inverse_type, payload) = match action.action_type {
        ActionType::Create => (
            ActionType::Delete,
            ActionPayload {
                before: action.payload.after.clone(),
                after: None,
                diff: None,
            },
        ),
        ActionType::Delete => (
            ActionType::Create,
            ActionPayload {
                before: None,
                after: action.payload.before.clone(),
                diff: None,
            },
        ),
        ActionType::Patch | ActionType::Update => {
            let before = action.payload.after.clone();
            let after = action.payload.before.clone()?;
            // A forward JSON Patch only carries the new values; structurally
            // flipping add/remove/replace can't recover a replace's old
            // value. Recompute the inverse diff from the captured
            // before/after pair instead, so applying it actually restores
            // the original document (spec.md §8 rollback idempotence).
            let diff = match (&before, &after) {
                (Some(b), a) => Some(json_patch::diff(b, a)),
                (None, a) => Some(json_patch::diff(&serde_json::Value::Null, a)),
            };
            (
                action.action_type,
                ActionPayload {
                    before,
                    after: Some(after),
                    diff,
                },
            )
        }
        ActionType::Reconnect => (
            ActionType::Reconnect,
            ActionPayload {
                before: action.payload.after.clone(),
                after: action.payload.before.clone(),
                diff: None,
            },
        ),
        ActionType::Adjust => {
            let negated = action
                .payload
                .after
                .as_ref()
                .and_then(serde_json::Value::as_f64)
                .map(|delta| serde_json::json!(-delta));
            (
                ActionType::Adjust,
                ActionPayload {
                    before: action.payload.after.clone(),
                    after: negated,
                    diff: None,
                },
            )
        }
    };

    Some(ExecutionAction {
        id: Uuid::new_v4().to_string(),
        action_type: inverse_type,
        target: ActionTarget {
            target_type: action.target.target_type.clone(),
            resource_type: action.target.resource_type.clone(),
            resource_id: action.target.resource_id.clone(),
        },
        payload,
        metadata: ActionMetadata {
            reason: format!("rollback of {}", action.id),
            priority: action.metadata.priority,
            rollbackable: false,
            dependencies: Vec::new(),
            action_index: action.metadata.action_index,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionMetadata, ActionPayload, ActionTarget};
    use serde_json::json;

    fn action(action_type: ActionType, before: Option<serde_json::Value>, after: Option<serde_json::Value>, rollbackable: bool) -> ExecutionAction {
        ExecutionAction {
            id: "a1".into(),
            action_type,
            target: ActionTarget {
                target_type: "integration".into(),
                resource_type: "settings".into(),
                resource_id: "r1".into(),
            },
            payload: ActionPayload {
                before: before.clone(),
                after: after.clone(),
                diff: match (&before, &after) {
                    (Some(b), Some(a)) => Some(json_patch::diff(b, a)),
                    _ => None,
                },
            },
            metadata: ActionMetadata {
                reason: "test".into(),
                priority: 1,
                rollbackable,
                dependencies: vec![],
                action_index: 0,
            },
        }
    }

    #[test]
    fn create_inverts_to_delete() {
        let a = action(ActionType::Create, None, Some(json!({"id": "x"})), true);
        let plan = compute_rollback_plan(&[a]);
        assert!(!plan.partial);
        assert_eq!(plan.actions[0].action_type, ActionType::Delete);
    }

    #[test]
    fn delete_inverts_to_create_with_captured_before() {
        let a = action(ActionType::Delete, Some(json!({"id": "x"})), None, true);
        let plan = compute_rollback_plan(&[a]);
        assert_eq!(plan.actions[0].action_type, ActionType::Create);
        assert_eq!(plan.actions[0].payload.after, Some(json!({"id": "x"})));
    }

    #[test]
    fn patch_inverts_with_before_after_swapped() {
        let a = action(
            ActionType::Patch,
            Some(json!({"connectorEdition": "premium"})),
            Some(json!({"connectorEdition": "starter"})),
            true,
        );
        let plan = compute_rollback_plan(&[a]);
        let inverse = &plan.actions[0];
        assert_eq!(inverse.payload.before, Some(json!({"connectorEdition": "starter"})));
        assert_eq!(inverse.payload.after, Some(json!({"connectorEdition": "premium"})));
    }

    #[test]
    fn non_rollbackable_action_marks_plan_partial() {
        let a = action(ActionType::Create, None, Some(json!({"id": "x"})), false);
        let plan = compute_rollback_plan(&[a]);
        assert!(plan.partial);
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn rollback_idempotence_apply_then_inverse_restores_original() {
        let before = json!({"connectorEdition": "premium", "general": {"foo": 1}});
        let after = json!({"connectorEdition": "starter", "general": {"foo": 1}});
        let forward = action(ActionType::Patch, Some(before.clone()), Some(after.clone()), true);
        let plan = compute_rollback_plan(&[forward.clone()]);
        let inverse = &plan.actions[0];

        let mut doc = before.clone();
        json_patch::patch(&mut doc, forward.payload.diff.as_ref().unwrap()).unwrap();
        assert_eq!(doc, after);

        let mut restored = after;
        json_patch::patch(&mut restored, inverse.payload.diff.as_ref().unwrap()).unwrap();
        assert_eq!(restored, before);
    }
}
