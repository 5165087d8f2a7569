//! Golden snapshot helpers for rendered reports/plans (spec.md §8, SPEC_FULL
//! §2.4). Thin wrappers over `insta` that normalize the volatile fields
//! (UUIDs, timestamps, durations) a raw `insta::assert_json_snapshot!` would
//! otherwise churn on every run.

use serde_json::Value;

/// Recursively replace values at volatile keys with a fixed placeholder so
/// snapshots stay stable across runs. Keys are matched by exact name
/// anywhere in the document (e.g. `"id"`, `"duration_ms"`, `"session_id"`).
pub fn redact_volatile_fields(mut value: Value, volatile_keys: &[&str]) -> Value {
    redact_in_place(&mut value, volatile_keys);
    value
}

fn redact_in_place(value: &mut Value, volatile_keys: &[&str]) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if volatile_keys.contains(&key.as_str()) {
                    *v = Value::String("<redacted>".to_string());
                } else {
                    redact_in_place(v, volatile_keys);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_in_place(item, volatile_keys);
            }
        }
        _ => {}
    }
}

/// Default set of fields that vary run-to-run in this crate's own output
/// (action/plan ids are random UUIDs, durations and timestamps are
/// wall-clock dependent).
pub const DEFAULT_VOLATILE_FIELDS: &[&str] =
    &["id", "plan_id", "duration_ms", "session_id", "timestamp", "opened_at"];

/// Assert a value matches its stored golden snapshot, after redacting
/// `DEFAULT_VOLATILE_FIELDS`. `name` is the snapshot's stable identifier
/// (passed straight through to `insta`).
#[macro_export]
macro_rules! assert_golden_snapshot {
    ($name:expr, $value:expr) => {{
        let redacted = $crate::snapshot::redact_volatile_fields(
            serde_json::to_value(&$value).expect("value must serialize to JSON"),
            $crate::snapshot::DEFAULT_VOLATILE_FIELDS,
        );
        insta::assert_json_snapshot!($name, redacted);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_replaces_only_named_keys() {
        let value = serde_json::json!({
            "id": "abc-123",
            "nested": {"duration_ms": 42, "keep": "me"},
        });
        let redacted = redact_volatile_fields(value, DEFAULT_VOLATILE_FIELDS);
        assert_eq!(redacted["id"], serde_json::json!("<redacted>"));
        assert_eq!(redacted["nested"]["duration_ms"], serde_json::json!("<redacted>"));
        assert_eq!(redacted["nested"]["keep"], serde_json::json!("me"));
    }
}
