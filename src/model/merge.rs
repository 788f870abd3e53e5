// Deep, right-biased merge of endpoint tree fragments
//
// Arrays concatenate (a scalar on either side is promoted to a singleton),
// objects merge key by key, anything else is overwritten by the right side.
// An explicit `null` on the right deletes the key from the left.

use serde_json::Value;

/// Merge `right` over `left`. A top-level `null` counts as an absent fragment.
pub fn merge(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Null, right) => right,
        (left, Value::Null) => left,
        (Value::Array(mut left), Value::Array(right)) => {
            left.extend(right);
            Value::Array(left)
        }
        (Value::Array(mut left), right) => {
            left.push(right);
            Value::Array(left)
        }
        (left, Value::Array(right)) => {
            let mut out = Vec::with_capacity(right.len() + 1);
            out.push(left);
            out.extend(right);
            Value::Array(out)
        }
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, value) in right {
                if value.is_null() {
                    left.shift_remove(&key);
                    continue;
                }
                match left.get_mut(&key) {
                    Some(slot) => {
                        let existing = std::mem::take(slot);
                        *slot = merge(existing, value);
                    }
                    None => {
                        left.insert(key, value);
                    }
                }
            }
            Value::Object(left)
        }
        (_, right) => right,
    }
}

/// Fold any number of fragments, later fragments winning
pub fn merge_all<I>(fragments: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    fragments.into_iter().fold(Value::Null, merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_is_promoted_and_appended() {
        let merged = merge(json!({"key": ["a"]}), json!({"key": "b"}));
        assert_eq!(merged, json!({"key": ["a", "b"]}));
    }

    #[test]
    fn scalar_left_is_prepended() {
        let merged = merge(json!({"key": "a"}), json!({"key": ["b", "a"]}));
        assert_eq!(merged, json!({"key": ["a", "b", "a"]}));
    }

    #[test]
    fn null_deletes_key() {
        let merged = merge(json!({"key": 1, "other": 2}), json!({"key": null}));
        assert_eq!(merged, json!({"other": 2}));
    }

    #[test]
    fn scalars_overwrite_and_maps_recurse() {
        let merged = merge(
            json!({"auth": {"read": false, "write": {"requiresRoles": ["admin"]}}}),
            json!({"auth": {"read": true}}),
        );
        assert_eq!(
            merged,
            json!({"auth": {"read": true, "write": {"requiresRoles": ["admin"]}}})
        );
    }

    #[test]
    fn absent_side_returns_other() {
        assert_eq!(merge(Value::Null, json!({"a": 1})), json!({"a": 1}));
        assert_eq!(merge(json!({"a": 1}), Value::Null), json!({"a": 1}));
    }

    #[test]
    fn key_order_is_preserved() {
        let merged = merge_all([
            json!({"/a": {}, "/b": {}}),
            json!({"/a": {"collection": "a"}, "/c": {}}),
        ]);
        let keys: Vec<&String> = merged.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["/a", "/b", "/c"]);
    }
}
