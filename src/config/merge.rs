//! Deep merge and diff over JSON-shaped configuration documents

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Merge `patch` over `base`.
///
/// Objects merge recursively; every other value (scalars and arrays
/// included) replaces the base value wholesale.
pub fn deep_merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in patch_map {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => patch.clone(),
    }
}

/// Merge a sequence of layers, lowest precedence first
pub fn merge_all<'a>(layers: impl IntoIterator<Item = &'a Value>) -> Value {
    layers
        .into_iter()
        .fold(Value::Object(Map::new()), |acc, layer| deep_merge(&acc, layer))
}

/// Leaf-level differences keyed by dotted path.
///
/// Each entry is `{"added": v}`, `{"removed": v}` or `{"old": a, "new": b}`.
pub fn diff(old: &Value, new: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    diff_into("", old, new, &mut out);
    out
}

fn diff_into(prefix: &str, old: &Value, new: &Value, out: &mut BTreeMap<String, Value>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_value) in a {
                let path = join(prefix, key);
                match b.get(key) {
                    Some(new_value) => diff_into(&path, old_value, new_value, out),
                    None => {
                        out.insert(path, json!({ "removed": old_value }));
                    }
                }
            }
            for (key, new_value) in b {
                if !a.contains_key(key) {
                    out.insert(join(prefix, key), json!({ "added": new_value }));
                }
            }
        }
        _ if !same_value(old, new) => {
            out.insert(prefix.to_string(), json!({ "old": old, "new": new }));
        }
        _ => {}
    }
}

/// Equality that treats `5` and `5.0` as the same number
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "thresholds": {"document": 1.5, "photo": 0.0},
            "weights": {"DOC": {"clip_factor": 2.0, "text_length_divisor": 300.0}},
            "keywords": ["a", "b"]
        })
    }

    #[test]
    fn test_merge_with_empty_update_is_identity() {
        let base = sample();
        assert_eq!(deep_merge(&base, &json!({})), base);
    }

    #[test]
    fn test_merge_with_self_is_noop() {
        let base = sample();
        assert_eq!(deep_merge(&base, &base), base);
    }

    #[test]
    fn test_nested_merge_keeps_siblings() {
        let merged = deep_merge(&sample(), &json!({"weights": {"DOC": {"clip_factor": 3.0}}}));
        assert_eq!(merged["weights"]["DOC"]["clip_factor"], 3.0);
        assert_eq!(merged["weights"]["DOC"]["text_length_divisor"], 300.0);
        assert_eq!(merged["thresholds"]["document"], 1.5);
    }

    #[test]
    fn test_arrays_replace_instead_of_concatenating() {
        let merged = deep_merge(&sample(), &json!({"keywords": ["c"]}));
        assert_eq!(merged["keywords"], json!(["c"]));
    }

    #[test]
    fn test_merge_all_respects_order() {
        let low = json!({"a": 1, "b": 1});
        let mid = json!({"b": 2});
        let high = json!({"b": 3, "c": 3});
        let merged = merge_all([&low, &mid, &high]);
        assert_eq!(merged, json!({"a": 1, "b": 3, "c": 3}));
    }

    #[test]
    fn test_diff_reports_leaf_paths() {
        let new = deep_merge(
            &sample(),
            &json!({"weights": {"DOC": {"clip_factor": 2.5}}, "safety": {"x": 1}}),
        );
        let d = diff(&sample(), &new);
        assert_eq!(d.len(), 2);
        assert_eq!(d["weights.DOC.clip_factor"], json!({"old": 2.0, "new": 2.5}));
        assert_eq!(d["safety"], json!({"added": {"x": 1}}));
    }

    #[test]
    fn test_diff_ignores_integer_float_spelling() {
        assert!(diff(&json!({"a": 5}), &json!({"a": 5.0})).is_empty());
    }
}
