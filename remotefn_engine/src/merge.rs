// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

/// Deep-merge `source` into `target`.
///
/// Object fields recurse-merge when both sides are objects; array elements
/// merge position-wise (extending the target when it is shorter) when both
/// sides are arrays; any other combination overwrites the target value.
/// Repeated path writes into a request body accumulate through this instead
/// of clobbering each other.
pub fn merge_values(target: &mut serde_json::Value, source: &serde_json::Value) {
    match (target, source) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(key) {
                    Some(target_value) if mergeable(target_value, source_value) => {
                        merge_values(target_value, source_value);
                    }
                    _ => {
                        target_map.insert(key.clone(), source_value.clone());
                    }
                }
            }
        }
        (serde_json::Value::Array(target_items), serde_json::Value::Array(source_items)) => {
            for (index, source_value) in source_items.iter().enumerate() {
                if index < target_items.len() {
                    if mergeable(&target_items[index], source_value) {
                        merge_values(&mut target_items[index], source_value);
                    } else {
                        target_items[index] = source_value.clone();
                    }
                } else {
                    target_items.push(source_value.clone());
                }
            }
        }
        (target, source) => {
            *target = source.clone();
        }
    }
}

pub(crate) fn mergeable(target: &serde_json::Value, source: &serde_json::Value) -> bool {
    (target.is_object() && source.is_object()) || (target.is_array() && source.is_array())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_idempotent() {
        let doc = serde_json::json!({"a": {"x": 1}, "b": [1, {"c": 2}]});
        let mut target = doc.clone();
        merge_values(&mut target, &doc);
        assert_eq!(target, doc);
    }

    #[test]
    fn test_merge_objects_unions_fields() {
        let mut target = serde_json::json!({"a": {"y": 2}});
        merge_values(&mut target, &serde_json::json!({"a": {"x": 1}}));
        assert_eq!(target, serde_json::json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_merge_arrays_position_wise_and_extends() {
        let mut target = serde_json::json!({"a": [{"x": 1}]});
        merge_values(&mut target, &serde_json::json!({"a": [{"y": 2}, {"z": 3}]}));
        assert_eq!(target, serde_json::json!({"a": [{"x": 1, "y": 2}, {"z": 3}]}));
    }

    #[test]
    fn test_merge_scalar_overwrites() {
        let mut target = serde_json::json!({"a": 1, "b": {"c": 2}});
        merge_values(&mut target, &serde_json::json!({"a": 9, "b": "flat"}));
        assert_eq!(target, serde_json::json!({"a": 9, "b": "flat"}));
    }
}
