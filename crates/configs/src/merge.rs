use serde_json::{Map, Value};

/// Recursively merge `overlay` into `base`.
///
/// Mappings merge key by key; any other overlay value (scalar, array, or a
/// mapping landing on a non-mapping) replaces what was there. Keys present in
/// `base` but absent from `overlay` are kept.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Lower-case every mapping key, descending into nested mappings and arrays.
pub fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let value = lowercase_keys(value);
                match out.get_mut(&key.to_lowercase()) {
                    // `Token` and `token` in one document collapse into a single key.
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        out.insert(key.to_lowercase(), value);
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_mappings_merge_and_scalars_overwrite() {
        let mut base = json!({"redis": {"host": "localhost", "port": 6379}, "token": "a"});
        deep_merge(&mut base, json!({"redis": {"host": "cache.internal"}, "token": "b"}));
        assert_eq!(base, json!({"redis": {"host": "cache.internal", "port": 6379}, "token": "b"}));
    }

    #[test]
    fn merge_is_idempotent() {
        let overlay = json!({"postgres": {"port": 6543, "opts": {"ssl": true}}, "tags": [1, 2]});
        let mut once = json!({"postgres": {"host": "db", "port": 5432}, "tags": [0]});
        deep_merge(&mut once, overlay.clone());
        let mut twice = once.clone();
        deep_merge(&mut twice, overlay);
        assert_eq!(once, twice);
    }

    #[test]
    fn arrays_replace_instead_of_merging() {
        let mut base = json!({"hosts": ["a", "b", "c"]});
        deep_merge(&mut base, json!({"hosts": ["z"]}));
        assert_eq!(base, json!({"hosts": ["z"]}));
    }

    #[test]
    fn keys_are_lowercased_recursively() {
        let value = lowercase_keys(json!({"Redis": {"HOST": "x", "Replicas": [{"Name": "r1"}]}}));
        assert_eq!(value, json!({"redis": {"host": "x", "replicas": [{"name": "r1"}]}}));
    }
}
