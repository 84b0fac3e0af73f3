//! Canonical JSON serialization and content hashing.
//!
//! Grounded on `sem_os_core::authoring::canonical_hash`: object keys sorted
//! lexicographically, no insignificant whitespace, SHA-256 over the UTF-8
//! bytes of the result. Cross-checked against the Python original's
//! `canonical_json.py` (`sort_keys=True`, compact separators, ISO-8601 `Z`
//! timestamps, decimals rendered as strings).

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sorts object keys so that two semantically equal values
/// serialize to byte-identical output regardless of field insertion order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(String, Value)> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serializes `value` to its canonical byte-stable string form: sorted keys,
/// no whitespace. Numbers and strings pass through `serde_json`'s own
/// formatting, which is already stable across platforms for the value
/// ranges this core deals with.
pub fn canonical_string(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).expect("canonical value always serializes")
}

/// SHA-256 over the canonical UTF-8 bytes, hex-encoded.
pub fn canonical_hash(value: &Value) -> String {
    let bytes = canonical_string(value).into_bytes();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

/// Byte length of the canonical serialization, used against the 262,144
/// byte payload cap (spec §4.1).
pub fn canonical_byte_len(value: &Value) -> usize {
    canonical_string(value).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn nested_arrays_are_canonicalized_recursively() {
        let a = json!({"list": [{"y": 1, "x": 2}]});
        let b = json!({"list": [{"x": 2, "y": 1}]});
        assert_eq!(canonical_string(&a), canonical_string(&b));
    }

    #[test]
    fn round_trip_law_holds() {
        let value = json!({"z": [1, 2, 3], "a": {"nested": true}});
        let once = canonical_string(&value);
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        let twice = canonical_string(&reparsed);
        assert_eq!(once, twice);
    }

    #[test]
    fn hash_is_deterministic_across_calls() {
        let value = json!({"box": {"w": 100, "h": 50, "d": 25}});
        assert_eq!(canonical_hash(&value), canonical_hash(&value));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Same (key, value) pairs inserted in a different order must still
        /// hash identically — this is the idempotency guarantee the
        /// intake/idempotency layer depends on (spec.md §8).
        #[test]
        fn hash_is_insensitive_to_key_insertion_order(
            pairs in prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 1..8)
        ) {
            let mut forward = serde_json::Map::new();
            for (k, v) in &pairs {
                forward.insert(k.clone(), json!(v));
            }
            let mut reversed = serde_json::Map::new();
            for (k, v) in pairs.iter().rev() {
                reversed.insert(k.clone(), json!(v));
            }
            prop_assert_eq!(
                canonical_hash(&Value::Object(forward)),
                canonical_hash(&Value::Object(reversed))
            );
        }

        /// Canonicalizing an already-canonical value changes nothing.
        #[test]
        fn canonicalize_is_idempotent(
            pairs in prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..8)
        ) {
            let mut map = serde_json::Map::new();
            for (k, v) in &pairs {
                map.insert(k.clone(), json!(v));
            }
            let value = Value::Object(map);
            let once = canonicalize(&value);
            let twice = canonicalize(&once);
            prop_assert_eq!(once, twice);
        }

        /// Re-serializing the canonical string and canonicalizing again
        /// reproduces the same bytes (the round-trip law spec.md §8 names).
        #[test]
        fn round_trip_law_holds_for_arbitrary_objects(
            pairs in prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..8)
        ) {
            let mut map = serde_json::Map::new();
            for (k, v) in &pairs {
                map.insert(k.clone(), json!(v));
            }
            let value = Value::Object(map);
            let once = canonical_string(&value);
            let reparsed: Value = serde_json::from_str(&once).unwrap();
            let twice = canonical_string(&reparsed);
            prop_assert_eq!(once, twice);
        }
    }
}
