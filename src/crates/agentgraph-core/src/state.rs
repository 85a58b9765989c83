//! Persistent copy-on-write state map
//!
//! [`StateMap`] is the key-value store that flows between nodes. It is
//! persistent in the functional sense: `insert`/`merge`/`remove` return a
//! new map and never touch the original, so every node (and every
//! checkpoint) observes an immutable snapshot. Entries are stored behind
//! `Arc`, so deriving a new map shares all unchanged values with its
//! predecessors instead of deep-cloning them.
//!
//! Nodes never receive a mutable reference to state; the only way to
//! "change" state is to return data and metadata from a node and let the
//! runner fold them into the next snapshot.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable key-value map with structural sharing between versions
#[derive(Clone, Default)]
pub struct StateMap {
    entries: Arc<HashMap<String, Arc<Value>>>,
}

impl StateMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(Arc::as_ref)
    }

    /// Look up a string value by key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v.as_ref()))
    }

    /// Derive a new map with one entry added or replaced
    ///
    /// All other entries are shared with this map.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Self {
        let mut entries = (*self.entries).clone();
        entries.insert(key.into(), Arc::new(value));
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Derive a new map with every entry from `updates` merged in
    ///
    /// Later entries win over existing ones.
    pub fn merge<I>(&self, updates: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut entries = (*self.entries).clone();
        for (key, value) in updates {
            entries.insert(key, Arc::new(value));
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Derive a new map with the key removed
    pub fn remove(&self, key: &str) -> Self {
        let mut entries = (*self.entries).clone();
        entries.remove(key);
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Render the map as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl From<HashMap<String, Value>> for StateMap {
    fn from(map: HashMap<String, Value>) -> Self {
        Self {
            entries: Arc::new(map.into_iter().map(|(k, v)| (k, Arc::new(v))).collect()),
        }
    }
}

impl From<serde_json::Map<String, Value>> for StateMap {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self {
            entries: Arc::new(map.into_iter().map(|(k, v)| (k, Arc::new(v))).collect()),
        }
    }
}

impl PartialEq for StateMap {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl std::fmt::Debug for StateMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Serialize for StateMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StateMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StateMapVisitor;

        impl<'de> Visitor<'de> for StateMapVisitor {
            type Value = StateMap;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of string keys to JSON values")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = HashMap::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    entries.insert(key, Arc::new(value));
                }
                Ok(StateMap {
                    entries: Arc::new(entries),
                })
            }
        }

        deserializer.deserialize_map(StateMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_insert_preserves_original() {
        let base = StateMap::new().insert("a", json!(1));
        let derived = base.insert("b", json!(2));

        assert_eq!(base.len(), 1);
        assert!(!base.contains_key("b"));
        assert_eq!(derived.get("a"), Some(&json!(1)));
        assert_eq!(derived.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_merge_later_entries_win() {
        let base = StateMap::new().insert("a", json!("old"));
        let merged = base.merge(vec![
            ("a".to_string(), json!("new")),
            ("b".to_string(), json!(true)),
        ]);

        assert_eq!(merged.get("a"), Some(&json!("new")));
        assert_eq!(merged.get("b"), Some(&json!(true)));
        assert_eq!(base.get("a"), Some(&json!("old")));
    }

    #[test]
    fn test_structural_sharing() {
        let large = json!({"payload": "x".repeat(64)});
        let base = StateMap::new().insert("big", large);
        let derived = base.insert("small", json!(1));

        // The unchanged entry is the same allocation in both versions.
        let a = base.entries.get("big").map(Arc::as_ptr);
        let b = derived.entries.get("big").map(Arc::as_ptr);
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_round_trip() {
        let map = StateMap::new()
            .insert("count", json!(3))
            .insert("nested", json!({"k": [1, 2]}));

        let encoded = serde_json::to_string(&map).unwrap();
        let decoded: StateMap = serde_json::from_str(&encoded).unwrap();
        assert_eq!(map, decoded);
    }

    #[test]
    fn test_to_json_object() {
        let map = StateMap::new().insert("k", json!("v"));
        assert_eq!(map.to_json(), json!({"k": "v"}));
    }

    proptest! {
        #[test]
        fn prop_insert_then_get(key in "[a-z]{1,8}", value in -1000i64..1000) {
            let map = StateMap::new().insert(key.clone(), json!(value));
            prop_assert_eq!(map.get(&key), Some(&json!(value)));
        }

        #[test]
        fn prop_remove_is_persistent(key in "[a-z]{1,8}") {
            let base = StateMap::new().insert(key.clone(), json!(1));
            let removed = base.remove(&key);
            prop_assert!(base.contains_key(&key));
            prop_assert!(!removed.contains_key(&key));
        }
    }
}
