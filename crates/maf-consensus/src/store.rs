//! Concurrency-safe key-value storage owned by the replicated state machine.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// The replicated mapping. Ordered so snapshots serialize deterministically.
pub type Mapping = BTreeMap<String, String>;

/// String-to-string store with snapshot and restore.
///
/// The state machine is the only writer; readers (the local `get` path)
/// share a read lock. All operations are linearizable with respect to
/// each other.
#[derive(Debug, Default)]
pub struct SafeStore {
    data: RwLock<Mapping>,
}

impl SafeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let data = self.data.read().expect("kv store lock poisoned");
        data.get(key).cloned()
    }

    /// Unconditional upsert.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut data = self.data.write().expect("kv store lock poisoned");
        data.insert(key.into(), value.into());
    }

    /// No-op if the key is absent.
    pub fn delete(&self, key: &str) {
        let mut data = self.data.write().expect("kv store lock poisoned");
        data.remove(key);
    }

    /// Deep copy of the current mapping, independent of later mutations.
    pub fn snapshot(&self) -> Mapping {
        let data = self.data.read().expect("kv store lock poisoned");
        data.clone()
    }

    /// Merges `data` into the store; keys not present in `data` are left
    /// intact. Boot-time restore targets a freshly constructed store, so
    /// the merge is equivalent to a replace there.
    pub fn restore(&self, data: Mapping) {
        let mut current = self.data.write().expect("kv store lock poisoned");
        current.extend(data);
    }

    pub fn len(&self) -> usize {
        self.data.read().expect("kv store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_delete() {
        let store = SafeStore::new();
        assert_eq!(store.get("k"), None);

        store.set("k", "v");
        assert_eq!(store.get("k"), Some("v".to_string()));

        store.set("k", "v2");
        assert_eq!(store.get("k"), Some("v2".to_string()));

        store.delete("k");
        assert_eq!(store.get("k"), None);

        // Deleting an absent key is a no-op.
        store.delete("k");
    }

    #[test]
    fn empty_value_is_distinct_from_absence() {
        let store = SafeStore::new();
        store.set("k", "");
        assert_eq!(store.get("k"), Some(String::new()));
    }

    #[test]
    fn snapshot_is_independent_of_later_writes() {
        let store = SafeStore::new();
        store.set("a", "1");

        let snap = store.snapshot();
        store.set("a", "2");
        store.set("b", "3");

        assert_eq!(snap.get("a"), Some(&"1".to_string()));
        assert!(!snap.contains_key("b"));
    }

    #[test]
    fn restore_merges_over_existing_keys() {
        let store = SafeStore::new();
        store.set("keep", "1");
        store.set("overwrite", "old");

        let mut incoming = Mapping::new();
        incoming.insert("overwrite".into(), "new".into());
        incoming.insert("added".into(), "2".into());
        store.restore(incoming);

        assert_eq!(store.get("keep"), Some("1".to_string()));
        assert_eq!(store.get("overwrite"), Some("new".to_string()));
        assert_eq!(store.get("added"), Some("2".to_string()));
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let store = SafeStore::new();
        for i in 0..100 {
            store.set(format!("key-{i}"), format!("value-{i}"));
        }

        let fresh = SafeStore::new();
        fresh.restore(store.snapshot());

        assert_eq!(fresh.snapshot(), store.snapshot());
    }
}
