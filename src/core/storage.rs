use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::identifier::KademliaId;

pub type Value = Vec<u8>;

/// Outcome of a store attempt. None of these are errors: a key is the hash of
/// its value, so once a key is present it is never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreStatus {
    Stored,
    /// Same key and same payload already present; nothing to do.
    Duplicate,
    /// Same key but a different payload; the existing value is kept.
    Conflict,
}

impl StoreStatus {
    pub fn is_stored(&self) -> bool {
        matches!(self, StoreStatus::Stored)
    }
}

#[derive(Debug, Default)]
pub struct Storage {
    map: HashMap<KademliaId, Value>,
}

impl Storage {
    pub fn new() -> Self {
        Storage {
            map: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: KademliaId, value: Value) -> StoreStatus {
        match self.map.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
                StoreStatus::Stored
            }
            Entry::Occupied(existing) if *existing.get() == value => StoreStatus::Duplicate,
            Entry::Occupied(_) => StoreStatus::Conflict,
        }
    }

    pub fn get(&self, key: &KademliaId) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &KademliaId) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_store_once() {
        let mut storage = Storage::new();
        let key = KademliaId::from_hashed(&"hello");

        assert_eq!(storage.insert(key, b"hello".to_vec()), StoreStatus::Stored);
        assert_eq!(storage.insert(key, b"hello".to_vec()), StoreStatus::Duplicate);
        assert_eq!(storage.insert(key, b"impostor".to_vec()), StoreStatus::Conflict);

        assert_eq!(storage.get(&key), Some(&b"hello".to_vec()));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn missing_key() {
        let storage = Storage::new();
        let key = KademliaId::from_hashed(&"missing");
        assert!(storage.get(&key).is_none());
        assert!(!storage.contains(&key));
        assert!(storage.is_empty());
    }

    #[test]
    fn empty_payload_is_a_value() {
        let mut storage = Storage::new();
        let key = KademliaId::from_hashed(&"");
        assert!(storage.insert(key, Vec::new()).is_stored());
        assert_eq!(storage.get(&key), Some(&Vec::new()));
    }
}
