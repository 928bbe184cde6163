//! RAM-backed key-value store.
//!
//! Fixed capacity, no heap. Used by tests and the host simulator.

use heapless::{String, Vec};

use super::{KeyValueStore, StorageError, MAX_KEY_LEN};

/// Number of keys a [`MemoryStore`] can hold.
pub const MEMORY_STORE_CAPACITY: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    U16(u16),
    U32(u32),
}

/// In-memory store with the same typing rules as NVS: a key written as one
/// width reads back as [`StorageError::TypeMismatch`] under the other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Vec<(String<MAX_KEY_LEN>, Slot), MEMORY_STORE_CAPACITY>,
    writes: u32,
}

impl MemoryStore {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            writes: 0,
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total successful writes (sets and removes), for wear checks in tests.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    fn find(&self, key: &str) -> Option<&Slot> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, slot)| slot)
    }

    fn put(&mut self, key: &str, slot: Slot) -> Result<(), StorageError> {
        if key.len() > MAX_KEY_LEN {
            return Err(StorageError::KeyTooLong);
        }

        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| k.as_str() == key) {
            *existing = slot;
        } else {
            let mut owned: String<MAX_KEY_LEN> = String::new();
            owned.push_str(key).map_err(|_| StorageError::KeyTooLong)?;
            self.entries
                .push((owned, slot))
                .map_err(|_| StorageError::Full)?;
        }

        self.writes += 1;
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.find(key).is_some())
    }

    fn get_u16(&self, key: &str) -> Result<Option<u16>, StorageError> {
        match self.find(key) {
            None => Ok(None),
            Some(Slot::U16(v)) => Ok(Some(*v)),
            Some(_) => Err(StorageError::TypeMismatch),
        }
    }

    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StorageError> {
        self.put(key, Slot::U16(value))
    }

    fn get_u32(&self, key: &str) -> Result<Option<u32>, StorageError> {
        match self.find(key) {
            None => Ok(None),
            Some(Slot::U32(v)) => Ok(Some(*v)),
            Some(_) => Err(StorageError::TypeMismatch),
        }
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), StorageError> {
        self.put(key, Slot::U32(value))
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if let Some(pos) = self.entries.iter().position(|(k, _)| k.as_str() == key) {
            self.entries.swap_remove(pos);
            self.writes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_overwrite() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get_u16("map_min").unwrap(), None);

        store.set_u16("map_min", 500).unwrap();
        store.set_u16("map_min", 510).unwrap();

        assert_eq!(store.get_u16("map_min").unwrap(), Some(510));
        assert_eq!(store.len(), 1);
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn test_float_stored_as_bits() {
        let mut store = MemoryStore::new();
        store.set_f32("inj_on_tps", 12.5).unwrap();
        assert_eq!(store.get_f32("inj_on_tps").unwrap(), Some(12.5));
        assert_eq!(store.get_u32("inj_on_tps").unwrap(), Some(12.5f32.to_bits()));
    }

    #[test]
    fn test_type_mismatch() {
        let mut store = MemoryStore::new();
        store.set_u16("tps_max", 3800).unwrap();
        assert_eq!(store.get_u32("tps_max"), Err(StorageError::TypeMismatch));
    }

    #[test]
    fn test_key_too_long() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.set_u16("a_key_longer_than_nvs_allows", 1),
            Err(StorageError::KeyTooLong)
        );
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let mut store = MemoryStore::new();
        store.set_u16("tps_min", 300).unwrap();
        store.remove("tps_min").unwrap();
        store.remove("tps_min").unwrap();
        assert!(!store.contains("tps_min").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut store = MemoryStore::new();
        let keys = [
            "k00", "k01", "k02", "k03", "k04", "k05", "k06", "k07", "k08", "k09", "k10", "k11",
            "k12", "k13", "k14", "k15", "k16", "k17", "k18", "k19", "k20", "k21", "k22", "k23",
        ];
        for key in keys {
            store.set_u16(key, 1).unwrap();
        }
        assert_eq!(store.set_u16("k24", 1), Err(StorageError::Full));
    }
}
