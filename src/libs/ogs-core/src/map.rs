//! Keyed state store
//!
//! Single-owner key/value container backing every S1AP table (eNBs by SCTP
//! association, UEs by composite id, MME UE id indexes, the IMSI side map).
//! Insertion never overwrites, update never inserts, and removal either hands
//! the value back to the caller or passes it to the registered release
//! callback.

use std::collections::HashMap;
use std::fmt::{self, Debug, Write};
use std::hash::Hash;

use thiserror::Error;

/// Map operation status (success is `Ok`)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("MAP_NOT_CREATED")]
    NotCreated,
    #[error("MAP_EMPTY")]
    Empty,
    #[error("MAP_KEY_NOT_EXISTS")]
    KeyNotExists,
    #[error("MAP_KEY_ALREADY_EXISTS")]
    KeyAlreadyExists,
    #[error("MAP_BAD_PARAMETER_KEY")]
    BadParameterKey,
    #[error("MAP_BAD_PARAMETER_VALUE")]
    BadParameterValue,
    #[error("MAP_DUMP_FAIL")]
    DumpFail,
}

/// Map result type
pub type MapResult<T> = Result<T, MapError>;

/// Release callback, invoked with the owned value when an entry is freed
pub type ReleaseFn<K, V> = Box<dyn FnMut(&K, V) + Send>;

/// Keyed state store
pub struct KeyedMap<K, V> {
    name: String,
    entries: Option<HashMap<K, V>>,
    capacity_hint: usize,
    invalid_key: Option<K>,
    value_check: Option<fn(&V) -> bool>,
    release: Option<ReleaseFn<K, V>>,
}

impl<K, V> KeyedMap<K, V>
where
    K: Eq + Hash + Copy + Ord + Debug,
{
    /// Create a map; `capacity_hint` only pre-sizes storage.
    pub fn new(name: impl Into<String>, capacity_hint: usize) -> Self {
        Self {
            name: name.into(),
            entries: Some(HashMap::with_capacity(capacity_hint)),
            capacity_hint,
            invalid_key: None,
            value_check: None,
            release: None,
        }
    }

    /// Reject `key` with `BadParameterKey` on every operation
    pub fn with_invalid_key(mut self, key: K) -> Self {
        self.invalid_key = Some(key);
        self
    }

    /// Reject values failing `check` with `BadParameterValue`
    pub fn with_value_check(mut self, check: fn(&V) -> bool) -> Self {
        self.value_check = Some(check);
        self
    }

    /// Register the release callback
    pub fn with_release(mut self, release: ReleaseFn<K, V>) -> Self {
        self.release = Some(release);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity_hint(&self) -> usize {
        self.capacity_hint
    }

    fn check_key(&self, key: &K) -> MapResult<()> {
        match self.invalid_key {
            Some(ref invalid) if invalid == key => Err(MapError::BadParameterKey),
            _ => Ok(()),
        }
    }

    fn check_value(&self, value: &V) -> MapResult<()> {
        match self.value_check {
            Some(check) if !check(value) => Err(MapError::BadParameterValue),
            _ => Ok(()),
        }
    }

    fn entries(&self) -> MapResult<&HashMap<K, V>> {
        self.entries.as_ref().ok_or(MapError::NotCreated)
    }

    fn entries_mut(&mut self) -> MapResult<&mut HashMap<K, V>> {
        self.entries.as_mut().ok_or(MapError::NotCreated)
    }

    /// Look up a value
    pub fn get(&self, key: &K) -> MapResult<&V> {
        self.check_key(key)?;
        self.entries()?.get(key).ok_or(MapError::KeyNotExists)
    }

    /// Look up a value for in-place mutation
    pub fn get_mut(&mut self, key: &K) -> MapResult<&mut V> {
        self.check_key(key)?;
        self.entries_mut()?.get_mut(key).ok_or(MapError::KeyNotExists)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_ok()
    }

    /// Insert a new entry; an existing key is left untouched.
    pub fn insert(&mut self, key: K, value: V) -> MapResult<()> {
        self.check_key(&key)?;
        self.check_value(&value)?;
        let name = self.name.clone();
        let entries = self.entries_mut()?;
        if entries.contains_key(&key) {
            log::trace!("{}: key {:?} already exists", name, key);
            return Err(MapError::KeyAlreadyExists);
        }
        entries.insert(key, value);
        Ok(())
    }

    /// Overwrite an existing entry, returning the previous value
    pub fn update(&mut self, key: K, value: V) -> MapResult<V> {
        self.check_key(&key)?;
        self.check_value(&value)?;
        match self.entries_mut()?.get_mut(&key) {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(MapError::KeyNotExists),
        }
    }

    /// Remove an entry and hand ownership back without releasing it
    pub fn remove(&mut self, key: &K) -> MapResult<V> {
        self.check_key(key)?;
        self.entries_mut()?.remove(key).ok_or(MapError::KeyNotExists)
    }

    /// Remove an entry and release it through the callback (or drop it)
    pub fn free(&mut self, key: &K) -> MapResult<()> {
        let value = self.remove(key)?;
        match self.release.as_mut() {
            Some(release) => release(key, value),
            None => drop(value),
        }
        Ok(())
    }

    /// Release every entry; the map stays usable.
    pub fn clear(&mut self) -> MapResult<()> {
        let entries = self.entries.as_mut().ok_or(MapError::NotCreated)?;
        let drained: Vec<(K, V)> = entries.drain().collect();
        if let Some(release) = self.release.as_mut() {
            for (key, value) in drained {
                release(&key, value);
            }
        }
        Ok(())
    }

    /// Release every entry and tear the map down. Later calls see `NotCreated`.
    pub fn destroy(&mut self) -> MapResult<()> {
        self.clear()?;
        self.entries = None;
        log::debug!("{}: destroyed", self.name);
        Ok(())
    }

    pub fn is_created(&self) -> bool {
        self.entries.is_some()
    }

    pub fn size(&self) -> usize {
        self.entries.as_ref().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Keys in ascending order
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self
            .entries
            .as_ref()
            .map(|e| e.keys().copied().collect())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().flat_map(|e| e.iter())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().flat_map(|e| e.values())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().flat_map(|e| e.values_mut())
    }

    /// Visit entries until `callback` reports a hit, returning that key.
    ///
    /// An empty map yields `Empty`, a full scan without a hit `KeyNotExists`.
    pub fn for_each<F>(&self, mut callback: F) -> MapResult<K>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let entries = self.entries()?;
        if entries.is_empty() {
            return Err(MapError::Empty);
        }
        for (key, value) in entries.iter() {
            if callback(key, value) {
                return Ok(*key);
            }
        }
        Err(MapError::KeyNotExists)
    }

    /// Render every entry, one per line
    pub fn dump(&self) -> MapResult<String>
    where
        V: Debug,
    {
        let entries = self.entries()?;
        let mut out = String::new();
        writeln!(out, "{} ({} entries)", self.name, entries.len()).map_err(|_| MapError::DumpFail)?;
        for key in self.keys() {
            if let Some(value) = entries.get(&key) {
                writeln!(out, "  {:?} => {:?}", key, value).map_err(|_| MapError::DumpFail)?;
            }
        }
        Ok(out)
    }
}

impl<K, V> fmt::Debug for KeyedMap<K, V>
where
    K: Eq + Hash + Copy + Ord + Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        if let Some(entries) = self.entries.as_ref() {
            for key in self.keys() {
                if let Some(value) = entries.get(&key) {
                    map.entry(&key, value);
                }
            }
        }
        map.finish()
    }
}

impl<K, V> Clone for KeyedMap<K, V>
where
    K: Eq + Hash + Copy + Ord + Debug,
    V: Clone,
{
    /// Clones entries and parameter checks; the release callback is not shared.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            entries: self.entries.clone(),
            capacity_hint: self.capacity_hint,
            invalid_key: self.invalid_key,
            value_check: self.value_check,
            release: None,
        }
    }
}

impl<K, V> PartialEq for KeyedMap<K, V>
where
    K: Eq + Hash + Copy + Ord + Debug,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_imsi_table_lifecycle() {
        let mut map: KeyedMap<u32, u64> = KeyedMap::new("IMSI HASHTABLE", 16);
        assert_eq!(map.insert(1, 10), Ok(()));
        assert_eq!(map.insert(2, 20), Ok(()));
        assert_eq!(map.get(&1), Ok(&10));

        assert_eq!(map.insert(1, 10), Err(MapError::KeyAlreadyExists));

        assert_eq!(map.free(&1), Ok(()));
        assert_eq!(map.get(&1), Err(MapError::KeyNotExists));

        assert_eq!(map.clear(), Ok(()));
        assert!(map.is_empty());
    }

    #[test]
    fn test_insert_does_not_overwrite() {
        let mut map: KeyedMap<u64, &str> = KeyedMap::new("ues", 4);
        map.insert(7, "first").unwrap();
        assert_eq!(map.insert(7, "second"), Err(MapError::KeyAlreadyExists));
        assert_eq!(map.get(&7), Ok(&"first"));
    }

    #[test]
    fn test_update_requires_existing_key() {
        let mut map: KeyedMap<u32, u32> = KeyedMap::new("mmeid2associd", 4);
        assert_eq!(map.update(5, 1), Err(MapError::KeyNotExists));
        assert!(map.is_empty());
        map.insert(5, 1).unwrap();
        assert_eq!(map.update(5, 2), Ok(1));
        assert_eq!(map.get(&5), Ok(&2));
    }

    #[test]
    fn test_remove_absent_key() {
        let mut map: KeyedMap<u32, u32> = KeyedMap::new("enbs", 4);
        map.insert(1, 1).unwrap();
        assert_eq!(map.remove(&9), Err(MapError::KeyNotExists));
        assert_eq!(map.size(), 1);
    }

    #[test]
    fn test_release_callback_on_free_and_clear() {
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&released);
        let mut map: KeyedMap<u32, String> = KeyedMap::new("enbs", 4)
            .with_release(Box::new(move |k, _v| sink.lock().unwrap().push(*k)));

        map.insert(1, "a".into()).unwrap();
        map.insert(2, "b".into()).unwrap();
        map.insert(3, "c".into()).unwrap();

        // plain remove hands the value back, no release
        assert_eq!(map.remove(&3), Ok("c".to_string()));
        map.free(&1).unwrap();
        assert_eq!(*released.lock().unwrap(), vec![1]);

        map.clear().unwrap();
        assert_eq!(*released.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_destroy_then_not_created() {
        let mut map: KeyedMap<u32, u32> = KeyedMap::new("ues", 4);
        map.insert(1, 1).unwrap();
        map.destroy().unwrap();
        assert!(!map.is_created());
        assert_eq!(map.get(&1), Err(MapError::NotCreated));
        assert_eq!(map.insert(1, 1), Err(MapError::NotCreated));
        assert_eq!(map.size(), 0);
    }

    #[test]
    fn test_bad_parameters() {
        let mut map: KeyedMap<u32, u64> = KeyedMap::new("imsi", 4)
            .with_invalid_key(u32::MAX)
            .with_value_check(|v| *v != 0);
        assert_eq!(map.insert(u32::MAX, 1), Err(MapError::BadParameterKey));
        assert_eq!(map.insert(1, 0), Err(MapError::BadParameterValue));
        assert_eq!(map.get(&u32::MAX), Err(MapError::BadParameterKey));
    }

    #[test]
    fn test_for_each_stops_on_hit() {
        let mut map: KeyedMap<u32, u32> = KeyedMap::new("enbs", 4);
        assert_eq!(map.for_each(|_, _| true), Err(MapError::Empty));
        for k in 1..=5 {
            map.insert(k, k * 10).unwrap();
        }
        let mut visited = 0;
        let hit = map.for_each(|_, v| {
            visited += 1;
            *v == 30
        });
        assert_eq!(hit, Ok(3));
        assert!(visited <= 5);
        assert_eq!(map.for_each(|_, v| *v == 99), Err(MapError::KeyNotExists));
    }

    #[test]
    fn test_keys_sorted_and_dump() {
        let mut map: KeyedMap<u32, u32> = KeyedMap::new("enbs", 4);
        for k in [9, 3, 5] {
            map.insert(k, k).unwrap();
        }
        assert_eq!(map.keys(), vec![3, 5, 9]);
        let dump = map.dump().unwrap();
        assert!(dump.starts_with("enbs (3 entries)"));
        assert_eq!(MapError::KeyAlreadyExists.to_string(), "MAP_KEY_ALREADY_EXISTS");
    }
}
