//! Open-addressing key/value map payload.
//!
//! Keys are any hashable value (nil, bool, numbers, strings, functions,
//! userinfo). The table uses power-of-two capacities with linear probing
//! and tombstone deletion; tombstones are reclaimed when the table
//! rehashes at 3/4 occupancy into at least double the capacity.
//!
//! Iteration is the cursor protocol: `next(0)` starts, each call returns
//! the following cursor, and `None` ends the walk. Cursors stay valid
//! across reads only; every mutation bumps the generation counter so
//! iterating callers can detect mutation instead of corrupting the walk.

use crate::error::RuntimeError;
use crate::string::hash_bytes;
use crate::value::{hash_value, Value};
use std::cell::RefCell;

#[derive(Debug)]
enum Slot {
    Vacant,
    Tombstone,
    Occupied { hash: u64, key: Value, value: Value },
}

#[derive(Debug, Default)]
struct Table {
    slots: Vec<Slot>,
    /// Live entries
    live: usize,
    /// Non-vacant slots (live + tombstones); drives the rehash decision
    used: usize,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct SparkHashMap {
    table: RefCell<Table>,
}

const MIN_CAPACITY: usize = 8;

impl Table {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the occupied slot holding `key`, if present.
    fn find(&self, hash: u64, key_eq: &dyn Fn(&Value) -> bool) -> Option<usize> {
        let cap = self.capacity();
        if cap == 0 {
            return None;
        }
        let mask = cap - 1;
        let mut idx = hash as usize & mask;
        for _ in 0..cap {
            match &self.slots[idx] {
                Slot::Vacant => return None,
                Slot::Tombstone => {}
                Slot::Occupied { hash: h, key, .. } => {
                    if *h == hash && key_eq(key) {
                        return Some(idx);
                    }
                }
            }
            idx = (idx + 1) & mask;
        }
        None
    }

    /// Slot to insert `key` into: an existing match, or the first
    /// reusable slot on its probe path.
    fn find_insert_slot(&self, hash: u64, key_eq: &dyn Fn(&Value) -> bool) -> usize {
        let mask = self.capacity() - 1;
        let mut idx = hash as usize & mask;
        let mut first_tombstone = None;
        loop {
            match &self.slots[idx] {
                Slot::Vacant => return first_tombstone.unwrap_or(idx),
                Slot::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(idx);
                    }
                }
                Slot::Occupied { hash: h, key, .. } => {
                    if *h == hash && key_eq(key) {
                        return idx;
                    }
                }
            }
            idx = (idx + 1) & mask;
        }
    }

    /// Grow to at least double the capacity, dropping tombstones.
    fn rehash(&mut self) {
        let new_cap = (self.capacity() * 2).max(MIN_CAPACITY);
        let old = std::mem::replace(
            &mut self.slots,
            (0..new_cap).map(|_| Slot::Vacant).collect(),
        );
        self.used = self.live;

        let mask = new_cap - 1;
        for slot in old {
            if let Slot::Occupied { hash, key, value } = slot {
                let mut idx = hash as usize & mask;
                while !matches!(self.slots[idx], Slot::Vacant) {
                    idx = (idx + 1) & mask;
                }
                self.slots[idx] = Slot::Occupied { hash, key, value };
            }
        }
    }

    fn insert(&mut self, hash: u64, key: Value, value: Value) {
        if (self.used + 1) * 4 > self.capacity() * 3 {
            self.rehash();
        }

        let idx = self.find_insert_slot(hash, &|stored| *stored == key);
        match &mut self.slots[idx] {
            slot @ Slot::Vacant => {
                *slot = Slot::Occupied { hash, key, value };
                self.used += 1;
                self.live += 1;
            }
            slot @ Slot::Tombstone => {
                *slot = Slot::Occupied { hash, key, value };
                self.live += 1;
            }
            Slot::Occupied { value: old, .. } => *old = value,
        }
        self.generation += 1;
    }

    fn delete(&mut self, hash: u64, key_eq: &dyn Fn(&Value) -> bool) {
        if let Some(idx) = self.find(hash, key_eq) {
            self.slots[idx] = Slot::Tombstone;
            self.live -= 1;
            self.generation += 1;
        }
    }
}

impl SparkHashMap {
    pub fn new() -> Self {
        SparkHashMap::default()
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.table.borrow().live
    }

    /// Mutation counter; compare before/after a callback to detect
    /// mutation during iteration.
    pub fn generation(&self) -> u64 {
        self.table.borrow().generation
    }

    /// Value for `key`, or nil when absent. The key must be hashable.
    pub fn get(&self, key: &Value) -> Result<Value, RuntimeError> {
        let hash = hash_value(key)?;
        let table = self.table.borrow();
        Ok(match table.find(hash, &|k| k == key) {
            Some(idx) => match &table.slots[idx] {
                Slot::Occupied { value, .. } => value.clone(),
                _ => Value::Nil,
            },
            None => Value::Nil,
        })
    }

    /// Insert or replace; setting nil removes the entry.
    pub fn set(&self, key: Value, value: Value) -> Result<(), RuntimeError> {
        let hash = hash_value(&key)?;
        let mut table = self.table.borrow_mut();
        if value.is_nil() {
            table.delete(hash, &|k| *k == key);
        } else {
            table.insert(hash, key, value);
        }
        Ok(())
    }

    /// Fast-path lookup keyed by a borrowed string; hashes on the fly
    /// without allocating a string payload.
    pub fn get_strkey(&self, key: &str) -> Value {
        let hash = hash_bytes(key.as_bytes());
        let table = self.table.borrow();
        match table.find(hash, &str_key_eq(key)) {
            Some(idx) => match &table.slots[idx] {
                Slot::Occupied { value, .. } => value.clone(),
                _ => Value::Nil,
            },
            None => Value::Nil,
        }
    }

    /// Fast-path insert keyed by a borrowed string.
    pub fn set_strkey(&self, key: &str, value: Value) {
        let hash = hash_bytes(key.as_bytes());
        let mut table = self.table.borrow_mut();
        if value.is_nil() {
            table.delete(hash, &str_key_eq(key));
        } else {
            table.insert(hash, Value::string(key), value);
        }
    }

    /// Advance the iteration cursor. `cursor = 0` starts; `None` ends.
    ///
    /// The returned cursor is an opaque position; it is invalidated by any
    /// mutation of the map (check `generation` around callbacks).
    pub fn next(&self, cursor: usize) -> Option<(usize, Value, Value)> {
        let table = self.table.borrow();
        for idx in cursor..table.capacity() {
            if let Slot::Occupied { key, value, .. } = &table.slots[idx] {
                return Some((idx + 1, key.clone(), value.clone()));
            }
        }
        None
    }
}

fn str_key_eq(key: &str) -> impl Fn(&Value) -> bool + '_ {
    move |stored: &Value| match stored {
        Value::String(s) => s.as_bytes() == key.as_bytes(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::SparkArray;

    #[test]
    fn test_set_get_and_absent_is_nil() {
        let m = SparkHashMap::new();
        m.set(Value::string("a"), Value::Int(1)).unwrap();
        m.set(Value::Int(2), Value::string("two")).unwrap();
        assert_eq!(m.get(&Value::string("a")).unwrap(), Value::Int(1));
        assert_eq!(m.get(&Value::Int(2)).unwrap(), Value::string("two"));
        assert_eq!(m.get(&Value::string("missing")).unwrap(), Value::Nil);
        assert_eq!(m.count(), 2);
    }

    #[test]
    fn test_set_nil_removes() {
        let m = SparkHashMap::new();
        m.set(Value::string("k"), Value::Int(1)).unwrap();
        assert_eq!(m.count(), 1);
        m.set(Value::string("k"), Value::Nil).unwrap();
        assert_eq!(m.count(), 0);
        assert_eq!(m.get(&Value::string("k")).unwrap(), Value::Nil);
    }

    #[test]
    fn test_replace_keeps_count() {
        let m = SparkHashMap::new();
        m.set(Value::string("k"), Value::Int(1)).unwrap();
        m.set(Value::string("k"), Value::Int(2)).unwrap();
        assert_eq!(m.count(), 1);
        assert_eq!(m.get(&Value::string("k")).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_int_and_integral_float_keys_collide() {
        let m = SparkHashMap::new();
        m.set(Value::Int(3), Value::string("x")).unwrap();
        assert_eq!(m.get(&Value::Float(3.0)).unwrap(), Value::string("x"));
        m.set(Value::Float(3.0), Value::string("y")).unwrap();
        assert_eq!(m.count(), 1);
        assert_eq!(m.get(&Value::Int(3)).unwrap(), Value::string("y"));
    }

    #[test]
    fn test_unhashable_keys_rejected() {
        let m = SparkHashMap::new();
        let arr = Value::array(SparkArray::new());
        assert!(m.set(arr.clone(), Value::Int(1)).is_err());
        assert!(m.get(&arr).is_err());
    }

    #[test]
    fn test_strkey_fast_path_matches_generic_path() {
        let m = SparkHashMap::new();
        m.set_strkey("re", Value::Float(1.5));
        assert_eq!(m.get(&Value::string("re")).unwrap(), Value::Float(1.5));
        m.set(Value::string("im"), Value::Float(2.5)).unwrap();
        assert_eq!(m.get_strkey("im"), Value::Float(2.5));
        m.set_strkey("re", Value::Nil);
        assert_eq!(m.get_strkey("re"), Value::Nil);
        assert_eq!(m.count(), 1);
    }

    #[test]
    fn test_growth_preserves_entries() {
        let m = SparkHashMap::new();
        for i in 0..100 {
            m.set(Value::Int(i), Value::Int(i * 10)).unwrap();
        }
        assert_eq!(m.count(), 100);
        for i in 0..100 {
            assert_eq!(m.get(&Value::Int(i)).unwrap(), Value::Int(i * 10));
        }
    }

    #[test]
    fn test_tombstones_reclaimed_by_rehash() {
        let m = SparkHashMap::new();
        for round in 0..50 {
            m.set(Value::Int(round), Value::Int(round)).unwrap();
            m.set(Value::Int(round), Value::Nil).unwrap();
        }
        assert_eq!(m.count(), 0);
        m.set(Value::Int(1), Value::Int(1)).unwrap();
        assert_eq!(m.get(&Value::Int(1)).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_next_visits_every_entry_exactly_once() {
        let m = SparkHashMap::new();
        for i in 0..20 {
            m.set(Value::Int(i), Value::Int(-i)).unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = 0;
        while let Some((next, key, value)) = m.next(cursor) {
            let k = key.as_int().unwrap();
            assert_eq!(value, Value::Int(-k));
            seen.push(k);
            cursor = next;
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_next_on_empty_map_ends_immediately() {
        let m = SparkHashMap::new();
        assert!(m.next(0).is_none());
    }

    #[test]
    fn test_generation_bumps_on_mutation_only() {
        let m = SparkHashMap::new();
        let g0 = m.generation();
        m.set(Value::Int(1), Value::Int(1)).unwrap();
        let g1 = m.generation();
        assert_ne!(g0, g1);

        let _ = m.get(&Value::Int(1)).unwrap();
        let _ = m.next(0);
        assert_eq!(m.generation(), g1);

        m.set(Value::Int(1), Value::Nil).unwrap();
        assert_ne!(m.generation(), g1);
    }
}

