//! Dense ordered sequence payload.
//!
//! Arrays are 0-indexed, integer-keyed and contiguous. Mutation happens
//! through short-lived interior borrows; no borrow is ever held across a
//! user callback, so reentrant natives cannot trip the borrow checker at
//! runtime. Out-of-range indices are runtime errors that name both the
//! index and the current size.

use crate::error::RuntimeError;
use crate::value::Value;
use std::cell::RefCell;

#[derive(Debug, Default)]
pub struct SparkArray {
    items: RefCell<Vec<Value>>,
}

fn bounds_error(index: i64, count: usize) -> RuntimeError {
    RuntimeError::new(format!(
        "index {} out of bounds for array of size {}",
        index, count
    ))
}

impl SparkArray {
    pub fn new() -> Self {
        SparkArray {
            items: RefCell::new(Vec::new()),
        }
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        SparkArray {
            items: RefCell::new(items),
        }
    }

    /// Number of elements. O(1).
    pub fn count(&self) -> usize {
        self.items.borrow().len()
    }

    /// Element at `index`; `index` must be in `[0, count)`. O(1).
    pub fn get(&self, index: i64) -> Result<Value, RuntimeError> {
        let items = self.items.borrow();
        if index < 0 || index as usize >= items.len() {
            return Err(bounds_error(index, items.len()));
        }
        Ok(items[index as usize].clone())
    }

    /// Replace the element at an in-range `index`. O(1).
    pub fn set(&self, index: i64, value: Value) -> Result<(), RuntimeError> {
        let mut items = self.items.borrow_mut();
        if index < 0 || index as usize >= items.len() {
            return Err(bounds_error(index, items.len()));
        }
        items[index as usize] = value;
        Ok(())
    }

    /// Append. Amortized O(1).
    pub fn push(&self, value: Value) {
        self.items.borrow_mut().push(value);
    }

    /// Remove and return the last element; error when empty. O(1).
    pub fn pop(&self) -> Result<Value, RuntimeError> {
        self.items
            .borrow_mut()
            .pop()
            .ok_or_else(|| RuntimeError::new("cannot pop() empty array"))
    }

    /// Insert at `index`, shifting the tail right; `index` in `[0, count]`. O(n).
    pub fn insert(&self, index: i64, value: Value) -> Result<(), RuntimeError> {
        let mut items = self.items.borrow_mut();
        if index < 0 || index as usize > items.len() {
            return Err(bounds_error(index, items.len()));
        }
        items.insert(index as usize, value);
        Ok(())
    }

    /// Splice `other` in at `index`; `index` in `[0, count]`. O(n+m).
    ///
    /// Takes a snapshot vector rather than another array so that injecting
    /// an array into itself is well-defined.
    pub fn inject(&self, index: i64, other: Vec<Value>) -> Result<(), RuntimeError> {
        let mut items = self.items.borrow_mut();
        if index < 0 || index as usize > items.len() {
            return Err(bounds_error(index, items.len()));
        }
        items.splice(index as usize..index as usize, other);
        Ok(())
    }

    /// Remove the element at `index`, shifting the tail left. O(n).
    pub fn remove(&self, index: i64) -> Result<Value, RuntimeError> {
        let mut items = self.items.borrow_mut();
        if index < 0 || index as usize >= items.len() {
            return Err(bounds_error(index, items.len()));
        }
        Ok(items.remove(index as usize))
    }

    /// Exchange two in-range elements.
    pub fn swap(&self, a: i64, b: i64) -> Result<(), RuntimeError> {
        let mut items = self.items.borrow_mut();
        let n = items.len();
        if a < 0 || a as usize >= n {
            return Err(bounds_error(a, n));
        }
        if b < 0 || b as usize >= n {
            return Err(bounds_error(b, n));
        }
        items.swap(a as usize, b as usize);
        Ok(())
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.items.borrow_mut().reverse();
    }

    /// Snapshot of the current contents (element refcounts bumped).
    pub fn to_vec(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> SparkArray {
        SparkArray::from_vec(values.iter().map(|&i| Value::Int(i)).collect())
    }

    #[test]
    fn test_push_get_set_count() {
        let a = SparkArray::new();
        assert_eq!(a.count(), 0);
        a.push(Value::Int(1));
        a.push(Value::Int(2));
        assert_eq!(a.count(), 2);
        assert_eq!(a.get(1).unwrap(), Value::Int(2));
        a.set(0, Value::Int(9)).unwrap();
        assert_eq!(a.get(0).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_get_set_bounds() {
        let a = ints(&[1, 2, 3]);
        assert!(a.get(3).is_err());
        assert!(a.get(-1).is_err());
        assert!(a.set(3, Value::Nil).is_err());
        let msg = a.get(5).unwrap_err().message;
        assert!(msg.contains('5') && msg.contains('3'), "got: {}", msg);
    }

    #[test]
    fn test_pop_and_empty_pop() {
        let a = ints(&[1]);
        assert_eq!(a.pop().unwrap(), Value::Int(1));
        assert!(a.pop().is_err());
    }

    #[test]
    fn test_insert_shifts_tail() {
        let a = ints(&[1, 3]);
        a.insert(1, Value::Int(2)).unwrap();
        assert_eq!(a.to_vec(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        a.insert(3, Value::Int(4)).unwrap();
        assert_eq!(a.count(), 4);
        assert!(a.insert(9, Value::Nil).is_err());
    }

    #[test]
    fn test_inject_splices() {
        let a = ints(&[1, 4]);
        a.inject(1, vec![Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(
            a.to_vec(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
        );
        assert!(a.inject(9, vec![]).is_err());
    }

    #[test]
    fn test_remove_shifts_left() {
        let a = ints(&[1, 2, 3]);
        assert_eq!(a.remove(1).unwrap(), Value::Int(2));
        assert_eq!(a.to_vec(), vec![Value::Int(1), Value::Int(3)]);
        assert!(a.remove(2).is_err());
    }

    #[test]
    fn test_reverse_twice_is_identity() {
        let a = ints(&[1, 2, 3, 4]);
        let original = a.to_vec();
        a.reverse();
        a.reverse();
        assert_eq!(a.to_vec(), original);
    }

    #[test]
    fn test_swap() {
        let a = ints(&[1, 2, 3]);
        a.swap(0, 2).unwrap();
        assert_eq!(a.to_vec(), vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
        assert!(a.swap(0, 5).is_err());
    }
}
