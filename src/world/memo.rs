//! Results of memoized function calls
use indexmap::IndexMap;
use tracing::debug;

use crate::value::Value;

/// Function id plus the fingerprint of its arguments
pub type MemoKey = (usize, u64);

/// A bounded cache of call results, evicting the least recently used entry
/// once full. A capacity of zero disables memoization.
#[derive(Debug, Clone)]
pub struct Memoizer {
    entries: IndexMap<MemoKey, Value>,
    capacity: usize,
}

impl Memoizer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a result, marking it as most recently used
    pub fn get(&mut self, key: &MemoKey) -> Option<Value> {
        let index = self.entries.get_index_of(key)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get_index(last).map(|(_, value)| value.clone())
    }

    pub fn insert(&mut self, key: MemoKey, value: Value) {
        if self.capacity == 0 {
            return;
        }
        if let Some(index) = self.entries.get_index_of(&key) {
            let last = self.entries.len() - 1;
            self.entries.move_index(index, last);
            if let Some((_, slot)) = self.entries.get_index_mut(last) {
                *slot = value;
            }
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(((function, _), _)) = self.entries.shift_remove_index(0) {
                debug!(function, "evicting memoized result");
            }
        }
        self.entries.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::Memoizer;
    use crate::value::Value;

    #[test]
    fn evicts_least_recently_used() {
        let mut memo = Memoizer::new(2);
        memo.insert((0, 1), Value::Integer(1));
        memo.insert((0, 2), Value::Integer(2));
        // touch the older entry so the newer one goes first
        check!(memo.get(&(0, 1)) == Some(Value::Integer(1)));
        memo.insert((0, 3), Value::Integer(3));

        check!(memo.len() == 2);
        check!(memo.get(&(0, 2)).is_none());
        check!(memo.get(&(0, 1)) == Some(Value::Integer(1)));
        check!(memo.get(&(0, 3)) == Some(Value::Integer(3)));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut memo = Memoizer::new(0);
        memo.insert((7, 7), Value::Null);
        check!(memo.is_empty());
        check!(memo.get(&(7, 7)).is_none());
    }

    #[test]
    fn reinserting_replaces_the_result() {
        let mut memo = Memoizer::new(4);
        memo.insert((1, 1), Value::Integer(1));
        memo.insert((1, 1), Value::Integer(2));
        check!(memo.len() == 1);
        check!(memo.get(&(1, 1)) == Some(Value::Integer(2)));
    }
}
