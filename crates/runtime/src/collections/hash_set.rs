//! `PSet`: the HAMT-backed persistent set. Reuses the generic `Hamt` trie
//! with a unit value, so membership is exactly the trie's key lookup.

use super::trie::Hamt;
use crate::value::Value;

#[derive(Clone)]
pub struct PSet {
    trie: Hamt<()>,
}

impl PSet {
    pub fn empty() -> Self {
        PSet { trie: Hamt::empty() }
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        let mut set = PSet::empty();
        for item in items {
            set = set.insert(item);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.trie.contains_key(value)
    }

    /// Matches `HMap`'s `contains_key`/`get` naming so generic map/set
    /// comparison helpers (see `equality.rs`) can treat both uniformly.
    pub fn contains_key(&self, value: &Value) -> bool {
        self.contains(value)
    }

    pub fn insert(&self, value: Value) -> PSet {
        PSet {
            trie: self.trie.insert(value, ()),
        }
    }

    pub fn remove(&self, value: &Value) -> PSet {
        PSet {
            trie: self.trie.remove(value),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Value, ())> {
        self.trie.iter().into_iter()
    }

    pub fn values(&self) -> Vec<Value> {
        self.trie.iter().into_iter().map(|(v, _)| v).collect()
    }
}

impl Default for PSet {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_remove() {
        let s = PSet::empty().insert(Value::Int(1)).insert(Value::Int(2));
        assert_eq!(s.len(), 2);
        assert!(s.contains(&Value::Int(1)));
        let s2 = s.remove(&Value::Int(1));
        assert!(!s2.contains(&Value::Int(1)));
        assert!(s.contains(&Value::Int(1)), "original untouched");
    }
}
