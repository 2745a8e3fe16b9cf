//! `HMap`: the HAMT-backed map representation that `ArrayMap` upgrades to
//! once a map grows past the small-map threshold (see `Environment`/builtin
//! `assoc` policy), and the representation `hash-map`/large literal maps
//! build directly.

use super::trie::Hamt;
use crate::value::Value;

#[derive(Clone)]
pub struct HMap {
    trie: Hamt<Value>,
}

impl HMap {
    pub fn empty() -> Self {
        HMap { trie: Hamt::empty() }
    }

    pub fn from_pairs(pairs: Vec<(Value, Value)>) -> Self {
        let mut map = HMap::empty();
        for (k, v) in pairs {
            map = map.insert(k, v);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.trie.get(key)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.trie.contains_key(key)
    }

    pub fn insert(&self, key: Value, value: Value) -> HMap {
        HMap {
            trie: self.trie.insert(key, value),
        }
    }

    pub fn remove(&self, key: &Value) -> HMap {
        HMap {
            trie: self.trie.remove(key),
        }
    }

    pub fn iter(&self) -> Vec<(Value, Value)> {
        self.trie.iter()
    }
}

impl Default for HMap {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let m = HMap::empty().insert(Value::Int(1), Value::Str(std::rc::Rc::from("a")));
        assert_eq!(m.get(&Value::Int(1)), Some(Value::Str(std::rc::Rc::from("a"))));
        let m2 = m.remove(&Value::Int(1));
        assert!(m2.is_empty());
    }
}
