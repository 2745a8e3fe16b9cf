//! Array map: the insertion-ordered, small-map representation produced by
//! map literals (`{:a 1 :b 2}`). Lookup is O(n) over a parallel
//! key/value array; this is correct and fast for the handful-of-keys case
//! that dominates real programs, with `HMap` (`collections::hash_map`)
//! taking over for large maps.

use crate::equality::value_eq;
use crate::value::Value;
use std::rc::Rc;

#[derive(Clone)]
pub struct ArrayMap {
    entries: Rc<Vec<(Value, Value)>>,
}

impl ArrayMap {
    pub fn empty() -> Self {
        ArrayMap {
            entries: Rc::new(Vec::new()),
        }
    }

    /// Builds a map from entries, keeping only the last value for a
    /// duplicated key (matching literal map-construction semantics).
    pub fn from_pairs(pairs: Vec<(Value, Value)>) -> Self {
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            if let Some(slot) = entries.iter_mut().find(|(ek, _)| value_eq(ek, &k)) {
                slot.1 = v;
            } else {
                entries.push((k, v));
            }
        }
        ArrayMap {
            entries: Rc::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| value_eq(k, key))
            .map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.iter().any(|(k, _)| value_eq(k, key))
    }

    pub fn assoc(&self, key: Value, value: Value) -> ArrayMap {
        let mut next = (*self.entries).clone();
        match next.iter_mut().find(|(k, _)| value_eq(k, &key)) {
            Some(slot) => slot.1 = value,
            None => next.push((key, value)),
        }
        ArrayMap {
            entries: Rc::new(next),
        }
    }

    pub fn dissoc(&self, key: &Value) -> ArrayMap {
        let next: Vec<(Value, Value)> = self
            .entries
            .iter()
            .filter(|(k, _)| !value_eq(k, key))
            .cloned()
            .collect();
        ArrayMap {
            entries: Rc::new(next),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.entries.iter().cloned()
    }

    pub fn keys(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.iter().map(|(k, _)| k.clone())
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.iter().map(|(_, v)| v.clone())
    }
}

impl Default for ArrayMap {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assoc_and_get() {
        let m = ArrayMap::empty()
            .assoc(Value::Keyword(crate::symbol::KeywordValue::unqualified("a")), Value::Int(1));
        assert_eq!(
            m.get(&Value::Keyword(crate::symbol::KeywordValue::unqualified("a"))),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn from_pairs_keeps_last_duplicate() {
        let m = ArrayMap::from_pairs(vec![
            (Value::Int(1), Value::Str(Rc::from("first"))),
            (Value::Int(1), Value::Str(Rc::from("second"))),
        ]);
        assert_eq!(m.len(), 1);
        assert_eq!(m.get(&Value::Int(1)), Some(Value::Str(Rc::from("second"))));
    }

    #[test]
    fn dissoc_removes_key() {
        let m = ArrayMap::from_pairs(vec![(Value::Int(1), Value::Int(1))]);
        let m2 = m.dissoc(&Value::Int(1));
        assert!(m2.is_empty());
        assert_eq!(m.len(), 1, "original untouched");
    }
}
