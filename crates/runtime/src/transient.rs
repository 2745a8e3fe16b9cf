//! Transient collections: short-lived, in-place-mutable views produced by
//! `transient` and consumed by `persistent!`. Each cell tracks whether it
//! has already been handed to `persistent!`; every mutator rejects further
//! edits afterward (the language-level rule that a transient must not
//! escape its building scope).
//!
//! `TransientMapCell`/`TransientSetCell` are array-backed like `ArrayMap`
//! rather than wrapping `HMap`: transients are overwhelmingly used to build
//! small-to-medium maps/sets in a tight loop, where a linear scan beats HAMT
//! node churn, and on `persistent!` the result converts to whichever
//! representation the contents warrant.

use crate::collections::array_map::ArrayMap;
use crate::equality::value_eq;
use crate::error::{Phase, QuillError};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn editable_check(edited: &Cell<bool>, what: &str) -> Result<(), QuillError> {
    if edited.get() {
        Err(QuillError::type_error(
            Phase::Execute,
            format!("{what} used after persistent!"),
        ))
    } else {
        Ok(())
    }
}

pub struct TransientVectorCell {
    items: RefCell<Vec<Value>>,
    edited: Cell<bool>,
}

impl TransientVectorCell {
    pub fn new(items: Vec<Value>) -> Rc<Self> {
        Rc::new(TransientVectorCell {
            items: RefCell::new(items),
            edited: Cell::new(false),
        })
    }

    pub fn push(&self, value: Value) -> Result<(), QuillError> {
        editable_check(&self.edited, "transient vector")?;
        self.items.borrow_mut().push(value);
        Ok(())
    }

    pub fn assoc(&self, idx: usize, value: Value) -> Result<(), QuillError> {
        editable_check(&self.edited, "transient vector")?;
        let mut items = self.items.borrow_mut();
        if idx == items.len() {
            items.push(value);
        } else if idx < items.len() {
            items[idx] = value;
        } else {
            return Err(QuillError::index_error(
                Phase::Execute,
                format!("index {idx} out of bounds for transient vector of length {}", items.len()),
            ));
        }
        Ok(())
    }

    pub fn pop(&self) -> Result<(), QuillError> {
        editable_check(&self.edited, "transient vector")?;
        self.items.borrow_mut().pop();
        Ok(())
    }

    pub fn nth(&self, idx: usize) -> Option<Value> {
        self.items.borrow().get(idx).cloned()
    }

    pub fn count(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn to_persistent(&self) -> Vec<Value> {
        self.edited.set(true);
        self.items.borrow().clone()
    }
}

pub struct TransientMapCell {
    entries: RefCell<Vec<(Value, Value)>>,
    edited: Cell<bool>,
}

impl TransientMapCell {
    pub fn new(entries: Vec<(Value, Value)>) -> Rc<Self> {
        Rc::new(TransientMapCell {
            entries: RefCell::new(entries),
            edited: Cell::new(false),
        })
    }

    pub fn assoc(&self, key: Value, value: Value) -> Result<(), QuillError> {
        editable_check(&self.edited, "transient map")?;
        let mut entries = self.entries.borrow_mut();
        match entries.iter_mut().find(|(k, _)| value_eq(k, &key)) {
            Some(slot) => slot.1 = value,
            None => entries.push((key, value)),
        }
        Ok(())
    }

    pub fn dissoc(&self, key: &Value) -> Result<(), QuillError> {
        editable_check(&self.edited, "transient map")?;
        self.entries.borrow_mut().retain(|(k, _)| !value_eq(k, key));
        Ok(())
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries
            .borrow()
            .iter()
            .find(|(k, _)| value_eq(k, key))
            .map(|(_, v)| v.clone())
    }

    pub fn count(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn to_persistent(&self) -> ArrayMap {
        self.edited.set(true);
        ArrayMap::from_pairs(self.entries.borrow().clone())
    }
}

pub struct TransientSetCell {
    items: RefCell<Vec<Value>>,
    edited: Cell<bool>,
}

impl TransientSetCell {
    pub fn new(items: Vec<Value>) -> Rc<Self> {
        Rc::new(TransientSetCell {
            items: RefCell::new(items),
            edited: Cell::new(false),
        })
    }

    pub fn conj(&self, value: Value) -> Result<(), QuillError> {
        editable_check(&self.edited, "transient set")?;
        let mut items = self.items.borrow_mut();
        if !items.iter().any(|v| value_eq(v, &value)) {
            items.push(value);
        }
        Ok(())
    }

    pub fn disj(&self, value: &Value) -> Result<(), QuillError> {
        editable_check(&self.edited, "transient set")?;
        self.items.borrow_mut().retain(|v| !value_eq(v, value));
        Ok(())
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.items.borrow().iter().any(|v| value_eq(v, value))
    }

    pub fn count(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn to_persistent(&self) -> Vec<Value> {
        self.edited.set(true);
        self.items.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_rejects_mutation_after_persistent() {
        let t = TransientVectorCell::new(vec![Value::Int(1)]);
        t.push(Value::Int(2)).unwrap();
        assert_eq!(t.count(), 2);
        let _ = t.to_persistent();
        assert!(t.push(Value::Int(3)).is_err());
    }

    #[test]
    fn map_assoc_overwrites_existing_key() {
        let t = TransientMapCell::new(vec![(Value::Int(1), Value::Int(1))]);
        t.assoc(Value::Int(1), Value::Int(2)).unwrap();
        assert_eq!(t.count(), 1);
        assert_eq!(t.get(&Value::Int(1)), Some(Value::Int(2)));
    }
}
