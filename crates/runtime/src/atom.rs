//! `atom`, `volatile!`, and `delay` cells.
//!
//! Atoms and volatiles are both single-cell mutable references; the
//! difference the spec draws is atoms participate in `compare-and-set!`
//! semantics (still just a plain compare-and-swap here, since there is no
//! multi-threaded contention to resolve) while volatiles are a bare `@`/
//! `vreset!` cell with no compare-and-swap API at all.

use crate::collections::array_map::ArrayMap;
use crate::equality::value_eq;
use crate::error::{Phase, QuillError};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub struct AtomCell {
    value: RefCell<Value>,
    meta: RefCell<Option<ArrayMap>>,
    validator: RefCell<Option<Value>>,
    /// `(watch_key, watch_fn)` pairs, fired in registration order after the
    /// new value is installed (section 5: "ordering guarantees").
    watchers: RefCell<Vec<(Value, Value)>>,
}

/// A rejected validator is reported the same way across `reset!`/`swap!`,
/// matching the state-error kind used elsewhere for illegal mutations.
fn validator_rejected() -> QuillError {
    QuillError::state_error(Phase::Execute, "validator rejected new value for atom")
}

impl AtomCell {
    pub fn new(value: Value) -> Rc<Self> {
        Rc::new(AtomCell {
            value: RefCell::new(value),
            meta: RefCell::new(None),
            validator: RefCell::new(None),
            watchers: RefCell::new(Vec::new()),
        })
    }

    pub fn deref(&self) -> Value {
        self.value.borrow().clone()
    }

    pub fn validator(&self) -> Option<Value> {
        self.validator.borrow().clone()
    }

    pub fn set_validator(&self, validator: Option<Value>) {
        *self.validator.borrow_mut() = validator;
    }

    pub fn add_watch(&self, key: Value, watch_fn: Value) {
        let mut watchers = self.watchers.borrow_mut();
        match watchers.iter_mut().find(|(k, _)| value_eq(k, &key)) {
            Some(slot) => slot.1 = watch_fn,
            None => watchers.push((key, watch_fn)),
        }
    }

    pub fn remove_watch(&self, key: &Value) {
        self.watchers.borrow_mut().retain(|(k, _)| !value_eq(k, key));
    }

    pub fn watchers(&self) -> Vec<(Value, Value)> {
        self.watchers.borrow().clone()
    }

    /// Runs the validator (if any) against a candidate new value, without
    /// installing it. Shared by `reset!`/`swap!`/`compare-and-set!` so every
    /// mutation path enforces the same rule.
    fn check_validator(
        &self,
        candidate: &Value,
        run: impl FnOnce(&Value, &Value) -> Result<Value, QuillError>,
    ) -> Result<(), QuillError> {
        if let Some(validator) = self.validator() {
            let old = self.deref();
            let ok = run(&validator, candidate)?;
            let _ = old;
            if !ok.is_truthy() {
                return Err(validator_rejected());
            }
        }
        Ok(())
    }

    /// `reset!`: validator-checked direct set, firing watchers afterward.
    pub fn reset(
        &self,
        value: Value,
        call_validator: impl FnOnce(&Value, &Value) -> Result<Value, QuillError>,
        mut fire_watch: impl FnMut(&Value, &Value, &Value, &Value) -> Result<(), QuillError>,
    ) -> Result<Value, QuillError> {
        self.check_validator(&value, call_validator)?;
        let old = self.deref();
        *self.value.borrow_mut() = value.clone();
        for (key, watch_fn) in self.watchers() {
            fire_watch(&key, &watch_fn, &old, &value)?;
        }
        Ok(value)
    }

    /// `compare-and-set!`: swaps only if the current value is identical (by
    /// the same equality rules as `=`) to `expected`. Does not run the
    /// validator or watchers — matching the reference semantics that CAS is
    /// a raw low-level primitive.
    pub fn compare_and_set(&self, expected: &Value, new: Value) -> bool {
        let mut slot = self.value.borrow_mut();
        if value_eq(&slot, expected) {
            *slot = new;
            true
        } else {
            false
        }
    }

    /// Applies `f` to the current value, validates, stores, and fires
    /// watchers. Retrying is unnecessary here (single-threaded, no
    /// contention) so this is a direct read-modify-write.
    pub fn swap(
        &self,
        f: impl FnOnce(Value) -> Result<Value, QuillError>,
        call_validator: impl FnOnce(&Value, &Value) -> Result<Value, QuillError>,
        mut fire_watch: impl FnMut(&Value, &Value, &Value, &Value) -> Result<(), QuillError>,
    ) -> Result<Value, QuillError> {
        let old = self.deref();
        let next = f(old.clone())?;
        self.check_validator(&next, call_validator)?;
        *self.value.borrow_mut() = next.clone();
        for (key, watch_fn) in self.watchers() {
            fire_watch(&key, &watch_fn, &old, &next)?;
        }
        Ok(next)
    }

    pub fn meta(&self) -> Option<ArrayMap> {
        self.meta.borrow().clone()
    }

    pub fn set_meta(&self, meta: ArrayMap) {
        *self.meta.borrow_mut() = Some(meta);
    }
}

pub struct VolatileCell {
    value: RefCell<Value>,
}

impl VolatileCell {
    pub fn new(value: Value) -> Rc<Self> {
        Rc::new(VolatileCell {
            value: RefCell::new(value),
        })
    }

    pub fn deref(&self) -> Value {
        self.value.borrow().clone()
    }

    pub fn reset(&self, value: Value) -> Value {
        *self.value.borrow_mut() = value.clone();
        value
    }
}

enum DelayState {
    Pending(Value),
    Forcing,
    Forced(Value),
}

pub struct DelayCell {
    state: RefCell<DelayState>,
}

impl DelayCell {
    pub fn new(thunk: Value) -> Rc<Self> {
        Rc::new(DelayCell {
            state: RefCell::new(DelayState::Pending(thunk)),
        })
    }

    pub fn is_realized(&self) -> bool {
        matches!(&*self.state.borrow(), DelayState::Forced(_))
    }

    /// Forces the delay, invoking `call` (a zero-arg function call into
    /// whichever backend produced the thunk) at most once.
    pub fn force(
        &self,
        call: impl FnOnce(Value) -> Result<Value, QuillError>,
    ) -> Result<Value, QuillError> {
        {
            let state = self.state.borrow();
            match &*state {
                DelayState::Forced(v) => return Ok(v.clone()),
                DelayState::Forcing => {
                    return Err(QuillError::state_error(
                        Phase::Execute,
                        "delay forced recursively from within its own thunk",
                    ));
                }
                DelayState::Pending(_) => {}
            }
        }
        let thunk = match self.state.replace(DelayState::Forcing) {
            DelayState::Pending(thunk) => thunk,
            _ => unreachable!("checked above"),
        };
        let result = call(thunk)?;
        *self.state.borrow_mut() = DelayState::Forced(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_and_set_only_swaps_on_match() {
        let atom = AtomCell::new(Value::Int(1));
        assert!(!atom.compare_and_set(&Value::Int(2), Value::Int(3)));
        assert_eq!(atom.deref(), Value::Int(1));
        assert!(atom.compare_and_set(&Value::Int(1), Value::Int(3)));
        assert_eq!(atom.deref(), Value::Int(3));
    }

    #[test]
    fn reset_rejected_by_validator_leaves_value_untouched() {
        let atom = AtomCell::new(Value::Int(1));
        atom.set_validator(Some(Value::Bool(false)));
        let no_op_validator = |_validator: &Value, _candidate: &Value| Ok(Value::Bool(false));
        let err = atom
            .reset(Value::Int(2), no_op_validator, |_, _, _, _| Ok(()))
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::StateError);
        assert_eq!(atom.deref(), Value::Int(1));
    }

    #[test]
    fn swap_fires_watchers_with_old_and_new_value() {
        let atom = AtomCell::new(Value::Int(1));
        atom.add_watch(Value::Keyword(crate::symbol::KeywordValue::unqualified("w")), Value::Nil);
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        let ok_validator = |_v: &Value, _c: &Value| Ok(Value::Bool(true));
        atom.swap(
            |old| Ok(Value::Int(match old {
                Value::Int(n) => n + 1,
                _ => 0,
            })),
            ok_validator,
            |_key, _f, old, new| {
                *seen2.borrow_mut() = Some((old.clone(), new.clone()));
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(atom.deref(), Value::Int(2));
        assert_eq!(*seen.borrow(), Some((Value::Int(1), Value::Int(2))));
    }

    #[test]
    fn delay_forces_exactly_once() {
        let calls = Rc::new(Cell::new(0));
        let delay = DelayCell::new(Value::Int(0));
        let calls2 = calls.clone();
        let force_once = |_thunk: Value| -> Result<Value, QuillError> {
            calls2.set(calls2.get() + 1);
            Ok(Value::Int(42))
        };
        assert_eq!(delay.force(force_once).unwrap(), Value::Int(42));
        let calls3 = calls.clone();
        assert_eq!(
            delay
                .force(|_| -> Result<Value, QuillError> {
                    calls3.set(calls3.get() + 1);
                    Ok(Value::Int(0))
                })
                .unwrap(),
            Value::Int(42)
        );
        assert_eq!(calls.get(), 1);
    }
}
