//! `Value::LazySeq`: the result of `lazy-seq`, realized at most once on
//! first access (`first`/`rest`/`seq`) and cached thereafter. Mirrors
//! `DelayCell`'s force-once shape but the realized payload is itself a seq
//! (`Nil`, `List`, `Cons`, or `ChunkedCons`), not an arbitrary value.

use crate::error::{Phase, QuillError};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

enum LazyState {
    Pending(Value),
    Realizing,
    Realized(Value),
}

pub struct LazySeqCell {
    state: RefCell<LazyState>,
}

impl LazySeqCell {
    pub fn new(thunk: Value) -> Rc<Self> {
        Rc::new(LazySeqCell {
            state: RefCell::new(LazyState::Pending(thunk)),
        })
    }

    pub fn is_realized(&self) -> bool {
        matches!(&*self.state.borrow(), LazyState::Realized(_))
    }

    /// Returns the realized seq if already forced, without forcing it.
    /// Used by `equality.rs` so that comparing values never has the side
    /// effect of realizing a lazy seq.
    pub fn peek(&self) -> Option<Value> {
        match &*self.state.borrow() {
            LazyState::Realized(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn realize(
        &self,
        call: impl FnOnce(Value) -> Result<Value, QuillError>,
    ) -> Result<Value, QuillError> {
        {
            match &*self.state.borrow() {
                LazyState::Realized(v) => return Ok(v.clone()),
                LazyState::Realizing => {
                    return Err(QuillError::state_error(
                        Phase::Execute,
                        "lazy seq realized recursively from within its own thunk",
                    ));
                }
                LazyState::Pending(_) => {}
            }
        }
        let thunk = match self.state.replace(LazyState::Realizing) {
            LazyState::Pending(thunk) => thunk,
            _ => unreachable!("checked above"),
        };
        let result = call(thunk)?;
        *self.state.borrow_mut() = LazyState::Realized(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_before_realize_is_none() {
        let seq = LazySeqCell::new(Value::Nil);
        assert!(seq.peek().is_none());
        seq.realize(|_| Ok(Value::Nil)).unwrap();
        assert!(seq.peek().is_some());
    }
}
