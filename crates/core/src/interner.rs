//! Global interner for symbol and keyword names.
//!
//! Every `Value::Symbol`/`Value::Keyword` stores its namespace and name as
//! interned `Rc<str>` handles. Interning means two symbols with the same text
//! share one allocation and a `Rc::ptr_eq` fast path is available before
//! falling back to content comparison (see `quill_runtime::equality`).

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// A single-threaded string interner.
///
/// Owned by the `Environment` (one per evaluation session) rather than a
/// process-global, per the design note against reintroducing global mutable
/// state.
pub struct Interner {
    table: RefCell<HashSet<Rc<str>>>,
}

impl Interner {
    pub fn new() -> Self {
        Interner {
            table: RefCell::new(HashSet::new()),
        }
    }

    /// Intern `s`, returning the shared handle. If an equal string is already
    /// interned, its existing `Rc` is cloned instead of allocating again.
    pub fn intern(&self, s: &str) -> Rc<str> {
        if let Some(existing) = self.table.borrow().get(s) {
            return Rc::clone(existing);
        }
        let rc: Rc<str> = Rc::from(s);
        self.table.borrow_mut().insert(Rc::clone(&rc));
        rc
    }

    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.borrow().is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedups() {
        let interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("foo");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn distinct_strings_are_distinct() {
        let interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("bar");
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 2);
    }
}
