//! Vars: the mutable, namespace-owned storage cells that `def`/`defn`
//! create. A non-dynamic var has exactly one value, the root; a dynamic var
//! additionally supports a stack of thread-local-style bindings pushed by
//! `binding` forms. Since multi-threaded execution is out of scope, the
//! binding stack is a plain `Vec` rather than an actual thread-local.

use crate::collections::array_map::ArrayMap;
use crate::error::{Phase, QuillError};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub struct Var {
    pub ns: Rc<str>,
    pub name: Rc<str>,
    root: RefCell<Value>,
    bindings: RefCell<Vec<Value>>,
    dynamic: Cell<bool>,
    /// Set by `defmacro`; checked by the analyzer to decide whether a call
    /// to this var's symbol should go through macro expansion instead of
    /// being analyzed as an ordinary call.
    macro_flag: Cell<bool>,
    /// Set by `:private` metadata on `def`; `quill-compiler`'s analyzer
    /// rejects qualified references to a private var from another
    /// namespace.
    private: Cell<bool>,
    /// Set by `def` with `:const` metadata; `set!`/`swap!`-style rebinding
    /// of a const var is a value error regardless of `dynamic`.
    const_flag: Cell<bool>,
    meta: RefCell<Option<ArrayMap>>,
}

impl Var {
    pub fn new(ns: impl Into<Rc<str>>, name: impl Into<Rc<str>>, root: Value) -> Rc<Self> {
        Rc::new(Var {
            ns: ns.into(),
            name: name.into(),
            root: RefCell::new(root),
            bindings: RefCell::new(Vec::new()),
            dynamic: Cell::new(false),
            macro_flag: Cell::new(false),
            private: Cell::new(false),
            const_flag: Cell::new(false),
            meta: RefCell::new(None),
        })
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic.get()
    }

    pub fn set_dynamic(&self, dynamic: bool) {
        self.dynamic.set(dynamic);
    }

    pub fn is_macro(&self) -> bool {
        self.macro_flag.get()
    }

    pub fn set_macro(&self, is_macro: bool) {
        self.macro_flag.set(is_macro);
    }

    pub fn is_private(&self) -> bool {
        self.private.get()
    }

    pub fn set_private(&self, private: bool) {
        self.private.set(private);
    }

    pub fn is_const(&self) -> bool {
        self.const_flag.get()
    }

    pub fn set_const(&self, is_const: bool) {
        self.const_flag.set(is_const);
    }

    pub fn meta(&self) -> Option<ArrayMap> {
        self.meta.borrow().clone()
    }

    pub fn set_meta(&self, meta: ArrayMap) {
        *self.meta.borrow_mut() = Some(meta);
    }

    /// The var's current value: the innermost thread-local binding if one is
    /// pushed, otherwise the root.
    pub fn get(&self) -> Value {
        self.bindings
            .borrow()
            .last()
            .cloned()
            .unwrap_or_else(|| self.root.borrow().clone())
    }

    pub fn set_root(&self, value: Value) {
        *self.root.borrow_mut() = value;
    }

    pub fn push_binding(&self, value: Value) {
        self.bindings.borrow_mut().push(value);
    }

    pub fn pop_binding(&self) {
        self.bindings.borrow_mut().pop();
    }

    /// `set!`: mutates the innermost binding if one exists, otherwise
    /// requires the var be `:dynamic` and currently bound (matching the
    /// rule that `set!` on a non-dynamic var outside a binding frame is a
    /// value error, not a silent root mutation).
    pub fn set_dynamic_binding(&self, value: Value) -> Result<(), QuillError> {
        let mut bindings = self.bindings.borrow_mut();
        if let Some(slot) = bindings.last_mut() {
            *slot = value;
            return Ok(());
        }
        drop(bindings);
        if self.dynamic.get() {
            self.root.replace(value);
            Ok(())
        } else {
            Err(QuillError::value_error(
                Phase::Execute,
                format!(
                    "can't set! non-dynamic var #'{}/{} outside a binding frame",
                    self.ns, self.name
                ),
            ))
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.ns, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_falls_back_to_root() {
        let v = Var::new("user", "x", Value::Int(1));
        assert_eq!(v.get(), Value::Int(1));
    }

    #[test]
    fn binding_shadows_root() {
        let v = Var::new("user", "x", Value::Int(1));
        v.push_binding(Value::Int(2));
        assert_eq!(v.get(), Value::Int(2));
        v.pop_binding();
        assert_eq!(v.get(), Value::Int(1));
    }

    #[test]
    fn set_on_non_dynamic_without_binding_is_an_error() {
        let v = Var::new("user", "x", Value::Int(1));
        assert!(v.set_dynamic_binding(Value::Int(2)).is_err());
    }

    #[test]
    fn set_on_dynamic_root_is_allowed() {
        let v = Var::new("user", "x", Value::Int(1));
        v.set_dynamic(true);
        assert!(v.set_dynamic_binding(Value::Int(2)).is_ok());
        assert_eq!(v.get(), Value::Int(2));
    }
}
