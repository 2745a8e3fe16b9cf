//! Function values and the cross-backend call bridge.
//!
//! A function produced by the analyzer can be run by either the bytecode VM
//! or the tree-walk evaluator, and either backend can end up calling a
//! function produced by the other (a VM-compiled `map` calling a
//! tree-walk-evaluated predicate passed in from a REPL session, say).
//! `quill-runtime` cannot depend on `quill-compiler` (which depends on
//! `quill-runtime` for `Value`), so `FnVal` stores its compiled body behind
//! `Rc<dyn Any>` and the actual call goes through the `Dispatcher` trait
//! object that `Environment` carries — implemented by `quill-compiler`'s
//! bridge module, which knows how to downcast `proto` back to its concrete
//! `Node`/`Chunk`+`FnProto` type and drive the right backend.

use crate::environment::Environment;
use crate::error::QuillError;
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    TreeWalk,
    Bytecode,
}

/// One accepted arity: either a fixed parameter count, or a variadic arity
/// accepting `min` or more arguments.
#[derive(Debug, Clone, Copy)]
pub enum Arity {
    Fixed(usize),
    Variadic { min: usize },
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Fixed(k) => *k == n,
            Arity::Variadic { min } => n >= *min,
        }
    }
}

pub struct FnVal {
    pub name: Option<Rc<str>>,
    pub arities: Vec<Arity>,
    pub kind: FnKind,
    pub is_macro: bool,
    /// Type-erased compiled body: a `quill_compiler::node::Node` (tree-walk)
    /// or `Rc<quill_compiler::bytecode::FnProto>` (bytecode), downcast by
    /// the `Dispatcher` implementation that actually calls it.
    pub proto: Rc<dyn Any>,
    /// Values copied out of the enclosing scope at closure-creation time
    /// (section 4.7: "capture their enclosing locals by value"). The
    /// bytecode backend loads these into the new frame's first slots in
    /// order; the tree-walk backend looks them up by name, so both carry
    /// the originating name alongside the value.
    pub captured: Vec<(Rc<str>, Value)>,
    /// The namespace this fn was defined in. Unqualified var lookups inside
    /// the body resolve against this, not the caller's current namespace
    /// (section 3.5) — a function called from another namespace must still
    /// see its own namespace's `def`s and `refer`s.
    pub defining_ns: Rc<str>,
}

impl fmt::Debug for FnVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnVal")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_macro", &self.is_macro)
            .finish_non_exhaustive()
    }
}

impl FnVal {
    pub fn accepts_arity(&self, n: usize) -> bool {
        self.arities.iter().any(|a| a.accepts(n))
    }

    /// Picks the matching arity with ties broken toward the exact fixed
    /// arity over a variadic one that happens to also accept `n` (so
    /// `(defn f ([a] :one) ([a & rest] :many))` called with one argument
    /// dispatches to the fixed-arity clause).
    pub fn matching_arity(&self, n: usize) -> Option<&Arity> {
        self.arities
            .iter()
            .find(|a| matches!(a, Arity::Fixed(k) if *k == n))
            .or_else(|| self.arities.iter().find(|a| a.accepts(n)))
    }
}

pub type BuiltinImpl = fn(&[Value], &mut Environment) -> Result<Value, QuillError>;

pub struct BuiltinFn {
    pub name: Rc<str>,
    pub arities: Vec<Arity>,
    pub func: BuiltinImpl,
}

impl fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinFn").field("name", &self.name).finish()
    }
}

impl BuiltinFn {
    pub fn new(name: impl Into<Rc<str>>, arities: Vec<Arity>, func: BuiltinImpl) -> Rc<Self> {
        Rc::new(BuiltinFn {
            name: name.into(),
            arities,
            func,
        })
    }

    pub fn accepts_arity(&self, n: usize) -> bool {
        self.arities.iter().any(|a| a.accepts(n))
    }

    pub fn call(&self, args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
        (self.func)(args, env)
    }
}

/// Bridges a call into whichever backend actually compiled `f`. Implemented
/// once by `quill-compiler`, stored in every `Environment` as
/// `Rc<dyn Dispatcher>`, and invoked by builtins (`map`, `apply`, `reduce`,
/// protocol/multimethod dispatch, `force`) that need to call a `Value`
/// without knowing or caring which backend produced it.
pub trait Dispatcher {
    fn call(
        &self,
        f: &Rc<FnVal>,
        args: &[Value],
        env: &mut Environment,
    ) -> Result<Value, QuillError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_arity_is_preferred_over_variadic() {
        let arities = vec![Arity::Fixed(1), Arity::Variadic { min: 1 }];
        let fn_val = FnVal {
            name: None,
            arities,
            kind: FnKind::TreeWalk,
            is_macro: false,
            proto: Rc::new(()),
            captured: Vec::new(),
            defining_ns: Rc::from("user"),
        };
        assert!(matches!(fn_val.matching_arity(1), Some(Arity::Fixed(1))));
        assert!(matches!(
            fn_val.matching_arity(3),
            Some(Arity::Variadic { min: 1 })
        ));
    }
}
