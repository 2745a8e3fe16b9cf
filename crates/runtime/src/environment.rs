//! The runtime environment threaded through every builtin and through both
//! backends: the namespace table, the current lexical scope chain, the
//! cross-backend `Dispatcher`, and per-session state (error context, print
//! settings, interner, arena). Cloning an `Environment` is O(1) — every
//! field is `Rc`-backed — which is how closures capture "the environment at
//! this point" cheaply.

use crate::error::ErrorContext;
use crate::fn_val::{BuiltinFn, Dispatcher, FnVal};
use crate::hierarchy::Hierarchy;
use crate::namespace::Namespace;
use crate::protocol::type_tag;
use crate::symbol::SymbolValue;
use crate::value::Value;
use crate::var::Var;
use quill_core::{Arena, Interner};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// An immutable, persistently-extended lexical scope: `let`/`fn`/`loop`
/// bindings layered as a linked list of frames so that capturing a scope
/// (closing over it) is a cheap `Rc` clone rather than a deep copy.
#[derive(Default)]
pub struct Scope {
    bindings: Vec<(Rc<str>, Value)>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope::default())
    }

    pub fn extend(self: &Rc<Self>, bindings: Vec<(Rc<str>, Value)>) -> Rc<Scope> {
        Rc::new(Scope {
            bindings,
            parent: Some(self.clone()),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some((_, v)) = self.bindings.iter().rev().find(|(n, _)| &**n == name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    /// Every binding visible from here, outermost first, shadowed names kept
    /// only once (the innermost value wins) — what the tree-walk evaluator
    /// copies out at closure-creation time (section 4.7: "capture their
    /// enclosing locals by value").
    pub fn flatten(&self) -> Vec<(Rc<str>, Value)> {
        let mut out = self.parent.as_ref().map(|p| p.flatten()).unwrap_or_default();
        for (name, value) in &self.bindings {
            match out.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = value.clone(),
                None => out.push((name.clone(), value.clone())),
            }
        }
        out
    }
}

#[derive(Clone)]
pub struct Environment {
    pub namespaces: Rc<RefCell<HashMap<Rc<str>, Rc<Namespace>>>>,
    pub current_ns: Rc<RefCell<Rc<str>>>,
    pub locals: Rc<Scope>,
    pub interner: Rc<Interner>,
    pub arena: Rc<RefCell<Arena>>,
    pub dispatcher: Rc<dyn Dispatcher>,
    pub error_context: Rc<RefCell<ErrorContext>>,
    pub print_length: Rc<Cell<Option<usize>>>,
    pub print_level: Rc<Cell<Option<usize>>>,
    /// Section 3.3: one hierarchy shared by every `defmulti` in the session
    /// unless a form installs a private one.
    pub hierarchy: Rc<Hierarchy>,
}

const DEFAULT_MAX_CALL_DEPTH: usize = 2048;

/// `nil` means "no limit"; a non-negative int is the limit; anything else
/// (a negative int, or a value of the wrong type) is treated as "no limit"
/// rather than raised as an error, since `*print-length*`/`*print-level*`
/// are read by the printer, not validated by `set!` itself.
fn print_limit_of(value: &Value) -> Option<usize> {
    match value {
        Value::Int(n) if *n >= 0 => Some(*n as usize),
        _ => None,
    }
}

impl Environment {
    pub fn new(dispatcher: Rc<dyn Dispatcher>) -> Self {
        let namespaces = Rc::new(RefCell::new(HashMap::new()));
        let core = Namespace::new("quill.core");
        let user = Namespace::new("user");
        // Section 6.3: `*print-length*`/`*print-level*` are ordinary
        // dynamic vars from the language's point of view, starting unbound
        // (nil, meaning "no limit") like the `print_length`/`print_level`
        // cells below that the printer actually reads on every call. Referred
        // into `user` the same way `install` refers every builtin, so an
        // unqualified `(set! *print-length* 3)` from the default namespace
        // resolves without needing `quill.core/` qualification.
        for name in ["*print-length*", "*print-level*"] {
            let var = core.define(name, Value::Nil);
            var.set_dynamic(true);
            user.refer(var.name.clone(), var);
        }
        namespaces.borrow_mut().insert(core.name.clone(), core);
        namespaces.borrow_mut().insert(user.name.clone(), user);
        Environment {
            namespaces,
            current_ns: Rc::new(RefCell::new(Rc::from("user"))),
            locals: Scope::root(),
            interner: Rc::new(Interner::new()),
            arena: Rc::new(RefCell::new(Arena::new())),
            dispatcher,
            error_context: Rc::new(RefCell::new(ErrorContext::new(DEFAULT_MAX_CALL_DEPTH))),
            print_length: Rc::new(Cell::new(None)),
            print_level: Rc::new(Cell::new(None)),
            hierarchy: Hierarchy::new(),
        }
    }

    /// A clone of this environment with a different local scope chain —
    /// how `let`, function calls, and `loop` push a fresh binding frame
    /// without disturbing the caller's view of `self`.
    pub fn with_locals(&self, locals: Rc<Scope>) -> Environment {
        Environment {
            locals,
            ..self.clone()
        }
    }

    pub fn push_bindings(&self, bindings: Vec<(Rc<str>, Value)>) -> Environment {
        self.with_locals(self.locals.extend(bindings))
    }

    pub fn current_namespace(&self) -> Rc<Namespace> {
        let name = self.current_ns.borrow().clone();
        self.namespaces
            .borrow()
            .get(&name)
            .cloned()
            .expect("current namespace always exists")
    }

    pub fn find_or_create_namespace(&self, name: impl Into<Rc<str>>) -> Rc<Namespace> {
        let name = name.into();
        let mut namespaces = self.namespaces.borrow_mut();
        namespaces
            .entry(name.clone())
            .or_insert_with(|| Namespace::new(name))
            .clone()
    }

    pub fn set_current_namespace(&self, name: impl Into<Rc<str>>) {
        let name = name.into();
        self.find_or_create_namespace(name.clone());
        *self.current_ns.borrow_mut() = name;
    }

    /// Switches the current namespace for the lifetime of the returned
    /// guard, restoring the previous one on drop — how a fn body resolves
    /// unqualified vars against its `defining_ns` (section 3.5) for the
    /// duration of one call without disturbing the caller's namespace once
    /// the call returns, including on an error return.
    pub fn enter_namespace(&self, ns: Rc<str>) -> NsGuard {
        let previous = self.current_ns.borrow().clone();
        self.set_current_namespace(ns);
        NsGuard {
            cell: self.current_ns.clone(),
            previous,
        }
    }

    pub fn lookup_local(&self, name: &str) -> Option<Value> {
        self.locals.lookup(name)
    }

    /// Resolves a (possibly namespace-qualified) symbol to its var,
    /// checking namespace aliases before giving up.
    pub fn resolve_var(&self, sym: &SymbolValue) -> Option<Rc<Var>> {
        match &sym.ns {
            Some(ns) => {
                let target_ns_name = self
                    .current_namespace()
                    .resolve_alias(ns)
                    .unwrap_or_else(|| ns.clone());
                self.namespaces
                    .borrow()
                    .get(&target_ns_name)
                    .and_then(|namespace| namespace.get_own(&sym.name))
            }
            None => self.current_namespace().resolve(&sym.name),
        }
    }

    /// `*print-length*`/`*print-level*` (section 6.3) are ordinary dynamic
    /// vars from the language's point of view, but every print builtin
    /// reads the cached `print_length`/`print_level` cells directly rather
    /// than resolving a var on each call (`builtins::printing::limits`).
    /// `set!` on either var (both backends, after `Var::set_dynamic_binding`
    /// succeeds) calls this to keep the cache in sync, so a `set!` in
    /// evaluated source actually caps subsequent printing.
    pub fn sync_print_dynamic_var(&self, var: &Var, value: &Value) {
        if var.ns.as_ref() != "quill.core" {
            return;
        }
        match var.name.as_ref() {
            "*print-length*" => self.print_length.set(print_limit_of(value)),
            "*print-level*" => self.print_level.set(print_limit_of(value)),
            _ => {}
        }
    }

    pub fn define_in_current(&self, name: impl Into<Rc<str>>, value: Value) -> Rc<Var> {
        self.current_namespace().define(name, value)
    }

    /// Calls any callable `Value` (a compiled fn or a builtin), bridging to
    /// whichever backend produced it via `dispatcher` when needed. Used by
    /// builtins (`map`, `apply`, `reduce`, lazy seq/delay realization) that
    /// need to call a value without caring which backend produced it.
    pub fn call_value(&mut self, f: &Value, args: &[Value]) -> Result<Value, crate::error::QuillError> {
        match f {
            // Keywords and maps/sets are callable as 1- or 2-arg lookups
            // (`(:shape m)`, `(m :shape)`, `({:a 1} :b :default)`) — the
            // idiom `defmulti` dispatch on a bare keyword (section 8,
            // scenario 9) relies on.
            Value::Keyword(_) => {
                let coll = args.first().cloned().unwrap_or(Value::Nil);
                let not_found = args.get(1).cloned().unwrap_or(Value::Nil);
                crate::builtins::collections::get(&[coll, f.clone(), not_found], self)
            }
            Value::Map(_) | Value::HashMap(_) | Value::Set(_) => {
                let key = args.first().cloned().unwrap_or(Value::Nil);
                let not_found = args.get(1).cloned().unwrap_or(Value::Nil);
                crate::builtins::collections::get(&[f.clone(), key, not_found], self)
            }
            _ => match as_callable(f) {
                Some(Callable::Fn(fn_val)) => {
                    let dispatcher = self.dispatcher.clone();
                    dispatcher.call(&fn_val, args, self)
                }
                Some(Callable::Builtin(builtin)) => builtin.call(args, self),
                Some(Callable::ProtocolFn(proto_fn)) => self.call_protocol_fn(&proto_fn, args),
                Some(Callable::MultiFn(multi)) => self.call_multi_fn(&multi, args),
                None => Err(crate::error::QuillError::type_error(
                    crate::error::Phase::Execute,
                    format!("{} is not callable", f.type_name()),
                )),
            },
        }
    }

    /// Protocol method dispatch: the first argument's `TypeTag` selects the
    /// implementation, through the fn's one-slot cache (section 4.8).
    fn call_protocol_fn(
        &mut self,
        proto_fn: &Rc<crate::protocol::ProtocolFnValue>,
        args: &[Value],
    ) -> Result<Value, crate::error::QuillError> {
        let receiver = args.first().ok_or_else(|| {
            crate::error::QuillError::arity(
                crate::error::Phase::Execute,
                format!("protocol method {} requires at least one argument", proto_fn.method_name),
            )
        })?;
        let tag = type_tag(receiver);
        let method = proto_fn.resolve(&tag).ok_or_else(|| {
            crate::error::QuillError::type_error(
                crate::error::Phase::Execute,
                format!(
                    "no implementation of {} found for type {}",
                    proto_fn.method_name,
                    receiver.type_name()
                ),
            )
        })?;
        self.call_value(&method, args)
    }

    /// Multimethod dispatch: call the dispatch fn to get a dispatch value,
    /// then resolve a method against this session's hierarchy.
    fn call_multi_fn(
        &mut self,
        multi: &Rc<crate::multimethod::MultiFnValue>,
        args: &[Value],
    ) -> Result<Value, crate::error::QuillError> {
        let dispatch_value = self.call_value(&multi.dispatch_fn, args)?;
        let method = multi.get_method(&dispatch_value, &self.hierarchy).ok_or_else(|| {
            crate::error::QuillError::value_error(
                crate::error::Phase::Execute,
                format!(
                    "no method in multimethod {} for dispatch value {}",
                    multi.name, dispatch_value
                ),
            )
        })?;
        self.call_value(&method, args)
    }
}

/// Restores the namespace `Environment::enter_namespace` switched away from.
pub struct NsGuard {
    cell: Rc<RefCell<Rc<str>>>,
    previous: Rc<str>,
}

impl Drop for NsGuard {
    fn drop(&mut self) {
        *self.cell.borrow_mut() = self.previous.clone();
    }
}

/// Either kind of callable value a `Value` can hold, unified for `call`.
pub enum Callable {
    Fn(Rc<FnVal>),
    Builtin(Rc<BuiltinFn>),
    ProtocolFn(Rc<crate::protocol::ProtocolFnValue>),
    MultiFn(Rc<crate::multimethod::MultiFnValue>),
}

pub fn as_callable(value: &Value) -> Option<Callable> {
    match value {
        Value::FnVal(f) => Some(Callable::Fn(f.clone())),
        Value::BuiltinFn(f) => Some(Callable::Builtin(f.clone())),
        Value::ProtocolFn(f) => Some(Callable::ProtocolFn(f.clone())),
        Value::MultiFn(f) => Some(Callable::MultiFn(f.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fn_val::FnVal as RuntimeFnVal;

    struct NullDispatcher;
    impl Dispatcher for NullDispatcher {
        fn call(
            &self,
            _f: &Rc<RuntimeFnVal>,
            _args: &[Value],
            _env: &mut Environment,
        ) -> Result<Value, crate::error::QuillError> {
            unreachable!("not exercised in this test")
        }
    }

    #[test]
    fn bindings_shadow_outer_scope() {
        let env = Environment::new(Rc::new(NullDispatcher));
        let env2 = env.push_bindings(vec![(Rc::from("x"), Value::Int(1))]);
        assert_eq!(env2.lookup_local("x"), Some(Value::Int(1)));
        let env3 = env2.push_bindings(vec![(Rc::from("x"), Value::Int(2))]);
        assert_eq!(env3.lookup_local("x"), Some(Value::Int(2)));
        assert_eq!(env2.lookup_local("x"), Some(Value::Int(1)), "outer scope is untouched");
    }

    #[test]
    fn default_namespace_is_user() {
        let env = Environment::new(Rc::new(NullDispatcher));
        assert_eq!(&*env.current_namespace().name, "user");
    }

    #[test]
    fn keyword_and_map_are_callable_as_lookups() {
        use crate::collections::array_map::ArrayMap;
        use crate::symbol::KeywordValue;

        let mut env = Environment::new(Rc::new(NullDispatcher));
        let key = Value::Keyword(KeywordValue::unqualified("a"));
        let m = Value::Map(ArrayMap::from_pairs(vec![(key.clone(), Value::Int(1))]));

        assert_eq!(env.call_value(&key, &[m.clone()]).unwrap(), Value::Int(1));
        assert_eq!(env.call_value(&m, &[key]).unwrap(), Value::Int(1));

        let missing = Value::Keyword(KeywordValue::unqualified("missing"));
        assert_eq!(env.call_value(&missing, &[m, Value::Int(42)]).unwrap(), Value::Int(42));
    }
}
