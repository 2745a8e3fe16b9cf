//! The native builtin library: every operation implemented directly in
//! Rust rather than in bootstrap Quill source (section 4.9 draws the line
//! at anything needing variadic dispatch over `Value` representations or
//! direct access to a cell type that isn't itself a `Value` constructor —
//! `map`/`filter`/`reduce`/control-flow macros live in the bundled core
//! library instead, see `quill_compiler::core_lib`).
//!
//! `install` interns each builtin as a var in `quill.core` and `refer`s it
//! into `user`, mirroring how a freshly booted session sees the language's
//! primitives already in scope without an explicit `require`.

pub mod arithmetic;
pub mod atoms;
pub mod collections;
pub mod comparison;
pub mod ex;
pub mod hierarchy_ops;
pub mod meta;
pub mod predicates;
pub mod printing;
pub mod regex;
pub mod seq;

use crate::environment::Environment;
use crate::fn_val::BuiltinFn;
use crate::value::Value;
use std::rc::Rc;

/// Collects every native builtin's `Rc<BuiltinFn>` definition, independent
/// of any `Environment` — used both by `install` and by tests that want the
/// raw list without standing up a full session.
pub fn all() -> Vec<Rc<BuiltinFn>> {
    let mut defs = Vec::new();
    arithmetic::register(&mut defs);
    comparison::register(&mut defs);
    predicates::register(&mut defs);
    collections::register(&mut defs);
    atoms::register(&mut defs);
    meta::register(&mut defs);
    ex::register(&mut defs);
    printing::register(&mut defs);
    regex::register(&mut defs);
    seq::register(&mut defs);
    hierarchy_ops::register(&mut defs);
    defs
}

/// Defines every native builtin as a var in `quill.core` and refers it into
/// `user`, the namespace a freshly constructed `Environment` starts in.
pub fn install(env: &Environment) {
    let core = env.find_or_create_namespace("quill.core");
    let user = env.find_or_create_namespace("user");
    let defs = all();
    tracing::debug!(count = defs.len(), "installing native builtins into quill.core");
    for def in defs {
        let var = core.define(def.name.clone(), Value::BuiltinFn(def));
        user.refer(var.name.clone(), var);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fn_val::{Dispatcher as DispatcherTrait, FnVal};
    use crate::error::QuillError;

    struct NullDispatcher;
    impl DispatcherTrait for NullDispatcher {
        fn call(&self, _f: &Rc<FnVal>, _args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
            unreachable!()
        }
    }

    #[test]
    fn install_makes_core_builtins_visible_from_user() {
        let env = Environment::new(Rc::new(NullDispatcher));
        install(&env);
        let user = env.current_namespace();
        assert!(user.resolve("+").is_some());
        assert!(user.resolve("assoc-in").is_some());
        assert!(user.resolve("meta").is_some());
    }

    #[test]
    fn no_two_builtins_share_a_name() {
        let defs = all();
        let mut seen = std::collections::HashSet::new();
        for def in &defs {
            assert!(seen.insert(def.name.clone()), "duplicate builtin name: {}", def.name);
        }
    }
}
