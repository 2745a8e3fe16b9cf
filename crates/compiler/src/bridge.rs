//! The cross-backend glue: the concrete `Dispatcher` both evaluators share,
//! and the bootstrap loader that reads the bundled core library (section
//! 4.9) into a freshly constructed `Environment` before a session is handed
//! to a caller.

use crate::{analyzer::Analyzer, tree_walk, vm};
use quill_runtime::environment::Environment;
use quill_runtime::error::{Phase, QuillError};
use quill_runtime::fn_val::{Dispatcher, FnKind, FnVal};
use quill_runtime::value::Value;
use std::rc::Rc;

/// Routes a call to whichever backend actually produced the `FnVal`: a
/// closure built by the analyzer+tree-walk path calls back into
/// `tree_walk::call_fn`, one built by `compile_top_level`+`vm::run_top_level`
/// calls back into `vm::call_fn`. Either can end up calling the other —
/// `map` compiled to bytecode calling a tree-walk-evaluated predicate typed
/// at a REPL prompt, say — since both sides only ever see a `Value`.
pub struct QuillDispatcher;

impl Dispatcher for QuillDispatcher {
    fn call(&self, f: &Rc<FnVal>, args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
        match f.kind {
            FnKind::TreeWalk => tree_walk::call_fn(f, args, env),
            FnKind::Bytecode => vm::call_fn(f, args, env),
        }
    }
}

/// Reads and evaluates every top-level form in `source` against `env` in
/// turn, tree-walking each one as soon as it's analyzed — the order
/// `analyze_top_level`'s doc comment calls out as load-bearing for
/// `defmacro`: a macro defined earlier in the source is already callable by
/// the analyzer by the time a later form references it.
pub fn load_source(env: &mut Environment, source: &str, file: Option<Rc<str>>) -> Result<(), QuillError> {
    let forms = quill_reader::read_all_forms(source, file)
        .map_err(|e| QuillError::read(Phase::Read, e.message))?;
    for form in &forms {
        let node = Analyzer::new(env).analyze_top_level(form)?;
        tree_walk::eval(&node, env)?;
    }
    Ok(())
}

/// Builds a fresh session: installs the native builtins, then loads the
/// bundled core library (`defn`, `when`, `cond`, `->`, `map`, `filter`,
/// `reduce`, ...) on top of them, all evaluated through the tree-walk
/// backend since the bootstrap text is ordinary source, not pre-compiled
/// bytecode. Returns a session ready for either `eval.rs` entry point.
pub fn new_session() -> Result<Environment, QuillError> {
    tracing::debug!("bootstrapping a fresh quill session");
    let mut env = Environment::new(Rc::new(QuillDispatcher));
    quill_runtime::builtins::install(&env);
    load_source(&mut env, crate::core_lib::SOURCE, Some(Rc::from("core_lib.quill")))?;
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_has_core_lib_macros_available() {
        let mut env = new_session().unwrap();
        let forms = quill_reader::read_all_forms("(when true 42)", None).unwrap();
        let node = Analyzer::new(&mut env).analyze_top_level(&forms[0]).unwrap();
        assert_eq!(tree_walk::eval(&node, &mut env).unwrap(), Value::Int(42));
    }

    #[test]
    fn map_builtin_from_core_lib_works() {
        let mut env = new_session().unwrap();
        let forms = quill_reader::read_all_forms("(first (map inc [1 2 3]))", None).unwrap();
        let node = Analyzer::new(&mut env).analyze_top_level(&forms[0]).unwrap();
        assert_eq!(tree_walk::eval(&node, &mut env).unwrap(), Value::Int(2));

        let forms2 = quill_reader::read_all_forms("(first (rest (rest (map inc [1 2 3]))))", None).unwrap();
        let node2 = Analyzer::new(&mut env).analyze_top_level(&forms2[0]).unwrap();
        assert_eq!(tree_walk::eval(&node2, &mut env).unwrap(), Value::Int(4));
    }
}
