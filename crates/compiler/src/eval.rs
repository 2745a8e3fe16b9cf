//! The public evaluator surface (section 6.1): `eval_string` (tree-walk),
//! `eval_string_vm` (bytecode), and `eval_compare`, which runs both
//! backends over the same source and reports whether they agree — the
//! harness section 8's parity property (`tree_walk(n, s) ≍ vm(compile(n),
//! s)`) is built around.
//!
//! Each call here reads and evaluates every top-level form in `source` in
//! turn against a freshly bootstrapped `Environment` (see `bridge::new_session`),
//! mirroring how `bridge::load_source` drives the core library itself:
//! a `def`/`defmacro` in form `i` must be visible to form `j > i` (section
//! 5: "ordering guarantees").

use crate::analyzer::Analyzer;
use crate::compile::compile_top_level;
use crate::{tree_walk, vm};
use quill_runtime::environment::Environment;
use quill_runtime::error::{Phase, QuillError};
use quill_runtime::value::Value;

/// Evaluates every top-level form in `source` against a fresh session
/// using the tree-walking backend, returning the last form's value (`nil`
/// for an empty source text).
pub fn eval_string(source: &str) -> Result<Value, QuillError> {
    let mut env = crate::bridge::new_session()?;
    eval_string_in(source, &mut env)
}

/// Same as `eval_string` but every top-level form is compiled to bytecode
/// and run on the VM.
pub fn eval_string_vm(source: &str) -> Result<Value, QuillError> {
    let mut env = crate::bridge::new_session()?;
    eval_string_vm_in(source, &mut env)
}

/// Runs `source` through both backends against independent, identically
/// bootstrapped sessions and reports whether they agree, per section 8's
/// compare harness (scenario 11).
pub fn eval_compare(source: &str) -> Result<CompareResult, QuillError> {
    let mut tw_env = crate::bridge::new_session()?;
    let mut vm_env = crate::bridge::new_session()?;
    let tw = eval_string_in(source, &mut tw_env);
    let vm = eval_string_vm_in(source, &mut vm_env);
    let matches = match (&tw, &vm) {
        (Ok(a), Ok(b)) => quill_runtime::equality::value_eq(a, b),
        (Err(a), Err(b)) => a.kind == b.kind,
        _ => false,
    };
    Ok(CompareResult { tw, vm, matches })
}

/// The outcome of `eval_compare`: both backends' results side by side plus
/// whether they agree (by value equality on success, by `ErrorKind` on a
/// shared failure).
pub struct CompareResult {
    pub tw: Result<Value, QuillError>,
    pub vm: Result<Value, QuillError>,
    pub matches: bool,
}

fn eval_string_in(source: &str, env: &mut Environment) -> Result<Value, QuillError> {
    let forms = quill_reader::read_all_forms(source, None).map_err(|e| QuillError::read(Phase::Read, e.message))?;
    let mut result = Value::Nil;
    for form in &forms {
        let node = Analyzer::new(env).analyze_top_level(form)?;
        result = tree_walk::eval(&node, env)?;
    }
    Ok(result)
}

fn eval_string_vm_in(source: &str, env: &mut Environment) -> Result<Value, QuillError> {
    let forms = quill_reader::read_all_forms(source, None).map_err(|e| QuillError::read(Phase::Read, e.message))?;
    let mut result = Value::Nil;
    for form in &forms {
        let node = Analyzer::new(env).analyze_top_level(form)?;
        let chunk = compile_top_level(&node).map_err(|e| {
            QuillError::new(quill_runtime::error::ErrorKind::ValueError, Phase::Compile, e.to_string())
        })?;
        result = vm::run_top_level(&chunk, env)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_both_backends() {
        assert_eq!(eval_string("(+ 1 2)").unwrap(), Value::Int(3));
        assert_eq!(eval_string_vm("(+ 1 2)").unwrap(), Value::Int(3));
    }

    #[test]
    fn def_is_visible_to_later_forms() {
        assert_eq!(eval_string("(def x 10) (+ x 5)").unwrap(), Value::Int(15));
        assert_eq!(eval_string_vm("(def x 10) (+ x 5)").unwrap(), Value::Int(15));
    }

    #[test]
    fn loop_recur_sums_to_ten() {
        let src = "(loop [i 0 s 0] (if (= i 10) s (recur (+ i 1) (+ s i))))";
        assert_eq!(eval_string(src).unwrap(), Value::Int(45));
        assert_eq!(eval_string_vm(src).unwrap(), Value::Int(45));
    }

    #[test]
    fn map_over_a_list_is_sequentially_equal() {
        let src = "(defn add1 [x] (+ x 1)) (map add1 (list 1 2 3))";
        let tw = eval_string(src).unwrap();
        let expected = eval_string("(list 2 3 4)").unwrap();
        assert!(quill_runtime::equality::value_eq(&tw, &expected));
    }

    #[test]
    fn try_catch_reads_ex_data() {
        let src = r#"(try (throw (ex-info "boom" {:code 42})) (catch Exception e (:code (ex-data e))))"#;
        assert_eq!(eval_string(src).unwrap(), Value::Int(42));
        assert_eq!(eval_string_vm(src).unwrap(), Value::Int(42));
    }

    #[test]
    fn swap_on_an_atom() {
        let src = "(let [a (atom 10)] (swap! a (fn [x] (+ x 5))) @a)";
        assert_eq!(eval_string(src).unwrap(), Value::Int(15));
        assert_eq!(eval_string_vm(src).unwrap(), Value::Int(15));
    }

    #[test]
    fn multi_arity_fn_dispatches_on_arg_count() {
        let src = "((fn ([x] x) ([x y] (+ x y))) 3 4)";
        assert_eq!(eval_string(src).unwrap(), Value::Int(7));
        let src2 = "((fn ([x] x) ([x y] (+ x y))) 5)";
        assert_eq!(eval_string(src2).unwrap(), Value::Int(5));
    }

    #[test]
    fn destructuring_keys_or_and_rest() {
        assert_eq!(eval_string("(let [{:keys [a] :or {a 99}} {}] a)").unwrap(), Value::Int(99));
        assert_eq!(eval_string("(let [[a & r] [1 2 3]] (count r))").unwrap(), Value::Int(2));
    }

    #[test]
    fn compare_harness_agrees_on_a_basic_form() {
        let result = eval_compare("(+ 1 2)").unwrap();
        assert!(result.matches);
    }

    #[test]
    fn keyword_and_map_are_callable_as_lookups() {
        assert_eq!(eval_string("(:a {:a 1 :b 2})").unwrap(), Value::Int(1));
        assert_eq!(eval_string("({:a 1 :b 2} :b)").unwrap(), Value::Int(2));
        assert_eq!(eval_string("(:missing {:a 1} 42)").unwrap(), Value::Int(42));
    }

    #[test]
    fn set_print_length_caps_pr_str_from_the_language() {
        let src = r#"(do (set! *print-length* 2) (pr-str [1 2 3 4]))"#;
        assert_eq!(eval_string(src).unwrap(), Value::Str("[1 2 ...]".into()));
        assert_eq!(eval_string_vm(src).unwrap(), Value::Str("[1 2 ...]".into()));
    }

    #[test]
    fn defmulti_dispatches_on_a_keyword_key() {
        let src = r#"
            (defmulti area :shape)
            (defmethod area :rect [s] (* (:width s) (:height s)))
            (defmethod area :square [s] (* (:side s) (:side s)))
            (area {:shape :rect :width 3 :height 4})
        "#;
        assert_eq!(eval_string(src).unwrap(), Value::Int(12));
        assert_eq!(eval_string_vm(src).unwrap(), Value::Int(12));
    }

    #[test]
    fn defprotocol_and_extend_type_dispatch_on_the_receiver_type() {
        let src = r#"
            (defprotocol Greet (greet [this]))
            (extend-type string Greet (greet [this] (str "Hello, " this "!")))
            (greet "World")
        "#;
        assert_eq!(eval_string(src).unwrap(), Value::Str("Hello, World!".into()));
        assert_eq!(eval_string_vm(src).unwrap(), Value::Str("Hello, World!".into()));
    }
}
