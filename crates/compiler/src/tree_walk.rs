//! The tree-walking evaluator (section 4.7): runs an analyzed `Node`
//! directly against `Environment`'s persistent `Scope` chain, with no
//! compiled intermediate form. The companion to `vm.rs`'s bytecode path —
//! both share `Value`, `Environment`, and the `QuillError` model, and
//! `bridge::Dispatcher` lets either backend call into the other.
//!
//! Rust's own call stack and `Result`/`?` do double duty here as the
//! exception mechanism: a `throw` becomes an `Err(QuillError)`, and `try`
//! just matches on the `Result` its body evaluates to. The bytecode VM
//! can't get away with that (its frames are heap-allocated, not
//! Rust-stack-recursive) which is why `vm.rs` needs an explicit handler
//! stack where this file needs none.

use crate::node::{FnArity, Node, NodeKind};
use quill_runtime::collections::array_map::ArrayMap;
use quill_runtime::collections::PList;
use quill_runtime::environment::{Environment, Scope};
use quill_runtime::error::{CallFrame, Phase, QuillError};
use quill_runtime::fn_val::{Arity, FnKind, FnVal};
use quill_runtime::lazy_seq::LazySeqCell;
use quill_runtime::multimethod::MultiFnValue;
use quill_runtime::protocol::{type_tag_from_name, ProtocolFnValue, ProtocolValue};
use quill_runtime::symbol::{KeywordValue, SymbolValue};
use quill_runtime::value::Value;
use quill_runtime::var::Var;
use std::rc::Rc;

/// What evaluating a node in tail position produced: an ordinary value, or
/// a `recur` whose arguments haven't been rebound into a fresh iteration
/// yet. Only `Loop` and a bare self-recursive `fn` body ever consume a
/// `Flow::Recur` — everywhere else it has to bubble out as an error.
enum Flow {
    Value(Value),
    Recur(Vec<Value>),
}

/// The tree-walk backend's stand-in for a compiled chunk: just the
/// analyzed arities, downcast back out of `FnVal::proto` when the function
/// is actually called.
pub struct TreeWalkProto {
    pub arities: Vec<FnArity>,
}

/// Evaluates `node`, erroring if a `recur` escapes to here without an
/// enclosing `loop` or fn body to catch it.
pub fn eval(node: &Node, env: &mut Environment) -> Result<Value, QuillError> {
    match eval_tail(node, env)? {
        Flow::Value(v) => Ok(v),
        Flow::Recur(_) => Err(QuillError::value_error(
            Phase::Execute,
            "can only recur from tail position of a loop or fn",
        )
        .with_location(node.loc.clone())),
    }
}

fn eval_all(nodes: &[Rc<Node>], env: &mut Environment) -> Result<Vec<Value>, QuillError> {
    nodes.iter().map(|n| eval(n, env)).collect()
}

fn resolve_var(env: &Environment, ns: &Option<Rc<str>>, name: &Rc<str>, loc: &quill_core::SourceLocation) -> Result<Rc<Var>, QuillError> {
    let sym = SymbolValue {
        ns: ns.clone(),
        name: name.clone(),
        meta: Default::default(),
    };
    env.resolve_var(&sym)
        .ok_or_else(|| QuillError::name_error(Phase::Execute, format!("unable to resolve var: {sym}")).with_location(loc.clone()))
}

/// Builds the closure `Value` a `Fn`/`LazySeq`/`DefMethod`/`ExtendType`
/// node produces: captures the caller's current locals by value (section
/// 4.7: "capture their enclosing locals by value") and remembers the
/// defining namespace so the body's unqualified var lookups stay anchored
/// to it regardless of who ends up calling it.
fn build_fn_value(name: Option<Rc<str>>, arities: &[FnArity], env: &Environment) -> Value {
    let arity_kinds: Vec<Arity> = arities
        .iter()
        .map(|a| {
            if a.variadic {
                Arity::Variadic { min: a.params.len().saturating_sub(1) }
            } else {
                Arity::Fixed(a.params.len())
            }
        })
        .collect();
    let proto = Rc::new(TreeWalkProto { arities: arities.to_vec() });
    Value::FnVal(Rc::new(FnVal {
        name,
        arities: arity_kinds,
        kind: FnKind::TreeWalk,
        is_macro: false,
        proto,
        captured: env.locals.flatten(),
        defining_ns: env.current_namespace().name.clone(),
    }))
}

fn eval_tail(node: &Node, env: &mut Environment) -> Result<Flow, QuillError> {
    let loc = &node.loc;
    match &node.kind {
        NodeKind::Constant(v) | NodeKind::Quote(v) => Ok(Flow::Value(v.clone())),

        NodeKind::LocalRef { name, .. } => {
            let v = env
                .lookup_local(name)
                .ok_or_else(|| QuillError::name_error(Phase::Execute, format!("unbound local: {name}")).with_location(loc.clone()))?;
            Ok(Flow::Value(v))
        }

        NodeKind::VarRef { ns, name } => {
            let var = resolve_var(env, ns, name, loc)?;
            Ok(Flow::Value(var.get()))
        }

        NodeKind::If { test, then, els } => {
            let t = eval(test, env)?;
            if t.is_truthy() {
                eval_tail(then, env)
            } else {
                eval_tail(els, env)
            }
        }

        NodeKind::Do(exprs) => {
            if exprs.is_empty() {
                return Ok(Flow::Value(Value::Nil));
            }
            for e in &exprs[..exprs.len() - 1] {
                eval(e, env)?;
            }
            eval_tail(&exprs[exprs.len() - 1], env)
        }

        NodeKind::Let { bindings, body } => {
            let mut inner = env.clone();
            for (name, init) in bindings {
                let v = eval(init, &mut inner)?;
                inner = inner.push_bindings(vec![(name.clone(), v)]);
            }
            eval_tail(body, &mut inner)
        }

        // Every sibling's name is bound to `nil` first, then shadowed one
        // at a time as its real closure is built — a binding that closes
        // over a sibling defined *later* in the group still sees that
        // sibling's placeholder `nil` (see `compile_letfn`'s doc comment;
        // this mirrors it intentionally rather than by accident).
        NodeKind::LetFn { bindings, body } => {
            let placeholders = bindings.iter().map(|(n, _)| (n.clone(), Value::Nil)).collect();
            let mut inner = env.push_bindings(placeholders);
            for (name, init) in bindings {
                let v = eval(init, &mut inner)?;
                inner = inner.push_bindings(vec![(name.clone(), v)]);
            }
            eval_tail(body, &mut inner)
        }

        NodeKind::Loop { bindings, body } => {
            let mut inner = env.clone();
            for (name, init) in bindings {
                let v = eval(init, &mut inner)?;
                inner = inner.push_bindings(vec![(name.clone(), v)]);
            }
            loop {
                match eval_tail(body, &mut inner)? {
                    Flow::Value(v) => return Ok(Flow::Value(v)),
                    Flow::Recur(args) => {
                        if args.len() != bindings.len() {
                            return Err(QuillError::arity(
                                Phase::Execute,
                                format!("loop recur expects {} argument(s), got {}", bindings.len(), args.len()),
                            )
                            .with_location(loc.clone()));
                        }
                        // Rebuilt from the *original* enclosing `env`, not
                        // the previous iteration's `inner` — keeps scope
                        // depth constant across arbitrarily many
                        // iterations instead of growing one frame per
                        // recur.
                        inner = env.clone();
                        for ((name, _), v) in bindings.iter().zip(args.into_iter()) {
                            inner = inner.push_bindings(vec![(name.clone(), v)]);
                        }
                    }
                }
            }
        }

        NodeKind::Recur(args) => {
            let values = eval_all(args, env)?;
            Ok(Flow::Recur(values))
        }

        NodeKind::Fn { name, arities } => Ok(Flow::Value(build_fn_value(name.clone(), arities, env))),

        NodeKind::Call { callee, args } => {
            let f = eval(callee, env)?;
            let arg_values = eval_all(args, env)?;
            let v = env.call_value(&f, &arg_values).map_err(|e| {
                if e.location.is_some() {
                    e
                } else {
                    e.with_location(loc.clone())
                }
            })?;
            Ok(Flow::Value(v))
        }

        NodeKind::Def { name, init, flags, doc, arglists } => {
            let value = match init {
                Some(e) => eval(e, env)?,
                None => Value::Nil,
            };
            let ns = env.current_namespace();
            let var = ns.intern(name.clone());
            var.set_root(value.clone());
            var.set_dynamic(flags.dynamic);
            var.set_private(flags.private);
            var.set_const(flags.is_const);
            var.set_macro(flags.is_macro);
            if doc.is_some() || arglists.is_some() {
                let mut pairs = Vec::new();
                if let Some(d) = doc {
                    pairs.push((Value::Keyword(KeywordValue::unqualified("doc")), Value::Str(d.clone())));
                }
                if let Some(a) = arglists {
                    pairs.push((Value::Keyword(KeywordValue::unqualified("arglists")), a.clone()));
                }
                var.set_meta(ArrayMap::from_pairs(pairs));
            }
            Ok(Flow::Value(Value::VarRef(var)))
        }

        NodeKind::SetVar { ns, name, expr } => {
            let value = eval(expr, env)?;
            let var = resolve_var(env, ns, name, loc)?;
            var.set_dynamic_binding(value.clone()).map_err(|e| e.with_location(loc.clone()))?;
            env.sync_print_dynamic_var(&var, &value);
            Ok(Flow::Value(value))
        }

        NodeKind::Throw(expr) => {
            let v = eval(expr, env)?;
            Err(QuillError::from_thrown_value(v).with_location(loc.clone()))
        }

        // `recur` can't cross a `try` (section 4.7), so the body and catch
        // clause run through `eval`, never `eval_tail`.
        NodeKind::Try { body, catch, finally } => {
            let result = match eval(body, env) {
                Ok(v) => Ok(v),
                Err(e) => match catch {
                    Some(clause) => {
                        let thrown = e.to_thrown_value();
                        let mut inner = env.push_bindings(vec![(clause.binding.clone(), thrown)]);
                        eval(&clause.body, &mut inner)
                    }
                    None => Err(e),
                },
            };
            if let Some(finally) = finally {
                // A `finally` that itself throws takes precedence over
                // whatever `result` was, matching the bytecode side.
                eval(finally, env)?;
            }
            result.map(Flow::Value)
        }

        NodeKind::DefMulti { name, dispatch_fn, default_dispatch_value } => {
            let dispatch_val = eval(dispatch_fn, env)?;
            let multi = MultiFnValue::new(name.clone(), dispatch_val, default_dispatch_value.clone());
            let var = env.define_in_current(name.clone(), Value::MultiFn(multi));
            Ok(Flow::Value(Value::VarRef(var)))
        }

        NodeKind::DefMethod { name, dispatch_value, arity } => {
            let dispatch_val = eval(dispatch_value, env)?;
            let method = build_fn_value(None, std::slice::from_ref(arity), env);
            let var = resolve_var(env, &None, name, loc)?;
            match var.get() {
                Value::MultiFn(multi) => {
                    multi.add_method(dispatch_val, method);
                    Ok(Flow::Value(Value::VarRef(var)))
                }
                other => Err(QuillError::type_error(
                    Phase::Execute,
                    format!("{name} is not a multimethod (got a {})", other.type_name()),
                )
                .with_location(loc.clone())),
            }
        }

        NodeKind::LazySeq(body) => {
            let thunk_arity = FnArity {
                params: Vec::new(),
                variadic: false,
                body: body.clone(),
            };
            let thunk = build_fn_value(None, std::slice::from_ref(&thunk_arity), env);
            Ok(Flow::Value(Value::LazySeq(LazySeqCell::new(thunk))))
        }

        NodeKind::DefProtocol { name, method_names } => {
            let protocol = ProtocolValue::new(name.clone(), method_names.clone());
            let proto_var = env.define_in_current(name.clone(), Value::Protocol(protocol.clone()));
            for m in method_names {
                env.define_in_current(m.clone(), Value::ProtocolFn(ProtocolFnValue::new(protocol.clone(), m.clone())));
            }
            Ok(Flow::Value(Value::VarRef(proto_var)))
        }

        NodeKind::ExtendType { protocol_ns, protocol_name, type_tag, methods } => {
            let var = resolve_var(env, protocol_ns, protocol_name, loc)?;
            let protocol = match var.get() {
                Value::Protocol(p) => p,
                other => {
                    return Err(QuillError::type_error(
                        Phase::Execute,
                        format!("{protocol_name} is not a protocol (got a {})", other.type_name()),
                    )
                    .with_location(loc.clone()))
                }
            };
            let tag = type_tag_from_name(type_tag);
            for (method_name, arity) in methods {
                let f = build_fn_value(Some(method_name.clone()), std::slice::from_ref(arity), env);
                protocol.extend(tag.clone(), method_name.clone(), f);
            }
            Ok(Flow::Value(Value::Nil))
        }
    }
}

/// Picks the arity index matching `n` args, ties broken the same way as
/// `FnVal::matching_arity` (exact fixed arity over an also-accepting
/// variadic one).
fn matching_index(f: &FnVal, n: usize) -> Option<usize> {
    f.arities
        .iter()
        .position(|a| matches!(a, Arity::Fixed(k) if *k == n))
        .or_else(|| f.arities.iter().position(|a| a.accepts(n)))
}

fn bind_params(arity: &FnArity, args: &[Value]) -> Result<Vec<(Rc<str>, Value)>, QuillError> {
    let fixed = if arity.variadic { arity.params.len() - 1 } else { arity.params.len() };
    if args.len() < fixed || (!arity.variadic && args.len() != fixed) {
        return Err(QuillError::arity(
            Phase::Execute,
            format!("wrong number of args ({}) passed to fn expecting {}", args.len(), arity.params.len()),
        ));
    }
    let mut bound: Vec<(Rc<str>, Value)> = arity.params[..fixed]
        .iter()
        .cloned()
        .zip(args[..fixed].iter().cloned())
        .collect();
    if arity.variadic {
        let rest_name = arity.params[fixed].clone();
        let rest_values = &args[fixed..];
        // Clojure convention: an empty variadic tail binds to `nil`, not
        // an empty list.
        let rest = if rest_values.is_empty() {
            Value::Nil
        } else {
            Value::List(PList::from_vec(rest_values.to_vec()))
        };
        bound.push((rest_name, rest));
    }
    Ok(bound)
}

/// Calls a tree-walk-compiled `FnVal`: the entry point `bridge::Dispatcher`
/// routes to when `f.kind == FnKind::TreeWalk`, and the one this file uses
/// internally for plain `Call` nodes via `Environment::call_value`.
pub fn call_fn(f: &Rc<FnVal>, args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let proto = f
        .proto
        .downcast_ref::<TreeWalkProto>()
        .expect("tree-walk FnVal must carry a TreeWalkProto");
    let idx = matching_index(f, args.len()).ok_or_else(|| {
        QuillError::arity(
            Phase::Execute,
            format!("wrong number of args ({}) passed to {}", args.len(), f.name.as_deref().unwrap_or("fn")),
        )
    })?;
    let arity = &proto.arities[idx];

    env.error_context.borrow_mut().push(CallFrame::new(f.name.clone(), None))?;
    let result = call_fn_body(f, arity, args, env);
    env.error_context.borrow_mut().pop();
    result
}

fn call_fn_body(f: &Rc<FnVal>, arity: &FnArity, args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let _ns_guard = env.enter_namespace(f.defining_ns.clone());
    let base_env = env.with_locals(Scope::root()).push_bindings(f.captured.clone());

    let mut current_args = args.to_vec();
    loop {
        let bound = bind_params(arity, &current_args)?;
        let mut call_env = base_env.push_bindings(bound);
        match eval_tail(&arity.body, &mut call_env)? {
            Flow::Value(v) => return Ok(v),
            Flow::Recur(new_args) => {
                if new_args.len() != arity.params.len() {
                    return Err(QuillError::arity(
                        Phase::Execute,
                        format!("fn recur expects {} argument(s), got {}", arity.params.len(), new_args.len()),
                    ));
                }
                current_args = new_args;
            }
        }
    }
}
