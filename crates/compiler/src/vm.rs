//! The stack-based bytecode VM (section 4.6): executes a `Chunk` compiled by
//! `compile.rs`. The companion to `tree_walk.rs` — both share `Value`,
//! `Environment`, and the `QuillError` model, and `bridge::Dispatcher` lets
//! either backend call into the other.
//!
//! A call frame's "locals" are simply the bottom `frame_size` slots of a
//! `Vec<Value>` that also serves as the frame's expression stack — `let` and
//! `loop` bindings never get a dedicated instruction, they just leave their
//! computed value sitting where the next local slot expects it (matching
//! `compile.rs`'s `FrameCtx::push_local`, which records a slot number without
//! emitting anything). Each bytecode `fn` call runs in its own freshly
//! allocated `Vec<Value>` rather than sharing one stack across frames, so a
//! nested call is an ordinary (if heap-allocated) recursive Rust call; this
//! is what lets `run_frame`'s `try`/`catch` handler stack stay entirely
//! local to one frame, exactly as `tree_walk.rs`'s module doc comment
//! predicts.

use crate::bytecode::{unpack_recur_operand, CaptureSource, Chunk, FnProto, Instr, OpCode};
use quill_runtime::builtins::arithmetic;
use quill_runtime::builtins::collections::{hash_map_ctor, hash_set_ctor, list_ctor, vector_ctor};
use quill_runtime::builtins::comparison;
use quill_runtime::environment::Environment;
use quill_runtime::error::{CallFrame, Phase, QuillError};
use quill_runtime::fn_val::{Arity, FnKind, FnVal};
use quill_runtime::lazy_seq::LazySeqCell;
use quill_runtime::multimethod::MultiFnValue;
use quill_runtime::protocol::{type_tag_from_name, ProtocolFnValue, ProtocolValue};
use quill_runtime::symbol::SymbolValue;
use quill_runtime::value::Value;
use std::rc::Rc;

/// One exception handler registered by `TryBegin`: where to resume on an
/// unwind, and the frame-local stack depth to truncate back to first (the
/// `TryBegin`-time depth — `compile_try`'s catch clause binds its slot at
/// exactly this depth, see its doc comment).
struct Handler {
    catch_ip: usize,
    stack_depth: usize,
}

fn as_symbol(v: &Value) -> Option<Rc<SymbolValue>> {
    match v {
        Value::Symbol(s) => Some(s.clone()),
        _ => None,
    }
}

/// Picks the matching `CompiledArity`'s index, ties broken toward an exact
/// fixed arity over a variadic one that also accepts `n` — mirrors
/// `tree_walk::matching_index` and `FnVal::matching_arity`.
fn matching_index(f: &FnVal, n: usize) -> Option<usize> {
    f.arities
        .iter()
        .position(|a| matches!(a, Arity::Fixed(k) if *k == n))
        .or_else(|| f.arities.iter().position(|a| a.accepts(n)))
}

/// Binds `args` into a fresh frame-locals vector: `self_slot` (if the fn is
/// named) occupies slot 0, then fixed params, then — for a variadic arity —
/// a trailing list of whatever's left (`nil` if nothing's left, matching
/// `tree_walk::bind_params`'s Clojure-convention comment).
fn bind_frame(
    f: &Rc<FnVal>,
    self_value: Option<Value>,
    param_count: usize,
    variadic: bool,
    args: &[Value],
) -> Result<Vec<Value>, QuillError> {
    let fixed = if variadic { param_count - 1 } else { param_count };
    if args.len() < fixed || (!variadic && args.len() != fixed) {
        return Err(QuillError::arity(
            Phase::Execute,
            format!(
                "wrong number of args ({}) passed to {}",
                args.len(),
                f.name.as_deref().unwrap_or("fn")
            ),
        ));
    }
    let mut locals = Vec::with_capacity(1 + param_count);
    if let Some(v) = self_value {
        locals.push(v);
    }
    locals.extend_from_slice(&args[..fixed]);
    if variadic {
        let rest = &args[fixed..];
        let rest_value = if rest.is_empty() {
            Value::Nil
        } else {
            Value::List(quill_runtime::collections::PList::from_vec(rest.to_vec()))
        };
        locals.push(rest_value);
    }
    Ok(locals)
}

/// Calls a bytecode-compiled `FnVal`: the entry point `bridge::Dispatcher`
/// routes to when `f.kind == FnKind::Bytecode`, and what `Call`/`TailCall`
/// use internally for a bytecode callee reached through `Environment::call_value`.
pub fn call_fn(f: &Rc<FnVal>, args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let proto = f
        .proto
        .downcast_ref::<FnProto>()
        .expect("bytecode FnVal must carry a FnProto");
    let idx = matching_index(f, args.len()).ok_or_else(|| {
        QuillError::arity(
            Phase::Execute,
            format!(
                "wrong number of args ({}) passed to {}",
                args.len(),
                f.name.as_deref().unwrap_or("fn")
            ),
        )
    })?;
    let arity = &proto.arities[idx];

    let self_value = proto.self_slot.map(|_| Value::FnVal(f.clone()));
    let locals = bind_frame(f, self_value, arity.param_count, arity.variadic, args)?;
    let captures: Vec<Value> = f.captured.iter().map(|(_, v)| v.clone()).collect();

    env.error_context
        .borrow_mut()
        .push(CallFrame::new(f.name.clone(), None))?;
    let _ns_guard = env.enter_namespace(f.defining_ns.clone());
    let result = run_frame(&arity.chunk, locals, &captures, env);
    drop(_ns_guard);
    env.error_context.borrow_mut().pop();
    result
}

/// Runs `chunk` against a top-level, capture-less, empty frame — the entry
/// point `eval.rs` uses for a freshly analyzed and compiled top-level form.
pub fn run_top_level(chunk: &Chunk, env: &mut Environment) -> Result<Value, QuillError> {
    run_frame(chunk, Vec::new(), &[], env)
}

fn build_closure(
    proto_idx: usize,
    chunk: &Chunk,
    locals: &[Value],
    captures: &[Value],
    env: &Environment,
) -> Value {
    let proto = chunk.protos[proto_idx].clone();
    let arity_kinds: Vec<Arity> = proto
        .arities
        .iter()
        .map(|a| {
            if a.variadic {
                Arity::Variadic {
                    min: a.param_count.saturating_sub(1),
                }
            } else {
                Arity::Fixed(a.param_count)
            }
        })
        .collect();
    let resolved: Vec<Value> = proto.arities[0]
        .captures
        .iter()
        .map(|src| match src {
            CaptureSource::Local(slot) => locals[*slot].clone(),
            CaptureSource::Upvalue(idx) => captures[*idx].clone(),
        })
        .collect();
    let captured: Vec<(Rc<str>, Value)> = proto
        .capture_names
        .iter()
        .cloned()
        .zip(resolved)
        .collect();
    Value::FnVal(Rc::new(FnVal {
        name: proto.name.clone(),
        arities: arity_kinds,
        kind: FnKind::Bytecode,
        is_macro: false,
        proto: proto as Rc<dyn std::any::Any>,
        captured,
        defining_ns: env.current_namespace().name.clone(),
    }))
}

/// Executes one call frame's chunk to completion: `locals` starts out
/// holding exactly the frame's bound parameters (and `self`, if named) and
/// doubles as the expression stack for everything the chunk pushes past
/// that; `captures` is this frame's own closed-over values, indexed by
/// `UpvalueLoad`/`CaptureSource::Upvalue`.
fn run_frame(
    chunk: &Chunk,
    mut locals: Vec<Value>,
    captures: &[Value],
    env: &mut Environment,
) -> Result<Value, QuillError> {
    let mut ip: usize = 0;
    let mut handlers: Vec<Handler> = Vec::new();

    loop {
        let Instr { op, operand } = chunk.instructions[ip];
        let this_ip = ip;
        ip += 1;

        macro_rules! loc {
            () => {
                quill_core::SourceLocation::new(
                    None,
                    chunk.lines[this_ip],
                    chunk.columns[this_ip],
                )
            };
        }

        macro_rules! binop {
            ($f:path) => {{
                let b = locals.pop().expect("binop rhs");
                let a = locals.pop().expect("binop lhs");
                let r = $f(&[a, b], env).map_err(|e| with_loc(e, loc!()))?;
                locals.push(r);
            }};
        }

        macro_rules! locals_binop {
            ($f:path, $a:expr, $b:expr) => {{
                let r = $f(&[$a, $b], env).map_err(|e| with_loc(e, loc!()))?;
                locals.push(r);
            }};
        }

        match op {
            OpCode::Const => locals.push(chunk.constants[operand as usize].clone()),
            OpCode::PushNil => locals.push(Value::Nil),
            OpCode::PushTrue => locals.push(Value::Bool(true)),
            OpCode::PushFalse => locals.push(Value::Bool(false)),

            OpCode::Pop => {
                locals.pop();
            }
            OpCode::Dup => {
                let top = locals.last().expect("dup needs TOS").clone();
                locals.push(top);
            }
            OpCode::PopUnder => {
                let top = locals.pop().expect("pop_under needs TOS");
                let new_len = locals.len() - operand as usize;
                locals.truncate(new_len);
                locals.push(top);
            }

            OpCode::LocalLoad => locals.push(locals[operand as usize].clone()),
            OpCode::LocalStore => {
                let v = locals.pop().expect("local_store needs a value");
                locals[operand as usize] = v;
            }
            OpCode::UpvalueLoad => locals.push(captures[operand as usize].clone()),

            OpCode::VarLoad => {
                let sym = as_symbol(&chunk.constants[operand as usize]).expect("VarLoad constant must be a symbol");
                let var = env
                    .resolve_var(&sym)
                    .ok_or_else(|| QuillError::name_error(Phase::Execute, format!("unable to resolve var: {sym}")).with_location(loc!()))?;
                locals.push(var.get());
            }
            OpCode::Def | OpCode::DefMacro | OpCode::DefDynamic | OpCode::DefPrivate => {
                let value = locals.pop().expect("def needs an init value");
                let sym = as_symbol(&chunk.constants[operand as usize]).expect("Def constant must be a symbol");
                let var = env.current_namespace().intern(sym.name.clone());
                var.set_root(value);
                match op {
                    OpCode::DefMacro => var.set_macro(true),
                    OpCode::DefDynamic => var.set_dynamic(true),
                    OpCode::DefPrivate => var.set_private(true),
                    _ => {}
                }
                locals.push(Value::VarRef(var));
            }
            OpCode::SetVar => {
                let value = locals.pop().expect("set! needs a value");
                let sym = as_symbol(&chunk.constants[operand as usize]).expect("SetVar constant must be a symbol");
                let var = env
                    .resolve_var(&sym)
                    .ok_or_else(|| QuillError::name_error(Phase::Execute, format!("unable to resolve var: {sym}")).with_location(loc!()))?;
                var.set_dynamic_binding(value.clone()).map_err(|e| with_loc(e, loc!()))?;
                env.sync_print_dynamic_var(&var, &value);
                locals.push(value);
            }
            OpCode::DefMulti => {
                let default = locals.pop().expect("defmulti needs a default value");
                let dispatch_fn = locals.pop().expect("defmulti needs a dispatch fn");
                let sym = as_symbol(&chunk.constants[operand as usize]).expect("DefMulti constant must be a symbol");
                let multi = MultiFnValue::new(sym.name.clone(), dispatch_fn, default);
                let var = env.define_in_current(sym.name.clone(), Value::MultiFn(multi));
                locals.push(Value::VarRef(var));
            }
            OpCode::DefMethod => {
                let method = locals.pop().expect("defmethod needs a fn");
                let dispatch_value = locals.pop().expect("defmethod needs a dispatch value");
                let sym = as_symbol(&chunk.constants[operand as usize]).expect("DefMethod constant must be a symbol");
                let var = env
                    .resolve_var(&sym)
                    .ok_or_else(|| QuillError::name_error(Phase::Execute, format!("unable to resolve var: {sym}")).with_location(loc!()))?;
                match var.get() {
                    Value::MultiFn(multi) => {
                        multi.add_method(dispatch_value, method);
                        locals.push(Value::VarRef(var));
                    }
                    other => {
                        return Err(QuillError::type_error(
                            Phase::Execute,
                            format!("{} is not a multimethod (got a {})", sym.name, other.type_name()),
                        )
                        .with_location(loc!()))
                    }
                }
            }
            OpCode::LazySeqOp => {
                let thunk = locals.pop().expect("lazy-seq needs a thunk");
                locals.push(Value::LazySeq(LazySeqCell::new(thunk)));
            }
            OpCode::DefProtocol => {
                let methods_value = locals.pop().expect("defprotocol needs a method-name vector");
                let sym = as_symbol(&chunk.constants[operand as usize]).expect("DefProtocol constant must be a symbol");
                let method_names: Vec<Rc<str>> = match methods_value {
                    Value::Vector(v) => v.iter().filter_map(|m| as_symbol(&m)).map(|s| s.name.clone()).collect(),
                    _ => unreachable!("compile_defprotocol always emits a vector of symbols"),
                };
                let protocol = ProtocolValue::new(sym.name.clone(), method_names.clone());
                let proto_var = env.define_in_current(sym.name.clone(), Value::Protocol(protocol.clone()));
                for m in &method_names {
                    env.define_in_current(m.clone(), Value::ProtocolFn(ProtocolFnValue::new(protocol.clone(), m.clone())));
                }
                locals.push(Value::VarRef(proto_var));
            }
            OpCode::ExtendType => {
                let type_value = locals.pop().expect("extend-type needs a type name");
                let names_value = locals.pop().expect("extend-type needs a method-name vector");
                let type_tag_str = match &type_value {
                    Value::Str(s) => s.clone(),
                    _ => unreachable!("compile_extend_type always emits a string"),
                };
                let method_names: Vec<Rc<str>> = match &names_value {
                    Value::Vector(v) => v.iter().filter_map(|m| as_symbol(&m)).map(|s| s.name.clone()).collect(),
                    _ => unreachable!("compile_extend_type always emits a vector of symbols"),
                };
                let n = method_names.len();
                let fns: Vec<Value> = locals.split_off(locals.len() - n);
                let sym = as_symbol(&chunk.constants[operand as usize]).expect("ExtendType constant must be a symbol");
                let var = env
                    .resolve_var(&sym)
                    .ok_or_else(|| QuillError::name_error(Phase::Execute, format!("unable to resolve var: {sym}")).with_location(loc!()))?;
                let protocol = match var.get() {
                    Value::Protocol(p) => p,
                    other => {
                        return Err(QuillError::type_error(
                            Phase::Execute,
                            format!("{} is not a protocol (got a {})", sym.name, other.type_name()),
                        )
                        .with_location(loc!()))
                    }
                };
                let tag = type_tag_from_name(&type_tag_str);
                for (name, f) in method_names.into_iter().zip(fns) {
                    protocol.extend(tag.clone(), name, f);
                }
                locals.push(Value::Nil);
            }

            OpCode::Jump => ip = operand as usize,
            OpCode::JumpIfFalse => {
                let cond = locals.pop().expect("jump_if_false needs a condition");
                if !cond.is_truthy() {
                    ip = operand as usize;
                }
            }
            OpCode::JumpBack => ip = this_ip + 1 - operand as usize,

            OpCode::Closure => {
                let v = build_closure(operand as usize, chunk, &locals, captures, env);
                locals.push(v);
            }
            OpCode::Call | OpCode::TailCall => {
                let n = operand as usize;
                let args: Vec<Value> = locals.split_off(locals.len() - n);
                let f = locals.pop().expect("call needs a callee");
                let result = env.call_value(&f, &args).map_err(|e| {
                    if e.location.is_some() {
                        e
                    } else {
                        with_loc(e, loc!())
                    }
                });
                match result {
                    Ok(v) => locals.push(v),
                    Err(e) => match unwind(&mut handlers, &mut locals, e.to_thrown_value())? {
                        Some(target) => ip = target,
                        None => return Err(e),
                    },
                }
            }
            OpCode::Ret => return Ok(locals.pop().expect("ret needs a value")),

            OpCode::Recur | OpCode::RecurLoop => {
                let (base, n) = unpack_recur_operand(operand);
                let (base, n) = (base as usize, n as usize);
                let args: Vec<Value> = locals.split_off(locals.len() - n);
                locals[base..base + n].clone_from_slice(&args);
            }

            OpCode::ListNew => {
                let n = operand as usize;
                let args = locals.split_off(locals.len() - n);
                locals.push(list_ctor(&args, env).map_err(|e| with_loc(e, loc!()))?);
            }
            OpCode::VecNew => {
                let n = operand as usize;
                let args = locals.split_off(locals.len() - n);
                locals.push(vector_ctor(&args, env).map_err(|e| with_loc(e, loc!()))?);
            }
            OpCode::MapNew => {
                let n = operand as usize * 2;
                let args = locals.split_off(locals.len() - n);
                locals.push(hash_map_ctor(&args, env).map_err(|e| with_loc(e, loc!()))?);
            }
            OpCode::SetNew => {
                let n = operand as usize;
                let args = locals.split_off(locals.len() - n);
                locals.push(hash_set_ctor(&args, env).map_err(|e| with_loc(e, loc!()))?);
            }

            OpCode::TryBegin => handlers.push(Handler {
                catch_ip: operand as usize,
                stack_depth: locals.len(),
            }),
            OpCode::TryEnd => {}
            OpCode::PopHandler => {
                handlers.pop();
            }
            OpCode::ThrowEx => {
                let thrown = locals.pop().expect("throw needs a value");
                match unwind(&mut handlers, &mut locals, thrown.clone())? {
                    Some(target) => ip = target,
                    None => return Err(QuillError::from_thrown_value(thrown).with_location(loc!())),
                }
            }

            OpCode::Add => binop!(arithmetic::add),
            OpCode::Sub => binop!(arithmetic::subtract),
            OpCode::Mul => binop!(arithmetic::multiply),
            OpCode::Div => binop!(arithmetic::divide),
            OpCode::Mod => binop!(arithmetic::modulo),
            OpCode::Rem => binop!(arithmetic::remainder),
            OpCode::Lt => binop!(comparison::less_than),
            OpCode::Le => binop!(comparison::less_equal),
            OpCode::Gt => binop!(comparison::greater_than),
            OpCode::Ge => binop!(comparison::greater_equal),
            OpCode::Eq => binop!(comparison::equals),
            OpCode::Neq => binop!(comparison::not_equals),

            OpCode::AddLocals | OpCode::SubLocals | OpCode::EqLocals | OpCode::LtLocals | OpCode::LeLocals => {
                let (a, b) = unpack_recur_operand(operand);
                let a = locals[a as usize].clone();
                let b = locals[b as usize].clone();
                match op {
                    OpCode::AddLocals => locals_binop!(arithmetic::add, a, b),
                    OpCode::SubLocals => locals_binop!(arithmetic::subtract, a, b),
                    OpCode::EqLocals => locals_binop!(comparison::equals, a, b),
                    OpCode::LtLocals => locals_binop!(comparison::less_than, a, b),
                    OpCode::LeLocals => locals_binop!(comparison::less_equal, a, b),
                    _ => unreachable!(),
                }
            }
            OpCode::AddLocalConst | OpCode::SubLocalConst | OpCode::EqLocalConst | OpCode::LtLocalConst | OpCode::LeLocalConst => {
                let (slot, n) = unpack_recur_operand(operand);
                let a = locals[slot as usize].clone();
                let b = Value::Int(n as i64);
                match op {
                    OpCode::AddLocalConst => locals_binop!(arithmetic::add, a, b),
                    OpCode::SubLocalConst => locals_binop!(arithmetic::subtract, a, b),
                    OpCode::EqLocalConst => locals_binop!(comparison::equals, a, b),
                    OpCode::LtLocalConst => locals_binop!(comparison::less_than, a, b),
                    OpCode::LeLocalConst => locals_binop!(comparison::less_equal, a, b),
                    _ => unreachable!(),
                }
            }
            // The pushed boolean matches the unfused `*Locals` comparison it
            // replaces (not its negation) — the `JumpIfFalse` that always
            // immediately follows still reads it as a plain truthiness test.
            OpCode::BranchNeLocals => {
                let (a, b) = unpack_recur_operand(operand);
                let a = locals[a as usize].clone();
                let b = locals[b as usize].clone();
                locals_binop!(comparison::equals, a, b);
            }
            OpCode::BranchGeLocals => {
                let (a, b) = unpack_recur_operand(operand);
                let a = locals[a as usize].clone();
                let b = locals[b as usize].clone();
                locals_binop!(comparison::less_than, a, b);
            }
            OpCode::BranchGtLocals => {
                let (a, b) = unpack_recur_operand(operand);
                let a = locals[a as usize].clone();
                let b = locals[b as usize].clone();
                locals_binop!(comparison::less_equal, a, b);
            }
        }
    }
}

fn with_loc(e: QuillError, loc: quill_core::SourceLocation) -> QuillError {
    if e.location.is_some() {
        e
    } else {
        e.with_location(loc)
    }
}

/// Pops the innermost handler, truncates `locals` back to the depth it had
/// when `TryBegin` ran, and leaves `thrown` sitting at exactly the slot the
/// catch clause's binding expects (the contract `compile_try` documents).
/// Returns the instruction index to jump to, or `None` if there's no
/// handler left in this frame (the caller propagates the error normally —
/// matching `tree_walk.rs`'s doc comment that cross-frame unwinding rides
/// ordinary Rust `Result` propagation rather than this handler stack).
fn unwind(handlers: &mut Vec<Handler>, locals: &mut Vec<Value>, thrown: Value) -> Result<Option<usize>, QuillError> {
    match handlers.pop() {
        Some(h) => {
            locals.truncate(h.stack_depth);
            locals.push(thrown);
            Ok(Some(h.catch_ip))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{pack_recur_operand, CompiledArity};
    use quill_runtime::fn_val::Dispatcher;

    struct NullDispatcher;
    impl Dispatcher for NullDispatcher {
        fn call(&self, _f: &Rc<FnVal>, _args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
            unreachable!("no closures constructed in these tests")
        }
    }

    fn env() -> Environment {
        let e = Environment::new(Rc::new(NullDispatcher));
        quill_runtime::builtins::install(&e);
        e
    }

    fn emit(chunk: &mut Chunk, op: OpCode, operand: u16) {
        chunk.emit(Instr::new(op, operand), 1, 1);
    }

    #[test]
    fn runs_a_simple_addition() {
        let mut chunk = Chunk::new();
        let a = chunk.add_constant(Value::Int(2)).unwrap();
        let b = chunk.add_constant(Value::Int(3)).unwrap();
        emit(&mut chunk, OpCode::Const, a);
        emit(&mut chunk, OpCode::Const, b);
        emit(&mut chunk, OpCode::Add, 0);
        emit(&mut chunk, OpCode::Ret, 0);
        let mut e = env();
        assert_eq!(run_top_level(&chunk, &mut e).unwrap(), Value::Int(5));
    }

    #[test]
    fn if_true_branch_taken() {
        let mut chunk = Chunk::new();
        emit(&mut chunk, OpCode::PushTrue, 0);
        let jif = chunk.len();
        emit(&mut chunk, OpCode::JumpIfFalse, 0);
        let t = chunk.add_constant(Value::Int(1)).unwrap();
        emit(&mut chunk, OpCode::Const, t);
        let jend = chunk.len();
        emit(&mut chunk, OpCode::Jump, 0);
        let else_start = chunk.len() as u16;
        chunk.patch_jump(jif, else_start);
        let f = chunk.add_constant(Value::Int(2)).unwrap();
        emit(&mut chunk, OpCode::Const, f);
        let end = chunk.len() as u16;
        chunk.patch_jump(jend, end);
        emit(&mut chunk, OpCode::Ret, 0);
        let mut e = env();
        assert_eq!(run_top_level(&chunk, &mut e).unwrap(), Value::Int(1));
    }

    #[test]
    fn loop_recur_sums_via_recur_loop_fusion() {
        // Mimics `(loop [i 0 acc 0] (if (= i 5) acc (recur (+ i 1) (+ acc i))))`
        // compiled shape closely enough to exercise `Recur`/`JumpBack`.
        let mut chunk = Chunk::new();
        emit(&mut chunk, OpCode::PushFalse, 0); // i = 0 placeholder slot 0
        emit(&mut chunk, OpCode::Pop, 0);
        let zero = chunk.add_constant(Value::Int(0)).unwrap();
        emit(&mut chunk, OpCode::Const, zero); // slot 0: i
        emit(&mut chunk, OpCode::Const, zero); // slot 1: acc
        let loop_start = chunk.len();
        let five = chunk.add_constant(Value::Int(5)).unwrap();
        emit(&mut chunk, OpCode::LocalLoad, 0);
        emit(&mut chunk, OpCode::Const, five);
        emit(&mut chunk, OpCode::Eq, 0);
        let jif = chunk.len();
        emit(&mut chunk, OpCode::JumpIfFalse, 0);
        emit(&mut chunk, OpCode::LocalLoad, 1);
        let jend = chunk.len();
        emit(&mut chunk, OpCode::Jump, 0);
        let else_start = chunk.len() as u16;
        chunk.patch_jump(jif, else_start);
        let one = chunk.add_constant(Value::Int(1)).unwrap();
        emit(&mut chunk, OpCode::LocalLoad, 0);
        emit(&mut chunk, OpCode::Const, one);
        emit(&mut chunk, OpCode::Add, 0);
        emit(&mut chunk, OpCode::LocalLoad, 1);
        emit(&mut chunk, OpCode::LocalLoad, 0);
        emit(&mut chunk, OpCode::Add, 0);
        emit(&mut chunk, OpCode::Recur, pack_recur_operand(0, 2));
        emit(&mut chunk, OpCode::JumpBack, (chunk.len() + 1 - loop_start) as u16);
        let end = chunk.len() as u16;
        chunk.patch_jump(jend, end);
        emit(&mut chunk, OpCode::Ret, 0);
        let mut e = env();
        assert_eq!(run_top_level(&chunk, &mut e).unwrap(), Value::Int(10));
    }

    #[test]
    fn try_catch_unwinds_to_bound_slot() {
        // (try (throw 1) (catch e e))
        let mut chunk = Chunk::new();
        let tb = chunk.len();
        emit(&mut chunk, OpCode::TryBegin, 0);
        let one = chunk.add_constant(Value::Int(1)).unwrap();
        emit(&mut chunk, OpCode::Const, one);
        emit(&mut chunk, OpCode::ThrowEx, 0);
        emit(&mut chunk, OpCode::PopHandler, 0);
        let jend = chunk.len();
        emit(&mut chunk, OpCode::Jump, 0);
        let catch_start = chunk.len() as u16;
        chunk.patch_jump(tb, catch_start);
        emit(&mut chunk, OpCode::LocalLoad, 0); // catch binding slot 0
        emit(&mut chunk, OpCode::PopUnder, 1);
        let end = chunk.len() as u16;
        chunk.patch_jump(jend, end);
        emit(&mut chunk, OpCode::Ret, 0);
        let mut e = env();
        assert_eq!(run_top_level(&chunk, &mut e).unwrap(), Value::Int(1));
    }

    #[test]
    fn def_installs_a_var_in_the_current_namespace() {
        let mut chunk = Chunk::new();
        let v = chunk.add_constant(Value::Int(42)).unwrap();
        emit(&mut chunk, OpCode::Const, v);
        let name = chunk.add_constant(Value::Symbol(SymbolValue::unqualified("answer"))).unwrap();
        emit(&mut chunk, OpCode::Def, name);
        emit(&mut chunk, OpCode::Pop, 0);
        let sym = chunk.add_constant(Value::Symbol(SymbolValue::unqualified("answer"))).unwrap();
        emit(&mut chunk, OpCode::VarLoad, sym);
        emit(&mut chunk, OpCode::Ret, 0);
        let mut e = env();
        assert_eq!(run_top_level(&chunk, &mut e).unwrap(), Value::Int(42));
    }

    #[test]
    fn calling_a_bytecode_closure_through_call_fn() {
        // fn() { 7 }, invoked directly through vm::call_fn.
        let mut body = Chunk::new();
        let seven = body.add_constant(Value::Int(7)).unwrap();
        emit(&mut body, OpCode::Const, seven);
        emit(&mut body, OpCode::Ret, 0);
        let proto = Rc::new(FnProto {
            name: Some(Rc::from("const7")),
            arities: vec![CompiledArity {
                param_count: 0,
                variadic: false,
                frame_size: 0,
                captures: Vec::new(),
                chunk: body,
            }],
            capture_names: Vec::new(),
            self_slot: None,
        });
        let f = Rc::new(FnVal {
            name: Some(Rc::from("const7")),
            arities: vec![Arity::Fixed(0)],
            kind: FnKind::Bytecode,
            is_macro: false,
            proto: proto as Rc<dyn std::any::Any>,
            captured: Vec::new(),
            defining_ns: Rc::from("user"),
        });
        let mut e = env();
        assert_eq!(call_fn(&f, &[], &mut e).unwrap(), Value::Int(7));
    }
}
