//! Node → Chunk compilation: the bytecode half of the dual-backend
//! evaluator (section 4.5).
//!
//! The analyzer assigns every local a numeric slot from one counter that
//! runs across the whole top-level form rather than resetting per
//! function, which makes it awkward for a compiler to tell "is this slot
//! mine, or an enclosing frame's" without replaying that exact counter
//! sequence. Rather than replay it, this compiler resolves `LocalRef` by
//! *name* against its own name-keyed lexical scope, built by walking the
//! same nested `Let`/`LetFn`/`Loop`/`Fn` structure the analyzer resolved
//! names against in the first place — the numeric `slot` on `LocalRef` is
//! read by nothing here and is ignored.

use crate::bytecode::{
    pack_recur_operand, CaptureSource, Chunk, CompiledArity, FnProto, Instr, OpCode,
};
use crate::node::{FnArity, Node, NodeKind};
use quill_core::SourceLocation;
use quill_runtime::symbol::SymbolValue;
use quill_runtime::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    TooManyConstants,
    TooManyLocals,
    InvalidNode(String),
    ArityError(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::TooManyConstants => write!(f, "too many constants in one chunk"),
            CompileError::TooManyLocals => write!(f, "too many locals in one frame"),
            CompileError::InvalidNode(msg) => write!(f, "invalid node: {msg}"),
            CompileError::ArityError(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// Where `recur` rebinds arguments and where it jumps back to — the
/// current `loop`'s bindings, or (absent an enclosing `loop`) the current
/// fn arity's own parameters (section 4.5/4.6).
struct RecurTarget {
    base_offset: u8,
    arg_count: u8,
    loop_start: usize,
}

/// One fn arity's (or the top-level form's) compile-time frame: its own
/// chunk, its own name→slot locals stack, and a shared handle to the
/// capture list every arity of the same `fn` contributes to (see
/// `FnProto`'s doc comment for why captures are shared across arities
/// rather than tracked per-arity).
struct FrameCtx {
    chunk: Chunk,
    locals: Vec<(Rc<str>, usize)>,
    next_local: usize,
    max_local: usize,
    recur_targets: Vec<RecurTarget>,
    captures: Rc<RefCell<Vec<(Rc<str>, CaptureSource)>>>,
}

impl FrameCtx {
    fn new(captures: Rc<RefCell<Vec<(Rc<str>, CaptureSource)>>>) -> Self {
        FrameCtx {
            chunk: Chunk::new(),
            locals: Vec::new(),
            next_local: 0,
            max_local: 0,
            recur_targets: Vec::new(),
            captures,
        }
    }

    fn push_local(&mut self, name: Rc<str>) -> usize {
        let slot = self.next_local;
        self.next_local += 1;
        self.max_local = self.max_local.max(self.next_local);
        self.locals.push((name, slot));
        slot
    }

    fn find_local(&self, name: &str) -> Option<usize> {
        self.locals.iter().rev().find(|(n, _)| &**n == name).map(|(_, s)| *s)
    }

    fn find_capture(&self, name: &str) -> Option<usize> {
        self.captures
            .borrow()
            .iter()
            .position(|(n, _)| &**n == name)
    }

    fn add_capture(&self, name: Rc<str>, source: CaptureSource) -> usize {
        let mut captures = self.captures.borrow_mut();
        captures.push((name, source));
        captures.len() - 1
    }
}

enum Resolved {
    Local(usize),
    Upvalue(usize),
}

pub struct Compiler {
    frames: Vec<FrameCtx>,
}

impl Compiler {
    fn new() -> Self {
        Compiler {
            frames: vec![FrameCtx::new(Rc::new(RefCell::new(Vec::new())))],
        }
    }

    fn frame(&mut self) -> &mut FrameCtx {
        self.frames.last_mut().expect("compiler always has a frame")
    }

    fn emit(&mut self, op: OpCode, operand: u16, loc: &SourceLocation) -> usize {
        self.frame().chunk.emit(Instr::new(op, operand), loc.line, loc.column)
    }

    fn emit_bare(&mut self, op: OpCode, loc: &SourceLocation) -> usize {
        self.emit(op, 0, loc)
    }

    fn patch(&mut self, idx: usize, operand: u16) {
        self.frame().chunk.patch_jump(idx, operand);
    }

    fn here(&mut self) -> usize {
        self.frame().chunk.len()
    }

    /// Resolves `name` against frame `idx`'s own locals, then (recursively,
    /// memoizing the chain) against enclosing frames as an upvalue. This is
    /// the classic upvalue-chain algorithm: a name captured two frames up
    /// is recorded once in the immediate parent's capture list and again in
    /// this frame's, each referencing the one below it.
    fn resolve_in(&mut self, idx: usize, name: &str) -> Option<Resolved> {
        if let Some(slot) = self.frames[idx].find_local(name) {
            return Some(Resolved::Local(slot));
        }
        if let Some(cap_idx) = self.frames[idx].find_capture(name) {
            return Some(Resolved::Upvalue(cap_idx));
        }
        if idx == 0 {
            return None;
        }
        let parent_source = match self.resolve_in(idx - 1, name)? {
            Resolved::Local(slot) => CaptureSource::Local(slot),
            Resolved::Upvalue(cap_idx) => CaptureSource::Upvalue(cap_idx),
        };
        let cap_idx = self.frames[idx].add_capture(Rc::from(name), parent_source);
        Some(Resolved::Upvalue(cap_idx))
    }

    fn resolve(&mut self, name: &str) -> Option<Resolved> {
        let top = self.frames.len() - 1;
        self.resolve_in(top, name)
    }

    fn add_constant(&mut self, value: Value) -> Result<u16, CompileError> {
        self.frame().chunk.add_constant(value)
    }

    // -- node compilation -------------------------------------------------

    fn compile_node(&mut self, node: &Node) -> Result<(), CompileError> {
        let loc = node.loc.clone();
        match &node.kind {
            NodeKind::Constant(v) => self.compile_constant(v.clone(), &loc),
            NodeKind::LocalRef { name, .. } => self.compile_local_ref(name, &loc),
            NodeKind::VarRef { ns, name } => self.compile_var_ref(ns.clone(), name.clone(), &loc),
            NodeKind::If { test, then, els } => self.compile_if(test, then, els, &loc),
            NodeKind::Do(exprs) => self.compile_do(exprs, &loc),
            NodeKind::Let { bindings, body } => self.compile_let(bindings, body, &loc),
            NodeKind::LetFn { bindings, body } => self.compile_letfn(bindings, body, &loc),
            NodeKind::Loop { bindings, body } => self.compile_loop(bindings, body, &loc),
            NodeKind::Recur(args) => self.compile_recur(args, &loc),
            NodeKind::Fn { name, arities } => self.compile_fn(name.clone(), arities, &loc),
            NodeKind::Call { callee, args } => self.compile_call(callee, args, &loc, false),
            NodeKind::Def { name, init, flags, doc, arglists } => {
                self.compile_def(name.clone(), init, *flags, doc.clone(), arglists.clone(), &loc)
            }
            NodeKind::SetVar { ns, name, expr } => self.compile_set_var(ns.clone(), name.clone(), expr, &loc),
            NodeKind::Quote(v) => self.compile_constant(v.clone(), &loc),
            NodeKind::Throw(expr) => self.compile_throw(expr, &loc),
            NodeKind::Try { body, catch, finally } => self.compile_try(body, catch.as_ref(), finally.as_ref(), &loc),
            NodeKind::DefMulti { name, dispatch_fn, default_dispatch_value } => {
                self.compile_defmulti(name.clone(), dispatch_fn, default_dispatch_value.clone(), &loc)
            }
            NodeKind::DefMethod { name, dispatch_value, arity } => {
                self.compile_defmethod(name.clone(), dispatch_value, arity, &loc)
            }
            NodeKind::LazySeq(body) => self.compile_lazy_seq(body, &loc),
            NodeKind::DefProtocol { name, method_names } => self.compile_defprotocol(name.clone(), method_names.clone(), &loc),
            NodeKind::ExtendType { protocol_ns, protocol_name, type_tag, methods } => {
                self.compile_extend_type(protocol_ns.clone(), protocol_name.clone(), type_tag.clone(), methods, &loc)
            }
        }
    }

    fn compile_constant(&mut self, v: Value, loc: &SourceLocation) -> Result<(), CompileError> {
        match v {
            Value::Nil => {
                self.emit_bare(OpCode::PushNil, loc);
            }
            Value::Bool(true) => {
                self.emit_bare(OpCode::PushTrue, loc);
            }
            Value::Bool(false) => {
                self.emit_bare(OpCode::PushFalse, loc);
            }
            other => {
                let idx = self.add_constant(other)?;
                self.emit(OpCode::Const, idx, loc);
            }
        }
        Ok(())
    }

    fn compile_local_ref(&mut self, name: &Rc<str>, loc: &SourceLocation) -> Result<(), CompileError> {
        match self.resolve(name) {
            Some(Resolved::Local(slot)) => {
                self.emit(OpCode::LocalLoad, slot as u16, loc);
            }
            Some(Resolved::Upvalue(idx)) => {
                self.emit(OpCode::UpvalueLoad, idx as u16, loc);
            }
            None => {
                return Err(CompileError::InvalidNode(format!(
                    "local `{name}` has no enclosing binding"
                )))
            }
        }
        Ok(())
    }

    fn var_symbol_constant(&mut self, ns: Option<Rc<str>>, name: Rc<str>) -> Result<u16, CompileError> {
        let sym = match ns {
            Some(ns) => SymbolValue::qualified(ns, name),
            None => SymbolValue::unqualified(name),
        };
        self.add_constant(Value::Symbol(sym))
    }

    fn compile_var_ref(&mut self, ns: Option<Rc<str>>, name: Rc<str>, loc: &SourceLocation) -> Result<(), CompileError> {
        let idx = self.var_symbol_constant(ns, name)?;
        self.emit(OpCode::VarLoad, idx, loc);
        Ok(())
    }

    fn compile_if(&mut self, test: &Node, then: &Node, els: &Node, loc: &SourceLocation) -> Result<(), CompileError> {
        self.compile_node(test)?;
        let jif_idx = self.emit_bare(OpCode::JumpIfFalse, loc);
        self.compile_node(then)?;
        let jend_idx = self.emit_bare(OpCode::Jump, loc);
        let else_start = self.here();
        self.patch(jif_idx, else_start as u16);
        self.compile_node(els)?;
        let end = self.here();
        self.patch(jend_idx, end as u16);
        Ok(())
    }

    fn compile_do(&mut self, exprs: &[Rc<Node>], loc: &SourceLocation) -> Result<(), CompileError> {
        if exprs.is_empty() {
            self.emit_bare(OpCode::PushNil, loc);
            return Ok(());
        }
        for expr in &exprs[..exprs.len() - 1] {
            self.compile_node(expr)?;
            self.emit_bare(OpCode::Pop, &expr.loc);
        }
        self.compile_node(&exprs[exprs.len() - 1])
    }

    fn compile_let(&mut self, bindings: &[(Rc<str>, Rc<Node>)], body: &Node, loc: &SourceLocation) -> Result<(), CompileError> {
        let locals_mark = self.frame().locals.len();
        let local_mark = self.frame().next_local;
        for (name, init) in bindings {
            self.compile_node(init)?;
            self.frame().push_local(name.clone());
        }
        self.compile_node(body)?;
        if !bindings.is_empty() {
            self.emit(OpCode::PopUnder, bindings.len() as u16, loc);
        }
        self.frame().locals.truncate(locals_mark);
        self.frame().next_local = local_mark;
        Ok(())
    }

    /// Every binding is visible to every other binding's init (mutual
    /// recursion): reserve all N slots with `nil` first, then overwrite
    /// each in turn once its init is compiled. A binding that captures a
    /// sibling defined *later* in the group sees that sibling's
    /// placeholder `nil`, not its eventual function — see `DESIGN.md` for
    /// why this is an accepted limitation rather than a bug.
    fn compile_letfn(&mut self, bindings: &[(Rc<str>, Rc<Node>)], body: &Node, loc: &SourceLocation) -> Result<(), CompileError> {
        let locals_mark = self.frame().locals.len();
        let local_mark = self.frame().next_local;
        let mut slots = Vec::with_capacity(bindings.len());
        for (name, _) in bindings {
            self.emit_bare(OpCode::PushNil, loc);
            slots.push(self.frame().push_local(name.clone()));
        }
        for ((_, init), slot) in bindings.iter().zip(slots.iter()) {
            self.compile_node(init)?;
            self.emit(OpCode::LocalStore, *slot as u16, loc);
        }
        self.compile_node(body)?;
        if !bindings.is_empty() {
            self.emit(OpCode::PopUnder, bindings.len() as u16, loc);
        }
        self.frame().locals.truncate(locals_mark);
        self.frame().next_local = local_mark;
        Ok(())
    }

    fn compile_loop(&mut self, bindings: &[(Rc<str>, Rc<Node>)], body: &Node, loc: &SourceLocation) -> Result<(), CompileError> {
        let locals_mark = self.frame().locals.len();
        let local_mark = self.frame().next_local;
        let mut base_offset = None;
        for (name, init) in bindings {
            self.compile_node(init)?;
            let slot = self.frame().push_local(name.clone());
            if base_offset.is_none() {
                base_offset = Some(slot);
            }
        }
        let loop_start = self.here();
        if bindings.len() > u8::MAX as usize {
            return Err(CompileError::TooManyLocals);
        }
        self.frame().recur_targets.push(RecurTarget {
            base_offset: base_offset.unwrap_or(local_mark) as u8,
            arg_count: bindings.len() as u8,
            loop_start,
        });
        self.compile_node(body)?;
        self.frame().recur_targets.pop();
        if !bindings.is_empty() {
            self.emit(OpCode::PopUnder, bindings.len() as u16, loc);
        }
        self.frame().locals.truncate(locals_mark);
        self.frame().next_local = local_mark;
        Ok(())
    }

    fn compile_recur(&mut self, args: &[Rc<Node>], loc: &SourceLocation) -> Result<(), CompileError> {
        let (base_offset, arg_count, loop_start) = {
            let target = self
                .frame()
                .recur_targets
                .last()
                .ok_or_else(|| CompileError::InvalidNode("recur outside loop or fn".into()))?;
            (target.base_offset, target.arg_count, target.loop_start)
        };
        if args.len() != arg_count as usize {
            return Err(CompileError::ArityError(format!(
                "recur expects {arg_count} argument(s), got {}",
                args.len()
            )));
        }
        for arg in args {
            self.compile_node(arg)?;
        }
        self.emit(OpCode::Recur, pack_recur_operand(base_offset, arg_count), loc);
        let jb_idx = self.emit_bare(OpCode::JumpBack, loc);
        let delta = (jb_idx + 1 - loop_start) as u16;
        self.patch(jb_idx, delta);
        Ok(())
    }

    fn compile_fn(&mut self, name: Option<Rc<str>>, arities: &[FnArity], loc: &SourceLocation) -> Result<(), CompileError> {
        let captures: Rc<RefCell<Vec<(Rc<str>, CaptureSource)>>> = Rc::new(RefCell::new(Vec::new()));
        let mut compiled = Vec::with_capacity(arities.len());
        for arity in arities {
            self.frames.push(FrameCtx::new(captures.clone()));
            let mut self_slot = None;
            if let Some(name) = &name {
                self_slot = Some(self.frame().push_local(name.clone()));
            }
            for param in &arity.params {
                self.frame().push_local(param.clone());
            }
            let param_count = arity.params.len();
            let base_offset = if self_slot.is_some() { 1 } else { 0 };
            self.frame().recur_targets.push(RecurTarget {
                base_offset: base_offset as u8,
                arg_count: param_count as u8,
                loop_start: 0,
            });
            self.compile_node(&arity.body)?;
            self.frame().recur_targets.pop();
            self.emit_bare(OpCode::Ret, &arity.body.loc);
            let frame = self.frames.pop().expect("just pushed");
            let mut chunk = frame.chunk;
            run_peephole(&mut chunk);
            compiled.push((
                self_slot,
                CompiledArity {
                    param_count,
                    variadic: arity.variadic,
                    frame_size: frame.max_local,
                    captures: Vec::new(), // filled below, identical across arities
                    chunk,
                },
            ));
        }
        let capture_list = captures.borrow();
        let capture_names: Vec<Rc<str>> = capture_list.iter().map(|(n, _)| n.clone()).collect();
        let capture_sources: Vec<CaptureSource> = capture_list.iter().map(|(_, s)| *s).collect();
        drop(capture_list);
        let self_slot = compiled.first().and_then(|(s, _)| *s);
        let arities: Vec<CompiledArity> = compiled
            .into_iter()
            .map(|(_, mut a)| {
                a.captures = capture_sources.clone();
                a
            })
            .collect();
        let proto = Rc::new(FnProto {
            name,
            arities,
            capture_names,
            self_slot,
        });
        let proto_idx = self.frame().chunk.add_proto(proto)?;
        self.emit(OpCode::Closure, proto_idx, loc);
        Ok(())
    }

    fn compile_call(&mut self, callee: &Node, args: &[Rc<Node>], loc: &SourceLocation, tail: bool) -> Result<(), CompileError> {
        if let Some(()) = self.try_compile_intrinsic(callee, args, loc)? {
            return Ok(());
        }
        self.compile_node(callee)?;
        for arg in args {
            self.compile_node(arg)?;
        }
        let op = if tail { OpCode::TailCall } else { OpCode::Call };
        self.emit(op, args.len() as u16, loc);
        Ok(())
    }

    /// Lowers calls to well-known unqualified names directly to opcodes
    /// when arity matches, per section 4.5. Returns `Some(())` when it
    /// handled the call, `None` to fall through to an ordinary call.
    fn try_compile_intrinsic(&mut self, callee: &Node, args: &[Rc<Node>], loc: &SourceLocation) -> Result<Option<()>, CompileError> {
        let NodeKind::VarRef { ns: None, name } = &callee.kind else {
            return Ok(None);
        };
        macro_rules! fold_left {
            ($op:expr, $identity:expr) => {{
                if args.is_empty() {
                    self.compile_constant(Value::Int($identity), loc)?;
                } else {
                    self.compile_node(&args[0])?;
                    for a in &args[1..] {
                        self.compile_node(a)?;
                        self.emit_bare($op, loc);
                    }
                }
                return Ok(Some(()));
            }};
        }
        match (&**name, args.len()) {
            ("+", _) => fold_left!(OpCode::Add, 0),
            ("*", _) => fold_left!(OpCode::Mul, 1),
            ("-", 1) => {
                self.compile_constant(Value::Int(0), loc)?;
                self.compile_node(&args[0])?;
                self.emit_bare(OpCode::Sub, loc);
                return Ok(Some(()));
            }
            ("-", n) if n >= 2 => fold_left!(OpCode::Sub, 0),
            ("/", n) if n >= 2 => fold_left!(OpCode::Div, 1),
            ("mod", 2) => {
                self.compile_node(&args[0])?;
                self.compile_node(&args[1])?;
                self.emit_bare(OpCode::Mod, loc);
                return Ok(Some(()));
            }
            ("rem", 2) => {
                self.compile_node(&args[0])?;
                self.compile_node(&args[1])?;
                self.emit_bare(OpCode::Rem, loc);
                return Ok(Some(()));
            }
            ("<", 2) => self.binary_intrinsic(OpCode::Lt, args, loc)?,
            ("<=", 2) => self.binary_intrinsic(OpCode::Le, args, loc)?,
            (">", 2) => self.binary_intrinsic(OpCode::Gt, args, loc)?,
            (">=", 2) => self.binary_intrinsic(OpCode::Ge, args, loc)?,
            ("=", 2) => self.binary_intrinsic(OpCode::Eq, args, loc)?,
            ("not=", 2) => self.binary_intrinsic(OpCode::Neq, args, loc)?,
            ("list", n) => {
                for a in args {
                    self.compile_node(a)?;
                }
                self.emit(OpCode::ListNew, n as u16, loc);
            }
            ("vector", n) => {
                for a in args {
                    self.compile_node(a)?;
                }
                self.emit(OpCode::VecNew, n as u16, loc);
            }
            ("hash-map", n) if n % 2 == 0 => {
                for a in args {
                    self.compile_node(a)?;
                }
                self.emit(OpCode::MapNew, (n / 2) as u16, loc);
            }
            ("hash-set", n) => {
                for a in args {
                    self.compile_node(a)?;
                }
                self.emit(OpCode::SetNew, n as u16, loc);
            }
            _ => return Ok(None),
        }
        Ok(Some(()))
    }

    fn binary_intrinsic(&mut self, op: OpCode, args: &[Rc<Node>], loc: &SourceLocation) -> Result<(), CompileError> {
        self.compile_node(&args[0])?;
        self.compile_node(&args[1])?;
        self.emit_bare(op, loc);
        Ok(())
    }

    fn compile_def(
        &mut self,
        name: Rc<str>,
        init: &Option<Rc<Node>>,
        flags: crate::node::DefFlags,
        doc: Option<Rc<str>>,
        arglists: Option<Value>,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        match init {
            Some(init) => self.compile_node(init)?,
            None => self.emit_bare(OpCode::PushNil, loc) as usize,
        };
        let _ = (doc, arglists); // carried on the Def node's metadata map, read by the VM at Def-time
        let name_idx = self.add_constant(Value::Symbol(SymbolValue::unqualified(name)))?;
        let op = if flags.is_macro {
            OpCode::DefMacro
        } else if flags.dynamic {
            OpCode::DefDynamic
        } else if flags.private {
            OpCode::DefPrivate
        } else {
            OpCode::Def
        };
        self.emit(op, name_idx, loc);
        Ok(())
    }

    fn compile_set_var(&mut self, ns: Option<Rc<str>>, name: Rc<str>, expr: &Node, loc: &SourceLocation) -> Result<(), CompileError> {
        self.compile_node(expr)?;
        let idx = self.var_symbol_constant(ns, name)?;
        self.emit(OpCode::SetVar, idx, loc);
        Ok(())
    }

    fn compile_throw(&mut self, expr: &Node, loc: &SourceLocation) -> Result<(), CompileError> {
        self.compile_node(expr)?;
        self.emit_bare(OpCode::ThrowEx, loc);
        Ok(())
    }

    fn compile_finally_block(&mut self, finally: &Node) -> Result<(), CompileError> {
        self.compile_node(finally)?;
        self.emit_bare(OpCode::Pop, &finally.loc);
        Ok(())
    }

    fn compile_try(
        &mut self,
        body: &Node,
        catch: Option<&crate::node::CatchClause>,
        finally: Option<&Rc<Node>>,
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        let try_begin_idx = self.emit_bare(OpCode::TryBegin, loc);
        self.compile_node(body)?;
        if let Some(finally) = finally {
            self.compile_finally_block(finally)?;
        }
        self.emit_bare(OpCode::PopHandler, loc);
        let jend_idx = self.emit_bare(OpCode::Jump, loc);
        let catch_start = self.here();
        self.patch(try_begin_idx, catch_start as u16);
        match catch {
            Some(clause) => {
                let locals_mark = self.frame().locals.len();
                let local_mark = self.frame().next_local;
                let slot = self.frame().push_local(clause.binding.clone());
                // VM leaves the thrown value at exactly this slot's stack
                // position on unwind — see vm.rs's `throw_ex` handling.
                let _ = slot;
                self.compile_node(&clause.body)?;
                self.emit(OpCode::PopUnder, 1, loc);
                self.frame().locals.truncate(locals_mark);
                self.frame().next_local = local_mark;
                if let Some(finally) = finally {
                    self.compile_finally_block(finally)?;
                }
            }
            None => {
                if let Some(finally) = finally {
                    self.compile_finally_block(finally)?;
                }
                self.emit_bare(OpCode::ThrowEx, loc);
            }
        }
        let end = self.here();
        self.patch(jend_idx, end as u16);
        Ok(())
    }

    fn compile_defmulti(&mut self, name: Rc<str>, dispatch_fn: &Node, default: Value, loc: &SourceLocation) -> Result<(), CompileError> {
        self.compile_node(dispatch_fn)?;
        let default_idx = self.add_constant(default)?;
        self.emit(OpCode::Const, default_idx, loc);
        let name_idx = self.add_constant(Value::Symbol(SymbolValue::unqualified(name)))?;
        self.emit(OpCode::DefMulti, name_idx, loc);
        Ok(())
    }

    fn compile_defmethod(&mut self, name: Rc<str>, dispatch_value: &Node, arity: &FnArity, loc: &SourceLocation) -> Result<(), CompileError> {
        self.compile_node(dispatch_value)?;
        self.compile_fn(None, std::slice::from_ref(arity), loc)?;
        let name_idx = self.add_constant(Value::Symbol(SymbolValue::unqualified(name)))?;
        self.emit(OpCode::DefMethod, name_idx, loc);
        Ok(())
    }

    fn compile_lazy_seq(&mut self, body: &Node, loc: &SourceLocation) -> Result<(), CompileError> {
        let thunk_arity = FnArity {
            params: Vec::new(),
            variadic: false,
            body: Rc::new(body.clone()),
        };
        self.compile_fn(None, std::slice::from_ref(&thunk_arity), loc)?;
        self.emit_bare(OpCode::LazySeqOp, loc);
        Ok(())
    }

    fn compile_defprotocol(&mut self, name: Rc<str>, method_names: Vec<Rc<str>>, loc: &SourceLocation) -> Result<(), CompileError> {
        let name_idx = self.add_constant(Value::Symbol(SymbolValue::unqualified(name)))?;
        let methods_value = Value::Vector(quill_runtime::collections::PVector::from_vec(
            method_names
                .into_iter()
                .map(|m| Value::Symbol(SymbolValue::unqualified(m)))
                .collect(),
        ));
        let methods_idx = self.add_constant(methods_value)?;
        self.emit(OpCode::Const, methods_idx, loc);
        self.emit(OpCode::DefProtocol, name_idx, loc);
        Ok(())
    }

    fn compile_extend_type(
        &mut self,
        protocol_ns: Option<Rc<str>>,
        protocol_name: Rc<str>,
        type_tag: Rc<str>,
        methods: &[(Rc<str>, FnArity)],
        loc: &SourceLocation,
    ) -> Result<(), CompileError> {
        for (method_name, arity) in methods {
            self.compile_fn(Some(method_name.clone()), std::slice::from_ref(arity), loc)?;
        }
        let protocol_idx = self.var_symbol_constant(protocol_ns, protocol_name)?;
        let type_idx = self.add_constant(Value::Str(type_tag))?;
        let names_value = Value::Vector(quill_runtime::collections::PVector::from_vec(
            methods
                .iter()
                .map(|(n, _)| Value::Symbol(SymbolValue::unqualified(n.clone())))
                .collect(),
        ));
        let names_idx = self.add_constant(names_value)?;
        self.emit(OpCode::Const, names_idx, loc);
        self.emit(OpCode::Const, type_idx, loc);
        self.emit(OpCode::ExtendType, protocol_idx, loc);
        Ok(())
    }
}

/// Compiles a top-level form into a standalone chunk — effectively a
/// zero-argument, capture-less arity run with its own fresh frame. Nested
/// `fn` nodes become `FnProto`s referenced from this chunk's proto pool.
pub fn compile_top_level(node: &Node) -> Result<Chunk, CompileError> {
    let mut compiler = Compiler::new();
    compiler.compile_node(node)?;
    compiler.emit_bare(OpCode::Ret, &node.loc);
    let mut chunk = compiler.frames.pop().expect("top-level frame").chunk;
    run_peephole(&mut chunk);
    Ok(chunk)
}

// -- peephole / fusion pass (section 4.5 step 4, section 6.4) --------------

fn is_local_triplet_fusable(op: OpCode) -> Option<OpCode> {
    match op {
        OpCode::Add => Some(OpCode::AddLocals),
        OpCode::Sub => Some(OpCode::SubLocals),
        OpCode::Eq => Some(OpCode::EqLocals),
        OpCode::Lt => Some(OpCode::LtLocals),
        OpCode::Le => Some(OpCode::LeLocals),
        _ => None,
    }
}

fn is_local_const_triplet_fusable(op: OpCode) -> Option<OpCode> {
    match op {
        OpCode::Add => Some(OpCode::AddLocalConst),
        OpCode::Sub => Some(OpCode::SubLocalConst),
        OpCode::Eq => Some(OpCode::EqLocalConst),
        OpCode::Lt => Some(OpCode::LtLocalConst),
        OpCode::Le => Some(OpCode::LeLocalConst),
        _ => None,
    }
}

fn locals_compare_branch_fusion(op: OpCode) -> Option<OpCode> {
    match op {
        OpCode::EqLocals => Some(OpCode::BranchNeLocals),
        OpCode::LtLocals => Some(OpCode::BranchGeLocals),
        OpCode::LeLocals => Some(OpCode::BranchGtLocals),
        _ => None,
    }
}

fn jump_targets(chunk: &Chunk) -> std::collections::HashSet<usize> {
    let mut targets = std::collections::HashSet::new();
    for instr in &chunk.instructions {
        match instr.op {
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::TryBegin => {
                targets.insert(instr.operand as usize);
            }
            _ => {}
        }
    }
    targets
}

/// Runs the fusion passes described in section 4.5 step 2/4: `local_load;
/// local_load; op` and `local_load; const_load; op` triplets collapse to
/// one fused opcode, and an immediately-following `jump_if_false` over a
/// `*_locals` comparison collapses further into a compare-and-branch
/// opcode. Jump operands are absolute instruction indices in this
/// implementation (not signed ip-relative deltas as literally described in
/// section 6.4 — see `DESIGN.md` for why that simplification is safe here),
/// so no offset rewriting is needed after instructions are dropped; we
/// only need to avoid fusing across an existing jump target and to shift
/// every target by how many earlier instructions were removed.
fn run_peephole(chunk: &mut Chunk) {
    let targets = jump_targets(chunk);
    let mut fused: Vec<Instr> = Vec::with_capacity(chunk.instructions.len());
    let mut fused_lines = Vec::with_capacity(chunk.instructions.len());
    let mut fused_cols = Vec::with_capacity(chunk.instructions.len());
    let mut old_to_new = vec![0usize; chunk.instructions.len() + 1];

    let old = &chunk.instructions;
    let mut i = 0;
    while i < old.len() {
        old_to_new[i] = fused.len();
        let can_fuse_here = |at: usize, span: usize| -> bool {
            (1..span).all(|k| !targets.contains(&(at + k)))
        };
        // local_load; local_load; op
        if i + 2 < old.len()
            && old[i].op == OpCode::LocalLoad
            && old[i + 1].op == OpCode::LocalLoad
            && can_fuse_here(i, 3)
        {
            if let Some(fused_op) = is_local_triplet_fusable(old[i + 2].op) {
                let packed = pack_recur_operand(old[i].operand as u8, old[i + 1].operand as u8);
                // a following jump_if_false over a comparison fuses once more
                if matches!(fused_op, OpCode::EqLocals | OpCode::LtLocals | OpCode::LeLocals)
                    && i + 3 < old.len()
                    && old[i + 3].op == OpCode::JumpIfFalse
                    && can_fuse_here(i, 4)
                {
                    let branch_op = locals_compare_branch_fusion(fused_op).expect("checked above");
                    fused.push(Instr::new(branch_op, packed));
                    fused_lines.push(old[i].line);
                    fused_cols.push(old[i].column);
                    fused.push(Instr::new(OpCode::JumpIfFalse, old[i + 3].operand));
                    fused_lines.push(old[i + 3].line);
                    fused_cols.push(old[i + 3].column);
                    i += 4;
                    continue;
                }
                fused.push(Instr::new(fused_op, packed));
                fused_lines.push(old[i].line);
                fused_cols.push(old[i].column);
                i += 3;
                continue;
            }
        }
        // local_load; const(small); op — only fuses when the constant is a
        // small int that fits the packed operand's byte, matching the
        // instruction's role as a fast path rather than a general one.
        if i + 2 < old.len()
            && old[i].op == OpCode::LocalLoad
            && old[i + 1].op == OpCode::Const
            && can_fuse_here(i, 3)
        {
            if let (Some(fused_op), Some(Value::Int(n))) = (
                is_local_const_triplet_fusable(old[i + 2].op),
                chunk.constants.get(old[i + 1].operand as usize),
            ) {
                if *n >= 0 && *n <= u8::MAX as i64 {
                    let packed = pack_recur_operand(old[i].operand as u8, *n as u8);
                    fused.push(Instr::new(fused_op, packed));
                    fused_lines.push(old[i].line);
                    fused_cols.push(old[i].column);
                    i += 3;
                    continue;
                }
            }
        }
        // recur; jump_back
        if i + 1 < old.len() && old[i].op == OpCode::Recur && old[i + 1].op == OpCode::JumpBack && can_fuse_here(i, 2) {
            fused.push(Instr::new(OpCode::RecurLoop, old[i].operand));
            fused_lines.push(old[i].line);
            fused_cols.push(old[i].column);
            fused.push(old[i + 1]);
            fused_lines.push(old[i + 1].line);
            fused_cols.push(old[i + 1].column);
            i += 2;
            continue;
        }
        fused.push(old[i]);
        fused_lines.push(old[i].line);
        fused_cols.push(old[i].column);
        i += 1;
    }
    old_to_new[old.len()] = fused.len();

    for instr in fused.iter_mut() {
        if matches!(instr.op, OpCode::Jump | OpCode::JumpIfFalse | OpCode::TryBegin) {
            let old_target = instr.operand as usize;
            instr.operand = old_to_new.get(old_target).copied().unwrap_or(old_target) as u16;
        }
    }

    chunk.instructions = fused;
    chunk.lines = fused_lines;
    chunk.columns = fused_cols;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use quill_core::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::unknown()
    }

    fn constant(v: Value) -> Rc<Node> {
        Node::new(NodeKind::Constant(v), loc())
    }

    #[test]
    fn compiles_simple_addition_via_intrinsic_lowering() {
        let call = Node::new(
            NodeKind::Call {
                callee: Node::new(NodeKind::VarRef { ns: None, name: Rc::from("+") }, loc()),
                args: vec![constant(Value::Int(1)), constant(Value::Int(2))],
            },
            loc(),
        );
        let chunk = compile_top_level(&call).unwrap();
        assert!(chunk.instructions.iter().any(|i| i.op == OpCode::Add));
        assert!(!chunk.instructions.iter().any(|i| i.op == OpCode::Call));
    }

    #[test]
    fn let_closes_with_pop_under_binding_count() {
        let node = Node::new(
            NodeKind::Let {
                bindings: vec![(Rc::from("a"), constant(Value::Int(1))), (Rc::from("b"), constant(Value::Int(2)))],
                body: Node::new(NodeKind::LocalRef { name: Rc::from("a"), slot: 0 }, loc()),
            },
            loc(),
        );
        let chunk = compile_top_level(&node).unwrap();
        let pop_under = chunk.instructions.iter().find(|i| i.op == OpCode::PopUnder).unwrap();
        assert_eq!(pop_under.operand, 2);
    }

    #[test]
    fn recur_outside_loop_or_fn_is_an_error() {
        let node = Node::new(NodeKind::Recur(vec![constant(Value::Int(1))]), loc());
        assert!(compile_top_level(&node).is_err());
    }

    #[test]
    fn nested_fn_captures_enclosing_let_binding() {
        let inner_fn = Node::new(
            NodeKind::Fn {
                name: None,
                arities: vec![FnArity {
                    params: Vec::new(),
                    variadic: false,
                    body: Node::new(NodeKind::LocalRef { name: Rc::from("x"), slot: 0 }, loc()),
                }],
            },
            loc(),
        );
        let node = Node::new(
            NodeKind::Let {
                bindings: vec![(Rc::from("x"), constant(Value::Int(42)))],
                body: inner_fn,
            },
            loc(),
        );
        let chunk = compile_top_level(&node).unwrap();
        let proto = &chunk.protos[0];
        assert_eq!(proto.capture_names.len(), 1);
        assert_eq!(&*proto.capture_names[0], "x");
        assert!(matches!(proto.arities[0].captures[0], CaptureSource::Local(0)));
    }
}
