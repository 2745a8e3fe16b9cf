//! Surface `Form` to analyzed `Node`: special-form recognition, macro
//! expansion (macro vars are called with their surface forms converted to
//! plain data `Value`s and the result converted back, the standard
//! Lisp-macro bridge), local scope/slot resolution, and destructuring
//! lowering for `[a b & rest :as all]` and `{:keys [...] :or {...} :as s}`
//! binding patterns.
//!
//! Slots are assigned from one counter that never resets across the whole
//! analysis run (not per-function), so `quill-compiler`'s bytecode compiler
//! can tell "is this slot bound in the frame I'm compiling, or an
//! enclosing one" just by set membership, with no risk of two unrelated
//! locals colliding on the same number.

use crate::node::{CatchClause, DefFlags, FnArity, Node, NodeKind};
use quill_core::SourceLocation;
use quill_reader::form::{Form, SForm, Symbol};
use quill_runtime::collections::array_map::ArrayMap;
use quill_runtime::collections::{PList, PSet, PVector};
use quill_runtime::environment::Environment;
use quill_runtime::error::{Phase, QuillError};
use quill_runtime::regex_val::RegexValue;
use quill_runtime::symbol::{KeywordValue, SymbolValue};
use quill_runtime::value::Value;
use std::rc::Rc;

#[derive(Default)]
struct ScopeFrame {
    bindings: Vec<(Rc<str>, usize)>,
    parent: Option<Scope>,
}

type Scope = Rc<ScopeFrame>;

fn root_scope() -> Scope {
    Rc::new(ScopeFrame::default())
}

fn extend_scope(parent: &Scope, bindings: Vec<(Rc<str>, usize)>) -> Scope {
    Rc::new(ScopeFrame {
        bindings,
        parent: Some(parent.clone()),
    })
}

fn lookup_scope(scope: &Scope, name: &str) -> Option<usize> {
    if let Some((_, slot)) = scope.bindings.iter().rev().find(|(n, _)| &**n == name) {
        return Some(*slot);
    }
    scope.parent.as_ref().and_then(|p| lookup_scope(p, name))
}

/// A pattern lowered to a concrete local: its bound name (for the
/// tree-walk evaluator's name-keyed scope), the slot assigned to it (for
/// the bytecode compiler's frame-index resolution), and the expression
/// that produces its value.
type Binding = (Rc<str>, usize, Rc<Node>);

pub struct Analyzer<'e> {
    env: &'e mut Environment,
    next_slot: usize,
    gensym: usize,
}

const SPECIAL_FORMS: &[&str] = &[
    "def", "defmacro", "fn", "fn*", "let", "let*", "letfn", "letfn*", "loop", "loop*", "recur",
    "if", "do", "quote", "var", "throw", "try", "set!", "defmulti", "defmethod", "lazy-seq",
    "defprotocol", "extend-type",
];

impl<'e> Analyzer<'e> {
    pub fn new(env: &'e mut Environment) -> Self {
        Analyzer {
            env,
            next_slot: 0,
            gensym: 0,
        }
    }

    fn fresh_slot(&mut self) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn gensym(&mut self, prefix: &str) -> Rc<str> {
        self.gensym += 1;
        Rc::from(format!("__{prefix}{}", self.gensym))
    }

    /// Analyzes one top-level form. Callers (the top-level driver in
    /// `eval.rs`, and the bootstrap loader in `bridge.rs`) analyze and then
    /// immediately evaluate each top-level form in turn, so that a
    /// `defmacro` earlier in a source file is already callable by the time
    /// a later form references it.
    pub fn analyze_top_level(&mut self, form: &SForm) -> Result<Rc<Node>, QuillError> {
        let scope = root_scope();
        self.analyze(form, &scope)
    }

    fn analyze(&mut self, form: &SForm, scope: &Scope) -> Result<Rc<Node>, QuillError> {
        let loc = form.loc.clone();
        match &form.node {
            Form::Nil => Ok(Node::new(NodeKind::Constant(Value::Nil), loc)),
            Form::Bool(b) => Ok(Node::new(NodeKind::Constant(Value::Bool(*b)), loc)),
            Form::Int(i) => Ok(Node::new(NodeKind::Constant(Value::Int(*i)), loc)),
            Form::Float(f) => Ok(Node::new(NodeKind::Constant(Value::Float(*f)), loc)),
            Form::Char(c) => Ok(Node::new(NodeKind::Constant(Value::Char(*c)), loc)),
            Form::Str(s) => Ok(Node::new(NodeKind::Constant(Value::Str(s.clone())), loc)),
            Form::Keyword(sym) => Ok(Node::new(NodeKind::Constant(keyword_value(sym)), loc)),
            Form::Regex(pattern) => {
                let compiled = RegexValue::compile(pattern.clone())
                    .map_err(|e| QuillError::syntax(Phase::Analyze, format!("invalid regex: {e}")))?;
                Ok(Node::new(NodeKind::Constant(Value::Regex(compiled)), loc))
            }
            Form::Symbol(sym) => self.analyze_symbol(sym, scope, loc),
            Form::Vector(items) => {
                let args = self.analyze_all(items, scope)?;
                Ok(self.call_node("vector", args, loc))
            }
            Form::Set(items) => {
                let args = self.analyze_all(items, scope)?;
                Ok(self.call_node("hash-set", args, loc))
            }
            Form::Map(pairs) => {
                let mut args = Vec::with_capacity(pairs.len() * 2);
                for (k, v) in pairs {
                    args.push(self.analyze(k, scope)?);
                    args.push(self.analyze(v, scope)?);
                }
                Ok(self.call_node("hash-map", args, loc))
            }
            Form::List(items) => self.analyze_list(items, loc, scope),
        }
    }

    fn analyze_symbol(&mut self, sym: &Symbol, scope: &Scope, loc: SourceLocation) -> Result<Rc<Node>, QuillError> {
        if sym.ns.is_none() {
            if let Some(slot) = lookup_scope(scope, &sym.name) {
                return Ok(Node::new(
                    NodeKind::LocalRef {
                        name: sym.name.clone(),
                        slot,
                    },
                    loc,
                ));
            }
        }
        Ok(Node::new(
            NodeKind::VarRef {
                ns: sym.ns.clone(),
                name: sym.name.clone(),
            },
            loc,
        ))
    }

    fn analyze_all(&mut self, forms: &[SForm], scope: &Scope) -> Result<Vec<Rc<Node>>, QuillError> {
        forms.iter().map(|f| self.analyze(f, scope)).collect()
    }

    fn call_node(&self, name: &str, args: Vec<Rc<Node>>, loc: SourceLocation) -> Rc<Node> {
        let callee = Node::new(
            NodeKind::VarRef {
                ns: None,
                name: Rc::from(name),
            },
            loc.clone(),
        );
        Node::new(NodeKind::Call { callee, args }, loc)
    }

    fn analyze_list(&mut self, items: &[SForm], loc: SourceLocation, scope: &Scope) -> Result<Rc<Node>, QuillError> {
        if items.is_empty() {
            return Ok(Node::new(NodeKind::Constant(Value::List(PList::empty())), loc));
        }
        if let Form::Symbol(head) = &items[0].node {
            if head.ns.is_none() {
                let name: &str = &head.name;
                if SPECIAL_FORMS.contains(&name) {
                    return self.analyze_special(name, &items[1..], loc, scope);
                }
                if let Some(var) = self.env.resolve_var(&SymbolValue::unqualified(head.name.clone())) {
                    if var.is_macro() {
                        tracing::debug!(macro_name = %head.name, "expanding macro");
                        let macro_fn = var.get();
                        let arg_values: Vec<Value> = items[1..].iter().map(form_to_value).collect();
                        let expanded = self
                            .env
                            .call_value(&macro_fn, &arg_values)
                            .map_err(|e| e.with_location(loc.clone()))?;
                        let expanded_form = value_to_form(&expanded, &loc);
                        return self.analyze(&expanded_form, scope);
                    }
                }
            }
        }
        let callee = self.analyze(&items[0], scope)?;
        let args = self.analyze_all(&items[1..], scope)?;
        Ok(Node::new(NodeKind::Call { callee, args }, loc))
    }

    fn analyze_special(
        &mut self,
        name: &str,
        rest: &[SForm],
        loc: SourceLocation,
        scope: &Scope,
    ) -> Result<Rc<Node>, QuillError> {
        match name {
            "quote" => {
                let value = form_to_value(&rest[0]);
                Ok(Node::new(NodeKind::Quote(value), loc))
            }
            "var" => {
                let sym = expect_symbol(&rest[0])?;
                let var = self
                    .env
                    .resolve_var(&SymbolValue {
                        ns: sym.ns.clone(),
                        name: sym.name.clone(),
                        meta: Default::default(),
                    })
                    .ok_or_else(|| QuillError::name_error(Phase::Analyze, format!("unable to resolve var: {sym}")))?;
                Ok(Node::new(NodeKind::Constant(Value::VarRef(var)), loc))
            }
            "if" => {
                let test = self.analyze(&rest[0], scope)?;
                let then = self.analyze(&rest[1], scope)?;
                let els = if rest.len() > 2 {
                    self.analyze(&rest[2], scope)?
                } else {
                    Node::new(NodeKind::Constant(Value::Nil), loc.clone())
                };
                Ok(Node::new(NodeKind::If { test, then, els }, loc))
            }
            "do" => {
                let body = self.analyze_all(rest, scope)?;
                Ok(Node::new(NodeKind::Do(body), loc))
            }
            "let" | "let*" => self.analyze_let(rest, loc, scope, false),
            "letfn" | "letfn*" => self.analyze_letfn(rest, loc, scope),
            "loop" | "loop*" => self.analyze_let(rest, loc, scope, true),
            "recur" => {
                let args = self.analyze_all(rest, scope)?;
                Ok(Node::new(NodeKind::Recur(args), loc))
            }
            "fn" | "fn*" => self.analyze_fn(rest, loc, scope),
            "def" => self.analyze_def(rest, loc, scope, false),
            "defmacro" => self.analyze_def(rest, loc, scope, true),
            "set!" => {
                let (ns, var_name) = match &rest[0].node {
                    Form::Symbol(sym) => (sym.ns.clone(), sym.name.clone()),
                    _ => return Err(QuillError::syntax(Phase::Analyze, "set! target must be a symbol")),
                };
                let expr = self.analyze(&rest[1], scope)?;
                Ok(Node::new(NodeKind::SetVar { ns, name: var_name, expr }, loc))
            }
            "throw" => {
                let expr = self.analyze(&rest[0], scope)?;
                Ok(Node::new(NodeKind::Throw(expr), loc))
            }
            "try" => self.analyze_try(rest, loc, scope),
            "defmulti" => {
                let sym = expect_symbol(&rest[0])?;
                let dispatch_fn = self.analyze(&rest[1], scope)?;
                let default_dispatch_value = rest
                    .get(2)
                    .map(form_to_value)
                    .unwrap_or_else(|| Value::Keyword(KeywordValue::unqualified("default")));
                Ok(Node::new(
                    NodeKind::DefMulti {
                        name: sym.name.clone(),
                        dispatch_fn,
                        default_dispatch_value,
                    },
                    loc,
                ))
            }
            "defmethod" => {
                let sym = expect_symbol(&rest[0])?;
                let dispatch_value = self.analyze(&rest[1], scope)?;
                let params_form = &rest[2];
                let body_forms = &rest[3..];
                let arity = self.analyze_arity(params_form, body_forms, scope)?;
                Ok(Node::new(
                    NodeKind::DefMethod {
                        name: sym.name.clone(),
                        dispatch_value,
                        arity,
                    },
                    loc,
                ))
            }
            "lazy-seq" => {
                let body = self.analyze_all(rest, scope)?;
                let body_node = Node::new(NodeKind::Do(body), loc.clone());
                Ok(Node::new(NodeKind::LazySeq(body_node), loc))
            }
            "defprotocol" => {
                let sym = expect_symbol(&rest[0])?;
                let mut method_names = Vec::new();
                for spec in &rest[1..] {
                    if let Form::List(items) = &spec.node {
                        if let Some(first) = items.first() {
                            let m = expect_symbol(first)?;
                            method_names.push(m.name.clone());
                        }
                    }
                }
                Ok(Node::new(
                    NodeKind::DefProtocol {
                        name: sym.name.clone(),
                        method_names,
                    },
                    loc,
                ))
            }
            "extend-type" => {
                let type_tag = expect_symbol(&rest[0])?;
                let mut protocol_ns = None;
                let mut protocol_name: Option<Rc<str>> = None;
                let mut methods = Vec::new();
                let mut i = 1;
                while i < rest.len() {
                    let proto_sym = expect_symbol(&rest[i])?;
                    protocol_ns = proto_sym.ns.clone();
                    protocol_name = Some(proto_sym.name.clone());
                    i += 1;
                    while i < rest.len() {
                        if let Form::List(items) = &rest[i].node {
                            let method_name = expect_symbol(&items[0])?;
                            let arity = self.analyze_arity(&items[1], &items[2..], scope)?;
                            methods.push((method_name.name.clone(), arity));
                            i += 1;
                        } else {
                            break;
                        }
                    }
                }
                Ok(Node::new(
                    NodeKind::ExtendType {
                        protocol_ns,
                        protocol_name: protocol_name
                            .ok_or_else(|| QuillError::syntax(Phase::Analyze, "extend-type missing protocol name"))?,
                        type_tag: type_tag.name.clone(),
                        methods,
                    },
                    loc,
                ))
            }
            other => unreachable!("{other} listed in SPECIAL_FORMS but not handled"),
        }
    }

    fn analyze_let(
        &mut self,
        rest: &[SForm],
        loc: SourceLocation,
        scope: &Scope,
        is_loop: bool,
    ) -> Result<Rc<Node>, QuillError> {
        let binding_forms = expect_vector(&rest[0])?.to_vec();
        let mut inner_scope = scope.clone();
        let mut bindings = Vec::new();
        let mut i = 0;
        while i < binding_forms.len() {
            let pattern = &binding_forms[i];
            let init_form = &binding_forms[i + 1];
            let init = self.analyze(init_form, &inner_scope)?;
            let mut new_bindings = Vec::new();
            self.destructure(pattern, init, &inner_scope, &mut new_bindings)?;
            for (name, slot, _) in &new_bindings {
                inner_scope = extend_scope(&inner_scope, vec![(name.clone(), *slot)]);
            }
            bindings.extend(new_bindings.into_iter().map(|(n, _, node)| (n, node)));
            i += 2;
        }
        let body_forms = &rest[1..];
        let body = self.analyze_body(body_forms, &inner_scope, loc.clone())?;
        let kind = if is_loop {
            NodeKind::Loop { bindings, body }
        } else {
            NodeKind::Let { bindings, body }
        };
        Ok(Node::new(kind, loc))
    }

    fn analyze_letfn(&mut self, rest: &[SForm], loc: SourceLocation, scope: &Scope) -> Result<Rc<Node>, QuillError> {
        let binding_forms = expect_vector(&rest[0])?.to_vec();
        let mut names = Vec::new();
        let mut i = 0;
        while i < binding_forms.len() {
            names.push(expect_symbol(&binding_forms[i])?.name.clone());
            i += 2;
        }
        let slots: Vec<usize> = names.iter().map(|_| self.fresh_slot()).collect();
        let inner_scope = extend_scope(scope, names.iter().cloned().zip(slots.iter().cloned()).collect());
        let mut bindings = Vec::new();
        let mut i = 0;
        let mut idx = 0;
        while i < binding_forms.len() {
            let init = self.analyze(&binding_forms[i + 1], &inner_scope)?;
            bindings.push((names[idx].clone(), init));
            i += 2;
            idx += 1;
        }
        let body = self.analyze_body(&rest[1..], &inner_scope, loc.clone())?;
        Ok(Node::new(NodeKind::LetFn { bindings, body }, loc))
    }

    fn analyze_body(&mut self, forms: &[SForm], scope: &Scope, loc: SourceLocation) -> Result<Rc<Node>, QuillError> {
        let analyzed = self.analyze_all(forms, scope)?;
        if analyzed.len() == 1 {
            Ok(analyzed.into_iter().next().unwrap())
        } else {
            Ok(Node::new(NodeKind::Do(analyzed), loc))
        }
    }

    /// Lowers one binding pattern (a plain symbol or a destructuring
    /// pattern) against an already-analyzed `source` node, appending
    /// `(name, slot, init_node)` triples to `out` in bind order. `scope` is
    /// the scope any non-pattern subexpressions embedded in the pattern
    /// (`:or` defaults, general `{pattern key-expr}` key expressions) are
    /// analyzed against — the enclosing scope, not the pattern's own
    /// synthetic bindings.
    fn destructure(&mut self, pattern: &SForm, source: Rc<Node>, scope: &Scope, out: &mut Vec<Binding>) -> Result<(), QuillError> {
        match &pattern.node {
            Form::Symbol(sym) if sym.ns.is_none() => {
                let slot = self.fresh_slot();
                out.push((sym.name.clone(), slot, source));
                Ok(())
            }
            Form::Vector(items) => {
                let coll_name = self.gensym("vec");
                let coll_slot = self.fresh_slot();
                out.push((coll_name.clone(), coll_slot, source));
                let coll_ref = |loc: &SourceLocation| {
                    Node::new(
                        NodeKind::LocalRef {
                            name: coll_name.clone(),
                            slot: coll_slot,
                        },
                        loc.clone(),
                    )
                };
                let mut idx = 0usize;
                let mut i = 0;
                while i < items.len() {
                    match &items[i].node {
                        Form::Symbol(Symbol { ns: None, name }) if &**name == "&" => {
                            let rest_pattern = &items[i + 1];
                            let mut rest_expr = coll_ref(&pattern.loc);
                            for _ in 0..idx {
                                rest_expr = self.call_node("rest", vec![rest_expr], pattern.loc.clone());
                            }
                            self.destructure(rest_pattern, rest_expr, scope, out)?;
                            i += 2;
                        }
                        Form::Symbol(Symbol { ns: None, name }) if &**name == ":as" => {
                            let as_name = expect_symbol(&items[i + 1])?;
                            let slot = self.fresh_slot();
                            out.push((as_name.name.clone(), slot, coll_ref(&pattern.loc)));
                            i += 2;
                        }
                        _ => {
                            let idx_const = Node::new(NodeKind::Constant(Value::Int(idx as i64)), pattern.loc.clone());
                            let nth_expr = self.call_node("nth", vec![coll_ref(&pattern.loc), idx_const], pattern.loc.clone());
                            self.destructure(&items[i], nth_expr, scope, out)?;
                            idx += 1;
                            i += 1;
                        }
                    }
                }
                Ok(())
            }
            Form::Map(pairs) => {
                let coll_name = self.gensym("map");
                let coll_slot = self.fresh_slot();
                out.push((coll_name.clone(), coll_slot, source));
                let coll_ref = |loc: &SourceLocation| {
                    Node::new(
                        NodeKind::LocalRef {
                            name: coll_name.clone(),
                            slot: coll_slot,
                        },
                        loc.clone(),
                    )
                };
                let mut default_for: Vec<(Rc<str>, SForm)> = Vec::new();
                for (k, v) in pairs {
                    if let Form::Keyword(Symbol { ns: None, name }) = &k.node {
                        match &**name {
                            "keys" => {
                                for key_form in expect_vector(v)? {
                                    let key_sym = expect_symbol(key_form)?;
                                    let key_const = Node::new(
                                        NodeKind::Constant(Value::Keyword(KeywordValue::unqualified(key_sym.name.clone()))),
                                        pattern.loc.clone(),
                                    );
                                    let get_expr = self.call_node("get", vec![coll_ref(&pattern.loc), key_const], pattern.loc.clone());
                                    let slot = self.fresh_slot();
                                    out.push((key_sym.name.clone(), slot, get_expr));
                                }
                                continue;
                            }
                            "or" => {
                                if let Form::Map(or_pairs) = &v.node {
                                    for (dk, dv) in or_pairs {
                                        default_for.push((expect_symbol(dk)?.name.clone(), dv.clone()));
                                    }
                                }
                                continue;
                            }
                            "as" => {
                                let as_sym = expect_symbol(v)?;
                                let slot = self.fresh_slot();
                                out.push((as_sym.name.clone(), slot, coll_ref(&pattern.loc)));
                                continue;
                            }
                            _ => {}
                        }
                    }
                    let key_expr = self.analyze(v, scope)?;
                    let get_expr = self.call_node("get", vec![coll_ref(&pattern.loc), key_expr], pattern.loc.clone());
                    self.destructure(k, get_expr, scope, out)?;
                }
                for (name, default_form) in default_for {
                    if let Some(entry) = out.iter_mut().find(|(n, _, _)| **n == *name) {
                        let default_node = self.analyze(&default_form, scope)?;
                        let current = entry.2.clone();
                        let loc = current.loc.clone();
                        let nil_check = self.call_node("nil?", vec![current.clone()], loc.clone());
                        entry.2 = Node::new(
                            NodeKind::If {
                                test: nil_check,
                                then: default_node,
                                els: current,
                            },
                            loc,
                        );
                    }
                }
                Ok(())
            }
            other => Err(QuillError::syntax(
                Phase::Analyze,
                format!("unsupported binding pattern: {other:?}"),
            )),
        }
    }

    fn analyze_fn(&mut self, rest: &[SForm], loc: SourceLocation, scope: &Scope) -> Result<Rc<Node>, QuillError> {
        let mut idx = 0;
        let mut name = None;
        if let Some(Form::Symbol(sym)) = rest.first().map(|f| &f.node) {
            name = Some(sym.name.clone());
            idx += 1;
        }
        let mut arities = Vec::new();
        if let Some(Form::Vector(_)) = rest.get(idx).map(|f| &f.node) {
            let params = &rest[idx];
            let body = &rest[idx + 1..];
            arities.push(self.analyze_arity(params, body, scope)?);
        } else {
            for clause in &rest[idx..] {
                if let Form::List(items) = &clause.node {
                    let params = &items[0];
                    let body = &items[1..];
                    arities.push(self.analyze_arity(params, body, scope)?);
                }
            }
        }
        Ok(Node::new(NodeKind::Fn { name, arities }, loc))
    }

    fn analyze_arity(&mut self, params_form: &SForm, body_forms: &[SForm], scope: &Scope) -> Result<FnArity, QuillError> {
        let params = expect_vector(params_form)?.to_vec();
        let mut flat_params = Vec::new();
        let mut variadic = false;
        let mut param_scope = scope.clone();
        let mut pre_bindings: Vec<(Rc<str>, Rc<Node>)> = Vec::new();
        let mut i = 0;
        while i < params.len() {
            if let Form::Symbol(Symbol { ns: None, name }) = &params[i].node {
                if &**name == "&" {
                    variadic = true;
                    i += 1;
                    continue;
                }
            }
            match &params[i].node {
                Form::Symbol(sym) if sym.ns.is_none() => {
                    let slot = self.fresh_slot();
                    flat_params.push(sym.name.clone());
                    param_scope = extend_scope(&param_scope, vec![(sym.name.clone(), slot)]);
                }
                _ => {
                    let synth = self.gensym("arg");
                    let slot = self.fresh_slot();
                    flat_params.push(synth.clone());
                    param_scope = extend_scope(&param_scope, vec![(synth.clone(), slot)]);
                    let source = Node::new(NodeKind::LocalRef { name: synth, slot }, params[i].loc.clone());
                    let mut new_bindings = Vec::new();
                    self.destructure(&params[i], source, &param_scope, &mut new_bindings)?;
                    for (n, s, node) in new_bindings {
                        param_scope = extend_scope(&param_scope, vec![(n.clone(), s)]);
                        pre_bindings.push((n, node));
                    }
                }
            }
            i += 1;
        }
        let default_loc = body_forms.first().map(|f| f.loc.clone()).unwrap_or_else(SourceLocation::unknown);
        let body = self.analyze_body(body_forms, &param_scope, default_loc)?;
        let body = if pre_bindings.is_empty() {
            body
        } else {
            let loc = body.loc.clone();
            Node::new(
                NodeKind::Let {
                    bindings: pre_bindings,
                    body,
                },
                loc,
            )
        };
        Ok(FnArity {
            params: flat_params,
            variadic,
            body,
        })
    }

    fn analyze_def(&mut self, rest: &[SForm], loc: SourceLocation, scope: &Scope, is_macro: bool) -> Result<Rc<Node>, QuillError> {
        let sym = expect_symbol(&rest[0])?;
        let mut doc = None;
        let mut value_idx = 1;
        if rest.len() > 2 {
            if let Form::Str(s) = &rest[1].node {
                doc = Some(s.clone());
                value_idx = 2;
            }
        }
        let init = if is_macro {
            let mut fn_form_items = vec![rest[0].clone()];
            fn_form_items.extend(rest[value_idx..].iter().cloned());
            Some(self.analyze_fn(&fn_form_items, loc.clone(), scope)?)
        } else if rest.len() > value_idx {
            Some(self.analyze(&rest[value_idx], scope)?)
        } else {
            None
        };
        Ok(Node::new(
            NodeKind::Def {
                name: sym.name.clone(),
                init,
                flags: DefFlags {
                    is_macro,
                    ..Default::default()
                },
                doc,
                arglists: None,
            },
            loc,
        ))
    }

    fn analyze_try(&mut self, rest: &[SForm], loc: SourceLocation, scope: &Scope) -> Result<Rc<Node>, QuillError> {
        let mut body_forms = Vec::new();
        let mut catch = None;
        let mut finally = None;
        for form in rest {
            match &form.node {
                Form::List(items) if is_head(&items[0], "catch") => {
                    let exception_type = expect_symbol(&items[1])?.name.clone();
                    let binding = expect_symbol(&items[2])?.name.clone();
                    let slot = self.fresh_slot();
                    let inner_scope = extend_scope(scope, vec![(binding.clone(), slot)]);
                    let body = self.analyze_body(&items[3..], &inner_scope, form.loc.clone())?;
                    catch = Some(CatchClause {
                        binding,
                        exception_type,
                        body,
                    });
                }
                Form::List(items) if is_head(&items[0], "finally") => {
                    finally = Some(self.analyze_body(&items[1..], scope, form.loc.clone())?);
                }
                _ => body_forms.push(form.clone()),
            }
        }
        let body = self.analyze_body(&body_forms, scope, loc.clone())?;
        Ok(Node::new(NodeKind::Try { body, catch, finally }, loc))
    }
}

fn is_head(form: &SForm, name: &str) -> bool {
    matches!(&form.node, Form::Symbol(Symbol { ns: None, name: n }) if &**n == name)
}

fn expect_symbol(form: &SForm) -> Result<Symbol, QuillError> {
    match &form.node {
        Form::Symbol(sym) => Ok(sym.clone()),
        other => Err(QuillError::syntax(Phase::Analyze, format!("expected a symbol, got {other:?}"))),
    }
}

fn expect_vector(form: &SForm) -> Result<&[SForm], QuillError> {
    match &form.node {
        Form::Vector(items) => Ok(items),
        other => Err(QuillError::syntax(Phase::Analyze, format!("expected a vector, got {other:?}"))),
    }
}

fn keyword_value(sym: &Symbol) -> Value {
    match &sym.ns {
        Some(ns) => Value::Keyword(KeywordValue::qualified(ns.clone(), sym.name.clone())),
        None => Value::Keyword(KeywordValue::unqualified(sym.name.clone())),
    }
}

/// Converts a surface form into the plain data `Value` a macro function
/// receives as its arguments — the reader/analyzer boundary macros operate
/// across.
pub fn form_to_value(form: &SForm) -> Value {
    match &form.node {
        Form::Nil => Value::Nil,
        Form::Bool(b) => Value::Bool(*b),
        Form::Int(i) => Value::Int(*i),
        Form::Float(f) => Value::Float(*f),
        Form::Char(c) => Value::Char(*c),
        Form::Str(s) => Value::Str(s.clone()),
        Form::Symbol(sym) => Value::Symbol(match &sym.ns {
            Some(ns) => SymbolValue::qualified(ns.clone(), sym.name.clone()),
            None => SymbolValue::unqualified(sym.name.clone()),
        }),
        Form::Keyword(sym) => keyword_value(sym),
        Form::Regex(pattern) => RegexValue::compile(pattern.clone())
            .map(Value::Regex)
            .unwrap_or(Value::Nil),
        Form::List(items) => Value::List(PList::from_vec(items.iter().map(form_to_value).collect())),
        Form::Vector(items) => Value::Vector(PVector::from_vec(items.iter().map(form_to_value).collect())),
        Form::Set(items) => Value::Set(PSet::from_vec(items.iter().map(form_to_value).collect())),
        Form::Map(pairs) => Value::Map(ArrayMap::from_pairs(
            pairs.iter().map(|(k, v)| (form_to_value(k), form_to_value(v))).collect(),
        )),
    }
}

/// The inverse of `form_to_value`, reattaching `loc` to every resulting
/// form — used to turn a macro's expansion result back into something the
/// analyzer can recurse on.
pub fn value_to_form(value: &Value, loc: &SourceLocation) -> SForm {
    let node = match value {
        Value::Nil => Form::Nil,
        Value::Bool(b) => Form::Bool(*b),
        Value::Int(i) => Form::Int(*i),
        Value::Float(f) => Form::Float(*f),
        Value::Char(c) => Form::Char(*c),
        Value::Str(s) => Form::Str(s.clone()),
        Value::Symbol(sym) => Form::Symbol(Symbol {
            ns: sym.ns.clone(),
            name: sym.name.clone(),
        }),
        Value::Keyword(kw) => Form::Keyword(Symbol {
            ns: kw.ns.clone(),
            name: kw.name.clone(),
        }),
        Value::Regex(r) => Form::Regex(r.pattern.clone()),
        Value::List(l) => Form::List(l.iter().map(|v| value_to_form(&v, loc)).collect()),
        Value::Vector(v) => Form::Vector(v.iter().map(|v| value_to_form(&v, loc)).collect()),
        Value::Set(s) => Form::Set(s.values().iter().map(|v| value_to_form(v, loc)).collect()),
        Value::Map(m) => Form::Map(
            m.iter()
                .map(|(k, v)| (value_to_form(&k, loc), value_to_form(&v, loc)))
                .collect(),
        ),
        other => Form::Str(Rc::from(format!("{other:?}"))),
    };
    SForm::new(node, loc.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_reader::parser::read_all_forms;
    use quill_runtime::fn_val::{Dispatcher as DispatcherTrait, FnVal};

    struct NullDispatcher;
    impl DispatcherTrait for NullDispatcher {
        fn call(&self, _f: &Rc<FnVal>, _args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
            unreachable!("tests here don't exercise closures")
        }
    }

    fn analyze_one(src: &str, env: &mut Environment) -> Rc<Node> {
        let forms = read_all_forms(src, None).unwrap();
        let mut analyzer = Analyzer::new(env);
        analyzer.analyze_top_level(&forms[0]).unwrap()
    }

    #[test]
    fn if_lowers_to_if_node() {
        let mut env = Environment::new(Rc::new(NullDispatcher));
        let node = analyze_one("(if true 1 2)", &mut env);
        assert!(matches!(node.kind, NodeKind::If { .. }));
    }

    #[test]
    fn let_assigns_distinct_slots_to_each_binding() {
        let mut env = Environment::new(Rc::new(NullDispatcher));
        let node = analyze_one("(let [a 1 b 2] (+ a b))", &mut env);
        match &node.kind {
            NodeKind::Let { bindings, .. } => assert_eq!(bindings.len(), 2),
            other => panic!("expected Let, got {other:?}"),
        }
    }

    #[test]
    fn vector_destructure_lowers_to_nth_calls() {
        let mut env = Environment::new(Rc::new(NullDispatcher));
        let node = analyze_one("(let [[a b] [1 2]] a)", &mut env);
        match &node.kind {
            NodeKind::Let { bindings, .. } => assert_eq!(bindings.len(), 3), // synthetic coll + a + b
            other => panic!("expected Let, got {other:?}"),
        }
    }

    #[test]
    fn fn_with_plain_params_has_no_wrapper_let() {
        let mut env = Environment::new(Rc::new(NullDispatcher));
        let node = analyze_one("(fn [a b] (+ a b))", &mut env);
        match &node.kind {
            NodeKind::Fn { arities, .. } => {
                assert!(!matches!(arities[0].body.kind, NodeKind::Let { .. }));
            }
            other => panic!("expected Fn, got {other:?}"),
        }
    }
}
