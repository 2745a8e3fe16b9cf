//! `Node`: the analyzed AST both the bytecode compiler and the tree-walk
//! evaluator consume. Every surface form the analyzer accepts lowers to one
//! of these variants; destructuring patterns and macro calls never survive
//! analysis as such — by the time a `Node` exists, `let`/`fn` bindings are
//! scalar locals and every macro invocation has been expanded away.

use quill_core::SourceLocation;
use quill_runtime::Value;
use std::rc::Rc;

/// One function arity: its formal parameters (already flattened past any
/// destructuring — see `analyzer::destructure`), whether the last parameter
/// collects a variadic tail, and the analyzed body.
#[derive(Debug, Clone)]
pub struct FnArity {
    pub params: Vec<Rc<str>>,
    pub variadic: bool,
    pub body: Rc<Node>,
}

/// A `def`'s flags, lowered from `:dynamic`/`:private`/`:const` metadata on
/// the defined symbol (see `quill_runtime::var::Var`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefFlags {
    pub dynamic: bool,
    pub private: bool,
    pub is_const: bool,
    pub is_macro: bool,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub binding: Rc<str>,
    /// The exception-type symbol named in `(catch Type e ...)`. Quill has
    /// one exception channel (any thrown `Value`), so this is accepted and
    /// recorded but never narrows which throws are caught — see
    /// `DESIGN.md` for why `catch` doesn't type-filter.
    pub exception_type: Rc<str>,
    pub body: Rc<Node>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Constant(Value),
    LocalRef {
        name: Rc<str>,
        slot: usize,
    },
    VarRef {
        ns: Option<Rc<str>>,
        name: Rc<str>,
    },
    If {
        test: Rc<Node>,
        then: Rc<Node>,
        els: Rc<Node>,
    },
    Do(Vec<Rc<Node>>),
    /// `bindings` pairs a local name with its (already analyzed) init
    /// expression, in source order; the compiler emits each init in order
    /// so later bindings can reference earlier ones.
    Let {
        bindings: Vec<(Rc<str>, Rc<Node>)>,
        body: Rc<Node>,
    },
    /// `letfn`: like `let`, but every binding is visible inside every other
    /// binding's body (mutual recursion among the bound functions).
    LetFn {
        bindings: Vec<(Rc<str>, Rc<Node>)>,
        body: Rc<Node>,
    },
    Loop {
        bindings: Vec<(Rc<str>, Rc<Node>)>,
        body: Rc<Node>,
    },
    Recur(Vec<Rc<Node>>),
    Fn {
        name: Option<Rc<str>>,
        arities: Vec<FnArity>,
    },
    Call {
        callee: Rc<Node>,
        args: Vec<Rc<Node>>,
    },
    Def {
        name: Rc<str>,
        init: Option<Rc<Node>>,
        flags: DefFlags,
        doc: Option<Rc<str>>,
        arglists: Option<Value>,
    },
    SetVar {
        ns: Option<Rc<str>>,
        name: Rc<str>,
        expr: Rc<Node>,
    },
    Quote(Value),
    Throw(Rc<Node>),
    Try {
        body: Rc<Node>,
        catch: Option<CatchClause>,
        finally: Option<Rc<Node>>,
    },
    DefMulti {
        name: Rc<str>,
        dispatch_fn: Rc<Node>,
        default_dispatch_value: Value,
    },
    DefMethod {
        name: Rc<str>,
        dispatch_value: Rc<Node>,
        arity: FnArity,
    },
    /// `lazy-seq`: the analyzed body becomes the zero-arg thunk a `LazySeq`
    /// realizes on first access. The thunk is compiled as an ordinary
    /// zero-arity `Fn`; the `lazy_seq` opcode/tree-walk case just wraps the
    /// resulting closure.
    LazySeq(Rc<Node>),
    DefProtocol {
        name: Rc<str>,
        method_names: Vec<Rc<str>>,
    },
    ExtendType {
        protocol_ns: Option<Rc<str>>,
        protocol_name: Rc<str>,
        type_tag: Rc<str>,
        methods: Vec<(Rc<str>, FnArity)>,
    },
}

/// An analyzed node, carrying the source location it was read from (section
/// 3.4: "every node stores a source location").
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: SourceLocation,
}

impl Node {
    pub fn new(kind: NodeKind, loc: SourceLocation) -> Rc<Node> {
        Rc::new(Node { kind, loc })
    }
}
