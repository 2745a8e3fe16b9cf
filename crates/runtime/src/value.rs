//! `Value`: the single runtime type both the bytecode VM and the tree-walk
//! evaluator operate on. Heap-allocated payloads are `Rc`-backed (single
//! session, single thread — see the crate doc for why this isn't an arena)
//! so cloning a `Value` is always O(1).
//!
//! Equality (`==` via `PartialEq`) and hashing are *not* derived — see
//! `equality.rs`/`hashing.rs` for the structural/identity rules that a
//! derive can't express (cross-type numeric equality, content-based map/set
//! equality across representations, reference identity for the stateful
//! variants).

use crate::atom::{AtomCell, DelayCell, VolatileCell};
use crate::chunk::{ArrayChunkCell, ChunkBufferCell, ChunkedConsCell};
use crate::collections::{ArrayMap, HMap, PList, PSet, PVector};
use crate::cons::ConsCell;
use crate::fn_val::{BuiltinFn, FnVal};
use crate::lazy_seq::LazySeqCell;
use crate::multimethod::MultiFnValue;
use crate::protocol::{ProtocolFnValue, ProtocolValue};
use crate::regex_val::RegexValue;
use crate::symbol::{KeywordValue, SymbolValue};
use crate::transient::{TransientMapCell, TransientSetCell, TransientVectorCell};
use crate::var::Var;
use std::rc::Rc;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(Rc<str>),
    Symbol(Rc<SymbolValue>),
    Keyword(Rc<KeywordValue>),
    Regex(Rc<RegexValue>),

    List(PList),
    Vector(PVector),
    Map(ArrayMap),
    HashMap(HMap),
    Set(PSet),

    Cons(Rc<ConsCell>),
    ChunkedCons(Rc<ChunkedConsCell>),
    ArrayChunk(Rc<ArrayChunkCell>),
    ChunkBuffer(Rc<ChunkBufferCell>),
    LazySeq(Rc<LazySeqCell>),

    FnVal(Rc<FnVal>),
    BuiltinFn(Rc<BuiltinFn>),

    Atom(Rc<AtomCell>),
    Volatile(Rc<VolatileCell>),
    Delay(Rc<DelayCell>),

    Protocol(Rc<ProtocolValue>),
    ProtocolFn(Rc<ProtocolFnValue>),
    MultiFn(Rc<MultiFnValue>),

    VarRef(Rc<Var>),

    TransientVector(Rc<TransientVectorCell>),
    TransientMap(Rc<TransientMapCell>),
    TransientSet(Rc<TransientSetCell>),

    /// Wraps a value returned from `reduced`, signalling `reduce`/`transduce`
    /// to stop early. Never escapes into surface-level data the way the
    /// other variants do — only `reduce`'s builtin implementation unwraps
    /// it — but it is a first-class `Value` so it can travel through
    /// ordinary call/return paths without a side channel.
    Reduced(Rc<Value>),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Truthiness: only `nil` and `false` are falsy, everything else
    /// (including `0`, `""`, and empty collections) is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::Regex(_) => "regex",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) | Value::HashMap(_) => "map",
            Value::Set(_) => "set",
            Value::Cons(_) | Value::ChunkedCons(_) => "seq",
            Value::ArrayChunk(_) => "chunk",
            Value::ChunkBuffer(_) => "chunk-buffer",
            Value::LazySeq(_) => "lazy-seq",
            Value::FnVal(_) | Value::BuiltinFn(_) => "function",
            Value::Atom(_) => "atom",
            Value::Volatile(_) => "volatile",
            Value::Delay(_) => "delay",
            Value::Protocol(_) => "protocol",
            Value::ProtocolFn(_) => "protocol-fn",
            Value::MultiFn(_) => "multifn",
            Value::VarRef(_) => "var",
            Value::TransientVector(_) => "transient-vector",
            Value::TransientMap(_) => "transient-map",
            Value::TransientSet(_) => "transient-set",
            Value::Reduced(_) => "reduced",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::equality::value_eq(self, other)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", crate::print::pr_str(self))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", crate::print::print_str(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_nil_and_false_are_falsy() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Str(Rc::from("")).is_truthy());
    }

    #[test]
    fn debug_uses_readable_print_form() {
        let v = Value::Str(Rc::from("hi"));
        assert_eq!(format!("{v:?}"), "\"hi\"");
    }
}
