//! Structural equality for `Value`, hand-written rather than `#[derive]`d
//! because the rules aren't a straightforward field-by-field comparison:
//!
//! - Numbers compare across `Int`/`Float` by numeric value, so `(= 1 1.0)`.
//! - Collections compare structurally by contents: two maps are equal if
//!   they have the same entries regardless of whether one is an `ArrayMap`
//!   and the other an `HMap`; likewise for the two set representations.
//! - Sequential things (`list`, `vector`, `cons`, a realized lazy seq)
//!   compare element-by-element across representations, so
//!   `(= '(1 2 3) [1 2 3])`.
//! - `reduced` wraps compare structurally on their inner value, like any
//!   other collection-shaped thing.
//! - Everything else (functions, atoms, vars, delays, protocols,
//!   multimethods, transients, regexes, unrealized lazy seqs) compares by
//!   reference identity: two are equal only if they're the same `Rc`.

use crate::value::Value;
use std::rc::Rc;

pub fn value_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x.ns == y.ns && x.name == y.name,
        (Value::Keyword(x), Value::Keyword(y)) => x.ns == y.ns && x.name == y.name,
        _ if is_map(a) && is_map(b) => map_eq(a, b),
        (Value::Set(x), Value::Set(y)) => {
            x.len() == y.len() && x.iter().all(|(item, _)| y.contains_key(&item))
        }
        _ if is_sequential(a) && is_sequential(b) => sequential_eq(a, b),
        (Value::Reduced(x), Value::Reduced(y)) => value_eq(x, y),
        _ => identity_eq(a, b),
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn is_map(v: &Value) -> bool {
    matches!(v, Value::Map(_) | Value::HashMap(_))
}

fn map_len(v: &Value) -> usize {
    match v {
        Value::Map(m) => m.len(),
        Value::HashMap(m) => m.len(),
        _ => 0,
    }
}

fn map_get(v: &Value, key: &Value) -> Option<Value> {
    match v {
        Value::Map(m) => m.get(key),
        Value::HashMap(m) => m.get(key),
        _ => None,
    }
}

fn map_iter(v: &Value) -> Vec<(Value, Value)> {
    match v {
        Value::Map(m) => m.iter().collect(),
        Value::HashMap(m) => m.iter(),
        _ => Vec::new(),
    }
}

fn map_eq(a: &Value, b: &Value) -> bool {
    map_len(a) == map_len(b)
        && map_iter(a)
            .into_iter()
            .all(|(k, v)| map_get(b, &k).is_some_and(|bv| value_eq(&v, &bv)))
}

fn is_sequential(v: &Value) -> bool {
    matches!(
        v,
        Value::List(_) | Value::Vector(_) | Value::Cons(_) | Value::ChunkedCons(_) | Value::LazySeq(_)
    )
}

/// Fully materializes a finite sequential value into a `Vec` for
/// comparison. An unrealized `LazySeq` yields `None` rather than forcing
/// it — equality never has side effects — so two unrealized lazy seqs
/// compare by identity instead of contents (see `identity_eq`).
fn seq_vec(v: &Value) -> Option<Vec<Value>> {
    match v {
        Value::Nil => Some(Vec::new()),
        Value::List(l) => Some(l.iter().collect()),
        Value::Vector(vec) => Some(vec.iter().collect()),
        Value::Cons(c) => {
            let mut rest = seq_vec(&c.rest)?;
            rest.insert(0, c.first.clone());
            Some(rest)
        }
        Value::ChunkedCons(cc) => {
            let mut items: Vec<Value> = cc.chunk.iter().collect();
            items.extend(seq_vec(&cc.rest)?);
            Some(items)
        }
        Value::LazySeq(ls) => ls.peek().and_then(|realized| seq_vec(&realized)),
        _ => None,
    }
}

fn sequential_eq(a: &Value, b: &Value) -> bool {
    match (seq_vec(a), seq_vec(b)) {
        (Some(x), Some(y)) => x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| value_eq(p, q)),
        _ => identity_eq(a, b),
    }
}

fn identity_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::FnVal(x), Value::FnVal(y)) => Rc::ptr_eq(x, y),
        (Value::BuiltinFn(x), Value::BuiltinFn(y)) => Rc::ptr_eq(x, y),
        (Value::Atom(x), Value::Atom(y)) => Rc::ptr_eq(x, y),
        (Value::Volatile(x), Value::Volatile(y)) => Rc::ptr_eq(x, y),
        (Value::Regex(x), Value::Regex(y)) => Rc::ptr_eq(x, y),
        (Value::Protocol(x), Value::Protocol(y)) => Rc::ptr_eq(x, y),
        (Value::ProtocolFn(x), Value::ProtocolFn(y)) => Rc::ptr_eq(x, y),
        (Value::MultiFn(x), Value::MultiFn(y)) => Rc::ptr_eq(x, y),
        (Value::VarRef(x), Value::VarRef(y)) => Rc::ptr_eq(x, y),
        (Value::Delay(x), Value::Delay(y)) => Rc::ptr_eq(x, y),
        (Value::LazySeq(x), Value::LazySeq(y)) => Rc::ptr_eq(x, y),
        (Value::ChunkedCons(x), Value::ChunkedCons(y)) => Rc::ptr_eq(x, y),
        (Value::ArrayChunk(x), Value::ArrayChunk(y)) => Rc::ptr_eq(x, y),
        (Value::ChunkBuffer(x), Value::ChunkBuffer(y)) => Rc::ptr_eq(x, y),
        (Value::TransientVector(x), Value::TransientVector(y)) => Rc::ptr_eq(x, y),
        (Value::TransientMap(x), Value::TransientMap(y)) => Rc::ptr_eq(x, y),
        (Value::TransientSet(x), Value::TransientSet(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::array_map::ArrayMap;
    use crate::collections::list::PList;
    use crate::collections::vector::PVector;
    use crate::symbol::KeywordValue;

    #[test]
    fn cross_type_numeric_equality() {
        assert!(value_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(!value_eq(&Value::Int(1), &Value::Float(1.5)));
    }

    #[test]
    fn list_and_vector_compare_equal_when_sequential() {
        let list = Value::List(PList::from_vec(vec![Value::Int(1), Value::Int(2)]));
        let vector = Value::Vector(PVector::from_vec(vec![Value::Int(1), Value::Int(2)]));
        assert!(value_eq(&list, &vector));
    }

    #[test]
    fn nil_is_not_equal_to_empty_collections() {
        let empty_vec = Value::Vector(PVector::empty());
        assert!(!value_eq(&Value::Nil, &empty_vec));
    }

    #[test]
    fn array_map_and_hash_map_compare_by_contents() {
        use crate::collections::hash_map::HMap;
        let key = Value::Keyword(KeywordValue::unqualified("a"));
        let array = Value::Map(ArrayMap::from_pairs(vec![(key.clone(), Value::Int(1))]));
        let hashed = Value::HashMap(HMap::empty().insert(key, Value::Int(1)));
        assert!(value_eq(&array, &hashed));
    }

    #[test]
    fn functions_compare_by_identity() {
        let f = crate::fn_val::BuiltinFn::new("f", vec![], |_args, _env| Ok(Value::Nil));
        let a = Value::BuiltinFn(f.clone());
        let b = Value::BuiltinFn(f.clone());
        assert!(value_eq(&a, &b));
        let g = crate::fn_val::BuiltinFn::new("g", vec![], |_args, _env| Ok(Value::Nil));
        assert!(!value_eq(&a, &Value::BuiltinFn(g)));
    }
}
