//! Structural hashing for `Value`, consistent with the equality rules in
//! `equality.rs`: two values that compare equal must hash equal. This backs
//! `HMap`/`HSet` (the HAMT-based `hash_map`/`set` variants) and `MapKey`
//! wrapping for `ArrayMap`/`HMap` lookups.

use crate::value::Value;
use std::hash::{Hash, Hasher};

/// Discriminant used to separate "numeric" values from everything else, so
/// that `hash(Int(1)) == hash(Float(1.0))` (matching cross-type numeric
/// equality) while other variants don't collide by accident.
const TAG_NUMBER: u8 = 0;
const TAG_NIL: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_CHAR: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_SYMBOL: u8 = 5;
const TAG_KEYWORD: u8 = 6;
const TAG_SEQUENTIAL: u8 = 7;
const TAG_MAP: u8 = 8;
const TAG_SET: u8 = 9;
const TAG_IDENTITY: u8 = 10;

/// Hash a `Value` per the structural-equality rules in `equality.rs`.
pub fn hash_value(v: &Value) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    hash_into(v, &mut hasher);
    hasher.finish()
}

fn hash_into<H: Hasher>(v: &Value, state: &mut H) {
    match v {
        Value::Nil => TAG_NIL.hash(state),
        Value::Bool(b) => {
            TAG_BOOL.hash(state);
            b.hash(state);
        }
        Value::Int(n) => {
            TAG_NUMBER.hash(state);
            hash_f64_bits(*n as f64, state);
        }
        Value::Float(f) => {
            TAG_NUMBER.hash(state);
            hash_f64_bits(*f, state);
        }
        Value::Char(c) => {
            TAG_CHAR.hash(state);
            c.hash(state);
        }
        Value::Str(s) => {
            TAG_STRING.hash(state);
            s.hash(state);
        }
        Value::Symbol(s) => {
            TAG_SYMBOL.hash(state);
            s.ns.hash(state);
            s.name.hash(state);
        }
        Value::Keyword(k) => {
            TAG_KEYWORD.hash(state);
            k.ns.hash(state);
            k.name.hash(state);
        }
        Value::List(l) => {
            TAG_SEQUENTIAL.hash(state);
            for item in l.iter() {
                hash_into(&item, state);
            }
        }
        Value::Vector(vec) => {
            TAG_SEQUENTIAL.hash(state);
            for item in vec.iter() {
                hash_into(&item, state);
            }
        }
        Value::Map(m) => {
            TAG_MAP.hash(state);
            let mut acc: u64 = 0;
            for (k, val) in m.iter() {
                acc ^= hash_pair(&k, &val);
            }
            acc.hash(state);
        }
        Value::HashMap(m) => {
            TAG_MAP.hash(state);
            let mut acc: u64 = 0;
            for (k, val) in m.iter() {
                acc ^= hash_pair(&k, &val);
            }
            acc.hash(state);
        }
        Value::Set(s) => {
            TAG_SET.hash(state);
            let mut acc: u64 = 0;
            for item in s.iter() {
                acc ^= hash_value(&item);
            }
            acc.hash(state);
        }
        // Reference-identity types: hash the pointer.
        Value::FnVal(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::BuiltinFn(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::Atom(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::Volatile(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::Regex(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::Protocol(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::ProtocolFn(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::MultiFn(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::VarRef(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::Delay(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::LazySeq(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::Cons(rc) => {
            TAG_SEQUENTIAL.hash(state);
            hash_into(&rc.first, state);
        }
        Value::ChunkedCons(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::ArrayChunk(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::ChunkBuffer(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::TransientVector(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::TransientMap(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::TransientSet(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
        Value::Reduced(rc) => hash_identity(TAG_IDENTITY, Rc_ptr(rc), state),
    }
}

fn hash_pair(k: &Value, v: &Value) -> u64 {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    hash_into(k, &mut h);
    hash_into(v, &mut h);
    h.finish()
}

/// Hash a float by its bit pattern, after canonicalizing -0.0 to 0.0 and
/// integral floats so `hash(1) == hash(1.0)`.
fn hash_f64_bits<H: Hasher>(f: f64, state: &mut H) {
    let canon = if f == 0.0 { 0.0 } else { f };
    canon.to_bits().hash(state);
}

fn hash_identity<H: Hasher, T>(tag: u8, ptr: *const T, state: &mut H) {
    tag.hash(state);
    (ptr as usize).hash(state);
}

#[allow(non_snake_case)]
fn Rc_ptr<T>(rc: &std::rc::Rc<T>) -> *const T {
    std::rc::Rc::as_ptr(rc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_hash_equal_when_numerically_equal() {
        assert_eq!(hash_value(&Value::Int(1)), hash_value(&Value::Float(1.0)));
    }

    #[test]
    fn strings_hash_by_content() {
        let a = Value::Str(std::rc::Rc::from("hi"));
        let b = Value::Str(std::rc::Rc::from("hi"));
        assert_eq!(hash_value(&a), hash_value(&b));
    }
}
