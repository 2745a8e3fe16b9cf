//! `apply` and the eager structural helpers that don't need a captured
//! closure to implement (`get-in`, `assoc-in`, `update`, `update-in`,
//! `merge`, `merge-with`, `select-keys`) plus the transient lifecycle ops
//! (`transient`, `persistent!`, `conj!`, `assoc!`, `pop!`, `disj!`).
//! Everything that *does* need a first-class closure value (`map`,
//! `filter`, `reduce`, `comp`, `partial`, …) lives in the bundled
//! core-library source instead — see `quill_compiler::core_lib`.

use crate::collections::array_map::ArrayMap;
use crate::collections::{PList, PSet, PVector};
use crate::environment::Environment;
use crate::error::{Phase, QuillError};
use crate::fn_val::{Arity, BuiltinFn};
use crate::transient::{TransientMapCell, TransientSetCell, TransientVectorCell};
use crate::value::Value;
use std::rc::Rc;

fn type_error(expected: &str, got: &Value) -> QuillError {
    QuillError::type_error(Phase::Execute, format!("expected {expected}, got {}", got.type_name()))
}

/// Realizes any seqable into a `Vec`, pulling lazily-produced values
/// (`Cons`, `LazySeq`, `ChunkedCons`) through `seq_step` rather than only
/// accepting the eager collection types — so `(apply f a (range 5))` and
/// `(into [] (filter pos? xs))` work the same as passing an already-eager
/// vector.
fn seq_to_vec(v: &Value, env: &mut Environment) -> Result<Vec<Value>, QuillError> {
    match v {
        Value::Set(s) => Ok(s.values()),
        Value::Nil => Ok(Vec::new()),
        _ => {
            let mut out = Vec::new();
            let mut cur = v.clone();
            while let Some((head, rest)) = super::collections::seq_step(&cur, env)? {
                out.push(head);
                cur = rest;
            }
            Ok(out)
        }
    }
}

/// `apply`: the last argument is spread, everything between the function
/// and the last argument is passed positionally — `(apply f a b [c d])`
/// calls `f` with `[a b c d]`.
pub fn apply(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let f = &args[0];
    let (last, fixed) = args[1..].split_last().ok_or_else(|| {
        QuillError::arity(Phase::Execute, "apply requires at least a function and a final seq")
    })?;
    let mut call_args = fixed.to_vec();
    call_args.extend(seq_to_vec(last, env)?);
    env.call_value(f, &call_args)
}

fn get_one(coll: &Value, key: &Value) -> Value {
    match coll {
        Value::Map(m) => m.get(key).unwrap_or(Value::Nil),
        Value::HashMap(m) => m.get(key).unwrap_or(Value::Nil),
        Value::Vector(v) => match key {
            Value::Int(i) if *i >= 0 => v.nth(*i as usize).unwrap_or(Value::Nil),
            _ => Value::Nil,
        },
        Value::Set(s) => {
            if s.contains(key) {
                key.clone()
            } else {
                Value::Nil
            }
        }
        _ => Value::Nil,
    }
}

fn assoc_one(coll: &Value, key: Value, value: Value) -> Result<Value, QuillError> {
    match coll {
        Value::Map(m) => Ok(Value::Map(m.assoc(key, value))),
        Value::HashMap(m) => Ok(Value::HashMap(m.insert(key, value))),
        Value::Vector(v) => {
            let idx = match &key {
                Value::Int(i) if *i >= 0 => *i as usize,
                _ => return Err(type_error("a non-negative integer index", &key)),
            };
            v.assoc(idx, value)
                .map(Value::Vector)
                .ok_or_else(|| QuillError::index_error(Phase::Execute, format!("index {idx} out of bounds")))
        }
        Value::Nil => Ok(Value::Map(ArrayMap::empty().assoc(key, value))),
        other => Err(type_error("an associative collection", other)),
    }
}

pub fn get_in(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let path = seq_to_vec(&args[1], env)?;
    let mut current = args[0].clone();
    for key in path {
        current = get_one(&current, &key);
    }
    if args.len() > 2 && current.is_nil() {
        Ok(args[2].clone())
    } else {
        Ok(current)
    }
}

pub fn assoc_in(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let path = seq_to_vec(&args[1], env)?;
    let value = args[2].clone();
    fn go(coll: &Value, path: &[Value], value: Value) -> Result<Value, QuillError> {
        match path.split_first() {
            None => Ok(value),
            Some((key, rest)) => {
                let inner = get_one(coll, key);
                let inner = if inner.is_nil() && !rest.is_empty() {
                    Value::Map(ArrayMap::empty())
                } else {
                    inner
                };
                let updated = go(&inner, rest, value)?;
                assoc_one(coll, key.clone(), updated)
            }
        }
    }
    go(&args[0], &path, value)
}

pub fn update(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let current = get_one(&args[0], &args[1]);
    let mut call_args = vec![current];
    call_args.extend(args[3..].iter().cloned());
    let updated = env.call_value(&args[2], &call_args)?;
    assoc_one(&args[0], args[1].clone(), updated)
}

pub fn update_in(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let path = seq_to_vec(&args[1], env)?;
    let f = args[2].clone();
    let extra = args[3..].to_vec();
    fn go(
        coll: &Value,
        path: &[Value],
        f: &Value,
        extra: &[Value],
        env: &mut Environment,
    ) -> Result<Value, QuillError> {
        match path.split_first() {
            None => {
                let mut call_args = vec![coll.clone()];
                call_args.extend(extra.iter().cloned());
                env.call_value(f, &call_args)
            }
            Some((key, rest)) => {
                let inner = get_one(coll, key);
                let inner = if inner.is_nil() && !rest.is_empty() {
                    Value::Map(ArrayMap::empty())
                } else {
                    inner
                };
                let updated = go(&inner, rest, f, extra, env)?;
                assoc_one(coll, key.clone(), updated)
            }
        }
    }
    go(&args[0], &path, &f, &extra, env)
}

pub fn merge(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    if args.iter().all(|a| a.is_nil()) {
        return Ok(Value::Nil);
    }
    let mut out = ArrayMap::empty();
    for a in args {
        match a {
            Value::Map(m) => {
                for (k, v) in m.iter() {
                    out = out.assoc(k, v);
                }
            }
            Value::HashMap(m) => {
                for (k, v) in m.iter() {
                    out = out.assoc(k, v);
                }
            }
            Value::Nil => {}
            other => return Err(type_error("a map", other)),
        }
    }
    Ok(Value::Map(out))
}

pub fn merge_with(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let f = &args[0];
    let mut out = ArrayMap::empty();
    for a in &args[1..] {
        let pairs: Vec<(Value, Value)> = match a {
            Value::Map(m) => m.iter().collect(),
            Value::HashMap(m) => m.iter(),
            Value::Nil => continue,
            other => return Err(type_error("a map", other)),
        };
        for (k, v) in pairs {
            let merged = match out.get(&k) {
                Some(existing) => env.call_value(f, &[existing, v])?,
                None => v,
            };
            out = out.assoc(k, merged);
        }
    }
    Ok(Value::Map(out))
}

pub fn select_keys(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let keys = seq_to_vec(&args[1], env)?;
    let mut out = ArrayMap::empty();
    for key in keys {
        let found = match &args[0] {
            Value::Map(m) => m.get(&key),
            Value::HashMap(m) => m.get(&key),
            other => return Err(type_error("a map", other)),
        };
        if let Some(v) = found {
            out = out.assoc(key, v);
        }
    }
    Ok(Value::Map(out))
}

pub fn transient_ctor(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Vector(v) => Ok(Value::TransientVector(TransientVectorCell::new(v.iter().collect()))),
        Value::Map(m) => Ok(Value::TransientMap(TransientMapCell::new(m.iter().collect()))),
        Value::HashMap(m) => Ok(Value::TransientMap(TransientMapCell::new(m.iter()))),
        Value::Set(s) => Ok(Value::TransientSet(TransientSetCell::new(s.values()))),
        other => Err(type_error("a vector, map, or set", other)),
    }
}

pub fn persistent_bang(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::TransientVector(t) => Ok(Value::Vector(PVector::from_vec(t.to_persistent()))),
        Value::TransientMap(t) => Ok(Value::Map(t.to_persistent())),
        Value::TransientSet(t) => Ok(Value::Set(PSet::from_vec(t.to_persistent()))),
        other => Err(type_error("a transient collection", other)),
    }
}

pub fn conj_bang(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::TransientVector(t) => {
            t.push(args[1].clone())?;
            Ok(args[0].clone())
        }
        Value::TransientSet(t) => {
            t.conj(args[1].clone())?;
            Ok(args[0].clone())
        }
        other => Err(type_error("a transient vector or set", other)),
    }
}

pub fn assoc_bang(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::TransientMap(t) => {
            t.assoc(args[1].clone(), args[2].clone())?;
            Ok(args[0].clone())
        }
        Value::TransientVector(t) => {
            let idx = match &args[1] {
                Value::Int(i) if *i >= 0 => *i as usize,
                other => return Err(type_error("a non-negative integer index", other)),
            };
            t.assoc(idx, args[2].clone())?;
            Ok(args[0].clone())
        }
        other => Err(type_error("a transient map or vector", other)),
    }
}

pub fn pop_bang(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::TransientVector(t) => {
            t.pop()?;
            Ok(args[0].clone())
        }
        other => Err(type_error("a transient vector", other)),
    }
}

pub fn disj_bang(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::TransientSet(t) => {
            t.disj(&args[1])?;
            Ok(args[0].clone())
        }
        other => Err(type_error("a transient set", other)),
    }
}

pub fn disj(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Set(s) => {
            let mut out = s.clone();
            for v in &args[1..] {
                out = out.remove(v);
            }
            Ok(Value::Set(out))
        }
        other => Err(type_error("a set", other)),
    }
}

fn pair_of(item: Value) -> Result<(Value, Value), QuillError> {
    match item {
        Value::Vector(pair) if pair.len() == 2 => Ok((pair.nth(0).unwrap(), pair.nth(1).unwrap())),
        other => Err(type_error("a 2-element [k v] pair", &other)),
    }
}

pub fn into(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let items = seq_to_vec(&args[1], env)?;
    match &args[0] {
        Value::Vector(v) => {
            let mut out = v.clone();
            for item in items {
                out = out.push(item);
            }
            Ok(Value::Vector(out))
        }
        Value::List(l) => {
            let mut out = l.clone();
            for item in items.into_iter().rev() {
                out = out.cons(item);
            }
            Ok(Value::List(out))
        }
        Value::Set(s) => {
            let mut out = s.clone();
            for item in items {
                out = out.insert(item);
            }
            Ok(Value::Set(out))
        }
        Value::Map(m) => {
            let mut out = m.clone();
            for item in items {
                let (k, v) = pair_of(item)?;
                out = out.assoc(k, v);
            }
            Ok(Value::Map(out))
        }
        Value::HashMap(m) => {
            let mut out = m.clone();
            for item in items {
                let (k, v) = pair_of(item)?;
                out = out.insert(k, v);
            }
            Ok(Value::HashMap(out))
        }
        other => Err(type_error("a vector, list, map, or set", other)),
    }
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    defs.push(BuiltinFn::new("apply", vec![Arity::Variadic { min: 2 }], apply));
    defs.push(BuiltinFn::new(
        "get-in",
        vec![Arity::Fixed(2), Arity::Fixed(3)],
        get_in,
    ));
    defs.push(BuiltinFn::new("assoc-in", vec![Arity::Fixed(3)], assoc_in));
    defs.push(BuiltinFn::new(
        "update",
        vec![Arity::Variadic { min: 3 }],
        update,
    ));
    defs.push(BuiltinFn::new(
        "update-in",
        vec![Arity::Variadic { min: 3 }],
        update_in,
    ));
    defs.push(BuiltinFn::new("merge", vec![Arity::Variadic { min: 0 }], merge));
    defs.push(BuiltinFn::new(
        "merge-with",
        vec![Arity::Variadic { min: 1 }],
        merge_with,
    ));
    defs.push(BuiltinFn::new(
        "select-keys",
        vec![Arity::Fixed(2)],
        select_keys,
    ));
    defs.push(BuiltinFn::new("transient", vec![Arity::Fixed(1)], transient_ctor));
    defs.push(BuiltinFn::new(
        "persistent!",
        vec![Arity::Fixed(1)],
        persistent_bang,
    ));
    defs.push(BuiltinFn::new("conj!", vec![Arity::Fixed(2)], conj_bang));
    defs.push(BuiltinFn::new("assoc!", vec![Arity::Fixed(3)], assoc_bang));
    defs.push(BuiltinFn::new("pop!", vec![Arity::Fixed(1)], pop_bang));
    defs.push(BuiltinFn::new("disj!", vec![Arity::Fixed(2)], disj_bang));
    defs.push(BuiltinFn::new("disj", vec![Arity::Variadic { min: 1 }], disj));
    defs.push(BuiltinFn::new("into", vec![Arity::Fixed(2)], into));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fn_val::{Dispatcher as DispatcherTrait, FnVal};
    use crate::symbol::KeywordValue;

    struct NullDispatcher;
    impl DispatcherTrait for NullDispatcher {
        fn call(&self, _f: &Rc<FnVal>, _args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
            unreachable!("only builtin-to-builtin dispatch exercised here")
        }
    }

    fn env() -> Environment {
        Environment::new(Rc::new(NullDispatcher))
    }

    fn kw(name: &str) -> Value {
        Value::Keyword(KeywordValue::unqualified(name))
    }

    #[test]
    fn get_in_nested_map() {
        let mut e = env();
        let m = Value::Map(ArrayMap::from_pairs(vec![(
            kw("a"),
            Value::Map(ArrayMap::from_pairs(vec![(kw("b"), Value::Int(1))])),
        )]));
        let path = Value::Vector(PVector::from_vec(vec![kw("a"), kw("b")]));
        assert_eq!(get_in(&[m.clone(), path], &mut e).unwrap(), Value::Int(1));
        let missing_path = Value::Vector(PVector::from_vec(vec![kw("x")]));
        assert_eq!(
            get_in(&[m, missing_path, Value::Int(99)], &mut e).unwrap(),
            Value::Int(99)
        );
    }

    #[test]
    fn assoc_in_creates_intermediate_maps() {
        let mut e = env();
        let path = Value::Vector(PVector::from_vec(vec![kw("a"), kw("b")]));
        let out = assoc_in(&[Value::Nil, path, Value::Int(5)], &mut e).unwrap();
        let read_path = Value::Vector(PVector::from_vec(vec![kw("a"), kw("b")]));
        assert_eq!(get_in(&[out, read_path], &mut e).unwrap(), Value::Int(5));
    }

    #[test]
    fn merge_overwrites_left_to_right() {
        let mut e = env();
        let a = Value::Map(ArrayMap::from_pairs(vec![(kw("a"), Value::Int(1))]));
        let b = Value::Map(ArrayMap::from_pairs(vec![(kw("a"), Value::Int(2))]));
        let merged = merge(&[a, b], &mut e).unwrap();
        assert_eq!(get_one(&merged, &kw("a")), Value::Int(2));
    }

    #[test]
    fn transient_roundtrips_through_persistent() {
        let mut e = env();
        let v = Value::Vector(PVector::from_vec(vec![Value::Int(1)]));
        let t = transient_ctor(&[v], &mut e).unwrap();
        let t = conj_bang(&[t, Value::Int(2)], &mut e).unwrap();
        let p = persistent_bang(&[t], &mut e).unwrap();
        assert_eq!(crate::print::print_str(&p), "[1 2]");
    }
}
