//! Sequence and collection builtins: `first`/`rest`/`cons`/`conj`, the
//! `count`/`nth`/`get`/`assoc`/`dissoc` family, and the map/set/vector
//! constructors. Operations that need to realize a lazy seq go through
//! `env.dispatcher`, since `quill-runtime` doesn't know how to call the
//! thunk a `lazy-seq` form compiled to — only whichever backend compiled it
//! does.

use crate::collections::{ArrayMap, HMap, PList, PSet, PVector};
use crate::cons::ConsCell;
use crate::environment::Environment;
use crate::error::{Phase, QuillError};
use crate::fn_val::{Arity, BuiltinFn};
use crate::value::Value;
use std::rc::Rc;

/// Realizes one step of a (possibly lazy) seq into `first`/`rest`, calling
/// through the dispatcher when it encounters an unrealized `LazySeq`.
pub fn seq_step(v: &Value, env: &mut Environment) -> Result<Option<(Value, Value)>, QuillError> {
    match v {
        Value::Nil => Ok(None),
        Value::List(l) => Ok(l.first().map(|h| (h, Value::List(l.rest())))),
        Value::Vector(vec) => {
            if vec.is_empty() {
                Ok(None)
            } else {
                let rest: PVector = vec.iter().skip(1).collect();
                Ok(Some((vec.nth(0).unwrap(), Value::Vector(rest))))
            }
        }
        Value::Cons(c) => Ok(Some((c.first.clone(), c.rest.clone()))),
        Value::ChunkedCons(cc) => {
            if cc.chunk.count() == 1 {
                Ok(Some((cc.chunk.nth(0).unwrap(), cc.rest.clone())))
            } else {
                let rest = Value::ChunkedCons(crate::chunk::ChunkedConsCell::new(
                    cc.chunk.drop_first(1),
                    cc.rest.clone(),
                ));
                Ok(Some((cc.chunk.nth(0).unwrap(), rest)))
            }
        }
        Value::LazySeq(ls) => {
            let realized = ls.realize(|thunk| env.call_value(&thunk, &[]))?;
            seq_step(&realized, env)
        }
        Value::Str(s) => {
            let mut chars = s.chars();
            match chars.next() {
                None => Ok(None),
                Some(c) => Ok(Some((Value::Char(c), Value::Str(Rc::from(chars.as_str()))))),
            }
        }
        other => Err(QuillError::type_error(
            Phase::Execute,
            format!("{} is not seqable", other.type_name()),
        )),
    }
}

pub fn first(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let v = args.first().cloned().unwrap_or(Value::Nil);
    Ok(seq_step(&v, env)?.map(|(h, _)| h).unwrap_or(Value::Nil))
}

pub fn rest(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let v = args.first().cloned().unwrap_or(Value::Nil);
    Ok(seq_step(&v, env)?.map(|(_, t)| t).unwrap_or(Value::List(PList::empty())))
}

/// `nil` for an empty collection, the collection itself otherwise — the
/// primitive the bundled core library's `map`/`filter`/`reduce` use to turn
/// "keep going?" into a plain truthiness check.
pub fn seq(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let v = args.first().cloned().unwrap_or(Value::Nil);
    match seq_step(&v, env)? {
        None => Ok(Value::Nil),
        Some(_) => Ok(v),
    }
}

pub fn cons(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [head, tail] = args else {
        return Err(QuillError::arity(Phase::Execute, "cons requires exactly 2 arguments"));
    };
    match tail {
        Value::List(l) => Ok(Value::List(l.cons(head.clone()))),
        Value::Nil => Ok(Value::List(PList::empty().cons(head.clone()))),
        other => Ok(Value::Cons(ConsCell::new(head.clone(), other.clone()))),
    }
}

pub fn conj(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [coll, rest @ ..] = args else {
        return Err(QuillError::arity(Phase::Execute, "conj requires at least 1 argument"));
    };
    let mut acc = coll.clone();
    for item in rest {
        acc = match acc {
            Value::List(l) => Value::List(l.cons(item.clone())),
            Value::Vector(vec) => Value::Vector(vec.push(item.clone())),
            Value::Set(s) => Value::Set(s.insert(item.clone())),
            Value::Map(m) => {
                let (k, v) = pair_from(item)?;
                Value::Map(m.assoc(k, v))
            }
            Value::HashMap(m) => {
                let (k, v) = pair_from(item)?;
                Value::HashMap(m.insert(k, v))
            }
            Value::Nil => Value::List(PList::empty().cons(item.clone())),
            other => return Err(QuillError::type_error(Phase::Execute, format!("can't conj onto a {}", other.type_name()))),
        };
    }
    Ok(acc)
}

fn pair_from(v: &Value) -> Result<(Value, Value), QuillError> {
    match v {
        Value::Vector(vec) if vec.len() == 2 => Ok((vec.nth(0).unwrap(), vec.nth(1).unwrap())),
        other => Err(QuillError::type_error(
            Phase::Execute,
            format!("expected a 2-element vector entry, got {}", other.type_name()),
        )),
    }
}

pub fn count(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let v = args.first().cloned().unwrap_or(Value::Nil);
    match &v {
        Value::Nil => Ok(Value::Int(0)),
        Value::List(l) => Ok(Value::Int(l.count() as i64)),
        Value::Vector(vec) => Ok(Value::Int(vec.len() as i64)),
        Value::Map(m) => Ok(Value::Int(m.len() as i64)),
        Value::HashMap(m) => Ok(Value::Int(m.len() as i64)),
        Value::Set(s) => Ok(Value::Int(s.len() as i64)),
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        _ => {
            let mut n = 0i64;
            let mut cur = v;
            while let Some((_, tail)) = seq_step(&cur, env)? {
                n += 1;
                cur = tail;
            }
            Ok(Value::Int(n))
        }
    }
}

pub fn nth(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let coll = args.first().cloned().unwrap_or(Value::Nil);
    let idx = match args.get(1) {
        Some(Value::Int(n)) if *n >= 0 => *n as usize,
        _ => return Err(QuillError::type_error(Phase::Execute, "nth requires a non-negative integer index")),
    };
    let not_found = args.get(2).cloned();
    if let Value::Vector(vec) = &coll {
        if let Some(v) = vec.nth(idx) {
            return Ok(v);
        }
        return not_found.ok_or_else(|| {
            QuillError::index_error(Phase::Execute, format!("index {idx} out of bounds"))
        });
    }
    let mut cur = coll;
    let mut i = 0usize;
    while let Some((head, tail)) = seq_step(&cur, env)? {
        if i == idx {
            return Ok(head);
        }
        i += 1;
        cur = tail;
    }
    not_found.ok_or_else(|| QuillError::index_error(Phase::Execute, format!("index {idx} out of bounds")))
}

pub fn get(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let coll = args.first().cloned().unwrap_or(Value::Nil);
    let key = args.get(1).cloned().unwrap_or(Value::Nil);
    let not_found = args.get(2).cloned().unwrap_or(Value::Nil);
    let found = match &coll {
        Value::Map(m) => m.get(&key),
        Value::HashMap(m) => m.get(&key),
        Value::Set(s) => {
            if s.contains(&key) {
                Some(key.clone())
            } else {
                None
            }
        }
        Value::Vector(vec) => match &key {
            Value::Int(n) if *n >= 0 => vec.nth(*n as usize),
            _ => None,
        },
        Value::Nil => None,
        other => {
            return Err(QuillError::type_error(
                Phase::Execute,
                format!("can't get from a {}", other.type_name()),
            ))
        }
    };
    Ok(found.unwrap_or(not_found))
}

pub fn assoc(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [coll, pairs @ ..] = args else {
        return Err(QuillError::arity(Phase::Execute, "assoc requires at least 1 argument"));
    };
    if pairs.len() % 2 != 0 {
        return Err(QuillError::arity(Phase::Execute, "assoc requires an even number of key/value arguments"));
    }
    let mut acc = coll.clone();
    for kv in pairs.chunks(2) {
        let (k, v) = (kv[0].clone(), kv[1].clone());
        acc = match acc {
            Value::Map(m) => Value::Map(m.assoc(k, v)),
            Value::HashMap(m) => Value::HashMap(m.insert(k, v)),
            Value::Vector(vec) => match &k {
                Value::Int(idx) if *idx >= 0 => vec
                    .assoc(*idx as usize, v)
                    .map(Value::Vector)
                    .ok_or_else(|| QuillError::index_error(Phase::Execute, format!("index {idx} out of bounds")))?,
                _ => return Err(QuillError::type_error(Phase::Execute, "vector assoc requires an integer index")),
            },
            Value::Nil => Value::Map(ArrayMap::from_pairs(vec![(k, v)])),
            other => return Err(QuillError::type_error(Phase::Execute, format!("can't assoc onto a {}", other.type_name()))),
        };
    }
    Ok(acc)
}

pub fn dissoc(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [coll, keys @ ..] = args else {
        return Err(QuillError::arity(Phase::Execute, "dissoc requires at least 1 argument"));
    };
    let mut acc = coll.clone();
    for key in keys {
        acc = match acc {
            Value::Map(m) => Value::Map(m.dissoc(key)),
            Value::HashMap(m) => Value::HashMap(m.remove(key)),
            Value::Nil => Value::Nil,
            other => return Err(QuillError::type_error(Phase::Execute, format!("can't dissoc from a {}", other.type_name()))),
        };
    }
    Ok(acc)
}

pub fn contains_pred(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [coll, key] = args else {
        return Err(QuillError::arity(Phase::Execute, "contains? requires exactly 2 arguments"));
    };
    Ok(Value::Bool(match coll {
        Value::Map(m) => m.contains_key(key),
        Value::HashMap(m) => m.contains_key(key),
        Value::Set(s) => s.contains(key),
        Value::Vector(vec) => matches!(key, Value::Int(n) if *n >= 0 && (*n as usize) < vec.len()),
        _ => false,
    }))
}

pub fn keys(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [coll] = args else {
        return Err(QuillError::arity(Phase::Execute, "keys requires exactly 1 argument"));
    };
    let ks: Vec<Value> = match coll {
        Value::Map(m) => m.keys().collect(),
        Value::HashMap(m) => m.iter().into_iter().map(|(k, _)| k).collect(),
        other => return Err(QuillError::type_error(Phase::Execute, format!("{} is not a map", other.type_name()))),
    };
    Ok(Value::List(PList::from_vec(ks)))
}

pub fn vals(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [coll] = args else {
        return Err(QuillError::arity(Phase::Execute, "vals requires exactly 1 argument"));
    };
    let vs: Vec<Value> = match coll {
        Value::Map(m) => m.values().collect(),
        Value::HashMap(m) => m.iter().into_iter().map(|(_, v)| v).collect(),
        other => return Err(QuillError::type_error(Phase::Execute, format!("{} is not a map", other.type_name()))),
    };
    Ok(Value::List(PList::from_vec(vs)))
}

pub fn list_ctor(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::List(PList::from_vec(args.to_vec())))
}

pub fn vector_ctor(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Vector(PVector::from_vec(args.to_vec())))
}

pub fn hash_map_ctor(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    if args.len() % 2 != 0 {
        return Err(QuillError::arity(Phase::Execute, "hash-map requires an even number of arguments"));
    }
    let pairs = args.chunks(2).map(|kv| (kv[0].clone(), kv[1].clone())).collect();
    Ok(Value::HashMap(HMap::from_pairs(pairs)))
}

pub fn hash_set_ctor(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Set(PSet::from_vec(args.to_vec())))
}

pub fn reverse(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let [coll] = args else {
        return Err(QuillError::arity(Phase::Execute, "reverse requires exactly 1 argument"));
    };
    let mut items = Vec::new();
    let mut cur = coll.clone();
    while let Some((head, tail)) = seq_step(&cur, env)? {
        items.push(head);
        cur = tail;
    }
    items.reverse();
    Ok(Value::List(PList::from_vec(items)))
}

pub fn concat(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let mut items = Vec::new();
    for coll in args {
        let mut cur = coll.clone();
        while let Some((head, tail)) = seq_step(&cur, env)? {
            items.push(head);
            cur = tail;
        }
    }
    Ok(Value::List(PList::from_vec(items)))
}

fn realize_all(v: &Value, env: &mut Environment) -> Result<Vec<Value>, QuillError> {
    let mut items = Vec::new();
    let mut cur = v.clone();
    while let Some((head, tail)) = seq_step(&cur, env)? {
        items.push(head);
        cur = tail;
    }
    Ok(items)
}

/// Converts any seqable collection to a vector — what the reader's
/// syntax-quote expansion calls for a `` `[...] `` literal (section on
/// quasiquote: `(vec (concat ...))`), distinct from `vector`'s variadic
/// element-by-element constructor.
pub fn vec(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let v = args.first().cloned().unwrap_or(Value::Nil);
    Ok(Value::Vector(PVector::from_vec(realize_all(&v, env)?)))
}

/// The `set` counterpart to `vec`, for `` `#{...} `` syntax-quote literals.
pub fn set(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let v = args.first().cloned().unwrap_or(Value::Nil);
    Ok(Value::Set(PSet::from_vec(realize_all(&v, env)?)))
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    defs.push(BuiltinFn::new("seq", vec![Arity::Fixed(1)], seq));
    defs.push(BuiltinFn::new("first", vec![Arity::Fixed(1)], first));
    defs.push(BuiltinFn::new("rest", vec![Arity::Fixed(1)], rest));
    defs.push(BuiltinFn::new("vec", vec![Arity::Fixed(1)], vec));
    defs.push(BuiltinFn::new("set", vec![Arity::Fixed(1)], set));
    defs.push(BuiltinFn::new("cons", vec![Arity::Fixed(2)], cons));
    defs.push(BuiltinFn::new("conj", vec![Arity::Variadic { min: 1 }], conj));
    defs.push(BuiltinFn::new("count", vec![Arity::Fixed(1)], count));
    defs.push(BuiltinFn::new("nth", vec![Arity::Variadic { min: 2 }], nth));
    defs.push(BuiltinFn::new("get", vec![Arity::Variadic { min: 2 }], get));
    defs.push(BuiltinFn::new("assoc", vec![Arity::Variadic { min: 3 }], assoc));
    defs.push(BuiltinFn::new("dissoc", vec![Arity::Variadic { min: 1 }], dissoc));
    defs.push(BuiltinFn::new("contains?", vec![Arity::Fixed(2)], contains_pred));
    defs.push(BuiltinFn::new("keys", vec![Arity::Fixed(1)], keys));
    defs.push(BuiltinFn::new("vals", vec![Arity::Fixed(1)], vals));
    defs.push(BuiltinFn::new("list", vec![Arity::Variadic { min: 0 }], list_ctor));
    defs.push(BuiltinFn::new("vector", vec![Arity::Variadic { min: 0 }], vector_ctor));
    defs.push(BuiltinFn::new("hash-map", vec![Arity::Variadic { min: 0 }], hash_map_ctor));
    defs.push(BuiltinFn::new("hash-set", vec![Arity::Variadic { min: 0 }], hash_set_ctor));
    defs.push(BuiltinFn::new("reverse", vec![Arity::Fixed(1)], reverse));
    defs.push(BuiltinFn::new("concat", vec![Arity::Variadic { min: 0 }], concat));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fn_val::Dispatcher;

    struct NullDispatcher;
    impl Dispatcher for NullDispatcher {
        fn call(&self, _f: &Rc<crate::fn_val::FnVal>, _args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
            unreachable!()
        }
    }

    fn env() -> Environment {
        Environment::new(Rc::new(NullDispatcher))
    }

    #[test]
    fn first_rest_over_vector() {
        let mut e = env();
        let v = Value::Vector(PVector::from_vec(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(first(&[v.clone()], &mut e).unwrap(), Value::Int(1));
        assert_eq!(count(&[rest(&[v], &mut e).unwrap()], &mut e).unwrap(), Value::Int(1));
    }

    #[test]
    fn assoc_and_get_on_map() {
        let mut e = env();
        let m = Value::Map(ArrayMap::empty());
        let m2 = assoc(&[m, Value::Int(1), Value::Str(Rc::from("a"))], &mut e).unwrap();
        assert_eq!(get(&[m2, Value::Int(1)], &mut e).unwrap(), Value::Str(Rc::from("a")));
    }

    #[test]
    fn conj_onto_list_prepends() {
        let mut e = env();
        let l = Value::List(PList::from_vec(vec![Value::Int(2), Value::Int(3)]));
        let l2 = conj(&[l, Value::Int(1)], &mut e).unwrap();
        assert_eq!(first(&[l2], &mut e).unwrap(), Value::Int(1));
    }
}
