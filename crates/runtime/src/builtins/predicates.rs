//! Type and numeric-property predicates.

use crate::environment::Environment;
use crate::error::QuillError;
use crate::fn_val::{Arity, BuiltinFn};
use crate::value::Value;
use std::rc::Rc;

macro_rules! predicate {
    ($name:ident, $pat:pat) => {
        pub fn $name(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
            Ok(Value::Bool(matches!(args.first(), Some($pat))))
        }
    };
}

predicate!(is_nil, Value::Nil);
predicate!(is_string, Value::Str(_));
predicate!(is_symbol, Value::Symbol(_));
predicate!(is_keyword, Value::Keyword(_));
predicate!(is_list, Value::List(_));
predicate!(is_vector, Value::Vector(_));
predicate!(is_map, Value::Map(_) | Value::HashMap(_));
predicate!(is_set, Value::Set(_));
predicate!(is_fn, Value::FnVal(_) | Value::BuiltinFn(_));
predicate!(is_char, Value::Char(_));
predicate!(is_atom, Value::Atom(_));

pub fn is_true(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Bool(matches!(args.first(), Some(Value::Bool(true)))))
}

pub fn is_false(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Bool(matches!(args.first(), Some(Value::Bool(false)))))
}

pub fn is_number(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Bool(matches!(args.first(), Some(Value::Int(_) | Value::Float(_)))))
}

pub fn is_seq(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Bool(matches!(
        args.first(),
        Some(Value::List(_) | Value::Cons(_) | Value::ChunkedCons(_) | Value::LazySeq(_))
    )))
}

fn seq_count(v: &Value) -> Option<usize> {
    match v {
        Value::Nil => Some(0),
        Value::List(l) => Some(l.count()),
        Value::Vector(vec) => Some(vec.len()),
        Value::Map(m) => Some(m.len()),
        Value::HashMap(m) => Some(m.len()),
        Value::Set(s) => Some(s.len()),
        Value::Str(s) => Some(s.chars().count()),
        _ => None,
    }
}

pub fn is_empty(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let v = args.first().cloned().unwrap_or(Value::Nil);
    if let Some(n) = seq_count(&v) {
        return Ok(Value::Bool(n == 0));
    }
    Ok(Value::Bool(
        crate::builtins::collections::seq_step(&v, env)?.is_none(),
    ))
}

pub fn is_even(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match args.first() {
        Some(Value::Int(n)) => Ok(Value::Bool(n % 2 == 0)),
        _ => Err(QuillError::type_error(
            crate::error::Phase::Execute,
            "even? requires an integer",
        )),
    }
}

pub fn is_odd(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match args.first() {
        Some(Value::Int(n)) => Ok(Value::Bool(n % 2 != 0)),
        _ => Err(QuillError::type_error(
            crate::error::Phase::Execute,
            "odd? requires an integer",
        )),
    }
}

pub fn is_zero(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Bool(match args.first() {
        Some(Value::Int(n)) => *n == 0,
        Some(Value::Float(f)) => *f == 0.0,
        _ => false,
    }))
}

pub fn is_pos(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Bool(match args.first() {
        Some(Value::Int(n)) => *n > 0,
        Some(Value::Float(f)) => *f > 0.0,
        _ => false,
    }))
}

pub fn is_neg(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Bool(match args.first() {
        Some(Value::Int(n)) => *n < 0,
        Some(Value::Float(f)) => *f < 0.0,
        _ => false,
    }))
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    let one = vec![Arity::Fixed(1)];
    defs.push(BuiltinFn::new("nil?", one.clone(), is_nil));
    defs.push(BuiltinFn::new("true?", one.clone(), is_true));
    defs.push(BuiltinFn::new("false?", one.clone(), is_false));
    defs.push(BuiltinFn::new("string?", one.clone(), is_string));
    defs.push(BuiltinFn::new("symbol?", one.clone(), is_symbol));
    defs.push(BuiltinFn::new("keyword?", one.clone(), is_keyword));
    defs.push(BuiltinFn::new("list?", one.clone(), is_list));
    defs.push(BuiltinFn::new("vector?", one.clone(), is_vector));
    defs.push(BuiltinFn::new("map?", one.clone(), is_map));
    defs.push(BuiltinFn::new("set?", one.clone(), is_set));
    defs.push(BuiltinFn::new("fn?", one.clone(), is_fn));
    defs.push(BuiltinFn::new("char?", one.clone(), is_char));
    defs.push(BuiltinFn::new("atom?", one.clone(), is_atom));
    defs.push(BuiltinFn::new("number?", one.clone(), is_number));
    defs.push(BuiltinFn::new("seq?", one.clone(), is_seq));
    defs.push(BuiltinFn::new("empty?", one.clone(), is_empty));
    defs.push(BuiltinFn::new("even?", one.clone(), is_even));
    defs.push(BuiltinFn::new("odd?", one.clone(), is_odd));
    defs.push(BuiltinFn::new("zero?", one.clone(), is_zero));
    defs.push(BuiltinFn::new("pos?", one.clone(), is_pos));
    defs.push(BuiltinFn::new("neg?", one, is_neg));
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
    fn nil_and_empty_checks() {
        let mut e = env();
        assert_eq!(is_nil(&[Value::Nil], &mut e).unwrap(), Value::Bool(true));
        assert_eq!(
            is_empty(&[Value::Vector(crate::collections::vector::PVector::empty())], &mut e).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn even_odd() {
        let mut e = env();
        assert_eq!(is_even(&[Value::Int(2)], &mut e).unwrap(), Value::Bool(true));
        assert_eq!(is_odd(&[Value::Int(2)], &mut e).unwrap(), Value::Bool(false));
    }
}
