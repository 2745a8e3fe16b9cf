//! Equality (`=`) and numeric ordering builtins. `=` defers entirely to
//! `equality::value_eq`; the ordering predicates only accept numbers.

use crate::environment::Environment;
use crate::equality::value_eq;
use crate::error::{Phase, QuillError};
use crate::fn_val::{Arity, BuiltinFn};
use crate::value::Value;
use std::cmp::Ordering;
use std::rc::Rc;

pub fn equals(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    if args.len() < 2 {
        return Ok(Value::Bool(true));
    }
    Ok(Value::Bool(args.windows(2).all(|w| value_eq(&w[0], &w[1]))))
}

pub fn not_equals(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let eq = equals(args, env)?;
    Ok(Value::Bool(!eq.is_truthy()))
}

fn numeric_compare(a: &Value, b: &Value) -> Result<Ordering, QuillError> {
    let (x, y) = match (a, b) {
        (Value::Int(x), Value::Int(y)) => return Ok(x.cmp(y)),
        (Value::Int(x), Value::Float(y)) => (*x as f64, *y),
        (Value::Float(x), Value::Int(y)) => (*x, *y as f64),
        (Value::Float(x), Value::Float(y)) => (*x, *y),
        (other, _) | (_, other) => {
            return Err(QuillError::type_error(
                Phase::Execute,
                format!("expected a number, got a {}", other.type_name()),
            ));
        }
    };
    x.partial_cmp(&y)
        .ok_or_else(|| QuillError::value_error(Phase::Execute, "cannot compare NaN"))
}

fn chained(args: &[Value], ok: impl Fn(Ordering) -> bool) -> Result<Value, QuillError> {
    for w in args.windows(2) {
        if !ok(numeric_compare(&w[0], &w[1])?) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

pub fn less_than(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    chained(args, |o| o == Ordering::Less)
}

pub fn greater_than(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    chained(args, |o| o == Ordering::Greater)
}

pub fn less_equal(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    chained(args, |o| o != Ordering::Greater)
}

pub fn greater_equal(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    chained(args, |o| o != Ordering::Less)
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    let variadic = vec![Arity::Variadic { min: 0 }];
    defs.push(BuiltinFn::new("=", variadic.clone(), equals));
    defs.push(BuiltinFn::new("not=", variadic.clone(), not_equals));
    defs.push(BuiltinFn::new("<", variadic.clone(), less_than));
    defs.push(BuiltinFn::new(">", variadic.clone(), greater_than));
    defs.push(BuiltinFn::new("<=", variadic.clone(), less_equal));
    defs.push(BuiltinFn::new(">=", variadic, greater_equal));
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
    fn equals_is_cross_type_numeric() {
        let mut e = env();
        assert_eq!(equals(&[Value::Int(1), Value::Float(1.0)], &mut e).unwrap(), Value::Bool(true));
    }

    #[test]
    fn chained_less_than() {
        let mut e = env();
        assert_eq!(
            less_than(&[Value::Int(1), Value::Int(2), Value::Int(3)], &mut e).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            less_than(&[Value::Int(1), Value::Int(3), Value::Int(2)], &mut e).unwrap(),
            Value::Bool(false)
        );
    }
}
