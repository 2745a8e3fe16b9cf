//! Numeric builtins. Integers promote to float on mixing with a float
//! operand; integer overflow is reported as an `arithmetic-error` rather
//! than silently wrapping or promoting to an arbitrary-precision type (no
//! bignum `Value` variant exists — see DESIGN.md).

use crate::environment::Environment;
use crate::error::{Phase, QuillError};
use crate::fn_val::{Arity, BuiltinFn};
use crate::value::Value;
use std::rc::Rc;

fn as_f64(v: &Value, phase: Phase) -> Result<f64, QuillError> {
    match v {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        other => Err(QuillError::type_error(
            phase,
            format!("expected a number, got a {}", other.type_name()),
        )),
    }
}

fn is_float(v: &Value) -> bool {
    matches!(v, Value::Float(_))
}

fn require_numbers(args: &[Value]) -> Result<(), QuillError> {
    for a in args {
        if !matches!(a, Value::Int(_) | Value::Float(_)) {
            return Err(QuillError::type_error(
                Phase::Execute,
                format!("expected a number, got a {}", a.type_name()),
            ));
        }
    }
    Ok(())
}

fn fold_ints(
    args: &[Value],
    identity: i64,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, QuillError> {
    require_numbers(args)?;
    if args.iter().any(is_float) {
        let mut acc = identity as f64;
        for a in args {
            acc = float_op(acc, as_f64(a, Phase::Execute)?);
        }
        return Ok(Value::Float(acc));
    }
    let mut acc = identity;
    for a in args {
        let n = match a {
            Value::Int(n) => *n,
            _ => unreachable!("checked above"),
        };
        acc = int_op(acc, n).ok_or_else(|| {
            QuillError::arithmetic_error(Phase::Execute, "integer overflow")
        })?;
    }
    Ok(Value::Int(acc))
}

pub fn add(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    fold_ints(args, 0, i64::checked_add, |a, b| a + b)
}

pub fn multiply(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    fold_ints(args, 1, i64::checked_mul, |a, b| a * b)
}

pub fn subtract(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    require_numbers(args)?;
    match args {
        [] => Err(QuillError::arity(Phase::Execute, "- requires at least 1 argument")),
        [single] => {
            if is_float(single) {
                Ok(Value::Float(-as_f64(single, Phase::Execute)?))
            } else if let Value::Int(n) = single {
                Ok(Value::Int(n.checked_neg().ok_or_else(|| {
                    QuillError::arithmetic_error(Phase::Execute, "integer overflow")
                })?))
            } else {
                unreachable!()
            }
        }
        [first, rest @ ..] => {
            if args.iter().any(is_float) {
                let mut acc = as_f64(first, Phase::Execute)?;
                for a in rest {
                    acc -= as_f64(a, Phase::Execute)?;
                }
                Ok(Value::Float(acc))
            } else {
                let mut acc = match first {
                    Value::Int(n) => *n,
                    _ => unreachable!(),
                };
                for a in rest {
                    let n = match a {
                        Value::Int(n) => *n,
                        _ => unreachable!(),
                    };
                    acc = acc.checked_sub(n).ok_or_else(|| {
                        QuillError::arithmetic_error(Phase::Execute, "integer overflow")
                    })?;
                }
                Ok(Value::Int(acc))
            }
        }
    }
}

pub fn divide(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    require_numbers(args)?;
    match args {
        [] => Err(QuillError::arity(Phase::Execute, "/ requires at least 1 argument")),
        [single] => {
            let f = as_f64(single, Phase::Execute)?;
            if f == 0.0 {
                return Err(QuillError::arithmetic_error(Phase::Execute, "divide by zero"));
            }
            Ok(Value::Float(1.0 / f))
        }
        [first, rest @ ..] => {
            let mut acc = as_f64(first, Phase::Execute)?;
            for a in rest {
                let d = as_f64(a, Phase::Execute)?;
                if d == 0.0 {
                    return Err(QuillError::arithmetic_error(Phase::Execute, "divide by zero"));
                }
                acc /= d;
            }
            if args.iter().any(is_float) {
                Ok(Value::Float(acc))
            } else if acc.fract() == 0.0 {
                Ok(Value::Int(acc as i64))
            } else {
                Ok(Value::Float(acc))
            }
        }
    }
}

pub fn quotient(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [a, b] = args else {
        return Err(QuillError::arity(Phase::Execute, "quot requires exactly 2 arguments"));
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if *y == 0 {
                return Err(QuillError::arithmetic_error(Phase::Execute, "divide by zero"));
            }
            Ok(Value::Int(x / y))
        }
        _ => {
            let x = as_f64(a, Phase::Execute)?;
            let y = as_f64(b, Phase::Execute)?;
            if y == 0.0 {
                return Err(QuillError::arithmetic_error(Phase::Execute, "divide by zero"));
            }
            Ok(Value::Float((x / y).trunc()))
        }
    }
}

pub fn remainder(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [a, b] = args else {
        return Err(QuillError::arity(Phase::Execute, "rem requires exactly 2 arguments"));
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if *y == 0 {
                return Err(QuillError::arithmetic_error(Phase::Execute, "divide by zero"));
            }
            Ok(Value::Int(x % y))
        }
        _ => {
            let x = as_f64(a, Phase::Execute)?;
            let y = as_f64(b, Phase::Execute)?;
            Ok(Value::Float(x % y))
        }
    }
}

pub fn modulo(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [a, b] = args else {
        return Err(QuillError::arity(Phase::Execute, "mod requires exactly 2 arguments"));
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if *y == 0 {
                return Err(QuillError::arithmetic_error(Phase::Execute, "divide by zero"));
            }
            Ok(Value::Int(x.rem_euclid(*y)))
        }
        _ => {
            let x = as_f64(a, Phase::Execute)?;
            let y = as_f64(b, Phase::Execute)?;
            Ok(Value::Float(((x % y) + y) % y))
        }
    }
}

pub fn inc(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [a] = args else {
        return Err(QuillError::arity(Phase::Execute, "inc requires exactly 1 argument"));
    };
    match a {
        Value::Int(n) => n
            .checked_add(1)
            .map(Value::Int)
            .ok_or_else(|| QuillError::arithmetic_error(Phase::Execute, "integer overflow")),
        other => Ok(Value::Float(as_f64(other, Phase::Execute)? + 1.0)),
    }
}

pub fn dec(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [a] = args else {
        return Err(QuillError::arity(Phase::Execute, "dec requires exactly 1 argument"));
    };
    match a {
        Value::Int(n) => n
            .checked_sub(1)
            .map(Value::Int)
            .ok_or_else(|| QuillError::arithmetic_error(Phase::Execute, "integer overflow")),
        other => Ok(Value::Float(as_f64(other, Phase::Execute)? - 1.0)),
    }
}

pub fn abs(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let [a] = args else {
        return Err(QuillError::arity(Phase::Execute, "abs requires exactly 1 argument"));
    };
    match a {
        Value::Int(n) => Ok(Value::Int(n.abs())),
        other => Ok(Value::Float(as_f64(other, Phase::Execute)?.abs())),
    }
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    defs.push(BuiltinFn::new("+", vec![Arity::Variadic { min: 0 }], add));
    defs.push(BuiltinFn::new("*", vec![Arity::Variadic { min: 0 }], multiply));
    defs.push(BuiltinFn::new("-", vec![Arity::Variadic { min: 1 }], subtract));
    defs.push(BuiltinFn::new("/", vec![Arity::Variadic { min: 1 }], divide));
    defs.push(BuiltinFn::new("quot", vec![Arity::Fixed(2)], quotient));
    defs.push(BuiltinFn::new("rem", vec![Arity::Fixed(2)], remainder));
    defs.push(BuiltinFn::new("mod", vec![Arity::Fixed(2)], modulo));
    defs.push(BuiltinFn::new("inc", vec![Arity::Fixed(1)], inc));
    defs.push(BuiltinFn::new("dec", vec![Arity::Fixed(1)], dec));
    defs.push(BuiltinFn::new("abs", vec![Arity::Fixed(1)], abs));
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
    fn add_promotes_to_float_on_mix() {
        let mut e = env();
        assert_eq!(add(&[Value::Int(1), Value::Float(2.5)], &mut e).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn subtract_single_arg_negates() {
        let mut e = env();
        assert_eq!(subtract(&[Value::Int(5)], &mut e).unwrap(), Value::Int(-5));
    }

    #[test]
    fn divide_by_zero_is_an_arithmetic_error() {
        let mut e = env();
        assert!(divide(&[Value::Int(1), Value::Int(0)], &mut e).is_err());
    }

    #[test]
    fn integer_overflow_is_reported() {
        let mut e = env();
        assert!(add(&[Value::Int(i64::MAX), Value::Int(1)], &mut e).is_err());
    }
}
