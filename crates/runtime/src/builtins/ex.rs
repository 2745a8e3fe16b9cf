//! `ex-info`/`ex-message`/`ex-data`/`ex-cause`: user-level exceptions are
//! ordinary `Value::Map`s carrying three well-known keyword keys, not a
//! dedicated `Value` variant — matching section 7's "a thrown Value is an
//! ordinary Value, not a machine-error tag."

use crate::collections::array_map::ArrayMap;
use crate::environment::Environment;
use crate::error::{Phase, QuillError};
use crate::fn_val::{Arity, BuiltinFn};
use crate::symbol::KeywordValue;
use crate::value::Value;
use std::rc::Rc;

fn message_key() -> Value {
    Value::Keyword(KeywordValue::qualified("quill.core", "ex-message"))
}
fn data_key() -> Value {
    Value::Keyword(KeywordValue::qualified("quill.core", "ex-data"))
}
fn cause_key() -> Value {
    Value::Keyword(KeywordValue::qualified("quill.core", "ex-cause"))
}

pub fn ex_info(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let message = match &args[0] {
        Value::Str(_) => args[0].clone(),
        other => {
            return Err(QuillError::type_error(
                Phase::Execute,
                format!("ex-info message must be a string, got {}", other.type_name()),
            ))
        }
    };
    let data = match &args[1] {
        Value::Map(_) | Value::HashMap(_) => args[1].clone(),
        other => {
            return Err(QuillError::type_error(
                Phase::Execute,
                format!("ex-info data must be a map, got {}", other.type_name()),
            ))
        }
    };
    let mut pairs = vec![(message_key(), message), (data_key(), data)];
    if let Some(cause) = args.get(2) {
        pairs.push((cause_key(), cause.clone()));
    }
    Ok(Value::Map(ArrayMap::from_pairs(pairs)))
}

fn lookup(v: &Value, key: &Value) -> Value {
    match v {
        Value::Map(m) => m.get(key).unwrap_or(Value::Nil),
        Value::HashMap(m) => m.get(key).unwrap_or(Value::Nil),
        _ => Value::Nil,
    }
}

pub fn ex_message(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(lookup(&args[0], &message_key()))
}

pub fn ex_data(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(lookup(&args[0], &data_key()))
}

pub fn ex_cause(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(lookup(&args[0], &cause_key()))
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    defs.push(BuiltinFn::new(
        "ex-info",
        vec![Arity::Fixed(2), Arity::Fixed(3)],
        ex_info,
    ));
    defs.push(BuiltinFn::new("ex-message", vec![Arity::Fixed(1)], ex_message));
    defs.push(BuiltinFn::new("ex-data", vec![Arity::Fixed(1)], ex_data));
    defs.push(BuiltinFn::new("ex-cause", vec![Arity::Fixed(1)], ex_cause));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fn_val::{Dispatcher as DispatcherTrait, FnVal};

    struct NullDispatcher;
    impl DispatcherTrait for NullDispatcher {
        fn call(&self, _f: &Rc<FnVal>, _args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
            unreachable!()
        }
    }

    fn env() -> Environment {
        Environment::new(Rc::new(NullDispatcher))
    }

    #[test]
    fn ex_info_roundtrips_message_and_data() {
        let mut e = env();
        let data = Value::Map(ArrayMap::from_pairs(vec![(
            Value::Keyword(KeywordValue::unqualified("code")),
            Value::Int(42),
        )]));
        let ex = ex_info(&[Value::Str(Rc::from("boom")), data], &mut e).unwrap();
        assert_eq!(ex_message(&[ex.clone()], &mut e).unwrap(), Value::Str(Rc::from("boom")));
        let read_back = ex_data(&[ex], &mut e).unwrap();
        assert_eq!(
            lookup(&read_back, &Value::Keyword(KeywordValue::unqualified("code"))),
            Value::Int(42)
        );
    }
}
