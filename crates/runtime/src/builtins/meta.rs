//! `meta`/`with-meta`/`vary-meta`. Only the variants that actually carry a
//! metadata slot today (symbols, atoms, vars) support it; everything else
//! reports `nil` meta and is unaffected by `with-meta` — see `DESIGN.md` for
//! why collection literals don't yet carry per-value metadata.

use crate::collections::array_map::ArrayMap;
use crate::environment::Environment;
use crate::error::QuillError;
use crate::fn_val::{Arity, BuiltinFn};
use crate::value::Value;
use std::rc::Rc;

fn as_map(v: &Value) -> Option<ArrayMap> {
    match v {
        Value::Map(m) => Some(m.clone()),
        Value::Nil => Some(ArrayMap::empty()),
        _ => None,
    }
}

pub fn meta(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let meta = match &args[0] {
        Value::Symbol(sym) => sym.meta.borrow().clone(),
        Value::Atom(a) => a.meta(),
        Value::VarRef(v) => v.meta(),
        _ => None,
    };
    Ok(meta.map(Value::Map).unwrap_or(Value::Nil))
}

pub fn with_meta(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let new_meta = as_map(&args[1]).ok_or_else(|| {
        QuillError::type_error(
            crate::error::Phase::Execute,
            format!("with-meta metadata must be a map, got {}", args[1].type_name()),
        )
    })?;
    match &args[0] {
        Value::Symbol(sym) => Ok(Value::Symbol(sym.with_meta(new_meta))),
        Value::Atom(a) => {
            a.set_meta(new_meta);
            Ok(args[0].clone())
        }
        Value::VarRef(v) => {
            v.set_meta(new_meta);
            Ok(args[0].clone())
        }
        other => Ok(other.clone()),
    }
}

pub fn vary_meta(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let current = meta(&args[0..1], env)?;
    let current_map = as_map(&current).unwrap_or_else(ArrayMap::empty);
    let mut call_args = Vec::with_capacity(args.len() - 1);
    call_args.push(Value::Map(current_map));
    call_args.extend(args[2..].iter().cloned());
    let updated = env.call_value(&args[1], &call_args)?;
    with_meta(&[args[0].clone(), updated], env)
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    defs.push(BuiltinFn::new("meta", vec![Arity::Fixed(1)], meta));
    defs.push(BuiltinFn::new("with-meta", vec![Arity::Fixed(2)], with_meta));
    defs.push(BuiltinFn::new(
        "vary-meta",
        vec![Arity::Variadic { min: 2 }],
        vary_meta,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fn_val::{Dispatcher as DispatcherTrait, FnVal};
    use crate::symbol::SymbolValue;

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
    fn with_meta_then_meta_roundtrips_on_symbol() {
        let mut e = env();
        let sym = Value::Symbol(SymbolValue::unqualified("x"));
        let tagged = with_meta(
            &[sym, Value::Map(ArrayMap::from_pairs(vec![(
                Value::Keyword(crate::symbol::KeywordValue::unqualified("doc")),
                Value::Str(Rc::from("hi")),
            )]))],
            &mut e,
        )
        .unwrap();
        let m = meta(&[tagged], &mut e).unwrap();
        assert!(matches!(m, Value::Map(_)));
    }

    #[test]
    fn bare_value_has_nil_meta() {
        let mut e = env();
        assert_eq!(meta(&[Value::Int(1)], &mut e).unwrap(), Value::Nil);
    }
}
