//! `derive`/`underive`/`isa?`/`parents`/`ancestors`/`descendants`: the
//! surface-level operations on the session's shared `Hierarchy` (section
//! 3.3), read and written through `Environment::hierarchy`.

use crate::collections::PList;
use crate::environment::Environment;
use crate::error::QuillError;
use crate::fn_val::{Arity, BuiltinFn};
use crate::value::Value;
use std::rc::Rc;

pub fn derive(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    env.hierarchy.derive(args[0].clone(), args[1].clone());
    Ok(Value::Nil)
}

pub fn underive(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    env.hierarchy.underive(&args[0], &args[1]);
    Ok(Value::Nil)
}

pub fn isa(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Bool(env.hierarchy.isa(&args[0], &args[1])))
}

pub fn parents(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::List(PList::from_vec(env.hierarchy.parents(&args[0]))))
}

pub fn ancestors(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::List(PList::from_vec(env.hierarchy.ancestors(&args[0]))))
}

pub fn descendants(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::List(PList::from_vec(env.hierarchy.descendants(&args[0]))))
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    defs.push(BuiltinFn::new("derive", vec![Arity::Fixed(2)], derive));
    defs.push(BuiltinFn::new("underive", vec![Arity::Fixed(2)], underive));
    defs.push(BuiltinFn::new("isa?", vec![Arity::Fixed(2)], isa));
    defs.push(BuiltinFn::new("parents", vec![Arity::Fixed(1)], parents));
    defs.push(BuiltinFn::new("ancestors", vec![Arity::Fixed(1)], ancestors));
    defs.push(BuiltinFn::new("descendants", vec![Arity::Fixed(1)], descendants));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fn_val::{Dispatcher as DispatcherTrait, FnVal};
    use crate::symbol::KeywordValue;

    struct NullDispatcher;
    impl DispatcherTrait for NullDispatcher {
        fn call(&self, _f: &Rc<FnVal>, _args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
            unreachable!()
        }
    }

    fn env() -> Environment {
        Environment::new(Rc::new(NullDispatcher))
    }

    fn kw(name: &str) -> Value {
        Value::Keyword(KeywordValue::unqualified(name))
    }

    #[test]
    fn derive_then_isa_follows_chain() {
        let mut e = env();
        derive(&[kw("dog"), kw("animal")], &mut e).unwrap();
        derive(&[kw("poodle"), kw("dog")], &mut e).unwrap();
        assert_eq!(isa(&[kw("poodle"), kw("animal")], &mut e).unwrap(), Value::Bool(true));
        assert_eq!(isa(&[kw("poodle"), kw("cat")], &mut e).unwrap(), Value::Bool(false));
    }

    #[test]
    fn underive_removes_edge() {
        let mut e = env();
        derive(&[kw("dog"), kw("animal")], &mut e).unwrap();
        underive(&[kw("dog"), kw("animal")], &mut e).unwrap();
        assert_eq!(isa(&[kw("dog"), kw("animal")], &mut e).unwrap(), Value::Bool(false));
    }
}
