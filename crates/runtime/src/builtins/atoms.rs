//! `atom`/`volatile!`/`delay`/`reduced` builtins: `deref`, `reset!`,
//! `swap!`, `compare-and-set!`, validator and watch management, and the
//! force/realized? pair shared by delays and lazy seqs (section 4.8).

use crate::atom::{AtomCell, DelayCell, VolatileCell};
use crate::environment::Environment;
use crate::error::{Phase, QuillError};
use crate::fn_val::{Arity, BuiltinFn};
use crate::value::Value;
use std::rc::Rc;

fn type_error(expected: &str, got: &Value) -> QuillError {
    QuillError::type_error(
        Phase::Execute,
        format!("expected {expected}, got {}", got.type_name()),
    )
}

pub fn atom_ctor(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Atom(AtomCell::new(args[0].clone())))
}

pub fn volatile_ctor(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Volatile(VolatileCell::new(args[0].clone())))
}

pub fn deref(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Atom(a) => Ok(a.deref()),
        Value::Volatile(v) => Ok(v.deref()),
        Value::Delay(d) => {
            let mut env2 = env.clone();
            d.force(move |thunk| env2.call_value(&thunk, &[]))
        }
        other => Err(type_error("atom, volatile, or delay", other)),
    }
}

pub fn reset_bang(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Atom(a) => {
            let mut env_validator = env.clone();
            let mut env_watch = env.clone();
            let atom_value = args[0].clone();
            a.reset(
                args[1].clone(),
                move |validator, candidate| {
                    env_validator.call_value(validator, std::slice::from_ref(candidate))
                },
                move |key, watch_fn, old, new| {
                    env_watch
                        .call_value(watch_fn, &[key.clone(), atom_value.clone(), old.clone(), new.clone()])
                        .map(|_| ())
                },
            )
        }
        Value::Volatile(v) => Ok(v.reset(args[1].clone())),
        other => Err(type_error("atom or volatile", other)),
    }
}

pub fn swap_bang(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let atom = match &args[0] {
        Value::Atom(a) => a.clone(),
        other => return Err(type_error("atom", other)),
    };
    let f = args[1].clone();
    let extra = args[2..].to_vec();
    let mut env_call = env.clone();
    let mut env_validator = env.clone();
    let mut env_watch = env.clone();
    let atom_value = args[0].clone();
    atom.swap(
        move |current| {
            let mut call_args = Vec::with_capacity(1 + extra.len());
            call_args.push(current);
            call_args.extend(extra.iter().cloned());
            env_call.call_value(&f, &call_args)
        },
        move |validator, candidate| env_validator.call_value(validator, std::slice::from_ref(candidate)),
        move |key, watch_fn, old, new| {
            env_watch
                .call_value(watch_fn, &[key.clone(), atom_value.clone(), old.clone(), new.clone()])
                .map(|_| ())
        },
    )
}

pub fn compare_and_set_bang(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Atom(a) => Ok(Value::Bool(a.compare_and_set(&args[1], args[2].clone()))),
        other => Err(type_error("atom", other)),
    }
}

pub fn vreset_bang(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Volatile(v) => Ok(v.reset(args[1].clone())),
        other => Err(type_error("volatile", other)),
    }
}

pub fn vswap_bang(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    let v = match &args[0] {
        Value::Volatile(v) => v.clone(),
        other => return Err(type_error("volatile", other)),
    };
    let current = v.deref();
    let mut call_args = Vec::with_capacity(1 + args.len() - 2);
    call_args.push(current);
    call_args.extend(args[2..].iter().cloned());
    let next = env.call_value(&args[1], &call_args)?;
    Ok(v.reset(next))
}

pub fn set_validator_bang(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Atom(a) => {
            let validator = if args[1].is_nil() { None } else { Some(args[1].clone()) };
            a.set_validator(validator);
            Ok(Value::Nil)
        }
        other => Err(type_error("atom", other)),
    }
}

pub fn get_validator(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Atom(a) => Ok(a.validator().unwrap_or(Value::Nil)),
        other => Err(type_error("atom", other)),
    }
}

pub fn add_watch(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Atom(a) => {
            a.add_watch(args[1].clone(), args[2].clone());
            Ok(args[0].clone())
        }
        other => Err(type_error("atom", other)),
    }
}

pub fn remove_watch(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Atom(a) => {
            a.remove_watch(&args[1]);
            Ok(args[0].clone())
        }
        other => Err(type_error("atom", other)),
    }
}

pub fn force(args: &[Value], env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Delay(d) => {
            let mut env2 = env.clone();
            d.force(move |thunk| env2.call_value(&thunk, &[]))
        }
        other => Ok(other.clone()),
    }
}

pub fn realized_pred(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Delay(d) => Ok(Value::Bool(d.is_realized())),
        Value::LazySeq(s) => Ok(Value::Bool(s.is_realized())),
        other => Err(type_error("delay or lazy-seq", other)),
    }
}

pub fn delay_ctor(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Delay(DelayCell::new(args[0].clone())))
}

pub fn reduced_ctor(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Reduced(Rc::new(args[0].clone())))
}

pub fn is_reduced(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    Ok(Value::Bool(matches!(args[0], Value::Reduced(_))))
}

pub fn unreduced(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Reduced(v) => Ok((**v).clone()),
        other => Ok(other.clone()),
    }
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    defs.push(BuiltinFn::new("atom", vec![Arity::Fixed(1)], atom_ctor));
    defs.push(BuiltinFn::new("volatile!", vec![Arity::Fixed(1)], volatile_ctor));
    defs.push(BuiltinFn::new("deref", vec![Arity::Fixed(1)], deref));
    defs.push(BuiltinFn::new("reset!", vec![Arity::Fixed(2)], reset_bang));
    defs.push(BuiltinFn::new(
        "swap!",
        vec![Arity::Variadic { min: 2 }],
        swap_bang,
    ));
    defs.push(BuiltinFn::new(
        "compare-and-set!",
        vec![Arity::Fixed(3)],
        compare_and_set_bang,
    ));
    defs.push(BuiltinFn::new("vreset!", vec![Arity::Fixed(2)], vreset_bang));
    defs.push(BuiltinFn::new(
        "vswap!",
        vec![Arity::Variadic { min: 2 }],
        vswap_bang,
    ));
    defs.push(BuiltinFn::new(
        "set-validator!",
        vec![Arity::Fixed(2)],
        set_validator_bang,
    ));
    defs.push(BuiltinFn::new(
        "get-validator",
        vec![Arity::Fixed(1)],
        get_validator,
    ));
    defs.push(BuiltinFn::new("add-watch", vec![Arity::Fixed(3)], add_watch));
    defs.push(BuiltinFn::new(
        "remove-watch",
        vec![Arity::Fixed(2)],
        remove_watch,
    ));
    defs.push(BuiltinFn::new("force", vec![Arity::Fixed(1)], force));
    defs.push(BuiltinFn::new(
        "realized?",
        vec![Arity::Fixed(1)],
        realized_pred,
    ));
    defs.push(BuiltinFn::new("delay", vec![Arity::Fixed(1)], delay_ctor));
    defs.push(BuiltinFn::new("reduced", vec![Arity::Fixed(1)], reduced_ctor));
    defs.push(BuiltinFn::new("reduced?", vec![Arity::Fixed(1)], is_reduced));
    defs.push(BuiltinFn::new("unreduced", vec![Arity::Fixed(1)], unreduced));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fn_val::Dispatcher as DispatcherTrait;
    use crate::fn_val::FnVal;

    struct NullDispatcher;
    impl DispatcherTrait for NullDispatcher {
        fn call(&self, _f: &Rc<FnVal>, _args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
            unreachable!("not exercised: tests only call builtins directly")
        }
    }

    fn env() -> Environment {
        Environment::new(Rc::new(NullDispatcher))
    }

    #[test]
    fn reset_and_deref_roundtrip() {
        let mut e = env();
        let atom = atom_ctor(&[Value::Int(1)], &mut e).unwrap();
        reset_bang(&[atom.clone(), Value::Int(5)], &mut e).unwrap();
        assert_eq!(deref(&[atom], &mut e).unwrap(), Value::Int(5));
    }

    #[test]
    fn compare_and_set_only_swaps_on_match() {
        let mut e = env();
        let atom = atom_ctor(&[Value::Int(1)], &mut e).unwrap();
        let ok = compare_and_set_bang(&[atom.clone(), Value::Int(2), Value::Int(9)], &mut e).unwrap();
        assert_eq!(ok, Value::Bool(false));
        let ok = compare_and_set_bang(&[atom.clone(), Value::Int(1), Value::Int(9)], &mut e).unwrap();
        assert_eq!(ok, Value::Bool(true));
        assert_eq!(deref(&[atom], &mut e).unwrap(), Value::Int(9));
    }

    #[test]
    fn reduced_roundtrip() {
        let mut e = env();
        let r = reduced_ctor(&[Value::Int(3)], &mut e).unwrap();
        assert_eq!(is_reduced(&[r.clone()], &mut e).unwrap(), Value::Bool(true));
        assert_eq!(unreduced(&[r], &mut e).unwrap(), Value::Int(3));
    }
}
