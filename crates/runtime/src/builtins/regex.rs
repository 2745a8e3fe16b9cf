//! `re-pattern`/`re-matches`/`re-find`/`re-seq`: thin wrappers over
//! `regex_val::RegexValue`, matching Clojure's string-return convention
//! (whole match if no groups, a vector of `[whole group1 ...]` otherwise).

use crate::collections::{PList, PVector};
use crate::environment::Environment;
use crate::error::{Phase, QuillError};
use crate::fn_val::{Arity, BuiltinFn};
use crate::regex_val::RegexValue;
use crate::value::Value;
use std::rc::Rc;

fn as_str(v: &Value) -> Result<Rc<str>, QuillError> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        other => Err(QuillError::type_error(
            Phase::Execute,
            format!("expected a string, got {}", other.type_name()),
        )),
    }
}

fn as_regex(v: &Value) -> Result<Rc<RegexValue>, QuillError> {
    match v {
        Value::Regex(r) => Ok(r.clone()),
        other => Err(QuillError::type_error(
            Phase::Execute,
            format!("expected a regex, got {}", other.type_name()),
        )),
    }
}

fn captures_to_value(caps: &regex::Captures) -> Value {
    if caps.len() == 1 {
        return Value::Str(Rc::from(&caps[0]));
    }
    let groups: Vec<Value> = caps
        .iter()
        .map(|m| m.map(|m| Value::Str(Rc::from(m.as_str()))).unwrap_or(Value::Nil))
        .collect();
    Value::Vector(PVector::from_vec(groups))
}

pub fn re_pattern(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let pattern = as_str(&args[0])?;
    let compiled = RegexValue::compile(pattern)
        .map_err(|e| QuillError::syntax(Phase::Execute, format!("invalid regex: {e}")))?;
    Ok(Value::Regex(compiled))
}

pub fn re_matches(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let re = as_regex(&args[0])?;
    let s = as_str(&args[1])?;
    match re.compiled.captures(&s) {
        Some(caps) if caps.get(0).map(|m| m.as_str()) == Some(&*s) => Ok(captures_to_value(&caps)),
        _ => Ok(Value::Nil),
    }
}

pub fn re_find(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let re = as_regex(&args[0])?;
    let s = as_str(&args[1])?;
    match re.compiled.captures(&s) {
        Some(caps) => Ok(captures_to_value(&caps)),
        None => Ok(Value::Nil),
    }
}

pub fn re_seq(args: &[Value], _env: &mut Environment) -> Result<Value, QuillError> {
    let re = as_regex(&args[0])?;
    let s = as_str(&args[1])?;
    let matches: Vec<Value> = re.compiled.captures_iter(&s).map(|c| captures_to_value(&c)).collect();
    Ok(Value::List(PList::from_vec(matches)))
}

pub fn register(defs: &mut Vec<Rc<BuiltinFn>>) {
    defs.push(BuiltinFn::new("re-pattern", vec![Arity::Fixed(1)], re_pattern));
    defs.push(BuiltinFn::new("re-matches", vec![Arity::Fixed(2)], re_matches));
    defs.push(BuiltinFn::new("re-find", vec![Arity::Fixed(2)], re_find));
    defs.push(BuiltinFn::new("re-seq", vec![Arity::Fixed(2)], re_seq));
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
    fn re_find_returns_first_match() {
        let mut e = env();
        let re = re_pattern(&[Value::Str(Rc::from(r"\d+"))], &mut e).unwrap();
        let found = re_find(&[re, Value::Str(Rc::from("a12b34"))], &mut e).unwrap();
        assert_eq!(found, Value::Str(Rc::from("12")));
    }

    #[test]
    fn re_seq_collects_all_matches() {
        let mut e = env();
        let re = re_pattern(&[Value::Str(Rc::from(r"\d+"))], &mut e).unwrap();
        let all = re_seq(&[re, Value::Str(Rc::from("a12b34"))], &mut e).unwrap();
        assert_eq!(crate::print::print_str(&all), "(12 34)");
    }

    #[test]
    fn re_matches_requires_whole_string() {
        let mut e = env();
        let re = re_pattern(&[Value::Str(Rc::from(r"\d+"))], &mut e).unwrap();
        assert_eq!(re_matches(&[re.clone(), Value::Str(Rc::from("a12"))], &mut e).unwrap(), Value::Nil);
        assert_eq!(
            re_matches(&[re, Value::Str(Rc::from("12"))], &mut e).unwrap(),
            Value::Str(Rc::from("12"))
        );
    }
}
