//! Namespaces: a named table of vars, plus the alias/refer tables that let
//! `(ns foo (:require [bar :as b]))`-style resolution map a short name back
//! to a fully-qualified var.

use crate::value::Value;
use crate::var::Var;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct Namespace {
    pub name: Rc<str>,
    vars: RefCell<HashMap<Rc<str>, Rc<Var>>>,
    referred: RefCell<HashMap<Rc<str>, Rc<Var>>>,
    aliases: RefCell<HashMap<Rc<str>, Rc<str>>>,
}

impl Namespace {
    pub fn new(name: impl Into<Rc<str>>) -> Rc<Self> {
        Rc::new(Namespace {
            name: name.into(),
            vars: RefCell::new(HashMap::new()),
            referred: RefCell::new(HashMap::new()),
            aliases: RefCell::new(HashMap::new()),
        })
    }

    /// Looks up an existing var, or interns a fresh unbound (`Nil`-rooted)
    /// one, matching `def`'s "declare if absent" behavior.
    pub fn intern(&self, name: impl Into<Rc<str>>) -> Rc<Var> {
        let name = name.into();
        let mut vars = self.vars.borrow_mut();
        vars.entry(name.clone())
            .or_insert_with(|| Var::new(self.name.clone(), name, Value::Nil))
            .clone()
    }

    pub fn define(&self, name: impl Into<Rc<str>>, value: Value) -> Rc<Var> {
        let var = self.intern(name);
        var.set_root(value);
        var
    }

    pub fn get_own(&self, name: &str) -> Option<Rc<Var>> {
        self.vars.borrow().get(name).cloned()
    }

    /// Resolves a bare name first against this namespace's own vars, then
    /// against anything `refer`-ed in from elsewhere.
    pub fn resolve(&self, name: &str) -> Option<Rc<Var>> {
        self.get_own(name)
            .or_else(|| self.referred.borrow().get(name).cloned())
    }

    pub fn refer(&self, name: impl Into<Rc<str>>, var: Rc<Var>) {
        self.referred.borrow_mut().insert(name.into(), var);
    }

    pub fn add_alias(&self, alias: impl Into<Rc<str>>, target_ns: impl Into<Rc<str>>) {
        self.aliases.borrow_mut().insert(alias.into(), target_ns.into());
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<Rc<str>> {
        self.aliases.borrow().get(alias).cloned()
    }

    pub fn var_names(&self) -> Vec<Rc<str>> {
        self.vars.borrow().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let ns = Namespace::new("user");
        let a = ns.intern("x");
        let b = ns.intern("x");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn refer_is_checked_after_own_vars() {
        let ns_a = Namespace::new("a");
        let ns_b = Namespace::new("b");
        let shared = ns_a.define("greet", Value::Int(1));
        ns_b.refer("greet", shared.clone());
        assert!(Rc::ptr_eq(&ns_b.resolve("greet").unwrap(), &shared));
        ns_b.define("greet", Value::Int(2));
        assert_eq!(ns_b.resolve("greet").unwrap().get(), Value::Int(2));
    }
}
