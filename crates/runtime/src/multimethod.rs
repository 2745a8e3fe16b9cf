//! Multimethods (`defmulti`/`defmethod`): dispatch on the value returned by
//! a user-supplied dispatch function, matched against registered dispatch
//! values by `=`, falling back to a named default (`:default` unless
//! overridden).

use crate::equality::value_eq;
use crate::hierarchy::Hierarchy;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Prefers `over` when both `a` and `b` are registered dispatch values with
/// an ambiguous isa? relationship (section 4.8: "prefer_table for ties").
pub struct PreferEntry {
    pub over: Value,
    pub under: Value,
}

/// The two-level monomorphic cache (section 4.8): a dispatch is cheap to
/// repeat when it is the *same* first-argument dispatch value as last time,
/// and cheaper still to repeat across different dispatch values that all
/// happen to resolve to the same method (the "last computed dispatch value
/// → method" level). Any method-table change bumps `epoch`, invalidating
/// both levels without having to walk and clear anything.
struct DispatchCache {
    epoch: u64,
    last_dispatch_value: Value,
    last_method: Value,
}

pub struct MultiFnValue {
    pub name: Rc<str>,
    pub dispatch_fn: Value,
    pub default_dispatch_value: Value,
    methods: RefCell<Vec<(Value, Value)>>,
    prefers: RefCell<Vec<PreferEntry>>,
    epoch: Cell<u64>,
    cache: RefCell<Option<DispatchCache>>,
}

impl MultiFnValue {
    pub fn new(name: impl Into<Rc<str>>, dispatch_fn: Value, default_dispatch_value: Value) -> Rc<Self> {
        Rc::new(MultiFnValue {
            name: name.into(),
            dispatch_fn,
            default_dispatch_value,
            methods: RefCell::new(Vec::new()),
            prefers: RefCell::new(Vec::new()),
            epoch: Cell::new(0),
            cache: RefCell::new(None),
        })
    }

    fn bump_epoch(&self) {
        self.epoch.set(self.epoch.get() + 1);
    }

    pub fn add_method(&self, dispatch_value: Value, method: Value) {
        let mut methods = self.methods.borrow_mut();
        if let Some(slot) = methods
            .iter_mut()
            .find(|(dv, _)| value_eq(dv, &dispatch_value))
        {
            slot.1 = method;
        } else {
            methods.push((dispatch_value, method));
        }
        drop(methods);
        self.bump_epoch();
    }

    pub fn remove_method(&self, dispatch_value: &Value) {
        self.methods
            .borrow_mut()
            .retain(|(dv, _)| !value_eq(dv, dispatch_value));
        self.bump_epoch();
    }

    pub fn prefer_method(&self, over: Value, under: Value) {
        self.prefers.borrow_mut().push(PreferEntry { over, under });
        self.bump_epoch();
    }

    fn prefers_over(&self, a: &Value, b: &Value) -> bool {
        self.prefers
            .borrow()
            .iter()
            .any(|p| value_eq(&p.over, a) && value_eq(&p.under, b))
    }

    /// Looks up the method for `dispatch_value`: exact match first, then an
    /// `isa?` walk through `hierarchy` picking the most specific registered
    /// ancestor (breaking ties via `prefer-method`), then the `:default`
    /// method.
    pub fn get_method(&self, dispatch_value: &Value, hierarchy: &Hierarchy) -> Option<Value> {
        if let Some(cached) = &*self.cache.borrow() {
            if cached.epoch == self.epoch.get() && value_eq(&cached.last_dispatch_value, dispatch_value) {
                return Some(cached.last_method.clone());
            }
        }
        let methods = self.methods.borrow();
        let resolved = methods
            .iter()
            .find(|(dv, _)| value_eq(dv, dispatch_value))
            .map(|(_, m)| m.clone())
            .or_else(|| self.isa_dispatch(dispatch_value, &methods, hierarchy))
            .or_else(|| {
                methods
                    .iter()
                    .find(|(dv, _)| value_eq(dv, &self.default_dispatch_value))
                    .map(|(_, m)| m.clone())
            });
        if let Some(method) = &resolved {
            *self.cache.borrow_mut() = Some(DispatchCache {
                epoch: self.epoch.get(),
                last_dispatch_value: dispatch_value.clone(),
                last_method: method.clone(),
            });
        }
        resolved
    }

    fn isa_dispatch(
        &self,
        dispatch_value: &Value,
        methods: &[(Value, Value)],
        hierarchy: &Hierarchy,
    ) -> Option<Value> {
        let mut best: Option<&(Value, Value)> = None;
        for candidate in methods.iter() {
            if !hierarchy.isa(dispatch_value, &candidate.0) {
                continue;
            }
            best = match best {
                None => Some(candidate),
                Some(current) if self.prefers_over(&candidate.0, &current.0) => Some(candidate),
                Some(current) => Some(current),
            };
        }
        best.map(|(_, m)| m.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::KeywordValue;

    fn kw(name: &str) -> Value {
        Value::Keyword(KeywordValue::unqualified(name))
    }

    #[test]
    fn dispatches_by_registered_value_with_default_fallback() {
        let multi = MultiFnValue::new("area", Value::Nil, kw("default"));
        let hierarchy = Hierarchy::new();
        multi.add_method(kw("circle"), Value::Int(1));
        multi.add_method(kw("default"), Value::Int(0));
        assert_eq!(multi.get_method(&kw("circle"), &hierarchy), Some(Value::Int(1)));
        assert_eq!(multi.get_method(&kw("square"), &hierarchy), Some(Value::Int(0)));
    }

    #[test]
    fn dispatches_through_hierarchy_when_no_exact_match() {
        let multi = MultiFnValue::new("area", Value::Nil, kw("default"));
        let hierarchy = Hierarchy::new();
        hierarchy.derive(kw("square"), kw("rectangle"));
        multi.add_method(kw("rectangle"), Value::Int(7));
        assert_eq!(multi.get_method(&kw("square"), &hierarchy), Some(Value::Int(7)));
    }

    #[test]
    fn cache_invalidates_when_method_table_changes() {
        let multi = MultiFnValue::new("area", Value::Nil, kw("default"));
        let hierarchy = Hierarchy::new();
        multi.add_method(kw("circle"), Value::Int(1));
        assert_eq!(multi.get_method(&kw("circle"), &hierarchy), Some(Value::Int(1)));
        multi.add_method(kw("circle"), Value::Int(2));
        assert_eq!(multi.get_method(&kw("circle"), &hierarchy), Some(Value::Int(2)));
    }
}
