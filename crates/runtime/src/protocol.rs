//! Protocols: a named set of method signatures plus, per concrete type, an
//! implementation map filled in by `extend-protocol`/`extend-type`. Dispatch
//! is by the argument's `TypeTag`, not by an open-ended predicate, which
//! keeps `extend`/lookup a direct hash-map operation.

use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// The runtime "type" a value dispatches protocols on. Collections keep one
/// shared tag regardless of which concrete representation (`ArrayMap` vs
/// `HMap`, `PList` vs lazy seq) backs them, matching the language-level
/// view that there is one `map`/`seq` type, not one per implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Nil,
    Bool,
    Int,
    Float,
    Char,
    Str,
    Symbol,
    Keyword,
    List,
    Vector,
    Map,
    Set,
    Fn,
    Atom,
    Custom(Rc<str>),
}

/// The inverse of `type_tag`'s value-side mapping, for `extend-type`'s type
/// name symbol (`(extend-type string ...)`, `(extend-type MyRecord ...)`).
/// Any name outside the built-in set becomes a `Custom` tag, so user-defined
/// type names extend protocols the same way built-in types do.
pub fn type_tag_from_name(name: &str) -> TypeTag {
    match name {
        "nil" => TypeTag::Nil,
        "boolean" => TypeTag::Bool,
        "integer" | "long" => TypeTag::Int,
        "float" | "double" => TypeTag::Float,
        "char" => TypeTag::Char,
        "string" => TypeTag::Str,
        "symbol" => TypeTag::Symbol,
        "keyword" => TypeTag::Keyword,
        "list" | "seq" => TypeTag::List,
        "vector" => TypeTag::Vector,
        "map" => TypeTag::Map,
        "set" => TypeTag::Set,
        "fn" => TypeTag::Fn,
        "atom" => TypeTag::Atom,
        other => TypeTag::Custom(Rc::from(other)),
    }
}

pub fn type_tag(v: &Value) -> TypeTag {
    match v {
        Value::Nil => TypeTag::Nil,
        Value::Bool(_) => TypeTag::Bool,
        Value::Int(_) => TypeTag::Int,
        Value::Float(_) => TypeTag::Float,
        Value::Char(_) => TypeTag::Char,
        Value::Str(_) => TypeTag::Str,
        Value::Symbol(_) => TypeTag::Symbol,
        Value::Keyword(_) => TypeTag::Keyword,
        Value::List(_) | Value::Cons(_) | Value::ChunkedCons(_) | Value::LazySeq(_) => {
            TypeTag::List
        }
        Value::Vector(_) => TypeTag::Vector,
        Value::Map(_) | Value::HashMap(_) => TypeTag::Map,
        Value::Set(_) => TypeTag::Set,
        Value::FnVal(_) | Value::BuiltinFn(_) => TypeTag::Fn,
        Value::Atom(_) | Value::Volatile(_) => TypeTag::Atom,
        _ => TypeTag::Custom(Rc::from("unknown")),
    }
}

pub struct ProtocolValue {
    pub name: Rc<str>,
    pub method_names: Vec<Rc<str>>,
    methods: RefCell<HashMap<TypeTag, HashMap<Rc<str>, Value>>>,
    cache_epoch: RefCell<u64>,
}

impl ProtocolValue {
    pub fn new(name: impl Into<Rc<str>>, method_names: Vec<Rc<str>>) -> Rc<Self> {
        Rc::new(ProtocolValue {
            name: name.into(),
            method_names,
            methods: RefCell::new(HashMap::new()),
            cache_epoch: RefCell::new(0),
        })
    }

    /// Invalidated on every `extend`, since a new implementation can change
    /// what a cached `protocol_fn` call should have resolved to.
    pub fn extend(&self, tag: TypeTag, method_name: Rc<str>, implementation: Value) {
        self.methods
            .borrow_mut()
            .entry(tag)
            .or_default()
            .insert(method_name, implementation);
        *self.cache_epoch.borrow_mut() += 1;
    }

    pub fn epoch(&self) -> u64 {
        *self.cache_epoch.borrow()
    }

    pub fn find_method(&self, tag: &TypeTag, method_name: &str) -> Option<Value> {
        self.methods
            .borrow()
            .get(tag)
            .and_then(|impls| impls.get(method_name))
            .cloned()
    }

    pub fn satisfies(&self, tag: &TypeTag) -> bool {
        self.methods.borrow().contains_key(tag)
    }
}

/// One-slot monomorphic cache: the last type tag dispatched on and the
/// protocol epoch it was resolved under. A mismatch on either falls back to
/// a full `ProtocolValue::find_method` lookup (section 4.8).
struct ProtocolCache {
    tag: TypeTag,
    epoch: u64,
    method: Value,
}

pub struct ProtocolFnValue {
    pub protocol: Rc<ProtocolValue>,
    pub method_name: Rc<str>,
    cache: RefCell<Option<ProtocolCache>>,
    cache_hits: Cell<u64>,
}

impl ProtocolFnValue {
    pub fn new(protocol: Rc<ProtocolValue>, method_name: impl Into<Rc<str>>) -> Rc<Self> {
        Rc::new(ProtocolFnValue {
            protocol,
            method_name: method_name.into(),
            cache: RefCell::new(None),
            cache_hits: Cell::new(0),
        })
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.get()
    }

    /// Resolves the method implementation for `tag`, consulting (and
    /// refreshing) the one-slot cache.
    pub fn resolve(&self, tag: &TypeTag) -> Option<Value> {
        let epoch = self.protocol.epoch();
        if let Some(cached) = &*self.cache.borrow() {
            if &cached.tag == tag && cached.epoch == epoch {
                self.cache_hits.set(self.cache_hits.get() + 1);
                return Some(cached.method.clone());
            }
        }
        let method = self.protocol.find_method(tag, &self.method_name)?;
        *self.cache.borrow_mut() = Some(ProtocolCache {
            tag: tag.clone(),
            epoch,
            method: method.clone(),
        });
        Some(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_and_find_method() {
        let proto = ProtocolValue::new("Shape", vec![Rc::from("area")]);
        proto.extend(TypeTag::Int, Rc::from("area"), Value::Int(1));
        assert!(proto.satisfies(&TypeTag::Int));
        assert!(proto.find_method(&TypeTag::Int, "area").is_some());
        assert!(proto.find_method(&TypeTag::Str, "area").is_none());
    }

    #[test]
    fn protocol_fn_cache_hits_on_repeated_same_type_dispatch() {
        let proto = ProtocolValue::new("Shape", vec![Rc::from("area")]);
        proto.extend(TypeTag::Int, Rc::from("area"), Value::Int(1));
        let fn_val = ProtocolFnValue::new(proto, "area");
        assert_eq!(fn_val.resolve(&TypeTag::Int), Some(Value::Int(1)));
        assert_eq!(fn_val.resolve(&TypeTag::Int), Some(Value::Int(1)));
        assert_eq!(fn_val.cache_hits(), 1, "second call hits the cached slot");
    }

    #[test]
    fn protocol_fn_cache_invalidates_on_extend() {
        let proto = ProtocolValue::new("Shape", vec![Rc::from("area")]);
        proto.extend(TypeTag::Int, Rc::from("area"), Value::Int(1));
        let fn_val = ProtocolFnValue::new(proto.clone(), "area");
        assert_eq!(fn_val.resolve(&TypeTag::Int), Some(Value::Int(1)));
        proto.extend(TypeTag::Int, Rc::from("area"), Value::Int(2));
        assert_eq!(fn_val.resolve(&TypeTag::Int), Some(Value::Int(2)));
    }

    #[test]
    fn type_tag_unifies_map_representations() {
        let literal = Value::Map(crate::collections::array_map::ArrayMap::empty());
        let hashed = Value::HashMap(crate::collections::hash_map::HMap::empty());
        assert_eq!(type_tag(&literal), type_tag(&hashed));
    }
}
