//! `Value::Symbol` and `Value::Keyword` payloads.

use crate::collections::array_map::ArrayMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A symbol value: optional namespace, name, and optional metadata (used to
/// carry `:dynamic`/`:private`/doc metadata through to `def`).
#[derive(Clone)]
pub struct SymbolValue {
    pub ns: Option<Rc<str>>,
    pub name: Rc<str>,
    pub meta: RefCell<Option<ArrayMap>>,
}

impl SymbolValue {
    pub fn unqualified(name: impl Into<Rc<str>>) -> Rc<Self> {
        Rc::new(SymbolValue {
            ns: None,
            name: name.into(),
            meta: RefCell::new(None),
        })
    }

    pub fn qualified(ns: impl Into<Rc<str>>, name: impl Into<Rc<str>>) -> Rc<Self> {
        Rc::new(SymbolValue {
            ns: Some(ns.into()),
            name: name.into(),
            meta: RefCell::new(None),
        })
    }

    pub fn with_meta(self: &Rc<Self>, meta: ArrayMap) -> Rc<Self> {
        Rc::new(SymbolValue {
            ns: self.ns.clone(),
            name: self.name.clone(),
            meta: RefCell::new(Some(meta)),
        })
    }
}

impl std::fmt::Display for SymbolValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A keyword value. Keywords are interned logically (any two keywords with
/// the same ns/name print and compare equal) but are not pointer-interned:
/// equality is structural, see `equality.rs`.
#[derive(Clone)]
pub struct KeywordValue {
    pub ns: Option<Rc<str>>,
    pub name: Rc<str>,
}

impl KeywordValue {
    pub fn unqualified(name: impl Into<Rc<str>>) -> Rc<Self> {
        Rc::new(KeywordValue {
            ns: None,
            name: name.into(),
        })
    }

    pub fn qualified(ns: impl Into<Rc<str>>, name: impl Into<Rc<str>>) -> Rc<Self> {
        Rc::new(KeywordValue {
            ns: Some(ns.into()),
            name: name.into(),
        })
    }
}

impl std::fmt::Display for KeywordValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, ":{}/{}", ns, self.name),
            None => write!(f, ":{}", self.name),
        }
    }
}
