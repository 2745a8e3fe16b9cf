//! Surface forms: the trees the reader produces and the analyzer consumes.
//!
//! `Form` intentionally mirrors the runtime `Value` shape (see
//! `quill_runtime::value::Value`) but is pre-analysis: no macro expansion has
//! happened yet, and every node still carries its source location instead of
//! arbitrary metadata.

use quill_core::SourceLocation;
use std::rc::Rc;

/// A form with its source location attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub loc: SourceLocation,
}

impl<T> Spanned<T> {
    pub fn new(node: T, loc: SourceLocation) -> Self {
        Spanned { node, loc }
    }
}

pub type SForm = Spanned<Form>;

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub ns: Option<Rc<str>>,
    pub name: Rc<str>,
}

impl Symbol {
    pub fn unqualified(name: impl Into<Rc<str>>) -> Self {
        Symbol {
            ns: None,
            name: name.into(),
        }
    }

    pub fn qualified(ns: impl Into<Rc<str>>, name: impl Into<Rc<str>>) -> Self {
        Symbol {
            ns: Some(ns.into()),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A surface form: the output of the reader, before macro expansion.
#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(Rc<str>),
    Symbol(Symbol),
    Keyword(Symbol),
    /// A regex literal `#"pattern"`. Carries the raw pattern text; the
    /// analyzer compiles it into a `Value::Regex` constant.
    Regex(Rc<str>),
    List(Vec<SForm>),
    Vector(Vec<SForm>),
    /// Map entries in source order, exactly as written (array-map semantics
    /// downstream: see `quill_runtime::collections::array_map`).
    Map(Vec<(SForm, SForm)>),
    Set(Vec<SForm>),
}

impl Form {
    pub fn sym(name: impl Into<Rc<str>>) -> Form {
        Form::Symbol(Symbol::unqualified(name))
    }

    pub fn list(items: Vec<SForm>) -> Form {
        Form::List(items)
    }

    /// True for forms that evaluate to themselves without any special
    /// handling (used by the analyzer's `constant` case and by the
    /// syntax-quote expander).
    pub fn is_self_evaluating(&self) -> bool {
        !matches!(self, Form::Symbol(_) | Form::List(_))
    }
}
