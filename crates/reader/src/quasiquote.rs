//! Syntax-quote (`` ` ``) expansion.
//!
//! A syntax-quoted form is rewritten, at read time, into an expression that
//! *constructs* the equivalent data when evaluated, splicing in `~` (unquote)
//! and `~@` (unquote-splicing) subforms verbatim. This mirrors how Clojure's
//! reader desugars `` ` `` into calls to `seq`/`concat`/`list`/`vector` rather
//! than leaving a "quasiquote" special form for the analyzer to understand.
//!
//! Simplification (recorded in DESIGN.md): plain symbols inside a
//! syntax-quote are quoted as-is rather than being auto-namespace-qualified
//! the way `ns/sym` resolution normally would; map literals are quoted
//! verbatim (no unquote splicing inside map bodies).

use crate::form::{Form, SForm, Spanned, Symbol};
use quill_core::SourceLocation;

enum SeqKind {
    List,
    Vector,
    Set,
}

pub fn quasiquote(form: &SForm) -> SForm {
    expand(form)
}

fn expand(form: &SForm) -> SForm {
    match &form.node {
        Form::List(items) => {
            if let Some(inner) = unquote_escape(items) {
                return inner;
            }
            build_seq(&form.loc, items, SeqKind::List)
        }
        Form::Vector(items) => build_seq(&form.loc, items, SeqKind::Vector),
        Form::Set(items) => build_seq(&form.loc, items, SeqKind::Set),
        _ => quote_form(form),
    }
}

/// `(unquote x)` read at the top of a syntax-quoted form escapes the quote
/// entirely: the result is `x`, to be evaluated normally.
fn unquote_escape(items: &[SForm]) -> Option<SForm> {
    if items.len() == 2 {
        if let Form::Symbol(sym) = &items[0].node {
            if sym.ns.is_none() && &*sym.name == "unquote" {
                return Some(items[1].clone());
            }
        }
    }
    None
}

fn is_unquote_splicing(items: &[SForm]) -> Option<SForm> {
    if items.len() == 2 {
        if let Form::Symbol(sym) = &items[0].node {
            if sym.ns.is_none() && &*sym.name == "unquote-splicing" {
                return Some(items[1].clone());
            }
        }
    }
    None
}

fn build_seq(loc: &SourceLocation, items: &[SForm], kind: SeqKind) -> SForm {
    let parts: Vec<SForm> = items.iter().map(seq_part).collect();
    let concat = call(loc.clone(), "concat", parts);
    match kind {
        SeqKind::List => concat,
        SeqKind::Vector => call(loc.clone(), "vec", vec![concat]),
        SeqKind::Set => call(loc.clone(), "set", vec![concat]),
    }
}

/// Turns one element of a syntax-quoted sequence into an expression that
/// produces a *sequence of one or more values* to be concatenated:
/// - `~@x` splices `x` (already a sequence) in directly.
/// - `~x` wraps the evaluated single value `x` in a one-element list.
/// - anything else is recursively expanded and wrapped in a one-element list.
fn seq_part(item: &SForm) -> SForm {
    if let Form::List(items) = &item.node {
        if let Some(spliced) = is_unquote_splicing(items) {
            return spliced;
        }
        if let Some(unquoted) = unquote_escape(items) {
            return call(item.loc.clone(), "list", vec![unquoted]);
        }
    }
    call(item.loc.clone(), "list", vec![expand(item)])
}

fn quote_form(form: &SForm) -> SForm {
    call(form.loc.clone(), "quote", vec![form.clone()])
}

fn call(loc: SourceLocation, name: &str, mut args: Vec<SForm>) -> SForm {
    let mut items = Vec::with_capacity(args.len() + 1);
    items.push(Spanned::new(Form::sym(name), loc.clone()));
    items.append(&mut args);
    Spanned::new(Form::List(items), loc)
}

#[allow(dead_code)]
fn symbol_name(form: &Form) -> Option<&str> {
    match form {
        Form::Symbol(Symbol { ns: None, name }) => Some(name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read_all_forms;

    fn read_one(src: &str) -> SForm {
        read_all_forms(src, None).unwrap().remove(0)
    }

    #[test]
    fn quote_of_symbol() {
        let form = read_one("`foo");
        match &form.node {
            Form::List(items) => assert_eq!(items[0].node, Form::sym("quote")),
            other => panic!("expected (quote foo), got {:?}", other),
        }
    }

    #[test]
    fn top_level_unquote_escapes() {
        let form = read_one("`~x");
        assert_eq!(form.node, Form::sym("x"));
    }

    #[test]
    fn list_becomes_concat() {
        let form = read_one("`(a ~b ~@c)");
        match &form.node {
            Form::List(items) => {
                assert_eq!(items[0].node, Form::sym("concat"));
                assert_eq!(items.len(), 4); // concat + 3 parts
            }
            other => panic!("expected concat call, got {:?}", other),
        }
    }
}
