//! `pr-str` (readable, machine round-trippable) and `print-str`/`str`
//! (human-facing) rendering, honoring `*print-length*`/`*print-level*`
//! truncation the way `Environment::print_length`/`print_level` carry them.
//!
//! Printing a realized lazy seq or cons chain walks it eagerly; an
//! unrealized `LazySeq` prints as `...` rather than forcing it — forcing on
//! print needs a backend call (see `lazy_seq.rs`'s `peek` vs `realize`) and
//! belongs to the `pr-str`/`print` builtins in `builtins::printing`, which
//! realize chunks through the `Dispatcher` before delegating here.

use crate::value::Value;

const NAMED_CHARS: &[(char, &str)] = &[
    ('\n', "newline"),
    (' ', "space"),
    ('\t', "tab"),
    ('\r', "return"),
    ('\u{8}', "backspace"),
    ('\u{c}', "formfeed"),
    ('\0', "null"),
];

pub fn pr_str(v: &Value) -> String {
    pr_str_limited(v, None, None)
}

pub fn pr_str_limited(v: &Value, print_length: Option<usize>, print_level: Option<usize>) -> String {
    render(v, true, print_length, print_level, 0)
}

pub fn print_str(v: &Value) -> String {
    print_str_limited(v, None, None)
}

pub fn print_str_limited(v: &Value, print_length: Option<usize>, print_level: Option<usize>) -> String {
    render(v, false, print_length, print_level, 0)
}

fn render(
    v: &Value,
    readable: bool,
    print_length: Option<usize>,
    print_level: Option<usize>,
    depth: usize,
) -> String {
    match v {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => render_float(*f),
        Value::Char(c) => {
            if readable {
                render_char_literal(*c)
            } else {
                c.to_string()
            }
        }
        Value::Str(s) => {
            if readable {
                render_string_literal(s)
            } else {
                s.to_string()
            }
        }
        Value::Symbol(sym) => sym.to_string(),
        Value::Keyword(kw) => kw.to_string(),
        Value::Regex(re) => re.to_string(),
        Value::List(list) => {
            if at_level_limit(depth, print_level) {
                return "#".to_string();
            }
            let items: Vec<Value> = list.iter().collect();
            bracket(
                "(",
                ")",
                &items,
                readable,
                print_length,
                print_level,
                depth,
            )
        }
        Value::Vector(vec) => {
            if at_level_limit(depth, print_level) {
                return "#".to_string();
            }
            let items: Vec<Value> = vec.iter().collect();
            bracket(
                "[",
                "]",
                &items,
                readable,
                print_length,
                print_level,
                depth,
            )
        }
        Value::Cons(_) | Value::ChunkedCons(_) | Value::LazySeq(_) => {
            if at_level_limit(depth, print_level) {
                return "#".to_string();
            }
            render_seq_chain(v, readable, print_length, print_level, depth)
        }
        Value::Map(_) | Value::HashMap(_) => {
            if at_level_limit(depth, print_level) {
                return "#".to_string();
            }
            let pairs = match v {
                Value::Map(m) => m.iter().collect::<Vec<_>>(),
                Value::HashMap(m) => m.iter(),
                _ => unreachable!(),
            };
            render_map(&pairs, readable, print_length, print_level, depth)
        }
        Value::Set(set) => {
            if at_level_limit(depth, print_level) {
                return "#".to_string();
            }
            let items = set.values();
            let inner = bracket(
                "#{",
                "}",
                &items,
                readable,
                print_length,
                print_level,
                depth,
            );
            inner
        }
        Value::FnVal(f) => match &f.name {
            Some(name) => format!("#<fn {name}>"),
            None => "#<fn>".to_string(),
        },
        Value::BuiltinFn(f) => format!("#<builtin {}>", f.name),
        Value::Atom(a) => {
            if at_level_limit(depth, print_level) {
                return "#".to_string();
            }
            format!("#<atom {}>", render(&a.deref(), readable, print_length, print_level, depth + 1))
        }
        Value::Volatile(vol) => {
            if at_level_limit(depth, print_level) {
                return "#".to_string();
            }
            format!(
                "#<volatile {}>",
                render(&vol.deref(), readable, print_length, print_level, depth + 1)
            )
        }
        Value::Protocol(p) => format!("#<protocol {}>", p.name),
        Value::ProtocolFn(pf) => format!("#<protocol-fn {}/{}>", pf.protocol.name, pf.method_name),
        Value::MultiFn(m) => format!("#<multifn {}>", m.name),
        Value::VarRef(var) => format!("#'{}", var.qualified_name()),
        Value::Delay(d) => {
            if d.is_realized() {
                "#<delay realized>".to_string()
            } else {
                "#<delay pending>".to_string()
            }
        }
        Value::ArrayChunk(_) => "#<array-chunk>".to_string(),
        Value::ChunkBuffer(_) => "#<chunk-buffer>".to_string(),
        Value::TransientVector(_) => "#<transient-vector>".to_string(),
        Value::TransientMap(_) => "#<transient-map>".to_string(),
        Value::TransientSet(_) => "#<transient-set>".to_string(),
        Value::Reduced(inner) => format!(
            "#<reduced {}>",
            render(inner, readable, print_length, print_level, depth + 1)
        ),
    }
}

fn at_level_limit(depth: usize, print_level: Option<usize>) -> bool {
    matches!(print_level, Some(level) if depth >= level)
}

fn bracket(
    open: &str,
    close: &str,
    items: &[Value],
    readable: bool,
    print_length: Option<usize>,
    print_level: Option<usize>,
    depth: usize,
) -> String {
    let (shown, truncated) = match print_length {
        Some(limit) if items.len() > limit => (&items[..limit], true),
        _ => (items, false),
    };
    let mut parts: Vec<String> = shown
        .iter()
        .map(|item| render(item, readable, print_length, print_level, depth + 1))
        .collect();
    if truncated {
        parts.push("...".to_string());
    }
    format!("{open}{}{close}", parts.join(" "))
}

fn render_map(
    pairs: &[(Value, Value)],
    readable: bool,
    print_length: Option<usize>,
    print_level: Option<usize>,
    depth: usize,
) -> String {
    let (shown, truncated) = match print_length {
        Some(limit) if pairs.len() > limit => (&pairs[..limit], true),
        _ => (pairs, false),
    };
    let mut parts: Vec<String> = shown
        .iter()
        .map(|(k, v)| {
            format!(
                "{} {}",
                render(k, readable, print_length, print_level, depth + 1),
                render(v, readable, print_length, print_level, depth + 1)
            )
        })
        .collect();
    if truncated {
        parts.push("...".to_string());
    }
    format!("{{{}}}", parts.join(", "))
}

/// Walks a `Cons`/`ChunkedCons`/(realized) `LazySeq` chain, printing
/// `...` in place of any tail that is an unrealized lazy seq.
fn render_seq_chain(
    v: &Value,
    readable: bool,
    print_length: Option<usize>,
    print_level: Option<usize>,
    depth: usize,
) -> String {
    let mut items = Vec::new();
    let mut current = v.clone();
    let mut open_ended = false;
    loop {
        match &current {
            Value::Nil => break,
            Value::List(l) => {
                items.extend(l.iter());
                break;
            }
            Value::Vector(vec) => {
                items.extend(vec.iter());
                break;
            }
            Value::Cons(c) => {
                items.push(c.first.clone());
                current = c.rest.clone();
            }
            Value::ChunkedCons(cc) => {
                items.extend(cc.chunk.iter());
                current = cc.rest.clone();
            }
            Value::LazySeq(ls) => match ls.peek() {
                Some(realized) => current = realized,
                None => {
                    open_ended = true;
                    break;
                }
            },
            other => {
                items.push(other.clone());
                break;
            }
        }
    }
    let (shown, truncated) = match print_length {
        Some(limit) if items.len() > limit => (&items[..limit], true),
        _ => (&items[..], false),
    };
    let mut parts: Vec<String> = shown
        .iter()
        .map(|item| render(item, readable, print_length, print_level, depth + 1))
        .collect();
    if truncated || open_ended {
        parts.push("...".to_string());
    }
    format!("({})", parts.join(" "))
}

fn render_float(f: f64) -> String {
    if f.is_nan() {
        return "##NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "##Inf".to_string() } else { "##-Inf".to_string() };
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn render_char_literal(c: char) -> String {
    if let Some((_, name)) = NAMED_CHARS.iter().find(|(ch, _)| *ch == c) {
        format!("\\{name}")
    } else {
        format!("\\{c}")
    }
}

fn render_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::vector::PVector;

    #[test]
    fn strings_are_quoted_in_pr_str_but_not_print_str() {
        let s = Value::Str(std::rc::Rc::from("hi\n"));
        assert_eq!(pr_str(&s), "\"hi\\n\"");
        assert_eq!(print_str(&s), "hi\n");
    }

    #[test]
    fn floats_print_with_trailing_decimal() {
        assert_eq!(pr_str(&Value::Float(3.0)), "3.0");
        assert_eq!(pr_str(&Value::Float(3.5)), "3.5");
    }

    #[test]
    fn print_length_truncates_collections() {
        let v = Value::Vector(PVector::from_vec(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        assert_eq!(pr_str_limited(&v, Some(2), None), "[1 2 ...]");
    }

    #[test]
    fn print_level_collapses_nested_collections() {
        let inner = Value::Vector(PVector::from_vec(vec![Value::Int(1)]));
        let outer = Value::Vector(PVector::from_vec(vec![inner]));
        assert_eq!(pr_str_limited(&outer, None, Some(1)), "[#]");
    }

    #[test]
    fn print_level_bounds_an_atom_holding_itself() {
        let cell = crate::atom::AtomCell::new(Value::Nil);
        cell.reset(Value::Atom(cell.clone()), |_, v| Ok(v.clone()), |_, _, _, _| Ok(()))
            .unwrap();
        let rendered = pr_str_limited(&Value::Atom(cell), None, Some(2));
        assert_eq!(rendered, "#<atom #<atom #>>");
    }
}
