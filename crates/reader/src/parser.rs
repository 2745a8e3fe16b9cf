//! Recursive-descent reader: token stream -> `Spanned<Form>` forest.

use crate::form::{Form, SForm, Spanned, Symbol};
use crate::lexer::{self, LexError, Token, TokenKind};
use crate::quasiquote::quasiquote;
use quill_core::SourceLocation;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct ReadError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl From<LexError> for ReadError {
    fn from(e: LexError) -> Self {
        ReadError {
            message: e.message,
            line: e.line,
            column: e.column,
        }
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ReadError {}

pub struct Reader<'a> {
    tokens: Vec<Token>,
    pos: usize,
    file: Option<Rc<str>>,
    _source: &'a str,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a str, file: Option<Rc<str>>) -> Result<Self, ReadError> {
        let tokens = lexer::tokenize(source)?;
        Ok(Reader {
            tokens,
            pos: 0,
            file,
            _source: source,
        })
    }

    /// Read every top-level form in the source text.
    pub fn read_all(&mut self) -> Result<Vec<SForm>, ReadError> {
        let mut forms = Vec::new();
        while self.pos < self.tokens.len() {
            forms.push(self.read_form()?);
        }
        Ok(forms)
    }

    /// Read a single form, or `None` at end of input.
    pub fn read_one(&mut self) -> Result<Option<SForm>, ReadError> {
        if self.pos >= self.tokens.len() {
            return Ok(None);
        }
        Ok(Some(self.read_form()?))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn loc(&self, tok: &Token) -> SourceLocation {
        SourceLocation::new(self.file.clone(), tok.line, tok.column)
    }

    fn err(&self, tok: &Token, message: impl Into<String>) -> ReadError {
        ReadError {
            message: message.into(),
            line: tok.line,
            column: tok.column,
        }
    }

    fn eof_err(&self, message: impl Into<String>) -> ReadError {
        let (line, column) = self
            .tokens
            .last()
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1));
        ReadError {
            message: message.into(),
            line,
            column,
        }
    }

    fn read_form(&mut self) -> Result<SForm, ReadError> {
        let tok = self.bump().ok_or_else(|| self.eof_err("unexpected end of input"))?;
        let loc = self.loc(&tok);
        match tok.kind {
            TokenKind::LParen => self.read_seq(TokenKind::RParen, Form::List, loc),
            TokenKind::LBracket => self.read_seq(TokenKind::RBracket, Form::Vector, loc),
            TokenKind::HashBrace => self.read_seq(TokenKind::RBrace, Form::Set, loc),
            TokenKind::LBrace => self.read_map(loc),
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                Err(self.err(&tok, "unexpected closing delimiter"))
            }
            TokenKind::Quote => {
                let inner = self.read_form()?;
                Ok(wrap(loc, "quote", inner))
            }
            TokenKind::Backtick => {
                let inner = self.read_form()?;
                Ok(quasiquote(&inner))
            }
            TokenKind::Tilde => {
                let inner = self.read_form()?;
                Ok(wrap(loc, "unquote", inner))
            }
            TokenKind::TildeAt => {
                let inner = self.read_form()?;
                Ok(wrap(loc, "unquote-splicing", inner))
            }
            TokenKind::VarQuote => {
                let inner = self.read_form()?;
                Ok(wrap(loc, "var", inner))
            }
            TokenKind::Deref => {
                let inner = self.read_form()?;
                Ok(wrap(loc, "deref", inner))
            }
            TokenKind::Str(s) => Ok(Spanned::new(Form::Str(s), loc)),
            TokenKind::Regex(s) => Ok(Spanned::new(Form::Regex(s), loc)),
            TokenKind::Char(c) => Ok(Spanned::new(Form::Char(c), loc)),
            TokenKind::Atom(text) => Ok(Spanned::new(parse_atom(&text), loc)),
        }
    }

    fn read_seq(
        &mut self,
        close: TokenKind,
        ctor: fn(Vec<SForm>) -> Form,
        loc: SourceLocation,
    ) -> Result<SForm, ReadError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.eof_err("unclosed collection literal")),
                Some(tok) if tok.kind == close => {
                    self.bump();
                    break;
                }
                _ => items.push(self.read_form()?),
            }
        }
        Ok(Spanned::new(ctor(items), loc))
    }

    fn read_map(&mut self, loc: SourceLocation) -> Result<SForm, ReadError> {
        let mut entries = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.eof_err("unclosed map literal")),
                Some(tok) if tok.kind == TokenKind::RBrace => {
                    self.bump();
                    break;
                }
                _ => {
                    let key = self.read_form()?;
                    let value = match self.peek() {
                        None => return Err(self.eof_err("map literal missing value")),
                        Some(tok) if tok.kind == TokenKind::RBrace => {
                            return Err(self.err(tok, "map literal must have an even number of forms"));
                        }
                        _ => self.read_form()?,
                    };
                    entries.push((key, value));
                }
            }
        }
        Ok(Spanned::new(Form::Map(entries), loc))
    }
}

fn wrap(loc: SourceLocation, head: &str, inner: SForm) -> SForm {
    Spanned::new(
        Form::List(vec![Spanned::new(Form::sym(head), loc.clone()), inner]),
        loc,
    )
}

fn parse_atom(text: &str) -> Form {
    match text {
        "nil" => return Form::Nil,
        "true" => return Form::Bool(true),
        "false" => return Form::Bool(false),
        _ => {}
    }
    if let Some(rest) = text.strip_prefix(':') {
        let (ns, name) = split_ns(rest);
        return Form::Keyword(match ns {
            Some(ns) => Symbol::qualified(ns, name),
            None => Symbol::unqualified(name),
        });
    }
    if let Some(n) = parse_int(text) {
        return Form::Int(n);
    }
    if let Some(f) = parse_float(text) {
        return Form::Float(f);
    }
    let (ns, name) = split_ns(text);
    Form::Symbol(match ns {
        Some(ns) => Symbol::qualified(ns, name),
        None => Symbol::unqualified(name),
    })
}

/// Splits `ns/name` into `(Some(ns), name)`. A bare `/` (the division
/// symbol) and leading/trailing slashes are treated as unqualified names.
fn split_ns(text: &str) -> (Option<&str>, &str) {
    if text == "/" {
        return (None, text);
    }
    match text.rfind('/') {
        Some(idx) if idx != 0 && idx != text.len() - 1 => (Some(&text[..idx]), &text[idx + 1..]),
        _ => (None, text),
    }
}

fn parse_int(text: &str) -> Option<i64> {
    if text.is_empty() {
        return None;
    }
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok().map(|n| sign * n)
}

fn parse_float(text: &str) -> Option<f64> {
    if !text.bytes().any(|b| matches!(b, b'.' | b'e' | b'E')) {
        return None;
    }
    text.parse::<f64>().ok()
}

/// Convenience entry point for reading every top-level form in `source`.
pub fn read_all_forms(source: &str, file: Option<Rc<str>>) -> Result<Vec<SForm>, ReadError> {
    Reader::new(source, file)?.read_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Vec<SForm> {
        read_all_forms(src, None).expect("read should succeed")
    }

    #[test]
    fn reads_atoms() {
        let forms = read("42 -7 3.14 true false nil :kw :ns/kw sym ns/sym");
        assert_eq!(forms[0].node, Form::Int(42));
        assert_eq!(forms[1].node, Form::Int(-7));
        assert_eq!(forms[2].node, Form::Float(3.14));
        assert_eq!(forms[3].node, Form::Bool(true));
        assert_eq!(forms[4].node, Form::Bool(false));
        assert_eq!(forms[5].node, Form::Nil);
        assert_eq!(forms[6].node, Form::Keyword(Symbol::unqualified("kw")));
        assert_eq!(
            forms[7].node,
            Form::Keyword(Symbol::qualified("ns", "kw"))
        );
        assert_eq!(forms[8].node, Form::sym("sym"));
        assert_eq!(forms[9].node, Form::Symbol(Symbol::qualified("ns", "sym")));
    }

    #[test]
    fn reads_nested_collections() {
        let forms = read("(+ 1 [2 3] {:a 1} #{1 2})");
        match &forms[0].node {
            Form::List(items) => assert_eq!(items.len(), 4),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn reads_quote_and_string() {
        let forms = read("'(a b) \"hi\\nthere\"");
        match &forms[0].node {
            Form::List(items) => assert_eq!(items[0].node, Form::sym("quote")),
            other => panic!("expected list, got {:?}", other),
        }
        assert_eq!(forms[1].node, Form::Str(Rc::from("hi\nthere")));
    }

    #[test]
    fn reads_regex_literal() {
        let forms = read(r#"#"a\d+""#);
        assert_eq!(forms[0].node, Form::Regex(Rc::from(r"a\d+")));
    }

    #[test]
    fn unclosed_list_is_an_error() {
        let err = read_all_forms("(+ 1 2", None).unwrap_err();
        assert!(err.message.contains("unclosed"));
    }
}
