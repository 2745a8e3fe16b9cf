//! Tokenizer: source text -> a flat token stream.
//!
//! Kept deliberately simple (single forward scan, no backtracking) since the
//! reader is a host collaborator rather than core material: see spec section
//! 1, "Out of scope".

use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    HashBrace,  // #{
    Regex(Rc<str>), // #" ... "  (regex literal body, already unescaped)
    Quote,      // '
    Backtick,   // `
    Tilde,      // ~
    TildeAt,    // ~@
    VarQuote,   // #'
    Deref,      // @
    Str(Rc<str>),
    Char(char),
    /// Anything else: numbers, symbols, keywords, true/false/nil.
    Atom(Rc<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

const CHAR_NAMES: &[(&str, char)] = &[
    ("newline", '\n'),
    ("space", ' '),
    ("tab", '\t'),
    ("return", '\r'),
    ("backspace", '\u{8}'),
    ("formfeed", '\u{c}'),
    ("null", '\0'),
];

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';' | ',')
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_atmosphere(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() || c == ',' => {
                    self.bump();
                }
                Some(';') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_string(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".to_string(),
                        line,
                        column,
                    });
                }
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some(other) => {
                        return Err(LexError {
                            message: format!("invalid string escape '\\{}'", other),
                            line,
                            column,
                        });
                    }
                    None => {
                        return Err(LexError {
                            message: "unterminated escape in string literal".to_string(),
                            line,
                            column,
                        });
                    }
                },
                Some(c) => s.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::Str(Rc::from(s.as_str())),
            line,
            column,
        })
    }

    /// Reads the body of a `#"..."` regex literal. Regex bodies are taken
    /// verbatim (backslashes are passed through to the regex engine) except
    /// for `\"`, which escapes a literal quote.
    fn read_regex_body(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(LexError {
                        message: "unterminated regex literal".to_string(),
                        line,
                        column,
                    });
                }
                Some('"') => break,
                Some('\\') => {
                    let next = self.bump().ok_or(LexError {
                        message: "unterminated escape in regex literal".to_string(),
                        line,
                        column,
                    })?;
                    if next == '"' {
                        s.push('"');
                    } else {
                        s.push('\\');
                        s.push(next);
                    }
                }
                Some(c) => s.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::Regex(Rc::from(s.as_str())),
            line,
            column,
        })
    }

    fn read_char_literal(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        // A char literal is `\` followed by either a single char or a named
        // char (`\newline`, `\space`, ...). Named chars are distinguished by
        // being followed by more non-delimiter characters.
        let first = self.bump().ok_or(LexError {
            message: "dangling '\\' at end of input".to_string(),
            line,
            column,
        })?;
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        if text.chars().count() == 1 {
            return Ok(Token {
                kind: TokenKind::Char(first),
                line,
                column,
            });
        }
        for (name, ch) in CHAR_NAMES {
            if text == *name {
                return Ok(Token {
                    kind: TokenKind::Char(*ch),
                    line,
                    column,
                });
            }
        }
        if let Some(rest) = text.strip_prefix('u') {
            if let Ok(code) = u32::from_str_radix(rest, 16) {
                if let Some(ch) = char::from_u32(code) {
                    return Ok(Token {
                        kind: TokenKind::Char(ch),
                        line,
                        column,
                    });
                }
            }
        }
        Err(LexError {
            message: format!("unknown character literal \\{}", text),
            line,
            column,
        })
    }

    fn read_atom(&mut self, first: char, line: u32, column: u32) -> Token {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        Token {
            kind: TokenKind::Atom(Rc::from(text.as_str())),
            line,
            column,
        }
    }

    fn next_token(&mut self) -> Option<Result<Token, LexError>> {
        self.skip_atmosphere();
        let (line, column) = (self.line, self.column);
        let c = self.bump()?;
        let tok = match c {
            '(' => Ok(Token {
                kind: TokenKind::LParen,
                line,
                column,
            }),
            ')' => Ok(Token {
                kind: TokenKind::RParen,
                line,
                column,
            }),
            '[' => Ok(Token {
                kind: TokenKind::LBracket,
                line,
                column,
            }),
            ']' => Ok(Token {
                kind: TokenKind::RBracket,
                line,
                column,
            }),
            '{' => Ok(Token {
                kind: TokenKind::LBrace,
                line,
                column,
            }),
            '}' => Ok(Token {
                kind: TokenKind::RBrace,
                line,
                column,
            }),
            '\'' => Ok(Token {
                kind: TokenKind::Quote,
                line,
                column,
            }),
            '`' => Ok(Token {
                kind: TokenKind::Backtick,
                line,
                column,
            }),
            '~' => {
                if self.peek() == Some('@') {
                    self.bump();
                    Ok(Token {
                        kind: TokenKind::TildeAt,
                        line,
                        column,
                    })
                } else {
                    Ok(Token {
                        kind: TokenKind::Tilde,
                        line,
                        column,
                    })
                }
            }
            '"' => self.read_string(line, column),
            '\\' => self.read_char_literal(line, column),
            '@' => Ok(Token {
                kind: TokenKind::Deref,
                line,
                column,
            }),
            '#' => match self.peek() {
                Some('{') => {
                    self.bump();
                    Ok(Token {
                        kind: TokenKind::HashBrace,
                        line,
                        column,
                    })
                }
                Some('"') => {
                    self.bump();
                    self.read_regex_body(line, column)
                }
                Some('\'') => {
                    self.bump();
                    Ok(Token {
                        kind: TokenKind::VarQuote,
                        line,
                        column,
                    })
                }
                _ => Err(LexError {
                    message: "unsupported '#' reader macro".to_string(),
                    line,
                    column,
                }),
            },
            other => Ok(self.read_atom(other, line, column)),
        };
        Some(tok)
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next_token() {
        tokens.push(tok?);
    }
    Ok(tokens)
}
