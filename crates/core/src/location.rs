//! Source location tracking, shared by the reader, the AST, and error reporting.

use std::fmt;
use std::rc::Rc;

/// A position in a source text, attached to every reader form, every analyzed
/// `Node`, and every error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Option<Rc<str>>,
    /// 1-indexed line.
    pub line: u32,
    /// 1-indexed column.
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: Option<Rc<str>>, line: u32, column: u32) -> Self {
        SourceLocation { file, line, column }
    }

    /// A location used for synthetic nodes (macro expansions, bootstrap
    /// forms) that have no direct source text.
    pub fn unknown() -> Self {
        SourceLocation {
            file: None,
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}
