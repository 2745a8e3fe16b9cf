//! The error model: a fixed `ErrorKind` taxonomy crossed with the phase the
//! error was raised in, plus a per-session `ErrorContext` that accumulates a
//! call-frame trace. Hand-rolled rather than built on `thiserror`/`anyhow`,
//! matching the corpus convention of writing `Display`/`Error`/`From` by
//! hand for error enums that travel across the public API.

use crate::collections::array_map::ArrayMap;
use crate::symbol::KeywordValue;
use crate::value::Value;
use quill_core::SourceLocation;
use std::fmt;
use std::rc::Rc;

/// The phase of evaluation an error was raised in. Distinct from
/// `ErrorKind`: a `TypeError` can originate during `Analyze` (a macro
/// expansion produces a malformed form) just as easily as `Execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Read,
    Analyze,
    Compile,
    Execute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Read => "read",
            Phase::Analyze => "analyze",
            Phase::Compile => "compile",
            Phase::Execute => "execute",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ReadError,
    SyntaxError,
    ArityError,
    TypeError,
    ValueError,
    NameError,
    IndexError,
    StateError,
    AssertError,
    ArithmeticError,
    StackOverflow,
    UserError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ReadError => "read-error",
            ErrorKind::SyntaxError => "syntax-error",
            ErrorKind::ArityError => "arity-error",
            ErrorKind::TypeError => "type-error",
            ErrorKind::ValueError => "value-error",
            ErrorKind::NameError => "name-error",
            ErrorKind::IndexError => "index-error",
            ErrorKind::StateError => "state-error",
            ErrorKind::AssertError => "assert-error",
            ErrorKind::ArithmeticError => "arithmetic-error",
            ErrorKind::StackOverflow => "stack-overflow",
            ErrorKind::UserError => "user-error",
        };
        f.write_str(s)
    }
}

/// One frame of the call stack at the point an error was raised.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub fn_name: Option<Rc<str>>,
    pub location: Option<SourceLocation>,
}

impl CallFrame {
    pub fn new(fn_name: Option<Rc<str>>, location: Option<SourceLocation>) -> Self {
        CallFrame { fn_name, location }
    }
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.fn_name.as_deref().unwrap_or("<anonymous>");
        match &self.location {
            Some(loc) => write!(f, "  at {name} ({loc})"),
            None => write!(f, "  at {name}"),
        }
    }
}

/// A single error value, carrying enough structure for `ex-info`/`ex-data`,
/// top-level reporting, and `try`/`catch` matching.
#[derive(Debug, Clone)]
pub struct QuillError {
    pub kind: ErrorKind,
    pub phase: Phase,
    pub message: String,
    pub data: Option<Value>,
    pub location: Option<SourceLocation>,
    pub cause: Option<Box<QuillError>>,
}

impl QuillError {
    pub fn new(kind: ErrorKind, phase: Phase, message: impl Into<String>) -> Self {
        QuillError {
            kind,
            phase,
            message: message.into(),
            data: None,
            location: None,
            cause: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_cause(mut self, cause: QuillError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn read(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReadError, phase, message)
    }

    pub fn syntax(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, phase, message)
    }

    pub fn arity(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArityError, phase, message)
    }

    pub fn type_error(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, phase, message)
    }

    pub fn value_error(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, phase, message)
    }

    pub fn name_error(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NameError, phase, message)
    }

    pub fn index_error(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IndexError, phase, message)
    }

    pub fn state_error(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateError, phase, message)
    }

    pub fn assert_error(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssertError, phase, message)
    }

    pub fn arithmetic_error(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArithmeticError, phase, message)
    }

    pub fn stack_overflow(phase: Phase) -> Self {
        Self::new(ErrorKind::StackOverflow, phase, "stack overflow")
    }

    pub fn user(message: impl Into<String>, data: Option<Value>) -> Self {
        let mut err = Self::new(ErrorKind::UserError, Phase::Execute, message);
        err.data = data;
        err
    }

    /// Shapes this error as the `Value` a `catch` clause binds, in the same
    /// `ex-info`-style map `ex-message`/`ex-data` already read (section 7:
    /// "a thrown Value is an ordinary Value, not a machine-error tag") — so
    /// a native `type_error` raised by an opcode is just as catchable, and
    /// just as inspectable via `ex-data`, as one a user built with
    /// `ex-info`.
    pub fn to_thrown_value(&self) -> Value {
        let data = self.data.clone().unwrap_or_else(|| Value::Map(ArrayMap::empty()));
        Value::Map(ArrayMap::from_pairs(vec![
            (
                Value::Keyword(KeywordValue::qualified("quill.core", "ex-message")),
                Value::Str(Rc::from(self.message.as_str())),
            ),
            (Value::Keyword(KeywordValue::qualified("quill.core", "ex-data")), data),
            (
                Value::Keyword(KeywordValue::qualified("quill.core", "ex-kind")),
                Value::Keyword(KeywordValue::unqualified(self.kind.to_string())),
            ),
        ]))
    }

    /// The inverse, for a `throw`n Value that escapes every handler and has
    /// to cross back out through `eval_string`/`eval_string_vm`'s `Result`.
    /// Pulls `ex-message`/`ex-data` back out when present (true of anything
    /// built by `ex-info` or `to_thrown_value`); otherwise falls back to the
    /// value's printed form as the message.
    pub fn from_thrown_value(value: Value) -> QuillError {
        let message_key = Value::Keyword(KeywordValue::qualified("quill.core", "ex-message"));
        let data_key = Value::Keyword(KeywordValue::qualified("quill.core", "ex-data"));
        let (message, data) = match &value {
            Value::Map(m) => (m.get(&message_key), m.get(&data_key)),
            Value::HashMap(m) => (m.get(&message_key), m.get(&data_key)),
            _ => (None, None),
        };
        let message = match message {
            Some(Value::Str(s)) => s.to_string(),
            _ => crate::print::pr_str(&value),
        };
        let mut err = QuillError::new(ErrorKind::UserError, Phase::Execute, message);
        err.data = Some(data.unwrap_or(value));
        err
    }
}

impl fmt::Display for QuillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.phase, self.message)
    }
}

impl std::error::Error for QuillError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &dyn std::error::Error)
    }
}

/// Per-session (never process-global) accumulator of the call stack, so two
/// concurrently-evaluating sessions never share or corrupt each other's
/// trace.
#[derive(Debug, Default)]
pub struct ErrorContext {
    frames: Vec<CallFrame>,
    max_depth: usize,
}

impl ErrorContext {
    pub fn new(max_depth: usize) -> Self {
        ErrorContext {
            frames: Vec::new(),
            max_depth,
        }
    }

    pub fn push(&mut self, frame: CallFrame) -> Result<(), QuillError> {
        if self.frames.len() >= self.max_depth {
            tracing::warn!(max_depth = self.max_depth, "call stack depth cap exceeded");
            return Err(QuillError::stack_overflow(Phase::Execute));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn trace(&self) -> String {
        self.frames
            .iter()
            .rev()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_enforces_max_depth() {
        let mut ctx = ErrorContext::new(2);
        assert!(ctx.push(CallFrame::new(None, None)).is_ok());
        assert!(ctx.push(CallFrame::new(None, None)).is_ok());
        assert!(ctx.push(CallFrame::new(None, None)).is_err());
    }

    #[test]
    fn display_includes_kind_and_phase() {
        let err = QuillError::type_error(Phase::Execute, "expected a number");
        let rendered = err.to_string();
        assert!(rendered.contains("type-error"));
        assert!(rendered.contains("execute"));
    }
}
