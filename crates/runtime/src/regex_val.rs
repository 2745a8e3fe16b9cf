//! `Value::Regex`: a compiled pattern produced by `#"..."` literals and
//! `re-pattern`.

use std::rc::Rc;

pub struct RegexValue {
    pub pattern: Rc<str>,
    pub compiled: regex::Regex,
}

impl RegexValue {
    pub fn compile(pattern: impl Into<Rc<str>>) -> Result<Rc<Self>, regex::Error> {
        let pattern = pattern.into();
        let compiled = regex::Regex::new(&pattern)?;
        Ok(Rc::new(RegexValue { pattern, compiled }))
    }
}

impl std::fmt::Display for RegexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#\"{}\"", self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_matches() {
        let re = RegexValue::compile("^ab+c$").unwrap();
        assert!(re.compiled.is_match("abbbc"));
        assert!(!re.compiled.is_match("ac "));
    }

    #[test]
    fn invalid_pattern_errors() {
        assert!(RegexValue::compile("(unclosed").is_err());
    }
}
