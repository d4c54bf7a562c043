//! Parsing pipeline for shell source.
//!
//! [`preprocessor`] joins continuations, erases comments, and lifts
//! here-document bodies out of the text; [`lexer`] scans operators and
//! quote-tagged words; [`grammar`] is the recursive-descent parser that
//! assembles the [`crate::ast`] the evaluator walks; [`arith`] parses
//! the text inside `$(( ))` / `(( ))`.

pub mod arith;
pub mod grammar;
pub mod lexer;
pub mod preprocessor;

use std::fmt;

pub use lexer::is_identifier;
pub use preprocessor::{input_completeness, Incomplete, PreprocessError};

/// A syntax error with the line it was detected on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }

    /// Re-anchor an error from recursively parsed text (`$(...)` bodies)
    /// to the construct and line it sits inside.
    pub fn nested(self, context: &str, line: usize) -> Self {
        Self {
            message: format!("{}: {}", context, self.message),
            line,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<PreprocessError> for ParseError {
    fn from(e: PreprocessError) -> Self {
        ParseError::new(e.message, e.line)
    }
}

/// Parse a complete unit of shell source into a [`crate::ast::Script`].
pub fn parse(source: &str) -> Result<crate::ast::Script, ParseError> {
    let prepared = preprocessor::prepare(source)?;
    let mut grammar = grammar::Grammar::new(&prepared.text, prepared.heredocs);
    grammar.parse_script()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_source() {
        assert!(parse("").unwrap().statements.is_empty());
        assert!(parse("\n\n").unwrap().statements.is_empty());
    }

    #[test]
    fn parse_error_carries_line() {
        let err = parse("echo ok\nif then").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
