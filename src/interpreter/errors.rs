//! Evaluation errors.
//!
//! Ordinary control transfer (`break`/`continue`/`return`/`exit`) travels
//! as [`crate::interpreter::flow::Flow`]; this module is for conditions
//! that are actually errors. Expansion-class errors abort the pipeline
//! that contained them with a status; fatal errors (failed syscalls,
//! blown limits) unwind the whole evaluation.

use std::fmt;
use thiserror::Error;

/// An expansion fault: unset under `set -u`, `${x:?}` firing, bad
/// substitution, arithmetic error, assignment to readonly. Carries the
/// status the containing command reports.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExpansionError {
    pub message: String,
    pub status: i32,
}

impl ExpansionError {
    pub fn new(message: impl Into<String>, status: i32) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ShellError {
    /// Aborts the current pipeline; the statement continues the script
    /// (subject to errexit on the resulting status).
    #[error("{0}")]
    Expansion(ExpansionError),
    /// A system call failed (fork/pipe/waitpid); unwinds the evaluation.
    #[error("{0}")]
    Io(String),
    /// A runaway-script limit tripped; unwinds the evaluation.
    #[error("{0}")]
    Limit(String),
}

impl ShellError {
    pub fn expansion(message: impl Into<String>, status: i32) -> Self {
        ShellError::Expansion(ExpansionError::new(message, status))
    }

    pub fn io(message: impl Into<String>) -> Self {
        ShellError::Io(message.into())
    }

    pub fn limit(message: impl Into<String>) -> Self {
        ShellError::Limit(message.into())
    }

    /// The status this error imposes on the command that hit it.
    pub fn status(&self) -> i32 {
        match self {
            ShellError::Expansion(e) => e.status,
            ShellError::Io(_) => 1,
            ShellError::Limit(_) => 126,
        }
    }
}

impl From<ExpansionError> for ShellError {
    fn from(e: ExpansionError) -> Self {
        ShellError::Expansion(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_by_class() {
        assert_eq!(ShellError::expansion("x", 1).status(), 1);
        assert_eq!(ShellError::io("x").status(), 1);
        assert_eq!(ShellError::limit("x").status(), 126);
    }

    #[test]
    fn display_is_the_message() {
        assert_eq!(ShellError::expansion("unbound variable", 1).to_string(), "unbound variable");
    }
}
