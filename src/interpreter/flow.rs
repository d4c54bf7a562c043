//! Control flow signal threaded back up through statement execution.
//!
//! Every statement-execution function returns `Result<Flow, ShellError>`:
//! `Flow` carries ordinary control transfer (what a fork-based shell
//! implements by unwinding with a reserved exit status), while
//! `ShellError` is kept for conditions that are actually errors.

use std::fmt;

/// Where execution should go next after a statement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Ran to completion; carries the command's exit status.
    Normal(i32),
    /// `break N` - unwind N enclosing loops. N is decremented by each loop
    /// it passes through; a loop body sees `Break(1)` meaning "break me".
    Break(u32),
    /// `continue N` - same accounting as `Break`.
    Continue(u32),
    /// `return N` - unwind to the nearest enclosing function or sourced script.
    Return(i32),
    /// `exit N` - unwind the entire shell.
    Exit(i32),
}

impl Flow {
    /// The exit status this flow leaves behind, for `$?` purposes.
    pub fn exit_code(self) -> i32 {
        match self {
            Flow::Normal(c) | Flow::Return(c) | Flow::Exit(c) => c,
            Flow::Break(_) | Flow::Continue(_) => 0,
        }
    }

    /// True if this flow should keep propagating past the current loop body
    /// (i.e. it targets an outer loop), false if it is consumed here.
    pub fn is_loop_escape(self) -> bool {
        matches!(self, Flow::Break(_) | Flow::Continue(_) | Flow::Return(_) | Flow::Exit(_))
    }

    /// Decrement a `break`/`continue` level as it passes through one loop
    /// nesting level. Returns `None` once the level count reaches zero,
    /// meaning this loop is the target and the flow is fully consumed.
    pub fn step_loop_level(self) -> Option<Flow> {
        match self {
            Flow::Break(n) if n > 1 => Some(Flow::Break(n - 1)),
            Flow::Break(_) => None,
            Flow::Continue(n) if n > 1 => Some(Flow::Continue(n - 1)),
            Flow::Continue(_) => None,
            other => Some(other),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Normal(c) => write!(f, "normal({c})"),
            Flow::Break(n) => write!(f, "break({n})"),
            Flow::Continue(n) => write!(f, "continue({n})"),
            Flow::Return(c) => write!(f, "return({c})"),
            Flow::Exit(c) => write!(f, "exit({c})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_of_normal() {
        assert_eq!(Flow::Normal(3).exit_code(), 3);
    }

    #[test]
    fn break_and_continue_carry_no_exit_code() {
        assert_eq!(Flow::Break(2).exit_code(), 0);
        assert_eq!(Flow::Continue(1).exit_code(), 0);
    }

    #[test]
    fn step_loop_level_consumes_single_level() {
        assert_eq!(Flow::Break(1).step_loop_level(), None);
        assert_eq!(Flow::Continue(1).step_loop_level(), None);
    }

    #[test]
    fn step_loop_level_decrements_multi_level() {
        assert_eq!(Flow::Break(3).step_loop_level(), Some(Flow::Break(2)));
        assert_eq!(Flow::Continue(2).step_loop_level(), Some(Flow::Continue(1)));
    }

    #[test]
    fn return_and_exit_pass_through_loops_unchanged() {
        assert_eq!(Flow::Return(1).step_loop_level(), Some(Flow::Return(1)));
        assert_eq!(Flow::Exit(2).step_loop_level(), Some(Flow::Exit(2)));
    }

    #[test]
    fn is_loop_escape_classification() {
        assert!(!Flow::Normal(0).is_loop_escape());
        assert!(Flow::Break(1).is_loop_escape());
        assert!(Flow::Continue(1).is_loop_escape());
        assert!(Flow::Return(0).is_loop_escape());
        assert!(Flow::Exit(0).is_loop_escape());
    }
}
