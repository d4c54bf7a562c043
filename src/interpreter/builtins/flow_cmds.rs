//! break / continue / return / exit.
//!
//! These don't produce output; they hand the evaluator a [`Flow`] to
//! unwind with. `break N`/`continue N` carry a level count that loop
//! frames decrement on the way out; `exit --force` marks the state so
//! the driver skips the pending-jobs warning.

use crate::interpreter::flow::Flow;
use crate::interpreter::state::ShellState;
use super::FlowOutcome;

fn level_arg(name: &str, args: &[String]) -> Result<u32, String> {
    match args.first() {
        None => Ok(1),
        Some(text) => match text.parse::<i64>() {
            Ok(n) if n >= 1 => Ok(n as u32),
            _ => Err(format!("cjsh: {}: {}: numeric argument required\n", name, text)),
        },
    }
}

pub fn brk(state: &mut ShellState, args: &[String]) -> FlowOutcome {
    if state.loop_depth == 0 {
        // Outside any loop break is a no-op, matching interactive use.
        return FlowOutcome {
            flow: Flow::Normal(0),
            stderr: String::new(),
        };
    }
    match level_arg("break", args) {
        Ok(levels) => FlowOutcome {
            flow: Flow::Break(levels),
            stderr: String::new(),
        },
        Err(stderr) => FlowOutcome {
            flow: Flow::Normal(128),
            stderr,
        },
    }
}

pub fn cont(state: &mut ShellState, args: &[String]) -> FlowOutcome {
    if state.loop_depth == 0 {
        return FlowOutcome {
            flow: Flow::Normal(0),
            stderr: String::new(),
        };
    }
    match level_arg("continue", args) {
        Ok(levels) => FlowOutcome {
            flow: Flow::Continue(levels),
            stderr: String::new(),
        },
        Err(stderr) => FlowOutcome {
            flow: Flow::Normal(128),
            stderr,
        },
    }
}

pub fn ret(state: &mut ShellState, args: &[String]) -> FlowOutcome {
    let status = match args.first() {
        None => state.last_status,
        Some(text) => match text.parse::<i32>() {
            Ok(n) => n & 0xff,
            Err(_) => {
                return FlowOutcome {
                    flow: Flow::Return(2),
                    stderr: format!("cjsh: return: {}: numeric argument required\n", text),
                }
            }
        },
    };
    FlowOutcome {
        flow: Flow::Return(status),
        stderr: String::new(),
    }
}

pub fn exit(state: &mut ShellState, args: &[String]) -> FlowOutcome {
    let mut args = args;
    if let Some(first) = args.first() {
        if first == "--force" || first == "-f" {
            state.force_exit = true;
            args = &args[1..];
        }
    }
    let (status, stderr) = match args.first() {
        None => (state.last_status, String::new()),
        Some(text) => match text.parse::<i32>() {
            Ok(n) => (((n % 256) + 256) % 256, String::new()),
            Err(_) => (
                2,
                format!("cjsh: exit: {}: numeric argument required\n", text),
            ),
        },
    };
    FlowOutcome {
        flow: Flow::Exit(status),
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_outside_loop_is_noop() {
        let mut state = ShellState::default();
        assert_eq!(brk(&mut state, &[]).flow, Flow::Normal(0));
    }

    #[test]
    fn break_in_loop_carries_level() {
        let mut state = ShellState::default();
        state.loop_depth = 2;
        assert_eq!(brk(&mut state, &[]).flow, Flow::Break(1));
        assert_eq!(brk(&mut state, &["2".to_string()]).flow, Flow::Break(2));
    }

    #[test]
    fn return_defaults_to_last_status() {
        let mut state = ShellState::default();
        state.last_status = 5;
        assert_eq!(ret(&mut state, &[]).flow, Flow::Return(5));
        assert_eq!(ret(&mut state, &["3".to_string()]).flow, Flow::Return(3));
    }

    #[test]
    fn exit_wraps_status_to_a_byte() {
        let mut state = ShellState::default();
        assert_eq!(exit(&mut state, &["300".to_string()]).flow, Flow::Exit(44));
        assert_eq!(exit(&mut state, &["-1".to_string()]).flow, Flow::Exit(255));
    }

    #[test]
    fn exit_force_marks_state() {
        let mut state = ShellState::default();
        let outcome = exit(&mut state, &["--force".to_string()]);
        assert!(state.force_exit);
        assert_eq!(outcome.flow, Flow::Exit(0));
    }
}
