//! Builtin commands.
//!
//! Builtins run in-process against the live [`ShellState`] and produce
//! their output as strings; the evaluator routes those through any
//! redirections and emits them to its sink. Control-transfer builtins
//! (`break`/`continue`/`return`/`exit`) return a [`Flow`] instead, and
//! `eval`/`source`/`exec` are driven by the evaluator directly because
//! they re-enter it.

pub mod abbr_cmd;
pub mod alias_cmd;
pub mod cd_cmd;
pub mod echo_cmd;
pub mod exec_cmd;
pub mod flow_cmds;
pub mod jobs_cmd;
pub mod kill_cmd;
pub mod printf_cmd;
pub mod read_cmd;
pub mod set_cmd;
pub mod test_cmd;
pub mod trap_cmd;
pub mod type_cmd;
pub mod umask_cmd;
pub mod vars_cmd;

use crate::interpreter::errors::ShellError;
use crate::interpreter::flow::Flow;
use crate::interpreter::state::ShellState;

pub use exec_cmd::exec_replace;
pub use test_cmd::{binary_file_test, unary_test};

/// What a builtin hands back: output text and a status.
#[derive(Debug, Clone, Default)]
pub struct BuiltinOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl BuiltinOutput {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn out(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: 0,
        }
    }

    pub fn fail(stderr: impl Into<String>, status: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            status,
        }
    }

    pub fn status(status: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            status,
        }
    }
}

/// A [`Flow`] paired with diagnostics printed before it takes effect.
#[derive(Debug, Clone)]
pub struct FlowOutcome {
    pub flow: Flow,
    pub stderr: String,
}

/// Every name this shell dispatches in-process.
pub const NAMES: &[&str] = &[
    ":", ".", "[", "abbr", "alias", "bg", "break", "cd", "command", "continue", "echo", "eval",
    "exec", "exit", "export", "false", "fg", "hash", "jobs", "kill", "local", "printf", "pwd",
    "read", "readonly", "return", "set", "shift", "source", "test", "times", "trap", "true",
    "type", "umask", "unabbr", "unalias", "unset", "wait",
];

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

/// `break`/`continue`/`return`/`exit`, which transfer control instead of
/// producing output. `None` means the name isn't one of them.
pub fn control_flow(state: &mut ShellState, name: &str, args: &[String]) -> Option<FlowOutcome> {
    Some(match name {
        "break" => flow_cmds::brk(state, args),
        "continue" => flow_cmds::cont(state, args),
        "return" => flow_cmds::ret(state, args),
        "exit" => flow_cmds::exit(state, args),
        _ => return None,
    })
}

/// Dispatch an ordinary builtin. `stdin` is pre-read input text for
/// builtins that consume it (`read`).
pub fn run(
    state: &mut ShellState,
    name: &str,
    args: &[String],
    stdin: Option<&str>,
) -> Result<BuiltinOutput, ShellError> {
    Ok(match name {
        ":" | "true" => BuiltinOutput::ok(),
        "false" => BuiltinOutput::status(1),
        "echo" => echo_cmd::run(args),
        "printf" => printf_cmd::run(state, args),
        "pwd" => BuiltinOutput::out(format!("{}\n", state.cwd)),
        "cd" => cd_cmd::run(state, args),
        "test" | "[" => test_cmd::run(state, name, args),
        "set" => set_cmd::run(state, args),
        "shift" => set_cmd::shift(state, args),
        "export" => vars_cmd::export(state, args),
        "unset" => vars_cmd::unset(state, args),
        "local" => vars_cmd::local(state, args),
        "readonly" => vars_cmd::readonly(state, args),
        "alias" => alias_cmd::alias(state, args),
        "unalias" => alias_cmd::unalias(state, args),
        "abbr" => abbr_cmd::abbr(state, args),
        "unabbr" => abbr_cmd::unabbr(state, args),
        "read" => read_cmd::run(state, args, stdin.unwrap_or("")),
        "trap" => trap_cmd::run(state, args),
        "jobs" => jobs_cmd::jobs(state, args),
        "fg" => jobs_cmd::fg(state, args),
        "bg" => jobs_cmd::bg(state, args),
        "wait" => jobs_cmd::wait(state, args),
        "kill" => kill_cmd::run(state, args),
        "umask" => umask_cmd::run(state, args),
        "times" => umask_cmd::times(),
        "type" => type_cmd::type_of(state, args),
        "hash" => type_cmd::hash(state, args),
        "command" => type_cmd::command_v(state, args),
        other => BuiltinOutput::fail(format!("cjsh: {}: builtin not wired\n", other), 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_the_spec_set() {
        for required in [
            "cd", "pwd", "export", "unset", "set", "shift", "exit", "return", "break",
            "continue", ":", ".", "source", "exec", "eval", "test", "[", "read", "trap",
            "jobs", "fg", "bg", "kill", "wait", "local", "readonly", "alias", "unalias",
            "type", "hash", "printf", "echo", "umask", "times", "true", "false",
        ] {
            assert!(is_builtin(required), "missing builtin: {}", required);
        }
    }

    #[test]
    fn colon_true_false_statuses() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, ":", &[], None).unwrap().status, 0);
        assert_eq!(run(&mut state, "true", &[], None).unwrap().status, 0);
        assert_eq!(run(&mut state, "false", &[], None).unwrap().status, 1);
    }
}
