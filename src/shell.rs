//! Shell driver.
//!
//! Owns the long-lived pieces: the [`ShellState`], the interactive/login
//! distinction, startup and logout files, prompt rendering, job notices
//! between prompts, and the exit policy (a first `exit` with live jobs
//! warns; the next one terminates them). Each [`Shell::eval`] call takes
//! one unit of input through parse -> evaluate and reports whether the
//! shell should keep reading.

use std::collections::HashMap;

use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::flow::Flow;
use crate::interpreter::state::{Limits, ShellState};
use crate::interpreter::{builtins, suggest};
use crate::jobs::{signals, terminal, JobStatus};

/// Programmatic configuration for a shell instance.
#[derive(Default)]
pub struct ShellConfig {
    pub interactive: bool,
    pub login: bool,
    /// `$0`: the script path, or the shell's own name.
    pub script_name: Option<String>,
    /// Positional parameters `$1..$N`.
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub limits: Option<Limits>,
    /// Extra variables layered over the inherited environment.
    pub env: Option<HashMap<String, String>>,
}

/// What the caller should do after one unit of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Keep reading; carries the unit's status.
    Continue(i32),
    /// Terminate the shell with this status.
    Exit(i32),
}

impl EvalOutcome {
    pub fn status(self) -> i32 {
        match self {
            EvalOutcome::Continue(status) | EvalOutcome::Exit(status) => status,
        }
    }
}

pub struct Shell {
    pub state: ShellState,
    limits: Limits,
    interactive: bool,
    login: bool,
    /// Sequence number at which the pending-jobs warning fired.
    exit_warned_at: Option<u64>,
    terminal_modes: Option<terminal::TerminalModes>,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        let mut state = ShellState::default();
        let limits = config.limits.unwrap_or_default();

        // Inherit the environment; everything inherited starts exported.
        for (name, value) in std::env::vars() {
            state.vars.set(&name, value);
            state.vars.set_exported(&name, true);
        }
        if let Some(extra) = config.env {
            for (name, value) in extra {
                state.vars.set(&name, value);
                state.vars.set_exported(&name, true);
            }
        }

        let cwd = config
            .cwd
            .or_else(|| {
                std::env::current_dir()
                    .ok()
                    .map(|p| p.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "/".to_string());
        let _ = std::env::set_current_dir(&cwd);
        state.vars.set("PWD", cwd.clone());
        state.vars.set_exported("PWD", true);
        if !state.vars.is_set("OLDPWD") {
            state.vars.set("OLDPWD", cwd.clone());
        }
        state.cwd = cwd.clone();
        state.previous_dir = cwd;

        // SHLVL counts nesting; SHELL names this binary.
        let shlvl = state
            .vars
            .value("SHLVL")
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(0)
            + 1;
        state.vars.set("SHLVL", shlvl.to_string());
        state.vars.set_exported("SHLVL", true);
        if let Ok(exe) = std::env::current_exe() {
            state.vars.set("SHELL", exe.to_string_lossy().to_string());
            state.vars.set_exported("SHELL", true);
        }

        state.script_name = config.script_name.unwrap_or_else(|| "cjsh".to_string());
        state.positional = config.args;

        let terminal_modes = if config.interactive {
            signals::install_shell_handlers();
            Some(terminal::TerminalModes::capture())
        } else {
            None
        };

        Self {
            state,
            limits,
            interactive: config.interactive,
            login: config.login,
            exit_warned_at: None,
            terminal_modes,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn is_login(&self) -> bool {
        self.login
    }

    /// Evaluate one unit of shell source (a `-c` string, a script file,
    /// or one complete interactive submission).
    pub fn eval(&mut self, source: &str) -> EvalOutcome {
        if source.trim().is_empty() {
            return EvalOutcome::Continue(self.state.last_status);
        }

        let script = match crate::parser::parse(source) {
            Ok(script) => script,
            Err(e) => {
                eprintln!("cjsh: syntax error: {}", e);
                self.state.last_status = 2;
                return EvalOutcome::Continue(2);
            }
        };

        let evaluator = Evaluator::new(&self.limits).interactive(self.interactive);
        let outcome = match evaluator.eval_script(&mut self.state, &script) {
            Ok(Flow::Exit(status)) => self.handle_exit_request(status),
            Ok(flow) => EvalOutcome::Continue(flow.exit_code()),
            Err(e) => {
                eprintln!("cjsh: {}", e);
                EvalOutcome::Continue(e.status())
            }
        };
        self.state.last_status = outcome.status();
        outcome
    }

    /// The two-press exit policy: an interactive shell with live jobs
    /// warns on the first `exit` and goes through on the next attempt
    /// (or immediately under `exit --force`), terminating survivors.
    fn handle_exit_request(&mut self, status: i32) -> EvalOutcome {
        self.state.jobs.reap();
        let live: Vec<(u32, String)> = self
            .state
            .jobs
            .iter()
            .filter(|j| !j.status.is_finished())
            .map(|j| (j.id, j.command.clone()))
            .collect();

        if live.is_empty() || self.state.force_exit || !self.interactive {
            self.terminate_jobs();
            return EvalOutcome::Exit(status);
        }
        if self.exit_warned_at.is_some() {
            self.terminate_jobs();
            return EvalOutcome::Exit(status);
        }

        eprintln!("cjsh: you have {} running job(s):", live.len());
        for (id, command) in live {
            eprintln!("  [{}] {}", id, command);
        }
        eprintln!("cjsh: exit again (or `exit --force') to terminate them and leave");
        self.exit_warned_at = Some(self.state.command_seq);
        EvalOutcome::Continue(status)
    }

    /// SIGTERM every surviving job group, give them a moment, then
    /// SIGKILL anything still alive.
    fn terminate_jobs(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            let pgids: Vec<i32> = self
                .state
                .jobs
                .iter()
                .filter(|j| !j.status.is_finished())
                .map(|j| j.pgid)
                .collect();
            if pgids.is_empty() {
                return;
            }
            for pgid in &pgids {
                let _ = signals::signal_group(*pgid, Signal::SIGCONT);
                let _ = signals::signal_group(*pgid, Signal::SIGTERM);
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
            self.state.jobs.reap();
            for job in self.state.jobs.iter() {
                if !job.status.is_finished() {
                    let _ = signals::signal_group(job.pgid, Signal::SIGKILL);
                }
            }
        }
    }

    /// Reap children and report finished jobs; the interactive loop
    /// calls this before every prompt.
    pub fn notify_jobs(&mut self) {
        if !signals::take_sigchld() && self.state.jobs.iter().next().is_none() {
            return;
        }
        let changed = self.state.jobs.reap();
        for job in changed {
            match job.status {
                JobStatus::Done(0) => eprintln!("[{}] Done\t{}", job.id, job.command),
                JobStatus::Done(status) => {
                    eprintln!("[{}] Exit {}\t{}", job.id, status, job.command)
                }
                JobStatus::Signaled(sig) => {
                    eprintln!("[{}] Terminated (signal {})\t{}", job.id, sig, job.command)
                }
                JobStatus::Stopped => eprintln!("[{}] Stopped\t{}", job.id, job.command),
                JobStatus::Running => {}
            }
            if let Some(entry) = self.state.jobs.get_mut(job.id) {
                entry.notified = true;
            }
        }
        self.state.jobs.sweep_notified();
    }

    /// The seam the line editor's highlighter calls: would this name
    /// resolve at command position?
    pub fn is_known_command(&mut self, name: &str) -> bool {
        builtins::is_builtin(name)
            || self.state.functions.contains_key(name)
            || self.state.aliases.contains_key(name)
            || suggest::search_path(&mut self.state, name).is_some()
    }

    /// The abbreviation a submitted word should be rewritten to, if any.
    /// The core never expands these itself; the line editor asks here at
    /// submit time.
    pub fn abbreviation(&self, word: &str) -> Option<&str> {
        self.state.abbreviations.get(word).map(String::as_str)
    }

    /// Render PS1/PS2 with the handful of escapes the core supports
    /// (`\u` `\h` `\w` `\$` `\n`); richer prompts belong to the external
    /// prompt renderer, which reads state through [`Shell::state`].
    pub fn prompt(&self, which: &str) -> String {
        let default = match which {
            "PS1" => "cjsh$ ",
            "PS2" => "> ",
            _ => "",
        };
        let template = self
            .state
            .vars
            .value(which)
            .unwrap_or(default)
            .to_string();

        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('u') => {
                    out.push_str(self.state.vars.value("USER").unwrap_or("user"))
                }
                Some('h') => {
                    out.push_str(self.state.vars.value("HOSTNAME").unwrap_or("host"))
                }
                Some('w') => {
                    let home = self.state.vars.value("HOME").unwrap_or("");
                    let cwd = &self.state.cwd;
                    if !home.is_empty() && cwd.starts_with(home) {
                        out.push('~');
                        out.push_str(&cwd[home.len()..]);
                    } else {
                        out.push_str(cwd);
                    }
                }
                Some('$') => out.push(if unsafe { libc::geteuid() } == 0 { '#' } else { '$' }),
                Some('n') => out.push('\n'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        out
    }

    /// Source startup files: the login profile once for login shells,
    /// then the rc file for every interactive shell. Both are ordinary
    /// scripts run through the same interpreter.
    pub fn source_startup_files(&mut self) {
        let Some(home) = self.state.vars.value("HOME").map(str::to_string) else {
            return;
        };
        if self.login {
            self.source_if_exists(&format!("{}/.cjsh_profile", home));
        }
        if self.interactive {
            self.source_if_exists(&format!("{}/.cjshrc", home));
        }
    }

    /// Login shells run a logout script on the way out.
    pub fn source_logout_file(&mut self) {
        if !self.login {
            return;
        }
        if let Some(home) = self.state.vars.value("HOME").map(str::to_string) {
            self.source_if_exists(&format!("{}/.cjsh_logout", home));
        }
    }

    fn source_if_exists(&mut self, path: &str) {
        if let Ok(content) = std::fs::read_to_string(path) {
            let _ = self.eval(&content);
        }
    }

    /// Fire the EXIT trap and restore the terminal; called exactly once
    /// before the process ends.
    pub fn shutdown(&mut self) {
        let evaluator = Evaluator::new(&self.limits);
        evaluator.run_exit_trap(&mut self.state);
        if let Some(modes) = &self.terminal_modes {
            modes.restore();
        }
        terminal::give_terminal_to_shell();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_shell() -> Shell {
        Shell::new(ShellConfig::default())
    }

    #[test]
    fn new_shell_seeds_environment() {
        let shell = quiet_shell();
        assert!(shell.state.vars.is_set("SHLVL"));
        assert_eq!(shell.state.script_name, "cjsh");
        assert!(!shell.state.cwd.is_empty());
    }

    #[test]
    fn positional_args_install() {
        let shell = Shell::new(ShellConfig {
            script_name: Some("script.sh".to_string()),
            args: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        });
        assert_eq!(shell.state.script_name, "script.sh");
        assert_eq!(shell.state.positional, vec!["a", "b"]);
    }

    #[test]
    fn shlvl_increments_over_inherited() {
        let inherited: i32 = std::env::var("SHLVL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let shell = quiet_shell();
        let seen: i32 = shell.state.vars.value("SHLVL").unwrap().parse().unwrap();
        assert_eq!(seen, inherited + 1);
    }

    #[test]
    fn syntax_error_is_status_2() {
        let mut shell = quiet_shell();
        assert_eq!(shell.eval("if then"), EvalOutcome::Continue(2));
    }

    #[test]
    fn exit_terminates_noninteractive_shell() {
        let mut shell = quiet_shell();
        assert_eq!(shell.eval("exit 42"), EvalOutcome::Exit(42));
    }

    #[test]
    fn empty_input_preserves_status() {
        let mut shell = quiet_shell();
        shell.state.last_status = 7;
        assert_eq!(shell.eval("   \n  "), EvalOutcome::Continue(7));
    }

    #[test]
    fn builtins_are_known_commands() {
        let mut shell = quiet_shell();
        assert!(shell.is_known_command("echo"));
        assert!(shell.is_known_command("cd"));
        assert!(!shell.is_known_command("definitely-no-such-command-zzz"));
    }

    #[test]
    fn unterminated_heredoc_is_syntax_error() {
        let mut shell = quiet_shell();
        assert_eq!(shell.eval("cat <<EOF\nno end"), EvalOutcome::Continue(2));
    }

    #[test]
    fn prompt_escapes() {
        let mut shell = quiet_shell();
        shell.state.vars.set("PS1", "[\\w]\\$ ");
        shell.state.vars.set("HOME", "/nowhere-special");
        shell.state.cwd = "/tmp".to_string();
        let prompt = shell.prompt("PS1");
        assert!(prompt.contains("/tmp"));
        assert!(prompt.ends_with("$ ") || prompt.ends_with("# "));
    }

    #[test]
    fn abbreviation_seam_reads_table() {
        let mut shell = quiet_shell();
        shell
            .state
            .abbreviations
            .insert("gc".to_string(), "git commit".to_string());
        assert_eq!(shell.abbreviation("gc"), Some("git commit"));
        assert_eq!(shell.abbreviation("xx"), None);
    }
}
