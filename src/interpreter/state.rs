//! Shell state.
//!
//! The mutable aggregate threaded by reference through every evaluator
//! call: the variable store with function scopes, positional parameters,
//! aliases and abbreviations, the function table, shell options, traps,
//! the job table, and the working-directory pair for `cd -`. Tests build
//! one per case; the interactive shell owns exactly one for its lifetime.

use std::collections::HashMap;

use crate::ast::Command;
use crate::jobs::JobTable;

/// One shell variable: a string value plus its attribute bits.
#[derive(Debug, Clone, Default)]
pub struct Var {
    pub value: String,
    pub exported: bool,
    pub readonly: bool,
}

impl Var {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            exported: false,
            readonly: false,
        }
    }

    pub fn exported(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            exported: true,
            readonly: false,
        }
    }
}

/// The variable store: one global table plus a stack of function-call
/// scopes. Reads search the scope stack top-down, then the globals;
/// writes land where the name is already bound, else in the globals -
/// only `local` creates a binding in the current scope.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    globals: HashMap<String, Var>,
    scopes: Vec<HashMap<String, Var>>,
}

impl Variables {
    pub fn get(&self, name: &str) -> Option<&Var> {
        for scope in self.scopes.iter().rev() {
            if let Some(var) = scope.get(name) {
                return Some(var);
            }
        }
        self.globals.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|v| v.value.as_str())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_readonly(&self, name: &str) -> bool {
        self.get(name).map(|v| v.readonly).unwrap_or(false)
    }

    fn slot(&mut self, name: &str) -> &mut Var {
        // Find the scope holding the name; writes follow the binding.
        let holder = self
            .scopes
            .iter()
            .rposition(|scope| scope.contains_key(name));
        match holder {
            Some(i) => self.scopes[i].get_mut(name).unwrap(),
            None => self.globals.entry(name.to_string()).or_default(),
        }
    }

    /// Set a variable, honoring readonly. Returns false (and leaves the
    /// store untouched) when the name is readonly.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.is_readonly(name) {
            return false;
        }
        self.slot(name).value = value.into();
        true
    }

    /// Append, honoring readonly (`NAME+=value`).
    pub fn append(&mut self, name: &str, value: &str) -> bool {
        if self.is_readonly(name) {
            return false;
        }
        self.slot(name).value.push_str(value);
        true
    }

    /// Declare a binding in the current function scope (`local`); at
    /// global depth this is an ordinary global write.
    pub fn declare_local(&mut self, name: &str, value: String) -> bool {
        if self.is_readonly(name) {
            return false;
        }
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), Var::new(value));
                true
            }
            None => self.set(name, value),
        }
    }

    /// Unset wherever the name is bound. Returns false for readonly.
    pub fn unset(&mut self, name: &str) -> bool {
        if self.is_readonly(name) {
            return false;
        }
        for scope in self.scopes.iter_mut().rev() {
            if scope.remove(name).is_some() {
                return true;
            }
        }
        self.globals.remove(name);
        true
    }

    pub fn set_exported(&mut self, name: &str, exported: bool) {
        self.slot(name).exported = exported;
    }

    /// Put back a binding saved before a prefix assignment (`VAR=x cmd`).
    /// Bypasses readonly: it reinstates the exact prior state.
    pub fn restore(&mut self, name: &str, prior: Option<Var>) {
        match prior {
            Some(var) => {
                *self.slot(name) = var;
            }
            None => {
                for scope in self.scopes.iter_mut().rev() {
                    if scope.remove(name).is_some() {
                        return;
                    }
                }
                self.globals.remove(name);
            }
        }
    }

    pub fn set_readonly(&mut self, name: &str) {
        self.slot(name).readonly = true;
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Visible bindings, innermost shadowing outermost, for `set`.
    pub fn visible(&self) -> HashMap<&str, &Var> {
        let mut seen: HashMap<&str, &Var> = HashMap::new();
        for (name, var) in &self.globals {
            seen.insert(name, var);
        }
        for scope in &self.scopes {
            for (name, var) in scope {
                seen.insert(name, var);
            }
        }
        seen
    }

    /// `NAME=value` strings for an exec'd child's environment.
    pub fn exported_environ(&self) -> Vec<String> {
        self.visible()
            .into_iter()
            .filter(|(_, var)| var.exported)
            .map(|(name, var)| format!("{}={}", name, var.value))
            .collect()
    }
}

/// Shell options toggled by `set` flags / `set -o`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub errexit: bool,
    pub nounset: bool,
    pub pipefail: bool,
    pub noclobber: bool,
    pub xtrace: bool,
    pub verbose: bool,
    pub noglob: bool,
    pub allexport: bool,
    pub noexec: bool,
    /// Job control (terminal handoff); follows interactivity by default.
    pub monitor: bool,
}

impl Options {
    pub fn by_name(&mut self, name: &str) -> Option<&mut bool> {
        Some(match name {
            "errexit" => &mut self.errexit,
            "nounset" => &mut self.nounset,
            "pipefail" => &mut self.pipefail,
            "noclobber" => &mut self.noclobber,
            "xtrace" => &mut self.xtrace,
            "verbose" => &mut self.verbose,
            "noglob" => &mut self.noglob,
            "allexport" => &mut self.allexport,
            "noexec" => &mut self.noexec,
            "monitor" => &mut self.monitor,
            _ => return None,
        })
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        Some(match name {
            "errexit" => self.errexit,
            "nounset" => self.nounset,
            "pipefail" => self.pipefail,
            "noclobber" => self.noclobber,
            "xtrace" => self.xtrace,
            "verbose" => self.verbose,
            "noglob" => self.noglob,
            "allexport" => self.allexport,
            "noexec" => self.noexec,
            "monitor" => self.monitor,
            _ => return None,
        })
    }

    /// `(name, value)` pairs in display order for `set -o`.
    pub fn listing(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("allexport", self.allexport),
            ("errexit", self.errexit),
            ("monitor", self.monitor),
            ("noclobber", self.noclobber),
            ("noexec", self.noexec),
            ("noglob", self.noglob),
            ("nounset", self.nounset),
            ("pipefail", self.pipefail),
            ("verbose", self.verbose),
            ("xtrace", self.xtrace),
        ]
    }

    /// Single-letter flags for `$-`.
    pub fn flag_string(&self) -> String {
        let mut flags = String::new();
        for (flag, on) in [
            ('a', self.allexport),
            ('e', self.errexit),
            ('f', self.noglob),
            ('n', self.noexec),
            ('u', self.nounset),
            ('v', self.verbose),
            ('x', self.xtrace),
            ('C', self.noclobber),
            ('m', self.monitor),
        ] {
            if on {
                flags.push(flag);
            }
        }
        flags
    }
}

/// What a trap slot holds for a signal or pseudo-signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapAction {
    /// Run this command string on delivery.
    Command(String),
    /// `trap '' SIG`: ignore.
    Ignore,
}

/// A stack frame's saved positional parameters, restored on return.
#[derive(Debug, Clone)]
pub struct PositionalFrame {
    pub params: Vec<String>,
    pub script_name: String,
}

#[derive(Debug, Clone)]
pub struct ShellState {
    pub vars: Variables,
    /// `$1..$N`.
    pub positional: Vec<String>,
    /// `$0`.
    pub script_name: String,
    /// `$?`.
    pub last_status: i32,
    /// `$!`.
    pub last_background_pid: i32,
    /// `$_`: last argument of the previous command.
    pub last_arg: String,

    pub options: Options,
    pub aliases: HashMap<String, String>,
    /// Stored for the line editor; the interpreter never expands these.
    pub abbreviations: HashMap<String, String>,
    pub functions: HashMap<String, Command>,
    pub traps: HashMap<String, TrapAction>,
    /// `hash` lookup cache: command name -> resolved path.
    pub command_paths: HashMap<String, String>,

    pub cwd: String,
    pub previous_dir: String,
    pub umask: u32,

    pub jobs: JobTable,
    /// Monotonic count of evaluated statements; the two-press exit
    /// policy keys off it.
    pub command_seq: u64,

    /// Loop nesting depth, for `break`/`continue` validation.
    pub loop_depth: u32,
    /// Function call depth, for the recursion limit.
    pub call_depth: u32,
    /// Evaluating an `if`/`while`/`until` condition (errexit exempt).
    pub in_condition: bool,
    /// Inside a forked child: no terminal handoff, no fresh groups.
    pub in_subshell: bool,
    /// Set by `exit --force`.
    pub force_exit: bool,
}

impl Default for ShellState {
    fn default() -> Self {
        Self {
            vars: Variables::default(),
            positional: Vec::new(),
            script_name: "cjsh".to_string(),
            last_status: 0,
            last_background_pid: 0,
            last_arg: String::new(),
            options: Options::default(),
            aliases: HashMap::new(),
            abbreviations: HashMap::new(),
            functions: HashMap::new(),
            traps: HashMap::new(),
            command_paths: HashMap::new(),
            cwd: "/".to_string(),
            previous_dir: String::new(),
            umask: 0o022,
            jobs: JobTable::new(),
            command_seq: 0,
            loop_depth: 0,
            call_depth: 0,
            in_condition: false,
            in_subshell: false,
            force_exit: false,
        }
    }
}

impl ShellState {
    /// The field separator set, defaulting to space-tab-newline.
    pub fn ifs(&self) -> String {
        self.vars
            .value("IFS")
            .map(str::to_string)
            .unwrap_or_else(|| " \t\n".to_string())
    }

    /// Install new positional parameters, returning the frame to restore.
    pub fn push_positional(&mut self, params: Vec<String>, script_name: Option<String>) -> PositionalFrame {
        let frame = PositionalFrame {
            params: std::mem::replace(&mut self.positional, params),
            script_name: self.script_name.clone(),
        };
        if let Some(name) = script_name {
            self.script_name = name;
        }
        frame
    }

    pub fn pop_positional(&mut self, frame: PositionalFrame) {
        self.positional = frame.params;
        self.script_name = frame.script_name;
    }
}

/// Evaluator knobs bounding runaway scripts.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_recursion_depth: u32,
    pub max_loop_iterations: u64,
    /// Brace expansions larger than this stay literal.
    pub max_brace_elements: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 1000,
            max_loop_iterations: 10_000_000,
            max_brace_elements: 10_000_000,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_round_trip() {
        let mut vars = Variables::default();
        assert!(vars.set("X", "1"));
        assert_eq!(vars.value("X"), Some("1"));
        assert!(vars.is_set("X"));
        assert!(!vars.is_set("Y"));
    }

    #[test]
    fn readonly_blocks_set_and_unset() {
        let mut vars = Variables::default();
        vars.set("RO", "v");
        vars.set_readonly("RO");
        assert!(!vars.set("RO", "changed"));
        assert!(!vars.unset("RO"));
        assert_eq!(vars.value("RO"), Some("v"));
    }

    #[test]
    fn local_shadows_global_until_scope_pops() {
        let mut vars = Variables::default();
        vars.set("x", "global");
        vars.push_scope();
        vars.declare_local("x", "local".to_string());
        assert_eq!(vars.value("x"), Some("local"));
        // Plain write inside the scope follows the local binding.
        vars.set("x", "updated");
        assert_eq!(vars.value("x"), Some("updated"));
        vars.pop_scope();
        assert_eq!(vars.value("x"), Some("global"));
    }

    #[test]
    fn write_without_local_goes_global() {
        let mut vars = Variables::default();
        vars.push_scope();
        vars.set("y", "from-function");
        vars.pop_scope();
        assert_eq!(vars.value("y"), Some("from-function"));
    }

    #[test]
    fn exported_environ_includes_only_exported() {
        let mut vars = Variables::default();
        vars.set("A", "1");
        vars.set_exported("A", true);
        vars.set("B", "2");
        let environ = vars.exported_environ();
        assert!(environ.contains(&"A=1".to_string()));
        assert!(!environ.iter().any(|e| e.starts_with("B=")));
    }

    #[test]
    fn options_by_name() {
        let mut options = Options::default();
        *options.by_name("errexit").unwrap() = true;
        assert!(options.errexit);
        assert_eq!(options.get("errexit"), Some(true));
        assert_eq!(options.get("nope"), None);
        assert!(options.flag_string().contains('e'));
    }

    #[test]
    fn positional_frames_nest() {
        let mut state = ShellState::default();
        state.positional = vec!["outer".to_string()];
        let frame = state.push_positional(vec!["inner".to_string()], None);
        assert_eq!(state.positional, vec!["inner".to_string()]);
        state.pop_positional(frame);
        assert_eq!(state.positional, vec!["outer".to_string()]);
    }

    #[test]
    fn ifs_defaults_to_whitespace() {
        let state = ShellState::default();
        assert_eq!(state.ifs(), " \t\n");
    }
}
