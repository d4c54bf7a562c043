//! export / unset / local / readonly - variable attributes and scope.

use crate::interpreter::state::ShellState;
use crate::parser::is_identifier;
use super::BuiltinOutput;

fn split_assignment(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (arg, None),
    }
}

pub fn export(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.is_empty() || args[0] == "-p" {
        let mut lines: Vec<String> = state
            .vars
            .visible()
            .into_iter()
            .filter(|(_, var)| var.exported)
            .map(|(name, var)| {
                format!(
                    "export {}={}",
                    name,
                    super::printf_cmd::shell_quote(&var.value)
                )
            })
            .collect();
        lines.sort();
        let mut stdout = lines.join("\n");
        if !stdout.is_empty() {
            stdout.push('\n');
        }
        return BuiltinOutput::out(stdout);
    }

    let mut unexport = false;
    let mut stderr = String::new();
    let mut status = 0;
    for arg in args {
        if arg == "-n" {
            unexport = true;
            continue;
        }
        let (name, value) = split_assignment(arg);
        if !is_identifier(name) {
            stderr.push_str(&format!("cjsh: export: {}: not a valid identifier\n", name));
            status = 1;
            continue;
        }
        if let Some(value) = value {
            if !state.vars.set(name, value) {
                stderr.push_str(&format!("cjsh: export: {}: readonly variable\n", name));
                status = 1;
                continue;
            }
        }
        state.vars.set_exported(name, !unexport);
    }
    BuiltinOutput {
        stdout: String::new(),
        stderr,
        status,
    }
}

pub fn unset(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let mut stderr = String::new();
    let mut status = 0;
    let mut functions_only = false;
    for arg in args {
        match arg.as_str() {
            "-f" => {
                functions_only = true;
                continue;
            }
            "-v" => {
                functions_only = false;
                continue;
            }
            _ => {}
        }
        if functions_only {
            state.functions.remove(arg);
            continue;
        }
        if state.functions.remove(arg).is_some() && !state.vars.is_set(arg) {
            continue;
        }
        if !state.vars.unset(arg) {
            stderr.push_str(&format!("cjsh: unset: {}: cannot unset: readonly variable\n", arg));
            status = 1;
        }
    }
    BuiltinOutput {
        stdout: String::new(),
        stderr,
        status,
    }
}

pub fn local(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if state.vars.scope_depth() == 0 {
        return BuiltinOutput::fail("cjsh: local: can only be used in a function\n", 1);
    }
    let mut stderr = String::new();
    let mut status = 0;
    for arg in args {
        let (name, value) = split_assignment(arg);
        if !is_identifier(name) {
            stderr.push_str(&format!("cjsh: local: {}: not a valid identifier\n", name));
            status = 1;
            continue;
        }
        if !state
            .vars
            .declare_local(name, value.unwrap_or("").to_string())
        {
            stderr.push_str(&format!("cjsh: local: {}: readonly variable\n", name));
            status = 1;
        }
    }
    BuiltinOutput {
        stdout: String::new(),
        stderr,
        status,
    }
}

pub fn readonly(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.is_empty() || args[0] == "-p" {
        let mut lines: Vec<String> = state
            .vars
            .visible()
            .into_iter()
            .filter(|(_, var)| var.readonly)
            .map(|(name, var)| {
                format!(
                    "readonly {}={}",
                    name,
                    super::printf_cmd::shell_quote(&var.value)
                )
            })
            .collect();
        lines.sort();
        let mut stdout = lines.join("\n");
        if !stdout.is_empty() {
            stdout.push('\n');
        }
        return BuiltinOutput::out(stdout);
    }

    let mut stderr = String::new();
    let mut status = 0;
    for arg in args {
        let (name, value) = split_assignment(arg);
        if !is_identifier(name) {
            stderr.push_str(&format!("cjsh: readonly: {}: not a valid identifier\n", name));
            status = 1;
            continue;
        }
        if let Some(value) = value {
            if !state.vars.set(name, value) {
                stderr.push_str(&format!("cjsh: readonly: {}: readonly variable\n", name));
                status = 1;
                continue;
            }
        }
        state.vars.set_readonly(name);
    }
    BuiltinOutput {
        stdout: String::new(),
        stderr,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn export_marks_and_sets() {
        let mut state = ShellState::default();
        export(&mut state, &args(&["A=1"]));
        assert_eq!(state.vars.value("A"), Some("1"));
        assert!(state.vars.get("A").unwrap().exported);
    }

    #[test]
    fn export_n_unexports() {
        let mut state = ShellState::default();
        export(&mut state, &args(&["A=1"]));
        export(&mut state, &args(&["-n", "A"]));
        assert!(!state.vars.get("A").unwrap().exported);
        assert_eq!(state.vars.value("A"), Some("1"));
    }

    #[test]
    fn export_listing() {
        let mut state = ShellState::default();
        export(&mut state, &args(&["A=x y"]));
        let out = export(&mut state, &[]);
        assert!(out.stdout.contains("export A='x y'"));
    }

    #[test]
    fn unset_removes_variables_and_functions() {
        let mut state = ShellState::default();
        state.vars.set("V", "1");
        unset(&mut state, &args(&["V"]));
        assert!(!state.vars.is_set("V"));
    }

    #[test]
    fn unset_readonly_fails() {
        let mut state = ShellState::default();
        state.vars.set("RO", "1");
        state.vars.set_readonly("RO");
        let out = unset(&mut state, &args(&["RO"]));
        assert_eq!(out.status, 1);
        assert!(state.vars.is_set("RO"));
    }

    #[test]
    fn local_outside_function_fails() {
        let mut state = ShellState::default();
        assert_eq!(local(&mut state, &args(&["x=1"])).status, 1);
    }

    #[test]
    fn local_inside_scope_shadows() {
        let mut state = ShellState::default();
        state.vars.set("x", "global");
        state.vars.push_scope();
        local(&mut state, &args(&["x=inner"]));
        assert_eq!(state.vars.value("x"), Some("inner"));
        state.vars.pop_scope();
        assert_eq!(state.vars.value("x"), Some("global"));
    }

    #[test]
    fn readonly_blocks_later_writes() {
        let mut state = ShellState::default();
        readonly(&mut state, &args(&["RO=1"]));
        assert!(!state.vars.set("RO", "2"));
        let out = readonly(&mut state, &[]);
        assert!(out.stdout.contains("readonly RO=1"));
    }
}
