//! abbr / unabbr - abbreviation management.
//!
//! Abbreviations differ from aliases: the interpreter never expands
//! them. The shell only stores the table; the line editor reads it
//! (through the driver's seam) and rewrites input at submit time.

use crate::interpreter::state::ShellState;
use super::printf_cmd::shell_quote;
use super::BuiltinOutput;

pub fn abbr(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.is_empty() {
        let mut entries: Vec<(&String, &String)> = state.abbreviations.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let mut stdout = String::new();
        for (name, value) in entries {
            stdout.push_str(&format!("abbr {}={}\n", name, shell_quote(value)));
        }
        return BuiltinOutput::out(stdout);
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut status = 0;
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                state
                    .abbreviations
                    .insert(name.to_string(), value.to_string());
            }
            _ => match state.abbreviations.get(arg) {
                Some(value) => {
                    stdout.push_str(&format!("abbr {}={}\n", arg, shell_quote(value)))
                }
                None => {
                    stderr.push_str(&format!("cjsh: abbr: {}: not found\n", arg));
                    status = 1;
                }
            },
        }
    }
    BuiltinOutput {
        stdout,
        stderr,
        status,
    }
}

pub fn unabbr(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.is_empty() {
        return BuiltinOutput::fail("cjsh: unabbr: usage: unabbr name [name ...]\n", 2);
    }
    let mut stderr = String::new();
    let mut status = 0;
    for name in args {
        if state.abbreviations.remove(name).is_none() {
            stderr.push_str(&format!("cjsh: unabbr: {}: not found\n", name));
            status = 1;
        }
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
    fn define_list_remove() {
        let mut state = ShellState::default();
        assert_eq!(abbr(&mut state, &args(&["gc=git commit"])).status, 0);
        assert_eq!(
            state.abbreviations.get("gc").map(String::as_str),
            Some("git commit")
        );
        let listing = abbr(&mut state, &[]);
        assert!(listing.stdout.contains("gc="));
        assert_eq!(unabbr(&mut state, &args(&["gc"])).status, 0);
        assert!(state.abbreviations.is_empty());
    }

    #[test]
    fn unknown_names_fail() {
        let mut state = ShellState::default();
        assert_eq!(abbr(&mut state, &args(&["nope"])).status, 1);
        assert_eq!(unabbr(&mut state, &args(&["nope"])).status, 1);
    }
}
