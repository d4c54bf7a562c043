//! alias / unalias and abbr / unabbr live next door in `abbr_cmd`.

use crate::interpreter::state::ShellState;
use super::printf_cmd::shell_quote;
use super::BuiltinOutput;

pub fn alias(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let listing: &[String] = if args.first().map(String::as_str) == Some("-p") {
        &args[1..]
    } else {
        args
    };

    if listing.is_empty() {
        let mut entries: Vec<(&String, &String)> = state.aliases.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let mut stdout = String::new();
        for (name, value) in entries {
            stdout.push_str(&format!("alias {}={}\n", name, shell_quote(value)));
        }
        return BuiltinOutput::out(stdout);
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut status = 0;
    for arg in listing {
        match arg.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                state.aliases.insert(name.to_string(), value.to_string());
            }
            _ => match state.aliases.get(arg) {
                Some(value) => {
                    stdout.push_str(&format!("alias {}={}\n", arg, shell_quote(value)))
                }
                None => {
                    stderr.push_str(&format!("cjsh: alias: {}: not found\n", arg));
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

pub fn unalias(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.is_empty() {
        return BuiltinOutput::fail("cjsh: unalias: usage: unalias [-a] name [name ...]\n", 2);
    }
    if args[0] == "-a" {
        state.aliases.clear();
        return BuiltinOutput::ok();
    }
    let mut stderr = String::new();
    let mut status = 0;
    for name in args {
        if state.aliases.remove(name).is_none() {
            stderr.push_str(&format!("cjsh: unalias: {}: not found\n", name));
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
    fn define_then_list() {
        let mut state = ShellState::default();
        assert_eq!(alias(&mut state, &args(&["ll=ls -l"])).status, 0);
        let out = alias(&mut state, &args(&["ll"]));
        assert!(out.stdout.contains("ll='ls -l'"));
    }

    #[test]
    fn unknown_lookup_fails() {
        let mut state = ShellState::default();
        assert_eq!(alias(&mut state, &args(&["nope"])).status, 1);
    }

    #[test]
    fn unalias_removes() {
        let mut state = ShellState::default();
        alias(&mut state, &args(&["gg=git grep"]));
        assert_eq!(unalias(&mut state, &args(&["gg"])).status, 0);
        assert!(state.aliases.is_empty());
    }

    #[test]
    fn unalias_all() {
        let mut state = ShellState::default();
        alias(&mut state, &args(&["a=1", "b=2"]));
        unalias(&mut state, &args(&["-a"]));
        assert!(state.aliases.is_empty());
    }
}
