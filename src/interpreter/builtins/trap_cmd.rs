//! trap - register actions for signals and pseudo-signals.
//!
//! `trap ACTION SIG...` stores an action per signal name (or number),
//! including the pseudo-signals `EXIT`, `ERR`, and `DEBUG` that the
//! evaluator fires at the matching lifecycle points. `trap '' SIG`
//! ignores, `trap - SIG` resets, `trap` / `trap -p` print, `trap -l`
//! lists names.

use crate::interpreter::state::{ShellState, TrapAction};
use super::BuiltinOutput;

const SIGNALS: &[(&str, i32)] = &[
    ("HUP", 1),
    ("INT", 2),
    ("QUIT", 3),
    ("ILL", 4),
    ("TRAP", 5),
    ("ABRT", 6),
    ("BUS", 7),
    ("FPE", 8),
    ("KILL", 9),
    ("USR1", 10),
    ("SEGV", 11),
    ("USR2", 12),
    ("PIPE", 13),
    ("ALRM", 14),
    ("TERM", 15),
    ("CHLD", 17),
    ("CONT", 18),
    ("STOP", 19),
    ("TSTP", 20),
    ("TTIN", 21),
    ("TTOU", 22),
];

/// Canonical trap key for a spec (`INT`, `SIGINT`, `2`, `EXIT`, ...).
fn normalize(spec: &str) -> Option<String> {
    let upper = spec.to_ascii_uppercase();
    match upper.as_str() {
        "EXIT" | "0" => return Some("EXIT".to_string()),
        "ERR" | "DEBUG" => return Some(upper),
        _ => {}
    }
    let name = upper.strip_prefix("SIG").unwrap_or(&upper);
    if SIGNALS.iter().any(|(n, _)| *n == name) {
        return Some(name.to_string());
    }
    if let Ok(number) = spec.parse::<i32>() {
        if let Some((n, _)) = SIGNALS.iter().find(|(_, v)| *v == number) {
            return Some(n.to_string());
        }
    }
    None
}

pub fn run(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.first().map(String::as_str) == Some("-l") {
        let mut stdout = String::new();
        for (name, number) in SIGNALS {
            stdout.push_str(&format!("{:2}) SIG{}\n", number, name));
        }
        return BuiltinOutput::out(stdout);
    }

    if args.is_empty() || args[0] == "-p" {
        let mut entries: Vec<(&String, &TrapAction)> = state.traps.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let mut stdout = String::new();
        for (signal, action) in entries {
            match action {
                TrapAction::Command(body) => stdout.push_str(&format!(
                    "trap -- '{}' {}\n",
                    body.replace('\'', "'\\''"),
                    signal
                )),
                TrapAction::Ignore => {
                    stdout.push_str(&format!("trap -- '' {}\n", signal))
                }
            }
        }
        return BuiltinOutput::out(stdout);
    }

    let action_text = &args[0];
    let specs = &args[1..];
    if specs.is_empty() {
        // One argument: it is itself a signal spec, meaning reset.
        let Some(key) = normalize(action_text) else {
            return BuiltinOutput::fail(
                format!("cjsh: trap: {}: invalid signal specification\n", action_text),
                1,
            );
        };
        state.traps.remove(&key);
        return BuiltinOutput::ok();
    }

    for spec in specs {
        let Some(key) = normalize(spec) else {
            return BuiltinOutput::fail(
                format!("cjsh: trap: {}: invalid signal specification\n", spec),
                1,
            );
        };
        if action_text == "-" {
            state.traps.remove(&key);
        } else if action_text.is_empty() {
            state.traps.insert(key, TrapAction::Ignore);
        } else {
            state
                .traps
                .insert(key, TrapAction::Command(action_text.clone()));
        }
    }
    BuiltinOutput::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn register_and_print() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["echo bye", "EXIT"]));
        assert!(matches!(
            state.traps.get("EXIT"),
            Some(TrapAction::Command(c)) if c == "echo bye"
        ));
        let listing = run(&mut state, &[]);
        assert!(listing.stdout.contains("echo bye"));
    }

    #[test]
    fn signal_specs_normalize() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["handler", "SIGINT"]));
        assert!(state.traps.contains_key("INT"));
        run(&mut state, &args(&["handler", "15"]));
        assert!(state.traps.contains_key("TERM"));
    }

    #[test]
    fn empty_action_ignores_dash_resets() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["", "INT"]));
        assert!(matches!(state.traps.get("INT"), Some(TrapAction::Ignore)));
        run(&mut state, &args(&["-", "INT"]));
        assert!(!state.traps.contains_key("INT"));
    }

    #[test]
    fn invalid_spec_fails() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, &args(&["cmd", "NOPE"])).status, 1);
    }
}
