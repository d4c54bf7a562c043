//! set / shift - shell options and positional parameters.
//!
//! `set` toggles option flags (`-e`, `+x`, `-o pipefail`), prints the
//! option table (`-o` / `+o` alone), and replaces the positional
//! parameters (`set -- a b c`). `shift` drops the first N positionals.

use crate::interpreter::state::ShellState;
use super::BuiltinOutput;

fn short_flag(c: char) -> Option<&'static str> {
    Some(match c {
        'e' => "errexit",
        'u' => "nounset",
        'x' => "xtrace",
        'v' => "verbose",
        'f' => "noglob",
        'a' => "allexport",
        'n' => "noexec",
        'C' => "noclobber",
        'm' => "monitor",
        _ => return None,
    })
}

pub fn run(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.is_empty() {
        // Print visible variables, sorted, in reusable form.
        let mut lines: Vec<String> = state
            .vars
            .visible()
            .into_iter()
            .map(|(name, var)| format!("{}={}", name, super::printf_cmd::shell_quote(&var.value)))
            .collect();
        lines.sort();
        let mut stdout = lines.join("\n");
        if !stdout.is_empty() {
            stdout.push('\n');
        }
        return BuiltinOutput::out(stdout);
    }

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--" => {
                state.positional = args[i + 1..].to_vec();
                return BuiltinOutput::ok();
            }
            "-o" | "+o" => {
                let enable = arg.starts_with('-');
                match args.get(i + 1) {
                    Some(name) => match state.options.by_name(name) {
                        Some(slot) => *slot = enable,
                        None => {
                            return BuiltinOutput::fail(
                                format!("cjsh: set: {}: invalid option name\n", name),
                                1,
                            )
                        }
                    },
                    None => {
                        // Bare -o / +o print the option table.
                        let mut stdout = String::new();
                        for (name, on) in state.options.listing() {
                            if arg == "-o" {
                                stdout.push_str(&format!(
                                    "{:<12}{}\n",
                                    name,
                                    if on { "on" } else { "off" }
                                ));
                            } else {
                                stdout.push_str(&format!(
                                    "set {} {}\n",
                                    if on { "-o" } else { "+o" },
                                    name
                                ));
                            }
                        }
                        return BuiltinOutput::out(stdout);
                    }
                }
                i += 2;
            }
            flags if flags.len() > 1 && (flags.starts_with('-') || flags.starts_with('+')) => {
                let enable = flags.starts_with('-');
                for c in flags[1..].chars() {
                    match short_flag(c) {
                        Some(name) => {
                            *state.options.by_name(name).expect("table covers flags") = enable;
                        }
                        None => {
                            return BuiltinOutput::fail(
                                format!(
                                    "cjsh: set: {}{}: invalid option\n",
                                    if enable { '-' } else { '+' },
                                    c
                                ),
                                1,
                            )
                        }
                    }
                }
                i += 1;
            }
            _ => {
                // First non-option argument: the rest are positionals.
                state.positional = args[i..].to_vec();
                return BuiltinOutput::ok();
            }
        }
    }
    BuiltinOutput::ok()
}

pub fn shift(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let count: usize = match args.first() {
        None => 1,
        Some(text) => match text.parse() {
            Ok(n) => n,
            Err(_) => {
                return BuiltinOutput::fail(
                    format!("cjsh: shift: {}: numeric argument required\n", text),
                    1,
                )
            }
        },
    };
    if count > state.positional.len() {
        return BuiltinOutput::fail("cjsh: shift: shift count out of range\n", 1);
    }
    state.positional.drain(..count);
    BuiltinOutput::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn short_flags_toggle() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["-eu"]));
        assert!(state.options.errexit);
        assert!(state.options.nounset);
        run(&mut state, &args(&["+e"]));
        assert!(!state.options.errexit);
    }

    #[test]
    fn long_option_names() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["-o", "pipefail"]));
        assert!(state.options.pipefail);
        run(&mut state, &args(&["+o", "pipefail"]));
        assert!(!state.options.pipefail);
    }

    #[test]
    fn invalid_option_fails() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, &args(&["-o", "nope"])).status, 1);
        assert_eq!(run(&mut state, &args(&["-Z"])).status, 1);
    }

    #[test]
    fn double_dash_sets_positionals() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["--", "a", "b"]));
        assert_eq!(state.positional, vec!["a", "b"]);
    }

    #[test]
    fn bare_words_set_positionals() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["x", "y", "z"]));
        assert_eq!(state.positional, vec!["x", "y", "z"]);
    }

    #[test]
    fn option_listing_prints_table() {
        let mut state = ShellState::default();
        state.options.pipefail = true;
        let out = run(&mut state, &args(&["-o"]));
        assert!(out.stdout.contains("pipefail"));
        assert!(out.stdout.contains("on"));
    }

    #[test]
    fn shift_drops_leading_positionals() {
        let mut state = ShellState::default();
        state.positional = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(shift(&mut state, &[]).status, 0);
        assert_eq!(state.positional, vec!["b", "c"]);
        assert_eq!(shift(&mut state, &args(&["2"])).status, 0);
        assert!(state.positional.is_empty());
    }

    #[test]
    fn shift_past_the_end_fails() {
        let mut state = ShellState::default();
        state.positional = vec!["only".into()];
        assert_eq!(shift(&mut state, &args(&["5"])).status, 1);
        assert_eq!(state.positional, vec!["only"]);
    }
}
