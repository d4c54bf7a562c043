//! read - split one line of input into variables.
//!
//! The evaluator pre-reads the input text (from a redirection or the
//! real stdin) and passes it in. Splitting follows IFS with the usual
//! `read` twist: the last name receives the unsplit remainder. `-r`
//! disables backslash processing.

use crate::interpreter::state::ShellState;
use super::BuiltinOutput;

pub fn run(state: &mut ShellState, args: &[String], input: &str) -> BuiltinOutput {
    let mut raw = false;
    let mut names: Vec<&String> = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-r" => raw = true,
            "--" => {}
            _ => names.push(arg),
        }
    }

    let line = input.lines().next().unwrap_or("");
    let line = if raw {
        line.to_string()
    } else {
        // Backslash joins/escapes; without -r, drop the backslashes.
        let mut out = String::with_capacity(line.len());
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(n) = chars.next() {
                    out.push(n);
                }
            } else {
                out.push(c);
            }
        }
        out
    };

    if names.is_empty() {
        // POSIX reads into REPLY when no names are given.
        if !state.vars.set("REPLY", line) {
            return BuiltinOutput::fail("cjsh: read: REPLY: readonly variable\n", 1);
        }
        return BuiltinOutput::status(if input.is_empty() { 1 } else { 0 });
    }

    let ifs = state.ifs();
    let trimmed = line.trim_matches(|c: char| ifs.contains(c) && c.is_whitespace());
    let mut remaining = trimmed;
    for (i, name) in names.iter().enumerate() {
        let last = i == names.len() - 1;
        let value = if last {
            remaining.to_string()
        } else {
            match remaining.find(|c: char| ifs.contains(c)) {
                Some(pos) => {
                    let (field, rest) = remaining.split_at(pos);
                    remaining = rest.trim_start_matches(|c: char| ifs.contains(c));
                    field.to_string()
                }
                None => {
                    let field = remaining.to_string();
                    remaining = "";
                    field
                }
            }
        };
        if !state.vars.set(name, value) {
            return BuiltinOutput::fail(
                format!("cjsh: read: {}: readonly variable\n", name),
                1,
            );
        }
    }

    // EOF (no input at all) fails, letting `while read` loops terminate.
    BuiltinOutput::status(if input.is_empty() { 1 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_name_takes_whole_line() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["x"]), "hello world\n");
        assert_eq!(state.vars.value("x"), Some("hello world"));
    }

    #[test]
    fn multiple_names_split_last_takes_rest() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["a", "b"]), "one two three\n");
        assert_eq!(state.vars.value("a"), Some("one"));
        assert_eq!(state.vars.value("b"), Some("two three"));
    }

    #[test]
    fn custom_ifs() {
        let mut state = ShellState::default();
        state.vars.set("IFS", ":");
        run(&mut state, &args(&["a", "b"]), "x:y:z\n");
        assert_eq!(state.vars.value("a"), Some("x"));
        assert_eq!(state.vars.value("b"), Some("y:z"));
    }

    #[test]
    fn no_names_reads_reply() {
        let mut state = ShellState::default();
        run(&mut state, &[], "the line\n");
        assert_eq!(state.vars.value("REPLY"), Some("the line"));
    }

    #[test]
    fn backslashes_drop_without_r() {
        let mut state = ShellState::default();
        run(&mut state, &args(&["x"]), "a\\b\n");
        assert_eq!(state.vars.value("x"), Some("ab"));
        run(&mut state, &args(&["-r", "x"]), "a\\b\n");
        assert_eq!(state.vars.value("x"), Some("a\\b"));
    }

    #[test]
    fn empty_input_fails() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, &args(&["x"]), "").status, 1);
        assert_eq!(run(&mut state, &args(&["x"]), "text\n").status, 0);
    }
}
