//! type / hash / command -v - command classification and the path cache.

use crate::interpreter::state::ShellState;
use crate::interpreter::suggest;
use super::BuiltinOutput;

const KEYWORDS: &[&str] = &[
    "if", "then", "elif", "else", "fi", "for", "while", "until", "do", "done", "case", "esac",
    "in", "function", "{", "}", "!", "[[", "]]",
];

fn classify(state: &mut ShellState, name: &str, verbose: bool) -> Option<String> {
    if let Some(value) = state.aliases.get(name) {
        return Some(if verbose {
            format!("{} is aliased to `{}'\n", name, value)
        } else {
            format!("alias {}='{}'\n", name, value)
        });
    }
    if KEYWORDS.contains(&name) {
        return Some(if verbose {
            format!("{} is a shell keyword\n", name)
        } else {
            format!("{}\n", name)
        });
    }
    if state.functions.contains_key(name) {
        return Some(if verbose {
            format!("{} is a function\n", name)
        } else {
            format!("{}\n", name)
        });
    }
    if super::is_builtin(name) {
        return Some(if verbose {
            format!("{} is a shell builtin\n", name)
        } else {
            format!("{}\n", name)
        });
    }
    suggest::search_path(state, name).map(|path| {
        if verbose {
            format!("{} is {}\n", name, path)
        } else {
            format!("{}\n", path)
        }
    })
}

pub fn type_of(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let mut type_only = false;
    let mut names: Vec<&String> = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-t" => type_only = true,
            "-a" | "-p" | "-P" | "-f" => {}
            _ => names.push(arg),
        }
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut status = 0;
    for name in names {
        if type_only {
            let kind = if state.aliases.contains_key(name.as_str()) {
                Some("alias")
            } else if KEYWORDS.contains(&name.as_str()) {
                Some("keyword")
            } else if state.functions.contains_key(name.as_str()) {
                Some("function")
            } else if super::is_builtin(name) {
                Some("builtin")
            } else if suggest::search_path(state, name).is_some() {
                Some("file")
            } else {
                None
            };
            match kind {
                Some(kind) => stdout.push_str(&format!("{}\n", kind)),
                None => status = 1,
            }
            continue;
        }
        match classify(state, name, true) {
            Some(line) => stdout.push_str(&line),
            None => {
                stderr.push_str(&format!("cjsh: type: {}: not found\n", name));
                status = 1;
            }
        }
    }
    BuiltinOutput {
        stdout,
        stderr,
        status,
    }
}

pub fn hash(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    if args.first().map(String::as_str) == Some("-r") {
        state.command_paths.clear();
        return BuiltinOutput::ok();
    }

    if args.is_empty() {
        let mut entries: Vec<(&String, &String)> = state.command_paths.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let mut stdout = String::new();
        for (name, path) in entries {
            stdout.push_str(&format!("{}\t{}\n", name, path));
        }
        return BuiltinOutput::out(stdout);
    }

    let mut stderr = String::new();
    let mut status = 0;
    for name in args {
        if suggest::search_path(state, name).is_none() {
            stderr.push_str(&format!("cjsh: hash: {}: not found\n", name));
            status = 1;
        }
    }
    BuiltinOutput {
        stdout: String::new(),
        stderr,
        status,
    }
}

/// `command -v NAME` / `command -V NAME`: print how the name resolves.
/// Plain `command NAME args...` is handled by the evaluator, which must
/// re-dispatch past functions.
pub fn command_v(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let verbose = match args.first().map(String::as_str) {
        Some("-v") => false,
        Some("-V") => true,
        _ => {
            return BuiltinOutput::fail(
                "cjsh: command: usage: command [-vV] name [args]\n",
                2,
            )
        }
    };

    let mut stdout = String::new();
    let mut status = 0;
    for name in &args[1..] {
        // -v prints the path (or name for builtins); -V describes.
        let rendered = if verbose {
            classify(state, name, true)
        } else if state.aliases.contains_key(name.as_str()) {
            state
                .aliases
                .get(name.as_str())
                .map(|v| format!("alias {}='{}'\n", name, v))
        } else if state.functions.contains_key(name.as_str())
            || super::is_builtin(name)
            || KEYWORDS.contains(&name.as_str())
        {
            Some(format!("{}\n", name))
        } else {
            suggest::search_path(state, name).map(|p| format!("{}\n", p))
        };
        match rendered {
            Some(line) => stdout.push_str(&line),
            None => status = 1,
        }
    }
    BuiltinOutput {
        stdout,
        stderr: String::new(),
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
    fn builtins_and_keywords_classify() {
        let mut state = ShellState::default();
        let out = type_of(&mut state, &args(&["echo"]));
        assert!(out.stdout.contains("shell builtin"));
        let out = type_of(&mut state, &args(&["if"]));
        assert!(out.stdout.contains("shell keyword"));
    }

    #[test]
    fn aliases_and_functions_classify() {
        let mut state = ShellState::default();
        state.aliases.insert("ll".to_string(), "ls -l".to_string());
        let out = type_of(&mut state, &args(&["ll"]));
        assert!(out.stdout.contains("aliased"));
    }

    #[test]
    fn dash_t_prints_kind_word() {
        let mut state = ShellState::default();
        let out = type_of(&mut state, &args(&["-t", "echo"]));
        assert_eq!(out.stdout, "builtin\n");
    }

    #[test]
    fn unknown_name_fails() {
        let mut state = ShellState::default();
        state.vars.set("PATH", "");
        let out = type_of(&mut state, &args(&["definitely-no-such-xyz"]));
        assert_eq!(out.status, 1);
    }

    #[test]
    fn command_v_builtin_prints_name() {
        let mut state = ShellState::default();
        let out = command_v(&mut state, &args(&["-v", "echo"]));
        assert_eq!(out.stdout, "echo\n");
    }

    #[test]
    fn hash_r_clears_cache() {
        let mut state = ShellState::default();
        state
            .command_paths
            .insert("x".to_string(), "/bin/x".to_string());
        hash(&mut state, &args(&["-r"]));
        assert!(state.command_paths.is_empty());
    }
}
