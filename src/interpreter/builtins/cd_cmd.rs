//! cd - change the working directory.
//!
//! `cd` alone goes to `$HOME`; `cd -` returns to `$OLDPWD` and prints
//! it; a bad target fails with status 1 and changes nothing. The shell's
//! logical cwd and the process's real one move together, so forked
//! children start where the shell says it is.

use crate::interpreter::state::ShellState;
use super::BuiltinOutput;

pub fn run(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let mut print_target = false;

    let target = match args.iter().find(|a| !a.starts_with('-') || a.as_str() == "-") {
        None => match state.vars.value("HOME") {
            Some(home) => home.to_string(),
            None => return BuiltinOutput::fail("cjsh: cd: HOME not set\n", 1),
        },
        Some(arg) if arg == "-" => {
            if state.previous_dir.is_empty() {
                return BuiltinOutput::fail("cjsh: cd: OLDPWD not set\n", 1);
            }
            print_target = true;
            state.previous_dir.clone()
        }
        Some(arg) => arg.clone(),
    };

    let resolved = if target.starts_with('/') {
        normalize(&target)
    } else {
        normalize(&format!("{}/{}", state.cwd, target))
    };

    let path = std::path::Path::new(&resolved);
    if !path.exists() {
        return BuiltinOutput::fail(
            format!("cjsh: cd: {}: No such file or directory\n", target),
            1,
        );
    }
    if !path.is_dir() {
        return BuiltinOutput::fail(format!("cjsh: cd: {}: Not a directory\n", target), 1);
    }
    if let Err(e) = std::env::set_current_dir(&resolved) {
        return BuiltinOutput::fail(format!("cjsh: cd: {}: {}\n", target, e), 1);
    }

    state.previous_dir = std::mem::replace(&mut state.cwd, resolved.clone());
    state.vars.set("OLDPWD", state.previous_dir.clone());
    state.vars.set("PWD", resolved.clone());

    if print_target {
        BuiltinOutput::out(format!("{}\n", resolved))
    } else {
        BuiltinOutput::ok()
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(normalize("/a/b/../c"), "/a/c");
        assert_eq!(normalize("/a/./b"), "/a/b");
        assert_eq!(normalize("/a/b/../.."), "/");
        assert_eq!(normalize("//a///b"), "/a/b");
    }

    #[test]
    fn missing_directory_fails_without_state_change() {
        let mut state = ShellState::default();
        state.cwd = "/".to_string();
        let out = run(&mut state, &["/definitely/not/here".to_string()]);
        assert_eq!(out.status, 1);
        assert_eq!(state.cwd, "/");
    }

    #[test]
    fn cd_dash_without_oldpwd_fails() {
        let mut state = ShellState::default();
        let out = run(&mut state, &["-".to_string()]);
        assert_eq!(out.status, 1);
    }

    #[test]
    fn cd_to_tempdir_updates_both_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().to_string_lossy().to_string();
        let mut state = ShellState::default();
        state.cwd = "/".to_string();
        let out = run(&mut state, &[target.clone()]);
        assert_eq!(out.status, 0);
        assert_eq!(state.previous_dir, "/");
        assert!(state.cwd.ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
        assert_eq!(state.vars.value("OLDPWD"), Some("/"));
    }
}
