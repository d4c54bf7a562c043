//! exec - replace the shell with a command.
//!
//! Never returns on success: the shell process becomes the command via
//! `execvpe`. Only the failure path produces output, with the statuses
//! bash uses (126 found-but-not-executable, 127 not found).

use std::ffi::CString;

use super::BuiltinOutput;

#[cfg(unix)]
pub fn exec_replace(argv: &[String], env: &[String]) -> BuiltinOutput {
    let Some(program) = argv.first() else {
        return BuiltinOutput::ok();
    };

    let c_program = CString::new(program.as_str()).unwrap_or_default();
    let c_args: Vec<CString> = argv
        .iter()
        .map(|a| CString::new(a.as_str()).unwrap_or_default())
        .collect();
    let c_env: Vec<CString> = env
        .iter()
        .map(|e| CString::new(e.as_str()).unwrap_or_default())
        .collect();

    let err = nix::unistd::execvpe(&c_program, &c_args, &c_env).unwrap_err();
    match err {
        nix::errno::Errno::EACCES | nix::errno::Errno::ENOEXEC => BuiltinOutput::fail(
            format!("cjsh: exec: {}: Permission denied\n", program),
            126,
        ),
        _ => BuiltinOutput::fail(format!("cjsh: exec: {}: not found\n", program), 127),
    }
}

#[cfg(not(unix))]
pub fn exec_replace(_argv: &[String], _env: &[String]) -> BuiltinOutput {
    BuiltinOutput::fail("cjsh: exec: requires a Unix-like platform\n", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_command_succeeds() {
        assert_eq!(exec_replace(&[], &[]).status, 0);
    }

    // A successful exec replaces the test process; only failure is
    // observable in-process.
    #[test]
    #[cfg(unix)]
    fn missing_program_is_127() {
        let argv = vec!["definitely-no-such-binary-xyz".to_string()];
        let out = exec_replace(&argv, &[]);
        assert_eq!(out.status, 127);
        assert!(out.stderr.contains("not found"));
    }
}
