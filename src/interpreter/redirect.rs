//! Output routing for in-process commands.
//!
//! Builtins and functions produce stdout/stderr strings; this module
//! applies a command's redirection list to those strings - writing to
//! real files, merging fds for `2>&1`/`>&2`, honoring `noclobber` -
//! after the command has run. External commands never come through
//! here: their fds are wired with real `dup2` before exec.

use std::io::Write;

use crate::ast::{Redirection, RedirOp};
use crate::interpreter::builtins::BuiltinOutput;
use crate::interpreter::state::ShellState;

fn write_file(path: &str, data: &str, append: bool) -> Option<String> {
    if path == "/dev/null" {
        return None;
    }
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    match options.open(path) {
        Ok(mut file) => match file.write_all(data.as_bytes()) {
            Ok(()) => None,
            Err(e) => Some(format!("cjsh: {}: {}\n", path, e)),
        },
        Err(e) => Some(format!("cjsh: {}: {}\n", path, e)),
    }
}

/// Apply `(redirection, expanded target)` pairs in order to the
/// command's buffered output.
pub fn route(
    state: &ShellState,
    output: BuiltinOutput,
    redirections: &[(Redirection, String)],
) -> BuiltinOutput {
    let mut stdout = output.stdout;
    let mut stderr = output.stderr;
    let mut status = output.status;

    for (redirection, target) in redirections {
        match redirection.op {
            RedirOp::Out | RedirOp::Append | RedirOp::Clobber => {
                let append = redirection.op == RedirOp::Append;
                if state.options.noclobber
                    && redirection.op == RedirOp::Out
                    && std::path::Path::new(target).exists()
                    && target != "/dev/null"
                {
                    stderr.push_str(&format!(
                        "cjsh: {}: cannot overwrite existing file\n",
                        target
                    ));
                    status = 1;
                    continue;
                }
                let buffer = if redirection.fd.unwrap_or(1) == 2 {
                    &mut stderr
                } else {
                    &mut stdout
                };
                if let Some(message) = write_file(target, buffer, append) {
                    buffer.clear();
                    stderr.push_str(&message);
                    status = 1;
                } else {
                    buffer.clear();
                }
            }
            RedirOp::DupOut => {
                let fd = redirection.fd.unwrap_or(1);
                match (fd, target.as_str()) {
                    (2, "1") => {
                        stdout.push_str(&stderr);
                        stderr.clear();
                    }
                    (1, "2") => {
                        stderr.push_str(&stdout);
                        stdout.clear();
                    }
                    (_, "-") => {}
                    _ => {
                        // `>& file` shorthand: both streams to the file.
                        if target.parse::<i32>().is_err() {
                            let combined = format!("{}{}", stdout, stderr);
                            if let Some(message) = write_file(target, &combined, false) {
                                stderr = message;
                                status = 1;
                            } else {
                                stderr.clear();
                            }
                            stdout.clear();
                        }
                    }
                }
            }
            RedirOp::OutErr | RedirOp::AppendOutErr => {
                let append = redirection.op == RedirOp::AppendOutErr;
                let combined = format!("{}{}", stdout, stderr);
                if let Some(message) = write_file(target, &combined, append) {
                    stderr = message;
                    status = 1;
                } else {
                    stderr.clear();
                }
                stdout.clear();
            }
            // Input redirections are consumed before the command runs.
            RedirOp::In | RedirOp::ReadWrite | RedirOp::DupIn | RedirOp::HereDoc
            | RedirOp::HereString => {}
        }
    }

    BuiltinOutput {
        stdout,
        stderr,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{RedirTarget, Word};

    fn redir(fd: Option<i32>, op: RedirOp) -> Redirection {
        Redirection {
            fd,
            op,
            target: RedirTarget::Word(Word::default()),
        }
    }

    #[test]
    fn stdout_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let state = ShellState::default();
        let output = BuiltinOutput::out("content\n");
        let routed = route(
            &state,
            output,
            &[(redir(None, RedirOp::Out), path.to_string_lossy().to_string())],
        );
        assert!(routed.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "content\n");
    }

    #[test]
    fn append_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let target = path.to_string_lossy().to_string();
        let state = ShellState::default();
        route(
            &state,
            BuiltinOutput::out("one\n"),
            &[(redir(None, RedirOp::Out), target.clone())],
        );
        route(
            &state,
            BuiltinOutput::out("two\n"),
            &[(redir(None, RedirOp::Append), target.clone())],
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn stderr_merges_into_stdout() {
        let state = ShellState::default();
        let output = BuiltinOutput {
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
            status: 0,
        };
        let routed = route(&state, output, &[(redir(Some(2), RedirOp::DupOut), "1".to_string())]);
        assert_eq!(routed.stdout, "out\nerr\n");
        assert!(routed.stderr.is_empty());
    }

    #[test]
    fn noclobber_blocks_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.txt");
        std::fs::write(&path, "original").unwrap();
        let mut state = ShellState::default();
        state.options.noclobber = true;
        let routed = route(
            &state,
            BuiltinOutput::out("new\n"),
            &[(redir(None, RedirOp::Out), path.to_string_lossy().to_string())],
        );
        assert_eq!(routed.status, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn clobber_overrides_noclobber() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.txt");
        std::fs::write(&path, "original").unwrap();
        let mut state = ShellState::default();
        state.options.noclobber = true;
        let routed = route(
            &state,
            BuiltinOutput::out("new\n"),
            &[(redir(None, RedirOp::Clobber), path.to_string_lossy().to_string())],
        );
        assert_eq!(routed.status, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }
}
