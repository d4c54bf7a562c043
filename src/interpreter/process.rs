//! Real OS-process pipeline execution.
//!
//! `a | b | c` forks one child per stage, connects them with real `pipe(2)`
//! fds, and `waitpid`s on the lot, exactly like every other POSIX shell.
//! `std::process::Command` can spawn one external program, but it can't put
//! several children (some of which aren't external programs at all - a
//! builtin, a function, a `{ ...; }` group) into one process group under the
//! parent's terminal control, so every stage here - external or in-process -
//! goes through the same fork.
//!
//! An in-process stage (builtin, function, compound command) runs the
//! evaluator's closure in the child after its fds are wired up, then calls
//! `std::process::exit` with the closure's status - it never returns into
//! the parent's copy of `state`, matching how bash runs every pipeline
//! stage but the last in a subshell (and the last one too, without
//! `lastpipe`).

use crate::interpreter::errors::ShellError;
use crate::interpreter::state::ShellState;
use crate::jobs::{signals, terminal};
use std::ffi::CString;

/// One redirection, fully resolved (targets already expanded) and ready to
/// apply with `open`/`dup2` inside a forked child, in declaration order.
#[derive(Debug, Clone)]
pub enum RedirSpec {
    /// `< path`
    ReadFile { fd: i32, path: String },
    /// `> path` / `>> path` / `>| path`
    WriteFile { fd: i32, path: String, append: bool },
    /// `<> path`
    ReadWrite { fd: i32, path: String },
    /// `N>&M` / `N<&M`
    DupFd { fd: i32, src: i32 },
    /// `N>&-`
    CloseFd { fd: i32 },
    /// Here-document / here-string body fed through a pipe onto `fd`.
    HereString { fd: i32, body: String },
}

/// What runs inside one forked pipeline stage.
pub enum StageKind<'a> {
    /// An external program; `argv[0]` is the program name, `env` the full
    /// exported environment for `execvpe`.
    External {
        program: String,
        argv: Vec<String>,
        env: Vec<String>,
    },
    /// Builtin / function / compound command, evaluated in the child. The
    /// closure writes its own output to the (already redirected) real fds
    /// and returns the exit status for the child to exit with.
    InProcess(Box<dyn FnOnce(&mut ShellState) -> i32 + 'a>),
}

pub struct StageSpec<'a> {
    pub kind: StageKind<'a>,
    pub redirs: Vec<RedirSpec>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Don't wait; caller registers the pgid with the job table.
    pub background: bool,
    /// Collect the last stage's stdout into `PipelineResult::captured_stdout`
    /// (command substitution).
    pub capture_stdout: bool,
    /// Hand the terminal to the pipeline's group while it runs.
    pub transfer_terminal: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub exit_code: i32,
    pub pipestatus: Vec<i32>,
    pub pgid: i32,
    pub pids: Vec<i32>,
    /// The foreground job stopped (SIGTSTP) instead of exiting.
    pub stopped: bool,
    pub captured_stdout: Option<String>,
}

#[cfg(unix)]
fn exit_code_from_wait(status: nix::sys::wait::WaitStatus) -> i32 {
    use nix::sys::wait::WaitStatus::*;
    match status {
        Exited(_, code) => code,
        Signaled(_, sig, _) => 128 + sig as i32,
        _ => 127,
    }
}

/// Apply one resolved redirection inside the child. Failure prints the
/// shell-style diagnostic and the child exits 1 without exec'ing, matching
/// the "failure to open signals exit 1 for that command" contract.
#[cfg(unix)]
fn apply_redir_in_child(redir: &RedirSpec) -> Result<(), String> {
    use nix::fcntl::{open, OFlag};
    use nix::sys::stat::Mode;
    use nix::unistd::{close, dup2, pipe, write};

    let mode = Mode::from_bits_truncate(0o666);
    match redir {
        RedirSpec::ReadFile { fd, path } => {
            let raw = open(path.as_str(), OFlag::O_RDONLY, mode)
                .map_err(|e| format!("{}: {}", path, e.desc()))?;
            dup2(raw, *fd).map_err(|e| format!("dup2: {}", e.desc()))?;
            let _ = close(raw);
        }
        RedirSpec::WriteFile { fd, path, append } => {
            let mut flags = OFlag::O_WRONLY | OFlag::O_CREAT;
            flags |= if *append { OFlag::O_APPEND } else { OFlag::O_TRUNC };
            let raw = open(path.as_str(), flags, mode)
                .map_err(|e| format!("{}: {}", path, e.desc()))?;
            dup2(raw, *fd).map_err(|e| format!("dup2: {}", e.desc()))?;
            let _ = close(raw);
        }
        RedirSpec::ReadWrite { fd, path } => {
            let raw = open(path.as_str(), OFlag::O_RDWR | OFlag::O_CREAT, mode)
                .map_err(|e| format!("{}: {}", path, e.desc()))?;
            dup2(raw, *fd).map_err(|e| format!("dup2: {}", e.desc()))?;
            let _ = close(raw);
        }
        RedirSpec::DupFd { fd, src } => {
            dup2(*src, *fd).map_err(|e| format!("{}: Bad file descriptor: {}", src, e.desc()))?;
        }
        RedirSpec::CloseFd { fd } => {
            let _ = close(*fd);
        }
        RedirSpec::HereString { fd, body } => {
            // A pipe inside the child, filled by a grandchild writer so an
            // oversized body can't deadlock against a full pipe buffer.
            let (r, w) = pipe().map_err(|e| format!("pipe: {}", e.desc()))?;
            let r = std::os::fd::IntoRawFd::into_raw_fd(r);
            let w = std::os::fd::IntoRawFd::into_raw_fd(w);
            match unsafe { nix::unistd::fork() } {
                Ok(nix::unistd::ForkResult::Child) => {
                    let _ = close(r);
                    let mut remaining = body.as_bytes();
                    while !remaining.is_empty() {
                        match write(w, remaining) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => remaining = &remaining[n..],
                        }
                    }
                    let _ = close(w);
                    std::process::exit(0);
                }
                Ok(nix::unistd::ForkResult::Parent { .. }) => {
                    let _ = close(w);
                    dup2(r, *fd).map_err(|e| format!("dup2: {}", e.desc()))?;
                    let _ = close(r);
                }
                Err(e) => return Err(format!("fork: {}", e.desc())),
            }
        }
    }
    Ok(())
}

/// Fork `stages` connected by real pipes and wait for them (unless
/// backgrounded). The first child becomes the pipeline's process-group
/// leader; later children join that group, so one `kill(-pgid, ...)` or
/// terminal-driver Ctrl-C reaches the whole job.
#[cfg(unix)]
pub fn run_pipeline(
    state: &mut ShellState,
    stages: Vec<StageSpec>,
    opts: RunOptions,
) -> Result<PipelineResult, ShellError> {
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::{close, dup2, execvpe, fork, pipe, read, setpgid, ForkResult, Pid};

    let n = stages.len();
    if n == 0 {
        return Ok(PipelineResult::default());
    }

    let mut pipe_fds: Vec<(i32, i32)> = Vec::with_capacity(n.saturating_sub(1));
    for _ in 0..n.saturating_sub(1) {
        let (r, w) = pipe().map_err(|e| ShellError::io(format!("pipe: {e}")))?;
        pipe_fds.push((
            std::os::fd::IntoRawFd::into_raw_fd(r),
            std::os::fd::IntoRawFd::into_raw_fd(w),
        ));
    }

    let capture_fds = if opts.capture_stdout {
        let (r, w) = pipe().map_err(|e| ShellError::io(format!("pipe: {e}")))?;
        Some((
            std::os::fd::IntoRawFd::into_raw_fd(r),
            std::os::fd::IntoRawFd::into_raw_fd(w),
        ))
    } else {
        None
    };

    let mut pids: Vec<i32> = Vec::with_capacity(n);
    let mut pgid: i32 = 0;

    for (i, stage) in stages.into_iter().enumerate() {
        // SAFETY: the child branch never returns into shared Rust control
        // flow - it either execs or calls process::exit - so it never runs a
        // destructor or allocator call racing the parent.
        match unsafe { fork() }.map_err(|e| ShellError::io(format!("fork: {e}")))? {
            ForkResult::Parent { child } => {
                let pid = child.as_raw();
                pids.push(pid);
                if i == 0 {
                    pgid = pid;
                }
                // Both sides call setpgid to close the fork/exec race.
                let _ = setpgid(child, Pid::from_raw(pgid));
            }
            ForkResult::Child => {
                signals::reset_child_handlers();
                let _ = setpgid(Pid::from_raw(0), Pid::from_raw(if i == 0 { 0 } else { pgid }));

                if i > 0 {
                    let _ = dup2(pipe_fds[i - 1].0, 0);
                }
                if i < n - 1 {
                    let _ = dup2(pipe_fds[i].1, 1);
                } else if let Some((_, w)) = capture_fds {
                    let _ = dup2(w, 1);
                }
                for (r, w) in &pipe_fds {
                    let _ = close(*r);
                    let _ = close(*w);
                }
                if let Some((r, w)) = capture_fds {
                    let _ = close(r);
                    let _ = close(w);
                }

                for redir in &stage.redirs {
                    if let Err(msg) = apply_redir_in_child(redir) {
                        eprintln!("cjsh: {}", msg);
                        std::process::exit(1);
                    }
                }

                match stage.kind {
                    StageKind::External { program, argv, env } => {
                        let c_program = CString::new(program.clone()).unwrap_or_default();
                        let c_args: Vec<CString> = argv
                            .iter()
                            .map(|a| CString::new(a.as_str()).unwrap_or_default())
                            .collect();
                        let c_env: Vec<CString> = env
                            .iter()
                            .map(|e| CString::new(e.as_str()).unwrap_or_default())
                            .collect();
                        let err = execvpe(&c_program, &c_args, &c_env).unwrap_err();
                        let code = match err {
                            nix::errno::Errno::EACCES | nix::errno::Errno::ENOEXEC => {
                                eprintln!("cjsh: {}: Permission denied", program);
                                126
                            }
                            _ => {
                                eprintln!("cjsh: {}: command not found", program);
                                127
                            }
                        };
                        std::process::exit(code);
                    }
                    StageKind::InProcess(run) => {
                        let code = run(state);
                        // Flush anything buffered on the Rust side before
                        // the child vanishes.
                        use std::io::Write;
                        let _ = std::io::stdout().flush();
                        let _ = std::io::stderr().flush();
                        std::process::exit(code);
                    }
                }
            }
        }
    }

    for (r, w) in &pipe_fds {
        let _ = close(*r);
        let _ = close(*w);
    }

    if opts.background {
        if let Some((r, w)) = capture_fds {
            let _ = close(r);
            let _ = close(w);
        }
        return Ok(PipelineResult {
            exit_code: 0,
            pipestatus: Vec::new(),
            pgid,
            pids,
            stopped: false,
            captured_stdout: None,
        });
    }

    if opts.transfer_terminal {
        signals::set_foreground_pgid(pgid);
        terminal::give_terminal_to(pgid);
    }

    // Drain the capture pipe to EOF before waiting, so a chatty child can't
    // deadlock against a full pipe buffer.
    let captured_stdout = if let Some((r, w)) = capture_fds {
        let _ = close(w);
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match read(r, &mut chunk) {
                Ok(0) => break,
                Ok(len) => buf.extend_from_slice(&chunk[..len]),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(_) => break,
            }
        }
        let _ = close(r);
        Some(String::from_utf8_lossy(&buf).into_owned())
    } else {
        None
    };

    let mut pipestatus = vec![0i32; n];
    let mut remaining = pids.len();
    let mut last_code = 0;
    let mut stopped = false;
    while remaining > 0 {
        match waitpid(Pid::from_raw(-pgid), Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Stopped(pid, _)) => {
                if let Some(idx) = pids.iter().position(|&p| p == pid.as_raw()) {
                    pipestatus[idx] = 128 + nix::sys::signal::Signal::SIGTSTP as i32;
                    if idx == n - 1 {
                        last_code = pipestatus[idx];
                    }
                }
                stopped = true;
                break;
            }
            Ok(status @ (WaitStatus::Exited(pid, _) | WaitStatus::Signaled(pid, _, _))) => {
                if let Some(idx) = pids.iter().position(|&p| p == pid.as_raw()) {
                    let code = exit_code_from_wait(status);
                    pipestatus[idx] = code;
                    if idx == n - 1 {
                        last_code = code;
                    }
                }
                remaining -= 1;
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => break,
        }
    }

    if opts.transfer_terminal {
        terminal::give_terminal_to_shell();
        signals::set_foreground_pgid(-1);
    }

    Ok(PipelineResult {
        exit_code: last_code,
        pipestatus,
        pgid,
        pids,
        stopped,
        captured_stdout,
    })
}

#[cfg(not(unix))]
pub fn run_pipeline(
    _state: &mut ShellState,
    _stages: Vec<StageSpec>,
    _opts: RunOptions,
) -> Result<PipelineResult, ShellError> {
    Err(ShellError::io(
        "pipeline execution requires a Unix-like platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_env() -> Vec<String> {
        vec!["PATH=/usr/bin:/bin".to_string()]
    }

    #[test]
    #[cfg(unix)]
    fn single_external_stage_reports_exit_code() {
        let mut state = ShellState::default();
        let stages = vec![StageSpec {
            kind: StageKind::External {
                program: "sh".to_string(),
                argv: vec!["sh".to_string(), "-c".to_string(), "exit 7".to_string()],
                env: plain_env(),
            },
            redirs: vec![],
        }];
        let result = run_pipeline(&mut state, stages, RunOptions::default()).unwrap();
        assert_eq!(result.exit_code, 7);
        assert_eq!(result.pipestatus, vec![7]);
    }

    #[test]
    #[cfg(unix)]
    fn two_stage_pipe_connects_stdout_to_stdin() {
        let mut state = ShellState::default();
        let stages = vec![
            StageSpec {
                kind: StageKind::External {
                    program: "echo".to_string(),
                    argv: vec!["echo".to_string(), "hello".to_string()],
                    env: plain_env(),
                },
                redirs: vec![],
            },
            StageSpec {
                kind: StageKind::External {
                    program: "cat".to_string(),
                    argv: vec!["cat".to_string()],
                    env: plain_env(),
                },
                redirs: vec![],
            },
        ];
        let result = run_pipeline(
            &mut state,
            stages,
            RunOptions {
                capture_stdout: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.captured_stdout.as_deref(), Some("hello\n"));
    }

    #[test]
    #[cfg(unix)]
    fn in_process_stage_exits_with_closure_status() {
        let mut state = ShellState::default();
        let stages = vec![StageSpec {
            kind: StageKind::InProcess(Box::new(|_s: &mut ShellState| 3)),
            redirs: vec![],
        }];
        let result = run_pipeline(&mut state, stages, RunOptions::default()).unwrap();
        assert_eq!(result.exit_code, 3);
    }

    #[test]
    #[cfg(unix)]
    fn herestring_redir_feeds_stdin() {
        let mut state = ShellState::default();
        let stages = vec![StageSpec {
            kind: StageKind::External {
                program: "cat".to_string(),
                argv: vec!["cat".to_string()],
                env: plain_env(),
            },
            redirs: vec![RedirSpec::HereString {
                fd: 0,
                body: "from heredoc\n".to_string(),
            }],
        }];
        let result = run_pipeline(
            &mut state,
            stages,
            RunOptions {
                capture_stdout: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.captured_stdout.as_deref(), Some("from heredoc\n"));
    }

    #[test]
    #[cfg(unix)]
    fn write_file_redirection_lands_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let mut state = ShellState::default();
        let stages = vec![StageSpec {
            kind: StageKind::External {
                program: "echo".to_string(),
                argv: vec!["echo".to_string(), "redirected".to_string()],
                env: plain_env(),
            },
            redirs: vec![RedirSpec::WriteFile {
                fd: 1,
                path: path.to_string_lossy().to_string(),
                append: false,
            }],
        }];
        let result = run_pipeline(&mut state, stages, RunOptions::default()).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "redirected\n");
    }

    #[test]
    #[cfg(unix)]
    fn command_not_found_is_127() {
        let mut state = ShellState::default();
        let stages = vec![StageSpec {
            kind: StageKind::External {
                program: "definitely-no-such-binary-xyz".to_string(),
                argv: vec!["definitely-no-such-binary-xyz".to_string()],
                env: plain_env(),
            },
            redirs: vec![RedirSpec::WriteFile {
                fd: 2,
                path: "/dev/null".to_string(),
                append: false,
            }],
        }];
        let result = run_pipeline(&mut state, stages, RunOptions::default()).unwrap();
        assert_eq!(result.exit_code, 127);
    }
}
