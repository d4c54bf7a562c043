//! Process-group-level signal plumbing for job control.
//!
//! Tracks the pgid currently holding the controlling terminal and the one
//! bit of async state a signal handler is allowed to touch directly
//! (SIGCHLD reaping is driven from [`super::JobTable::reap`] instead, which
//! polls with `WNOHANG` rather than doing work inside the handler).

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// pgid of the job currently in the foreground (-1 if none).
pub static FOREGROUND_PGID: AtomicI32 = AtomicI32::new(-1);

/// Set when SIGCHLD fires; polled by the job table to trigger a reap pass.
pub static SIGCHLD_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Install the shell's top-level signal handlers.
///
/// An interactive shell ignores SIGINT/SIGQUIT/SIGTSTP/SIGTTIN/SIGTTOU itself
/// (they're meant for the foreground job, not the shell) and notes SIGCHLD
/// so job status can be refreshed between prompts.
#[cfg(unix)]
pub fn install_shell_handlers() {
    use nix::sys::signal::{signal, SigHandler, Signal};

    unsafe {
        let _ = signal(Signal::SIGTTOU, SigHandler::SigIgn);
        let _ = signal(Signal::SIGTTIN, SigHandler::SigIgn);
        let _ = signal(Signal::SIGTSTP, SigHandler::SigIgn);
        let _ = signal(Signal::SIGQUIT, SigHandler::SigIgn);
        // Ctrl-C is for the foreground job; the terminal driver delivers
        // it to that job's group, never to the shell itself.
        let _ = signal(Signal::SIGINT, SigHandler::SigIgn);
    }

    unsafe {
        let _ = signal_hook::low_level::register(signal_hook::consts::SIGCHLD, || {
            SIGCHLD_RECEIVED.store(true, Ordering::SeqCst);
        });
    }
}

#[cfg(not(unix))]
pub fn install_shell_handlers() {}

/// Restore default dispositions in a freshly forked child, before it execs
/// or runs builtin code, so job-control signals behave normally again.
#[cfg(unix)]
pub fn reset_child_handlers() {
    use nix::sys::signal::{signal, SigHandler, Signal};
    unsafe {
        let _ = signal(Signal::SIGTTOU, SigHandler::SigDfl);
        let _ = signal(Signal::SIGTTIN, SigHandler::SigDfl);
        let _ = signal(Signal::SIGTSTP, SigHandler::SigDfl);
        let _ = signal(Signal::SIGQUIT, SigHandler::SigDfl);
        let _ = signal(Signal::SIGINT, SigHandler::SigDfl);
    }
}

#[cfg(not(unix))]
pub fn reset_child_handlers() {}

pub fn set_foreground_pgid(pgid: i32) {
    FOREGROUND_PGID.store(pgid, Ordering::SeqCst);
}

pub fn foreground_pgid() -> Option<i32> {
    let pgid = FOREGROUND_PGID.load(Ordering::SeqCst);
    if pgid > 0 { Some(pgid) } else { None }
}

pub fn take_sigchld() -> bool {
    SIGCHLD_RECEIVED.swap(false, Ordering::SeqCst)
}

/// Send a signal to a whole process group (negative pid in POSIX kill(2) terms).
#[cfg(unix)]
pub fn signal_group(pgid: i32, sig: nix::sys::signal::Signal) -> Result<(), String> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(-pgid), sig).map_err(|e| format!("kill({pgid}): {e}"))
}

#[cfg(not(unix))]
pub fn signal_group(_pgid: i32, _sig: ()) -> Result<(), String> {
    Err("job control requires a Unix-like platform".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_pgid_round_trip() {
        set_foreground_pgid(4242);
        assert_eq!(foreground_pgid(), Some(4242));
        set_foreground_pgid(-1);
        assert_eq!(foreground_pgid(), None);
    }
}
