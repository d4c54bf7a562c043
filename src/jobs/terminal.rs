//! Controlling-terminal handoff between the shell and its foreground job.
//!
//! Grounded in the classic fork/setpgid/tcsetpgrp/waitpid(WUNTRACED) dance:
//! the child puts itself in its own process group before doing anything
//! else, the parent hands the terminal to that group while it runs in the
//! foreground, then reclaims it once the job exits or stops.

use nix::sys::termios::tcgetattr;
use nix::unistd::{getpgrp, isatty, tcsetpgrp, Pid};
use std::os::unix::io::BorrowedFd;

/// Saved terminal modes, restored when a stopped/foregrounded job hands
/// control back so the shell's own line discipline isn't left clobbered.
pub struct TerminalModes {
    inner: Option<nix::sys::termios::Termios>,
}

fn stdin_fd() -> BorrowedFd<'static> {
    unsafe { BorrowedFd::borrow_raw(0) }
}

impl TerminalModes {
    pub fn capture() -> Self {
        if !is_interactive() {
            return Self { inner: None };
        }
        Self { inner: tcgetattr(stdin_fd()).ok() }
    }

    pub fn restore(&self) {
        if let Some(modes) = &self.inner {
            let _ = nix::sys::termios::tcsetattr(
                stdin_fd(),
                nix::sys::termios::SetArg::TCSADRAIN,
                modes,
            );
        }
    }
}

/// True when stdin is a terminal this shell can claim job control over.
pub fn is_interactive() -> bool {
    isatty(0).unwrap_or(false)
}

/// Hand the controlling terminal to `pgid` (the job about to run in the foreground).
pub fn give_terminal_to(pgid: i32) {
    if !is_interactive() {
        return;
    }
    let _ = tcsetpgrp(0, Pid::from_raw(pgid));
}

/// Reclaim the controlling terminal for the shell itself.
pub fn give_terminal_to_shell() {
    if !is_interactive() {
        return;
    }
    let _ = tcsetpgrp(0, getpgrp());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_modes_capture_does_not_panic_when_not_a_tty() {
        // Under test harnesses stdin usually isn't a tty; capture should degrade gracefully.
        let modes = TerminalModes::capture();
        modes.restore();
    }
}
