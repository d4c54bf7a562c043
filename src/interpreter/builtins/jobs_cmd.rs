//! jobs / fg / bg / wait - job control builtins.
//!
//! All four reap with `waitpid(WNOHANG)` before acting so the view is
//! current. `fg` resumes a job's group with SIGCONT, hands it the
//! terminal, and blocks with `WUNTRACED`; `bg` resumes without the
//! terminal; `wait` blocks until the named jobs (or all of them) finish.

use crate::interpreter::state::ShellState;
use crate::jobs::{terminal, JobStatus};
use super::BuiltinOutput;

fn resolve(state: &ShellState, spec: Option<&str>) -> Result<u32, String> {
    match spec {
        None | Some("%%") | Some("%+") => state
            .jobs
            .current()
            .map(|j| j.id)
            .ok_or_else(|| "cjsh: current: no such job\n".to_string()),
        Some("%-") => state
            .jobs
            .previous()
            .map(|j| j.id)
            .ok_or_else(|| "cjsh: previous: no such job\n".to_string()),
        Some(spec) => spec
            .strip_prefix('%')
            .unwrap_or(spec)
            .parse::<u32>()
            .map_err(|_| format!("cjsh: {}: no such job\n", spec)),
    }
}

pub fn jobs(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    state.jobs.reap();
    let long = args.iter().any(|a| a == "-l");
    let current = state.jobs.current().map(|j| j.id);
    let previous = state.jobs.previous().map(|j| j.id);

    let mut stdout = String::new();
    for job in state.jobs.iter() {
        let marker = if current == Some(job.id) {
            '+'
        } else if previous == Some(job.id) {
            '-'
        } else {
            ' '
        };
        if long {
            stdout.push_str(&format!(
                "[{}]{} {}\t{}\t{}\n",
                job.id, marker, job.pgid, job.status, job.command
            ));
        } else {
            stdout.push_str(&format!(
                "[{}]{} {}\t{}\n",
                job.id, marker, job.status, job.command
            ));
        }
    }
    state.jobs.sweep_notified();
    BuiltinOutput::out(stdout)
}

pub fn bg(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    state.jobs.reap();
    let id = match resolve(state, args.first().map(String::as_str)) {
        Ok(id) => id,
        Err(message) => return BuiltinOutput::fail(message, 1),
    };
    let Some(job) = state.jobs.get_mut(id) else {
        return BuiltinOutput::fail(format!("cjsh: bg: {}: no such job\n", id), 1);
    };
    #[cfg(unix)]
    {
        let _ = crate::jobs::signals::signal_group(job.pgid, nix::sys::signal::Signal::SIGCONT);
    }
    job.status = JobStatus::Running;
    BuiltinOutput::out(format!("[{}]+ {} &\n", job.id, job.command))
}

#[cfg(unix)]
pub fn fg(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    use nix::sys::signal::Signal;
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::Pid;

    state.jobs.reap();
    let id = match resolve(state, args.first().map(String::as_str)) {
        Ok(id) => id,
        Err(message) => return BuiltinOutput::fail(message, 1),
    };
    let (pgid, command) = match state.jobs.get(id) {
        Some(job) => (job.pgid, job.command.clone()),
        None => return BuiltinOutput::fail(format!("cjsh: fg: {}: no such job\n", id), 1),
    };

    let _ = crate::jobs::signals::signal_group(pgid, Signal::SIGCONT);
    terminal::give_terminal_to(pgid);
    if let Some(job) = state.jobs.find_by_pgid_mut(pgid) {
        job.status = JobStatus::Running;
    }

    let status = loop {
        match waitpid(Pid::from_raw(-pgid), Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Exited(_, code)) => break code,
            Ok(WaitStatus::Signaled(_, sig, _)) => break 128 + sig as i32,
            Ok(WaitStatus::Stopped(_, _)) => {
                if let Some(job) = state.jobs.find_by_pgid_mut(pgid) {
                    job.status = JobStatus::Stopped;
                }
                break 128 + Signal::SIGTSTP as i32;
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => {
                terminal::give_terminal_to_shell();
                return BuiltinOutput::fail(format!("cjsh: fg: waitpid: {}\n", e), 1);
            }
        }
    };
    terminal::give_terminal_to_shell();

    if let Some(job) = state.jobs.find_by_pgid_mut(pgid) {
        if !matches!(job.status, JobStatus::Stopped) {
            job.status = JobStatus::Done(status);
        }
    }
    BuiltinOutput {
        stdout: format!("{}\n", command),
        stderr: String::new(),
        status,
    }
}

#[cfg(not(unix))]
pub fn fg(_state: &mut ShellState, _args: &[String]) -> BuiltinOutput {
    BuiltinOutput::fail("cjsh: fg: job control requires a Unix-like platform\n", 1)
}

pub fn wait(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    #[cfg(unix)]
    {
        use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
        use nix::unistd::Pid;

        state.jobs.reap();
        let targets: Vec<i32> = if args.is_empty() {
            state
                .jobs
                .iter()
                .filter(|j| !j.status.is_finished())
                .map(|j| j.pgid)
                .collect()
        } else {
            let mut pgids = Vec::new();
            for arg in args {
                match resolve(state, Some(arg)) {
                    Ok(id) => {
                        if let Some(job) = state.jobs.get(id) {
                            pgids.push(job.pgid);
                        }
                    }
                    Err(_) => {
                        // A raw pid waits on that process's group.
                        if let Ok(pid) = arg.parse::<i32>() {
                            pgids.push(pid);
                        }
                    }
                }
            }
            pgids
        };

        let mut status = 0;
        for pgid in targets {
            loop {
                match waitpid(Pid::from_raw(-pgid), Some(WaitPidFlag::empty())) {
                    Ok(WaitStatus::Exited(_, code)) => {
                        status = code;
                        if let Some(job) = state.jobs.find_by_pgid_mut(pgid) {
                            job.status = JobStatus::Done(code);
                        }
                        break;
                    }
                    Ok(WaitStatus::Signaled(_, sig, _)) => {
                        status = 128 + sig as i32;
                        if let Some(job) = state.jobs.find_by_pgid_mut(pgid) {
                            job.status = JobStatus::Signaled(sig as i32);
                        }
                        break;
                    }
                    Ok(_) => continue,
                    Err(nix::errno::Errno::EINTR) => continue,
                    Err(_) => break,
                }
            }
        }
        BuiltinOutput::status(status)
    }
    #[cfg(not(unix))]
    {
        let _ = (state, args);
        BuiltinOutput::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_with_empty_table_prints_nothing() {
        let mut state = ShellState::default();
        let out = jobs(&mut state, &[]);
        assert_eq!(out.status, 0);
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn resolve_defaults_to_current() {
        let mut state = ShellState::default();
        state.jobs.add(100, vec![100], "sleep 5".to_string());
        assert_eq!(resolve(&state, None), Ok(1));
        assert_eq!(resolve(&state, Some("%1")), Ok(1));
        assert!(resolve(&state, Some("%nope")).is_err());
    }

    #[test]
    fn unknown_job_fails() {
        let mut state = ShellState::default();
        assert_eq!(bg(&mut state, &["%4".to_string()]).status, 1);
    }
}
