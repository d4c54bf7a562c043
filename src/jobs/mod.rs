//! Background and stopped job tracking.
//!
//! A [`Job`] is one pipeline launched with `&` or suspended with Ctrl-Z; it
//! may be made of several processes (`a | b | c &`) sharing a process
//! group, which is why [`Job::pids`] is a list rather than a single pid.

pub mod signals;
pub mod terminal;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done(i32),
    Signaled(i32),
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Done(_) | JobStatus::Signaled(_))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Stopped => write!(f, "Stopped"),
            JobStatus::Done(code) => write!(f, "Done({code})"),
            JobStatus::Signaled(sig) => write!(f, "Terminated(signal {sig})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: u32,
    pub pgid: i32,
    pub pids: Vec<i32>,
    pub command: String,
    pub status: JobStatus,
    /// Whether the most recent status transition has already been reported
    /// to the user (via `jobs`/the `Done` notice printed before a prompt).
    pub notified: bool,
}

impl Job {
    pub fn is_current_pgid(&self, pgid: i32) -> bool {
        self.pgid == pgid
    }
}

/// Tracks every background/stopped job under this shell's control.
#[derive(Debug, Clone, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Register a newly launched background job and return its job number:
    /// the smallest positive integer not currently in use.
    pub fn add(&mut self, pgid: i32, pids: Vec<i32>, command: String) -> u32 {
        let mut id = 1;
        while self.jobs.iter().any(|j| j.id == id) {
            id += 1;
        }
        self.jobs.push(Job {
            id,
            pgid,
            pids,
            command,
            status: JobStatus::Running,
            notified: false,
        });
        id
    }

    pub fn get(&self, id: u32) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn find_by_pgid_mut(&mut self, pgid: i32) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.pgid == pgid)
    }

    pub fn find_by_pid_mut(&mut self, pid: i32) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.pids.contains(&pid))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// The job `%%`/`%+` refers to: the most recently added job still running or stopped.
    pub fn current(&self) -> Option<&Job> {
        self.jobs.iter().rev().find(|j| !j.status.is_finished())
    }

    /// The job `%-` refers to: the one before [`current`].
    pub fn previous(&self) -> Option<&Job> {
        let mut seen_current = false;
        for job in self.jobs.iter().rev().filter(|j| !j.status.is_finished()) {
            if seen_current {
                return Some(job);
            }
            seen_current = true;
        }
        None
    }

    /// Poll every tracked pid with `WNOHANG`/`WUNTRACED`/`WCONTINUED` and
    /// update job statuses. Returns the jobs whose status changed this pass,
    /// for callers (the prompt loop, `wait`) that want to print notices.
    #[cfg(unix)]
    pub fn reap(&mut self) -> Vec<Job> {
        use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
        use nix::unistd::Pid;

        let mut changed = Vec::new();
        for job in &mut self.jobs {
            if job.status.is_finished() {
                continue;
            }
            let mut job_changed = false;
            loop {
                let any_pid = Pid::from_raw(-job.pgid);
                match waitpid(
                    any_pid,
                    Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED),
                ) {
                    Ok(WaitStatus::Exited(pid, code)) => {
                        job.pids.retain(|&p| p != pid.as_raw());
                        if job.pids.is_empty() {
                            job.status = JobStatus::Done(code);
                        }
                        job_changed = true;
                    }
                    Ok(WaitStatus::Signaled(pid, sig, _)) => {
                        job.pids.retain(|&p| p != pid.as_raw());
                        if job.pids.is_empty() {
                            job.status = JobStatus::Signaled(sig as i32);
                        }
                        job_changed = true;
                    }
                    Ok(WaitStatus::Stopped(_, _)) => {
                        job.status = JobStatus::Stopped;
                        job_changed = true;
                        break;
                    }
                    Ok(WaitStatus::Continued(_)) => {
                        job.status = JobStatus::Running;
                        job_changed = true;
                        break;
                    }
                    Ok(WaitStatus::StillAlive) => break,
                    _ => break,
                }
                if job.status.is_finished() {
                    break;
                }
            }
            if job_changed {
                job.notified = false;
                changed.push(job.clone());
            }
        }
        changed
    }

    #[cfg(not(unix))]
    pub fn reap(&mut self) -> Vec<Job> {
        Vec::new()
    }

    /// Drop jobs that finished and have already been reported.
    pub fn sweep_notified(&mut self) {
        self.jobs.retain(|j| !(j.status.is_finished() && j.notified));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assigns_increasing_job_ids() {
        let mut table = JobTable::new();
        let a = table.add(100, vec![100], "sleep 1".to_string());
        let b = table.add(200, vec![200], "sleep 2".to_string());
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn current_and_previous_track_most_recent_running_jobs() {
        let mut table = JobTable::new();
        table.add(100, vec![100], "a".to_string());
        table.add(200, vec![200], "b".to_string());
        assert_eq!(table.current().unwrap().pgid, 200);
        assert_eq!(table.previous().unwrap().pgid, 100);
    }

    #[test]
    fn sweep_notified_drops_only_reported_finished_jobs() {
        let mut table = JobTable::new();
        table.add(100, vec![100], "a".to_string());
        table.get_mut(1).unwrap().status = JobStatus::Done(0);
        table.get_mut(1).unwrap().notified = true;
        table.add(200, vec![200], "b".to_string());
        table.get_mut(2).unwrap().status = JobStatus::Done(1);
        // job 2 not yet notified, should survive the sweep
        table.sweep_notified();
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_some());
    }
}
