//! kill - send a signal to a job or process.
//!
//! `%job` specs resolve through the job table and signal the whole
//! process group; plain pids go to one process. Signals by name
//! (`TERM`, `SIGTERM`), by number, or via `-s`; `-l` lists.

use crate::interpreter::state::ShellState;
use super::BuiltinOutput;

const SIGNALS: &[(&str, i32)] = &[
    ("HUP", 1),
    ("INT", 2),
    ("QUIT", 3),
    ("ABRT", 6),
    ("KILL", 9),
    ("USR1", 10),
    ("USR2", 12),
    ("PIPE", 13),
    ("ALRM", 14),
    ("TERM", 15),
    ("CHLD", 17),
    ("CONT", 18),
    ("STOP", 19),
    ("TSTP", 20),
];

pub fn parse_signal(spec: &str) -> Option<i32> {
    if let Ok(n) = spec.parse::<i32>() {
        return (0..=64).contains(&n).then_some(n);
    }
    let name = spec.strip_prefix("SIG").unwrap_or(spec).to_uppercase();
    SIGNALS.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

fn send(pid: i32, signal: i32) -> Result<(), String> {
    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error().to_string())
    }
}

pub fn run(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let mut signal = 15; // SIGTERM
    let mut targets: Vec<&String> = Vec::new();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];
        if arg == "-l" {
            let names: Vec<String> = SIGNALS
                .iter()
                .map(|(n, v)| format!("{}) SIG{}", v, n))
                .collect();
            return BuiltinOutput::out(format!("{}\n", names.join(" ")));
        } else if arg == "-s" {
            i += 1;
            let Some(spec) = args.get(i) else {
                return BuiltinOutput::fail("cjsh: kill: -s: option requires an argument\n", 2);
            };
            match parse_signal(spec) {
                Some(s) => signal = s,
                None => {
                    return BuiltinOutput::fail(
                        format!("cjsh: kill: {}: invalid signal specification\n", spec),
                        1,
                    )
                }
            }
        } else if arg == "--" {
            targets.extend(&args[i + 1..]);
            break;
        } else if let Some(spec) = arg.strip_prefix('-') {
            match parse_signal(spec) {
                Some(s) => signal = s,
                None => {
                    return BuiltinOutput::fail(
                        format!("cjsh: kill: {}: invalid signal specification\n", spec),
                        1,
                    )
                }
            }
        } else {
            targets.push(arg);
        }
        i += 1;
    }

    if targets.is_empty() {
        return BuiltinOutput::fail(
            "cjsh: kill: usage: kill [-s sigspec | -sigspec] pid | %job ...\n",
            2,
        );
    }

    state.jobs.reap();
    let mut stderr = String::new();
    let mut status = 0;

    for target in targets {
        if let Some(job_spec) = target.strip_prefix('%') {
            let job = match job_spec {
                "%" | "+" => state.jobs.current(),
                "-" => state.jobs.previous(),
                _ => job_spec.parse::<u32>().ok().and_then(|id| state.jobs.get(id)),
            };
            match job {
                Some(job) => {
                    if let Err(e) = send(-job.pgid, signal) {
                        stderr.push_str(&format!("cjsh: kill: {}: {}\n", target, e));
                        status = 1;
                    }
                }
                None => {
                    stderr.push_str(&format!("cjsh: kill: {}: no such job\n", target));
                    status = 1;
                }
            }
            continue;
        }
        match target.parse::<i32>() {
            Ok(pid) => {
                if let Err(e) = send(pid, signal) {
                    stderr.push_str(&format!("cjsh: kill: ({}) - {}\n", pid, e));
                    status = 1;
                }
            }
            Err(_) => {
                stderr.push_str(&format!(
                    "cjsh: kill: {}: arguments must be process or job IDs\n",
                    target
                ));
                status = 1;
            }
        }
    }

    BuiltinOutput {
        stdout: String::new(),
        stderr,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_parsing() {
        assert_eq!(parse_signal("TERM"), Some(15));
        assert_eq!(parse_signal("SIGTERM"), Some(15));
        assert_eq!(parse_signal("term"), Some(15));
        assert_eq!(parse_signal("9"), Some(9));
        assert_eq!(parse_signal("NOPE"), None);
    }

    #[test]
    fn no_targets_is_usage_error() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, &[]).status, 2);
    }

    #[test]
    fn unknown_job_fails() {
        let mut state = ShellState::default();
        let out = run(&mut state, &["%42".to_string()]);
        assert_eq!(out.status, 1);
        assert!(out.stderr.contains("no such job"));
    }

    #[test]
    #[cfg(unix)]
    fn signal_zero_probes_own_process() {
        let mut state = ShellState::default();
        let args = vec!["-0".to_string(), std::process::id().to_string()];
        assert_eq!(run(&mut state, &args).status, 0);
    }
}
