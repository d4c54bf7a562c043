//! umask and times.
//!
//! `umask` tracks the mask on [`ShellState`] and pushes it to the kernel
//! so children inherit it; `-S` speaks the symbolic form. `times`
//! reports accumulated user/system CPU for the shell and its reaped
//! children via `getrusage(2)`.

use crate::interpreter::state::ShellState;
use super::BuiltinOutput;

fn symbolic(mask: u32) -> String {
    let class = |shift: u32| {
        let perms = (!mask >> shift) & 0o7;
        let mut s = String::new();
        if perms & 0o4 != 0 {
            s.push('r');
        }
        if perms & 0o2 != 0 {
            s.push('w');
        }
        if perms & 0o1 != 0 {
            s.push('x');
        }
        s
    };
    format!("u={},g={},o={}", class(6), class(3), class(0))
}

fn parse_symbolic(spec: &str) -> Option<u32> {
    let mut mask = 0o777u32;
    for clause in spec.split(',') {
        let (who, perms) = clause.split_once('=')?;
        let mut bits = 0u32;
        for p in perms.chars() {
            bits |= match p {
                'r' => 0o4,
                'w' => 0o2,
                'x' => 0o1,
                _ => return None,
            };
        }
        for w in who.chars() {
            let shift = match w {
                'u' => 6,
                'g' => 3,
                'o' => 0,
                'a' => {
                    for shift in [6, 3, 0] {
                        mask &= !(0o7 << shift);
                        mask |= (!bits & 0o7) << shift;
                    }
                    continue;
                }
                _ => return None,
            };
            mask &= !(0o7 << shift);
            mask |= (!bits & 0o7) << shift;
        }
    }
    Some(mask)
}

pub fn run(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let mut symbolic_output = false;
    let mut mode: Option<&String> = None;
    for arg in args {
        match arg.as_str() {
            "-S" => symbolic_output = true,
            other if other.starts_with('-') && other.len() > 1 => {
                return BuiltinOutput::fail(
                    format!("cjsh: umask: {}: invalid option\n", other),
                    2,
                )
            }
            _ => mode = Some(arg),
        }
    }

    let Some(mode) = mode else {
        return BuiltinOutput::out(if symbolic_output {
            format!("{}\n", symbolic(state.umask))
        } else {
            format!("{:04o}\n", state.umask)
        });
    };

    let new_mask = if mode.chars().all(|c| c.is_digit(8)) {
        match u32::from_str_radix(mode, 8) {
            Ok(m) if m <= 0o777 => m,
            _ => {
                return BuiltinOutput::fail(
                    format!("cjsh: umask: {}: octal number out of range\n", mode),
                    1,
                )
            }
        }
    } else {
        match parse_symbolic(mode) {
            Some(m) => m,
            None => {
                return BuiltinOutput::fail(
                    format!("cjsh: umask: {}: invalid symbolic mode\n", mode),
                    1,
                )
            }
        }
    };

    state.umask = new_mask;
    #[cfg(unix)]
    unsafe {
        libc::umask(new_mask as libc::mode_t);
    }
    BuiltinOutput::ok()
}

fn format_duration(seconds: i64, micros: i64) -> String {
    let total = seconds as f64 + micros as f64 / 1_000_000.0;
    let minutes = (total / 60.0) as i64;
    format!("{}m{:.3}s", minutes, total - (minutes * 60) as f64)
}

#[cfg(unix)]
fn rusage_line(who: libc::c_int) -> String {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrusage(who, &mut usage) } != 0 {
        return "0m0.000s 0m0.000s".to_string();
    }
    format!(
        "{} {}",
        format_duration(usage.ru_utime.tv_sec, usage.ru_utime.tv_usec as i64),
        format_duration(usage.ru_stime.tv_sec, usage.ru_stime.tv_usec as i64),
    )
}

pub fn times() -> BuiltinOutput {
    #[cfg(unix)]
    {
        BuiltinOutput::out(format!(
            "{}\n{}\n",
            rusage_line(libc::RUSAGE_SELF),
            rusage_line(libc::RUSAGE_CHILDREN)
        ))
    }
    #[cfg(not(unix))]
    {
        BuiltinOutput::out("0m0.000s 0m0.000s\n0m0.000s 0m0.000s\n".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_mask_in_octal() {
        let mut state = ShellState::default();
        state.umask = 0o022;
        assert_eq!(run(&mut state, &[]).stdout, "0022\n");
    }

    #[test]
    fn sets_octal_mask() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, &["077".to_string()]).status, 0);
        assert_eq!(state.umask, 0o077);
    }

    #[test]
    fn symbolic_round_trip() {
        assert_eq!(symbolic(0o022), "u=rwx,g=rx,o=rx");
        assert_eq!(parse_symbolic("u=rwx,g=rx,o=rx"), Some(0o022));
    }

    #[test]
    fn out_of_range_fails() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, &["7777".to_string()]).status, 1);
    }

    #[test]
    fn times_reports_two_lines() {
        let out = times();
        assert_eq!(out.status, 0);
        assert_eq!(out.stdout.lines().count(), 2);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0, 0), "0m0.000s");
        assert_eq!(format_duration(61, 500_000), "1m1.500s");
    }
}
