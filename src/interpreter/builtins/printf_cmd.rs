//! printf - formatted output.
//!
//! The POSIX directive set (`%s %d %i %u %x %X %o %c %b %q %%` plus the
//! float forms) with flags/width/precision, reapplying the format until
//! the arguments run out. `-v VAR` stores the result in a variable.

use crate::interpreter::state::ShellState;
use super::echo_cmd::interpret_escapes;
use super::BuiltinOutput;

struct Spec {
    flags: String,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

fn numeric(value: &str) -> i64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return 0;
    }
    // `'A` yields the character code, per POSIX.
    if let Some(rest) = trimmed.strip_prefix('\'').or_else(|| trimmed.strip_prefix('"')) {
        return rest.chars().next().map(|c| c as i64).unwrap_or(0);
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    if trimmed.len() > 1 && trimmed.starts_with('0') && trimmed.chars().all(|c| c.is_digit(8)) {
        return i64::from_str_radix(&trimmed[1..], 8).unwrap_or(0);
    }
    trimmed.parse().unwrap_or_else(|_| {
        let mut end = 0;
        for (i, c) in trimmed.char_indices() {
            if (c == '-' && i == 0) || c.is_ascii_digit() {
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        trimmed[..end].parse().unwrap_or(0)
    })
}

/// Quote a value so it re-parses as a single shell word (`%q`).
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '+' | ',' | '@'))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn pad(text: String, spec: &Spec, zeros_allowed: bool) -> String {
    let width = match spec.width {
        Some(w) if text.chars().count() < w => w,
        _ => return text,
    };
    let deficit = width - text.chars().count();
    if spec.flags.contains('-') {
        let mut out = text;
        out.extend(std::iter::repeat(' ').take(deficit));
        out
    } else if zeros_allowed && spec.flags.contains('0') {
        if let Some(rest) = text.strip_prefix('-') {
            format!("-{}{}", "0".repeat(deficit), rest)
        } else {
            format!("{}{}", "0".repeat(deficit), text)
        }
    } else {
        format!("{}{}", " ".repeat(deficit), text)
    }
}

fn convert(spec: &Spec, arg: Option<&str>) -> Result<String, String> {
    let arg = arg.unwrap_or("");
    let text = match spec.conversion {
        's' => {
            let mut s = arg.to_string();
            if let Some(p) = spec.precision {
                s = s.chars().take(p).collect();
            }
            s
        }
        'b' => interpret_escapes(arg).0,
        'q' => shell_quote(arg),
        'c' => arg.chars().next().map(String::from).unwrap_or_default(),
        'd' | 'i' => {
            let n = numeric(arg);
            if spec.flags.contains('+') && n >= 0 {
                format!("+{}", n)
            } else if spec.flags.contains(' ') && n >= 0 {
                format!(" {}", n)
            } else {
                n.to_string()
            }
        }
        'u' => (numeric(arg) as u64).to_string(),
        'x' => format!("{:x}", numeric(arg)),
        'X' => format!("{:X}", numeric(arg)),
        'o' => format!("{:o}", numeric(arg)),
        'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
            let value: f64 = arg.trim().parse().unwrap_or(0.0);
            let precision = spec.precision.unwrap_or(6);
            match spec.conversion {
                'f' | 'F' => format!("{:.*}", precision, value),
                'e' => format!("{:.*e}", precision, value),
                'E' => format!("{:.*E}", precision, value),
                _ => format!("{}", value),
            }
        }
        other => return Err(format!("printf: %{}: invalid directive", other)),
    };
    let zeros = matches!(spec.conversion, 'd' | 'i' | 'u' | 'x' | 'X' | 'o' | 'e' | 'f' | 'g');
    Ok(pad(text, spec, zeros))
}

/// Render the format once. Returns whether any directive consumed input.
fn render(format: &str, args: &[String], next: &mut usize, out: &mut String) -> Result<bool, String> {
    let mut consumed_any = false;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            let mut esc = String::from("\\");
            if let Some(&n) = chars.peek() {
                esc.push(n);
                chars.next();
            }
            out.push_str(&interpret_escapes(&esc).0);
            continue;
        }
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut flags = String::new();
        while let Some(&f) = chars.peek() {
            if matches!(f, '-' | '+' | ' ' | '0' | '#') {
                flags.push(f);
                chars.next();
            } else {
                break;
            }
        }
        let mut width_text = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() {
                width_text.push(d);
                chars.next();
            } else {
                break;
            }
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut text = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    text.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            precision = Some(text.parse().unwrap_or(0));
        }
        let conversion = chars
            .next()
            .ok_or_else(|| "printf: missing format character".to_string())?;

        let spec = Spec {
            flags,
            width: width_text.parse().ok(),
            precision,
            conversion,
        };
        let arg = args.get(*next).map(String::as_str);
        if arg.is_some() {
            *next += 1;
        }
        consumed_any = true;
        out.push_str(&convert(&spec, arg)?);
    }
    Ok(consumed_any)
}

pub fn run(state: &mut ShellState, args: &[String]) -> BuiltinOutput {
    let mut args = args;
    let mut assign_to: Option<String> = None;

    if args.first().map(String::as_str) == Some("-v") {
        match args.get(1) {
            Some(name) => {
                assign_to = Some(name.clone());
                args = &args[2..];
            }
            None => {
                return BuiltinOutput::fail("cjsh: printf: -v: option requires an argument\n", 2)
            }
        }
    }

    let Some(format) = args.first() else {
        return BuiltinOutput::fail("cjsh: printf: usage: printf [-v var] format [arguments]\n", 2);
    };
    let rest = &args[1..];

    let mut out = String::new();
    let mut next = 0;
    loop {
        match render(format, rest, &mut next, &mut out) {
            Ok(consumed) => {
                if next >= rest.len() || !consumed {
                    break;
                }
            }
            Err(message) => return BuiltinOutput::fail(format!("cjsh: {}\n", message), 1),
        }
    }

    match assign_to {
        Some(name) => {
            if state.vars.set(&name, out) {
                BuiltinOutput::ok()
            } else {
                BuiltinOutput::fail(format!("cjsh: printf: {}: readonly variable\n", name), 1)
            }
        }
        None => BuiltinOutput::out(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printf(args: &[&str]) -> String {
        let mut state = ShellState::default();
        run(&mut state, &args.iter().map(|s| s.to_string()).collect::<Vec<_>>()).stdout
    }

    #[test]
    fn string_and_number_directives() {
        assert_eq!(printf(&["%s-%d\n", "x", "42"]), "x-42\n");
    }

    #[test]
    fn format_reapplies_until_args_run_out() {
        assert_eq!(printf(&["%s\n", "a", "b", "c"]), "a\nb\nc\n");
    }

    #[test]
    fn width_and_zero_pad() {
        assert_eq!(printf(&["%5d", "42"]), "   42");
        assert_eq!(printf(&["%05d", "42"]), "00042");
        assert_eq!(printf(&["%-5d|", "42"]), "42   |");
    }

    #[test]
    fn precision_truncates_strings() {
        assert_eq!(printf(&["%.3s", "abcdef"]), "abc");
    }

    #[test]
    fn hex_octal_percent() {
        assert_eq!(printf(&["%x %o %%", "255", "8"]), "ff 10 %");
    }

    #[test]
    fn escapes_in_format() {
        assert_eq!(printf(&["a\\tb"]), "a\tb");
    }

    #[test]
    fn missing_args_are_empty_or_zero() {
        assert_eq!(printf(&["%s|%d", "only"]), "only|0");
    }

    #[test]
    fn quote_numeric_char() {
        assert_eq!(printf(&["%d", "'A"]), "65");
    }

    #[test]
    fn dash_v_assigns_variable() {
        let mut state = ShellState::default();
        let args: Vec<String> = vec!["-v".into(), "OUT".into(), "%d".into(), "7".into()];
        let out = run(&mut state, &args);
        assert_eq!(out.stdout, "");
        assert_eq!(state.vars.value("OUT"), Some("7"));
    }

    #[test]
    fn percent_q_quotes() {
        assert_eq!(printf(&["%q", "a b"]), "'a b'");
        assert_eq!(printf(&["%q", "plain"]), "plain");
    }
}
