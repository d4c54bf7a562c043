//! echo - write arguments to standard output.
//!
//! `-n` drops the trailing newline, `-e` interprets backslash escapes,
//! `-E` turns them back off. An argument that isn't a pure run of those
//! flag letters prints literally.

use super::BuiltinOutput;

/// Interpret `echo -e` escapes. Returns the text plus whether `\c`
/// truncated output (which also suppresses the newline).
pub fn interpret_escapes(input: &str) -> (String, bool) {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('c') => return (out, true),
            Some('e') | Some('E') => out.push('\x1b'),
            Some('f') => out.push('\x0c'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some('0') => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 {
                    match chars.peek() {
                        Some(d) if d.is_digit(8) => {
                            value = value * 8 + d.to_digit(8).unwrap();
                            chars.next();
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                if let Some(ch) = char::from_u32(value) {
                    out.push(ch);
                }
            }
            Some('x') => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 2 {
                    match chars.peek() {
                        Some(d) if d.is_ascii_hexdigit() => {
                            value = value * 16 + d.to_digit(16).unwrap();
                            chars.next();
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                if digits == 0 {
                    out.push_str("\\x");
                } else if let Some(ch) = char::from_u32(value) {
                    out.push(ch);
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    (out, false)
}

pub fn run(args: &[String]) -> BuiltinOutput {
    let mut newline = true;
    let mut escapes = false;
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];
        if arg.len() < 2 || !arg.starts_with('-') {
            break;
        }
        let flags = &arg[1..];
        if !flags.chars().all(|c| matches!(c, 'n' | 'e' | 'E')) {
            break;
        }
        for c in flags.chars() {
            match c {
                'n' => newline = false,
                'e' => escapes = true,
                'E' => escapes = false,
                _ => unreachable!(),
            }
        }
        i += 1;
    }

    let joined = args[i..].join(" ");
    let (text, truncated) = if escapes {
        interpret_escapes(&joined)
    } else {
        (joined, false)
    };

    let mut stdout = text;
    if newline && !truncated {
        stdout.push('\n');
    }
    BuiltinOutput::out(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(args: &[&str]) -> String {
        run(&args.iter().map(|s| s.to_string()).collect::<Vec<_>>()).stdout
    }

    #[test]
    fn joins_arguments_with_spaces() {
        assert_eq!(echo(&["hello", "world"]), "hello world\n");
    }

    #[test]
    fn dash_n_suppresses_newline() {
        assert_eq!(echo(&["-n", "hi"]), "hi");
    }

    #[test]
    fn dash_e_enables_escapes() {
        assert_eq!(echo(&["-e", "a\\tb"]), "a\tb\n");
        assert_eq!(echo(&["a\\tb"]), "a\\tb\n");
    }

    #[test]
    fn backslash_c_truncates() {
        assert_eq!(echo(&["-e", "ab\\cdef"]), "ab");
    }

    #[test]
    fn unknown_flag_run_is_literal() {
        assert_eq!(echo(&["-x", "hi"]), "-x hi\n");
    }

    #[test]
    fn combined_flags() {
        assert_eq!(echo(&["-ne", "a\\tb"]), "a\tb");
    }
}
