//! test / [ - evaluate conditional expressions.
//!
//! Classic POSIX `test` over already-expanded arguments: unary string
//! and file operators, binary string/numeric/file comparisons, `!`,
//! `-a`/`-o`, and `( ... )` grouping, with the 0/1/2/3-argument short
//! forms special-cased the way every implementation must. The file
//! predicates hit the real filesystem and are shared with `[[ ]]`
//! through [`unary_test`] and [`binary_file_test`].

use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::Path;

use crate::ast::CondBinaryOp;
use crate::interpreter::state::ShellState;
use super::BuiltinOutput;

/// Evaluate one unary operator (`-f`, `-z`, `-v`, ...) against the real
/// filesystem / state. Unknown operators are false.
pub fn unary_test(state: &ShellState, op: &str, operand: &str) -> bool {
    let p = Path::new(operand);
    match op {
        "-z" => operand.is_empty(),
        "-n" => !operand.is_empty(),
        "-v" => state.vars.is_set(operand),
        "-o" => state.options.get(operand).unwrap_or(false),
        "-t" => operand
            .parse::<i32>()
            .map(|fd| unsafe { libc::isatty(fd) == 1 })
            .unwrap_or(false),
        "-e" | "-a" => p.exists(),
        "-f" => p.is_file(),
        "-d" => p.is_dir(),
        "-L" | "-h" => p
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false),
        "-s" => p.metadata().map(|m| m.len() > 0).unwrap_or(false),
        "-r" => access(operand, libc::R_OK),
        "-w" => access(operand, libc::W_OK),
        "-x" => access(operand, libc::X_OK),
        "-k" => mode_bit(p, 0o1000),
        "-g" => mode_bit(p, 0o2000),
        "-u" => mode_bit(p, 0o4000),
        "-O" => p
            .metadata()
            .map(|m| m.uid() == unsafe { libc::geteuid() })
            .unwrap_or(false),
        "-G" => p
            .metadata()
            .map(|m| m.gid() == unsafe { libc::getegid() })
            .unwrap_or(false),
        "-b" => file_type(p, |t| t.is_block_device()),
        "-c" => file_type(p, |t| t.is_char_device()),
        "-p" => file_type(p, |t| t.is_fifo()),
        "-S" => file_type(p, |t| t.is_socket()),
        _ => false,
    }
}

fn access(path: &str, mode: libc::c_int) -> bool {
    let Ok(c_path) = std::ffi::CString::new(path) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}

fn mode_bit(p: &Path, bit: u32) -> bool {
    p.metadata()
        .map(|m| m.permissions().mode() & bit != 0)
        .unwrap_or(false)
}

fn file_type(p: &Path, pred: impl Fn(&std::fs::FileType) -> bool) -> bool {
    p.metadata().map(|m| pred(&m.file_type())).unwrap_or(false)
}

/// `-nt` / `-ot` / `-ef` comparisons, shared with `[[ ]]`.
pub fn binary_file_test(op: CondBinaryOp, left: &str, right: &str) -> bool {
    let lm = Path::new(left).metadata();
    let rm = Path::new(right).metadata();
    match op {
        CondBinaryOp::NewerThan => match (&lm, &rm) {
            (Ok(l), Ok(r)) => l.mtime() > r.mtime(),
            (Ok(_), Err(_)) => true,
            _ => false,
        },
        CondBinaryOp::OlderThan => match (&lm, &rm) {
            (Ok(l), Ok(r)) => l.mtime() < r.mtime(),
            (Err(_), Ok(_)) => true,
            _ => false,
        },
        CondBinaryOp::SameFile => match (&lm, &rm) {
            (Ok(l), Ok(r)) => l.dev() == r.dev() && l.ino() == r.ino(),
            _ => false,
        },
        _ => false,
    }
}

fn is_unary_op(text: &str) -> bool {
    text.len() == 2
        && text.starts_with('-')
        && matches!(
            text.as_bytes()[1],
            b'z' | b'n' | b'v' | b'o' | b't' | b'e' | b'a' | b'f' | b'd' | b'L' | b'h' | b's'
                | b'r' | b'w' | b'x' | b'k' | b'g' | b'u' | b'O' | b'G' | b'b' | b'c' | b'p'
                | b'S'
        )
}

fn is_binary_op(text: &str) -> bool {
    matches!(
        text,
        "=" | "==" | "!=" | "<" | ">" | "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" | "-nt"
            | "-ot" | "-ef"
    )
}

fn apply_binary(op: &str, left: &str, right: &str) -> Result<bool, String> {
    match op {
        "=" | "==" => return Ok(left == right),
        "!=" => return Ok(left != right),
        "<" => return Ok(left < right),
        ">" => return Ok(left > right),
        "-nt" => return Ok(binary_file_test(CondBinaryOp::NewerThan, left, right)),
        "-ot" => return Ok(binary_file_test(CondBinaryOp::OlderThan, left, right)),
        "-ef" => return Ok(binary_file_test(CondBinaryOp::SameFile, left, right)),
        _ => {}
    }
    let l: i64 = left
        .trim()
        .parse()
        .map_err(|_| format!("{}: integer expression expected", left))?;
    let r: i64 = right
        .trim()
        .parse()
        .map_err(|_| format!("{}: integer expression expected", right))?;
    Ok(match op {
        "-eq" => l == r,
        "-ne" => l != r,
        "-lt" => l < r,
        "-le" => l <= r,
        "-gt" => l > r,
        "-ge" => l >= r,
        other => return Err(format!("{}: unknown operator", other)),
    })
}

/// Recursive-descent evaluation over the argument list for the general
/// (4+ argument) form with `-a`/`-o` and parentheses.
struct Parser<'a> {
    args: &'a [String],
    pos: usize,
    state: &'a ShellState,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.args.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Option<&'a str> {
        let arg = self.peek();
        if arg.is_some() {
            self.pos += 1;
        }
        arg
    }

    fn or_expr(&mut self) -> Result<bool, String> {
        let mut value = self.and_expr()?;
        while self.peek() == Some("-o") {
            self.next();
            let rhs = self.and_expr()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and_expr(&mut self) -> Result<bool, String> {
        let mut value = self.not_expr()?;
        while self.peek() == Some("-a") {
            self.next();
            let rhs = self.not_expr()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn not_expr(&mut self) -> Result<bool, String> {
        if self.peek() == Some("!") {
            self.next();
            return Ok(!self.not_expr()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool, String> {
        let Some(arg) = self.next() else {
            return Err("argument expected".to_string());
        };
        if arg == "(" {
            let value = self.or_expr()?;
            return match self.next() {
                Some(")") => Ok(value),
                _ => Err("`)' expected".to_string()),
            };
        }
        if is_unary_op(arg) && self.peek().is_some() {
            let operand = self.next().unwrap();
            return Ok(unary_test(self.state, arg, operand));
        }
        if let Some(op) = self.peek() {
            if is_binary_op(op) {
                let op = self.next().unwrap();
                let Some(right) = self.next() else {
                    return Err(format!("{}: argument expected", op));
                };
                return apply_binary(op, arg, right);
            }
        }
        Ok(!arg.is_empty())
    }
}

pub fn run(state: &ShellState, name: &str, args: &[String]) -> BuiltinOutput {
    let mut args = args.to_vec();
    if name == "[" {
        match args.last().map(String::as_str) {
            Some("]") => {
                args.pop();
            }
            _ => return BuiltinOutput::fail("cjsh: [: missing `]'\n", 2),
        }
    }

    let verdict = match args.len() {
        0 => Ok(false),
        1 => Ok(!args[0].is_empty()),
        2 if args[0] == "!" => Ok(args[1].is_empty()),
        2 if is_unary_op(&args[0]) => Ok(unary_test(state, &args[0], &args[1])),
        3 if is_binary_op(&args[1]) => apply_binary(&args[1], &args[0], &args[2]),
        _ => {
            let mut parser = Parser {
                args: &args,
                pos: 0,
                state,
            };
            match parser.or_expr() {
                Ok(v) if parser.pos == args.len() => Ok(v),
                Ok(_) => Err("too many arguments".to_string()),
                Err(e) => Err(e),
            }
        }
    };

    match verdict {
        Ok(true) => BuiltinOutput::ok(),
        Ok(false) => BuiltinOutput::status(1),
        Err(message) => BuiltinOutput::fail(format!("cjsh: {}: {}\n", name, message), 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(args: &[&str]) -> i32 {
        let state = ShellState::default();
        run(
            &state,
            "test",
            &args.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
        .status
    }

    #[test]
    fn empty_and_nonempty_strings() {
        assert_eq!(status(&[]), 1);
        assert_eq!(status(&["x"]), 0);
        assert_eq!(status(&[""]), 1);
        assert_eq!(status(&["-z", ""]), 0);
        assert_eq!(status(&["-n", "x"]), 0);
    }

    #[test]
    fn string_comparisons() {
        assert_eq!(status(&["a", "=", "a"]), 0);
        assert_eq!(status(&["a", "!=", "b"]), 0);
        assert_eq!(status(&["a", "=", "b"]), 1);
    }

    #[test]
    fn numeric_comparisons() {
        assert_eq!(status(&["3", "-lt", "5"]), 0);
        assert_eq!(status(&["5", "-le", "5"]), 0);
        assert_eq!(status(&["5", "-gt", "5"]), 1);
        assert_eq!(status(&["7", "-eq", "7"]), 0);
    }

    #[test]
    fn non_numeric_operand_is_usage_error() {
        assert_eq!(status(&["x", "-eq", "3"]), 2);
    }

    #[test]
    fn negation_and_connectives() {
        assert_eq!(status(&["!", ""]), 0);
        assert_eq!(status(&["a", "-a", "b"]), 0);
        assert_eq!(status(&["a", "-a", ""]), 1);
        assert_eq!(status(&["", "-o", "b"]), 0);
    }

    #[test]
    fn parenthesized_group() {
        assert_eq!(status(&["(", "a", "=", "a", ")"]), 0);
    }

    #[test]
    fn file_predicates() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "content").unwrap();
        let dir_s = dir.path().to_string_lossy().to_string();
        let file_s = file.to_string_lossy().to_string();
        assert_eq!(status(&["-d", &dir_s]), 0);
        assert_eq!(status(&["-f", &file_s]), 0);
        assert_eq!(status(&["-s", &file_s]), 0);
        assert_eq!(status(&["-e", "/definitely/not/here"]), 1);
        assert_eq!(status(&["-f", &dir_s]), 1);
    }

    #[test]
    fn bracket_requires_closer() {
        let state = ShellState::default();
        assert_eq!(run(&state, "[", &["x".to_string()]).status, 2);
        assert_eq!(
            run(&state, "[", &["x".to_string(), "]".to_string()]).status,
            0
        );
    }

    #[test]
    fn dash_v_checks_variables() {
        let mut state = ShellState::default();
        state.vars.set("SET", "x");
        assert!(unary_test(&state, "-v", "SET"));
        assert!(!unary_test(&state, "-v", "UNSET"));
    }
}
