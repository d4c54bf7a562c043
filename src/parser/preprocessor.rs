//! Source preprocessing ahead of the tokenizer.
//!
//! Turns raw source into the form the lexer wants, all quote-aware:
//! joins `\`-newline continuations, strips trailing `\r`, erases comments
//! in place (spaces, so offsets survive), and lifts here-document bodies
//! out of the text into a queue the grammar drains in operator order.
//! A source that ends with an open heredoc fails here, with the line the
//! heredoc started on.
//!
//! Also answers "is this buffer a complete unit of input" for the
//! interactive reader's continuation prompt.

use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessError {
    pub message: String,
    pub line: usize,
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for PreprocessError {}

/// One heredoc body lifted out of the source, in `<<` operator order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeredocBody {
    pub body: String,
    /// Quoted delimiter: the body is literal, no expansion.
    pub quoted: bool,
}

/// Preprocessed source: code text with heredoc bodies removed, plus the
/// bodies themselves.
#[derive(Debug, Clone, Default)]
pub struct Prepared {
    pub text: String,
    pub heredocs: VecDeque<HeredocBody>,
}

/// A heredoc opener found while scanning a code line.
struct Opener {
    delimiter: String,
    quoted: bool,
    strip_tabs: bool,
    line: usize,
}

/// Scan one code line for `<<WORD` / `<<-WORD` openers, skipping quoted
/// regions, comments, and `<<<` herestrings. Returns openers in the order
/// their bodies will follow.
fn scan_openers(line: &str, line_no: usize) -> Vec<Opener> {
    let mut found = Vec::new();
    let mut chars = line.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;
    let mut prev_space = true;

    while let Some(c) = chars.next() {
        match c {
            '\\' if !in_single => {
                chars.next();
                prev_space = false;
            }
            '\'' if !in_double => {
                in_single = !in_single;
                prev_space = false;
            }
            '"' if !in_single => {
                in_double = !in_double;
                prev_space = false;
            }
            '#' if !in_single && !in_double && prev_space => break,
            '<' if !in_single && !in_double && chars.peek() == Some(&'<') => {
                chars.next();
                if chars.peek() == Some(&'<') {
                    chars.next();
                    prev_space = false;
                    continue;
                }
                let strip_tabs = chars.peek() == Some(&'-');
                if strip_tabs {
                    chars.next();
                }
                while matches!(chars.peek(), Some(' ') | Some('\t')) {
                    chars.next();
                }
                let quote = match chars.peek() {
                    Some(&q @ ('\'' | '"')) => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut delimiter = String::new();
                while let Some(&ch) = chars.peek() {
                    if let Some(q) = quote {
                        if ch == q {
                            chars.next();
                            break;
                        }
                    } else if !ch.is_alphanumeric() && ch != '_' && ch != '-' && ch != '\\' {
                        break;
                    }
                    delimiter.push(ch);
                    chars.next();
                }
                let delimiter = delimiter.replace('\\', "");
                if !delimiter.is_empty() {
                    found.push(Opener {
                        delimiter,
                        quoted: quote.is_some(),
                        strip_tabs,
                        line: line_no,
                    });
                }
                prev_space = false;
            }
            c => prev_space = c.is_whitespace() || matches!(c, ';' | '|' | '&' | '(' | ')'),
        }
    }
    found
}

/// Erase a comment in place: from an unquoted `#` at a word boundary to
/// end of line, overwritten with spaces so later columns stay put.
fn erase_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;
    let mut prev_space = true;

    while let Some(c) = chars.next() {
        match c {
            '\\' if !in_single => {
                out.push(c);
                if let Some(&n) = chars.peek() {
                    out.push(n);
                    chars.next();
                }
                prev_space = false;
            }
            '\'' if !in_double => {
                in_single = !in_single;
                out.push(c);
                prev_space = false;
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(c);
                prev_space = false;
            }
            '#' if !in_single && !in_double && prev_space => {
                out.push(' ');
                for _ in chars.by_ref() {
                    out.push(' ');
                }
                break;
            }
            c => {
                prev_space = c.is_whitespace() || matches!(c, ';' | '|' | '&' | '(' | ')');
                out.push(c);
            }
        }
    }
    out
}

/// Join `\`-newline continuations outside single quotes and outside
/// heredoc bodies. Heredoc body lines must pass through untouched, so
/// this runs per-line during [`prepare`], not as a blind global pass.
fn ends_with_continuation(line: &str) -> bool {
    let mut backslashes = 0;
    for c in line.chars().rev() {
        if c == '\\' {
            backslashes += 1;
        } else {
            break;
        }
    }
    backslashes % 2 == 1
}

/// Preprocess `source` into lexable text plus its heredoc bodies.
pub fn prepare(source: &str) -> Result<Prepared, PreprocessError> {
    let mut text_lines: Vec<String> = Vec::new();
    let mut heredocs: VecDeque<HeredocBody> = VecDeque::new();
    let mut open: VecDeque<(Opener, String)> = VecDeque::new();
    let mut joined = String::new();

    for (idx, raw_line) in source.split('\n').enumerate() {
        let line_no = idx + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);

        // Inside a heredoc body: collect until the delimiter line.
        if let Some((opener, _)) = open.front() {
            let candidate = if opener.strip_tabs {
                line.trim_start_matches('\t')
            } else {
                line
            };
            if candidate.trim_end() == opener.delimiter {
                let (opener, body) = open.pop_front().unwrap();
                heredocs.push_back(HeredocBody {
                    body,
                    quoted: opener.quoted,
                });
                continue;
            }
            let (opener, body) = open.front_mut().unwrap();
            let content = if opener.strip_tabs {
                line.trim_start_matches('\t')
            } else {
                line
            };
            body.push_str(content);
            body.push('\n');
            continue;
        }

        // Code line: accumulate continuations before scanning.
        if ends_with_continuation(line) && !line_in_single_quotes(&joined, line) {
            joined.push_str(&line[..line.len() - 1]);
            continue;
        }
        joined.push_str(line);
        let code_line = erase_comment(&joined);
        joined.clear();

        for opener in scan_openers(&code_line, line_no) {
            open.push_back((opener, String::new()));
        }
        text_lines.push(code_line);
    }

    if !joined.is_empty() {
        text_lines.push(erase_comment(&joined));
    }

    if let Some((opener, _)) = open.front() {
        return Err(PreprocessError {
            message: format!("unterminated heredoc (delimiter `{}')", opener.delimiter),
            line: opener.line,
        });
    }

    Ok(Prepared {
        text: text_lines.join("\n"),
        heredocs,
    })
}

/// A trailing backslash inside an unterminated single-quoted string is a
/// literal character, not a continuation.
fn line_in_single_quotes(pending: &str, line: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = pending.chars().chain(line.chars()).peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if !in_single => {
                chars.next();
            }
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            _ => {}
        }
    }
    in_single
}

// ---------------------------------------------------------------------------
// Completeness (interactive continuation)
// ---------------------------------------------------------------------------

/// Why a buffer isn't complete yet; the interactive reader keeps prompting
/// while any of these hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incomplete {
    SingleQuote,
    DoubleQuote,
    Heredoc,
    Parens,
    Braces,
    Keyword,
    TrailingBackslash,
    TrailingOperator,
}

/// Decide whether `source` is a complete input unit. Conservative in the
/// right direction: an over-eager "complete" becomes a visible parse
/// error, an over-eager "incomplete" traps the user at continuation
/// prompts, so keyword tracking only counts openers at command position.
pub fn input_completeness(source: &str) -> Result<(), Incomplete> {
    let mut in_single = false;
    let mut in_double = false;
    let mut paren_depth: i32 = 0;
    let mut brace_depth: i32 = 0;
    let mut keyword_depth: i32 = 0;
    let mut pending_heredocs: usize = 0;
    let mut at_command_position = true;
    let mut last_meaningful: Option<char> = None;
    let mut word = String::new();
    let mut trailing_backslash = false;

    let mut flush_word = |word: &mut String, keyword_depth: &mut i32, at_cmd: bool| {
        if at_cmd {
            match word.as_str() {
                "if" | "for" | "while" | "until" | "case" => *keyword_depth += 1,
                "fi" | "done" | "esac" => *keyword_depth -= 1,
                _ => {}
            }
        }
        word.clear();
    };

    let mut lines = source.split('\n').peekable();
    while let Some(line) = lines.next() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if pending_heredocs > 0 {
            let trimmed = line.trim_start_matches('\t');
            if !trimmed.is_empty() && heredoc_delimiters(source).contains(&trimmed.to_string()) {
                pending_heredocs -= 1;
            }
            continue;
        }

        let mut chars = line.chars().peekable();
        trailing_backslash = false;

        while let Some(c) = chars.next() {
            if in_single {
                if c == '\'' {
                    in_single = false;
                }
                continue;
            }
            if in_double {
                match c {
                    '\\' => {
                        chars.next();
                    }
                    '"' => in_double = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '\\' => {
                    if chars.peek().is_none() {
                        trailing_backslash = true;
                    } else {
                        chars.next();
                    }
                    at_command_position = false;
                }
                '\'' => {
                    in_single = true;
                    at_command_position = false;
                }
                '"' => {
                    in_double = true;
                    at_command_position = false;
                }
                '#' if word.is_empty() && last_meaningful.map_or(true, |l| l != '$') => {
                    break;
                }
                '(' => {
                    paren_depth += 1;
                    flush_word(&mut word, &mut keyword_depth, at_command_position);
                    at_command_position = true;
                }
                ')' => {
                    paren_depth -= 1;
                    flush_word(&mut word, &mut keyword_depth, at_command_position);
                    at_command_position = false;
                }
                '{' if word.is_empty() && at_command_position => {
                    brace_depth += 1;
                    at_command_position = true;
                }
                '}' if word.is_empty() && brace_depth > 0 => {
                    brace_depth -= 1;
                    at_command_position = false;
                }
                ';' | '&' | '|' => {
                    flush_word(&mut word, &mut keyword_depth, at_command_position);
                    at_command_position = true;
                    last_meaningful = Some(c);
                    continue;
                }
                '<' if chars.peek() == Some(&'<') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                    } else {
                        pending_heredocs += 1;
                        while matches!(chars.peek(), Some('-') | Some(' ') | Some('\t')) {
                            chars.next();
                        }
                        while let Some(&ch) = chars.peek() {
                            if ch.is_alphanumeric() || matches!(ch, '_' | '-' | '\'' | '"') {
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                    at_command_position = false;
                }
                c if c.is_whitespace() => {
                    let was_keyword_opener = matches!(
                        word.as_str(),
                        "if" | "for" | "while" | "until" | "case" | "then" | "do" | "else" | "elif"
                    );
                    flush_word(&mut word, &mut keyword_depth, at_command_position);
                    at_command_position = was_keyword_opener;
                }
                c => {
                    word.push(c);
                    last_meaningful = Some(c);
                }
            }
        }

        flush_word(&mut word, &mut keyword_depth, at_command_position);
        if lines.peek().is_some() {
            at_command_position = true;
        }
    }

    if in_single {
        return Err(Incomplete::SingleQuote);
    }
    if in_double {
        return Err(Incomplete::DoubleQuote);
    }
    if pending_heredocs > 0 {
        return Err(Incomplete::Heredoc);
    }
    if trailing_backslash {
        return Err(Incomplete::TrailingBackslash);
    }
    if paren_depth > 0 {
        return Err(Incomplete::Parens);
    }
    if brace_depth > 0 {
        return Err(Incomplete::Braces);
    }
    if keyword_depth > 0 {
        return Err(Incomplete::Keyword);
    }
    match last_meaningful {
        Some('|') | Some('&') => {
            let trimmed = source.trim_end();
            if trimmed.ends_with("&&") || trimmed.ends_with("||") || trimmed.ends_with('|') {
                return Err(Incomplete::TrailingOperator);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn heredoc_delimiters(source: &str) -> Vec<String> {
    let mut delimiters = Vec::new();
    for (idx, line) in source.split('\n').enumerate() {
        for opener in scan_openers(line, idx + 1) {
            delimiters.push(opener.delimiter);
        }
    }
    delimiters
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let p = prepare("echo hello\necho world").unwrap();
        assert_eq!(p.text, "echo hello\necho world");
        assert!(p.heredocs.is_empty());
    }

    #[test]
    fn heredoc_body_is_lifted_out() {
        let p = prepare("cat <<EOF\nline one\nline two\nEOF\necho after").unwrap();
        assert_eq!(p.text, "cat <<EOF\necho after");
        assert_eq!(p.heredocs.len(), 1);
        assert_eq!(p.heredocs[0].body, "line one\nline two\n");
        assert!(!p.heredocs[0].quoted);
    }

    #[test]
    fn quoted_delimiter_marks_body_literal() {
        let p = prepare("cat <<'EOF'\n$HOME\nEOF").unwrap();
        assert!(p.heredocs[0].quoted);
        assert_eq!(p.heredocs[0].body, "$HOME\n");
    }

    #[test]
    fn dash_heredoc_strips_leading_tabs() {
        let p = prepare("cat <<-EOF\n\tindented\n\tEOF").unwrap();
        assert_eq!(p.heredocs[0].body, "indented\n");
    }

    #[test]
    fn two_heredocs_queue_in_operator_order() {
        let p = prepare("cat <<A <<B\nfirst\nA\nsecond\nB").unwrap();
        assert_eq!(p.heredocs.len(), 2);
        assert_eq!(p.heredocs[0].body, "first\n");
        assert_eq!(p.heredocs[1].body, "second\n");
    }

    #[test]
    fn unterminated_heredoc_is_an_error() {
        let err = prepare("cat <<EOF\nno end").unwrap_err();
        assert!(err.message.contains("unterminated heredoc"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn herestring_is_not_a_heredoc() {
        let p = prepare("cat <<< hello").unwrap();
        assert!(p.heredocs.is_empty());
    }

    #[test]
    fn comments_erase_to_spaces() {
        let p = prepare("echo hi # trailing words").unwrap();
        assert!(p.text.starts_with("echo hi"));
        assert!(!p.text.contains("trailing"));
        assert_eq!(p.text.len(), "echo hi # trailing words".len());
    }

    #[test]
    fn hash_inside_quotes_is_not_a_comment() {
        let p = prepare("echo 'a # b'").unwrap();
        assert_eq!(p.text, "echo 'a # b'");
    }

    #[test]
    fn carriage_returns_are_stripped() {
        let p = prepare("echo hi\r\necho there\r").unwrap();
        assert_eq!(p.text, "echo hi\necho there");
    }

    #[test]
    fn continuation_joins_lines() {
        let p = prepare("echo one \\\ntwo").unwrap();
        assert_eq!(p.text, "echo one two");
    }

    #[test]
    fn complete_simple_command() {
        assert_eq!(input_completeness("echo hello"), Ok(()));
    }

    #[test]
    fn open_quotes_want_more() {
        assert_eq!(input_completeness("echo 'open"), Err(Incomplete::SingleQuote));
        assert_eq!(input_completeness("echo \"open"), Err(Incomplete::DoubleQuote));
    }

    #[test]
    fn dangling_keywords_want_more() {
        assert_eq!(
            input_completeness("if true; then echo hi"),
            Err(Incomplete::Keyword)
        );
        assert_eq!(input_completeness("if true; then echo hi; fi"), Ok(()));
        assert_eq!(
            input_completeness("for i in 1 2 3; do echo $i"),
            Err(Incomplete::Keyword)
        );
    }

    #[test]
    fn open_heredoc_wants_more() {
        assert_eq!(input_completeness("cat <<EOF\nbody"), Err(Incomplete::Heredoc));
        assert_eq!(input_completeness("cat <<EOF\nbody\nEOF"), Ok(()));
    }

    #[test]
    fn trailing_operator_wants_more() {
        assert_eq!(input_completeness("true &&"), Err(Incomplete::TrailingOperator));
        assert_eq!(input_completeness("echo one \\"), Err(Incomplete::TrailingBackslash));
        assert_eq!(input_completeness("sleep 1 &"), Ok(()));
    }

    #[test]
    fn open_subshell_wants_more() {
        assert_eq!(input_completeness("(echo hi"), Err(Incomplete::Parens));
        assert_eq!(input_completeness("(echo hi)"), Ok(()));
    }
}
