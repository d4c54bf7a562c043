//! Glob pattern matching.
//!
//! One translator from shell patterns (`*`, `?`, `[...]`, backslash
//! escapes) to regexes, shared by `case` arms, `[[ == ]]`, and the
//! `${x#pat}` / `${x/pat/repl}` parameter operations. Greediness is a
//! parameter because prefix/suffix stripping needs both shortest and
//! longest match against the same pattern.

use regex_lite::Regex;

/// Translate a shell pattern to an (unanchored) regex fragment.
/// `longest` picks greedy `*`; shortest-match callers get lazy `*?`.
pub fn pattern_to_regex(pattern: &str, longest: bool) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let star = if longest { ".*" } else { ".*?" };
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(star),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => push_literal(&mut out, escaped),
                None => push_literal(&mut out, '\\'),
            },
            '[' => {
                // Character class: copy through the matching ], converting
                // leading ! to ^. An unclosed [ is a literal bracket.
                let mut class = String::new();
                let mut closed = false;
                let mut first = true;
                for cc in chars.by_ref() {
                    if cc == ']' && !(first && class.is_empty()) {
                        closed = true;
                        break;
                    }
                    if first && (cc == '!' || cc == '^') {
                        class.push('^');
                    } else {
                        match cc {
                            '\\' => class.push_str("\\\\"),
                            c => class.push(c),
                        }
                    }
                    first = false;
                }
                if closed {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    push_literal(&mut out, '[');
                    // The swallowed class text was literal after all.
                    for cc in class.chars() {
                        push_literal(&mut out, cc);
                    }
                }
            }
            c => push_literal(&mut out, c),
        }
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if "\\.+*?()|[]{}^$#&-~".contains(c) {
        out.push('\\');
    }
    out.push(c);
}

/// Whole-string pattern match, as `case` and `[[ == ]]` need.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    let regex = format!("^{}$", pattern_to_regex(pattern, true));
    Regex::new(&regex)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// Does the text contain live (unescaped) glob characters?
pub fn has_glob_chars(text: &str) -> bool {
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// Backslash-escape glob characters in text from a quoted source, so it
/// participates in a pattern literally.
pub fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Remove glob escapes, for a pattern kept as a literal word after
/// matching nothing.
pub fn unescape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n) => out.push(n),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `${x#pat}` / `${x##pat}`: strip the shortest/longest matching prefix.
pub fn strip_prefix(value: &str, pattern: &str, longest: bool) -> String {
    let regex = format!("^{}", pattern_to_regex(pattern, longest));
    match Regex::new(&regex) {
        Ok(re) => match re.find(value) {
            Some(m) if m.start() == 0 => value[m.end()..].to_string(),
            _ => value.to_string(),
        },
        Err(_) => value.to_string(),
    }
}

/// `${x%pat}` / `${x%%pat}`: strip the shortest/longest matching suffix.
pub fn strip_suffix(value: &str, pattern: &str, longest: bool) -> String {
    // Anchor at the end and try match start positions: left-to-right for
    // the longest suffix, right-to-left for the shortest.
    let regex = format!("^{}$", pattern_to_regex(pattern, true));
    let Ok(re) = Regex::new(&regex) else {
        return value.to_string();
    };
    let starts: Vec<usize> = {
        let mut v: Vec<usize> = value
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(value.len()))
            .collect();
        if !longest {
            v.reverse();
        }
        v
    };
    for start in starts {
        if re.is_match(&value[start..]) {
            return value[..start].to_string();
        }
    }
    value.to_string()
}

/// `${x/pat/repl}` / `${x//pat/repl}`.
pub fn replace(value: &str, pattern: &str, replacement: &str, all: bool) -> String {
    let regex = pattern_to_regex(pattern, true);
    let Ok(re) = Regex::new(&regex) else {
        return value.to_string();
    };
    // `$` would read as a capture-group reference in the replacement.
    let replacement = replacement.replace('$', "$$");
    if all {
        re.replace_all(value, replacement.as_str()).to_string()
    } else {
        re.replace(value, replacement.as_str()).to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_question() {
        assert!(matches_pattern("hello", "h*"));
        assert!(matches_pattern("hello", "h?llo"));
        assert!(!matches_pattern("hello", "h?lo"));
        assert!(matches_pattern("anything", "*"));
        assert!(matches_pattern("", "*"));
    }

    #[test]
    fn character_classes() {
        assert!(matches_pattern("cat", "[bc]at"));
        assert!(!matches_pattern("rat", "[bc]at"));
        assert!(matches_pattern("dat", "[!bc]at"));
        assert!(matches_pattern("x3", "x[0-9]"));
    }

    #[test]
    fn literal_dots_do_not_match_everything() {
        assert!(matches_pattern("a.b", "a.b"));
        assert!(!matches_pattern("axb", "a.b"));
    }

    #[test]
    fn escaped_star_is_literal() {
        assert!(matches_pattern("a*b", "a\\*b"));
        assert!(!matches_pattern("axb", "a\\*b"));
    }

    #[test]
    fn glob_char_detection() {
        assert!(has_glob_chars("*.txt"));
        assert!(has_glob_chars("a?b"));
        assert!(!has_glob_chars("plain"));
        assert!(!has_glob_chars("a\\*b"));
    }

    #[test]
    fn escape_round_trip() {
        let escaped = escape_glob("a*b?c");
        assert!(!has_glob_chars(&escaped));
        assert_eq!(unescape_glob(&escaped), "a*b?c");
    }

    #[test]
    fn prefix_strip_shortest_vs_longest() {
        assert_eq!(strip_prefix("a/b/c", "*/", false), "b/c");
        assert_eq!(strip_prefix("a/b/c", "*/", true), "c");
        assert_eq!(strip_prefix("abc", "x", false), "abc");
    }

    #[test]
    fn suffix_strip_shortest_vs_longest() {
        assert_eq!(strip_suffix("a.tar.gz", ".*", false), "a.tar");
        assert_eq!(strip_suffix("a.tar.gz", ".*", true), "a");
        assert_eq!(strip_suffix("abc", "x", true), "abc");
    }

    #[test]
    fn replace_first_and_all() {
        assert_eq!(replace("aaa", "a", "b", false), "baa");
        assert_eq!(replace("aaa", "a", "b", true), "bbb");
        assert_eq!(replace("hello", "l*o", "!", false), "he!");
    }

    #[test]
    fn replacement_dollars_stay_literal() {
        assert_eq!(replace("x", "x", "$5", false), "$5");
    }
}
