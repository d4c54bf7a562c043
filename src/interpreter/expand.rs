//! Word expansion.
//!
//! The full pipeline for one word, in POSIX order: brace expansion,
//! tilde expansion, parameter expansion, command substitution,
//! arithmetic expansion, IFS field splitting, pathname expansion, quote
//! removal. Quote provenance from the parser drives the two decisions
//! that matter: only text from unquoted expansions may field-split, and
//! only unquoted glob characters are live (quoted ones are escaped in a
//! parallel pattern string kept alongside every span).
//!
//! Command substitution needs the evaluator, which needs expansion, so
//! the evaluator passes itself in as callbacks on [`Expansion`].

use crate::ast::{BraceItem, ParamExpr, ParamOp, Script, Word, WordPiece};
use crate::interpreter::arith_eval;
use crate::interpreter::errors::ShellError;
use crate::interpreter::pattern;
use crate::interpreter::state::{Limits, ShellState};

/// Output of a command substitution: captured stdout and its status.
pub struct Captured {
    pub stdout: String,
    pub status: i32,
}

pub type CmdSubFn<'a> = dyn Fn(&mut ShellState, &Script) -> Captured + 'a;
pub type ProcSubFn<'a> =
    dyn Fn(&mut ShellState, &Script, bool) -> Result<String, ShellError> + 'a;

/// Expansion context: limits plus the evaluator's substitution hooks.
pub struct Expansion<'a> {
    pub limits: &'a Limits,
    pub cmd_sub: Option<&'a CmdSubFn<'a>>,
    pub proc_sub: Option<&'a ProcSubFn<'a>>,
}

impl<'a> Expansion<'a> {
    pub fn new(limits: &'a Limits) -> Self {
        Self {
            limits,
            cmd_sub: None,
            proc_sub: None,
        }
    }
}

/// One expanded run of text, before field splitting. `pattern` mirrors
/// `value` with quoted glob characters escaped.
struct Span {
    value: String,
    pattern: String,
    splittable: bool,
    quoted: bool,
}

/// The piece stream for a word: spans, with hard field boundaries where
/// `"$@"` put them.
enum Piece {
    Span(Span),
    Break,
}

fn literal(value: String, quoted: bool) -> Piece {
    let pattern = if quoted {
        pattern::escape_glob(&value)
    } else {
        value.clone()
    };
    Piece::Span(Span {
        value,
        pattern,
        splittable: false,
        quoted,
    })
}

fn expanded(value: String, in_quotes: bool) -> Piece {
    let pattern = if in_quotes {
        pattern::escape_glob(&value)
    } else {
        value.clone()
    };
    Piece::Span(Span {
        value,
        pattern,
        splittable: !in_quotes,
        quoted: in_quotes,
    })
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Expand a word into argv fields: everything, including splitting and
/// pathname expansion.
pub fn expand_fields(
    state: &mut ShellState,
    exp: &Expansion,
    word: &Word,
) -> Result<Vec<String>, ShellError> {
    let mut fields = Vec::new();
    for braced in expand_braces(state, exp, word)? {
        let pieces = walk(state, exp, &braced.pieces, false)?;
        collect_fields(state, pieces, &mut fields);
    }
    Ok(fields)
}

/// Expand a word to one string: no splitting, no globbing. `"$@"` joins
/// with spaces, as in assignment context.
pub fn expand_string(
    state: &mut ShellState,
    exp: &Expansion,
    word: &Word,
) -> Result<String, ShellError> {
    let mut out = String::new();
    let mut first_alternative = true;
    for braced in expand_braces(state, exp, word)? {
        if !first_alternative {
            out.push(' ');
        }
        first_alternative = false;
        let pieces = walk(state, exp, &braced.pieces, false)?;
        let mut first = true;
        for piece in pieces {
            match piece {
                Piece::Span(span) => out.push_str(&span.value),
                Piece::Break => {
                    if !first {
                        out.push(' ');
                    }
                }
            }
            first = false;
        }
    }
    Ok(out)
}

/// Expand a word to a glob/`case` pattern: quoted parts contribute their
/// characters escaped, unquoted pattern characters stay live.
pub fn expand_pattern_text(
    state: &mut ShellState,
    exp: &Expansion,
    word: &Word,
) -> Result<String, ShellError> {
    let pieces = walk(state, exp, &word.pieces, false)?;
    let mut out = String::new();
    for piece in pieces {
        if let Piece::Span(span) = piece {
            out.push_str(&span.pattern);
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Brace expansion
// ---------------------------------------------------------------------------

fn expand_braces(
    state: &mut ShellState,
    exp: &Expansion,
    word: &Word,
) -> Result<Vec<Word>, ShellError> {
    if !word
        .pieces
        .iter()
        .any(|p| matches!(p, WordPiece::Brace(_)))
    {
        return Ok(vec![word.clone()]);
    }

    let mut alternatives: Vec<Vec<WordPiece>> = vec![Vec::new()];
    for piece in &word.pieces {
        match piece {
            WordPiece::Brace(items) => {
                let expansions = brace_alternatives(state, exp, items)?;
                let mut next = Vec::with_capacity(alternatives.len() * expansions.len());
                for prefix in &alternatives {
                    for alt in &expansions {
                        let mut combined = prefix.clone();
                        combined.extend(alt.iter().cloned());
                        next.push(combined);
                    }
                }
                alternatives = next;
            }
            other => {
                for alt in &mut alternatives {
                    alt.push(other.clone());
                }
            }
        }
    }

    Ok(alternatives
        .into_iter()
        .map(|pieces| Word { pieces })
        .collect())
}

fn brace_alternatives(
    state: &mut ShellState,
    exp: &Expansion,
    items: &[BraceItem],
) -> Result<Vec<Vec<WordPiece>>, ShellError> {
    let mut out = Vec::new();
    for item in items {
        match item {
            BraceItem::Word(word) => {
                // Items can nest further braces.
                for inner in expand_braces(state, exp, word)? {
                    out.push(inner.pieces);
                }
            }
            BraceItem::NumRange(a, b) => {
                let span = (a - b).abs();
                if span >= exp.limits.max_brace_elements {
                    // Too wide: keep the literal text, bounding memory.
                    out.push(vec![WordPiece::Bare(format!("{{{}..{}}}", a, b))]);
                    continue;
                }
                let step: i64 = if a <= b { 1 } else { -1 };
                let mut n = *a;
                loop {
                    out.push(vec![WordPiece::Bare(n.to_string())]);
                    if n == *b {
                        break;
                    }
                    n += step;
                }
            }
            BraceItem::CharRange(a, b) => {
                let (lo, hi) = (*a as u32, *b as u32);
                let range: Vec<u32> = if lo <= hi {
                    (lo..=hi).collect()
                } else {
                    (hi..=lo).rev().collect()
                };
                for code in range {
                    if let Some(c) = char::from_u32(code) {
                        out.push(vec![WordPiece::Bare(c.to_string())]);
                    }
                }
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Piece walking
// ---------------------------------------------------------------------------

fn walk(
    state: &mut ShellState,
    exp: &Expansion,
    input: &[WordPiece],
    in_quotes: bool,
) -> Result<Vec<Piece>, ShellError> {
    let mut pieces = Vec::new();
    walk_into(state, exp, input, in_quotes, &mut pieces)?;
    Ok(pieces)
}

fn walk_into(
    state: &mut ShellState,
    exp: &Expansion,
    input: &[WordPiece],
    in_quotes: bool,
    pieces: &mut Vec<Piece>,
) -> Result<(), ShellError> {
    for piece in input {
        match piece {
            WordPiece::Bare(text) => pieces.push(literal(text.clone(), in_quotes)),
            WordPiece::Quoted(text) => pieces.push(literal(text.clone(), true)),
            WordPiece::Double(inner) => walk_into(state, exp, inner, true, pieces)?,
            WordPiece::Tilde(text) => {
                pieces.push(literal(expand_tilde(state, text), in_quotes));
            }
            WordPiece::Param(param) => {
                expand_param(state, exp, param, in_quotes, pieces)?;
            }
            WordPiece::CmdSub(script) => {
                pieces.push(expanded(run_cmd_sub(state, exp, script), in_quotes));
            }
            WordPiece::ArithSub(expr) => {
                let value = arith_eval::eval(state, expr)?;
                pieces.push(expanded(value.to_string(), in_quotes));
            }
            WordPiece::ProcSub { script, write } => {
                if let Some(hook) = exp.proc_sub {
                    let path = hook(state, script, *write)?;
                    pieces.push(literal(path, true));
                }
                // Without a hook (highlight-time lookups) it vanishes.
            }
            WordPiece::Brace(items) => {
                // Braces inside quotes render literally.
                pieces.push(literal(render_brace(items), in_quotes));
            }
        }
    }
    Ok(())
}

fn render_brace(items: &[BraceItem]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match item {
            BraceItem::Word(word) => {
                for piece in &word.pieces {
                    if let WordPiece::Bare(text) | WordPiece::Quoted(text) = piece {
                        out.push_str(text);
                    }
                }
            }
            BraceItem::NumRange(a, b) => out.push_str(&format!("{}..{}", a, b)),
            BraceItem::CharRange(a, b) => out.push_str(&format!("{}..{}", a, b)),
        }
    }
    out.push('}');
    out
}

fn expand_tilde(state: &ShellState, text: &str) -> String {
    let user = &text[1..]; // strip '~'
    if user.is_empty() {
        return state
            .vars
            .value("HOME")
            .map(str::to_string)
            .unwrap_or_else(|| text.to_string());
    }
    // ~user: look the home directory up the portable way.
    #[cfg(unix)]
    {
        use std::ffi::CString;
        if let Ok(c_user) = CString::new(user) {
            let pw = unsafe { libc::getpwnam(c_user.as_ptr()) };
            if !pw.is_null() {
                let dir = unsafe { std::ffi::CStr::from_ptr((*pw).pw_dir) };
                if let Ok(dir) = dir.to_str() {
                    return dir.to_string();
                }
            }
        }
    }
    text.to_string()
}

fn run_cmd_sub(state: &mut ShellState, exp: &Expansion, script: &Script) -> String {
    let Some(hook) = exp.cmd_sub else {
        return String::new();
    };
    let captured = hook(state, script);
    state.last_status = captured.status;
    let mut out = captured.stdout;
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

// ---------------------------------------------------------------------------
// Parameter expansion
// ---------------------------------------------------------------------------

/// Scalar value of a special or ordinary parameter, if it has one.
fn special_value(state: &ShellState, name: &str) -> Option<String> {
    Some(match name {
        "?" => state.last_status.to_string(),
        "$" => std::process::id().to_string(),
        "#" => state.positional.len().to_string(),
        "!" => state.last_background_pid.to_string(),
        "0" => state.script_name.clone(),
        "-" => state.options.flag_string(),
        "_" => state.last_arg.clone(),
        "RANDOM" => (rand::random::<u16>() % 32768).to_string(),
        _ => return None,
    })
}

fn param_value(state: &ShellState, name: &str) -> Option<String> {
    if let Some(value) = special_value(state, name) {
        return Some(value);
    }
    if name.chars().all(|c| c.is_ascii_digit()) && name != "0" {
        let n: usize = name.parse().ok()?;
        return state.positional.get(n.wrapping_sub(1)).cloned();
    }
    if name == "@" || name == "*" {
        return Some(state.positional.join(" "));
    }
    state.vars.value(name).map(str::to_string)
}

fn param_is_set(state: &ShellState, name: &str) -> bool {
    param_value(state, name).is_some()
}

/// Names whose unset state never trips `set -u`.
fn nounset_exempt(name: &str) -> bool {
    matches!(name, "?" | "$" | "#" | "@" | "*" | "!" | "-" | "_" | "0")
        || name.chars().all(|c| c.is_ascii_digit())
}

fn expand_param(
    state: &mut ShellState,
    exp: &Expansion,
    param: &ParamExpr,
    in_quotes: bool,
    pieces: &mut Vec<Piece>,
) -> Result<(), ShellError> {
    let name = param.name.as_str();

    // `"$@"` keeps each positional its own field; `"$*"` joins into one.
    if matches!(param.op, ParamOp::Plain) && (name == "@" || name == "*") {
        if in_quotes && name == "@" {
            for (i, p) in state.positional.clone().into_iter().enumerate() {
                if i > 0 {
                    pieces.push(Piece::Break);
                }
                pieces.push(literal(p, true));
            }
            return Ok(());
        }
        let sep = if name == "*" {
            state.ifs().chars().next().map(String::from).unwrap_or_default()
        } else {
            " ".to_string()
        };
        let joined = state.positional.join(&sep);
        pieces.push(expanded(joined, in_quotes));
        return Ok(());
    }

    let current = param_value(state, name);

    let value: String = match &param.op {
        ParamOp::Plain => match current {
            Some(v) => v,
            None => {
                if state.options.nounset && !nounset_exempt(name) {
                    return Err(ShellError::expansion(
                        format!("{}: unbound variable", name),
                        1,
                    ));
                }
                String::new()
            }
        },

        ParamOp::Length => current.unwrap_or_default().chars().count().to_string(),

        ParamOp::Default { word, check_empty } => {
            if use_default(&current, *check_empty) {
                expand_string(state, exp, word)?
            } else {
                current.unwrap_or_default()
            }
        }

        ParamOp::Assign { word, check_empty } => {
            if use_default(&current, *check_empty) {
                let fallback = expand_string(state, exp, word)?;
                if !state.vars.set(name, fallback.clone()) {
                    return Err(ShellError::expansion(
                        format!("{}: readonly variable", name),
                        1,
                    ));
                }
                fallback
            } else {
                current.unwrap_or_default()
            }
        }

        ParamOp::Error { word, check_empty } => {
            if use_default(&current, *check_empty) {
                let message = match word {
                    Some(w) => expand_string(state, exp, w)?,
                    None => "parameter null or not set".to_string(),
                };
                return Err(ShellError::expansion(format!("{}: {}", name, message), 1));
            }
            current.unwrap_or_default()
        }

        ParamOp::Alternative { word, check_empty } => {
            if use_default(&current, *check_empty) {
                String::new()
            } else {
                expand_string(state, exp, word)?
            }
        }

        ParamOp::StripPrefix { pattern: pat, longest } => {
            let pat = expand_pattern_text(state, exp, pat)?;
            pattern::strip_prefix(&current.unwrap_or_default(), &pat, *longest)
        }

        ParamOp::StripSuffix { pattern: pat, longest } => {
            let pat = expand_pattern_text(state, exp, pat)?;
            pattern::strip_suffix(&current.unwrap_or_default(), &pat, *longest)
        }

        ParamOp::Replace {
            pattern: pat,
            replacement,
            all,
        } => {
            let pat = expand_pattern_text(state, exp, pat)?;
            let repl = match replacement {
                Some(w) => expand_string(state, exp, w)?,
                None => String::new(),
            };
            pattern::replace(&current.unwrap_or_default(), &pat, &repl, *all)
        }

        ParamOp::CaseConvert { upper, all } => {
            convert_case(&current.unwrap_or_default(), *upper, *all)
        }

        ParamOp::Indirect => {
            let target = current.unwrap_or_default();
            if target.is_empty() {
                String::new()
            } else {
                match param_value(state, &target) {
                    Some(v) => v,
                    None => {
                        if state.options.nounset && !nounset_exempt(&target) {
                            return Err(ShellError::expansion(
                                format!("{}: unbound variable", target),
                                1,
                            ));
                        }
                        String::new()
                    }
                }
            }
        }
    };

    pieces.push(expanded(value, in_quotes));
    Ok(())
}

fn use_default(current: &Option<String>, check_empty: bool) -> bool {
    match current {
        None => true,
        Some(v) => check_empty && v.is_empty(),
    }
}

fn convert_case(value: &str, upper: bool, all: bool) -> String {
    if all {
        return if upper {
            value.to_uppercase()
        } else {
            value.to_lowercase()
        };
    }
    let mut chars = value.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => {
            let converted: String = if upper {
                first.to_uppercase().collect()
            } else {
                first.to_lowercase().collect()
            };
            converted + chars.as_str()
        }
    }
}

// ---------------------------------------------------------------------------
// Field splitting + pathname expansion
// ---------------------------------------------------------------------------

/// Split one splittable span on IFS. Returns the parts plus whether the
/// text began/ended with a delimiter (those break joins with neighbors).
fn split_ifs(value: &str, ifs: &str) -> (Vec<String>, bool, bool) {
    if ifs.is_empty() || value.is_empty() {
        return (
            if value.is_empty() { Vec::new() } else { vec![value.to_string()] },
            false,
            false,
        );
    }

    let is_delim = |c: char| ifs.contains(c);
    let is_ws_delim = |c: char| is_delim(c) && c.is_whitespace();

    let leading = value.chars().next().map(&is_delim).unwrap_or(false);
    let trailing = value.chars().last().map(&is_delim).unwrap_or(false);

    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut pending_field = false; // a field boundary was crossed
    let mut chars = value.chars().peekable();

    // Leading whitespace delimiters produce no empty field.
    while chars.peek().map(|c| is_ws_delim(*c)).unwrap_or(false) {
        chars.next();
    }

    while let Some(c) = chars.next() {
        if !is_delim(c) {
            cur.push(c);
            pending_field = true;
            continue;
        }
        // Delimiter: close the current field. A whitespace run counts
        // once; a non-whitespace delimiter delimits strictly (so `a::b`
        // has an empty middle field).
        let non_ws = !c.is_whitespace();
        parts.push(std::mem::take(&mut cur));
        pending_field = false;
        // Absorb adjacent whitespace delimiters, and at most one
        // non-whitespace delimiter if this one was whitespace.
        let mut seen_non_ws = non_ws;
        while let Some(&n) = chars.peek() {
            if is_ws_delim(n) {
                chars.next();
            } else if is_delim(n) && !seen_non_ws {
                seen_non_ws = true;
                chars.next();
                // A second non-ws delimiter means an empty field.
                // Absorb its trailing whitespace on the next loop turn.
                while let Some(&w) = chars.peek() {
                    if is_ws_delim(w) {
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek().map(|c| is_delim(*c)).unwrap_or(false) {
                    parts.push(String::new());
                }
            } else {
                break;
            }
        }
    }
    if pending_field {
        parts.push(cur);
    }

    (parts, leading, trailing)
}

/// Assemble final fields from a word's piece stream, then glob.
fn collect_fields(state: &ShellState, pieces: Vec<Piece>, fields: &mut Vec<String>) {
    let ifs = state.ifs();

    // Groups between hard breaks never join.
    let mut groups: Vec<Vec<Span>> = vec![Vec::new()];
    for piece in pieces {
        match piece {
            Piece::Span(span) => groups.last_mut().unwrap().push(span),
            Piece::Break => groups.push(Vec::new()),
        }
    }

    for group in groups {
        let mut produced: Vec<String> = Vec::new();
        let mut cur = String::new();
        let mut cur_pattern = String::new();
        // A field exists once it has text or a quoted (possibly empty) span.
        let mut cur_real = false;

        for span in &group {
            if !span.splittable {
                cur.push_str(&span.value);
                cur_pattern.push_str(&span.pattern);
                cur_real = cur_real || !span.value.is_empty() || span.quoted;
                continue;
            }
            let (parts, leading, trailing) = split_ifs(&span.value, &ifs);
            if parts.is_empty() {
                // Pure delimiters break the running field; pure empty
                // expansions vanish.
                if !span.value.is_empty() && cur_real {
                    produced.push(std::mem::take(&mut cur));
                    cur_pattern.clear();
                    cur_real = false;
                }
                continue;
            }
            if leading && cur_real {
                produced.push(std::mem::take(&mut cur));
                cur_pattern.clear();
                cur_real = false;
            }
            for (i, part) in parts.into_iter().enumerate() {
                if i > 0 {
                    produced.push(std::mem::take(&mut cur));
                    cur_pattern.clear();
                    cur_real = false;
                }
                cur_pattern.push_str(&part);
                cur.push_str(&part);
                cur_real = cur_real || !cur.is_empty();
            }
            if trailing && cur_real {
                produced.push(std::mem::take(&mut cur));
                cur_pattern.clear();
                cur_real = false;
            }
        }
        if cur_real {
            produced.push(cur.clone());
        }

        // Pathname expansion. When the group stayed one field the precise
        // quoted-escaped pattern is available; split-off fields are
        // unquoted text and glob as themselves.
        let glob_enabled = !state.options.noglob;
        if produced.len() == 1 && glob_enabled && pattern::has_glob_chars(&cur_pattern) {
            fields.extend(glob_field(&cur_pattern));
        } else {
            for field in produced {
                if glob_enabled && pattern::has_glob_chars(&field) {
                    fields.extend(glob_field(&field));
                } else {
                    fields.push(field);
                }
            }
        }
    }
}

/// Match one field's pattern against the filesystem; no match keeps the
/// pattern literally (with glob escapes removed).
fn glob_field(pat: &str) -> Vec<String> {
    let mut matches: Vec<String> = match glob::glob(pat) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .map(|path| path.to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    if matches.is_empty() {
        return vec![pattern::unescape_glob(pat)];
    }
    matches.sort();
    matches
}

// ============================================================================
// Tests
// ============================================================================
