//! Tokenizer.
//!
//! Single-pass scanner over preprocessed source. Emits operators,
//! newlines, and words; a word is scanned straight into its
//! [`WordPiece`] structure, so quote provenance never has to be
//! reconstructed later. Multi-character redirection operators are fused
//! here (`>>`, `<<-`, `&>`, `2>&1` via the io-number prefix), `$(...)`,
//! `$(( ... ))`, `${...}`, backticks, `<(...)`, tildes, and brace groups
//! are recognized in place, and `[[` flips the scanner into conditional
//! mode where `<`, `>`, `(`, and `)` are ordinary words.
//!
//! Unbalanced quotes, braces, or substitution delimiters surface as
//! [`ParseError`]s naming the construct left open.

use std::collections::VecDeque;

use crate::ast::{BraceItem, ParamExpr, ParamOp, Word, WordPiece};
use super::arith;
use super::ParseError;

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Character cursor with line tracking.
pub struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Cursor {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    pub fn next(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
            }
        }
        c
    }

    pub fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.next();
            true
        } else {
            false
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start.min(self.chars.len())..end.min(self.chars.len())]
            .iter()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(Word),
    Op(Op),
    Newline,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Pipe,
    Amp,
    Semi,
    AndIf,
    OrIf,
    DSemi,
    SemiAnd,
    DSemiAnd,
    LParen,
    RParen,
    /// `((` - arithmetic command; the grammar captures the raw body next.
    DLParen,
    Less,
    Great,
    DGreat,
    DLess,
    DLessDash,
    TLess,
    LessAnd,
    GreatAnd,
    LessGreat,
    Clobber,
    OutErr,
    AppendOutErr,
}

impl Op {
    /// Operators that start a redirection when they appear in a command.
    pub fn is_redirection(self) -> bool {
        matches!(
            self,
            Op::Less
                | Op::Great
                | Op::DGreat
                | Op::DLess
                | Op::DLessDash
                | Op::TLess
                | Op::LessAnd
                | Op::GreatAnd
                | Op::LessGreat
                | Op::Clobber
                | Op::OutErr
                | Op::AppendOutErr
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    /// Digits glued to the front of a redirection operator (`2>`).
    pub io_number: Option<i32>,
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A valid variable identifier.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if is_name_start(c)) && chars.all(is_name_char)
}

pub struct Lexer {
    cursor: Cursor,
    buffer: VecDeque<Lexeme>,
    /// Depth of `[[ ]]`; while positive, `<` `>` `(` `)` lex as words.
    cond_depth: u32,
}

impl Lexer {
    pub fn new(text: &str) -> Self {
        Self {
            cursor: Cursor::new(text),
            buffer: VecDeque::new(),
            cond_depth: 0,
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> String {
        self.cursor.slice(start, end)
    }

    pub fn peek(&mut self) -> Result<&Lexeme, ParseError> {
        self.peek_n(0)
    }

    pub fn peek_n(&mut self, n: usize) -> Result<&Lexeme, ParseError> {
        while self.buffer.len() <= n {
            let lexeme = self.scan()?;
            self.buffer.push_back(lexeme);
        }
        Ok(&self.buffer[n])
    }

    pub fn advance(&mut self) -> Result<Lexeme, ParseError> {
        if let Some(lexeme) = self.buffer.pop_front() {
            return Ok(lexeme);
        }
        self.scan()
    }

    /// The word text if the next token is a single unquoted literal.
    pub fn peek_bare(&mut self) -> Result<Option<String>, ParseError> {
        Ok(match &self.peek()?.token {
            Token::Word(w) => w.as_bare().map(str::to_string),
            _ => None,
        })
    }

    /// Capture the raw body of `(( ... ))` after its `DLParen` token has
    /// been consumed. Only legal while no tokens are buffered.
    pub fn capture_double_paren(&mut self) -> Result<String, ParseError> {
        debug_assert!(self.buffer.is_empty());
        let line = self.cursor.line();
        capture_to_double_rparen(&mut self.cursor, line)
    }

    // -- token scanning -----------------------------------------------------

    fn lexeme(&self, token: Token, start: usize, line: usize) -> Lexeme {
        Lexeme {
            token,
            io_number: None,
            line,
            start,
            end: self.cursor.pos(),
        }
    }

    fn scan(&mut self) -> Result<Lexeme, ParseError> {
        while matches!(self.cursor.peek(), Some(' ') | Some('\t')) {
            self.cursor.next();
        }
        let start = self.cursor.pos();
        let line = self.cursor.line();

        let Some(c) = self.cursor.peek() else {
            return Ok(self.lexeme(Token::Eof, start, line));
        };

        // Digits glued to a redirection operator: `2>`, `10<&`.
        if c.is_ascii_digit() {
            let mut len = 0;
            while self
                .cursor
                .peek_at(len)
                .map(|d| d.is_ascii_digit())
                .unwrap_or(false)
            {
                len += 1;
            }
            if len <= 4 && matches!(self.cursor.peek_at(len), Some('<') | Some('>')) {
                let mut digits = String::new();
                for _ in 0..len {
                    digits.push(self.cursor.next().unwrap());
                }
                let mut op_lexeme = self.scan()?;
                op_lexeme.io_number = digits.parse().ok();
                op_lexeme.start = start;
                return Ok(op_lexeme);
            }
        }

        let token = match c {
            '\n' => {
                self.cursor.next();
                Token::Newline
            }
            '|' => {
                self.cursor.next();
                Token::Op(if self.cursor.eat('|') { Op::OrIf } else { Op::Pipe })
            }
            '&' => {
                self.cursor.next();
                if self.cursor.eat('&') {
                    Token::Op(Op::AndIf)
                } else if self.cursor.eat('>') {
                    Token::Op(if self.cursor.eat('>') {
                        Op::AppendOutErr
                    } else {
                        Op::OutErr
                    })
                } else {
                    Token::Op(Op::Amp)
                }
            }
            ';' => {
                self.cursor.next();
                if self.cursor.eat(';') {
                    Token::Op(if self.cursor.eat('&') { Op::DSemiAnd } else { Op::DSemi })
                } else if self.cursor.eat('&') {
                    Token::Op(Op::SemiAnd)
                } else {
                    Token::Op(Op::Semi)
                }
            }
            '(' => {
                self.cursor.next();
                if self.cond_depth == 0 && self.cursor.peek() == Some('(') {
                    self.cursor.next();
                    Token::Op(Op::DLParen)
                } else {
                    Token::Op(Op::LParen)
                }
            }
            ')' => {
                self.cursor.next();
                Token::Op(Op::RParen)
            }
            '<' if self.cond_depth > 0 && self.cursor.peek_at(1) != Some('(') => {
                self.cursor.next();
                Token::Word(Word::bare("<"))
            }
            '>' if self.cond_depth > 0 && self.cursor.peek_at(1) != Some('(') => {
                self.cursor.next();
                Token::Word(Word::bare(">"))
            }
            '<' if self.cursor.peek_at(1) != Some('(') => {
                self.cursor.next();
                if self.cursor.eat('<') {
                    if self.cursor.eat('<') {
                        Token::Op(Op::TLess)
                    } else if self.cursor.eat('-') {
                        Token::Op(Op::DLessDash)
                    } else {
                        Token::Op(Op::DLess)
                    }
                } else if self.cursor.eat('&') {
                    Token::Op(Op::LessAnd)
                } else if self.cursor.eat('>') {
                    Token::Op(Op::LessGreat)
                } else {
                    Token::Op(Op::Less)
                }
            }
            '>' if self.cursor.peek_at(1) != Some('(') => {
                self.cursor.next();
                if self.cursor.eat('>') {
                    Token::Op(Op::DGreat)
                } else if self.cursor.eat('&') {
                    Token::Op(Op::GreatAnd)
                } else if self.cursor.eat('|') {
                    Token::Op(Op::Clobber)
                } else {
                    Token::Op(Op::Great)
                }
            }
            _ => {
                let word = self.scan_word(WordMode::Normal)?;
                if let Some(text) = word.as_bare() {
                    if text == "[[" {
                        self.cond_depth += 1;
                    } else if text == "]]" {
                        self.cond_depth = self.cond_depth.saturating_sub(1);
                    }
                }
                Token::Word(word)
            }
        };

        Ok(self.lexeme(token, start, line))
    }

    // -- word scanning ------------------------------------------------------

    fn scan_word(&mut self, mode: WordMode) -> Result<Word, ParseError> {
        let mut pieces: Vec<WordPiece> = Vec::new();
        let mut bare = String::new();
        let line = self.cursor.line();

        macro_rules! flush {
            () => {
                if !bare.is_empty() {
                    pieces.push(WordPiece::Bare(std::mem::take(&mut bare)));
                }
            };
        }

        loop {
            let Some(c) = self.cursor.peek() else { break };
            match c {
                ' ' | '\t' | '\n' if mode == WordMode::Normal => break,
                '|' | '&' | ';' | '(' | ')' if mode == WordMode::Normal => break,
                '<' | '>' if mode == WordMode::Normal => {
                    if self.cursor.peek_at(1) == Some('(') {
                        flush!();
                        let write = c == '>';
                        self.cursor.next();
                        self.cursor.next();
                        let inner = self.capture_balanced_parens()?;
                        let script = super::parse(&inner)
                            .map_err(|e| e.nested("process substitution", line))?;
                        pieces.push(WordPiece::ProcSub { script, write });
                    } else {
                        break;
                    }
                }
                '\\' => {
                    self.cursor.next();
                    match self.cursor.next() {
                        Some(escaped) => {
                            flush!();
                            pieces.push(WordPiece::Quoted(escaped.to_string()));
                        }
                        None => bare.push('\\'),
                    }
                }
                '\'' => {
                    self.cursor.next();
                    let mut text = String::new();
                    loop {
                        match self.cursor.next() {
                            Some('\'') => break,
                            Some(ch) => text.push(ch),
                            None => return Err(ParseError::new("unclosed quote", line)),
                        }
                    }
                    flush!();
                    pieces.push(WordPiece::Quoted(text));
                }
                '"' => {
                    self.cursor.next();
                    flush!();
                    pieces.push(WordPiece::Double(self.scan_double()?));
                }
                '$' => {
                    if let Some(piece) = self.scan_dollar()? {
                        flush!();
                        pieces.push(piece);
                    } else {
                        bare.push('$');
                    }
                }
                '`' => {
                    flush!();
                    pieces.push(WordPiece::CmdSub(self.scan_backticks()?));
                }
                '~' if mode == WordMode::Normal && pieces.is_empty() && bare.is_empty() => {
                    self.cursor.next();
                    let mut text = String::from("~");
                    while let Some(ch) = self.cursor.peek() {
                        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                            text.push(ch);
                            self.cursor.next();
                        } else {
                            break;
                        }
                    }
                    pieces.push(WordPiece::Tilde(text));
                }
                '{' if mode == WordMode::Normal => match self.try_scan_brace()? {
                    Some(items) => {
                        flush!();
                        pieces.push(WordPiece::Brace(items));
                    }
                    None => {
                        bare.push('{');
                        self.cursor.next();
                    }
                },
                c => {
                    bare.push(c);
                    self.cursor.next();
                }
            }
        }

        if !bare.is_empty() {
            pieces.push(WordPiece::Bare(bare));
        }
        Ok(Word { pieces })
    }

    fn scan_double(&mut self) -> Result<Vec<WordPiece>, ParseError> {
        let line = self.cursor.line();
        let mut pieces: Vec<WordPiece> = Vec::new();
        let mut bare = String::new();

        loop {
            let Some(c) = self.cursor.peek() else {
                return Err(ParseError::new("unclosed quote", line));
            };
            match c {
                '"' => {
                    self.cursor.next();
                    break;
                }
                '\\' => match self.cursor.peek_at(1) {
                    Some(e @ ('$' | '`' | '"' | '\\')) => {
                        self.cursor.next();
                        self.cursor.next();
                        bare.push(e);
                    }
                    Some('\n') => {
                        self.cursor.next();
                        self.cursor.next();
                    }
                    _ => {
                        bare.push('\\');
                        self.cursor.next();
                    }
                },
                '$' => {
                    if let Some(piece) = self.scan_dollar()? {
                        if !bare.is_empty() {
                            pieces.push(WordPiece::Bare(std::mem::take(&mut bare)));
                        }
                        pieces.push(piece);
                    } else {
                        bare.push('$');
                    }
                }
                '`' => {
                    if !bare.is_empty() {
                        pieces.push(WordPiece::Bare(std::mem::take(&mut bare)));
                    }
                    pieces.push(WordPiece::CmdSub(self.scan_backticks()?));
                }
                c => {
                    bare.push(c);
                    self.cursor.next();
                }
            }
        }

        if !bare.is_empty() {
            pieces.push(WordPiece::Bare(bare));
        }
        Ok(pieces)
    }

    /// `$`-introduced constructs. Returns `None` (cursor past the `$`)
    /// when the dollar is literal.
    fn scan_dollar(&mut self) -> Result<Option<WordPiece>, ParseError> {
        let line = self.cursor.line();
        match self.cursor.peek_at(1) {
            Some('{') => {
                self.cursor.next();
                self.cursor.next();
                let inner = self.capture_braced()?;
                Ok(Some(WordPiece::Param(Box::new(parse_param_text(
                    &inner, line,
                )?))))
            }
            Some('(') => {
                if self.cursor.peek_at(2) == Some('(') {
                    self.cursor.next();
                    self.cursor.next();
                    self.cursor.next();
                    let inner = capture_to_double_rparen(&mut self.cursor, line)?;
                    let expr = arith::parse(&inner).map_err(|m| ParseError::new(m, line))?;
                    Ok(Some(WordPiece::ArithSub(expr)))
                } else {
                    self.cursor.next();
                    self.cursor.next();
                    let inner = self.capture_balanced_parens()?;
                    let script = super::parse(&inner)
                        .map_err(|e| e.nested("command substitution", line))?;
                    Ok(Some(WordPiece::CmdSub(script)))
                }
            }
            Some(c) if is_name_start(c) => {
                self.cursor.next();
                let mut name = String::new();
                while let Some(ch) = self.cursor.peek() {
                    if is_name_char(ch) {
                        name.push(ch);
                        self.cursor.next();
                    } else {
                        break;
                    }
                }
                Ok(Some(WordPiece::Param(Box::new(ParamExpr {
                    name,
                    op: ParamOp::Plain,
                }))))
            }
            Some(c) if c.is_ascii_digit() => {
                self.cursor.next();
                self.cursor.next();
                Ok(Some(WordPiece::Param(Box::new(ParamExpr {
                    name: c.to_string(),
                    op: ParamOp::Plain,
                }))))
            }
            Some(c @ ('?' | '$' | '#' | '*' | '@' | '!' | '-')) => {
                self.cursor.next();
                self.cursor.next();
                Ok(Some(WordPiece::Param(Box::new(ParamExpr {
                    name: c.to_string(),
                    op: ParamOp::Plain,
                }))))
            }
            _ => {
                self.cursor.next();
                Ok(None)
            }
        }
    }

    /// After an opening `(` - capture up to its match, skipping quoted
    /// regions so a `)` inside quotes doesn't close early.
    fn capture_balanced_parens(&mut self) -> Result<String, ParseError> {
        let line = self.cursor.line();
        let mut depth: i32 = 1;
        let mut text = String::new();
        loop {
            let Some(c) = self.cursor.next() else {
                return Err(ParseError::new("unterminated command substitution", line));
            };
            match c {
                '\\' => {
                    text.push(c);
                    if let Some(n) = self.cursor.next() {
                        text.push(n);
                    }
                }
                '\'' | '"' => {
                    text.push(c);
                    let quote = c;
                    loop {
                        let Some(q) = self.cursor.next() else {
                            return Err(ParseError::new("unclosed quote", line));
                        };
                        text.push(q);
                        if q == '\\' && quote == '"' {
                            if let Some(n) = self.cursor.next() {
                                text.push(n);
                            }
                            continue;
                        }
                        if q == quote {
                            break;
                        }
                    }
                }
                '(' => {
                    depth += 1;
                    text.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push(c);
                }
                c => text.push(c),
            }
        }
    }

    /// After `${` - capture up to the matching `}`.
    fn capture_braced(&mut self) -> Result<String, ParseError> {
        let line = self.cursor.line();
        let mut depth: i32 = 1;
        let mut text = String::new();
        loop {
            let Some(c) = self.cursor.next() else {
                return Err(ParseError::new("unterminated ${", line));
            };
            match c {
                '\\' => {
                    text.push(c);
                    if let Some(n) = self.cursor.next() {
                        text.push(n);
                    }
                }
                '\'' => {
                    text.push(c);
                    loop {
                        let Some(q) = self.cursor.next() else {
                            return Err(ParseError::new("unclosed quote", line));
                        };
                        text.push(q);
                        if q == '\'' {
                            break;
                        }
                    }
                }
                '{' => {
                    depth += 1;
                    text.push(c);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push(c);
                }
                c => text.push(c),
            }
        }
    }

    fn scan_backticks(&mut self) -> Result<crate::ast::Script, ParseError> {
        let line = self.cursor.line();
        self.cursor.next(); // opening `
        let mut text = String::new();
        loop {
            match self.cursor.next() {
                Some('`') => break,
                Some('\\') => match self.cursor.next() {
                    Some(e @ ('`' | '\\' | '$')) => text.push(e),
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => return Err(ParseError::new("unclosed backquote", line)),
                },
                Some(c) => text.push(c),
                None => return Err(ParseError::new("unclosed backquote", line)),
            }
        }
        super::parse(&text).map_err(|e| e.nested("command substitution", line))
    }

    /// Attempt a brace-expansion group at the current `{`. Advances past
    /// the group and returns its items on success; leaves the cursor
    /// untouched and returns `None` when the braces are literal (no
    /// top-level comma or range, or unbalanced).
    fn try_scan_brace(&mut self) -> Result<Option<Vec<BraceItem>>, ParseError> {
        let mut depth = 1;
        let mut n = 1; // past '{'
        let mut items: Vec<String> = vec![String::new()];
        let mut in_single = false;
        let mut in_double = false;
        loop {
            let Some(c) = self.cursor.peek_at(n) else { return Ok(None) };
            n += 1;
            if in_single {
                if c == '\'' {
                    in_single = false;
                }
                items.last_mut().unwrap().push(c);
                continue;
            }
            if in_double {
                if c == '"' {
                    in_double = false;
                }
                items.last_mut().unwrap().push(c);
                continue;
            }
            match c {
                '\'' => {
                    in_single = true;
                    items.last_mut().unwrap().push(c);
                }
                '"' => {
                    in_double = true;
                    items.last_mut().unwrap().push(c);
                }
                '{' => {
                    depth += 1;
                    items.last_mut().unwrap().push(c);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    items.last_mut().unwrap().push(c);
                }
                ',' if depth == 1 => items.push(String::new()),
                ' ' | '\t' | '\n' | ';' | '|' | '&' | '(' | ')' | '<' | '>' => return Ok(None),
                c => items.last_mut().unwrap().push(c),
            }
        }

        let is_range = items.len() == 1 && parse_range(&items[0]).is_some();
        if items.len() < 2 && !is_range {
            return Ok(None);
        }

        // Commit: advance past the whole group.
        for _ in 0..n {
            self.cursor.next();
        }

        if is_range {
            return Ok(Some(vec![parse_range(&items[0]).unwrap()]));
        }

        let line = self.cursor.line();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(BraceItem::Word(parse_word_text(&item, line)?));
        }
        Ok(Some(out))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordMode {
    /// Ordinary word: terminated by whitespace and operators.
    Normal,
    /// Operand text inside `${...}`: runs to end of input, no tilde/brace.
    Rvalue,
}

/// After `$((` or `((` - capture up to the matching `))`.
fn capture_to_double_rparen(cursor: &mut Cursor, line: usize) -> Result<String, ParseError> {
    let mut depth: i32 = 2;
    let mut text = String::new();
    loop {
        let Some(c) = cursor.next() else {
            return Err(ParseError::new("unterminated (( ... ))", line));
        };
        match c {
            '(' => {
                depth += 1;
                text.push(c);
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    // The first of the closing `))` was pushed a step ago.
                    if text.ends_with(')') {
                        text.pop();
                    }
                    return Ok(text);
                }
                text.push(c);
            }
            c => text.push(c),
        }
    }
}

fn parse_range(text: &str) -> Option<BraceItem> {
    let (lhs, rhs) = text.split_once("..")?;
    if let (Ok(a), Ok(b)) = (lhs.parse::<i64>(), rhs.parse::<i64>()) {
        return Some(BraceItem::NumRange(a, b));
    }
    let (mut lc, mut rc) = (lhs.chars(), rhs.chars());
    match (lc.next(), lc.next(), rc.next(), rc.next()) {
        (Some(a), None, Some(b), None) if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
            Some(BraceItem::CharRange(a, b))
        }
        _ => None,
    }
}

/// Parse operand text (a `${x:-...}` default, a pattern, a brace item)
/// as a word: quotes and `$` forms apply, word terminators don't.
pub fn parse_word_text(text: &str, line: usize) -> Result<Word, ParseError> {
    let mut lexer = Lexer::new(text);
    let word = lexer.scan_word(WordMode::Rvalue)?;
    if lexer.cursor.peek().is_some() {
        return Err(ParseError::new(
            format!("bad substitution: `{}'", text),
            line,
        ));
    }
    Ok(word)
}

/// Parse an unquoted heredoc body: `$` and backticks expand, everything
/// else is literal, and there is never any field splitting or globbing -
/// so the pieces come back wrapped as one double-quoted region.
pub fn parse_heredoc_text(text: &str) -> Result<Word, ParseError> {
    let mut lexer = Lexer::new(text);
    let mut pieces: Vec<WordPiece> = Vec::new();
    let mut bare = String::new();
    loop {
        let Some(c) = lexer.cursor.peek() else { break };
        match c {
            '\\' => match lexer.cursor.peek_at(1) {
                Some(e @ ('$' | '`' | '\\')) => {
                    lexer.cursor.next();
                    lexer.cursor.next();
                    bare.push(e);
                }
                _ => {
                    bare.push('\\');
                    lexer.cursor.next();
                }
            },
            '$' => {
                if let Some(piece) = lexer.scan_dollar()? {
                    if !bare.is_empty() {
                        pieces.push(WordPiece::Bare(std::mem::take(&mut bare)));
                    }
                    pieces.push(piece);
                } else {
                    bare.push('$');
                }
            }
            '`' => {
                if !bare.is_empty() {
                    pieces.push(WordPiece::Bare(std::mem::take(&mut bare)));
                }
                pieces.push(WordPiece::CmdSub(lexer.scan_backticks()?));
            }
            c => {
                bare.push(c);
                lexer.cursor.next();
            }
        }
    }
    if !bare.is_empty() {
        pieces.push(WordPiece::Bare(bare));
    }
    Ok(Word {
        pieces: vec![WordPiece::Double(pieces)],
    })
}

// ---------------------------------------------------------------------------
// ${...} interior
// ---------------------------------------------------------------------------

fn is_param_name(s: &str) -> bool {
    is_identifier(s)
        || (!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        || matches!(s, "?" | "$" | "#" | "*" | "@" | "!" | "-")
}

/// Parse the text between `${` and `}`.
fn parse_param_text(inner: &str, line: usize) -> Result<ParamExpr, ParseError> {
    if inner.is_empty() {
        return Err(ParseError::new("bad substitution: `${}'", line));
    }

    // ${#name} - but ${#} alone is $#.
    if let Some(rest) = inner.strip_prefix('#') {
        if is_param_name(rest) {
            return Ok(ParamExpr {
                name: rest.to_string(),
                op: ParamOp::Length,
            });
        }
        if rest.is_empty() {
            return Ok(ParamExpr {
                name: "#".to_string(),
                op: ParamOp::Plain,
            });
        }
    }

    // ${!name}
    if let Some(rest) = inner.strip_prefix('!') {
        if is_param_name(rest) {
            return Ok(ParamExpr {
                name: rest.to_string(),
                op: ParamOp::Indirect,
            });
        }
    }

    let name_len = param_name_len(inner);
    if name_len == 0 {
        return Err(ParseError::new(
            format!("bad substitution: `${{{}}}'", inner),
            line,
        ));
    }
    let name = inner[..name_len].to_string();
    let rest = &inner[name_len..];

    let op = if rest.is_empty() {
        ParamOp::Plain
    } else if let Some(arg) = rest.strip_prefix(":-") {
        ParamOp::Default {
            word: parse_word_text(arg, line)?,
            check_empty: true,
        }
    } else if let Some(arg) = rest.strip_prefix(":=") {
        ParamOp::Assign {
            word: parse_word_text(arg, line)?,
            check_empty: true,
        }
    } else if let Some(arg) = rest.strip_prefix(":?") {
        ParamOp::Error {
            word: if arg.is_empty() {
                None
            } else {
                Some(parse_word_text(arg, line)?)
            },
            check_empty: true,
        }
    } else if let Some(arg) = rest.strip_prefix(":+") {
        ParamOp::Alternative {
            word: parse_word_text(arg, line)?,
            check_empty: true,
        }
    } else if let Some(arg) = rest.strip_prefix("##") {
        ParamOp::StripPrefix {
            pattern: parse_word_text(arg, line)?,
            longest: true,
        }
    } else if let Some(arg) = rest.strip_prefix('#') {
        ParamOp::StripPrefix {
            pattern: parse_word_text(arg, line)?,
            longest: false,
        }
    } else if let Some(arg) = rest.strip_prefix("%%") {
        ParamOp::StripSuffix {
            pattern: parse_word_text(arg, line)?,
            longest: true,
        }
    } else if let Some(arg) = rest.strip_prefix('%') {
        ParamOp::StripSuffix {
            pattern: parse_word_text(arg, line)?,
            longest: false,
        }
    } else if let Some(arg) = rest.strip_prefix("//") {
        let (pattern, replacement) = split_replacement(arg);
        ParamOp::Replace {
            pattern: parse_word_text(&pattern, line)?,
            replacement: match replacement {
                Some(r) => Some(parse_word_text(&r, line)?),
                None => None,
            },
            all: true,
        }
    } else if let Some(arg) = rest.strip_prefix('/') {
        let (pattern, replacement) = split_replacement(arg);
        ParamOp::Replace {
            pattern: parse_word_text(&pattern, line)?,
            replacement: match replacement {
                Some(r) => Some(parse_word_text(&r, line)?),
                None => None,
            },
            all: false,
        }
    } else if rest == "^^" {
        ParamOp::CaseConvert {
            upper: true,
            all: true,
        }
    } else if rest == "^" {
        ParamOp::CaseConvert {
            upper: true,
            all: false,
        }
    } else if rest == ",," {
        ParamOp::CaseConvert {
            upper: false,
            all: true,
        }
    } else if rest == "," {
        ParamOp::CaseConvert {
            upper: false,
            all: false,
        }
    } else if let Some(arg) = rest.strip_prefix('-') {
        ParamOp::Default {
            word: parse_word_text(arg, line)?,
            check_empty: false,
        }
    } else if let Some(arg) = rest.strip_prefix('=') {
        ParamOp::Assign {
            word: parse_word_text(arg, line)?,
            check_empty: false,
        }
    } else if let Some(arg) = rest.strip_prefix('?') {
        ParamOp::Error {
            word: if arg.is_empty() {
                None
            } else {
                Some(parse_word_text(arg, line)?)
            },
            check_empty: false,
        }
    } else if let Some(arg) = rest.strip_prefix('+') {
        ParamOp::Alternative {
            word: parse_word_text(arg, line)?,
            check_empty: false,
        }
    } else {
        return Err(ParseError::new(
            format!("bad substitution: `${{{}}}'", inner),
            line,
        ));
    };

    Ok(ParamExpr { name, op })
}

fn param_name_len(inner: &str) -> usize {
    let mut chars = inner.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => 1 + chars.take_while(|c| is_name_char(*c)).count(),
        Some(c) if c.is_ascii_digit() => 1 + chars.take_while(|c| c.is_ascii_digit()).count(),
        Some('?' | '$' | '#' | '*' | '@' | '!' | '-') => 1,
        _ => 0,
    }
}

/// Split `pat/repl` at the first unescaped, unquoted `/`.
fn split_replacement(arg: &str) -> (String, Option<String>) {
    let mut pattern = String::new();
    let mut chars = arg.chars();
    let mut in_single = false;
    let mut in_double = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' if !in_single => {
                pattern.push(c);
                if let Some(n) = chars.next() {
                    pattern.push(n);
                }
            }
            '\'' if !in_double => {
                in_single = !in_single;
                pattern.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                pattern.push(c);
            }
            '/' if !in_single && !in_double => {
                return (pattern, Some(chars.collect()));
            }
            c => pattern.push(c),
        }
    }
    (pattern, None)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let lexeme = lexer.advance().unwrap();
            let done = lexeme.token == Token::Eof;
            out.push(lexeme.token);
            if done {
                break;
            }
        }
        out
    }

    fn first_word(src: &str) -> Word {
        match tokens(src).into_iter().next().unwrap() {
            Token::Word(w) => w,
            other => panic!("expected word, got {:?}", other),
        }
    }

    #[test]
    fn words_and_operators() {
        let toks = tokens("echo hi | cat");
        assert_eq!(toks.len(), 5); // echo, hi, |, cat, eof
        assert!(matches!(toks[2], Token::Op(Op::Pipe)));
    }

    #[test]
    fn multi_char_operators_fuse() {
        assert!(matches!(tokens("a && b")[1], Token::Op(Op::AndIf)));
        assert!(matches!(tokens("a || b")[1], Token::Op(Op::OrIf)));
        assert!(matches!(tokens("a >> f")[1], Token::Op(Op::DGreat)));
        assert!(matches!(tokens("a <<< x")[1], Token::Op(Op::TLess)));
        assert!(matches!(tokens("a &> f")[1], Token::Op(Op::OutErr)));
        assert!(matches!(tokens("a >| f")[1], Token::Op(Op::Clobber)));
    }

    #[test]
    fn io_number_attaches_to_operator() {
        let mut lexer = Lexer::new("cmd 2> f");
        lexer.advance().unwrap(); // cmd
        let redir = lexer.advance().unwrap();
        assert!(matches!(redir.token, Token::Op(Op::Great)));
        assert_eq!(redir.io_number, Some(2));
    }

    #[test]
    fn number_without_redirection_is_a_word() {
        let toks = tokens("echo 2 x");
        assert!(matches!(&toks[1], Token::Word(w) if w.as_bare() == Some("2")));
    }

    #[test]
    fn single_quotes_are_one_literal_piece() {
        let w = first_word("'a b $c'");
        assert_eq!(w.pieces, vec![WordPiece::Quoted("a b $c".to_string())]);
    }

    #[test]
    fn double_quotes_keep_inner_expansions() {
        let w = first_word("\"x $HOME y\"");
        match &w.pieces[0] {
            WordPiece::Double(inner) => {
                assert!(matches!(&inner[0], WordPiece::Bare(t) if t == "x "));
                assert!(matches!(&inner[1], WordPiece::Param(p) if p.name == "HOME"));
                assert!(matches!(&inner[2], WordPiece::Bare(t) if t == " y"));
            }
            other => panic!("expected double, got {:?}", other),
        }
    }

    #[test]
    fn escape_makes_literal_piece() {
        let w = first_word("a\\$b");
        assert_eq!(
            w.pieces,
            vec![
                WordPiece::Bare("a".to_string()),
                WordPiece::Quoted("$".to_string()),
                WordPiece::Bare("b".to_string()),
            ]
        );
    }

    #[test]
    fn simple_parameter() {
        let w = first_word("$name");
        assert!(matches!(&w.pieces[0], WordPiece::Param(p)
            if p.name == "name" && p.op == ParamOp::Plain));
    }

    #[test]
    fn special_parameters() {
        for (src, name) in [("$?", "?"), ("$#", "#"), ("$@", "@"), ("$!", "!"), ("$1", "1")] {
            let w = first_word(src);
            assert!(matches!(&w.pieces[0], WordPiece::Param(p) if p.name == name));
        }
    }

    #[test]
    fn braced_default_op() {
        let w = first_word("${X:-fallback}");
        match &w.pieces[0] {
            WordPiece::Param(p) => {
                assert_eq!(p.name, "X");
                assert!(matches!(&p.op, ParamOp::Default { check_empty: true, .. }));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn braced_length_and_indirect() {
        assert!(matches!(&first_word("${#V}").pieces[0],
            WordPiece::Param(p) if p.op == ParamOp::Length && p.name == "V"));
        assert!(matches!(&first_word("${!V}").pieces[0],
            WordPiece::Param(p) if p.op == ParamOp::Indirect && p.name == "V"));
        assert!(matches!(&first_word("${#}").pieces[0],
            WordPiece::Param(p) if p.op == ParamOp::Plain && p.name == "#"));
    }

    #[test]
    fn strip_and_replace_ops() {
        assert!(matches!(&first_word("${V##*/}").pieces[0],
            WordPiece::Param(p) if matches!(p.op, ParamOp::StripPrefix { longest: true, .. })));
        assert!(matches!(&first_word("${V%x}").pieces[0],
            WordPiece::Param(p) if matches!(p.op, ParamOp::StripSuffix { longest: false, .. })));
        match &first_word("${V/a/b}").pieces[0] {
            WordPiece::Param(p) => {
                assert!(matches!(&p.op, ParamOp::Replace { all: false, replacement: Some(_), .. }));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn case_convert_ops() {
        assert!(matches!(&first_word("${V^^}").pieces[0],
            WordPiece::Param(p) if p.op == ParamOp::CaseConvert { upper: true, all: true }));
        assert!(matches!(&first_word("${V,}").pieces[0],
            WordPiece::Param(p) if p.op == ParamOp::CaseConvert { upper: false, all: false }));
    }

    #[test]
    fn command_substitution_parses_body() {
        let w = first_word("$(echo hi)");
        match &w.pieces[0] {
            WordPiece::CmdSub(script) => assert_eq!(script.statements.len(), 1),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn nested_command_substitution() {
        let w = first_word("$(echo $(echo hi))");
        assert!(matches!(&w.pieces[0], WordPiece::CmdSub(_)));
    }

    #[test]
    fn backtick_substitution() {
        let w = first_word("`echo hi`");
        assert!(matches!(&w.pieces[0], WordPiece::CmdSub(_)));
    }

    #[test]
    fn arithmetic_substitution() {
        let w = first_word("$((1+2))");
        assert!(matches!(&w.pieces[0], WordPiece::ArithSub(_)));
    }

    #[test]
    fn tilde_only_at_word_start() {
        let w = first_word("~/bin");
        assert!(matches!(&w.pieces[0], WordPiece::Tilde(t) if t == "~"));
        let w = first_word("a~b");
        assert_eq!(w.pieces, vec![WordPiece::Bare("a~b".to_string())]);
    }

    #[test]
    fn brace_alternation() {
        let w = first_word("x{a,b}y");
        assert!(matches!(&w.pieces[1], WordPiece::Brace(items) if items.len() == 2));
    }

    #[test]
    fn brace_range() {
        let w = first_word("{1..5}");
        assert_eq!(
            w.pieces,
            vec![WordPiece::Brace(vec![BraceItem::NumRange(1, 5)])]
        );
        let w = first_word("{a..e}");
        assert_eq!(
            w.pieces,
            vec![WordPiece::Brace(vec![BraceItem::CharRange('a', 'e')])]
        );
    }

    #[test]
    fn plain_braces_stay_literal() {
        let w = first_word("{nocomma}");
        assert_eq!(w.pieces, vec![WordPiece::Bare("{nocomma}".to_string())]);
    }

    #[test]
    fn unclosed_quote_is_an_error() {
        let mut lexer = Lexer::new("echo 'open");
        lexer.advance().unwrap();
        assert!(lexer.advance().is_err());
    }

    #[test]
    fn cond_mode_lexes_angle_brackets_as_words() {
        let toks = tokens("[[ a < b ]]");
        assert!(matches!(&toks[1], Token::Word(w) if w.as_bare() == Some("a")));
        assert!(matches!(&toks[2], Token::Word(w) if w.as_bare() == Some("<")));
        assert!(matches!(&toks[4], Token::Word(w) if w.as_bare() == Some("]]")));
    }

    #[test]
    fn process_substitution_is_a_word_piece() {
        let w = first_word("<(echo hi)");
        assert!(matches!(&w.pieces[0], WordPiece::ProcSub { write: false, .. }));
        let w = first_word(">(cat)");
        assert!(matches!(&w.pieces[0], WordPiece::ProcSub { write: true, .. }));
    }
}
