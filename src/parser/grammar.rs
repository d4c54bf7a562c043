//! Recursive-descent grammar.
//!
//! Consumes the tokenizer's stream and builds the AST: statements of
//! `&&`/`||`-joined pipelines, simple commands with assignments and
//! redirections, and the compound forms driven by lookahead on a bare
//! first word (`if`, `for`, `while`, `until`, `case`, `{`, `(`, `((`,
//! `[[`, `function`, `NAME ()`). Both single-line (`if x; then y; fi`)
//! and multi-line layouts parse. Heredoc bodies were lifted out by the
//! preprocessor; each `<<`/`<<-` operator consumes the next body from
//! that queue in source order.

use std::collections::VecDeque;

use crate::ast::{
    Assignment, CaseArm, CaseFallthrough, Command, CompoundCommand, CondBinaryOp, CondExpr,
    Connector, FunctionDef, Pipeline, Redirection, RedirOp, RedirTarget, Script, SimpleCommand,
    Statement, Word, WordPiece,
};
use super::lexer::{is_identifier, parse_heredoc_text, Lexeme, Lexer, Op, Token};
use super::preprocessor::HeredocBody;
use super::{arith, ParseError};

/// Reserved words that terminate an enclosing block.
const BLOCK_ENDERS: &[&str] = &["then", "elif", "else", "fi", "do", "done", "esac", "}"];

pub struct Grammar {
    lexer: Lexer,
    heredocs: VecDeque<HeredocBody>,
}

impl Grammar {
    pub fn new(text: &str, heredocs: VecDeque<HeredocBody>) -> Self {
        Self {
            lexer: Lexer::new(text),
            heredocs,
        }
    }

    pub fn parse_script(&mut self) -> Result<Script, ParseError> {
        let statements = self.parse_statements(&[])?;
        let next = self.lexer.peek()?.clone();
        if next.token != Token::Eof {
            return Err(self.unexpected(&next));
        }
        Ok(Script { statements })
    }

    fn unexpected(&self, lexeme: &Lexeme) -> ParseError {
        let what = match &lexeme.token {
            Token::Word(w) => w
                .as_bare()
                .map(|t| format!("`{}'", t))
                .unwrap_or_else(|| "word".to_string()),
            Token::Op(op) => format!("`{:?}'", op),
            Token::Newline => "newline".to_string(),
            Token::Eof => "end of input".to_string(),
        };
        ParseError::new(format!("unexpected token {}", what), lexeme.line)
    }

    fn skip_newlines(&mut self) -> Result<(), ParseError> {
        while self.lexer.peek()?.token == Token::Newline {
            self.lexer.advance()?;
        }
        Ok(())
    }

    /// Statements until EOF, a closing token, or a reserved block ender
    /// in `extra_stops`.
    fn parse_statements(&mut self, extra_stops: &[&str]) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines()?;
            let next = self.lexer.peek()?;
            match &next.token {
                Token::Eof => break,
                Token::Op(Op::RParen | Op::DSemi | Op::SemiAnd | Op::DSemiAnd) => break,
                Token::Word(w) => {
                    if let Some(text) = w.as_bare() {
                        if extra_stops.contains(&text) || BLOCK_ENDERS.contains(&text) {
                            break;
                        }
                    }
                }
                _ => {}
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.lexer.peek()?.start;
        let mut pipelines = vec![self.parse_pipeline()?];
        let mut connectors = Vec::new();
        let mut background = false;
        let mut end;

        loop {
            let next = self.lexer.peek()?.clone();
            end = next.start;
            match next.token {
                Token::Op(Op::AndIf) => {
                    self.lexer.advance()?;
                    self.skip_newlines()?;
                    connectors.push(Connector::AndIf);
                    pipelines.push(self.parse_pipeline()?);
                }
                Token::Op(Op::OrIf) => {
                    self.lexer.advance()?;
                    self.skip_newlines()?;
                    connectors.push(Connector::OrIf);
                    pipelines.push(self.parse_pipeline()?);
                }
                Token::Op(Op::Semi) => {
                    self.lexer.advance()?;
                    break;
                }
                Token::Op(Op::Amp) => {
                    self.lexer.advance()?;
                    background = true;
                    break;
                }
                _ => break,
            }
        }

        let text = self.lexer.slice(start, end).trim().to_string();
        Ok(Statement {
            pipelines,
            connectors,
            background,
            text: if text.is_empty() { None } else { Some(text) },
        })
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let mut negated = false;
        while self.lexer.peek_bare()?.as_deref() == Some("!") {
            self.lexer.advance()?;
            negated = !negated;
        }

        let mut commands = vec![self.parse_command()?];
        while self.lexer.peek()?.token == Token::Op(Op::Pipe) {
            self.lexer.advance()?;
            self.skip_newlines()?;
            commands.push(self.parse_command()?);
        }
        Ok(Pipeline { commands, negated })
    }

    fn parse_command(&mut self) -> Result<Command, ParseError> {
        let next = self.lexer.peek()?.clone();
        match &next.token {
            Token::Op(Op::LParen) => {
                self.lexer.advance()?;
                let body = self.parse_statements(&[])?;
                self.expect_op(Op::RParen)?;
                let redirections = self.parse_trailing_redirections()?;
                Ok(Command::Compound(
                    CompoundCommand::Subshell(body),
                    redirections,
                ))
            }
            Token::Op(Op::DLParen) => {
                self.lexer.advance()?;
                let body = self.lexer.capture_double_paren()?;
                let expr = arith::parse(&body).map_err(|m| ParseError::new(m, next.line))?;
                let redirections = self.parse_trailing_redirections()?;
                Ok(Command::Compound(CompoundCommand::Arith(expr), redirections))
            }
            Token::Word(w) => {
                if let Some(text) = w.as_bare().map(str::to_string) {
                    match text.as_str() {
                        "if" => return self.parse_if(),
                        "while" => return self.parse_while(false),
                        "until" => return self.parse_while(true),
                        "for" => return self.parse_for(),
                        "case" => return self.parse_case(),
                        "{" => return self.parse_brace_group(),
                        "[[" => return self.parse_cond_command(),
                        "function" => {
                            self.lexer.advance()?;
                            let name = self.expect_name()?;
                            // Optional empty () after the name.
                            if self.lexer.peek()?.token == Token::Op(Op::LParen) {
                                self.lexer.advance()?;
                                self.expect_op(Op::RParen)?;
                            }
                            self.skip_newlines()?;
                            let body = self.parse_command()?;
                            return Ok(Command::FunctionDef(FunctionDef {
                                name,
                                body: Box::new(body),
                            }));
                        }
                        name if is_identifier(name) => {
                            // NAME () compound-command
                            if self.lexer.peek_n(1)?.token == Token::Op(Op::LParen)
                                && self.lexer.peek_n(2)?.token == Token::Op(Op::RParen)
                            {
                                self.lexer.advance()?;
                                self.lexer.advance()?;
                                self.lexer.advance()?;
                                self.skip_newlines()?;
                                let body = self.parse_command()?;
                                return Ok(Command::FunctionDef(FunctionDef {
                                    name: name.to_string(),
                                    body: Box::new(body),
                                }));
                            }
                        }
                        _ => {}
                    }
                }
                self.parse_simple()
            }
            Token::Op(op) if op.is_redirection() => self.parse_simple(),
            _ => Err(self.unexpected(&next)),
        }
    }

    // -- simple commands ----------------------------------------------------

    fn parse_simple(&mut self) -> Result<Command, ParseError> {
        let mut assignments = Vec::new();
        let mut words: Vec<Word> = Vec::new();
        let mut redirections = Vec::new();

        loop {
            let next = self.lexer.peek()?.clone();
            match next.token {
                Token::Word(_) => {
                    let Token::Word(word) = self.lexer.advance()?.token else {
                        unreachable!()
                    };
                    if words.is_empty() {
                        if let Some(assignment) = to_assignment(&word) {
                            assignments.push(assignment);
                            continue;
                        }
                    }
                    words.push(word);
                }
                Token::Op(op) if op.is_redirection() => {
                    redirections.push(self.parse_redirection(&next)?);
                }
                _ => break,
            }
        }

        if assignments.is_empty() && words.is_empty() && redirections.is_empty() {
            let next = self.lexer.peek()?.clone();
            return Err(self.unexpected(&next));
        }

        Ok(Command::Simple(SimpleCommand {
            assignments,
            words,
            redirections,
        }))
    }

    fn parse_redirection(&mut self, peeked: &Lexeme) -> Result<Redirection, ParseError> {
        let lexeme = self.lexer.advance()?;
        let Token::Op(op_token) = lexeme.token else {
            return Err(self.unexpected(peeked));
        };

        let op = match op_token {
            Op::Less => RedirOp::In,
            Op::Great => RedirOp::Out,
            Op::DGreat => RedirOp::Append,
            Op::Clobber => RedirOp::Clobber,
            Op::LessGreat => RedirOp::ReadWrite,
            Op::LessAnd => RedirOp::DupIn,
            Op::GreatAnd => RedirOp::DupOut,
            Op::DLess | Op::DLessDash => RedirOp::HereDoc,
            Op::TLess => RedirOp::HereString,
            Op::OutErr => RedirOp::OutErr,
            Op::AppendOutErr => RedirOp::AppendOutErr,
            other => {
                return Err(ParseError::new(
                    format!("`{:?}' is not a redirection", other),
                    lexeme.line,
                ))
            }
        };

        if op == RedirOp::HereDoc {
            // Consume the delimiter word; the body comes from the
            // preprocessor's queue, in operator order.
            let Token::Word(_) = self.lexer.advance()?.token else {
                return Err(ParseError::new("missing heredoc delimiter", lexeme.line));
            };
            let Some(pending) = self.heredocs.pop_front() else {
                return Err(ParseError::new("missing heredoc body", lexeme.line));
            };
            let body = if pending.quoted {
                Word {
                    pieces: vec![WordPiece::Quoted(pending.body)],
                }
            } else {
                parse_heredoc_text(&pending.body)?
            };
            return Ok(Redirection {
                fd: lexeme.io_number,
                op,
                target: RedirTarget::HereDoc(crate::ast::HereDoc {
                    body,
                    quoted: pending.quoted,
                }),
            });
        }

        let target = self.lexer.advance()?;
        let Token::Word(word) = target.token else {
            return Err(ParseError::new(
                "missing redirection target",
                target.line,
            ));
        };
        Ok(Redirection {
            fd: lexeme.io_number,
            op,
            target: RedirTarget::Word(word),
        })
    }

    fn parse_trailing_redirections(&mut self) -> Result<Vec<Redirection>, ParseError> {
        let mut redirections = Vec::new();
        loop {
            let next = self.lexer.peek()?.clone();
            match next.token {
                Token::Op(op) if op.is_redirection() => {
                    redirections.push(self.parse_redirection(&next)?);
                }
                _ => return Ok(redirections),
            }
        }
    }

    // -- compounds ----------------------------------------------------------

    fn expect_op(&mut self, want: Op) -> Result<(), ParseError> {
        let lexeme = self.lexer.advance()?;
        if lexeme.token == Token::Op(want) {
            Ok(())
        } else {
            Err(self.unexpected(&lexeme))
        }
    }

    fn expect_reserved(&mut self, want: &str) -> Result<(), ParseError> {
        self.skip_newlines()?;
        let lexeme = self.lexer.advance()?;
        match &lexeme.token {
            Token::Word(w) if w.as_bare() == Some(want) => Ok(()),
            _ => Err(ParseError::new(
                format!("expected `{}'", want),
                lexeme.line,
            )),
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        let lexeme = self.lexer.advance()?;
        match &lexeme.token {
            Token::Word(w) => match w.as_bare() {
                Some(text) if is_identifier(text) => Ok(text.to_string()),
                _ => Err(ParseError::new("expected a name", lexeme.line)),
            },
            _ => Err(ParseError::new("expected a name", lexeme.line)),
        }
    }

    fn expect_word(&mut self) -> Result<Word, ParseError> {
        let lexeme = self.lexer.advance()?;
        match lexeme.token {
            Token::Word(w) => Ok(w),
            _ => Err(ParseError::new("expected a word", lexeme.line)),
        }
    }

    /// Consume statement separators between a header and its body
    /// (`if x; then`, `if x\nthen`).
    fn skip_separators(&mut self) -> Result<(), ParseError> {
        loop {
            match self.lexer.peek()?.token {
                Token::Newline | Token::Op(Op::Semi) => {
                    self.lexer.advance()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_if(&mut self) -> Result<Command, ParseError> {
        self.lexer.advance()?; // "if"
        let mut arms = Vec::new();

        let cond = self.parse_statements(&["then"])?;
        self.expect_reserved("then")?;
        let body = self.parse_statements(&[])?;
        arms.push((cond, body));

        let mut else_body = None;
        loop {
            self.skip_newlines()?;
            match self.lexer.peek_bare()?.as_deref() {
                Some("elif") => {
                    self.lexer.advance()?;
                    let cond = self.parse_statements(&["then"])?;
                    self.expect_reserved("then")?;
                    let body = self.parse_statements(&[])?;
                    arms.push((cond, body));
                }
                Some("else") => {
                    self.lexer.advance()?;
                    else_body = Some(self.parse_statements(&[])?);
                }
                Some("fi") => {
                    self.lexer.advance()?;
                    break;
                }
                _ => {
                    let next = self.lexer.peek()?.clone();
                    return Err(self.unexpected(&next));
                }
            }
        }

        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::Compound(
            CompoundCommand::If { arms, else_body },
            redirections,
        ))
    }

    fn parse_while(&mut self, until: bool) -> Result<Command, ParseError> {
        self.lexer.advance()?; // "while" / "until"
        let cond = self.parse_statements(&["do"])?;
        self.expect_reserved("do")?;
        let body = self.parse_statements(&[])?;
        self.expect_reserved("done")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::Compound(
            CompoundCommand::While { cond, body, until },
            redirections,
        ))
    }

    fn parse_for(&mut self) -> Result<Command, ParseError> {
        let for_lexeme = self.lexer.advance()?; // "for"

        // for (( init; cond; update ))
        if self.lexer.peek()?.token == Token::Op(Op::DLParen) {
            self.lexer.advance()?;
            let body_text = self.lexer.capture_double_paren()?;
            let mut parts = body_text.splitn(3, ';');
            let parse_part = |part: Option<&str>| -> Result<Option<crate::ast::ArithExpr>, ParseError> {
                match part.map(str::trim) {
                    None | Some("") => Ok(None),
                    Some(text) => arith::parse(text)
                        .map(Some)
                        .map_err(|m| ParseError::new(m, for_lexeme.line)),
                }
            };
            let init = parse_part(parts.next())?;
            let cond = parse_part(parts.next())?;
            let update = parse_part(parts.next())?;

            self.skip_separators()?;
            self.expect_reserved("do")?;
            let body = self.parse_statements(&[])?;
            self.expect_reserved("done")?;
            let redirections = self.parse_trailing_redirections()?;
            return Ok(Command::Compound(
                CompoundCommand::ForArith {
                    init,
                    cond,
                    update,
                    body,
                },
                redirections,
            ));
        }

        let var = self.expect_name()?;
        self.skip_separators()?;

        let words = if self.lexer.peek_bare()?.as_deref() == Some("in") {
            self.lexer.advance()?;
            let mut words = Vec::new();
            loop {
                match &self.lexer.peek()?.token {
                    Token::Word(_) => {
                        words.push(self.expect_word()?);
                    }
                    _ => break,
                }
            }
            self.skip_separators()?;
            Some(words)
        } else {
            None
        };

        self.expect_reserved("do")?;
        let body = self.parse_statements(&[])?;
        self.expect_reserved("done")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::Compound(
            CompoundCommand::For { var, words, body },
            redirections,
        ))
    }

    fn parse_case(&mut self) -> Result<Command, ParseError> {
        self.lexer.advance()?; // "case"
        let subject = self.expect_word()?;
        self.expect_reserved("in")?;

        let mut arms = Vec::new();
        loop {
            self.skip_newlines()?;
            if self.lexer.peek_bare()?.as_deref() == Some("esac") {
                self.lexer.advance()?;
                break;
            }

            // Optional leading ( before the pattern list.
            if self.lexer.peek()?.token == Token::Op(Op::LParen) {
                self.lexer.advance()?;
            }
            let mut patterns = vec![self.expect_word()?];
            while self.lexer.peek()?.token == Token::Op(Op::Pipe) {
                self.lexer.advance()?;
                patterns.push(self.expect_word()?);
            }
            self.expect_op(Op::RParen)?;

            let body = self.parse_statements(&["esac"])?;

            let fallthrough = match self.lexer.peek()?.token {
                Token::Op(Op::DSemi) => {
                    self.lexer.advance()?;
                    CaseFallthrough::None
                }
                Token::Op(Op::SemiAnd) => {
                    self.lexer.advance()?;
                    CaseFallthrough::Body
                }
                Token::Op(Op::DSemiAnd) => {
                    self.lexer.advance()?;
                    CaseFallthrough::Patterns
                }
                // The last arm may omit its terminator.
                _ => CaseFallthrough::None,
            };
            arms.push(CaseArm {
                patterns,
                body,
                fallthrough,
            });
        }

        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::Compound(
            CompoundCommand::Case { subject, arms },
            redirections,
        ))
    }

    fn parse_brace_group(&mut self) -> Result<Command, ParseError> {
        self.lexer.advance()?; // "{"
        let body = self.parse_statements(&[])?;
        self.expect_reserved("}")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::Compound(
            CompoundCommand::BraceGroup(body),
            redirections,
        ))
    }

    // -- [[ ]] --------------------------------------------------------------

    fn parse_cond_command(&mut self) -> Result<Command, ParseError> {
        let open = self.lexer.advance()?; // "[["
        let expr = self.parse_cond_or()?;
        let close = self.lexer.advance()?;
        match &close.token {
            Token::Word(w) if w.as_bare() == Some("]]") => {}
            _ => return Err(ParseError::new("expected `]]'", open.line)),
        }
        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::Compound(CompoundCommand::Cond(expr), redirections))
    }

    fn parse_cond_or(&mut self) -> Result<CondExpr, ParseError> {
        let mut lhs = self.parse_cond_and()?;
        while self.lexer.peek()?.token == Token::Op(Op::OrIf) {
            self.lexer.advance()?;
            let rhs = self.parse_cond_and()?;
            lhs = CondExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cond_and(&mut self) -> Result<CondExpr, ParseError> {
        let mut lhs = self.parse_cond_not()?;
        while self.lexer.peek()?.token == Token::Op(Op::AndIf) {
            self.lexer.advance()?;
            let rhs = self.parse_cond_not()?;
            lhs = CondExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cond_not(&mut self) -> Result<CondExpr, ParseError> {
        if self.lexer.peek_bare()?.as_deref() == Some("!") {
            self.lexer.advance()?;
            return Ok(CondExpr::Not(Box::new(self.parse_cond_not()?)));
        }
        if self.lexer.peek()?.token == Token::Op(Op::LParen) {
            self.lexer.advance()?;
            let inner = self.parse_cond_or()?;
            self.expect_op(Op::RParen)?;
            return Ok(inner);
        }
        self.parse_cond_primary()
    }

    fn parse_cond_primary(&mut self) -> Result<CondExpr, ParseError> {
        let lexeme = self.lexer.advance()?;
        let word = match lexeme.token {
            Token::Word(w) => w,
            other => {
                return Err(self.unexpected(&Lexeme {
                    token: other,
                    io_number: lexeme.io_number,
                    line: lexeme.line,
                    start: lexeme.start,
                    end: lexeme.end,
                }))
            }
        };

        // Unary operator?
        if let Some(op_text) = word.as_bare() {
            if op_text.len() == 2 && op_text.starts_with('-') {
                if let Token::Word(_) = self.lexer.peek()?.token {
                    let operand = self.expect_word()?;
                    return Ok(CondExpr::Unary {
                        op: op_text.to_string(),
                        operand,
                    });
                }
            }
        }

        // Binary operator after the first operand?
        if let Some(op_text) = self.lexer.peek_bare()? {
            if let Some(op) = cond_binary_op(&op_text) {
                self.lexer.advance()?;
                let rhs = self.expect_word()?;
                return Ok(CondExpr::Binary {
                    op,
                    lhs: word,
                    rhs,
                });
            }
        }

        Ok(CondExpr::Word(word))
    }
}

fn cond_binary_op(text: &str) -> Option<CondBinaryOp> {
    Some(match text {
        "=" | "==" => CondBinaryOp::StrEq,
        "!=" => CondBinaryOp::StrNe,
        "=~" => CondBinaryOp::Match,
        "<" => CondBinaryOp::StrLt,
        ">" => CondBinaryOp::StrGt,
        "-eq" => CondBinaryOp::NumEq,
        "-ne" => CondBinaryOp::NumNe,
        "-lt" => CondBinaryOp::NumLt,
        "-le" => CondBinaryOp::NumLe,
        "-gt" => CondBinaryOp::NumGt,
        "-ge" => CondBinaryOp::NumGe,
        "-nt" => CondBinaryOp::NewerThan,
        "-ot" => CondBinaryOp::OlderThan,
        "-ef" => CondBinaryOp::SameFile,
        _ => return None,
    })
}

/// A word in prefix position of the form `NAME=value` / `NAME+=value`.
fn to_assignment(word: &Word) -> Option<Assignment> {
    let first = word.pieces.first()?;
    let WordPiece::Bare(text) = first else {
        return None;
    };
    let eq = text.find('=')?;
    let (name, append) = if eq > 0 && text.as_bytes()[eq - 1] == b'+' {
        (&text[..eq - 1], true)
    } else {
        (&text[..eq], false)
    };
    if !is_identifier(name) {
        return None;
    }

    let mut value_pieces = Vec::new();
    let rest = &text[eq + 1..];
    if !rest.is_empty() {
        value_pieces.push(WordPiece::Bare(rest.to_string()));
    }
    value_pieces.extend(word.pieces.iter().skip(1).cloned());
    Some(Assignment {
        name: name.to_string(),
        value: Word {
            pieces: value_pieces,
        },
        append,
    })
}

// ============================================================================
// Tests
// ============================================================================
