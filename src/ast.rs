//! Syntax tree for shell source.
//!
//! Everything the parser can produce, as plain tagged variants. A script
//! is a list of statements; a statement is pipelines joined by `&&`/`||`/
//! `;` with an optional trailing `&`; a pipeline is commands joined by
//! `|`. Words keep their quote provenance as a list of [`WordPiece`]s so
//! the expander can tell `$x` from `'$x'` and decide field splitting and
//! globbing long after parsing.

/// A whole parsed input: `-c` string, script file, or one interactive
/// submission.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub statements: Vec<Statement>,
}

/// Pipelines joined by `&&` / `||`, optionally backgrounded. A `;` ends
/// the statement; the next command starts a fresh one.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub pipelines: Vec<Pipeline>,
    /// `connectors[i]` sits between `pipelines[i]` and `pipelines[i+1]`.
    pub connectors: Vec<Connector>,
    pub background: bool,
    /// Original source text, for `set -v` and the job table.
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    AndIf,
    OrIf,
}

/// Commands joined by `|`; `!` negates the final status.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Simple(SimpleCommand),
    Compound(CompoundCommand, Vec<Redirection>),
    FunctionDef(FunctionDef),
}

/// `NAME=v ... cmd args... redirections...`; `words[0]` is argv[0]. A
/// command may be assignments-only (`words` empty).
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCommand {
    pub assignments: Vec<Assignment>,
    pub words: Vec<Word>,
    pub redirections: Vec<Redirection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: Word,
    /// `NAME+=value`
    pub append: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompoundCommand {
    If {
        /// `(condition, body)` for the `if` and each `elif`.
        arms: Vec<(Vec<Statement>, Vec<Statement>)>,
        else_body: Option<Vec<Statement>>,
    },
    While {
        cond: Vec<Statement>,
        body: Vec<Statement>,
        /// `until` inverts the condition.
        until: bool,
    },
    For {
        var: String,
        /// `None` means iterate over `"$@"`.
        words: Option<Vec<Word>>,
        body: Vec<Statement>,
    },
    ForArith {
        init: Option<ArithExpr>,
        cond: Option<ArithExpr>,
        update: Option<ArithExpr>,
        body: Vec<Statement>,
    },
    Case {
        subject: Word,
        arms: Vec<CaseArm>,
    },
    BraceGroup(Vec<Statement>),
    Subshell(Vec<Statement>),
    /// `(( expr ))`
    Arith(ArithExpr),
    /// `[[ expr ]]`
    Cond(CondExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub patterns: Vec<Word>,
    pub body: Vec<Statement>,
    pub fallthrough: CaseFallthrough,
}

/// What the arm terminator says about the next arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFallthrough {
    /// `;;` - done.
    None,
    /// `;&` - run the next arm's body without matching.
    Body,
    /// `;;&` - keep trying later patterns.
    Patterns,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    /// The function body is a compound command (with its own redirections).
    pub body: Box<Command>,
}

// ---------------------------------------------------------------------------
// Redirections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Redirection {
    /// Explicit fd (`2>`), or the operator's default (0 for input, 1 for
    /// output).
    pub fd: Option<i32>,
    pub op: RedirOp,
    pub target: RedirTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirOp {
    /// `<`
    In,
    /// `>`
    Out,
    /// `>>`
    Append,
    /// `>|`
    Clobber,
    /// `<>`
    ReadWrite,
    /// `<&` - duplicate onto fd from target (`-` closes)
    DupIn,
    /// `>&` - duplicate, or `>& file` shorthand
    DupOut,
    /// `<<` / `<<-`
    HereDoc,
    /// `<<<`
    HereString,
    /// `&>`
    OutErr,
    /// `&>>`
    AppendOutErr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedirTarget {
    Word(Word),
    HereDoc(HereDoc),
}

/// Body lines were collected (and `<<-`-tab-stripped) during
/// preprocessing; a quoted delimiter leaves the body as one literal
/// piece, an unquoted one parses it for `$`/`` ` `` expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct HereDoc {
    pub body: Word,
    pub quoted: bool,
}

// ---------------------------------------------------------------------------
// Words
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Word {
    pub pieces: Vec<WordPiece>,
}

impl Word {
    pub fn bare(text: impl Into<String>) -> Self {
        Word {
            pieces: vec![WordPiece::Bare(text.into())],
        }
    }

    /// The word's text when it is a single unquoted literal - the form
    /// reserved words, assignment names, and alias lookups require.
    pub fn as_bare(&self) -> Option<&str> {
        match self.pieces.as_slice() {
            [WordPiece::Bare(text)] => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WordPiece {
    /// Unquoted literal run; glob characters in it are live.
    Bare(String),
    /// Text from `'...'` or a backslash escape; always literal.
    Quoted(String),
    /// `"..."` - inner expansions happen, no field splitting.
    Double(Vec<WordPiece>),
    /// `$NAME` / `${NAME...}`
    Param(Box<ParamExpr>),
    /// `$(...)` or backticks.
    CmdSub(Script),
    /// `$(( ... ))`
    ArithSub(ArithExpr),
    /// `<(...)` / `>(...)`; `write` for the `>()` side.
    ProcSub { script: Script, write: bool },
    /// `~` or `~user` at the start of an unquoted word.
    Tilde(String),
    /// `{a,b}` / `{1..9}` alternation, expanded first.
    Brace(Vec<BraceItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BraceItem {
    Word(Word),
    NumRange(i64, i64),
    CharRange(char, char),
}

// ---------------------------------------------------------------------------
// Parameter expansion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ParamExpr {
    pub name: String,
    pub op: ParamOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamOp {
    /// `$NAME` / `${NAME}`
    Plain,
    /// `${#NAME}`
    Length,
    /// `${NAME:-w}` / `${NAME-w}`
    Default { word: Word, check_empty: bool },
    /// `${NAME:=w}` / `${NAME=w}`
    Assign { word: Word, check_empty: bool },
    /// `${NAME:?w}` / `${NAME?w}`
    Error { word: Option<Word>, check_empty: bool },
    /// `${NAME:+w}` / `${NAME+w}`
    Alternative { word: Word, check_empty: bool },
    /// `${NAME#p}` / `${NAME##p}`
    StripPrefix { pattern: Word, longest: bool },
    /// `${NAME%p}` / `${NAME%%p}`
    StripSuffix { pattern: Word, longest: bool },
    /// `${NAME/p/r}` / `${NAME//p/r}`
    Replace {
        pattern: Word,
        replacement: Option<Word>,
        all: bool,
    },
    /// `${NAME^}` `${NAME^^}` `${NAME,}` `${NAME,,}`
    CaseConvert { upper: bool, all: bool },
    /// `${!NAME}`
    Indirect,
}

// ---------------------------------------------------------------------------
// Arithmetic expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ArithExpr {
    Number(i64),
    /// A name read from the variable store (0 when unset).
    Var(String),
    Unary(ArithUnaryOp, Box<ArithExpr>),
    Binary(ArithBinaryOp, Box<ArithExpr>, Box<ArithExpr>),
    /// `x = e`, `x += e`, ... (`op` is the compound half, if any).
    Assign {
        name: String,
        op: Option<ArithBinaryOp>,
        value: Box<ArithExpr>,
    },
    /// `++x` / `--x` (`delta` is +1 or -1); yields the new value.
    PreIncr { name: String, delta: i64 },
    /// `x++` / `x--`; yields the old value.
    PostIncr { name: String, delta: i64 },
    Ternary {
        cond: Box<ArithExpr>,
        then: Box<ArithExpr>,
        otherwise: Box<ArithExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithUnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogAnd,
    LogOr,
}

// ---------------------------------------------------------------------------
// [[ ]] conditional expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    And(Box<CondExpr>, Box<CondExpr>),
    Or(Box<CondExpr>, Box<CondExpr>),
    Not(Box<CondExpr>),
    /// `-f x`, `-z x`, ... (`op` keeps its source spelling).
    Unary { op: String, operand: Word },
    Binary { op: CondBinaryOp, lhs: Word, rhs: Word },
    /// Bare word: true iff non-empty after expansion.
    Word(Word),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondBinaryOp {
    /// `=` / `==` - pattern match unless the right side is quoted.
    StrEq,
    /// `!=`
    StrNe,
    /// `=~`
    Match,
    StrLt,
    StrGt,
    NumEq,
    NumNe,
    NumLt,
    NumLe,
    NumGt,
    NumGe,
    /// `-nt`
    NewerThan,
    /// `-ot`
    OlderThan,
    /// `-ef`
    SameFile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_word_round_trip() {
        let w = Word::bare("ls");
        assert_eq!(w.as_bare(), Some("ls"));
    }

    #[test]
    fn non_literal_word_is_not_bare() {
        let w = Word {
            pieces: vec![WordPiece::Quoted("ls".to_string())],
        };
        assert_eq!(w.as_bare(), None);
        let w = Word {
            pieces: vec![
                WordPiece::Bare("a".to_string()),
                WordPiece::Bare("b".to_string()),
            ],
        };
        assert_eq!(w.as_bare(), None);
    }
}
