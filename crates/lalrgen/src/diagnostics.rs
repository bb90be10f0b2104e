//! Diagnostics delivered to the error collaborator.
//!
//! The generator never formats messages itself: every report is a structured
//! value carrying its operands, and rendering is left to the sink.

use std::fmt;

/// Classification of a diagnostic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Syntax,
    UnterminatedLiteral,
    UndefinedSymbol,
    UndefinedStartSymbol,
    DuplicateProduction,
    EmptyGrammar,
    UnreachableNonterminal,
    UselessProduction,
    UnreferencedSymbol,
    ParseTableConflict,
    LexicalConflict,
    InternalLimit,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl ErrorCode {
    pub fn severity(self) -> Severity {
        match self {
            Self::EmptyGrammar
            | Self::UnreachableNonterminal
            | Self::UselessProduction
            | Self::UnreferencedSymbol
            | Self::ParseTableConflict => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// The typed payload of a diagnostic.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Detail {
    #[error("parsing grammar failed")]
    MalformedGrammar,

    #[error("expected `{expected}` not found")]
    Expected { expected: &'static str },

    #[error("unterminated literal")]
    UnterminatedLiteral,

    #[error("undefined symbol `{name}`")]
    UndefinedSymbol { name: String },

    #[error("`{name}` is reserved and cannot head a production")]
    ReservedSymbol { name: String },

    #[error("the grammar defines no productions")]
    UndefinedStartSymbol,

    #[error("duplicate production `{production}`")]
    DuplicateProduction { production: String },

    #[error("the start symbol `{start}` derives no sentences")]
    EmptyGrammar { start: String },

    #[error("nonterminal `{name}` is unreachable from the start symbol")]
    UnreachableNonterminal { name: String },

    #[error("production `{production}` can never be reduced")]
    UselessProduction { production: String },

    #[error("symbol `{name}` is not used by any production")]
    UnreferencedSymbol { name: String },

    #[error("shift/reduce conflict on `{terminal}`, keeping shift over `{reduction}`")]
    ShiftReduceConflict { terminal: String, reduction: String },

    #[error("reduce/reduce conflict on `{terminal}`, keeping `{kept}` over `{dropped}`")]
    ReduceReduceConflict {
        terminal: String,
        kept: String,
        dropped: String,
    },

    #[error("lexical conflict between `{first}` and `{second}`")]
    LexicalConflict { first: String, second: String },

    #[error("internal limit exceeded: {what} (cap {cap})")]
    InternalLimit { what: &'static str, cap: usize },
}

impl Detail {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedGrammar | Self::Expected { .. } | Self::ReservedSymbol { .. } => {
                ErrorCode::Syntax
            }
            Self::UnterminatedLiteral => ErrorCode::UnterminatedLiteral,
            Self::UndefinedSymbol { .. } => ErrorCode::UndefinedSymbol,
            Self::UndefinedStartSymbol => ErrorCode::UndefinedStartSymbol,
            Self::DuplicateProduction { .. } => ErrorCode::DuplicateProduction,
            Self::EmptyGrammar { .. } => ErrorCode::EmptyGrammar,
            Self::UnreachableNonterminal { .. } => ErrorCode::UnreachableNonterminal,
            Self::UselessProduction { .. } => ErrorCode::UselessProduction,
            Self::UnreferencedSymbol { .. } => ErrorCode::UnreferencedSymbol,
            Self::ShiftReduceConflict { .. } | Self::ReduceReduceConflict { .. } => {
                ErrorCode::ParseTableConflict
            }
            Self::LexicalConflict { .. } => ErrorCode::LexicalConflict,
            Self::InternalLimit { .. } => ErrorCode::InternalLimit,
        }
    }
}

/// A single report, positioned in the grammar source when a position is known.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub detail: Detail,
}

impl Diagnostic {
    pub fn new(line: u32, detail: Detail) -> Self {
        Self {
            line,
            column: 0,
            detail,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.detail.code()
    }

    pub fn severity(&self) -> Severity {
        self.code().severity()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity() {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}({}): {}", severity, self.line, self.detail)
    }
}

/// The error collaborator: a synchronous sink for diagnostics.
///
/// Reports arrive strictly sequentially during generation; a sink never has
/// to cope with concurrent calls.
pub trait Report {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// A sink that retains everything it receives.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, code: ErrorCode) -> bool {
        self.items.iter().any(|d| d.code() == code)
    }

    pub fn errors(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity() == Severity::Error)
            .count()
    }

    pub fn warnings(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
            .count()
    }
}

impl Report for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }
}

/// Counting adapter wrapped around the caller's sink by the pipeline.
pub(crate) struct Counted<'a> {
    inner: &'a mut dyn Report,
    pub(crate) errors: usize,
    pub(crate) warnings: usize,
}

impl<'a> Counted<'a> {
    pub(crate) fn new(inner: &'a mut dyn Report) -> Self {
        Self {
            inner,
            errors: 0,
            warnings: 0,
        }
    }
}

impl Report for Counted<'_> {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }
        self.inner.report(diagnostic);
    }
}
