//! Grammar model: symbols, productions, precedence classes and the builder
//! facade driven by the grammar front-end.

use crate::{
    diagnostics::{Detail, Diagnostic, Report},
    types::Map,
    util::display_fn,
};
use std::fmt;

const SYMBOL_LIMIT: usize = u16::MAX as usize - 4;
const PRODUCTION_LIMIT: usize = u16::MAX as usize - 1;

/// Dense index of a symbol in a finalized grammar.
///
/// Nonterminals come first (`$accept` at slot 0), followed by the terminal
/// block whose two leading slots are reserved for `$end` and `error`; the
/// `$null` placeholder takes the final slot.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolID(u16);

impl SymbolID {
    /// The augmented start symbol `$accept`.
    pub const ACCEPT: Self = Self(0);

    pub(crate) const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "y#{:03}", self.0)
    }
}

/// Dense index of a production in a finalized grammar.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductionID(u16);

impl ProductionID {
    /// The augmented production `$accept : start $end`.
    pub const ACCEPT: Self = Self(0);

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ProductionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p#{:03}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Nonterminal,
    Terminal,
    EndOfInput,
    Error,
    Null,
}

impl SymbolKind {
    /// Whether the symbol occupies a column of the action table.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal | Self::EndOfInput | Self::Error)
    }
}

/// How a terminal is recognized by the scanner.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LexemeKind {
    None,
    Literal,
    Regex,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assoc {
    None,
    Left,
    Right,
}

#[derive(Debug)]
pub struct Symbol {
    identifier: String,
    kind: SymbolKind,
    lexeme_kind: LexemeKind,
    precedence: u16,
    assoc: Assoc,
    line: u32,
}

impl Symbol {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn lexeme_kind(&self) -> LexemeKind {
        self.lexeme_kind
    }

    /// Precedence level, `0` meaning unspecified.
    pub fn precedence(&self) -> u16 {
        self.precedence
    }

    pub fn assoc(&self) -> Assoc {
        self.assoc
    }

    /// Line of the first appearance in the grammar source.
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[derive(Debug)]
pub struct Production {
    head: SymbolID,
    body: Vec<SymbolID>,
    precedence_symbol: Option<SymbolID>,
    action: Option<String>,
    line: u32,
}

impl Production {
    pub fn head(&self) -> SymbolID {
        self.head
    }

    pub fn body(&self) -> &[SymbolID] {
        &self.body
    }

    /// The symbol whose precedence governs reductions by this production:
    /// the explicit `%precedence` symbol, or the rightmost terminal of the
    /// body per the usual yacc rule.
    pub fn precedence_symbol(&self) -> Option<SymbolID> {
        self.precedence_symbol
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn precedence(&self, grammar: &Grammar) -> (u16, Assoc) {
        match self.precedence_symbol {
            Some(id) => {
                let symbol = grammar.symbol(id);
                (symbol.precedence, symbol.assoc)
            }
            None => (0, Assoc::None),
        }
    }

    pub fn display<'g>(&'g self, grammar: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            write!(f, "{} :", grammar.symbol(self.head).identifier())?;
            if self.body.is_empty() {
                f.write_str(" ε")?;
            }
            for &symbol in &self.body {
                write!(f, " {}", grammar.symbol(symbol).identifier())?;
            }
            Ok(())
        })
    }
}

/// A whitespace pattern registered with `%whitespace`.
#[derive(Debug, Clone)]
pub struct WhitespacePattern {
    pub pattern: String,
    pub line: u32,
}

/// A set of symbols backed by a bit vector.
///
/// Used for FIRST and lookahead sets, which are subsets of the terminal
/// block of the dense symbol index space.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SymbolSet {
    inner: bit_set::BitSet,
}

impl SymbolSet {
    pub fn contains(&self, id: SymbolID) -> bool {
        self.inner.contains(id.index())
    }

    pub fn insert(&mut self, id: SymbolID) -> bool {
        self.inner.insert(id.index())
    }

    pub fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SymbolID> + '_ {
        self.inner
            .iter()
            .map(|raw| SymbolID(raw.try_into().expect("symbol index out of range")))
    }
}

impl FromIterator<SymbolID> for SymbolSet {
    fn from_iter<I: IntoIterator<Item = SymbolID>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().map(|id| id.index()).collect(),
        }
    }
}

/// A finalized grammar: flat symbol and production tables referenced by
/// dense index everywhere downstream.
#[derive(Debug)]
pub struct Grammar {
    name: String,
    symbols: Vec<Symbol>,
    productions: Vec<Production>,
    nonterminal_count: u16,
    terminal_count: u16,
    start: SymbolID,
    eoi: SymbolID,
    error: SymbolID,
    null: SymbolID,
    whitespace: Vec<WhitespacePattern>,
}

impl Grammar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self, id: SymbolID) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| (SymbolID(i as u16), symbol))
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols()
            .filter(|(_, symbol)| symbol.kind == SymbolKind::Nonterminal)
    }

    pub fn terminals(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols().filter(|(_, symbol)| symbol.is_terminal())
    }

    pub fn production(&self, id: ProductionID) -> &Production {
        &self.productions[id.index()]
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionID, &Production)> + '_ {
        self.productions
            .iter()
            .enumerate()
            .map(|(i, production)| (ProductionID(i as u16), production))
    }

    pub fn productions_of(
        &self,
        head: SymbolID,
    ) -> impl Iterator<Item = (ProductionID, &Production)> + '_ {
        self.productions()
            .filter(move |(_, production)| production.head == head)
    }

    pub fn nonterminal_count(&self) -> usize {
        self.nonterminal_count as usize
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal_count as usize
    }

    /// Column of a terminal within a packed action row.
    pub fn terminal_index(&self, id: SymbolID) -> usize {
        debug_assert!(self.symbol(id).is_terminal());
        id.index() - self.nonterminal_count as usize
    }

    pub fn start_symbol(&self) -> SymbolID {
        self.start
    }

    pub fn eoi_symbol(&self) -> SymbolID {
        self.eoi
    }

    pub fn error_symbol(&self) -> SymbolID {
        self.error
    }

    pub fn null_symbol(&self) -> SymbolID {
        self.null
    }

    pub fn whitespace(&self) -> &[WhitespacePattern] {
        &self.whitespace
    }

    /// Look up a terminal by its identifier (the lexeme for literals and
    /// regexes).
    pub fn terminal(&self, identifier: &str) -> Option<SymbolID> {
        self.terminals()
            .find(|(_, symbol)| symbol.identifier == identifier)
            .map(|(id, _)| id)
    }

    pub fn nonterminal(&self, identifier: &str) -> Option<SymbolID> {
        self.nonterminals()
            .find(|(_, symbol)| symbol.identifier == identifier)
            .map(|(id, _)| id)
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "grammar: {}", self.name)?;
        write!(f, "terminals:")?;
        for (_, symbol) in self.terminals() {
            write!(f, " {}", symbol.identifier())?;
        }
        write!(f, "\nnonterminals:")?;
        for (_, symbol) in self.nonterminals() {
            write!(f, " {}", symbol.identifier())?;
        }
        writeln!(f, "\nproductions:")?;
        for (id, production) in self.productions() {
            writeln!(f, "  [{:02}] {}", id.index(), production.display(self))?;
        }
        Ok(())
    }
}

// ==== builder ====

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SymbolKey {
    name: String,
    lexeme_kind: LexemeKind,
}

#[derive(Debug)]
struct PendingSymbol {
    key: SymbolKey,
    precedence: u16,
    assoc: Assoc,
    line: u32,
    reserved_error: bool,
}

#[derive(Debug)]
struct PendingProduction {
    head: u16,
    body: Vec<u16>,
    precedence_symbol: Option<u16>,
    action: Option<String>,
    line: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BuilderState {
    Idle,
    /// Inside an associativity directive: symbols join the open precedence
    /// level.
    Associativity(Assoc),
    /// After `%whitespace`: the next regex is a skip pattern.
    Whitespace,
    /// Inside a production alternative: symbols extend the body.
    Body,
    /// After `%precedence`: the next symbol overrides the reduction
    /// precedence of the current alternative.
    PrecedenceSymbol,
}

/// Fluent builder shared by the grammar front-end and programmatic callers.
///
/// The builder is an explicit state machine: directive operations switch how
/// the symbol operations that follow are interpreted. Operations that do not
/// fit the current state are ignored; all semantic validation happens in
/// [`GrammarBuilder::finalize`].
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    name: String,
    symbols: Vec<PendingSymbol>,
    interned: Map<SymbolKey, u16>,
    alternatives: Vec<PendingProduction>,
    current: Option<PendingProduction>,
    whitespace: Vec<WhitespacePattern>,
    state: BuilderState,
    precedence_level: u16,
}

impl Default for BuilderState {
    fn default() -> Self {
        Self::Idle
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the grammar name; ignored once the first production has begun.
    pub fn grammar(&mut self, name: &str) -> &mut Self {
        if self.alternatives.is_empty() && self.current.is_none() {
            self.name = name.to_owned();
        }
        self
    }

    /// Open a new left-associative precedence level.
    pub fn left(&mut self) -> &mut Self {
        self.begin_associativity(Assoc::Left)
    }

    /// Open a new right-associative precedence level.
    pub fn right(&mut self) -> &mut Self {
        self.begin_associativity(Assoc::Right)
    }

    /// Open a new non-associative precedence level.
    pub fn none(&mut self) -> &mut Self {
        self.begin_associativity(Assoc::None)
    }

    fn begin_associativity(&mut self, assoc: Assoc) -> &mut Self {
        self.precedence_level += 1;
        self.state = BuilderState::Associativity(assoc);
        self
    }

    /// Begin a whitespace directive; the next regex registers a skip pattern.
    pub fn whitespace(&mut self) -> &mut Self {
        self.state = BuilderState::Whitespace;
        self
    }

    /// Attach an explicit precedence symbol to the current alternative.
    pub fn precedence(&mut self) -> &mut Self {
        if self.current.is_some() {
            self.state = BuilderState::PrecedenceSymbol;
        }
        self
    }

    /// Begin defining productions for `head`; repeated calls with the same
    /// head append further alternatives.
    pub fn production(&mut self, head: &str, line: u32) -> &mut Self {
        self.flush_alternative();
        let head = self.intern(
            SymbolKey {
                name: head.to_owned(),
                lexeme_kind: LexemeKind::None,
            },
            line,
        );
        self.current = Some(PendingProduction {
            head,
            body: Vec::new(),
            precedence_symbol: None,
            action: None,
            line,
        });
        self.state = BuilderState::Body;
        self
    }

    /// Terminate the current alternative without a semantic action.
    pub fn end_expression(&mut self, line: u32) -> &mut Self {
        if let Some(current) = self.current.as_mut() {
            let head = current.head;
            let mut finished = std::mem::replace(
                current,
                PendingProduction {
                    head,
                    body: Vec::new(),
                    precedence_symbol: None,
                    action: None,
                    line,
                },
            );
            finished.line = line;
            self.alternatives.push(finished);
            self.state = BuilderState::Body;
        }
        self
    }

    /// Attach a semantic action tag, terminating the current alternative.
    pub fn action(&mut self, tag: &str, line: u32) -> &mut Self {
        if let Some(current) = self.current.as_mut() {
            current.action = Some(tag.to_owned());
        }
        self.end_expression(line)
    }

    /// Terminate the current production statement.
    pub fn end_production(&mut self) -> &mut Self {
        self.current = None;
        self.state = BuilderState::Idle;
        self
    }

    /// Append a nonterminal (or precedence) reference by name.
    pub fn identifier(&mut self, name: &str, line: u32) -> &mut Self {
        if name == "error" {
            return self.error(line);
        }
        let id = self.intern(
            SymbolKey {
                name: name.to_owned(),
                lexeme_kind: LexemeKind::None,
            },
            line,
        );
        self.apply_symbol(id);
        self
    }

    /// Append a literal terminal.
    pub fn literal(&mut self, lexeme: &str, line: u32) -> &mut Self {
        let id = self.intern(
            SymbolKey {
                name: lexeme.to_owned(),
                lexeme_kind: LexemeKind::Literal,
            },
            line,
        );
        self.apply_symbol(id);
        self
    }

    /// Append a regular-expression terminal, or register a whitespace
    /// pattern when one is expected.
    pub fn regex(&mut self, pattern: &str, line: u32) -> &mut Self {
        if self.state == BuilderState::Whitespace {
            self.whitespace.push(WhitespacePattern {
                pattern: pattern.to_owned(),
                line,
            });
            self.state = BuilderState::Idle;
            return self;
        }
        let id = self.intern(
            SymbolKey {
                name: pattern.to_owned(),
                lexeme_kind: LexemeKind::Regex,
            },
            line,
        );
        self.apply_symbol(id);
        self
    }

    /// Append the distinguished `error` pseudo-terminal.
    pub fn error(&mut self, line: u32) -> &mut Self {
        let id = self.intern(
            SymbolKey {
                name: "error".to_owned(),
                lexeme_kind: LexemeKind::None,
            },
            line,
        );
        self.apply_symbol(id);
        self
    }

    fn intern(&mut self, key: SymbolKey, line: u32) -> u16 {
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = self.symbols.len() as u16;
        let reserved_error = key.name == "error" && key.lexeme_kind == LexemeKind::None;
        self.symbols.push(PendingSymbol {
            key: key.clone(),
            precedence: 0,
            assoc: Assoc::None,
            line,
            reserved_error,
        });
        self.interned.insert(key, id);
        id
    }

    fn apply_symbol(&mut self, id: u16) {
        match self.state {
            BuilderState::Associativity(assoc) => {
                let symbol = &mut self.symbols[id as usize];
                symbol.precedence = self.precedence_level;
                symbol.assoc = assoc;
            }
            BuilderState::PrecedenceSymbol => {
                if let Some(current) = self.current.as_mut() {
                    current.precedence_symbol = Some(id);
                }
                self.state = BuilderState::Body;
            }
            BuilderState::Body => {
                if let Some(current) = self.current.as_mut() {
                    current.body.push(id);
                }
            }
            BuilderState::Idle | BuilderState::Whitespace => {}
        }
    }

    fn flush_alternative(&mut self) {
        // The front-end always closes statements with end_production; this
        // only matters for programmatic callers skipping it.
        if let Some(current) = self.current.take() {
            if !current.body.is_empty() || current.action.is_some() {
                self.alternatives.push(current);
            }
        }
    }

    /// Resolve symbol references, detect terminals, augment the grammar and
    /// assign the dense index space.
    ///
    /// Semantic errors are reported through `report`; `None` is returned if
    /// any occurred.
    pub fn finalize(mut self, report: &mut dyn Report) -> Option<Grammar> {
        self.flush_alternative();

        if self.alternatives.is_empty() {
            report.report(Diagnostic::new(1, Detail::UndefinedStartSymbol));
            return None;
        }
        if self.symbols.len() > SYMBOL_LIMIT {
            report.report(Diagnostic::new(
                0,
                Detail::InternalLimit {
                    what: "grammar symbols",
                    cap: SYMBOL_LIMIT,
                },
            ));
            return None;
        }
        if self.alternatives.len() > PRODUCTION_LIMIT {
            report.report(Diagnostic::new(
                0,
                Detail::InternalLimit {
                    what: "productions",
                    cap: PRODUCTION_LIMIT,
                },
            ));
            return None;
        }

        // A symbol is a nonterminal iff at least one alternative defines it.
        let mut has_productions = vec![false; self.symbols.len()];
        let mut reserved_heads = 0;
        for alternative in &self.alternatives {
            let head = &self.symbols[alternative.head as usize];
            if head.reserved_error {
                report.report(Diagnostic::new(
                    alternative.line,
                    Detail::ReservedSymbol {
                        name: head.key.name.clone(),
                    },
                ));
                reserved_heads += 1;
                continue;
            }
            has_productions[alternative.head as usize] = true;
        }
        if reserved_heads > 0 {
            return None;
        }

        let mut errors = 0;
        let mut nonterminals = Vec::new();
        let mut terminals = Vec::new();
        for (id, symbol) in self.symbols.iter().enumerate() {
            match symbol.key.lexeme_kind {
                LexemeKind::None if symbol.reserved_error => {}
                LexemeKind::None if has_productions[id] => nonterminals.push(id as u16),
                LexemeKind::None => {
                    report.report(Diagnostic::new(
                        symbol.line,
                        Detail::UndefinedSymbol {
                            name: symbol.key.name.clone(),
                        },
                    ));
                    errors += 1;
                }
                LexemeKind::Literal | LexemeKind::Regex => terminals.push(id as u16),
            }
        }
        if errors > 0 {
            return None;
        }

        // Dense index layout: $accept, nonterminals, $end, error, terminals,
        // $null.
        let nonterminal_count = 1 + nonterminals.len() as u16;
        let eoi = SymbolID(nonterminal_count);
        let error = SymbolID(nonterminal_count + 1);
        let null = SymbolID(nonterminal_count + 2 + terminals.len() as u16);

        let mut remap = vec![SymbolID::ACCEPT; self.symbols.len()];
        let mut symbols = Vec::with_capacity(self.symbols.len() + 4);
        symbols.push(Symbol {
            identifier: "$accept".to_owned(),
            kind: SymbolKind::Nonterminal,
            lexeme_kind: LexemeKind::None,
            precedence: 0,
            assoc: Assoc::None,
            line: 0,
        });
        for &id in &nonterminals {
            remap[id as usize] = SymbolID(symbols.len() as u16);
            let pending = &self.symbols[id as usize];
            symbols.push(Symbol {
                identifier: pending.key.name.clone(),
                kind: SymbolKind::Nonterminal,
                lexeme_kind: LexemeKind::None,
                precedence: pending.precedence,
                assoc: pending.assoc,
                line: pending.line,
            });
        }
        symbols.push(Symbol {
            identifier: "$end".to_owned(),
            kind: SymbolKind::EndOfInput,
            lexeme_kind: LexemeKind::None,
            precedence: 0,
            assoc: Assoc::None,
            line: 0,
        });
        let mut error_symbol = Symbol {
            identifier: "error".to_owned(),
            kind: SymbolKind::Error,
            lexeme_kind: LexemeKind::None,
            precedence: 0,
            assoc: Assoc::None,
            line: 0,
        };
        for (id, pending) in self.symbols.iter().enumerate() {
            if pending.reserved_error {
                remap[id] = error;
                error_symbol.precedence = pending.precedence;
                error_symbol.assoc = pending.assoc;
                error_symbol.line = pending.line;
            }
        }
        symbols.push(error_symbol);
        for &id in &terminals {
            remap[id as usize] = SymbolID(symbols.len() as u16);
            let pending = &self.symbols[id as usize];
            symbols.push(Symbol {
                identifier: pending.key.name.clone(),
                kind: SymbolKind::Terminal,
                lexeme_kind: pending.key.lexeme_kind,
                precedence: pending.precedence,
                assoc: pending.assoc,
                line: pending.line,
            });
        }
        symbols.push(Symbol {
            identifier: "$null".to_owned(),
            kind: SymbolKind::Null,
            lexeme_kind: LexemeKind::None,
            precedence: 0,
            assoc: Assoc::None,
            line: 0,
        });
        debug_assert_eq!(null.index(), symbols.len() - 1);

        let start = remap[self.alternatives[0].head as usize];

        let mut productions = Vec::with_capacity(self.alternatives.len() + 1);
        productions.push(Production {
            head: SymbolID::ACCEPT,
            body: vec![start, eoi],
            precedence_symbol: None,
            action: None,
            line: 0,
        });
        for alternative in &self.alternatives {
            productions.push(Production {
                head: remap[alternative.head as usize],
                body: alternative
                    .body
                    .iter()
                    .map(|&id| remap[id as usize])
                    .collect(),
                precedence_symbol: alternative
                    .precedence_symbol
                    .map(|id| remap[id as usize]),
                action: alternative.action.clone(),
                line: alternative.line,
            });
        }

        let grammar = Grammar {
            name: self.name,
            symbols,
            productions,
            nonterminal_count,
            terminal_count: 2 + terminals.len() as u16,
            start,
            eoi,
            error,
            null,
            whitespace: self.whitespace,
        };

        // Duplicate production signatures are declaration mistakes, not
        // conflicts the table compiler should paper over.
        let mut seen: Map<(SymbolID, Vec<SymbolID>), ProductionID> = Map::default();
        let mut duplicates = 0;
        for (id, production) in grammar.productions() {
            let signature = (production.head, production.body.clone());
            if seen.insert(signature, id).is_some() {
                report.report(Diagnostic::new(
                    production.line,
                    Detail::DuplicateProduction {
                        production: production.display(&grammar).to_string(),
                    },
                ));
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            return None;
        }

        Some(inherit_precedence(grammar))
    }
}

/// Give every production lacking an explicit `%precedence` symbol the
/// precedence of the rightmost terminal in its body.
fn inherit_precedence(mut grammar: Grammar) -> Grammar {
    for index in 0..grammar.productions.len() {
        if grammar.productions[index].precedence_symbol.is_some() {
            continue;
        }
        let inherited = grammar.productions[index]
            .body
            .iter()
            .rev()
            .copied()
            .find(|&id| grammar.symbols[id.index()].is_terminal());
        grammar.productions[index].precedence_symbol = inherited;
    }
    grammar
}

/// Report the structural warnings that do not block table generation:
/// nonterminals unreachable from the start symbol, productions that can
/// never be reduced, and a start symbol deriving no sentences.
pub(crate) fn lint(grammar: &Grammar, report: &mut dyn Report) {
    // Productive nonterminals, by fixpoint over the productions.
    let mut productive = SymbolSet::default();
    loop {
        let mut changed = false;
        for (_, production) in grammar.productions() {
            if productive.contains(production.head) {
                continue;
            }
            let realizable = production.body.iter().all(|&id| {
                grammar.symbol(id).is_terminal() || productive.contains(id)
            });
            if realizable {
                changed |= productive.insert(production.head);
            }
        }
        if !changed {
            break;
        }
    }

    // Nonterminals reachable from $accept.
    let mut reachable = SymbolSet::default();
    reachable.insert(SymbolID::ACCEPT);
    let mut stack = vec![SymbolID::ACCEPT];
    while let Some(head) = stack.pop() {
        for (_, production) in grammar.productions_of(head) {
            for &id in &production.body {
                if grammar.symbol(id).kind() == SymbolKind::Nonterminal && reachable.insert(id) {
                    stack.push(id);
                }
            }
        }
    }

    for (id, symbol) in grammar.nonterminals() {
        if id != SymbolID::ACCEPT && !reachable.contains(id) {
            report.report(Diagnostic::new(
                symbol.line(),
                Detail::UnreachableNonterminal {
                    name: symbol.identifier().to_owned(),
                },
            ));
        }
    }

    if !productive.contains(grammar.start_symbol()) {
        report.report(Diagnostic::new(
            grammar.symbol(grammar.start_symbol()).line(),
            Detail::EmptyGrammar {
                start: grammar.symbol(grammar.start_symbol()).identifier().to_owned(),
            },
        ));
    }

    for (id, production) in grammar.productions() {
        if id == ProductionID::ACCEPT || !reachable.contains(production.head) {
            continue;
        }
        let blocked = production.body.iter().any(|&id| {
            grammar.symbol(id).kind() == SymbolKind::Nonterminal && !productive.contains(id)
        });
        if blocked {
            report.report(Diagnostic::new(
                production.line,
                Detail::UselessProduction {
                    production: production.display(grammar).to_string(),
                },
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostics, ErrorCode};

    fn arithmetic() -> GrammarBuilder {
        let mut g = GrammarBuilder::new();
        g.grammar("arithmetic");
        g.left().literal("+", 1).literal("-", 1);
        g.left().literal("*", 2).literal("/", 2);
        g.production("expr", 3);
        g.identifier("expr", 3).literal("+", 3).identifier("expr", 3);
        g.end_expression(3);
        g.identifier("expr", 4).literal("*", 4).identifier("expr", 4);
        g.end_expression(4);
        g.regex("[0-9]+", 5);
        g.end_expression(5);
        g.end_production();
        g
    }

    #[test]
    fn finalize_assigns_dense_indices() {
        let mut diagnostics = Diagnostics::default();
        let grammar = arithmetic().finalize(&mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());

        assert_eq!(grammar.nonterminal_count(), 2); // $accept, expr
        assert_eq!(grammar.terminal_count(), 7); // $end, error, + - * / regex
        assert_eq!(grammar.symbol(SymbolID::ACCEPT).identifier(), "$accept");
        assert_eq!(grammar.symbol(grammar.eoi_symbol()).identifier(), "$end");
        assert_eq!(grammar.eoi_symbol().index(), grammar.nonterminal_count());
        assert_eq!(grammar.error_symbol().index(), grammar.nonterminal_count() + 1);
        assert_eq!(grammar.symbol(grammar.null_symbol()).kind(), SymbolKind::Null);

        let plus = grammar.terminal("+").unwrap();
        assert_eq!(grammar.symbol(plus).precedence(), 1);
        assert_eq!(grammar.symbol(plus).assoc(), Assoc::Left);
        let star = grammar.terminal("*").unwrap();
        assert_eq!(grammar.symbol(star).precedence(), 2);
    }

    #[test]
    fn productions_inherit_rightmost_terminal_precedence() {
        let mut diagnostics = Diagnostics::default();
        let grammar = arithmetic().finalize(&mut diagnostics).unwrap();

        let star = grammar.terminal("*").unwrap();
        let (_, with_star) = grammar
            .productions()
            .find(|(_, p)| p.body().contains(&star))
            .unwrap();
        assert_eq!(with_star.precedence_symbol(), Some(star));
        assert_eq!(with_star.precedence(&grammar), (2, Assoc::Left));

        // The regex alternative has no terminal operator to inherit from the
        // operator levels; it inherits the regex terminal itself.
        let regex = grammar.terminal("[0-9]+").unwrap();
        let (_, leaf) = grammar
            .productions()
            .find(|(_, p)| p.body() == [regex])
            .unwrap();
        assert_eq!(leaf.precedence(&grammar), (0, Assoc::None));
    }

    #[test]
    fn undefined_identifier_is_an_error() {
        let mut g = GrammarBuilder::new();
        g.production("a", 1);
        g.identifier("b", 1);
        g.end_expression(1);
        g.end_production();

        let mut diagnostics = Diagnostics::default();
        assert!(g.finalize(&mut diagnostics).is_none());
        assert!(diagnostics.contains(ErrorCode::UndefinedSymbol));
        assert!(diagnostics.iter().any(|d| matches!(
            &d.detail,
            Detail::UndefinedSymbol { name } if name == "b"
        )));
    }

    #[test]
    fn duplicate_alternatives_are_rejected() {
        let mut g = GrammarBuilder::new();
        g.production("a", 1);
        g.literal("x", 1);
        g.end_expression(1);
        g.literal("x", 2);
        g.end_expression(2);
        g.end_production();

        let mut diagnostics = Diagnostics::default();
        assert!(g.finalize(&mut diagnostics).is_none());
        assert!(diagnostics.contains(ErrorCode::DuplicateProduction));
    }

    #[test]
    fn grammar_without_productions_has_no_start_symbol() {
        let mut diagnostics = Diagnostics::default();
        assert!(GrammarBuilder::new().finalize(&mut diagnostics).is_none());
        assert!(diagnostics.contains(ErrorCode::UndefinedStartSymbol));
    }

    #[test]
    fn literal_and_regex_with_same_spelling_stay_distinct() {
        let mut g = GrammarBuilder::new();
        g.none().regex("integer", 1);
        g.production("integer", 2);
        g.regex("[0-9]+", 2);
        g.end_expression(2);
        g.end_production();

        let mut diagnostics = Diagnostics::default();
        let grammar = g.finalize(&mut diagnostics).unwrap();
        assert!(grammar.nonterminal("integer").is_some());
        let terminal = grammar.terminal("integer").unwrap();
        assert_eq!(grammar.symbol(terminal).lexeme_kind(), LexemeKind::Regex);
        assert_eq!(grammar.symbol(terminal).precedence(), 1);
    }

    #[test]
    fn lint_reports_unreachable_and_unproductive_parts() {
        let mut g = GrammarBuilder::new();
        g.production("a", 1);
        g.literal("x", 1);
        g.end_expression(1);
        g.end_production();
        // `orphan` never appears in a body reachable from `a`.
        g.production("orphan", 2);
        g.literal("y", 2);
        g.end_expression(2);
        g.end_production();
        // `loop` cannot derive a sentence.
        g.production("loop", 3);
        g.identifier("loop", 3).literal("z", 3);
        g.end_expression(3);
        g.end_production();

        let mut diagnostics = Diagnostics::default();
        let grammar = g.finalize(&mut diagnostics).unwrap();
        lint(&grammar, &mut diagnostics);
        assert!(diagnostics.contains(ErrorCode::UnreachableNonterminal));
        assert_eq!(diagnostics.errors(), 0);
    }
}
