//! Lexical builder adapter.
//!
//! The regular-expression engine itself is an external collaborator: this
//! module gathers the terminal and whitespace patterns of a finalized
//! grammar, hands them to a [`ScannerBuilder`], and the tables it returns
//! are embedded in the emitted artifact untouched.

use crate::{
    diagnostics::{Detail, Diagnostic, Report},
    grammar::{Grammar, LexemeKind, SymbolID, SymbolSet},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PatternKind {
    Literal,
    Regex,
}

/// A terminal pattern, tagged with the symbol index that acts as the
/// accepting action of the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerPattern {
    pub symbol: SymbolID,
    pub kind: PatternKind,
    pub pattern: String,
    pub line: u32,
}

/// Everything the external lexical builder needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannerSpec {
    /// Terminal patterns, in order of appearance in the grammar.
    pub patterns: Vec<ScannerPattern>,
    /// Whitespace patterns, merged into a single skip set by the builder.
    pub whitespace: Vec<String>,
}

/// Transition value for a dead scanner cell.
pub const SCANNER_REJECT: u32 = u32::MAX;

/// The state table returned by the lexical builder collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerTables {
    pub start_state: u32,
    pub state_count: u32,
    /// Packed transition rows, `state_count × 256`, [`SCANNER_REJECT`] where
    /// undefined.
    pub transitions: Vec<u32>,
    /// Accepting symbol per state.
    pub accepts: Vec<Option<SymbolID>>,
}

/// The external lexical-analyzer builder.
///
/// Lexical conflicts are reported through the sink; `None` means the
/// collaborator could not produce tables.
pub trait ScannerBuilder {
    fn build(&mut self, spec: &ScannerSpec, report: &mut dyn Report) -> Option<ScannerTables>;
}

/// Collect the scanner specification from a finalized grammar.
///
/// Every literal and regex terminal contributes a pattern tagged with its
/// symbol index; patterns no production references are still included but
/// draw a warning.
pub(crate) fn collect(grammar: &Grammar, report: &mut dyn Report) -> ScannerSpec {
    let mut referenced = SymbolSet::default();
    for (_, production) in grammar.productions() {
        for &symbol in production.body() {
            referenced.insert(symbol);
        }
    }

    let mut patterns = Vec::new();
    for (id, symbol) in grammar.terminals() {
        let kind = match symbol.lexeme_kind() {
            LexemeKind::Literal => PatternKind::Literal,
            LexemeKind::Regex => PatternKind::Regex,
            // `$end` and `error` have no lexeme to recognize.
            LexemeKind::None => continue,
        };
        if !referenced.contains(id) {
            report.report(Diagnostic::new(
                symbol.line(),
                Detail::UnreferencedSymbol {
                    name: symbol.identifier().to_owned(),
                },
            ));
        }
        patterns.push(ScannerPattern {
            symbol: id,
            kind,
            pattern: symbol.identifier().to_owned(),
            line: symbol.line(),
        });
    }

    ScannerSpec {
        patterns,
        whitespace: grammar
            .whitespace()
            .iter()
            .map(|w| w.pattern.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostics, ErrorCode};
    use crate::grammar::GrammarBuilder;

    #[test]
    fn patterns_are_collected_in_appearance_order() {
        let mut g = GrammarBuilder::new();
        g.whitespace().regex("[ \\t\\r\\n]*", 1);
        g.left().literal("+", 2).literal("-", 2);
        g.production("e", 3);
        g.identifier("e", 3).literal("+", 3).identifier("e", 3);
        g.end_expression(3);
        g.identifier("e", 4).literal("-", 4).identifier("e", 4);
        g.end_expression(4);
        g.regex("[0-9]+", 5);
        g.end_expression(5);
        g.end_production();

        let mut diagnostics = Diagnostics::default();
        let grammar = g.finalize(&mut diagnostics).unwrap();
        let spec = collect(&grammar, &mut diagnostics);

        let rendered: Vec<_> = spec
            .patterns
            .iter()
            .map(|p| (p.kind, p.pattern.as_str()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                (PatternKind::Literal, "+"),
                (PatternKind::Literal, "-"),
                (PatternKind::Regex, "[0-9]+"),
            ]
        );
        assert_eq!(spec.whitespace, vec!["[ \\t\\r\\n]*".to_owned()]);
        assert_eq!(diagnostics.warnings(), 0);

        // Accepting tags point back into the symbol table.
        for pattern in &spec.patterns {
            assert_eq!(
                grammar.symbol(pattern.symbol).identifier(),
                pattern.pattern
            );
        }
    }

    #[test]
    fn unreferenced_patterns_draw_a_warning() {
        let mut g = GrammarBuilder::new();
        g.none().regex("integer", 1);
        g.production("a", 2);
        g.literal("x", 2);
        g.end_expression(2);
        g.end_production();

        let mut diagnostics = Diagnostics::default();
        let grammar = g.finalize(&mut diagnostics).unwrap();
        let spec = collect(&grammar, &mut diagnostics);

        assert!(diagnostics.contains(ErrorCode::UnreferencedSymbol));
        // The pattern is still part of the specification.
        assert!(spec.patterns.iter().any(|p| p.pattern == "integer"));
    }
}
