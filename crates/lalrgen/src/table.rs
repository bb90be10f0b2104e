//! Parse-table compilation and conflict resolution.

use crate::{
    diagnostics::{Detail, Diagnostic, Report},
    first_sets::FirstSets,
    grammar::{Assoc, Grammar, LexemeKind, ProductionID, SymbolID, SymbolKind},
    lalr::{closure_with_lookaheads, LookaheadSet, Lookaheads},
    lr0::{Automaton, Item, StateID},
    scanner::ScannerTables,
    types::Map,
};
use std::fmt;

/// The action performed on a lookahead terminal in a state.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Action {
    /// Reject the lookahead.
    #[default]
    Error,
    Shift(StateID),
    Reduce(ProductionID),
    Accept,
}

/// One row of the emitted symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub identifier: String,
    pub kind: SymbolKind,
    pub lexeme_kind: LexemeKind,
}

/// Reduce metadata for one production, as consumed by a runtime driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionEntry {
    pub head: SymbolID,
    pub length: u16,
    pub action: Option<String>,
    pub precedence: u16,
}

/// The immutable artifact emitted by the generator. It holds no references
/// back into generator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserTables {
    pub name: String,
    pub symbols: Vec<SymbolEntry>,
    pub productions: Vec<ProductionEntry>,
    pub nonterminal_count: usize,
    pub terminal_count: usize,
    pub state_count: usize,
    /// Packed action rows, `state_count × terminal_count`.
    pub actions: Vec<Action>,
    /// Packed goto rows, `state_count × nonterminal_count`.
    pub gotos: Vec<Option<StateID>>,
    pub start_state: StateID,
    pub eoi: SymbolID,
    pub error: SymbolID,
    /// The lexical-analyzer artifact, when a scanner builder collaborated.
    pub scanner: Option<ScannerTables>,
}

impl ParserTables {
    pub fn action(&self, state: StateID, terminal: SymbolID) -> Action {
        let column = terminal.index() - self.nonterminal_count;
        self.actions[state.index() * self.terminal_count + column]
    }

    pub fn goto(&self, state: StateID, nonterminal: SymbolID) -> Option<StateID> {
        self.gotos[state.index() * self.nonterminal_count + nonterminal.index()]
    }

    pub fn states(&self) -> impl Iterator<Item = StateID> + '_ {
        (0..self.state_count).map(|index| StateID::from_raw(index as u16))
    }

    /// Look up a terminal column by identifier.
    pub fn terminal(&self, identifier: &str) -> Option<SymbolID> {
        self.symbols
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.kind.is_terminal() && entry.identifier == identifier)
            .map(|(index, _)| SymbolID::from_raw(index as u16))
    }

    pub fn nonterminal(&self, identifier: &str) -> Option<SymbolID> {
        self.symbols
            .iter()
            .enumerate()
            .find(|(_, entry)| {
                entry.kind == SymbolKind::Nonterminal && entry.identifier == identifier
            })
            .map(|(index, _)| SymbolID::from_raw(index as u16))
    }

    fn terminal_columns(&self) -> impl Iterator<Item = (usize, &SymbolEntry)> + '_ {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.kind.is_terminal())
    }
}

impl fmt::Display for ParserTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for state in 0..self.state_count {
            if state > 0 {
                writeln!(f)?;
            }
            writeln!(f, "#### state {:03}", state)?;
            writeln!(f, "## actions")?;
            for (index, entry) in self.terminal_columns() {
                let column = index - self.nonterminal_count;
                match self.actions[state * self.terminal_count + column] {
                    Action::Error => {}
                    Action::Shift(next) => {
                        writeln!(f, "- {} => shift({:?})", entry.identifier, next)?;
                    }
                    Action::Reduce(production) => {
                        let head = &self.symbols[self.productions[production.index()].head.index()];
                        writeln!(
                            f,
                            "- {} => reduce({:?}, {})",
                            entry.identifier, production, head.identifier,
                        )?;
                    }
                    Action::Accept => {
                        writeln!(f, "- {} => accept", entry.identifier)?;
                    }
                }
            }
            writeln!(f, "## gotos")?;
            for (index, entry) in self.symbols.iter().enumerate() {
                if entry.kind != SymbolKind::Nonterminal {
                    continue;
                }
                if let Some(next) = self.gotos[state * self.nonterminal_count + index] {
                    writeln!(f, "- {} => goto({:?})", entry.identifier, next)?;
                }
            }
        }
        Ok(())
    }
}

/// Convert the item sets and lookaheads into packed action/goto rows,
/// resolving conflicts against the precedence declarations. Unresolved
/// conflicts are warnings; the returned count lets callers treat them as
/// fatal if they wish.
pub(crate) fn compile(
    grammar: &Grammar,
    automaton: &Automaton,
    lookaheads: &Lookaheads,
    first_sets: &FirstSets,
    report: &mut dyn Report,
) -> (ParserTables, usize) {
    let terminal_count = grammar.terminal_count();
    let nonterminal_count = grammar.nonterminal_count();
    let accept_item = Item {
        production: ProductionID::ACCEPT,
        dot: 1,
    };

    let mut conflicts = 0;
    let mut actions = Vec::with_capacity(automaton.states.len() * terminal_count);
    let mut gotos = Vec::with_capacity(automaton.states.len() * nonterminal_count);

    for (index, state) in automaton.states.iter().enumerate() {
        let id = StateID::from_raw(index as u16);

        #[derive(Default)]
        struct PendingAction {
            shift: Option<StateID>,
            reduces: Vec<ProductionID>,
            accept: bool,
        }
        let mut pending: Map<SymbolID, PendingAction> = Map::default();

        let mut goto_row = vec![None; nonterminal_count];
        for (&symbol, &next) in &state.transitions {
            if grammar.symbol(symbol).is_terminal() {
                pending.entry(symbol).or_default().shift = Some(next);
            } else {
                goto_row[symbol.index()] = Some(next);
            }
        }

        // Reductions come from the LR(1) closure of the kernel under its
        // final lookaheads; this also recovers the lookaheads of non-kernel
        // ε-items, which are never persisted.
        let seeds: Vec<(Item, LookaheadSet)> = state
            .kernel
            .iter()
            .enumerate()
            .map(|(kernel_index, &item)| {
                (
                    item,
                    LookaheadSet {
                        terminals: lookaheads.get(id, kernel_index).clone(),
                        marker: false,
                    },
                )
            })
            .collect();
        let closure = closure_with_lookaheads(grammar, first_sets, &seeds);
        for (item, lookahead) in &closure {
            if item.next_symbol(grammar).is_some() || item.production == ProductionID::ACCEPT {
                continue;
            }
            for terminal in lookahead.terminals.iter() {
                pending.entry(terminal).or_default().reduces.push(item.production);
            }
        }

        if state.kernel_index(accept_item).is_some() {
            pending.entry(grammar.eoi_symbol()).or_default().accept = true;
        }

        let mut row = vec![Action::Error; terminal_count];
        for (terminal, _) in grammar.terminals() {
            let Some(cell) = pending.get_mut(&terminal) else {
                continue;
            };
            row[grammar.terminal_index(terminal)] =
                resolve(grammar, terminal, cell.shift, &mut cell.reduces, cell.accept, report, &mut conflicts);
        }

        actions.extend(row);
        gotos.extend(goto_row);
    }

    let tables = ParserTables {
        name: grammar.name().to_owned(),
        symbols: grammar
            .symbols()
            .map(|(_, symbol)| SymbolEntry {
                identifier: symbol.identifier().to_owned(),
                kind: symbol.kind(),
                lexeme_kind: symbol.lexeme_kind(),
            })
            .collect(),
        productions: grammar
            .productions()
            .map(|(_, production)| ProductionEntry {
                head: production.head(),
                length: production.body().len() as u16,
                action: production.action().map(str::to_owned),
                precedence: production.precedence(grammar).0,
            })
            .collect(),
        nonterminal_count,
        terminal_count,
        state_count: automaton.states.len(),
        actions,
        gotos,
        start_state: StateID::START,
        eoi: grammar.eoi_symbol(),
        error: grammar.error_symbol(),
        scanner: None,
    };
    (tables, conflicts)
}

/// Pick the single action of a `(state, terminal)` cell.
///
/// Shift/reduce pairs are decided by precedence, then by the associativity
/// of the reducing production's precedence symbol; with precedence missing
/// or associativity `none` the conflict stays unresolved, a warning is
/// issued and the shift is kept. Reduce/reduce keeps the earliest declared
/// production.
fn resolve(
    grammar: &Grammar,
    terminal: SymbolID,
    shift: Option<StateID>,
    reduces: &mut Vec<ProductionID>,
    accept: bool,
    report: &mut dyn Report,
    conflicts: &mut usize,
) -> Action {
    reduces.sort();
    reduces.dedup();

    while reduces.len() > 1 {
        let dropped = reduces.pop().expect("at least two reductions");
        let kept = reduces[0];
        report.report(Diagnostic::new(
            grammar.production(dropped).line(),
            Detail::ReduceReduceConflict {
                terminal: grammar.symbol(terminal).identifier().to_owned(),
                kept: grammar.production(kept).display(grammar).to_string(),
                dropped: grammar.production(dropped).display(grammar).to_string(),
            },
        ));
        *conflicts += 1;
    }

    if accept {
        // Competing reductions on `$end` can only come from vacuous cycles
        // through the start symbol; accepting is the only useful choice.
        for &dropped in reduces.iter() {
            report.report(Diagnostic::new(
                grammar.production(dropped).line(),
                Detail::ReduceReduceConflict {
                    terminal: grammar.symbol(terminal).identifier().to_owned(),
                    kept: grammar.production(ProductionID::ACCEPT).display(grammar).to_string(),
                    dropped: grammar.production(dropped).display(grammar).to_string(),
                },
            ));
            *conflicts += 1;
        }
        return Action::Accept;
    }

    match (shift, reduces.first().copied()) {
        (Some(next), None) => Action::Shift(next),
        (None, Some(reduce)) => Action::Reduce(reduce),
        (None, None) => Action::Error,
        (Some(next), Some(reduce)) => {
            let shift_precedence = grammar.symbol(terminal).precedence();
            let (reduce_precedence, reduce_assoc) = grammar.production(reduce).precedence(grammar);

            let unresolved = |report: &mut dyn Report, conflicts: &mut usize| {
                report.report(Diagnostic::new(
                    grammar.production(reduce).line(),
                    Detail::ShiftReduceConflict {
                        terminal: grammar.symbol(terminal).identifier().to_owned(),
                        reduction: grammar.production(reduce).display(grammar).to_string(),
                    },
                ));
                *conflicts += 1;
                Action::Shift(next)
            };

            if shift_precedence == 0 || reduce_precedence == 0 {
                unresolved(report, conflicts)
            } else if shift_precedence > reduce_precedence {
                Action::Shift(next)
            } else if reduce_precedence > shift_precedence {
                Action::Reduce(reduce)
            } else {
                match reduce_assoc {
                    Assoc::Left => Action::Reduce(reduce),
                    Assoc::Right => Action::Shift(next),
                    Assoc::None => unresolved(report, conflicts),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostics, ErrorCode};
    use crate::grammar::GrammarBuilder;
    use crate::lr0;

    fn compile_grammar(grammar: &Grammar) -> (ParserTables, usize, Diagnostics) {
        let mut diagnostics = Diagnostics::default();
        let first_sets = FirstSets::new(grammar);
        let automaton = lr0::automaton(grammar, &mut diagnostics).unwrap();
        let lookaheads = crate::lalr::compute(grammar, &automaton, &first_sets);
        let (tables, conflicts) =
            compile(grammar, &automaton, &lookaheads, &first_sets, &mut diagnostics);
        (tables, conflicts, diagnostics)
    }

    #[test]
    fn accept_is_emitted_for_the_augmented_kernel() {
        let mut g = GrammarBuilder::new();
        g.production("a", 1);
        g.literal("x", 1);
        g.end_expression(1);
        g.end_production();
        let mut diagnostics = Diagnostics::default();
        let grammar = g.finalize(&mut diagnostics).unwrap();

        let (tables, conflicts, _) = compile_grammar(&grammar);
        assert_eq!(conflicts, 0);

        let a = tables.nonterminal("a").unwrap();
        let accepting = tables.goto(tables.start_state, a).unwrap();
        assert_eq!(tables.action(accepting, tables.eoi), Action::Accept);
    }

    #[test]
    fn every_cell_holds_at_most_one_action() {
        let mut g = GrammarBuilder::new();
        g.left().literal("+", 1);
        g.production("e", 2);
        g.identifier("e", 2).literal("+", 2).identifier("e", 2);
        g.end_expression(2);
        g.literal("n", 2);
        g.end_expression(2);
        g.end_production();
        let mut diagnostics = Diagnostics::default();
        let grammar = g.finalize(&mut diagnostics).unwrap();

        let (tables, conflicts, _) = compile_grammar(&grammar);
        // e '+' e with a left-associative '+' resolves its own ambiguity.
        assert_eq!(conflicts, 0);
        assert_eq!(
            tables.actions.len(),
            tables.state_count * tables.terminal_count
        );
    }

    #[test]
    fn reduce_reduce_keeps_the_earlier_production() {
        // Both `b` and `c` reduce from 'x' with the same follower set.
        let mut g = GrammarBuilder::new();
        g.production("a", 1);
        g.identifier("b", 1);
        g.end_expression(1);
        g.identifier("c", 1);
        g.end_expression(1);
        g.end_production();
        g.production("b", 2);
        g.literal("x", 2);
        g.end_expression(2);
        g.end_production();
        g.production("c", 3);
        g.literal("x", 3);
        g.end_expression(3);
        g.end_production();
        let mut diagnostics = Diagnostics::default();
        let grammar = g.finalize(&mut diagnostics).unwrap();

        let (tables, conflicts, reported) = compile_grammar(&grammar);
        assert_eq!(conflicts, 1);
        assert!(reported.contains(ErrorCode::ParseTableConflict));

        // The state reached on 'x' reduces with `b : 'x'`, declared first.
        let x = tables.terminal("x").unwrap();
        let after_x = match tables.action(tables.start_state, x) {
            Action::Shift(next) => next,
            action => panic!("expected shift on 'x', found {:?}", action),
        };
        let b = tables.nonterminal("b").unwrap();
        match tables.action(after_x, tables.eoi) {
            Action::Reduce(production) => {
                assert_eq!(tables.productions[production.index()].head, b);
            }
            action => panic!("expected reduce at end of input, found {:?}", action),
        }
    }

    #[test]
    fn nonassociative_tie_warns_and_keeps_the_shift() {
        let mut g = GrammarBuilder::new();
        g.none().literal("<", 1);
        g.production("e", 2);
        g.identifier("e", 2).literal("<", 2).identifier("e", 2);
        g.end_expression(2);
        g.literal("n", 2);
        g.end_expression(2);
        g.end_production();
        let mut diagnostics = Diagnostics::default();
        let grammar = g.finalize(&mut diagnostics).unwrap();

        let (tables, conflicts, reported) = compile_grammar(&grammar);
        assert_eq!(conflicts, 1);
        assert!(reported.contains(ErrorCode::ParseTableConflict));

        // After e '<' e the lookahead '<' still shifts.
        let e = tables.nonterminal("e").unwrap();
        let lt = tables.terminal("<").unwrap();
        let mut state = tables.start_state;
        state = tables.goto(state, e).unwrap();
        state = match tables.action(state, lt) {
            Action::Shift(next) => next,
            action => panic!("expected shift, found {:?}", action),
        };
        state = tables.goto(state, e).unwrap();
        assert!(matches!(tables.action(state, lt), Action::Shift(_)));
    }
}
