//! LR(0) item-set graph construction.

use crate::{
    diagnostics::{Detail, Diagnostic, Report},
    grammar::{Grammar, ProductionID, SymbolID, SymbolKind},
    types::{Map, Set},
    util::display_fn,
};
use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
};

/// Hard cap on the number of LR(0) states.
pub const STATE_LIMIT: usize = 10_000;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateID(u16);

impl StateID {
    pub(crate) const START: Self = Self(0);

    pub(crate) const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{:03}", self.0)
    }
}

/// An LR(0) item: a production with a dot position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Item {
    pub production: ProductionID,
    pub dot: u16,
}

impl Item {
    /// The symbol immediately after the dot, if any.
    pub fn next_symbol(&self, grammar: &Grammar) -> Option<SymbolID> {
        grammar
            .production(self.production)
            .body()
            .get(self.dot as usize)
            .copied()
    }

    pub fn advanced(self) -> Self {
        Self {
            production: self.production,
            dot: self.dot + 1,
        }
    }

    /// Kernel items are those with the dot past the start, plus the
    /// augmented start item.
    pub fn is_kernel(self) -> bool {
        self.dot > 0 || self.production == ProductionID::ACCEPT
    }

    pub fn display<'g>(&'g self, grammar: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            let production = grammar.production(self.production);
            write!(f, "{} :", grammar.symbol(production.head()).identifier())?;
            for (i, &symbol) in production.body().iter().enumerate() {
                if i == self.dot as usize {
                    f.write_str(" .")?;
                }
                write!(f, " {}", grammar.symbol(symbol).identifier())?;
            }
            if self.dot as usize == production.body().len() {
                f.write_str(" .")?;
            }
            Ok(())
        })
    }
}

/// A state of the item-set graph, identified by its kernel signature.
#[derive(Debug)]
pub struct State {
    /// Kernel items, sorted by `(production, dot)`.
    pub kernel: Vec<Item>,
    /// Goto relation on both terminals and nonterminals, in symbol index
    /// order.
    pub transitions: Map<SymbolID, StateID>,
}

impl State {
    pub fn kernel_index(&self, item: Item) -> Option<usize> {
        self.kernel.binary_search(&item).ok()
    }
}

#[derive(Debug)]
pub struct Automaton {
    pub states: Vec<State>,
}

impl Automaton {
    pub fn state(&self, id: StateID) -> &State {
        &self.states[id.index()]
    }
}

/// ε-closure of a kernel, in deterministic (insertion) order.
pub fn closure(grammar: &Grammar, kernel: &[Item]) -> Vec<Item> {
    let mut items: Set<Item> = kernel.iter().copied().collect();
    let mut cursor = 0;
    while cursor < items.len() {
        let item = items[cursor];
        cursor += 1;
        let Some(symbol) = item.next_symbol(grammar) else {
            continue;
        };
        if grammar.symbol(symbol).kind() != SymbolKind::Nonterminal {
            continue;
        }
        for (production, _) in grammar.productions_of(symbol) {
            items.insert(Item { production, dot: 0 });
        }
    }
    items.into_iter().collect()
}

/// Build the item-set graph by closure and goto, numbering states in
/// discovery order and reusing states through their kernel signature.
pub fn automaton(grammar: &Grammar, report: &mut dyn Report) -> Option<Automaton> {
    let mut states = Vec::new();
    let mut signatures: Map<Vec<Item>, StateID> = Map::default();
    let mut pending: VecDeque<(StateID, Vec<Item>)> = VecDeque::new();

    let start_kernel = vec![Item {
        production: ProductionID::ACCEPT,
        dot: 0,
    }];
    signatures.insert(start_kernel.clone(), StateID::START);
    pending.push_back((StateID::START, start_kernel));

    while let Some((id, kernel)) = pending.pop_front() {
        debug_assert_eq!(id.index(), states.len());
        let items = closure(grammar, &kernel);

        // Successor kernels, grouped by the symbol after the dot; BTreeMap
        // keeps the iteration in symbol index order, which is what makes
        // state numbering deterministic. The end-of-input symbol is never
        // shifted: the accept action covers it.
        let mut successors: BTreeMap<SymbolID, Vec<Item>> = BTreeMap::new();
        for &item in &items {
            match item.next_symbol(grammar) {
                Some(symbol) if symbol != grammar.eoi_symbol() => {
                    successors.entry(symbol).or_default().push(item.advanced());
                }
                _ => {}
            }
        }

        let mut transitions = Map::default();
        for (symbol, mut next_kernel) in successors {
            next_kernel.sort();
            let next = match signatures.get(&next_kernel) {
                Some(&next) => next,
                None => {
                    if signatures.len() == STATE_LIMIT {
                        report.report(Diagnostic::new(
                            0,
                            Detail::InternalLimit {
                                what: "LR(0) states",
                                cap: STATE_LIMIT,
                            },
                        ));
                        return None;
                    }
                    let next = StateID(signatures.len() as u16);
                    signatures.insert(next_kernel.clone(), next);
                    pending.push_back((next, next_kernel));
                    next
                }
            };
            transitions.insert(symbol, next);
        }

        states.push(State { kernel, transitions });
    }

    Some(Automaton { states })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::grammar::GrammarBuilder;

    // The classic LR(0) example: E : E '+' T | T ; T : '(' E ')' | 'n' ;
    fn additive() -> Grammar {
        let mut g = GrammarBuilder::new();
        g.production("e", 1);
        g.identifier("e", 1).literal("+", 1).identifier("t", 1);
        g.end_expression(1);
        g.identifier("t", 1);
        g.end_expression(1);
        g.end_production();
        g.production("t", 2);
        g.literal("(", 2).identifier("e", 2).literal(")", 2);
        g.end_expression(2);
        g.literal("n", 2);
        g.end_expression(2);
        g.end_production();

        let mut diagnostics = Diagnostics::default();
        g.finalize(&mut diagnostics).unwrap()
    }

    #[test]
    fn state_graph_is_deterministic_and_deduplicated() {
        let grammar = additive();
        let mut diagnostics = Diagnostics::default();
        let automaton = automaton(&grammar, &mut diagnostics).unwrap();

        // The textbook automaton for this grammar has 9 states after
        // kernel-signature merging.
        assert_eq!(automaton.states.len(), 9);

        for state in &automaton.states {
            let mut sorted = state.kernel.clone();
            sorted.sort();
            assert_eq!(sorted, state.kernel);
        }

        // Every shift target's kernel contains the advanced item.
        for state in &automaton.states {
            let items = closure(&grammar, &state.kernel);
            for &item in &items {
                let Some(symbol) = item.next_symbol(&grammar) else {
                    continue;
                };
                if symbol == grammar.eoi_symbol() {
                    continue;
                }
                let next = state.transitions[&symbol];
                assert!(automaton
                    .state(next)
                    .kernel_index(item.advanced())
                    .is_some());
            }
        }
    }

    #[test]
    fn kernel_signatures_are_unique() {
        let grammar = additive();
        let mut diagnostics = Diagnostics::default();
        let automaton = automaton(&grammar, &mut diagnostics).unwrap();

        let mut seen = std::collections::BTreeSet::new();
        for state in &automaton.states {
            assert!(seen.insert(state.kernel.clone()));
        }
    }
}
