//! LALR(1) lookahead computation.
//!
//! Lookaheads are found without expanding the full LR(1) automaton: for each
//! kernel item, an LR(1) closure is simulated with a marker lookahead `#`.
//! Terminals reaching a successor kernel item are generated spontaneously;
//! wherever the marker itself reaches one, a propagation link is recorded,
//! and the recorded links are then iterated to a fixed point.

use crate::{
    first_sets::FirstSets,
    grammar::{Grammar, SymbolKind, SymbolSet},
    lr0::{Automaton, Item, StateID},
    types::{Map, Queue},
};

/// Lookahead sets for every kernel item, keyed by `(state, kernel index)`.
///
/// The sets live outside the items so the item-set graph stays immutable
/// while propagation owns the only mutable state.
#[derive(Debug)]
pub struct Lookaheads {
    sets: Vec<Vec<SymbolSet>>,
}

impl Lookaheads {
    pub fn get(&self, state: StateID, kernel_index: usize) -> &SymbolSet {
        &self.sets[state.index()][kernel_index]
    }
}

/// A lookahead set during closure simulation: concrete terminals plus the
/// propagation marker.
#[derive(Debug, Clone, Default)]
pub(crate) struct LookaheadSet {
    pub(crate) terminals: SymbolSet,
    pub(crate) marker: bool,
}

impl LookaheadSet {
    fn merge(&mut self, other: &Self) -> bool {
        let before = self.terminals.len();
        self.terminals.union_with(&other.terminals);
        let grown = self.terminals.len() != before;
        let marked = !self.marker && other.marker;
        self.marker |= other.marker;
        grown || marked
    }
}

/// LR(1) closure over seeded kernel items, tracking one lookahead set per
/// item.
pub(crate) fn closure_with_lookaheads(
    grammar: &Grammar,
    first_sets: &FirstSets,
    seeds: &[(Item, LookaheadSet)],
) -> Map<Item, LookaheadSet> {
    let mut items: Map<Item, LookaheadSet> = seeds.iter().cloned().collect();

    let mut changed = true;
    while changed {
        changed = false;

        let mut derived: Vec<(Item, LookaheadSet)> = Vec::new();
        for (item, lookahead) in &items {
            let Some(symbol) = item.next_symbol(grammar) else {
                continue;
            };
            if grammar.symbol(symbol).kind() != SymbolKind::Nonterminal {
                continue;
            }

            // [A : α . B β, L]  adds  [B : . γ, FIRST(β) ∪ (L if β nullable)]
            let body = grammar.production(item.production).body();
            let beta = &body[item.dot as usize + 1..];
            let (mut terminals, beta_nullable) = first_sets.first_of(beta);
            let marker = beta_nullable && lookahead.marker;
            if beta_nullable {
                terminals.union_with(&lookahead.terminals);
            }
            let lookahead = LookaheadSet { terminals, marker };

            for (production, _) in grammar.productions_of(symbol) {
                derived.push((Item { production, dot: 0 }, lookahead.clone()));
            }
        }

        for (item, lookahead) in derived {
            changed |= items.entry(item).or_default().merge(&lookahead);
        }
    }

    items
}

/// Compute the LALR(1) lookahead sets for every kernel item of the graph.
pub fn compute(grammar: &Grammar, automaton: &Automaton, first_sets: &FirstSets) -> Lookaheads {
    let mut sets: Vec<Vec<SymbolSet>> = automaton
        .states
        .iter()
        .map(|state| vec![SymbolSet::default(); state.kernel.len()])
        .collect();

    // The augmented start item is seeded with `$end`.
    sets[StateID::START.index()][0].insert(grammar.eoi_symbol());

    let mut links: Map<(StateID, usize), Vec<(StateID, usize)>> = Map::default();
    for (index, state) in automaton.states.iter().enumerate() {
        let id = StateID::from_raw(index as u16);
        for (kernel_index, &kernel_item) in state.kernel.iter().enumerate() {
            let seeds = [(
                kernel_item,
                LookaheadSet {
                    terminals: SymbolSet::default(),
                    marker: true,
                },
            )];
            let closure = closure_with_lookaheads(grammar, first_sets, &seeds);
            for (item, lookahead) in &closure {
                let Some(symbol) = item.next_symbol(grammar) else {
                    continue;
                };
                if symbol == grammar.eoi_symbol() {
                    continue;
                }
                let next = state.transitions[&symbol];
                let target = automaton
                    .state(next)
                    .kernel_index(item.advanced())
                    .expect("advanced item missing from successor kernel");

                sets[next.index()][target].union_with(&lookahead.terminals);
                if lookahead.marker {
                    links
                        .entry((id, kernel_index))
                        .or_default()
                        .push((next, target));
                }
            }
        }
    }

    // Push lookaheads along the propagation links until nothing grows.
    let mut queue: Queue<(StateID, usize)> = links.keys().copied().collect();
    while let Some(source) = queue.pop() {
        let Some(targets) = links.get(&source) else {
            continue;
        };
        let lookaheads = sets[source.0.index()][source.1].clone();
        if lookaheads.is_empty() {
            continue;
        }
        for &(state, kernel_index) in targets {
            let slot = &mut sets[state.index()][kernel_index];
            let before = slot.len();
            slot.union_with(&lookaheads);
            if slot.len() != before {
                queue.push((state, kernel_index));
            }
        }
    }

    Lookaheads { sets }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::grammar::GrammarBuilder;
    use crate::lr0;

    // The textbook grammar whose SLR table is inadequate but whose LALR
    // lookaheads are exact:
    //   s : l '=' r | r ;  l : '*' r | 'i' ;  r : l ;
    fn pointers() -> Grammar {
        let mut g = GrammarBuilder::new();
        g.production("s", 1);
        g.identifier("l", 1).literal("=", 1).identifier("r", 1);
        g.end_expression(1);
        g.identifier("r", 1);
        g.end_expression(1);
        g.end_production();
        g.production("l", 2);
        g.literal("*", 2).identifier("r", 2);
        g.end_expression(2);
        g.literal("i", 2);
        g.end_expression(2);
        g.end_production();
        g.production("r", 3);
        g.identifier("l", 3);
        g.end_expression(3);
        g.end_production();

        let mut diagnostics = Diagnostics::default();
        g.finalize(&mut diagnostics).unwrap()
    }

    #[test]
    fn lookaheads_stay_within_the_terminal_alphabet() {
        let grammar = pointers();
        let first_sets = FirstSets::new(&grammar);
        let mut diagnostics = Diagnostics::default();
        let automaton = lr0::automaton(&grammar, &mut diagnostics).unwrap();
        let lookaheads = compute(&grammar, &automaton, &first_sets);

        for (index, state) in automaton.states.iter().enumerate() {
            let id = StateID::from_raw(index as u16);
            for kernel_index in 0..state.kernel.len() {
                for symbol in lookaheads.get(id, kernel_index).iter() {
                    assert!(grammar.symbol(symbol).is_terminal());
                }
            }
        }
    }

    #[test]
    fn reduction_after_l_sees_equals_through_propagation() {
        let grammar = pointers();
        let first_sets = FirstSets::new(&grammar);
        let mut diagnostics = Diagnostics::default();
        let automaton = lr0::automaton(&grammar, &mut diagnostics).unwrap();
        let lookaheads = compute(&grammar, &automaton, &first_sets);

        let l = grammar.nonterminal("l").unwrap();
        let eq = grammar.terminal("=").unwrap();
        let (r_from_l, _) = grammar
            .productions()
            .find(|(_, p)| p.body() == [l])
            .unwrap();

        // goto(start, l) holds the kernel { s : l . '=' r ; r : l . }; the
        // lookahead of the completed item must contain '=' (spontaneous from
        // the start state) as well as $end (propagated from s : . r).
        let after_l = automaton.states[0].transitions[&l];
        let completed = automaton
            .state(after_l)
            .kernel_index(lr0::Item {
                production: r_from_l,
                dot: 1,
            })
            .unwrap();
        let set = lookaheads.get(after_l, completed);
        assert!(set.contains(eq));
        assert!(set.contains(grammar.eoi_symbol()));
    }
}
