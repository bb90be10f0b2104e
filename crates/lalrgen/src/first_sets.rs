//! Calculation of the FIRST set function.

use crate::grammar::{Grammar, SymbolID, SymbolKind, SymbolSet};
use crate::util::get_two_mut;

/// FIRST sets for every grammar symbol, with nullability tracked separately
/// instead of an in-band ε marker.
#[derive(Debug)]
pub struct FirstSets {
    nullable: SymbolSet,
    sets: Vec<SymbolSet>,
}

impl FirstSets {
    pub fn new(grammar: &Grammar) -> Self {
        let nullable = nullable_set(grammar);

        // FIRST(t) = {t} for terminals, FIRST(N) starts empty.
        let mut sets = vec![SymbolSet::default(); grammar.symbols().count()];
        for (id, symbol) in grammar.symbols() {
            if symbol.is_terminal() {
                sets[id.index()].insert(id);
            }
        }

        // For X : Y1 Y2 ... Yn, FIRST(X) ⊇ FIRST(Yi) for every Yi reachable
        // through a nullable prefix.
        struct Constraint {
            sup: SymbolID,
            sub: SymbolID,
        }
        let mut constraints = Vec::new();
        for (_, production) in grammar.productions() {
            for &symbol in production.body() {
                if symbol != production.head() {
                    constraints.push(Constraint {
                        sup: production.head(),
                        sub: symbol,
                    });
                }
                if !nullable.contains(symbol) {
                    break;
                }
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for Constraint { sup, sub } in &constraints {
                let (sup_set, sub_set) = get_two_mut(&mut sets, sup.index(), sub.index());
                let before = sup_set.len();
                sup_set.union_with(sub_set);
                changed |= sup_set.len() != before;
            }
        }

        Self { nullable, sets }
    }

    pub fn is_nullable(&self, id: SymbolID) -> bool {
        self.nullable.contains(id)
    }

    pub fn first(&self, id: SymbolID) -> &SymbolSet {
        &self.sets[id.index()]
    }

    /// FIRST of a sentential prefix; the flag reports whether the whole
    /// prefix derives ε.
    pub fn first_of(&self, symbols: &[SymbolID]) -> (SymbolSet, bool) {
        let mut set = SymbolSet::default();
        for &symbol in symbols {
            set.union_with(&self.sets[symbol.index()]);
            if !self.nullable.contains(symbol) {
                return (set, false);
            }
        }
        (set, true)
    }
}

/// The nullable nonterminals, by fixpoint over the productions.
fn nullable_set(grammar: &Grammar) -> SymbolSet {
    let mut nullable = SymbolSet::default();
    let mut changed = true;
    while changed {
        changed = false;
        for (_, production) in grammar.productions() {
            if nullable.contains(production.head()) {
                continue;
            }
            let body_nullable = production.body().iter().all(|&symbol| {
                grammar.symbol(symbol).kind() == SymbolKind::Nonterminal
                    && nullable.contains(symbol)
            });
            if body_nullable {
                nullable.insert(production.head());
                changed = true;
            }
        }
    }
    nullable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::grammar::GrammarBuilder;

    // a : b c ; b : /*empty*/ | 'b' ; c : 'c' ;
    fn epsilon_grammar() -> Grammar {
        let mut g = GrammarBuilder::new();
        g.production("a", 1);
        g.identifier("b", 1).identifier("c", 1);
        g.end_expression(1);
        g.end_production();
        g.production("b", 2);
        g.end_expression(2);
        g.literal("b", 2);
        g.end_expression(2);
        g.end_production();
        g.production("c", 3);
        g.literal("c", 3);
        g.end_expression(3);
        g.end_production();

        let mut diagnostics = Diagnostics::default();
        let grammar = g.finalize(&mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        grammar
    }

    #[test]
    fn epsilon_production_propagates_first() {
        let grammar = epsilon_grammar();
        let first_sets = FirstSets::new(&grammar);

        let a = grammar.nonterminal("a").unwrap();
        let b = grammar.nonterminal("b").unwrap();
        let lit_b = grammar.terminal("b").unwrap();
        let lit_c = grammar.terminal("c").unwrap();

        assert!(first_sets.is_nullable(b));
        assert!(!first_sets.is_nullable(a));

        let first_a: Vec<_> = first_sets.first(a).iter().collect();
        assert_eq!(first_a, vec![lit_b, lit_c]);

        let (of_prefix, nullable) = first_sets.first_of(&[b, lit_c]);
        assert!(!nullable);
        assert!(of_prefix.contains(lit_b) && of_prefix.contains(lit_c));
    }
}
