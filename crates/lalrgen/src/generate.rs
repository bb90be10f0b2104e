//! The top-level generation pipeline.
//!
//! Generation is single-threaded and offline: a straight-line sequence of
//! fixed-point computations with no shared mutable state, so independent
//! generators may run on separate threads freely.

use crate::{
    diagnostics::{Counted, Report},
    first_sets::FirstSets,
    grammar::{self, GrammarBuilder},
    lalr, lr0,
    scanner::{self, ScannerBuilder},
    syntax, table,
    table::ParserTables,
};

/// The result of one generator run. `tables` is present iff no errors were
/// reported; unresolved conflicts are included in `warnings` and counted
/// separately so callers may treat them as fatal.
#[derive(Debug)]
pub struct GenerateOutcome {
    pub tables: Option<ParserTables>,
    pub errors: usize,
    pub warnings: usize,
    pub conflicts: usize,
}

/// Generate parse tables from a textual grammar description.
pub fn generate(
    source: &str,
    report: &mut dyn Report,
    scanner_builder: Option<&mut dyn ScannerBuilder>,
) -> GenerateOutcome {
    let span = tracing::debug_span!("generate");
    let _entered = span.enter();

    let mut counted = Counted::new(report);
    let mut builder = GrammarBuilder::new();
    let syntax_errors = syntax::parse(source, &mut builder, &mut counted);
    if syntax_errors > 0 {
        return failed(counted);
    }
    finish(builder, counted, scanner_builder)
}

/// Generate parse tables from a programmatically driven builder. The builder
/// obeys the same contract the grammar front-end drives.
pub fn generate_from_builder(
    builder: GrammarBuilder,
    report: &mut dyn Report,
    scanner_builder: Option<&mut dyn ScannerBuilder>,
) -> GenerateOutcome {
    let span = tracing::debug_span!("generate");
    let _entered = span.enter();

    finish(builder, Counted::new(report), scanner_builder)
}

fn finish(
    builder: GrammarBuilder,
    mut counted: Counted<'_>,
    scanner_builder: Option<&mut dyn ScannerBuilder>,
) -> GenerateOutcome {
    let Some(grammar) = builder.finalize(&mut counted) else {
        return failed(counted);
    };
    grammar::lint(&grammar, &mut counted);

    let first_sets = FirstSets::new(&grammar);
    let Some(automaton) = lr0::automaton(&grammar, &mut counted) else {
        return failed(counted);
    };
    tracing::debug!(states = automaton.states.len(), "item-set graph complete");

    let lookaheads = lalr::compute(&grammar, &automaton, &first_sets);
    let (mut tables, conflicts) =
        table::compile(&grammar, &automaton, &lookaheads, &first_sets, &mut counted);
    if conflicts > 0 {
        tracing::debug!(conflicts, "parse table has unresolved conflicts");
    }

    let spec = scanner::collect(&grammar, &mut counted);
    if let Some(scanner_builder) = scanner_builder {
        tables.scanner = scanner_builder.build(&spec, &mut counted);
    }

    if counted.errors > 0 {
        return failed(counted);
    }
    GenerateOutcome {
        tables: Some(tables),
        errors: counted.errors,
        warnings: counted.warnings,
        conflicts,
    }
}

fn failed(counted: Counted<'_>) -> GenerateOutcome {
    GenerateOutcome {
        tables: None,
        errors: counted.errors,
        warnings: counted.warnings,
        conflicts: 0,
    }
}
