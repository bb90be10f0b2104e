use anyhow::Context as _;
use clap::Parser;
use lalrgen::diagnostics::{Diagnostic, Report};
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Treat unresolved parse-table conflicts as errors.
    #[arg(long)]
    deny_conflicts: bool,

    /// Specify the path of the emitted table dump.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// The path of the grammar description file.
    input: PathBuf,
}

#[derive(Default)]
struct Console;

impl Report for Console {
    fn report(&mut self, diagnostic: Diagnostic) {
        eprintln!("{}", diagnostic);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::debug!("parsed CLI args = {:?}", args);

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let mut console = Console;
    let outcome = lalrgen::generate(&source, &mut console, None);
    tracing::info!(
        errors = outcome.errors,
        warnings = outcome.warnings,
        conflicts = outcome.conflicts,
        "generation finished"
    );

    let Some(tables) = outcome.tables else {
        anyhow::bail!(
            "grammar generation failed with {} error(s)",
            outcome.errors
        );
    };
    if args.deny_conflicts && outcome.conflicts > 0 {
        anyhow::bail!(
            "parse table has {} unresolved conflict(s)",
            outcome.conflicts
        );
    }

    let out_file = args
        .output
        .unwrap_or_else(|| args.input.with_extension("tables"));
    fs::write(&out_file, tables.to_string())
        .with_context(|| format!("failed to write {}", out_file.display()))?;

    Ok(())
}
