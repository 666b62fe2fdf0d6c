use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use fslm::from_arpa_file;

/// Compile an ARPA n-gram language model into a binary automaton.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Input ARPA file.
    input: PathBuf,
    /// Output binary model.
    output: PathBuf,
    /// Emit the sorted representation instead of the hashed one.
    #[arg(long)]
    sorted: bool,
    /// Bucket multiplier for the hashed representation.
    #[arg(long, default_value_t = 1.5)]
    scale: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let builder = from_arpa_file(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    if args.sorted {
        builder.dump_sorted().write_binary(&args.output)?;
    } else {
        builder.dump_hashed(args.scale).write_binary(&args.output)?;
    }
    Ok(())
}
