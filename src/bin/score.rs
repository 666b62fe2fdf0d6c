use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use fslm::{from_binary, Model, WEIGHT_LOG0};

/// Score whitespace-tokenized sentences from stdin with a compiled model and
/// report the corpus log-probability and perplexity.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Compiled binary model (hashed or sorted).
    model: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let model = from_binary(&args.model)
        .with_context(|| format!("failed to load {}", args.model.display()))?;
    println!(
        "{:?} model: {} states, {} transitions, vocabulary bound {}",
        model.kind(),
        model.num_states(),
        model.num_transitions(),
        model.vocab().bound()
    );

    let mut total = 0f64;
    let (mut num_sents, mut num_words, mut num_oovs) = (0usize, 0usize, 0usize);
    for line in io::stdin().lock().lines() {
        let line = line?;
        let mut p = model.start();
        for token in line.split_whitespace() {
            let (q, w) = model.next(p, token);
            if w == WEIGHT_LOG0 {
                num_oovs += 1;
            } else {
                total += w as f64;
            }
            p = q;
            num_words += 1;
        }
        total += model.final_weight(p) as f64;
        num_sents += 1;
    }

    println!("{} sents, {} words, {} OOVs", num_sents, num_words, num_oovs);
    if num_words > 0 {
        let n = (num_sents + num_words) as f64;
        println!("logprob={} ppl={}", total, 10f64.powf(-total / n));
    }
    Ok(())
}
