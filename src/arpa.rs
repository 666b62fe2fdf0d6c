//! ARPA text format parsing.
//!
//! Recognizes the usual `\data\`, `\N-grams:` and `\end\` sections and feeds
//! each entry to a [`Builder`]. The `ngram N=count` lines are skipped; the
//! sections themselves say how many words to expect per line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::builder::{BuildError, Builder};
use crate::model::Weight;

#[derive(Error, Debug)]
pub enum ArpaError {
    #[error("line {line}: expected {expected}")]
    Expected { line: usize, expected: &'static str },
    #[error("line {line}: bad weight: {source}")]
    BadWeight {
        line: usize,
        source: std::num::ParseFloatError,
    },
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

enum Section {
    Preamble,
    Counts,
    Ngrams(usize),
    End,
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0b' | '\x0c' | '\r')
}

/// Parses the `\N-grams:` section header, returning N.
fn section_order(line: &str, lineno: usize) -> Result<usize, ArpaError> {
    let expected = ArpaError::Expected {
        line: lineno,
        expected: r"section header \N-grams:",
    };
    let n = line
        .strip_prefix('\\')
        .and_then(|rest| rest.strip_suffix("-grams:"))
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or(expected)?;
    if n == 0 {
        return Err(ArpaError::Expected {
            line: lineno,
            expected: r"positive integer in section header \N-grams:",
        });
    }
    Ok(n)
}

fn add_entry(builder: &mut Builder, n: usize, line: &str, lineno: usize) -> Result<(), ArpaError> {
    let mut tokens = line.split(is_space).filter(|t| !t.is_empty());
    let weight: Weight = tokens
        .next()
        .ok_or(ArpaError::Expected {
            line: lineno,
            expected: "log-probability",
        })?
        .parse()
        .map_err(|source| ArpaError::BadWeight { line: lineno, source })?;
    let mut words = Vec::with_capacity(n);
    for _ in 0..n {
        words.push(tokens.next().ok_or(ArpaError::Expected {
            line: lineno,
            expected: "n-gram words",
        })?);
    }
    let back_off: Weight = match tokens.next() {
        Some(t) => t
            .parse()
            .map_err(|source| ArpaError::BadWeight { line: lineno, source })?,
        None => 0.0,
    };
    if tokens.next().is_some() {
        return Err(ArpaError::Expected {
            line: lineno,
            expected: "end of line",
        });
    }
    let (context, word) = words.split_at(n - 1);
    builder.add_ngram(context, word[0], weight, back_off)?;
    Ok(())
}

/// Reads an ARPA model from `reader`, adding every entry to `builder`.
pub fn read_arpa<R: BufRead>(reader: R, builder: &mut Builder) -> Result<(), ArpaError> {
    let mut state = Section::Preamble;
    let mut lineno = 0;
    for line in reader.lines() {
        let line = line?;
        lineno += 1;
        let line = line.trim_matches(is_space);
        if line.is_empty() {
            continue;
        }
        state = match state {
            Section::Preamble => {
                if line == r"\data\" {
                    Section::Counts
                } else {
                    return Err(ArpaError::Expected {
                        line: lineno,
                        expected: r"\data\",
                    });
                }
            }
            Section::Counts => {
                if line.starts_with('\\') {
                    Section::Ngrams(section_order(line, lineno)?)
                } else {
                    // An "ngram N=count" line; the counts are advisory.
                    Section::Counts
                }
            }
            Section::Ngrams(n) => {
                if line.starts_with('\\') {
                    debug!("{}-gram section done", n);
                    if line == r"\end\" {
                        Section::End
                    } else {
                        Section::Ngrams(section_order(line, lineno)?)
                    }
                } else {
                    add_entry(builder, n, line, lineno)?;
                    Section::Ngrams(n)
                }
            }
            Section::End => {
                return Err(ArpaError::Expected {
                    line: lineno,
                    expected: r"nothing after \end\",
                });
            }
        };
    }
    if !matches!(state, Section::End) {
        return Err(ArpaError::Expected {
            line: lineno,
            expected: r"\end\",
        });
    }
    Ok(())
}

/// Builds from an ARPA model read from `reader`, using a default builder.
pub fn from_arpa<R: BufRead>(reader: R) -> Result<Builder, ArpaError> {
    let mut builder = Builder::new();
    read_arpa(reader, &mut builder)?;
    Ok(builder)
}

/// Builds from the ARPA model at `path`.
pub fn from_arpa_file<P: AsRef<Path>>(path: P) -> Result<Builder, ArpaError> {
    let file = File::open(path)?;
    from_arpa(BufReader::new(file))
}
