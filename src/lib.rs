//! Finite-state back-off n-gram language models.
//!
//! A [`Builder`] ingests n-gram entries (typically parsed from an ARPA file)
//! and compiles them into a compact automaton whose states are suffix
//! contexts. The compiled [`Hashed`] and [`Sorted`] models answer
//! `start`/`next`/`final` queries without allocating and can be written to
//! and mapped back from a binary container.

mod arpa;
mod builder;
mod hashed;
mod io;
mod model;
mod sorted;
mod table;
mod vocab;

pub use arpa::{from_arpa, from_arpa_file, read_arpa, ArpaError};
pub use builder::{BuildError, Builder, DEFAULT_LOG0_THRESHOLD};
pub use hashed::Hashed;
pub use io::{
    detect_kind, from_binary, is_binary, is_hashed_binary, is_sorted_binary, AnyModel,
    FormatError, ModelKind, MAGIC_HASHED, MAGIC_SORTED,
};
pub use model::{
    graphviz, Model, StateId, Transition, Weight, WordId, STATE_EMPTY, STATE_NIL, STATE_START,
    WEIGHT_LOG0, WORD_NIL,
};
pub use sorted::Sorted;
pub use vocab::{Vocab, VocabError};
