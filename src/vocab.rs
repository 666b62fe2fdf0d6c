use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::model::{WordId, WORD_NIL};

#[derive(Error, Debug)]
pub enum VocabError {
    #[error("duplicate word in vocabulary: {0:?}")]
    DuplicateWord(String),
}

/// The mapping between strings and [`WordId`]s. Ids are dense and assigned in
/// insertion order, so a vocabulary round-trips through its word list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vocab {
    id2str: Vec<String>,
    str2id: FxHashMap<String, WordId>,
}

impl Vocab {
    /// Constructs a vocabulary with ids `0..N-1` assigned to the given words
    /// in order.
    pub fn new<I, S>(words: I) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut v = Vocab::default();
        for word in words {
            let word = word.into();
            if v.str2id.contains_key(&word) {
                return Err(VocabError::DuplicateWord(word));
            }
            let i = v.id2str.len() as WordId;
            v.str2id.insert(word.clone(), i);
            v.id2str.push(word);
        }
        Ok(v)
    }

    /// The largest assigned id plus one.
    pub fn bound(&self) -> WordId {
        self.id2str.len() as WordId
    }

    /// Looks up the id of `s`, or [`WORD_NIL`] if it is not present.
    pub fn id_of(&self, s: &str) -> WordId {
        self.str2id.get(s).copied().unwrap_or(WORD_NIL)
    }

    /// Looks up the id of `s`, adding it to the vocabulary if absent. Not
    /// thread-safe since it may grow the vocabulary.
    pub fn id_or_add(&mut self, s: &str) -> WordId {
        if let Some(&i) = self.str2id.get(s) {
            return i;
        }
        let i = self.bound();
        self.str2id.insert(s.to_owned(), i);
        self.id2str.push(s.to_owned());
        i
    }

    /// The string of the given id, if `i < self.bound()`.
    pub fn string_of(&self, i: WordId) -> Option<&str> {
        self.id2str.get(i as usize).map(String::as_str)
    }

    /// The full word list, indexed by id. Serializing a vocabulary is
    /// serializing this list.
    pub fn words(&self) -> &[String] {
        &self.id2str
    }
}
