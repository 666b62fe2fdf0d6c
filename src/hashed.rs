use std::path::Path;

use crate::io::{read_container, write_container, FormatError, Header, MAGIC_HASHED};
use crate::model::{
    Entries, Model, StateId, Transition, Weight, WordId, STATE_EMPTY, STATE_NIL, WEIGHT_LOG0,
    WORD_NIL,
};
use crate::table;
use crate::vocab::Vocab;

/// A compiled model holding one open-addressed bucket array per state.
///
/// Empty buckets all carry the state's back-off transition, so a probe miss
/// yields the back-off without a separate lookup. Usually obtained from
/// [`crate::Builder::dump_hashed`] or loaded with [`Hashed::from_binary_file`].
#[derive(Debug)]
pub struct Hashed {
    vocab: Vocab,
    bos: String,
    eos: String,
    bos_id: WordId,
    eos_id: WordId,
    // Prefix sums of per-state bucket counts; state p owns
    // entries[offsets[p]..offsets[p + 1]].
    offsets: Vec<usize>,
    entries: Entries,
}

impl Hashed {
    pub(crate) fn from_parts(
        vocab: Vocab,
        bos: String,
        eos: String,
        bos_id: WordId,
        eos_id: WordId,
        offsets: Vec<usize>,
        entries: Vec<Transition>,
    ) -> Self {
        Hashed {
            vocab,
            bos,
            eos,
            bos_id,
            eos_id,
            offsets,
            entries: Entries::Owned(entries),
        }
    }

    fn buckets(&self, p: StateId) -> &[Transition] {
        &self.entries.as_slice()[self.offsets[p as usize]..self.offsets[p as usize + 1]]
    }

    /// Writes the model as a `#fslm.hash` container.
    pub fn write_binary<P: AsRef<Path>>(&self, path: P) -> Result<(), FormatError> {
        let counts = self.offsets.windows(2).map(|w| (w[1] - w[0]) as u64).collect();
        let header = Header {
            words: self.vocab.words().to_vec(),
            bos: self.bos.clone(),
            eos: self.eos.clone(),
            counts,
        };
        write_container(path.as_ref(), MAGIC_HASHED, &header, self.entries.as_slice())
    }

    /// Maps a `#fslm.hash` container from disk. The mapping is owned by the
    /// returned model and released when it is dropped; entry data is read
    /// directly out of the mapping.
    pub fn from_binary_file<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let c = read_container(path.as_ref(), MAGIC_HASHED)?;
        let vocab = Vocab::new(c.header.words)?;
        let bos_id = vocab.id_of(&c.header.bos);
        if bos_id == WORD_NIL {
            return Err(FormatError::MissingBoundary(c.header.bos));
        }
        let eos_id = vocab.id_of(&c.header.eos);
        if eos_id == WORD_NIL {
            return Err(FormatError::MissingBoundary(c.header.eos));
        }
        let mut offsets = Vec::with_capacity(c.header.counts.len() + 1);
        let mut total = 0usize;
        offsets.push(0);
        for &n in &c.header.counts {
            total += n as usize;
            offsets.push(total);
        }
        if total != c.num_entries {
            return Err(FormatError::CountMismatch);
        }
        Ok(Hashed {
            vocab,
            bos: c.header.bos,
            eos: c.header.eos,
            bos_id,
            eos_id,
            offsets,
            entries: Entries::Mapped {
                map: c.map,
                start: c.entries_start,
            },
        })
    }
}

impl Model for Hashed {
    fn next_id(&self, mut p: StateId, x: WordId) -> (StateId, Weight) {
        // Back off until the n-gram is found or the empty state is hit. A
        // miss lands on an empty bucket, which holds the back-off entry.
        let mut w: Weight = 0.0;
        let mut next = table::find_entry(self.buckets(p), x);
        while next.word == WORD_NIL && p != STATE_EMPTY {
            p = next.state;
            w += next.weight;
            next = table::find_entry(self.buckets(p), x);
        }
        if next.word != WORD_NIL {
            (next.state, w + next.weight)
        } else {
            (STATE_EMPTY, WEIGHT_LOG0)
        }
    }

    fn back_off(&self, p: StateId) -> (StateId, Weight) {
        if p == STATE_EMPTY {
            return (STATE_NIL, 0.0);
        }
        let e = table::find_entry(self.buckets(p), WORD_NIL);
        (e.state, e.weight)
    }

    fn num_states(&self) -> usize {
        self.offsets.len() - 1
    }

    fn num_transitions(&self) -> usize {
        self.entries
            .as_slice()
            .iter()
            .filter(|e| e.word != WORD_NIL)
            .count()
    }

    fn transitions(&self, p: StateId) -> Box<dyn Iterator<Item = Transition> + '_> {
        Box::new(self.buckets(p).iter().copied().filter(|e| e.word != WORD_NIL))
    }

    fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    fn bos_id(&self) -> WordId {
        self.bos_id
    }

    fn eos_id(&self) -> WordId {
        self.eos_id
    }
}
