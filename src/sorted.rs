use std::path::Path;

use crate::io::{read_container, write_container, FormatError, Header, MAGIC_SORTED};
use crate::model::{
    Entries, Model, StateId, Transition, Weight, WordId, STATE_EMPTY, STATE_NIL, WEIGHT_LOG0,
    WORD_NIL,
};
use crate::vocab::Vocab;

/// A compiled model holding one label-sorted transition array per state.
///
/// Each array ends with a back-off entry labeled [`WORD_NIL`], which sorts
/// last, so a failed binary search falls through to the back-off. Usually
/// obtained from [`crate::Builder::dump_sorted`] or loaded with
/// [`Sorted::from_binary_file`].
#[derive(Debug)]
pub struct Sorted {
    vocab: Vocab,
    bos: String,
    eos: String,
    bos_id: WordId,
    eos_id: WordId,
    // Prefix sums of per-state row lengths (lexical entries plus the
    // terminal back-off entry).
    offsets: Vec<usize>,
    entries: Entries,
}

impl Sorted {
    pub(crate) fn from_parts(
        vocab: Vocab,
        bos: String,
        eos: String,
        bos_id: WordId,
        eos_id: WordId,
        offsets: Vec<usize>,
        entries: Vec<Transition>,
    ) -> Self {
        Sorted {
            vocab,
            bos,
            eos,
            bos_id,
            eos_id,
            offsets,
            entries: Entries::Owned(entries),
        }
    }

    fn row(&self, p: StateId) -> &[Transition] {
        &self.entries.as_slice()[self.offsets[p as usize]..self.offsets[p as usize + 1]]
    }

    fn find_next(&self, p: StateId, x: WordId) -> &Transition {
        let row = self.row(p);
        match row.binary_search_by_key(&x, |e| e.word) {
            Ok(i) => &row[i],
            // Not found; take the back-off entry at the tail.
            Err(_) => &row[row.len() - 1],
        }
    }

    /// Writes the model as a `#fslm.sort` container.
    pub fn write_binary<P: AsRef<Path>>(&self, path: P) -> Result<(), FormatError> {
        // Per-state lexical counts; the back-off entry is implicit.
        let counts = self
            .offsets
            .windows(2)
            .map(|w| (w[1] - w[0] - 1) as u64)
            .collect();
        let header = Header {
            words: self.vocab.words().to_vec(),
            bos: self.bos.clone(),
            eos: self.eos.clone(),
            counts,
        };
        write_container(path.as_ref(), MAGIC_SORTED, &header, self.entries.as_slice())
    }

    /// Maps a `#fslm.sort` container from disk. The mapping is owned by the
    /// returned model and released when it is dropped; entry data is read
    /// directly out of the mapping.
    pub fn from_binary_file<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        let c = read_container(path.as_ref(), MAGIC_SORTED)?;
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
            total += n as usize + 1;
            offsets.push(total);
        }
        if total != c.num_entries {
            return Err(FormatError::CountMismatch);
        }
        Ok(Sorted {
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

impl Model for Sorted {
    fn next_id(&self, mut p: StateId, x: WordId) -> (StateId, Weight) {
        let mut w: Weight = 0.0;
        let mut next = self.find_next(p, x);
        while next.word == WORD_NIL && p != STATE_EMPTY {
            p = next.state;
            w += next.weight;
            next = self.find_next(p, x);
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
        let row = self.row(p);
        let e = &row[row.len() - 1];
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
        let row = self.row(p);
        Box::new(row[..row.len() - 1].iter().copied())
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
