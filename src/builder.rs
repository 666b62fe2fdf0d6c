use std::io::{self, Write};

use log::{info, warn};
use thiserror::Error;

use crate::hashed::Hashed;
use crate::model::{
    StateId, StateWeight, Transition, Weight, WordId, STATE_EMPTY, STATE_NIL, STATE_START,
    WEIGHT_LOG0, WORD_NIL,
};
use crate::sorted::Sorted;
use crate::table::BucketMap;
use crate::vocab::Vocab;

/// Input weights at or below this are treated as log(0) unless overridden
/// with [`Builder::log0_threshold`]. Follows the SRILM convention of writing
/// -99 for impossible events.
pub const DEFAULT_LOG0_THRESHOLD: Weight = -99.0;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("begin-of-sentence and end-of-sentence are the same word {0:?}")]
    SameSentenceBoundary(String),
    #[error("sentence boundary {0:?} not in vocabulary")]
    MissingBoundary(String),
    #[error("end-of-sentence in context {0:?}")]
    EosInContext(String),
    #[error("begin-of-sentence not at the beginning of context {0:?}")]
    BosInsideContext(String),
}

/// Builds a language model automaton from n-gram entries (e.g. estimated by
/// SRILM). N-grams may be added in any order; the compiled model is the
/// same. Dumping consumes the builder.
pub struct Builder {
    vocab: Vocab,
    bos: String,
    eos: String,
    bos_id: WordId,
    eos_id: WordId,
    log0_threshold: Weight,
    // Outgoing transitions per state. A large share of states never gains an
    // out-edge, so the map is only materialized on first insertion.
    transitions: Vec<Option<BucketMap>>,
    // Back-off per state; STATE_NIL means "not yet computed".
    backoff: Vec<StateWeight>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// A builder over a fresh vocabulary with the canonical `<s>` and `</s>`
    /// sentence boundaries.
    pub fn new() -> Self {
        let mut vocab = Vocab::default();
        let bos_id = vocab.id_or_add("<s>");
        let eos_id = vocab.id_or_add("</s>");
        Self::from_parts(vocab, "<s>", "</s>", bos_id, eos_id)
    }

    /// A builder over a caller-supplied base vocabulary. `bos` and `eos`
    /// name the sentence boundary symbols, which must be present in `vocab`
    /// and distinct.
    pub fn with_vocab(vocab: Vocab, bos: &str, eos: &str) -> Result<Self, BuildError> {
        if bos == eos {
            return Err(BuildError::SameSentenceBoundary(bos.to_owned()));
        }
        let bos_id = vocab.id_of(bos);
        if bos_id == WORD_NIL {
            return Err(BuildError::MissingBoundary(bos.to_owned()));
        }
        let eos_id = vocab.id_of(eos);
        if eos_id == WORD_NIL {
            return Err(BuildError::MissingBoundary(eos.to_owned()));
        }
        Ok(Self::from_parts(vocab, bos, eos, bos_id, eos_id))
    }

    fn from_parts(vocab: Vocab, bos: &str, eos: &str, bos_id: WordId, eos_id: WordId) -> Self {
        let mut b = Builder {
            vocab,
            bos: bos.to_owned(),
            eos: eos.to_owned(),
            bos_id,
            eos_id,
            log0_threshold: DEFAULT_LOG0_THRESHOLD,
            transitions: Vec::new(),
            backoff: Vec::new(),
        };
        b.new_state(); // STATE_EMPTY
        b.new_state(); // STATE_START
        b.set_transition(STATE_EMPTY, bos_id, STATE_START, 0.0);
        b
    }

    /// Overrides the threshold at or below which input weights are coerced
    /// to [`WEIGHT_LOG0`].
    pub fn log0_threshold(mut self, threshold: Weight) -> Self {
        self.log0_threshold = threshold;
        self
    }

    /// Adds one n-gram entry. `context` holds the conditioning words in
    /// textual order; `word` is the predicted word; `back_off` is ignored
    /// (with a warning when non-zero) for n-grams ending in `</s>`.
    pub fn add_ngram(
        &mut self,
        context: &[&str],
        word: &str,
        weight: Weight,
        back_off: Weight,
    ) -> Result<(), BuildError> {
        let weight = if weight <= self.log0_threshold {
            WEIGHT_LOG0
        } else {
            weight
        };
        let back_off = if back_off <= self.log0_threshold {
            WEIGHT_LOG0
        } else {
            back_off
        };

        for (i, &c) in context.iter().enumerate() {
            if c == self.eos {
                return Err(BuildError::EosInContext(context.join(" ")));
            }
            if i > 0 && c == self.bos {
                return Err(BuildError::BosInsideContext(context.join(" ")));
            }
        }
        if !context.is_empty() && word == self.bos && weight > -10.0 {
            warn!(
                "non-unigram ending in {:?} with weight {} (such an n-gram should have -inf weight or not occur in the LM)",
                word, weight
            );
        }
        if word == self.eos && back_off != 0.0 {
            warn!("non-zero back-off {} for an n-gram ending in {:?}", back_off, word);
        }

        let p = self.find_state(STATE_EMPTY, context);
        let x = self.vocab.id_or_add(word);
        let mut q = STATE_NIL;
        // Only use a valid destination state when the word is not </s>.
        if x != self.eos_id {
            q = self.find_next_state(p, x);
            self.backoff[q as usize].weight = back_off;
        }
        self.set_transition(p, x, q, weight);
        Ok(())
    }

    fn new_state(&mut self) -> StateId {
        let s = self.backoff.len() as StateId;
        self.transitions.push(None);
        self.backoff.push(StateWeight {
            state: STATE_NIL,
            weight: 0.0,
        });
        s
    }

    fn set_transition(&mut self, p: StateId, x: WordId, q: StateId, w: Weight) {
        let map = self.transitions[p as usize].get_or_insert_with(BucketMap::new);
        *map.get_or_insert(x) = Transition {
            word: x,
            state: q,
            weight: w,
        };
    }

    fn find_next_state(&mut self, p: StateId, x: WordId) -> StateId {
        if let Some(map) = &self.transitions[p as usize] {
            if let Some(t) = map.find(x) {
                return t.state;
            }
        }
        let q = self.new_state();
        self.set_transition(p, x, q, 0.0);
        q
    }

    fn find_state(&mut self, mut p: StateId, words: &[&str]) -> StateId {
        for &w in words {
            let x = self.vocab.id_or_add(w);
            p = self.find_next_state(p, x);
        }
        p
    }

    fn find_target(&self, p: StateId, x: WordId) -> Option<StateId> {
        self.transitions[p as usize]
            .as_ref()
            .and_then(|m| m.find(x))
            .map(|t| t.state)
    }

    /// Links each state to the first state with at least one outgoing
    /// transition along its back-off chain.
    fn link(&mut self) {
        // Direct children of the empty state back off to the empty state.
        let children: Vec<StateId> = match &self.transitions[STATE_EMPTY as usize] {
            Some(m) => m.iter().map(|t| t.state).filter(|&q| q != STATE_NIL).collect(),
            None => Vec::new(),
        };
        for q in children {
            self.backoff[q as usize].state = STATE_EMPTY;
        }
        // States are created with STATE_NIL as the default back-off. Except
        // for the empty state, a STATE_NIL back-off means it is yet to be
        // computed.
        for p in STATE_START..self.backoff.len() as StateId {
            let entries: Vec<(WordId, StateId)> = match &self.transitions[p as usize] {
                Some(m) => m.iter().map(|t| (t.word, t.state)).collect(),
                None => continue,
            };
            for (x, q) in entries {
                if q != STATE_NIL {
                    self.link_transition(p, x, q);
                }
            }
        }
    }

    /// Recursively links `q`, the target of transition `(p, x)`, to the
    /// lowest back-off state with at least one outgoing transition. `q` must
    /// not be the empty state. May adjust `q`'s back-off weight when its
    /// final back-off target is not its immediate one.
    fn link_transition(&mut self, p: StateId, x: WordId, q: StateId) -> (StateId, Weight) {
        if self.backoff[q as usize].state == STATE_NIL {
            // Find the next context sharing the last word x down p's chain.
            let mut p_back = self.backoff[p as usize].state;
            let mut target = self.find_target(p_back, x);
            while target.is_none() && p_back != STATE_EMPTY {
                p_back = self.backoff[p_back as usize].state;
                target = self.find_target(p_back, x);
            }
            match target {
                Some(q_back) => {
                    // p_back is valid and q_back is not the empty state, so
                    // the chain can be followed one level further down.
                    let (q_back_back, w) = self.link_transition(p_back, x, q_back);
                    if self.transitions[q_back as usize].is_none() {
                        // q_back will be pruned. Skip over it, folding the
                        // weight of the skipped hop into q's back-off weight.
                        self.backoff[q as usize].state = q_back_back;
                        self.backoff[q as usize].weight += w;
                    } else {
                        self.backoff[q as usize].state = q_back;
                    }
                }
                None => self.backoff[q as usize].state = STATE_EMPTY,
            }
        }
        let resolved = self.backoff[q as usize];
        (resolved.state, resolved.weight)
    }

    /// Removes states without any outgoing transition. Returns the mapping
    /// from old ids to pruned ids (STATE_NIL for removed states) and the
    /// number of surviving states.
    fn prune(&self) -> (Vec<StateId>, usize) {
        let mut old_to_new = vec![STATE_NIL; self.backoff.len()];
        // The empty and start states are kept unconditionally.
        old_to_new[STATE_EMPTY as usize] = STATE_EMPTY;
        old_to_new[STATE_START as usize] = STATE_START;
        let mut next_id = STATE_START + 1;
        for o in (STATE_START as usize + 1)..self.transitions.len() {
            // The map exists iff the state has at least one out-edge.
            if self.transitions[o].is_some() {
                old_to_new[o] = next_id;
                next_id += 1;
            }
        }
        info!(
            "pruned {} states down to {}",
            self.backoff.len(),
            next_id
        );
        (old_to_new, next_id as usize)
    }

    /// Rewrites a transition under the new numbering. When the destination
    /// was pruned, steps to its back-off target instead and folds the
    /// back-off weight into the transition, so query hits never need to walk
    /// back-off chains out of their destination.
    fn prewalk(&self, e: &mut Transition, old_to_new: &[StateId]) {
        if e.state == STATE_NIL {
            return; // final transition
        }
        let old_q = e.state as usize;
        let mut q = old_to_new[old_q];
        if q == STATE_NIL {
            let skipped = self.backoff[old_q];
            q = old_to_new[skipped.state as usize];
            e.weight += skipped.weight;
        }
        e.state = q;
    }

    /// Compiles into a [`Hashed`] model, consuming the builder. `scale`
    /// multiplies each state's entry count to give its bucket count; values
    /// at or below 1 fall back to 1.5. Larger scales speed up look-ups at
    /// the cost of memory.
    pub fn dump_hashed(mut self, scale: f64) -> Hashed {
        self.link();
        let (old_to_new, num_states) = self.prune();
        self.move_hashed(&old_to_new, num_states, scale)
    }

    /// Compiles into a [`Sorted`] model, consuming the builder.
    pub fn dump_sorted(mut self) -> Sorted {
        self.link();
        let (old_to_new, num_states) = self.prune();
        self.move_sorted(&old_to_new, num_states)
    }

    fn resolved_backoff(&self, o: usize, old_to_new: &[StateId]) -> StateWeight {
        let mut backoff = self.backoff[o];
        if backoff.state != STATE_NIL {
            backoff.state = old_to_new[backoff.state as usize];
        }
        backoff
    }

    fn move_hashed(mut self, old_to_new: &[StateId], num_states: usize, scale: f64) -> Hashed {
        let scale = if scale <= 1.0 { 1.5 } else { scale };
        let mut offsets = Vec::with_capacity(num_states + 1);
        let mut entries: Vec<Transition> = Vec::new();
        offsets.push(0);
        for o in 0..old_to_new.len() {
            if old_to_new[o] == STATE_NIL {
                continue;
            }
            // Possibly absent only for the start state.
            let mut map = self.transitions[o].take().unwrap_or_else(BucketMap::new);
            map.resize((map.len() as f64 * scale).ceil() as usize);
            let backoff = self.resolved_backoff(o, old_to_new);
            let mut buckets = map.into_buckets();
            for e in buckets.iter_mut() {
                if e.word != WORD_NIL {
                    self.prewalk(e, old_to_new);
                } else {
                    // Every empty bucket carries the back-off transition, so
                    // a probe miss finds it without a second lookup.
                    e.state = backoff.state;
                    e.weight = backoff.weight;
                }
            }
            entries.extend_from_slice(&buckets);
            offsets.push(entries.len());
        }
        Hashed::from_parts(self.vocab, self.bos, self.eos, self.bos_id, self.eos_id, offsets, entries)
    }

    fn move_sorted(mut self, old_to_new: &[StateId], num_states: usize) -> Sorted {
        let mut offsets = Vec::with_capacity(num_states + 1);
        let mut entries: Vec<Transition> = Vec::new();
        offsets.push(0);
        for o in 0..old_to_new.len() {
            if old_to_new[o] == STATE_NIL {
                continue;
            }
            let start = entries.len();
            if let Some(map) = self.transitions[o].take() {
                for mut e in map.into_buckets() {
                    if e.word == WORD_NIL {
                        continue;
                    }
                    self.prewalk(&mut e, old_to_new);
                    entries.push(e);
                }
            }
            let backoff = self.resolved_backoff(o, old_to_new);
            entries.push(Transition {
                word: WORD_NIL,
                state: backoff.state,
                weight: backoff.weight,
            });
            // WORD_NIL is all ones, so the back-off entry sorts last.
            entries[start..].sort_unstable_by_key(|e| e.word);
            offsets.push(entries.len());
        }
        Sorted::from_parts(self.vocab, self.bos, self.eos, self.bos_id, self.eos_id, offsets, entries)
    }

    /// Prints the current internal topology in Graphviz dot format.
    pub fn graphviz<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "digraph {{")?;
        writeln!(w, "  // lexical transitions")?;
        for (p, map) in self.transitions.iter().enumerate() {
            if let Some(map) = map {
                for t in map.iter() {
                    let label = self.vocab.string_of(t.word).unwrap_or("??");
                    writeln!(w, "  {} -> {} [label={:?}]", p, t.state, format!("{} : {}", label, t.weight))?;
                }
            }
        }
        writeln!(w, "  // back-off transitions")?;
        for (p, sw) in self.backoff.iter().enumerate() {
            writeln!(w, "  {} -> {} [label={:?},style=dashed]", p, sw.state, format!("{}", sw.weight))?;
        }
        writeln!(w, "}}")
    }
}
