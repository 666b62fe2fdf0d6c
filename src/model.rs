use std::io::{self, Write};

use bytemuck::{Pod, Zeroable};
use memmap2::Mmap;

use crate::vocab::Vocab;

/// Id of a word in a [`Vocab`].
pub type WordId = u32;

/// The invalid word id. Doubles as the empty-bucket marker in hashed models
/// and as the label of the terminal back-off entry in sorted models.
pub const WORD_NIL: WordId = u32::MAX;

/// Id of a language model state.
pub type StateId = u32;

/// The invalid state id.
pub const STATE_NIL: StateId = u32::MAX;
/// The empty-context state. Models always use state 0 for this.
pub const STATE_EMPTY: StateId = 0;
/// The state with context `<s>`. Models always use state 1 for this.
pub const STATE_START: StateId = 1;

/// Log-probability type.
pub type Weight = f32;

/// Replacement for log(0), i.e. the weight of an impossible event.
pub const WEIGHT_LOG0: Weight = f32::NEG_INFINITY;

/// A (state, weight) pair; the builder keeps one per state for its back-off.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct StateWeight {
    pub state: StateId,
    pub weight: Weight,
}

/// A single transition record, also the fixed-size on-disk entry.
///
/// Three kinds share this layout:
///
/// 1. A lexical transition consuming an actual word (any valid word other
///    than `</s>`), leading to a valid state with some weight. A transition
///    from the empty state consuming `<s>` is allowed; in well-formed models
///    its weight is [`WEIGHT_LOG0`] so keeping it causes no trouble.
/// 2. A final transition consuming `</s>`. It carries the sentence-terminal
///    weight and its `state` is [`STATE_NIL`].
/// 3. A back-off entry with `word == WORD_NIL`, holding the state's back-off
///    target and weight.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Transition {
    pub word: WordId,
    pub state: StateId,
    pub weight: Weight,
}

/// Backing storage for a compiled model's flat entry array: either built in
/// memory or aliased straight out of a read-only file mapping.
#[derive(Debug)]
pub(crate) enum Entries {
    Owned(Vec<Transition>),
    Mapped { map: Mmap, start: usize },
}

impl Entries {
    pub(crate) fn as_slice(&self) -> &[Transition] {
        match self {
            Entries::Owned(v) => v,
            // Length and alignment were validated when the mapping was opened.
            Entries::Mapped { map, start } => bytemuck::cast_slice(&map[*start..]),
        }
    }
}

/// Shared query interface of the compiled model flavors.
///
/// All methods are pure reads of immutable state and safe to call from
/// multiple threads as long as each caller tracks its own current state.
pub trait Model {
    /// The start state, i.e. the state with context `<s>`. The caller should
    /// never explicitly consume `<s>`, which is treated as an OOV and breaks
    /// the context.
    fn start(&self) -> StateId {
        STATE_START
    }

    /// Finds the next state to go to from `p` consuming word id `x`, and the
    /// weight picked up on the way (including any back-off weights). `x` must
    /// not be `<s>` or `</s>`, but may be [`WORD_NIL`]. Any `x` outside the
    /// model's vocabulary is an OOV and yields `(STATE_EMPTY, WEIGHT_LOG0)`.
    /// Note it is possible, although rare, to have `<s> x` but not `x` in the
    /// model, in which case `x` is also an OOV when it is not the first token
    /// of a sentence.
    fn next_id(&self, p: StateId, x: WordId) -> (StateId, Weight);

    /// [`Model::next_id`] looked up by string. `word` can be anything but
    /// `<s>` or `</s>`.
    fn next(&self, p: StateId, word: &str) -> (StateId, Weight) {
        self.next_id(p, self.vocab().id_of(word))
    }

    /// The weight of "consuming" `</s>` from `p`. A sentence query must end
    /// with this to score the whole sentence; the state is not reusable
    /// afterwards.
    fn final_weight(&self, p: StateId) -> Weight {
        let (_, w) = self.next_id(p, self.eos_id());
        w
    }

    /// The back-off state and weight of `p`. The empty-context state backs
    /// off to `(STATE_NIL, 0)`.
    fn back_off(&self, p: StateId) -> (StateId, Weight);

    /// Number of states. State ids always run from 0 to `num_states() - 1`.
    fn num_states(&self) -> usize;

    /// Number of stored transitions, back-off entries excluded. Walks the
    /// whole model, so cache the result if it is needed more than once.
    fn num_transitions(&self) -> usize;

    /// Lazily iterates over the non-back-off transitions leaving `p`, in
    /// unspecified order for hashed models and ascending by word for sorted
    /// ones.
    fn transitions(&self, p: StateId) -> Box<dyn Iterator<Item = Transition> + '_>;

    fn vocab(&self) -> &Vocab;
    fn bos_id(&self) -> WordId;
    fn eos_id(&self) -> WordId;
}

/// Prints the finite-state topology of a model in Graphviz dot format.
/// Mostly for debugging; can be quite slow on real models.
pub fn graphviz<M: Model + ?Sized, W: Write>(m: &M, w: &mut W) -> io::Result<()> {
    writeln!(w, "digraph {{")?;
    writeln!(w, "  // lexical transitions")?;
    for i in 0..m.num_states() {
        let p = i as StateId;
        for t in m.transitions(p) {
            let label = m.vocab().string_of(t.word).unwrap_or("??");
            writeln!(w, "  {} -> {} [label={:?}]", p, t.state, format!("{} : {}", label, t.weight))?;
        }
    }
    writeln!(w, "  // back-off transitions")?;
    for i in 0..m.num_states() {
        let (q, weight) = m.back_off(i as StateId);
        writeln!(w, "  {} -> {} [label={:?},style=dashed]", i, q, format!("{}", weight))?;
    }
    writeln!(w, "}}")
}
