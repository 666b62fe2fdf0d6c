//! Shared fixtures for testing compiled language models: small LMs with
//! hand-computed per-token weights, plus structural checks that every
//! compiled model must pass.

#![allow(dead_code)]

use fslm::{Builder, Model, StateId, Weight, STATE_EMPTY, STATE_NIL, STATE_START, WEIGHT_LOG0};

pub const FLOAT_TOL: Weight = 1e-7;

/// (context, word, weight, back_off)
pub type NgramEntry = (&'static str, &'static str, Weight, Weight);
/// (word, expected incremental weight); `</s>` means the final weight.
pub type TokenWeight = (&'static str, Weight);

pub const SIMPLE_TRIGRAM_LM: &[NgramEntry] = &[
    ("", "<s>", WEIGHT_LOG0, -1.0),
    ("", "</s>", -0.01, 0.0),
    ("", "a", -2.0, -1.0),
    ("", "b", -4.0, -2.0),
    ("<s>", "a", -1.0, -0.5),
    ("a", "b", -2.0, -1.0),
    ("<s> a", "b", -1.5, 0.0),
    ("a b", "</s>", -0.001, 0.0),
];

pub const SIMPLE_TRIGRAM_SENTS: &[&[TokenWeight]] = &[
    &[("a", -1.0), ("</s>", -0.5 - 1.0 - 0.01)],
    &[("a", -1.0), ("b", -1.5), ("</s>", -0.001)],
    &[
        ("a", -1.0),
        ("b", -1.5),
        ("a", -1.0 - 2.0 - 2.0),
        ("b", -2.0),
        ("</s>", -0.001),
    ],
    &[("a", -1.0), ("b", -1.5), ("c", WEIGHT_LOG0), ("</s>", -0.01)],
];

pub const SPARSE_FIVEGRAM_LM: &[NgramEntry] = &[
    ("", "<s>", WEIGHT_LOG0, -1.0),
    ("", "</s>", 0.1, 0.0),
    ("<s> a a a", "a", -1.0, -2.0),
    ("a a", "a", -3.0, -4.0),
];

pub const SPARSE_FIVEGRAM_SENTS: &[&[TokenWeight]] = &[
    &[("a", 0.0), ("</s>", 0.1)],
    &[("a", 0.0), ("a", 0.0), ("</s>", 0.1)],
    &[("a", 0.0), ("a", 0.0), ("a", 0.0), ("</s>", -4.0 + 0.1)],
    &[
        ("a", 0.0),
        ("a", 0.0),
        ("a", 0.0),
        ("a", -1.0),
        ("</s>", -2.0 - 4.0 + 0.1),
    ],
    &[
        ("a", 0.0),
        ("a", 0.0),
        ("a", 0.0),
        ("a", -1.0),
        ("a", -2.0 - 4.0 - 3.0),
        ("</s>", -4.0 + 0.1),
    ],
    &[
        ("a", 0.0),
        ("a", 0.0),
        ("a", 0.0),
        ("a", -1.0),
        ("a", -2.0 - 4.0 - 3.0),
        ("a", -4.0 - 3.0),
        ("</s>", -4.0 + 0.1),
    ],
    &[
        ("a", 0.0),
        ("a", 0.0),
        ("a", 0.0),
        ("a", -1.0),
        ("a", -2.0 - 4.0 - 3.0),
        ("a", -4.0 - 3.0),
        ("a", -4.0 - 3.0),
        ("</s>", -4.0 + 0.1),
    ],
];

pub const SPARSER_FIVEGRAM_LM: &[NgramEntry] = &[
    ("", "<s>", WEIGHT_LOG0, -1.0),
    ("", "</s>", 0.1, 0.0),
    ("<s> a a a", "a", -1.0, -2.0),
];

pub const SPARSER_FIVEGRAM_SENTS: &[&[TokenWeight]] = &[
    &[("a", 0.0), ("</s>", 0.1)],
    &[("a", 0.0), ("a", 0.0), ("</s>", 0.1)],
    &[("a", 0.0), ("a", 0.0), ("a", 0.0), ("</s>", 0.1)],
    &[
        ("a", 0.0),
        ("a", 0.0),
        ("a", 0.0),
        ("a", -1.0),
        ("</s>", -2.0 + 0.1),
    ],
    &[
        ("a", 0.0),
        ("a", 0.0),
        ("a", 0.0),
        ("a", -1.0),
        ("a", WEIGHT_LOG0),
        ("</s>", 0.1),
    ],
    &[
        ("a", 0.0),
        ("a", 0.0),
        ("a", 0.0),
        ("a", -1.0),
        ("a", WEIGHT_LOG0),
        ("a", WEIGHT_LOG0),
        ("</s>", 0.1),
    ],
    &[
        ("a", 0.0),
        ("a", 0.0),
        ("a", 0.0),
        ("a", -1.0),
        ("a", WEIGHT_LOG0),
        ("a", WEIGHT_LOG0),
        ("a", WEIGHT_LOG0),
        ("</s>", 0.1),
    ],
];

pub const TRICKY_BACK_OFF_LM: &[NgramEntry] = &[
    ("", "<s>", 0.0, -1.0),
    ("", "</s>", 0.1, 0.0),
    ("a b c", "d", -1.0, -2.0),
    ("b c", "e", -4.0, 1.0),
    ("c", "d", 0.0, -3.0),
];

pub const TRICKY_BACK_OFF_SENTS: &[&[TokenWeight]] = &[
    &[("</s>", -1.0 + 0.1)],
    &[
        ("a", -1.0),
        ("b", 0.0),
        ("c", 0.0),
        ("d", -1.0),
        ("</s>", -2.0 - 3.0 + 0.1),
    ],
    &[
        ("a", -1.0),
        ("b", 0.0),
        ("c", 0.0),
        ("e", -4.0),
        ("</s>", 1.0 + 0.1),
    ],
];

pub fn ready_builder(lm: &[NgramEntry]) -> Builder {
    let mut builder = Builder::new();
    for &(context, word, weight, back_off) in lm {
        let context: Vec<&str> = context.split_whitespace().collect();
        builder.add_ngram(&context, word, weight, back_off).unwrap();
    }
    builder
}

/// Walks each sentence through the model and compares the total weight
/// against the hand-computed one. Totals involving log(0) compare equal by
/// both being -inf.
pub fn check_sents<M: Model>(model: &M, sents: &[&[TokenWeight]]) {
    for sent in sents {
        let mut expected: Weight = 0.0;
        let mut got: Weight = 0.0;
        let mut weights = Vec::new();
        let mut p = model.start();
        for &(word, w0) in sent.iter() {
            let w = if word == "</s>" {
                model.final_weight(p)
            } else {
                let (q, w) = model.next(p, word);
                p = q;
                w
            };
            expected += w0;
            got += w;
            weights.push(w);
        }
        let diff = expected - got;
        assert!(
            !(diff >= FLOAT_TOL || -diff >= FLOAT_TOL),
            "sent {:?}: expected total {}, got {} (per-token {:?})",
            sent,
            expected,
            got,
            weights
        );
    }
}

/// Structural invariants of any compiled model.
pub fn check_model<M: Model>(m: &M) {
    let n = m.num_states();

    // Every state is connected to the start state via lexical and back-off
    // edges.
    let mut uf = UnionFind::new(n);
    for i in 0..n {
        let p = i as StateId;
        let (b, _) = m.back_off(p);
        if b != STATE_NIL {
            uf.union(i, b as usize);
        }
        for t in m.transitions(p) {
            if t.state != STATE_NIL {
                uf.union(i, t.state as usize);
            }
        }
    }
    for i in 0..n {
        assert_eq!(
            uf.find(i),
            uf.find(STATE_START as usize),
            "state {} is not reachable",
            i
        );
    }

    // The empty state backs off to nowhere; every other state reaches it by
    // following back-off edges.
    let (b, _) = m.back_off(STATE_EMPTY);
    assert_eq!(b, STATE_NIL, "wrong back-off for the empty state");
    for i in 1..n {
        let mut p = i as StateId;
        let mut steps = 0;
        while p != STATE_EMPTY {
            let (b, _) = m.back_off(p);
            assert_ne!(b, STATE_NIL, "back-off chain from state {} dead-ends", i);
            p = b;
            steps += 1;
            assert!(steps <= n, "back-off chain from state {} does not terminate", i);
        }
    }

    // Back-off targets have at least one outgoing transition, and the start
    // state is the only state allowed to have none.
    let internal: Vec<bool> = (0..n)
        .map(|i| m.transitions(i as StateId).next().is_some())
        .collect();
    for i in 1..n {
        let (b, _) = m.back_off(i as StateId);
        assert!(internal[b as usize], "state {} backs off to leaf state {}", i, b);
    }
    for (i, &ok) in internal.iter().enumerate() {
        if !ok {
            assert_eq!(i as StateId, STATE_START, "non-start leaf state {}", i);
        }
    }
}

/// Asserts two models define exactly the same weighted language, state by
/// state and word by word.
pub fn assert_identical<A: Model, B: Model>(a: &A, b: &B) {
    assert_eq!(a.num_states(), b.num_states());
    assert_eq!(a.bos_id(), b.bos_id());
    assert_eq!(a.eos_id(), b.eos_id());
    let bound = a.vocab().bound();
    assert_eq!(bound, b.vocab().bound());
    for i in 0..a.num_states() {
        let p = i as StateId;
        assert_eq!(a.back_off(p), b.back_off(p), "back-off of state {}", p);
        for x in 0..bound {
            assert_eq!(a.next_id(p, x), b.next_id(p, x), "state {} word {}", p, x);
        }
        assert_eq!(a.final_weight(p), b.final_weight(p), "final weight of state {}", p);
    }
}

struct UnionFind(Vec<usize>);

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind((0..n).collect())
    }

    fn find(&mut self, mut a: usize) -> usize {
        let mut r = self.0[a];
        while r != self.0[r] {
            r = self.0[r];
        }
        while self.0[a] != r {
            let next = self.0[a];
            self.0[a] = r;
            a = next;
        }
        r
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        self.0[rb] = ra;
    }
}
