//! Open-addressing hash table specialized for word-id keyed transitions.
//!
//! Both the builder's mutable per-state maps and the compiled hashed model's
//! immutable bucket arrays probe the same way, so a lookup that lands on an
//! empty bucket in a compiled model directly yields the back-off entry
//! stored there.

use crate::model::{Transition, WordId, STATE_NIL, WORD_NIL};

pub(crate) const DEFAULT_NUM_BUCKETS: usize = 4;
pub(crate) const DEFAULT_MAX_LOAD: f64 = 0.8;

/// fast-hash style finalizer over the 32-bit key.
#[inline]
pub(crate) fn hash_word(x: WordId) -> u64 {
    let mut h = x as u64;
    h ^= h >> 23;
    h = h.wrapping_mul(0x2127599bf4325c37);
    h ^= h >> 47;
    h
}

#[inline]
fn probe_start(x: WordId, num_buckets: usize) -> usize {
    (hash_word(x) % num_buckets as u64) as usize
}

/// Probes `buckets` for `x`, returning either the matching entry or the
/// first empty bucket on the probe path. In a compiled hashed model every
/// empty bucket holds the state's back-off transition, so a miss is the
/// back-off. There is always at least one empty bucket, so this terminates.
pub(crate) fn find_entry(buckets: &[Transition], x: WordId) -> &Transition {
    let mut i = probe_start(x, buckets.len());
    loop {
        let e = &buckets[i];
        if e.word == x || e.word == WORD_NIL {
            return e;
        }
        i += 1;
        if i == buckets.len() {
            i = 0;
        }
    }
}

fn init_buckets(n: usize) -> Vec<Transition> {
    vec![
        Transition {
            word: WORD_NIL,
            state: STATE_NIL,
            weight: 0.0,
        };
        n
    ]
}

fn next_available(buckets: &[Transition], x: WordId) -> usize {
    let mut i = probe_start(x, buckets.len());
    while buckets[i].word != WORD_NIL {
        i += 1;
        if i == buckets.len() {
            i = 0;
        }
    }
    i
}

/// Linear-probing map from [`WordId`] to a (state, weight) pair, used by the
/// builder for the outgoing transitions of one state.
pub(crate) struct BucketMap {
    buckets: Vec<Transition>,
    num_entries: usize,
    threshold: usize,
}

impl BucketMap {
    pub(crate) fn new() -> Self {
        Self::with_capacity(DEFAULT_NUM_BUCKETS, DEFAULT_MAX_LOAD)
    }

    pub(crate) fn with_capacity(num_buckets: usize, max_load: f64) -> Self {
        let num_buckets = match num_buckets {
            0 => DEFAULT_NUM_BUCKETS,
            1 => 2,
            n => n,
        };
        let max_load = if max_load <= 0.0 || max_load >= 1.0 {
            DEFAULT_MAX_LOAD
        } else {
            max_load
        };
        let threshold = ((num_buckets as f64 * max_load) as usize).clamp(1, num_buckets - 1);
        BucketMap {
            buckets: init_buckets(num_buckets),
            num_entries: 0,
            threshold,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.num_entries
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn find(&self, x: WordId) -> Option<&Transition> {
        let e = find_entry(&self.buckets, x);
        if e.word == x {
            Some(e)
        } else {
            None
        }
    }

    /// Returns the entry for `x`, inserting a fresh one if absent. Growing
    /// happens before the insertion that would cross the load threshold, so
    /// `num_entries < buckets.len()` always holds.
    pub(crate) fn get_or_insert(&mut self, x: WordId) -> &mut Transition {
        let mut i = {
            let mut i = probe_start(x, self.buckets.len());
            loop {
                let word = self.buckets[i].word;
                if word == x || word == WORD_NIL {
                    break i;
                }
                i += 1;
                if i == self.buckets.len() {
                    i = 0;
                }
            }
        };
        if self.buckets[i].word != x {
            if self.num_entries >= self.threshold {
                self.resize(self.buckets.len() * 2);
                i = next_available(&self.buckets, x);
            }
            self.buckets[i] = Transition {
                word: x,
                state: STATE_NIL,
                weight: 0.0,
            };
            self.num_entries += 1;
        }
        &mut self.buckets[i]
    }

    /// Rehashes into `num_buckets` buckets, or just enough to keep one empty
    /// slot if `num_buckets` is too small. The growth threshold is rescaled
    /// proportionally.
    pub(crate) fn resize(&mut self, num_buckets: usize) {
        let num_buckets = num_buckets.max(self.num_entries + 1);
        let old = std::mem::replace(&mut self.buckets, init_buckets(num_buckets));
        for e in old.iter() {
            if e.word != WORD_NIL {
                let i = next_available(&self.buckets, e.word);
                self.buckets[i] = *e;
            }
        }
        self.threshold = (self.threshold * num_buckets / old.len()).max(self.num_entries);
    }

    /// Live entries, in unspecified order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buckets.iter().filter(|e| e.word != WORD_NIL)
    }

    pub(crate) fn into_buckets(self) -> Vec<Transition> {
        self.buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Weight;

    fn insert(m: &mut BucketMap, x: WordId, state: u32, weight: Weight) {
        let e = m.get_or_insert(x);
        e.state = state;
        e.weight = weight;
    }

    #[test]
    fn grows_past_the_load_threshold() {
        let mut m = BucketMap::with_capacity(4, 0.8);
        assert_eq!(m.capacity(), 4);
        for x in 0..5u32 {
            insert(&mut m, x, x + 100, -(x as Weight));
        }
        assert_eq!(m.len(), 5);
        assert_eq!(m.capacity(), 8);
        for x in 0..5u32 {
            let e = m.find(x).unwrap();
            assert_eq!(e.state, x + 100);
            assert_eq!(e.weight, -(x as Weight));
        }
        assert!(m.find(5).is_none());
    }

    #[test]
    fn overwrite_keeps_a_single_entry() {
        let mut m = BucketMap::new();
        insert(&mut m, 7, 1, -1.0);
        insert(&mut m, 7, 2, -2.0);
        assert_eq!(m.len(), 1);
        let e = m.find(7).unwrap();
        assert_eq!((e.state, e.weight), (2, -2.0));
    }

    #[test]
    fn explicit_resize_keeps_entries_reachable() {
        let mut m = BucketMap::new();
        for x in 0..3u32 {
            insert(&mut m, x, x, 0.0);
        }
        m.resize(64);
        assert_eq!(m.capacity(), 64);
        for x in 0..3u32 {
            assert!(m.find(x).is_some());
        }
        // Too-small targets are clamped so one empty bucket remains.
        m.resize(0);
        assert_eq!(m.capacity(), m.len() + 1);
        for x in 0..3u32 {
            assert!(m.find(x).is_some());
        }
    }

    #[test]
    fn find_entry_yields_the_empty_bucket_on_miss() {
        let mut m = BucketMap::with_capacity(4, 0.8);
        insert(&mut m, 3, 30, -0.5);
        let buckets = m.into_buckets();
        assert_eq!(find_entry(&buckets, 3).state, 30);
        assert_eq!(find_entry(&buckets, 1234).word, WORD_NIL);
    }

    #[test]
    fn iter_yields_live_entries_only() {
        let mut m = BucketMap::new();
        for x in [2u32, 11, 29] {
            insert(&mut m, x, x, 0.0);
        }
        let mut words: Vec<WordId> = m.iter().map(|e| e.word).collect();
        words.sort_unstable();
        assert_eq!(words, vec![2, 11, 29]);
    }
}
