//! The dense container store: a fixed 65536-bit vector with a cached
//! cardinality.
//!
//! Cardinality is tracked rather than recomputed per query, but every
//! whole-word bulk operation recounts it with a full population count over
//! all 1024 words. That keeps dense-versus-dense algebra a fixed-cost,
//! branch-light pass regardless of how many bits are set.

use std::fmt;
use std::sync::Arc;

use crate::array::ArrayStore;

/// Number of 64-bit words in a dense container.
pub(crate) const WORDS: usize = 1024;

/// Number of representable members per chunk.
pub(crate) const CAPACITY: u32 = 1 << 16;

/// A freshly zeroed word buffer, allocated directly on the heap.
#[inline]
pub(crate) fn new_words() -> Box<[u64; WORDS]> {
    bytemuck::zeroed_box()
}

/// Set bits across a word slice.
#[inline]
pub(crate) fn popcount(words: &[u64]) -> u32 {
    words.iter().map(|word| word.count_ones()).sum()
}

/// All members of one chunk as bits, `low` at word `low >> 6`, bit `low & 63`.
#[derive(Clone)]
pub(crate) struct BitmapStore {
    words: Arc<[u64; WORDS]>,
    cardinality: u32,
}

impl BitmapStore {
    /// Wraps a word buffer whose population count the caller already knows.
    pub(crate) fn from_words_with_cardinality(words: Box<[u64; WORDS]>, cardinality: u32) -> Self {
        debug_assert_eq!(popcount(&words[..]), cardinality);
        BitmapStore { words: Arc::from(words), cardinality }
    }

    /// Wraps a word buffer, recounting its bits.
    pub(crate) fn from_words(words: Box<[u64; WORDS]>) -> Self {
        let cardinality = popcount(&words[..]);
        BitmapStore { words: Arc::from(words), cardinality }
    }

    /// Builds from a sorted unique member run.
    pub(crate) fn from_sorted(values: &[u16]) -> Self {
        let mut words = new_words();
        for &value in values {
            words[usize::from(value >> 6)] |= 1u64 << (value & 63);
        }
        BitmapStore::from_words_with_cardinality(words, values.len() as u32)
    }

    /// Builds the complement of a sorted unique member run: every bit set,
    /// then each member's bit cleared.
    pub(crate) fn from_sorted_negated(values: &[u16]) -> Self {
        let mut words = new_words();
        words.fill(u64::MAX);
        for &value in values {
            words[usize::from(value >> 6)] &= !(1u64 << (value & 63));
        }
        BitmapStore::from_words_with_cardinality(words, CAPACITY - values.len() as u32)
    }

    /// The full chunk, all 65536 bits set.
    pub(crate) fn full() -> Self {
        BitmapStore::from_sorted_negated(&[])
    }

    #[inline]
    pub(crate) fn cardinality(&self) -> u32 {
        self.cardinality
    }

    #[inline]
    pub(crate) fn words(&self) -> &[u64; WORDS] {
        &self.words
    }

    /// A private mutable copy of the words, for use as an operation's
    /// scratch buffer.
    pub(crate) fn clone_words(&self) -> Box<[u64; WORDS]> {
        let mut words = new_words();
        words.copy_from_slice(&self.words[..]);
        words
    }

    #[inline]
    pub(crate) fn contains(&self, value: u16) -> bool {
        self.words[usize::from(value >> 6)] & (1u64 << (value & 63)) != 0
    }

    fn combine(&self, other: &Self, op: impl Fn(u64, u64) -> u64) -> Self {
        let mut words = self.clone_words();
        for (word, &theirs) in words.iter_mut().zip(other.words.iter()) {
            *word = op(*word, theirs);
        }
        BitmapStore::from_words(words)
    }

    pub(crate) fn and(&self, other: &Self) -> Self {
        self.combine(other, |mine, theirs| mine & theirs)
    }

    pub(crate) fn or(&self, other: &Self) -> Self {
        self.combine(other, |mine, theirs| mine | theirs)
    }

    pub(crate) fn xor(&self, other: &Self) -> Self {
        self.combine(other, |mine, theirs| mine ^ theirs)
    }

    pub(crate) fn and_not(&self, other: &Self) -> Self {
        self.combine(other, |mine, theirs| mine & !theirs)
    }

    pub(crate) fn not(&self) -> Self {
        let mut words = self.clone_words();
        for word in words.iter_mut() {
            *word = !*word;
        }
        BitmapStore::from_words_with_cardinality(words, CAPACITY - self.cardinality)
    }

    /// Converts to the sparse form, enumerating set bits in ascending order
    /// by repeatedly extracting the lowest set bit of each word.
    pub(crate) fn to_array(&self) -> ArrayStore {
        let mut values = Vec::with_capacity(self.cardinality as usize);
        for (slot, &word) in self.words.iter().enumerate() {
            let base = (slot << 6) as u16;
            let mut bits = word;
            while bits != 0 {
                let lowest = bits & bits.wrapping_neg();
                values.push(base + lowest.trailing_zeros() as u16);
                bits ^= lowest;
            }
        }
        ArrayStore::from_sorted(values)
    }

    /// Appends `base | member` for every member, in ascending order.
    pub(crate) fn enumerate_into(&self, out: &mut Vec<u32>, base: u32) {
        for (slot, &word) in self.words.iter().enumerate() {
            let shifted = (slot << 6) as u32;
            let mut bits = word;
            while bits != 0 {
                let lowest = bits & bits.wrapping_neg();
                out.push(base | (shifted + lowest.trailing_zeros()));
                bits ^= lowest;
            }
        }
    }
}

impl PartialEq for BitmapStore {
    fn eq(&self, other: &Self) -> bool {
        self.cardinality == other.cardinality && self.words[..] == other.words[..]
    }
}

impl Eq for BitmapStore {}

impl fmt::Debug for BitmapStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapStore")
            .field("cardinality", &self.cardinality)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_sorted_sets_exactly_those_bits() {
        let store = BitmapStore::from_sorted(&[0, 63, 64, 4097, 65535]);
        assert_eq!(store.cardinality(), 5);
        for value in [0u16, 63, 64, 4097, 65535] {
            assert!(store.contains(value));
        }
        assert!(!store.contains(1));
        assert!(!store.contains(4096));
    }

    #[test]
    fn negated_construction_is_the_complement() {
        let members = [5u16, 6, 7, 10_000];
        let store = BitmapStore::from_sorted_negated(&members);
        assert_eq!(store.cardinality(), CAPACITY - 4);
        for value in members {
            assert!(!store.contains(value));
        }
        assert!(store.contains(4));
        assert!(store.contains(9_999));
    }

    #[test]
    fn full_has_every_bit() {
        let full = BitmapStore::full();
        assert_eq!(full.cardinality(), CAPACITY);
        assert!(full.contains(0));
        assert!(full.contains(65535));
    }

    #[test]
    fn bulk_ops_recount_cardinality() {
        let a = BitmapStore::from_sorted(&[1, 2, 3, 64, 65]);
        let b = BitmapStore::from_sorted(&[2, 3, 4, 65, 1000]);
        assert_eq!(a.and(&b).cardinality(), 3);
        assert_eq!(a.or(&b).cardinality(), 7);
        assert_eq!(a.xor(&b).cardinality(), 4);
        assert_eq!(a.and_not(&b).cardinality(), 2);
        assert_eq!(a.not().cardinality(), CAPACITY - 5);
    }

    #[test]
    fn enumeration_is_ascending() {
        let members = [3u16, 63, 64, 127, 128, 9000, 65535];
        let store = BitmapStore::from_sorted(&members);
        let mut out = Vec::new();
        store.enumerate_into(&mut out, 7 << 16);
        let expected: Vec<u32> = members.iter().map(|&m| (7 << 16) | u32::from(m)).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn to_array_round_trips() {
        let members: Vec<u16> = (0..2000).map(|i| i * 3).collect();
        let store = BitmapStore::from_sorted(&members);
        assert_eq!(store.to_array().values(), &members[..]);
    }

    #[test]
    fn equality_compares_contents() {
        let a = BitmapStore::from_sorted(&[1, 2, 3]);
        let b = BitmapStore::from_sorted(&[1, 2, 3]);
        let c = BitmapStore::from_sorted(&[1, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
