//! The sparse container store: a sorted, duplicate-free run of 16-bit members.

use std::sync::Arc;

use crate::bitmap::WORDS;

/// Sorted unique members of one 65536-value chunk.
///
/// The payload sits behind an `Arc` so that cloning a container (for example
/// when merge-join copies one side's entry verbatim) bumps a reference count
/// instead of copying the member run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ArrayStore {
    values: Arc<[u16]>,
}

impl ArrayStore {
    /// Wraps an already sorted, duplicate-free run of members.
    pub(crate) fn from_sorted(values: Vec<u16>) -> Self {
        debug_assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
        ArrayStore { values: Arc::from(values) }
    }

    pub(crate) fn empty() -> Self {
        ArrayStore { values: Arc::from(Vec::new()) }
    }

    #[inline]
    pub(crate) fn cardinality(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub(crate) fn values(&self) -> &[u16] {
        &self.values
    }

    #[inline]
    pub(crate) fn contains(&self, value: u16) -> bool {
        self.values.binary_search(&value).is_ok()
    }

    /// Appends `base | member` for every member, in ascending order.
    pub(crate) fn enumerate_into(&self, out: &mut Vec<u32>, base: u32) {
        out.extend(self.values.iter().map(|&value| base | u32::from(value)));
    }

    /// Sets every member's bit in `words` and returns the number of bits that
    /// flipped on.
    ///
    /// The per-member delta is the sign bit of `previous - after`: or-ing a
    /// mask in can only grow the word, so the subtraction wraps exactly when
    /// a new bit appeared.
    pub(crate) fn or_into(&self, words: &mut [u64; WORDS]) -> i32 {
        let mut delta = 0;
        for &value in self.values.iter() {
            let slot = usize::from(value >> 6);
            let previous = words[slot];
            let after = previous | 1u64 << (value & 63);
            words[slot] = after;
            delta += (previous.wrapping_sub(after) >> 63) as i32;
        }
        delta
    }

    /// Toggles every member's bit in `words` and returns the signed change
    /// in the number of set bits.
    ///
    /// `(previous & mask) >> shift` is 1 when the bit was already set, so
    /// `1 - 2 * bit` contributes +1 for a toggle on and -1 for a toggle off.
    pub(crate) fn xor_into(&self, words: &mut [u64; WORDS]) -> i32 {
        let mut delta = 0;
        for &value in self.values.iter() {
            let slot = usize::from(value >> 6);
            let shift = u32::from(value & 63);
            let mask = 1u64 << shift;
            let previous = words[slot];
            words[slot] = previous ^ mask;
            delta += 1 - 2 * ((previous & mask) >> shift) as i32;
        }
        delta
    }

    /// Clears every member's bit in `words` and returns the (non-positive)
    /// change in the number of set bits.
    ///
    /// `previous ^ after` isolates the cleared bit, so the shifted value is
    /// 1 exactly when the bit had been set.
    pub(crate) fn and_not_into(&self, words: &mut [u64; WORDS]) -> i32 {
        let mut delta = 0;
        for &value in self.values.iter() {
            let slot = usize::from(value >> 6);
            let shift = u32::from(value & 63);
            let previous = words[slot];
            let after = previous & !(1u64 << shift);
            words[slot] = after;
            delta -= ((previous ^ after) >> shift) as i32;
        }
        delta
    }
}

/// Sorted merge keeping values present in either input, once.
pub(crate) fn union_sorted(xs: &[u16], ys: &[u16]) -> Vec<u16> {
    let mut out = Vec::with_capacity(xs.len() + ys.len());
    let (mut i, mut j) = (0, 0);
    while i < xs.len() && j < ys.len() {
        match xs[i].cmp(&ys[j]) {
            std::cmp::Ordering::Less => {
                out.push(xs[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(ys[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(xs[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&xs[i..]);
    out.extend_from_slice(&ys[j..]);
    out
}

/// Sorted merge keeping values present in both inputs.
pub(crate) fn intersect_sorted(xs: &[u16], ys: &[u16]) -> Vec<u16> {
    let mut out = Vec::with_capacity(xs.len().min(ys.len()));
    let (mut i, mut j) = (0, 0);
    while i < xs.len() && j < ys.len() {
        match xs[i].cmp(&ys[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(xs[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Sorted merge keeping values present in `xs` but not in `ys`.
pub(crate) fn difference_sorted(xs: &[u16], ys: &[u16]) -> Vec<u16> {
    let mut out = Vec::with_capacity(xs.len());
    let (mut i, mut j) = (0, 0);
    while i < xs.len() && j < ys.len() {
        match xs[i].cmp(&ys[j]) {
            std::cmp::Ordering::Less => {
                out.push(xs[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&xs[i..]);
    out
}

/// Sorted merge keeping values present in exactly one input.
pub(crate) fn symmetric_difference_sorted(xs: &[u16], ys: &[u16]) -> Vec<u16> {
    let mut out = Vec::with_capacity(xs.len() + ys.len());
    let (mut i, mut j) = (0, 0);
    while i < xs.len() && j < ys.len() {
        match xs[i].cmp(&ys[j]) {
            std::cmp::Ordering::Less => {
                out.push(xs[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(ys[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&xs[i..]);
    out.extend_from_slice(&ys[j..]);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::new_words;

    fn bit_set(words: &[u64; WORDS], value: u16) -> bool {
        words[usize::from(value >> 6)] & (1u64 << (value & 63)) != 0
    }

    fn store(values: &[u16]) -> ArrayStore {
        ArrayStore::from_sorted(values.to_vec())
    }

    #[test]
    fn or_into_empty_buffer_sets_all_bits() {
        let values = store(&[1, 63, 64, 500]);
        let mut words = new_words();
        let delta = values.or_into(&mut words);
        assert_eq!(delta, 4);
        for value in [1, 63, 64, 500] {
            assert!(bit_set(&words, value));
        }
    }

    #[test]
    fn or_into_counts_only_missing_bits() {
        let values = store(&[1, 200, 500]);
        let mut words = new_words();
        words[1 >> 6] |= 1u64 << 1;
        words[200 >> 6] |= 1u64 << (200 & 63);
        let delta = values.or_into(&mut words);
        assert_eq!(delta, 1);
        for value in [1, 200, 500] {
            assert!(bit_set(&words, value));
        }
    }

    #[test]
    fn xor_into_empty_buffer_toggles_on() {
        let values = store(&[2, 100]);
        let mut words = new_words();
        let delta = values.xor_into(&mut words);
        assert_eq!(delta, 2);
        assert!(bit_set(&words, 2));
        assert!(bit_set(&words, 100));
    }

    #[test]
    fn xor_into_toggles_existing_bits_off() {
        let values = store(&[2, 100]);
        let mut words = new_words();
        words[2 >> 6] |= 1u64 << 2;
        let delta = values.xor_into(&mut words);
        assert_eq!(delta, 0);
        assert!(!bit_set(&words, 2));
        assert!(bit_set(&words, 100));
    }

    #[test]
    fn and_not_into_empty_buffer_changes_nothing() {
        let values = store(&[3, 30]);
        let mut words = new_words();
        let delta = values.and_not_into(&mut words);
        assert_eq!(delta, 0);
        assert_eq!(words.iter().copied().sum::<u64>(), 0);
    }

    #[test]
    fn and_not_into_clears_existing_bits() {
        let values = store(&[3, 30]);
        let mut words = new_words();
        for value in [3u16, 30, 40] {
            words[usize::from(value >> 6)] |= 1u64 << (value & 63);
        }
        let delta = values.and_not_into(&mut words);
        assert_eq!(delta, -2);
        assert!(!bit_set(&words, 3));
        assert!(!bit_set(&words, 30));
        assert!(bit_set(&words, 40));
    }

    #[test]
    fn deltas_handle_word_boundaries() {
        // Bits 0 and 63 share a word; 65535 is the last bit of the last word.
        let values = store(&[0, 63, 65535]);
        let mut words = new_words();
        words[0] = u64::MAX;
        assert_eq!(values.xor_into(&mut words), -1);
        assert!(!bit_set(&words, 0));
        assert!(!bit_set(&words, 63));
        assert!(bit_set(&words, 65535));
    }

    #[test]
    fn merge_kernels_match_naive_sets() {
        let xs: Vec<u16> = vec![1, 2, 5, 9, 100, 101];
        let ys: Vec<u16> = vec![2, 3, 9, 200];
        assert_eq!(union_sorted(&xs, &ys), vec![1, 2, 3, 5, 9, 100, 101, 200]);
        assert_eq!(intersect_sorted(&xs, &ys), vec![2, 9]);
        assert_eq!(difference_sorted(&xs, &ys), vec![1, 5, 100, 101]);
        assert_eq!(symmetric_difference_sorted(&xs, &ys), vec![1, 3, 5, 100, 101, 200]);
    }

    #[test]
    fn merge_kernels_with_empty_operands() {
        let xs: Vec<u16> = vec![7, 8];
        assert_eq!(union_sorted(&xs, &[]), xs);
        assert_eq!(intersect_sorted(&xs, &[]), Vec::<u16>::new());
        assert_eq!(difference_sorted(&[], &xs), Vec::<u16>::new());
        assert_eq!(symmetric_difference_sorted(&[], &xs), xs);
    }

    #[test]
    fn contains_uses_binary_search() {
        let values = store(&[10, 20, 30]);
        assert!(values.contains(20));
        assert!(!values.contains(25));
        assert!(!ArrayStore::empty().contains(0));
    }
}
