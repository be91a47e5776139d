//! Vectorized merge-into-dense primitives with a scalar fallback.
//!
//! Each primitive merges a sparse member run into a dense word buffer in
//! place and returns the signed change in the number of set bits. The
//! scalar paths live on [`ArrayStore`] and derive the delta per member from
//! the before/after word values. The AVX2 paths here instead stage the
//! members in a dense scratch buffer, apply the boolean op four words per
//! lane across the whole buffer, and take the delta as the difference of
//! population counts snapshotted before and after.
//!
//! The two paths must agree bit for bit and delta for delta on every input,
//! including the empty run (delta 0, no mutation). AVX2 availability is
//! detected once at run time; everywhere else the scalar path runs.

use crate::array::ArrayStore;
use crate::bitmap::{new_words, popcount, WORDS};

#[cfg(target_arch = "x86_64")]
fn have_avx2() -> bool {
    use std::sync::OnceLock;
    static AVX2: OnceLock<bool> = OnceLock::new();
    *AVX2.get_or_init(|| std::arch::is_x86_feature_detected!("avx2"))
}

/// Merge-or: sets every member's bit, returning the number of bits added.
pub(crate) fn or_into_auto(values: &ArrayStore, words: &mut [u64; WORDS]) -> i32 {
    #[cfg(target_arch = "x86_64")]
    {
        if have_avx2() {
            return unsafe { or_into_avx2(values, words) };
        }
    }
    values.or_into(words)
}

/// Merge-xor: toggles every member's bit, returning the signed bit-count change.
pub(crate) fn xor_into_auto(values: &ArrayStore, words: &mut [u64; WORDS]) -> i32 {
    #[cfg(target_arch = "x86_64")]
    {
        if have_avx2() {
            return unsafe { xor_into_avx2(values, words) };
        }
    }
    values.xor_into(words)
}

/// Merge-and-not: clears every member's bit, returning the signed bit-count change.
pub(crate) fn and_not_into_auto(values: &ArrayStore, words: &mut [u64; WORDS]) -> i32 {
    #[cfg(target_arch = "x86_64")]
    {
        if have_avx2() {
            return unsafe { and_not_into_avx2(values, words) };
        }
    }
    values.and_not_into(words)
}

/// The members staged as a dense buffer, for lane-wise merging.
#[cfg(target_arch = "x86_64")]
fn scratch_from(values: &ArrayStore) -> Box<[u64; WORDS]> {
    let mut scratch = new_words();
    for &value in values.values() {
        scratch[usize::from(value >> 6)] |= 1u64 << (value & 63);
    }
    scratch
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn or_into_avx2(values: &ArrayStore, words: &mut [u64; WORDS]) -> i32 {
    use std::arch::x86_64::*;
    let scratch = scratch_from(values);
    let before = popcount(&words[..]);
    let src = scratch.as_ptr();
    let dst = words.as_mut_ptr();
    for slot in (0..WORDS).step_by(4) {
        let mine = _mm256_loadu_si256(dst.add(slot).cast());
        let theirs = _mm256_loadu_si256(src.add(slot).cast());
        _mm256_storeu_si256(dst.add(slot).cast(), _mm256_or_si256(mine, theirs));
    }
    let after = popcount(&words[..]);
    after as i32 - before as i32
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn xor_into_avx2(values: &ArrayStore, words: &mut [u64; WORDS]) -> i32 {
    use std::arch::x86_64::*;
    let scratch = scratch_from(values);
    let before = popcount(&words[..]);
    let src = scratch.as_ptr();
    let dst = words.as_mut_ptr();
    for slot in (0..WORDS).step_by(4) {
        let mine = _mm256_loadu_si256(dst.add(slot).cast());
        let theirs = _mm256_loadu_si256(src.add(slot).cast());
        _mm256_storeu_si256(dst.add(slot).cast(), _mm256_xor_si256(mine, theirs));
    }
    let after = popcount(&words[..]);
    after as i32 - before as i32
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn and_not_into_avx2(values: &ArrayStore, words: &mut [u64; WORDS]) -> i32 {
    use std::arch::x86_64::*;
    let scratch = scratch_from(values);
    let before = popcount(&words[..]);
    let src = scratch.as_ptr();
    let dst = words.as_mut_ptr();
    for slot in (0..WORDS).step_by(4) {
        let mine = _mm256_loadu_si256(dst.add(slot).cast());
        let theirs = _mm256_loadu_si256(src.add(slot).cast());
        // andnot computes `!first & second`, so the staged operand goes first.
        _mm256_storeu_si256(dst.add(slot).cast(), _mm256_andnot_si256(theirs, mine));
    }
    let after = popcount(&words[..]);
    after as i32 - before as i32
}
