//! The closed container variant and its pairwise algebra.
//!
//! A container holds the low 16 bits of every set member sharing one chunk
//! key. There are exactly two shapes: a sorted array for sparse chunks and
//! a fixed bitmap for dense ones. The boundary is [`ARRAY_MAX_SIZE`]:
//! after every operation a result with at most that many members is in
//! array form and anything larger is in bitmap form, which bounds memory
//! per chunk at 8 KiB and keeps later algebra on the cheap path.

use std::sync::LazyLock;

use crate::array::{self, ArrayStore};
use crate::bitmap::{BitmapStore, WORDS};
use crate::simd;

/// Largest cardinality stored in array form. One sixteenth of the chunk
/// universe; beyond this the fixed 8 KiB bitmap is the smaller encoding.
pub(crate) const ARRAY_MAX_SIZE: usize = 4096;

/// The container for the complement of an absent chunk, shared read-only by
/// every index that needs it.
static FULL: LazyLock<Container> = LazyLock::new(|| Container::Bitmap(BitmapStore::full()));

/// The container with no members, shared likewise.
static EMPTY: LazyLock<Container> = LazyLock::new(|| Container::Array(ArrayStore::empty()));

/// One chunk's members, in whichever shape the threshold rule demands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Container {
    Array(ArrayStore),
    Bitmap(BitmapStore),
}

impl Container {
    pub(crate) fn full() -> &'static Container {
        &FULL
    }

    pub(crate) fn empty() -> &'static Container {
        &EMPTY
    }

    /// Builds the right shape for a sorted unique member run.
    pub(crate) fn from_sorted_values(values: Vec<u16>) -> Container {
        if values.len() > ARRAY_MAX_SIZE {
            Container::Bitmap(BitmapStore::from_sorted(&values))
        } else {
            Container::Array(ArrayStore::from_sorted(values))
        }
    }

    /// Applies the demotion half of the threshold rule to a dense result.
    fn seal(store: BitmapStore) -> Container {
        if store.cardinality() as usize <= ARRAY_MAX_SIZE {
            Container::Array(store.to_array())
        } else {
            Container::Bitmap(store)
        }
    }

    pub(crate) fn cardinality(&self) -> usize {
        match self {
            Container::Array(store) => store.cardinality(),
            Container::Bitmap(store) => store.cardinality() as usize,
        }
    }

    pub(crate) fn contains(&self, value: u16) -> bool {
        match self {
            Container::Array(store) => store.contains(value),
            Container::Bitmap(store) => store.contains(value),
        }
    }

    /// Serialized payload size in bytes, used for format selection and for
    /// pre-sizing encode buffers.
    pub(crate) fn byte_size(&self) -> usize {
        match self {
            Container::Array(store) => 2 * store.cardinality(),
            Container::Bitmap(_) => WORDS * 8,
        }
    }

    /// Appends `base | member` for every member, in ascending order.
    pub(crate) fn enumerate_into(&self, out: &mut Vec<u32>, base: u32) {
        match self {
            Container::Array(store) => store.enumerate_into(out, base),
            Container::Bitmap(store) => store.enumerate_into(out, base),
        }
    }

    pub(crate) fn or(&self, other: &Container) -> Container {
        use Container::*;
        match (self, other) {
            (Array(x), Array(y)) => {
                Container::from_sorted_values(array::union_sorted(x.values(), y.values()))
            }
            (Bitmap(x), Array(y)) | (Array(y), Bitmap(x)) => {
                let mut words = x.clone_words();
                let delta = simd::or_into_auto(y, &mut words);
                let cardinality = (x.cardinality() as i32 + delta) as u32;
                // A dense operand keeps an or result above the threshold.
                Bitmap(BitmapStore::from_words_with_cardinality(words, cardinality))
            }
            (Bitmap(x), Bitmap(y)) => Bitmap(x.or(y)),
        }
    }

    pub(crate) fn and(&self, other: &Container) -> Container {
        use Container::*;
        match (self, other) {
            (Array(x), Array(y)) => {
                Array(ArrayStore::from_sorted(array::intersect_sorted(x.values(), y.values())))
            }
            (Array(x), Bitmap(y)) | (Bitmap(y), Array(x)) => {
                Array(filter_members(x, |value| y.contains(value)))
            }
            (Bitmap(x), Bitmap(y)) => Container::seal(x.and(y)),
        }
    }

    pub(crate) fn xor(&self, other: &Container) -> Container {
        use Container::*;
        match (self, other) {
            (Array(x), Array(y)) => Container::from_sorted_values(array::symmetric_difference_sorted(
                x.values(),
                y.values(),
            )),
            (Bitmap(x), Array(y)) | (Array(y), Bitmap(x)) => {
                let mut words = x.clone_words();
                let delta = simd::xor_into_auto(y, &mut words);
                let cardinality = (x.cardinality() as i32 + delta) as u32;
                Container::seal(BitmapStore::from_words_with_cardinality(words, cardinality))
            }
            (Bitmap(x), Bitmap(y)) => Container::seal(x.xor(y)),
        }
    }

    /// Members of `self` that are not members of `other`.
    pub(crate) fn and_not(&self, other: &Container) -> Container {
        use Container::*;
        match (self, other) {
            (Array(x), Array(y)) => {
                Array(ArrayStore::from_sorted(array::difference_sorted(x.values(), y.values())))
            }
            (Array(x), Bitmap(y)) => Array(filter_members(x, |value| !y.contains(value))),
            (Bitmap(x), Array(y)) => {
                let mut words = x.clone_words();
                let delta = simd::and_not_into_auto(y, &mut words);
                let cardinality = (x.cardinality() as i32 + delta) as u32;
                Container::seal(BitmapStore::from_words_with_cardinality(words, cardinality))
            }
            (Bitmap(x), Bitmap(y)) => Container::seal(x.and_not(y)),
        }
    }

    pub(crate) fn not(&self) -> Container {
        match self {
            // The complement of at most 4096 members has at least 61440,
            // so it is always dense.
            Container::Array(store) => {
                Container::Bitmap(BitmapStore::from_sorted_negated(store.values()))
            }
            Container::Bitmap(store) => Container::seal(store.not()),
        }
    }

    /// Re-derives the minimal-size shape.
    pub(crate) fn optimized(&self) -> Container {
        match self {
            Container::Bitmap(store) if store.cardinality() as usize <= ARRAY_MAX_SIZE => {
                Container::Array(store.to_array())
            }
            other => other.clone(),
        }
    }
}

/// Linear scan over the sparse operand, keeping members that pass `keep`.
/// Cost is proportional to the array cardinality, never to the universe.
fn filter_members(store: &ArrayStore, keep: impl Fn(u16) -> bool) -> ArrayStore {
    ArrayStore::from_sorted(store.values().iter().copied().filter(|&value| keep(value)).collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::CAPACITY;

    fn array(values: &[u16]) -> Container {
        Container::Array(ArrayStore::from_sorted(values.to_vec()))
    }

    fn dense(values: impl Iterator<Item = u16>) -> Container {
        let collected: Vec<u16> = values.collect();
        Container::Bitmap(BitmapStore::from_sorted(&collected))
    }

    fn assert_canonical(container: &Container) {
        match container {
            Container::Array(store) => assert!(store.cardinality() <= ARRAY_MAX_SIZE),
            Container::Bitmap(store) => assert!(store.cardinality() as usize > ARRAY_MAX_SIZE),
        }
    }

    #[test]
    fn construction_respects_threshold() {
        let at_boundary = Container::from_sorted_values((0..4096).collect());
        assert!(matches!(at_boundary, Container::Array(_)));
        let past_boundary = Container::from_sorted_values((0..4097).collect());
        assert!(matches!(past_boundary, Container::Bitmap(_)));
    }

    #[test]
    fn union_past_threshold_promotes() {
        let x = array(&(0..4096).map(|i| i * 2).collect::<Vec<_>>());
        let y = array(&(0..4096).map(|i| i * 2 + 1).collect::<Vec<_>>());
        let union = x.or(&y);
        assert_eq!(union.cardinality(), 8192);
        assert!(matches!(union, Container::Bitmap(_)));
        assert_canonical(&union);
    }

    #[test]
    fn intersection_of_dense_operands_demotes() {
        let x = dense(0..5000);
        let y = dense(4990..10000);
        let intersection = x.and(&y);
        assert_eq!(intersection.cardinality(), 10);
        assert!(matches!(intersection, Container::Array(_)));
    }

    #[test]
    fn array_and_bitmap_ops_agree_with_membership() {
        let sparse = array(&[1, 5_000, 9_999, 20_000]);
        let heavy = dense(0..10_000);

        let and = sparse.and(&heavy);
        assert_eq!(and, array(&[1, 5_000, 9_999]));

        let and_not = sparse.and_not(&heavy);
        assert_eq!(and_not, array(&[20_000]));

        let or = heavy.or(&sparse);
        assert_eq!(or.cardinality(), 10_001);
        assert!(or.contains(20_000));

        let xor = heavy.xor(&sparse);
        assert_eq!(xor.cardinality(), 10_001 - 3);
        assert!(!xor.contains(1));
        assert!(xor.contains(20_000));
    }

    #[test]
    fn bitmap_minus_bitmap_can_demote() {
        let x = dense(0..6000);
        let y = dense(10..6000);
        let difference = x.and_not(&y);
        assert_eq!(difference, array(&(0..10).collect::<Vec<_>>()));
    }

    #[test]
    fn complement_of_array_is_dense() {
        let sparse = array(&[0, 1, 2]);
        let complement = sparse.not();
        assert!(matches!(complement, Container::Bitmap(_)));
        assert_eq!(complement.cardinality(), CAPACITY as usize - 3);
        assert!(!complement.contains(1));
        assert!(complement.contains(3));
    }

    #[test]
    fn complement_of_near_full_bitmap_demotes() {
        let heavy = dense(0..65_000);
        let complement = heavy.not();
        assert_eq!(complement.cardinality(), 536);
        assert!(matches!(complement, Container::Array(_)));
    }

    #[test]
    fn complement_of_full_is_empty() {
        assert_eq!(Container::full().not().cardinality(), 0);
        assert_eq!(Container::full().cardinality(), CAPACITY as usize);
        assert_eq!(Container::empty().cardinality(), 0);
    }

    #[test]
    fn equality_is_structural() {
        // Same member set, different shapes: not equal by the variant rule.
        let as_array = array(&[1, 2, 3]);
        let as_bitmap = Container::Bitmap(BitmapStore::from_sorted(&[1, 2, 3]));
        assert_ne!(as_array, as_bitmap);
        assert_eq!(as_bitmap.optimized(), as_array);
    }

    #[test]
    fn xor_with_self_is_empty() {
        let x = dense(0..5000);
        assert_eq!(x.xor(&x).cardinality(), 0);
        let y = array(&[4, 8, 15]);
        assert_eq!(y.xor(&y).cardinality(), 0);
    }
}
