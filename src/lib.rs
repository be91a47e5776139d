//! Compressed sets of 32-bit integers.
//!
//! A set is partitioned by the high 16 bits of each value into 65536-wide
//! chunks, and each chunk stores its low 16 bits in whichever of two
//! container shapes is smaller: a sorted array for sparse chunks or a fixed
//! 8 KiB bitmap for dense ones. Whole-set algebra runs as a sorted
//! merge-join over the chunk keys, with container-level kernels doing the
//! per-chunk work.
//!
//! Sets are immutable: every operation returns a freshly built value and
//! never touches its operands, so shared references can be read from any
//! number of threads without coordination.
//!
//! ```
//! use roarset::RoaringBitmap;
//!
//! let a = RoaringBitmap::create([1, 2, 3, 1 << 20]);
//! let b = RoaringBitmap::create([3, 4]);
//! assert_eq!((&a | &b).to_vec(), vec![1, 2, 3, 4, 1 << 20]);
//! assert_eq!((&a & &b).to_vec(), vec![3]);
//! assert!((!&a).cardinality() == (1u64 << 32) - 4);
//! ```

mod array;
mod bitmap;
mod container;
mod serialization;
mod simd;

pub use serialization::DeserializeError;

use std::cmp::Ordering;
use std::io;
use std::ops::{BitAnd, BitOr, BitXor, Not, Sub};

use container::Container;

/// An immutable compressed set of `u32` values.
///
/// Internally a pair of parallel sequences: strictly increasing chunk keys
/// and, aligned with them, one non-empty container per key. Both invariants
/// hold by construction for every value this crate hands out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoaringBitmap {
    pub(crate) keys: Vec<u16>,
    pub(crate) containers: Vec<Container>,
}

#[inline]
fn key_of(value: u32) -> u16 {
    (value >> 16) as u16
}

#[inline]
fn low_of(value: u32) -> u16 {
    (value & 0xFFFF) as u16
}

impl RoaringBitmap {
    /// The empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from an arbitrary collection of values, which may be
    /// unsorted and contain duplicates.
    pub fn create(values: impl IntoIterator<Item = u32>) -> Self {
        let mut data: Vec<u32> = values.into_iter().collect();
        data.sort_unstable();
        data.dedup();

        let mut keys = Vec::new();
        let mut containers = Vec::new();
        let mut index = 0;
        while index < data.len() {
            let key = key_of(data[index]);
            let start = index;
            while index < data.len() && key_of(data[index]) == key {
                index += 1;
            }
            let lows: Vec<u16> = data[start..index].iter().map(|&value| low_of(value)).collect();
            keys.push(key);
            containers.push(Container::from_sorted_values(lows));
        }
        RoaringBitmap { keys, containers }
    }

    /// Total number of members.
    pub fn cardinality(&self) -> u64 {
        self.containers.iter().map(|container| container.cardinality() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, value: u32) -> bool {
        match self.keys.binary_search(&key_of(value)) {
            Ok(slot) => self.containers[slot].contains(low_of(value)),
            Err(_) => false,
        }
    }

    /// All members in ascending order.
    ///
    /// Keys ascend across chunks and members ascend within each container,
    /// so the output is strictly increasing.
    pub fn to_vec(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.cardinality() as usize);
        for (key, container) in self.keys.iter().zip(self.containers.iter()) {
            container.enumerate_into(&mut out, u32::from(*key) << 16);
        }
        out
    }

    /// A copy with every container re-derived into its minimal-size shape.
    pub fn optimize(&self) -> Self {
        RoaringBitmap {
            keys: self.keys.clone(),
            containers: self.containers.iter().map(Container::optimized).collect(),
        }
    }

    /// Members of `self` that are not members of `other`. Also available
    /// as `&a - &b`.
    pub fn and_not(&self, other: &Self) -> Self {
        let mut keys = Vec::with_capacity(self.keys.len());
        let mut containers = Vec::with_capacity(self.keys.len());
        let (mut i, mut j) = (0, 0);
        while i < self.keys.len() && j < other.keys.len() {
            match self.keys[i].cmp(&other.keys[j]) {
                Ordering::Less => {
                    keys.push(self.keys[i]);
                    containers.push(self.containers[i].clone());
                    i += 1;
                }
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    let difference = self.containers[i].and_not(&other.containers[j]);
                    if difference.cardinality() > 0 {
                        keys.push(self.keys[i]);
                        containers.push(difference);
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        while i < self.keys.len() {
            keys.push(self.keys[i]);
            containers.push(self.containers[i].clone());
            i += 1;
        }
        RoaringBitmap { keys, containers }
    }

    /// Exact number of bytes [`RoaringBitmap::serialize`] will write.
    pub fn serialized_size_in_bytes(&self) -> usize {
        serialization::serialized_size(self)
    }

    /// Writes the set to `sink` in the codec's little-endian layout. I/O
    /// failures propagate unchanged.
    pub fn serialize(&self, sink: impl io::Write) -> io::Result<()> {
        serialization::serialize(self, sink)
    }

    /// Reads a set previously written by [`RoaringBitmap::serialize`].
    pub fn deserialize(source: impl io::Read) -> Result<Self, DeserializeError> {
        serialization::deserialize(source)
    }

    pub fn serialize_to_vec(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.serialized_size_in_bytes());
        self.serialize(&mut bytes).expect("writing to a Vec cannot fail");
        bytes
    }

    pub fn deserialize_from_slice(bytes: &[u8]) -> Result<Self, DeserializeError> {
        Self::deserialize(bytes)
    }
}

impl FromIterator<u32> for RoaringBitmap {
    fn from_iter<I: IntoIterator<Item = u32>>(values: I) -> Self {
        RoaringBitmap::create(values)
    }
}

impl BitOr for &RoaringBitmap {
    type Output = RoaringBitmap;

    fn bitor(self, other: Self) -> RoaringBitmap {
        let mut keys = Vec::with_capacity(self.keys.len() + other.keys.len());
        let mut containers = Vec::with_capacity(self.keys.len() + other.keys.len());
        let (mut i, mut j) = (0, 0);
        while i < self.keys.len() && j < other.keys.len() {
            match self.keys[i].cmp(&other.keys[j]) {
                Ordering::Less => {
                    keys.push(self.keys[i]);
                    containers.push(self.containers[i].clone());
                    i += 1;
                }
                Ordering::Greater => {
                    keys.push(other.keys[j]);
                    containers.push(other.containers[j].clone());
                    j += 1;
                }
                Ordering::Equal => {
                    keys.push(self.keys[i]);
                    containers.push(self.containers[i].or(&other.containers[j]));
                    i += 1;
                    j += 1;
                }
            }
        }
        while i < self.keys.len() {
            keys.push(self.keys[i]);
            containers.push(self.containers[i].clone());
            i += 1;
        }
        while j < other.keys.len() {
            keys.push(other.keys[j]);
            containers.push(other.containers[j].clone());
            j += 1;
        }
        RoaringBitmap { keys, containers }
    }
}

impl BitAnd for &RoaringBitmap {
    type Output = RoaringBitmap;

    fn bitand(self, other: Self) -> RoaringBitmap {
        let mut keys = Vec::new();
        let mut containers = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.keys.len() && j < other.keys.len() {
            match self.keys[i].cmp(&other.keys[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    let intersection = self.containers[i].and(&other.containers[j]);
                    if intersection.cardinality() > 0 {
                        keys.push(self.keys[i]);
                        containers.push(intersection);
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        RoaringBitmap { keys, containers }
    }
}

impl BitXor for &RoaringBitmap {
    type Output = RoaringBitmap;

    fn bitxor(self, other: Self) -> RoaringBitmap {
        let mut keys = Vec::with_capacity(self.keys.len() + other.keys.len());
        let mut containers = Vec::with_capacity(self.keys.len() + other.keys.len());
        let (mut i, mut j) = (0, 0);
        while i < self.keys.len() && j < other.keys.len() {
            match self.keys[i].cmp(&other.keys[j]) {
                Ordering::Less => {
                    keys.push(self.keys[i]);
                    containers.push(self.containers[i].clone());
                    i += 1;
                }
                Ordering::Greater => {
                    keys.push(other.keys[j]);
                    containers.push(other.containers[j].clone());
                    j += 1;
                }
                Ordering::Equal => {
                    let toggled = self.containers[i].xor(&other.containers[j]);
                    if toggled.cardinality() > 0 {
                        keys.push(self.keys[i]);
                        containers.push(toggled);
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        while i < self.keys.len() {
            keys.push(self.keys[i]);
            containers.push(self.containers[i].clone());
            i += 1;
        }
        while j < other.keys.len() {
            keys.push(other.keys[j]);
            containers.push(other.containers[j].clone());
            j += 1;
        }
        RoaringBitmap { keys, containers }
    }
}

impl Sub for &RoaringBitmap {
    type Output = RoaringBitmap;

    fn sub(self, other: Self) -> RoaringBitmap {
        self.and_not(other)
    }
}

impl Not for &RoaringBitmap {
    type Output = RoaringBitmap;

    /// Complement over the full 32-bit universe. Every possible chunk key
    /// participates: keys absent from the input complement to the shared
    /// full container, present keys complement their container, and a
    /// container that complements to empty (it was full) is dropped.
    fn not(self) -> RoaringBitmap {
        let mut keys = Vec::with_capacity(1 << 16);
        let mut containers = Vec::with_capacity(1 << 16);
        let mut cursor = 0;
        for key in 0..=u16::MAX {
            if cursor < self.keys.len() && self.keys[cursor] == key {
                let complement = self.containers[cursor].not();
                cursor += 1;
                if complement.cardinality() > 0 {
                    keys.push(key);
                    containers.push(complement);
                }
            } else {
                keys.push(key);
                containers.push(Container::full().clone());
            }
        }
        RoaringBitmap { keys, containers }
    }
}
