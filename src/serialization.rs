//! Binary encoding of a bitmap, readable without knowing anything beyond
//! this layout. All integers are little-endian:
//!
//! * `u32` — number of containers;
//! * per container, in ascending key order:
//!   * `u16` — the chunk key,
//!   * `u32` — the container cardinality (1 ..= 65536),
//!   * the payload: `cardinality` sorted `u16` members when the cardinality
//!     is at most 4096, otherwise the fixed 1024 `u64` words.
//!
//! The shape of the payload is implied by the cardinality, so the stream
//! carries no explicit type tag. Dense containers always serialize all
//! 1024 words regardless of how many bits are set; the format trades size
//! for constant-cost decode. Malformed or truncated streams surface as
//! [`DeserializeError`] with no recovery attempted.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::array::ArrayStore;
use crate::bitmap::{new_words, popcount, BitmapStore, CAPACITY};
use crate::container::{Container, ARRAY_MAX_SIZE};
use crate::RoaringBitmap;

/// Ways a serialized bitmap can fail to decode.
///
/// Underlying I/O failures pass through unchanged; the remaining variants
/// are structural violations of the layout described in the module docs.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("i/o failure while reading bitmap: {0}")]
    Io(#[from] io::Error),
    #[error("container count {0} exceeds the 65536 possible keys")]
    InvalidCount(u32),
    #[error("container cardinality {0} outside 1..=65536")]
    InvalidCardinality(u32),
    #[error("declared cardinality {declared} does not match {actual} set bits")]
    CardinalityMismatch { declared: u32, actual: u32 },
    #[error("container keys are not strictly increasing")]
    KeyOrder,
    #[error("array members are not strictly increasing")]
    MemberOrder,
}

pub(crate) fn serialize(bitmap: &RoaringBitmap, mut sink: impl Write) -> io::Result<()> {
    sink.write_u32::<LittleEndian>(bitmap.keys.len() as u32)?;
    for (key, container) in bitmap.keys.iter().zip(bitmap.containers.iter()) {
        sink.write_u16::<LittleEndian>(*key)?;
        sink.write_u32::<LittleEndian>(container.cardinality() as u32)?;
        match container {
            Container::Array(store) => {
                for &value in store.values() {
                    sink.write_u16::<LittleEndian>(value)?;
                }
            }
            Container::Bitmap(store) => {
                for &word in store.words().iter() {
                    sink.write_u64::<LittleEndian>(word)?;
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn deserialize(mut source: impl Read) -> Result<RoaringBitmap, DeserializeError> {
    let count = source.read_u32::<LittleEndian>()?;
    if count > CAPACITY {
        return Err(DeserializeError::InvalidCount(count));
    }
    let mut keys = Vec::with_capacity(count as usize);
    let mut containers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = source.read_u16::<LittleEndian>()?;
        if keys.last().is_some_and(|&previous| key <= previous) {
            return Err(DeserializeError::KeyOrder);
        }
        let cardinality = source.read_u32::<LittleEndian>()?;
        if cardinality == 0 || cardinality > CAPACITY {
            return Err(DeserializeError::InvalidCardinality(cardinality));
        }
        let container = if cardinality as usize <= ARRAY_MAX_SIZE {
            let mut values = Vec::with_capacity(cardinality as usize);
            for _ in 0..cardinality {
                let value = source.read_u16::<LittleEndian>()?;
                if values.last().is_some_and(|&previous| value <= previous) {
                    return Err(DeserializeError::MemberOrder);
                }
                values.push(value);
            }
            Container::Array(ArrayStore::from_sorted(values))
        } else {
            let mut words = new_words();
            for word in words.iter_mut() {
                *word = source.read_u64::<LittleEndian>()?;
            }
            let actual = popcount(&words[..]);
            if actual != cardinality {
                return Err(DeserializeError::CardinalityMismatch { declared: cardinality, actual });
            }
            Container::Bitmap(BitmapStore::from_words_with_cardinality(words, cardinality))
        };
        keys.push(key);
        containers.push(container);
    }
    Ok(RoaringBitmap { keys, containers })
}

/// Exact number of bytes [`serialize`] will write.
pub(crate) fn serialized_size(bitmap: &RoaringBitmap) -> usize {
    4 + bitmap.containers.iter().map(|container| 2 + 4 + container.byte_size()).sum::<usize>()
}
