//! The location index: one entry per key, naming where its collection lives.
//!
//! ## Entry Format
//!
//! ```text
//! | key (key_len) | element_size (4) | element_count (4) | size_class (1) | flags (1) |
//! | row (4) | last_read (2) | last_written (2) |
//! ```
//!
//! All integers are big-endian.

mod table;

pub use table::LocationTable;

use crate::error::{CoreError, CoreResult};
use crate::types::DayStamp;

/// Bytes of an encoded entry after the key.
pub const ENTRY_OVERHEAD: usize = 18;

/// Location of one key's collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEntry {
    /// Index key.
    pub key: Vec<u8>,
    /// Width of the collection's elements.
    pub element_size: u32,
    /// Number of elements in the stored collection.
    pub element_count: u32,
    /// Partition holding the record.
    pub size_class: u8,
    /// Reserved.
    pub flags: u8,
    /// Row of the record inside its partition.
    pub row: u32,
    /// Last day the collection was read.
    pub last_read: DayStamp,
    /// Last day the collection was written.
    pub last_written: DayStamp,
}

impl LocationEntry {
    /// Returns the encoded width of an entry for keys of `key_len` bytes.
    #[must_use]
    pub const fn width(key_len: usize) -> usize {
        key_len + ENTRY_OVERHEAD
    }

    /// Encodes the entry.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::width(self.key.len()));
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.element_size.to_be_bytes());
        buf.extend_from_slice(&self.element_count.to_be_bytes());
        buf.push(self.size_class);
        buf.push(self.flags);
        buf.extend_from_slice(&self.row.to_be_bytes());
        buf.extend_from_slice(&self.last_read.as_u16().to_be_bytes());
        buf.extend_from_slice(&self.last_written.as_u16().to_be_bytes());
        buf
    }

    /// Decodes an entry whose key is `key_len` bytes.
    pub fn decode(bytes: &[u8], key_len: usize) -> CoreResult<Self> {
        if bytes.len() != Self::width(key_len) {
            return Err(CoreError::invalid_format(format!(
                "location entry of {} bytes, expected {}",
                bytes.len(),
                Self::width(key_len)
            )));
        }
        let (key, rest) = bytes.split_at(key_len);
        let u32_at = |i: usize| u32::from_be_bytes([rest[i], rest[i + 1], rest[i + 2], rest[i + 3]]);
        let u16_at = |i: usize| u16::from_be_bytes([rest[i], rest[i + 1]]);

        Ok(Self {
            key: key.to_vec(),
            element_size: u32_at(0),
            element_count: u32_at(4),
            size_class: rest[8],
            flags: rest[9],
            row: u32_at(10),
            last_read: DayStamp::new(u16_at(14)),
            last_written: DayStamp::new(u16_at(16)),
        })
    }
}
