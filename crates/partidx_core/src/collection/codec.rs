//! Blob encoding of collections.
//!
//! ```text
//! | element_count (4) | element_size (2) | written_day (2) | reserved (2) | elements (count * size) | zero padding |
//! ```
//!
//! All integers are big-endian. Partition records pad the blob to the
//! capacity of their size class; commons dumps store it unpadded.

use crate::collection::set::{Collection, ElementLayout};
use crate::error::{CoreError, CoreResult};
use crate::types::DayStamp;

/// Bytes in front of the element data.
pub const BLOB_OVERHEAD: usize = 10;

/// Returns the byte length of a blob holding `capacity` elements.
#[must_use]
pub const fn blob_size(capacity: usize, element_size: usize) -> usize {
    BLOB_OVERHEAD + capacity * element_size
}

/// Reads the element count of a blob without decoding the elements.
///
/// The count is clamped to what the blob can physically hold. Returns
/// `None` when the blob is shorter than its header.
#[must_use]
pub fn stored_count(blob: &[u8], element_size: usize) -> Option<usize> {
    let header = blob.get(..BLOB_OVERHEAD)?;
    let count = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let room = (blob.len() - BLOB_OVERHEAD) / element_size.max(1);
    Some(count.min(room))
}

impl Collection {
    /// Encodes the collection, zero-padded to `capacity` elements.
    ///
    /// A `capacity` below the collection length encodes the elements unpadded.
    #[must_use]
    pub fn export(&self, capacity: usize, day: DayStamp) -> Vec<u8> {
        let size = self.layout().element_size();
        let mut blob = Vec::with_capacity(blob_size(capacity.max(self.len()), size));
        blob.extend_from_slice(&(self.len() as u32).to_be_bytes());
        blob.extend_from_slice(&(size as u16).to_be_bytes());
        blob.extend_from_slice(&day.as_u16().to_be_bytes());
        blob.extend_from_slice(&[0, 0]);
        blob.extend_from_slice(self.as_bytes());
        blob.resize(blob_size(capacity.max(self.len()), size), 0);
        blob
    }

    /// Decodes a (possibly padded) blob.
    ///
    /// The element count is clamped to the blob length and only that many
    /// elements are read, so padding past the count is never decoded.
    /// Elements are re-sorted and deduplicated, so the result may hold fewer
    /// elements than the header claims.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidFormat`] when the header is truncated
    /// or names a different element width.
    pub fn import(layout: ElementLayout, blob: &[u8]) -> CoreResult<Self> {
        let (collection, _) = Self::import_prefix(layout, blob, false)?;
        Ok(collection)
    }

    /// Decodes the unpadded blob at the front of `bytes` and returns it with
    /// the number of bytes it occupied.
    ///
    /// With `exact` set, a blob that claims more elements than `bytes` holds
    /// is an error instead of being clamped.
    pub(crate) fn import_prefix(
        layout: ElementLayout,
        bytes: &[u8],
        exact: bool,
    ) -> CoreResult<(Self, usize)> {
        let size = layout.element_size();
        let Some(header) = bytes.get(..BLOB_OVERHEAD) else {
            return Err(CoreError::invalid_format(format!(
                "collection blob of {} bytes is shorter than its header",
                bytes.len()
            )));
        };

        let declared_size = u16::from_be_bytes([header[4], header[5]]) as usize;
        if declared_size != size {
            return Err(CoreError::invalid_format(format!(
                "blob holds {declared_size}-byte elements, expected {size}"
            )));
        }

        let declared = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let room = (bytes.len() - BLOB_OVERHEAD) / size;
        if exact && declared > room {
            return Err(CoreError::invalid_format(format!(
                "blob declares {declared} elements but only {room} follow"
            )));
        }
        let count = declared.min(room);
        let body = &bytes[BLOB_OVERHEAD..BLOB_OVERHEAD + count * size];

        let mut collection = Self::with_capacity(layout, count);
        for element in body.chunks_exact(size) {
            collection.insert(element)?;
        }
        Ok((collection, BLOB_OVERHEAD + count * size))
    }
}
