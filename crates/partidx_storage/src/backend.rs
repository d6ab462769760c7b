//! Storage backend trait definition.

use crate::error::StorageResult;

/// A positional byte store.
///
/// Backends hold a single contiguous byte range `0..size`. Callers address
/// it by absolute offset; the fixed-width record layers in `partidx_core`
/// compute offsets as `row * record_size`.
///
/// # Invariants
///
/// - `append` returns the offset where data was written, which is the size
///   before the call
/// - `write_at` never leaves a gap: `offset` must be `<= size`
/// - `read_at` returns exactly the bytes last written at that span
/// - Backends must be `Send + Sync` so an index can be shared across threads
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the span is not fully inside the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the store and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Overwrites `data.len()` bytes at `offset`.
    ///
    /// The span may run past the current end (the store grows), but `offset`
    /// itself must not lie beyond it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WritePastEnd`](crate::StorageError::WritePastEnd)
    /// when `offset > size`, or an I/O error.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Shrinks the store to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or
    /// the truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
