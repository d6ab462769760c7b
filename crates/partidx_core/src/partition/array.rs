//! Fixed-width record arrays.
//!
//! A record array is a flat sequence of `record_size`-byte records; row `r`
//! lives at byte offset `r * record_size` of its backend. A row is free when
//! its leading `marker_len` bytes are all zero, so removal just zero-fills
//! the record and `open` rediscovers free rows with a single scan.

use crate::error::{CoreError, CoreResult};
use partidx_storage::StorageBackend;
use std::collections::BTreeSet;
use tracing::warn;

/// Number of records read per backend call while scanning.
const SCAN_BATCH: usize = 256;

/// A row-addressed array of fixed-width records with free-slot reuse.
pub struct RecordArray {
    backend: Box<dyn StorageBackend>,
    record_size: usize,
    marker_len: usize,
    slots: u32,
    free: BTreeSet<u32>,
}

impl RecordArray {
    /// Opens an array over `backend`.
    ///
    /// A trailing partial record (left behind by a crash mid-append) is cut
    /// off. Every row whose marker is all zero is registered as free.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, on a zero record size or marker, and when the
    /// backend holds more rows than a `u32` can address.
    pub fn open(
        mut backend: Box<dyn StorageBackend>,
        record_size: usize,
        marker_len: usize,
    ) -> CoreResult<Self> {
        if record_size == 0 || marker_len == 0 || marker_len > record_size {
            return Err(CoreError::invalid_config(format!(
                "record of {record_size} bytes cannot carry a {marker_len}-byte marker"
            )));
        }

        let size = backend.size()?;
        let whole = size / record_size as u64;
        let tail = size % record_size as u64;
        if tail != 0 {
            warn!(
                bytes = tail,
                record_size, "truncating partial record at end of array"
            );
            backend.truncate(whole * record_size as u64)?;
        }
        let slots = u32::try_from(whole).map_err(|_| {
            CoreError::invalid_format(format!("record array holds {whole} rows"))
        })?;

        let mut array = Self {
            backend,
            record_size,
            marker_len,
            slots,
            free: BTreeSet::new(),
        };
        array.scan_free()?;
        Ok(array)
    }

    fn scan_free(&mut self) -> CoreResult<()> {
        let mut row = 0u32;
        while row < self.slots {
            let batch = SCAN_BATCH.min((self.slots - row) as usize);
            let bytes = self
                .backend
                .read_at(self.offset(row), batch * self.record_size)?;
            for record in bytes.chunks_exact(self.record_size) {
                if self.is_free_record(record) {
                    self.free.insert(row);
                }
                row += 1;
            }
        }
        Ok(())
    }

    /// Returns the width of one record.
    #[must_use]
    pub const fn record_size(&self) -> usize {
        self.record_size
    }

    /// Returns the number of rows, live or free.
    #[must_use]
    pub const fn slot_count(&self) -> u32 {
        self.slots
    }

    /// Returns the number of free rows.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Returns the number of live records.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots as usize - self.free.len()
    }

    /// Reads the live record at `row`; free and out-of-range rows are `None`.
    pub fn get(&self, row: u32) -> CoreResult<Option<Vec<u8>>> {
        if row >= self.slots || self.free.contains(&row) {
            return Ok(None);
        }
        let record = self.backend.read_at(self.offset(row), self.record_size)?;
        Ok(Some(record))
    }

    /// Stores a record in the lowest free row, or appends it.
    pub fn add(&mut self, record: &[u8]) -> CoreResult<u32> {
        self.check_record(record)?;
        if let Some(row) = self.free.pop_first() {
            if let Err(err) = self.backend.write_at(self.offset(row), record) {
                self.free.insert(row);
                return Err(err.into());
            }
            return Ok(row);
        }

        let row = self.slots;
        if row == u32::MAX {
            return Err(CoreError::invalid_operation("record array is full"));
        }
        self.backend.append(record)?;
        self.slots += 1;
        Ok(row)
    }

    /// Writes a record at `row`, which may be free. Writing the row just
    /// past the end appends.
    pub fn set(&mut self, row: u32, record: &[u8]) -> CoreResult<()> {
        self.check_record(record)?;
        if row > self.slots {
            return Err(CoreError::invalid_operation(format!(
                "row {row} lies beyond the {} rows of the array",
                self.slots
            )));
        }
        self.backend.write_at(self.offset(row), record)?;
        if row == self.slots {
            self.slots += 1;
        } else {
            self.free.remove(&row);
        }
        Ok(())
    }

    /// Frees `row`. Returns false when the row was already free or absent.
    pub fn remove(&mut self, row: u32) -> CoreResult<bool> {
        if row >= self.slots || self.free.contains(&row) {
            return Ok(false);
        }
        let zeros = vec![0u8; self.record_size];
        self.backend.write_at(self.offset(row), &zeros)?;
        self.free.insert(row);
        Ok(true)
    }

    /// Iterates over live records in row order.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            array: self,
            next: 0,
            batch: Vec::new(),
        }
    }

    /// Drops every record.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.backend.truncate(0)?;
        self.slots = 0;
        self.free.clear();
        Ok(())
    }

    /// Pushes buffered writes to the operating system.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Makes all writes durable.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }

    fn offset(&self, row: u32) -> u64 {
        u64::from(row) * self.record_size as u64
    }

    fn is_free_record(&self, record: &[u8]) -> bool {
        record[..self.marker_len].iter().all(|b| *b == 0)
    }

    fn check_record(&self, record: &[u8]) -> CoreResult<()> {
        if record.len() != self.record_size {
            return Err(CoreError::invalid_operation(format!(
                "record of {} bytes written to an array of {}-byte records",
                record.len(),
                self.record_size
            )));
        }
        if self.is_free_record(record) {
            return Err(CoreError::invalid_operation(
                "record marker must not be all zero",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RecordArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordArray")
            .field("record_size", &self.record_size)
            .field("slots", &self.slots)
            .field("free", &self.free.len())
            .finish()
    }
}

/// Lazy iterator over the live records of a [`RecordArray`].
///
/// Records are read in batches; each item is `(row, record)`.
pub struct Rows<'a> {
    array: &'a RecordArray,
    next: u32,
    batch: Vec<(u32, Vec<u8>)>,
}

impl Iterator for Rows<'_> {
    type Item = CoreResult<(u32, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.batch.pop() {
                return Some(Ok(item));
            }
            if self.next >= self.array.slots {
                return None;
            }

            let start = self.next;
            let count = SCAN_BATCH.min((self.array.slots - start) as usize);
            self.next = start + count as u32;
            let bytes = match self
                .array
                .backend
                .read_at(self.array.offset(start), count * self.array.record_size)
            {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.next = self.array.slots;
                    return Some(Err(err.into()));
                }
            };

            // reversed so pop() yields ascending rows
            self.batch = bytes
                .chunks_exact(self.array.record_size)
                .enumerate()
                .filter(|(_, record)| !self.array.is_free_record(record))
                .map(|(i, record)| (start + i as u32, record.to_vec()))
                .rev()
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partidx_storage::{FileBackend, InMemoryBackend};
    use tempfile::tempdir;

    fn record(tag: u8) -> Vec<u8> {
        vec![tag; 8]
    }

    fn memory_array() -> RecordArray {
        RecordArray::open(Box::new(InMemoryBackend::new()), 8, 3).unwrap()
    }

    #[test]
    fn add_get_remove() {
        let mut array = memory_array();
        let a = array.add(&record(1)).unwrap();
        let b = array.add(&record(2)).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(array.get(b).unwrap(), Some(record(2)));

        assert!(array.remove(a).unwrap());
        assert!(!array.remove(a).unwrap());
        assert_eq!(array.get(a).unwrap(), None);
        assert_eq!(array.live_count(), 1);
        assert_eq!(array.free_count(), 1);
    }

    #[test]
    fn lowest_free_row_is_reused() {
        let mut array = memory_array();
        for tag in 1..=4 {
            array.add(&record(tag)).unwrap();
        }
        array.remove(2).unwrap();
        array.remove(1).unwrap();
        assert_eq!(array.add(&record(9)).unwrap(), 1);
        assert_eq!(array.add(&record(9)).unwrap(), 2);
        assert_eq!(array.add(&record(9)).unwrap(), 4);
    }

    #[test]
    fn set_revives_and_appends() {
        let mut array = memory_array();
        array.add(&record(1)).unwrap();
        array.remove(0).unwrap();
        array.set(0, &record(5)).unwrap();
        assert_eq!(array.free_count(), 0);
        array.set(1, &record(6)).unwrap();
        assert_eq!(array.slot_count(), 2);
        assert!(array.set(5, &record(7)).is_err());
    }

    #[test]
    fn rejects_bad_records() {
        let mut array = memory_array();
        assert!(array.add(&[1u8; 7]).is_err());
        assert!(array.add(&[0, 0, 0, 1, 1, 1, 1, 1]).is_err());
    }

    #[test]
    fn rows_skip_free_slots() {
        let mut array = memory_array();
        for tag in 1..=600u32 {
            array.add(&record((tag % 250 + 1) as u8)).unwrap();
        }
        array.remove(0).unwrap();
        array.remove(300).unwrap();
        let rows: Vec<u32> = array.rows().map(|r| r.unwrap().0).collect();
        assert_eq!(rows.len(), 598);
        assert_eq!(rows[0], 1);
        assert!(!rows.contains(&300));
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn reopen_recovers_free_rows_and_cuts_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("array.kca");
        {
            let mut array =
                RecordArray::open(Box::new(FileBackend::open(&path).unwrap()), 8, 3).unwrap();
            for tag in 1..=3 {
                array.add(&record(tag)).unwrap();
            }
            array.remove(1).unwrap();
            array.flush().unwrap();
        }
        {
            let mut raw = FileBackend::open(&path).unwrap();
            raw.append(&[7u8; 5]).unwrap();
            raw.flush().unwrap();
        }

        let mut array =
            RecordArray::open(Box::new(FileBackend::open(&path).unwrap()), 8, 3).unwrap();
        assert_eq!(array.slot_count(), 3);
        assert_eq!(array.live_count(), 2);
        assert_eq!(array.add(&record(4)).unwrap(), 1);
    }

    #[test]
    fn clear_empties() {
        let mut array = memory_array();
        array.add(&record(1)).unwrap();
        array.clear().unwrap();
        assert_eq!(array.slot_count(), 0);
        assert_eq!(array.rows().count(), 0);
    }
}
