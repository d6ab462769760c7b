//! Size-classed partition files.

use crate::collection::blob_size;
use crate::error::{CoreError, CoreResult};
use crate::layout::IndexFiles;
use crate::partition::array::{RecordArray, Rows};
use crate::sizing::SizeClasses;
use crate::types::PartitionId;
use partidx_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Record counts of one opened partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    /// Size class.
    pub size_class: u8,
    /// Elements a record can hold.
    pub capacity: usize,
    /// Width of one record in bytes.
    pub record_size: usize,
    /// Live records.
    pub live: usize,
    /// Free rows awaiting reuse.
    pub free: usize,
    /// Backing file, `None` for in-memory indexes.
    pub path: Option<PathBuf>,
}

/// The partition files of one index, opened lazily and cached.
///
/// A record is `key | blob`, where the blob is padded to the capacity of
/// the partition's size class.
#[derive(Debug)]
pub struct PartitionStore {
    files: Option<IndexFiles>,
    classes: SizeClasses,
    key_len: usize,
    element_size: usize,
    partitions: HashMap<PartitionId, RecordArray>,
}

impl PartitionStore {
    /// Creates a store; `files` of `None` keeps every partition in memory.
    #[must_use]
    pub fn new(
        files: Option<IndexFiles>,
        classes: SizeClasses,
        key_len: usize,
        element_size: usize,
    ) -> Self {
        Self {
            files,
            classes,
            key_len,
            element_size,
            partitions: HashMap::new(),
        }
    }

    /// Opens every partition file of this geometry found on disk.
    ///
    /// Files written with another load factor or element size, with a
    /// non-zero generation, or for a size class beyond the top class are
    /// left alone. Returns the number of partitions opened.
    pub fn open_existing(&mut self) -> CoreResult<usize> {
        let Some(files) = &self.files else {
            return Ok(0);
        };
        let mut opened = 0;
        for (name, path) in files.list_partitions()? {
            let foreign = u32::from(name.load_factor) != self.classes.load_factor()
                || usize::from(name.element_size) != self.element_size
                || name.generation != 0
                || name.size_class >= self.classes.max_partitions();
            if foreign {
                warn!(path = %path.display(), "skipping partition file of another geometry");
                continue;
            }
            self.partition_mut(name.size_class)?;
            opened += 1;
        }
        Ok(opened)
    }

    /// Returns the size-class geometry.
    #[must_use]
    pub const fn classes(&self) -> &SizeClasses {
        &self.classes
    }

    /// Returns the record width of `size_class`.
    #[must_use]
    pub fn record_size(&self, size_class: u8) -> usize {
        self.key_len + blob_size(self.classes.capacity(size_class), self.element_size)
    }

    /// Returns the opened size classes in ascending order.
    #[must_use]
    pub fn open_classes(&self) -> Vec<u8> {
        let mut classes: Vec<u8> = self.partitions.keys().map(|id| id.size_class).collect();
        classes.sort_unstable();
        classes
    }

    /// Reads the `(key, blob)` record at `row`.
    ///
    /// Rows that are free, beyond the end, or in a size class outside the
    /// geometry read as `None`.
    pub fn read(&mut self, size_class: u8, row: u32) -> CoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        if size_class >= self.classes.max_partitions() {
            return Ok(None);
        }
        let key_len = self.key_len;
        let Some(mut record) = self.partition_mut(size_class)?.get(row)? else {
            return Ok(None);
        };
        let blob = record.split_off(key_len);
        Ok(Some((record, blob)))
    }

    /// Appends a record and returns its row.
    pub fn write_new(&mut self, size_class: u8, key: &[u8], blob: &[u8]) -> CoreResult<u32> {
        let record = self.build_record(size_class, key, blob)?;
        self.partition_mut(size_class)?.add(&record)
    }

    /// Replaces the record at `row`.
    pub fn overwrite(&mut self, size_class: u8, row: u32, key: &[u8], blob: &[u8]) -> CoreResult<()> {
        let record = self.build_record(size_class, key, blob)?;
        self.partition_mut(size_class)?.set(row, &record)
    }

    /// Frees the record at `row`; returns false if it was not live.
    pub fn remove(&mut self, size_class: u8, row: u32) -> CoreResult<bool> {
        if size_class >= self.classes.max_partitions() {
            return Ok(false);
        }
        self.partition_mut(size_class)?.remove(row)
    }

    /// Returns the number of live records in `size_class`.
    pub fn record_count(&mut self, size_class: u8) -> CoreResult<usize> {
        Ok(self.partition_mut(size_class)?.live_count())
    }

    /// Iterates over the live `(row, key, blob)` records of `size_class`.
    pub fn records(&mut self, size_class: u8) -> CoreResult<PartitionRecords<'_>> {
        let key_len = self.key_len;
        let rows = self.partition_mut(size_class)?.rows();
        Ok(PartitionRecords { rows, key_len })
    }

    /// Describes every opened partition, smallest class first.
    #[must_use]
    pub fn summaries(&self) -> Vec<PartitionSummary> {
        let mut summaries: Vec<PartitionSummary> = self
            .partitions
            .iter()
            .map(|(id, array)| PartitionSummary {
                size_class: id.size_class,
                capacity: self.classes.capacity(id.size_class),
                record_size: array.record_size(),
                live: array.live_count(),
                free: array.free_count(),
                path: self.partition_path(id.size_class),
            })
            .collect();
        summaries.sort_by_key(|s| s.size_class);
        summaries
    }

    /// Drops every record of every opened partition.
    pub fn clear(&mut self) -> CoreResult<()> {
        for array in self.partitions.values_mut() {
            array.clear()?;
        }
        Ok(())
    }

    /// Pushes buffered writes of every partition to the operating system.
    pub fn flush(&mut self) -> CoreResult<()> {
        for array in self.partitions.values_mut() {
            array.flush()?;
        }
        Ok(())
    }

    /// Makes every partition durable.
    pub fn sync(&mut self) -> CoreResult<()> {
        for array in self.partitions.values_mut() {
            array.sync()?;
        }
        Ok(())
    }

    fn partition_path(&self, size_class: u8) -> Option<PathBuf> {
        self.files.as_ref().map(|files| {
            files.partition_path(
                self.classes.load_factor() as u8,
                self.element_size as u16,
                size_class,
                0,
            )
        })
    }

    fn partition_mut(&mut self, size_class: u8) -> CoreResult<&mut RecordArray> {
        let id = PartitionId::new(size_class, self.element_size as u32);
        if !self.partitions.contains_key(&id) {
            let record_size = self.record_size(size_class);
            let backend: Box<dyn StorageBackend> = match self.partition_path(size_class) {
                Some(path) => Box::new(FileBackend::open_with_create_dirs(&path)?),
                None => Box::new(InMemoryBackend::new()),
            };
            let array = RecordArray::open(backend, record_size, self.key_len)?;
            debug!(
                partition = %id,
                records = array.live_count(),
                record_size,
                "opened partition"
            );
            self.partitions.insert(id, array);
        }
        self.partitions
            .get_mut(&id)
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not open")))
    }

    fn build_record(&self, size_class: u8, key: &[u8], blob: &[u8]) -> CoreResult<Vec<u8>> {
        if size_class >= self.classes.max_partitions() {
            return Err(CoreError::CapacityExceeded {
                requested: self.classes.capacity(size_class),
                max: self.classes.top_capacity(),
            });
        }
        let record_size = self.record_size(size_class);
        if key.len() != self.key_len || key.len() + blob.len() > record_size {
            return Err(CoreError::invalid_operation(format!(
                "record of {} + {} bytes does not fit {record_size}-byte rows of size class {size_class}",
                key.len(),
                blob.len()
            )));
        }
        let mut record = Vec::with_capacity(record_size);
        record.extend_from_slice(key);
        record.extend_from_slice(blob);
        record.resize(record_size, 0);
        Ok(record)
    }
}

/// Lazy iterator over the records of one partition.
pub struct PartitionRecords<'a> {
    rows: Rows<'a>,
    key_len: usize,
}

impl Iterator for PartitionRecords<'_> {
    type Item = CoreResult<(u32, Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let key_len = self.key_len;
        self.rows.next().map(|item| {
            item.map(|(row, mut key)| {
                let blob = key.split_off(key_len);
                (row, key, blob)
            })
        })
    }
}
