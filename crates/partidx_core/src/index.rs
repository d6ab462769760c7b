//! The collection index facade.

use crate::collection::{stored_count, Collection, ElementLayout};
use crate::commons::CommonsDump;
use crate::config::{Config, Residency};
use crate::error::{CoreError, CoreResult};
use crate::heal::{Loaded, ReadMode};
use crate::health::{Fault, HealthState};
use crate::iter::KeyCollections;
use crate::layout::{hex, IndexFiles, IndexLock};
use crate::location::{LocationEntry, LocationTable};
use crate::order::KeyOrder;
use crate::partition::{PartitionStore, PartitionSummary};
use crate::shrink::{self, RetentionHint};
use crate::sizing::SizeClasses;
use crate::stats::{IndexStats, StatsSnapshot};
use crate::types::DayStamp;
use chrono::Utc;
use parking_lot::Mutex;
use partidx_storage::{FileBackend, InMemoryBackend, StorageBackend};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A persistent map from fixed-length keys to sorted element collections.
///
/// Collections live in size-classed partition files; the location table
/// records where each one is. Every operation runs under one index-wide
/// lock, and every read checks the location entry against the partition
/// record, repairing disagreements in place (see [`HealthState`]).
///
/// # Example
///
/// ```rust,no_run
/// use partidx_core::{Collection, CollectionIndex, Config, ElementLayout};
/// use std::path::Path;
///
/// let layout = ElementLayout::new(8, 4).unwrap();
/// let index = CollectionIndex::open(Path::new("data"), "words", Config::new(6, layout)).unwrap();
///
/// let refs = Collection::from_elements(layout, [b"doc1....", b"doc2...."]).unwrap();
/// index.merge(b"apples", &refs).unwrap();
/// assert_eq!(index.get(b"apples").unwrap().unwrap().len(), 2);
///
/// index.close().unwrap();
/// ```
pub struct CollectionIndex {
    config: Config,
    files: Option<IndexFiles>,
    commons: Option<CommonsDump>,
    stats: Arc<IndexStats>,
    state: Mutex<Option<IndexState>>,
}

/// Everything guarded by the index lock.
pub(crate) struct IndexState {
    pub(crate) key_len: usize,
    pub(crate) key_order: KeyOrder,
    pub(crate) layout: ElementLayout,
    pub(crate) classes: SizeClasses,
    pub(crate) table: LocationTable,
    pub(crate) partitions: PartitionStore,
    pub(crate) health: HealthState,
    pub(crate) stats: Arc<IndexStats>,
    commons: Option<CommonsDump>,
    retention: Option<Arc<dyn RetentionHint>>,
    rng: StdRng,
    files: Option<IndexFiles>,
    _lock: Option<IndexLock>,
}

impl CollectionIndex {
    /// Opens the index `prefix` inside `dir`, creating it if needed.
    ///
    /// Takes the index lock, prepares the commons dump area, opens every
    /// partition file of this geometry, and loads the location table. A
    /// missing location file is regenerated from the partition files.
    /// Keys with more than one entry keep the one in the highest size class.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for an unusable configuration,
    /// [`CoreError::IndexLocked`] when another handle has the index open,
    /// and I/O errors.
    pub fn open(dir: &Path, prefix: &str, config: Config) -> CoreResult<Self> {
        config.validate()?;
        let classes = config.size_classes()?;
        let element_size = config.layout.element_size();
        let files = IndexFiles::new(dir, prefix);
        let lock = files.lock()?;

        let dump = CommonsDump::new(files.commons_dir(element_size as u16));
        let commons = if config.use_commons {
            dump.prepare()?;
            Some(dump)
        } else {
            dump.remove_all()?;
            None
        };

        let mut partitions =
            PartitionStore::new(Some(files.clone()), classes, config.key_len, element_size);
        let opened = partitions.open_existing()?;

        let index_exists = files.prepare_index_path()?;
        let table = LocationTable::open(
            Box::new(FileBackend::open(&files.index_path())?),
            config.key_len,
            config.key_order,
            config.residency,
            config.available_memory,
        )?;

        let index = Self::assemble(config, Some(files), commons, table, partitions, Some(lock));
        index.with_state(|state| {
            if !index_exists {
                state.rebuild()?;
            }
            state.resolve_duplicates()?;
            info!(
                keys = state.table.len(),
                partitions = opened,
                residency = ?state.table.residency(),
                "opened collection index"
            );
            Ok(())
        })?;
        Ok(index)
    }

    /// Opens an empty index that lives only in memory.
    ///
    /// The commons dump is always disabled.
    pub fn open_in_memory(config: Config) -> CoreResult<Self> {
        config.validate()?;
        let classes = config.size_classes()?;
        let backend: Box<dyn StorageBackend> = Box::new(InMemoryBackend::new());
        let table = LocationTable::open(
            backend,
            config.key_len,
            config.key_order,
            config.residency,
            config.available_memory,
        )?;
        let partitions =
            PartitionStore::new(None, classes, config.key_len, config.layout.element_size());
        Ok(Self::assemble(config, None, None, table, partitions, None))
    }

    fn assemble(
        config: Config,
        files: Option<IndexFiles>,
        commons: Option<CommonsDump>,
        table: LocationTable,
        partitions: PartitionStore,
        lock: Option<IndexLock>,
    ) -> Self {
        let stats = Arc::new(IndexStats::new());
        let rng = match config.shrink_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = IndexState {
            key_len: config.key_len,
            key_order: config.key_order,
            layout: config.layout,
            classes: *partitions.classes(),
            table,
            partitions,
            health: HealthState::new(config.error_limit),
            stats: Arc::clone(&stats),
            commons: commons.clone(),
            retention: config.retention.clone(),
            rng,
            files: files.clone(),
            _lock: lock,
        };
        Self {
            config,
            files,
            commons,
            stats,
            state: Mutex::new(Some(state)),
        }
    }

    /// Runs `f` under the index lock.
    pub(crate) fn with_state<T>(
        &self,
        f: impl FnOnce(&mut IndexState) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(CoreError::IndexClosed)?;
        f(state)
    }

    /// Stores `collection` under `key`, replacing any existing collection.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidOperation`] for an empty collection,
    /// [`CoreError::CapacityExceeded`] when it is larger than the top size
    /// class, and on I/O errors.
    pub fn put(&self, key: &[u8], collection: &Collection) -> CoreResult<()> {
        self.with_state(|state| {
            state.check_key(key)?;
            state.check_collection(collection)?;
            if collection.is_empty() {
                return Err(CoreError::invalid_operation(
                    "cannot put an empty collection",
                ));
            }
            state.stats.record_write();
            let existing = state.table.get(key)?;
            state.store(key, collection, existing)
        })
    }

    /// Adds the elements of `delta` to the collection of `key`.
    ///
    /// Elements of `delta` replace stored elements with the same element key.
    /// A result larger than the top size class is shrunk first; the evicted
    /// elements go to the commons dump when it is enabled.
    pub fn merge(&self, key: &[u8], delta: &Collection) -> CoreResult<()> {
        self.with_state(|state| {
            state.check_key(key)?;
            state.check_collection(delta)?;
            if delta.is_empty() {
                return Ok(());
            }
            state.stats.record_merge();

            let (mut merged, existing) = match state.table.get(key)? {
                None => (delta.clone(), None),
                Some(entry) => match state.read_healing(entry, ReadMode::Keep)? {
                    Loaded::Intact { entry, collection } => (collection.merge(delta), Some(entry)),
                    Loaded::Missing { entry } => {
                        state.table.remove(&entry.key)?;
                        (delta.clone(), None)
                    }
                    Loaded::Lost => (delta.clone(), state.table.get(key)?),
                },
            };
            merged.trim();

            if merged.len() > state.classes.top_capacity() {
                state.shrink(key, &mut merged);
                if merged.is_empty() {
                    return state.drop_key(key, existing);
                }
            }
            state.store(key, &merged, existing)
        })
    }

    /// Removes the elements with the given element keys from the collection
    /// of `key` and returns how many were present.
    ///
    /// A collection that becomes empty, or cannot be read, is deleted.
    pub fn remove<I, K>(&self, key: &[u8], element_keys: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let element_keys: Vec<K> = element_keys.into_iter().collect();
        self.with_state(|state| {
            state.check_key(key)?;
            if element_keys.is_empty() {
                return Ok(0);
            }
            state.stats.record_remove();
            let Some(entry) = state.table.get(key)? else {
                return Ok(0);
            };

            match state.read_healing(entry, ReadMode::Keep)? {
                Loaded::Intact {
                    entry,
                    mut collection,
                } => {
                    let removed = element_keys
                        .iter()
                        .filter(|k| collection.remove(k.as_ref()).is_some())
                        .count();
                    if collection.is_empty() {
                        state.drop_key(key, Some(entry))?;
                    } else if removed > 0 {
                        collection.trim();
                        state.store(key, &collection, Some(entry))?;
                    }
                    Ok(removed)
                }
                Loaded::Missing { entry } => {
                    state.table.remove(&entry.key)?;
                    Ok(0)
                }
                Loaded::Lost => Ok(0),
            }
        })
    }

    /// Returns the collection of `key`.
    ///
    /// A key whose record is damaged or missing yields an empty collection.
    pub fn get(&self, key: &[u8]) -> CoreResult<Option<Collection>> {
        self.with_state(|state| {
            state.check_key(key)?;
            state.stats.record_read();
            let Some(entry) = state.table.get(key)? else {
                return Ok(None);
            };
            Ok(Some(match state.read_healing(entry, ReadMode::Keep)? {
                Loaded::Intact { collection, .. } => collection,
                Loaded::Missing { .. } | Loaded::Lost => Collection::new(state.layout),
            }))
        })
    }

    /// Removes `key` and returns its last collection.
    pub fn delete(&self, key: &[u8]) -> CoreResult<Option<Collection>> {
        self.with_state(|state| {
            state.check_key(key)?;
            let Some(entry) = state.table.get(key)? else {
                return Ok(None);
            };
            state.stats.record_delete();
            Ok(Some(match state.read_healing(entry, ReadMode::Delete)? {
                Loaded::Intact { collection, .. } => collection,
                Loaded::Missing { entry } => {
                    state.table.remove(&entry.key)?;
                    Collection::new(state.layout)
                }
                Loaded::Lost => Collection::new(state.layout),
            }))
        })
    }

    /// Returns true if `key` has a collection.
    pub fn has(&self, key: &[u8]) -> CoreResult<bool> {
        self.with_state(|state| {
            state.check_key(key)?;
            Ok(state.table.has(key))
        })
    }

    /// Returns the number of keys.
    pub fn size(&self) -> CoreResult<usize> {
        self.with_state(|state| Ok(state.table.len()))
    }

    /// Returns the location entry of `key`.
    pub fn location(&self, key: &[u8]) -> CoreResult<Option<LocationEntry>> {
        self.with_state(|state| {
            state.check_key(key)?;
            state.table.get(key)
        })
    }

    /// Estimates the memory a caller needs to hold the largest collection
    /// that is currently possible.
    pub fn min_memory_estimate(&self) -> CoreResult<u64> {
        self.with_state(|state| {
            let open = state.partitions.open_classes().len();
            if open == 0 {
                return Ok(0);
            }
            let capacity = state.classes.capacity((open - 1) as u8) as u64;
            Ok(capacity * state.layout.element_size() as u64 * 14 / 10)
        })
    }

    /// Iterates over `(key, collection)` pairs in key order.
    ///
    /// Iteration begins at `start` (or the first key) and ends before
    /// `stop` when `stop` lies after `start`. With `rotate` set, it wraps
    /// around to the first key once the end is reached and stops before
    /// `start` again (or before `stop` if that comes first), so every key
    /// is visited once.
    ///
    /// Each step takes the index lock separately; changes made between
    /// steps may or may not be observed.
    pub fn keycollections(
        &self,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        rotate: bool,
    ) -> CoreResult<KeyCollections<'_>> {
        let size = self.size()?;
        Ok(KeyCollections::new(self, start, stop, rotate, size))
    }

    /// Deletes every key and record.
    pub fn clear(&self) -> CoreResult<()> {
        self.with_state(|state| {
            state.table.clear()?;
            state.partitions.clear()?;
            info!("cleared collection index");
            Ok(())
        })
    }

    /// Schedules deletion of the location file on close.
    ///
    /// The next open regenerates it from the partition files.
    pub fn mark_for_rebuild_on_exit(&self) -> CoreResult<()> {
        self.with_state(|state| {
            state.health.mark_rebuild();
            Ok(())
        })
    }

    /// Flushes and closes the index.
    ///
    /// With a rebuild pending, the location file is deleted. Every later
    /// call fails with [`CoreError::IndexClosed`].
    pub fn close(&self) -> CoreResult<()> {
        let state = self.state.lock().take().ok_or(CoreError::IndexClosed)?;
        state.shut_down()
    }

    /// Returns true until [`CollectionIndex::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Returns the self-heal accounting.
    pub fn health(&self) -> CoreResult<HealthState> {
        self.with_state(|state| Ok(state.health))
    }

    /// Returns a snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Describes every opened partition.
    pub fn partitions(&self) -> CoreResult<Vec<PartitionSummary>> {
        self.with_state(|state| Ok(state.partitions.summaries()))
    }

    /// Returns the residency chosen for the location table.
    pub fn residency(&self) -> CoreResult<Residency> {
        self.with_state(|state| Ok(state.table.residency()))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the file layout; `None` for in-memory indexes.
    #[must_use]
    pub fn files(&self) -> Option<&IndexFiles> {
        self.files.as_ref()
    }

    /// Returns the commons dump, if enabled.
    #[must_use]
    pub fn commons(&self) -> Option<&CommonsDump> {
        self.commons.as_ref()
    }
}

impl Drop for CollectionIndex {
    fn drop(&mut self) {
        if let Some(state) = self.state.get_mut().take() {
            if let Err(err) = state.shut_down() {
                warn!(%err, "failed to close collection index");
            }
        }
    }
}

impl IndexState {
    pub(crate) fn check_key(&self, key: &[u8]) -> CoreResult<()> {
        if key.len() != self.key_len {
            return Err(CoreError::invalid_key(format!(
                "key has {} bytes, expected {}",
                key.len(),
                self.key_len
            )));
        }
        if key.iter().all(|b| *b == 0) {
            return Err(CoreError::invalid_key("key must not be all zero"));
        }
        if !self.key_order.is_well_formed(key) {
            return Err(CoreError::invalid_key(format!(
                "key {} is not well-formed under {:?} order",
                hex(key),
                self.key_order
            )));
        }
        Ok(())
    }

    fn check_collection(&self, collection: &Collection) -> CoreResult<()> {
        let layout = collection.layout();
        if layout.element_size() != self.layout.element_size() {
            return Err(CoreError::InvalidElement {
                expected: self.layout.element_size(),
                actual: layout.element_size(),
            });
        }
        if *layout != self.layout {
            return Err(CoreError::invalid_operation(
                "collection element layout differs from the index layout",
            ));
        }
        Ok(())
    }

    /// Writes `collection` to the partition of its size class and updates
    /// the location entry.
    ///
    /// The record stays in its row when the size class is unchanged and is
    /// moved otherwise.
    pub(crate) fn store(
        &mut self,
        key: &[u8],
        collection: &Collection,
        existing: Option<LocationEntry>,
    ) -> CoreResult<()> {
        let count = collection.len();
        let size_class = self.classes.classify(count)?;
        let today = DayStamp::today();
        let blob = collection.export(self.classes.capacity(size_class), today);

        let (row, last_read) = match existing {
            Some(old) if old.size_class == size_class => {
                self.partitions.overwrite(size_class, old.row, key, &blob)?;
                (old.row, old.last_read)
            }
            Some(old) => {
                self.partitions.remove(old.size_class, old.row)?;
                let row = self.partitions.write_new(size_class, key, &blob)?;
                debug!(
                    key = %hex(key),
                    from = old.size_class,
                    to = size_class,
                    count,
                    "relocated collection"
                );
                self.stats.record_relocation();
                (row, old.last_read)
            }
            None => (self.partitions.write_new(size_class, key, &blob)?, today),
        };

        if stored_count(&blob, self.layout.element_size()) != Some(count) {
            self.repair(Fault::WriteMismatch, key);
        }

        self.table.put(LocationEntry {
            key: key.to_vec(),
            element_size: self.layout.element_size() as u32,
            element_count: count as u32,
            size_class,
            flags: 0,
            row,
            last_read,
            last_written: today,
        })
    }

    /// Deletes the record of `entry` and the entry of `key`.
    pub(crate) fn drop_key(&mut self, key: &[u8], entry: Option<LocationEntry>) -> CoreResult<()> {
        if let Some(entry) = entry {
            self.partitions.remove(entry.size_class, entry.row)?;
        }
        self.table.remove(key)?;
        Ok(())
    }

    /// Counts one self-heal.
    pub(crate) fn repair(&mut self, fault: Fault, key: &[u8]) {
        self.health.record(fault, key);
        self.stats.record_repair();
    }

    fn shrink(&mut self, key: &[u8], merged: &mut Collection) {
        let before = merged.len();
        let target = self.classes.top_capacity();
        let eviction = shrink::shrink(merged, target, self.retention.as_deref(), &mut self.rng);
        let evicted = eviction.evicted.len();
        info!(
            key = %hex(key),
            before,
            after = merged.len(),
            target,
            evicted,
            by_hint = eviction.by_hint,
            "shrank common key"
        );

        let mut dumped = 0;
        if let Some(commons) = &self.commons {
            match commons.write(key, &eviction.evicted, Utc::now()) {
                Ok(path) => {
                    info!(key = %hex(key), path = %path.display(), size = evicted, "dumped evicted elements");
                    dumped = evicted;
                }
                Err(err) => {
                    warn!(key = %hex(key), %err, size = evicted, "failed to dump evicted elements");
                }
            }
        }
        self.stats.record_shrink(evicted as u64, dumped as u64);
    }

    fn shut_down(mut self) -> CoreResult<()> {
        self.partitions.flush()?;
        self.partitions.sync()?;
        self.table.flush()?;
        self.table.sync()?;

        let rebuild = self.health.rebuild_pending();
        let errors = self.health.errors();
        let files = self.files.take();
        drop(self);

        if let Some(files) = files.filter(|_| rebuild) {
            let path = files.index_path();
            if path.exists() {
                fs::remove_file(&path)?;
            }
            info!(errors, path = %path.display(), "deleted location index for rebuild");
        }
        Ok(())
    }
}
