//! Location entries stored in a record array with an ordered in-memory map.

use crate::config::Residency;
use crate::error::CoreResult;
use crate::location::LocationEntry;
use crate::order::KeyOrder;
use crate::partition::RecordArray;
use partidx_storage::StorageBackend;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::debug;

/// Fixed memory reserve assumed by the full-cache estimate.
const CACHE_RESERVE: u64 = 20 * 1024 * 1024;

/// Memory needed to keep `records` entries of `width` bytes fully cached.
#[must_use]
pub(crate) fn full_cache_estimate(width: usize, records: usize) -> u64 {
    CACHE_RESERVE + (width as u64 + 4) * records as u64 * 3 / 2
}

/// Key wrapper ordering map entries by the configured [`KeyOrder`].
#[derive(Debug, Clone)]
struct OrderedKey {
    order: KeyOrder,
    key: Box<[u8]>,
}

impl OrderedKey {
    fn new(order: KeyOrder, key: &[u8]) -> Self {
        Self {
            order,
            key: key.into(),
        }
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(&self.key, &other.key)
    }
}

#[derive(Debug)]
struct Slot {
    row: u32,
    /// Present under [`Residency::FullCache`].
    entry: Option<LocationEntry>,
}

/// The key-sorted table of location entries.
///
/// Entries are persisted one per row; the ordered map always stays in
/// memory. Under [`Residency::FullCache`] the map also holds the decoded
/// entries, under [`Residency::Lean`] they are read back on demand.
#[derive(Debug)]
pub struct LocationTable {
    array: RecordArray,
    key_len: usize,
    order: KeyOrder,
    residency: Residency,
    slots: BTreeMap<OrderedKey, Slot>,
    /// Rows beyond the first that carry an already mapped key.
    doubles: BTreeMap<OrderedKey, Vec<u32>>,
}

impl LocationTable {
    /// Opens the table stored in `backend` and loads its key map.
    ///
    /// [`Residency::Auto`] resolves to `FullCache` unless `available_memory`
    /// is below [`full_cache_estimate`]. Rows repeating a key are kept aside
    /// for [`LocationTable::resolve_duplicates`].
    pub fn open(
        backend: Box<dyn StorageBackend>,
        key_len: usize,
        order: KeyOrder,
        residency: Residency,
        available_memory: Option<u64>,
    ) -> CoreResult<Self> {
        let width = LocationEntry::width(key_len);
        let array = RecordArray::open(backend, width, key_len)?;

        let residency = match residency {
            Residency::Auto => {
                let needed = full_cache_estimate(width, array.live_count());
                if available_memory.map_or(true, |available| available >= needed) {
                    Residency::FullCache
                } else {
                    Residency::Lean
                }
            }
            chosen => chosen,
        };

        let mut slots = BTreeMap::new();
        let mut doubles: BTreeMap<OrderedKey, Vec<u32>> = BTreeMap::new();
        for item in array.rows() {
            let (row, bytes) = item?;
            let entry = LocationEntry::decode(&bytes, key_len)?;
            let key = OrderedKey::new(order, &entry.key);
            if slots.contains_key(&key) {
                doubles.entry(key).or_default().push(row);
                continue;
            }
            let entry = (residency == Residency::FullCache).then_some(entry);
            slots.insert(key, Slot { row, entry });
        }
        debug!(
            entries = slots.len(),
            duplicated = doubles.len(),
            ?residency,
            "location table loaded"
        );

        Ok(Self {
            array,
            key_len,
            order,
            residency,
            slots,
            doubles,
        })
    }

    /// Returns the residency in effect.
    #[must_use]
    pub const fn residency(&self) -> Residency {
        self.residency
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the table holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns true if `key` has an entry.
    #[must_use]
    pub fn has(&self, key: &[u8]) -> bool {
        self.slots.contains_key(&OrderedKey::new(self.order, key))
    }

    /// Returns the entry of `key`.
    pub fn get(&self, key: &[u8]) -> CoreResult<Option<LocationEntry>> {
        match self.slots.get(&OrderedKey::new(self.order, key)) {
            Some(slot) => self.load(slot),
            None => Ok(None),
        }
    }

    /// Inserts or replaces the entry of `entry.key`.
    pub fn put(&mut self, entry: LocationEntry) -> CoreResult<()> {
        let encoded = entry.encode();
        let cached = self.residency == Residency::FullCache;
        let key = OrderedKey::new(self.order, &entry.key);
        if let Some(slot) = self.slots.get_mut(&key) {
            self.array.set(slot.row, &encoded)?;
            if cached {
                slot.entry = Some(entry);
            }
            return Ok(());
        }

        let row = self.array.add(&encoded)?;
        let entry = cached.then_some(entry);
        self.slots.insert(key, Slot { row, entry });
        Ok(())
    }

    /// Adds an entry without looking for an existing one.
    ///
    /// Used by bulk rebuild. If the key is already mapped, the new row is
    /// recorded as a duplicate instead of replacing the entry.
    pub fn insert_unique(&mut self, entry: LocationEntry) -> CoreResult<()> {
        let row = self.array.add(&entry.encode())?;
        let key = OrderedKey::new(self.order, &entry.key);
        if self.slots.contains_key(&key) {
            self.doubles.entry(key).or_default().push(row);
            return Ok(());
        }
        let entry = (self.residency == Residency::FullCache).then_some(entry);
        self.slots.insert(key, Slot { row, entry });
        Ok(())
    }

    /// Removes and returns the entry of `key`.
    pub fn remove(&mut self, key: &[u8]) -> CoreResult<Option<LocationEntry>> {
        let Some(slot) = self.slots.remove(&OrderedKey::new(self.order, key)) else {
            return Ok(None);
        };
        let entry = self.load(&slot)?;
        self.array.remove(slot.row)?;
        Ok(entry)
    }

    /// Returns the first entry in key order within `(lower, upper)`.
    pub fn first_in_range(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
    ) -> CoreResult<Option<LocationEntry>> {
        let lower = lower.map(|key| OrderedKey::new(self.order, key));
        let Some((key, slot)) = self.slots.range((lower, Bound::Unbounded)).next() else {
            return Ok(None);
        };
        let below_upper = match upper {
            Bound::Included(end) => self.order.compare(&key.key, end) != Ordering::Greater,
            Bound::Excluded(end) => self.order.compare(&key.key, end) == Ordering::Less,
            Bound::Unbounded => true,
        };
        if !below_upper {
            return Ok(None);
        }
        self.load(slot)
    }

    /// Returns the number of keys that currently have more than one entry.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.doubles.len()
    }

    /// Removes every entry of each key that has more than one and returns
    /// them grouped by key.
    ///
    /// The caller decides which entry of a group to put back.
    pub fn resolve_duplicates(&mut self) -> CoreResult<Vec<Vec<LocationEntry>>> {
        let doubles = std::mem::take(&mut self.doubles);
        let mut groups = Vec::with_capacity(doubles.len());
        for (key, extra) in doubles {
            let mut rows = extra;
            if let Some(slot) = self.slots.remove(&key) {
                rows.insert(0, slot.row);
            }
            let mut group = Vec::with_capacity(rows.len());
            for row in rows {
                if let Some(bytes) = self.array.get(row)? {
                    group.push(LocationEntry::decode(&bytes, self.key_len)?);
                }
                self.array.remove(row)?;
            }
            groups.push(group);
        }
        Ok(groups)
    }

    /// Drops every entry.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.array.clear()?;
        self.slots.clear();
        self.doubles.clear();
        Ok(())
    }

    /// Pushes buffered writes to the operating system.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.array.flush()
    }

    /// Makes all writes durable.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.array.sync()
    }

    fn load(&self, slot: &Slot) -> CoreResult<Option<LocationEntry>> {
        if let Some(entry) = &slot.entry {
            return Ok(Some(entry.clone()));
        }
        match self.array.get(slot.row)? {
            Some(bytes) => Ok(Some(LocationEntry::decode(&bytes, self.key_len)?)),
            None => Ok(None),
        }
    }
}
