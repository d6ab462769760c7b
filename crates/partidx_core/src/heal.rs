//! The self-healing read path.
//!
//! Partition records are the ground truth. Reading a collection checks the
//! record against its location entry and repairs whatever disagrees:
//!
//! | Finding | Repair | Result |
//! |---------|--------|--------|
//! | row free or missing | none | [`Loaded::Missing`] |
//! | key not well-formed, blob undecodable | drop entry and record | [`Loaded::Lost`] |
//! | record of another key | drop entry, re-index record under its key | [`Loaded::Lost`] |
//! | element count differs | rewrite entry (and record) | [`Loaded::Intact`] |
//!
//! Each repair is counted in [`HealthState`](crate::HealthState).

use crate::collection::Collection;
use crate::error::{CoreError, CoreResult};
use crate::health::Fault;
use crate::index::IndexState;
use crate::location::LocationEntry;
use crate::types::DayStamp;
use tracing::debug;

/// What happens to the record after a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadMode {
    /// Leave it in place.
    Keep,
    /// Delete the record and its entry.
    Delete,
}

/// Outcome of [`IndexState::read_healing`].
#[derive(Debug)]
pub(crate) enum Loaded {
    /// The collection, with the (possibly repaired) entry describing it.
    Intact {
        entry: LocationEntry,
        collection: Collection,
    },
    /// The entry points at a free row. The entry is left for the caller.
    Missing { entry: LocationEntry },
    /// The collection is gone; the entry has been removed.
    Lost,
}

impl IndexState {
    /// Reads the collection of `entry`, repairing the index on the way.
    pub(crate) fn read_healing(
        &mut self,
        mut entry: LocationEntry,
        mode: ReadMode,
    ) -> CoreResult<Loaded> {
        let Some((record_key, blob)) = self.partitions.read(entry.size_class, entry.row)? else {
            self.repair(Fault::MissingRecord, &entry.key);
            return Ok(Loaded::Missing { entry });
        };

        if !self.key_order.is_well_formed(&record_key) {
            self.discard(&entry)?;
            self.repair(Fault::MalformedKey, &entry.key);
            return Ok(Loaded::Lost);
        }

        let collection = match Collection::import(self.layout, &blob) {
            Ok(collection) => collection,
            Err(err) => {
                debug!(%err, "cannot decode partition record");
                self.discard(&entry)?;
                self.repair(Fault::UndecodableBlob, &entry.key);
                return Ok(Loaded::Lost);
            }
        };

        if record_key != entry.key {
            self.table.remove(&entry.key)?;
            if !self.table.has(&record_key) {
                let today = DayStamp::today();
                self.table.put(LocationEntry {
                    key: record_key.clone(),
                    element_size: self.layout.element_size() as u32,
                    element_count: collection.len() as u32,
                    size_class: entry.size_class,
                    flags: 0,
                    row: entry.row,
                    last_read: today,
                    last_written: today,
                })?;
            }
            self.repair(Fault::Misrouted, &entry.key);
            return Ok(Loaded::Lost);
        }

        if collection.len() != entry.element_count as usize {
            self.repair(Fault::CountMismatch, &entry.key);
            if collection.is_empty() {
                self.discard(&entry)?;
                return Ok(Loaded::Lost);
            }
            if mode == ReadMode::Keep {
                let key = entry.key.clone();
                self.store(&key, &collection, Some(entry))?;
                entry = self
                    .table
                    .get(&key)?
                    .ok_or_else(|| CoreError::invalid_operation("repaired entry vanished"))?;
            }
        }

        if mode == ReadMode::Delete {
            self.discard(&entry)?;
        }
        Ok(Loaded::Intact { entry, collection })
    }

    /// Removes the record of `entry` and the entry itself.
    fn discard(&mut self, entry: &LocationEntry) -> CoreResult<()> {
        self.partitions.remove(entry.size_class, entry.row)?;
        self.table.remove(&entry.key)?;
        Ok(())
    }
}
