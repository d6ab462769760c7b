//! Regenerating the location table from partition files.

use crate::collection::stored_count;
use crate::error::CoreResult;
use crate::index::IndexState;
use crate::layout::hex;
use crate::location::LocationEntry;
use crate::types::DayStamp;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Minimum time between two progress reports.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

impl IndexState {
    /// Adds one entry per live partition record and returns how many were
    /// added.
    ///
    /// Keys found in several records are left as duplicates for
    /// [`IndexState::resolve_duplicates`].
    pub(crate) fn rebuild(&mut self) -> CoreResult<usize> {
        let started = Instant::now();
        let mut last_report = started;
        let today = DayStamp::today();
        let element_size = self.layout.element_size();
        let classes = self.partitions.open_classes();
        info!(partitions = classes.len(), "rebuilding location index");

        let mut added = 0usize;
        for size_class in classes {
            let total = self.partitions.record_count(size_class)?;
            let mut seen = 0usize;
            for record in self.partitions.records(size_class)? {
                let (row, key, blob) = record?;
                let element_count = stored_count(&blob, element_size).unwrap_or(0);
                self.table.insert_unique(LocationEntry {
                    key,
                    element_size: element_size as u32,
                    element_count: element_count as u32,
                    size_class,
                    flags: 0,
                    row,
                    last_read: today,
                    last_written: today,
                })?;
                added += 1;
                seen += 1;

                if last_report.elapsed() >= PROGRESS_INTERVAL {
                    info!(
                        size_class,
                        percent = seen * 100 / total.max(1),
                        added,
                        "rebuild in progress"
                    );
                    last_report = Instant::now();
                }
            }
        }

        info!(
            entries = added,
            duplicated = self.table.duplicate_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt location index"
        );
        Ok(added)
    }

    /// Keeps, for every key with several entries, the one in the highest
    /// size class. Records of the other entries stay behind unreferenced.
    ///
    /// Returns the number of keys resolved.
    pub(crate) fn resolve_duplicates(&mut self) -> CoreResult<usize> {
        let groups = self.table.resolve_duplicates()?;
        let resolved = groups.len();
        for group in groups {
            let Some(survivor) = group.iter().max_by_key(|entry| entry.size_class).cloned() else {
                continue;
            };
            warn!(
                key = %hex(&survivor.key),
                entries = group.len(),
                size_class = survivor.size_class,
                "resolved duplicate location entries"
            );
            self.table.put(survivor)?;
        }
        Ok(resolved)
    }
}
