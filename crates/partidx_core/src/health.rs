//! Self-heal accounting.
//!
//! Every repair of a disagreement between the location table and the
//! partition files is counted here. Once the count reaches the limit the
//! location file is considered untrustworthy: it is deleted on close and
//! regenerated from the partition files on the next open.

use crate::layout::hex;
use std::fmt;
use tracing::{error, warn};

/// Kind of inconsistency that was repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// The entry points at a free or missing row.
    MissingRecord,
    /// The record's key is not well-formed under the key order.
    MalformedKey,
    /// The record's blob cannot be decoded.
    UndecodableBlob,
    /// The record belongs to a different key than the entry.
    Misrouted,
    /// The decoded element count differs from the entry.
    CountMismatch,
    /// The blob just written does not carry the expected element count.
    WriteMismatch,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MissingRecord => "missing record",
            Self::MalformedKey => "malformed key",
            Self::UndecodableBlob => "undecodable blob",
            Self::Misrouted => "misrouted entry",
            Self::CountMismatch => "count mismatch",
            Self::WriteMismatch => "write mismatch",
        };
        f.write_str(name)
    }
}

/// Error count and rebuild intent of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    errors: u64,
    limit: u64,
    rebuild_pending: bool,
}

impl HealthState {
    /// Creates a healthy state that schedules a rebuild after `limit` repairs.
    #[must_use]
    pub const fn new(limit: u64) -> Self {
        Self {
            errors: 0,
            limit,
            rebuild_pending: false,
        }
    }

    /// Counts one repair of `fault` on `key` and logs it.
    pub fn record(&mut self, fault: Fault, key: &[u8]) {
        self.errors += 1;
        match fault {
            Fault::MissingRecord => {
                warn!(%fault, key = %hex(key), errors = self.errors, "repaired location index");
            }
            _ => {
                error!(%fault, key = %hex(key), errors = self.errors, "repaired location index");
            }
        }
        if self.errors >= self.limit && !self.rebuild_pending {
            warn!(
                errors = self.errors,
                "error limit reached, location index will be rebuilt on next open"
            );
            self.rebuild_pending = true;
        }
    }

    /// Schedules a rebuild regardless of the error count.
    pub fn mark_rebuild(&mut self) {
        self.rebuild_pending = true;
    }

    /// Returns the number of repairs so far.
    #[must_use]
    pub const fn errors(&self) -> u64 {
        self.errors
    }

    /// Returns the repair count that triggers a rebuild.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns true once the location file is to be deleted on close.
    #[must_use]
    pub const fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }
}
