//! Sorted element collections.
//!
//! A collection is the value stored under one index key: a set of
//! fixed-width elements kept sorted and unique by their leading element key.
//! Collections serialize to a single blob that fits a partition record.

mod codec;
mod set;

pub use codec::{blob_size, stored_count, BLOB_OVERHEAD};
pub use set::{Collection, ElementLayout};
