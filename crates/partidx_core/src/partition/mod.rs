//! Partition files and the record arrays beneath them.

mod array;
mod store;

pub use array::{RecordArray, Rows};
pub use store::{PartitionRecords, PartitionStore, PartitionSummary};
