//! # partidx core
//!
//! A persistent, partitioned index from fixed-length keys to sorted
//! collections of fixed-width elements, such as a word to its document
//! references.
//!
//! This crate provides:
//! - Size-classed partition files, where class `n` holds collections of up
//!   to `load_factor^(n+1)` elements
//! - A location table naming the partition and row of every collection
//! - A self-healing read path that repairs index/partition disagreements
//! - Rebuild of the location table from the partition files
//! - Shrinking of very common keys, with an optional commons dump of the
//!   evicted elements
//! - Ordered and rotating iteration over key collections
//!
//! ## Example
//!
//! ```rust
//! use partidx_core::{Collection, CollectionIndex, Config, ElementLayout};
//!
//! let layout = ElementLayout::new(4, 2).unwrap();
//! let index = CollectionIndex::open_in_memory(Config::new(3, layout)).unwrap();
//!
//! index.merge(b"cat", &Collection::from_elements(layout, [b"d1.."]).unwrap()).unwrap();
//! index.merge(b"cat", &Collection::from_elements(layout, [b"d2.."]).unwrap()).unwrap();
//!
//! let refs = index.get(b"cat").unwrap().unwrap();
//! assert_eq!(refs.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod commons;
mod config;
mod error;
mod heal;
mod health;
mod index;
mod iter;
mod layout;
mod location;
mod order;
mod partition;
mod rebuild;
mod shrink;
mod sizing;
mod stats;
mod types;

pub use collection::{blob_size, stored_count, Collection, ElementLayout, BLOB_OVERHEAD};
pub use commons::CommonsDump;
pub use config::{Config, Residency};
pub use error::{CoreError, CoreResult};
pub use health::{Fault, HealthState};
pub use index::CollectionIndex;
pub use iter::KeyCollections;
pub use layout::{hex, IndexFiles, PartitionFileName};
pub use location::{LocationEntry, LocationTable, ENTRY_OVERHEAD};
pub use order::KeyOrder;
pub use partition::{PartitionRecords, PartitionStore, PartitionSummary, RecordArray, Rows};
pub use shrink::{RetentionHint, RootReferenceHint};
pub use sizing::SizeClasses;
pub use stats::{IndexStats, StatsSnapshot};
pub use types::{DayStamp, PartitionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
