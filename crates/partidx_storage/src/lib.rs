//! # partidx storage
//!
//! Byte-store backends underneath the partitioned collection index.
//!
//! A backend is an **opaque, positional byte store**: it can read a span,
//! append to the end, overwrite a span in place and shrink. It knows nothing
//! about record arrays, location entries or collection blobs; `partidx_core`
//! owns every file format.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - one OS file, used for partition and location files
//! - [`InMemoryBackend`] - a growable buffer for tests
//!
//! ## Example
//!
//! ```rust
//! use partidx_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"0000aaaa").unwrap();
//! backend.write_at(4, b"bbbb").unwrap();
//! assert_eq!(backend.read_at(0, 8).unwrap(), b"0000bbbb");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
