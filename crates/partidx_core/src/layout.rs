//! On-disk layout of a collection index.
//!
//! Every file name is derived from a directory and a prefix:
//!
//! ```text
//! <dir>/
//! ├─ <prefix>.lock                                  # advisory lock, single process
//! ├─ <prefix>.index                                 # location entries
//! ├─ <prefix>.<LF2>.<ES4>.<SC2>.<GEN2>.kca          # one partition per size class
//! └─ <prefix>.<ES4>.commons/<hh>/<hexkey>_<yyyyMMddHHmmss>.collection
//! ```
//!
//! `LF2`, `ES4`, `SC2` and `GEN2` are the load factor, element size, size
//! class and generation in upper-case hex of the given width. The location
//! file can always be regenerated from the partition files.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const PARTITION_SUFFIX: &str = "kca";
const INDEX_SUFFIX: &str = "index";
const LOCK_SUFFIX: &str = "lock";
const COMMONS_SUFFIX: &str = "commons";

/// Lower-case hex encoding of `bytes`.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Geometry decoded from a partition file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionFileName {
    /// Load factor the file was written with.
    pub load_factor: u8,
    /// Element size of the stored collections.
    pub element_size: u16,
    /// Size class of the records.
    pub size_class: u8,
    /// File generation.
    pub generation: u8,
}

/// Names every file of one index.
///
/// # Example
///
/// ```rust
/// use partidx_core::IndexFiles;
/// use std::path::Path;
///
/// let files = IndexFiles::new(Path::new("/data"), "words");
/// assert_eq!(files.index_path(), Path::new("/data/words.index"));
/// assert_eq!(
///     files.partition_path(4, 90, 2, 0),
///     Path::new("/data/words.04.005A.02.00.kca")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFiles {
    dir: PathBuf,
    prefix: String,
}

impl IndexFiles {
    /// Creates the layout for `prefix` inside `dir`.
    #[must_use]
    pub fn new(dir: &Path, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            prefix: prefix.into(),
        }
    }

    /// Returns the directory holding the index.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the path of the location file.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{INDEX_SUFFIX}", self.prefix))
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{LOCK_SUFFIX}", self.prefix))
    }

    /// Returns the file name of a partition.
    #[must_use]
    pub fn partition_file_name(
        &self,
        load_factor: u8,
        element_size: u16,
        size_class: u8,
        generation: u8,
    ) -> String {
        format!(
            "{}.{load_factor:02X}.{element_size:04X}.{size_class:02X}.{generation:02X}.{PARTITION_SUFFIX}",
            self.prefix
        )
    }

    /// Returns the path of a partition.
    #[must_use]
    pub fn partition_path(
        &self,
        load_factor: u8,
        element_size: u16,
        size_class: u8,
        generation: u8,
    ) -> PathBuf {
        self.dir.join(self.partition_file_name(
            load_factor,
            element_size,
            size_class,
            generation,
        ))
    }

    /// Returns the commons dump directory for collections of `element_size`.
    #[must_use]
    pub fn commons_dir(&self, element_size: u16) -> PathBuf {
        self.dir
            .join(format!("{}.{element_size:04X}.{COMMONS_SUFFIX}", self.prefix))
    }

    /// Decodes a partition file name belonging to this prefix.
    ///
    /// Returns `None` for every other file, including partition files of
    /// other prefixes.
    #[must_use]
    pub fn parse_partition_file_name(&self, name: &str) -> Option<PartitionFileName> {
        let rest = name.strip_prefix(self.prefix.as_str())?.strip_prefix('.')?;
        let rest = rest.strip_suffix(PARTITION_SUFFIX)?.strip_suffix('.')?;

        let fields: Vec<&str> = rest.split('.').collect();
        let [lf, es, sc, generation] = fields.as_slice() else {
            return None;
        };
        if lf.len() != 2 || es.len() != 4 || sc.len() != 2 || generation.len() != 2 {
            return None;
        }
        Some(PartitionFileName {
            load_factor: u8::from_str_radix(lf, 16).ok()?,
            element_size: u16::from_str_radix(es, 16).ok()?,
            size_class: u8::from_str_radix(sc, 16).ok()?,
            generation: u8::from_str_radix(generation, 16).ok()?,
        })
    }

    /// Lists the partition files of this prefix, sorted by name.
    pub fn list_partitions(&self) -> CoreResult<Vec<(PartitionFileName, PathBuf)>> {
        let mut found = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let file_name = dir_entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(parsed) = self.parse_partition_file_name(name) {
                found.push((parsed, dir_entry.path()));
            }
        }
        found.sort();
        Ok(found)
    }

    /// Creates the directory if needed and takes the exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexLocked`] when another handle holds the lock.
    pub(crate) fn lock(&self) -> CoreResult<IndexLock> {
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        if file.try_lock_exclusive().is_err() {
            return Err(CoreError::IndexLocked);
        }
        Ok(IndexLock { _file: file })
    }

    /// Prepares the location file path for opening.
    ///
    /// A directory in its place is a leftover of an older layout and is
    /// removed. Returns true if a location file exists afterwards.
    pub(crate) fn prepare_index_path(&self) -> CoreResult<bool> {
        let path = self.index_path();
        if path.is_dir() {
            tracing::warn!(path = %path.display(), "removing legacy index directory");
            fs::remove_dir_all(&path)?;
            return Ok(false);
        }
        Ok(path.is_file())
    }
}

/// Exclusive advisory lock on an index, released on drop.
#[derive(Debug)]
pub(crate) struct IndexLock {
    _file: File,
}
