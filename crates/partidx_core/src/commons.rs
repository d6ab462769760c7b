//! Commons dump: archive of elements evicted by shrinks.
//!
//! Each shrink appends one unpadded collection blob to
//! `<dir>/<hh>/<hexkey>_<yyyyMMddHHmmss>.collection`, where `hh` is the
//! first two characters of the hex-encoded key and the timestamp is UTC.

use crate::collection::{Collection, ElementLayout};
use crate::error::CoreResult;
use crate::layout::hex;
use crate::types::DayStamp;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const DUMP_SUFFIX: &str = "collection";

/// Directory of dump files for one element size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonsDump {
    dir: PathBuf,
}

impl CommonsDump {
    /// Creates a dump rooted at `dir`. Nothing is touched on disk.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Returns the dump directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the dump file for `key` at `now`.
    #[must_use]
    pub fn path_for(&self, key: &[u8], now: DateTime<Utc>) -> PathBuf {
        let encoded = hex(key);
        let bucket = encoded.get(..2).unwrap_or("00").to_string();
        let name = format!(
            "{encoded}_{}.{DUMP_SUFFIX}",
            now.format("%Y%m%d%H%M%S")
        );
        self.dir.join(bucket).join(name)
    }

    /// Appends `evicted` to the dump file of `key` and returns its path.
    pub fn write(
        &self,
        key: &[u8],
        evicted: &Collection,
        now: DateTime<Utc>,
    ) -> CoreResult<PathBuf> {
        let path = self.path_for(key, now);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = evicted.export(0, DayStamp::from_datetime(now));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&blob)?;
        file.sync_data()?;
        Ok(path)
    }

    /// Reads every blob of a dump file and merges them.
    pub fn read(path: &Path, layout: ElementLayout) -> CoreResult<Collection> {
        let bytes = fs::read(path)?;
        let mut merged = Collection::new(layout);
        let mut rest = bytes.as_slice();
        while !rest.is_empty() {
            let (part, used) = Collection::import_prefix(layout, rest, true)?;
            merged = merged.merge(&part);
            rest = &rest[used..];
        }
        Ok(merged)
    }

    /// Lists every dump file, sorted.
    pub fn files(&self) -> CoreResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        if !self.dir.is_dir() {
            return Ok(found);
        }
        for bucket in fs::read_dir(&self.dir)? {
            let bucket = bucket?;
            if !bucket.file_type()?.is_dir() {
                continue;
            }
            for file in fs::read_dir(bucket.path())? {
                let path = file?.path();
                if path.extension().is_some_and(|ext| ext == DUMP_SUFFIX) {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    /// Creates the dump directory.
    pub(crate) fn prepare(&self) -> CoreResult<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Deletes the dump directory and everything in it.
    pub(crate) fn remove_all(&self) -> CoreResult<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}
