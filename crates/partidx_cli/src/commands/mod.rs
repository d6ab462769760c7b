//! CLI command implementations.

pub mod demo;
pub mod inspect;
pub mod rebuild;
pub mod verify;

use clap::Args;
use partidx_core::{CollectionIndex, Config, ElementLayout, IndexFiles, KeyOrder};
use std::path::Path;
use thiserror::Error;

/// Errors raised by the commands themselves.
#[derive(Debug, Error)]
pub enum CliError {
    /// Neither a location index nor partition files exist.
    #[error("no index '{prefix}' found in {path}")]
    NotFound {
        /// Directory searched.
        path: String,
        /// Index prefix.
        prefix: String,
    },

    /// The `--order` flag names no known key order.
    #[error("unknown key order '{0}' (expected natural or base64)")]
    UnknownOrder(String),

    /// Verification needed repairs.
    #[error("verification repaired {0} inconsistencies")]
    Inconsistent(u64),
}

/// Index geometry flags shared by every command.
#[derive(Args, Debug, Clone)]
pub struct Geometry {
    /// Length of index keys in bytes
    #[arg(global = true, long, default_value = "12")]
    pub key_len: usize,

    /// Width of one collection element in bytes
    #[arg(global = true, long, default_value = "17")]
    pub element_size: usize,

    /// Leading bytes of an element that form its element key
    #[arg(global = true, long, default_value = "12")]
    pub element_key_size: usize,

    /// Growth base between size classes
    #[arg(global = true, long, default_value_t = Config::DEFAULT_LOAD_FACTOR)]
    pub load_factor: u32,

    /// Number of size classes
    #[arg(global = true, long, default_value_t = Config::DEFAULT_MAX_PARTITIONS)]
    pub max_partitions: u8,

    /// Key order (natural, base64)
    #[arg(global = true, long, default_value = "natural")]
    pub order: String,

    /// Keep the commons dump; opening without it deletes the dump
    #[arg(global = true, long)]
    pub commons: bool,
}

impl Geometry {
    /// Builds the index configuration described by the flags.
    pub fn config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let layout = ElementLayout::new(self.element_size, self.element_key_size)?;
        let order =
            KeyOrder::from_name(&self.order).ok_or_else(|| CliError::UnknownOrder(self.order.clone()))?;
        Ok(Config::new(self.key_len, layout)
            .key_order(order)
            .load_factor(self.load_factor)
            .max_partitions(self.max_partitions)
            .use_commons(self.commons))
    }
}

/// Opens an index that must already exist on disk.
pub fn open_existing(
    path: &Path,
    prefix: &str,
    geometry: &Geometry,
) -> Result<CollectionIndex, Box<dyn std::error::Error>> {
    let files = IndexFiles::new(path, prefix);
    if !files.index_path().exists() && files.list_partitions()?.is_empty() {
        return Err(CliError::NotFound {
            path: path.display().to_string(),
            prefix: prefix.to_string(),
        }
        .into());
    }
    Ok(CollectionIndex::open(path, prefix, geometry.config()?)?)
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
