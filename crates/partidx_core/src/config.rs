//! Index configuration.

use crate::collection::ElementLayout;
use crate::error::{CoreError, CoreResult};
use crate::order::KeyOrder;
use crate::shrink::RetentionHint;
use crate::sizing::SizeClasses;
use std::sync::Arc;

/// Where location entries live while the index is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Residency {
    /// Decide at open from [`Config::available_memory`].
    #[default]
    Auto,
    /// Keep every decoded entry in memory.
    FullCache,
    /// Keep only the key to row map in memory and read entries from disk.
    Lean,
}

/// Configuration for opening a collection index.
#[derive(Debug, Clone)]
pub struct Config {
    /// Length of every index key in bytes.
    pub key_len: usize,

    /// Order of index keys.
    pub key_order: KeyOrder,

    /// Growth base between size classes.
    pub load_factor: u32,

    /// Number of size classes.
    pub max_partitions: u8,

    /// Shape of the collection elements.
    pub layout: ElementLayout,

    /// Whether evicted elements are archived to the commons dump.
    pub use_commons: bool,

    /// Self-heal count at which the location file is rebuilt on next open.
    pub error_limit: u64,

    /// Location entry residency.
    pub residency: Residency,

    /// Memory budget consulted by [`Residency::Auto`]; `None` is unconstrained.
    pub available_memory: Option<u64>,

    /// Seed for eviction sampling; `None` seeds from the OS.
    pub shrink_seed: Option<u64>,

    /// Elements kept by the first shrink pass; `None` skips that pass.
    pub retention: Option<Arc<dyn RetentionHint>>,
}

impl Config {
    /// Default growth base between size classes.
    pub const DEFAULT_LOAD_FACTOR: u32 = 4;
    /// Default number of size classes.
    pub const DEFAULT_MAX_PARTITIONS: u8 = 7;
    /// Default self-heal threshold.
    pub const DEFAULT_ERROR_LIMIT: u64 = 500;

    /// Creates a configuration with default geometry.
    #[must_use]
    pub fn new(key_len: usize, layout: ElementLayout) -> Self {
        Self {
            key_len,
            key_order: KeyOrder::Natural,
            load_factor: Self::DEFAULT_LOAD_FACTOR,
            max_partitions: Self::DEFAULT_MAX_PARTITIONS,
            layout,
            use_commons: false,
            error_limit: Self::DEFAULT_ERROR_LIMIT,
            residency: Residency::Auto,
            available_memory: None,
            shrink_seed: None,
            retention: None,
        }
    }

    /// Sets the index key order.
    #[must_use]
    pub const fn key_order(mut self, order: KeyOrder) -> Self {
        self.key_order = order;
        self
    }

    /// Sets the load factor.
    #[must_use]
    pub const fn load_factor(mut self, value: u32) -> Self {
        self.load_factor = value;
        self
    }

    /// Sets the number of size classes.
    #[must_use]
    pub const fn max_partitions(mut self, value: u8) -> Self {
        self.max_partitions = value;
        self
    }

    /// Enables or disables the commons dump.
    #[must_use]
    pub const fn use_commons(mut self, value: bool) -> Self {
        self.use_commons = value;
        self
    }

    /// Sets the self-heal threshold.
    #[must_use]
    pub const fn error_limit(mut self, value: u64) -> Self {
        self.error_limit = value;
        self
    }

    /// Sets the location entry residency.
    #[must_use]
    pub const fn residency(mut self, value: Residency) -> Self {
        self.residency = value;
        self
    }

    /// Sets the memory budget for [`Residency::Auto`].
    #[must_use]
    pub const fn available_memory(mut self, bytes: u64) -> Self {
        self.available_memory = Some(bytes);
        self
    }

    /// Makes eviction sampling deterministic.
    #[must_use]
    pub const fn shrink_seed(mut self, seed: u64) -> Self {
        self.shrink_seed = Some(seed);
        self
    }

    /// Sets the heuristic of the first shrink pass.
    #[must_use]
    pub fn retention(mut self, hint: Arc<dyn RetentionHint>) -> Self {
        self.retention = Some(hint);
        self
    }

    /// Returns the size-class geometry.
    ///
    /// # Errors
    ///
    /// Fails like [`Config::validate`].
    pub fn size_classes(&self) -> CoreResult<SizeClasses> {
        SizeClasses::new(self.load_factor, self.max_partitions)
    }

    /// Checks that the configuration describes a representable index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.key_len == 0 {
            return Err(CoreError::invalid_config("key length must be positive"));
        }
        if self.load_factor > u32::from(u8::MAX) {
            return Err(CoreError::invalid_config(format!(
                "load factor {} does not fit the two hex digits of a partition name",
                self.load_factor
            )));
        }
        if self.error_limit == 0 {
            return Err(CoreError::invalid_config("error limit must be positive"));
        }
        // element size is bounded by ElementLayout::new
        self.size_classes().map(|_| ())
    }
}
