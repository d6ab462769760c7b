//! Bounding collections of very common keys.
//!
//! A merge that would outgrow the top size class evicts elements first.
//! An optional [`RetentionHint`] names elements worth keeping; everything
//! else goes in a first pass. If that is not enough, random passes each
//! evict about three out of four remaining elements until the collection
//! fits.

use crate::collection::Collection;
use rand::Rng;
use std::fmt;

/// Marks elements a shrink should keep as long as possible.
pub trait RetentionHint: Send + Sync + fmt::Debug {
    /// Returns true if `element` is likely important.
    fn is_important(&self, element: &[u8]) -> bool;
}

/// Keeps elements whose reference looks like a root-level identifier.
///
/// The reference carries a flag byte at a fixed position; elements whose
/// byte there is one of `flags` are considered roots.
///
/// ```rust
/// use partidx_core::{RetentionHint, RootReferenceHint};
///
/// let hint = RootReferenceHint::new(5, *b"AE");
/// assert!(hint.is_important(b"abcdeAxyz"));
/// assert!(!hint.is_important(b"abcdeQxyz"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReferenceHint {
    position: usize,
    flags: Vec<u8>,
}

impl RootReferenceHint {
    /// Creates a hint testing the byte at `position` against `flags`.
    #[must_use]
    pub fn new(position: usize, flags: impl Into<Vec<u8>>) -> Self {
        Self {
            position,
            flags: flags.into(),
        }
    }
}

impl RetentionHint for RootReferenceHint {
    fn is_important(&self, element: &[u8]) -> bool {
        element
            .get(self.position)
            .is_some_and(|flag| self.flags.contains(flag))
    }
}

/// Elements removed by [`shrink`].
#[derive(Debug)]
pub(crate) struct Eviction {
    /// Every evicted element.
    pub evicted: Collection,
    /// How many were evicted by the retention pass.
    pub by_hint: usize,
}

/// Evicts elements from `collection` until it holds at most `target`.
pub(crate) fn shrink<R: Rng>(
    collection: &mut Collection,
    target: usize,
    hint: Option<&dyn RetentionHint>,
    rng: &mut R,
) -> Eviction {
    let mut evicted = Collection::new(*collection.layout());
    if collection.len() <= target {
        return Eviction {
            evicted,
            by_hint: 0,
        };
    }

    if let Some(hint) = hint {
        evicted = collection.extract_if(|element| !hint.is_important(element));
    }
    let by_hint = evicted.len();

    while collection.len() > target {
        let sampled = collection.extract_if(|_| rng.gen_range(0..4) != 0);
        evicted = evicted.merge(&sampled);
    }
    collection.trim();

    Eviction { evicted, by_hint }
}
