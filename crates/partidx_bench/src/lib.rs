//! Benchmark utilities.

use partidx_core::{Collection, ElementLayout};
use rand::Rng;

/// Element layout used by every benchmark: 16-byte elements keyed by their
/// first 8 bytes.
pub fn layout() -> ElementLayout {
    ElementLayout::new(16, 8).expect("valid layout")
}

/// Builds the element keyed by `id`.
pub fn element(id: u64) -> [u8; 16] {
    let mut element = [0xAA; 16];
    element[..8].copy_from_slice(&id.to_be_bytes());
    element
}

/// Builds a collection holding the elements `ids`.
pub fn collection(ids: impl IntoIterator<Item = u64>) -> Collection {
    Collection::from_elements(layout(), ids.into_iter().map(element)).expect("valid elements")
}

/// Generates a collection of `count` random elements.
pub fn random_collection(count: usize) -> Collection {
    let mut rng = rand::thread_rng();
    collection((0..count).map(|_| rng.gen()))
}

/// Generates `count` distinct 8-byte keys.
pub fn keys(count: usize) -> Vec<[u8; 8]> {
    (0..count as u64)
        .map(|i| (i | 1 << 63).to_be_bytes())
        .collect()
}
