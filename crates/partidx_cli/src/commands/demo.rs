//! Demo command implementation.

use super::{inspect, Geometry};
use partidx_core::{Collection, CollectionIndex, ElementLayout};
use rand::Rng;
use std::path::Path;
use std::time::Instant;

/// Pads or cuts `text` to exactly `len` bytes.
fn fixed(text: &str, len: usize) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(len, b'_');
    bytes
}

/// Builds an element whose key is the decimal `id`.
fn element(layout: &ElementLayout, id: u64) -> Vec<u8> {
    let key_size = layout.key_size();
    let digits = format!("{id:0key_size$}");
    let mut element = vec![b'.'; layout.element_size()];
    element[..key_size].copy_from_slice(&digits.as_bytes()[digits.len() - key_size..]);
    element
}

fn batch(layout: ElementLayout, ids: impl Iterator<Item = u64>) -> partidx_core::CoreResult<Collection> {
    let elements: Vec<Vec<u8>> = ids.map(|id| element(&layout, id)).collect();
    Collection::from_elements(layout, elements)
}

/// Runs the demo command.
///
/// The index is cleared first. One key walks through the size classes,
/// then `keys` more keys receive random merges.
pub fn run(
    path: &Path,
    prefix: &str,
    geometry: &Geometry,
    keys: usize,
    max_elements: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = geometry.config()?;
    let layout = config.layout;
    let key_len = config.key_len;
    let index = CollectionIndex::open(path, prefix, config)?;
    index.clear()?;

    let key = fixed("key-1", key_len);
    index.put(&key, &batch(layout, 0..1)?)?;
    report_location(&index, &key, "put 1 element")?;
    index.put(&key, &batch(layout, 0..5)?)?;
    report_location(&index, &key, "put 5 elements")?;
    index.merge(&key, &batch(layout, 5..17)?)?;
    report_location(&index, &key, "merged 12 elements")?;
    println!();

    let started = Instant::now();
    let mut rng = rand::thread_rng();
    let mut next_id = 17u64;
    for i in 0..keys {
        let key = fixed(&format!("k{i:06}"), key_len);
        let count = rng.gen_range(1..=max_elements.max(1)) as u64;
        index.merge(&key, &batch(layout, next_id..next_id + count)?)?;
        next_id += count;
    }
    println!(
        "Merged {} elements into {} keys in {:.2?}",
        next_id - 17,
        keys,
        started.elapsed()
    );
    println!();

    let result = inspect::collect(&index)?;
    index.close()?;
    inspect::print_text_output(&result);
    Ok(())
}

fn report_location(
    index: &CollectionIndex,
    key: &[u8],
    step: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let entry = index.location(key)?.ok_or("demo key vanished")?;
    println!(
        "{step:<20} -> size class {} (capacity {}), row {}, {} elements",
        entry.size_class,
        index.config().size_classes()?.capacity(entry.size_class),
        entry.row,
        entry.element_count
    );
    Ok(())
}
