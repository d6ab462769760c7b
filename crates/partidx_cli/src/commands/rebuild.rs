//! Rebuild command implementation.

use super::{inspect, open_existing, Geometry};
use partidx_core::IndexFiles;
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Runs the rebuild command.
///
/// The location index is deleted and the next open regenerates it from the
/// partition files.
pub fn run(path: &Path, prefix: &str, geometry: &Geometry) -> Result<(), Box<dyn std::error::Error>> {
    let index_path = IndexFiles::new(path, prefix).index_path();
    if index_path.exists() {
        fs::remove_file(&index_path)?;
        println!("Deleted {}", index_path.display());
    }

    let started = Instant::now();
    let index = open_existing(path, prefix, geometry)?;
    let result = inspect::collect(&index)?;
    index.close()?;

    println!(
        "Rebuilt location index with {} keys in {:.2?}",
        result.key_count,
        started.elapsed()
    );
    println!();
    inspect::print_text_output(&result);
    Ok(())
}
