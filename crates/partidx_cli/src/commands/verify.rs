//! Verify command implementation.

use super::{open_existing, CliError, Geometry};
use partidx_core::hex;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Keys in the location index before the walk.
    pub keys_before: usize,
    /// Keys yielding a collection.
    pub keys_read: usize,
    /// Elements across every collection read.
    pub elements: u64,
    /// Keys that yielded an empty collection.
    pub empty: usize,
    /// Repairs made during the walk.
    pub repairs: u64,
    /// Keys in the location index after the walk.
    pub keys_after: usize,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.repairs == 0
    }
}

/// Runs the verify command.
pub fn run(path: &Path, prefix: &str, geometry: &Geometry) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying index '{}' at {:?}", prefix, path);
    println!();

    let index = open_existing(path, prefix, geometry)?;
    let repairs_at_open = index.health()?.errors();
    let mut result = VerifyResult {
        keys_before: index.size()?,
        ..VerifyResult::default()
    };

    for item in index.keycollections(None, None, false)? {
        let (key, collection) = item?;
        result.keys_read += 1;
        result.elements += collection.len() as u64;
        if collection.is_empty() {
            result.empty += 1;
            println!("  empty collection for key {}", hex(&key));
        }
    }

    result.repairs = index.health()?.errors() - repairs_at_open;
    result.keys_after = index.size()?;
    index.close()?;

    print_result(&result);
    println!();
    if result.is_ok() {
        println!("✓ Index verification passed");
        Ok(())
    } else {
        println!("✗ Index verification needed repairs");
        Err(CliError::Inconsistent(result.repairs).into())
    }
}

fn print_result(result: &VerifyResult) {
    println!("Location index:");
    println!("  Keys before:  {}", result.keys_before);
    println!("  Keys read:    {}", result.keys_read);
    println!("  Keys after:   {}", result.keys_after);
    println!("  Elements:     {}", result.elements);
    println!("  Empty:        {}", result.empty);
    println!("  Repairs:      {}", result.repairs);
}
