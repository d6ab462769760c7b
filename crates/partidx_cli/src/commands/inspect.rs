//! Inspect command implementation.

use super::{format_size, open_existing, Geometry};
use partidx_core::{CollectionIndex, PartitionSummary};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Index inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Index directory.
    pub path: String,
    /// File name prefix.
    pub prefix: String,
    /// Number of keys in the location index.
    pub key_count: usize,
    /// Location index file size in bytes.
    pub index_size: u64,
    /// Where location entries are kept.
    pub residency: String,
    /// Self-heal repairs since open.
    pub repairs: u64,
    /// Memory needed for the largest collection currently possible.
    pub min_memory: u64,
    /// Commons dump files, if the dump directory exists.
    pub commons_files: usize,
    /// Every opened partition.
    pub partitions: Vec<PartitionInfo>,
}

/// Statistics for a single partition file.
#[derive(Debug, Serialize)]
pub struct PartitionInfo {
    /// Size class.
    pub size_class: u8,
    /// Elements per record.
    pub capacity: usize,
    /// Record width in bytes.
    pub record_size: usize,
    /// Live records.
    pub live: usize,
    /// Free rows.
    pub free: usize,
    /// File size in bytes.
    pub file_size: u64,
    /// File name.
    pub file: Option<String>,
}

impl From<PartitionSummary> for PartitionInfo {
    fn from(summary: PartitionSummary) -> Self {
        let file_size = summary
            .path
            .as_deref()
            .and_then(|path| fs::metadata(path).ok())
            .map_or(0, |meta| meta.len());
        Self {
            size_class: summary.size_class,
            capacity: summary.capacity,
            record_size: summary.record_size,
            live: summary.live,
            free: summary.free,
            file_size,
            file: summary
                .path
                .as_deref()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    prefix: &str,
    geometry: &Geometry,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let index = open_existing(path, prefix, geometry)?;
    let result = collect(&index)?;
    index.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Gathers the inspection result of an open index.
pub fn collect(index: &CollectionIndex) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let files = index.files().ok_or("index has no files")?;
    let index_size = fs::metadata(files.index_path()).map_or(0, |meta| meta.len());
    let commons_files = match index.commons() {
        Some(commons) => commons.files()?.len(),
        None => 0,
    };

    Ok(InspectResult {
        path: files.dir().display().to_string(),
        prefix: files.prefix().to_string(),
        key_count: index.size()?,
        index_size,
        residency: format!("{:?}", index.residency()?),
        repairs: index.health()?.errors(),
        min_memory: index.min_memory_estimate()?,
        commons_files,
        partitions: index
            .partitions()?
            .into_iter()
            .map(PartitionInfo::from)
            .collect(),
    })
}

/// Prints an inspection result as text.
pub fn print_text_output(result: &InspectResult) {
    println!("partidx Index Inspection");
    println!("========================");
    println!();
    println!("Path:   {}", result.path);
    println!("Prefix: {}", result.prefix);
    println!();
    println!("Location index:");
    println!("  Keys:       {}", result.key_count);
    println!("  File size:  {} bytes", format_size(result.index_size));
    println!("  Residency:  {}", result.residency);
    println!("  Repairs:    {}", result.repairs);
    println!("  Min memory: {} bytes", format_size(result.min_memory));
    println!();
    println!("Partitions:");
    if result.partitions.is_empty() {
        println!("  (none)");
    }
    for partition in &result.partitions {
        println!(
            "  [{}] capacity {:>6}, {} live, {} free, {} bytes{}",
            partition.size_class,
            partition.capacity,
            partition.live,
            partition.free,
            format_size(partition.file_size),
            partition
                .file
                .as_deref()
                .map(|name| format!("  {name}"))
                .unwrap_or_default()
        );
    }
    if result.commons_files > 0 {
        println!();
        println!("Commons dump: {} files", result.commons_files);
    }
}
