//! CLI command implementations
//!
//! Each command group has its own module with a `run` function dispatching
//! the group's subcommands. File utilities are synchronous; the network
//! groups are async and take the resolved [`crate::Config`].

pub mod annotate;
pub mod bed;
pub mod blast;
pub mod blat;
pub mod circ;
pub mod expr;
pub mod fasta;
pub mod fastq;
pub mod fetch;
pub mod gff;
pub mod mapping;
pub mod rest;
pub mod table;
pub mod uniprot;

use crate::error::{require_exists, Result};
use colored::Colorize;
use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

/// Report a written output file
pub(crate) fn written(path: &Path) {
    println!("{} Wrote {}", "✓".green(), path.display());
}

/// Non-empty, trimmed lines of an id list
pub(crate) fn read_ids(path: &Path) -> Result<HashSet<String>> {
    require_exists(path)?;
    let mut ids = HashSet::new();
    for line in bwr_formats::io::open_text(path)?.lines() {
        let line = line?;
        let id = line.trim();
        if !id.is_empty() {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}
