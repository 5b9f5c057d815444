//! BWR file formats
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Readers, writers and table transforms for the text formats the `bwr`
//! utilities consume and produce. Everything here is synchronous and works
//! on whole files: load, transform in memory, write back.
//!
//! - [`gff`]: GFF3/GTF records with ordered attributes
//! - [`bed`]: BED3-BED12 intervals and nearest-neighbour search
//! - [`fasta`]: deduplication, GC content, contig merging
//! - [`table`]: tab-separated tables and row collapsing
//! - [`annotation`]: gene-level summaries and rewrites over GTF/GFF
//! - [`psl`]: BLAT alignments to GTF
//! - [`circ`]: circRNA statistics and in-silico controls
//! - [`expression`]: correlation, grouping and tissue specificity
//! - [`mapping`]: aligner log summaries
//! - [`blast`]: tabular BLAST hits and the external BLAST runner
//! - [`fastq`]: grouping sequencing files by read name
//! - [`uniprot`]: UniProt flat-file cross references
//! - [`tool`]: locating and running external programs

pub mod annotation;
pub mod bed;
pub mod blast;
pub mod circ;
pub mod expression;
pub mod fasta;
pub mod fastq;
pub mod gff;
pub mod io;
pub mod mapping;
pub mod psl;
pub mod table;
pub mod tool;
pub mod uniprot;

pub use bwr_common::{BwrError, Result, Strand};
