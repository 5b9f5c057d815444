//! BWR network fetchers
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Download and annotation clients for the public bioinformatics services:
//!
//! - [`bounded`]: semaphore-guarded task pool shared by every fetcher
//! - [`ftp`]: blocking FTP client with resumable downloads
//! - [`blastdb`]: NCBI BLAST database volumes
//! - [`ensembl_ftp`]: Ensembl Genomes plant release files
//! - [`rest`]: rate-limited JSON/text REST client
//! - [`ensembl`] / [`uniprot`]: typed endpoints on top of [`rest`]
//! - [`annotation`]: resumable gene -> UniProt -> GO pipeline
//! - [`orthologues`]: orthologue tables and their genomic sequences
//! - [`protein_seq`]: protein ids resolved through the Ensembl Plants search
//! - [`scrape`]: download links harvested from an HTML table

pub mod annotation;
pub mod blastdb;
pub mod bounded;
pub mod ensembl;
pub mod ensembl_ftp;
pub mod error;
pub mod ftp;
pub mod orthologues;
pub mod protein_seq;
pub mod rest;
pub mod scrape;
pub mod uniprot;

pub use bounded::{run_bounded, FetchSummary};
pub use error::{FetchError, Result};
