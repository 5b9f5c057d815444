//! FASTA utilities built on `bio::io::fasta`

use crate::bed::BedRecord;
use crate::io::open_text;
use bio::io::fasta;
use bwr_common::{BwrError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

pub use bio::io::fasta::Record;

/// Read all records of a (optionally gzipped) FASTA file
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let reader = fasta::Reader::new(open_text(path)?);
    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }
    Ok(records)
}

/// Lazily iterate the records of a FASTA file
pub fn records(path: impl AsRef<Path>) -> Result<impl Iterator<Item = Result<Record>>> {
    let reader = fasta::Reader::new(open_text(path)?);
    Ok(reader.records().map(|r| r.map_err(BwrError::from)))
}

pub fn write_records<'a>(
    path: impl AsRef<Path>,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<()> {
    let mut writer = fasta::Writer::new(crate::io::create_text(path)?);
    for record in records {
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Keep the first record for every id, preserving input order.
/// Returns the kept records and the number of dropped duplicates.
pub fn dedup_by_id(records: impl IntoIterator<Item = Record>) -> (Vec<Record>, usize) {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut dropped = 0;
    for record in records {
        if seen.insert(record.id().to_string()) {
            kept.push(record);
        } else {
            debug!(id = record.id(), "Dropping duplicate sequence");
            dropped += 1;
        }
    }
    (kept, dropped)
}

/// Count G and C bases, case-insensitive
pub fn gc_count(seq: &[u8]) -> u64 {
    seq.iter()
        .filter(|b| matches!(b, b'G' | b'g' | b'C' | b'c'))
        .count() as u64
}

/// A sequence is protein when it has any letter outside `ATGCN`
pub fn is_protein(seq: &[u8]) -> bool {
    seq.iter()
        .filter(|b| b.is_ascii_alphabetic())
        .any(|b| !matches!(b.to_ascii_uppercase(), b'A' | b'T' | b'G' | b'C' | b'N'))
}

fn region<'a>(seq: &'a [u8], bed: &BedRecord) -> &'a [u8] {
    let len = seq.len() as u64;
    if bed.end > len {
        warn!(
            chrom = %bed.chrom,
            end = bed.end,
            length = len,
            "Region runs past the sequence end, clipping"
        );
    }
    let start = bed.start.min(len) as usize;
    let end = bed.end.min(len).max(bed.start.min(len)) as usize;
    &seq[start..end]
}

/// GC count and fraction of one BED region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGc {
    pub region: BedRecord,
    pub gc_count: u64,
    pub gc_fraction: f64,
}

/// GC content of every region whose sequence exists in the genome.
/// Output follows genome order, then BED order within a sequence.
pub fn region_gc(genome: impl AsRef<Path>, regions: &[BedRecord]) -> Result<Vec<RegionGc>> {
    let mut by_chrom: HashMap<&str, Vec<&BedRecord>> = HashMap::new();
    for bed in regions {
        by_chrom.entry(bed.chrom.as_str()).or_default().push(bed);
    }

    let mut out = Vec::new();
    for record in records(genome)? {
        let record = record?;
        let Some(beds) = by_chrom.get(record.id()) else {
            continue;
        };
        for bed in beds {
            let gc = gc_count(region(record.seq(), bed));
            let fraction = if bed.length() == 0 {
                f64::NAN
            } else {
                gc as f64 / bed.length() as f64
            };
            out.push(RegionGc {
                region: (*bed).clone(),
                gc_count: gc,
                gc_fraction: fraction,
            });
        }
    }
    Ok(out)
}

/// GC fraction of one transcript feature (exon, intron, UTR, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureGc {
    pub transcript_id: String,
    pub gene_id: String,
    pub feature: String,
    pub length: u64,
    pub gc_count: u64,
}

impl FeatureGc {
    pub fn gc(&self) -> f64 {
        if self.length == 0 {
            f64::NAN
        } else {
            self.gc_count as f64 / self.length as f64
        }
    }
}

/// GC fraction per (transcript, gene, feature) from an eight-column feature BED:
/// `chrom start end feature_id score strand gene_id feature`, where the
/// feature id starts with `<transcript>|`.
pub fn feature_gc(genome: impl AsRef<Path>, features: &[BedRecord]) -> Result<Vec<FeatureGc>> {
    for bed in features {
        if bed.extra.len() < 2 {
            return Err(BwrError::invalid_input(format!(
                "feature BED needs gene_id and feature columns: {}",
                bed.to_line()
            )));
        }
    }

    let mut totals: BTreeMap<(String, String, String), (u64, u64)> = BTreeMap::new();
    for region in region_gc(genome, features)? {
        let bed = &region.region;
        let transcript_id = bed.name().split('|').next().unwrap_or_default().to_string();
        let key = (transcript_id, bed.extra[0].clone(), bed.extra[1].clone());
        let slot = totals.entry(key).or_default();
        slot.0 += bed.length();
        slot.1 += region.gc_count;
    }

    Ok(totals
        .into_iter()
        .map(|((transcript_id, gene_id, feature), (length, gc_count))| FeatureGc {
            transcript_id,
            gene_id,
            feature,
            length,
            gc_count,
        })
        .collect())
}

/// Cut every BED region out of the genome as its own record, named after
/// the BED name column
pub fn extract_regions(genome: impl AsRef<Path>, regions: &[BedRecord]) -> Result<Vec<Record>> {
    let mut by_chrom: HashMap<&str, Vec<&BedRecord>> = HashMap::new();
    for bed in regions {
        by_chrom.entry(bed.chrom.as_str()).or_default().push(bed);
    }

    let mut out = Vec::new();
    for record in records(genome)? {
        let record = record?;
        if let Some(beds) = by_chrom.get(record.id()) {
            for bed in beds {
                let name = bed.name.clone().unwrap_or_else(|| {
                    format!("{}:{}-{}", bed.chrom, bed.start, bed.end)
                });
                out.push(Record::with_attrs(&name, None, region(record.seq(), bed)));
            }
        }
    }
    Ok(out)
}

/// Result of [`merge_contigs`]
#[derive(Debug)]
pub struct MergedGenome {
    pub records: Vec<Record>,
    /// `(contig_id, offset)` of every merged contig inside the super-contig
    pub offsets: Vec<(String, u64)>,
}

/// Join the listed contigs into one super-contig separated by runs of `N`.
///
/// Unlisted sequences are kept unchanged; the super-contig is appended last.
pub fn merge_contigs(
    genome: impl IntoIterator<Item = Record>,
    contig_ids: &HashSet<String>,
    n_sep: usize,
    merged_name: &str,
) -> MergedGenome {
    let spacer = vec![b'N'; n_sep];
    let mut records = Vec::new();
    let mut offsets = Vec::new();
    let mut merged: Vec<u8> = Vec::new();
    let mut offset = 0u64;

    for record in genome {
        if contig_ids.contains(record.id()) {
            if !offsets.is_empty() {
                merged.extend_from_slice(&spacer);
            }
            merged.extend_from_slice(record.seq());
            offsets.push((record.id().to_string(), offset));
            offset += (record.seq().len() + n_sep) as u64;
        } else {
            records.push(record);
        }
    }

    if offsets.is_empty() {
        warn!(name = merged_name, "None of the listed contigs were found in the genome");
    } else {
        records.push(Record::with_attrs(merged_name, None, &merged));
    }

    MergedGenome { records, offsets }
}
