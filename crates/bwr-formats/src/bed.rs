//! BED intervals (0-based, half-open)

use crate::io::open_text;
use bwr_common::{BwrError, Result, Strand};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct BedRecord {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub name: Option<String>,
    pub score: Option<String>,
    pub strand: Strand,
    /// Columns past the sixth, kept verbatim
    pub extra: Vec<String>,
}

impl BedRecord {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
            name: None,
            score: None,
            strand: Strand::Unknown,
            extra: Vec::new(),
        }
    }

    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(BwrError::parse(
                line_no,
                format!("BED needs at least 3 columns, found {}", fields.len()),
            ));
        }
        let start = fields[1]
            .trim()
            .parse()
            .map_err(|_| BwrError::parse(line_no, format!("invalid start '{}'", fields[1])))?;
        let end = fields[2]
            .trim()
            .parse()
            .map_err(|_| BwrError::parse(line_no, format!("invalid end '{}'", fields[2])))?;
        let strand = match fields.get(5) {
            Some(s) => s
                .trim()
                .parse()
                .map_err(|_| BwrError::parse(line_no, format!("invalid strand '{s}'")))?,
            None => Strand::Unknown,
        };

        Ok(Self {
            chrom: fields[0].to_string(),
            start,
            end,
            name: fields.get(3).map(|s| s.to_string()),
            score: fields.get(4).map(|s| s.to_string()),
            strand,
            extra: fields.iter().skip(6).map(|s| s.to_string()).collect(),
        })
    }

    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// BED12 blocks as absolute `(start, end)` pairs; `None` for narrower lines
    pub fn blocks(&self) -> Option<Result<Vec<(u64, u64)>>> {
        // extra holds columns 7.., so blockSizes/blockStarts sit at 4 and 5
        let sizes = self.extra.get(4)?;
        let starts = self.extra.get(5)?;
        Some(parse_blocks(sizes, starts).map(|blocks| {
            blocks
                .into_iter()
                .map(|(offset, size)| (self.start + offset, self.start + offset + size))
                .collect()
        }))
    }

    /// Write back as BED6 (plus any extra columns)
    pub fn to_line(&self) -> String {
        let mut cols = vec![
            self.chrom.clone(),
            self.start.to_string(),
            self.end.to_string(),
            self.name.clone().unwrap_or_else(|| ".".to_string()),
            self.score.clone().unwrap_or_else(|| ".".to_string()),
            self.strand.to_string(),
        ];
        cols.extend(self.extra.iter().cloned());
        cols.join("\t")
    }
}

/// Pair up comma-separated block sizes and starts (trailing commas allowed)
pub fn parse_blocks(sizes: &str, starts: &str) -> Result<Vec<(u64, u64)>> {
    let parse = |list: &str| -> Result<Vec<u64>> {
        list.split(',')
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| BwrError::invalid_input(format!("invalid block value '{v}'")))
            })
            .collect()
    };
    let sizes = parse(sizes)?;
    let starts = parse(starts)?;
    if sizes.len() != starts.len() {
        return Err(BwrError::invalid_input(format!(
            "{} block sizes but {} block starts",
            sizes.len(),
            starts.len()
        )));
    }
    Ok(starts.into_iter().zip(sizes).collect())
}

/// Read a BED file, skipping `#`, `track` and `browser` lines
pub fn read_bed(path: impl AsRef<Path>) -> Result<Vec<BedRecord>> {
    let mut records = Vec::new();
    for (idx, line) in open_text(path)?.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim_end();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("track")
            || trimmed.starts_with("browser")
        {
            continue;
        }
        records.push(BedRecord::parse_line(trimmed, idx + 1)?);
    }
    Ok(records)
}

/// Per-transcript annotation joined onto BED names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptInfo {
    pub gene_id: String,
    pub transcript_biotype: String,
    /// Biotype used to filter neighbours; falls back to the transcript biotype
    pub gene_biotype: String,
}

/// Nearest neighbour on each side of a transcript
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbours {
    pub transcript_id: String,
    pub gene_id: String,
    pub biotype: String,
    pub upstream: Option<(String, u64)>,
    pub downstream: Option<(String, u64)>,
}

/// Gap between two intervals, zero when they overlap or touch
pub fn interval_distance(a: &BedRecord, b: &BedRecord) -> u64 {
    let left = a.start.saturating_sub(b.end);
    let right = b.start.saturating_sub(a.end);
    left.max(right)
}

/// Find, for every transcript of a position-sorted BED, the closest transcript
/// of another gene on each side.
///
/// Only transcripts on the same chromosome are considered. When
/// `neighbour_biotype` is set, candidates must carry that gene biotype. For
/// transcripts on the `-` strand upstream and downstream are swapped.
pub fn nearest_transcripts(
    beds: &[BedRecord],
    info: &HashMap<String, TranscriptInfo>,
    neighbour_biotype: Option<&str>,
) -> Vec<Neighbours> {
    let resolve = |bed: &BedRecord| -> TranscriptInfo {
        info.get(bed.name()).cloned().unwrap_or_else(|| TranscriptInfo {
            gene_id: bed.name().to_string(),
            transcript_biotype: String::new(),
            gene_biotype: String::new(),
        })
    };
    let resolved: Vec<TranscriptInfo> = beds.iter().map(resolve).collect();

    let is_candidate = |idx: usize, current: usize| -> bool {
        beds[idx].chrom == beds[current].chrom
            && resolved[idx].gene_id != resolved[current].gene_id
            && neighbour_biotype.map_or(true, |bt| resolved[idx].gene_biotype == bt)
    };

    (0..beds.len())
        .map(|current| {
            let bed = &beds[current];
            let up_idx = (0..current).rev().find(|&idx| is_candidate(idx, current));
            let down_idx = (current + 1..beds.len()).find(|&idx| is_candidate(idx, current));
            let describe = |idx: Option<usize>| {
                idx.map(|i| {
                    (resolved[i].gene_id.clone(), interval_distance(bed, &beds[i]))
                })
            };
            let (mut upstream, mut downstream) = (describe(up_idx), describe(down_idx));
            if bed.strand.is_reverse() {
                std::mem::swap(&mut upstream, &mut downstream);
            }
            Neighbours {
                transcript_id: bed.name().to_string(),
                gene_id: resolved[current].gene_id.clone(),
                biotype: resolved[current].transcript_biotype.clone(),
                upstream,
                downstream,
            }
        })
        .collect()
}

/// Reduce transcript-level neighbours to genes, keeping the closest
/// neighbour on each side. Genes come out sorted by id.
pub fn nearest_genes(transcripts: &[Neighbours]) -> Vec<Neighbours> {
    fn closer(current: &Option<(String, u64)>, candidate: &Option<(String, u64)>) -> bool {
        match (current, candidate) {
            (None, Some(_)) => true,
            (Some((_, a)), Some((_, b))) => b < a,
            _ => false,
        }
    }

    let mut genes: BTreeMap<&str, Neighbours> = BTreeMap::new();
    for tr in transcripts {
        match genes.entry(tr.gene_id.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(tr.clone());
            },
            Entry::Occupied(mut slot) => {
                let gene = slot.get_mut();
                if closer(&gene.upstream, &tr.upstream) {
                    gene.upstream = tr.upstream.clone();
                }
                if closer(&gene.downstream, &tr.downstream) {
                    gene.downstream = tr.downstream.clone();
                }
            },
        }
    }
    genes.into_values().collect()
}

/// Render an optional neighbour as `(gene, distance)` columns, `None`/`inf` when absent
pub fn neighbour_columns(side: &Option<(String, u64)>) -> (String, String) {
    match side {
        Some((gene, dist)) => (gene.clone(), dist.to_string()),
        None => ("None".to_string(), "inf".to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn bed(line: &str) -> BedRecord {
        BedRecord::parse_line(line, 1).unwrap()
    }

    fn info(entries: &[(&str, &str, &str)]) -> HashMap<String, TranscriptInfo> {
        entries
            .iter()
            .map(|(tr, gene, biotype)| {
                (
                    tr.to_string(),
                    TranscriptInfo {
                        gene_id: gene.to_string(),
                        transcript_biotype: biotype.to_string(),
                        gene_biotype: biotype.to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_parse_bed6() {
        let record = bed("chr1\t100\t250\tT1\t0\t-\textra");
        assert_eq!(record.length(), 150);
        assert_eq!(record.strand, Strand::Reverse);
        assert_eq!(record.extra, vec!["extra"]);
        assert_eq!(record.to_line(), "chr1\t100\t250\tT1\t0\t-\textra");
    }

    #[test]
    fn test_bed12_blocks() {
        let record = bed("chr1\t100\t500\tT1\t0\t+\t100\t500\t0\t2\t50,100,\t0,300,");
        assert_eq!(record.blocks().unwrap().unwrap(), vec![(100, 150), (400, 500)]);
        assert!(bed("chr1\t1\t2").blocks().is_none());
    }

    #[test]
    fn test_interval_distance() {
        let a = BedRecord::new("c", 100, 200);
        assert_eq!(interval_distance(&a, &BedRecord::new("c", 250, 300)), 50);
        assert_eq!(interval_distance(&a, &BedRecord::new("c", 10, 40)), 60);
        assert_eq!(interval_distance(&a, &BedRecord::new("c", 150, 400)), 0);
    }

    #[test]
    fn test_nearest_transcripts_skips_same_gene_and_other_chrom() {
        let beds = vec![
            bed("chr1\t0\t100\tA1\t0\t+"),
            bed("chr1\t150\t300\tB1\t0\t+"),
            bed("chr1\t200\t320\tB2\t0\t-"),
            bed("chr1\t500\t600\tC1\t0\t+"),
            bed("chr2\t0\t50\tD1\t0\t+"),
        ];
        let info = info(&[
            ("A1", "A", "protein_coding"),
            ("B1", "B", "lncRNA"),
            ("B2", "B", "lncRNA"),
            ("C1", "C", "protein_coding"),
            ("D1", "D", "protein_coding"),
        ]);

        let result = nearest_transcripts(&beds, &info, None);
        assert_eq!(result[1].upstream, Some(("A".to_string(), 50)));
        assert_eq!(result[1].downstream, Some(("C".to_string(), 200)));
        // minus strand swaps sides
        assert_eq!(result[2].upstream, Some(("C".to_string(), 180)));
        assert_eq!(result[2].downstream, Some(("A".to_string(), 100)));
        assert_eq!(result[4].upstream, None);
        assert_eq!(result[4].downstream, None);

        let coding_only = nearest_transcripts(&beds, &info, Some("protein_coding"));
        assert_eq!(coding_only[0].downstream, Some(("C".to_string(), 400)));

        let genes = nearest_genes(&result);
        let b = genes.iter().find(|g| g.gene_id == "B").unwrap();
        assert_eq!(b.upstream, Some(("A".to_string(), 50)));
        assert_eq!(b.downstream, Some(("A".to_string(), 100)));
        assert_eq!(neighbour_columns(&None), ("None".to_string(), "inf".to_string()));
    }
}
