//! BLAT PSL alignments and their conversion to GTF

use crate::bed::parse_blocks;
use crate::gff::{AttributeStyle, Attributes, GffRecord};
use crate::io::{create_text, open_text};
use bwr_common::{BwrError, Result, Strand};
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// One PSL alignment; only the columns used downstream are kept
#[derive(Debug, Clone, PartialEq)]
pub struct PslHit {
    pub matches: u64,
    pub strand: Strand,
    pub q_name: String,
    pub q_size: u64,
    pub t_name: String,
    pub t_size: u64,
    /// Translated hit whose target strand is `-`; its `tStarts` count from the target's end
    pub target_reversed: bool,
    pub t_start: u64,
    pub t_end: u64,
    pub block_sizes: String,
    pub t_starts: String,
}

impl PslHit {
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 21 {
            return Err(BwrError::parse(
                line_no,
                format!("PSL needs 21 columns, found {}", fields.len()),
            ));
        }
        let num = |idx: usize| -> Result<u64> {
            fields[idx].trim().parse().map_err(|_| {
                BwrError::parse(line_no, format!("invalid number '{}' in column {}", fields[idx], idx + 1))
            })
        };
        // translated searches carry two strands, the last one is the target's
        let strand_field = fields[8].trim();
        let strand = match strand_field.chars().last() {
            Some('-') => Strand::Reverse,
            Some('+') => Strand::Forward,
            _ => Strand::Unknown,
        };

        Ok(Self {
            matches: num(0)?,
            strand,
            q_name: fields[9].to_string(),
            q_size: num(10)?,
            t_name: fields[13].to_string(),
            t_size: num(14)?,
            target_reversed: strand_field.len() == 2 && strand_field.ends_with('-'),
            t_start: num(15)?,
            t_end: num(16)?,
            block_sizes: fields[18].to_string(),
            t_starts: fields[20].to_string(),
        })
    }

    /// Fraction of the query covered by matches, rounded to 3 decimals
    pub fn coverage(&self) -> f64 {
        if self.q_size == 0 {
            return 0.0;
        }
        (self.matches as f64 / self.q_size as f64 * 1000.0).round() / 1000.0
    }

    /// Alignment blocks as `(start, size)` on the forward target strand,
    /// in ascending order
    pub fn target_blocks(&self) -> Result<Vec<(u64, u64)>> {
        let mut blocks = parse_blocks(&self.block_sizes, &self.t_starts)?;
        if self.target_reversed {
            for (start, size) in blocks.iter_mut() {
                *start = self.t_size.checked_sub(*start + *size).ok_or_else(|| {
                    BwrError::invalid_input(format!(
                        "{}: block beyond target size {}",
                        self.q_name, self.t_size
                    ))
                })?;
            }
            blocks.sort_unstable();
        }
        Ok(blocks)
    }

    /// `transcript` line plus one `exon` per alignment block.
    ///
    /// Blocks of plain `+`/`-` hits are already forward coordinates; translated
    /// hits on the reverse target strand are mapped back first.
    pub fn to_gtf(&self) -> Result<Vec<GffRecord>> {
        let mut attributes = Attributes::new();
        attributes.insert("transcript_id", self.q_name.as_str());
        attributes.insert("coverage", format_coverage(self.coverage()));

        let line = |feature: &str, start: u64, end: u64| GffRecord {
            seqid: self.t_name.clone(),
            source: "bed2gtf".to_string(),
            feature: feature.to_string(),
            start,
            end,
            score: ".".to_string(),
            strand: self.strand,
            frame: ".".to_string(),
            attributes: attributes.clone(),
        };

        let mut records = vec![line("transcript", self.t_start + 1, self.t_end)];
        for (start, size) in self.target_blocks()? {
            records.push(line("exon", start + 1, start + size));
        }
        Ok(records)
    }
}

fn format_coverage(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Read PSL alignments, skipping the `psLayout` header and exact duplicate lines
pub fn read_psl<R: BufRead>(reader: R) -> Result<Vec<PslHit>> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let first = line.split('\t').next().unwrap_or_default().trim();
        if first.is_empty() || first.parse::<u64>().is_err() {
            continue;
        }
        if seen.insert(line.clone()) {
            hits.push(PslHit::parse_line(&line, idx + 1)?);
        }
    }
    Ok(hits)
}

pub fn read_psl_file(path: impl AsRef<Path>) -> Result<Vec<PslHit>> {
    read_psl(open_text(path)?)
}

/// The hit with the most matches for every query; ties keep the first
pub fn best_hits(hits: &[PslHit]) -> Vec<PslHit> {
    let mut best: HashMap<&str, &PslHit> = HashMap::new();
    for hit in hits {
        best.entry(hit.q_name.as_str())
            .and_modify(|current| {
                if hit.matches > current.matches {
                    *current = hit;
                }
            })
            .or_insert(hit);
    }
    best.into_values().cloned().collect()
}

/// Sort by query then matches, and split at `coverage > cutoff`
pub fn partition_by_coverage(mut hits: Vec<PslHit>, cutoff: f64) -> (Vec<PslHit>, Vec<PslHit>) {
    hits.sort_by(|a, b| a.q_name.cmp(&b.q_name).then(a.matches.cmp(&b.matches)));
    hits.into_iter().partition(|hit| hit.coverage() > cutoff)
}

/// Write `<prefix>.<name>.cutoff_<c>.{passed,failed}.gtf`, skipping empty sets.
/// Returns the files written.
pub fn write_gtf_sets(
    hits: Vec<PslHit>,
    prefix: &str,
    name: &str,
    cutoff: f64,
) -> Result<Vec<PathBuf>> {
    let (passed, failed) = partition_by_coverage(hits, cutoff);
    let mut written = Vec::new();
    for (label, set) in [("passed", passed), ("failed", failed)] {
        if set.is_empty() {
            continue;
        }
        let path = PathBuf::from(format!("{prefix}.{name}.cutoff_{cutoff}.{label}.gtf"));
        let mut out = create_text(&path)?;
        for hit in &set {
            for record in hit.to_gtf()? {
                writeln!(out, "{}", record.to_line(AttributeStyle::Gtf))?;
            }
        }
        out.flush()?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "psLayout version 3\n\nmatch\tmis-\trep.\n     \tmatch\tmatch\n---------------------------------\n";

    fn psl_line(matches: u64, strand: &str, q: &str, q_size: u64) -> String {
        format!(
            "{matches}\t0\t0\t0\t0\t0\t1\t100\t{strand}\t{q}\t{q_size}\t0\t{q_size}\tchr1\t10000\t1000\t1300\t2\t100,100,\t0,100,\t1000,1200,"
        )
    }

    fn sample() -> String {
        format!(
            "{HEADER}{}\n{}\n{}\n{}\n",
            psl_line(190, "+", "q1", 200),
            psl_line(120, "-", "q1", 200),
            psl_line(120, "-", "q1", 200),
            psl_line(50, "-", "q2", 200),
        )
    }

    #[test]
    fn test_read_skips_header_and_duplicates() {
        let hits = read_psl(Cursor::new(sample())).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].coverage(), 0.95);
    }

    #[test]
    fn test_best_hits_and_partition() {
        let hits = read_psl(Cursor::new(sample())).unwrap();
        let best = best_hits(&hits);
        assert_eq!(best.len(), 2);
        let q1 = best.iter().find(|h| h.q_name == "q1").unwrap();
        assert_eq!(q1.matches, 190);

        let (passed, failed) = partition_by_coverage(hits, 0.8);
        assert_eq!(passed.len(), 1);
        assert_eq!(failed.iter().map(|h| h.matches).collect::<Vec<_>>(), vec![120, 50]);
    }

    #[test]
    fn test_minus_strand_blocks_use_forward_coordinates() {
        let hit = PslHit::parse_line(&psl_line(120, "-", "q1", 200), 1).unwrap();
        let lines: Vec<String> = hit
            .to_gtf()
            .unwrap()
            .iter()
            .map(|r| r.to_line(AttributeStyle::Gtf))
            .collect();
        assert_eq!(
            lines[0],
            "chr1\tbed2gtf\ttranscript\t1001\t1300\t.\t-\t.\ttranscript_id \"q1\"; coverage \"0.6\";"
        );
        assert!(lines[1].starts_with("chr1\tbed2gtf\texon\t1001\t1100\t.\t-"));
        assert!(lines[2].starts_with("chr1\tbed2gtf\texon\t1201\t1300\t.\t-"));
    }

    #[test]
    fn test_translated_reverse_target_blocks() {
        // tSize 10000, blocks at 8700 and 8900 from the target's end
        let line = "120\t0\t0\t0\t0\t0\t1\t100\t+-\tp1\t200\t0\t200\tchr1\t10000\t1000\t1300\t2\t100,100,\t0,100,\t8700,8900,";
        let hit = PslHit::parse_line(line, 1).unwrap();
        assert!(hit.target_reversed);
        assert_eq!(hit.strand, Strand::Reverse);
        assert_eq!(hit.target_blocks().unwrap(), vec![(1000, 100), (1200, 100)]);

        let exons: Vec<(u64, u64)> = hit.to_gtf().unwrap()[1..].iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(exons, vec![(1001, 1100), (1201, 1300)]);

        let forward = PslHit::parse_line(&line.replace("+-", "-+"), 1).unwrap();
        assert!(!forward.target_reversed);
        assert_eq!(forward.target_blocks().unwrap(), vec![(8700, 100), (8900, 100)]);
    }

    #[test]
    fn test_write_gtf_sets_names_files() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("query").to_string_lossy().into_owned();
        let hits = read_psl(Cursor::new(sample())).unwrap();
        let written = write_gtf_sets(hits, &prefix, "all", 0.8).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].to_string_lossy().ends_with("query.all.cutoff_0.8.passed.gtf"));
        let text = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
