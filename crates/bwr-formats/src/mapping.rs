//! Aligner log summaries (`samtools stats`, STAR `Log.final.out`)

use crate::io::open_text;
use bwr_common::{BwrError, Result};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// Mapping summary of one sample from `samtools stats`
#[derive(Debug, Clone, PartialEq)]
pub struct SamtoolsSummary {
    pub mapped_reads: u64,
    pub mapping_rate: f64,
    pub average_depth: f64,
    /// Fraction of mapped bases at depth 4 or more
    pub coverage_4x: f64,
}

pub const SAMTOOLS_HEADER: [&str; 5] = [
    "Sample_ID",
    "Mapped_Reads",
    "Mapping_Rate",
    "Average_Depth",
    "Coverage_4X",
];

/// Fields of `label` lines with any trailing `# comment` column removed
fn section_lines<R: BufRead>(reader: R, label: &str) -> Result<Vec<Vec<String>>> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.starts_with(label) || line.get(label.len()..label.len() + 1) != Some("\t") {
            continue;
        }
        let mut fields: Vec<String> = line.split('\t').map(str::to_string).collect();
        if line.contains('#') {
            fields.pop();
        }
        lines.push(fields);
    }
    Ok(lines)
}

/// Total genome length from a FASTA index (`.fai`, second column)
pub fn genome_length(fai: impl AsRef<Path>) -> Result<u64> {
    let mut total = 0;
    for (idx, line) in open_text(fai)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let len = line
            .split('\t')
            .nth(1)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| BwrError::parse(idx + 1, "FASTA index needs a numeric length column"))?;
        total += len;
    }
    Ok(total)
}

/// Summarise a `samtools stats` report against the genome length
pub fn samtools_summary(stats: &str, genome_length: u64) -> Result<SamtoolsSummary> {
    let sn: HashMap<String, String> = section_lines(stats.as_bytes(), "SN")?
        .into_iter()
        .filter(|f| f.len() >= 3)
        .map(|f| (f[1].clone(), f[2].clone()))
        .collect();
    let number = |key: &str| -> Result<f64> {
        sn.get(key)
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| BwrError::invalid_input(format!("samtools stats has no '{key}' value")))
    };
    let mapped = number("reads mapped:")?;
    let total = number("raw total sequences:")?;
    let mapped_bases = number("bases mapped (cigar):")?;

    let mut low_cov_bases = 0.0;
    for fields in section_lines(stats.as_bytes(), "COV")? {
        if fields.len() < 4 {
            continue;
        }
        let (Ok(depth), Ok(count)) = (fields[2].parse::<f64>(), fields[3].parse::<f64>()) else {
            continue;
        };
        if depth < 4.0 {
            low_cov_bases += depth * count;
        }
    }

    Ok(SamtoolsSummary {
        mapped_reads: mapped as u64,
        mapping_rate: if total > 0.0 { mapped / total } else { f64::NAN },
        average_depth: mapped_bases / genome_length as f64,
        coverage_4x: if mapped_bases > 0.0 {
            1.0 - low_cov_bases / mapped_bases
        } else {
            f64::NAN
        },
    })
}

/// STAR unique/multi mapping counts and rates for one sample
#[derive(Debug, Clone, PartialEq)]
pub struct StarSummary {
    pub unique_mapped: u64,
    pub multi_mapped: u64,
    /// Percentages as reported by STAR
    pub unique_rate: f64,
    pub multi_rate: f64,
}

impl StarSummary {
    pub fn total_mapped(&self) -> u64 {
        self.unique_mapped + self.multi_mapped
    }

    pub fn total_rate(&self) -> f64 {
        self.unique_rate + self.multi_rate
    }
}

pub const STAR_HEADER: [&str; 7] = [
    "Sample",
    "unique_mapped",
    "multi_mapped",
    "unique_mapped_rate",
    "multi_mapped_rate",
    "total_mapped_reads",
    "total_mapped_rate",
];

/// Parse the `name | value` lines of a STAR `Log.final.out`
pub fn star_summary(log: &str) -> Result<StarSummary> {
    let values: HashMap<&str, &str> = log
        .lines()
        .filter_map(|line| line.split_once('|'))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();
    let get = |key: &str| -> Result<&str> {
        values
            .get(key)
            .copied()
            .ok_or_else(|| BwrError::invalid_input(format!("STAR log has no '{key}' line")))
    };
    let count = |key: &str| -> Result<u64> {
        get(key)?
            .parse()
            .map_err(|_| BwrError::invalid_input(format!("STAR log value for '{key}' is not a count")))
    };
    let percent = |key: &str| -> Result<f64> {
        get(key)?
            .trim_end_matches('%')
            .parse()
            .map_err(|_| BwrError::invalid_input(format!("STAR log value for '{key}' is not a percentage")))
    };

    Ok(StarSummary {
        unique_mapped: count("Uniquely mapped reads number")?,
        multi_mapped: count("Number of reads mapped to multiple loci")?,
        unique_rate: percent("Uniquely mapped reads %")?,
        multi_rate: percent("% of reads mapped to multiple loci")?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const STATS: &str = "# This file was produced by samtools stats\n\
SN\traw total sequences:\t1000\n\
SN\treads mapped:\t900\t# paired\n\
SN\tbases mapped (cigar):\t20000\t# more accurate\n\
COV\t[1-1]\t1\t1000\n\
COV\t[2-2]\t2\t500\n\
COV\t[4-4]\t4\t2000\n\
COVERAGE\tignored\t9\t9\n";

    const STAR_LOG: &str = "                                 Started job on |\tMay 01 10:00:00\n\
                          Number of input reads |\t1000\n\
                   Uniquely mapped reads number |\t800\n\
                        Uniquely mapped reads % |\t80.00%\n\
        Number of reads mapped to multiple loci |\t50\n\
             % of reads mapped to multiple loci |\t5.00%\n";

    #[test]
    fn test_samtools_summary() {
        let summary = samtools_summary(STATS, 10000).unwrap();
        assert_eq!(summary.mapped_reads, 900);
        assert!((summary.mapping_rate - 0.9).abs() < 1e-12);
        assert!((summary.average_depth - 2.0).abs() < 1e-12);
        assert!((summary.coverage_4x - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_samtools_summary_missing_field() {
        let err = samtools_summary("SN\treads mapped:\t1\n", 10).unwrap_err();
        assert!(err.to_string().contains("raw total sequences"));
    }

    #[test]
    fn test_genome_length_from_fai() {
        let dir = tempfile::tempdir().unwrap();
        let fai = dir.path().join("genome.fa.fai");
        std::fs::write(&fai, "chr1\t1000\t6\t60\t61\nchr2\t500\t1100\t60\t61\n").unwrap();
        assert_eq!(genome_length(&fai).unwrap(), 1500);
    }

    #[test]
    fn test_star_summary() {
        let summary = star_summary(STAR_LOG).unwrap();
        assert_eq!(summary.total_mapped(), 850);
        assert!((summary.total_rate() - 85.0).abs() < 1e-9);
    }
}
