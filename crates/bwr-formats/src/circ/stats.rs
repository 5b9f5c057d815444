//! Per-biotype circRNA summaries

use super::AnnotatedCirc;
use crate::io::fmt_float;
use bwr_common::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Write;

pub const TOTAL: &str = "Total";

pub const STATS_HEADER: [&str; 8] = [
    "Category",
    "number",
    "exonCount",
    "length",
    "flankIntronSizeUP",
    "flankIntronSizeDOWN",
    "hostGene",
    "readNumber",
];

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStats {
    pub category: String,
    pub number: usize,
    pub mean_exon_count: f64,
    pub mean_length: f64,
    pub mean_flank_up: f64,
    pub mean_flank_down: f64,
    pub host_genes: usize,
    /// Summed over every sample, not only distinct circRNAs
    pub reads: u64,
}

impl CategoryStats {
    fn empty(category: &str) -> Self {
        Self {
            category: category.to_string(),
            number: 0,
            mean_exon_count: 0.0,
            mean_length: 0.0,
            mean_flank_up: 0.0,
            mean_flank_down: 0.0,
            host_genes: 0,
            reads: 0,
        }
    }

    fn values(&self) -> [f64; 7] {
        [
            self.number as f64,
            self.mean_exon_count,
            self.mean_length,
            self.mean_flank_up,
            self.mean_flank_down,
            self.host_genes as f64,
            self.reads as f64,
        ]
    }
}

fn mean(values: impl Iterator<Item = Option<f64>>) -> f64 {
    let (sum, n) = values.flatten().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

fn category_stats(category: &str, distinct: &[&AnnotatedCirc], reads: u64) -> CategoryStats {
    CategoryStats {
        category: category.to_string(),
        number: distinct.len(),
        mean_exon_count: mean(distinct.iter().map(|c| Some(f64::from(c.record.exon_count)))),
        mean_length: mean(distinct.iter().map(|c| Some(c.length as f64))),
        mean_flank_up: mean(distinct.iter().map(|c| c.flank_up.map(|v| v as f64))),
        mean_flank_down: mean(distinct.iter().map(|c| c.flank_down.map(|v| v as f64))),
        host_genes: distinct
            .iter()
            .map(|c| c.record.gene_name.as_str())
            .collect::<HashSet<_>>()
            .len(),
        reads,
    }
}

/// `Total` followed by one row per transcript biotype (sorted).
///
/// Counts and means are taken over distinct circRNAs (the same junction in
/// several samples counts once); read numbers are summed over all rows.
/// circRNAs without a biotype only count towards `Total`.
pub fn basic_stats(circs: &[AnnotatedCirc]) -> Vec<CategoryStats> {
    let mut seen = HashSet::new();
    let distinct: Vec<&AnnotatedCirc> = circs
        .iter()
        .filter(|c| {
            seen.insert((
                &c.record.chrom,
                c.record.start,
                c.record.end,
                &c.record.circ_type,
                &c.record.exon_sizes,
                c.record.exon_count,
                &c.biotype,
                &c.record.gene_name,
                c.flank_up,
                c.flank_down,
            ))
        })
        .collect();

    let mut by_biotype: BTreeMap<&str, Vec<&AnnotatedCirc>> = BTreeMap::new();
    for circ in &distinct {
        if let Some(biotype) = &circ.biotype {
            by_biotype.entry(biotype).or_default().push(circ);
        }
    }
    let mut reads: HashMap<&str, u64> = HashMap::new();
    for circ in circs {
        if let Some(biotype) = &circ.biotype {
            *reads.entry(biotype).or_default() += circ.record.read_number;
        }
    }

    let total_reads = circs.iter().map(|c| c.record.read_number).sum();
    let mut stats = vec![category_stats(TOTAL, &distinct, total_reads)];
    for (biotype, group) in by_biotype {
        let group_reads = reads.get(biotype).copied().unwrap_or_default();
        stats.push(category_stats(biotype, &group, group_reads));
    }
    stats
}

/// Write the summary table with two decimals and `None` for missing means
pub fn write_stats<W: Write>(out: &mut W, stats: &[CategoryStats]) -> Result<()> {
    writeln!(out, "{}", STATS_HEADER.join("\t"))?;
    for row in stats {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.category,
            row.number,
            fmt_float(row.mean_exon_count, 2, "None"),
            fmt_float(row.mean_length, 2, "None"),
            fmt_float(row.mean_flank_up, 2, "None"),
            fmt_float(row.mean_flank_down, 2, "None"),
            row.host_genes,
            row.reads
        )?;
    }
    Ok(())
}

/// One sample's stats for one category, with its sequencing depth
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStats {
    pub sample_id: String,
    pub stats: CategoryStats,
    pub total_reads: Option<u64>,
}

impl SampleStats {
    /// Junction reads as a percentage of all reads of the sample
    pub fn read_portion(&self) -> f64 {
        match self.total_reads {
            Some(total) if total > 0 => self.stats.reads as f64 / total as f64 * 100.0,
            _ => f64::NAN,
        }
    }
}

/// [`basic_stats`] per sample. Every sample reports every category seen in
/// any sample; absent categories and missing means are zero.
pub fn sample_stats(circs: &[AnnotatedCirc], total_reads: &HashMap<String, u64>) -> Vec<SampleStats> {
    let mut by_sample: BTreeMap<&str, Vec<AnnotatedCirc>> = BTreeMap::new();
    for circ in circs {
        by_sample.entry(&circ.record.sample_id).or_default().push(circ.clone());
    }

    let per_sample: BTreeMap<&str, Vec<CategoryStats>> = by_sample
        .iter()
        .map(|(sample, circs)| (*sample, basic_stats(circs)))
        .collect();
    let categories: BTreeSet<String> = per_sample
        .values()
        .flatten()
        .map(|s| s.category.clone())
        .collect();

    let mut out = Vec::new();
    for (sample, stats) in per_sample {
        for category in &categories {
            let mut row = stats
                .iter()
                .find(|s| &s.category == category)
                .cloned()
                .unwrap_or_else(|| CategoryStats::empty(category));
            for value in [
                &mut row.mean_exon_count,
                &mut row.mean_length,
                &mut row.mean_flank_up,
                &mut row.mean_flank_down,
            ] {
                if value.is_nan() {
                    *value = 0.0;
                }
            }
            out.push(SampleStats {
                sample_id: sample.to_string(),
                stats: row,
                total_reads: total_reads.get(sample).copied(),
            });
        }
    }
    out
}

/// Headerless per-sample table led by the species, three decimals, zero
/// for anything missing
pub fn write_sample_stats<W: Write>(out: &mut W, species: &str, rows: &[SampleStats]) -> Result<()> {
    for row in rows {
        let mut cells = vec![
            species.to_string(),
            row.sample_id.clone(),
            row.stats.category.clone(),
        ];
        cells.extend(row.stats.values().iter().map(|v| fmt_float(*v, 3, "0")));
        cells.push(row.total_reads.unwrap_or_default().to_string());
        cells.push(fmt_float(row.read_portion(), 3, "0"));
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}
