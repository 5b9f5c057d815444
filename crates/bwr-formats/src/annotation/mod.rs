//! Gene-level summaries and rewrites over GTF/GFF annotations

mod merge_feature;
mod rewrite;

pub use merge_feature::{merge_feature_gff, MergeBy, MergeOptions, MergedAnnotation, RenameRule};
pub use rewrite::{shift_contigs, split_by_intervals};

use crate::bed::BedRecord;
use crate::gff::GffRecord;
use crate::table::Table;
use bwr_common::{Result, Strand};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// Collapse detailed GENCODE/Ensembl biotypes into broad categories
pub fn biotype_category(biotype: &str) -> &str {
    match biotype {
        "protein_coding" | "nonsense_mediated_decay" | "non_stop_decay" | "polymorphic_pseudogene"
        | "IG_C_gene" | "IG_D_gene" | "IG_J_gene" | "IG_V_gene" | "TR_C_gene" | "TR_D_gene"
        | "TR_J_gene" | "TR_V_gene" => "protein_coding",
        "lincRNA" | "lncRNA" | "antisense" | "antisense_RNA" | "sense_intronic"
        | "sense_overlapping" | "3prime_overlapping_ncRNA" | "3prime_overlapping_ncrna"
        | "processed_transcript" | "bidirectional_promoter_lncRNA" | "macro_lncRNA"
        | "non_coding" | "known_ncrna" | "retained_intron" => "lncRNA",
        "miRNA" | "misc_RNA" | "rRNA" | "snRNA" | "snoRNA" | "scaRNA" | "scRNA" | "sRNA"
        | "tRNA" | "vaultRNA" | "ribozyme" | "Mt_rRNA" | "Mt_tRNA" | "pre_miRNA"
        | "SRP_RNA" | "RNase_MRP_RNA" | "RNase_P_RNA" => "sncRNA",
        other if other.ends_with("pseudogene") => "pseudogene",
        "TEC" => "TEC",
        other => other,
    }
}

fn gene_biotype(record: &GffRecord) -> &str {
    record
        .attr("gene_biotype")
        .or_else(|| record.attr("gene_type"))
        .unwrap_or("")
}

fn transcript_biotype(record: &GffRecord) -> &str {
    record
        .attr("transcript_biotype")
        .or_else(|| record.attr("transcript_type"))
        .unwrap_or("")
}

/// Gene length as the median of its transcripts' summed exon lengths,
/// keyed and sorted by gene id
pub fn gene_lengths(records: &[GffRecord]) -> BTreeMap<String, f64> {
    let mut tr_len: HashMap<&str, u64> = HashMap::new();
    let mut tr_gene: HashMap<&str, &str> = HashMap::new();
    for exon in records.iter().filter(|r| r.feature == "exon") {
        let (Some(tr), Some(gene)) = (exon.transcript_id(), exon.gene_id()) else {
            continue;
        };
        *tr_len.entry(tr).or_default() += exon.length();
        tr_gene.entry(tr).or_insert(gene);
    }

    let mut by_gene: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for (tr, len) in tr_len {
        if let Some(gene) = tr_gene.get(tr) {
            by_gene.entry(gene.to_string()).or_default().push(len);
        }
    }

    by_gene
        .into_iter()
        .map(|(gene, mut lens)| {
            lens.sort_unstable();
            (gene, median(&lens))
        })
        .collect()
}

fn median(sorted: &[u64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    }
}

/// One BED6 line per gene spanning all of its features, sorted by gene id.
///
/// Start is written as found in the annotation unless `zero_based` is set.
pub fn gene_bed(records: &[GffRecord], zero_based: bool) -> Vec<BedRecord> {
    let mut genes: BTreeMap<&str, (String, u64, u64, Strand)> = BTreeMap::new();
    for record in records {
        let Some(gene) = record.gene_id() else {
            continue;
        };
        genes
            .entry(gene)
            .and_modify(|(_, start, end, _)| {
                *start = (*start).min(record.start);
                *end = (*end).max(record.end);
            })
            .or_insert_with(|| (record.seqid.clone(), record.start, record.end, record.strand));
    }

    genes
        .into_iter()
        .map(|(gene, (chrom, start, end, strand))| {
            let start = if zero_based { start.saturating_sub(1) } else { start };
            let mut bed = BedRecord::new(chrom, start, end);
            bed.name = Some(gene.to_string());
            bed.score = Some(".".to_string());
            bed.strand = strand;
            bed
        })
        .collect()
}

/// Gene and transcript biotype tables with categories applied
#[derive(Debug)]
pub struct BiotypeTables {
    pub genes: Table,
    pub transcripts: Table,
}

/// Unique `(gene_id, gene_biotype)` and `(transcript_id, transcript_biotype)`
/// pairs in first-seen order, biotypes mapped through [`biotype_category`]
pub fn biotype_tables(records: &[GffRecord]) -> BiotypeTables {
    let mut genes = Table::new(["gene_id", "gene_biotype"]);
    let mut transcripts = Table::new(["transcript_id", "transcript_biotype"]);
    let mut seen_genes = HashSet::new();
    let mut seen_trs = HashSet::new();

    for record in records {
        if let Some(gene) = record.gene_id() {
            let biotype = biotype_category(gene_biotype(record));
            if seen_genes.insert((gene, biotype)) {
                genes.push_row([gene, biotype]);
            }
        }
        if let Some(tr) = record.transcript_id() {
            let biotype = biotype_category(transcript_biotype(record));
            if seen_trs.insert((tr, biotype)) {
                transcripts.push_row([tr, biotype]);
            }
        }
    }

    BiotypeTables { genes, transcripts }
}

/// Reference genes per biotype category and how many an assembly recovered
#[derive(Debug, Clone, PartialEq)]
pub struct BiotypeCoverage {
    pub biotype: String,
    pub reference: usize,
    pub assembly: usize,
}

impl BiotypeCoverage {
    pub fn coverage(&self) -> f64 {
        self.assembly as f64 / self.reference as f64
    }
}

/// Compare reference gene biotypes against genes hit by an assembly.
///
/// `compare` is a gffcompare-style table with `category_relative` and
/// comma-separated `ref_gene_id` columns; only `exonic_overlap` rows count.
/// Rows are ordered by reference count, largest first.
pub fn assembly_coverage(records: &[GffRecord], compare: &Table) -> Result<Vec<BiotypeCoverage>> {
    let mut gene_types: HashMap<&str, &str> = HashMap::new();
    for gene in records.iter().filter(|r| r.feature == "gene") {
        if let Some(id) = gene.gene_id() {
            gene_types.entry(id).or_insert(biotype_category(gene_biotype(gene)));
        }
    }

    let category = compare.column_index("category_relative")?;
    let ref_genes = compare.column_index("ref_gene_id")?;
    let mut assembled: HashSet<&str> = HashSet::new();
    for row in 0..compare.len() {
        if compare.cell(row, category) != "exonic_overlap" {
            continue;
        }
        assembled.extend(compare.cell(row, ref_genes).split(',').filter(|g| !g.is_empty()));
    }

    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (&gene, &biotype) in &gene_types {
        counts.entry(biotype).or_default().0 += 1;
        if assembled.contains(gene) {
            counts.entry(biotype).or_default().1 += 1;
        }
    }
    let unknown = assembled.iter().filter(|g| !gene_types.contains_key(*g)).count();
    if unknown > 0 {
        warn!(count = unknown, "Assembled reference genes missing from the annotation");
    }

    let mut rows: Vec<BiotypeCoverage> = counts
        .into_iter()
        .map(|(biotype, (reference, assembly))| BiotypeCoverage {
            biotype: biotype.to_string(),
            reference,
            assembly,
        })
        .collect();
    rows.sort_by(|a, b| b.reference.cmp(&a.reference).then_with(|| a.biotype.cmp(&b.biotype)));
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn gtf(lines: &[&str]) -> Vec<GffRecord> {
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| GffRecord::parse_line(l, i + 1).unwrap())
            .collect()
    }

    fn sample() -> Vec<GffRecord> {
        gtf(&[
            "1\tE\tgene\t100\t1000\t.\t+\t.\tgene_id \"G1\"; gene_biotype \"protein_coding\";",
            "1\tE\texon\t100\t199\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\"; gene_biotype \"protein_coding\"; transcript_biotype \"protein_coding\";",
            "1\tE\texon\t300\t399\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\"; gene_biotype \"protein_coding\"; transcript_biotype \"protein_coding\";",
            "1\tE\texon\t150\t199\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T2\"; gene_biotype \"protein_coding\"; transcript_biotype \"retained_intron\";",
            "2\tE\tgene\t50\t80\t.\t-\t.\tgene_id \"G2\"; gene_biotype \"lincRNA\";",
            "2\tE\texon\t50\t80\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T3\"; gene_biotype \"lincRNA\"; transcript_biotype \"lincRNA\";",
        ])
    }

    #[test]
    fn test_gene_lengths_use_median() {
        let lengths = gene_lengths(&sample());
        assert_eq!(lengths["G1"], 125.0);
        assert_eq!(lengths["G2"], 31.0);
    }

    #[test]
    fn test_gene_bed_spans_features() {
        let beds = gene_bed(&sample(), false);
        assert_eq!(beds[0].to_line(), "1\t100\t1000\tG1\t.\t+");
        assert_eq!(beds[1].to_line(), "2\t50\t80\tG2\t.\t-");
        assert_eq!(gene_bed(&sample(), true)[0].start, 99);
    }

    #[test]
    fn test_biotype_tables_map_categories() {
        let tables = biotype_tables(&sample());
        assert_eq!(tables.genes.rows, vec![vec!["G1", "protein_coding"], vec!["G2", "lncRNA"]]);
        assert_eq!(tables.transcripts.rows[1], vec!["T2", "lncRNA"]);
        assert_eq!(biotype_category("unprocessed_pseudogene"), "pseudogene");
        assert_eq!(biotype_category("novel_thing"), "novel_thing");
    }

    #[test]
    fn test_assembly_coverage() {
        let compare = Table::from_reader(
            Cursor::new(
                "ref_gene_id\tcategory_relative\nG1,G9\texonic_overlap\nG2\tintronic\n",
            ),
            true,
        )
        .unwrap();
        let rows = assembly_coverage(&sample(), &compare).unwrap();
        let coding = rows.iter().find(|r| r.biotype == "protein_coding").unwrap();
        assert_eq!((coding.reference, coding.assembly), (1, 1));
        let lnc = rows.iter().find(|r| r.biotype == "lncRNA").unwrap();
        assert_eq!(lnc.assembly, 0);
        assert_eq!(lnc.coverage(), 0.0);
    }
}
