//! Merge predicted CDS/UTR features into an assembled transcript annotation
//!
//! The raw annotation (typically StringTie output) supplies transcripts and
//! genes; the feature annotation (typically TransDecoder output) supplies
//! `mRNA`/`CDS`/`UTR` lines whose ids carry a `.pN` ORF suffix. ORF suffixes
//! are stripped so feature lines can be matched back to raw transcripts.

use crate::gff::{AttributeStyle, Attributes, GffRecord};
use bwr_common::{BwrError, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::LazyLock;
use tracing::debug;

#[allow(clippy::expect_used)]
static TR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\.p\d+$").expect("valid regex"));
#[allow(clippy::expect_used)]
static EXON_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\.p\d+(\.exon\w+)").expect("valid regex"));
#[allow(clippy::expect_used)]
static UTR5_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\.p\d+(\.utr5p\w+)").expect("valid regex"));
#[allow(clippy::expect_used)]
static UTR3_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\.p\d+(\.utr3p\w+)").expect("valid regex"));

/// Attributes used for bookkeeping and never written to GFF3 output
const INTERNAL_ATTRS: [&str; 4] = ["fixed", "tr_id", "gene_id", "geneID"];

/// Strip the ORF suffix from a feature id according to its type.
/// Ids that do not follow the expected shape are returned unchanged.
pub fn strip_orf_suffix(id: &str, feature: &str) -> String {
    let pattern = match feature {
        "mRNA" | "transcript" | "CDS" => &*TR_PATTERN,
        "exon" => &*EXON_PATTERN,
        "five_prime_UTR" => &*UTR5_PATTERN,
        "three_prime_UTR" => &*UTR3_PATTERN,
        _ => return id.to_string(),
    };
    match pattern.captures(id) {
        Some(caps) => caps
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .collect(),
        None => {
            debug!(id, feature, "Id has no ORF suffix, keeping it");
            id.to_string()
        },
    }
}

/// Rewrites `<old_prefix>.<n>` ids into `<new_prefix><n padded to 6>`
#[derive(Debug, Clone)]
pub struct RenameRule {
    pattern: Regex,
    new_prefix: String,
}

impl RenameRule {
    pub fn new(old_prefix: &str, new_prefix: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(&format!(r"^(.*){}\.(\d+)(.*)$", regex::escape(old_prefix)))
            .map_err(|e| BwrError::invalid_input(format!("invalid id prefix: {e}")))?;
        Ok(Self {
            pattern,
            new_prefix: new_prefix.into(),
        })
    }

    pub fn apply(&self, value: &str) -> String {
        match self.pattern.captures(value) {
            Some(caps) => format!(
                "{}{}{:0>6}{}",
                &caps[1], self.new_prefix, &caps[2], &caps[3]
            ),
            None => value.to_string(),
        }
    }
}

/// One output line with the transcript and gene it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct MergedFeature {
    pub record: GffRecord,
    pub gene_id: String,
    /// `None` for gene lines
    pub transcript_id: Option<String>,
}

#[derive(Debug, Clone)]
struct GeneEntry {
    feature: MergedFeature,
    /// Explicit gene lines keep their own extent
    fixed: bool,
}

#[derive(Debug, Default)]
struct AnnotationIndex {
    gene_order: Vec<String>,
    by_gene: HashMap<String, Vec<MergedFeature>>,
    tr_order: Vec<String>,
    by_tr: HashMap<String, Vec<MergedFeature>>,
    genes: HashMap<String, GeneEntry>,
    tr2gene: HashMap<String, String>,
}

impl AnnotationIndex {
    fn build(records: Vec<GffRecord>, fix_ids: bool) -> Result<Self> {
        let fix = |id: &str, feature: &str| {
            if fix_ids {
                strip_orf_suffix(id, feature)
            } else {
                id.to_string()
            }
        };

        let mut index = Self::default();
        for mut record in records {
            let location = format!("{}:{}-{}", record.seqid, record.start, record.end);

            if record.feature == "gene" {
                let gene_id = record
                    .attr("ID")
                    .ok_or_else(|| BwrError::invalid_input(format!("gene at {location} has no ID")))?
                    .to_string();
                index.genes.insert(
                    gene_id.clone(),
                    GeneEntry {
                        feature: MergedFeature {
                            record,
                            gene_id,
                            transcript_id: None,
                        },
                        fixed: true,
                    },
                );
                continue;
            }

            let parent = match record.attr("geneID").map(str::to_string) {
                Some(gene) => {
                    record.attributes.insert("Parent", gene.as_str());
                    gene
                },
                None => record
                    .attr("Parent")
                    .ok_or_else(|| {
                        BwrError::invalid_input(format!(
                            "{} at {location} has no Parent",
                            record.feature
                        ))
                    })?
                    .to_string(),
            };

            let (tr_id, gene_id) = if record.feature == "transcript" || record.feature == "mRNA" {
                let raw_id = record.attr("ID").ok_or_else(|| {
                    BwrError::invalid_input(format!("{} at {location} has no ID", record.feature))
                })?;
                let tr_id = fix(raw_id, &record.feature);
                record.attributes.insert("ID", tr_id.as_str());
                index.tr2gene.insert(tr_id.clone(), parent.clone());
                (tr_id, parent)
            } else {
                if let Some(id) = record.attr("ID") {
                    let fixed = fix(id, &record.feature);
                    record.attributes.insert("ID", fixed);
                }
                let tr_id = fix(&parent, "mRNA");
                record.attributes.insert("Parent", tr_id.as_str());
                let gene_id = index.tr2gene.get(&tr_id).cloned().ok_or_else(|| {
                    BwrError::invalid_input(format!(
                        "{} at {location} references unknown transcript {tr_id}",
                        record.feature
                    ))
                })?;
                (tr_id, gene_id)
            };

            let feature = MergedFeature {
                record,
                gene_id: gene_id.clone(),
                transcript_id: Some(tr_id.clone()),
            };
            index.extend_gene(&gene_id, &feature.record);

            if !index.by_gene.contains_key(&gene_id) {
                index.gene_order.push(gene_id.clone());
            }
            index.by_gene.entry(gene_id).or_default().push(feature.clone());
            if !index.by_tr.contains_key(&tr_id) {
                index.tr_order.push(tr_id.clone());
            }
            index.by_tr.entry(tr_id).or_default().push(feature);
        }
        Ok(index)
    }

    /// Create a gene line from the first child or widen an inferred one
    fn extend_gene(&mut self, gene_id: &str, child: &GffRecord) {
        match self.genes.get_mut(gene_id) {
            Some(entry) if !entry.fixed => {
                let gene = &mut entry.feature.record;
                gene.start = gene.start.min(child.start);
                gene.end = gene.end.max(child.end);
            },
            Some(_) => {},
            None => {
                let mut gene = child.clone();
                gene.feature = "gene".to_string();
                gene.attributes = Attributes::new();
                gene.attributes.insert("ID", gene_id);
                self.genes.insert(
                    gene_id.to_string(),
                    GeneEntry {
                        feature: MergedFeature {
                            record: gene,
                            gene_id: gene_id.to_string(),
                            transcript_id: None,
                        },
                        fixed: false,
                    },
                );
            },
        }
    }
}

/// Which unit feature lines replace raw lines by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeBy {
    /// Replace a raw transcript's lines when the feature file has that transcript
    #[default]
    Transcript,
    /// Replace a whole raw gene when the feature file has that gene
    Gene,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub by: MergeBy,
    /// Raw genes dropped in [`MergeBy::Gene`] mode when they have no features
    pub removed_genes: HashSet<String>,
}

/// Merged annotation ready to be written as GFF3 and GTF
#[derive(Debug, Clone)]
pub struct MergedAnnotation {
    pub features: Vec<MergedFeature>,
}

/// Merge feature lines into the raw annotation
pub fn merge_feature_gff(
    raw: Vec<GffRecord>,
    features: Vec<GffRecord>,
    options: &MergeOptions,
) -> Result<MergedAnnotation> {
    let mut raw = AnnotationIndex::build(raw, false)?;
    let mut feat = AnnotationIndex::build(features, true)?;
    let mut out = Vec::new();

    match options.by {
        MergeBy::Transcript => {
            for tr_id in &raw.tr_order {
                if let Some(gene) = raw.tr2gene.get(tr_id).and_then(|g| raw.genes.remove(g)) {
                    out.push(gene.feature);
                }
                let lines = feat
                    .by_tr
                    .remove(tr_id)
                    .or_else(|| raw.by_tr.remove(tr_id))
                    .unwrap_or_default();
                out.extend(lines);
            }
        },
        MergeBy::Gene => {
            for gene_id in &raw.gene_order {
                if let Some(gene) = feat.genes.remove(gene_id) {
                    out.push(gene.feature);
                    out.extend(feat.by_gene.remove(gene_id).unwrap_or_default());
                } else if !options.removed_genes.contains(gene_id) {
                    if let Some(gene) = raw.genes.remove(gene_id) {
                        out.push(gene.feature);
                    }
                    out.extend(raw.by_gene.remove(gene_id).unwrap_or_default());
                }
            }
        },
    }

    Ok(MergedAnnotation { features: out })
}

impl MergedAnnotation {
    fn rename(rule: Option<&RenameRule>, value: &str) -> String {
        rule.map_or_else(|| value.to_string(), |r| r.apply(value))
    }

    pub fn write_gff3<W: Write>(&self, out: &mut W, rename: Option<&RenameRule>) -> Result<()> {
        for feature in &self.features {
            let attrs: Attributes = feature
                .record
                .attributes
                .iter()
                .filter(|(k, _)| !INTERNAL_ATTRS.contains(k))
                .map(|(k, v)| (k.to_string(), Self::rename(rename, v)))
                .collect();
            writeln!(
                out,
                "{}\t{}",
                feature.record.columns(),
                attrs.render(AttributeStyle::Gff3)
            )?;
        }
        Ok(())
    }

    pub fn write_gtf<W: Write>(&self, out: &mut W, rename: Option<&RenameRule>) -> Result<()> {
        for feature in &self.features {
            let mut attrs = Attributes::new();
            attrs.insert("gene_id", Self::rename(rename, &feature.gene_id));
            if let Some(tr_id) = &feature.transcript_id {
                attrs.insert("transcript_id", Self::rename(rename, tr_id));
            }
            writeln!(
                out,
                "{}\t{}",
                feature.record.columns(),
                attrs.render(AttributeStyle::Gtf)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> Vec<GffRecord> {
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| GffRecord::parse_line(l, i + 1).unwrap())
            .collect()
    }

    fn raw() -> Vec<GffRecord> {
        parse(&[
            "c1\tStringTie\ttranscript\t100\t900\t.\t+\t.\tID=MSTRG.1.1;geneID=MSTRG.1",
            "c1\tStringTie\texon\t100\t300\t.\t+\t.\tParent=MSTRG.1.1",
            "c1\tStringTie\texon\t700\t900\t.\t+\t.\tParent=MSTRG.1.1",
            "c1\tStringTie\ttranscript\t2000\t2500\t.\t-\t.\tID=MSTRG.2.1;geneID=MSTRG.2",
            "c1\tStringTie\texon\t2000\t2500\t.\t-\t.\tParent=MSTRG.2.1",
        ])
    }

    fn orfs() -> Vec<GffRecord> {
        parse(&[
            "c1\ttransdecoder\tgene\t100\t900\t.\t+\t.\tID=MSTRG.1;Name=orf",
            "c1\ttransdecoder\tmRNA\t100\t900\t.\t+\t.\tID=MSTRG.1.1.p1;Parent=MSTRG.1",
            "c1\ttransdecoder\texon\t100\t300\t.\t+\t.\tID=MSTRG.1.1.p1.exon1;Parent=MSTRG.1.1.p1",
            "c1\ttransdecoder\tCDS\t150\t300\t.\t+\t0\tID=cds.MSTRG.1.1.p1;Parent=MSTRG.1.1.p1",
        ])
    }

    #[test]
    fn test_strip_orf_suffix() {
        assert_eq!(strip_orf_suffix("MSTRG.1.1.p1", "mRNA"), "MSTRG.1.1");
        assert_eq!(strip_orf_suffix("MSTRG.1.1.p2.exon3", "exon"), "MSTRG.1.1.exon3");
        assert_eq!(strip_orf_suffix("MSTRG.1.1.p1.utr5p1", "five_prime_UTR"), "MSTRG.1.1.utr5p1");
        assert_eq!(strip_orf_suffix("plain", "mRNA"), "plain");
        assert_eq!(strip_orf_suffix("MSTRG.1.1.p1", "intron"), "MSTRG.1.1.p1");
    }

    #[test]
    fn test_rename_rule_pads_index() {
        let rule = RenameRule::new("MSTRG", "Novel").unwrap();
        assert_eq!(rule.apply("MSTRG.12.1"), "Novel000012.1");
        assert_eq!(rule.apply("cds.MSTRG.3.1"), "cds.Novel000003.1");
        assert_eq!(rule.apply("ENSG01"), "ENSG01");
    }

    #[test]
    fn test_merge_by_transcript_replaces_annotated_transcripts() {
        let merged = merge_feature_gff(raw(), orfs(), &MergeOptions::default()).unwrap();
        let kinds: Vec<&str> = merged.features.iter().map(|f| f.record.feature.as_str()).collect();
        assert_eq!(kinds, vec!["gene", "mRNA", "exon", "CDS", "gene", "transcript", "exon"]);
        // inferred gene spans its transcript
        assert_eq!((merged.features[4].record.start, merged.features[4].record.end), (2000, 2500));

        let mut gtf = Vec::new();
        merged.write_gtf(&mut gtf, None).unwrap();
        let gtf = String::from_utf8(gtf).unwrap();
        let lines: Vec<&str> = gtf.lines().collect();
        assert!(lines[0].ends_with("\tgene_id \"MSTRG.1\";"));
        assert!(lines[3].ends_with("gene_id \"MSTRG.1\"; transcript_id \"MSTRG.1.1\";"));
    }

    #[test]
    fn test_gff3_output_drops_internal_attributes_and_renames() {
        let merged = merge_feature_gff(raw(), orfs(), &MergeOptions::default()).unwrap();
        let rule = RenameRule::new("MSTRG", "Novel").unwrap();
        let mut gff = Vec::new();
        merged.write_gff3(&mut gff, Some(&rule)).unwrap();
        let gff = String::from_utf8(gff).unwrap();
        let lines: Vec<&str> = gff.lines().collect();
        assert!(lines[0].ends_with("StringTie\tgene\t100\t900\t.\t+\t.\tID=Novel000001"));
        assert!(lines[1].ends_with("\tID=Novel000001.1;Parent=Novel000001"));
        assert!(lines[5].ends_with("\tID=Novel000002.1;Parent=Novel000002"));
        assert!(!gff.contains("geneID"));
    }

    #[test]
    fn test_merge_by_gene_drops_removed_genes() {
        let options = MergeOptions {
            by: MergeBy::Gene,
            removed_genes: ["MSTRG.2".to_string()].into_iter().collect(),
        };
        let merged = merge_feature_gff(raw(), orfs(), &options).unwrap();
        assert_eq!(merged.features.len(), 4);
        assert!(merged.features.iter().all(|f| f.gene_id == "MSTRG.1"));
    }
}
