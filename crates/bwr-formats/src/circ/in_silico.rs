//! Background circRNAs drawn from the exon structure of host transcripts

use crate::gff::GffRecord;
use crate::table::Table;
use bwr_common::{Result, Strand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct InSilicoCirc {
    pub chrom: String,
    /// 0-based
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub flank_intron: String,
    pub isoform: String,
    pub gene_id: String,
}

pub const IN_SILICO_HEADER: [&str; 8] = [
    "circRNAID",
    "chrom",
    "start",
    "end",
    "strand",
    "flankIntron",
    "isoformName",
    "geneID",
];

/// Real circRNAs as read from a detail table
#[derive(Debug, Default)]
pub struct RealCircs {
    pub count: usize,
    pub junctions: HashSet<(String, u64, u64)>,
    pub isoforms: HashSet<String>,
}

impl RealCircs {
    pub fn from_table(table: &Table) -> Result<Self> {
        let chrom = table.column_index("chrom")?;
        let start = table.column_index("start")?;
        let end = table.column_index("end")?;
        let isoform = table.column_index("isoformName")?;
        let mut real = Self::default();
        for row in 0..table.len() {
            real.count += 1;
            let (Ok(s), Ok(e)) = (table.cell(row, start).parse(), table.cell(row, end).parse()) else {
                warn!(row = row + 1, "Skipping circRNA with unreadable coordinates");
                continue;
            };
            real.junctions.insert((table.cell(row, chrom).to_string(), s, e));
            real.isoforms.insert(table.cell(row, isoform).to_string());
        }
        Ok(real)
    }
}

/// Every back-splice candidate of the host transcripts: exon pairs `i <= j`
/// spanning `exon_i.start .. exon_j.end`, minus the real junctions.
///
/// Single-exon transcripts have no introns and contribute nothing.
pub fn candidates(exons: &[GffRecord], real: &RealCircs) -> Vec<InSilicoCirc> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_tr: HashMap<&str, Vec<&GffRecord>> = HashMap::new();
    for exon in exons.iter().filter(|r| r.feature == "exon") {
        let Some(tr) = exon.transcript_id() else {
            continue;
        };
        if !real.isoforms.contains(tr) {
            continue;
        }
        by_tr
            .entry(tr)
            .or_insert_with(|| {
                order.push(tr);
                Vec::new()
            })
            .push(exon);
    }

    let mut out = Vec::new();
    for tr in order {
        let mut tr_exons = by_tr.remove(tr).unwrap_or_default();
        if tr_exons.len() < 2 {
            continue;
        }
        tr_exons.sort_by_key(|e| e.start);
        let first = tr_exons[0];
        let chrom = first.seqid.as_str();
        let introns: Vec<(u64, u64)> = tr_exons
            .windows(2)
            .map(|pair| (pair[0].end, pair[1].start - 1))
            .collect();
        let intron = |idx: Option<usize>| {
            idx.and_then(|i| introns.get(i))
                .map_or_else(|| "None".to_string(), |(s, e)| format!("{chrom}:{s}-{e}"))
        };

        for i in 0..tr_exons.len() {
            for j in i..tr_exons.len() {
                let start = tr_exons[i].start - 1;
                let end = tr_exons[j].end;
                if real.junctions.contains(&(chrom.to_string(), start, end)) {
                    continue;
                }
                out.push(InSilicoCirc {
                    chrom: chrom.to_string(),
                    start,
                    end,
                    strand: first.strand,
                    flank_intron: format!("{}|{}", intron(i.checked_sub(1)), intron(Some(j))),
                    isoform: tr.to_string(),
                    gene_id: first.gene_id().unwrap_or_default().to_string(),
                });
            }
        }
    }
    out
}

/// Draw `n` candidates with replacement and name them `in_silico_circ_NNNNNNNNNN`
pub fn sample(candidates: &[InSilicoCirc], n: usize, seed: u64) -> Table {
    let mut table = Table::new(IN_SILICO_HEADER);
    if candidates.is_empty() {
        warn!("No in-silico candidates to sample from");
        return table;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    for idx in 0..n {
        let circ = &candidates[rng.gen_range(0..candidates.len())];
        table.push_row([
            format!("in_silico_circ_{:010}", idx + 1),
            circ.chrom.clone(),
            circ.start.to_string(),
            circ.end.to_string(),
            circ.strand.to_string(),
            circ.flank_intron.clone(),
            circ.isoform.clone(),
            circ.gene_id.clone(),
        ]);
    }
    table
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn exon(tr: &str, start: u64, end: u64) -> GffRecord {
        GffRecord::parse_line(
            &format!("1\tsrc\texon\t{start}\t{end}\t.\t+\t.\tgene_id \"G\"; transcript_id \"{tr}\";"),
            1,
        )
        .unwrap()
    }

    fn real() -> RealCircs {
        RealCircs {
            count: 2,
            junctions: [("1".to_string(), 99, 300)].into_iter().collect(),
            isoforms: ["T1".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn test_candidates_skip_real_junctions() {
        let exons = vec![
            exon("T1", 100, 200),
            exon("T1", 251, 300),
            exon("T1", 401, 500),
            exon("T2", 100, 900),
            exon("T2", 950, 990),
        ];
        let found = candidates(&exons, &real());
        // 3 exons give 6 pairs, one of them is real; T2 hosts no circRNA
        assert_eq!(found.len(), 5);
        assert_eq!((found[0].start, found[0].end), (99, 200));
        assert_eq!(found[0].flank_intron, "None|1:200-250");
        let last = found.last().unwrap();
        assert_eq!((last.start, last.end), (400, 500));
        assert_eq!(last.flank_intron, "1:300-400|None");
        assert_eq!(last.gene_id, "G");
    }

    #[test]
    fn test_sample_is_seeded() {
        let exons = vec![exon("T1", 100, 200), exon("T1", 251, 300), exon("T1", 401, 500)];
        let found = candidates(&exons, &real());
        let a = sample(&found, 4, 0);
        let b = sample(&found, 4, 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
        assert_eq!(a.rows[3][0], "in_silico_circ_0000000004");
        assert!(sample(&[], 3, 0).is_empty());
    }
}
