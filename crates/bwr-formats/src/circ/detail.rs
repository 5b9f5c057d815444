//! circRNA detail tables: one row per circRNA, read counts per sample and
//! host gene expression alongside

use super::AnnotatedCirc;
use crate::expression::ExpressionMatrix;
use crate::io::fmt_float;
use crate::table::Table;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const DETAIL_COLUMNS: [&str; 15] = [
    "circRNAID",
    "chrom",
    "start",
    "end",
    "strand",
    "exonCount",
    "length",
    "flankIntron",
    "flankIntronSizeUP",
    "flankIntronSizeDOWN",
    "circType",
    "isoformName",
    "geneID",
    "geneSymbol",
    "transcriptBiotype",
];

/// Junction coordinates identifying one circRNA across samples
pub type CircKey = (String, u64, u64);

/// Name every distinct junction `<abbr>_circ_NNNNNN` in (chrom, start, end) order
pub fn name_circs(circs: &[AnnotatedCirc], abbr: &str) -> HashMap<CircKey, String> {
    let keys: BTreeSet<CircKey> = circs
        .iter()
        .map(|c| (c.record.chrom.clone(), c.record.start, c.record.end))
        .collect();
    keys.into_iter()
        .enumerate()
        .map(|(i, key)| (key, format!("{abbr}_circ_{:06}", i + 1)))
        .collect()
}

fn opt(value: Option<&str>) -> String {
    value.unwrap_or("None").to_string()
}

fn identity(circ: &AnnotatedCirc, name: &str) -> Vec<String> {
    let r = &circ.record;
    vec![
        name.to_string(),
        r.chrom.clone(),
        r.start.to_string(),
        r.end.to_string(),
        r.strand.to_string(),
        r.exon_count.to_string(),
        circ.length.to_string(),
        r.flank_intron.clone(),
        opt(circ.flank_up.map(|v| v.to_string()).as_deref()),
        opt(circ.flank_down.map(|v| v.to_string()).as_deref()),
        r.circ_type.clone(),
        r.isoform_name.clone(),
        r.gene_name.clone(),
        opt(circ.gene_symbol.as_deref()),
        opt(circ.biotype.as_deref()),
    ]
}

/// Build a detail table.
///
/// Read columns cover the samples present in `circs` (sorted, 0 when a
/// circRNA is absent); `<sample>(host gene)` columns take the host gene's
/// value from `expression` for every sample in `host_samples`. With
/// `tissues`, `tissue` (comma-joined, first-seen order) and `tissueCount`
/// columns are appended.
pub fn detail_table(
    circs: &[&AnnotatedCirc],
    names: &HashMap<CircKey, String>,
    expression: &ExpressionMatrix,
    host_samples: &[String],
    tissues: Option<&HashMap<String, String>>,
) -> Table {
    let samples: Vec<String> = circs
        .iter()
        .map(|c| c.record.sample_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let sample_col: HashMap<&str, usize> = samples.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();

    let mut rows: BTreeMap<Vec<String>, Vec<u64>> = BTreeMap::new();
    let mut circ_tissues: HashMap<String, Vec<String>> = HashMap::new();
    for circ in circs {
        let key = (circ.record.chrom.clone(), circ.record.start, circ.record.end);
        let name = names.get(&key).map(String::as_str).unwrap_or_default();
        let counts = rows
            .entry(identity(circ, name))
            .or_insert_with(|| vec![0; samples.len()]);
        if let Some(&col) = sample_col.get(circ.record.sample_id.as_str()) {
            counts[col] += circ.record.read_number;
        }
        if let Some(tissue) = tissues.and_then(|t| t.get(&circ.record.sample_id)) {
            let seen = circ_tissues.entry(name.to_string()).or_default();
            if !seen.contains(tissue) {
                seen.push(tissue.clone());
            }
        }
    }

    let mut headers: Vec<String> = DETAIL_COLUMNS.iter().map(|s| s.to_string()).collect();
    headers.extend(samples.iter().cloned());
    headers.extend(host_samples.iter().map(|s| format!("{s}(host gene)")));
    if tissues.is_some() {
        headers.push("tissue".to_string());
        headers.push("tissueCount".to_string());
    }
    let mut table = Table::new(headers);

    for (identity, counts) in rows {
        let gene = &identity[12];
        let host: Vec<String> = host_samples
            .iter()
            .map(|s| fmt_float(expression.value(gene, s).unwrap_or(f64::NAN), 3, "None"))
            .collect();
        let mut row = identity.clone();
        row.extend(counts.iter().map(u64::to_string));
        row.extend(host);
        if tissues.is_some() {
            let found = circ_tissues.get(&identity[0]).cloned().unwrap_or_default();
            row.push(found.join(","));
            row.push(found.len().to_string());
        }
        table.rows.push(row);
    }
    table
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::fixtures::annotated;
    use super::*;

    fn expression() -> ExpressionMatrix {
        ExpressionMatrix::new(
            "Gene_id",
            vec!["s1".to_string(), "s2".to_string()],
            vec![("G1".to_string(), vec![12.5, 3.0])],
        )
    }

    #[test]
    fn test_name_circs_sorted() {
        let names = name_circs(&annotated(), "Mm");
        assert_eq!(names[&("1".to_string(), 1000, 1550)], "Mm_circ_000001");
        assert_eq!(names[&("2".to_string(), 200, 700)], "Mm_circ_000002");
    }

    #[test]
    fn test_detail_table_merges_samples() {
        let circs = annotated();
        let names = name_circs(&circs, "Mm");
        let refs: Vec<&AnnotatedCirc> = circs.iter().collect();
        let tissues: HashMap<String, String> = [("s1", "liver"), ("s2", "brain")]
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();
        let samples = vec!["s1".to_string(), "s2".to_string()];
        let table = detail_table(&refs, &names, &expression(), &samples, Some(&tissues));

        assert_eq!(table.len(), 2);
        assert_eq!(&table.headers[15..], &["s1", "s2", "s1(host gene)", "s2(host gene)", "tissue", "tissueCount"]);
        let first = &table.rows[0];
        assert_eq!(first[0], "Mm_circ_000001");
        assert_eq!(&first[15..], &["5", "3", "12.500", "3.000", "liver,brain", "2"]);
        let second = &table.rows[1];
        assert_eq!(second[9], "None");
        assert_eq!(&second[15..17], &["4", "0"]);
        assert_eq!(second[17], "None");
    }
}
