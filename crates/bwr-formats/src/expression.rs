//! Expression matrices: correlation, grouping and tissue specificity
//!
//! Matrices are genes (rows) by samples (columns) with the gene id in the
//! first column. Cells that do not parse as numbers are treated as missing.

use crate::io::{create_text, fmt_float, with_suffix};
use crate::table::Table;
use bwr_common::{BwrError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    /// Header of the id column (`Gene_id`, an empty string, ...)
    pub id_header: String,
    pub samples: Vec<String>,
    pub genes: Vec<String>,
    pub values: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
}

impl ExpressionMatrix {
    pub fn new(
        id_header: impl Into<String>,
        samples: Vec<String>,
        rows: Vec<(String, Vec<f64>)>,
    ) -> Self {
        let (genes, values): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        let index = genes.iter().enumerate().map(|(i, g)| (g.clone(), i)).collect();
        Self {
            id_header: id_header.into(),
            samples,
            genes,
            values,
            index,
        }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_table(&Table::read(path)?)
    }

    pub fn from_table(table: &Table) -> Result<Self> {
        let Some((id_header, samples)) = table.headers.split_first() else {
            return Err(BwrError::invalid_input("expression table has no header"));
        };
        let rows = (0..table.len())
            .map(|row| {
                let values = (1..=samples.len())
                    .map(|col| table.cell(row, col).trim().parse().unwrap_or(f64::NAN))
                    .collect();
                (table.cell(row, 0).to_string(), values)
            })
            .collect();
        Ok(Self::new(id_header.clone(), samples.to_vec(), rows))
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn row(&self, gene: &str) -> Option<&[f64]> {
        self.index.get(gene).map(|&i| self.values[i].as_slice())
    }

    pub fn sample_index(&self, sample: &str) -> Option<usize> {
        self.samples.iter().position(|s| s == sample)
    }

    pub fn value(&self, gene: &str, sample: &str) -> Option<f64> {
        let col = self.sample_index(sample)?;
        self.row(gene).map(|row| row[col])
    }

    /// Smallest strictly positive value, used when a cutoff of 0 is requested
    pub fn min_nonzero(&self) -> f64 {
        self.values
            .iter()
            .flatten()
            .copied()
            .filter(|v| *v != 0.0 && !v.is_nan())
            .fold(f64::INFINITY, f64::min)
    }

    /// Keep genes whose row satisfies the predicate
    pub fn retain(self, mut keep: impl FnMut(&[f64]) -> bool) -> Self {
        let rows = self
            .genes
            .into_iter()
            .zip(self.values)
            .filter(|(_, row)| keep(row))
            .collect();
        Self::new(self.id_header, self.samples, rows)
    }

    /// Stack two matrices, aligning samples by name; absent cells are missing
    pub fn concat(&self, other: &Self) -> Self {
        let mut samples = self.samples.clone();
        for sample in &other.samples {
            if !samples.contains(sample) {
                samples.push(sample.clone());
            }
        }
        let mut rows = Vec::with_capacity(self.len() + other.len());
        for matrix in [self, other] {
            let cols: Vec<Option<usize>> = samples.iter().map(|s| matrix.sample_index(s)).collect();
            for (gene, row) in matrix.genes.iter().zip(&matrix.values) {
                let values = cols.iter().map(|c| c.map_or(f64::NAN, |c| row[c])).collect();
                rows.push((gene.clone(), values));
            }
        }
        Self::new(self.id_header.clone(), samples, rows)
    }

    /// Pearson correlation between every pair of samples
    pub fn sample_correlation(&self) -> Self {
        let columns: Vec<Vec<f64>> = (0..self.samples.len())
            .map(|c| self.values.iter().map(|row| row[c]).collect())
            .collect();
        let rows = self
            .samples
            .iter()
            .zip(&columns)
            .map(|(sample, x)| {
                let cors = columns.iter().map(|y| pearson(x, y)).collect();
                (sample.clone(), cors)
            })
            .collect();
        Self::new("", self.samples.clone(), rows)
    }

    pub fn write_to<W: Write>(&self, out: &mut W, decimals: usize) -> Result<()> {
        writeln!(out, "{}\t{}", self.id_header, self.samples.join("\t"))?;
        for (gene, row) in self.genes.iter().zip(&self.values) {
            let cells: Vec<String> = row.iter().map(|v| fmt_float(*v, decimals, "")).collect();
            writeln!(out, "{}\t{}", gene, cells.join("\t"))?;
        }
        Ok(())
    }

    pub fn write(&self, path: impl AsRef<Path>, decimals: usize) -> Result<()> {
        let mut out = create_text(path)?;
        self.write_to(&mut out, decimals)?;
        out.flush()?;
        Ok(())
    }
}

/// Pearson correlation over positions where both values are present;
/// `NaN` with fewer than two such positions or zero variance
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .collect();
    let n = pairs.len() as f64;
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Replicate index of a sample name: the integer after the last `_`,
/// else after the last `-`
pub fn sample_index(sample: &str) -> Option<&str> {
    ['_', '-'].into_iter().find_map(|sep| {
        let (_, idx) = sample.rsplit_once(sep)?;
        idx.parse::<i64>().is_ok().then_some(idx)
    })
}

/// Relationship between the two samples of a correlation pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairCategory {
    WithinSample,
    WithinTissue,
    Unrelated,
}

impl PairCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairCategory::WithinSample => "within_sample",
            PairCategory::WithinTissue => "within_tissue",
            PairCategory::Unrelated => "None",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationPair {
    pub sample1: String,
    pub sample2: String,
    pub cor: f64,
    pub index1: Option<String>,
    pub index2: Option<String>,
    pub tissue1: String,
    pub tissue2: String,
    pub category: PairCategory,
}

impl CorrelationPair {
    pub fn to_line(&self, gene_type: &str) -> String {
        [
            self.sample1.as_str(),
            self.sample2.as_str(),
            &self.cor.to_string(),
            gene_type,
            self.index1.as_deref().unwrap_or(""),
            self.index2.as_deref().unwrap_or(""),
            &self.tissue1,
            &self.tissue2,
            self.category.as_str(),
        ]
        .join("\t")
    }
}

/// Melt a sample correlation matrix into classified pairs.
///
/// Pairs are emitted column by column, excluding self pairs. Samples without
/// a tissue are dropped. Equal tissues mean `within_sample`; otherwise equal
/// replicate indices mean `within_tissue`.
pub fn classify_correlation(
    cor: &ExpressionMatrix,
    sample_tissue: &HashMap<String, String>,
) -> Vec<CorrelationPair> {
    let mut pairs = Vec::new();
    for sample2 in &cor.genes {
        let Some(col) = cor.sample_index(sample2) else {
            continue;
        };
        for (sample1, row) in cor.genes.iter().zip(&cor.values) {
            if sample1 == sample2 {
                continue;
            }
            let (Some(tissue1), Some(tissue2)) = (sample_tissue.get(sample1), sample_tissue.get(sample2)) else {
                continue;
            };
            let index1 = sample_index(sample1);
            let index2 = sample_index(sample2);
            let category = if tissue1 == tissue2 {
                PairCategory::WithinSample
            } else if index1.is_some() && index1 == index2 {
                PairCategory::WithinTissue
            } else {
                PairCategory::Unrelated
            };
            pairs.push(CorrelationPair {
                sample1: sample1.clone(),
                sample2: sample2.clone(),
                cor: row[col],
                index1: index1.map(str::to_string),
                index2: index2.map(str::to_string),
                tissue1: tissue1.clone(),
                tissue2: tissue2.clone(),
                category,
            });
        }
    }
    pairs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    #[default]
    Mean,
    Min,
    Max,
}

impl std::str::FromStr for Aggregate {
    type Err = BwrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(Aggregate::Mean),
            "min" => Ok(Aggregate::Min),
            "max" => Ok(Aggregate::Max),
            other => Err(BwrError::invalid_input(format!("unknown aggregate '{other}'"))),
        }
    }
}

impl Aggregate {
    fn apply(&self, values: &[f64]) -> f64 {
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.is_empty() {
            return f64::NAN;
        }
        match self {
            Aggregate::Mean => present.iter().sum::<f64>() / present.len() as f64,
            Aggregate::Min => present.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max => present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

fn resolve_cutoff(matrix: &ExpressionMatrix, cutoff: f64) -> f64 {
    if cutoff == 0.0 {
        matrix.min_nonzero()
    } else {
        cutoff
    }
}

fn row_max(row: &[f64]) -> f64 {
    row.iter().copied().filter(|v| !v.is_nan()).fold(f64::NEG_INFINITY, f64::max)
}

/// Aggregate samples into groups (`(group, sample)` pairs) after dropping
/// genes whose maximum is not above `cutoff` (0 means the smallest non-zero
/// value). Groups come out sorted; samples without a group are ignored.
pub fn group_aggregate(
    matrix: &ExpressionMatrix,
    sample_groups: &[(String, String)],
    cutoff: f64,
    how: Aggregate,
) -> ExpressionMatrix {
    let cutoff = resolve_cutoff(matrix, cutoff);
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (group, sample) in sample_groups {
        if let Some(col) = matrix.sample_index(sample) {
            groups.entry(group.as_str()).or_default().push(col);
        }
    }

    let rows = matrix
        .genes
        .iter()
        .zip(&matrix.values)
        .filter(|(_, row)| row_max(row) > cutoff)
        .map(|(gene, row)| {
            let values = groups
                .values()
                .map(|cols| {
                    let picked: Vec<f64> = cols.iter().map(|&c| row[c]).collect();
                    how.apply(&picked)
                })
                .collect();
            (gene.clone(), values)
        })
        .collect();

    ExpressionMatrix::new(
        "Gene_id",
        groups.keys().map(|g| g.to_string()).collect(),
        rows,
    )
}

/// Tissue specificity of one gene
#[derive(Debug, Clone, PartialEq)]
pub struct TissueScore {
    pub gene_id: String,
    /// `max / sum` over group means
    pub score: f64,
    pub tissue: String,
    pub specific: bool,
    pub biotype: Option<String>,
}

/// Score every gene of a group-mean matrix; a gene is specific when its
/// score exceeds `n_tissues * 0.2`
pub fn tissue_specificity(
    group_means: &ExpressionMatrix,
    biotypes: &HashMap<String, String>,
    n_tissues: usize,
) -> Vec<TissueScore> {
    let threshold = n_tissues as f64 * 0.2;
    group_means
        .genes
        .iter()
        .zip(&group_means.values)
        .map(|(gene, row)| {
            let sum: f64 = row.iter().filter(|v| !v.is_nan()).sum();
            let (best, max) = row
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_nan())
                .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
            let score = max / sum;
            TissueScore {
                gene_id: gene.clone(),
                score,
                tissue: group_means.samples.get(best).cloned().unwrap_or_default(),
                specific: score > threshold,
                biotype: biotypes.get(gene).cloned(),
            }
        })
        .collect()
}

/// Specific gene counts per `(tissue, biotype)`
pub fn specific_by_tissue(scores: &[TissueScore]) -> BTreeMap<(String, String), usize> {
    let mut counts = BTreeMap::new();
    for score in scores {
        let Some(biotype) = &score.biotype else {
            continue;
        };
        *counts.entry((score.tissue.clone(), biotype.clone())).or_default() +=
            usize::from(score.specific);
    }
    counts
}

/// `(biotype, detected, specific)` ordered by detected genes, largest first
pub fn specific_summary(scores: &[TissueScore]) -> Vec<(String, usize, usize)> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for score in scores {
        if let Some(biotype) = &score.biotype {
            let slot = counts.entry(biotype).or_default();
            slot.0 += 1;
            slot.1 += usize::from(score.specific);
        }
    }
    let mut summary: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(biotype, (detected, specific))| (biotype.to_string(), detected, specific))
        .collect();
    summary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    summary
}

/// Keep genes expressed above `exp_cutoff` (0 means the smallest non-zero
/// value) in more than `prop_cutoff` of the samples
pub fn filter_by_proportion(matrix: ExpressionMatrix, exp_cutoff: f64, prop_cutoff: f64) -> ExpressionMatrix {
    let cutoff = resolve_cutoff(&matrix, exp_cutoff);
    let n = matrix.samples.len().max(1) as f64;
    matrix.retain(|row| {
        let expressed = row.iter().filter(|v| **v > cutoff).count() as f64;
        expressed / n > prop_cutoff
    })
}

/// Genes whose lowest value over all samples is above `cutoff`; missing
/// cells are skipped
pub fn ubiquitous_genes(matrix: &ExpressionMatrix, cutoff: f64) -> Vec<&str> {
    matrix
        .genes
        .iter()
        .zip(&matrix.values)
        .filter(|(_, row)| {
            let min = row.iter().copied().filter(|v| !v.is_nan()).fold(f64::NAN, f64::min);
            min > cutoff
        })
        .map(|(gene, _)| gene.as_str())
        .collect()
}

/// A gene pair with the regulation direction it was grouped under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenePair {
    pub gene1: String,
    pub gene2: String,
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoRegulation {
    pub pair: GenePair,
    pub kind: &'static str,
    pub cor: f64,
}

/// Number of random lncRNA-mRNA background pairs per direction
pub const RANDOM_BACKGROUND_PAIRS: usize = 1000;

fn sample_with_replacement<'a, T>(items: &'a [T], n: usize, seed: u64) -> Vec<&'a T> {
    if items.is_empty() {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| &items[rng.gen_range(0..items.len())]).collect()
}

/// Correlate lncRNA-mRNA pairs against two backgrounds per direction:
/// as many protein-coding pairs drawn from `pc_pc` and
/// [`RANDOM_BACKGROUND_PAIRS`] random lncRNA-mRNA pairs.
///
/// Every draw restarts the generator from `seed`.
pub fn co_regulation(
    lnc_pc: &[GenePair],
    pc_pc: &[GenePair],
    lnc_exp: &ExpressionMatrix,
    pc_exp: &ExpressionMatrix,
    seed: u64,
) -> Vec<CoRegulation> {
    let merged = lnc_exp.concat(pc_exp);
    let cor = |pair: &GenePair| match (merged.row(&pair.gene1), merged.row(&pair.gene2)) {
        (Some(x), Some(y)) => pearson(x, y),
        _ => f64::NAN,
    };

    let mut directions: Vec<&str> = Vec::new();
    for pair in lnc_pc {
        if !directions.contains(&pair.direction.as_str()) {
            directions.push(&pair.direction);
        }
    }

    let mut out = Vec::new();
    for direction in directions {
        let lnc_pairs: Vec<&GenePair> = lnc_pc.iter().filter(|p| p.direction == direction).collect();
        let pc_pairs: Vec<&GenePair> = pc_pc.iter().filter(|p| p.direction == direction).collect();

        for pair in &lnc_pairs {
            out.push(CoRegulation {
                pair: (*pair).clone(),
                kind: "lncRNA-protein_coding",
                cor: cor(pair),
            });
        }
        for pair in sample_with_replacement(&pc_pairs, lnc_pairs.len(), seed) {
            out.push(CoRegulation {
                pair: (*pair).clone(),
                kind: "protein_coding-protein_coding",
                cor: cor(pair),
            });
        }

        let random_lnc = sample_with_replacement(&lnc_exp.genes, RANDOM_BACKGROUND_PAIRS, seed);
        let random_pc = sample_with_replacement(&pc_exp.genes, RANDOM_BACKGROUND_PAIRS, seed);
        for (lnc, pc) in random_lnc.into_iter().zip(random_pc) {
            let pair = GenePair {
                gene1: lnc.clone(),
                gene2: pc.clone(),
                direction: direction.to_string(),
            };
            let value = cor(&pair);
            out.push(CoRegulation {
                pair,
                kind: "random",
                cor: value,
            });
        }
    }
    out
}

/// Distinct groups of a `(group, sample)` list
pub fn group_count(sample_groups: &[(String, String)]) -> usize {
    sample_groups.iter().map(|(g, _)| g.as_str()).collect::<BTreeSet<_>>().len()
}

/// Protein-coding genes assigned to co-expression modules, after filtering a
/// module correlation table (`module_name`, `mRNA`, `module_cor`, `diff`)
#[derive(Debug, Clone, PartialEq)]
pub struct CoexpModules {
    pub filtered: Table,
    /// Module name to its genes, in table order
    pub modules: BTreeMap<String, Vec<String>>,
}

impl CoexpModules {
    /// Keep rows with `module_cor >= cor_cut` and `diff >= diff_cut`
    pub fn select(table: &Table, cor_cut: f64, diff_cut: f64) -> Result<Self> {
        let module_col = table.column_index("module_name")?;
        let gene_col = table.column_index("mRNA")?;
        let cor_col = table.column_index("module_cor")?;
        let diff_col = table.column_index("diff")?;
        let number = |row: usize, col: usize| table.cell(row, col).trim().parse::<f64>().unwrap_or(f64::NAN);

        let mut filtered = Table::new(table.headers.clone());
        let mut modules: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in 0..table.len() {
            if number(row, cor_col) >= cor_cut && number(row, diff_col) >= diff_cut {
                filtered.rows.push(table.rows[row].clone());
                modules
                    .entry(table.cell(row, module_col).to_string())
                    .or_default()
                    .push(table.cell(row, gene_col).to_string());
            }
        }
        Ok(Self { filtered, modules })
    }

    /// Write the filtered table next to `input` (`<stem>.filter.txt`), one
    /// `<type>.<module>.gene` list per module and `<type>.module.co_mRNA.num`
    /// into `out_dir`, where `<type>` is the input name up to its first dot
    pub fn write(&self, input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let gene_type = input
            .file_name()
            .map(|name| name.to_string_lossy().split('.').next().unwrap_or_default().to_string())
            .unwrap_or_default();
        std::fs::create_dir_all(out_dir)?;

        let filtered = with_suffix(input, "filter.txt");
        self.filtered.write(&filtered)?;
        let mut written = vec![filtered];

        for (module, genes) in &self.modules {
            let path = out_dir.join(format!("{gene_type}.{module}.gene"));
            let mut out = create_text(&path)?;
            for gene in genes {
                writeln!(out, "{gene}")?;
            }
            out.flush()?;
            written.push(path);
        }

        let counts = out_dir.join(format!("{gene_type}.module.co_mRNA.num"));
        let mut out = create_text(&counts)?;
        writeln!(out, "module_name\tco_exp_pcg")?;
        for (module, genes) in &self.modules {
            writeln!(out, "{module}\t{}", genes.len())?;
        }
        out.flush()?;
        written.push(counts);
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn matrix(text: &str) -> ExpressionMatrix {
        ExpressionMatrix::from_table(&Table::from_reader(Cursor::new(text), true).unwrap()).unwrap()
    }

    fn groups(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(g, s)| (g.to_string(), s.to_string())).collect()
    }

    #[test]
    fn test_pearson() {
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert!(pearson(&[1.0, 1.0], &[2.0, 3.0]).is_nan());
        assert!(pearson(&[1.0], &[2.0]).is_nan());
    }

    #[test]
    fn test_sample_index() {
        assert_eq!(sample_index("liver_1"), Some("1"));
        assert_eq!(sample_index("liver-2"), Some("2"));
        assert_eq!(sample_index("liver_a-3"), Some("3"));
        assert_eq!(sample_index("liver"), None);
    }

    #[test]
    fn test_classify_correlation() {
        let cor = matrix("\tliver_1\tliver_2\tbrain_1\nliver_1\t1\t0.9\t0.3\nliver_2\t0.9\t1\t0.2\nbrain_1\t0.3\t0.2\t1\n");
        let tissues: HashMap<String, String> = [("liver_1", "liver"), ("liver_2", "liver"), ("brain_1", "brain")]
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();
        let pairs = classify_correlation(&cor, &tissues);
        assert_eq!(pairs.len(), 6);
        assert_eq!((pairs[0].sample1.as_str(), pairs[0].sample2.as_str()), ("liver_2", "liver_1"));
        assert_eq!(pairs[0].category, PairCategory::WithinSample);
        let cross = pairs.iter().find(|p| p.sample1 == "brain_1" && p.sample2 == "liver_1").unwrap();
        assert_eq!(cross.category, PairCategory::WithinTissue);
        assert_eq!(cross.cor, 0.3);
        let other = pairs.iter().find(|p| p.sample1 == "brain_1" && p.sample2 == "liver_2").unwrap();
        assert_eq!(other.to_line("lncRNA"), "brain_1\tliver_2\t0.2\tlncRNA\t1\t2\tbrain\tliver\tNone");
    }

    #[test]
    fn test_group_aggregate_drops_low_genes() {
        let m = matrix("Gene\ta1\ta2\tb1\ng1\t1\t3\t10\ng2\t0\t0.5\t0\ng3\t0\t0\t0\n");
        let grouped = group_aggregate(&m, &groups(&[("A", "a1"), ("A", "a2"), ("B", "b1")]), 0.0, Aggregate::Mean);
        assert_eq!(grouped.samples, vec!["A", "B"]);
        // cutoff 0 becomes the smallest non-zero value (0.5), so g2 and g3 go
        assert_eq!(grouped.genes, vec!["g1"]);
        assert_eq!(grouped.values[0], vec![2.0, 10.0]);

        let maxed = group_aggregate(&m, &groups(&[("A", "a1"), ("A", "a2")]), 0.1, Aggregate::Max);
        assert_eq!(maxed.row("g2").unwrap(), &[0.5]);
    }

    #[test]
    fn test_tissue_specificity() {
        let means = matrix("Gene_id\tA\tB\ng1\t9\t1\ng2\t5\t5\n");
        let biotypes: HashMap<String, String> =
            [("g1".to_string(), "lncRNA".to_string())].into_iter().collect();
        let scores = tissue_specificity(&means, &biotypes, 2);
        assert_eq!(scores[0].tissue, "A");
        assert!((scores[0].score - 0.9).abs() < 1e-12);
        assert!(scores[0].specific);
        assert!(scores[1].specific);
        assert_eq!(specific_by_tissue(&scores)[&("A".to_string(), "lncRNA".to_string())], 1);
        assert_eq!(specific_summary(&scores), vec![("lncRNA".to_string(), 1, 1)]);
    }

    #[test]
    fn test_filter_by_proportion() {
        let m = matrix("Gene\ts1\ts2\ts3\ng1\t5\t5\t0\ng2\t5\t0\t0\n");
        let kept = filter_by_proportion(m, 1.0, 0.5);
        assert_eq!(kept.genes, vec!["g1"]);
    }

    #[test]
    fn test_co_regulation_backgrounds() {
        let lnc = matrix("id\ts1\ts2\ts3\nL1\t1\t2\t3\nL2\t3\t1\t2\n");
        let pc = matrix("id\ts1\ts2\ts3\nP1\t2\t4\t6\nP2\t6\t4\t2\n");
        let pair = |a: &str, b: &str| GenePair {
            gene1: a.to_string(),
            gene2: b.to_string(),
            direction: "up".to_string(),
        };
        let result = co_regulation(&[pair("L1", "P1")], &[pair("P1", "P2")], &lnc, &pc, 0);
        assert_eq!(result.len(), 2 + RANDOM_BACKGROUND_PAIRS);
        assert_eq!(result[0].kind, "lncRNA-protein_coding");
        assert!((result[0].cor - 1.0).abs() < 1e-12);
        assert_eq!(result[1].kind, "protein_coding-protein_coding");
        assert!((result[1].cor + 1.0).abs() < 1e-12);
        assert!(result[2..].iter().all(|r| r.kind == "random"));
        // same seed, same draw
        let again = co_regulation(&[pair("L1", "P1")], &[pair("P1", "P2")], &lnc, &pc, 0);
        assert_eq!(result, again);
    }

    #[test]
    fn test_ubiquitous_genes() {
        let m = matrix("Gene\ts1\ts2\ns1g\t2\t3\nlow\t2\t0.5\ngap\t4\tNA\nnone\tNA\tNA\n");
        assert_eq!(ubiquitous_genes(&m, 1.0), vec!["s1g", "gap"]);
        assert_eq!(ubiquitous_genes(&m, 3.0), vec!["gap"]);
    }

    #[test]
    fn test_coexp_modules() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("lncRNA.pcg.cor.txt");
        std::fs::write(
            &input,
            "module_name\tmRNA\tmodule_cor\tdiff\n\
             blue\tG1\t0.8\t0.4\n\
             blue\tG2\t0.4\t0.9\n\
             red\tG3\t0.5\t0.3\n\
             blue\tG4\t0.9\t0.31\n\
             red\tG5\t0.9\t0.1\n",
        )
        .unwrap();
        let modules = CoexpModules::select(&Table::read(&input).unwrap(), 0.5, 0.3).unwrap();
        assert_eq!(modules.filtered.len(), 3);
        assert_eq!(modules.modules["blue"], vec!["G1", "G4"]);

        let out = dir.path().join("modules");
        let written = modules.write(&input, &out).unwrap();
        assert_eq!(written[0], dir.path().join("lncRNA.pcg.cor.filter.txt"));
        assert_eq!(std::fs::read_to_string(out.join("lncRNA.blue.gene")).unwrap(), "G1\nG4\n");
        assert_eq!(
            std::fs::read_to_string(out.join("lncRNA.module.co_mRNA.num")).unwrap(),
            "module_name\tco_exp_pcg\nblue\t2\nred\t1\n"
        );
    }
}
