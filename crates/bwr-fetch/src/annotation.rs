//! Gene -> UniProt -> GO annotation pipeline
//!
//! Every remote stage keeps its finished results in a middle file (append-only
//! TSV) or a middle directory (one TSV per id). A rerun reads the middle store
//! first and only fetches the ids still missing, so an interrupted run picks
//! up where it stopped. Ids that fail are retried in further rounds; on the
//! last round missing data is recorded as empty instead of failing again.

use crate::bounded::run_bounded;
use crate::ensembl::Division;
use crate::error::{FetchError, Result};
use crate::uniprot::UniprotClient;
use bwr_formats::gff::read_gff;
use bwr_formats::io::{create_text, with_suffix};
use bwr_formats::table::{collapse, concat, CollapseOptions, Table};
use indicatif::ProgressBar;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const BASE_COLUMNS: [&str; 5] =
    ["gene_id", "gene_names", "uniprot_id", "protein_names", "protein_existence"];

pub const REFERENCE_COLUMNS: [&str; 9] = [
    "go_id",
    "go_term",
    "interpro_ids",
    "interpro_names",
    "pfam_ids",
    "pfam_names",
    "feature_names",
    "feature_dbs",
    "pubmed_ids",
];

const COMMENT_PREFIX: &str = "uniprot_comments";

// ============================================================================
// UniProt entry -> annotation columns
// ============================================================================

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn array<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn push_unique(columns: &mut Vec<(String, Vec<String>)>, column: &str, value: &str) {
    let idx = match columns.iter().position(|(c, _)| c == column) {
        Some(idx) => idx,
        None => {
            columns.push((column.to_string(), Vec::new()));
            columns.len() - 1
        },
    };
    let values = &mut columns[idx].1;
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

/// Annotation columns of one Proteins API entry, values joined by `|`
pub fn entry_annotation(entry: &Value) -> Vec<(String, String)> {
    let mut columns: Vec<(String, Vec<String>)> = Vec::new();

    for gene in array(entry, "gene") {
        if let Some(name) = str_at(gene, "/name/value") {
            push_unique(&mut columns, "gene_names", name);
        }
    }

    if let Some(protein) = entry.get("protein") {
        if protein.get("submittedName").is_some() {
            for name in array(protein, "submittedName") {
                if let Some(full) = str_at(name, "/fullName/value") {
                    push_unique(&mut columns, "protein_names", full);
                }
            }
        } else if let Some(full) = str_at(protein, "/recommendedName/fullName/value") {
            push_unique(&mut columns, "protein_names", full);
        }
    }

    if let Some(existence) = entry.get("proteinExistence").and_then(Value::as_str) {
        push_unique(&mut columns, "protein_existence", existence);
    }

    for comment in array(entry, "comments") {
        let Some(kind) = comment.get("type").and_then(Value::as_str) else {
            continue;
        };
        let column = format!("{COMMENT_PREFIX}({kind})");
        for text in array(comment, "text") {
            if let Some(value) = text.get("value").and_then(Value::as_str) {
                push_unique(&mut columns, &column, value);
            }
        }
    }

    for (db, ids, names) in [("InterPro", "interpro_ids", "interpro_names"), ("Pfam", "pfam_ids", "pfam_names")] {
        for reference in array(entry, "dbReferences").filter(|r| str_at(r, "/type") == Some(db)) {
            if let Some(id) = str_at(reference, "/id") {
                push_unique(&mut columns, ids, id);
            }
            if let Some(name) = reference.pointer("/properties/entry name").and_then(Value::as_str) {
                push_unique(&mut columns, names, name);
            }
        }
    }

    for feature in array(entry, "features") {
        let Some(description) = str_at(feature, "/description") else {
            continue;
        };
        if description.is_empty() || description == "DSL" {
            continue;
        }
        let (Some(source), Some(id)) = (
            str_at(feature, "/evidences/0/source/name"),
            str_at(feature, "/evidences/0/source/id"),
        ) else {
            continue;
        };
        if source == "Pfam" {
            continue;
        }
        push_unique(&mut columns, "feature_names", description);
        push_unique(&mut columns, "feature_dbs", &format!("{source}:{id}"));
    }

    for reference in array(entry, "references") {
        if let Some(pubmed) = str_at(reference, "/citation/dbReferences/0/id") {
            push_unique(&mut columns, "pubmed_ids", pubmed);
        }
    }

    columns
        .into_iter()
        .map(|(column, values)| (column, values.join("|")))
        .collect()
}

fn row_table(cells: Vec<(String, String)>) -> Table {
    let (headers, row): (Vec<String>, Vec<String>) = cells.into_iter().unzip();
    let mut table = Table::new(headers);
    table.rows.push(row);
    table
}

// ============================================================================
// Middle stores
// ============================================================================

/// Where a stage keeps its finished results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddleStore {
    /// Append-only TSV with one header
    File(PathBuf),
    /// One `<id>.txt` TSV per id
    Dir(PathBuf),
}

impl MiddleStore {
    pub fn load(&self) -> Result<Table> {
        match self {
            MiddleStore::File(path) => {
                if path.is_file() && std::fs::metadata(path)?.len() > 0 {
                    Ok(Table::read(path)?)
                } else {
                    Ok(Table::default())
                }
            },
            MiddleStore::Dir(dir) => {
                if !dir.is_dir() {
                    return Ok(Table::default());
                }
                let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
                    .collect();
                files.sort();
                let tables = files.iter().map(Table::read).collect::<bwr_common::Result<Vec<_>>>()?;
                Ok(concat(tables))
            },
        }
    }

    /// Ids already present in `id_column`
    pub fn completed(&self, id_column: &str) -> Result<HashSet<String>> {
        let table = self.load()?;
        if table.headers.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(table.column(id_column)?.into_iter().map(str::to_string).collect())
    }

    pub fn save(&self, id: &str, table: &Table) -> Result<()> {
        match self {
            MiddleStore::File(path) => {
                let fresh = !path.is_file() || std::fs::metadata(path)?.len() == 0;
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
                table.write_to(file, fresh)?;
            },
            MiddleStore::Dir(dir) => {
                let name = id.rsplit(':').next().unwrap_or(id).replace('/', "_");
                table.write(dir.join(format!("{name}.txt")))?;
            },
        }
        Ok(())
    }
}

/// Fetch every id not yet in `store`, in up to `retries + 1` rounds.
///
/// `fetch(id, last_round)` returns `None` for a failed id; on the last round
/// it is expected to return an empty record instead.
pub async fn map_rounds<F, Fut>(
    ids: &[String],
    store: &MiddleStore,
    id_column: &str,
    width: usize,
    retries: u32,
    progress: Option<&ProgressBar>,
    fetch: F,
) -> Result<Table>
where
    F: Fn(String, bool) -> Fut,
    Fut: Future<Output = Result<Option<Table>>>,
{
    for round in 0..=retries {
        let done = store.completed(id_column)?;
        let mut seen = HashSet::new();
        let left: Vec<String> = ids
            .iter()
            .filter(|id| !done.contains(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect();
        if left.is_empty() {
            break;
        }
        let last_round = round == retries;
        info!(round = round + 1, left = left.len(), id_column, "Fetching");
        if let Some(pb) = progress {
            pb.set_length(left.len() as u64);
            pb.set_position(0);
        }

        let results = run_bounded(left, width, progress, |id| {
            let task = fetch(id.clone(), last_round);
            async move {
                match task.await? {
                    Some(table) => {
                        store.save(&id, &table)?;
                        Ok(())
                    },
                    None => Err(FetchError::not_found(id)),
                }
            }
        })
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed == 0 {
            break;
        }
        warn!(failed, rounds_left = retries - round, "Some items failed to download");
    }
    store.load()
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Gtf,
    Blasttab,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gtf") => Ok(InputKind::Gtf),
            Some("blasttab") => Ok(InputKind::Blasttab),
            _ => Err(FetchError::invalid_input(format!(
                "{}: expected a .gtf or .blasttab file",
                path.display()
            ))),
        }
    }
}

/// Protein-coding gene ids of a GTF, cached next to it as `.pcg.gene.list`.
/// Without `gene_biotype` attributes every gene is kept.
pub fn protein_coding_genes(gtf: &Path) -> Result<Vec<String>> {
    let cache = with_suffix(gtf, "pcg.gene.list");
    if cache.is_file() {
        let text = std::fs::read_to_string(&cache)?;
        return Ok(text.lines().filter(|l| !l.is_empty()).map(str::to_string).collect());
    }
    let records = read_gff(gtf)?;
    let has_biotype = records.iter().any(|r| r.attr("gene_biotype").is_some());
    let mut seen = HashSet::new();
    let genes: Vec<String> = records
        .iter()
        .filter(|r| !has_biotype || r.attr("gene_biotype") == Some("protein_coding"))
        .filter_map(|r| r.gene_id())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect();
    let mut out = create_text(&cache)?;
    for gene in &genes {
        writeln!(out, "{gene}")?;
    }
    out.flush()?;
    Ok(genes)
}

/// `(gene, accession)` pairs of a BLAST search against UniProt
/// (`sp|ACC|NAME` subjects)
pub fn blast_uniprot_pairs(blasttab: &Path) -> Result<Vec<(String, String)>> {
    let table = Table::read_headerless(blasttab)?;
    let mut seen = HashSet::new();
    Ok((0..table.len())
        .map(|row| {
            let subject = table.cell(row, 1);
            let accession = subject.split('|').nth(1).unwrap_or(subject);
            (table.cell(row, 0).to_string(), accession.to_string())
        })
        .filter(|pair| !pair.0.is_empty() && seen.insert(pair.clone()))
        .collect())
}

/// Output files of [`GoPipeline::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoOutputs {
    pub go_file: PathBuf,
    pub anno_file: PathBuf,
}

/// On the last round a transport error counts as "no data" so the id gets
/// its empty record instead of staying missing
fn settle<T>(result: Result<Option<T>>, id: &str, last_round: bool) -> Result<Option<T>> {
    match result {
        Err(e) if last_round => {
            warn!(id, error = %e, "Giving up, recording an empty result");
            Ok(None)
        },
        other => other,
    }
}

pub struct GoPipeline {
    pub client: UniprotClient,
    pub width: usize,
    pub retries: u32,
}

impl GoPipeline {
    async fn gene_rows(&self, division: Division, gene: String, last_round: bool) -> Result<Option<Table>> {
        let entries = self
            .client
            .gene_entries(&format!("{}:{gene}", division.as_str()))
            .await;
        let entries = match settle(entries, &gene, last_round)? {
            Some(entries) => entries,
            None if last_round => Vec::new(),
            None => return Ok(None),
        };
        let mut rows: Vec<Table> = entries
            .iter()
            .map(|entry| {
                let accession = str_at(entry, "/accession").unwrap_or_default().to_string();
                let mut cells = vec![
                    ("gene_id".to_string(), gene.clone()),
                    ("uniprot_id".to_string(), accession),
                ];
                cells.extend(entry_annotation(entry));
                row_table(cells)
            })
            .collect();
        if rows.is_empty() {
            rows.push(row_table(vec![
                ("gene_id".to_string(), gene),
                ("uniprot_id".to_string(), String::new()),
            ]));
        }
        Ok(Some(concat(rows)))
    }

    async fn protein_rows(&self, accession: String, last_round: bool) -> Result<Option<Table>> {
        let entry = match settle(self.client.protein(&accession).await, &accession, last_round)? {
            Some(entry) => entry,
            None if last_round => Value::Null,
            None => return Ok(None),
        };
        let mut cells = vec![("uniprot_id".to_string(), accession)];
        cells.extend(entry_annotation(&entry));
        Ok(Some(row_table(cells)))
    }

    async fn go_rows(&self, accession: String, last_round: bool) -> Result<Option<Table>> {
        let ids = match settle(self.client.all_go_ids(&accession).await, &accession, last_round)? {
            Some(ids) => ids,
            None if last_round => Vec::new(),
            None => return Ok(None),
        };
        let mut table = Table::new(["go_id", "uniprot_id"]);
        if ids.is_empty() {
            table.push_row([String::new(), accession]);
        } else {
            for id in ids {
                table.push_row([id, accession.clone()]);
            }
        }
        Ok(Some(table))
    }

    async fn term_rows(&self, go_id: String, last_round: bool) -> Result<Option<Table>> {
        let term = match settle(self.client.go_term(&go_id).await, &go_id, last_round)? {
            Some(term) => term,
            None if last_round => None,
            None => return Ok(None),
        };
        let mut table = Table::new(["go_id", "go_term", "go_ontology"]);
        match term {
            Some(term) => table.push_row([go_id, term.name, term.aspect]),
            None => table.push_row([go_id, String::new(), String::new()]),
        }
        Ok(Some(table))
    }

    /// Annotate a `.gtf` (needs the Ensembl division) or a `.blasttab`
    pub async fn run(&self, input: &Path, division: Option<Division>, progress: Option<&ProgressBar>) -> Result<GoOutputs> {
        let kind = InputKind::from_path(input)?;

        let (pairs, annotation) = match kind {
            InputKind::Gtf => {
                let division = division.ok_or_else(|| {
                    FetchError::invalid_input("species is needed to choose the Ensembl server")
                })?;
                let genes = protein_coding_genes(input)?;
                let store = MiddleStore::Dir(with_suffix(input, "uni_id.map"));
                let table = map_rounds(&genes, &store, "gene_id", self.width, self.retries, progress, |gene, last| {
                    self.gene_rows(division, gene, last)
                })
                .await?;
                let gene_col = table.column_index("gene_id")?;
                let acc_col = table.column_index("uniprot_id")?;
                let pairs = (0..table.len())
                    .map(|row| (table.cell(row, gene_col).to_string(), table.cell(row, acc_col).to_string()))
                    .filter(|(_, acc)| !acc.is_empty())
                    .collect::<Vec<_>>();
                (pairs, table)
            },
            InputKind::Blasttab => {
                let pairs = blast_uniprot_pairs(input)?;
                let accessions: Vec<String> = pairs.iter().map(|(_, acc)| acc.clone()).collect();
                let store = MiddleStore::Dir(with_suffix(input, "uni_anno.map"));
                let table = map_rounds(&accessions, &store, "uniprot_id", self.width, self.retries, progress, |acc, last| {
                    self.protein_rows(acc, last)
                })
                .await?;
                (pairs, table)
            },
        };

        let accessions: Vec<String> = pairs.iter().map(|(_, acc)| acc.clone()).collect();
        let go_store = MiddleStore::File(with_suffix(input, "uni_go.map"));
        let go_map = map_rounds(&accessions, &go_store, "uniprot_id", self.width, self.retries, progress, |acc, last| {
            self.go_rows(acc, last)
        })
        .await?;

        let mut go_by_accession: HashMap<String, Vec<String>> = HashMap::new();
        if !go_map.headers.is_empty() {
            let go_col = go_map.column_index("go_id")?;
            let acc_col = go_map.column_index("uniprot_id")?;
            for row in 0..go_map.len() {
                let go_id = go_map.cell(row, go_col);
                if !go_id.is_empty() {
                    let ids = go_by_accession.entry(go_map.cell(row, acc_col).to_string()).or_default();
                    if !ids.iter().any(|i| i == go_id) {
                        ids.push(go_id.to_string());
                    }
                }
            }
        }

        let go_file = with_suffix(input, "go.txt");
        if !go_file.exists() {
            write_gene_go(&go_file, &pairs, &go_by_accession)?;
        }

        let mut go_ids: Vec<String> = go_by_accession.values().flatten().cloned().collect();
        go_ids.sort();
        go_ids.dedup();
        let term_store = MiddleStore::File(with_suffix(input, "go_anno.map"));
        let terms = map_rounds(&go_ids, &term_store, "go_id", self.width, self.retries, progress, |go_id, last| {
            self.term_rows(go_id, last)
        })
        .await?;
        let go_terms = if terms.headers.is_empty() {
            HashMap::new()
        } else {
            terms.to_map("go_id", "go_term")?
        };

        let anno_file = with_suffix(input, "anno.txt");
        let anno = annotation_table(&pairs, &annotation, &go_by_accession, &go_terms)?;
        anno.write(&anno_file)?;
        info!(genes = anno.len(), path = %anno_file.display(), "Wrote annotation table");

        Ok(GoOutputs { go_file, anno_file })
    }
}

/// `gene<TAB>GO:1,GO:2` for genes with at least one GO id, sorted by gene
fn write_gene_go(path: &Path, pairs: &[(String, String)], go_by_accession: &HashMap<String, Vec<String>>) -> Result<()> {
    let mut gene_go = Table::new(["gene_id", "go_id"]);
    for (gene, acc) in pairs {
        for go_id in go_by_accession.get(acc).into_iter().flatten() {
            gene_go.push_row([gene.as_str(), go_id.as_str()]);
        }
    }
    let collapsed = collapse(&gene_go, "gene_id", &CollapseOptions::default())?;
    collapsed.write_to(create_text(path)?, false)?;
    Ok(())
}

/// One row per gene: UniProt annotation joined with GO ids and terms,
/// every column collapsed with `|` and `--` for empty
pub fn annotation_table(
    pairs: &[(String, String)],
    annotation: &Table,
    go_by_accession: &HashMap<String, Vec<String>>,
    go_terms: &HashMap<String, String>,
) -> Result<Table> {
    let mut by_accession: BTreeMap<&str, usize> = BTreeMap::new();
    if !annotation.headers.is_empty() {
        let acc_col = annotation.column_index("uniprot_id")?;
        for row in 0..annotation.len() {
            by_accession.entry(annotation.cell(row, acc_col)).or_insert(row);
        }
    }

    let comments: Vec<&String> = annotation
        .headers
        .iter()
        .filter(|h| h.starts_with(COMMENT_PREFIX))
        .collect();
    let mut headers: Vec<String> = BASE_COLUMNS.iter().map(|h| h.to_string()).collect();
    headers.extend(comments.into_iter().cloned());
    headers.extend(REFERENCE_COLUMNS.iter().map(|h| h.to_string()));
    let sources: Vec<Option<usize>> = headers
        .iter()
        .map(|h| annotation.headers.iter().position(|x| x == h))
        .collect();
    let go_col = headers.iter().position(|h| h == "go_id").unwrap_or_default();
    let term_col = headers.iter().position(|h| h == "go_term").unwrap_or_default();

    let mut wide = Table::new(headers.clone());
    for (gene, acc) in pairs {
        let mut base: Vec<String> = sources
            .iter()
            .map(|src| match (src, by_accession.get(acc.as_str())) {
                (Some(col), Some(row)) => annotation.cell(*row, *col).to_string(),
                _ => String::new(),
            })
            .collect();
        base[0] = gene.clone();
        base[2] = acc.clone();
        let go_ids = go_by_accession.get(acc).cloned().unwrap_or_default();
        if go_ids.is_empty() {
            wide.rows.push(base);
        } else {
            for go_id in go_ids {
                let mut row = base.clone();
                row[term_col] = go_terms.get(&go_id).cloned().unwrap_or_default();
                row[go_col] = go_id;
                wide.rows.push(row);
            }
        }
    }

    let mut out = collapse(
        &wide,
        "gene_id",
        &CollapseOptions {
            sep: "|",
            empty_rep: Some("--"),
            ignore: None,
        },
    )?;

    // drop annotation columns nobody filled
    let keep: Vec<usize> = (0..out.headers.len())
        .filter(|&col| {
            let name = out.headers[col].as_str();
            BASE_COLUMNS.contains(&name)
                || name == "go_id"
                || name == "go_term"
                || (0..out.len()).any(|row| out.cell(row, col) != "--")
        })
        .collect();
    out.headers = keep.iter().map(|&c| out.headers[c].clone()).collect();
    out.rows = out
        .rows
        .iter()
        .map(|row| keep.iter().map(|&c| row.get(c).cloned().unwrap_or_default()).collect())
        .collect();
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> Value {
        json!({
            "accession": "Q0J8C4",
            "gene": [{"name": {"value": "OsKIN1"}}],
            "protein": {"recommendedName": {"fullName": {"value": "Protein kinase"}}},
            "proteinExistence": "Inferred from homology",
            "comments": [{"type": "FUNCTION", "text": [{"value": "Phosphorylates things."}]}],
            "dbReferences": [
                {"type": "InterPro", "id": "IPR000719", "properties": {"entry name": "Prot_kinase_dom"}},
                {"type": "Pfam", "id": "PF00069", "properties": {"entry name": "Pkinase"}},
                {"type": "EnsemblPlants", "id": "Os08t0100100-01"}
            ],
            "features": [
                {"description": "Protein kinase", "evidences": [{"source": {"name": "PROSITE", "id": "PS50011"}}]},
                {"description": "Pkinase", "evidences": [{"source": {"name": "Pfam", "id": "PF00069"}}]},
                {"description": "DSL", "evidences": [{"source": {"name": "X", "id": "1"}}]}
            ],
            "references": [{"citation": {"dbReferences": [{"type": "PubMed", "id": "123"}]}}]
        })
    }

    #[test]
    fn test_entry_annotation() {
        let cells: HashMap<String, String> = entry_annotation(&entry()).into_iter().collect();
        assert_eq!(cells["gene_names"], "OsKIN1");
        assert_eq!(cells["protein_names"], "Protein kinase");
        assert_eq!(cells["uniprot_comments(FUNCTION)"], "Phosphorylates things.");
        assert_eq!(cells["interpro_ids"], "IPR000719");
        assert_eq!(cells["pfam_names"], "Pkinase");
        assert_eq!(cells["feature_dbs"], "PROSITE:PS50011");
        assert_eq!(cells["pubmed_ids"], "123");
        assert!(entry_annotation(&Value::Null).is_empty());
    }

    #[test]
    fn test_middle_file_appends_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let store = MiddleStore::File(dir.path().join("x.uni_go.map"));
        assert!(store.completed("uniprot_id").unwrap().is_empty());
        let mut first = Table::new(["go_id", "uniprot_id"]);
        first.push_row(["GO:1", "P1"]);
        store.save("P1", &first).unwrap();
        let mut second = Table::new(["go_id", "uniprot_id"]);
        second.push_row(["", "P2"]);
        store.save("P2", &second).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        let done = store.completed("uniprot_id").unwrap();
        assert!(done.contains("P1") && done.contains("P2"));
    }

    #[test]
    fn test_middle_dir_one_file_per_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = MiddleStore::Dir(dir.path().join("genes.uni_id.map"));
        store.save("EnsemblPlants:G1", &row_table(vec![("gene_id".into(), "G1".into())])).unwrap();
        assert!(dir.path().join("genes.uni_id.map/G1.txt").is_file());
        assert!(store.completed("gene_id").unwrap().contains("G1"));
    }

    #[tokio::test]
    async fn test_map_rounds_records_empty_on_last_round() {
        let dir = tempfile::tempdir().unwrap();
        let store = MiddleStore::File(dir.path().join("terms.map"));
        let ids = vec!["GO:1".to_string(), "GO:2".to_string()];
        let table = map_rounds(&ids, &store, "go_id", 2, 1, None, |id, last| async move {
            if id == "GO:2" && !last {
                return Ok::<_, FetchError>(None);
            }
            let mut t = Table::new(["go_id", "go_term"]);
            let term = if id == "GO:1" { "root" } else { "" };
            t.push_row([id.as_str(), term]);
            Ok(Some(t))
        })
        .await
        .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_annotation_table_collapses_per_gene() {
        let mut annotation = Table::new(["uniprot_id", "gene_names", "pfam_ids"]);
        annotation.push_row(["P1", "KIN1", "PF1"]);
        annotation.push_row(["P2", "KIN2", ""]);
        let pairs = vec![
            ("g1".to_string(), "P1".to_string()),
            ("g1".to_string(), "P2".to_string()),
            ("g2".to_string(), "P3".to_string()),
        ];
        let go: HashMap<String, Vec<String>> =
            [("P1".to_string(), vec!["GO:1".to_string(), "GO:2".to_string()])].into_iter().collect();
        let terms: HashMap<String, String> = [("GO:1".to_string(), "kinase activity".to_string())].into_iter().collect();

        let out = annotation_table(&pairs, &annotation, &go, &terms).unwrap();
        assert_eq!(
            out.headers,
            vec!["gene_id", "gene_names", "uniprot_id", "protein_names", "protein_existence", "go_id", "go_term", "pfam_ids"]
        );
        assert_eq!(out.rows[0], vec!["g1", "KIN1|KIN2", "P1|P2", "--", "--", "GO:1|GO:2", "kinase activity", "PF1"]);
        assert_eq!(out.rows[1], vec!["g2", "--", "P3", "--", "--", "--", "--", "--"]);
    }

    #[test]
    fn test_blast_uniprot_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let tab = dir.path().join("genes.blasttab");
        std::fs::write(&tab, "g1\tsp|P12345|KIN_ARATH\t90\ng1\tsp|P12345|KIN_ARATH\t80\ng2\tQ99999\t70\n").unwrap();
        assert_eq!(
            blast_uniprot_pairs(&tab).unwrap(),
            vec![("g1".to_string(), "P12345".to_string()), ("g2".to_string(), "Q99999".to_string())]
        );
    }
}
