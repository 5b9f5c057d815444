//! Orthologue tables and their genomic sequences
//!
//! Both steps resume: ids already in `meta_table.txt` are not asked for
//! again, and orthologues already in the FASTA are not downloaded twice.

use crate::annotation::MiddleStore;
use crate::bounded::{run_bounded, FetchSummary};
use crate::ensembl::EnsemblClient;
use crate::error::{FetchError, Result};
use bwr_formats::fasta::records;
use bwr_formats::table::{read_pairs, Table};
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const META_TABLE: &str = "meta_table.txt";
pub const ORTHOLOGUE_TABLE: &str = "orthologues_table.txt";
pub const SEQUENCE_FILE: &str = "ensembl.orthologues.genomic.seq.fa";

pub const META_COLUMNS: [&str; 5] = ["Ensembl_id", "Protein_id", "Orthologue", "Target_percent", "Query_percent"];

/// Identity both sides must exceed to keep a pair
pub const MIN_PERCENT: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct OrthologueOutputs {
    pub meta_table: PathBuf,
    pub orthologue_table: PathBuf,
    pub sequences: PathBuf,
    pub sequence_summary: FetchSummary,
}

pub struct OrthologueJob<'a> {
    pub client: &'a EnsemblClient,
    pub taxon: u32,
    pub width: usize,
}

impl OrthologueJob<'_> {
    async fn meta_rows(&self, ensembl_id: String, protein_id: String) -> Result<Table> {
        let found = self
            .client
            .orthologues(&ensembl_id, self.taxon)
            .await?
            .ok_or_else(|| FetchError::not_found(format!("homologies of {ensembl_id}")))?;
        let mut table = Table::new(META_COLUMNS);
        if found.is_empty() {
            table.push_row([ensembl_id.as_str(), protein_id.as_str(), "None", "0", "0"]);
        }
        for orthologue in found {
            table.push_row([
                ensembl_id.clone(),
                protein_id.clone(),
                orthologue.target_id,
                orthologue.target_percent.to_string(),
                orthologue.query_percent.to_string(),
            ]);
        }
        Ok(table)
    }

    /// Fetch orthologues for every `(protein id, Ensembl id)` line of
    /// `id_map`, then the genomic sequences of the well-matched ones
    pub async fn run(&self, id_map: &Path, out_dir: &Path, progress: Option<&ProgressBar>) -> Result<OrthologueOutputs> {
        std::fs::create_dir_all(out_dir)?;
        let meta_path = out_dir.join(META_TABLE);
        let store = MiddleStore::File(meta_path.clone());

        let done = store.completed("Ensembl_id")?;
        let mut seen = HashSet::new();
        let left: Vec<(String, String)> = read_pairs(id_map)?
            .into_iter()
            .filter(|(_, ensembl)| !ensembl.is_empty() && !done.contains(ensembl) && seen.insert(ensembl.clone()))
            .collect();

        if left.is_empty() {
            info!("Orthologue table already complete");
        } else {
            info!(ids = left.len(), "Fetching orthologues");
            if let Some(pb) = progress {
                pb.set_length(left.len() as u64);
            }
            let store = &store;
            let results = run_bounded(left, self.width, progress, |(protein_id, ensembl_id)| async move {
                let table = self.meta_rows(ensembl_id.clone(), protein_id).await?;
                store.save(&ensembl_id, &table)
            })
            .await;
            let summary = FetchSummary::from_results(&results);
            if summary.failed > 0 {
                warn!(failed = summary.failed, "Some ids failed, rerun to resume");
            }
        }

        let meta = store.load()?;
        let orthologue_path = out_dir.join(ORTHOLOGUE_TABLE);
        let kept = well_matched(&meta)?;
        kept.write(&orthologue_path)?;
        info!(pairs = kept.len(), path = %orthologue_path.display(), "Wrote orthologue table");

        let sequence_path = out_dir.join(SEQUENCE_FILE);
        let sequence_summary = self
            .append_sequences(&kept.column("Orthologue")?, &sequence_path, progress)
            .await?;

        Ok(OrthologueOutputs {
            meta_table: meta_path,
            orthologue_table: orthologue_path,
            sequences: sequence_path,
            sequence_summary,
        })
    }

    async fn append_sequences(&self, ids: &[&str], path: &Path, progress: Option<&ProgressBar>) -> Result<FetchSummary> {
        let mut present = HashSet::new();
        if path.is_file() {
            for record in records(path)? {
                present.insert(record?.id().to_string());
            }
        }
        let mut seen = HashSet::new();
        let left: Vec<String> = ids
            .iter()
            .filter(|id| !present.contains(**id) && seen.insert(**id))
            .map(|id| id.to_string())
            .collect();
        if left.is_empty() {
            info!("Orthologue sequences already downloaded");
            return Ok(FetchSummary::default());
        }

        if let Some(pb) = progress {
            pb.set_length(left.len() as u64);
            pb.set_position(0);
        }
        let results = run_bounded(left, self.width, progress, |id| async move {
            let fasta = self
                .client
                .genomic_sequence(&id)
                .await?
                .ok_or_else(|| FetchError::not_found(format!("sequence of {id}")))?;
            let mut out = OpenOptions::new().create(true).append(true).open(path)?;
            out.write_all(fasta.as_bytes())?;
            if !fasta.ends_with('\n') {
                out.write_all(b"\n")?;
            }
            Ok(())
        })
        .await;
        Ok(FetchSummary::from_results(&results))
    }
}

/// Rows whose target and query identity are both above [`MIN_PERCENT`]
pub fn well_matched(meta: &Table) -> Result<Table> {
    let mut out = Table::new(META_COLUMNS);
    if meta.headers.is_empty() {
        return Ok(out);
    }
    let orthologue = meta.column_index("Orthologue")?;
    let target = meta.column_index("Target_percent")?;
    let query = meta.column_index("Query_percent")?;
    let percent = |row: usize, col: usize| meta.cell(row, col).parse::<f64>().unwrap_or(0.0);
    for row in 0..meta.len() {
        if meta.cell(row, orthologue) == "None" {
            continue;
        }
        if percent(row, target) > MIN_PERCENT && percent(row, query) > MIN_PERCENT {
            out.rows.push(meta.rows[row].clone());
        }
    }
    Ok(out)
}
