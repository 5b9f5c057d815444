//! Cross references from UniProt flat files (`.dat`) and UniRef cluster
//! descriptions from UniRef FASTA headers

use crate::fasta;
use crate::io::open_text;
use crate::table::Table;
use bwr_common::{BwrError, Result};
use regex::Regex;
use std::io::BufRead;
use std::path::Path;
use std::sync::LazyLock;

pub const DESCRIPTION_HEADER: [&str; 4] =
    ["uniprot_id", "ensembl_id", "interpro_id", "interpro_description"];

const EMPTY: &str = "--";

pub const UNIREF_HEADER: [&str; 6] = [
    "UniqueIdentifier",
    "ClusterName",
    "Members",
    "TaxonName",
    "TaxonIdentifier",
    "RepresentativeMember",
];

#[allow(clippy::expect_used)]
static UNIREF_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*) n=(\d+) Tax=(.*) TaxID=(\d+) RepID=(\w+)").expect("valid regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniprotDescription {
    pub uniprot_id: String,
    pub ensembl_ids: Vec<String>,
    pub interpro_ids: Vec<String>,
    pub interpro_descriptions: Vec<String>,
}

impl UniprotDescription {
    fn row(&self) -> Vec<String> {
        let join = |values: &[String]| {
            if values.is_empty() {
                EMPTY.to_string()
            } else {
                values.join("|")
            }
        };
        vec![
            if self.uniprot_id.is_empty() {
                EMPTY.to_string()
            } else {
                self.uniprot_id.clone()
            },
            join(&self.ensembl_ids),
            join(&self.interpro_ids),
            join(&self.interpro_descriptions),
        ]
    }
}

fn field(line: &str, idx: usize) -> Option<String> {
    line.split(';')
        .nth(idx)
        .map(|f| f.trim().trim_end_matches('.').to_string())
}

/// Parse entries terminated by `//`. The id is the primary (first) accession
/// of the first `AC` line.
pub fn parse_entries<R: BufRead>(reader: R) -> Result<Vec<UniprotDescription>> {
    let mut entries = Vec::new();
    let mut current = UniprotDescription::default();
    for line in reader.lines() {
        let line = line?;
        if let Some(rest) = line.strip_prefix("AC ") {
            if current.uniprot_id.is_empty() {
                current.uniprot_id = rest
                    .split(';')
                    .next()
                    .map(|acc| acc.trim().to_string())
                    .unwrap_or_default();
            }
        } else if line.starts_with("DR ") && line.contains("EnsemblPlants;") {
            if let Some(id) = line.rsplit(';').next() {
                current
                    .ensembl_ids
                    .push(id.trim().trim_end_matches('.').to_string());
            }
        } else if line.starts_with("DR ") && line.contains("InterPro;") {
            if let (Some(id), Some(desc)) = (field(&line, 1), field(&line, 2)) {
                current.interpro_ids.push(id);
                current.interpro_descriptions.push(desc);
            }
        } else if line.starts_with("//") {
            entries.push(std::mem::take(&mut current));
        }
    }
    Ok(entries)
}

/// Description table of a (optionally gzipped) flat file
pub fn describe(path: impl AsRef<Path>) -> Result<Table> {
    let mut table = Table::new(DESCRIPTION_HEADER);
    for entry in parse_entries(open_text(path)?)? {
        table.rows.push(entry.row());
    }
    Ok(table)
}

/// Split the description of a UniRef header
/// (`<name> n=<members> Tax=<taxon> TaxID=<id> RepID=<member>`)
/// into the [`UNIREF_HEADER`] columns after the cluster id
pub fn uniref_fields(description: &str) -> Option<[&str; 5]> {
    let caps = UNIREF_DESCRIPTION.captures(description)?;
    let group = |i| caps.get(i).map_or("", |m| m.as_str());
    Some([group(1), group(2), group(3), group(4), group(5)])
}

/// One row per cluster of a UniRef FASTA file
pub fn uniref_clusters(path: impl AsRef<Path>) -> Result<Table> {
    let mut table = Table::new(UNIREF_HEADER);
    for record in fasta::records(path)? {
        let record = record?;
        let description = record.desc().unwrap_or_default();
        let fields = uniref_fields(description).ok_or_else(|| {
            BwrError::invalid_input(format!(
                "unexpected UniRef header: {} {description}",
                record.id()
            ))
        })?;
        table.push_row(std::iter::once(record.id()).chain(fields));
    }
    Ok(table)
}
