//! Ensembl Genomes plant release files

use crate::bounded::{run_bounded, FetchSummary};
use crate::error::{FetchError, Result};
use crate::ftp::{DownloadOutcome, FtpClient};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

pub const ENSEMBL_GENOMES_HOST: &str = "ftp.ensemblgenomes.org";

/// `"Oryza sativa"` -> `oryza_sativa`
pub fn normalize_species(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn capitalize(species: &str) -> String {
    let mut chars = species.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Cds,
    Pep,
    Gtf,
    /// Small `.fai` index, handy for checking connectivity
    DnaIndex,
}

impl FromStr for FileKind {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cds" => Ok(FileKind::Cds),
            "pep" => Ok(FileKind::Pep),
            "gtf" => Ok(FileKind::Gtf),
            "dna-index" | "dna_index" | "test" => Ok(FileKind::DnaIndex),
            other => Err(FetchError::invalid_input(format!(
                "unknown Ensembl file kind '{other}' (cds, pep, gtf, dna-index)"
            ))),
        }
    }
}

/// Path layout of one plants release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlantsRelease(pub u32);

impl PlantsRelease {
    fn base(&self) -> String {
        format!("/pub/plants/release-{}", self.0)
    }

    pub fn cds_dir(&self, species: &str) -> String {
        format!("{}/fasta/{species}/cds/", self.base())
    }

    pub fn file_path(&self, species: &str, genome_version: &str, kind: FileKind) -> String {
        let prefix = format!("{}.{genome_version}", capitalize(species));
        let base = self.base();
        match kind {
            FileKind::Cds => format!("{base}/fasta/{species}/cds/{prefix}.cds.all.fa.gz"),
            FileKind::Pep => format!("{base}/fasta/{species}/pep/{prefix}.pep.all.fa.gz"),
            FileKind::Gtf => format!("{base}/gtf/{species}/{prefix}.{}.gtf.gz", self.0),
            FileKind::DnaIndex => {
                format!("{base}/fasta/{species}/dna_index/{prefix}.dna.toplevel.fa.gz.fai")
            },
        }
    }
}

/// Genome version from a cds listing: `<Species>.<gv>.cds.all.fa.gz`
pub fn genome_version<'a>(species: &str, names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let prefix = format!("{}.", capitalize(species));
    names.into_iter().find_map(|name| {
        name.strip_prefix(&prefix)?
            .strip_suffix(".cds.all.fa.gz")
            .filter(|gv| !gv.is_empty())
            .map(str::to_string)
    })
}

pub async fn discover_genome_version(client: &FtpClient, release: PlantsRelease, species: &str) -> Result<String> {
    let entries = client.list_files(&release.cds_dir(species)).await?;
    genome_version(species, entries.iter().map(|e| e.name.as_str()))
        .ok_or_else(|| FetchError::not_found(format!("cds listing for {species} in release {}", release.0)))
}

/// Download the requested kinds for every species into `out_dir`
pub async fn download_species(
    client: &FtpClient,
    species: &[String],
    release: PlantsRelease,
    kinds: &[FileKind],
    out_dir: &Path,
    width: usize,
    progress: Option<&ProgressBar>,
) -> Result<FetchSummary> {
    let species: Vec<String> = species.iter().map(|s| normalize_species(s)).collect();
    let versions = run_bounded(species.clone(), width, None, |sp| async move {
        let gv = discover_genome_version(client, release, &sp).await?;
        Ok((sp, gv))
    })
    .await;

    let mut found: HashMap<String, String> = HashMap::new();
    for result in versions {
        match result {
            Ok((sp, gv)) => {
                info!(species = %sp, genome_version = %gv, "Found genome version");
                found.insert(sp, gv);
            },
            Err(e) => warn!(error = %e, "Genome version lookup failed"),
        }
    }
    let lookup_failed = species.len() - found.len();

    let mut paths = Vec::new();
    for sp in &species {
        if let Some(gv) = found.get(sp) {
            for kind in kinds {
                paths.push(release.file_path(sp, gv, *kind));
            }
        }
    }
    if let Some(pb) = progress {
        pb.set_length(paths.len() as u64);
    }

    std::fs::create_dir_all(out_dir)?;
    let results = run_bounded(paths, width, progress, |remote| async move {
        let name = remote.rsplit('/').next().unwrap_or(&remote).to_string();
        let local: PathBuf = out_dir.join(name);
        let outcome: DownloadOutcome = client.download_resumable(&remote, &local).await?;
        Ok(outcome)
    })
    .await;

    let mut summary = FetchSummary::from_results(&results);
    summary.total += lookup_failed;
    summary.failed += lookup_failed;
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_species() {
        assert_eq!(normalize_species("Oryza  sativa"), "oryza_sativa");
        assert_eq!(normalize_species("zea_mays"), "zea_mays");
    }

    #[test]
    fn test_file_paths() {
        let release = PlantsRelease(40);
        assert_eq!(
            release.file_path("oryza_sativa", "IRGSP-1.0", FileKind::Gtf),
            "/pub/plants/release-40/gtf/oryza_sativa/Oryza_sativa.IRGSP-1.0.40.gtf.gz"
        );
        assert_eq!(
            release.file_path("oryza_sativa", "IRGSP-1.0", FileKind::Pep),
            "/pub/plants/release-40/fasta/oryza_sativa/pep/Oryza_sativa.IRGSP-1.0.pep.all.fa.gz"
        );
        assert_eq!(release.cds_dir("zea_mays"), "/pub/plants/release-40/fasta/zea_mays/cds/");
    }

    #[test]
    fn test_genome_version_from_listing() {
        let names = ["CHECKSUMS", "README", "Zea_mays.B73_RefGen_v4.cds.all.fa.gz"];
        assert_eq!(genome_version("zea_mays", names).as_deref(), Some("B73_RefGen_v4"));
        assert_eq!(genome_version("oryza_sativa", names), None);
    }

    #[test]
    fn test_file_kind_from_str() {
        assert_eq!("pep".parse::<FileKind>().unwrap(), FileKind::Pep);
        assert!("bam".parse::<FileKind>().is_err());
    }
}
