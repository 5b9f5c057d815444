//! `bwr fetch` command implementation
//!
//! Bulk downloads from the NCBI and Ensembl Genomes FTP servers and from
//! HTML download pages.

use crate::config::Config;
use crate::error::{CliError, Result};
use crate::progress;
use crate::{BlastdbCommand, FetchCommand};
use bwr_fetch::blastdb::{self, BlastDbDownload, NCBI_HOST};
use bwr_fetch::ensembl_ftp::{self, FileKind, PlantsRelease, ENSEMBL_GENOMES_HOST};
use bwr_fetch::ftp::FtpClient;
use bwr_fetch::scrape::Scraper;
use colored::Colorize;
use std::path::Path;
use url::Url;

pub async fn run(command: &FetchCommand, config: &Config) -> Result<()> {
    match command {
        FetchCommand::Blastdb { command } => blastdb(command, config).await,
        FetchCommand::Ensembl {
            species,
            release,
            kinds,
            out_dir,
        } => {
            let kinds = kinds
                .iter()
                .map(|k| k.parse::<FileKind>())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ensembl(species, PlantsRelease(*release), &kinds, out_dir, config).await
        },
        FetchCommand::Scrape { url, out_dir } => scrape(url, out_dir, config).await,
    }
}

async fn blastdb(command: &BlastdbCommand, config: &Config) -> Result<()> {
    let client = FtpClient::new(config.ftp(NCBI_HOST));
    match command {
        BlastdbCommand::List { name } => {
            let spinner = progress::create_spinner("Listing BLAST databases...");
            let volumes = blastdb::list_volumes(&client, name.as_deref()).await;
            spinner.finish_and_clear();
            let names = blastdb::database_names(&volumes?);
            if names.is_empty() {
                println!("No database matched");
            } else {
                println!("{}", blastdb::format_database_table(&names));
            }
            Ok(())
        },
        BlastdbCommand::Download {
            name,
            out_dir,
            no_md5,
            extract,
        } => {
            let volumes = blastdb::list_volumes(&client, Some(name.as_str())).await?;
            if volumes.is_empty() {
                return Err(CliError::invalid_argument(format!("no BLAST database matches '{name}'")));
            }
            println!("{} Downloading {} volume(s) of '{}'", "↓".cyan(), volumes.len(), name);
            let options = BlastDbDownload {
                out_dir: out_dir.clone(),
                width: config.concurrency,
                verify_md5: !no_md5,
                extract: *extract,
            };
            let pb = progress::create_progress_bar(volumes.len() as u64, name);
            let summary = blastdb::download(&client, volumes, &options, Some(&pb)).await?;
            pb.finish_and_clear();
            println!("{} {}/{} volume(s) ready", "✓".green(), summary.succeeded, summary.total);
            CliError::check_summary("BLAST database download", summary)
        },
    }
}

async fn ensembl(species: &[String], release: PlantsRelease, kinds: &[FileKind], out_dir: &Path, config: &Config) -> Result<()> {
    let client = FtpClient::new(config.ftp(ENSEMBL_GENOMES_HOST));
    println!("{} Downloading release {} files for {} species", "↓".cyan(), release.0, species.len());
    let pb = progress::create_progress_bar((species.len() * kinds.len()) as u64, "Ensembl Plants");
    let summary = ensembl_ftp::download_species(
        &client,
        species,
        release,
        kinds,
        out_dir,
        config.concurrency,
        Some(&pb),
    )
    .await?;
    pb.finish_and_clear();
    println!("{} {}/{} file(s) downloaded", "✓".green(), summary.succeeded, summary.total);
    CliError::check_summary("Ensembl download", summary)
}

async fn scrape(url: &str, out_dir: &Path, config: &Config) -> Result<()> {
    let url = Url::parse(url).map_err(|e| CliError::invalid_argument(format!("invalid URL '{url}': {e}")))?;
    let scraper = Scraper::new(config.timeout, config.retries)?;
    let spinner = progress::create_spinner(&format!("Downloading files linked from {url}"));
    let summary = scraper
        .download_linked(&url, out_dir, config.concurrency, Some(&spinner))
        .await;
    spinner.finish_and_clear();
    let summary = summary?;
    println!("{} {}/{} file(s) downloaded", "✓".green(), summary.succeeded, summary.total);
    CliError::check_summary("page download", summary)
}
