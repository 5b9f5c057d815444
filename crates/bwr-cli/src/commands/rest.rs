//! `bwr rest` command implementation

use super::written;
use crate::config::Config;
use crate::error::{require_exists, CliError, Result};
use crate::progress;
use crate::RestCommand;
use bwr_fetch::ensembl::EnsemblClient;
use bwr_fetch::orthologues::OrthologueJob;
use bwr_fetch::protein_seq::{self, ProteinSeqJob};
use bwr_fetch::scrape::Scraper;
use bwr_fetch::FetchError;
use colored::Colorize;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub async fn run(command: &RestCommand, config: &Config) -> Result<()> {
    match command {
        RestCommand::Variants {
            species,
            symbol,
            server,
        } => {
            let client = EnsemblClient::new(server, config.rest())?;
            match client.symbol_variants(species, symbol).await? {
                Some(variants) if !variants.is_empty() => {
                    for variant in &variants {
                        println!("{variant}");
                    }
                },
                Some(_) => println!("No variants overlap {symbol}"),
                None => println!("{} No gene '{}' in {}", "✗".red(), symbol, species),
            }
            Ok(())
        },
        RestCommand::Orthologues {
            id_map,
            out_dir,
            taxon,
            server,
        } => {
            require_exists(id_map)?;
            let client = EnsemblClient::new(server, config.rest())?;
            let job = OrthologueJob {
                client: &client,
                taxon: *taxon,
                width: config.concurrency,
            };
            let spinner = progress::create_spinner("Fetching orthologues...");
            let outputs = job.run(id_map, out_dir, Some(&spinner)).await;
            spinner.finish_and_clear();
            let outputs = outputs?;
            written(&outputs.meta_table);
            written(&outputs.orthologue_table);
            written(&outputs.sequences);
            CliError::check_summary("orthologue sequence download", outputs.sequence_summary)
        },
        RestCommand::ProteinSeq {
            id_list,
            out_dir,
            name_map,
            pause,
            server,
            site,
        } => {
            let ids = read_id_lines(id_list)?;
            let name_map = match name_map {
                Some(path) => {
                    require_exists(path)?;
                    protein_seq::read_name_map(path)?
                },
                None => HashMap::new(),
            };
            let client = EnsemblClient::new(server, config.rest())?;
            let search = Scraper::new(config.timeout, config.retries)?;
            let job = ProteinSeqJob {
                client: &client,
                search: &search,
                site: Url::parse(site).map_err(FetchError::from)?,
                name_map,
                pause: Duration::from_secs(*pause),
            };
            let pb = progress::create_progress_bar(ids.len() as u64, "Resolving protein ids");
            let outputs = job.run(&ids, out_dir, Some(&pb)).await;
            pb.finish_and_clear();
            let outputs = outputs?;
            let summary = &outputs.summary;
            println!(
                "{} {} resolved, {} not found, {} failed, {} already mapped",
                "→".cyan(),
                summary.resolved,
                summary.not_found,
                summary.failed,
                summary.skipped
            );
            written(&outputs.id_map);
            written(&outputs.sequences);
            if summary.failed > 0 {
                return Err(CliError::Incomplete {
                    what: "protein id lookups".to_string(),
                    failed: summary.failed,
                    total: summary.resolved + summary.not_found + summary.failed,
                });
            }
            Ok(())
        },
    }
}

/// Ids in file order, one per non-empty line
fn read_id_lines(path: &Path) -> Result<Vec<String>> {
    require_exists(path)?;
    let mut ids = Vec::new();
    for line in bwr_formats::io::open_text(path)?.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            ids.push(line.trim().to_string());
        }
    }
    Ok(ids)
}
