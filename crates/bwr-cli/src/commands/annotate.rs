//! `bwr annotate go` command implementation

use super::written;
use crate::config::Config;
use crate::error::{require_exists, Result};
use crate::progress;
use crate::AnnotateCommand;
use bwr_fetch::annotation::GoPipeline;
use bwr_fetch::ensembl::detect_division;
use bwr_fetch::uniprot::UniprotClient;
use colored::Colorize;
use tracing::info;

pub async fn run(command: &AnnotateCommand, config: &Config) -> Result<()> {
    match command {
        AnnotateCommand::Go {
            input,
            species,
            ebi_server,
        } => {
            require_exists(input)?;
            let division = match species {
                Some(species) => {
                    println!("{} Looking up {} in Ensembl...", "→".cyan(), species);
                    Some(detect_division(species, &config.rest()).await?)
                },
                None => None,
            };
            let pipeline = GoPipeline {
                client: UniprotClient::new(ebi_server, config.rest())?,
                width: config.concurrency,
                retries: config.retries,
            };
            let spinner = progress::create_spinner("Fetching UniProt and GO annotation...");
            let outputs = pipeline.run(input, division, Some(&spinner)).await;
            spinner.finish_and_clear();
            let outputs = outputs?;
            info!(go = %outputs.go_file.display(), annotation = %outputs.anno_file.display(), "Annotation finished");
            written(&outputs.go_file);
            written(&outputs.anno_file);
            Ok(())
        },
    }
}
