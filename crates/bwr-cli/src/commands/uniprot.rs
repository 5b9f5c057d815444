//! `bwr uniprot` commands

use super::written;
use crate::error::{require_exists, Result};
use crate::UniprotCommand;
use bwr_formats::uniprot;
use tracing::info;

pub fn run(command: &UniprotCommand) -> Result<()> {
    match command {
        UniprotCommand::Describe { dat, output } => {
            require_exists(dat)?;
            let table = uniprot::describe(dat)?;
            info!(entries = table.len(), "Described UniProt entries");
            table.write(output)?;
            written(output);
        },
        UniprotCommand::Uniref { fasta, output } => {
            require_exists(fasta)?;
            let table = uniprot::uniref_clusters(fasta)?;
            info!(clusters = table.len(), "Described UniRef clusters");
            table.write(output)?;
            written(output);
        },
    }
    Ok(())
}
