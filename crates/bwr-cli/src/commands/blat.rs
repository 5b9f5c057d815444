//! `bwr blat` commands

use super::written;
use crate::error::{require_exists, CliError, Result};
use crate::BlatCommand;
use bwr_formats::psl;
use std::path::Path;
use tracing::info;

pub fn run(command: &BlatCommand) -> Result<()> {
    match command {
        BlatCommand::ToGtf { psl, prefix, cutoff } => to_gtf(psl, prefix.as_deref(), *cutoff),
    }
}

fn to_gtf(psl_path: &Path, prefix: Option<&str>, cutoff: f64) -> Result<()> {
    require_exists(psl_path)?;
    if !(0.0..=1.0).contains(&cutoff) {
        return Err(CliError::invalid_argument(format!("coverage cutoff {cutoff} is outside 0-1")));
    }
    let prefix = match prefix {
        Some(prefix) => prefix.to_string(),
        None => psl_path.with_extension("").to_string_lossy().into_owned(),
    };

    let hits = psl::read_psl_file(psl_path)?;
    let best = psl::best_hits(&hits);
    info!(hits = hits.len(), best = best.len(), "Read PSL hits");

    let mut outputs = psl::write_gtf_sets(hits, &prefix, "all", cutoff)?;
    outputs.extend(psl::write_gtf_sets(best, &prefix, "best", cutoff)?);
    for path in &outputs {
        written(path);
    }
    Ok(())
}
