//! `bwr mapping` commands

use super::written;
use crate::error::{require_exists, Result};
use crate::MappingCommand;
use bwr_formats::io::fmt_float;
use bwr_formats::mapping::{self, SAMTOOLS_HEADER, STAR_HEADER};
use bwr_formats::table::Table;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

pub fn run(command: &MappingCommand) -> Result<()> {
    match command {
        MappingCommand::Samtools {
            mapping_dir,
            sample_inf,
            fai,
            output,
            suffix,
        } => samtools(mapping_dir, sample_inf, fai, output, suffix),
        MappingCommand::Star {
            mapping_dir,
            sample_inf,
            output,
        } => {
            let output = output
                .clone()
                .unwrap_or_else(|| mapping_dir.join("star_mapping.number.txt"));
            star(mapping_dir, sample_inf, &output)
        },
    }
}

/// Distinct, sorted values of one column of a headerless sample table
fn sample_ids(path: &Path, column: usize) -> Result<BTreeSet<String>> {
    require_exists(path)?;
    let table = Table::read_headerless(path)?;
    Ok((0..table.len())
        .map(|row| table.cell(row, column).to_string())
        .filter(|id| !id.is_empty())
        .collect())
}

/// Report text of one sample, `None` when the sample has no report
fn read_report(path: &Path, sample: &str) -> Result<Option<String>> {
    if !path.is_file() {
        warn!(sample, path = %path.display(), "No mapping report, skipping sample");
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}

fn samtools(mapping_dir: &Path, sample_inf: &Path, fai: &Path, output: &Path, suffix: &str) -> Result<()> {
    require_exists(fai)?;
    let genome_length = mapping::genome_length(fai)?;
    let mut table = Table::new(SAMTOOLS_HEADER);
    for sample in sample_ids(sample_inf, 0)? {
        let path = mapping_dir.join(&sample).join(format!("{sample}.{suffix}"));
        let Some(report) = read_report(&path, &sample)? else {
            continue;
        };
        let summary = mapping::samtools_summary(&report, genome_length)?;
        table.push_row([
            sample,
            summary.mapped_reads.to_string(),
            fmt_float(summary.mapping_rate, 3, "NA"),
            fmt_float(summary.average_depth, 3, "NA"),
            fmt_float(summary.coverage_4x, 3, "NA"),
        ]);
    }
    info!(samples = table.len(), genome_length, "Summarised samtools stats");
    table.write(output)?;
    written(output);
    Ok(())
}

fn star(mapping_dir: &Path, sample_inf: &Path, output: &Path) -> Result<()> {
    let mut table = Table::new(STAR_HEADER);
    for sample in sample_ids(sample_inf, 1)? {
        let path = mapping_dir.join(&sample).join("Log.final.out");
        let Some(log) = read_report(&path, &sample)? else {
            continue;
        };
        let summary = mapping::star_summary(&log)?;
        table.push_row([
            sample,
            summary.unique_mapped.to_string(),
            summary.multi_mapped.to_string(),
            fmt_float(summary.unique_rate, 2, "NA"),
            fmt_float(summary.multi_rate, 2, "NA"),
            summary.total_mapped().to_string(),
            fmt_float(summary.total_rate(), 2, "NA"),
        ]);
    }
    info!(samples = table.len(), "Summarised STAR logs");
    table.write(output)?;
    written(output);
    Ok(())
}
