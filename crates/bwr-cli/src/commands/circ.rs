//! `bwr circ` commands

use super::written;
use crate::error::{require_exists, CliError, Result};
use crate::CircCommand;
use bwr_formats::circ::{self, detail, in_silico, stats, AnnotatedCirc, CircType};
use bwr_formats::expression::ExpressionMatrix;
use bwr_formats::gff::read_gff;
use bwr_formats::io::create_text;
use bwr_formats::table::{read_pairs, Table};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

pub fn run(command: &CircCommand) -> Result<()> {
    match command {
        CircCommand::Summary {
            circ_dir,
            gene_type,
            tissue_sample,
            mapping_summary,
            exp_table,
            out_dir,
            circ_type,
            species,
            abbr,
            read_cutoff,
            suffix,
        } => {
            let inputs = SummaryInputs {
                circ_dir,
                gene_type,
                tissue_sample,
                mapping_summary,
                exp_table,
            };
            summary(&inputs, out_dir, circ_type.parse()?, species, abbr, *read_cutoff, suffix)
        },
        CircCommand::InSilico {
            gtf,
            output,
            real_circ_table,
            seed,
        } => in_silico_controls(gtf, output, real_circ_table, *seed),
    }
}

struct SummaryInputs<'a> {
    circ_dir: &'a Path,
    gene_type: &'a Path,
    tissue_sample: &'a Path,
    mapping_summary: &'a Path,
    exp_table: &'a Path,
}

/// Total reads per sample from a mapping summary
fn total_reads(path: &Path) -> Result<HashMap<String, u64>> {
    let table = Table::read(path)?;
    let sample = table.column_index("Sample")?;
    let total = table.column_index("total")?;
    let mut totals = HashMap::new();
    for row in 0..table.len() {
        match table.cell(row, total).parse::<u64>() {
            Ok(n) => {
                totals.insert(table.cell(row, sample).to_string(), n);
            },
            Err(_) => warn!(sample = table.cell(row, sample), "Skipping unreadable read total"),
        }
    }
    Ok(totals)
}

fn summary(
    inputs: &SummaryInputs<'_>,
    out_dir: &Path,
    circ_type: CircType,
    species: &str,
    abbr: &str,
    read_cutoff: u64,
    suffix: &str,
) -> Result<()> {
    for path in [
        inputs.gene_type,
        inputs.tissue_sample,
        inputs.mapping_summary,
        inputs.exp_table,
    ] {
        require_exists(path)?;
    }
    if !inputs.circ_dir.is_dir() {
        return Err(CliError::FileNotFound(inputs.circ_dir.display().to_string()));
    }
    std::fs::create_dir_all(out_dir)?;

    let records = circ::load_combined(inputs.circ_dir, suffix)?;
    let transcripts = circ::read_transcript_annotation(inputs.gene_type)?;
    let circs = circ::annotate(records, read_cutoff, circ_type, &transcripts)?;
    let kind = circ_type.as_str();
    let sp = circ::species_common_name(species);
    info!(circs = circs.len(), circ_type = kind, species = sp, "Annotated circRNAs");

    let path = out_dir.join(format!("{sp}.{kind}.stats.txt"));
    let mut out = create_text(&path)?;
    stats::write_stats(&mut out, &stats::basic_stats(&circs))?;
    out.flush()?;
    written(&path);

    let totals = total_reads(inputs.mapping_summary)?;
    let path = out_dir.join(format!("{kind}.stats.sample.txt"));
    let mut out = create_text(&path)?;
    stats::write_sample_stats(&mut out, sp, &stats::sample_stats(&circs, &totals))?;
    out.flush()?;
    written(&path);

    let names = detail::name_circs(&circs, abbr);
    let expression = ExpressionMatrix::read(inputs.exp_table)?;
    let mut tissue_samples: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut sample_tissue = HashMap::new();
    for (tissue, sample) in read_pairs(inputs.tissue_sample)? {
        tissue_samples.entry(tissue.clone()).or_default().insert(sample.clone());
        sample_tissue.insert(sample, tissue);
    }

    for (tissue, samples) in &tissue_samples {
        let members: Vec<&AnnotatedCirc> = circs
            .iter()
            .filter(|c| samples.contains(&c.record.sample_id))
            .collect();
        if members.is_empty() {
            warn!(tissue = %tissue, "No circRNA passed the filters in this tissue");
            continue;
        }
        let host_samples: Vec<String> = samples.iter().cloned().collect();
        let table = detail::detail_table(&members, &names, &expression, &host_samples, None);
        let path = out_dir.join(format!("{sp}.{tissue}.{kind}.detail.txt"));
        table.write(&path)?;
        written(&path);
    }

    let all: Vec<&AnnotatedCirc> = circs.iter().collect();
    let all_samples: Vec<String> = sample_tissue.keys().cloned().collect::<BTreeSet<_>>().into_iter().collect();
    let table = detail::detail_table(&all, &names, &expression, &all_samples, Some(&sample_tissue));
    let path = out_dir.join(format!("{sp}.{kind}.detail.txt"));
    table.write(&path)?;
    written(&path);
    Ok(())
}

fn in_silico_controls(gtf: &Path, output: &Path, real_table: &Path, seed: u64) -> Result<()> {
    require_exists(gtf)?;
    require_exists(real_table)?;
    let real = in_silico::RealCircs::from_table(&Table::read(real_table)?)?;
    let candidates = in_silico::candidates(&read_gff(gtf)?, &real);
    info!(real = real.count, candidates = candidates.len(), seed, "Sampling in-silico circRNAs");
    in_silico::sample(&candidates, real.count, seed).write(output)?;
    written(output);
    Ok(())
}
