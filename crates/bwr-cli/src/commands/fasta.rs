//! `bwr fasta` commands

use super::{read_ids, written};
use crate::error::{require_exists, Result};
use crate::FastaCommand;
use bwr_formats::annotation::shift_contigs;
use bwr_formats::fasta;
use bwr_formats::io::{create_text, open_text, with_suffix};
use bwr_formats::table::Table;
use colored::Colorize;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

pub fn run(command: &FastaCommand) -> Result<()> {
    match command {
        FastaCommand::Dedup { input, output } => dedup(input, output),
        FastaCommand::MergeContigs {
            genome,
            contigs,
            gtf,
            n_sep,
            name,
        } => merge_contigs(genome, contigs, gtf.as_deref(), *n_sep, name),
    }
}

fn dedup(input: &Path, output: &Path) -> Result<()> {
    require_exists(input)?;
    let (kept, dropped) = fasta::dedup_by_id(fasta::read_records(input)?);
    fasta::write_records(output, &kept)?;
    if dropped > 0 {
        println!("{} Dropped {} duplicate sequence(s)", "!".yellow(), dropped);
    }
    info!(kept = kept.len(), dropped, "Removed duplicate sequences");
    written(output);
    Ok(())
}

fn merge_contigs(genome: &Path, contigs: &Path, gtf: Option<&Path>, n_sep: usize, name: &str) -> Result<()> {
    require_exists(genome)?;
    let ids = read_ids(contigs)?;
    let merged = fasta::merge_contigs(fasta::read_records(genome)?, &ids, n_sep, name);
    if merged.offsets.is_empty() {
        warn!(genome = %genome.display(), "No contig merged, leaving the genome as is");
        return Ok(());
    }

    let genome_out = with_suffix(genome, "merge_ctg.fa");
    fasta::write_records(&genome_out, &merged.records)?;
    written(&genome_out);

    let mut offsets = Table::new(["contig_id", "offset"]);
    for (contig, offset) in &merged.offsets {
        offsets.push_row([contig.clone(), offset.to_string()]);
    }
    let offset_out = with_suffix(genome, "ctg.offset.txt");
    offsets.write(&offset_out)?;
    written(&offset_out);

    if let Some(gtf) = gtf {
        require_exists(gtf)?;
        let ext = gtf
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gtf".to_string());
        let offset_map: HashMap<String, u64> = merged.offsets.into_iter().collect();
        let gtf_out = with_suffix(gtf, &format!("merge_ctg.{ext}"));
        let mut out = create_text(&gtf_out)?;
        let shifted = shift_contigs(open_text(gtf)?, &mut out, &offset_map, name)?;
        out.flush()?;
        info!(features = shifted, "Moved features onto the merged contig");
        written(&gtf_out);
    }
    Ok(())
}
