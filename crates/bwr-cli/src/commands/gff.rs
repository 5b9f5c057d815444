//! `bwr gff` commands

use super::{read_ids, written};
use crate::error::{require_exists, Result};
use crate::{GffCommand, MergeUnit};
use bwr_formats::annotation::{self, MergeBy, MergeOptions, RenameRule};
use bwr_formats::gff::{read_gff, write_gff, AttributeStyle};
use bwr_formats::io::{create_text, fmt_float, with_suffix};
use bwr_formats::table::Table;
use bwr_formats::{bed, fasta};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn run(command: &GffCommand) -> Result<()> {
    match command {
        GffCommand::GeneLength { gtf, output } => gene_length(gtf, output),
        GffCommand::GeneBed {
            gtf,
            output,
            zero_based,
        } => gene_bed(gtf, output, *zero_based),
        GffCommand::Biotypes { gtf, out_dir } => biotypes(gtf, out_dir),
        GffCommand::AssemblyCoverage {
            gtf,
            compare,
            output,
            species,
        } => assembly_coverage(gtf, compare, output, species),
        GffCommand::MergeFeature {
            raw_gff,
            feature_gff,
            out_prefix,
            by,
            no_rename,
            rm_gene,
            old_prefix,
            name_prefix,
        } => {
            let removed_genes = match rm_gene {
                Some(path) => read_ids(path)?,
                None => HashSet::new(),
            };
            let options = MergeOptions {
                by: match by {
                    MergeUnit::Tr => MergeBy::Transcript,
                    MergeUnit::Gene => MergeBy::Gene,
                },
                removed_genes,
            };
            let rename = if *no_rename {
                None
            } else {
                Some(RenameRule::new(old_prefix, name_prefix.as_str())?)
            };
            merge_feature(raw_gff, feature_gff, out_prefix, &options, rename.as_ref())
        },
        GffCommand::SplitByBed { bed, genome, gtf } => split_by_bed(bed, genome.as_deref(), gtf.as_deref()),
    }
}

fn gene_length(gtf: &Path, output: &Path) -> Result<()> {
    require_exists(gtf)?;
    let lengths = annotation::gene_lengths(&read_gff(gtf)?);
    let mut out = create_text(output)?;
    for (gene, length) in &lengths {
        writeln!(out, "{gene}\t{length}")?;
    }
    out.flush()?;
    info!(genes = lengths.len(), "Computed gene lengths");
    written(output);
    Ok(())
}

fn gene_bed(gtf: &Path, output: &Path, zero_based: bool) -> Result<()> {
    require_exists(gtf)?;
    let beds = annotation::gene_bed(&read_gff(gtf)?, zero_based);
    let mut out = create_text(output)?;
    for bed in &beds {
        writeln!(out, "{}", bed.to_line())?;
    }
    out.flush()?;
    written(output);
    Ok(())
}

fn biotypes(gtf: &Path, out_dir: &Path) -> Result<()> {
    require_exists(gtf)?;
    let tables = annotation::biotype_tables(&read_gff(gtf)?);
    for (name, table) in [
        ("gene_type.txt", &tables.genes),
        ("transcript_type.txt", &tables.transcripts),
    ] {
        let path = out_dir.join(name);
        table.write(&path)?;
        written(&path);
    }
    Ok(())
}

fn assembly_coverage(gtf: &Path, compare: &Path, output: &Path, species: &str) -> Result<()> {
    require_exists(gtf)?;
    require_exists(compare)?;
    let rows = annotation::assembly_coverage(&read_gff(gtf)?, &Table::read(compare)?)?;
    let mut out = create_text(output)?;
    for row in &rows {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{species}",
            row.biotype,
            row.reference,
            row.assembly,
            fmt_float(row.coverage(), 3, "NA")
        )?;
    }
    out.flush()?;
    written(output);
    Ok(())
}

fn merge_feature(
    raw_gff: &Path,
    feature_gff: &Path,
    out_prefix: &str,
    options: &MergeOptions,
    rename: Option<&RenameRule>,
) -> Result<()> {
    require_exists(raw_gff)?;
    require_exists(feature_gff)?;
    let merged = annotation::merge_feature_gff(read_gff(raw_gff)?, read_gff(feature_gff)?, options)?;
    info!(features = merged.features.len(), by = ?options.by, "Merged feature annotation");

    let gff_path = PathBuf::from(format!("{out_prefix}.gff"));
    let mut out = create_text(&gff_path)?;
    merged.write_gff3(&mut out, rename)?;
    out.flush()?;
    written(&gff_path);

    let gtf_path = PathBuf::from(format!("{out_prefix}.gtf"));
    let mut out = create_text(&gtf_path)?;
    merged.write_gtf(&mut out, rename)?;
    out.flush()?;
    written(&gtf_path);
    Ok(())
}

fn split_by_bed(bed_path: &Path, genome: Option<&Path>, gtf: Option<&Path>) -> Result<()> {
    require_exists(bed_path)?;
    let intervals = bed::read_bed(bed_path)?;

    if let Some(genome) = genome {
        require_exists(genome)?;
        let pieces = fasta::extract_regions(genome, &intervals)?;
        let path = with_suffix(genome, "splitChr.fa");
        fasta::write_records(&path, &pieces)?;
        info!(sequences = pieces.len(), "Split genome");
        written(&path);
    }

    if let Some(gtf) = gtf {
        require_exists(gtf)?;
        let ext = gtf
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gtf".to_string());
        let records = annotation::split_by_intervals(read_gff(gtf)?, &intervals);
        let path = with_suffix(gtf, &format!("splitChr.{ext}"));
        let mut out = create_text(&path)?;
        write_gff(&mut out, &records, AttributeStyle::from_path(gtf))?;
        out.flush()?;
        written(&path);
    }
    Ok(())
}
