//! `bwr bed` commands

use super::written;
use crate::error::{require_exists, Result};
use crate::{BedCommand, NeighbourLevel};
use bwr_formats::bed::{self, neighbour_columns, Neighbours, TranscriptInfo};
use bwr_formats::fasta;
use bwr_formats::io::fmt_float;
use bwr_formats::table::Table;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

const TRANSCRIPT_COLUMNS: [&str; 7] = [
    "trancript_id",
    "gene_id",
    "upstream_gene",
    "upstream_distance",
    "downstream_gene",
    "downstream_distance",
    "gene_biotype",
];

const GENE_COLUMNS: [&str; 6] = [
    "gene_id",
    "gene_biotype",
    "upstream_gene",
    "upstream_distance",
    "downstream_gene",
    "downstream_distance",
];

pub fn run(command: &BedCommand) -> Result<()> {
    match command {
        BedCommand::Nearest {
            bed,
            tr_type,
            output,
            level,
            neighbour_biotype,
        } => nearest(bed, tr_type, output, *level, neighbour_biotype.as_deref()),
        BedCommand::RegionGc { genome, bed } => region_gc(genome, bed),
        BedCommand::FeatureGc { genome, bed, out_dir } => feature_gc(genome, bed, out_dir),
    }
}

/// Transcript annotation keyed by transcript id
fn transcript_info(path: &Path) -> Result<HashMap<String, TranscriptInfo>> {
    let table = Table::read(path)?;
    let tr = table.column_index("transcript_id")?;
    let gene = table.column_index("gene_id")?;
    let tr_biotype = table.column_index("transcript_biotype")?;
    let gene_biotype = table.column_index("gene_biotype").ok();
    Ok((0..table.len())
        .map(|row| {
            let transcript_biotype = table.cell(row, tr_biotype).to_string();
            let info = TranscriptInfo {
                gene_id: table.cell(row, gene).to_string(),
                gene_biotype: gene_biotype
                    .map(|col| table.cell(row, col).to_string())
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| transcript_biotype.clone()),
                transcript_biotype,
            };
            (table.cell(row, tr).to_string(), info)
        })
        .collect())
}

fn neighbour_row(n: &Neighbours, level: NeighbourLevel) -> Vec<String> {
    let (up_gene, up_dist) = neighbour_columns(&n.upstream);
    let (down_gene, down_dist) = neighbour_columns(&n.downstream);
    match level {
        NeighbourLevel::Transcript => vec![
            n.transcript_id.clone(),
            n.gene_id.clone(),
            up_gene,
            up_dist,
            down_gene,
            down_dist,
            n.biotype.clone(),
        ],
        NeighbourLevel::Gene => vec![
            n.gene_id.clone(),
            n.biotype.clone(),
            up_gene,
            up_dist,
            down_gene,
            down_dist,
        ],
    }
}

fn nearest(
    bed_path: &Path,
    tr_type: &Path,
    output: &Path,
    level: NeighbourLevel,
    neighbour_biotype: Option<&str>,
) -> Result<()> {
    require_exists(bed_path)?;
    require_exists(tr_type)?;
    let beds = bed::read_bed(bed_path)?;
    let info = transcript_info(tr_type)?;
    let transcripts = bed::nearest_transcripts(&beds, &info, neighbour_biotype);

    let (headers, rows) = match level {
        NeighbourLevel::Transcript => (TRANSCRIPT_COLUMNS.to_vec(), transcripts),
        NeighbourLevel::Gene => (GENE_COLUMNS.to_vec(), bed::nearest_genes(&transcripts)),
    };
    let mut table = Table::new(headers);
    for row in &rows {
        table.rows.push(neighbour_row(row, level));
    }
    table.write(output)?;
    info!(rows = table.len(), level = ?level, "Wrote nearest neighbours");
    written(output);
    Ok(())
}

fn region_gc(genome: &Path, bed_path: &Path) -> Result<()> {
    require_exists(genome)?;
    require_exists(bed_path)?;
    let regions = bed::read_bed(bed_path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for region in fasta::region_gc(genome, &regions)? {
        writeln!(
            out,
            "{}\t{}\t{}",
            region.region.to_line(),
            region.gc_count,
            fmt_float(region.gc_fraction, 3, "NA")
        )?;
    }
    out.flush()?;
    Ok(())
}

fn feature_gc(genome: &Path, bed_path: &Path, out_dir: &Path) -> Result<()> {
    require_exists(genome)?;
    require_exists(bed_path)?;
    let features = bed::read_bed(bed_path)?;
    let mut table = Table::new(["transcript_id", "gene_id", "feature", "GC"]);
    for gc in fasta::feature_gc(genome, &features)? {
        table.push_row([
            gc.transcript_id.clone(),
            gc.gene_id.clone(),
            gc.feature.clone(),
            fmt_float(gc.gc(), 3, "NA"),
        ]);
    }
    let path = out_dir.join("gc.content.txt");
    table.write(&path)?;
    written(&path);
    Ok(())
}
