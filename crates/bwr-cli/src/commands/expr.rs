//! `bwr expr` commands

use super::written;
use crate::error::{require_exists, CliError, Result};
use crate::ExprCommand;
use bwr_common::BwrError;
use bwr_formats::expression::{self, Aggregate, ExpressionMatrix, GenePair};
use bwr_formats::io::{create_text, fmt_float};
use bwr_formats::table::{read_pairs, Table};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Decimals of written expression matrices
const MATRIX_DECIMALS: usize = 3;

pub fn run(command: &ExprCommand) -> Result<()> {
    match command {
        ExprCommand::ClassifyCor {
            sample_tissue,
            out_dir,
            gene_type,
            cor_table,
            exp_table,
        } => classify_cor(sample_tissue, out_dir, gene_type, cor_table.as_deref(), exp_table.as_deref()),
        ExprCommand::Group {
            matrix,
            groups,
            output,
            cutoff,
            by,
        } => group(matrix, groups, output, *cutoff, by.parse()?),
        ExprCommand::TissueSpecific {
            matrix,
            groups,
            gene_type,
            out_dir,
            cutoff,
        } => tissue_specific(matrix, groups, gene_type, out_dir, *cutoff),
        ExprCommand::Filter {
            matrix,
            output,
            exp_cutoff,
            prop_cutoff,
        } => {
            require_exists(matrix)?;
            let source = ExpressionMatrix::read(matrix)?;
            let before = source.len();
            let kept = expression::filter_by_proportion(source, *exp_cutoff, *prop_cutoff);
            info!(before, after = kept.len(), "Filtered expression matrix");
            kept.write(output, MATRIX_DECIMALS)?;
            written(output);
            Ok(())
        },
        ExprCommand::CoRegulation {
            lnc_pc_pair,
            pc_pc_pair,
            lnc_exp,
            pc_exp,
            output,
            seed,
        } => co_regulation(lnc_pc_pair, pc_pc_pair, lnc_exp, pc_exp, output, *seed),
        ExprCommand::Ubiquitous { matrix, cutoff } => {
            require_exists(matrix)?;
            let source = ExpressionMatrix::read(matrix)?;
            let genes = expression::ubiquitous_genes(&source, *cutoff);
            info!(genes = genes.len(), of = source.len(), "Ubiquitously expressed genes");
            let mut out = std::io::stdout().lock();
            for gene in genes {
                writeln!(out, "{gene}")?;
            }
            Ok(())
        },
        ExprCommand::CoexpModules {
            cor_table,
            out_dir,
            cor_cut,
            diff_cut,
        } => {
            require_exists(cor_table)?;
            let modules = expression::CoexpModules::select(&Table::read(cor_table)?, *cor_cut, *diff_cut)?;
            let out_dir = match out_dir {
                Some(dir) => dir.clone(),
                None => cor_table.parent().map(Path::to_path_buf).unwrap_or_default(),
            };
            info!(rows = modules.filtered.len(), modules = modules.modules.len(), "Selected module genes");
            for path in modules.write(cor_table, &out_dir)? {
                written(&path);
            }
            Ok(())
        },
    }
}

fn classify_cor(
    sample_tissue: &Path,
    out_dir: &Path,
    gene_type: &str,
    cor_table: Option<&Path>,
    exp_table: Option<&Path>,
) -> Result<()> {
    require_exists(sample_tissue)?;
    let cor = match (cor_table, exp_table) {
        (Some(path), _) => {
            require_exists(path)?;
            ExpressionMatrix::read(path)?
        },
        (None, Some(path)) => {
            require_exists(path)?;
            ExpressionMatrix::read(path)?.sample_correlation()
        },
        (None, None) => {
            return Err(CliError::invalid_argument("either --cor-table or --exp-table is required"));
        },
    };
    let tissues: HashMap<String, String> = read_pairs(sample_tissue)?.into_iter().collect();
    let pairs = expression::classify_correlation(&cor, &tissues);

    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{gene_type}.cor.classify.txt"));
    let mut out = create_text(&path)?;
    for pair in &pairs {
        writeln!(out, "{}", pair.to_line(gene_type))?;
    }
    out.flush()?;
    info!(pairs = pairs.len(), "Classified correlation pairs");
    written(&path);
    Ok(())
}

fn group(matrix: &Path, groups: &Path, output: &Path, cutoff: f64, how: Aggregate) -> Result<()> {
    require_exists(matrix)?;
    require_exists(groups)?;
    let source = ExpressionMatrix::read(matrix)?;
    let sample_groups = read_pairs(groups)?;
    let grouped = expression::group_aggregate(&source, &sample_groups, cutoff, how);
    info!(genes = grouped.len(), groups = grouped.samples.len(), how = ?how, "Grouped samples");
    grouped.write(output, MATRIX_DECIMALS)?;
    written(output);
    Ok(())
}

/// Gene biotypes from a table whose first column is the gene id
fn gene_biotypes(path: &Path) -> Result<HashMap<String, String>> {
    let table = Table::read(path)?;
    let biotype = table.column_index("gene_biotype")?;
    Ok((0..table.len())
        .map(|row| (table.cell(row, 0).to_string(), table.cell(row, biotype).to_string()))
        .collect())
}

fn tissue_specific(matrix: &Path, groups: &Path, gene_type: &Path, out_dir: &Path, cutoff: f64) -> Result<()> {
    for path in [matrix, groups, gene_type] {
        require_exists(path)?;
    }
    let source = ExpressionMatrix::read(matrix)?;
    let sample_groups = read_pairs(groups)?;
    let n_tissues = expression::group_count(&sample_groups);
    let means = expression::group_aggregate(&source, &sample_groups, cutoff, Aggregate::Mean);
    let scores = expression::tissue_specificity(&means, &gene_biotypes(gene_type)?, n_tissues);
    info!(genes = scores.len(), tissues = n_tissues, "Scored tissue specificity");
    std::fs::create_dir_all(out_dir)?;

    let mut table = Table::new(["Gene_id", "ts_score", "tissue", "ts", "gene_biotype"]);
    for score in &scores {
        table.push_row([
            score.gene_id.clone(),
            fmt_float(score.score, 3, "NA"),
            score.tissue.clone(),
            score.specific.to_string(),
            score.biotype.clone().unwrap_or_default(),
        ]);
    }
    let path = out_dir.join("tissue_specific.score.txt");
    table.write(&path)?;
    written(&path);

    let mut table = Table::new(["tissue", "gene_biotype", "ts"]);
    for ((tissue, biotype), count) in expression::specific_by_tissue(&scores) {
        table.push_row([tissue, biotype, count.to_string()]);
    }
    let path = out_dir.join("tissue_specific.number.txt");
    table.write(&path)?;
    written(&path);

    let mut table = Table::new(["Gene_type", "detected_genes", "ts_genes", "ts_portion"]);
    for (biotype, detected, specific) in expression::specific_summary(&scores) {
        let portion = if detected == 0 {
            f64::NAN
        } else {
            specific as f64 / detected as f64
        };
        table.push_row([biotype, detected.to_string(), specific.to_string(), fmt_float(portion, 3, "NA")]);
    }
    let path = out_dir.join("tissue_specific.number.summary.txt");
    table.write(&path)?;
    written(&path);
    Ok(())
}

/// Headerless `gene1\tgene2\tdirection` pairs
fn read_gene_pairs(path: &Path) -> Result<Vec<GenePair>> {
    require_exists(path)?;
    let table = Table::read_headerless(path)?;
    table
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| match row.as_slice() {
            [gene1, gene2, direction, ..] => Ok(GenePair {
                gene1: gene1.clone(),
                gene2: gene2.clone(),
                direction: direction.clone(),
            }),
            _ => Err(BwrError::parse(idx + 1, format!("expected 3 columns, found {}", row.len())).into()),
        })
        .collect()
}

fn co_regulation(
    lnc_pc_pair: &Path,
    pc_pc_pair: &Path,
    lnc_exp: &Path,
    pc_exp: &Path,
    output: &Path,
    seed: u64,
) -> Result<()> {
    let lnc_pc = read_gene_pairs(lnc_pc_pair)?;
    let pc_pc = read_gene_pairs(pc_pc_pair)?;
    require_exists(lnc_exp)?;
    require_exists(pc_exp)?;
    let lnc = ExpressionMatrix::read(lnc_exp)?;
    let pc = ExpressionMatrix::read(pc_exp)?;

    let results = expression::co_regulation(&lnc_pc, &pc_pc, &lnc, &pc, seed);
    let mut table = Table::new(["gene1", "gene2", "direction", "type", "cor"]);
    for row in results {
        table.push_row([
            row.pair.gene1,
            row.pair.gene2,
            row.pair.direction,
            row.kind.to_string(),
            fmt_float(row.cor, 3, "NA"),
        ]);
    }
    info!(rows = table.len(), seed, "Computed co-regulation correlations");
    table.write(output)?;
    written(output);
    Ok(())
}
