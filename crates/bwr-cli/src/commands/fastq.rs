//! `bwr fastq` command implementations
//!
//! Every subcommand plans link, copy or concatenate actions, logs the plan
//! and then runs the actions on the blocking pool.

use crate::config::Config;
use crate::error::{require_exists, CliError, Result};
use crate::progress;
use crate::FastqCommand;
use bwr_fetch::bounded::{run_bounded, FetchSummary};
use bwr_fetch::FetchError;
use bwr_formats::fastq::{self, MergeAction, SingleFile};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;

pub async fn run(command: &FastqCommand, config: &Config) -> Result<()> {
    match command {
        FastqCommand::Merge {
            fq_dirs,
            out_dir,
            dry_run,
        } => merge(fq_dirs, out_dir, *dry_run, config).await,
        FastqCommand::Combine {
            fq_dirs,
            out_dir,
            suffix,
            copy,
            dry_run,
        } => {
            for dir in fq_dirs {
                require_exists(dir)?;
            }
            let single = if *copy { SingleFile::Copy } else { SingleFile::Link };
            let groups = fastq::group_by_file_name(fq_dirs, suffix)?;
            let actions = fastq::plan_combine(&groups, out_dir, single);
            execute_plan(actions, out_dir, *dry_run, config).await?;
            Ok(())
        },
        FastqCommand::MergeChip { dir, dry_run } => merge_chip(dir, *dry_run, config).await,
    }
}

async fn merge(fq_dirs: &[PathBuf], out_dir: &Path, dry_run: bool, config: &Config) -> Result<()> {
    for dir in fq_dirs {
        require_exists(dir)?;
    }
    let groups = fastq::group_by_read(fq_dirs)?;
    let actions = fastq::plan_merge(&groups, out_dir);
    execute_plan(actions, out_dir, dry_run, config).await?;
    Ok(())
}

async fn merge_chip(dir: &Path, dry_run: bool, config: &Config) -> Result<()> {
    require_exists(dir)?;
    let raw_dir = dir.join("rawdata");
    let groups = fastq::chip_read_groups(dir)?;
    let actions = fastq::plan_chip_merge(dir, &groups);
    let mut targets = execute_plan(actions, &raw_dir, dry_run, config).await?;
    if dry_run {
        return Ok(());
    }

    // outputs merged by an earlier run still need their checksum
    for (sample, read) in groups.keys() {
        let target = raw_dir.join(format!("{sample}.R{read}.fq.gz"));
        if target.is_file() && !targets.contains(&target) {
            targets.push(target);
        }
    }
    let results = run_bounded(targets, config.concurrency, None, |target: PathBuf| async move {
        let fresh = tokio::task::spawn_blocking(move || fastq::write_md5_sidecar(&target)).await??;
        Ok::<_, FetchError>(fresh)
    })
    .await;
    let created = results.iter().flatten().filter(|fresh| **fresh).count();
    let summary = FetchSummary::from_results(&results);
    info!(created, failed = summary.failed, "Wrote MD5 sidecars");
    println!("{} Wrote {} MD5 file(s)", "✓".green(), created);
    CliError::check_summary("MD5 sidecars", summary)
}

/// Log the plan to `<log_dir>/log.txt`, then run it unless `dry_run`.
/// Returns the targets that were written.
async fn execute_plan(actions: Vec<MergeAction>, log_dir: &Path, dry_run: bool, config: &Config) -> Result<Vec<PathBuf>> {
    let log = fastq::log_plan(&actions, log_dir)?;
    println!("{} Planned {} merge(s), see {}", "→".cyan(), actions.len(), log.display());
    if dry_run || actions.is_empty() {
        return Ok(Vec::new());
    }

    let pb = progress::create_progress_bar(actions.len() as u64, "Merging reads");
    let results = run_bounded(actions, config.concurrency, Some(&pb), |action: MergeAction| async move {
        let target = action.target().to_path_buf();
        tokio::task::spawn_blocking(move || action.execute()).await??;
        Ok::<_, FetchError>(target)
    })
    .await;
    pb.finish_and_clear();

    let bytes: u64 = results
        .iter()
        .flatten()
        .filter_map(|target| std::fs::metadata(target).ok())
        .map(|meta| meta.len())
        .sum();
    let summary = FetchSummary::from_results(&results);
    info!(merged = summary.succeeded, failed = summary.failed, bytes, "Merged FASTQ files");
    println!(
        "{} Merged {} read file(s) ({})",
        "✓".green(),
        summary.succeeded,
        progress::format_bytes(bytes)
    );
    CliError::check_summary("FASTQ merge", summary)?;
    Ok(results.into_iter().flatten().collect())
}
