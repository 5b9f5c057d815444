//! `bwr blast` commands

use super::written;
use crate::error::{require_exists, Result};
use crate::BlastCommand;
use bwr_formats::blast::{self, BlastInput, BlastParams, BlastRunner};
use bwr_formats::io::create_text;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub fn run(command: &BlastCommand) -> Result<()> {
    match command {
        BlastCommand::Run {
            input1,
            input2,
            outdir,
            blast_path,
            evalue,
            outfmt,
            perc_identity,
            max_target_seqs,
            num_threads,
            extra,
            bidirectional,
        } => {
            let params = BlastParams {
                evalue: evalue.clone(),
                outfmt: *outfmt,
                max_target_seqs: *max_target_seqs,
                num_threads: *num_threads,
                perc_identity: *perc_identity,
                extra: extra.clone(),
            };
            let query = BlastInput::detect(input1)?;
            let subject = BlastInput::detect(input2)?;
            info!(
                query = %query.path.display(),
                query_kind = query.kind.as_str(),
                subject = %subject.path.display(),
                subject_kind = subject.kind.as_str(),
                "Starting BLAST search"
            );
            let runner = BlastRunner::new(blast_path.clone(), params)?;
            let outcome = runner.run(&query, &subject, outdir, *bidirectional)?;
            for path in [Some(&outcome.forward), outcome.reverse.as_ref(), outcome.best_hits.as_ref()]
                .into_iter()
                .flatten()
            {
                written(path);
            }
            Ok(())
        },
        BlastCommand::Bbh {
            forward,
            reverse,
            output,
        } => bbh(forward, reverse, output),
    }
}

fn bbh(forward: &Path, reverse: &Path, output: &Path) -> Result<()> {
    require_exists(forward)?;
    require_exists(reverse)?;
    let pairs = blast::bidirectional_best_hits(&blast::read_hits(forward)?, &blast::read_hits(reverse)?);
    let mut out = create_text(output)?;
    for (query, subject, ident_f, ident_r) in &pairs {
        writeln!(out, "{query}\t{subject}\t{ident_f}\t{ident_r}")?;
    }
    out.flush()?;
    info!(pairs = pairs.len(), "Found reciprocal best hits");
    written(output);
    Ok(())
}
