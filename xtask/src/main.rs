//! Build automation tasks for BWR
//!
//! Currently generates the command reference from the clap definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for BWR", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<bwr_cli::Cli>();

    let content = format!(
        r#"# BWR CLI Reference

Generated from the CLI source code on {}.

## Overview

BWR (Bio Wrangler) bundles the small utilities of a genomics analysis
workflow behind one `bwr` binary: GFF/GTF, BED, FASTA and table
conversions, circRNA and expression summaries, mapping reports, BLAST
runs, FASTQ merging, and downloads from NCBI, Ensembl and UniProt.

## Installation

```bash
cargo install --path crates/bwr-cli
```

## Quick Start

```bash
# Median transcript length per gene
bwr gff gene-length genes.gtf gene_length.txt

# Collapse GO terms per gene
bwr table collapse gene_go.txt gene_id gene_go.collapsed.txt

# List the NCBI BLAST databases
bwr fetch blastdb list
```

## Commands

{}

## Environment Variables

- `BWR_CONCURRENCY` - Parallel downloads and requests (default: `5`)
- `BWR_RETRIES` - Retries after a failed attempt (default: `2`)
- `BWR_TIMEOUT_SECS` - Network timeout in seconds (default: `30`)
- `BWR_REQS_PER_SEC` - REST request rate limit (default: `15`)
- `BWR_CONFIG` - Path of the TOML config file
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_DIR` - Logging overrides

## Configuration

Settings not given on the command line are read from `BWR_CONFIG`,
`./bwr.toml` or `~/.config/bwr/config.toml`, in that order:

```toml
concurrency = 8
retries = 3
timeout_secs = 60
reqs_per_sec = 10
```

---

*To update this file, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());
    Ok(())
}
