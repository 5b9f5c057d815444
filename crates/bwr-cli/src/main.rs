//! BWR CLI - Main entry point

use bwr_cli::{Cli, Commands, Config};
use bwr_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use clap::Parser;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Pick up BWR_* and LOG_* settings from a local .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    if cli.command.is_none() {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    }

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("bwr")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The utilities still work without logging
    let _ = init_logging(&log_config);

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> bwr_cli::Result<()> {
    let Some(ref command) = cli.command else {
        return Ok(());
    };

    match command {
        Commands::Gff { command } => bwr_cli::commands::gff::run(command),
        Commands::Bed { command } => bwr_cli::commands::bed::run(command),
        Commands::Fasta { command } => bwr_cli::commands::fasta::run(command),
        Commands::Table { command } => bwr_cli::commands::table::run(command),
        Commands::Blat { command } => bwr_cli::commands::blat::run(command),
        Commands::Circ { command } => bwr_cli::commands::circ::run(command),
        Commands::Expr { command } => bwr_cli::commands::expr::run(command),
        Commands::Mapping { command } => bwr_cli::commands::mapping::run(command),
        Commands::Blast { command } => bwr_cli::commands::blast::run(command),
        Commands::Uniprot { command } => bwr_cli::commands::uniprot::run(command),

        Commands::Fastq { command } => {
            let config = Config::load(cli.overrides())?;
            bwr_cli::commands::fastq::run(command, &config).await
        },
        Commands::Fetch { command } => {
            let config = Config::load(cli.overrides())?;
            bwr_cli::commands::fetch::run(command, &config).await
        },
        Commands::Annotate { command } => {
            let config = Config::load(cli.overrides())?;
            bwr_cli::commands::annotate::run(command, &config).await
        },
        Commands::Rest { command } => {
            let config = Config::load(cli.overrides())?;
            bwr_cli::commands::rest::run(command, &config).await
        },
    }
}
