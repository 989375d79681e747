// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.global.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Completions need no configuration
    if let Commands::Completions { shell } = cli.command {
        return commands::cmd_completions(shell);
    }

    let config = commands::load_config(&cli.global)?;
    debug!("Working directory: {}", config.working_dir.display());

    match cli.command {
        Commands::Symbols { dep_list } => commands::cmd_symbols(&config, &dep_list),
        Commands::Runtime {
            bin,
            trace,
            outfile,
            binary_trace,
        } => commands::cmd_runtime(&config, &bin, trace.as_deref(), &outfile, &binary_trace),
        Commands::Patch { symbols } => commands::cmd_patch(&config, &symbols),
        Commands::Build { dep_list } => commands::cmd_build(&config, &dep_list),
        Commands::Scrape { dep_list } => commands::cmd_scrape(&config, &dep_list),
        Commands::Install { dep_list, packages } => {
            commands::cmd_install(&config, &dep_list, &packages)
        }
        Commands::Restore => commands::cmd_restore(&config),
        Commands::Check { dep_list, against } => {
            commands::cmd_check(&config, &dep_list, &against)
        }
        Commands::Loc {
            application,
            base_dir,
            dep_list,
            out_file,
        } => commands::cmd_loc(
            &config,
            &application,
            &base_dir,
            dep_list.as_deref(),
            out_file.as_deref(),
        ),
        Commands::Fold {
            trace_dir,
            preserve,
            trace_name,
        } => commands::cmd_fold(&trace_dir, &trace_name, preserve),
        Commands::Preflight => commands::cmd_preflight(&config),
        Commands::Completions { .. } => Ok(()),
    }
}
