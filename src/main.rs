//! art - GitLab artifact installer
//!
//! CLI entry point that dispatches to subcommands.

use art::cli::commands::{self, Invocation};
use art::cli::{Cli, Commands};
use art::config::ConfigManager;
use art::error::{ArtError, ArtResult};
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> ArtResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("art=warn"),
        1 => EnvFilter::new("art=info"),
        _ => EnvFilter::new("art=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let config = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    debug!("Config file: {}", config.path().display());

    // Completions and configure never touch the working directory
    match cli.command {
        Commands::Completions(args) => {
            commands::completions(args);
            return Ok(());
        }
        Commands::Configure(args) => return commands::configure(args, &config),
        _ => {}
    }

    let work_dir =
        std::env::current_dir().map_err(|e| ArtError::io("getting current directory", e))?;
    let invocation = Invocation {
        config,
        cache: cli.cache,
        work_dir,
    };

    match cli.command {
        Commands::Update(args) => commands::update(args, &invocation),
        Commands::Download => commands::download(&invocation),
        Commands::Install(args) => commands::install(args, &invocation),
        Commands::Clean(args) => commands::clean(args, &invocation),
        Commands::Cache(args) => commands::cache(args, &invocation),
        Commands::Completions(_) | Commands::Configure(_) => unreachable!("handled above"),
    }
}
