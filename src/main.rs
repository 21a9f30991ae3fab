mod commands;
mod config;
mod connector;
mod domain;
mod error;
mod platform;
mod profile;
mod prompt;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::commands::collect::CollectArgs;
use crate::commands::manifest::ManifestFormat;
use crate::profile::ProfileStore;

#[derive(Parser)]
#[command(
    name = "syscheck",
    version,
    about = "Collect a system inventory from a remote Linux or Windows host"
)]
struct Cli {
    /// Path to config file (default: ~/.config/syscheck/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a host and report its system information
    Collect(CollectArgs),

    /// Show the commands and default service patterns for a platform
    Manifest {
        /// Target platform
        #[arg(long)]
        os: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = ManifestFormat::Table)]
        format: ManifestFormat,
    },

    /// Manage saved connection profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// List saved profiles
    List,
    /// Show the settings stored in a profile
    Show {
        /// Profile name
        name: String,
    },
    /// Delete a profile
    Delete {
        /// Profile name
        name: String,
    },
}

fn init_tracing(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load(cli.config.as_deref())?;
    init_tracing(&config.log_level, cli.verbose);

    match cli.command {
        Commands::Collect(args) => commands::collect::run(args, &config),
        Commands::Manifest { os, format } => commands::manifest::run(&os, format),
        Commands::Profile { command } => {
            let store = ProfileStore::new(config.profile_dir()?);
            match command {
                ProfileCommands::List => commands::profile::list(&store),
                ProfileCommands::Show { name } => commands::profile::show(&store, &name),
                ProfileCommands::Delete { name } => commands::profile::delete(&store, &name),
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "!!".red().bold(), e);
        std::process::exit(error::exit_code(&e));
    }
}
