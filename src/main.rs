use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stylesweep::config::CliOverrides;
use stylesweep::logging::{LogFormat, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "stylesweep")]
#[command(
    version,
    about = "Lint every repository of an organization and open style fix pull requests"
)]
pub struct Cli {
    /// Path to stylesweep.toml (defaults to ./stylesweep.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Console log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover repositories, lint them and open pull requests or issues
    Run {
        /// Organization or user to sweep (overrides github.owner)
        #[arg(long)]
        owner: Option<String>,

        /// Only repositories with this topic (repeatable)
        #[arg(long = "topic")]
        topics: Vec<String>,

        /// Number of concurrent workers
        #[arg(short, long)]
        threads: Option<usize>,

        /// Ignore cached results and process every repository
        #[arg(long)]
        force_refresh: bool,

        /// List the repositories that would be processed and exit
        #[arg(long)]
        dry_run: bool,

        /// Print the run summary as JSON instead of the terminal report
        #[arg(long)]
        json: bool,
    },
    /// Inspect or reset the result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum CacheCommands {
    /// Show hit/miss statistics
    Stats,
    /// List cached repositories
    List,
    /// Remove every cached result
    Clear,
    /// Remove the cached result of one repository
    Invalidate {
        /// Repository as owner/name
        repo: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default stylesweep.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_format, cli.log_file.as_deref())?;

    match &cli.command {
        Commands::Run {
            owner,
            topics,
            threads,
            force_refresh,
            dry_run,
            json,
        } => {
            let overrides = CliOverrides {
                owner: owner.clone(),
                topics: topics.clone(),
                threads: *threads,
                force_refresh: *force_refresh,
            };
            cmd::cmd_run(&cli, overrides, *dry_run, *json).await?;
        }
        Commands::Cache { command } => cmd::cmd_cache(&cli, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
