use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, config, status, sync};
use history_sync_core::SyncError;
use std::path::PathBuf;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "watchlog")]
#[command(about = "watchlog - Keep a local, enriched log of everything you've watched")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Write logs to a daily-rotated file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new watch history and append it to the local log
    #[command(long_about = "Fetch watch history recorded since the stored cursor, enrich it with catalog metadata, and append every watch not already in the local log. The cursor only advances after a successful append.")]
    Sync(sync::SyncArgs),

    /// Show cursor, log location and record counts
    Status,

    /// Clear stored state
    #[command(long_about = "Clear stored state. Use --cursor to refetch history from the beginning on the next run, --catalog-cache to drop persisted catalog lookups, --credentials to remove stored tokens, or --all for everything. The event log itself is never touched.")]
    Clear {
        /// Clear cursor, catalog cache and credentials
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,

        /// Clear the stored sync cursor
        #[arg(long, action = ArgAction::SetTrue)]
        cursor: bool,

        /// Clear the persisted catalog cache
        #[arg(long, action = ArgAction::SetTrue)]
        catalog_cache: bool,

        /// Clear stored credentials
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,
    },

    /// Inspect or create configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (masks sensitive data)
    #[command(long_about = "Display the effective configuration after environment overrides. Secrets are masked unless --full is given.")]
    Show {
        /// Show full configuration including masked secrets
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    logging::init_logging_with_file(cli.verbose, cli.quiet, cli.log_file)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    let result = match cli.command {
        Commands::Sync(args) => sync::run_sync(args, &output).await,
        Commands::Status => status::run_status(&output),
        Commands::Clear {
            all,
            cursor,
            catalog_cache,
            credentials,
        } => clear::run_clear(all, cursor, catalog_cache, credentials, &output),
        Commands::Config { cmd } => config::run_config(cmd, &output),
    };

    // Fatal sync errors exit with 2, everything else with color-eyre's 1
    if let Err(report) = result {
        if let Some(err) = report.downcast_ref::<SyncError>() {
            output.error(format!("Sync failed: {}", err));
            if err.is_fatal_auth() {
                output.error("Re-authorize and provide a new refresh token (TRAKT_REFRESH_TOKEN or credentials file)");
            }
            std::process::exit(2);
        }
        return Err(report);
    }
    Ok(())
}
