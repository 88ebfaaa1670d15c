//! edgeship CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "edgeship")]
#[command(about = "Continuous delivery for static sites", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "EDGESHIP_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Path to the site configuration
    #[arg(short, long, env = "EDGESHIP_CONFIG", default_value = "edgeship.kdl")]
    config: PathBuf,

    /// Show pipeline logs
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the site configuration
    Validate,
    /// Print the site's operator outputs as JSON
    Outputs,
    /// Run the pipeline once, locally
    Run {
        /// Revision to deploy (defaults to the branch head)
        #[arg(long)]
        revision: Option<String>,
        /// Deploy to in-memory backends instead of the configured ones
        #[arg(long)]
        dry_run: bool,
    },
    /// Poll the branch and deploy every new revision, locally
    Watch {
        /// Poll interval in seconds (overrides the configuration)
        #[arg(long)]
        interval: Option<u64>,
        /// Deploy to in-memory backends instead of the configured ones
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage runs on the API server
    Runs {
        #[command(subcommand)]
        command: RunCommands,
    },
}

#[derive(Subcommand)]
enum RunCommands {
    /// List recent runs
    List {
        /// Pipeline name
        #[arg(long)]
        pipeline: Option<String>,
        /// Maximum number of runs to show
        #[arg(long, default_value = "10")]
        limit: u32,
    },
    /// Show run details
    Show {
        /// Run ID
        id: String,
    },
    /// Queue a run
    Trigger {
        /// Revision to deploy (defaults to the branch head)
        #[arg(long)]
        revision: Option<String>,
    },
    /// Cancel a queued or running run
    Cancel {
        /// Run ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate => {
            commands::validate(&cli.config)?;
        }
        Commands::Outputs => {
            commands::outputs(&cli.config)?;
        }
        Commands::Run { revision, dry_run } => {
            commands::run::run_local(&cli.config, revision, dry_run).await?;
        }
        Commands::Watch { interval, dry_run } => {
            commands::watch::watch(&cli.config, interval, dry_run).await?;
        }
        Commands::Runs { command } => match command {
            RunCommands::List { pipeline, limit } => {
                commands::runs::list(&cli.api_url, pipeline, limit).await?;
            }
            RunCommands::Show { id } => {
                commands::runs::show(&cli.api_url, &id).await?;
            }
            RunCommands::Trigger { revision } => {
                commands::runs::trigger(&cli.api_url, revision).await?;
            }
            RunCommands::Cancel { id } => {
                commands::runs::cancel(&cli.api_url, &id).await?;
            }
        },
    }

    Ok(())
}
