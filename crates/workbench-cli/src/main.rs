//! Workbench CLI
//!
//! Drives the workbench orchestration engine against a local project directory.

mod api;
mod commands;
mod config;
mod sandbox;
mod terminal;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "workbench")]
#[command(author, version, about = "Workbench - replay AI action streams into a live project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSONL action stream into a project directory
    Replay {
        /// Stream file (one record per line)
        stream: PathBuf,

        /// Project directory the sandbox is rooted at
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Write a zip export of the result
        #[arg(short, long)]
        archive: Option<PathBuf>,

        /// Do not attach a runner shell (shell actions stay deferred)
        #[arg(long)]
        no_shell: bool,
    },

    /// Export a project directory as a zip archive
    Export {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Output archive path
        #[arg(short, long, default_value = "project.zip")]
        out: PathBuf,
    },

    /// Push a project directory to the configured GitHub repository
    Push {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Repository (owner/name), defaults to the configured one
        #[arg(long, env = "WORKBENCH_REPO")]
        repo: Option<String>,

        /// Branch, defaults to the configured one
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Apply commits made on the remote since the last sync
    Pull {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Store the GitHub token used for push and pull
    SetToken {
        /// Personal access token
        token: String,
        /// Account or organisation owning the repositories
        #[arg(long)]
        owner: String,
    },
    /// Set the default repository
    SetRepo {
        /// Repository (owner/name)
        repo: String,
        /// Branch to sync with
        #[arg(short, long)]
        branch: Option<String>,
    },
    /// Reset to default configuration
    Reset {
        /// Skip the confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "workbench_cli=debug,workbench_core=debug"
        } else {
            "workbench_cli=info"
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    info!("Starting Workbench CLI");

    let result = match cli.command {
        Commands::Replay {
            stream,
            dir,
            archive,
            no_shell,
        } => {
            commands::replay::run(commands::replay::ReplayOptions {
                stream,
                dir,
                archive,
                no_shell,
            })
            .await
        }
        Commands::Export { dir, out } => commands::export::run(&dir, &out).await,
        Commands::Push {
            dir,
            message,
            repo,
            branch,
        } => commands::push::run(&dir, &message, repo, branch).await,
        Commands::Pull { dir } => commands::pull::run(&dir).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show().await,
            ConfigAction::SetToken { token, owner } => {
                commands::config::set_token(&token, &owner).await
            }
            ConfigAction::SetRepo { repo, branch } => {
                commands::config::set_repo(&repo, branch).await
            }
            ConfigAction::Reset { yes } => commands::config::reset(yes).await,
        },
    };

    if let Err(ref e) = result {
        error!("Command failed: {}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    result
}
