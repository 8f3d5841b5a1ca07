//! Speckeep CLI - encrypted workspaces from the terminal
//!
//! Usage:
//!   speckeep discover              - List projects under the projects root
//!   speckeep init <project>        - Create (or open) a project's workspace
//!   speckeep write <project> <doc> - Encrypt stdin (or --input) into a document
//!   speckeep read <project> <doc>  - Decrypt a document to stdout
//!   speckeep remove <project> <doc> - Delete an encrypted document
//!   speckeep list <project>        - List a workspace's encrypted documents
//!   speckeep workspaces            - List every workspace
//!   speckeep repair <project>      - Recreate missing workspace directories
//!   speckeep stats                 - Print cache statistics as JSON
//!
//! The master passphrase comes from SPECKEEP_MASTER_PASSPHRASE.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use speckeep_core::{Services, Settings};

#[derive(Parser)]
#[command(name = "speckeep")]
#[command(author = "HeyBattle1")]
#[command(version)]
#[command(about = "Encrypted workspace storage for spec-driven development", long_about = None)]
struct Cli {
    /// Settings file (defaults to $SPECKEEP_CONFIG or ./speckeep.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List projects under the projects root
    Discover {
        /// Override the configured projects root
        root: Option<PathBuf>,
    },

    /// Create a workspace for a project (no-op if it exists)
    Init {
        project: PathBuf,
    },

    /// Encrypt a document into a workspace
    Write {
        project: PathBuf,
        /// Workspace-relative document path, e.g. requirements/story-1.md
        document: PathBuf,
        /// Read plaintext from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Decrypt a document to stdout
    Read {
        project: PathBuf,
        document: PathBuf,
    },

    /// Delete an encrypted document
    Remove {
        project: PathBuf,
        document: PathBuf,
    },

    /// List encrypted documents in a workspace
    List {
        project: PathBuf,
    },

    /// List every workspace
    Workspaces,

    /// Recreate missing workspace subdirectories
    Repair {
        project: PathBuf,
    },

    /// Print cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `read` output stays clean
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let services = Services::start(settings).context("Failed to start services")?;

    let outcome = run(&services, cli.command).await;
    services.shutdown().await;
    outcome
}

async fn run(services: &Services, command: Commands) -> anyhow::Result<()> {
    let documents = services.documents();

    match command {
        Commands::Discover { root } => {
            let projects = match root {
                Some(root) => documents.discover_projects(root).await?,
                None => services.discover_projects().await?,
            };
            if projects.is_empty() {
                eprintln!("No projects found");
            }
            for project in projects {
                println!("{}", project.display());
            }
        }

        Commands::Init { project } => {
            let workspace = documents
                .create_workspace(&project)
                .await
                .with_context(|| format!("Failed to initialize {}", project.display()))?;
            println!("🔐 Workspace ready: {}", workspace.workspace_path().display());
        }

        Commands::Write {
            project,
            document,
            input,
        } => {
            let plaintext = match input {
                Some(path) => std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buffer = Vec::new();
                    std::io::stdin()
                        .read_to_end(&mut buffer)
                        .context("Failed to read stdin")?;
                    buffer
                }
            };
            let workspace = documents.workspace_for(&project).await?;
            let stored = documents
                .save_document(&workspace, &document, plaintext)
                .await?;
            println!("Stored {}", stored.display());
        }

        Commands::Read { project, document } => {
            let workspace = documents.workspace_for(&project).await?;
            let plaintext = documents.load_document(&workspace, &document).await?;
            std::io::stdout()
                .write_all(&plaintext)
                .context("Failed to write to stdout")?;
        }

        Commands::Remove { project, document } => {
            let workspace = documents.workspace_for(&project).await?;
            documents.remove_document(&workspace, &document).await?;
            println!("Removed {}", document.display());
        }

        Commands::List { project } => {
            let workspace = documents.workspace_for(&project).await?;
            for file in documents.list_workspace_files(&workspace).await? {
                let relative = file
                    .strip_prefix(workspace.workspace_path())
                    .unwrap_or(file.as_path());
                println!("{}", relative.display());
            }
        }

        Commands::Workspaces => {
            for workspace in documents.list_workspaces().await? {
                println!(
                    "{}  ->  {}  (created {})",
                    workspace.project_path().display(),
                    workspace.workspace_path().display(),
                    workspace.created_at().format("%Y-%m-%d %H:%M UTC")
                );
            }
        }

        Commands::Repair { project } => {
            let workspace = documents.workspace_for(&project).await?;
            documents.ensure_structure(&workspace).await?;
            println!("Workspace structure verified: {}", workspace.workspace_path().display());
        }

        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&services.cache_report())?);
        }
    }

    Ok(())
}
