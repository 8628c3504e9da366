mod substrate_cmds;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use vanguard_config::AppConfig;
use vanguard_substrate::{JsonFileRepository, SubstrateManager, SubstrateSettings};

#[derive(Debug, Parser)]
#[command(
    name = "vanguard",
    version,
    about = "Audit a knowledge substrate and consolidate topic clusters"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show category distribution, signal/static split and the cluster.
    Audit {
        #[arg(long)]
        json: bool,
    },
    /// Preview the consolidation plan and master content without writing.
    Plan {
        #[arg(long)]
        json: bool,
    },
    /// Apply the consolidation plan after confirmation.
    Apply {
        #[arg(long)]
        yes: bool,
    },
    /// Inspect or edit individual nodes.
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },
    /// Bulk-load a JSON array of nodes (later paths replace earlier ones).
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum NodeCommands {
    /// Create or update the node at `--path`.
    Put {
        #[arg(long)]
        path: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Remove the node at `--path`.
    Rm {
        #[arg(long)]
        path: String,
    },
    /// List every node.
    Ls,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level)),
        )
        .init();

    debug!(
        config = %cli.config.display(),
        store = %config.substrate.store_path,
        "configuration loaded"
    );

    let manager = SubstrateManager::new(
        JsonFileRepository::new(&config.substrate.store_path),
        SubstrateSettings::from_config(&config.substrate),
    );

    match cli.command {
        Commands::Audit { json } => substrate_cmds::run_audit(&manager, json).await?,
        Commands::Plan { json } => substrate_cmds::run_plan(&manager, json).await?,
        Commands::Apply { yes } => substrate_cmds::run_apply(&manager, yes).await?,
        Commands::Node { command } => match command {
            NodeCommands::Put {
                path,
                content,
                tags,
            } => substrate_cmds::run_node_put(&manager, path, content, tags).await?,
            NodeCommands::Rm { path } => substrate_cmds::run_node_rm(&manager, &path).await?,
            NodeCommands::Ls => substrate_cmds::run_node_ls(&manager).await?,
        },
        Commands::Import { file } => substrate_cmds::run_import(&manager, &file).await?,
    }

    Ok(())
}
