mod api;
mod cli;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::{SelectionArgs, SourceArgs};
use crate::services::render::EXPORT_FILENAME;

#[derive(Parser)]
#[command(name = "pitchview")]
#[command(about = "Pass maps, shot maps and heatmaps from soccer match event data")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List the known matches
    Matches,
    /// List the teams and players of a match
    Players {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print summary metrics for a player
    Analyze {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Print the full derived bundle as JSON
        #[arg(long)]
        json: bool,
        /// Also write segments (or grid cells) to a CSV file
        #[arg(long)]
        csv: Option<String>,
    },
    /// Render the figure to a PNG file
    Render {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(short, long, default_value = EXPORT_FILENAME)]
        out: String,
    },
    /// Save a match's event table as JSON records, reloadable with --file
    Export {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(short, long)]
        out: String,
    },
}

fn default_port() -> u16 {
    std::env::var("PITCHVIEW_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or_else(default_port);
            tracing::info!("Starting PitchView API server on port {}", port);
            api::serve(port).await?;
        }
        Some(Commands::Matches) => {
            cli::list_matches()?;
        }
        Some(Commands::Players { source }) => {
            cli::list_players(&source).await?;
        }
        Some(Commands::Analyze { selection, json, csv }) => {
            tracing::info!("Analysing {} for {}", selection.stat.label(), selection.player);
            cli::analyze(&selection, json, csv.as_deref()).await?;
        }
        Some(Commands::Render { selection, out }) => {
            cli::render(&selection, &out).await?;
        }
        Some(Commands::Export { source, out }) => {
            cli::export_events(&source, &out).await?;
        }
        None => {
            // Default to serving
            let port = default_port();
            tracing::info!("Starting PitchView API server on port {}", port);
            api::serve(port).await?;
        }
    }

    Ok(())
}
