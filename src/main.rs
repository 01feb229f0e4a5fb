mod api;
mod cli;
mod db;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "goalpool")]
#[command(about = "A prediction pool backend with population-aware scoring")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Show the current standings
    Standings,
    /// List fixtures with results and prediction counts
    Fixtures,
    /// Recalculate points for a fixture with a stored result
    Recalculate {
        #[arg(short, long)]
        fixture: String,
    },
    /// Initialize the database
    InitDb,
    /// Seed the database with demo data
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting Goalpool API server on port {}", port);
            api::serve(port).await?;
        }
        Some(Commands::Standings) => {
            cli::show_standings().await?;
        }
        Some(Commands::Fixtures) => {
            cli::show_fixtures().await?;
        }
        Some(Commands::Recalculate { fixture }) => {
            cli::recalculate_fixture(&fixture).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            db::init_database().await?;
        }
        Some(Commands::Seed) => {
            let pool = db::create_pool().await?;
            db::init_database_with_pool(&pool).await?;
            db::seed_data(&pool).await?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting Goalpool API server on port 3000");
            api::serve(3000).await?;
        }
    }

    Ok(())
}
