//! Garage CLI - Database migrations, seeding and ledger audits.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! garage-cli migrate
//!
//! # Load employees and materials from a YAML file
//! garage-cli seed materials seed/materials.yaml
//!
//! # Replay the ledger for every item (non-zero exit on drift)
//! garage-cli inventory audit
//! garage-cli inventory audit --item-id 42
//!
//! # Mint a bearer token for an employee
//! garage-cli token issue --employee-id 1 --name "Ana Silva" --role manager
//! ```
//!
//! # Environment Variables
//!
//! - `GARAGE_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `GARAGE_JWT_SECRET` - Token signing secret (for `token issue`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "garage-cli")]
#[command(author, version, about = "Garage back-office CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Load seed data
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Inventory maintenance
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },
    /// Bearer tokens for API access
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Employees and catalog items (with opening balances) from YAML
    Materials {
        /// Path to the YAML seed file
        file: String,
    },
}

#[derive(Subcommand)]
enum InventoryAction {
    /// Replay the ledger and compare against cached balances
    Audit {
        /// Audit a single item instead of the whole catalog
        #[arg(long)]
        item_id: Option<i32>,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Issue a token for an employee
    Issue {
        /// Employee ID recorded on ledger rows
        #[arg(short, long)]
        employee_id: i32,

        /// Display name carried in the token
        #[arg(short, long)]
        name: String,

        /// Role (`admin`, `manager`, `employee`)
        #[arg(short, long, default_value = "employee")]
        role: String,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries command output such as issued tokens
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { target } => match target {
            SeedTarget::Materials { file } => commands::seed::materials(&file).await?,
        },
        Commands::Inventory { action } => match action {
            InventoryAction::Audit { item_id } => commands::audit::run(item_id).await?,
        },
        Commands::Token { action } => match action {
            TokenAction::Issue {
                employee_id,
                name,
                role,
            } => commands::token::issue(employee_id, &name, &role)?,
        },
    }
    Ok(())
}
