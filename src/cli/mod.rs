pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::config;
use crate::database::{DatabaseManager, PgStore};
use crate::services::Services;

#[derive(Parser)]
#[command(name = "biadmin")]
#[command(about = "BI admin console - schema migration, seeding and account approval")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending schema migrations")]
    Migrate,

    #[command(about = "Seed the permission catalogue, system roles and the initial super administrator")]
    Seed(commands::seed::SeedArgs),

    #[command(about = "Approve a pending account by email")]
    Approve(commands::approve::ApproveArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Pool and services for console commands, built from the same configuration as the server
pub(crate) fn connect() -> anyhow::Result<(DatabaseManager, Services)> {
    let config = config();
    let manager = DatabaseManager::new(&config.database)?;
    let store = Arc::new(PgStore::from_manager(&manager));
    let services = Services::new(store, config.audit.failure_policy, config.upload.clone());
    Ok((manager, services))
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::Seed(args) => commands::seed::handle(args, output_format).await,
        Commands::Approve(args) => commands::approve::handle(args, output_format).await,
    }
}
