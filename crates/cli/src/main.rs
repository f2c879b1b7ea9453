//! Location sync CLI
//!
//! Operator tool for pairing the agent with a tracking server, checking
//! connectivity and previewing what the Find My cache currently yields.

mod commands;
mod output;

use agent_lib::credentials::CredentialStore;
use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{locations, pair, status};
use std::path::PathBuf;

/// Location sync CLI
#[derive(Parser)]
#[command(name = "locsync")]
#[command(author, version, about = "CLI for the Location Sync agent", long_about = None)]
pub struct Cli {
    /// Credential file (defaults to ~/.locsync/config.json)
    #[arg(long, env = "LOCSYNC_CREDENTIALS_PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Exchange a pairing code for an auth token and save it
    Pair {
        /// Pairing code shown by the tracking server
        code: String,

        /// Tracking server URL (defaults to the stored server)
        #[arg(long)]
        server: Option<String>,
    },

    /// Show the configured server, stored token and server health
    Status {
        /// Tracking server URL (defaults to the stored server)
        #[arg(long)]
        server: Option<String>,
    },

    /// List the locations currently in the Find My cache
    Locations {
        /// Path to the Find My items cache
        #[arg(long = "db-path")]
        db_path: Option<PathBuf>,
    },
}

impl Cli {
    fn credential_store(&self) -> Result<CredentialStore> {
        match &self.config {
            Some(path) => Ok(CredentialStore::new(path)),
            None => CredentialStore::default_location(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Pair { code, server } => {
            let store = cli.credential_store()?;
            pair::pair(&store, code, server.as_deref(), cli.format, cli.verbose).await?;
        }
        Commands::Status { server } => {
            let store = cli.credential_store()?;
            status::show_status(&store, server.as_deref(), cli.format, cli.verbose).await?;
        }
        Commands::Locations { db_path } => {
            locations::list_locations(db_path.clone(), cli.format, cli.verbose).await?;
        }
    }

    Ok(())
}
