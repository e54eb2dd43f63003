//! CLI module for labelsync
//!
//! Provides commands:
//! - `serve`: Run the remote session service
//! - `status`: Adapter reachability and pending pushes
//! - `sessions`: List, show, save, activate and delete sessions
//! - `sync`: Push pending sessions and reconcile both stores
//! - `migrate`: Copy on-device sessions to the remote service
//! - `clear`: Remove every session from both stores

use clap::{Parser, Subcommand};

pub mod sessions;
pub mod sync;

/// Labelsync session sync
#[derive(Parser, Debug)]
#[command(name = "labelsync")]
#[command(about = "Keep labeling sessions in sync between this device and the session service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the session service
    Serve {
        /// Keep sessions in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// Show adapter health and pending pushes
    Status,
    /// Manage sessions
    Sessions {
        #[command(subcommand)]
        command: Option<SessionsCommands>,
    },
    /// Push pending sessions and reconcile both stores
    Sync {
        /// Keep running the background worker until Ctrl+C
        #[arg(long)]
        watch: bool,
    },
    /// Copy on-device sessions to the session service
    Migrate,
    /// Remove every session from both stores
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommands {
    /// List sessions, newest first (default)
    List,
    /// Print a session record as JSON
    Show { id: String },
    /// Save a snapshot from a JSON string or file
    Save {
        id: String,
        /// JSON payload
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,
        /// File holding the JSON payload
        #[arg(long)]
        file: Option<std::path::PathBuf>,
        /// Tab to resume on
        #[arg(long, default_value = "data")]
        tab: String,
    },
    /// Make a session the active one
    Activate { id: String },
    /// Delete a session everywhere
    Delete { id: String },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve { ephemeral }) => crate::server::run(ephemeral).await,
        Some(Commands::Status) => sync::status().await,
        Some(Commands::Sessions { command }) => {
            sessions::run(command.unwrap_or(SessionsCommands::List)).await
        }
        Some(Commands::Sync { watch }) => sync::sync(watch).await,
        Some(Commands::Migrate) => sync::migrate().await,
        Some(Commands::Clear { force }) => sessions::clear(force).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
