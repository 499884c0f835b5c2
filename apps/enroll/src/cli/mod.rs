//! # Enroll CLI Module
//!
//! This module implements the CLI interface for Enroll.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server and scheduler loop
//! - `status` - Show engine status
//! - `tick` - Run one scheduler round
//! - `init` - Initialize a new database

mod commands;

use clap::{Parser, Subcommand};
use enroll_core::EnrollError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Enroll - chat-driven registration and notification engine.
///
/// Participants register by answering question branches over a chat
/// transport; admins author the branches, menus and notifications through
/// the record API.
#[derive(Parser, Debug)]
#[command(name = "enroll")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the record database
    #[arg(short = 'D', long, global = true, default_value = "enroll.db")]
    pub database: PathBuf,

    /// Root directory for blob storage (uploads, message photos)
    #[arg(short = 'B', long, global = true, default_value = "blobs")]
    pub blob_root: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server and scheduler loop
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Seconds between scheduler rounds
        #[arg(short, long, default_value = "30")]
        tick_secs: u64,
    },

    /// Show engine status
    Status,

    /// Run one scheduler round
    Tick,

    /// Initialize a new empty database
    Init {
        /// Settings seed file (TOML)
        #[arg(short, long)]
        seed: Option<PathBuf>,

        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), EnrollError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server {
            host,
            port,
            tick_secs,
        }) => cmd_server(&cli.database, &cli.blob_root, &host, port, tick_secs).await,
        Some(Commands::Status) => cmd_status(&cli.database, json_mode),
        Some(Commands::Tick) => cmd_tick(&cli.database, json_mode),
        Some(Commands::Init { seed, force }) => cmd_init(&cli.database, seed.as_ref(), force),
        None => {
            // No subcommand - show status by default
            cmd_status(&cli.database, json_mode)
        }
    }
}
