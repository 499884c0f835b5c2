//! # Enroll - Registration Bot Runtime
//!
//! The main binary for the Enroll registration and notification engine.
//!
//! This application provides:
//! - HTTP surface (axum-based): inbound interactions + record access
//! - CLI interface for operations
//! - Scheduler loop for notification passes
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      apps/enroll (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐   │
//! │  │   CLI       │    │   HTTP API  │    │  Scheduler Loop  │   │
//! │  │  (clap)     │    │   (axum)    │    │  (tokio timer)   │   │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘   │
//! │         │                  │                    │              │
//! │         └──────────────────┼────────────────────┘              │
//! │                            ▼                                   │
//! │                    ┌───────────────┐                           │
//! │                    │  enroll-core  │                           │
//! │                    │ (THE LOGIC)   │                           │
//! │                    └───────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! enroll server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! enroll status
//! enroll init --seed settings.toml
//! enroll tick
//! ```

use clap::Parser;
use enroll::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing; ENROLL_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ENROLL_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "enroll=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Enroll startup banner.
fn print_banner() {
    println!(
        r#"
  ███████╗███╗   ██╗██████╗  ██████╗ ██╗     ██╗
  ██╔════╝████╗  ██║██╔══██╗██╔═══██╗██║     ██║
  █████╗  ██╔██╗ ██║██████╔╝██║   ██║██║     ██║
  ██╔══╝  ██║╚██╗██║██╔══██╗██║   ██║██║     ██║
  ███████╗██║ ╚████║██║  ██║╚██████╔╝███████╗███████╗
  ╚══════╝╚═╝  ╚═══╝╚═╝  ╚═╝ ╚═════╝ ╚══════╝╚══════╝

  Registration Bot Runtime v{}

  Deterministic • Replayable • Single Writer
"#,
        env!("CARGO_PKG_VERSION")
    );
}
