//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{self, AppState};
use crate::runtime::{DirBlobs, LoggingTransport};
use crate::scheduler::{perform_outbound, run_passes};
use enroll_core::{EnrollError, NotificationStatus, RedbStore, Settings, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maximum size of a settings seed file (1 MB). A seed is a short TOML
/// document; anything bigger is a wrong file.
const MAX_SEED_FILE_SIZE: u64 = 1024 * 1024;

fn open_store(db_path: &Path) -> Result<RedbStore, EnrollError> {
    RedbStore::open(db_path)
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server and the scheduler loop.
pub async fn cmd_server(
    db_path: &PathBuf,
    blob_root: &Path,
    host: &str,
    port: u16,
    tick_secs: u64,
) -> Result<(), EnrollError> {
    let store = open_store(db_path)?;

    println!("Enroll Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:      {host}");
    println!("  Port:      {port}");
    println!("  Database:  {db_path:?}");
    println!("  Blob root: {blob_root:?}");
    println!("  Tick:      every {tick_secs}s");
    println!();
    println!("Endpoints:");
    println!("  POST /interaction - Handle a chat interaction");
    println!("  POST /tick        - Run one scheduler round");
    println!("  GET  /status      - Engine record counts");
    println!("  GET  /health      - Health check");
    println!("  GET|PUT /records/<kind> - Record access");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let state = AppState::new(
        store,
        Arc::new(LoggingTransport),
        DirBlobs::new(blob_root.to_path_buf()),
    );
    let addr = format!("{host}:{port}");
    api::run_server(&addr, state, tick_secs).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show engine status.
pub fn cmd_status(db_path: &PathBuf, json_mode: bool) -> Result<(), EnrollError> {
    let store = open_store(db_path)?;

    let participants = store.participants()?;
    let active = store.active_participant_count()?;
    let branches = store.branches()?.len();
    let fields = store.fields()?.len();
    let messages = store.messages()?.len();
    let menu_keys = store.menu_keys()?.len();
    let groups = store.groups()?.len();
    let pending = store
        .notifications()?
        .iter()
        .filter(|n| {
            matches!(
                n.status,
                NotificationStatus::ToDeliver | NotificationStatus::Planned
            )
        })
        .count();

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "participants": participants.len(),
            "active_participants": active,
            "branches": branches,
            "fields": fields,
            "messages": messages,
            "menu_keys": menu_keys,
            "pending_notifications": pending,
            "groups": groups
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Enroll Status");
    println!("=============");
    println!("Database: {db_path:?}");
    println!();
    println!("Participants:  {} ({} active)", participants.len(), active);
    println!("Branches:      {branches}");
    println!("Fields:        {fields}");
    println!("Messages:      {messages}");
    println!("Menu keys:     {menu_keys}");
    println!("Notifications: {pending} pending");
    println!("Groups:        {groups}");

    Ok(())
}

// =============================================================================
// TICK COMMAND
// =============================================================================

/// Run one scheduler round against the database and perform the outbound
/// batch on the logging transport.
pub fn cmd_tick(db_path: &PathBuf, json_mode: bool) -> Result<(), EnrollError> {
    let mut store = open_store(db_path)?;

    let batch = run_passes(&mut store)?;
    let performed = perform_outbound(&mut store, &LoggingTransport, &batch);

    if json_mode {
        let output = serde_json::json!({ "outbound": performed });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("Scheduler round complete: {performed} outbound action(s)");
    }
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database, optionally seeding settings from a TOML file.
pub fn cmd_init(db_path: &PathBuf, seed: Option<&PathBuf>, force: bool) -> Result<(), EnrollError> {
    if db_path.exists() {
        if !force {
            return Err(EnrollError::IoError(format!(
                "Database {db_path:?} already exists (use --force to overwrite)"
            )));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| EnrollError::IoError(format!("Cannot remove {db_path:?}: {e}")))?;
    }

    let mut store = open_store(db_path)?;

    let settings = match seed {
        Some(path) => load_settings_seed(path)?,
        None => Settings::default(),
    };
    store.put_settings(&settings)?;

    println!("Initialized database {db_path:?}");
    if seed.is_some() {
        println!("Settings seeded from file");
    }
    Ok(())
}

/// Read and parse a settings seed file.
fn load_settings_seed(path: &PathBuf) -> Result<Settings, EnrollError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| EnrollError::IoError(format!("Cannot read seed file metadata: {e}")))?;
    if metadata.len() > MAX_SEED_FILE_SIZE {
        return Err(EnrollError::SerializationError(format!(
            "Seed file size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_SEED_FILE_SIZE
        )));
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| EnrollError::IoError(format!("Cannot read seed file: {e}")))?;
    toml::from_str(&text)
        .map_err(|e| EnrollError::SerializationError(format!("Invalid seed file: {e}")))
}

// =============================================================================
// TESTS
// =============================================================================
