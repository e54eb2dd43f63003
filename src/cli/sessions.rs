//! Session CLI commands
//!
//! `labelsync sessions list`            - summaries across both stores
//! `labelsync sessions show <id>`       - reconciled record as JSON
//! `labelsync sessions save <id>`       - save a snapshot through the orchestrator
//! `labelsync sessions activate <id>`   - move the active pointer
//! `labelsync sessions delete <id>`     - delete everywhere
//! `labelsync clear`                    - remove every session

use super::SessionsCommands;
use crate::server::{build_orchestrator_for_cli, load_config};
use anyhow::{bail, Context, Result};
use labelsync_core::{SaveKind, SessionMetadata, SessionPayload, SyncOrchestrator, SyncResult};
use std::path::Path;

/// Run a sessions subcommand.
pub async fn run(cmd: SessionsCommands) -> Result<()> {
    let sync = orchestrator()?;
    let outcome = match cmd {
        SessionsCommands::List => list(&sync).await,
        SessionsCommands::Show { id } => show(&sync, &id).await,
        SessionsCommands::Save {
            id,
            data,
            file,
            tab,
        } => {
            let payload = read_payload(data.as_deref(), file.as_deref())?;
            save(&sync, &id, payload, &tab).await
        }
        SessionsCommands::Activate { id } => report(sync.set_active_session_id(&id).await),
        SessionsCommands::Delete { id } => report(sync.delete_session(&id).await),
    };
    sync.shutdown().await;
    outcome
}

/// Remove every session from both stores.
pub async fn clear(force: bool) -> Result<()> {
    if !force && !confirm("Remove every session from this device and the service?") {
        println!("Cancelled.");
        return Ok(());
    }
    let sync = orchestrator()?;
    let result = sync.clear_all().await;
    sync.shutdown().await;
    report(result)
}

// ── Helpers ──────────────────────────────────────────────────────────

fn orchestrator() -> Result<SyncOrchestrator> {
    let config = load_config().context("Failed to load configuration")?;
    build_orchestrator_for_cli(&config)
}

fn confirm(prompt: &str) -> bool {
    use std::io::{self, Write};
    print!("{prompt} [y/N] ");
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_ok() {
        matches!(input.trim(), "y" | "Y" | "yes" | "YES")
    } else {
        false
    }
}

fn read_payload(data: Option<&str>, file: Option<&Path>) -> Result<SessionPayload> {
    let raw = match (data, file) {
        (Some(data), _) => data.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => bail!("Provide the payload with --data or --file"),
    };
    serde_json::from_str(&raw).context("Payload is not valid JSON")
}

fn report(result: SyncResult) -> Result<()> {
    if result.success {
        println!("✅ {}", result.session_id);
        Ok(())
    } else {
        bail!(
            "{}: {}",
            result.session_id,
            result.error.unwrap_or_else(|| "failed".to_string())
        )
    }
}

fn format_row(session: &SessionMetadata) -> String {
    format!(
        "{:<24} {:<20} {:>6} {:>7}  {:<7} {}",
        session.session_id,
        session.last_modified.format("%Y-%m-%d %H:%M:%S"),
        session.item_count,
        session.label_count,
        session.sync_status.to_string(),
        session.storage_origin,
    )
}

// ── Commands ─────────────────────────────────────────────────────────

async fn list(sync: &SyncOrchestrator) -> Result<()> {
    let sessions = sync.list_sessions().await;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    println!(
        "{:<24} {:<20} {:>6} {:>7}  {:<7} {}",
        "SESSION", "LAST MODIFIED", "ITEMS", "LABELS", "SYNC", "ORIGIN"
    );
    for session in &sessions {
        println!("{}", format_row(session));
    }
    Ok(())
}

async fn show(sync: &SyncOrchestrator, id: &str) -> Result<()> {
    let Some(record) = sync.load_state(id).await else {
        bail!("Session {} not found", id);
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn save(sync: &SyncOrchestrator, id: &str, payload: SessionPayload, tab: &str) -> Result<()> {
    let result = sync.save_state(id, payload, tab, SaveKind::Data).await;
    if result.success {
        if let Some(metadata) = &result.metadata {
            println!("{}", format_row(metadata));
        }
        // Give the opportunistic push a chance before the process exits
        sync.drain_pending().await;
    }
    report(result)
}
