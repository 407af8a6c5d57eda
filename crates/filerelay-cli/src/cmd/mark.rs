use crate::output::print_json;
use anyhow::Context;
use chrono::Utc;
use filerelay_core::config::Config;
use filerelay_core::paths::validate_filename;
use filerelay_core::store::{FileStore, ProcessedStore};
use filerelay_core::types::ProcessedStatus;

/// Record `filename` as processed so the engine stops retrying it.
///
/// A running engine sees the mark on its next retry wait.
pub fn run(config: &Config, filename: &str, status: &str, json: bool) -> anyhow::Result<()> {
    validate_filename(filename)?;
    let status: ProcessedStatus = status.parse()?;

    let mut store = FileStore::open(&config.processed_state_path)
        .context("failed to open processed-state store")?;
    let marked = store
        .mark(filename, status, Utc::now())
        .with_context(|| format!("failed to mark '{filename}'"))?;

    if json {
        print_json(&serde_json::json!({
            "filename": filename,
            "status": status,
            "marked": marked,
        }))?;
    } else if marked {
        println!("Marked '{filename}' as {status}.");
    } else {
        println!("'{filename}' is already processed.");
    }
    Ok(())
}
