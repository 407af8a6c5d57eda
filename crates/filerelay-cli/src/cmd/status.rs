use crate::output::{print_json, print_table};
use anyhow::Context;
use filerelay_core::config::Config;
use filerelay_core::store::{FileStore, ProcessedStore};
use filerelay_core::types::ProcessedStatus;

pub fn run(config: &Config, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let store = FileStore::open_read_only(&config.processed_state_path)
        .context("failed to open processed-state store")?;
    let mut entries = store.entries().context("failed to read processed-state store")?;

    if let Some(n) = limit {
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
    }

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No files processed yet.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.processed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.status.to_string(),
                e.filename.clone(),
            ]
        })
        .collect();
    print_table(&["PROCESSED AT", "STATUS", "FILE"], &rows);

    let errors = entries
        .iter()
        .filter(|e| e.status == ProcessedStatus::Error)
        .count();
    println!("\n{} processed, {} with errors", entries.len(), errors);
    Ok(())
}
