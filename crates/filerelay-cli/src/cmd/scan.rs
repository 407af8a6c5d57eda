use crate::output::print_json;
use anyhow::Context;
use filerelay_core::config::Config;
use filerelay_core::scanner::list_pending;
use filerelay_core::store::FileStore;

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = FileStore::open_read_only(&config.processed_state_path)
        .context("failed to open processed-state store")?;
    let pending = list_pending(&config.directory_path, &store)
        .with_context(|| format!("failed to scan {}", config.directory_path.display()))?;

    if json {
        print_json(&pending)?;
        return Ok(());
    }

    if pending.is_empty() {
        println!("No pending files.");
    } else {
        for name in &pending {
            println!("{name}");
        }
    }
    Ok(())
}
