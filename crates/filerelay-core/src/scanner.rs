use crate::error::{RelayError, Result};
use crate::paths;
use crate::store::ProcessedStore;
use std::path::Path;

/// Files in `directory` that still await delivery, in ascending filename order.
///
/// Skips subdirectories and other non-file entries, the store's own backing
/// file when it lives in `directory`, and every filename already recorded in
/// `store`. A missing or unreadable directory is returned as an error; the
/// caller decides when to look again.
pub fn list_pending<S: ProcessedStore + ?Sized>(directory: &Path, store: &S) -> Result<Vec<String>> {
    if !directory.exists() {
        return Err(RelayError::DirectoryNotFound(directory.display().to_string()));
    }
    if !directory.is_dir() {
        return Err(RelayError::NotADirectory(directory.display().to_string()));
    }

    let artifact = store
        .artifact_path()
        .filter(|p| paths::is_inside(directory, p))
        .and_then(|p| p.file_name())
        .map(|n| n.to_os_string());

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        // Follows symlinks, so a link to a regular file counts as a file.
        if !entry.path().is_file() {
            continue;
        }
        let os_name = entry.file_name();
        if artifact.as_deref() == Some(os_name.as_os_str()) {
            continue;
        }
        match os_name.into_string() {
            Ok(name) => candidates.push(name),
            Err(raw) => tracing::warn!(
                filename = ?raw,
                "skipping file with a non-UTF-8 name"
            ),
        }
    }

    if candidates.is_empty() {
        tracing::debug!(directory = %directory.display(), "no files in directory");
        return Ok(Vec::new());
    }

    let processed = store.all_processed()?;
    let mut pending: Vec<String> = candidates
        .into_iter()
        .filter(|name| !processed.contains(name))
        .collect();
    pending.sort();

    if pending.is_empty() {
        tracing::debug!("no new files to process");
    } else {
        tracing::info!(count = pending.len(), "found new files to process");
    }
    Ok(pending)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
