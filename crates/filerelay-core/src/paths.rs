use crate::error::{RelayError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_DIRECTORY: &str = "./files";
pub const DEFAULT_PROCESSED_STATE: &str = "processed_files.jsonl";
pub const CONFIG_FILE: &str = "filerelay.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn file_path(directory: &Path, filename: &str) -> PathBuf {
    directory.join(filename)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// True when `artifact` lives directly inside `directory`.
///
/// Both sides are canonicalized when possible so `./files` and an absolute
/// spelling of the same directory compare equal.
pub fn is_inside(directory: &Path, artifact: &Path) -> bool {
    let Some(parent) = artifact.parent() else {
        return false;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    match (directory.canonicalize(), parent.canonicalize()) {
        (Ok(d), Ok(p)) => d == p,
        _ => directory == parent,
    }
}

// ---------------------------------------------------------------------------
// Filename validation
// ---------------------------------------------------------------------------

/// A filename is the unit of identity, so it must name exactly one entry in
/// the input directory.
pub fn validate_filename(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(RelayError::InvalidFilename(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
