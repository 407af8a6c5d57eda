use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting config files.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent. Returns true if it was created.
pub fn ensure_dir(path: &Path) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    std::fs::create_dir_all(path)?;
    Ok(true)
}

/// Append a single line to `path` and flush it to disk before returning.
///
/// If the file does not end with a newline (a torn write from a previous
/// crash), a separator is written first so the new line is never glued onto
/// the fragment. Returns the number of bytes written, separator included.
pub fn append_line_durable(path: &Path, line: &str) -> Result<u64> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut f = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    let sep = if ends_with_newline(&mut f)? { "" } else { "\n" };
    let mut buf = String::with_capacity(sep.len() + line.len() + 1);
    buf.push_str(sep);
    buf.push_str(line);
    buf.push('\n');

    f.write_all(buf.as_bytes())?;
    f.sync_data()?;
    Ok(buf.len() as u64)
}

/// True when the file is empty or its last byte is `\n`.
fn ends_with_newline(f: &mut File) -> Result<bool> {
    let len = f.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    f.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
