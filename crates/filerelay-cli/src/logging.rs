use anyhow::Context;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_BACKUPS: usize = 5;

/// Install the global subscriber: stderr always, plus a size-rotated file
/// when `log_file` is set.
///
/// The returned guard flushes the file writer on drop; hold it until exit.
pub fn init(level: tracing::Level, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = SizeRotatingFile::open(path, MAX_LOG_BYTES, LOG_BACKUPS)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Append-only log file that rolls over once it would exceed `max_bytes`.
///
/// `relay.log` becomes `relay.log.1`, `relay.log.1` becomes `relay.log.2`,
/// and so on up to `backups`; the oldest is deleted.
pub struct SizeRotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: Option<File>,
    size: u64,
}

impl SizeRotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut this = Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file: None,
            size: 0,
        };
        this.reopen()?;
        Ok(this)
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.size = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }

        if self.backups == 0 {
            fs::remove_file(&self.path)?;
        } else {
            let oldest = self.backup_path(self.backups);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for idx in (1..self.backups).rev() {
                let src = self.backup_path(idx);
                if src.exists() {
                    fs::rename(&src, self.backup_path(idx + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }

        self.reopen()
    }
}

impl Write for SizeRotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A single record larger than the limit still goes into a fresh file.
        if self.size > 0 && self.size + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file unavailable"))?;
        let n = file.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
