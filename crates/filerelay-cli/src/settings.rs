use crate::root::resolve_config;
use anyhow::Context;
use clap::Args;
use filerelay_core::config::{Config, PayloadFormat};
use std::path::{Path, PathBuf};

/// Configuration layers, lowest to highest priority: built-in defaults,
/// `filerelay.yaml`, environment variables, command-line flags.
///
/// Every field here doubles as an environment variable; clap resolves the
/// flag-over-env precedence before we see the value.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Path to filerelay.yaml (default: search upward from the current directory)
    #[arg(long, global = true, env = "FILERELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory watched for files
    #[arg(long, global = true, env = "DIRECTORY_PATH")]
    pub directory: Option<PathBuf>,

    /// Processed-files record
    #[arg(long, global = true, env = "PROCESSED_FILES_PATH")]
    pub processed_path: Option<PathBuf>,

    /// Seconds to wait before retrying a file that failed to deliver
    #[arg(long, global = true, env = "RETRY_DELAY_SECONDS")]
    pub retry_delay: Option<u64>,

    /// Seconds between delivery cycles
    #[arg(long, global = true, env = "SCHEDULE_INTERVAL")]
    pub schedule_interval: Option<u64>,

    /// Base URL of the receiving endpoint
    #[arg(long, global = true, env = "AIDBOX_BASE_URL")]
    pub base_url: Option<String>,

    /// Path appended to the base URL
    #[arg(long, global = true, env = "DELIVERY_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, global = true, env = "AIDBOX_USERNAME")]
    pub username: Option<String>,

    #[arg(long, global = true, env = "AIDBOX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "DELIVERY_TIMEOUT_SECONDS")]
    pub timeout: Option<u64>,

    /// Request body shape: envelope or hl7v2
    #[arg(long, global = true, env = "PAYLOAD_FORMAT")]
    pub payload_format: Option<String>,

    /// Also write logs to this file (rotated at 10 MB, 5 backups kept)
    #[arg(long, global = true, env = "LOG_FILE_PATH")]
    pub log_file: Option<PathBuf>,
}

pub fn load(args: &ConfigArgs) -> anyhow::Result<Config> {
    let mut config = match resolve_config(args.config.as_deref()) {
        Some(path) => {
            let mut cfg = Config::load(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            if let Some(base) = path.parent() {
                anchor_paths(&mut cfg, base);
            }
            cfg
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, args)?;
    Ok(config)
}

/// Paths in a config file are relative to the file, not the caller's cwd.
fn anchor_paths(config: &mut Config, base: &Path) {
    if config.directory_path.is_relative() {
        config.directory_path = base.join(&config.directory_path);
    }
    if config.processed_state_path.is_relative() {
        config.processed_state_path = base.join(&config.processed_state_path);
    }
    if let Some(log) = config.log_file_path.as_mut().filter(|p| p.is_relative()) {
        *log = base.join(&*log);
    }
}

fn apply_overrides(config: &mut Config, args: &ConfigArgs) -> anyhow::Result<()> {
    if let Some(d) = &args.directory {
        config.directory_path = d.clone();
    }
    if let Some(p) = &args.processed_path {
        config.processed_state_path = p.clone();
    }
    if let Some(s) = args.retry_delay {
        config.retry_delay_seconds = s;
    }
    if let Some(s) = args.schedule_interval {
        config.schedule_interval_seconds = s;
    }
    if let Some(url) = &args.base_url {
        config.delivery.base_url = url.clone();
    }
    if let Some(ep) = &args.endpoint {
        config.delivery.endpoint = ep.clone();
    }
    if let Some(u) = &args.username {
        config.delivery.username = Some(u.clone());
    }
    if let Some(p) = &args.password {
        config.delivery.password = Some(p.clone());
    }
    if let Some(t) = args.timeout {
        config.delivery.timeout_seconds = t;
    }
    if let Some(log) = &args.log_file {
        config.log_file_path = Some(log.clone());
    }
    if let Some(f) = &args.payload_format {
        config.delivery.payload_format = f.parse::<PayloadFormat>()?;
    }
    Ok(())
}
