use crate::error::{RelayError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PayloadFormat
// ---------------------------------------------------------------------------

/// Shape of the JSON body posted for each file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// `{filename, content, timestamp, source}`
    #[default]
    Envelope,
    /// An `Hl7v2Message` resource carrying the trimmed file content in `src`.
    Hl7v2,
}

impl PayloadFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadFormat::Envelope => "envelope",
            PayloadFormat::Hl7v2 => "hl7v2",
        }
    }
}

impl std::str::FromStr for PayloadFormat {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "envelope" => Ok(PayloadFormat::Envelope),
            "hl7v2" | "hl7" => Ok(PayloadFormat::Hl7v2),
            _ => Err(RelayError::InvalidConfig(format!(
                "unknown payload format '{s}' (expected 'envelope' or 'hl7v2')"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub payload_format: PayloadFormat,
}

fn default_endpoint() -> String {
    "Hl7v2Message".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            endpoint: default_endpoint(),
            username: None,
            password: None,
            timeout_seconds: default_timeout_seconds(),
            payload_format: PayloadFormat::default(),
        }
    }
}

impl DeliveryConfig {
    /// Full URL the client posts to.
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let endpoint = self.endpoint.trim_start_matches('/');
        if endpoint.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{endpoint}")
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) if !u.is_empty() => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Delay applied between attempts for every retryable outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(default_retry_delay_seconds()),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_directory_path")]
    pub directory_path: PathBuf,
    #[serde(default = "default_processed_state_path")]
    pub processed_state_path: PathBuf,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_schedule_interval_seconds")]
    pub schedule_interval_seconds: u64,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Also write logs here, rotated by size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file_path: Option<PathBuf>,
}

fn default_directory_path() -> PathBuf {
    PathBuf::from(paths::DEFAULT_DIRECTORY)
}

fn default_processed_state_path() -> PathBuf {
    PathBuf::from(paths::DEFAULT_PROCESSED_STATE)
}

fn default_retry_delay_seconds() -> u64 {
    5
}

fn default_schedule_interval_seconds() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory_path: default_directory_path(),
            processed_state_path: default_processed_state_path(),
            retry_delay_seconds: default_retry_delay_seconds(),
            schedule_interval_seconds: default_schedule_interval_seconds(),
            delivery: DeliveryConfig::default(),
            log_level: None,
            log_file_path: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RelayError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_delay: Duration::from_secs(self.retry_delay_seconds),
        }
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_seconds)
    }

    /// Copy safe to print: the password is masked.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.delivery.password.is_some() {
            cfg.delivery.password = Some("********".to_string());
        }
        cfg
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        let base_url = self.delivery.base_url.trim();
        if base_url.is_empty() {
            error("delivery.base_url is required".to_string());
        } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            error(format!(
                "delivery.base_url '{base_url}' must start with http:// or https://"
            ));
        }

        let has_user = self.delivery.username.as_deref().is_some_and(|u| !u.is_empty());
        let has_pass = self.delivery.password.as_deref().is_some_and(|p| !p.is_empty());
        if has_user != has_pass {
            error("delivery.username and delivery.password must be provided together".to_string());
        }

        if self.delivery.timeout_seconds == 0 {
            error("delivery.timeout_seconds must be greater than 0".to_string());
        }

        if self.processed_state_path.is_dir() {
            error(format!(
                "processed_state_path '{}' is a directory",
                self.processed_state_path.display()
            ));
        }

        if let Some(log) = self.log_file_path.as_deref().filter(|p| p.is_dir()) {
            error(format!("log_file_path '{}' is a directory", log.display()));
        }

        if self.retry_delay_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "retry_delay_seconds=0 retries failing files in a tight loop".to_string(),
            });
        }

        if self.schedule_interval_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "schedule_interval_seconds=0 rescans the directory continuously"
                    .to_string(),
            });
        }

        if self.delivery.endpoint.trim_matches('/').is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "delivery.endpoint is empty; posting to delivery.base_url".to_string(),
            });
        }

        warnings
    }

    /// Validate and fail on the first error-level finding.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            Some(w) => Err(RelayError::InvalidConfig(w.message)),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid() -> Config {
        let mut cfg = Config::default();
        cfg.delivery.base_url = "https://aidbox.example.com".to_string();
        cfg
    }

    #[test]
    fn log_file_path_parses_and_rejects_directories() {
        let cfg: Config = serde_yaml::from_str("log_file_path: logs/relay.log\n").unwrap();
        assert_eq!(cfg.log_file_path, Some(PathBuf::from("logs/relay.log")));

        let dir = TempDir::new().unwrap();
        let mut cfg = valid();
        cfg.log_file_path = Some(dir.path().to_path_buf());
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("log_file_path")));
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.directory_path, PathBuf::from("./files"));
        assert_eq!(cfg.retry_delay_seconds, 5);
        assert_eq!(cfg.schedule_interval_seconds, 10);
        assert_eq!(cfg.delivery.timeout_seconds, 30);
        assert_eq!(cfg.delivery.payload_format, PayloadFormat::Envelope);
        assert_eq!(cfg.retry_policy().retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filerelay.yaml");
        let mut cfg = valid();
        cfg.delivery.payload_format = PayloadFormat::Hl7v2;
        cfg.retry_delay_seconds = 2;
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.delivery.base_url, "https://aidbox.example.com");
        assert_eq!(loaded.delivery.payload_format, PayloadFormat::Hl7v2);
        assert_eq!(loaded.retry_delay_seconds, 2);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let yaml = "delivery:\n  base_url: http://localhost:8080\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.delivery.endpoint, "Hl7v2Message");
        assert_eq!(cfg.processed_state_path, PathBuf::from("processed_files.jsonl"));
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("nope.yaml")),
            Err(RelayError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let mut d = DeliveryConfig {
            base_url: "https://host/fhir/".to_string(),
            endpoint: "/Hl7v2Message".to_string(),
            ..Default::default()
        };
        assert_eq!(d.url(), "https://host/fhir/Hl7v2Message");
        d.endpoint = String::new();
        assert_eq!(d.url(), "https://host/fhir");
    }

    #[test]
    fn validate_missing_base_url_is_error() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("base_url is required")));
        assert!(cfg.ensure_valid().is_err());
    }

    #[test]
    fn validate_bad_scheme() {
        let mut cfg = valid();
        cfg.delivery.base_url = "ftp://host".to_string();
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("must start with http")));
    }

    #[test]
    fn validate_half_credentials() {
        let mut cfg = valid();
        cfg.delivery.username = Some("relay".to_string());
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("must be provided together")));

        cfg.delivery.password = Some("secret".to_string());
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.delivery.basic_auth(), Some(("relay", "secret")));
    }

    #[test]
    fn validate_zero_delays_warn_only() {
        let mut cfg = valid();
        cfg.retry_delay_seconds = 0;
        cfg.schedule_interval_seconds = 0;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Warning));
        assert!(cfg.ensure_valid().is_ok());
    }

    #[test]
    fn redacted_masks_password() {
        let mut cfg = valid();
        cfg.delivery.username = Some("relay".to_string());
        cfg.delivery.password = Some("secret".to_string());
        let shown = cfg.redacted();
        assert_eq!(shown.delivery.password.as_deref(), Some("********"));
        assert_eq!(cfg.delivery.password.as_deref(), Some("secret"));
    }

    #[test]
    fn payload_format_parses() {
        assert_eq!("hl7v2".parse::<PayloadFormat>().unwrap(), PayloadFormat::Hl7v2);
        assert_eq!(
            "envelope".parse::<PayloadFormat>().unwrap(),
            PayloadFormat::Envelope
        );
        assert!("xml".parse::<PayloadFormat>().is_err());
    }
}
