use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to parse config {path}: {source}")]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Whole-process configuration; built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub monitor: MonitorSettings,
    pub retention: RetentionSettings,
    pub speedtest: SpeedTestSettings,
    pub query: QuerySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: path::PathBuf,
    pub pool_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub targets: Vec<String>,
    pub check_interval_seconds: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub check_retention_days: u64,
    /// Speed tests are kept forever unless set
    pub speedtest_retention_days: Option<u64>,
    pub prune_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTestSettings {
    pub interval_seconds: u64,
    pub download_bytes: u64,
    pub upload_bytes: u64,
    pub download_url: String,
    pub upload_url: String,
    pub latency_target: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub window_minutes: u64,
    pub latency_threshold_ms: i64,
    pub status_page_size: usize,
    pub speedtest_page_size: usize,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: "uptime.db".into(), pool_size: 8 }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            targets: vec![
                "https://1.1.1.1".into(),
                "https://google.com".into(),
                "https://github.com".into(),
            ],
            check_interval_seconds: 30,
            timeout_seconds: 10,
        }
    }
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            check_retention_days: 90,
            speedtest_retention_days: None,
            prune_interval_seconds: 24 * 3600,
        }
    }
}

impl Default for SpeedTestSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
            download_bytes: 25_000_000,
            upload_bytes: 10 * 1024 * 1024,
            download_url: "https://speed.cloudflare.com/__down".into(),
            upload_url: "https://speed.cloudflare.com/__up".into(),
            latency_target: "https://1.1.1.1".into(),
            timeout_seconds: 120,
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            latency_threshold_ms: 250,
            status_page_size: 500,
            speedtest_page_size: 100,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            monitor: MonitorSettings::default(),
            retention: RetentionSettings::default(),
            speedtest: SpeedTestSettings::default(),
            query: QuerySettings::default(),
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/upwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::var_os("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("upwatch/config.toml"))
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

/// Minutes to a duration, saturating instead of overflowing
pub fn minutes(value: u64) -> Duration {
    secs(value.saturating_mul(60))
}

fn days(value: u64) -> Duration {
    secs(value.saturating_mul(24 * 3600))
}

impl MonitorSettings {
    pub fn check_interval(&self) -> Duration {
        secs(self.check_interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout_seconds)
    }
}

impl RetentionSettings {
    pub fn check_retention(&self) -> Duration {
        days(self.check_retention_days)
    }

    pub fn speedtest_retention(&self) -> Option<Duration> {
        self.speedtest_retention_days.map(days)
    }

    pub fn prune_interval(&self) -> Duration {
        secs(self.prune_interval_seconds)
    }
}

impl SpeedTestSettings {
    pub fn interval(&self) -> Duration {
        secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout_seconds)
    }
}

impl QuerySettings {
    pub fn window(&self) -> Duration {
        minutes(self.window_minutes)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let title = write_title_indented(1);
        let item = write_indented(1);

        writeln!(f, "Current Configuration State:")?;
        title(f, "Database")?;
        item(f, "Path", &self.database.path.display())?;
        item(f, "Pool Size", &self.database.pool_size)?;
        title(f, "Monitor")?;
        item(f, "Targets", &self.monitor.targets.join(", "))?;
        item(f, "Check Interval (s)", &self.monitor.check_interval_seconds)?;
        item(f, "Probe Timeout (s)", &self.monitor.timeout_seconds)?;
        title(f, "Retention")?;
        item(f, "Checks (days)", &self.retention.check_retention_days)?;
        match self.retention.speedtest_retention_days {
            Some(days) => item(f, "Speed Tests (days)", &days)?,
            None => item(f, "Speed Tests (days)", &"unbounded")?,
        }
        item(f, "Prune Interval (s)", &self.retention.prune_interval_seconds)?;
        title(f, "Speed Test")?;
        item(f, "Interval (s)", &self.speedtest.interval_seconds)?;
        item(f, "Download Bytes", &self.speedtest.download_bytes)?;
        item(f, "Upload Bytes", &self.speedtest.upload_bytes)?;
        item(f, "Download URL", &self.speedtest.download_url)?;
        item(f, "Upload URL", &self.speedtest.upload_url)?;
        item(f, "Latency Target", &self.speedtest.latency_target)?;
        title(f, "Query")?;
        item(f, "Window (min)", &self.query.window_minutes)?;
        item(f, "Latency Threshold (ms)", &self.query.latency_threshold_ms)?;
        item(f, "Status Page Size", &self.query.status_page_size)?;
        item(f, "Speed Test Page Size", &self.query.speedtest_page_size)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/upwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            Self::from_toml_str(&raw_string)
                .map_err(|source| ConfigError::ParseFailed { path: config_path.clone(), source })?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MAX_TIMEOUT: u64 = 300;
        const MAX_RETENTION_DAYS: u64 = 36_500;
        const MAX_WINDOW_MINUTES: u64 = MAX_RETENTION_DAYS * 24 * 60;

        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid { field, reason: reason.into() }
        }

        if self.monitor.check_interval_seconds == 0 {
            return Err(invalid("monitor.check_interval_seconds", "must be at least 1"));
        }
        if !(1..=MAX_TIMEOUT).contains(&self.monitor.timeout_seconds) {
            return Err(invalid(
                "monitor.timeout_seconds",
                format!("must be between 1 and {MAX_TIMEOUT}"),
            ));
        }
        if self.retention.prune_interval_seconds == 0 {
            return Err(invalid("retention.prune_interval_seconds", "must be at least 1"));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention.check_retention_days) {
            return Err(invalid(
                "retention.check_retention_days",
                format!("must be between 1 and {MAX_RETENTION_DAYS}"),
            ));
        }
        if self
            .retention
            .speedtest_retention_days
            .is_some_and(|days| !(1..=MAX_RETENTION_DAYS).contains(&days))
        {
            return Err(invalid(
                "retention.speedtest_retention_days",
                format!("must be between 1 and {MAX_RETENTION_DAYS}"),
            ));
        }
        if self.speedtest.interval_seconds == 0 {
            return Err(invalid("speedtest.interval_seconds", "must be at least 1"));
        }
        if self.speedtest.download_bytes == 0 || self.speedtest.upload_bytes == 0 {
            return Err(invalid("speedtest.download_bytes", "payload sizes must be non-zero"));
        }
        if self.speedtest.timeout_seconds == 0 {
            return Err(invalid("speedtest.timeout_seconds", "must be at least 1"));
        }
        if !(1..=MAX_WINDOW_MINUTES).contains(&self.query.window_minutes) {
            return Err(invalid(
                "query.window_minutes",
                format!("must be between 1 and {MAX_WINDOW_MINUTES}"),
            ));
        }
        if self.query.latency_threshold_ms < 0 {
            return Err(invalid("query.latency_threshold_ms", "must not be negative"));
        }
        if self.query.status_page_size == 0 || self.query.speedtest_page_size == 0 {
            return Err(invalid("query.status_page_size", "page sizes must be non-zero"));
        }
        if self.database.pool_size == 0 {
            return Err(invalid("database.pool_size", "must be at least 1"));
        }
        Ok(())
    }
}
