use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};
use crate::models::Encoding;

/// Archiver configuration, loaded from a TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local parts of the mailboxes to archive, processed in order
    pub users: Vec<String>,
    /// Mail domain appended to each user to form the mailbox address
    pub domain: String,
    /// Sender addresses to exclude, compared case-insensitively
    #[serde(default)]
    pub ignore_from: Vec<String>,
    #[serde(default = "default_max_per_run")]
    pub max_per_run: usize,
    #[serde(default)]
    pub zip: bool,
    #[serde(default)]
    pub gzip: bool,
    #[serde(default = "default_fetch_window_days")]
    pub fetch_window_days: u32,
    /// Floor for users with no persisted checkpoint
    #[serde(default = "default_oldest_date")]
    pub oldest_date: NaiveDate,
    pub data_dir: PathBuf,
    pub timestamp_file: PathBuf,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Connection settings for the remote mail store
///
/// Credential acquisition is external: either a plain password or an
/// already-obtained XOAUTH2 token is supplied here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_drafts_folder")]
    pub drafts_folder: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub xoauth2_token: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            folder: default_folder(),
            drafts_folder: default_drafts_folder(),
            password: None,
            xoauth2_token: None,
        }
    }
}

fn default_max_per_run() -> usize {
    1000
}

fn default_fetch_window_days() -> u32 {
    30
}

fn default_oldest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2012, 1, 1).unwrap()
}

fn default_host() -> String {
    "imap.gmail.com".to_string()
}

fn default_port() -> u16 {
    993
}

fn default_folder() -> String {
    "[Gmail]/All Mail".to_string()
}

fn default_drafts_folder() -> String {
    "[Gmail]/Drafts".to_string()
}

impl Config {
    /// Load, validate and normalize configuration
    ///
    /// A missing or unreadable file is a startup-fatal error; there is no
    /// sensible default for `users`, `domain` or the storage paths.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ArchiveError::ConfigError(format!("failed to read config file {:?}: {}", path, e))
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| {
            ArchiveError::ConfigError(format!("failed to parse config file {:?}: {}", path, e))
        })?;

        config.validate()?;
        config.normalize();

        tracing::info!("loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ArchiveError::ConfigError(format!("failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content).await?;
        tracing::info!("saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.zip && self.gzip {
            return Err(ArchiveError::ConfigError(
                "both zip and gzip compression specified, choose one".to_string(),
            ));
        }

        if self.users.is_empty() {
            return Err(ArchiveError::ConfigError(
                "users must list at least one mailbox".to_string(),
            ));
        }

        if self.domain.is_empty() {
            return Err(ArchiveError::ConfigError(
                "domain cannot be empty".to_string(),
            ));
        }

        if self.max_per_run == 0 {
            return Err(ArchiveError::ConfigError(
                "max_per_run must be at least 1".to_string(),
            ));
        }

        if self.fetch_window_days == 0 {
            return Err(ArchiveError::ConfigError(
                "fetch_window_days must be at least 1".to_string(),
            ));
        }

        tracing::debug!("configuration validation passed");
        Ok(())
    }

    /// Case-normalize the ignore set so filter comparisons are a plain lookup
    fn normalize(&mut self) {
        for addr in &mut self.ignore_from {
            *addr = addr.to_lowercase();
        }
    }

    /// Output encoding derived from the zip/gzip flags
    ///
    /// `validate` rejects the conflicting combination, so zip wins here only
    /// over the identity default.
    pub fn encoding(&self) -> Encoding {
        if self.zip {
            Encoding::Zip
        } else if self.gzip {
            Encoding::Gzip
        } else {
            Encoding::Identity
        }
    }

    /// Checkpoint floor as a UTC instant (midnight of `oldest_date`)
    pub fn oldest_date_utc(&self) -> DateTime<Utc> {
        self.oldest_date
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }

    /// Sample configuration used by `init-config`
    pub fn example() -> Self {
        Self {
            users: vec!["alice".to_string(), "bob".to_string()],
            domain: "example.com".to_string(),
            ignore_from: vec!["noreply@example.com".to_string()],
            max_per_run: default_max_per_run(),
            zip: false,
            gzip: false,
            fetch_window_days: default_fetch_window_days(),
            oldest_date: default_oldest_date(),
            data_dir: PathBuf::from("./archive"),
            timestamp_file: PathBuf::from("./archive/timestamps.txt"),
            store: StoreConfig::default(),
        }
    }

    pub async fn create_example(path: &Path) -> Result<()> {
        Self::example().save(path).await
    }
}
