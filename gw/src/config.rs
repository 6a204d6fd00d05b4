//! Gigwork configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policy::{Policies, RetryPolicy};
use crate::session::OtpSettings;

/// Main gigwork configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interaction cache actor
    pub cache: CacheConfig,

    /// Remote store calls
    pub remote: RemoteConfig,

    /// Sync with the remote store
    pub sync: SyncConfig,

    /// OTP limits
    pub otp: OtpConfig,

    /// Persisted reconsideration ids
    pub reconsideration: ReconsiderationConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .gigwork.yml
        let local_config = PathBuf::from(".gigwork.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/gigwork/gigwork.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("gigwork").join("gigwork.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Timeouts and retry budgets for every guarded operation
    pub fn policies(&self) -> Policies {
        let remote_retries = |timeout_ms: u64| {
            RetryPolicy::new(Duration::from_millis(timeout_ms))
                .with_retries(self.remote.max_retries, Duration::from_millis(self.remote.backoff_ms))
        };
        Policies {
            cache_update: RetryPolicy::new(Duration::from_millis(self.cache.update_timeout_ms)),
            cache_bulk: RetryPolicy::new(Duration::from_millis(self.cache.bulk_timeout_ms)),
            remote_read: remote_retries(self.remote.read_timeout_ms),
            remote_write: remote_retries(self.remote.write_timeout_ms),
            sync: RetryPolicy::new(Duration::from_millis(self.sync.timeout_ms)),
        }
    }

    pub fn otp_settings(&self) -> OtpSettings {
        OtpSettings {
            max_attempts: Some(self.otp.max_attempts).filter(|n| *n > 0),
            ttl: Some(self.otp.ttl_secs)
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
        }
    }

    /// Zero disables periodic sync
    pub fn sync_interval(&self) -> Option<Duration> {
        Some(self.sync.interval_secs)
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

/// Interaction cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Deadline for a single cache mutation
    #[serde(rename = "update-timeout-ms")]
    pub update_timeout_ms: u64,

    /// Deadline for bulk load and reset
    #[serde(rename = "bulk-timeout-ms")]
    pub bulk_timeout_ms: u64,

    /// Command queue depth; a full queue makes the fast path report busy
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            update_timeout_ms: 750,
            bulk_timeout_ms: 2000,
            channel_buffer: 256,
        }
    }
}

/// Remote store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    #[serde(rename = "read-timeout-ms")]
    pub read_timeout_ms: u64,

    #[serde(rename = "write-timeout-ms")]
    pub write_timeout_ms: u64,

    /// Extra attempts after a timeout or transient failure
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First retry delay; doubles each attempt
    #[serde(rename = "backoff-ms")]
    pub backoff_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            max_retries: 2,
            backoff_ms: 250,
        }
    }
}

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Deadline for fetching all application rows
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Periodic resync interval; 0 disables it
    #[serde(rename = "interval-secs")]
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            interval_secs: 300,
        }
    }
}

/// OTP configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    /// Wrong codes before the live OTP is revoked; 0 is unlimited
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// OTP lifetime; 0 never expires
    #[serde(rename = "ttl-secs")]
    pub ttl_secs: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            ttl_secs: 900,
        }
    }
}

/// Reconsideration store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconsiderationConfig {
    /// JSONL file holding reconsidered job ids
    #[serde(rename = "store-path")]
    pub store_path: PathBuf,
}

impl Default for ReconsiderationConfig {
    fn default() -> Self {
        Self {
            store_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("gigwork")
                .join(keyset::DEFAULT_FILE_NAME),
        }
    }
}
