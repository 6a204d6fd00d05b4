//! Configuration for keyset
//!
//! `ks` manages the file the gigwork client persists reconsidered job ids
//! to, so it reads the same `gigwork.yml` and only looks at the keys it
//! needs. Unknown sections are ignored.

use eyre::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the key set lives
    pub reconsideration: StoreSection,

    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    #[serde(rename = "store-path")]
    pub store_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            store_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("gigwork")
                .join(crate::DEFAULT_FILE_NAME),
        }
    }
}

impl Config {
    /// Explicit path, then `./.gigwork.yml`, then the user config dir, then defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            return Self::read(config_path);
        }

        let candidates = [
            Some(PathBuf::from(".gigwork.yml")),
            dirs::config_dir().map(|p| p.join("gigwork").join("gigwork.yml")),
        ];
        match candidates.iter().flatten().find(|p| p.exists()) {
            Some(found) => Self::read(found),
            None => Ok(Self::default()),
        }
    }

    /// Path of the key set file
    pub fn store_path(&self) -> &Path {
        &self.reconsideration.store_path
    }

    fn read(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read config from {}", path.display()))?;
        serde_yaml::from_str(&content).context(format!("Failed to parse config at {}", path.display()))
    }
}
