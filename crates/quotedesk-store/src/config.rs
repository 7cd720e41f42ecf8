//! Store configuration.
//!
//! Configuration is a small TOML file. Every section is optional; missing
//! values fall back to the defaults the desktop application ships with.
//!
//! ```toml
//! data_dir = "/home/me/.local/share/quotedesk"
//! guard_plaintext_overwrite = true
//!
//! [files]
//! data = "data.json"
//! customers = "customers.json"
//!
//! [wipe]
//! max_retries = 2
//! settle_delay_ms = 500
//! retry_delay_ms = 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Default name of the primary data file (also the legacy customer location).
pub const DEFAULT_DATA_FILE: &str = "data.json";

/// Default name of the customer record file.
pub const DEFAULT_CUSTOMER_FILE: &str = "customers.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding every document the store owns.
    #[serde(default = "default_data_dir_or_cwd")]
    pub data_dir: PathBuf,

    /// Refuse empty writes over a non-empty plaintext list as well as over
    /// encrypted data.
    #[serde(default)]
    pub guard_plaintext_overwrite: bool,

    #[serde(default)]
    pub files: FilesSection,

    #[serde(default)]
    pub wipe: WipeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesSection {
    #[serde(default = "default_data_file")]
    pub data: String,
    #[serde(default = "default_customer_file")]
    pub customers: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WipeSection {
    /// Retries after the first delete attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause after invalidating a handle, before deleting.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Pause between failed verification and the next attempt.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            data: default_data_file(),
            customers: default_customer_file(),
        }
    }
}

impl Default for WipeSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            settle_delay_ms: default_settle_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl WipeSection {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl StoreConfig {
    /// Configuration rooted at `data_dir` with default file names and wipe
    /// policy.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            guard_plaintext_overwrite: false,
            files: FilesSection::default(),
            wipe: WipeSection::default(),
        }
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
            .map_err(|e| StoreError::Config(format!("{} ({})", e, path.display())))
    }

    /// Parse a TOML configuration string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(contents)
            .map_err(|e| StoreError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for name in [&self.files.data, &self.files.customers] {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(StoreError::Config(format!(
                    "Invalid document file name: {:?}",
                    name
                )));
            }
        }
        if self.files.data == self.files.customers {
            return Err(StoreError::Config(
                "Data and customer files must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform data directory for the application (`$XDG_DATA_HOME/quotedesk`,
/// falling back to `~/.local/share/quotedesk`).
pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("quotedesk"));
        }
    }
    let home = std::env::var("HOME").map_err(|_| {
        StoreError::Config("HOME is not set; cannot resolve default paths".to_string())
    })?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("quotedesk"))
}

fn default_data_dir_or_cwd() -> PathBuf {
    default_data_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_data_file() -> String {
    DEFAULT_DATA_FILE.to_string()
}

fn default_customer_file() -> String {
    DEFAULT_CUSTOMER_FILE.to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_retry_delay_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("/tmp/quotedesk");
        assert_eq!(config.files.data, "data.json");
        assert_eq!(config.files.customers, "customers.json");
        assert_eq!(config.wipe.max_retries, 2);
        assert_eq!(config.wipe.settle_delay(), Duration::from_millis(500));
        assert!(!config.guard_plaintext_overwrite);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = StoreConfig::from_toml(
            r#"
            data_dir = "/srv/quotedesk"

            [wipe]
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/quotedesk"));
        assert_eq!(config.wipe.max_retries, 5);
        assert_eq!(config.wipe.retry_delay_ms, 1000);
        assert_eq!(config.files.customers, "customers.json");
    }

    #[test]
    fn test_rejects_same_file_names() {
        let result = StoreConfig::from_toml(
            r#"
            data_dir = "/srv/quotedesk"

            [files]
            data = "store.json"
            customers = "store.json"
            "#,
        );
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_rejects_path_in_file_name() {
        let result = StoreConfig::from_toml(
            r#"
            data_dir = "/srv/quotedesk"

            [files]
            customers = "../escape.json"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = StoreConfig::load(&dir.path().join("config.toml"));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read config"));
    }
}
