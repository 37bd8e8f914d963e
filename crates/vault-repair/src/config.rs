use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vault_store::{StoreOptions, DEFAULT_FILE_MODE, DEFAULT_OPEN_TIMEOUT};

use crate::checker::CheckerConfig;
use crate::error::ConfigError;

/// Settings for opening, checking and repairing a store.
///
/// Every field is optional in TOML; missing fields take their defaults.
///
/// ```toml
/// verify_workers = 8
/// exhaustive_scan = true
/// open_timeout_ms = 1000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Threads used to verify blocks.
    pub verify_workers: usize,
    /// Keep scanning after the first faulty block to report all of them.
    pub exhaustive_scan: bool,
    /// How long to wait for the store's file lock.
    pub open_timeout_ms: u64,
    /// Open the store read-only. Checks still run; repairs are refused.
    pub read_only: bool,
    /// Unix permission bits for newly created store files.
    pub file_mode: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            verify_workers: 4,
            exhaustive_scan: false,
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT.as_millis() as u64,
            read_only: false,
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

impl RepairConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verify_workers == 0 {
            return Err(ConfigError::Invalid(
                "verify_workers must be at least 1".into(),
            ));
        }
        if self.open_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "open_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.file_mode > 0o777 {
            return Err(ConfigError::Invalid(format!(
                "file_mode {:o} is not a permission mask",
                self.file_mode
            )));
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            read_only: self.read_only,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            file_mode: self.file_mode,
        }
    }

    pub fn checker_config(&self) -> CheckerConfig {
        CheckerConfig {
            workers: self.verify_workers,
            exhaustive: self.exhaustive_scan,
        }
    }
}
