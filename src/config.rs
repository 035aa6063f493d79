//! Configuration types for a harvest run.
//!
//! [`HarvestConfig`] carries the tunables of the pipeline and the exporter
//! and can be read from a JSON file. [`Credentials`] come from the
//! environment; anything missing there is asked for interactively.
//!
//! # Example
//!
//! ```rust
//! use telegram_harvester::config::{ExportFormat, HarvestConfig};
//! use std::time::Duration;
//!
//! let config = HarvestConfig::new()
//!     .with_page_size(50)
//!     .with_conversation_pause(Duration::from_secs(5))
//!     .with_format(ExportFormat::Csv);
//! assert_eq!(config.page_size, 50);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Unknown export format: {0} (expected xlsx or csv)")]
    UnknownFormat(String),
}

/// Spreadsheet format of the output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xlsx => f.write_str("xlsx"),
            Self::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// Tunables for a harvest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Messages per history request (default: 100)
    pub page_size: usize,

    /// Log progress every N collected messages (default: 500)
    pub progress_interval: usize,

    /// Pause between two conversation harvests (default: 2s)
    #[serde(with = "duration_secs")]
    pub conversation_pause: Duration,

    /// Directory the spreadsheets are written to (default: `.`)
    pub output_dir: PathBuf,

    /// Output format (default: xlsx)
    pub format: ExportFormat,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            progress_interval: 500,
            conversation_pause: Duration::from_secs(2),
            output_dir: PathBuf::from("."),
            format: ExportFormat::Xlsx,
        }
    }
}

impl HarvestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON config file; absent keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    #[must_use]
    pub fn with_conversation_pause(mut self, pause: Duration) -> Self {
        self.conversation_pause = pause;
        self
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// API credentials of the platform application plus the account phone.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub phone: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &self.api_hash.as_ref().map(|_| "<redacted>"))
            .field("phone", &self.phone)
            .finish()
    }
}

impl Credentials {
    pub const API_ID_VAR: &'static str = "TG_API_ID";
    pub const API_HASH_VAR: &'static str = "TG_API_HASH";
    pub const PHONE_VAR: &'static str = "TG_PHONE";

    /// Reads whatever credentials the process environment provides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Credentials::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_id = present(Self::API_ID_VAR)
            .map(|raw| {
                raw.trim().parse::<i32>().map_err(|_| ConfigError::InvalidEnv {
                    name: Self::API_ID_VAR,
                    value: raw,
                })
            })
            .transpose()?;

        Ok(Self {
            api_id,
            api_hash: present(Self::API_HASH_VAR),
            phone: present(Self::PHONE_VAR),
        })
    }
}
