//! Configuration types for ecstripe
//!
//! Configuration is read from TOML. Every field has a default so a partial
//! (or missing) file is valid:
//!
//! ```toml
//! [layout]
//! data_shards = 4
//! parity_shards = 2
//! chunk_size = 4096
//!
//! [integrity]
//! stripelet_size = 1024
//!
//! [backend]
//! kind = "auto"
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::layout::StripeLayout;
use crate::types::ErasureConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Stripe geometry and shard counts
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Stripelet checksum settings
    #[serde(default)]
    pub integrity: IntegrityConfig,
    /// Erasure backend selection
    #[serde(default)]
    pub backend: BackendSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Erasure configuration described by the layout section
    #[must_use]
    pub const fn erasure(&self) -> ErasureConfig {
        ErasureConfig::new(self.layout.data_shards, self.layout.parity_shards)
    }

    /// Build the validated stripe layout
    pub fn stripe_layout(&self) -> Result<StripeLayout> {
        StripeLayout::new(self.layout.chunk_size, u64::from(self.layout.data_shards))
            .map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Stripelet size to use for new records
    ///
    /// Falls back to `chunk_size / data_shards` when not set explicitly.
    pub fn stripelet_size(&self) -> Result<u64> {
        let size = match self.integrity.stripelet_size {
            Some(size) => size,
            None => self.stripe_layout()?.default_stripelet_size(),
        };
        if size == 0 {
            return Err(Error::Configuration("stripelet_size must be > 0".into()));
        }
        Ok(size)
    }
}

/// Stripe geometry configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Number of data shards (k)
    #[serde(default = "default_data_shards")]
    pub data_shards: u8,
    /// Number of parity shards (m)
    #[serde(default = "default_parity_shards")]
    pub parity_shards: u8,
    /// Bytes per shard per stripe
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            data_shards: default_data_shards(),
            parity_shards: default_parity_shards(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Stripelet checksum configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityConfig {
    /// Bytes per stripelet checksum
    #[serde(default)]
    pub stripelet_size: Option<u64>,
}

/// Erasure backend configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSection {
    /// Backend name ("auto", "rust_simd")
    #[serde(default = "default_backend_kind")]
    pub kind: String,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const fn default_data_shards() -> u8 {
    4
}

const fn default_parity_shards() -> u8 {
    2
}

const fn default_chunk_size() -> u64 {
    4096
}

fn default_backend_kind() -> String {
    "auto".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
