//! Backend selection
//!
//! The stripe codec never names a concrete backend. It asks the factory for
//! one by [`BackendType`], usually parsed from the `[backend] kind` config
//! value, and keeps the resulting trait object for its lifetime.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{BackendCapabilities, ErasureBackend, RustSimdBackend};
use crate::ErasureError;
use ecstripe_common::ErasureConfig;
use tracing::debug;

/// Which erasure backend to build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackendType {
    /// Intel ISA-L, needs the `isal` feature on x86/x86_64
    IsaL,
    /// Portable Reed-Solomon from `reed-solomon-simd`
    #[default]
    RustSimd,
    /// Fastest backend compiled into this build
    Auto,
}

impl BackendType {
    /// Name used in configuration files
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::IsaL => "isal",
            Self::RustSimd => "rust_simd",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendType {
    type Err = ErasureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isal" | "isa-l" => Ok(Self::IsaL),
            "rust_simd" | "rust-simd" => Ok(Self::RustSimd),
            "auto" | "" => Ok(Self::Auto),
            other => Err(ErasureError::InvalidConfig(format!(
                "unknown erasure backend {other:?}"
            ))),
        }
    }
}

/// Shard counts and backend preference
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    /// Data shards (k)
    pub data_shards: u8,
    /// Parity shards (m)
    pub parity_shards: u8,
    pub backend_type: BackendType,
}

impl BackendConfig {
    /// `k` data and `m` parity shards on the best available backend
    #[must_use]
    pub const fn new(data_shards: u8, parity_shards: u8) -> Self {
        Self {
            data_shards,
            parity_shards,
            backend_type: BackendType::Auto,
        }
    }

    #[must_use]
    pub const fn with_backend(mut self, backend_type: BackendType) -> Self {
        self.backend_type = backend_type;
        self
    }

    fn check_limits(&self, caps: &BackendCapabilities) -> Result<(), ErasureError> {
        if usize::from(self.data_shards) > caps.max_data_shards
            || usize::from(self.parity_shards) > caps.max_parity_shards
        {
            return Err(ErasureError::InvalidConfig(format!(
                "{}+{} exceeds the {} backend limits of {}+{}",
                self.data_shards,
                self.parity_shards,
                caps.name,
                caps.max_data_shards,
                caps.max_parity_shards
            )));
        }
        Ok(())
    }
}

impl From<ErasureConfig> for BackendConfig {
    fn from(config: ErasureConfig) -> Self {
        Self::new(config.data_shards, config.parity_shards)
    }
}

/// Builds erasure backends
pub struct BackendFactory;

impl BackendFactory {
    /// Build the backend described by `config`
    pub fn create(config: &BackendConfig) -> Result<Arc<dyn ErasureBackend>, ErasureError> {
        let backend_type = match config.backend_type {
            BackendType::Auto => Self::detect_best_backend(),
            other => other,
        };

        let backend: Arc<dyn ErasureBackend> = match backend_type {
            #[cfg(all(feature = "isal", any(target_arch = "x86", target_arch = "x86_64")))]
            BackendType::IsaL => {
                config.check_limits(&super::isal::IsalBackend::CAPABILITIES)?;
                Arc::new(super::isal::IsalBackend::new(
                    config.data_shards,
                    config.parity_shards,
                )?)
            }
            #[cfg(not(all(feature = "isal", any(target_arch = "x86", target_arch = "x86_64"))))]
            BackendType::IsaL => {
                return Err(ErasureError::InvalidConfig(
                    "isal backend is not compiled into this build".into(),
                ));
            }
            BackendType::RustSimd | BackendType::Auto => {
                config.check_limits(&RustSimdBackend::CAPABILITIES)?;
                Arc::new(RustSimdBackend::new(config.data_shards, config.parity_shards)?)
            }
        };

        debug!(
            backend = backend.capabilities().name,
            data_shards = config.data_shards,
            parity_shards = config.parity_shards,
            "created erasure backend"
        );
        Ok(backend)
    }

    /// Backend `Auto` resolves to
    #[must_use]
    pub fn detect_best_backend() -> BackendType {
        #[cfg(all(feature = "isal", any(target_arch = "x86", target_arch = "x86_64")))]
        {
            if super::isal::is_available() {
                return BackendType::IsaL;
            }
        }
        BackendType::RustSimd
    }

    /// Capabilities of every backend compiled into this build
    #[must_use]
    pub fn available_backends() -> Vec<BackendCapabilities> {
        #[allow(unused_mut)]
        let mut caps = vec![RustSimdBackend::CAPABILITIES];
        #[cfg(all(feature = "isal", any(target_arch = "x86", target_arch = "x86_64")))]
        caps.push(super::isal::IsalBackend::CAPABILITIES);
        caps
    }
}
