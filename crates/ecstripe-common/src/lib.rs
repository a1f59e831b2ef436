//! ecstripe Common - Shared types and utilities
//!
//! This crate provides the stripe geometry, shard buffer maps, CRC-32C
//! helpers, error definitions and configuration used across all ecstripe
//! components.

pub mod checksum;
pub mod config;
pub mod error;
pub mod layout;
pub mod types;

pub use checksum::{CRC32C_SEED, Crc32cState, compute_crc32c, crc32c_seeded, stripelet_crcs};
pub use config::Config;
pub use error::{Error, Result};
pub use layout::StripeLayout;
pub use types::*;
