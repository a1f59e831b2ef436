//! Erasure coding backend abstraction
//!
//! This module provides the trait-based capability the stripe codec drives,
//! one stripe at a time. Implementations are stateless with respect to the
//! data they process and are selected once, at construction time.
//!
//! # Backends
//!
//! - `rust_simd`: Pure Rust using reed-solomon-simd (default, portable)
//! - `isal`: Intel ISA-L via FFI (x86/x86_64 only, feature-gated)
//!
//! # Shard numbering
//!
//! Shards `0..k` carry the stripe's data chunks in order, shards `k..k+m`
//! carry parity. Concatenating the data chunks of a stripe reproduces it.

pub mod factory;
pub mod rust_simd;

#[cfg(all(feature = "isal", any(target_arch = "x86", target_arch = "x86_64")))]
pub mod isal;

use crate::ErasureError;
use ecstripe_common::{ShardChunkMap, ShardIndex, ShardSet, common_length, shard_range};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, ErasureError>;

/// Capabilities of an erasure coding backend
#[derive(Clone, Debug, Default)]
pub struct BackendCapabilities {
    /// Backend name for identification
    pub name: &'static str,
    /// Supports SIMD acceleration
    pub supports_simd: bool,
    /// Chunk sizes must be a multiple of this many bytes
    pub chunk_alignment: usize,
    /// Maximum data shards supported
    pub max_data_shards: usize,
    /// Maximum parity shards supported
    pub max_parity_shards: usize,
}

/// Core trait for erasure coding backends
///
/// A backend works on a single stripe: `encode` cuts one stripe into `k`
/// data chunks and derives `m` parity chunks, `decode` rebuilds chunks of
/// one stripe from any sufficient subset.
pub trait ErasureBackend: Send + Sync {
    /// Get backend capabilities
    fn capabilities(&self) -> BackendCapabilities;

    /// Get the number of data shards (k)
    fn data_shards(&self) -> usize;

    /// Get the number of parity shards (m)
    fn parity_shards(&self) -> usize;

    /// Get total number of shards (k + m)
    fn total_shards(&self) -> usize {
        self.data_shards() + self.parity_shards()
    }

    /// Get minimum shards required for reconstruction (k)
    fn min_shards_for_decode(&self) -> usize {
        self.data_shards()
    }

    /// Encode one stripe, returning only the chunks listed in `want`
    ///
    /// `stripe.len()` must be a non-zero multiple of `k`; every returned chunk
    /// is `stripe.len() / k` bytes.
    fn encode(&self, want: &ShardSet, stripe: &[u8]) -> BackendResult<ShardChunkMap>;

    /// Reconstruct the chunks listed in `need` from `available`
    ///
    /// All available chunks must have the same length. Fails with
    /// `InsufficientShards` when the available set cannot rebuild a needed
    /// chunk.
    fn decode(&self, need: &ShardSet, available: &ShardChunkMap) -> BackendResult<ShardChunkMap>;

    /// Reconstruct and concatenate the data chunks of one stripe
    fn decode_concat(&self, available: &ShardChunkMap) -> BackendResult<Vec<u8>> {
        let need = shard_range(self.data_shards());
        let mut decoded = self.decode(&need, available)?;
        let chunk_len = common_length(&decoded).unwrap_or_default();
        let mut stripe = Vec::with_capacity(chunk_len * need.len());
        for index in &need {
            let chunk = decoded
                .remove(index)
                .ok_or(ErasureError::MissingShard(*index))?;
            stripe.extend_from_slice(&chunk);
        }
        Ok(stripe)
    }
}

/// Reject shard indices outside `0..total`
pub(crate) fn check_indices<'a>(
    indices: impl IntoIterator<Item = &'a ShardIndex>,
    total: usize,
) -> BackendResult<()> {
    for &index in indices {
        if index >= total {
            return Err(ErasureError::UnknownShard { index, total });
        }
    }
    Ok(())
}

/// Split a stripe into `k` equal data chunks
pub(crate) fn split_stripe(stripe: &[u8], k: usize) -> BackendResult<Vec<&[u8]>> {
    if stripe.is_empty() || !stripe.len().is_multiple_of(k) {
        return Err(ErasureError::InvalidStripe {
            length: stripe.len(),
            data_shards: k,
        });
    }
    Ok(stripe.chunks_exact(stripe.len() / k).collect())
}

/// Common chunk length of a decode input, which must be non-empty
pub(crate) fn input_chunk_len(available: &ShardChunkMap) -> BackendResult<usize> {
    match common_length(available) {
        Some(0) | None => Err(ErasureError::ShardSizeMismatch),
        Some(len) => Ok(len),
    }
}

// Re-exports
pub use factory::{BackendConfig, BackendFactory, BackendType};
pub use rust_simd::RustSimdBackend;
