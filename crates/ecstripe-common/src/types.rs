//! Core type definitions for ecstripe
//!
//! This module defines the shard identifiers and buffer maps passed between
//! the stripe codec, the erasure backends and the integrity records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Position of a shard within the erasure code (0..k data, k..k+m parity)
pub type ShardIndex = usize;

/// Mapping from shard index to that shard's bytes
///
/// Ordered so that iteration, encoding and dumps are deterministic.
pub type ShardChunkMap = BTreeMap<ShardIndex, Vec<u8>>;

/// Set of shard indices requested from or available to a codec
pub type ShardSet = BTreeSet<ShardIndex>;

/// Build the set `0..count`
#[must_use]
pub fn shard_range(count: usize) -> ShardSet {
    (0..count).collect()
}

/// Common length of every buffer in `shards`
///
/// Returns `None` if the map is empty or the buffers differ in length.
#[must_use]
pub fn common_length(shards: &ShardChunkMap) -> Option<usize> {
    let mut lengths = shards.values().map(Vec::len);
    let first = lengths.next()?;
    lengths.all(|len| len == first).then_some(first)
}

/// Erasure coding configuration (k data shards, m parity shards)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Number of data shards (k)
    pub data_shards: u8,
    /// Number of parity shards (m)
    pub parity_shards: u8,
}

impl ErasureConfig {
    /// Create a new erasure config
    #[must_use]
    pub const fn new(data_shards: u8, parity_shards: u8) -> Self {
        Self {
            data_shards,
            parity_shards,
        }
    }

    /// Total number of shards (k + m)
    #[must_use]
    pub const fn total_shards(&self) -> usize {
        self.data_shards as usize + self.parity_shards as usize
    }

}
