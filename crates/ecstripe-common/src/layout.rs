//! Stripe geometry
//!
//! A logical object is cut into stripes of `stripe_width` bytes. Each stripe
//! is split across `k` data shards, `chunk_size` bytes per shard:
//!
//! ```text
//! logical:  | stripe 0                | stripe 1                | ...
//!           | c0.0 | c0.1 | ... | c0.k-1 | c1.0 | c1.1 | ...
//!
//! shard 0:  | c0.0 | c1.0 | c2.0 | ...      (chunk_size each)
//! shard 1:  | c0.1 | c1.1 | c2.1 | ...
//! ```
//!
//! Offsets within a shard ("chunk offsets") therefore advance by
//! `chunk_size` for every `stripe_width` of logical data.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Immutable stripe geometry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeLayout {
    stripe_width: u64,
    chunk_size: u64,
    data_shard_count: u64,
}

impl StripeLayout {
    /// Create a layout from the per-shard chunk size and the data shard count
    pub fn new(chunk_size: u64, data_shard_count: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid_argument("chunk_size must be > 0"));
        }
        if data_shard_count == 0 {
            return Err(Error::invalid_argument("data_shard_count must be > 0"));
        }
        let stripe_width = chunk_size.checked_mul(data_shard_count).ok_or_else(|| {
            Error::invalid_argument(format!(
                "stripe width overflows: {chunk_size} x {data_shard_count}"
            ))
        })?;
        Ok(Self {
            stripe_width,
            chunk_size,
            data_shard_count,
        })
    }

    /// Create a layout from the logical stripe width and the data shard count
    pub fn from_stripe_width(stripe_width: u64, data_shard_count: u64) -> Result<Self> {
        if data_shard_count == 0 {
            return Err(Error::invalid_argument("data_shard_count must be > 0"));
        }
        if stripe_width == 0 || !stripe_width.is_multiple_of(data_shard_count) {
            return Err(Error::Misaligned {
                length: stripe_width,
                alignment: data_shard_count,
            });
        }
        Self::new(stripe_width / data_shard_count, data_shard_count)
    }

    /// Logical bytes per stripe
    #[must_use]
    pub const fn stripe_width(&self) -> u64 {
        self.stripe_width
    }

    /// Bytes per shard per stripe
    #[must_use]
    pub const fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of data shards (k)
    #[must_use]
    pub const fn data_shard_count(&self) -> u64 {
        self.data_shard_count
    }

    /// Default stripelet size for this layout: `chunk_size / k`
    ///
    /// May be zero for very small chunks; stripelet operations reject that.
    #[must_use]
    pub const fn default_stripelet_size(&self) -> u64 {
        self.chunk_size / self.data_shard_count
    }

    /// Chunk offset of the stripe containing `offset`
    #[must_use]
    pub const fn logical_to_prev_chunk_offset(&self, offset: u64) -> u64 {
        (offset / self.stripe_width) * self.chunk_size
    }

    /// Chunk offset of the first stripe boundary at or after `offset`
    #[must_use]
    pub const fn logical_to_next_chunk_offset(&self, offset: u64) -> u64 {
        offset.div_ceil(self.stripe_width) * self.chunk_size
    }

    /// Round `offset` down to a stripe boundary
    #[must_use]
    pub const fn logical_to_prev_stripe_offset(&self, offset: u64) -> u64 {
        offset - (offset % self.stripe_width)
    }

    /// Round `offset` up to a stripe boundary
    #[must_use]
    pub const fn logical_to_next_stripe_offset(&self, offset: u64) -> u64 {
        offset.div_ceil(self.stripe_width) * self.stripe_width
    }

    /// Convert a stripe-aligned logical offset to the matching chunk offset
    pub fn aligned_logical_offset_to_chunk_offset(&self, offset: u64) -> Result<u64> {
        if !offset.is_multiple_of(self.stripe_width) {
            return Err(Error::Misaligned {
                length: offset,
                alignment: self.stripe_width,
            });
        }
        Ok((offset / self.stripe_width) * self.chunk_size)
    }

    /// Convert a chunk-aligned shard offset to the matching logical offset
    pub fn aligned_chunk_offset_to_logical_offset(&self, offset: u64) -> Result<u64> {
        if !offset.is_multiple_of(self.chunk_size) {
            return Err(Error::Misaligned {
                length: offset,
                alignment: self.chunk_size,
            });
        }
        Ok((offset / self.chunk_size) * self.stripe_width)
    }

    /// Widen `(offset, len)` to cover whole stripes
    #[must_use]
    pub const fn offset_len_to_stripe_bounds(&self, offset: u64, len: u64) -> (u64, u64) {
        let start = self.logical_to_prev_stripe_offset(offset);
        let end = self.logical_to_next_stripe_offset(offset + len);
        (start, end - start)
    }
}
