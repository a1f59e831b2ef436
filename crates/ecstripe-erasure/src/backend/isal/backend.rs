//! ISA-L backend implementation
//!
//! Uses the `erasure-isa-l` crate for hardware-accelerated erasure coding.
//! The crate bundles ISA-L source and compiles it during build, so no system
//! library installation is required (but nasm, autoconf, automake, libtool are needed).

use crate::ErasureError;
use crate::backend::{
    BackendCapabilities, BackendResult, ErasureBackend, check_indices, input_chunk_len,
    split_stripe,
};
use ecstripe_common::{ShardChunkMap, ShardSet};
use erasure_isa_l::erasure::ErasureCode;
use std::num::NonZeroUsize;

/// ISA-L MDS Reed-Solomon backend
///
/// Uses Intel ISA-L for hardware-accelerated erasure coding on x86/x86_64.
/// Works on both Intel and AMD processors (uses standard AVX/AVX2/AVX-512).
pub struct IsalBackend {
    k: usize,
    m: usize,
    encoder: ErasureCode,
}

impl IsalBackend {
    pub const CAPABILITIES: BackendCapabilities = BackendCapabilities {
        name: "isal",
        supports_simd: true,
        chunk_alignment: 1,
        max_data_shards: 255,
        max_parity_shards: 255,
    };

    /// Create a new ISA-L backend
    ///
    /// # Arguments
    /// * `data_shards` - Number of data shards (k)
    /// * `parity_shards` - Number of parity shards (m)
    pub fn new(data_shards: u8, parity_shards: u8) -> Result<Self, ErasureError> {
        let k_nz = NonZeroUsize::new(data_shards as usize)
            .ok_or_else(|| ErasureError::InvalidConfig("data_shards must be > 0".into()))?;
        let m_nz = NonZeroUsize::new(parity_shards as usize)
            .ok_or_else(|| ErasureError::InvalidConfig("parity_shards must be > 0".into()))?;

        let k = k_nz.get();
        let m = m_nz.get();
        if k + m > 255 {
            return Err(ErasureError::InvalidConfig("k + m must be <= 255".into()));
        }

        // Vandermonde matrix; Cauchy is unreliable in some ISA-L versions
        let encoder = ErasureCode::with_reed_solomon(k_nz, m_nz).map_err(|e| {
            ErasureError::InvalidConfig(format!("failed to create ISA-L encoder: {}", e))
        })?;

        Ok(Self { k, m, encoder })
    }

    fn parity(&self, originals: &[&[u8]]) -> BackendResult<Vec<Vec<u8>>> {
        let chunk_len = originals.first().map_or(0, |c| c.len());
        let mut parity: Vec<Vec<u8>> = (0..self.m).map(|_| vec![0u8; chunk_len]).collect();
        self.encoder
            .encode(originals, &mut parity)
            .map_err(|e| ErasureError::EncodingFailed(format!("ISA-L encode failed: {}", e)))?;
        Ok(parity)
    }
}

impl ErasureBackend for IsalBackend {
    fn capabilities(&self) -> BackendCapabilities {
        Self::CAPABILITIES
    }

    fn data_shards(&self) -> usize {
        self.k
    }

    fn parity_shards(&self) -> usize {
        self.m
    }

    fn encode(&self, want: &ShardSet, stripe: &[u8]) -> BackendResult<ShardChunkMap> {
        check_indices(want, self.total_shards())?;
        let originals = split_stripe(stripe, self.k)?;

        let parity = if want.iter().any(|&i| i >= self.k) {
            self.parity(&originals)?
        } else {
            Vec::new()
        };

        Ok(want
            .iter()
            .map(|&i| {
                let chunk = if i < self.k {
                    originals[i].to_vec()
                } else {
                    parity[i - self.k].clone()
                };
                (i, chunk)
            })
            .collect())
    }

    fn decode(&self, need: &ShardSet, available: &ShardChunkMap) -> BackendResult<ShardChunkMap> {
        check_indices(need, self.total_shards())?;
        check_indices(available.keys(), self.total_shards())?;
        let chunk_len = input_chunk_len(available)?;

        if need.iter().all(|i| available.contains_key(i)) {
            return Ok(need.iter().map(|&i| (i, available[&i].clone())).collect());
        }

        let required = self.min_shards_for_decode();
        if available.len() < required {
            return Err(ErasureError::InsufficientShards {
                available: available.len(),
                required,
            });
        }

        let fill = |i: usize| {
            available
                .get(&i)
                .cloned()
                .unwrap_or_else(|| vec![0u8; chunk_len])
        };
        let mut data: Vec<Vec<u8>> = (0..self.k).map(fill).collect();
        let mut parity: Vec<Vec<u8>> = (self.k..self.k + self.m).map(fill).collect();
        let erasures: Vec<usize> = (0..self.total_shards())
            .filter(|i| !available.contains_key(i))
            .collect();

        self.encoder
            .decode(&mut data, &mut parity, erasures)
            .map_err(|e| ErasureError::DecodingFailed(format!("ISA-L decode failed: {}", e)))?;

        Ok(need
            .iter()
            .map(|&i| {
                let chunk = if i < self.k {
                    data[i].clone()
                } else {
                    parity[i - self.k].clone()
                };
                (i, chunk)
            })
            .collect())
    }
}

// Safety: IsalBackend contains owned data and ErasureCode which is Send+Sync
unsafe impl Send for IsalBackend {}
unsafe impl Sync for IsalBackend {}

#[cfg(test)]
mod tests {
    use super::*;
    use ecstripe_common::shard_range;

    #[test]
    fn test_isal_rebuild_missing() {
        let backend = IsalBackend::new(4, 2).unwrap();
        let stripe: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        let mut shards = backend.encode(&shard_range(6), &stripe).unwrap();
        shards.remove(&2);
        shards.remove(&4);

        assert_eq!(backend.decode_concat(&shards).unwrap(), stripe);
    }
}
