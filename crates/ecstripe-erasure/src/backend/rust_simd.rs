//! Pure Rust SIMD backend using reed-solomon-simd
//!
//! This backend provides portable erasure coding using the `reed-solomon-simd`
//! crate, which automatically uses SIMD instructions where available (SSE, AVX,
//! NEON). `reed-solomon-simd` requires even chunk sizes.

use super::{
    BackendCapabilities, BackendResult, ErasureBackend, check_indices, input_chunk_len,
    split_stripe,
};
use crate::ErasureError;
use ecstripe_common::{ShardChunkMap, ShardSet};
use reed_solomon_simd::ReedSolomonDecoder;
use std::collections::BTreeMap;

/// MDS Reed-Solomon backend using reed-solomon-simd
///
/// This provides standard Maximum Distance Separable erasure coding.
/// Any k shards can reconstruct the original data.
pub struct RustSimdBackend {
    data_shards: u8,
    parity_shards: u8,
}

impl RustSimdBackend {
    /// Even chunk sizes only, up to 255 shards in total
    pub const CAPABILITIES: BackendCapabilities = BackendCapabilities {
        name: "rust_simd",
        supports_simd: true,
        chunk_alignment: 2,
        max_data_shards: 255,
        max_parity_shards: 255,
    };

    /// Create a new MDS backend
    pub fn new(data_shards: u8, parity_shards: u8) -> Result<Self, ErasureError> {
        if data_shards == 0 {
            return Err(ErasureError::InvalidConfig(
                "data_shards must be > 0".into(),
            ));
        }
        if parity_shards == 0 {
            return Err(ErasureError::InvalidConfig(
                "parity_shards must be > 0".into(),
            ));
        }
        if data_shards as usize + parity_shards as usize > 255 {
            return Err(ErasureError::InvalidConfig(
                "total shards must be <= 255".into(),
            ));
        }
        Ok(Self {
            data_shards,
            parity_shards,
        })
    }

    fn check_chunk_len(chunk_len: usize) -> BackendResult<()> {
        if chunk_len % 2 != 0 {
            return Err(ErasureError::InvalidConfig(format!(
                "chunk size {chunk_len} must be even for rust_simd"
            )));
        }
        Ok(())
    }

    /// Compute all m parity chunks for k data chunks
    fn parity(&self, originals: &[&[u8]]) -> BackendResult<Vec<Vec<u8>>> {
        Self::check_chunk_len(originals.first().map_or(0, |c| c.len()))?;
        reed_solomon_simd::encode(
            self.data_shards as usize,
            self.parity_shards as usize,
            originals,
        )
        .map_err(|e| ErasureError::EncodingFailed(e.to_string()))
    }

    /// Restore every missing data chunk from the available chunks
    fn restore_originals(
        &self,
        available: &ShardChunkMap,
        chunk_len: usize,
    ) -> BackendResult<BTreeMap<usize, Vec<u8>>> {
        let k = self.data_shards as usize;
        let m = self.parity_shards as usize;

        let missing: Vec<usize> = (0..k).filter(|i| !available.contains_key(i)).collect();
        let mut restored = BTreeMap::new();
        if missing.is_empty() {
            return Ok(restored);
        }

        let required = self.min_shards_for_decode();
        if available.len() < required {
            return Err(ErasureError::InsufficientShards {
                available: available.len(),
                required,
            });
        }
        Self::check_chunk_len(chunk_len)?;

        let mut decoder = ReedSolomonDecoder::new(k, m, chunk_len)
            .map_err(|e| ErasureError::InvalidConfig(e.to_string()))?;

        for (&index, data) in available {
            if index < k {
                decoder
                    .add_original_shard(index, data)
                    .map_err(|e| ErasureError::DecodingFailed(e.to_string()))?;
            } else {
                decoder
                    .add_recovery_shard(index - k, data)
                    .map_err(|e| ErasureError::DecodingFailed(e.to_string()))?;
            }
        }

        let result = decoder
            .decode()
            .map_err(|e| ErasureError::DecodingFailed(e.to_string()))?;

        for index in missing {
            let data = result.restored_original(index).ok_or_else(|| {
                ErasureError::DecodingFailed(format!("failed to restore data shard {index}"))
            })?;
            restored.insert(index, data.to_vec());
        }

        Ok(restored)
    }
}

impl ErasureBackend for RustSimdBackend {
    fn capabilities(&self) -> BackendCapabilities {
        Self::CAPABILITIES
    }

    fn data_shards(&self) -> usize {
        self.data_shards as usize
    }

    fn parity_shards(&self) -> usize {
        self.parity_shards as usize
    }

    fn encode(&self, want: &ShardSet, stripe: &[u8]) -> BackendResult<ShardChunkMap> {
        let k = self.data_shards as usize;
        check_indices(want, self.total_shards())?;
        let originals = split_stripe(stripe, k)?;

        // Parity is only computed when a parity shard is wanted
        let recovery = if want.iter().any(|&i| i >= k) {
            self.parity(&originals)?
        } else {
            Vec::new()
        };

        Ok(want
            .iter()
            .map(|&i| {
                let chunk = if i < k {
                    originals[i].to_vec()
                } else {
                    recovery[i - k].clone()
                };
                (i, chunk)
            })
            .collect())
    }

    fn decode(&self, need: &ShardSet, available: &ShardChunkMap) -> BackendResult<ShardChunkMap> {
        let k = self.data_shards as usize;
        check_indices(need, self.total_shards())?;
        check_indices(available.keys(), self.total_shards())?;
        let chunk_len = input_chunk_len(available)?;

        if need.iter().all(|i| available.contains_key(i)) {
            return Ok(need.iter().map(|&i| (i, available[&i].clone())).collect());
        }

        let restored = self.restore_originals(available, chunk_len)?;
        let originals: Vec<&[u8]> = (0..k)
            .map(|i| {
                available
                    .get(&i)
                    .or_else(|| restored.get(&i))
                    .map(Vec::as_slice)
                    .ok_or(ErasureError::MissingShard(i))
            })
            .collect::<BackendResult<_>>()?;

        let recovery = if need.iter().any(|&i| i >= k && !available.contains_key(&i)) {
            self.parity(&originals)?
        } else {
            Vec::new()
        };

        Ok(need
            .iter()
            .map(|&i| {
                let chunk = if let Some(data) = available.get(&i) {
                    data.clone()
                } else if i < k {
                    originals[i].to_vec()
                } else {
                    recovery[i - k].clone()
                };
                (i, chunk)
            })
            .collect())
    }
}
