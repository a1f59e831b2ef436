//! Stripe codec
//!
//! Converts logical byte ranges to and from per-shard chunk streams, one
//! stripe at a time. The working set of every call is a single stripe, so
//! peak memory does not grow with object size beyond the output buffers.
//!
//! ```
//! use ecstripe_common::{StripeLayout, shard_range};
//! use ecstripe_erasure::{StripeCodec, backend::{BackendConfig, BackendFactory}};
//!
//! let layout = StripeLayout::new(4, 3).unwrap();
//! let backend = BackendFactory::create(&BackendConfig::new(3, 2)).unwrap();
//! let codec = StripeCodec::new(layout, backend).unwrap();
//!
//! let data: Vec<u8> = (0..24).collect();
//! let shards = codec.encode(&data, &shard_range(3)).unwrap();
//! assert_eq!(codec.decode_concat(&shards).unwrap(), data);
//! ```

use crate::backend::{BackendConfig, BackendFactory, BackendType, ErasureBackend};
use ecstripe_common::{
    Config, Error as CommonError, Result, ShardChunkMap, ShardSet, StripeLayout, common_length,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors specific to erasure coding backends
#[derive(Debug, Error)]
pub enum ErasureError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("decoding failed: {0}")]
    DecodingFailed(String),

    #[error("insufficient shards: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    #[error("shard size mismatch")]
    ShardSizeMismatch,

    #[error("stripe of {length} bytes cannot be split across {data_shards} data shards")]
    InvalidStripe { length: usize, data_shards: usize },

    #[error("shard {index} out of range for {total} shards")]
    UnknownShard { index: usize, total: usize },

    #[error("backend did not produce shard {0}")]
    MissingShard(usize),
}

impl From<ErasureError> for CommonError {
    fn from(e: ErasureError) -> Self {
        match e {
            ErasureError::InsufficientShards {
                available,
                required,
            } => CommonError::InsufficientShards {
                available,
                required,
            },
            ErasureError::InvalidConfig(msg) => CommonError::Configuration(msg),
            // Caller bugs, not codec failures: never retried or redirected
            e @ (ErasureError::UnknownShard { .. }
            | ErasureError::ShardSizeMismatch
            | ErasureError::InvalidStripe { .. }) => CommonError::ContractViolation(e.to_string()),
            other => CommonError::ErasureCoding(other.to_string()),
        }
    }
}

/// Stripe-at-a-time transform over a pluggable erasure backend
///
/// Stateless apart from its immutable geometry and backend, so one codec
/// may serve concurrent readers.
pub struct StripeCodec {
    layout: StripeLayout,
    backend: Arc<dyn ErasureBackend>,
    stripe_width: usize,
    chunk_size: usize,
}

impl StripeCodec {
    /// Create a codec for `layout` driving `backend`
    ///
    /// The layout's data shard count must match the backend's.
    pub fn new(layout: StripeLayout, backend: Arc<dyn ErasureBackend>) -> Result<Self> {
        if layout.data_shard_count() != backend.data_shards() as u64 {
            return Err(CommonError::Configuration(format!(
                "layout has {} data shards, backend {} has {}",
                layout.data_shard_count(),
                backend.capabilities().name,
                backend.data_shards()
            )));
        }
        let alignment = backend.capabilities().chunk_alignment.max(1) as u64;
        if !layout.chunk_size().is_multiple_of(alignment) {
            return Err(CommonError::Configuration(format!(
                "chunk size {} must be a multiple of {alignment} for backend {}",
                layout.chunk_size(),
                backend.capabilities().name
            )));
        }
        let stripe_width = usize::try_from(layout.stripe_width())
            .map_err(|_| CommonError::Configuration("stripe width exceeds usize".into()))?;
        let chunk_size = usize::try_from(layout.chunk_size())
            .map_err(|_| CommonError::Configuration("chunk size exceeds usize".into()))?;

        Ok(Self {
            layout,
            backend,
            stripe_width,
            chunk_size,
        })
    }

    /// Build the layout and backend described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let layout = config.stripe_layout()?;
        let backend_type: BackendType = config.backend.kind.parse()?;
        let backend =
            BackendFactory::create(&BackendConfig::from(config.erasure()).with_backend(backend_type))?;
        Self::new(layout, backend)
    }

    /// Stripe geometry
    #[must_use]
    pub const fn layout(&self) -> &StripeLayout {
        &self.layout
    }

    /// Erasure backend in use
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn ErasureBackend> {
        &self.backend
    }

    /// Encode `input` into the shards listed in `want`
    ///
    /// `input.len()` must be a multiple of the stripe width. Each output
    /// buffer holds one chunk per stripe, in stripe order.
    pub fn encode(&self, input: &[u8], want: &ShardSet) -> Result<ShardChunkMap> {
        if !input.len().is_multiple_of(self.stripe_width) {
            warn!(
                length = input.len(),
                stripe_width = self.stripe_width,
                "refusing to encode unaligned buffer"
            );
            return Err(CommonError::Misaligned {
                length: input.len() as u64,
                alignment: self.stripe_width as u64,
            });
        }

        let mut out = ShardChunkMap::new();
        if input.is_empty() {
            return Ok(out);
        }

        let stripes = input.len() / self.stripe_width;
        let per_shard = stripes * self.chunk_size;
        for stripe in input.chunks_exact(self.stripe_width) {
            let encoded = self.backend.encode(want, stripe)?;
            for &shard in want {
                let chunk = encoded.get(&shard).ok_or_else(|| {
                    CommonError::contract(format!("backend did not return shard {shard}"))
                })?;
                if chunk.len() != self.chunk_size {
                    return Err(CommonError::contract(format!(
                        "backend returned {} bytes for shard {shard}, expected {}",
                        chunk.len(),
                        self.chunk_size
                    )));
                }
                out.entry(shard)
                    .or_insert_with(|| Vec::with_capacity(per_shard))
                    .extend_from_slice(chunk);
            }
        }

        for (shard, buf) in &out {
            let logical = self
                .layout
                .aligned_chunk_offset_to_logical_offset(buf.len() as u64)?;
            if logical != input.len() as u64 {
                return Err(CommonError::contract(format!(
                    "shard {shard} covers {logical} logical bytes, expected {}",
                    input.len()
                )));
            }
        }

        debug!(stripes, shards = out.len(), "encoded stripes");
        Ok(out)
    }

    /// Reconstruct the logical byte stream from the supplied shards
    pub fn decode_concat(&self, shards: &ShardChunkMap) -> Result<Vec<u8>> {
        let total = self.check_decode_input(shards)?;
        let mut out = Vec::with_capacity(total / self.chunk_size * self.stripe_width);

        for start in (0..total).step_by(self.chunk_size) {
            let chunks = self.slice_chunks(shards, start);
            let stripe = self.backend.decode_concat(&chunks)?;
            if stripe.len() != self.stripe_width {
                return Err(CommonError::contract(format!(
                    "backend reconstructed {} bytes, expected stripe of {}",
                    stripe.len(),
                    self.stripe_width
                )));
            }
            out.extend_from_slice(&stripe);
        }

        debug!(
            shards = shards.len(),
            bytes = out.len(),
            "decoded logical stream"
        );
        Ok(out)
    }

    /// Reconstruct only the shards listed in `want`
    ///
    /// Every returned buffer has the same length as the inputs.
    pub fn decode_selected(&self, shards: &ShardChunkMap, want: &ShardSet) -> Result<ShardChunkMap> {
        let total = self.check_decode_input(shards)?;
        let mut out: ShardChunkMap = want
            .iter()
            .map(|&shard| (shard, Vec::with_capacity(total)))
            .collect();

        for start in (0..total).step_by(self.chunk_size) {
            let chunks = self.slice_chunks(shards, start);
            let decoded = self.backend.decode(want, &chunks)?;
            for (shard, buf) in &mut out {
                let chunk = decoded.get(shard).ok_or_else(|| {
                    CommonError::contract(format!("backend did not rebuild shard {shard}"))
                })?;
                if chunk.len() != self.chunk_size {
                    return Err(CommonError::contract(format!(
                        "backend rebuilt {} bytes for shard {shard}, expected {}",
                        chunk.len(),
                        self.chunk_size
                    )));
                }
                buf.extend_from_slice(chunk);
            }
        }

        debug!(
            inputs = shards.len(),
            rebuilt = out.len(),
            bytes = total,
            "decoded selected shards"
        );
        Ok(out)
    }

    /// Validate decode inputs and return their common length
    fn check_decode_input(&self, shards: &ShardChunkMap) -> Result<usize> {
        let first = shards
            .values()
            .next()
            .ok_or_else(|| CommonError::invalid_input("no shards supplied"))?
            .len();
        if let Some(bad) = shards.values().find(|buf| buf.len() != first) {
            return Err(CommonError::SizeMismatch {
                expected: first as u64,
                actual: bad.len() as u64,
            });
        }
        debug_assert_eq!(common_length(shards), Some(first));
        if !first.is_multiple_of(self.chunk_size) {
            return Err(CommonError::SizeMismatch {
                expected: first.next_multiple_of(self.chunk_size) as u64,
                actual: first as u64,
            });
        }
        Ok(first)
    }

    fn slice_chunks(&self, shards: &ShardChunkMap, start: usize) -> ShardChunkMap {
        shards
            .iter()
            .map(|(&shard, buf)| (shard, buf[start..start + self.chunk_size].to_vec()))
            .collect()
    }
}
