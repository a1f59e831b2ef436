//! ecstripe Erasure Coding - stripe codec over pluggable erasure backends
//!
//! This crate provides:
//! - the `ErasureBackend` capability: per-stripe encode, selective decode and
//!   decode-and-concatenate
//! - backends implementing it (ISA-L for x86, rust-simd for portable)
//! - `StripeCodec`, which drives a backend across whole shard streams one
//!   stripe at a time
//!
//! # Backends
//!
//! - **rust_simd** (default): Pure Rust using `reed-solomon-simd`, portable
//! - **isal** (feature-gated): Intel ISA-L via FFI, x86/x86_64 only
//!
//! # Example
//!
//! ```
//! use ecstripe_common::{StripeLayout, shard_range};
//! use ecstripe_erasure::{StripeCodec, backend::{BackendConfig, BackendFactory}};
//!
//! let backend = BackendFactory::create(&BackendConfig::new(4, 2)).unwrap();
//! let codec = StripeCodec::new(StripeLayout::new(1024, 4).unwrap(), backend).unwrap();
//!
//! let object = vec![7u8; 4096 * 3];
//! let shards = codec.encode(&object, &shard_range(6)).unwrap();
//! assert_eq!(shards[&0].len(), 1024 * 3);
//! ```

pub mod backend;
pub mod codec;

// Re-exports from codec
pub use codec::{ErasureError, StripeCodec};

// Re-exports from backend for convenience
pub use backend::{
    BackendCapabilities, BackendConfig, BackendFactory, BackendType, ErasureBackend,
    RustSimdBackend,
};

