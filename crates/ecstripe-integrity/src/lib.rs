//! ecstripe integrity - shard hash and stripelet CRC bookkeeping
//!
//! Two persisted records describe the integrity of an erasure-coded object:
//!
//! - [`HashInfo`] (under [`HINFO_KEY`]): a running CRC-32C per shard chained
//!   across appends, plus per-shard stripelet CRCs of the latest write
//! - [`StripeletCrcTable`] (under [`CINFO_KEY`]): per-shard stripelet CRCs
//!   maintained incrementally by merging a [`CrcDiffBatch`]
//!
//! # Example
//!
//! ```
//! use ecstripe_integrity::{CrcDiffBatch, Record, StripeletCrcTable};
//!
//! let data = vec![7u8; 20];
//! let mut batch = CrcDiffBatch::new();
//! batch.push(StripeletCrcTable::compute_diff(0, &data, 5).unwrap());
//!
//! let mut table = StripeletCrcTable::new();
//! table.merge(&batch, 5).unwrap();
//! assert!(table.verify(&data, 0, 5, 0, 4));
//!
//! let restored = StripeletCrcTable::from_bytes(&table.to_bytes().unwrap()).unwrap();
//! assert_eq!(restored, table);
//! ```

pub mod crc_info;
pub mod encoding;
pub mod hash_info;
pub mod record;

pub use crc_info::{CrcDiff, CrcDiffBatch, StripeletCrcTable};
pub use hash_info::HashInfo;
pub use record::{CINFO_KEY, HINFO_KEY, Record, is_cinfo_key, is_hinfo_key};
