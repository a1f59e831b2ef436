//! Stripelet CRC table and deferred CRC diffs
//!
//! A write computes a [`CrcDiff`] per shard off the critical path, collects
//! them into a [`CrcDiffBatch`] and commits the batch into the shard's
//! [`StripeletCrcTable`] with a single [`merge`](StripeletCrcTable::merge).
//! Only the table is persisted, under [`CINFO_KEY`](crate::CINFO_KEY).

use bytes::{BufMut, BytesMut};
use ecstripe_common::{Error, Result, ShardChunkMap, ShardIndex, compute_crc32c, stripelet_crcs};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::encoding::{decode_envelope, encode_envelope, put_u32_vec};
use crate::record::{CINFO_KEY, Record};

const STRUCT_V: u8 = 1;
const STRUCT_COMPAT: u8 = 1;

fn stripelet_len(stripelet_size: u64) -> Result<usize> {
    if stripelet_size == 0 {
        return Err(Error::invalid_argument("stripelet size must be non-zero"));
    }
    usize::try_from(stripelet_size)
        .map_err(|_| Error::invalid_argument("stripelet size exceeds address space"))
}

/// Stripelet CRCs of newly written shard bytes starting at `offset`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrcDiff {
    /// Byte offset into the shard where the diff begins
    pub offset: u64,
    /// One CRC per stripelet starting at `offset`
    pub stripelet_crcs: Vec<u32>,
}

impl CrcDiff {
    /// Number of stripelets covered
    #[must_use]
    pub fn len(&self) -> usize {
        self.stripelet_crcs.len()
    }

    /// Whether the diff covers no stripelets
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stripelet_crcs.is_empty()
    }
}

/// Ordered diffs waiting to be merged into a table
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrcDiffBatch {
    diffs: Vec<CrcDiff>,
}

impl CrcDiffBatch {
    /// Create an empty batch
    #[must_use]
    pub const fn new() -> Self {
        Self { diffs: Vec::new() }
    }

    /// Add a diff to the end of the batch
    pub fn push(&mut self, diff: CrcDiff) {
        self.diffs.push(diff);
    }

    /// Compute the diff for `shard` of a write and add it to the batch
    pub fn append_crc(
        &mut self,
        old_size: u64,
        shards: &ShardChunkMap,
        shard: ShardIndex,
        stripelet_size: u64,
    ) -> Result<()> {
        let data = shards
            .get(&shard)
            .ok_or_else(|| Error::contract(format!("shard {shard} missing from write")))?;
        self.push(StripeletCrcTable::compute_diff(old_size, data, stripelet_size)?);
        Ok(())
    }

    /// Diffs in merge order
    #[must_use]
    pub fn diffs(&self) -> &[CrcDiff] {
        &self.diffs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    /// Diagnostic report: diff index to offset and checksum list
    #[must_use]
    pub fn dump(&self) -> Value {
        let diffs: Vec<Value> = self
            .diffs
            .iter()
            .enumerate()
            .map(|(index, diff)| {
                json!({
                    "diff_index": index,
                    "offset": diff.offset,
                    "stripelet_crcs": diff.stripelet_crcs,
                })
            })
            .collect();
        json!({ "crc_diffs": diffs })
    }
}

impl FromIterator<CrcDiff> for CrcDiffBatch {
    fn from_iter<I: IntoIterator<Item = CrcDiff>>(iter: I) -> Self {
        Self {
            diffs: iter.into_iter().collect(),
        }
    }
}

/// Per-shard table of stripelet CRCs in offset order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StripeletCrcTable {
    total_shard_size: u64,
    shard_stripelet_crc: Vec<u32>,
}

impl StripeletCrcTable {
    /// Create an empty table
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_shard_size: 0,
            shard_stripelet_crc: Vec::new(),
        }
    }

    /// Bytes accounted for by merged diffs
    #[must_use]
    pub const fn total_shard_size(&self) -> u64 {
        self.total_shard_size
    }

    /// Stored CRCs, one per stripelet
    #[must_use]
    pub fn crcs(&self) -> &[u32] {
        &self.shard_stripelet_crc
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shard_stripelet_crc.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shard_stripelet_crc.is_empty()
    }

    /// Checksum `data` in independent stripelets, the last one over the remainder
    pub fn compute_diff(old_size: u64, data: &[u8], stripelet_size: u64) -> Result<CrcDiff> {
        let size = stripelet_len(stripelet_size)?;
        Ok(CrcDiff {
            offset: old_size,
            stripelet_crcs: stripelet_crcs(data, size),
        })
    }

    /// Stripelet index each diff starts at, validated against the table as it
    /// would grow while the batch is applied
    fn plan_merge(&self, batch: &CrcDiffBatch, stripelet_size: u64) -> Result<Vec<usize>> {
        let mut len = self.shard_stripelet_crc.len();
        let mut starts = Vec::with_capacity(batch.len());

        for (index, diff) in batch.diffs.iter().enumerate() {
            if len == 0 {
                starts.push(0);
                len = diff.len();
                continue;
            }
            let start = usize::try_from(diff.offset / stripelet_size).map_err(|_| {
                Error::contract(format!("diff {index} offset {} out of range", diff.offset))
            })?;
            if start > len {
                warn!(
                    diff = index,
                    start,
                    table_len = len,
                    "CRC diff leaves a gap in the table"
                );
                return Err(Error::contract(format!(
                    "diff {index} starts at stripelet {start} past table end {len}"
                )));
            }
            starts.push(start);
            len = len.max(start + diff.len());
        }
        Ok(starts)
    }

    /// Commit a batch of diffs in order
    ///
    /// An empty table takes the first diff verbatim. Later diffs overwrite the
    /// stripelets they cover and extend the table past its end. Every diff is
    /// checked before the table changes.
    pub fn merge(&mut self, batch: &CrcDiffBatch, stripelet_size: u64) -> Result<()> {
        stripelet_len(stripelet_size)?;
        if batch.is_empty() {
            return Err(Error::contract("merge of an empty CRC diff batch"));
        }
        let starts = self.plan_merge(batch, stripelet_size)?;

        for (diff, start) in batch.diffs.iter().zip(starts) {
            if self.shard_stripelet_crc.is_empty() {
                self.shard_stripelet_crc = diff.stripelet_crcs.clone();
            } else {
                let overlap = (self.shard_stripelet_crc.len() - start).min(diff.len());
                self.shard_stripelet_crc[start..start + overlap]
                    .copy_from_slice(&diff.stripelet_crcs[..overlap]);
                self.shard_stripelet_crc
                    .extend_from_slice(&diff.stripelet_crcs[overlap..]);
            }
            // Counts the full span of every diff, overwritten stripelets included.
            // total_shard_size over-reports after an overwrite.
            self.total_shard_size += diff.len() as u64 * stripelet_size;
        }

        debug!(
            diffs = batch.len(),
            stripelets = self.shard_stripelet_crc.len(),
            total_shard_size = self.total_shard_size,
            "merged CRC diffs"
        );
        Ok(())
    }

    /// Compare up to `count` stripelets of `data` from byte `offset` with the
    /// stored CRCs starting at `start_index`
    ///
    /// False on the first mismatch or when the table runs out. True only if at
    /// least one stripelet was compared.
    #[must_use]
    pub fn verify(
        &self,
        data: &[u8],
        offset: u64,
        stripelet_size: u64,
        start_index: usize,
        count: usize,
    ) -> bool {
        let Ok(size) = stripelet_len(stripelet_size) else {
            return false;
        };
        let Some(window) = usize::try_from(offset).ok().and_then(|o| data.get(o..)) else {
            return false;
        };

        let mut compared = 0usize;
        for (i, stripelet) in window.chunks(size).take(count).enumerate() {
            let expected = start_index
                .checked_add(i)
                .and_then(|index| self.shard_stripelet_crc.get(index));
            match expected {
                Some(&crc) if crc == compute_crc32c(stripelet) => compared += 1,
                _ => {
                    debug!(
                        stripelet = start_index.saturating_add(i),
                        "stripelet CRC mismatch"
                    );
                    return false;
                }
            }
        }
        compared > 0
    }
}

impl Record for StripeletCrcTable {
    const KEY: &'static str = CINFO_KEY;

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        encode_envelope(buf, STRUCT_V, STRUCT_COMPAT, |b| {
            b.put_u64_le(self.total_shard_size);
            put_u32_vec(b, &self.shard_stripelet_crc)
        })
    }

    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut envelope = decode_envelope(input, "cinfo", STRUCT_V)?;
        let total_shard_size = envelope.payload.read_u64("total_shard_size")?;
        let shard_stripelet_crc = envelope.payload.read_u32_vec("shard_stripelet_crc")?;
        Ok(Self {
            total_shard_size,
            shard_stripelet_crc,
        })
    }

    fn dump(&self) -> Value {
        let crcs: Vec<Value> = self
            .shard_stripelet_crc
            .iter()
            .enumerate()
            .map(|(index, hash)| json!({ "stripelet": index, "hash": hash }))
            .collect();
        json!({
            "total_shard_size": self.total_shard_size,
            "shard_stripelet_crc": crcs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    fn table_from(data: &[u8], stripelet_size: u64) -> StripeletCrcTable {
        let mut batch = CrcDiffBatch::new();
        batch.push(StripeletCrcTable::compute_diff(0, data, stripelet_size).unwrap());
        let mut table = StripeletCrcTable::new();
        table.merge(&batch, stripelet_size).unwrap();
        table
    }

    #[test]
    fn test_compute_diff() {
        let diff = StripeletCrcTable::compute_diff(40, b"abcdefghijk", 4).unwrap();
        assert_eq!(diff.offset, 40);
        assert_eq!(
            diff.stripelet_crcs,
            vec![
                compute_crc32c(b"abcd"),
                compute_crc32c(b"efgh"),
                compute_crc32c(b"ijk"),
            ]
        );
    }

    #[test]
    fn test_compute_diff_zero_size() {
        assert!(matches!(
            StripeletCrcTable::compute_diff(0, b"abc", 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_twenty_byte_scenario() {
        let data = random_bytes(20);
        let table = table_from(&data, 5);
        assert_eq!(table.len(), 4);
        assert_eq!(table.total_shard_size(), 20);

        let mut tampered = data.clone();
        tampered[12] ^= 0xff;
        assert_ne!(tampered[10..15], data[10..15]);
        assert!(!table.verify(&tampered, 10, 5, 2, 1));
        assert!(table.verify(&tampered, 0, 5, 0, 1));
        assert!(table.verify(&tampered, 15, 5, 3, 1));
        assert!(table.verify(&data, 0, 5, 0, 4));
    }

    #[test]
    fn test_verify_edge_cases() {
        let data = random_bytes(20);
        let table = table_from(&data, 5);

        assert!(!table.verify(&data, 0, 5, 0, 0));
        assert!(!table.verify(&data, 20, 5, 4, 1));
        assert!(!table.verify(&data, 0, 0, 0, 1));
        // Table shorter than the requested window
        assert!(!table.verify(&data, 0, 5, 2, 4));
        // count larger than the data holds stops at the end of the buffer
        assert!(table.verify(&data, 10, 5, 2, 10));
    }

    #[test]
    fn test_verify_is_idempotent() {
        let data = random_bytes(20);
        let table = table_from(&data, 5);
        let before = table.clone();

        assert!(table.verify(&data, 0, 5, 0, 4));
        assert!(table.verify(&data, 0, 5, 0, 4));
        assert_eq!(table, before);

        let mut corrupted = data.clone();
        corrupted[12] ^= 0x40;
        assert!(!table.verify(&corrupted, 0, 5, 0, 4));
        assert!(!table.verify(&corrupted, 0, 5, 0, 4));
        assert_eq!(table, before);
    }

    #[test]
    fn test_verify_single_byte_corruption() {
        let data = random_bytes(64);
        let table = table_from(&data, 8);

        for byte in [0, 7, 8, 33, 63] {
            let mut corrupted = data.clone();
            corrupted[byte] ^= 0x10;
            let stripelet = byte / 8;
            let offset = (stripelet * 8) as u64;
            assert!(!table.verify(&corrupted, offset, 8, stripelet, 1));
            assert!(!table.verify(&corrupted, 0, 8, 0, 8));
        }

        let mut corrupted = data.clone();
        corrupted[40] ^= 0x01;
        assert!(table.verify(&corrupted, 0, 8, 0, 5));
        assert!(table.verify(&corrupted, 48, 8, 6, 2));
    }

    #[test]
    fn test_merge_composition() {
        let data = random_bytes(40);

        let mut halves = CrcDiffBatch::new();
        halves.push(StripeletCrcTable::compute_diff(0, &data[..20], 5).unwrap());
        halves.push(StripeletCrcTable::compute_diff(20, &data[20..], 5).unwrap());
        let mut split = StripeletCrcTable::new();
        split.merge(&halves, 5).unwrap();

        let whole = table_from(&data, 5);
        assert_eq!(split.crcs(), whole.crcs());
        assert_eq!(split.total_shard_size(), whole.total_shard_size());
    }

    #[test]
    fn test_merge_separate_batches() {
        let data = random_bytes(30);
        let mut table = table_from(&data[..15], 5);

        let mut batch = CrcDiffBatch::new();
        batch.push(StripeletCrcTable::compute_diff(15, &data[15..], 5).unwrap());
        table.merge(&batch, 5).unwrap();

        assert_eq!(table.len(), 6);
        assert!(table.verify(&data, 0, 5, 0, 6));
    }

    #[test]
    fn test_merge_overwrite_counts_size_again() {
        let data = random_bytes(20);
        let mut table = table_from(&data, 5);

        let mut rewrite = data.clone();
        rewrite[5..10].copy_from_slice(&[7u8; 5]);
        let mut batch = CrcDiffBatch::new();
        batch.push(StripeletCrcTable::compute_diff(5, &rewrite[5..10], 5).unwrap());
        table.merge(&batch, 5).unwrap();

        assert_eq!(table.len(), 4);
        assert!(table.verify(&rewrite, 0, 5, 0, 4));
        assert!(!table.verify(&data, 5, 5, 1, 1));
        assert_eq!(table.total_shard_size(), 25);
    }

    #[test]
    fn test_merge_overwrite_and_extend() {
        let data = random_bytes(15);
        let mut table = table_from(&data, 5);

        let tail = random_bytes(15);
        let mut batch = CrcDiffBatch::new();
        batch.push(StripeletCrcTable::compute_diff(10, &tail, 5).unwrap());
        table.merge(&batch, 5).unwrap();

        let mut expected = data[..10].to_vec();
        expected.extend_from_slice(&tail);
        assert_eq!(table.len(), 5);
        assert!(table.verify(&expected, 0, 5, 0, 5));
    }

    #[test]
    fn test_merge_empty_batch() {
        let mut table = StripeletCrcTable::new();
        let err = table.merge(&CrcDiffBatch::new(), 5).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_merge_zero_stripelet_size() {
        let mut table = StripeletCrcTable::new();
        let batch: CrcDiffBatch = [CrcDiff::default()].into_iter().collect();
        assert!(matches!(
            table.merge(&batch, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_merge_gap_is_rejected_atomically() {
        let data = random_bytes(10);
        let mut table = table_from(&data, 5);
        let before = table.clone();

        let mut batch = CrcDiffBatch::new();
        batch.push(StripeletCrcTable::compute_diff(10, &random_bytes(5), 5).unwrap());
        batch.push(StripeletCrcTable::compute_diff(40, &random_bytes(5), 5).unwrap());
        assert!(matches!(
            table.merge(&batch, 5),
            Err(Error::ContractViolation(_))
        ));
        assert_eq!(table, before);
    }

    #[test]
    fn test_append_crc() {
        let mut shards = ShardChunkMap::new();
        shards.insert(0, b"0123456789".to_vec());
        shards.insert(2, b"abcdefghij".to_vec());

        let mut batch = CrcDiffBatch::new();
        batch.append_crc(30, &shards, 2, 5).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.diffs()[0].offset, 30);
        assert_eq!(batch.diffs()[0].stripelet_crcs[1], compute_crc32c(b"fghij"));

        assert!(matches!(
            batch.append_crc(30, &shards, 1, 5),
            Err(Error::ContractViolation(_))
        ));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_record_round_trip() {
        let table = table_from(&random_bytes(33), 4);
        let bytes = table.to_bytes().unwrap();
        assert_eq!(&bytes[..2], &[STRUCT_V, STRUCT_COMPAT]);
        assert_eq!(StripeletCrcTable::from_bytes(&bytes).unwrap(), table);
    }

    #[test]
    fn test_decode_rejects_newer_compat() {
        let mut buf = BytesMut::new();
        encode_envelope(&mut buf, 2, 2, |b| {
            b.put_u64_le(0);
            put_u32_vec(b, &[])
        })
        .unwrap();
        let err = StripeletCrcTable::from_bytes(&buf).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedVersion {
                record: "cinfo",
                compat: 2,
                supported: 1
            }
        ));
    }

    #[test]
    fn test_decode_corrupt_count() {
        let mut buf = BytesMut::new();
        encode_envelope(&mut buf, 1, 1, |b| {
            b.put_u64_le(8);
            b.put_u32_le(1000);
            b.put_u32_le(1);
            Ok(())
        })
        .unwrap();
        assert!(StripeletCrcTable::from_bytes(&buf).unwrap_err().is_malformed_metadata());
    }

    #[test]
    fn test_dump() {
        let table = table_from(b"abcdefgh", 4);
        let dump = table.dump();
        assert_eq!(dump["total_shard_size"], 8);
        assert_eq!(dump["shard_stripelet_crc"][1]["stripelet"], 1);
        assert_eq!(dump["shard_stripelet_crc"][1]["hash"], compute_crc32c(b"efgh"));

        let mut batch = CrcDiffBatch::new();
        batch.push(StripeletCrcTable::compute_diff(8, b"ijkl", 4).unwrap());
        let dump = batch.dump();
        assert_eq!(dump["crc_diffs"][0]["diff_index"], 0);
        assert_eq!(dump["crc_diffs"][0]["offset"], 8);
        assert_eq!(dump["crc_diffs"][0]["stripelet_crcs"][0], compute_crc32c(b"ijkl"));
    }
}
