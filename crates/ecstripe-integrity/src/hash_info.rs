//! Per-object shard hash record
//!
//! `HashInfo` keeps one running CRC-32C per shard, chained across appends, and
//! optionally a per-shard list of stripelet CRCs covering that shard's latest
//! write. It is persisted under [`HINFO_KEY`](crate::HINFO_KEY).

use std::collections::BTreeMap;

use bytes::{BufMut, BytesMut};
use ecstripe_common::{
    CRC32C_SEED, Crc32cState, Error, Result, ShardChunkMap, ShardIndex, common_length,
    compute_crc32c, stripelet_crcs,
};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::encoding::{decode_envelope, encode_envelope, encoded_len, put_u32_vec};
use crate::record::{HINFO_KEY, Record};

const STRUCT_V: u8 = 2;
const STRUCT_COMPAT: u8 = 1;

/// Running shard hashes plus per-shard stripelet CRCs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashInfo {
    total_chunk_size: u64,
    cumulative_shard_hashes: Vec<u32>,
    shard_stripelet_crcs: BTreeMap<ShardIndex, Vec<u32>>,
}

impl HashInfo {
    /// Create an empty record for `shard_count` shards
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        Self {
            total_chunk_size: 0,
            cumulative_shard_hashes: vec![CRC32C_SEED; shard_count],
            shard_stripelet_crcs: BTreeMap::new(),
        }
    }

    /// Bytes appended to every shard so far
    #[must_use]
    pub const fn total_chunk_size(&self) -> u64 {
        self.total_chunk_size
    }

    /// Number of shards tracked
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.cumulative_shard_hashes.len()
    }

    /// Running hash of every shard, indexed by shard
    #[must_use]
    pub fn cumulative_shard_hashes(&self) -> &[u32] {
        &self.cumulative_shard_hashes
    }

    /// Running hash of one shard
    #[must_use]
    pub fn shard_hash(&self, shard: ShardIndex) -> Option<u32> {
        self.cumulative_shard_hashes.get(shard).copied()
    }

    /// Stored stripelet CRCs of one shard
    #[must_use]
    pub fn stripelet_crcs(&self, shard: ShardIndex) -> Option<&[u32]> {
        self.shard_stripelet_crcs.get(&shard).map(Vec::as_slice)
    }

    /// Whether any shard carries stripelet CRCs
    #[must_use]
    pub fn has_stripelet_crcs(&self) -> bool {
        !self.shard_stripelet_crcs.is_empty()
    }

    /// Stripelet size for a layout: `(stripe_width / k) / k`
    pub fn stripelet_size(stripe_width: u64, data_shard_count: u64) -> Result<u64> {
        if data_shard_count == 0 {
            return Err(Error::invalid_argument("data shard count must be non-zero"));
        }
        let size = stripe_width / data_shard_count / data_shard_count;
        if size == 0 {
            return Err(Error::invalid_argument(format!(
                "stripe width {stripe_width} with {data_shard_count} data shards gives a zero stripelet size"
            )));
        }
        Ok(size)
    }

    /// Check an append against the current state, returning the appended length
    fn check_append(&self, old_size: u64, shards: &ShardChunkMap) -> Result<usize> {
        if old_size != self.total_chunk_size {
            warn!(
                old_size,
                total_chunk_size = self.total_chunk_size,
                "hash append out of order"
            );
            return Err(Error::contract(format!(
                "append at {old_size} but {} bytes already hashed",
                self.total_chunk_size
            )));
        }
        if shards.len() != self.shard_count() {
            return Err(Error::contract(format!(
                "append covers {} shards, record tracks {}",
                shards.len(),
                self.shard_count()
            )));
        }
        if let Some(&shard) = shards.keys().find(|&&s| s >= self.shard_count()) {
            return Err(Error::contract(format!(
                "shard {shard} out of range for {} shards",
                self.shard_count()
            )));
        }
        common_length(shards)
            .ok_or_else(|| Error::contract("appended shard buffers differ in length"))
    }

    /// Chain each shard's new bytes onto its running hash
    ///
    /// `old_size` must equal [`total_chunk_size`](Self::total_chunk_size) and
    /// `shards` must hold one equally sized buffer per tracked shard. Nothing
    /// is changed on failure.
    pub fn append(&mut self, old_size: u64, shards: &ShardChunkMap) -> Result<()> {
        let len = self.check_append(old_size, shards)?;
        self.apply_append(shards, len);
        Ok(())
    }

    fn apply_append(&mut self, shards: &ShardChunkMap, len: usize) {
        for (&shard, data) in shards {
            let hash = &mut self.cumulative_shard_hashes[shard];
            let mut state = Crc32cState::with_seed(*hash);
            state.update(data);
            *hash = state.value();
        }
        self.total_chunk_size += len as u64;
        debug!(
            appended = len,
            total_chunk_size = self.total_chunk_size,
            "appended shard hashes"
        );
    }

    /// Append and replace each shard's stripelet CRCs with those of `shards`
    pub fn append_with_stripelets(
        &mut self,
        old_size: u64,
        shards: &ShardChunkMap,
        stripe_width: u64,
        data_shard_count: u64,
    ) -> Result<()> {
        let len = self.check_append(old_size, shards)?;
        let stripelet_size = usize::try_from(Self::stripelet_size(stripe_width, data_shard_count)?)
            .map_err(|_| Error::invalid_argument("stripelet size exceeds address space"))?;

        self.apply_append(shards, len);
        for (&shard, data) in shards {
            self.shard_stripelet_crcs
                .insert(shard, stripelet_crcs(data, stripelet_size));
        }
        Ok(())
    }

    /// Recompute every stripelet of `data` and compare with the stored list
    ///
    /// Returns false on the first mismatch, when the shard has no stored list,
    /// when the list is too short, or when there is nothing to compare.
    #[must_use]
    pub fn verify_stripelet_crc(&self, shard: ShardIndex, data: &[u8], stripelet_size: u64) -> bool {
        let Some(stored) = self.shard_stripelet_crcs.get(&shard) else {
            return false;
        };
        let Ok(size) = usize::try_from(stripelet_size) else {
            return false;
        };
        if size == 0 || data.is_empty() {
            return false;
        }

        for (index, stripelet) in data.chunks(size).enumerate() {
            match stored.get(index) {
                Some(&crc) if crc == compute_crc32c(stripelet) => {}
                _ => {
                    debug!(shard, stripelet = index, "stripelet CRC mismatch");
                    return false;
                }
            }
        }
        true
    }
}

impl Record for HashInfo {
    const KEY: &'static str = HINFO_KEY;

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        encode_envelope(buf, STRUCT_V, STRUCT_COMPAT, |b| {
            b.put_u64_le(self.total_chunk_size);
            put_u32_vec(b, &self.cumulative_shard_hashes)?;
            b.put_u32_le(encoded_len(self.shard_stripelet_crcs.len(), "stripelet map")?);
            for (&shard, crcs) in &self.shard_stripelet_crcs {
                b.put_u32_le(encoded_len(shard, "shard index")?);
                put_u32_vec(b, crcs)?;
            }
            Ok(())
        })
    }

    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut envelope = decode_envelope(input, "hinfo", STRUCT_V)?;
        let payload = &mut envelope.payload;

        let total_chunk_size = payload.read_u64("total_chunk_size")?;
        let cumulative_shard_hashes = payload.read_u32_vec("cumulative_shard_hashes")?;

        let mut shard_stripelet_crcs = BTreeMap::new();
        if envelope.struct_v >= 2 {
            let count = payload.read_u32("shard_stripelet_crcs")?;
            for _ in 0..count {
                let shard = payload.read_u32("shard index")? as ShardIndex;
                let crcs = payload.read_u32_vec("stripelet_crcs")?;
                shard_stripelet_crcs.insert(shard, crcs);
            }
        }

        Ok(Self {
            total_chunk_size,
            cumulative_shard_hashes,
            shard_stripelet_crcs,
        })
    }

    fn dump(&self) -> Value {
        let hashes: Vec<Value> = self
            .cumulative_shard_hashes
            .iter()
            .enumerate()
            .map(|(shard, hash)| json!({ "shard": shard, "hash": hash }))
            .collect();

        let stripelets: Vec<Value> = self
            .shard_stripelet_crcs
            .iter()
            .map(|(shard, crcs)| {
                let entries: Vec<Value> = crcs
                    .iter()
                    .enumerate()
                    .map(|(index, hash)| json!({ "stripelet": index, "hash": hash }))
                    .collect();
                json!({ "shard": shard, "stripelet_crcs": entries })
            })
            .collect();

        json!({
            "total_chunk_size": self.total_chunk_size,
            "cumulative_shard_hashes": hashes,
            "shard_stripelet_crcs": stripelets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn shard_map(shards: &[&[u8]]) -> ShardChunkMap {
        shards
            .iter()
            .enumerate()
            .map(|(i, data)| (i, data.to_vec()))
            .collect()
    }

    fn random_shards(count: usize, len: usize) -> ShardChunkMap {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|i| {
                let mut data = vec![0u8; len];
                rng.fill_bytes(&mut data);
                (i, data)
            })
            .collect()
    }

    #[test]
    fn test_new() {
        let hinfo = HashInfo::new(3);
        assert_eq!(hinfo.total_chunk_size(), 0);
        assert_eq!(hinfo.cumulative_shard_hashes(), &[CRC32C_SEED; 3]);
        assert!(!hinfo.has_stripelet_crcs());
        assert_eq!(hinfo.shard_hash(3), None);
    }

    #[test]
    fn test_append() {
        let mut hinfo = HashInfo::new(2);
        hinfo.append(0, &shard_map(&[b"abcd", b"efgh"])).unwrap();

        assert_eq!(hinfo.total_chunk_size(), 4);
        assert_eq!(hinfo.shard_hash(0), Some(compute_crc32c(b"abcd")));
        assert_eq!(hinfo.shard_hash(1), Some(compute_crc32c(b"efgh")));
    }

    #[test]
    fn test_monotonic_append() {
        let whole = random_shards(4, 64);
        let first: ShardChunkMap = whole.iter().map(|(&s, d)| (s, d[..24].to_vec())).collect();
        let second: ShardChunkMap = whole.iter().map(|(&s, d)| (s, d[24..].to_vec())).collect();

        let mut split = HashInfo::new(4);
        split.append(0, &first).unwrap();
        split.append(24, &second).unwrap();

        let mut single = HashInfo::new(4);
        single.append(0, &whole).unwrap();

        assert_eq!(split.cumulative_shard_hashes(), single.cumulative_shard_hashes());
        assert_eq!(split.total_chunk_size(), 64);
    }

    #[test]
    fn test_append_wrong_old_size() {
        let mut hinfo = HashInfo::new(2);
        let shards = shard_map(&[b"ab", b"cd"]);
        hinfo.append(0, &shards).unwrap();

        let before = hinfo.clone();
        let err = hinfo.append(0, &shards).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(hinfo, before);
    }

    #[test]
    fn test_append_shard_count_mismatch() {
        let mut hinfo = HashInfo::new(3);
        let err = hinfo.append(0, &shard_map(&[b"ab", b"cd"])).unwrap_err();
        assert!(matches!(err, Error::ContractViolation(_)));
        assert_eq!(hinfo.total_chunk_size(), 0);
    }

    #[test]
    fn test_append_length_mismatch() {
        let mut hinfo = HashInfo::new(2);
        assert!(hinfo.append(0, &shard_map(&[b"abc", b"cd"])).is_err());
        assert_eq!(hinfo.cumulative_shard_hashes(), &[CRC32C_SEED; 2]);
    }

    #[test]
    fn test_append_shard_out_of_range() {
        let mut hinfo = HashInfo::new(2);
        let mut shards = ShardChunkMap::new();
        shards.insert(0, b"ab".to_vec());
        shards.insert(5, b"cd".to_vec());
        assert!(matches!(
            hinfo.append(0, &shards),
            Err(Error::ContractViolation(_))
        ));
    }

    #[test]
    fn test_stripelet_size() {
        assert_eq!(HashInfo::stripelet_size(12, 3).unwrap(), 1);
        assert_eq!(HashInfo::stripelet_size(16384, 4).unwrap(), 1024);
        assert!(HashInfo::stripelet_size(12, 0).is_err());
        assert!(matches!(
            HashInfo::stripelet_size(4, 4),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_append_with_stripelets() {
        // stripe width 100 over 2 data shards gives 25-byte stripelets
        let mut hinfo = HashInfo::new(3);
        let shards = random_shards(3, 60);
        hinfo.append_with_stripelets(0, &shards, 100, 2).unwrap();

        assert_eq!(hinfo.total_chunk_size(), 60);
        for (&shard, data) in &shards {
            let crcs = hinfo.stripelet_crcs(shard).unwrap();
            assert_eq!(crcs.len(), 3);
            assert_eq!(crcs[2], compute_crc32c(&data[50..]));
            assert!(hinfo.verify_stripelet_crc(shard, data, 25));
        }
    }

    #[test]
    fn test_append_with_stripelets_replaces_list() {
        let mut hinfo = HashInfo::new(2);
        let first = random_shards(2, 40);
        let second = random_shards(2, 20);
        hinfo.append_with_stripelets(0, &first, 40, 2).unwrap();
        hinfo.append_with_stripelets(40, &second, 40, 2).unwrap();

        assert_eq!(hinfo.total_chunk_size(), 60);
        assert_eq!(hinfo.stripelet_crcs(0).unwrap().len(), 2);
        assert!(hinfo.verify_stripelet_crc(1, &second[&1], 10));
        assert!(!hinfo.verify_stripelet_crc(1, &first[&1], 10));
    }

    #[test]
    fn test_append_with_stripelets_validates_first() {
        let mut hinfo = HashInfo::new(2);
        let shards = random_shards(2, 8);
        assert!(hinfo.append_with_stripelets(0, &shards, 2, 2).is_err());
        assert_eq!(hinfo, HashInfo::new(2));
    }

    #[test]
    fn test_verify_stripelet_crc_corruption() {
        let mut hinfo = HashInfo::new(2);
        let shards = random_shards(2, 20);
        hinfo.append_with_stripelets(0, &shards, 20, 2).unwrap();

        let mut corrupted = shards[&0].clone();
        corrupted[13] ^= 0x01;
        assert!(hinfo.verify_stripelet_crc(0, &shards[&0], 5));
        assert!(!hinfo.verify_stripelet_crc(0, &corrupted, 5));
        // Bytes beyond the corruption still verify on their own
        assert!(hinfo.verify_stripelet_crc(0, &corrupted[..10], 5));
    }

    #[test]
    fn test_verify_stripelet_crc_missing() {
        let mut hinfo = HashInfo::new(2);
        let shards = random_shards(2, 20);
        hinfo.append_with_stripelets(0, &shards, 20, 2).unwrap();

        assert!(!hinfo.verify_stripelet_crc(7, &shards[&0], 5));
        assert!(!hinfo.verify_stripelet_crc(0, &[], 5));
        assert!(!hinfo.verify_stripelet_crc(0, &shards[&0], 0));

        // Longer than the stored list
        let mut longer = shards[&0].clone();
        longer.extend_from_slice(&[0u8; 5]);
        assert!(!hinfo.verify_stripelet_crc(0, &longer, 5));
    }

    #[test]
    fn test_verify_is_idempotent() {
        let mut hinfo = HashInfo::new(1);
        let shards = random_shards(1, 32);
        hinfo.append_with_stripelets(0, &shards, 32, 2).unwrap();
        let before = hinfo.clone();
        assert!(hinfo.verify_stripelet_crc(0, &shards[&0], 8));
        assert!(hinfo.verify_stripelet_crc(0, &shards[&0], 8));
        assert_eq!(hinfo, before);
    }

    #[test]
    fn test_record_round_trip() {
        let mut hinfo = HashInfo::new(3);
        hinfo
            .append_with_stripelets(0, &random_shards(3, 30), 30, 3)
            .unwrap();

        let bytes = hinfo.to_bytes().unwrap();
        assert_eq!(bytes[0], STRUCT_V);
        assert_eq!(bytes[1], STRUCT_COMPAT);
        assert_eq!(HashInfo::from_bytes(&bytes).unwrap(), hinfo);
    }

    #[test]
    fn test_decode_v1() {
        let mut buf = BytesMut::new();
        encode_envelope(&mut buf, 1, 1, |b| {
            b.put_u64_le(8);
            put_u32_vec(b, &[1, 2])
        })
        .unwrap();

        let hinfo = HashInfo::from_bytes(&buf).unwrap();
        assert_eq!(hinfo.total_chunk_size(), 8);
        assert_eq!(hinfo.cumulative_shard_hashes(), &[1, 2]);
        assert!(!hinfo.has_stripelet_crcs());
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        let mut buf = BytesMut::new();
        encode_envelope(&mut buf, 3, 1, |b| {
            b.put_u64_le(4);
            put_u32_vec(b, &[9]);
            b.put_u32_le(0);
            b.put_u64_le(0xdead_beef);
            Ok(())
        })
        .unwrap();

        let hinfo = HashInfo::from_bytes(&buf).unwrap();
        assert_eq!(hinfo.total_chunk_size(), 4);
        assert_eq!(hinfo.shard_hash(0), Some(9));
    }

    #[test]
    fn test_decode_rejects_newer_compat() {
        let mut buf = BytesMut::new();
        encode_envelope(&mut buf, 3, 3, |b| {
            b.put_u64_le(0);
            Ok(())
        })
        .unwrap();
        let err = HashInfo::from_bytes(&buf).unwrap_err();
        assert!(err.is_malformed_metadata());
        assert!(matches!(err, Error::UnsupportedVersion { compat: 3, .. }));
    }

    #[test]
    fn test_decode_truncated() {
        let mut hinfo = HashInfo::new(2);
        hinfo.append(0, &shard_map(&[b"ab", b"cd"])).unwrap();
        let bytes = hinfo.to_bytes().unwrap();

        assert!(HashInfo::from_bytes(&bytes[..bytes.len() - 2]).is_err());
        let mut trailing = bytes.to_vec();
        trailing.push(0);
        assert!(HashInfo::from_bytes(&trailing).is_err());
    }

    #[test]
    fn test_dump() {
        let mut hinfo = HashInfo::new(2);
        hinfo
            .append_with_stripelets(0, &shard_map(&[b"abcdefgh", b"ijklmnop"]), 16, 2)
            .unwrap();

        let dump = hinfo.dump();
        assert_eq!(dump["total_chunk_size"], 8);
        assert_eq!(dump["cumulative_shard_hashes"][1]["shard"], 1);
        assert_eq!(
            dump["cumulative_shard_hashes"][0]["hash"],
            compute_crc32c(b"abcdefgh")
        );
        assert_eq!(dump["shard_stripelet_crcs"][0]["stripelet_crcs"][1]["stripelet"], 1);
        assert_eq!(
            dump["shard_stripelet_crcs"][1]["stripelet_crcs"][0]["hash"],
            compute_crc32c(b"ijkl")
        );
    }
}
