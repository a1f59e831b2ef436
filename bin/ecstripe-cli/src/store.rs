//! Shard directory layout
//!
//! An encoded object is a directory holding:
//!
//! - `shard_<i>.bin`: the chunks of shard `i`, in stripe order
//! - `hinfo_key`: the encoded [`HashInfo`] of the object
//! - `cinfo_key.<i>`: the encoded [`StripeletCrcTable`] of shard `i`
//! - `manifest.json`: geometry and logical size needed to read it back

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ecstripe_common::config::{BackendSection, IntegrityConfig, LayoutConfig};
use ecstripe_common::{Config, Crc32cState, ShardChunkMap, ShardIndex, shard_range};
use ecstripe_erasure::StripeCodec;
use ecstripe_integrity::{
    CINFO_KEY, CrcDiffBatch, HINFO_KEY, HashInfo, Record, StripeletCrcTable,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.json";

/// Geometry and size of an encoded object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Logical object size before stripe padding
    pub object_size: u64,
    /// Layout the object was encoded with
    pub layout: LayoutConfig,
    /// Erasure backend kind
    pub backend: String,
    /// Stripelet size of the per-shard CRC tables
    pub stripelet_size: u64,
}

impl Manifest {
    fn config(&self) -> Config {
        Config {
            layout: self.layout.clone(),
            integrity: IntegrityConfig {
                stripelet_size: Some(self.stripelet_size),
            },
            backend: BackendSection {
                kind: self.backend.clone(),
            },
            ..Config::default()
        }
    }

    fn total_shards(&self) -> usize {
        self.layout.data_shards as usize + self.layout.parity_shards as usize
    }

    fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let manifest: Self =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        if manifest.stripelet_size == 0 {
            bail!("{} has a zero stripelet size", path.display());
        }
        Ok(manifest)
    }
}

/// Integrity state of one shard file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardReport {
    pub shard: ShardIndex,
    pub present: bool,
    pub hash_ok: bool,
    pub stripelets_ok: bool,
}

impl ShardReport {
    pub const fn intact(&self) -> bool {
        self.present && self.hash_ok && self.stripelets_ok
    }
}

pub fn shard_path(dir: &Path, shard: ShardIndex) -> PathBuf {
    dir.join(format!("shard_{shard}.bin"))
}

pub fn cinfo_path(dir: &Path, shard: ShardIndex) -> PathBuf {
    dir.join(format!("{CINFO_KEY}.{shard}"))
}

/// Stripe-encode `input` into `dir` along with its integrity records
pub fn encode_object(config: &Config, input: &[u8], dir: &Path) -> Result<Manifest> {
    let codec = StripeCodec::from_config(config)?;
    let layout = codec.layout();
    let stripe_width = layout.stripe_width();
    let stripelet_size = config.stripelet_size()?;

    let mut padded = input.to_vec();
    let padded_len = layout.logical_to_next_stripe_offset(input.len() as u64);
    padded.resize(usize::try_from(padded_len)?, 0);

    let total_shards = codec.backend().total_shards();
    let mut shards = codec.encode(&padded, &shard_range(total_shards))?;
    // An empty object still gets one (empty) file per shard
    for shard in 0..total_shards {
        shards.entry(shard).or_default();
    }

    let mut hinfo = HashInfo::new(total_shards);
    hinfo.append_with_stripelets(0, &shards, stripe_width, layout.data_shard_count())?;

    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for (&shard, data) in &shards {
        fs::write(shard_path(dir, shard), data)?;

        let mut batch = CrcDiffBatch::new();
        batch.append_crc(0, &shards, shard, stripelet_size)?;
        let mut table = StripeletCrcTable::new();
        table.merge(&batch, stripelet_size)?;
        fs::write(cinfo_path(dir, shard), table.to_bytes()?)?;
    }
    fs::write(dir.join(HINFO_KEY), hinfo.to_bytes()?)?;

    let manifest = Manifest {
        object_size: input.len() as u64,
        layout: config.layout.clone(),
        backend: config.backend.kind.clone(),
        stripelet_size,
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

    info!(
        object_size = manifest.object_size,
        shards = total_shards,
        stripes = padded_len / stripe_width,
        "encoded object"
    );
    Ok(manifest)
}

fn load_hinfo(dir: &Path) -> Result<HashInfo> {
    let path = dir.join(HINFO_KEY);
    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(HashInfo::from_bytes(&bytes)?)
}

fn check_shard(
    dir: &Path,
    shard: ShardIndex,
    hinfo: &HashInfo,
    hinfo_stripelet_size: u64,
    manifest: &Manifest,
) -> Result<(ShardReport, Option<Vec<u8>>)> {
    let Ok(data) = fs::read(shard_path(dir, shard)) else {
        warn!(shard, "shard file missing");
        let report = ShardReport {
            shard,
            present: false,
            hash_ok: false,
            stripelets_ok: false,
        };
        return Ok((report, None));
    };

    let mut state = Crc32cState::new();
    state.update(&data);
    let hash_ok = hinfo.shard_hash(shard) == Some(state.value());

    let stripelets_ok = if data.is_empty() {
        true
    } else {
        let table = match fs::read(cinfo_path(dir, shard)) {
            Ok(bytes) => match StripeletCrcTable::from_bytes(&bytes) {
                Ok(table) => Some(table),
                Err(e) => {
                    warn!(shard, error = %e, "corrupt {CINFO_KEY} record");
                    None
                }
            },
            Err(_) => None,
        };
        let table_ok = table.is_some_and(|t| {
            t.verify(&data, 0, manifest.stripelet_size, 0, t.len())
                && t.len() == data.len().div_ceil(manifest.stripelet_size as usize)
        });
        table_ok && hinfo.verify_stripelet_crc(shard, &data, hinfo_stripelet_size)
    };

    let report = ShardReport {
        shard,
        present: true,
        hash_ok,
        stripelets_ok,
    };
    debug!(?report, "checked shard");
    Ok((report, Some(data)))
}

fn check_all(dir: &Path) -> Result<(Manifest, Vec<ShardReport>, ShardChunkMap)> {
    let manifest = Manifest::load(dir)?;
    let hinfo = load_hinfo(dir)?;
    if hinfo.shard_count() != manifest.total_shards() {
        bail!(
            "{HINFO_KEY} tracks {} shards, manifest describes {}",
            hinfo.shard_count(),
            manifest.total_shards()
        );
    }
    let layout = manifest.config().stripe_layout()?;
    let hinfo_stripelet_size =
        HashInfo::stripelet_size(layout.stripe_width(), layout.data_shard_count())?;

    let mut reports = Vec::with_capacity(manifest.total_shards());
    let mut intact = ShardChunkMap::new();
    for shard in 0..manifest.total_shards() {
        let (report, data) = check_shard(dir, shard, &hinfo, hinfo_stripelet_size, &manifest)?;
        if let (true, Some(data)) = (report.intact(), data) {
            intact.insert(shard, data);
        }
        reports.push(report);
    }
    Ok((manifest, reports, intact))
}

/// Check every shard of the object in `dir` against its integrity records
pub fn verify_object(dir: &Path) -> Result<Vec<ShardReport>> {
    let (_, reports, _) = check_all(dir)?;
    Ok(reports)
}

/// Rebuild the logical object in `dir` from its intact shards
pub fn decode_object(dir: &Path) -> Result<Vec<u8>> {
    let (manifest, reports, intact) = check_all(dir)?;
    if manifest.object_size == 0 {
        return Ok(Vec::new());
    }

    let skipped: Vec<ShardIndex> = reports
        .iter()
        .filter(|r| !r.intact())
        .map(|r| r.shard)
        .collect();
    if !skipped.is_empty() {
        warn!(?skipped, "skipping damaged shards");
    }

    let codec = StripeCodec::from_config(&manifest.config())?;
    let mut data = codec.decode_concat(&intact)?;
    data.truncate(usize::try_from(manifest.object_size)?);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn test_config() -> Config {
        Config::from_toml_str(
            r#"
            [layout]
            data_shards = 3
            parity_shards = 2
            chunk_size = 16
            "#,
        )
        .unwrap()
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    #[test]
    fn test_encode_writes_records() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = encode_object(&test_config(), &random_bytes(100), dir.path()).unwrap();

        assert_eq!(manifest.object_size, 100);
        for shard in 0..5 {
            assert!(shard_path(dir.path(), shard).exists());
            assert!(cinfo_path(dir.path(), shard).exists());
            // 100 bytes pad to three 48-byte stripes
            assert_eq!(fs::read(shard_path(dir.path(), shard)).unwrap().len(), 48);
        }
        let hinfo = load_hinfo(dir.path()).unwrap();
        assert_eq!(hinfo.total_chunk_size(), 48);
        assert_eq!(Manifest::load(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = random_bytes(1000);
        encode_object(&test_config(), &input, dir.path()).unwrap();

        assert!(verify_object(dir.path()).unwrap().iter().all(ShardReport::intact));
        assert_eq!(decode_object(dir.path()).unwrap(), input);
    }

    #[test]
    fn test_decode_skips_corrupted_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let input = random_bytes(500);
        encode_object(&test_config(), &input, dir.path()).unwrap();

        let path = shard_path(dir.path(), 1);
        let mut data = fs::read(&path).unwrap();
        data[7] ^= 0xff;
        fs::write(&path, data).unwrap();
        fs::remove_file(shard_path(dir.path(), 3)).unwrap();

        let reports = verify_object(dir.path()).unwrap();
        assert!(!reports[1].hash_ok);
        assert!(!reports[1].stripelets_ok);
        assert!(!reports[3].present);
        assert_eq!(reports.iter().filter(|r| r.intact()).count(), 3);

        assert_eq!(decode_object(dir.path()).unwrap(), input);
    }

    #[test]
    fn test_decode_with_truncated_cinfo() {
        let dir = tempfile::tempdir().unwrap();
        let input = random_bytes(500);
        encode_object(&test_config(), &input, dir.path()).unwrap();

        let path = cinfo_path(dir.path(), 1);
        let mut record = fs::read(&path).unwrap();
        record.truncate(record.len() - 3);
        fs::write(&path, record).unwrap();

        let reports = verify_object(dir.path()).unwrap();
        assert!(reports[1].present);
        assert!(reports[1].hash_ok);
        assert!(!reports[1].stripelets_ok);
        assert_eq!(reports.iter().filter(|r| r.intact()).count(), 4);

        assert_eq!(decode_object(dir.path()).unwrap(), input);
    }

    #[test]
    fn test_decode_too_many_lost() {
        let dir = tempfile::tempdir().unwrap();
        encode_object(&test_config(), &random_bytes(200), dir.path()).unwrap();
        for shard in 0..3 {
            fs::remove_file(shard_path(dir.path(), shard)).unwrap();
        }
        assert!(decode_object(dir.path()).is_err());
    }

    #[test]
    fn test_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        encode_object(&test_config(), &[], dir.path()).unwrap();
        assert!(verify_object(dir.path()).unwrap().iter().all(ShardReport::intact));
        assert!(decode_object(dir.path()).unwrap().is_empty());
    }
}
