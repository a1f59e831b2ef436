//! Persisted integrity records and their attribute keys

use bytes::{Bytes, BytesMut};
use ecstripe_common::{Error, Result};

/// Attribute key under which the hash record of an object is stored
pub const HINFO_KEY: &str = "hinfo_key";

/// Attribute key under which the stripelet CRC table of a shard is stored
pub const CINFO_KEY: &str = "cinfo_key";

/// Check whether `key` names the hash record
#[must_use]
pub fn is_hinfo_key(key: &str) -> bool {
    key == HINFO_KEY
}

/// Check whether `key` names the stripelet CRC table
#[must_use]
pub fn is_cinfo_key(key: &str) -> bool {
    key == CINFO_KEY
}

/// A persisted integrity record
pub trait Record: Sized {
    /// Attribute key the record is stored under
    const KEY: &'static str;

    /// Append the versioned encoding of this record to `buf`
    ///
    /// Fails when a length or count does not fit its `u32` field; `buf` is
    /// left unchanged in that case.
    fn encode(&self, buf: &mut BytesMut) -> Result<()>;

    /// Decode one record from the front of `input`, advancing past it
    fn decode(input: &mut &[u8]) -> Result<Self>;

    /// Human-readable diagnostic report
    fn dump(&self) -> serde_json::Value;

    /// Encode into a standalone buffer
    fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode a buffer holding exactly one record
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut input = data;
        let record = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(Error::decode(format!(
                "{}: {} trailing bytes after record",
                Self::KEY,
                input.len()
            )));
        }
        Ok(record)
    }
}
