//! Versioned binary encoding for integrity records
//!
//! Every record is wrapped in an envelope:
//!
//! ```text
//! +-----------+--------------+-------------+---------------------+
//! | struct_v  | struct_compat| payload_len | payload             |
//! | u8        | u8           | u32 LE      | payload_len bytes   |
//! +-----------+--------------+-------------+---------------------+
//! ```
//!
//! `struct_v` is the version the writer used, `struct_compat` the oldest
//! reader version able to understand it. A reader rejects envelopes whose
//! `struct_compat` is newer than its own version and skips payload bytes it
//! does not know about. Inside the payload, integers are little-endian and
//! sequences are a `u32` count followed by the elements.

use bytes::{Buf, BufMut, BytesMut};
use ecstripe_common::{Error, Result};

/// Size of the envelope header in bytes
pub const ENVELOPE_HEADER_SIZE: usize = 6;

/// Convert a payload length or element count to its `u32` field
pub fn encoded_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::invalid_input(format!("{what} of {len} does not fit a u32 field")))
}

/// Write an envelope around the payload produced by `body`
///
/// On error `buf` is restored to its length before the call.
pub fn encode_envelope(
    buf: &mut BytesMut,
    struct_v: u8,
    struct_compat: u8,
    body: impl FnOnce(&mut BytesMut) -> Result<()>,
) -> Result<()> {
    let begin = buf.len();
    buf.put_u8(struct_v);
    buf.put_u8(struct_compat);
    let len_at = buf.len();
    buf.put_u32_le(0);

    let start = buf.len();
    let payload_len = body(buf).and_then(|()| encoded_len(buf.len() - start, "payload"));
    match payload_len {
        Ok(payload_len) => {
            buf[len_at..len_at + 4].copy_from_slice(&payload_len.to_le_bytes());
            Ok(())
        }
        Err(e) => {
            buf.truncate(begin);
            Err(e)
        }
    }
}

/// A decoded envelope header and its payload
#[derive(Debug)]
pub struct Envelope<'a> {
    /// Version the writer used
    pub struct_v: u8,
    /// Oldest reader version that understands the payload
    pub struct_compat: u8,
    /// Payload reader, limited to this envelope
    pub payload: Reader<'a>,
}

/// Read one envelope from the front of `input`, advancing past it
pub fn decode_envelope<'a>(
    input: &mut &'a [u8],
    record: &'static str,
    supported: u8,
) -> Result<Envelope<'a>> {
    if input.len() < ENVELOPE_HEADER_SIZE {
        return Err(Error::decode(format!(
            "{record}: {} bytes is too short for an envelope header",
            input.len()
        )));
    }

    let struct_v = input.get_u8();
    let struct_compat = input.get_u8();
    if struct_compat > supported {
        return Err(Error::UnsupportedVersion {
            record,
            compat: struct_compat,
            supported,
        });
    }

    let payload_len = input.get_u32_le() as usize;
    if input.len() < payload_len {
        return Err(Error::decode(format!(
            "{record}: payload of {payload_len} bytes truncated to {}",
            input.len()
        )));
    }
    let (payload, rest) = input.split_at(payload_len);
    *input = rest;

    Ok(Envelope {
        struct_v,
        struct_compat,
        payload: Reader::new(record, payload),
    })
}

/// Bounds-checked reader over an envelope payload
#[derive(Debug)]
pub struct Reader<'a> {
    record: &'static str,
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Create a reader over `buf`
    #[must_use]
    pub const fn new(record: &'static str, buf: &'a [u8]) -> Self {
        Self { record, buf }
    }

    /// Bytes left unread
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn need(&self, bytes: usize, what: &str) -> Result<()> {
        if self.buf.len() < bytes {
            return Err(Error::decode(format!(
                "{}: need {bytes} bytes for {what}, {} left",
                self.record,
                self.buf.len()
            )));
        }
        Ok(())
    }

    /// Read a little-endian `u32`
    pub fn read_u32(&mut self, what: &str) -> Result<u32> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    /// Read a little-endian `u64`
    pub fn read_u64(&mut self, what: &str) -> Result<u64> {
        self.need(8, what)?;
        Ok(self.buf.get_u64_le())
    }

    /// Read a counted sequence of `u32`
    pub fn read_u32_vec(&mut self, what: &str) -> Result<Vec<u32>> {
        let count = self.read_u32(what)? as usize;
        let bytes = count
            .checked_mul(4)
            .ok_or_else(|| Error::decode(format!("{}: {what} count overflows", self.record)))?;
        self.need(bytes, what)?;
        Ok((0..count).map(|_| self.buf.get_u32_le()).collect())
    }
}

/// Write a counted sequence of `u32`
pub fn put_u32_vec(buf: &mut BytesMut, values: &[u32]) -> Result<()> {
    buf.put_u32_le(encoded_len(values.len(), "sequence")?);
    for &value in values {
        buf.put_u32_le(value);
    }
    Ok(())
}
