//! Checksum utilities for ecstripe
//!
//! All integrity metadata uses raw CRC-32C (Castagnoli polynomial): the
//! running value is neither pre- nor post-inverted between calls, so a
//! checksum can be carried forward as the seed of the next call. A fresh
//! computation starts from [`CRC32C_SEED`].

/// Initial CRC-32C value for "no prior data"
pub const CRC32C_SEED: u32 = u32::MAX;

/// Compute raw CRC-32C of `data`, continuing from `seed`
///
/// Chaining holds: `crc32c_seeded(crc32c_seeded(s, a), b)` equals
/// `crc32c_seeded(s, a ++ b)`. An empty `data` returns `seed` unchanged.
#[inline]
#[must_use]
pub fn crc32c_seeded(seed: u32, data: &[u8]) -> u32 {
    // The crc32c crate inverts on entry and exit; undo both to keep the raw register.
    !crc32c::crc32c_append(!seed, data)
}

/// Compute CRC-32C of `data` from the standard initializer
#[inline]
#[must_use]
pub fn compute_crc32c(data: &[u8]) -> u32 {
    crc32c_seeded(CRC32C_SEED, data)
}

/// Checksum every `stripelet_size` slice of `data` independently
///
/// The last stripelet covers the remainder when `data.len()` is not a
/// multiple of `stripelet_size`. Callers must reject a zero size.
#[must_use]
pub fn stripelet_crcs(data: &[u8], stripelet_size: usize) -> Vec<u32> {
    debug_assert!(stripelet_size > 0);
    data.chunks(stripelet_size).map(compute_crc32c).collect()
}

/// Streaming CRC-32C calculator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crc32cState {
    value: u32,
}

impl Crc32cState {
    /// Create a calculator starting from the standard initializer
    #[must_use]
    pub const fn new() -> Self {
        Self { value: CRC32C_SEED }
    }

    /// Resume from a previously persisted value
    #[must_use]
    pub const fn with_seed(seed: u32) -> Self {
        Self { value: seed }
    }

    /// Update the calculator with more data
    pub fn update(&mut self, data: &[u8]) {
        self.value = crc32c_seeded(self.value, data);
    }

    /// Current running value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }
}

impl Default for Crc32cState {
    fn default() -> Self {
        Self::new()
    }
}
