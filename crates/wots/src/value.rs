//! The integer carried by a commitment.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width in bytes of the largest value a commitment can carry.
pub const VALUE_BYTES: usize = 32;

/// A 256-bit unsigned integer stored big-endian.
///
/// Narrow width classes carry small integers (a selection digit, a leaf index) while the wide
/// ones carry field elements and hashes, so every class shares this representation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct CommittedValue(#[serde(with = "hex::serde")] [u8; VALUE_BYTES]);

impl CommittedValue {
    /// The zero value.
    pub const ZERO: Self = Self([0; VALUE_BYTES]);

    /// Creates a value from its big-endian bytes.
    pub const fn from_be_bytes(bytes: [u8; VALUE_BYTES]) -> Self {
        Self(bytes)
    }

    /// Returns the big-endian bytes of this value.
    pub const fn to_be_bytes(self) -> [u8; VALUE_BYTES] {
        self.0
    }

    /// Returns the value as a `u64` if it fits.
    pub fn to_u64(self) -> Option<u64> {
        if self.0[..VALUE_BYTES - 8].iter().any(|b| *b != 0) {
            return None;
        }

        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[VALUE_BYTES - 8..]);
        Some(u64::from_be_bytes(buf))
    }

    /// Number of significant bits.
    pub fn bit_len(&self) -> usize {
        match self.0.iter().position(|b| *b != 0) {
            Some(idx) => (VALUE_BYTES - idx) * 8 - self.0[idx].leading_zeros() as usize,
            None => 0,
        }
    }

    /// Returns the bit at little-endian position `idx`; positions past 255 read as zero.
    pub(crate) fn bit(&self, idx: usize) -> bool {
        if idx >= VALUE_BYTES * 8 {
            return false;
        }

        let byte = self.0[VALUE_BYTES - 1 - idx / 8];
        (byte >> (idx % 8)) & 1 == 1
    }

    /// Sets the bit at little-endian position `idx`.
    ///
    /// Returns `false` if the position lies outside the 256-bit range.
    pub(crate) fn set_bit(&mut self, idx: usize) -> bool {
        if idx >= VALUE_BYTES * 8 {
            return false;
        }

        self.0[VALUE_BYTES - 1 - idx / 8] |= 1 << (idx % 8);
        true
    }

    /// Extracts the `idx`-th digit of `width` bits, least significant digit first.
    pub(crate) fn digit(&self, idx: usize, width: usize) -> u32 {
        (0..width).fold(0, |acc, j| acc | ((self.bit(idx * width + j) as u32) << j))
    }
}

impl From<u64> for CommittedValue {
    fn from(value: u64) -> Self {
        let mut bytes = [0u8; VALUE_BYTES];
        bytes[VALUE_BYTES - 8..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl From<u32> for CommittedValue {
    fn from(value: u32) -> Self {
        Self::from(value as u64)
    }
}

impl From<[u8; VALUE_BYTES]> for CommittedValue {
    fn from(bytes: [u8; VALUE_BYTES]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for CommittedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommittedValue({})", hex::encode(self.0))
    }
}

impl fmt::Display for CommittedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_u64() {
            Some(small) => write!(f, "{small}"),
            None => write!(f, "0x{}", hex::encode(self.0)),
        }
    }
}
