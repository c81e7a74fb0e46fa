//! One-time hash-chain (Winternitz) commitments used to publish values inside witnesses.
//!
//! A value is split into little-endian digits of a fixed bit width. For every digit position the
//! committer derives a private chain start, and the public key is the chain hashed `2^bits` times.
//! Revealing a data digit `d` publishes the chain hashed `max - d` times, so anyone holding the
//! public key can recover `d` by counting how many more hashes reach the key. A checksum over the
//! data digits, revealed the opposite way round, stops the revealer from raising any digit after
//! the fact.

use std::fmt;

use bitcoin::hashes::{hash160, ripemd160, Hash, HashEngine};
use serde::{Deserialize, Serialize};

pub mod errors;
pub mod value;

pub use errors::{CommitmentError, CommitmentResult};
pub use value::CommittedValue;

/// Size in bytes of every chain element and public key.
pub const HASH_LEN: usize = 20;

/// A single chain element: a public key or a revealed witness element.
pub type ChainElement = [u8; HASH_LEN];

/// Calculates `ceil(log_base(n))`.
pub const fn log_base_ceil(n: u32, base: u32) -> u32 {
    let mut res: u32 = 0;
    let mut cur: u64 = 1;
    while cur < (n as u64) {
        cur *= base as u64;
        res += 1;
    }
    res
}

/// The width classes a commitment can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WotsType {
    /// A single 3-bit digit.
    Wots1,

    /// A 24-bit value in 3-bit digits.
    Wots24,

    /// A 256-bit value in 3-bit digits.
    Wots256,

    /// A 256-bit value in 4-bit digits.
    Wots256x4,
}

impl WotsType {
    /// Number of bits in one digit.
    pub const fn digit_width(&self) -> usize {
        match self {
            WotsType::Wots256x4 => 4,
            WotsType::Wots1 | WotsType::Wots24 | WotsType::Wots256 => 3,
        }
    }

    /// Number of bits of the committed value.
    pub const fn value_bits(&self) -> usize {
        match self {
            WotsType::Wots1 => 3,
            WotsType::Wots24 => 24,
            WotsType::Wots256 | WotsType::Wots256x4 => 256,
        }
    }

    /// Largest value one digit can take.
    pub const fn max_digit(&self) -> u32 {
        (1 << self.digit_width()) - 1
    }

    /// Number of digits carrying the value.
    pub const fn data_digits(&self) -> usize {
        self.value_bits().div_ceil(self.digit_width())
    }

    /// Number of digits carrying the checksum.
    pub const fn checksum_digits(&self) -> usize {
        let max_sum = self.data_digits() as u32 * self.max_digit();
        log_base_ceil(max_sum + 1, 1 << self.digit_width()) as usize
    }

    /// Total number of chain elements, i.e. public keys and revealed witness elements.
    pub const fn total_digits(&self) -> usize {
        self.data_digits() + self.checksum_digits()
    }

    /// Total size in bytes of a reveal.
    pub const fn witness_len(&self) -> usize {
        self.total_digits() * HASH_LEN
    }
}

impl fmt::Display for WotsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WotsType::Wots1 => "wots_1",
            WotsType::Wots24 => "wots_24",
            WotsType::Wots256 => "wots_256",
            WotsType::Wots256x4 => "wots_256x4",
        };
        f.write_str(name)
    }
}

/// The master secret from which all of an agent's chain starts are derived.
#[derive(Clone, PartialEq, Eq)]
pub struct CommitmentSecret(Vec<u8>);

impl CommitmentSecret {
    /// Wraps raw secret bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Derives the chain start for digit `idx` of the commitment identified by `unique_id`.
    fn chain_start(&self, unique_id: &str, idx: usize) -> ChainElement {
        let mut engine = ripemd160::Hash::engine();
        engine.input(&self.0);
        engine.input(unique_id.as_bytes());
        engine.input(b"/");
        engine.input(idx.to_string().as_bytes());
        ripemd160::Hash::from_engine(engine).to_byte_array()
    }

    /// Returns the public keys of the commitment identified by `unique_id`.
    pub fn public_keys(&self, wots_type: WotsType, unique_id: &str) -> Vec<ChainElement> {
        let chain_len = 1usize << wots_type.digit_width();
        (0..wots_type.total_digits())
            .map(|idx| hash_times(self.chain_start(unique_id, idx), chain_len))
            .collect()
    }

    /// Produces the witness elements revealing `value`.
    pub fn encode(
        &self,
        wots_type: WotsType,
        value: &CommittedValue,
        unique_id: &str,
    ) -> CommitmentResult<Vec<ChainElement>> {
        if value.bit_len() > wots_type.value_bits() {
            return Err(CommitmentError::ValueOutOfRange {
                wots_type,
                max_bits: wots_type.value_bits(),
            });
        }

        let width = wots_type.digit_width();
        let max = wots_type.max_digit();
        let data_digits = wots_type.data_digits();

        let mut revealed = Vec::with_capacity(wots_type.total_digits());
        let mut checksum = 0u32;
        for idx in 0..data_digits {
            let digit = value.digit(idx, width);
            checksum += digit;
            revealed.push(hash_times(
                self.chain_start(unique_id, idx),
                (max - digit) as usize,
            ));
        }

        let checksum = CommittedValue::from(checksum);
        for idx in 0..wots_type.checksum_digits() {
            let digit = checksum.digit(idx, width);
            revealed.push(hash_times(
                self.chain_start(unique_id, data_digits + idx),
                digit as usize,
            ));
        }

        Ok(revealed)
    }
}

impl fmt::Debug for CommitmentSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CommitmentSecret(<redacted>)")
    }
}

/// Recovers the committed value from revealed witness elements and the matching public keys.
pub fn decode(
    wots_type: WotsType,
    revealed: &[ChainElement],
    public_keys: &[ChainElement],
) -> CommitmentResult<CommittedValue> {
    let expected = wots_type.total_digits();
    for got in [revealed.len(), public_keys.len()] {
        if got != expected {
            return Err(CommitmentError::WrongLength {
                wots_type,
                expected,
                got,
            });
        }
    }

    let width = wots_type.digit_width();
    let max = wots_type.max_digit();
    let data_digits = wots_type.data_digits();

    let mut value = CommittedValue::ZERO;
    let mut checksum = 0u32;
    for idx in 0..data_digits {
        let digit = distance(wots_type, revealed[idx], public_keys[idx])?;
        checksum += digit;
        for bit in 0..width {
            if (digit >> bit) & 1 == 1 && !value.set_bit(idx * width + bit) {
                return Err(invalid(wots_type, format!("digit {idx} overflows the value")));
            }
        }
    }

    if value.bit_len() > wots_type.value_bits() {
        return Err(invalid(wots_type, "value wider than its class".to_string()));
    }

    let checksum = CommittedValue::from(checksum);
    for idx in 0..wots_type.checksum_digits() {
        let pos = data_digits + idx;
        let revealed_digit = max - distance(wots_type, revealed[pos], public_keys[pos])?;
        if revealed_digit != checksum.digit(idx, width) {
            return Err(invalid(wots_type, format!("checksum digit {idx} mismatch")));
        }
    }

    Ok(value)
}

/// Number of extra hashes that take `element` to `public_key`, minus one.
fn distance(
    wots_type: WotsType,
    element: ChainElement,
    public_key: ChainElement,
) -> CommitmentResult<u32> {
    let mut cur = element;
    for steps in 0..=wots_type.max_digit() {
        cur = hash160::Hash::hash(&cur).to_byte_array();
        if cur == public_key {
            return Ok(steps);
        }
    }

    Err(invalid(
        wots_type,
        "chain element does not reach its public key".to_string(),
    ))
}

fn hash_times(start: ChainElement, times: usize) -> ChainElement {
    (0..times).fold(start, |cur, _| hash160::Hash::hash(&cur).to_byte_array())
}

fn invalid(wots_type: WotsType, reason: String) -> CommitmentError {
    CommitmentError::InvalidCommitment { wots_type, reason }
}
