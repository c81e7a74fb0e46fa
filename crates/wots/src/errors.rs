//! Errors raised while producing or checking hash-chain commitments.

use thiserror::Error;

use crate::WotsType;

/// Errors that can occur while encoding or decoding a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitmentError {
    /// A revealed chain element never reaches its public key, or the checksum does not match the
    /// revealed digits.
    #[error("invalid {wots_type} commitment: {reason}")]
    InvalidCommitment {
        /// The width class being decoded.
        wots_type: WotsType,

        /// What exactly failed to verify.
        reason: String,
    },

    /// The value does not fit into the width class.
    #[error("value needs more than {max_bits} bits allowed by {wots_type}")]
    ValueOutOfRange {
        /// The width class the value was encoded for.
        wots_type: WotsType,

        /// The number of bits the class can carry.
        max_bits: usize,
    },

    /// The number of revealed elements or public keys does not match the width class.
    #[error("{wots_type} expects {expected} elements, got {got}")]
    WrongLength {
        /// The width class being decoded.
        wots_type: WotsType,

        /// Number of digits the class is made of.
        expected: usize,

        /// Number of elements supplied.
        got: usize,
    },
}

/// Wrapper type for results that can fail with a [`CommitmentError`].
pub type CommitmentResult<T> = Result<T, CommitmentError>;
