//! Errors for the shared primitives.

use thiserror::Error;

/// Errors raised by the bisection addressor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BisectionError {
    /// A trace without instructions cannot be bisected.
    #[error("cannot bisect an empty trace")]
    EmptyTrace,

    /// The padded trace length `10^k` does not fit in a `u64`.
    #[error("trace of {0} instructions is too large to bisect")]
    TraceTooLarge(u64),

    /// The selection path has more digits than there are rounds.
    #[error("selection path of length {len} exceeds {iterations} rounds")]
    PathOverflow {
        /// Length of the offending path.
        len: usize,

        /// Number of rounds of the addressor.
        iterations: u8,
    },

    /// A selection digit outside `0..=9`.
    #[error("invalid selection digit {0}")]
    InvalidDigit(u8),
}

/// Wrapper type for results that can fail with a [`BisectionError`].
pub type BisectionResult<T> = Result<T, BisectionError>;

/// Error returned when a string is not a known template name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown template name: {0}")]
pub struct ParseTemplateNameError(pub String);
