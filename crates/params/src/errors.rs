//! Errors for the dispute parameters.

use thiserror::Error;

/// Error while validating a set of dispute parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    /// The number of bisection rounds is outside the supported range.
    #[error("iterations must be within 1..={max}, got {got}")]
    InvalidIterations {
        /// The configured number of rounds.
        got: u8,

        /// The largest supported number of rounds.
        max: u8,
    },

    /// The fee factor would lower the fee below the plain fee rate.
    #[error("fee factor must be at least 100 percent, got {0}")]
    FeeFactorTooLow(u64),

    /// A timeout of zero blocks would make a rival condition spendable immediately.
    #[error("timeouts must be non-zero and small ({small}) must be below large ({large})")]
    InvalidTimeouts {
        /// The small timeout in blocks.
        small: u16,

        /// The large timeout in blocks.
        large: u16,
    },
}
