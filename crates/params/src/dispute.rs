//! Parameters required to construct and fund the dispute graph.

use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::{
    default::{
        FEE_FACTOR_PERCENT, FEE_PER_BYTE, ITERATIONS, LARGE_TIMEOUT_BLOCKS, MAX_ITERATIONS,
        SMALL_TIMEOUT_BLOCKS, SYMBOLIC_AMOUNT, VERIFIER_PAYMENT,
    },
    errors::ParamsError,
};

/// The parameters required to construct the dispute graph.
///
/// These parameters are consensus-critical meaning that the prover and the verifier must use the
/// exact same values, otherwise their templates (and therefore their signatures) diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeParams {
    /// Fee rate in sats per byte of script.
    pub fee_per_byte: u64,

    /// Multiplier applied on top of [`Self::fee_per_byte`], in percent.
    pub fee_factor_percent: u64,

    /// Number of blocks a party waits before claiming after the other side went silent mid-round.
    pub small_timeout_blocks: u16,

    /// Number of blocks the verifier waits before claiming an unanswered challenge.
    pub large_timeout_blocks: u16,

    /// The amount of outputs that exist only to be spent.
    pub symbolic_amount: Amount,

    /// The amount the verifier pays the prover to open a challenge.
    pub verifier_payment_amount: Amount,

    /// The number of bisection rounds.
    pub iterations: u8,
}

impl Default for DisputeParams {
    fn default() -> Self {
        Self {
            fee_per_byte: FEE_PER_BYTE,
            fee_factor_percent: FEE_FACTOR_PERCENT,
            small_timeout_blocks: SMALL_TIMEOUT_BLOCKS,
            large_timeout_blocks: LARGE_TIMEOUT_BLOCKS,
            symbolic_amount: SYMBOLIC_AMOUNT,
            verifier_payment_amount: VERIFIER_PAYMENT,
            iterations: ITERATIONS,
        }
    }
}

impl DisputeParams {
    /// Checks that the parameters describe a graph that can actually be built.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.iterations == 0 || self.iterations > MAX_ITERATIONS {
            return Err(ParamsError::InvalidIterations {
                got: self.iterations,
                max: MAX_ITERATIONS,
            });
        }

        if self.fee_factor_percent < 100 {
            return Err(ParamsError::FeeFactorTooLow(self.fee_factor_percent));
        }

        if self.small_timeout_blocks == 0 || self.small_timeout_blocks >= self.large_timeout_blocks
        {
            return Err(ParamsError::InvalidTimeouts {
                small: self.small_timeout_blocks,
                large: self.large_timeout_blocks,
            });
        }

        Ok(())
    }

    /// Sets the number of bisection rounds.
    pub fn with_iterations(self, iterations: u8) -> Self {
        Self { iterations, ..self }
    }
}
