//! Default values for the dispute parameters.

use bitcoin::Amount;

/// Default number of blocks after which a rival `small` timeout condition becomes spendable.
pub const SMALL_TIMEOUT_BLOCKS: u16 = 6;

/// Default number of blocks after which a rival `large` timeout condition becomes spendable.
pub const LARGE_TIMEOUT_BLOCKS: u16 = 18;

/// Default fee rate in sats per byte of script.
pub const FEE_PER_BYTE: u64 = 20;

/// Default multiplier applied on top of the fee rate, in percent.
pub const FEE_FACTOR_PERCENT: u64 = 125;

/// Default amount placed on outputs that exist only to be spent, not to carry value.
pub const SYMBOLIC_AMOUNT: Amount = Amount::from_sat(1);

/// Default amount the verifier pays the prover when challenging a proof.
pub const VERIFIER_PAYMENT: Amount = Amount::from_int_btc(1);

/// Default number of bisection rounds.
pub const ITERATIONS: u8 = 6;

/// Largest number of bisection rounds.
///
/// The leaf index is committed as a 24-bit value, so `10^iterations` must not exceed `2^24`.
pub const MAX_ITERATIONS: u8 = 7;
