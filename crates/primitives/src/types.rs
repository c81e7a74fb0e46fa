//! Basic types shared by both parties of a dispute.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Height of a bitcoin block.
pub type BitcoinBlockHeight = u64;

/// The two parties of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Posts the proof and defends it round after round.
    Prover,

    /// Challenges the proof and narrows down the faulty instruction.
    Verifier,
}

impl Role {
    /// Returns the counterpart of this role.
    pub const fn other(&self) -> Self {
        match self {
            Role::Prover => Role::Verifier,
            Role::Verifier => Role::Prover,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Prover => f.write_str("prover"),
            Role::Verifier => f.write_str("verifier"),
        }
    }
}

/// The signatures a spending condition demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureType {
    /// Anyone who satisfies the rest of the script may spend.
    #[default]
    None,

    /// Only the prover's signature.
    Prover,

    /// Only the verifier's signature.
    Verifier,

    /// Both parties must sign, which is what pre-signing the graph relies on.
    Both,
}

impl SignatureType {
    /// The roles whose signature is required, in witness order.
    pub fn signers(&self) -> &'static [Role] {
        match self {
            SignatureType::None => &[],
            SignatureType::Prover => &[Role::Prover],
            SignatureType::Verifier => &[Role::Verifier],
            SignatureType::Both => &[Role::Prover, Role::Verifier],
        }
    }

    /// Whether `role` has to sign.
    pub fn requires(&self, role: Role) -> bool {
        self.signers().contains(&role)
    }
}

/// Identifies one dispute instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetupId(String);

impl SetupId {
    /// Creates a setup id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SetupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SetupId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// How a dispute ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The prover keeps the locked funds.
    PegoutSuccessful,

    /// The verifier showed the proof to be wrong or the prover stopped answering.
    PegoutFailed,
}

impl Outcome {
    /// The role that won the dispute.
    pub const fn winner(&self) -> Role {
        match self {
            Outcome::PegoutSuccessful => Role::Prover,
            Outcome::PegoutFailed => Role::Verifier,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::PegoutSuccessful => f.write_str("pegout successful"),
            Outcome::PegoutFailed => f.write_str("pegout failed"),
        }
    }
}

/// Lifecycle of a setup as seen by bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStatus {
    /// Templates are being generated, exchanged or signed.
    Preparing,

    /// Templates are signed and the agent is watching the chain.
    Active,

    /// Terminal: the prover won.
    PegoutSuccessful,

    /// Terminal: the verifier won.
    PegoutFailed,
}

impl SetupStatus {
    /// Whether no further protocol progress can happen.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SetupStatus::PegoutSuccessful | SetupStatus::PegoutFailed)
    }
}

impl From<Outcome> for SetupStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::PegoutSuccessful => SetupStatus::PegoutSuccessful,
            Outcome::PegoutFailed => SetupStatus::PegoutFailed,
        }
    }
}
