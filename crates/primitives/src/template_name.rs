//! The closed set of transaction names making up a dispute.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    errors::ParseTemplateNameError,
    types::{Outcome, Role},
};

/// Names every transaction of the dispute graph.
///
/// Round-indexed variants carry the zero-based bisection round and print with a two digit
/// suffix, e.g. `state_03`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TemplateName {
    /// The funds the prover is trying to peg out. Externally funded.
    LockedFunds,

    /// The prover's stake, which also carries the proof commitment. Externally funded.
    ProverStake,

    /// Reveals the proof.
    Proof,

    /// Claims the locked funds after nobody challenged the proof.
    ProofUncontested,

    /// Opens the dispute, paying the prover to start bisecting.
    Challenge,

    /// Claims the stake after the prover ignored a challenge.
    ChallengeUncontested,

    /// Reveals the intermediate states at the current boundaries.
    State(u8),

    /// Claims the locked funds after the verifier stopped selecting.
    StateUncontested(u8),

    /// Reveals which sub-range the verifier disputes.
    Select(u8),

    /// Claims the stake after the prover stopped revealing states.
    SelectUncontested(u8),

    /// Commits to the single disputed instruction and its operands.
    Argument,

    /// Claims the locked funds after the argument went unrefuted.
    ArgumentUncontested,

    /// Executes the refutation script against the argument.
    ProofRefuted,
}

impl TemplateName {
    /// The role that broadcasts this transaction.
    pub const fn owner(&self) -> Role {
        match self {
            TemplateName::Challenge
            | TemplateName::ChallengeUncontested
            | TemplateName::Select(_)
            | TemplateName::SelectUncontested(_)
            | TemplateName::ProofRefuted => Role::Verifier,
            _ => Role::Prover,
        }
    }

    /// The bisection round of round-indexed transactions.
    pub const fn round(&self) -> Option<u8> {
        match self {
            TemplateName::State(i)
            | TemplateName::StateUncontested(i)
            | TemplateName::Select(i)
            | TemplateName::SelectUncontested(i) => Some(*i),
            _ => None,
        }
    }

    /// How the dispute ends once this transaction confirms, if it ends it.
    pub const fn outcome(&self) -> Option<Outcome> {
        match self {
            TemplateName::ProofUncontested
            | TemplateName::StateUncontested(_)
            | TemplateName::ArgumentUncontested => Some(Outcome::PegoutSuccessful),
            TemplateName::ChallengeUncontested
            | TemplateName::SelectUncontested(_)
            | TemplateName::ProofRefuted => Some(Outcome::PegoutFailed),
            _ => None,
        }
    }

    /// Whether the transaction spends outputs created outside the dispute graph.
    pub const fn is_external(&self) -> bool {
        matches!(self, TemplateName::LockedFunds | TemplateName::ProverStake)
    }
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateName::LockedFunds => f.write_str("locked_funds"),
            TemplateName::ProverStake => f.write_str("prover_stake"),
            TemplateName::Proof => f.write_str("proof"),
            TemplateName::ProofUncontested => f.write_str("proof_uncontested"),
            TemplateName::Challenge => f.write_str("challenge"),
            TemplateName::ChallengeUncontested => f.write_str("challenge_uncontested"),
            TemplateName::State(i) => write!(f, "state_{i:02}"),
            TemplateName::StateUncontested(i) => write!(f, "state_uncontested_{i:02}"),
            TemplateName::Select(i) => write!(f, "select_{i:02}"),
            TemplateName::SelectUncontested(i) => write!(f, "select_uncontested_{i:02}"),
            TemplateName::Argument => f.write_str("argument"),
            TemplateName::ArgumentUncontested => f.write_str("argument_uncontested"),
            TemplateName::ProofRefuted => f.write_str("proof_refuted"),
        }
    }
}

impl FromStr for TemplateName {
    type Err = ParseTemplateNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fixed = match s {
            "locked_funds" => Some(TemplateName::LockedFunds),
            "prover_stake" => Some(TemplateName::ProverStake),
            "proof" => Some(TemplateName::Proof),
            "proof_uncontested" => Some(TemplateName::ProofUncontested),
            "challenge" => Some(TemplateName::Challenge),
            "challenge_uncontested" => Some(TemplateName::ChallengeUncontested),
            "argument" => Some(TemplateName::Argument),
            "argument_uncontested" => Some(TemplateName::ArgumentUncontested),
            "proof_refuted" => Some(TemplateName::ProofRefuted),
            _ => None,
        };
        if let Some(name) = fixed {
            return Ok(name);
        }

        // longer prefixes first, `state_` is also a prefix of `state_uncontested_`
        let indexed: [(&str, fn(u8) -> TemplateName); 4] = [
            ("state_uncontested_", TemplateName::StateUncontested),
            ("select_uncontested_", TemplateName::SelectUncontested),
            ("state_", TemplateName::State),
            ("select_", TemplateName::Select),
        ];
        for (prefix, make) in indexed {
            if let Some(suffix) = s.strip_prefix(prefix) {
                if suffix.len() == 2 && suffix.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(round) = suffix.parse() {
                        return Ok(make(round));
                    }
                }
                break;
            }
        }

        Err(ParseTemplateNameError(s.to_string()))
    }
}

impl TryFrom<String> for TemplateName {
    type Error = ParseTemplateNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TemplateName> for String {
    fn from(value: TemplateName) -> Self {
        value.to_string()
    }
}
