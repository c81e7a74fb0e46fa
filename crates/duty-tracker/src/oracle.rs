//! Access to the program trace a dispute is about.
//!
//! The dispute never executes the program itself. Whatever the parties need to know about the
//! trace (state roots at given lines, where two traces diverge, the data of a single instruction)
//! comes from a [`TraceOracle`].

use async_trait::async_trait;
use bitcoin::{
    hashes::{sha256, Hash, HashEngine},
    opcodes::all::{OP_DROP, OP_EQUAL, OP_PUSHNUM_1},
    script::Builder,
    ScriptBuf,
};
use dispute_primitives::{
    bisection::{Bisection, BOUNDARIES_PER_ROUND},
    errors::BisectionError,
};
use dispute_tx_graph::protocol::{
    ARGUMENT_MERKLE_PROOFS, ARGUMENT_OPERANDS, ARGUMENT_TAIL_VALUES, MERKLE_PROOF_HASHES,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wots::CommittedValue;

/// Everything the prover reveals about the single instruction the bisection ends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentData {
    /// The operands `a`, `b`, `c` and `d` of the instruction.
    pub operands: [CommittedValue; ARGUMENT_OPERANDS],

    /// Merkle proofs tying the operands to the revealed states.
    pub merkle_proofs: [[CommittedValue; MERKLE_PROOF_HASHES]; ARGUMENT_MERKLE_PROOFS],

    /// Trailing values committed next to the proofs.
    pub tail: [CommittedValue; ARGUMENT_TAIL_VALUES],
}

/// An argument as decoded from chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedArgument {
    /// The selection path the prover replayed.
    pub path: Vec<u8>,

    /// The instruction the prover argues about.
    pub leaf_index: u64,

    /// The revealed instruction data.
    pub data: ArgumentData,
}

/// A script spending the argument together with the witness satisfying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refutation {
    /// The script proving the argument wrong.
    pub script: ScriptBuf,

    /// Witness items consumed by [`Self::script`].
    pub witness: Vec<Vec<u8>>,
}

/// Answers questions about the program trace.
#[async_trait]
pub trait TraceOracle: Send + Sync {
    /// The error returned when the oracle cannot answer.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of instructions of the trace.
    fn instruction_count(&self) -> u64;

    /// The proof the prover publishes.
    async fn proof(&self) -> Result<Vec<CommittedValue>, Self::Error>;

    /// Whether `proof` verifies.
    async fn check_proof(&self, proof: &[CommittedValue]) -> Result<bool, Self::Error>;

    /// The state roots after executing each of `lines`.
    async fn state_roots(
        &self,
        proof: &[CommittedValue],
        lines: &[u64],
    ) -> Result<Vec<CommittedValue>, Self::Error>;

    /// The sub-range of the range selected by `path` that contains the first state the oracle
    /// disagrees with, given the boundary `states` revealed for it.
    async fn find_error_selection(
        &self,
        proof: &[CommittedValue],
        states: &[CommittedValue],
        path: &[u8],
    ) -> Result<u8, Self::Error>;

    /// The data of the instruction a full selection `path` points at.
    async fn argument(
        &self,
        proof: &[CommittedValue],
        path: &[u8],
    ) -> Result<ArgumentData, Self::Error>;

    /// A refutation of `argument`, given the boundary states revealed in every round.
    async fn refute(
        &self,
        proof: &[CommittedValue],
        argument: &RevealedArgument,
        states: &[Vec<CommittedValue>],
    ) -> Result<Refutation, Self::Error>;
}

/// Errors of the [`SimulatedTrace`].
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The trace could not be addressed.
    #[error("bisection: {0}")]
    Bisection(#[from] BisectionError),

    /// A round revealed the wrong number of states.
    #[error("expected {expected} states, got {got}")]
    WrongStateCount {
        /// States per round.
        expected: usize,

        /// States received.
        got: usize,
    },

    /// The argument agrees with the trace.
    #[error("argument for instruction {0} is consistent with the trace")]
    NothingToRefute(u64),
}

/// A synthetic trace whose states are hashes of a seed and the line number.
///
/// Two simulated traces with the same seed agree everywhere, except that a trace with
/// `faulty_from` set reports different states from that line on. This is enough to drive a
/// complete dispute between a dishonest prover and an honest verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedTrace {
    /// Seed shared by both parties.
    pub seed: String,

    /// Length of the trace.
    pub instruction_count: u64,

    /// The proof the trace belongs to.
    pub proof: Vec<CommittedValue>,

    /// Whether the proof verifies.
    pub proof_valid: bool,

    /// First line whose state is wrong, if any.
    #[serde(default)]
    pub faulty_from: Option<u64>,
}

impl SimulatedTrace {
    fn derive(&self, tag: &[u8], line: u64, idx: usize) -> CommittedValue {
        let mut engine = sha256::Hash::engine();
        engine.input(self.seed.as_bytes());
        engine.input(tag);
        engine.input(&line.to_be_bytes());
        engine.input(&(idx as u64).to_be_bytes());
        if self.faulty_from.is_some_and(|from| line >= from) {
            engine.input(b"faulty");
        }

        CommittedValue::from_be_bytes(sha256::Hash::from_engine(engine).to_byte_array())
    }

    /// The state root after executing `line` instructions.
    pub fn state_root(&self, line: u64) -> CommittedValue {
        self.derive(b"state", line, 0)
    }

    fn bisection(&self) -> Result<Bisection, SimulationError> {
        Ok(Bisection::new(self.instruction_count)?)
    }

    fn argument_at(&self, leaf: u64) -> ArgumentData {
        let mut operands = [CommittedValue::ZERO; ARGUMENT_OPERANDS];
        operands[0] = self.state_root(leaf);
        operands[1] = self.state_root(leaf + 1);
        for (idx, operand) in operands.iter_mut().enumerate().skip(2) {
            *operand = self.derive(b"operand", leaf, idx);
        }

        ArgumentData {
            operands,
            merkle_proofs: std::array::from_fn(|p| {
                std::array::from_fn(|h| self.derive(b"merkle", leaf, p * MERKLE_PROOF_HASHES + h))
            }),
            tail: std::array::from_fn(|idx| self.derive(b"tail", leaf, idx)),
        }
    }
}

#[async_trait]
impl TraceOracle for SimulatedTrace {
    type Error = SimulationError;

    fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    async fn proof(&self) -> Result<Vec<CommittedValue>, Self::Error> {
        Ok(self.proof.clone())
    }

    async fn check_proof(&self, proof: &[CommittedValue]) -> Result<bool, Self::Error> {
        Ok(self.proof_valid && proof == self.proof.as_slice())
    }

    async fn state_roots(
        &self,
        _proof: &[CommittedValue],
        lines: &[u64],
    ) -> Result<Vec<CommittedValue>, Self::Error> {
        Ok(lines.iter().map(|line| self.state_root(*line)).collect())
    }

    async fn find_error_selection(
        &self,
        _proof: &[CommittedValue],
        states: &[CommittedValue],
        path: &[u8],
    ) -> Result<u8, Self::Error> {
        if states.len() != BOUNDARIES_PER_ROUND {
            return Err(SimulationError::WrongStateCount {
                expected: BOUNDARIES_PER_ROUND,
                got: states.len(),
            });
        }

        let lines = self.bisection()?.boundaries_for_path(path)?;
        let selection = lines
            .iter()
            .zip(states)
            .position(|(line, state)| self.state_root(*line) != *state)
            .unwrap_or(BOUNDARIES_PER_ROUND);

        Ok(selection as u8)
    }

    async fn argument(
        &self,
        _proof: &[CommittedValue],
        path: &[u8],
    ) -> Result<ArgumentData, Self::Error> {
        let leaf = self.bisection()?.leaf_index(path)?;
        Ok(self.argument_at(leaf))
    }

    async fn refute(
        &self,
        _proof: &[CommittedValue],
        argument: &RevealedArgument,
        _states: &[Vec<CommittedValue>],
    ) -> Result<Refutation, Self::Error> {
        let leaf = argument.leaf_index;
        let expected = self.argument_at(leaf);
        let Some(idx) = argument
            .data
            .operands
            .iter()
            .zip(&expected.operands)
            .position(|(got, want)| got != want)
        else {
            return Err(SimulationError::NothingToRefute(leaf));
        };

        let want = expected.operands[idx].to_be_bytes();
        let script = Builder::new()
            .push_int(leaf as i64)
            .push_opcode(OP_DROP)
            .push_slice(want)
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_DROP)
            .push_opcode(OP_PUSHNUM_1)
            .into_script();

        Ok(Refutation {
            script,
            witness: vec![argument.data.operands[idx].to_be_bytes().to_vec()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(faulty_from: Option<u64>) -> SimulatedTrace {
        SimulatedTrace {
            seed: "seed".to_string(),
            instruction_count: 1_000,
            proof: vec![CommittedValue::from(7u64)],
            proof_valid: faulty_from.is_none(),
            faulty_from,
        }
    }

    #[tokio::test]
    async fn test_selection_converges_on_the_faulty_step() {
        let honest = trace(None);
        let faulty = trace(Some(427));

        let mut path = Vec::new();
        for _ in 0..3 {
            let lines = honest.bisection().unwrap().boundaries_for_path(&path).unwrap();
            let states = faulty.state_roots(&[], &lines).await.unwrap();
            path.push(honest.find_error_selection(&[], &states, &path).await.unwrap());
        }
        assert_eq!(path, vec![4, 2, 6]);

        let leaf = honest.bisection().unwrap().leaf_index(&path).unwrap();
        assert_eq!(leaf, 426);

        let argument = RevealedArgument {
            path: path.clone(),
            leaf_index: leaf,
            data: faulty.argument(&[], &path).await.unwrap(),
        };
        let refutation = honest.refute(&[], &argument, &[]).await.unwrap();
        assert_eq!(
            refutation.witness,
            vec![faulty.state_root(427).to_be_bytes().to_vec()]
        );

        let honest_argument = RevealedArgument {
            data: honest.argument(&[], &path).await.unwrap(),
            ..argument
        };
        assert!(matches!(
            honest.refute(&[], &honest_argument, &[]).await,
            Err(SimulationError::NothingToRefute(426))
        ));
    }

    #[tokio::test]
    async fn test_check_proof() {
        let seven = [CommittedValue::from(7u64)];
        let eight = [CommittedValue::from(8u64)];
        assert!(trace(None).check_proof(&seven).await.unwrap());
        assert!(!trace(None).check_proof(&eight).await.unwrap());
        assert!(!trace(Some(1)).check_proof(&seven).await.unwrap());
    }
}
