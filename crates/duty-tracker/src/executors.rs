//! Contains execution logic for the duties emitted by the dispute state machine.
//!
//! Executing a duty means asking the trace oracle for whatever the duty reveals and encoding it as
//! the witness of the template to publish. Nothing is broadcast from here; the result is queued
//! as an [`OutgoingTx`].

use dispute_db::outgoing::OutgoingTx;
use dispute_params::DisputeParams;
use dispute_primitives::{
    bisection::{Bisection, BOUNDARIES_PER_ROUND, RADIX},
    template_name::TemplateName,
    types::{Role, SetupId},
};
use dispute_tx_graph::{
    commitments::{encode_values, spent_slot, to_witness_items},
    errors::TxGraphError,
    protocol::PROOF_VALUES,
    TemplateSet,
};
use tracing::{debug, info};
use wots::{ChainElement, CommitmentSecret, CommittedValue, WotsType};

use crate::{
    dispute_state_machine::DisputeDuty,
    errors::ExecutorErr,
    oracle::{ArgumentData, TraceOracle},
};

/// Turns duties into outgoing transactions for one party of one setup.
#[derive(Debug)]
pub struct DutyExecutor<O> {
    role: Role,
    setup_id: SetupId,
    secret: CommitmentSecret,
    oracle: O,
    params: DisputeParams,
}

impl<O: TraceOracle> DutyExecutor<O> {
    /// Creates an executor revealing commitments with `secret`.
    pub const fn new(
        role: Role,
        setup_id: SetupId,
        secret: CommitmentSecret,
        oracle: O,
        params: DisputeParams,
    ) -> Self {
        Self {
            role,
            setup_id,
            secret,
            oracle,
            params,
        }
    }

    /// The role the executor acts for.
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Executes `duty` against the keyed templates in `set`.
    ///
    /// Returns `None` when the duty needs no transaction, e.g. a proof that verifies.
    pub async fn execute(
        &self,
        set: &TemplateSet,
        duty: DisputeDuty,
    ) -> Result<Option<OutgoingTx>, ExecutorErr> {
        debug!(setup_id = %self.setup_id, role = %self.role, ?duty, "executing duty");

        let outgoing = match duty {
            DisputeDuty::PublishProof => {
                let proof = self.oracle.proof().await.map_err(oracle_err)?;
                if proof.len() != PROOF_VALUES {
                    return Err(ExecutorErr::InvalidOracleAnswer(format!(
                        "proof has {} values, expected {PROOF_VALUES}",
                        proof.len()
                    )));
                }

                info!(setup_id = %self.setup_id, "publishing proof");
                self.reveal(set, TemplateName::Proof, &[proof])?
            }

            DisputeDuty::VerifyProof { proof } => {
                if self.oracle.check_proof(&proof).await.map_err(oracle_err)? {
                    info!(setup_id = %self.setup_id, "proof verifies, not challenging");
                    return Ok(None);
                }

                info!(setup_id = %self.setup_id, "proof does not verify, challenging");
                self.reveal(set, TemplateName::Challenge, &[])?
            }

            DisputeDuty::PublishState { round, proof, path } => {
                let lines = self.bisection()?.boundaries_for_path(&path)?;
                let states = self
                    .oracle
                    .state_roots(&proof, &lines)
                    .await
                    .map_err(oracle_err)?;
                if states.len() != BOUNDARIES_PER_ROUND {
                    return Err(ExecutorErr::InvalidOracleAnswer(format!(
                        "{} state roots for {BOUNDARIES_PER_ROUND} boundaries",
                        states.len()
                    )));
                }

                info!(setup_id = %self.setup_id, %round, ?lines, "revealing states");
                self.reveal(set, TemplateName::State(round), &[states])?
            }

            DisputeDuty::PublishSelect {
                round,
                proof,
                states,
                path,
            } => {
                let selection = self
                    .oracle
                    .find_error_selection(&proof, &states, &path)
                    .await
                    .map_err(oracle_err)?;
                if u64::from(selection) >= RADIX {
                    return Err(ExecutorErr::InvalidOracleAnswer(format!(
                        "selection {selection} is not a digit"
                    )));
                }

                info!(setup_id = %self.setup_id, %round, %selection, "selecting");
                self.reveal(
                    set,
                    TemplateName::Select(round),
                    &[vec![CommittedValue::from(u64::from(selection))]],
                )?
            }

            DisputeDuty::PublishArgument {
                proof,
                path,
                selections,
            } => {
                let leaf = self.bisection()?.leaf_index(&path)?;
                let data = self
                    .oracle
                    .argument(&proof, &path)
                    .await
                    .map_err(oracle_err)?;

                info!(setup_id = %self.setup_id, ?path, %leaf, "publishing argument");
                self.argument(set, leaf, &selections, &data)?
            }

            DisputeDuty::RefuteArgument {
                proof,
                states,
                argument,
            } => {
                let refutation = self
                    .oracle
                    .refute(&proof, &argument, &states)
                    .await
                    .map_err(oracle_err)?;

                info!(setup_id = %self.setup_id, leaf = %argument.leaf_index, "refuting argument");
                OutgoingTx::ready(TemplateName::ProofRefuted, vec![refutation.witness])
                    .with_script(refutation.script)
            }

            DisputeDuty::PublishUncontested(name) => {
                info!(setup_id = %self.setup_id, template = %name, "claiming timeout");
                self.reveal(set, name, &[])?
            }
        };

        Ok(Some(outgoing))
    }

    fn bisection(&self) -> Result<Bisection, ExecutorErr> {
        let bisection = Bisection::new(self.oracle.instruction_count())?;
        if bisection.iterations() != self.params.iterations {
            return Err(ExecutorErr::TraceMismatch {
                trace: bisection.iterations(),
                graph: self.params.iterations,
            });
        }

        Ok(bisection)
    }

    fn encode_input(
        &self,
        set: &TemplateSet,
        name: TemplateName,
        idx: usize,
        values: &[CommittedValue],
    ) -> Result<Vec<ChainElement>, ExecutorErr> {
        let template = set.by_name(name)?;
        let input = template.inputs.get(idx).ok_or_else(|| {
            TxGraphError::GraphIntegrity(format!("{name} has no input {idx}"))
        })?;
        let (_, _, cond) = set.spent(input);

        Ok(encode_values(
            &self.secret,
            &self.setup_id,
            spent_slot(set, input),
            &cond.wots_spec,
            values,
        )?)
    }

    /// Builds the transaction for `name`, revealing `values[i]` on input `i`.
    ///
    /// Inputs past the end of `values` reveal nothing.
    fn reveal(
        &self,
        set: &TemplateSet,
        name: TemplateName,
        values: &[Vec<CommittedValue>],
    ) -> Result<OutgoingTx, ExecutorErr> {
        let inputs = set.by_name(name)?.inputs.len();
        let witness = (0..inputs)
            .map(|input| match values.get(input) {
                Some(values) => Ok(to_witness_items(&self.encode_input(set, name, input, values)?)),
                None => Ok(vec![]),
            })
            .collect::<Result<Vec<_>, ExecutorErr>>()?;

        Ok(OutgoingTx::ready(name, witness))
    }

    /// The argument replays the verifier's selections before the leaf index, then reveals the
    /// instruction data on the remaining inputs.
    fn argument(
        &self,
        set: &TemplateSet,
        leaf: u64,
        selections: &[Vec<ChainElement>],
        data: &ArgumentData,
    ) -> Result<OutgoingTx, ExecutorErr> {
        let template = set.by_name(TemplateName::Argument)?;
        let path_input = template.inputs.first().ok_or_else(|| {
            TxGraphError::GraphIntegrity(format!("{} has no inputs", template.name))
        })?;

        let iterations = self.params.iterations as usize;
        if selections.len() != iterations {
            return Err(TxGraphError::GraphIntegrity(format!(
                "{} selections for {iterations} rounds",
                selections.len()
            ))
            .into());
        }

        let mut path: Vec<ChainElement> = selections.concat();
        path.extend(self.secret.encode(
            WotsType::Wots24,
            &CommittedValue::from(leaf),
            &spent_slot(set, path_input).commitment_id(&self.setup_id, iterations),
        )?);

        let mut values = vec![data.operands.to_vec()];
        values.extend(data.merkle_proofs.iter().map(|hashes| hashes.to_vec()));
        values.push(data.tail.to_vec());

        let mut witness = vec![to_witness_items(&path)];
        for (idx, values) in values.iter().enumerate() {
            witness.push(to_witness_items(&self.encode_input(
                set,
                TemplateName::Argument,
                idx + 1,
                values,
            )?));
        }

        Ok(OutgoingTx::ready(TemplateName::Argument, witness))
    }
}

fn oracle_err<E: std::error::Error + Send + Sync + 'static>(err: E) -> ExecutorErr {
    ExecutorErr::Oracle(Box::new(err))
}

#[cfg(test)]
mod tests {
    use dispute_db::tracker::ConfirmedTx;
    use dispute_primitives::types::{BitcoinBlockHeight, Outcome};

    use super::*;
    use crate::{
        dispute_state_machine::{DisputeState, DisputeStateMachine},
        oracle::SimulatedTrace,
        test_utils::{confirm, keyed_graph, secret, setup_id},
    };

    fn trace(faulty_from: Option<u64>, proof_valid: bool) -> SimulatedTrace {
        SimulatedTrace {
            seed: "seed".to_string(),
            instruction_count: 1_000,
            proof: (1..=8u64).map(CommittedValue::from).collect(),
            proof_valid,
            faulty_from,
        }
    }

    struct Party {
        executor: DutyExecutor<SimulatedTrace>,
    }

    impl Party {
        fn new(role: Role, trace: SimulatedTrace, iterations: u8) -> Self {
            let params = DisputeParams::default().with_iterations(iterations);
            Self {
                executor: DutyExecutor::new(role, setup_id(), secret(role), trace, params),
            }
        }

        async fn step(
            &self,
            set: &TemplateSet,
            log: &[ConfirmedTx],
            height: BitcoinBlockHeight,
        ) -> (DisputeState, Option<OutgoingTx>) {
            let decision =
                DisputeStateMachine::new(self.executor.role, set, &self.executor.params)
                    .replay(log, height)
                    .unwrap();
            let outgoing = match decision.duty {
                Some(duty) => self.executor.execute(set, duty).await.unwrap(),
                None => None,
            };
            (decision.state, outgoing)
        }
    }

    #[tokio::test]
    async fn test_faulty_prover_is_refuted() {
        let (set, _) = keyed_graph(3);
        let prover = Party::new(Role::Prover, trace(Some(427), true), 3);
        let verifier = Party::new(Role::Verifier, trace(None, false), 3);

        let mut log: Vec<ConfirmedTx> = vec![];
        let mut published = vec![];
        let mut outcome = None;
        for height in 101..120 {
            for party in [&prover, &verifier] {
                let (state, outgoing) = party.step(&set, &log, height).await;
                if let DisputeState::Resolved(resolved) = state {
                    outcome = Some(resolved);
                }
                if let Some(tx) = outgoing {
                    published.push(tx.name);
                    log.push(confirm(&set, tx.name, tx.witness, height));
                }
            }
            if outcome.is_some() {
                break;
            }
        }

        assert_eq!(outcome, Some(Outcome::PegoutFailed), "{published:?}");
        assert_eq!(
            published,
            vec![
                TemplateName::Proof,
                TemplateName::Challenge,
                TemplateName::State(0),
                TemplateName::Select(0),
                TemplateName::State(1),
                TemplateName::Select(1),
                TemplateName::State(2),
                TemplateName::Select(2),
                TemplateName::Argument,
                TemplateName::ProofRefuted,
            ]
        );
    }

    #[tokio::test]
    async fn test_valid_proof_is_not_challenged() {
        let (set, _) = keyed_graph(3);
        let prover = Party::new(Role::Prover, trace(None, true), 3);
        let verifier = Party::new(Role::Verifier, trace(None, true), 3);

        let (_, proof) = prover.step(&set, &[], 100).await;
        let proof = proof.unwrap();
        assert_eq!(proof.name, TemplateName::Proof);

        let log = vec![confirm(&set, proof.name, proof.witness, 101)];
        let (state, outgoing) = verifier.step(&set, &log, 101).await;
        assert!(matches!(state, DisputeState::ProofPosted { .. }));
        assert_eq!(outgoing, None);

        let small = u64::from(DisputeParams::default().small_timeout_blocks);
        let (_, claim) = prover.step(&set, &log, 101 + small).await;
        let claim = claim.unwrap();
        assert_eq!(claim.name, TemplateName::ProofUncontested);
        assert_eq!(claim.witness, vec![Vec::<Vec<u8>>::new(); 3]);
    }

    #[tokio::test]
    async fn test_argument_fits_largest_round_count() {
        let iterations = dispute_params::default::MAX_ITERATIONS;
        let (set, params) = keyed_graph(iterations);
        params.validate().unwrap();

        let trace = SimulatedTrace {
            instruction_count: 10u64.pow(u32::from(iterations)),
            ..trace(Some(0), true)
        };
        let prover = Party::new(Role::Prover, trace.clone(), iterations);

        let verifier = secret(Role::Verifier);
        let selections = (0..iterations)
            .map(|round| {
                let select = set.by_name(TemplateName::Select(round)).unwrap();
                verifier
                    .encode(
                        WotsType::Wots24,
                        &CommittedValue::from(9u64),
                        &spent_slot(&set, &select.inputs[0]).commitment_id(&setup_id(), 0),
                    )
                    .unwrap()
            })
            .collect();

        let argument = prover
            .executor
            .execute(
                &set,
                DisputeDuty::PublishArgument {
                    proof: trace.proof.clone(),
                    path: vec![9; iterations as usize],
                    selections,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(argument.name, TemplateName::Argument);

        let template = set.by_name(TemplateName::Argument).unwrap();
        let revealed =
            dispute_tx_graph::commitments::decode_input(&set, template, 0, &argument.witness[0])
                .unwrap();
        let mut expected = vec![CommittedValue::from(9u64); iterations as usize];
        expected.push(CommittedValue::from(9_999_999u64));
        assert_eq!(revealed, expected);
    }

    #[tokio::test]
    async fn test_trace_must_match_graph_rounds() {
        let (set, _) = keyed_graph(4);
        let prover = Party::new(Role::Prover, trace(Some(1), true), 4);

        let err = prover
            .executor
            .execute(
                &set,
                DisputeDuty::PublishState {
                    round: 0,
                    proof: vec![],
                    path: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutorErr::TraceMismatch { trace: 3, graph: 4 }
        ));
    }
}
