//! The dispute state machine.
//!
//! The state of a dispute is never stored. Every tick it is rebuilt from the graph and the
//! confirmed transactions of the setup, replayed in template order. Earlier entries only feed the
//! reconstruction (the proof, the revealed states, the selection path); the last entry is the one
//! the party may have to answer, and the answer is returned as a [`DisputeDuty`].

use dispute_db::tracker::ConfirmedTx;
use dispute_params::DisputeParams;
use dispute_primitives::{
    bisection::RADIX,
    template_name::TemplateName,
    types::{BitcoinBlockHeight, Outcome, Role},
};
use dispute_tx_graph::{
    commitments::{decode_input, parse_elements},
    Template, TemplateSet,
};
use serde::{Deserialize, Serialize};
use tracing::trace;
use wots::{ChainElement, CommittedValue, WotsType};

use crate::{errors::TransitionErr, oracle::{ArgumentData, RevealedArgument}};

/// Where a dispute stands, as far as the confirmed transactions tell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeState {
    /// Nothing confirmed yet.
    AwaitingProof,

    /// The proof is on chain and unchallenged.
    ProofPosted {
        /// The decoded proof.
        proof: Vec<CommittedValue>,
    },

    /// The verifier challenged the proof.
    Challenged {
        /// The decoded proof.
        proof: Vec<CommittedValue>,
    },

    /// Bisection rounds are under way.
    InRound {
        /// Digits selected so far.
        path: Vec<u8>,

        /// The decoded proof.
        proof: Vec<CommittedValue>,
    },

    /// The prover revealed the disputed instruction.
    ArgumentPosted {
        /// The full selection path.
        path: Vec<u8>,

        /// The decoded proof.
        proof: Vec<CommittedValue>,
    },

    /// The dispute is over.
    Resolved(Outcome),
}

/// What a party has to do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeDuty {
    /// Publish the proof to request the locked funds.
    PublishProof,

    /// Check the proof and challenge it if it does not verify.
    VerifyProof {
        /// The decoded proof.
        proof: Vec<CommittedValue>,
    },

    /// Reveal the states at the boundaries of the range selected by `path`.
    PublishState {
        /// Round of the state template.
        round: u8,

        /// The decoded proof.
        proof: Vec<CommittedValue>,

        /// Digits selected so far.
        path: Vec<u8>,
    },

    /// Select the sub-range containing the first wrong state.
    PublishSelect {
        /// Round of the select template.
        round: u8,

        /// The decoded proof.
        proof: Vec<CommittedValue>,

        /// The states revealed for this round.
        states: Vec<CommittedValue>,

        /// Digits selected before this round.
        path: Vec<u8>,
    },

    /// Reveal the instruction the full selection path points at.
    PublishArgument {
        /// The decoded proof.
        proof: Vec<CommittedValue>,

        /// The full selection path.
        path: Vec<u8>,

        /// The chain elements each select revealed, replayed by the argument.
        selections: Vec<Vec<ChainElement>>,
    },

    /// Show the argument to be wrong.
    RefuteArgument {
        /// The decoded proof.
        proof: Vec<CommittedValue>,

        /// The states revealed in every round.
        states: Vec<Vec<CommittedValue>>,

        /// The decoded argument.
        argument: RevealedArgument,
    },

    /// Claim a timeout.
    PublishUncontested(TemplateName),
}

impl DisputeDuty {
    /// The template the duty ends up publishing, if known before the duty runs.
    pub const fn template(&self) -> Option<TemplateName> {
        match self {
            DisputeDuty::PublishProof => Some(TemplateName::Proof),
            DisputeDuty::VerifyProof { .. } => None,
            DisputeDuty::PublishState { round, .. } => Some(TemplateName::State(*round)),
            DisputeDuty::PublishSelect { round, .. } => Some(TemplateName::Select(*round)),
            DisputeDuty::PublishArgument { .. } => Some(TemplateName::Argument),
            DisputeDuty::RefuteArgument { .. } => Some(TemplateName::ProofRefuted),
            DisputeDuty::PublishUncontested(name) => Some(*name),
        }
    }
}

/// The result of a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// The reconstructed state.
    pub state: DisputeState,

    /// What to do about it, if anything.
    pub duty: Option<DisputeDuty>,
}

/// Replays the confirmed transactions of one setup from one party's point of view.
#[derive(Debug, Clone, Copy)]
pub struct DisputeStateMachine<'a> {
    role: Role,
    set: &'a TemplateSet,
    params: &'a DisputeParams,
}

/// Everything revealed by the replayed entries.
#[derive(Debug, Default)]
struct Revealed {
    proof: Vec<CommittedValue>,
    path: Vec<u8>,
    states: Vec<Vec<CommittedValue>>,
    selections: Vec<Vec<ChainElement>>,
}

impl<'a> DisputeStateMachine<'a> {
    /// Creates a state machine for `role` over a keyed graph.
    pub const fn new(role: Role, set: &'a TemplateSet, params: &'a DisputeParams) -> Self {
        Self { role, set, params }
    }

    /// Rebuilds the state from `log` and decides the next duty at chain height `height`.
    ///
    /// The order of `log` does not matter.
    pub fn replay(
        &self,
        log: &[ConfirmedTx],
        height: BitcoinBlockHeight,
    ) -> Result<Decision, TransitionErr> {
        let mut entries = log
            .iter()
            .map(|entry| {
                let template = self
                    .set
                    .by_name(entry.name)
                    .map_err(|_| TransitionErr::UnknownTemplate(entry.name))?;
                Ok((template, entry))
            })
            .collect::<Result<Vec<_>, TransitionErr>>()?;
        entries.sort_by_key(|(template, _)| template.ordinal);

        let Some(last) = entries.len().checked_sub(1) else {
            let duty = (self.role == Role::Prover).then_some(DisputeDuty::PublishProof);
            return Ok(Decision {
                state: DisputeState::AwaitingProof,
                duty,
            });
        };

        let mut revealed = Revealed::default();
        let mut state = DisputeState::AwaitingProof;
        let mut duty = None;

        for (idx, (template, entry)) in entries.iter().enumerate() {
            let is_last = idx == last;
            trace!(template = %entry.name, %is_last, "replaying");

            match entry.name {
                TemplateName::LockedFunds | TemplateName::ProverStake => {}

                TemplateName::Proof => {
                    revealed.proof = self.decode(template, entry, 0)?;
                    state = DisputeState::ProofPosted {
                        proof: revealed.proof.clone(),
                    };
                    if is_last {
                        duty = match self.role {
                            Role::Prover => self
                                .timeout_elapsed(template, entry, height)
                                .then_some(DisputeDuty::PublishUncontested(
                                    TemplateName::ProofUncontested,
                                )),
                            Role::Verifier => Some(DisputeDuty::VerifyProof {
                                proof: revealed.proof.clone(),
                            }),
                        };
                    }
                }

                TemplateName::Challenge => {
                    state = DisputeState::Challenged {
                        proof: revealed.proof.clone(),
                    };
                    if is_last {
                        duty = match self.role {
                            Role::Prover => Some(DisputeDuty::PublishState {
                                round: 0,
                                proof: revealed.proof.clone(),
                                path: Vec::new(),
                            }),
                            Role::Verifier => self
                                .proof_timeout_elapsed(&entries, height)
                                .then_some(DisputeDuty::PublishUncontested(
                                    TemplateName::ChallengeUncontested,
                                )),
                        };
                    }
                }

                TemplateName::State(round) => {
                    let states = self.decode(template, entry, 0)?;
                    revealed.states.push(states.clone());
                    state = DisputeState::InRound {
                        path: revealed.path.clone(),
                        proof: revealed.proof.clone(),
                    };
                    if is_last {
                        duty = match self.role {
                            Role::Prover => self
                                .timeout_elapsed(template, entry, height)
                                .then_some(DisputeDuty::PublishUncontested(
                                    TemplateName::StateUncontested(round),
                                )),
                            Role::Verifier => Some(DisputeDuty::PublishSelect {
                                round,
                                proof: revealed.proof.clone(),
                                states,
                                path: revealed.path.clone(),
                            }),
                        };
                    }
                }

                TemplateName::Select(round) => {
                    let digit = self.decode_selection(template, entry)?;
                    revealed.path.push(digit);
                    revealed.selections.push(parse_elements(
                        template.name,
                        0,
                        &witness(template, entry, 0)?,
                        WotsType::Wots24.total_digits(),
                    )
                    .map_err(|source| TransitionErr::Decode {
                        template: template.name,
                        source,
                    })?);
                    state = DisputeState::InRound {
                        path: revealed.path.clone(),
                        proof: revealed.proof.clone(),
                    };
                    if is_last {
                        duty = match self.role {
                            Role::Prover => Some(self.after_selection(&revealed)),
                            Role::Verifier => self
                                .timeout_elapsed(template, entry, height)
                                .then_some(DisputeDuty::PublishUncontested(
                                    TemplateName::SelectUncontested(round),
                                )),
                        };
                    }
                }

                TemplateName::Argument => {
                    let argument = self.decode_argument(template, entry)?;
                    state = DisputeState::ArgumentPosted {
                        path: revealed.path.clone(),
                        proof: revealed.proof.clone(),
                    };
                    if is_last {
                        duty = match self.role {
                            Role::Prover => self
                                .timeout_elapsed(template, entry, height)
                                .then_some(DisputeDuty::PublishUncontested(
                                    TemplateName::ArgumentUncontested,
                                )),
                            Role::Verifier => Some(DisputeDuty::RefuteArgument {
                                proof: revealed.proof.clone(),
                                states: revealed.states.clone(),
                                argument,
                            }),
                        };
                    }
                }

                TemplateName::ProofUncontested
                | TemplateName::ArgumentUncontested
                | TemplateName::StateUncontested(_) => {
                    return Ok(resolved(Outcome::PegoutSuccessful));
                }

                TemplateName::ChallengeUncontested
                | TemplateName::SelectUncontested(_)
                | TemplateName::ProofRefuted => {
                    return Ok(resolved(Outcome::PegoutFailed));
                }
            }
        }

        Ok(Decision { state, duty })
    }

    /// The prover's answer to a selection: the next round's states, or the argument once every
    /// round is done.
    fn after_selection(&self, revealed: &Revealed) -> DisputeDuty {
        let len = revealed.path.len();
        if len < self.params.iterations as usize {
            DisputeDuty::PublishState {
                round: len as u8,
                proof: revealed.proof.clone(),
                path: revealed.path.clone(),
            }
        } else {
            DisputeDuty::PublishArgument {
                proof: revealed.proof.clone(),
                path: revealed.path.clone(),
                selections: revealed.selections.clone(),
            }
        }
    }

    /// Whether a timeout condition of `template` usable by this role has run out.
    ///
    /// Templates without such a condition never time out.
    fn timeout_elapsed(
        &self,
        template: &Template,
        entry: &ConfirmedTx,
        height: BitcoinBlockHeight,
    ) -> bool {
        template.conditions().any(|(_, _, cond)| {
            cond.next_role == self.role
                && cond
                    .timeout_blocks
                    .is_some_and(|t| height >= entry.height + u64::from(t))
        })
    }

    /// Whether the verifier's timeout on the proof has run out.
    fn proof_timeout_elapsed(
        &self,
        entries: &[(&Template, &ConfirmedTx)],
        height: BitcoinBlockHeight,
    ) -> bool {
        entries
            .iter()
            .find(|(template, _)| template.name == TemplateName::Proof)
            .is_some_and(|(template, entry)| self.timeout_elapsed(template, entry, height))
    }

    fn decode(
        &self,
        template: &Template,
        entry: &ConfirmedTx,
        input: usize,
    ) -> Result<Vec<CommittedValue>, TransitionErr> {
        decode_input(self.set, template, input, &witness(template, entry, input)?).map_err(
            |source| TransitionErr::Decode {
                template: template.name,
                source,
            },
        )
    }

    fn decode_selection(
        &self,
        template: &Template,
        entry: &ConfirmedTx,
    ) -> Result<u8, TransitionErr> {
        let values = self.decode(template, entry, 0)?;
        let value = values.first().copied().unwrap_or_default();
        to_digit(value).ok_or_else(|| TransitionErr::InvalidSelection {
            template: template.name,
            value: value.to_string(),
        })
    }

    fn decode_argument(
        &self,
        template: &Template,
        entry: &ConfirmedTx,
    ) -> Result<RevealedArgument, TransitionErr> {
        let iterations = self.params.iterations as usize;

        let mut decoded = (0..template.inputs.len())
            .map(|input| self.decode(template, entry, input))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();

        let selection = decoded
            .next()
            .filter(|values| values.len() == iterations + 1)
            .ok_or_else(|| TransitionErr::MalformedArgument("missing selection path".to_string()))?;
        let path = selection[..iterations]
            .iter()
            .map(|value| {
                to_digit(*value).ok_or_else(|| TransitionErr::InvalidSelection {
                    template: template.name,
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let leaf_index = selection[iterations]
            .to_u64()
            .ok_or_else(|| TransitionErr::MalformedArgument("leaf index too large".to_string()))?;

        let mut take = |what: &str| {
            decoded
                .next()
                .ok_or_else(|| TransitionErr::MalformedArgument(format!("missing {what}")))
        };
        let operands = take("operands")?;
        let proofs = [take("merkle proof")?, take("merkle proof")?, take("merkle proof")?];
        let tail = take("tail")?;

        let shape = |what: &str| TransitionErr::MalformedArgument(format!("wrong number of {what}"));
        let [p0, p1, p2] = proofs;
        let data = ArgumentData {
            operands: operands.try_into().map_err(|_| shape("operands"))?,
            merkle_proofs: [
                p0.try_into().map_err(|_| shape("proof hashes"))?,
                p1.try_into().map_err(|_| shape("proof hashes"))?,
                p2.try_into().map_err(|_| shape("proof hashes"))?,
            ],
            tail: tail.try_into().map_err(|_| shape("tail values"))?,
        };

        Ok(RevealedArgument {
            path,
            leaf_index,
            data,
        })
    }
}

fn resolved(outcome: Outcome) -> Decision {
    Decision {
        state: DisputeState::Resolved(outcome),
        duty: None,
    }
}

fn to_digit(value: CommittedValue) -> Option<u8> {
    value
        .to_u64()
        .filter(|digit| *digit < RADIX)
        .map(|digit| digit as u8)
}

fn witness(
    template: &Template,
    entry: &ConfirmedTx,
    input: usize,
) -> Result<Vec<Vec<u8>>, TransitionErr> {
    entry
        .tx
        .input
        .get(input)
        .map(|txin| txin.witness.to_vec())
        .ok_or(TransitionErr::MissingInput {
            template: template.name,
            input,
        })
}

#[cfg(test)]
mod tests {
    use dispute_primitives::types::Role;
    use dispute_tx_graph::commitments::{to_witness_items, ConditionSlot};
    use proptest::prelude::*;

    use super::*;
    use crate::test_utils::{confirm, keyed_graph, reveal, secret, setup_id};

    fn proof() -> Vec<CommittedValue> {
        (1..=8u64).map(CommittedValue::from).collect()
    }

    fn states(round: u8) -> Vec<CommittedValue> {
        (0..9u64)
            .map(|idx| CommittedValue::from(u64::from(round) * 100 + idx))
            .collect()
    }

    /// A dispute log built one confirmation per block.
    struct Log {
        set: TemplateSet,
        params: DisputeParams,
        entries: Vec<ConfirmedTx>,
        height: BitcoinBlockHeight,
    }

    impl Log {
        fn new(iterations: u8) -> Self {
            let (set, params) = keyed_graph(iterations);
            Self {
                set,
                params,
                entries: vec![],
                height: 100,
            }
        }

        fn push_witness(&mut self, name: TemplateName, witness: Vec<Vec<Vec<u8>>>) -> &mut Self {
            self.height += 1;
            self.entries
                .push(confirm(&self.set, name, witness, self.height));
            self
        }

        fn push(&mut self, name: TemplateName, role: Role, values: &[Vec<CommittedValue>]) -> &mut Self {
            let witness = reveal(&self.set, role, name, values);
            self.push_witness(name, witness)
        }

        /// Proof, challenge, then a state and a select per digit.
        fn rounds(&mut self, digits: &[u8]) -> &mut Self {
            self.push(TemplateName::Proof, Role::Prover, &[proof()]);
            self.push(TemplateName::Challenge, Role::Verifier, &[]);
            for (round, digit) in digits.iter().enumerate() {
                let round = round as u8;
                self.push(TemplateName::State(round), Role::Prover, &[states(round)]);
                self.push(
                    TemplateName::Select(round),
                    Role::Verifier,
                    &[vec![CommittedValue::from(u64::from(*digit))]],
                );
            }
            self
        }

        fn argument_witness(&self, leaf: u64, data: &ArgumentData) -> Vec<Vec<Vec<u8>>> {
            let iterations = self.params.iterations;
            let last_select = TemplateName::Select(iterations - 1);

            let mut path_items: Vec<Vec<u8>> = self
                .entries
                .iter()
                .filter(|e| matches!(e.name, TemplateName::Select(_)))
                .flat_map(|e| e.tx.input[0].witness.to_vec())
                .collect();
            let leaf_elements = secret(Role::Prover)
                .encode(
                    WotsType::Wots24,
                    &CommittedValue::from(leaf),
                    &ConditionSlot::new(last_select, 0, 0)
                        .commitment_id(&setup_id(), iterations as usize),
                )
                .unwrap();
            path_items.extend(to_witness_items(&leaf_elements));

            let mut values = vec![vec![], data.operands.to_vec()];
            values.extend(data.merkle_proofs.iter().map(|p| p.to_vec()));
            values.push(data.tail.to_vec());

            let mut witness = reveal(&self.set, Role::Prover, TemplateName::Argument, &values);
            witness[0] = path_items;
            witness
        }

        fn replay(&self, role: Role, height: BitcoinBlockHeight) -> Result<Decision, TransitionErr> {
            DisputeStateMachine::new(role, &self.set, &self.params).replay(&self.entries, height)
        }
    }

    fn argument_data() -> ArgumentData {
        ArgumentData {
            operands: std::array::from_fn(|idx| CommittedValue::from(1_000 + idx as u64)),
            merkle_proofs: std::array::from_fn(|p| {
                std::array::from_fn(|h| CommittedValue::from((p * 100 + h) as u64))
            }),
            tail: std::array::from_fn(|idx| CommittedValue::from(2_000 + idx as u64)),
        }
    }

    #[test]
    fn test_empty_log() {
        let log = Log::new(2);

        let prover = log.replay(Role::Prover, 0).unwrap();
        assert_eq!(prover.state, DisputeState::AwaitingProof);
        assert_eq!(prover.duty, Some(DisputeDuty::PublishProof));

        let verifier = log.replay(Role::Verifier, 0).unwrap();
        assert_eq!(verifier.duty, None);
    }

    #[test]
    fn test_proof_is_verified_or_claimed() {
        let mut log = Log::new(2);
        log.push(TemplateName::Proof, Role::Prover, &[proof()]);
        let confirmed_at = log.height;
        let small = u64::from(log.params.small_timeout_blocks);

        let verifier = log.replay(Role::Verifier, confirmed_at).unwrap();
        assert_eq!(verifier.state, DisputeState::ProofPosted { proof: proof() });
        assert_eq!(verifier.duty, Some(DisputeDuty::VerifyProof { proof: proof() }));

        assert_eq!(log.replay(Role::Prover, confirmed_at + small - 1).unwrap().duty, None);
        assert_eq!(
            log.replay(Role::Prover, confirmed_at + small).unwrap().duty,
            Some(DisputeDuty::PublishUncontested(TemplateName::ProofUncontested))
        );
    }

    #[test]
    fn test_challenge_starts_the_first_round() {
        let mut log = Log::new(2);
        log.push(TemplateName::Proof, Role::Prover, &[proof()])
            .push(TemplateName::Challenge, Role::Verifier, &[]);
        let proof_height = log.entries[0].height;
        let large = u64::from(log.params.large_timeout_blocks);

        assert_eq!(
            log.replay(Role::Prover, log.height).unwrap().duty,
            Some(DisputeDuty::PublishState {
                round: 0,
                proof: proof(),
                path: vec![],
            })
        );

        // the verifier's claim runs from the proof, not the challenge
        assert_eq!(log.replay(Role::Verifier, proof_height + large - 1).unwrap().duty, None);
        assert_eq!(
            log.replay(Role::Verifier, proof_height + large).unwrap().duty,
            Some(DisputeDuty::PublishUncontested(TemplateName::ChallengeUncontested))
        );
    }

    #[test]
    fn test_selection_leads_to_next_state() {
        let mut log = Log::new(6);
        log.rounds(&[4, 0, 7]);

        let decision = log.replay(Role::Prover, log.height).unwrap();
        assert_eq!(
            decision.state,
            DisputeState::InRound {
                path: vec![4, 0, 7],
                proof: proof(),
            }
        );
        assert_eq!(
            decision.duty,
            Some(DisputeDuty::PublishState {
                round: 3,
                proof: proof(),
                path: vec![4, 0, 7],
            })
        );
    }

    #[test]
    fn test_state_is_selected_or_claimed() {
        let mut log = Log::new(6);
        log.rounds(&[]);
        log.push(TemplateName::State(0), Role::Prover, &[states(0)]);
        let confirmed_at = log.height;
        let small = u64::from(log.params.small_timeout_blocks);

        assert_eq!(
            log.replay(Role::Verifier, confirmed_at).unwrap().duty,
            Some(DisputeDuty::PublishSelect {
                round: 0,
                proof: proof(),
                states: states(0),
                path: vec![],
            })
        );

        assert_eq!(log.replay(Role::Prover, confirmed_at).unwrap().duty, None);
        assert_eq!(log.replay(Role::Prover, confirmed_at + small - 1).unwrap().duty, None);
        assert_eq!(
            log.replay(Role::Prover, confirmed_at + small).unwrap().duty,
            Some(DisputeDuty::PublishUncontested(TemplateName::StateUncontested(0)))
        );
    }

    #[test]
    fn test_last_selection_leads_to_argument() {
        let mut log = Log::new(2);
        log.rounds(&[3, 9]);

        let decision = log.replay(Role::Prover, log.height).unwrap();
        let Some(DisputeDuty::PublishArgument {
            proof: revealed,
            path,
            selections,
        }) = decision.duty
        else {
            panic!("expected an argument, got {:?}", decision.duty);
        };
        assert_eq!(revealed, proof());
        assert_eq!(path, vec![3, 9]);
        assert_eq!(selections.len(), 2);
        assert!(selections
            .iter()
            .all(|s| s.len() == WotsType::Wots24.total_digits()));

        let small = u64::from(log.params.small_timeout_blocks);
        assert_eq!(
            log.replay(Role::Verifier, log.height + small).unwrap().duty,
            Some(DisputeDuty::PublishUncontested(TemplateName::SelectUncontested(1)))
        );
    }

    #[test]
    fn test_argument_is_decoded_for_refutation() {
        let mut log = Log::new(2);
        log.rounds(&[3, 9]);
        let witness = log.argument_witness(42, &argument_data());
        log.push_witness(TemplateName::Argument, witness);

        let decision = log.replay(Role::Verifier, log.height).unwrap();
        assert_eq!(
            decision.state,
            DisputeState::ArgumentPosted {
                path: vec![3, 9],
                proof: proof(),
            }
        );
        assert_eq!(
            decision.duty,
            Some(DisputeDuty::RefuteArgument {
                proof: proof(),
                states: vec![states(0), states(1)],
                argument: RevealedArgument {
                    path: vec![3, 9],
                    leaf_index: 42,
                    data: argument_data(),
                },
            })
        );

        let small = u64::from(log.params.small_timeout_blocks);
        assert_eq!(
            log.replay(Role::Prover, log.height + small).unwrap().duty,
            Some(DisputeDuty::PublishUncontested(TemplateName::ArgumentUncontested))
        );
    }

    #[test]
    fn test_terminal_templates_resolve() {
        let cases = [
            (TemplateName::ProofUncontested, Outcome::PegoutSuccessful),
            (TemplateName::ChallengeUncontested, Outcome::PegoutFailed),
            (TemplateName::StateUncontested(0), Outcome::PegoutSuccessful),
            (TemplateName::SelectUncontested(0), Outcome::PegoutFailed),
        ];

        for (name, outcome) in cases {
            let mut log = Log::new(2);
            log.rounds(&[1]);
            log.push(name, Role::Prover, &[]);

            for role in [Role::Prover, Role::Verifier] {
                let decision = log.replay(role, log.height + 1_000).unwrap();
                assert_eq!(decision.state, DisputeState::Resolved(outcome), "{name}");
                assert_eq!(decision.duty, None);
            }
        }

        let mut log = Log::new(1);
        log.rounds(&[5]);
        let witness = log.argument_witness(7, &argument_data());
        log.push_witness(TemplateName::Argument, witness);
        log.push(TemplateName::ProofRefuted, Role::Verifier, &[]);
        assert_eq!(
            log.replay(Role::Prover, log.height).unwrap().state,
            DisputeState::Resolved(Outcome::PegoutFailed)
        );
    }

    #[test]
    fn test_invalid_selection_is_rejected() {
        let mut log = Log::new(2);
        log.rounds(&[]);
        log.push(TemplateName::State(0), Role::Prover, &[states(0)]);
        log.push(
            TemplateName::Select(0),
            Role::Verifier,
            &[vec![CommittedValue::from(12u64)]],
        );

        assert!(matches!(
            log.replay(Role::Prover, log.height),
            Err(TransitionErr::InvalidSelection { .. })
        ));
    }

    #[test]
    fn test_foreign_witness_fails_to_decode() {
        let mut log = Log::new(2);
        // the verifier cannot reveal the prover's proof
        log.push(TemplateName::Proof, Role::Verifier, &[proof()]);

        assert!(matches!(
            log.replay(Role::Verifier, log.height),
            Err(TransitionErr::Decode { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn proptest_replay_ignores_log_order(
            order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let mut log = Log::new(3);
            log.rounds(&[2, 8]);
            let height = log.height;
            let expected = log.replay(Role::Prover, height).unwrap();

            log.entries = order.iter().map(|idx| log.entries[*idx].clone()).collect();

            prop_assert_eq!(log.replay(Role::Prover, height).unwrap(), expected);
        }
    }
}
