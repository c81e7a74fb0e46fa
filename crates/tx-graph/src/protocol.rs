//! The fixed shape of the dispute graph.
//!
//! Ordinals follow the order templates are added in: funding, proof, challenge and their timeouts,
//! then one state/select quadruple per round, then the argument and its two outcomes.

use std::collections::BTreeMap;

use dispute_params::DisputeParams;
use dispute_primitives::{
    bisection::BOUNDARIES_PER_ROUND,
    template_name::TemplateName,
    types::{Role, SignatureType},
};
use tracing::debug;
use wots::WotsType;

use crate::{
    errors::{TxGraphError, TxGraphResult},
    set::TemplateSet,
    template::{FundingUtxo, Input, Output, SpendRef, SpendingCondition, Template, TemplateIdx},
};

/// Number of 256-bit values committing to the proof.
pub const PROOF_VALUES: usize = 8;

/// Number of 256-bit operand values (a, b, c, d) committed by the argument.
pub const ARGUMENT_OPERANDS: usize = 4;

/// Number of Merkle proofs committed by the argument.
pub const ARGUMENT_MERKLE_PROOFS: usize = 3;

/// Number of hashes in each Merkle proof of the argument.
pub const MERKLE_PROOF_HASHES: usize = 12;

/// Number of trailing 256-bit values committed by the last output of the final select.
pub const ARGUMENT_TAIL_VALUES: usize = 3;

/// Number of outputs of the final select, all of which the argument spends.
pub const FINAL_SELECT_OUTPUTS: usize = 2 + ARGUMENT_MERKLE_PROOFS + 1;

/// Adds templates in ordinal order, resolving input references by name.
#[derive(Debug, Default)]
struct GraphBuilder {
    templates: Vec<Template>,
    by_name: BTreeMap<TemplateName, TemplateIdx>,
}

impl GraphBuilder {
    fn add(
        &mut self,
        name: TemplateName,
        inputs: &[(TemplateName, usize, usize)],
        outputs: Vec<Output>,
    ) -> TxGraphResult<&mut Template> {
        let ordinal = self.templates.len();
        let inputs = inputs
            .iter()
            .map(|(parent, output, condition)| {
                let template = *self.by_name.get(parent).ok_or_else(|| {
                    TxGraphError::GraphIntegrity(format!("{name} spends {parent} before it exists"))
                })?;
                Ok(Input::new(SpendRef {
                    template,
                    output: *output,
                    condition: *condition,
                }))
            })
            .collect::<TxGraphResult<Vec<_>>>()?;

        self.by_name.insert(name, ordinal);
        self.templates.push(Template {
            name,
            owner: name.owner(),
            ordinal,
            txid: None,
            funding: None,
            unknown_txid: false,
            fundable: false,
            inputs,
            outputs,
        });

        let last = self.templates.len() - 1;
        Ok(&mut self.templates[last])
    }

    fn finish(self) -> TxGraphResult<TemplateSet> {
        TemplateSet::from_templates(self.templates)
    }
}

fn cond(next_role: Role, signature_type: SignatureType) -> SpendingCondition {
    SpendingCondition::new(next_role, signature_type)
}

fn single(condition: SpendingCondition) -> Output {
    Output::new(vec![condition])
}

/// Generates the unkeyed, unfunded templates of the dispute.
pub(crate) fn generate_templates(
    params: &DisputeParams,
    locked_funds: FundingUtxo,
    prover_stake: FundingUtxo,
) -> TxGraphResult<TemplateSet> {
    use SignatureType::{Both, Prover as ProverSig, Verifier as VerifierSig};
    use TemplateName::*;
    use WotsType::{Wots24, Wots256x4};

    let small = params.small_timeout_blocks;
    let large = params.large_timeout_blocks;
    let iterations = params.iterations;
    if iterations == 0 {
        return Err(TxGraphError::GraphIntegrity(
            "a dispute needs at least one round".to_string(),
        ));
    }
    let last_round = iterations - 1;

    let mut b = GraphBuilder::default();

    let t = b.add(
        LockedFunds,
        &[],
        vec![single(cond(Role::Prover, Both)).with_amount(locked_funds.amount)],
    )?;
    t.funding = Some(locked_funds);
    t.txid = Some(locked_funds.outpoint.txid);

    let t = b.add(
        ProverStake,
        &[],
        vec![single(
            cond(Role::Prover, Both).with_commitments([Wots256x4; PROOF_VALUES]),
        )
        .with_amount(prover_stake.amount)],
    )?;
    t.funding = Some(prover_stake);
    t.txid = Some(prover_stake.outpoint.txid);

    b.add(
        Proof,
        &[(ProverStake, 0, 0)],
        vec![
            Output::new(vec![
                cond(Role::Prover, Both).with_timeout(small),
                cond(Role::Prover, Both).with_commitments([Wots256x4; BOUNDARIES_PER_ROUND]),
                cond(Role::Verifier, Both).with_timeout(large),
            ]),
            single(cond(Role::Verifier, Both)).with_amount(params.symbolic_amount),
        ],
    )?;

    let t = b.add(
        Challenge,
        &[(Proof, 1, 0)],
        vec![single(cond(Role::Prover, ProverSig)).with_amount(params.verifier_payment_amount)],
    )?;
    t.unknown_txid = true;
    t.fundable = true;

    b.add(
        ProofUncontested,
        &[(LockedFunds, 0, 0), (Proof, 0, 0), (Proof, 1, 0)],
        vec![single(cond(Role::Prover, ProverSig))],
    )?;

    b.add(
        ChallengeUncontested,
        &[(Proof, 0, 2)],
        vec![single(cond(Role::Verifier, VerifierSig))],
    )?;

    for round in 0..iterations {
        let state_input = if round == 0 {
            (Proof, 0, 1)
        } else {
            (Select(round - 1), 0, 0)
        };

        b.add(
            State(round),
            &[state_input],
            vec![Output::new(vec![
                cond(Role::Verifier, Both).with_commitments([Wots24]),
                cond(Role::Prover, Both).with_timeout(small),
            ])],
        )?;

        b.add(
            StateUncontested(round),
            &[(State(round), 0, 1), (LockedFunds, 0, 0)],
            vec![single(cond(Role::Prover, ProverSig))],
        )?;

        let select_outputs = if round < last_round {
            vec![Output::new(vec![
                cond(Role::Prover, Both).with_commitments([Wots256x4; BOUNDARIES_PER_ROUND]),
                cond(Role::Verifier, Both).with_timeout(small),
            ])]
        } else {
            final_select_outputs(iterations, small)
        };
        b.add(Select(round), &[(State(round), 0, 0)], select_outputs)?;

        b.add(
            SelectUncontested(round),
            &[(Select(round), 0, 1)],
            vec![single(cond(Role::Verifier, VerifierSig))],
        )?;
    }

    let argument_inputs: Vec<_> = (0..FINAL_SELECT_OUTPUTS)
        .map(|output| (Select(last_round), output, 0))
        .collect();
    b.add(
        Argument,
        &argument_inputs,
        vec![Output::new(vec![
            cond(Role::Verifier, VerifierSig),
            cond(Role::Prover, Both).with_timeout(small),
        ])],
    )?;

    let t = b.add(
        ProofRefuted,
        &[(Argument, 0, 0)],
        vec![single(cond(Role::Verifier, VerifierSig))],
    )?;
    t.unknown_txid = true;

    b.add(
        ArgumentUncontested,
        &[(Argument, 0, 1), (LockedFunds, 0, 0)],
        vec![single(cond(Role::Prover, ProverSig))],
    )?;

    let set = b.finish()?;
    debug!(event = "generated dispute templates", templates = set.len(), %iterations);

    Ok(set)
}

/// Output and condition of the last select carrying the selection path and the leaf index.
pub(crate) const fn final_select_commitments() -> (usize, usize) {
    (0, 0)
}

/// Outputs of the last select: the full selection path plus the leaf index, then the operands,
/// the three Merkle proofs and the trailing values, all revealed by the argument.
fn final_select_outputs(iterations: u8, small_timeout: u16) -> Vec<Output> {
    use WotsType::{Wots24, Wots256x4};

    let mut outputs = vec![
        Output::new(vec![
            cond(Role::Prover, SignatureType::Both)
                .with_commitments(std::iter::repeat(Wots24).take(iterations as usize + 1)),
            cond(Role::Verifier, SignatureType::Both).with_timeout(small_timeout),
        ]),
        single(
            cond(Role::Prover, SignatureType::Both)
                .with_commitments([Wots256x4; ARGUMENT_OPERANDS]),
        ),
    ];
    for _ in 0..ARGUMENT_MERKLE_PROOFS {
        outputs.push(single(
            cond(Role::Prover, SignatureType::Both)
                .with_commitments([Wots256x4; MERKLE_PROOF_HASHES]),
        ));
    }
    outputs.push(single(
        cond(Role::Prover, SignatureType::Both).with_commitments([Wots256x4; ARGUMENT_TAIL_VALUES]),
    ));

    outputs
}

/// Attaches the signers' keys to every condition and copies each spent condition's timeout onto
/// the input as its relative timelock.
pub(crate) fn attach_keys_and_sequences(
    set: &mut TemplateSet,
    prover_key: secp256k1::XOnlyPublicKey,
    verifier_key: secp256k1::XOnlyPublicKey,
) {
    for template in set.iter_mut() {
        for (_, _, cond) in template.conditions_mut() {
            cond.signer_keys = cond
                .signature_type
                .signers()
                .iter()
                .map(|role| match role {
                    Role::Prover => prover_key,
                    Role::Verifier => verifier_key,
                })
                .collect();
        }
    }

    let timeouts: Vec<Vec<Option<u16>>> = set
        .iter()
        .map(|t| {
            t.inputs
                .iter()
                .map(|input| set.spent(input).2.timeout_blocks)
                .collect()
        })
        .collect();

    for (template, timeouts) in set.iter_mut().zip(timeouts) {
        for (input, timeout) in template.inputs.iter_mut().zip(timeouts) {
            input.sequence = timeout;
        }
    }
}
