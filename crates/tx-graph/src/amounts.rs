//! Output amounts and fees.
//!
//! Fees are charged on script bytes only, not on the serialized transaction size. Both parties
//! compute them the same way, which is all the pre-signed graph needs; tightening the estimate
//! changes every amount and therefore every signature.

use bitcoin::Amount;
use dispute_params::DisputeParams;
use tracing::{debug, trace};

use crate::{
    errors::{TxGraphError, TxGraphResult},
    set::TemplateSet,
    template::Template,
};

/// Size in fee units of a template: its script bytes over eight, rounded up.
pub fn fee_size(template: &Template) -> u64 {
    (template.script_size() as u64).div_ceil(8)
}

/// The fee a template has to leave.
///
/// One extra sat makes up for the flooring of the percentage.
pub fn required_fee(template: &Template, params: &DisputeParams) -> Amount {
    let fee = fee_size(template) * params.fee_per_byte * params.fee_factor_percent / 100;
    Amount::from_sat(fee + 1)
}

/// Sum of the amounts spent by `template`'s inputs.
fn input_value(set: &TemplateSet, template: &Template) -> TxGraphResult<Amount> {
    template.inputs.iter().try_fold(Amount::ZERO, |acc, input| {
        let (parent, output, _) = set.spent(input);
        let amount = output.amount.ok_or(TxGraphError::MissingAmount {
            template: parent.name,
            output: input.spends.output,
        })?;
        Ok(acc + amount)
    })
}

/// Sum of the amounts assigned to `template`'s outputs so far.
fn output_value(template: &Template) -> Amount {
    template.outputs.iter().filter_map(|o| o.amount).sum()
}

/// Fills in every unset output amount.
///
/// The first amountless output of a template receives what its inputs bring in minus the other
/// outputs and the fee; any further amountless outputs receive the symbolic amount. Inputs only
/// point at earlier ordinals, so walking the arena in order resolves every parent before its
/// children and touches each template once.
pub(crate) fn propagate_amounts(set: &mut TemplateSet, params: &DisputeParams) -> TxGraphResult<()> {
    for idx in 0..set.len() {
        let Some(template) = set.get(idx) else {
            break;
        };
        if template.is_external() || template.outputs.iter().all(|o| o.amount.is_some()) {
            continue;
        }

        let name = template.name;
        let fee = required_fee(template, params);
        let incoming = input_value(set, template)?;

        let Some(template) = set.get_mut(idx) else {
            break;
        };
        let mut amountless = template
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, o)| o.amount.is_none())
            .map(|(i, _)| i)
            .collect::<Vec<_>>()
            .into_iter();
        let Some(first) = amountless.next() else {
            continue;
        };
        for output in amountless {
            template.outputs[output].amount = Some(params.symbolic_amount);
        }

        let outgoing = output_value(template);
        let remainder = incoming
            .checked_sub(outgoing)
            .ok_or(TxGraphError::NegativeValue {
                template: name,
                inputs: incoming,
                outputs: outgoing,
            })?
            .checked_sub(fee)
            .ok_or(TxGraphError::InsufficientFee {
                template: name,
                fee: incoming - outgoing,
                required: fee,
            })?;
        template.outputs[first].amount = Some(remainder);

        trace!(template = %name, output = first, amount = %remainder, %fee, "assigned amount");
    }

    Ok(())
}

/// Checks the amounts of a fully funded graph.
///
/// Every output must carry an amount and every template must pay at least its required fee.
/// Beyond that, the fees of all internally funded templates, taken together, must come out at
/// exactly the configured rate. Templates their owner tops up with an extra input are left out,
/// since their inputs within the graph do not cover them.
pub fn validate(set: &TemplateSet, params: &DisputeParams) -> TxGraphResult<()> {
    let mut total_fee = Amount::ZERO;
    let mut total_size = 0u64;

    for template in set.iter() {
        if let Some(output) = template.outputs.iter().position(|o| o.amount.is_none()) {
            return Err(TxGraphError::MissingAmount {
                template: template.name,
                output,
            });
        }
        if template.is_external() || template.fundable {
            continue;
        }

        let inputs = input_value(set, template)?;
        let outputs = output_value(template);
        let fee = inputs
            .checked_sub(outputs)
            .ok_or(TxGraphError::NegativeValue {
                template: template.name,
                inputs,
                outputs,
            })?;

        let required = required_fee(template, params);
        if fee < required {
            return Err(TxGraphError::InsufficientFee {
                template: template.name,
                fee,
                required,
            });
        }

        total_fee += fee;
        total_size += template.script_size() as u64;
    }

    if total_size == 0 {
        return Ok(());
    }

    let factored_size = (total_size * params.fee_factor_percent).div_ceil(800);
    let computed = total_fee.to_sat() / factored_size.max(1);
    if computed != params.fee_per_byte {
        return Err(TxGraphError::FeeConsistency {
            computed,
            expected: params.fee_per_byte,
        });
    }

    debug!(event = "validated amounts", fee = %total_fee, size = total_size, rate = computed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use bitcoin::{hashes::Hash, OutPoint, ScriptBuf, Txid};
    use dispute_primitives::{
        template_name::TemplateName,
        types::{Role, SignatureType},
    };

    use super::*;
    use crate::template::{FundingUtxo, Input, Output, SpendRef, SpendingCondition};

    fn external(name: TemplateName, ordinal: usize, sats: u64) -> Template {
        let funding = FundingUtxo {
            outpoint: OutPoint {
                txid: Txid::from_byte_array([ordinal as u8; 32]),
                vout: 0,
            },
            amount: Amount::from_sat(sats),
        };
        Template {
            name,
            owner: Role::Prover,
            ordinal,
            txid: Some(funding.outpoint.txid),
            funding: Some(funding),
            unknown_txid: false,
            fundable: false,
            inputs: vec![],
            outputs: vec![Output::new(vec![SpendingCondition::new(
                Role::Prover,
                SignatureType::Both,
            )])
            .with_amount(funding.amount)],
        }
    }

    fn spending(name: TemplateName, ordinal: usize, parent: usize, outputs: Vec<Output>) -> Template {
        Template {
            name,
            owner: name.owner(),
            ordinal,
            txid: None,
            funding: None,
            unknown_txid: false,
            fundable: false,
            inputs: vec![Input::new(SpendRef {
                template: parent,
                output: 0,
                condition: 0,
            })],
            outputs,
        }
    }

    fn plain_output() -> Output {
        Output::new(vec![SpendingCondition::new(Role::Prover, SignatureType::Both)])
    }

    fn params(fee_per_byte: u64, fee_factor_percent: u64) -> DisputeParams {
        DisputeParams {
            fee_per_byte,
            fee_factor_percent,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_amountless_output_takes_the_remainder() {
        let mut proof = spending(
            TemplateName::Proof,
            1,
            0,
            vec![plain_output(), plain_output().with_amount(Amount::from_sat(200))],
        );
        proof.inputs[0].script = Some(ScriptBuf::from(vec![0x51; 8]));
        let params = params(11, 100);
        assert_eq!(required_fee(&proof, &params), Amount::from_sat(12));

        let mut set = TemplateSet::from_templates(vec![
            external(TemplateName::ProverStake, 0, 1000),
            proof,
        ])
        .unwrap();
        propagate_amounts(&mut set, &params).unwrap();

        let proof = set.by_name(TemplateName::Proof).unwrap();
        assert_eq!(proof.outputs[0].amount, Some(Amount::from_sat(788)));
        assert_eq!(proof.outputs[1].amount, Some(Amount::from_sat(200)));
    }

    #[test]
    fn test_extra_amountless_outputs_are_symbolic() {
        let params = params(1, 100);
        let mut set = TemplateSet::from_templates(vec![
            external(TemplateName::ProverStake, 0, 1000),
            spending(
                TemplateName::Proof,
                1,
                0,
                vec![plain_output(), plain_output(), plain_output()],
            ),
            spending(TemplateName::Challenge, 2, 1, vec![plain_output()]),
        ])
        .unwrap();
        propagate_amounts(&mut set, &params).unwrap();

        let proof = set.by_name(TemplateName::Proof).unwrap();
        let symbolic = params.symbolic_amount;
        assert_eq!(proof.outputs[1].amount, Some(symbolic));
        assert_eq!(proof.outputs[2].amount, Some(symbolic));
        // no scripts, so only the extra sat of fee
        assert_eq!(
            proof.outputs[0].amount,
            Some(Amount::from_sat(1000 - 1) - symbolic - symbolic)
        );

        let challenge = set.by_name(TemplateName::Challenge).unwrap();
        assert_eq!(
            challenge.outputs[0].amount,
            proof.outputs[0].amount.map(|a| a - Amount::from_sat(1))
        );

        validate(&set, &params).unwrap();
    }

    #[test]
    fn test_negative_value() {
        let params = params(1, 100);
        let mut set = TemplateSet::from_templates(vec![
            external(TemplateName::ProverStake, 0, 100),
            spending(
                TemplateName::Proof,
                1,
                0,
                vec![plain_output(), plain_output().with_amount(Amount::from_sat(500))],
            ),
        ])
        .unwrap();

        let err = propagate_amounts(&mut set, &params).unwrap_err();
        assert!(matches!(err, TxGraphError::NegativeValue { .. }));
    }

    #[test]
    fn test_insufficient_fee() {
        let params = params(10, 100);
        let mut proof = spending(
            TemplateName::Proof,
            1,
            0,
            vec![plain_output(), plain_output().with_amount(Amount::from_sat(95))],
        );
        proof.inputs[0].script = Some(ScriptBuf::from(vec![0x51; 16]));
        let mut set = TemplateSet::from_templates(vec![
            external(TemplateName::ProverStake, 0, 100),
            proof,
        ])
        .unwrap();

        let err = propagate_amounts(&mut set, &params).unwrap_err();
        assert!(matches!(err, TxGraphError::InsufficientFee { .. }));
    }

    #[test]
    fn test_validate_rejects_skewed_fees() {
        let params = params(10, 100);
        let mut proof = spending(
            TemplateName::Proof,
            1,
            0,
            vec![plain_output().with_amount(Amount::from_sat(500))],
        );
        proof.inputs[0].script = Some(ScriptBuf::from(vec![0x51; 80]));
        let set = TemplateSet::from_templates(vec![
            external(TemplateName::ProverStake, 0, 1000),
            proof,
        ])
        .unwrap();

        // 500 sat of fee on 10 fee units is 50 sat per byte
        let err = validate(&set, &params).unwrap_err();
        assert!(matches!(
            err,
            TxGraphError::FeeConsistency {
                computed: 50,
                expected: 10
            }
        ));
    }
}
