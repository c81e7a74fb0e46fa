//! Commitment keys of the graph and the witnesses that reveal them.
//!
//! Every commitment is identified by the condition that declares it, so both parties derive the
//! same id for it: `setup/template/output/condition/data_index`. The role that spends a condition
//! is the one revealing its commitments and therefore the one producing their keys.

use dispute_primitives::{
    template_name::TemplateName,
    types::{Role, SetupId},
};
use tracing::{debug, trace};
use wots::{ChainElement, CommitmentSecret, CommittedValue, WotsType, HASH_LEN};

use crate::{
    errors::{TxGraphError, TxGraphResult},
    protocol::final_select_commitments,
    set::TemplateSet,
    template::{Input, SpendingCondition, Template},
};

/// Locates a spending condition by the name of its template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionSlot {
    /// The template owning the output.
    pub template: TemplateName,

    /// The output index.
    pub output: usize,

    /// The condition index within the output.
    pub condition: usize,
}

impl ConditionSlot {
    /// Creates a slot.
    pub const fn new(template: TemplateName, output: usize, condition: usize) -> Self {
        Self {
            template,
            output,
            condition,
        }
    }

    /// The id of the `data_idx`-th commitment the condition declares.
    pub fn commitment_id(&self, setup_id: &SetupId, data_idx: usize) -> String {
        format!(
            "{setup_id}/{}/{}/{}/{data_idx}",
            self.template, self.output, self.condition
        )
    }
}

/// The slot of the condition `input` spends.
pub fn spent_slot(set: &TemplateSet, input: &Input) -> ConditionSlot {
    let (parent, _, _) = set.spent(input);
    ConditionSlot::new(parent.name, input.spends.output, input.spends.condition)
}

/// Fills in the public keys of every condition `role` will spend.
pub(crate) fn generate_keys(
    set: &mut TemplateSet,
    role: Role,
    setup_id: &SetupId,
    secret: &CommitmentSecret,
) {
    let mut generated = 0usize;
    for template in set.iter_mut() {
        let name = template.name;
        for (output, condition, cond) in template.conditions_mut() {
            if cond.next_role != role || !cond.has_commitments() {
                continue;
            }

            let slot = ConditionSlot::new(name, output, condition);
            cond.wots_public_keys = Some(
                cond.wots_spec
                    .iter()
                    .enumerate()
                    .map(|(data_idx, wots_type)| {
                        secret.public_keys(*wots_type, &slot.commitment_id(setup_id, data_idx))
                    })
                    .collect(),
            );
            generated += 1;
        }
    }

    debug!(event = "generated commitment keys", %setup_id, %role, conditions = generated);
}

/// Whether `keys` has the shape `cond` declares.
fn keys_fit(cond: &SpendingCondition, keys: &[Vec<ChainElement>]) -> bool {
    keys.len() == cond.wots_spec.len()
        && cond
            .wots_spec
            .iter()
            .zip(keys)
            .all(|(wots_type, keys)| keys.len() == wots_type.total_digits())
}

/// Combines the local graph with the counterpart's copy of the same graph.
///
/// Keys of conditions `role` spends are kept from `mine`, all others are taken from `theirs`.
/// Afterwards the leading keys of the final selection path are bound to the per-round selection
/// keys.
pub(crate) fn merge_keys(
    role: Role,
    mine: &mut TemplateSet,
    theirs: &TemplateSet,
    iterations: u8,
) -> TxGraphResult<()> {
    if mine.len() != theirs.len() {
        return Err(TxGraphError::GraphIntegrity(format!(
            "counterpart graph has {} templates, expected {}",
            theirs.len(),
            mine.len()
        )));
    }

    for (ours, other) in mine.iter_mut().zip(theirs.iter()) {
        merge_template(role, ours, other)?;
    }

    bind_selection_path_keys(mine, iterations)?;

    debug!(event = "merged commitment keys", %role, templates = mine.len());
    Ok(())
}

fn merge_template(role: Role, ours: &mut Template, other: &Template) -> TxGraphResult<()> {
    let name = ours.name;
    if other.name != name || other.outputs.len() != ours.outputs.len() {
        return Err(TxGraphError::GraphIntegrity(format!(
            "counterpart template {} does not match {name}",
            other.name
        )));
    }

    for (output, (ours, other)) in ours.outputs.iter_mut().zip(&other.outputs).enumerate() {
        if ours.spending_conditions.len() != other.spending_conditions.len() {
            return Err(TxGraphError::GraphIntegrity(format!(
                "counterpart {name} output {output} has a different number of conditions"
            )));
        }

        for (condition, (cond, their_cond)) in ours
            .spending_conditions
            .iter_mut()
            .zip(&other.spending_conditions)
            .enumerate()
        {
            if !cond.has_commitments() {
                continue;
            }
            if cond.wots_spec != their_cond.wots_spec {
                return Err(TxGraphError::GraphIntegrity(format!(
                    "counterpart {name} {output}/{condition} declares different commitments"
                )));
            }

            let missing = |role| TxGraphError::MissingKeys {
                template: name,
                output,
                condition,
                role,
            };

            if cond.next_role == role {
                match &cond.wots_public_keys {
                    Some(keys) if keys_fit(cond, keys) => {}
                    _ => return Err(missing(role)),
                }
            } else {
                match &their_cond.wots_public_keys {
                    Some(keys) if keys_fit(cond, keys) => {
                        cond.wots_public_keys = Some(keys.clone());
                    }
                    _ => return Err(missing(role.other())),
                }
            }
        }
    }

    Ok(())
}

/// The argument replays the verifier's selections, so the selection path of the last select
/// carries the per-round selection keys followed by the prover's leaf index key.
fn bind_selection_path_keys(set: &mut TemplateSet, iterations: u8) -> TxGraphResult<()> {
    let (output, condition) = final_select_commitments();
    let last_select = TemplateName::Select(iterations.saturating_sub(1));

    let mut selection_keys = Vec::with_capacity(iterations as usize);
    for round in 0..iterations {
        let state = set.by_name(TemplateName::State(round))?;
        let keys = state.outputs[0].spending_conditions[0]
            .wots_public_keys
            .as_ref()
            .and_then(|keys| keys.first())
            .ok_or(TxGraphError::MissingKeys {
                template: state.name,
                output: 0,
                condition: 0,
                role: Role::Verifier,
            })?;
        selection_keys.push(keys.clone());
    }

    let select = set.by_name_mut(last_select)?;
    let keys = select.outputs[output].spending_conditions[condition]
        .wots_public_keys
        .as_mut()
        .ok_or(TxGraphError::MissingKeys {
            template: last_select,
            output,
            condition,
            role: Role::Prover,
        })?;
    for (slot, selection) in keys.iter_mut().zip(selection_keys) {
        *slot = selection;
    }

    Ok(())
}

/// Produces the chain elements revealing `values` for the commitments of the condition at `slot`.
pub fn encode_values(
    secret: &CommitmentSecret,
    setup_id: &SetupId,
    slot: ConditionSlot,
    spec: &[WotsType],
    values: &[CommittedValue],
) -> TxGraphResult<Vec<ChainElement>> {
    if spec.len() != values.len() {
        return Err(TxGraphError::GraphIntegrity(format!(
            "{} values for the {} commitments of {} {}/{}",
            values.len(),
            spec.len(),
            slot.template,
            slot.output,
            slot.condition
        )));
    }

    let mut elements = Vec::with_capacity(spec.iter().map(WotsType::total_digits).sum());
    for (data_idx, (wots_type, value)) in spec.iter().zip(values).enumerate() {
        elements.extend(secret.encode(
            *wots_type,
            value,
            &slot.commitment_id(setup_id, data_idx),
        )?);
    }

    Ok(elements)
}

/// Packs chain elements into witness items, one element per item.
pub fn to_witness_items(elements: &[ChainElement]) -> Vec<Vec<u8>> {
    elements.iter().map(|e| e.to_vec()).collect()
}

/// Collects `needed` chain elements from the front of a witness.
///
/// Items are split into 20-byte elements, so an item may carry several of them. Whatever follows
/// the commitments (signatures, the script, the control block) is ignored.
pub fn parse_elements(
    template: TemplateName,
    input: usize,
    witness: &[Vec<u8>],
    needed: usize,
) -> TxGraphResult<Vec<ChainElement>> {
    let malformed = |reason: String| TxGraphError::MalformedWitness {
        template,
        input,
        reason,
    };

    let mut elements = Vec::with_capacity(needed);
    for (idx, item) in witness.iter().enumerate() {
        if elements.len() == needed {
            break;
        }
        if item.len() % HASH_LEN != 0 {
            return Err(malformed(format!(
                "item {idx} has {} bytes, not a multiple of {HASH_LEN}",
                item.len()
            )));
        }

        for chunk in item.chunks_exact(HASH_LEN) {
            let mut element = [0u8; HASH_LEN];
            element.copy_from_slice(chunk);
            elements.push(element);
        }
    }

    if elements.len() < needed {
        return Err(malformed(format!(
            "found {} chain elements, need {needed}",
            elements.len()
        )));
    }
    elements.truncate(needed);

    Ok(elements)
}

/// Decodes every commitment revealed by `input_idx` of `template`.
pub fn decode_input(
    set: &TemplateSet,
    template: &Template,
    input_idx: usize,
    witness: &[Vec<u8>],
) -> TxGraphResult<Vec<CommittedValue>> {
    let input = template.inputs.get(input_idx).ok_or_else(|| {
        TxGraphError::GraphIntegrity(format!("{} has no input {input_idx}", template.name))
    })?;
    let (parent, _, cond) = set.spent(input);
    let keys = cond
        .wots_public_keys
        .as_ref()
        .ok_or(TxGraphError::MissingKeys {
            template: parent.name,
            output: input.spends.output,
            condition: input.spends.condition,
            role: cond.next_role,
        })?;

    let elements = parse_elements(
        template.name,
        input_idx,
        witness,
        cond.commitment_elements(),
    )?;

    let mut values = Vec::with_capacity(cond.wots_spec.len());
    let mut offset = 0;
    for (wots_type, keys) in cond.wots_spec.iter().zip(keys) {
        let len = wots_type.total_digits();
        values.push(wots::decode(
            *wots_type,
            &elements[offset..offset + len],
            keys,
        )?);
        offset += len;
    }

    trace!(template = %template.name, input = input_idx, values = values.len(), "decoded witness");
    Ok(values)
}

#[cfg(test)]
mod tests {
    use bitcoin::{hashes::Hash, Amount, OutPoint, Txid};
    use dispute_params::DisputeParams;

    use super::*;
    use crate::{protocol::generate_templates, template::FundingUtxo};

    fn utxo(byte: u8, sats: u64) -> FundingUtxo {
        FundingUtxo {
            outpoint: OutPoint {
                txid: Txid::from_byte_array([byte; 32]),
                vout: 0,
            },
            amount: Amount::from_sat(sats),
        }
    }

    fn params() -> DisputeParams {
        DisputeParams::default().with_iterations(3)
    }

    fn keyed(role: Role, secret: &[u8]) -> TemplateSet {
        let params = params();
        let mut set =
            generate_templates(&params, utxo(1, 100_000_000), utxo(2, 200_000_000)).unwrap();
        generate_keys(
            &mut set,
            role,
            &SetupId::from("setup"),
            &CommitmentSecret::new(secret.to_vec()),
        );
        set
    }

    #[test]
    fn test_commitment_id() {
        let slot = ConditionSlot::new(TemplateName::State(2), 0, 0);
        assert_eq!(
            slot.commitment_id(&SetupId::from("abc"), 0),
            "abc/state_02/0/0/0"
        );
    }

    #[test]
    fn test_merge_fills_both_sides() {
        let mut prover = keyed(Role::Prover, b"prover secret");
        let verifier = keyed(Role::Verifier, b"verifier secret");

        merge_keys(Role::Prover, &mut prover, &verifier, 3).unwrap();
        for template in prover.iter() {
            for (_, _, cond) in template.conditions() {
                if cond.has_commitments() {
                    let keys = cond.wots_public_keys.as_ref().unwrap();
                    assert!(keys_fit(cond, keys), "{}", template.name);
                }
            }
        }

        let state = prover.by_name(TemplateName::State(1)).unwrap();
        let selection = &state.outputs[0].spending_conditions[0]
            .wots_public_keys
            .as_ref()
            .unwrap()[0];
        let select = prover.by_name(TemplateName::Select(2)).unwrap();
        let path = select.outputs[0].spending_conditions[0]
            .wots_public_keys
            .as_ref()
            .unwrap();
        assert_eq!(&path[1], selection);
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn test_merge_detects_missing_keys() {
        let mut prover = keyed(Role::Prover, b"prover secret");
        let unkeyed =
            generate_templates(&params(), utxo(1, 100_000_000), utxo(2, 200_000_000)).unwrap();

        let err = merge_keys(Role::Prover, &mut prover, &unkeyed, 3).unwrap_err();
        assert!(matches!(
            err,
            TxGraphError::MissingKeys {
                role: Role::Verifier,
                ..
            }
        ));
    }

    #[test]
    fn test_witness_round_trip() {
        let secret = CommitmentSecret::new(b"verifier secret".to_vec());
        let setup_id = SetupId::from("setup");
        let set = keyed(Role::Verifier, b"verifier secret");

        let select = set.by_name(TemplateName::Select(0)).unwrap();
        let slot = ConditionSlot::new(TemplateName::State(0), 0, 0);
        let elements = encode_values(
            &secret,
            &setup_id,
            slot,
            &[WotsType::Wots24],
            &[CommittedValue::from(7u64)],
        )
        .unwrap();

        let mut witness = vec![elements.concat()];
        witness.push(vec![0xaa; 64]);
        let values = decode_input(&set, select, 0, &witness).unwrap();
        assert_eq!(values, vec![CommittedValue::from(7u64)]);
    }

    #[test]
    fn test_parse_elements_rejects_ragged_items() {
        let witness = vec![vec![0u8; 20], vec![0u8; 21]];
        let err = parse_elements(TemplateName::Select(0), 0, &witness, 2).unwrap_err();
        assert!(matches!(err, TxGraphError::MalformedWitness { .. }));

        let err = parse_elements(TemplateName::Select(0), 0, &witness[..1], 2).unwrap_err();
        assert!(matches!(err, TxGraphError::MalformedWitness { .. }));

        let ok = parse_elements(TemplateName::Select(0), 0, &witness, 1).unwrap();
        assert_eq!(ok.len(), 1);
    }
}
