//! The nodes of the dispute graph and the pieces they are made of.

use std::collections::BTreeMap;

use bitcoin::{Amount, OutPoint, ScriptBuf, Txid};
use dispute_primitives::{
    template_name::TemplateName,
    types::{Role, SignatureType},
};
use secp256k1::{schnorr::Signature, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use wots::{ChainElement, WotsType};

/// Position of a template in the graph; equal to its ordinal.
pub type TemplateIdx = usize;

/// An output created outside the graph that funds one of the external templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingUtxo {
    /// Where the funds live.
    pub outpoint: OutPoint,

    /// How much they are worth.
    pub amount: Amount,
}

/// One alternative way of spending an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingCondition {
    /// The role that may use this condition.
    pub next_role: Role,

    /// The signatures the condition demands.
    pub signature_type: SignatureType,

    /// Number of blocks after the output confirms before this condition becomes usable.
    pub timeout_blocks: Option<u16>,

    /// The commitments a spender must reveal, in witness order.
    pub wots_spec: Vec<WotsType>,

    /// Public keys of each commitment in [`Self::wots_spec`], produced by [`Self::next_role`].
    pub wots_public_keys: Option<Vec<Vec<ChainElement>>>,

    /// Public keys of the required signers, in [`SignatureType::signers`] order.
    pub signer_keys: Vec<XOnlyPublicKey>,

    /// The compiled script.
    pub script: Option<ScriptBuf>,
}

impl SpendingCondition {
    /// Creates a condition without commitments or timeout.
    pub fn new(next_role: Role, signature_type: SignatureType) -> Self {
        Self {
            next_role,
            signature_type,
            timeout_blocks: None,
            wots_spec: Vec::new(),
            wots_public_keys: None,
            signer_keys: Vec::new(),
            script: None,
        }
    }

    /// Makes the condition usable only after `blocks` confirmations of its output.
    pub fn with_timeout(mut self, blocks: u16) -> Self {
        self.timeout_blocks = Some(blocks);
        self
    }

    /// Requires the spender to reveal commitments of the given classes.
    pub fn with_commitments(mut self, spec: impl IntoIterator<Item = WotsType>) -> Self {
        self.wots_spec.extend(spec);
        self
    }

    /// Whether the spender has to reveal anything.
    pub fn has_commitments(&self) -> bool {
        !self.wots_spec.is_empty()
    }

    /// Number of chain elements a spender reveals.
    pub fn commitment_elements(&self) -> usize {
        self.wots_spec.iter().map(WotsType::total_digits).sum()
    }
}

/// A set of rival spending conditions and the amount they guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// The amount, unset until funding back-propagates it.
    pub amount: Option<Amount>,

    /// Mutually exclusive ways to spend the output.
    pub spending_conditions: Vec<SpendingCondition>,
}

impl Output {
    /// Creates an amountless output.
    pub fn new(spending_conditions: Vec<SpendingCondition>) -> Self {
        Self {
            amount: None,
            spending_conditions,
        }
    }

    /// Sets a fixed amount.
    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Names the condition of a prior template an input spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpendRef {
    /// The spent template.
    pub template: TemplateIdx,

    /// The output index within it.
    pub output: usize,

    /// The condition index within that output.
    pub condition: usize,
}

/// An input of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// What the input spends.
    pub spends: SpendRef,

    /// Relative timelock in blocks, copied from the spent condition.
    pub sequence: Option<u16>,

    /// Script of the spent condition, attached once compiled.
    pub script: Option<ScriptBuf>,

    /// Signatures collected so far.
    pub signatures: BTreeMap<Role, Signature>,
}

impl Input {
    /// Creates an unsigned input spending `spends`.
    pub fn new(spends: SpendRef) -> Self {
        Self {
            spends,
            sequence: None,
            script: None,
            signatures: BTreeMap::new(),
        }
    }
}

/// A static description of one protocol transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// The protocol-unique name.
    pub name: TemplateName,

    /// The role that broadcasts it.
    pub owner: Role,

    /// Topological position; every input spends a template with a lower ordinal.
    pub ordinal: TemplateIdx,

    /// The txid, once known.
    pub txid: Option<Txid>,

    /// The outside funding of external templates.
    pub funding: Option<FundingUtxo>,

    /// Whether the txid is only learned when the transaction is broadcast.
    pub unknown_txid: bool,

    /// Whether the owner may add a funding input of its own.
    pub fundable: bool,

    /// The inputs, in transaction order.
    pub inputs: Vec<Input>,

    /// The outputs, in transaction order.
    pub outputs: Vec<Output>,
}

impl Template {
    /// Whether the template is funded from outside the graph.
    pub fn is_external(&self) -> bool {
        self.name.is_external()
    }

    /// Returns the outpoint of `output`, if the txid is known.
    pub fn outpoint(&self, output: usize) -> Option<OutPoint> {
        if let Some(funding) = self.funding {
            return (output == 0).then_some(funding.outpoint);
        }

        Some(OutPoint {
            txid: self.txid?,
            vout: output as u32,
        })
    }

    /// Iterates all conditions together with their output and condition indices.
    pub fn conditions(&self) -> impl Iterator<Item = (usize, usize, &SpendingCondition)> + '_ {
        self.outputs.iter().enumerate().flat_map(|(o, output)| {
            output
                .spending_conditions
                .iter()
                .enumerate()
                .map(move |(c, cond)| (o, c, cond))
        })
    }

    /// Mutable variant of [`Self::conditions`].
    pub fn conditions_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut SpendingCondition)> {
        self.outputs
            .iter_mut()
            .enumerate()
            .flat_map(|(o, output)| {
                output
                    .spending_conditions
                    .iter_mut()
                    .enumerate()
                    .map(move |(c, cond)| (o, c, cond))
            })
    }

    /// Total script bytes of inputs and conditions, the measure fees are charged on.
    pub fn script_size(&self) -> usize {
        let inputs: usize = self
            .inputs
            .iter()
            .map(|i| i.script.as_ref().map_or(0, |s| s.len()))
            .sum();
        let outputs: usize = self
            .conditions()
            .map(|(_, _, c)| c.script.as_ref().map_or(0, |s| s.len()))
            .sum();

        inputs + outputs
    }
}
