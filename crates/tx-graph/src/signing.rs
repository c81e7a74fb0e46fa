//! Pre-signing the graph.
//!
//! Every input whose spent condition demands a role's signature is signed by that role before the
//! setup activates. The signed message commits to the setup, the template, the input, the spent
//! script and every output amount, so a signature only ever authorizes the funded template it was
//! produced for.

use async_trait::async_trait;
use bitcoin::hashes::{sha256, Hash, HashEngine};
use dispute_primitives::types::{Role, SetupId};
use secp256k1::{schnorr::Signature, Keypair, Message, XOnlyPublicKey, SECP256K1};
use tracing::{debug, warn};

use crate::{
    errors::{TxGraphError, TxGraphResult},
    set::TemplateSet,
    template::Template,
};

/// Produces the signatures of one role.
#[async_trait]
pub trait TemplateSigner: Send + Sync {
    /// The error returned when signing fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The role this signer signs for.
    fn role(&self) -> Role;

    /// The key the signatures verify under.
    fn public_key(&self) -> XOnlyPublicKey;

    /// Signs input `input_idx` of `template`.
    async fn sign(
        &self,
        setup_id: &SetupId,
        set: &TemplateSet,
        template: &Template,
        input_idx: usize,
    ) -> Result<Signature, Self::Error>;
}

/// Computes the message an input signature commits to.
pub fn signing_message(
    setup_id: &SetupId,
    set: &TemplateSet,
    template: &Template,
    input_idx: usize,
) -> TxGraphResult<Message> {
    let input = template.inputs.get(input_idx).ok_or_else(|| {
        TxGraphError::GraphIntegrity(format!("{} has no input {input_idx}", template.name))
    })?;
    let (parent, _, cond) = set.spent(input);

    let mut engine = sha256::Hash::engine();
    engine.input(setup_id.as_str().as_bytes());
    engine.input(template.name.to_string().as_bytes());
    engine.input(&(input_idx as u32).to_le_bytes());
    engine.input(parent.name.to_string().as_bytes());
    engine.input(&(input.spends.output as u32).to_le_bytes());
    engine.input(&(input.spends.condition as u32).to_le_bytes());
    engine.input(&input.sequence.unwrap_or_default().to_le_bytes());
    if let Some(script) = &cond.script {
        engine.input(script.as_bytes());
    }
    for (output, amount) in template.outputs.iter().map(|o| o.amount).enumerate() {
        let amount = amount.ok_or(TxGraphError::MissingAmount {
            template: template.name,
            output,
        })?;
        engine.input(&amount.to_sat().to_le_bytes());
    }

    Ok(Message::from_digest(
        sha256::Hash::from_engine(engine).to_byte_array(),
    ))
}

/// Whether `role` has to sign input `input_idx` of `template`.
fn needs_signature(set: &TemplateSet, template: &Template, input_idx: usize, role: Role) -> bool {
    template
        .inputs
        .get(input_idx)
        .is_some_and(|input| set.spent(input).2.signature_type.requires(role))
}

/// Signs every input of the graph that needs the signer's signature.
pub(crate) async fn sign_templates<S: TemplateSigner>(
    set: &mut TemplateSet,
    setup_id: &SetupId,
    signer: &S,
) -> TxGraphResult<()> {
    let role = signer.role();
    let mut signatures = Vec::new();
    for template in set.iter().filter(|t| !t.is_external()) {
        for input_idx in 0..template.inputs.len() {
            if !needs_signature(set, template, input_idx, role) {
                continue;
            }

            let signature = signer
                .sign(setup_id, set, template, input_idx)
                .await
                .map_err(|e| TxGraphError::Signer(Box::new(e)))?;
            signatures.push((template.ordinal, input_idx, signature));
        }
    }

    let count = signatures.len();
    for (ordinal, input_idx, signature) in signatures {
        if let Some(template) = set.get_mut(ordinal) {
            template.inputs[input_idx].signatures.insert(role, signature);
        }
    }

    debug!(event = "signed templates", %setup_id, %role, signatures = count);
    Ok(())
}

/// Checks that every input needing `role`'s signature carries one.
pub fn check_signed(set: &TemplateSet, role: Role) -> TxGraphResult<()> {
    for template in set.iter().filter(|t| !t.is_external()) {
        for (input_idx, input) in template.inputs.iter().enumerate() {
            if needs_signature(set, template, input_idx, role)
                && !input.signatures.contains_key(&role)
            {
                return Err(TxGraphError::MissingSignature {
                    template: template.name,
                    input: input_idx,
                    role,
                });
            }
        }
    }

    Ok(())
}

/// Copies `role`'s signatures from the counterpart's graph after checking them against `key`.
pub(crate) fn merge_signatures(
    mine: &mut TemplateSet,
    theirs: &TemplateSet,
    setup_id: &SetupId,
    role: Role,
    key: &XOnlyPublicKey,
) -> TxGraphResult<()> {
    if mine.len() != theirs.len() {
        return Err(TxGraphError::GraphIntegrity(format!(
            "counterpart graph has {} templates, expected {}",
            theirs.len(),
            mine.len()
        )));
    }

    let mut accepted = Vec::new();
    for (ours, other) in mine.iter().zip(theirs.iter()) {
        for (input_idx, input) in other.inputs.iter().enumerate() {
            let Some(signature) = input.signatures.get(&role) else {
                continue;
            };

            // our own copy decides what the signature must cover
            let msg = signing_message(setup_id, mine, ours, input_idx)?;
            if SECP256K1.verify_schnorr(signature, &msg, key).is_err() {
                warn!(template = %ours.name, input = input_idx, %role, "rejected invalid signature");
                return Err(TxGraphError::MissingSignature {
                    template: ours.name,
                    input: input_idx,
                    role,
                });
            }
            accepted.push((ours.ordinal, input_idx, *signature));
        }
    }

    for (ordinal, input_idx, signature) in accepted {
        if let Some(template) = mine.get_mut(ordinal) {
            template.inputs[input_idx].signatures.insert(role, signature);
        }
    }

    check_signed(mine, role)
}

/// Signs with a single in-memory keypair.
#[derive(Debug, Clone, Copy)]
pub struct KeypairSigner {
    role: Role,
    keypair: Keypair,
}

impl KeypairSigner {
    /// Creates a signer for `role`.
    pub fn new(role: Role, keypair: Keypair) -> Self {
        Self { role, keypair }
    }
}

#[async_trait]
impl TemplateSigner for KeypairSigner {
    type Error = TxGraphError;

    fn role(&self) -> Role {
        self.role
    }

    fn public_key(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }

    async fn sign(
        &self,
        setup_id: &SetupId,
        set: &TemplateSet,
        template: &Template,
        input_idx: usize,
    ) -> Result<Signature, Self::Error> {
        let msg = signing_message(setup_id, set, template, input_idx)?;
        Ok(SECP256K1.sign_schnorr_no_aux_rand(&msg, &self.keypair))
    }
}
