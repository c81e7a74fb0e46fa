//! Turning spending conditions into tapscripts.

use bitcoin::{
    opcodes::all::{
        OP_BOOLOR, OP_CHECKSIGVERIFY, OP_CSV, OP_DROP, OP_DUP, OP_EQUAL, OP_FROMALTSTACK,
        OP_HASH160, OP_PUSHNUM_1, OP_TOALTSTACK, OP_VERIFY,
    },
    script::Builder,
    ScriptBuf,
};
use dispute_primitives::template_name::TemplateName;
use thiserror::Error;
use tracing::debug;

use crate::{
    commitments::ConditionSlot,
    errors::{TxGraphError, TxGraphResult},
    set::TemplateSet,
    template::SpendingCondition,
};

/// Produces the script of a single spending condition.
pub trait ScriptCompiler {
    /// The error returned when a condition cannot be compiled.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Compiles the condition found at `slot`.
    fn compile(
        &self,
        slot: ConditionSlot,
        condition: &SpendingCondition,
    ) -> Result<ScriptBuf, Self::Error>;
}

/// Errors raised by [`ConditionScriptCompiler`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The condition declares commitments whose keys were never merged in.
    #[error("{template} {output}/{condition} has no commitment keys")]
    MissingCommitmentKeys {
        /// The template owning the condition.
        template: TemplateName,

        /// The output index.
        output: usize,

        /// The condition index.
        condition: usize,
    },

    /// The condition demands more signatures than it has keys for.
    #[error("{template} {output}/{condition} has {got} signer keys, needs {needed}")]
    MissingSignerKeys {
        /// The template owning the condition.
        template: TemplateName,

        /// The output index.
        output: usize,

        /// The condition index.
        condition: usize,

        /// Keys required by the signature type.
        needed: usize,

        /// Keys attached.
        got: usize,
    },
}

/// Compiles conditions into a relative timelock, one `CHECKSIGVERIFY` per signer and a chain check
/// for every revealed commitment element.
///
/// The witness carries the commitment elements first, in declaration order, followed by the
/// signatures in reverse signer order. Each element must reach its public key within
/// `max_digit + 1` hashes; checksums are verified off-chain when the witness is decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionScriptCompiler;

impl ScriptCompiler for ConditionScriptCompiler {
    type Error = CompileError;

    fn compile(
        &self,
        slot: ConditionSlot,
        condition: &SpendingCondition,
    ) -> Result<ScriptBuf, Self::Error> {
        let needed = condition.signature_type.signers().len();
        if condition.signer_keys.len() != needed {
            return Err(CompileError::MissingSignerKeys {
                template: slot.template,
                output: slot.output,
                condition: slot.condition,
                needed,
                got: condition.signer_keys.len(),
            });
        }

        let mut builder = Builder::new();
        if let Some(timeout) = condition.timeout_blocks {
            builder = builder
                .push_int(i64::from(timeout))
                .push_opcode(OP_CSV)
                .push_opcode(OP_DROP);
        }

        for key in &condition.signer_keys {
            builder = builder
                .push_x_only_key(key)
                .push_opcode(OP_CHECKSIGVERIFY);
        }

        if condition.has_commitments() {
            let keys = condition.wots_public_keys.as_ref().ok_or(
                CompileError::MissingCommitmentKeys {
                    template: slot.template,
                    output: slot.output,
                    condition: slot.condition,
                },
            )?;

            // the last revealed element sits on top of the stack
            for (wots_type, keys) in condition.wots_spec.iter().zip(keys).rev() {
                let steps = wots_type.max_digit() + 1;
                for key in keys.iter().rev() {
                    for _ in 0..steps {
                        builder = builder
                            .push_opcode(OP_HASH160)
                            .push_opcode(OP_DUP)
                            .push_slice(key)
                            .push_opcode(OP_EQUAL)
                            .push_opcode(OP_TOALTSTACK);
                    }
                    builder = builder.push_opcode(OP_DROP).push_opcode(OP_FROMALTSTACK);
                    for _ in 1..steps {
                        builder = builder
                            .push_opcode(OP_FROMALTSTACK)
                            .push_opcode(OP_BOOLOR);
                    }
                    builder = builder.push_opcode(OP_VERIFY);
                }
            }
        }

        Ok(builder.push_opcode(OP_PUSHNUM_1).into_script())
    }
}

/// Attaches a compiled script to every condition, and the spent condition's script to every input.
pub(crate) fn compile_scripts<C: ScriptCompiler>(
    set: &mut TemplateSet,
    compiler: &C,
) -> TxGraphResult<()> {
    let mut bytes = 0usize;
    for template in set.iter_mut() {
        let name = template.name;
        for (output, condition, cond) in template.conditions_mut() {
            let script = compiler
                .compile(ConditionSlot::new(name, output, condition), cond)
                .map_err(|e| TxGraphError::Script(Box::new(e)))?;
            bytes += script.len();
            cond.script = Some(script);
        }
    }

    let spent_scripts: Vec<Vec<Option<ScriptBuf>>> = set
        .iter()
        .map(|t| {
            t.inputs
                .iter()
                .map(|input| set.spent(input).2.script.clone())
                .collect()
        })
        .collect();
    for (template, scripts) in set.iter_mut().zip(spent_scripts) {
        for (input, script) in template.inputs.iter_mut().zip(scripts) {
            input.script = script;
        }
    }

    debug!(event = "compiled condition scripts", templates = set.len(), %bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use dispute_primitives::types::{Role, SignatureType};
    use secp256k1::{Keypair, Secp256k1, SecretKey};
    use wots::{CommitmentSecret, WotsType};

    use super::*;

    fn key(byte: u8) -> secp256k1::XOnlyPublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[byte; 32]).unwrap();
        Keypair::from_secret_key(&secp, &sk).x_only_public_key().0
    }

    #[test]
    fn test_signer_keys_are_checked() {
        let slot = ConditionSlot::new(TemplateName::Proof, 0, 0);
        let cond = SpendingCondition::new(Role::Prover, SignatureType::Both);

        let err = ConditionScriptCompiler.compile(slot, &cond).unwrap_err();
        assert!(matches!(
            err,
            CompileError::MissingSignerKeys {
                needed: 2,
                got: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_commitments_grow_the_script() {
        let slot = ConditionSlot::new(TemplateName::State(0), 0, 0);
        let mut cond = SpendingCondition::new(Role::Verifier, SignatureType::Verifier)
            .with_commitments([WotsType::Wots24]);
        cond.signer_keys = vec![key(7)];

        assert!(matches!(
            ConditionScriptCompiler.compile(slot, &cond),
            Err(CompileError::MissingCommitmentKeys { .. })
        ));

        let secret = CommitmentSecret::new(b"secret".to_vec());
        cond.wots_public_keys = Some(vec![secret.public_keys(WotsType::Wots24, "id")]);
        let with_commitment = ConditionScriptCompiler.compile(slot, &cond).unwrap();

        let mut plain = SpendingCondition::new(Role::Verifier, SignatureType::Verifier);
        plain.signer_keys = vec![key(7)];
        let plain = ConditionScriptCompiler.compile(slot, &plain).unwrap();

        // ten elements, eight hashing steps each
        assert!(with_commitment.len() > plain.len() + 10 * 8 * 24);
    }
}
