//! The setup pipeline of a dispute graph.
//!
//! Each stage consumes the graph of the previous one, so templates cannot be signed before their
//! amounts were propagated and validated, nor funded before their scripts exist:
//!
//! ```text
//! build -> Generated -> merge_commitment_keys -> Keyed -> compile_scripts -> Compiled
//!       -> fund -> Funded -> sign -> Signed -> merge_signatures -> Signed
//! ```

use std::marker::PhantomData;

use dispute_params::DisputeParams;
use dispute_primitives::types::{Role, SetupId};
use secp256k1::XOnlyPublicKey;
use tracing::info;
use wots::CommitmentSecret;

use crate::{
    amounts::{propagate_amounts, validate},
    commitments::{generate_keys, merge_keys},
    errors::{TxGraphError, TxGraphResult},
    protocol::{attach_keys_and_sequences, generate_templates},
    scripts::{compile_scripts, ScriptCompiler},
    set::TemplateSet,
    signing::{check_signed, merge_signatures, sign_templates, TemplateSigner},
    template::FundingUtxo,
};

mod private {
    pub trait Sealed {}
}

/// A stage of the setup pipeline.
pub trait Stage: private::Sealed {}

macro_rules! stages {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $name;

            impl private::Sealed for $name {}
            impl Stage for $name {}
        )*
    };
}

stages! {
    /// Templates exist and carry the local commitment keys.
    Generated,
    /// The counterpart's commitment keys were merged in.
    Keyed,
    /// Every condition carries its script.
    Compiled,
    /// Every output carries a validated amount.
    Funded,
    /// The local role signed every input it has to.
    Signed,
}

/// One party's copy of the dispute graph at stage `S`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateGraph<S: Stage> {
    role: Role,
    setup_id: SetupId,
    params: DisputeParams,
    prover_key: XOnlyPublicKey,
    verifier_key: XOnlyPublicKey,
    set: TemplateSet,
    _stage: PhantomData<S>,
}

impl<S: Stage> TemplateGraph<S> {
    fn advance<T: Stage>(self) -> TemplateGraph<T> {
        TemplateGraph {
            role: self.role,
            setup_id: self.setup_id,
            params: self.params,
            prover_key: self.prover_key,
            verifier_key: self.verifier_key,
            set: self.set,
            _stage: PhantomData,
        }
    }

    /// The role whose copy this is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The setup the graph belongs to.
    pub fn setup_id(&self) -> &SetupId {
        &self.setup_id
    }

    /// The parameters the graph was built with.
    pub fn params(&self) -> &DisputeParams {
        &self.params
    }

    /// The long-term key of `role`.
    pub fn key_of(&self, role: Role) -> XOnlyPublicKey {
        match role {
            Role::Prover => self.prover_key,
            Role::Verifier => self.verifier_key,
        }
    }

    /// The templates.
    pub fn set(&self) -> &TemplateSet {
        &self.set
    }

    /// Consumes the graph, returning its templates.
    pub fn into_set(self) -> TemplateSet {
        self.set
    }
}

impl TemplateGraph<Generated> {
    /// Generates the full graph for `setup_id` and the commitment keys of every condition `role`
    /// spends.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        role: Role,
        setup_id: SetupId,
        params: DisputeParams,
        secret: &CommitmentSecret,
        prover_key: XOnlyPublicKey,
        verifier_key: XOnlyPublicKey,
        locked_funds: FundingUtxo,
        prover_stake: FundingUtxo,
    ) -> TxGraphResult<Self> {
        params.validate()?;

        let mut set = generate_templates(&params, locked_funds, prover_stake)?;
        attach_keys_and_sequences(&mut set, prover_key, verifier_key);
        generate_keys(&mut set, role, &setup_id, secret);

        info!(event = "built dispute graph", %setup_id, %role, templates = set.len());
        Ok(Self {
            role,
            setup_id,
            params,
            prover_key,
            verifier_key,
            set,
            _stage: PhantomData,
        })
    }

    /// Takes the commitment keys the counterpart produced from its copy of the graph.
    pub fn merge_commitment_keys(mut self, theirs: &TemplateSet) -> TxGraphResult<TemplateGraph<Keyed>> {
        merge_keys(self.role, &mut self.set, theirs, self.params.iterations)?;
        Ok(self.advance())
    }
}

impl TemplateGraph<Keyed> {
    /// Compiles every spending condition.
    pub fn compile_scripts<C: ScriptCompiler>(
        mut self,
        compiler: &C,
    ) -> TxGraphResult<TemplateGraph<Compiled>> {
        compile_scripts(&mut self.set, compiler)?;
        Ok(self.advance())
    }
}

impl TemplateGraph<Compiled> {
    /// Propagates amounts through the graph and validates the result.
    pub fn fund(mut self) -> TxGraphResult<TemplateGraph<Funded>> {
        propagate_amounts(&mut self.set, &self.params)?;
        validate(&self.set, &self.params)?;

        info!(event = "funded dispute graph", setup_id = %self.setup_id, role = %self.role);
        Ok(self.advance())
    }
}

impl TemplateGraph<Funded> {
    /// Signs every input the local role has to sign.
    pub async fn sign<S: TemplateSigner>(mut self, signer: &S) -> TxGraphResult<TemplateGraph<Signed>> {
        if signer.role() != self.role || signer.public_key() != self.key_of(self.role) {
            return Err(TxGraphError::GraphIntegrity(format!(
                "signer for {} does not match the {} key of the graph",
                signer.role(),
                self.role
            )));
        }

        sign_templates(&mut self.set, &self.setup_id, signer).await?;
        check_signed(&self.set, self.role)?;
        Ok(self.advance())
    }
}

impl TemplateGraph<Signed> {
    /// Verifies and takes the counterpart's signatures.
    pub fn merge_signatures(mut self, theirs: &TemplateSet) -> TxGraphResult<Self> {
        let counterpart = self.role.other();
        let key = self.key_of(counterpart);
        merge_signatures(&mut self.set, theirs, &self.setup_id, counterpart, &key)?;

        info!(event = "merged counterpart signatures", setup_id = %self.setup_id, role = %self.role);
        Ok(self)
    }

    /// Whether both roles signed everything they have to.
    pub fn is_complete(&self) -> bool {
        check_signed(&self.set, Role::Prover).is_ok() && check_signed(&self.set, Role::Verifier).is_ok()
    }
}
