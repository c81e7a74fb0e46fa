//! Error types for the transaction graph.

use bitcoin::Amount;
use dispute_params::errors::ParamsError;
use dispute_primitives::{template_name::TemplateName, types::Role};
use thiserror::Error;
use wots::CommitmentError;

/// Errors that can occur while working with the transaction graph.
#[derive(Debug, Error)]
pub enum TxGraphError {
    /// An input references a template, output or condition that does not exist earlier in the
    /// graph, or two graphs being combined do not have the same shape.
    #[error("graph integrity: {0}")]
    GraphIntegrity(String),

    /// Commitment keys that should have been produced by `role` are absent.
    #[error("missing commitment keys of {role} on {template} output {output} condition {condition}")]
    MissingKeys {
        /// The template owning the condition.
        template: TemplateName,

        /// The output index.
        output: usize,

        /// The condition index.
        condition: usize,

        /// The role expected to produce the keys.
        role: Role,
    },

    /// A template spends less than it creates.
    #[error("{template} has negative value: inputs {inputs}, outputs {outputs}")]
    NegativeValue {
        /// The offending template.
        template: TemplateName,

        /// Sum of the spent outputs.
        inputs: Amount,

        /// Sum of the created outputs.
        outputs: Amount,
    },

    /// A template leaves less fee than its scripts require.
    #[error("{template} pays fee {fee}, required {required}")]
    InsufficientFee {
        /// The offending template.
        template: TemplateName,

        /// The fee actually left.
        fee: Amount,

        /// The fee its scripts require.
        required: Amount,
    },

    /// Fees summed over the whole graph do not reconcile to the configured fee rate.
    #[error("aggregate fee rate is {computed} sat/byte, expected {expected}")]
    FeeConsistency {
        /// The fee rate derived from the graph.
        computed: u64,

        /// The configured fee rate.
        expected: u64,
    },

    /// An output amount is still unset after funding.
    #[error("{template} output {output} has no amount")]
    MissingAmount {
        /// The offending template.
        template: TemplateName,

        /// The output index.
        output: usize,
    },

    /// An input lacks a signature the spent condition demands.
    #[error("{template} input {input} lacks the signature of {role}")]
    MissingSignature {
        /// The offending template.
        template: TemplateName,

        /// The input index.
        input: usize,

        /// The role whose signature is missing.
        role: Role,
    },

    /// A template the caller asked for is not part of the graph.
    #[error("unknown template {0}")]
    UnknownTemplate(TemplateName),

    /// The witness does not carry the commitments the spent condition declares.
    #[error("malformed witness for {template} input {input}: {reason}")]
    MalformedWitness {
        /// The spending template.
        template: TemplateName,

        /// The input index.
        input: usize,

        /// What is wrong with the witness.
        reason: String,
    },

    /// The script compiler failed.
    #[error("script compilation failed: {0}")]
    Script(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The signer failed.
    #[error("signing failed: {0}")]
    Signer(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The dispute parameters cannot produce a graph.
    #[error("invalid params: {0}")]
    Params(#[from] ParamsError),

    /// A commitment could not be encoded or decoded.
    #[error("commitment: {0}")]
    Commitment(#[from] CommitmentError),
}

/// Wrapper type for results that can fail with a [`TxGraphError`].
pub type TxGraphResult<T> = Result<T, TxGraphError>;
