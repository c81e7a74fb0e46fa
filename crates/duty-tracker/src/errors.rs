//! Error types for the dispute tracker.

use dispute_db::errors::DbError;
use dispute_primitives::{errors::BisectionError, template_name::TemplateName, types::SetupId};
use dispute_tx_graph::errors::TxGraphError;
use thiserror::Error;
use wots::CommitmentError;

use crate::chain::ChainError;

/// Errors raised while replaying the confirmed transactions of a setup.
#[derive(Debug, Error)]
pub enum TransitionErr {
    /// A confirmed transaction names a template the graph does not have.
    #[error("confirmed transaction for unknown template {0}")]
    UnknownTemplate(TemplateName),

    /// A confirmed transaction has fewer inputs than its template.
    #[error("{template} was confirmed without input {input}")]
    MissingInput {
        /// The confirmed template.
        template: TemplateName,

        /// The input that is absent.
        input: usize,
    },

    /// The witness of a confirmed transaction does not decode against the graph's keys.
    #[error("could not decode {template}: {source}")]
    Decode {
        /// The confirmed template.
        template: TemplateName,

        /// What went wrong.
        #[source]
        source: TxGraphError,
    },

    /// A revealed selection is not a digit of the bisection.
    #[error("{template} reveals {value}, which is not a selection digit")]
    InvalidSelection {
        /// The select template.
        template: TemplateName,

        /// The decoded value.
        value: String,
    },

    /// The revealed argument does not have the shape of the final select.
    #[error("malformed argument: {0}")]
    MalformedArgument(String),
}

/// Errors raised while turning a duty into an outgoing transaction.
#[derive(Debug, Error)]
pub enum ExecutorErr {
    /// The graph could not produce the witness.
    #[error("tx graph: {0}")]
    TxGraph(#[from] TxGraphError),

    /// A value could not be committed.
    #[error("commitment: {0}")]
    Commitment(#[from] CommitmentError),

    /// The trace cannot be addressed the way the graph bisects it.
    #[error("bisection: {0}")]
    Bisection(#[from] BisectionError),

    /// The trace has a different number of rounds than the graph.
    #[error("trace needs {trace} rounds but the graph has {graph}")]
    TraceMismatch {
        /// Rounds implied by the trace length.
        trace: u8,

        /// Rounds of the graph.
        graph: u8,
    },

    /// The trace oracle answered something the protocol cannot use.
    #[error("invalid oracle answer: {0}")]
    InvalidOracleAnswer(String),

    /// The trace oracle failed.
    #[error("trace oracle: {0}")]
    Oracle(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Unified error type for everything that can happen in the [`DisputeManager`].
///
/// [`DisputeManager`]: crate::dispute_manager::DisputeManager
#[derive(Debug, Error)]
pub enum DisputeManagerErr {
    /// Errors from the dispute db.
    #[error("database error: {0:?}")]
    DbErr(#[from] DbError),

    /// The confirmed transactions of a setup could not be replayed.
    #[error("state machine received an invalid transaction: {0}")]
    TransitionErr(#[from] TransitionErr),

    /// A duty could not be executed.
    #[error("failed to execute duty: {0}")]
    ExecutorErr(#[from] ExecutorErr),

    /// Errors from the graph itself.
    #[error("tx graph: {0}")]
    TxGraphErr(#[from] TxGraphError),

    /// Errors talking to the chain.
    #[error("chain client: {0}")]
    ChainErr(#[from] ChainError),

    /// An active setup has no templates stored.
    #[error("no templates stored for setup {0}")]
    MissingTemplates(SetupId),

    /// An external call did not finish in time.
    #[error("timed out while {0}")]
    Timeout(String),
}
