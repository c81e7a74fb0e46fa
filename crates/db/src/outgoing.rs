//! The queue of transactions an agent wants published.

use async_trait::async_trait;
use bitcoin::{ScriptBuf, Txid};
use dispute_primitives::{template_name::TemplateName, types::SetupId};
use serde::{Deserialize, Serialize};

use crate::errors::DbResult;

/// Where an outgoing transaction stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutgoingStatus {
    /// Waiting to be published.
    Ready,

    /// Handed to the network.
    Published {
        /// The id it was published under.
        txid: Txid,
    },

    /// The network refused it; it may be queued again.
    Rejected,
}

impl OutgoingStatus {
    /// Whether a new request for the same template should leave this record alone.
    pub const fn is_pending_or_done(&self) -> bool {
        matches!(self, OutgoingStatus::Ready | OutgoingStatus::Published { .. })
    }
}

/// A template the agent decided to broadcast, with the data it reveals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTx {
    /// The template to instantiate.
    pub name: TemplateName,

    /// Witness items revealing commitments, per input.
    pub witness: Vec<Vec<Vec<u8>>>,

    /// A script replacing the one compiled for the first input, if the spend needs one.
    pub script: Option<ScriptBuf>,

    /// Publication status.
    pub status: OutgoingStatus,
}

impl OutgoingTx {
    /// Creates a record ready to be published.
    pub fn ready(name: TemplateName, witness: Vec<Vec<Vec<u8>>>) -> Self {
        Self {
            name,
            witness,
            script: None,
            status: OutgoingStatus::Ready,
        }
    }

    /// Replaces the script of the first input.
    pub fn with_script(mut self, script: ScriptBuf) -> Self {
        self.script = Some(script);
        self
    }
}

/// Stores outgoing transactions keyed by setup and template name.
#[async_trait]
pub trait OutgoingDb {
    /// Queues `tx` unless a record for the same template is already ready or published.
    ///
    /// Returns whether the record was written.
    async fn queue_outgoing(&self, setup_id: &SetupId, tx: OutgoingTx) -> DbResult<bool>;

    /// Returns the record for a template.
    async fn get_outgoing(
        &self,
        setup_id: &SetupId,
        name: TemplateName,
    ) -> DbResult<Option<OutgoingTx>>;

    /// Returns every record of a setup that is ready to be published.
    async fn get_ready_outgoing(&self, setup_id: &SetupId) -> DbResult<Vec<OutgoingTx>>;

    /// Updates the status of an existing record.
    async fn set_outgoing_status(
        &self,
        setup_id: &SetupId,
        name: TemplateName,
        status: OutgoingStatus,
    ) -> DbResult<()>;
}
