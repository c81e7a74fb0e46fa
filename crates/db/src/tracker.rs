//! Transactions of a setup observed on chain.

use async_trait::async_trait;
use bitcoin::{Transaction, Txid};
use dispute_primitives::{
    template_name::TemplateName,
    types::{BitcoinBlockHeight, SetupId},
};
use serde::{Deserialize, Serialize};

use crate::errors::DbResult;

/// A template instance that made it into a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTx {
    /// The id of the confirmed transaction.
    pub txid: Txid,

    /// The template it instantiates.
    pub name: TemplateName,

    /// The height of the block that includes it.
    pub height: BitcoinBlockHeight,

    /// The transaction itself, witness included.
    pub tx: Transaction,
}

/// The log of confirmed transactions of each setup.
#[async_trait]
pub trait ChainTxDb {
    /// Records a confirmation. A template confirms at most once, so a second record for the same
    /// name is ignored.
    async fn add_confirmed_tx(&self, setup_id: &SetupId, tx: ConfirmedTx) -> DbResult<()>;

    /// Returns every confirmation recorded for a setup, in no particular order.
    async fn get_confirmed_txs(&self, setup_id: &SetupId) -> DbResult<Vec<ConfirmedTx>>;
}
