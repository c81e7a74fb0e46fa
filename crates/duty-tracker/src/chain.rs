//! Finding the transactions of a setup on chain.
//!
//! Only the funding outpoints are known in advance; every other txid is learned when the
//! transaction confirms. Templates are therefore recognized by what they spend: a transaction
//! instantiates a template when its inputs spend exactly the outpoints the template's inputs
//! reference, with the relative timelocks those inputs require.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bitcoin::{Block, BlockHash, OutPoint, Sequence, Transaction, Txid};
use dispute_db::tracker::ConfirmedTx;
use dispute_primitives::types::BitcoinBlockHeight;
use dispute_tx_graph::{
    errors::TxGraphResult, template::TemplateIdx, Input, Template, TemplateSet,
};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors returned by a [`ChainClient`].
#[derive(Debug, Error)]
pub enum ChainError {
    /// The node could not be reached.
    #[error("connection: {0}")]
    Connection(String),

    /// The node answered with an error.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// The error code.
        code: i64,

        /// The error message.
        message: String,
    },

    /// The answer could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Read access to a bitcoin node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Height of the best block.
    async fn get_block_count(&self) -> Result<BitcoinBlockHeight, ChainError>;

    /// Hash of the block at `height` on the best chain.
    async fn get_block_hash(&self, height: BitcoinBlockHeight) -> Result<BlockHash, ChainError>;

    /// The block with `hash`.
    async fn get_block(&self, hash: &BlockHash) -> Result<Block, ChainError>;
}

/// Whether `got` satisfies the relative timelock an input requires.
fn sequence_matches(expected: Option<u16>, got: Sequence) -> bool {
    match expected {
        Some(blocks) => got == Sequence::from_height(blocks),
        None => !got.is_relative_lock_time() || got == Sequence::ZERO,
    }
}

/// Recognizes the templates of one setup among arbitrary transactions.
#[derive(Debug)]
pub struct TemplateMatcher<'a> {
    set: &'a TemplateSet,
    txids: BTreeMap<TemplateIdx, Txid>,
}

impl<'a> TemplateMatcher<'a> {
    /// Creates a matcher that already knows the transactions in `confirmed`.
    pub fn new(set: &'a TemplateSet, confirmed: &[ConfirmedTx]) -> TxGraphResult<Self> {
        let txids = confirmed
            .iter()
            .map(|c| Ok((set.index_of(c.name)?, c.txid)))
            .collect::<TxGraphResult<_>>()?;

        Ok(Self { set, txids })
    }

    fn outpoint(&self, input: &Input) -> Option<OutPoint> {
        let parent = self.set.get(input.spends.template)?;
        if parent.is_external() {
            return parent.outpoint(input.spends.output);
        }

        Some(OutPoint {
            txid: *self.txids.get(&parent.ordinal)?,
            vout: input.spends.output as u32,
        })
    }

    fn matches(&self, template: &Template, tx: &Transaction) -> bool {
        let arity_ok = if template.fundable {
            tx.input.len() >= template.inputs.len()
        } else {
            tx.input.len() == template.inputs.len()
        };

        arity_ok
            && template.inputs.iter().zip(&tx.input).all(|(input, txin)| {
                self.outpoint(input) == Some(txin.previous_output)
                    && sequence_matches(input.sequence, txin.sequence)
            })
    }

    /// Returns the template `tx` instantiates and remembers its txid, or `None` if `tx` is not part
    /// of the setup or instantiates a template that was already seen.
    pub fn match_tx(&mut self, tx: &Transaction) -> Option<&'a Template> {
        let set = self.set;
        let template = set
            .iter()
            .filter(|t| !t.is_external() && !self.txids.contains_key(&t.ordinal))
            .find(|t| self.matches(t, tx))?;

        self.txids.insert(template.ordinal, tx.compute_txid());
        Some(template)
    }
}

/// Scans the blocks `from..=to` for transactions of the setup.
///
/// Returns the newly confirmed transactions in chain order.
pub async fn scan_blocks<C: ChainClient + ?Sized>(
    client: &C,
    set: &TemplateSet,
    confirmed: &[ConfirmedTx],
    from: BitcoinBlockHeight,
    to: BitcoinBlockHeight,
) -> Result<Vec<ConfirmedTx>, ChainError> {
    let mut matcher = TemplateMatcher::new(set, confirmed)
        .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

    let mut found = Vec::new();
    for height in from..=to {
        let hash = client.get_block_hash(height).await?;
        let block = client.get_block(&hash).await?;
        trace!(%height, %hash, txs = block.txdata.len(), "scanning block");

        for tx in &block.txdata {
            if let Some(template) = matcher.match_tx(tx) {
                debug!(template = %template.name, txid = %tx.compute_txid(), %height, "found confirmed template");
                found.push(ConfirmedTx {
                    txid: tx.compute_txid(),
                    name: template.name,
                    height,
                    tx: tx.clone(),
                });
            }
        }
    }

    Ok(found)
}
