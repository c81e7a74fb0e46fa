//! Bookkeeping of setups.

use async_trait::async_trait;
use dispute_primitives::types::{BitcoinBlockHeight, SetupId, SetupStatus};

use crate::errors::DbResult;

/// Tracks which setups exist and how far their chain scan got.
#[async_trait]
pub trait SetupDb {
    /// Returns the status of a setup, if it is known.
    async fn get_setup_status(&self, setup_id: &SetupId) -> DbResult<Option<SetupStatus>>;

    /// Creates the setup or moves it to `status`.
    async fn set_setup_status(&self, setup_id: &SetupId, status: SetupStatus) -> DbResult<()>;

    /// Lists the setups currently in `status`, ordered by id.
    async fn get_setups_with_status(&self, status: SetupStatus) -> DbResult<Vec<SetupId>>;

    /// Returns the last block height the chain watcher finished scanning for a setup.
    async fn get_last_scanned_height(
        &self,
        setup_id: &SetupId,
    ) -> DbResult<Option<BitcoinBlockHeight>>;

    /// Records the last block height scanned for a setup.
    async fn set_last_scanned_height(
        &self,
        setup_id: &SetupId,
        height: BitcoinBlockHeight,
    ) -> DbResult<()>;
}
