//! Storage for dispute setups: templates, confirmed transactions, the outgoing queue and setup
//! bookkeeping, each behind an async trait with in-memory and SQLite implementations.

pub mod errors;
pub mod inmemory;
pub mod outgoing;
pub mod persistent;
pub mod setup;
pub mod templates;
pub mod tracker;

pub use errors::{DbError, DbResult};

/// Everything the dispute manager needs from storage.
pub trait DisputeDb:
    setup::SetupDb + templates::TemplateDb + tracker::ChainTxDb + outgoing::OutgoingDb + Send + Sync
{
}

impl<T> DisputeDb for T where
    T: setup::SetupDb
        + templates::TemplateDb
        + tracker::ChainTxDb
        + outgoing::OutgoingDb
        + Send
        + Sync
{
}
