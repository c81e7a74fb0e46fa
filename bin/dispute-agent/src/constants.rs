use std::time::Duration;

pub(crate) const DEFAULT_THREAD_COUNT: u8 = 4;

pub(crate) const DB_NAME: &str = "dispute.db";

pub(crate) const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);
