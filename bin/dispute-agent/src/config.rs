use std::{path::PathBuf, time::Duration};

use dispute_db::persistent::config::RetryPolicy;
use dispute_tracker::oracle::SimulatedTrace;
use serde::{Deserialize, Serialize};

/// The configuration values that dictate the behavior of the dispute agent.
///
/// Unlike the [`DisputeParams`](dispute_params::DisputeParams), these values are local to each
/// agent and need not match the counterpart's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// The number of confirmations required for a transaction to be considered final.
    pub finality_depth: u64,

    /// The first block scanned for setups that were never scanned.
    pub start_height: u64,

    /// The directory to store all the data in.
    pub datadir: PathBuf,

    /// The directory signed setups are imported from.
    pub setups_dir: PathBuf,

    /// Hex encoded secret all commitment chains of the agent are derived from.
    pub commitment_secret: String,

    /// Time between two polls of the chain.
    pub poll_interval: Duration,

    /// Time the running tick gets to finish once a shutdown was requested.
    pub shutdown_timeout: Duration,

    /// Time the trace oracle may take to answer for one duty.
    pub oracle_timeout: Duration,

    /// The number of worker threads of the runtime.
    pub num_threads: Option<u8>,

    /// The configuration required to connect to an instance of the bitcoin client.
    pub btc_client: BtcClientConfig,

    /// How failed sqlite3 operations are retried.
    #[serde(default)]
    pub db_retry: RetryPolicy,

    /// The program trace the dispute is about.
    ///
    /// NOTE: the simulated trace only exists for testing and *must* not be used in production.
    pub trace: SimulatedTrace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BtcClientConfig {
    pub url: String,
    pub user: String,
    pub pass: String,

    /// Time a single request may take.
    pub timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_toml() {
        let config = r#"
            finality_depth = 6
            start_height = 100
            datadir = ".data"
            setups_dir = "setups"
            commitment_secret = "0102030405060708"
            poll_interval = { secs = 10, nanos = 0 }
            shutdown_timeout = { secs = 30, nanos = 0 }
            oracle_timeout = { secs = 60, nanos = 0 }
            num_threads = 2

            [btc_client]
            url = "http://localhost:18443"
            user = "user"
            pass = "password"
            timeout = { secs = 5, nanos = 0 }

            [db_retry]
            retries = 3
            max_backoff = { secs = 2, nanos = 0 }

            [trace]
            seed = "bisection"
            instruction_count = 1000000
            proof = [
                "0000000000000000000000000000000000000000000000000000000000000001",
                "0000000000000000000000000000000000000000000000000000000000000002",
            ]
            proof_valid = true
        "#;

        let config = toml::from_str::<Config>(config);
        assert!(
            config.is_ok(),
            "must be able to deserialize config from toml but got: {}",
            config.unwrap_err()
        );

        let config = config.unwrap();
        assert_eq!(config.finality_depth, 6);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.trace.faulty_from, None);
        assert_eq!(config.trace.proof.len(), 2);
        assert_eq!(config.db_retry.retries, 3);
        assert_eq!(
            config.db_retry.first_backoff,
            RetryPolicy::default().first_backoff,
            "unset retry fields fall back to their defaults"
        );

        let serialized = toml::to_string(&config).unwrap();
        let deserialized = toml::from_str::<Config>(&serialized).unwrap();

        assert_eq!(
            deserialized, config,
            "must be able to serialize and deserialize config to toml"
        );
    }
}
