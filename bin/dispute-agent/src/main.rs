//! The dispute agent takes part in bisection disputes as either the prover or the verifier.

use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context};
use args::OperationMode;
use clap::Parser;
use config::Config;
use constants::{DB_NAME, DEFAULT_RPC_TIMEOUT, DEFAULT_THREAD_COUNT};
use dispute_common::logging::{self, LoggerConfig};
use dispute_db::persistent::sqlite::SqliteDb;
use dispute_params::DisputeParams;
use dispute_primitives::types::Role;
use dispute_tracker::{
    dispute_manager::{DisputeManager, ManagerConfig},
    shutdown::{drain, ShutdownSignal},
};
use rpc::BitcoinRpcClient;
use serde::de::DeserializeOwned;
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tokio::runtime;
use tracing::{debug, info, trace};
use wots::CommitmentSecret;

mod args;
mod config;
mod rpc;
mod setups;

mod constants;

fn main() -> anyhow::Result<()> {
    logging::init(LoggerConfig::with_base_name("dispute-agent"));

    let cli = args::Cli::parse();
    info!(mode = %cli.mode, "starting dispute agent");

    let params = parse_toml::<DisputeParams>(&cli.params)?;
    params.validate()?;
    let config = parse_toml::<Config>(&cli.config)?;

    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(config.num_threads.unwrap_or(DEFAULT_THREAD_COUNT).into())
        .enable_all()
        .build()
        .context("could not create runtime")?;

    runtime.block_on(run(cli.mode, params, config))?;

    info!("dispute agent shutdown complete");
    Ok(())
}

async fn run(mode: OperationMode, params: DisputeParams, config: Config) -> anyhow::Result<()> {
    let role = Role::from(mode);
    let secret = CommitmentSecret::new(
        hex::decode(&config.commitment_secret).context("commitment secret must be hex")?,
    );

    let db = Arc::new(init_database_handle(&config.datadir).await?);
    let imported = setups::import_setups(db.as_ref(), &config.setups_dir).await?;
    info!(count = imported.len(), "imported setups");

    let chain = Arc::new(BitcoinRpcClient::new(&config.btc_client, DEFAULT_RPC_TIMEOUT)?);

    let manager_config = ManagerConfig {
        role,
        finality_depth: config.finality_depth,
        start_height: config.start_height,
        poll_interval: config.poll_interval,
        rpc_timeout: config.btc_client.timeout.unwrap_or(DEFAULT_RPC_TIMEOUT),
        oracle_timeout: config.oracle_timeout,
        db_retry: config.db_retry,
    };
    let manager = DisputeManager::new(
        manager_config,
        params,
        secret,
        db,
        chain,
        config.trace.clone(),
    );

    let (signal, guard) = ShutdownSignal::new();
    let mut handle = manager.spawn(guard);

    tokio::select! {
        res = &mut handle => {
            res.context("dispute manager crashed")?;
            return Err(anyhow!("dispute manager stopped unexpectedly"));
        }
        res = tokio::signal::ctrl_c() => {
            res.context("could not listen for ctrl-c")?;
        }
    }

    signal.send();
    let finished = drain(
        async {
            if let Err(e) = handle.await {
                tracing::error!(%e, "dispute manager crashed during shutdown");
            }
        },
        config.shutdown_timeout,
    )
    .await;
    debug!(%finished, "drained dispute manager");

    Ok(())
}

async fn init_database_handle(datadir: &Path) -> anyhow::Result<SqliteDb> {
    let db_path = create_db_file(datadir, DB_NAME)?;

    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await
        .context("should be able to connect to db")?;

    let migrations_path = env::current_dir()?.join("migrations");
    info!(?migrations_path, exists = %migrations_path.exists(), "migrations path");

    let migrator = Migrator::new(migrations_path)
        .await
        .context("should be able to initialize migrator")?;

    info!(action = "running migrations", %DB_NAME);
    migrator
        .run(&pool)
        .await
        .context("should be able to run migrations")?;

    Ok(SqliteDb::new(pool))
}

fn create_db_file(datadir: impl AsRef<Path>, db_name: &str) -> anyhow::Result<PathBuf> {
    if !datadir.as_ref().exists() {
        fs::create_dir_all(datadir.as_ref()).with_context(|| {
            format!("could not create datadir {}", datadir.as_ref().display())
        })?;
    }

    Ok(datadir.as_ref().join(db_name))
}

/// Reads and parses a TOML file from the given path into the given type `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> anyhow::Result<T>
where
    T: std::fmt::Debug + DeserializeOwned,
{
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read TOML file {}", path.display()))?;
    trace!(?raw, "read file");

    let parsed = toml::from_str::<T>(&raw)
        .with_context(|| format!("failed to parse TOML file {}", path.display()))?;
    debug!(?parsed, "parsed TOML file");

    Ok(parsed)
}
