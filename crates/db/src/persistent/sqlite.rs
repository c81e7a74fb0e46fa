//! SQLite implementation of the persistent storage layer.

use std::future::Future;

use async_trait::async_trait;
use bitcoin::{consensus, ScriptBuf, Txid};
use dispute_primitives::{
    template_name::TemplateName,
    types::{BitcoinBlockHeight, SetupId, SetupStatus},
};
use dispute_tx_graph::{Template, TemplateSet};
use sqlx::SqlitePool;
use tracing::warn;

use super::{config::RetryPolicy, errors::StorageError};
use crate::{
    errors::{DbError, DbResult},
    outgoing::{OutgoingDb, OutgoingStatus, OutgoingTx},
    setup::SetupDb,
    templates::TemplateDb,
    tracker::{ChainTxDb, ConfirmedTx},
};

/// Storage backed by a SQLite pool whose schema was created by the workspace migrations.
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
}

impl SqliteDb {
    /// Wraps a migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Runs `op` until it succeeds, fails permanently or exhausts the retries of `policy`.
pub async fn execute_with_retries<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(DbError::Storage(err)) if err.is_transient() && attempt < policy.retries => {
                attempt += 1;
                let backoff = policy.backoff(attempt);
                warn!(%err, %attempt, ?backoff, "database operation failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn to_db_height(height: BitcoinBlockHeight) -> Result<i64, StorageError> {
    i64::try_from(height).map_err(|_| StorageError::MismatchedTypes(format!("height {height}")))
}

fn from_db_height(height: i64) -> Result<BitcoinBlockHeight, StorageError> {
    u64::try_from(height).map_err(|_| StorageError::MismatchedTypes(format!("height {height}")))
}

fn parse_name(name: &str) -> Result<TemplateName, StorageError> {
    name.parse()
        .map_err(|e| StorageError::MismatchedTypes(format!("template name: {e}")))
}

fn encode_status<T: serde::Serialize>(status: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(status)?)
}

#[async_trait]
impl SetupDb for SqliteDb {
    async fn get_setup_status(&self, setup_id: &SetupId) -> DbResult<Option<SetupStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM setups WHERE setup_id = ?")
                .bind(setup_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)?;

        status
            .map(|s| serde_json::from_str(&s).map_err(|e| StorageError::from(e).into()))
            .transpose()
    }

    async fn set_setup_status(&self, setup_id: &SetupId, status: SetupStatus) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO setups (setup_id, status) VALUES (?, ?)
            ON CONFLICT(setup_id) DO UPDATE SET status = excluded.status"#,
        )
        .bind(setup_id.as_str())
        .bind(encode_status(&status)?)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(())
    }

    async fn get_setups_with_status(&self, status: SetupStatus) -> DbResult<Vec<SetupId>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT setup_id FROM setups WHERE status = ? ORDER BY setup_id")
                .bind(encode_status(&status)?)
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;

        Ok(ids.into_iter().map(SetupId::new).collect())
    }

    async fn get_last_scanned_height(
        &self,
        setup_id: &SetupId,
    ) -> DbResult<Option<BitcoinBlockHeight>> {
        let height: Option<Option<i64>> =
            sqlx::query_scalar("SELECT last_scanned_height FROM setups WHERE setup_id = ?")
                .bind(setup_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)?;

        Ok(height.flatten().map(from_db_height).transpose()?)
    }

    async fn set_last_scanned_height(
        &self,
        setup_id: &SetupId,
        height: BitcoinBlockHeight,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE setups SET last_scanned_height = ? WHERE setup_id = ?")
            .bind(to_db_height(height)?)
            .bind(setup_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::InvalidData(format!("unknown setup {setup_id}")).into());
        }

        Ok(())
    }
}

#[async_trait]
impl TemplateDb for SqliteDb {
    async fn put_templates(&self, setup_id: &SetupId, set: &TemplateSet) -> DbResult<()> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        for template in set.iter() {
            let ordinal = i64::try_from(template.ordinal)
                .map_err(|_| StorageError::MismatchedTypes("ordinal".to_string()))?;
            sqlx::query(
                r#"INSERT OR REPLACE INTO templates (setup_id, name, ordinal, template)
                VALUES (?, ?, ?, ?)"#,
            )
            .bind(setup_id.as_str())
            .bind(template.name.to_string())
            .bind(ordinal)
            .bind(serde_json::to_string(template).map_err(StorageError::from)?)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;
        }

        tx.commit().await.map_err(StorageError::from)?;

        Ok(())
    }

    async fn get_templates(&self, setup_id: &SetupId) -> DbResult<Option<TemplateSet>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT template FROM templates WHERE setup_id = ? ORDER BY ordinal",
        )
        .bind(setup_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let templates = rows
            .iter()
            .map(|row| serde_json::from_str::<Template>(row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        let set = TemplateSet::from_templates(templates)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        Ok(Some(set))
    }

    async fn get_template(
        &self,
        setup_id: &SetupId,
        name: TemplateName,
    ) -> DbResult<Option<Template>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT template FROM templates WHERE setup_id = ? AND name = ?")
                .bind(setup_id.as_str())
                .bind(name.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)?;

        Ok(row
            .map(|row| serde_json::from_str(&row))
            .transpose()
            .map_err(StorageError::from)?)
    }
}

#[async_trait]
impl ChainTxDb for SqliteDb {
    async fn add_confirmed_tx(&self, setup_id: &SetupId, tx: ConfirmedTx) -> DbResult<()> {
        sqlx::query(
            r#"INSERT OR IGNORE INTO confirmed_txs (setup_id, name, txid, height, raw_tx)
            VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(setup_id.as_str())
        .bind(tx.name.to_string())
        .bind(tx.txid.to_string())
        .bind(to_db_height(tx.height)?)
        .bind(consensus::serialize(&tx.tx))
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(())
    }

    async fn get_confirmed_txs(&self, setup_id: &SetupId) -> DbResult<Vec<ConfirmedTx>> {
        let rows: Vec<(String, String, i64, Vec<u8>)> = sqlx::query_as(
            "SELECT name, txid, height, raw_tx FROM confirmed_txs WHERE setup_id = ?",
        )
        .bind(setup_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        let txs = rows
            .into_iter()
            .map(|(name, txid, height, raw_tx)| {
                let txid: Txid = txid
                    .parse()
                    .map_err(|e| StorageError::MismatchedTypes(format!("txid: {e}")))?;
                let tx = consensus::deserialize(&raw_tx)
                    .map_err(|e| StorageError::MismatchedTypes(format!("transaction: {e}")))?;

                Ok(ConfirmedTx {
                    txid,
                    name: parse_name(&name)?,
                    height: from_db_height(height)?,
                    tx,
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        Ok(txs)
    }
}

fn outgoing_from_row(
    (name, witness, script, status): (String, String, Option<Vec<u8>>, String),
) -> Result<OutgoingTx, StorageError> {
    Ok(OutgoingTx {
        name: parse_name(&name)?,
        witness: serde_json::from_str(&witness)?,
        script: script.map(ScriptBuf::from),
        status: serde_json::from_str(&status)?,
    })
}

#[async_trait]
impl OutgoingDb for SqliteDb {
    async fn queue_outgoing(&self, setup_id: &SetupId, outgoing: OutgoingTx) -> DbResult<bool> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT status FROM outgoing WHERE setup_id = ? AND name = ?")
                .bind(setup_id.as_str())
                .bind(outgoing.name.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(StorageError::from)?;
        if let Some(existing) = existing {
            let status: OutgoingStatus =
                serde_json::from_str(&existing).map_err(StorageError::from)?;
            if status.is_pending_or_done() {
                return Ok(false);
            }
        }

        sqlx::query(
            r#"INSERT OR REPLACE INTO outgoing (setup_id, name, witness, script, status)
            VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(setup_id.as_str())
        .bind(outgoing.name.to_string())
        .bind(serde_json::to_string(&outgoing.witness).map_err(StorageError::from)?)
        .bind(outgoing.script.map(ScriptBuf::into_bytes))
        .bind(encode_status(&outgoing.status)?)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;

        Ok(true)
    }

    async fn get_outgoing(
        &self,
        setup_id: &SetupId,
        name: TemplateName,
    ) -> DbResult<Option<OutgoingTx>> {
        let row: Option<(String, String, Option<Vec<u8>>, String)> = sqlx::query_as(
            "SELECT name, witness, script, status FROM outgoing WHERE setup_id = ? AND name = ?",
        )
        .bind(setup_id.as_str())
        .bind(name.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(outgoing_from_row).transpose()?)
    }

    async fn get_ready_outgoing(&self, setup_id: &SetupId) -> DbResult<Vec<OutgoingTx>> {
        let rows: Vec<(String, String, Option<Vec<u8>>, String)> = sqlx::query_as(
            "SELECT name, witness, script, status FROM outgoing WHERE setup_id = ? AND status = ?",
        )
        .bind(setup_id.as_str())
        .bind(encode_status(&OutgoingStatus::Ready)?)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(outgoing_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn set_outgoing_status(
        &self,
        setup_id: &SetupId,
        name: TemplateName,
        status: OutgoingStatus,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE outgoing SET status = ? WHERE setup_id = ? AND name = ?")
            .bind(encode_status(&status)?)
            .bind(setup_id.as_str())
            .bind(name.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::InvalidData(format!("no outgoing {name} for {setup_id}")).into());
        }

        Ok(())
    }
}
