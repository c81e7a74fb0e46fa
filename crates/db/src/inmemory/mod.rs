//! In-memory implementation of every storage trait, for tests and ephemeral agents.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use dispute_primitives::{
    template_name::TemplateName,
    types::{BitcoinBlockHeight, SetupId, SetupStatus},
};
use dispute_tx_graph::{Template, TemplateSet};
use tokio::sync::RwLock;

use crate::{
    errors::DbResult,
    outgoing::{OutgoingDb, OutgoingStatus, OutgoingTx},
    setup::SetupDb,
    templates::TemplateDb,
    tracker::{ChainTxDb, ConfirmedTx},
};

pub mod errors;

use errors::InMemoryError;

#[derive(Debug, Clone, Copy)]
struct SetupEntry {
    status: SetupStatus,
    last_scanned_height: Option<BitcoinBlockHeight>,
}

/// Keeps everything in maps behind [`RwLock`]s.
#[derive(Debug, Clone, Default)]
pub struct DisputeInMemoryDb {
    setups: Arc<RwLock<BTreeMap<SetupId, SetupEntry>>>,

    templates: Arc<RwLock<HashMap<SetupId, BTreeMap<TemplateName, Template>>>>,

    confirmed: Arc<RwLock<HashMap<SetupId, BTreeMap<TemplateName, ConfirmedTx>>>>,

    outgoing: Arc<RwLock<HashMap<SetupId, BTreeMap<TemplateName, OutgoingTx>>>>,
}

#[async_trait]
impl SetupDb for DisputeInMemoryDb {
    async fn get_setup_status(&self, setup_id: &SetupId) -> DbResult<Option<SetupStatus>> {
        Ok(self.setups.read().await.get(setup_id).map(|e| e.status))
    }

    async fn set_setup_status(&self, setup_id: &SetupId, status: SetupStatus) -> DbResult<()> {
        let mut setups = self.setups.write().await;

        setups
            .entry(setup_id.clone())
            .and_modify(|e| e.status = status)
            .or_insert(SetupEntry {
                status,
                last_scanned_height: None,
            });

        Ok(())
    }

    async fn get_setups_with_status(&self, status: SetupStatus) -> DbResult<Vec<SetupId>> {
        Ok(self
            .setups
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.status == status)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn get_last_scanned_height(
        &self,
        setup_id: &SetupId,
    ) -> DbResult<Option<BitcoinBlockHeight>> {
        Ok(self
            .setups
            .read()
            .await
            .get(setup_id)
            .and_then(|e| e.last_scanned_height))
    }

    async fn set_last_scanned_height(
        &self,
        setup_id: &SetupId,
        height: BitcoinBlockHeight,
    ) -> DbResult<()> {
        let mut setups = self.setups.write().await;

        let entry = setups.get_mut(setup_id).ok_or(InMemoryError::NotFound)?;
        entry.last_scanned_height = Some(height);

        Ok(())
    }
}

#[async_trait]
impl TemplateDb for DisputeInMemoryDb {
    async fn put_templates(&self, setup_id: &SetupId, set: &TemplateSet) -> DbResult<()> {
        let mut templates = self.templates.write().await;

        let stored = templates.entry(setup_id.clone()).or_default();
        for template in set.iter() {
            stored.insert(template.name, template.clone());
        }

        Ok(())
    }

    async fn get_templates(&self, setup_id: &SetupId) -> DbResult<Option<TemplateSet>> {
        let templates = self.templates.read().await;

        let Some(stored) = templates.get(setup_id) else {
            return Ok(None);
        };
        let set = TemplateSet::from_templates(stored.values().cloned().collect())
            .map_err(|e| InMemoryError::Corrupt(e.to_string()))?;

        Ok(Some(set))
    }

    async fn get_template(
        &self,
        setup_id: &SetupId,
        name: TemplateName,
    ) -> DbResult<Option<Template>> {
        Ok(self
            .templates
            .read()
            .await
            .get(setup_id)
            .and_then(|stored| stored.get(&name))
            .cloned())
    }
}

#[async_trait]
impl ChainTxDb for DisputeInMemoryDb {
    async fn add_confirmed_tx(&self, setup_id: &SetupId, tx: ConfirmedTx) -> DbResult<()> {
        let mut confirmed = self.confirmed.write().await;

        confirmed
            .entry(setup_id.clone())
            .or_default()
            .entry(tx.name)
            .or_insert(tx);

        Ok(())
    }

    async fn get_confirmed_txs(&self, setup_id: &SetupId) -> DbResult<Vec<ConfirmedTx>> {
        Ok(self
            .confirmed
            .read()
            .await
            .get(setup_id)
            .map(|txs| txs.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl OutgoingDb for DisputeInMemoryDb {
    async fn queue_outgoing(&self, setup_id: &SetupId, tx: OutgoingTx) -> DbResult<bool> {
        let mut outgoing = self.outgoing.write().await;

        let queue = outgoing.entry(setup_id.clone()).or_default();
        if queue
            .get(&tx.name)
            .is_some_and(|existing| existing.status.is_pending_or_done())
        {
            return Ok(false);
        }
        queue.insert(tx.name, tx);

        Ok(true)
    }

    async fn get_outgoing(
        &self,
        setup_id: &SetupId,
        name: TemplateName,
    ) -> DbResult<Option<OutgoingTx>> {
        Ok(self
            .outgoing
            .read()
            .await
            .get(setup_id)
            .and_then(|queue| queue.get(&name))
            .cloned())
    }

    async fn get_ready_outgoing(&self, setup_id: &SetupId) -> DbResult<Vec<OutgoingTx>> {
        Ok(self
            .outgoing
            .read()
            .await
            .get(setup_id)
            .map(|queue| {
                queue
                    .values()
                    .filter(|tx| tx.status == OutgoingStatus::Ready)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_outgoing_status(
        &self,
        setup_id: &SetupId,
        name: TemplateName,
        status: OutgoingStatus,
    ) -> DbResult<()> {
        let mut outgoing = self.outgoing.write().await;

        let tx = outgoing
            .get_mut(setup_id)
            .and_then(|queue| queue.get_mut(&name))
            .ok_or(InMemoryError::NotFound)?;
        tx.status = status;

        Ok(())
    }
}
