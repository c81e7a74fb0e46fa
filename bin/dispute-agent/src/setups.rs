//! Imports signed setups into the database.

use std::{fs, path::Path};

use anyhow::Context;
use dispute_db::{setup::SetupDb, templates::TemplateDb, DisputeDb};
use dispute_primitives::types::{Role, SetupId, SetupStatus};
use dispute_tx_graph::{signing::check_signed, TemplateSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A setup as exported after both parties signed the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SetupFile {
    pub setup_id: SetupId,
    pub templates: TemplateSet,
}

/// Imports every `*.json` setup in `dir` that the database does not know yet and marks it active.
///
/// Returns the ids of the imported setups.
pub(crate) async fn import_setups<D: DisputeDb>(db: &D, dir: &Path) -> anyhow::Result<Vec<SetupId>> {
    if !dir.exists() {
        warn!(?dir, "setups directory does not exist, nothing to import");
        return Ok(vec![]);
    }

    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("could not read {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|path| path.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    let mut imported = vec![];
    for path in paths {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let setup: SetupFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid setup file {}", path.display()))?;
        let setup_id = setup.setup_id;

        if db.get_setup_status(&setup_id).await?.is_some() {
            debug!(%setup_id, "setup already known");
            continue;
        }

        if let Err(e) = check_signed(&setup.templates, Role::Prover)
            .and_then(|()| check_signed(&setup.templates, Role::Verifier))
        {
            warn!(%setup_id, %e, path = %path.display(), "skipping setup that is not fully signed");
            continue;
        }

        db.put_templates(&setup_id, &setup.templates).await?;
        db.set_setup_status(&setup_id, SetupStatus::Active).await?;
        info!(%setup_id, templates = setup.templates.len(), "imported setup");
        imported.push(setup_id);
    }

    Ok(imported)
}
