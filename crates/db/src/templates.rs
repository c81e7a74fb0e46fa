//! Storage of the template graph of each setup.

use async_trait::async_trait;
use dispute_primitives::{template_name::TemplateName, types::SetupId};
use dispute_tx_graph::{Template, TemplateSet};

use crate::errors::DbResult;

/// Stores templates keyed by setup and template name.
#[async_trait]
pub trait TemplateDb {
    /// Inserts or replaces every template of `set`.
    async fn put_templates(&self, setup_id: &SetupId, set: &TemplateSet) -> DbResult<()>;

    /// Returns all templates of a setup, or `None` if none were stored.
    async fn get_templates(&self, setup_id: &SetupId) -> DbResult<Option<TemplateSet>>;

    /// Returns a single template.
    async fn get_template(
        &self,
        setup_id: &SetupId,
        name: TemplateName,
    ) -> DbResult<Option<Template>>;
}
