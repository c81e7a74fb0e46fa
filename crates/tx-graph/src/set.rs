//! Arena holding the templates of one party, indexed by ordinal and by name.

use std::collections::BTreeMap;

use dispute_primitives::template_name::TemplateName;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{TxGraphError, TxGraphResult},
    template::{Input, Output, SpendRef, SpendingCondition, Template, TemplateIdx},
};

/// An ordinally sorted set of templates whose inputs only ever point backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Template>", into = "Vec<Template>")]
pub struct TemplateSet {
    templates: Vec<Template>,
    by_name: BTreeMap<TemplateName, TemplateIdx>,
}

impl TemplateSet {
    /// Builds the arena, checking that every template sits at its ordinal, names are unique and
    /// every input spends an existing condition of an earlier template.
    pub fn from_templates(mut templates: Vec<Template>) -> TxGraphResult<Self> {
        templates.sort_by_key(|t| t.ordinal);

        let mut by_name = BTreeMap::new();
        for (idx, template) in templates.iter().enumerate() {
            if template.ordinal != idx {
                return Err(TxGraphError::GraphIntegrity(format!(
                    "{} has ordinal {} at position {idx}",
                    template.name, template.ordinal
                )));
            }

            for (input_idx, input) in template.inputs.iter().enumerate() {
                check_spend_ref(&templates[..idx], template.name, input_idx, &input.spends)?;
            }

            if by_name.insert(template.name, idx).is_some() {
                return Err(TxGraphError::GraphIntegrity(format!(
                    "duplicate template {}",
                    template.name
                )));
            }
        }

        Ok(Self { templates, by_name })
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the set holds no templates.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Iterates the templates in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = &Template> + '_ {
        self.templates.iter()
    }

    /// Returns the template at `idx`.
    pub fn get(&self, idx: TemplateIdx) -> Option<&Template> {
        self.templates.get(idx)
    }

    /// Looks a template up by name.
    pub fn by_name(&self, name: TemplateName) -> TxGraphResult<&Template> {
        self.index_of(name).map(|idx| &self.templates[idx])
    }

    /// Returns the ordinal of the template called `name`.
    pub fn index_of(&self, name: TemplateName) -> TxGraphResult<TemplateIdx> {
        self.by_name
            .get(&name)
            .copied()
            .ok_or(TxGraphError::UnknownTemplate(name))
    }

    /// Mutable lookup by name.
    pub fn by_name_mut(&mut self, name: TemplateName) -> TxGraphResult<&mut Template> {
        let idx = self.index_of(name)?;
        Ok(&mut self.templates[idx])
    }

    /// Returns the template, output and condition an input spends.
    ///
    /// Integrity was checked on construction, so references always resolve.
    pub fn spent(&self, input: &Input) -> (&Template, &Output, &SpendingCondition) {
        let SpendRef {
            template,
            output,
            condition,
        } = input.spends;
        let parent = &self.templates[template];
        let output = &parent.outputs[output];
        (parent, output, &output.spending_conditions[condition])
    }

    /// Iterates mutably over all templates.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Template> + '_ {
        self.templates.iter_mut()
    }

    /// Mutable access by ordinal.
    pub(crate) fn get_mut(&mut self, idx: TemplateIdx) -> Option<&mut Template> {
        self.templates.get_mut(idx)
    }

    /// Consumes the set, returning the templates in ordinal order.
    pub fn into_templates(self) -> Vec<Template> {
        self.templates
    }
}

fn check_spend_ref(
    earlier: &[Template],
    spender: TemplateName,
    input_idx: usize,
    spends: &SpendRef,
) -> TxGraphResult<()> {
    let parent = earlier.get(spends.template).ok_or_else(|| {
        TxGraphError::GraphIntegrity(format!(
            "{spender} input {input_idx} spends template #{} which is not earlier in the graph",
            spends.template
        ))
    })?;

    parent
        .outputs
        .get(spends.output)
        .and_then(|o| o.spending_conditions.get(spends.condition))
        .map(|_| ())
        .ok_or_else(|| {
            TxGraphError::GraphIntegrity(format!(
                "{spender} input {input_idx} spends missing {}/{}/{}",
                parent.name, spends.output, spends.condition
            ))
        })
}

impl TryFrom<Vec<Template>> for TemplateSet {
    type Error = TxGraphError;

    fn try_from(templates: Vec<Template>) -> Result<Self, Self::Error> {
        Self::from_templates(templates)
    }
}

impl From<TemplateSet> for Vec<Template> {
    fn from(set: TemplateSet) -> Self {
        set.templates
    }
}
