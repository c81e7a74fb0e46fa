//! Graphviz rendering of a template set.

use std::fmt;

use dispute_params::DisputeParams;
use dispute_primitives::types::Role;

use crate::set::TemplateSet;

const PROVER_COLOR: &str = "darkgreen";
const VERIFIER_COLOR: &str = "darkblue";
const SYMBOLIC_COLOR: &str = "gray";

fn color(role: Role) -> &'static str {
    match role {
        Role::Prover => PROVER_COLOR,
        Role::Verifier => VERIFIER_COLOR,
    }
}

/// Renders templates as nodes and spent conditions as edges, e.g. `to_string()` on
/// `DotGraph::new(&set, &params)`.
#[derive(Debug, Clone, Copy)]
pub struct DotGraph<'a> {
    set: &'a TemplateSet,
    params: &'a DisputeParams,
}

impl<'a> DotGraph<'a> {
    /// Wraps a set for rendering.
    pub fn new(set: &'a TemplateSet, params: &'a DisputeParams) -> Self {
        Self { set, params }
    }
}

impl fmt::Display for DotGraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph dispute {{")?;
        writeln!(f, "  rankdir=TB;")?;
        writeln!(f, "  node [shape=record, fontname=monospace];")?;

        for template in self.set.iter() {
            let outputs = template
                .outputs
                .iter()
                .enumerate()
                .map(|(idx, output)| match output.amount {
                    Some(amount) => format!("<o{idx}> {idx}: {} sat", amount.to_sat()),
                    None => format!("<o{idx}> {idx}: ?"),
                })
                .collect::<Vec<_>>()
                .join(" | ");
            writeln!(
                f,
                "  \"{name}\" [label=\"{{{name} ({owner}) | {{{outputs}}}}}\", color={color}];",
                name = template.name,
                owner = template.owner,
                color = color(template.owner),
            )?;
        }

        for template in self.set.iter() {
            for input in &template.inputs {
                let (parent, output, cond) = self.set.spent(input);
                let mut label = format!("{}/{}", input.spends.output, input.spends.condition);
                if let Some(timeout) = cond.timeout_blocks {
                    label.push_str(&format!(" after {timeout}"));
                }
                if cond.has_commitments() {
                    label.push_str(&format!(" [{} commitments]", cond.wots_spec.len()));
                }

                let edge_color = if output.amount == Some(self.params.symbolic_amount) {
                    SYMBOLIC_COLOR
                } else {
                    color(cond.next_role)
                };
                let style = if cond.timeout_blocks.is_some() {
                    "dashed"
                } else {
                    "solid"
                };

                writeln!(
                    f,
                    "  \"{}\":o{} -> \"{}\" [label=\"{label}\", color={edge_color}, style={style}];",
                    parent.name, input.spends.output, template.name,
                )?;
            }
        }

        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{hashes::Hash, Amount, OutPoint, Txid};

    use super::*;
    use crate::{protocol::generate_templates, template::FundingUtxo};

    #[test]
    fn test_renders_every_template_and_edge() {
        let params = DisputeParams::default().with_iterations(2);
        let funding = |byte| FundingUtxo {
            outpoint: OutPoint {
                txid: Txid::from_byte_array([byte; 32]),
                vout: 0,
            },
            amount: Amount::from_int_btc(1),
        };
        let set = generate_templates(&params, funding(1), funding(2)).unwrap();

        let dot = DotGraph::new(&set, &params).to_string();
        assert!(dot.starts_with("digraph dispute {"));
        assert!(dot.contains("\"select_01\":o5 -> \"argument\""));
        assert!(dot.contains("\"proof\":o0 -> \"challenge_uncontested\" [label=\"0/2 after 18\""));

        let edges = dot.lines().filter(|l| l.contains("->")).count();
        let inputs: usize = set.iter().map(|t| t.inputs.len()).sum();
        assert_eq!(edges, inputs);
    }
}
