//! This crate describes every transaction of a bisection dispute as a graph of templates, and
//! takes that graph from generation through key exchange, script compilation, funding and
//! signing.

pub mod amounts;
pub mod commitments;
pub mod dot;
pub mod errors;
pub mod graph;
pub mod protocol;
pub mod scripts;
pub mod set;
pub mod signing;
pub mod template;

pub use graph::TemplateGraph;
pub use set::TemplateSet;
pub use template::{FundingUtxo, Input, Output, SpendRef, SpendingCondition, Template};
