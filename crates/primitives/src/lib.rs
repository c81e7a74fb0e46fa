//! This crate contains general types and pure functions shared across the dispute crates.
//!
//! It lies at the bottom of the crate-hierarchy in this workspace i.e., it does not depend on any
//! other crate in this workspace.

pub mod bisection;
pub mod errors;
pub mod template_name;
pub mod types;
