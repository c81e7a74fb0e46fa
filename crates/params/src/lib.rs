//! This crate contains the consensus-critical parameters that both parties of a dispute must agree
//! on before any template is generated, since they change scripts, amounts and txids.

pub mod default;
pub mod dispute;
pub mod errors;

pub use dispute::DisputeParams;
