//! This crate implements a system that watches the chain for the transactions of dispute setups and
//! responds to them in accordance with the bisection protocol rules.

pub mod chain;
pub mod dispute_manager;
pub mod dispute_state_machine;
pub mod errors;
pub mod executors;
pub mod oracle;
pub mod shutdown;
