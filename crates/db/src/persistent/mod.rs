//! SQLite implementation of every storage trait.

pub mod config;
pub mod constants;
pub mod errors;
pub mod sqlite;
