//! CLI command implementations.

pub mod config;
pub mod eval;
pub mod search;
mod setup;
pub mod snapshot;
