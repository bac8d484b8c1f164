//! CLI command implementations.

pub mod module;
