//! `ifinder` crate (library surface).
//!
//! The primary entrypoint is the `ifinder` binary (CLI one-shots + MCP stdio server). This
//! library re-exports the engine crates so embedders can depend on one name.

pub use ifinder_core as core;
pub use ifinder_local as local;
