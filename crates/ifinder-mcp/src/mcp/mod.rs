//! Envelope, capability calls, and (with feature `stdio`) the MCP server over them.

pub(crate) mod calls;
pub(crate) mod envelope;
#[cfg(feature = "stdio")]
mod server;

pub(crate) use calls::Capabilities;
#[cfg(feature = "stdio")]
pub(crate) use server::serve_stdio;
