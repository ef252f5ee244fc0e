//! Tool functions served by the `tool-host` binary.
//!
//! [`builtin`] holds small self-contained tools (arithmetic, text, date).
//! [`inaturalist`] holds the biodiversity lookups; its HTTP client is behind
//! the `inaturalist` feature.

pub mod builtin;
pub mod inaturalist;

use crate::mcp::tools::ToolRegistry;
use crate::utils::error::McpResult;

/// Registry with every tool enabled in this build
pub fn default_registry() -> McpResult<ToolRegistry> {
    #[allow(unused_mut)]
    let mut registry = builtin::builtin_registry()?;
    #[cfg(feature = "inaturalist")]
    inaturalist::register_inaturalist_tools(&mut registry)?;
    Ok(registry)
}
