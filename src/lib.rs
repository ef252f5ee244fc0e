#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_html_tags)]
#![deny(rustdoc::bare_urls)]
#![deny(clippy::missing_panics_doc)]

//! mcp-stdio runs named tools behind a JSON-RPC 2.0 interface carried as
//! newline-delimited JSON over standard input and output.
//!
//! A [`ToolHost`] owns a [`ToolRegistry`] and answers `initialize`, `ping`,
//! `tools/list` and `tools/call` one line at a time. A [`ToolCaller`] spawns a
//! host as a child process, performs the handshake and invokes tools with a
//! per-call timeout. [`bridge::BlockingToolCaller`] drives a caller from
//! synchronous code.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use mcp_stdio::{HostCommand, ToolCaller};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut caller = ToolCaller::new(HostCommand::new("tool-host"));
//!     caller.start().await?;
//!
//!     for tool in caller.list_tools(Duration::from_secs(10)).await? {
//!         println!("{}: {}", tool.name, tool.description);
//!     }
//!
//!     let result = caller
//!         .call("multiply-two-numbers", json!({"a": 8, "b": 7}), Duration::from_secs(10))
//!         .await?;
//!     println!("8 x 7 = {}", result.value());
//!
//!     caller.disconnect().await?;
//!     Ok(())
//! }
//! ```

/// Protocol layer: envelopes, line codec, dispatch, host and caller.
pub mod mcp;

/// Utility modules for error handling.
pub mod utils;

/// YAML configuration
pub mod config;

/// Logging and metric events
pub mod telemetry;

/// Generative-language client and retry policy
pub mod upstream;

/// Blocking adapter over the async caller
pub mod bridge;

/// Tool functions served by the host binary
pub mod tools;

pub use mcp::caller::{CallerConfig, HostCommand, ToolCaller};
pub use mcp::host::ToolHost;
pub use mcp::protocol::McpProtocol;
pub use mcp::tools::{Tool, ToolError, ToolErrorKind, ToolRegistry, ToolResult};
pub use utils::error::{McpError, McpResult};

/// Re-export telemetry types and functions for easier access
pub use telemetry::{add_metric, add_metrics, init_telemetry, span_duration, TelemetryConfig};
