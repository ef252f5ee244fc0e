//! # Tools
//!
//! A tool is a named function with a declared input schema. A host owns one
//! [`ToolRegistry`] and serves it through `tools/list` and `tools/call`.
//!
//! ## Features
//!
//! - Tool descriptors with typed parameters, rendered as JSON Schema
//! - Argument validation with defaults for optional parameters
//! - Sync and async tool functions
//! - Typed failures (`unknown tool`, `invalid arguments`, `execution failed`)
//!   carried over the wire in `error.data.tag`
//!
//! ## Usage
//!
//! ```rust
//! use mcp_stdio::mcp::tools::{InputSchema, ParamSpec, ParamType, Tool, ToolRegistry};
//! use serde_json::json;
//!
//! let mut registry = ToolRegistry::new();
//! registry
//!     .register_fn(
//!         Tool::new(
//!             "echo",
//!             "Echoes the message",
//!             InputSchema::new().param("message", ParamSpec::required(ParamType::String)),
//!         ),
//!         |args| Ok(args["message"].clone()),
//!     )
//!     .unwrap();
//!
//! assert_eq!(registry.list_tools()[0].name, "echo");
//! ```

mod error;
mod handler;
mod models;
mod registry;

pub use error::{ToolError, ToolErrorKind};
pub use handler::{CallToolParams, ListToolsParams, ListToolsResponse, ToolsHandler, ToolsProvider};
pub use models::{InputSchema, ParamSpec, ParamType, Tool, ToolResult, ToolResultContent};
pub use registry::{ToolArguments, ToolFunction, ToolRegistry};
