use thiserror::Error;

use crate::mcp::tools::ToolError;
use crate::mcp::types::{JsonRpcError, RequestId};

/// A specialized Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Represents errors that can occur during MCP protocol operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Invalid message format or content
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// IO error during read/write operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 encoding/decoding error
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// A message could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A message could not be deserialized
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration could not be loaded or is incomplete
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tool host process could not be started
    #[error("Failed to spawn tool host: {0}")]
    SpawnFailed(String),

    /// The peer closed its side of the connection
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Not connected to the remote endpoint
    #[error("Not connected")]
    NotConnected,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// A response line could not be parsed or is not a valid response envelope
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A response arrived for a different request than the one in flight
    #[error("Response id mismatch: expected {expected}, got {actual}")]
    IdMismatch {
        /// Id of the request in flight
        expected: RequestId,
        /// Id carried by the response
        actual: RequestId,
    },

    /// Method parameters did not match what the method expects
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// An operation was attempted in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A task submitted to the blocking bridge failed
    #[error("Bridged task failed: {0}")]
    Bridge(String),

    /// A tool invocation failed
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The peer answered with a JSON-RPC error object
    #[error("JSON-RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),
}

impl McpError {
    /// Converts the error into the JSON-RPC error object sent back to a peer.
    ///
    /// Tool errors keep their own code and tag, errors already carrying a
    /// JSON-RPC error object are passed through, parameter errors map to
    /// `-32602` and everything else becomes an internal error.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            McpError::Tool(err) => err.to_rpc_error(),
            McpError::Rpc(err) => err.clone(),
            McpError::InvalidParams(msg) => JsonRpcError::invalid_params(msg),
            other => JsonRpcError::internal_error(&other.to_string()),
        }
    }

    /// Returns true when the error means the connection is gone and a new
    /// `connect()` is required.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, McpError::ConnectionClosed(_) | McpError::NotConnected)
    }
}
