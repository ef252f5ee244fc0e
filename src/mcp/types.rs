//! # JSON-RPC Envelope Types
//!
//! This module defines the JSON-RPC 2.0 envelopes exchanged between a tool
//! host and a tool caller:
//!
//! - `RequestId`: a number or a string, echoed back unchanged in the response
//! - `JsonRpcRequest`: a method invocation that expects exactly one response
//! - `JsonRpcNotification`: a one-way message with no id and no response
//! - `JsonRpcResponse`: carries exactly one of `result` or `error`
//! - `JsonRpcError`: the standard error object, plus the tool-specific codes
//!
//! ## Example
//!
//! ```rust
//! use mcp_stdio::mcp::types::{JsonRpcRequest, JsonRpcResponse, RequestId};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new("ping", None, RequestId::Number(1));
//! let response = JsonRpcResponse::success(json!({}), Some(request.id.clone()));
//! assert!(response.validate().is_ok());
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::utils::error::{McpError, McpResult};

/// The JSON-RPC version string carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters, also used for invalid tool arguments.
pub const INVALID_PARAMS: i32 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i32 = -32603;
/// The called tool is not registered.
pub const UNKNOWN_TOOL: i32 = -32001;
/// A request other than `initialize` or `ping` arrived before the handshake.
pub const SERVER_NOT_INITIALIZED: i32 = -32002;
/// The tool ran and failed.
pub const EXECUTION_FAILED: i32 = -32003;

/// Identifier of a request, echoed back in its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier
    Number(i64),
    /// String identifier
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::String(value)
    }
}

/// JSON-RPC 2.0 request object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version, always "2.0"
    pub jsonrpc: String,
    /// Method name to invoke
    pub method: String,
    /// Parameters for the method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Identifier echoed back in the response
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request
    pub fn new(method: &str, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> McpResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| McpError::Deserialization(format!("Failed to deserialize request: {}", e)))
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)` so that a present-but-null
/// `result` is told apart from an absent one.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC 2.0 response object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version, always "2.0"
    pub jsonrpc: String,
    /// Result of the method call, present if and only if there is no error
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Error information, present if and only if there is no result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Id of the request this answers; `null` when the request id could not be read
    #[serde(default)]
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    /// Create a new successful JSON-RPC response
    pub fn success(result: Value, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create a new error JSON-RPC response
    pub fn error(error: JsonRpcError, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Checks the envelope invariants: version "2.0" and exactly one of
    /// `result` or `error`.
    pub fn validate(&self) -> McpResult<()> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(McpError::MalformedResponse(format!(
                "unsupported jsonrpc version {:?}",
                self.jsonrpc
            )));
        }
        match (&self.result, &self.error) {
            (Some(_), Some(_)) => Err(McpError::MalformedResponse(
                "response carries both result and error".to_string(),
            )),
            (None, None) => Err(McpError::MalformedResponse(
                "response carries neither result nor error".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Turns the response into the call outcome: the result value, or
    /// [`McpError::Rpc`] with the error object.
    pub fn into_result(self) -> McpResult<Value> {
        self.validate()?;
        match (self.result, self.error) {
            (_, Some(error)) => Err(McpError::Rpc(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(McpError::MalformedResponse(
                "response carries neither result nor error".to_string(),
            )),
        }
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> McpResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            McpError::Deserialization(format!("Failed to deserialize response: {}", e))
        })
    }
}

/// JSON-RPC 2.0 notification object (has no ID)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version, always "2.0"
    pub jsonrpc: String,
    /// Method name to invoke
    pub method: String,
    /// Parameters for the method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC notification
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new JSON-RPC error
    pub fn new(code: i32, message: &str, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    /// Parse error (-32700)
    pub fn parse_error(message: &str) -> Self {
        Self::new(PARSE_ERROR, message, None)
    }

    /// Invalid request error (-32600)
    pub fn invalid_request(message: &str) -> Self {
        Self::new(INVALID_REQUEST, message, None)
    }

    /// Method not found error (-32601)
    pub fn method_not_found(message: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, message, None)
    }

    /// Invalid params error (-32602)
    pub fn invalid_params(message: &str) -> Self {
        Self::new(INVALID_PARAMS, message, None)
    }

    /// Internal error (-32603)
    pub fn internal_error(message: &str) -> Self {
        Self::new(INTERNAL_ERROR, message, None)
    }

    /// Server not initialized (-32002)
    pub fn server_not_initialized() -> Self {
        Self::new(SERVER_NOT_INITIALIZED, "server not initialized", None)
    }

    /// The `tag` string carried in `data`, if any.
    pub fn tag(&self) -> Option<&str> {
        self.data.as_ref()?.get("tag")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_ids_keep_their_json_type() {
        let numeric = JsonRpcRequest::new("ping", None, RequestId::Number(7));
        let text = serde_json::to_value(&numeric).unwrap();
        assert_eq!(text, json!({"jsonrpc": "2.0", "method": "ping", "id": 7}));

        let parsed: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"ping","id":"a-1"}"#).unwrap();
        assert_eq!(parsed.id, RequestId::from("a-1"));
        assert!(parsed.params.is_none());
    }

    #[test]
    fn error_response_with_unknown_id_serializes_null() {
        let response = JsonRpcResponse::error(JsonRpcError::parse_error("bad json"), None);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn null_result_is_still_a_result() {
        let response =
            JsonRpcResponse::from_bytes(br#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(response.result, Some(Value::Null));
        assert!(response.validate().is_ok());
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn both_or_neither_result_and_error_is_malformed() {
        let both = JsonRpcResponse::from_bytes(
            br#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(both.validate(), Err(McpError::MalformedResponse(_))));

        let neither = JsonRpcResponse::from_bytes(br#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(matches!(
            neither.into_result(),
            Err(McpError::MalformedResponse(_))
        ));
    }

    #[test]
    fn error_response_becomes_rpc_error() {
        let response = JsonRpcResponse::error(
            JsonRpcError::new(UNKNOWN_TOOL, "unknown tool: divide", Some(json!({"tag": "unknown tool"}))),
            Some(RequestId::Number(3)),
        );
        match response.into_result() {
            Err(McpError::Rpc(err)) => {
                assert_eq!(err.code, UNKNOWN_TOOL);
                assert_eq!(err.tag(), Some("unknown tool"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
