use serde_json::json;
use thiserror::Error;

use crate::mcp::types::{JsonRpcError, EXECUTION_FAILED, INVALID_PARAMS, UNKNOWN_TOOL};

/// The three ways a tool invocation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolErrorKind {
    /// No tool is registered under the requested name
    UnknownTool,
    /// Arguments are missing, of the wrong type, or not an object
    InvalidArguments,
    /// The tool ran and returned an error or panicked
    ExecutionFailed,
}

impl ToolErrorKind {
    /// The tag carried in `error.data.tag` on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            ToolErrorKind::UnknownTool => "unknown tool",
            ToolErrorKind::InvalidArguments => "invalid arguments",
            ToolErrorKind::ExecutionFailed => "execution failed",
        }
    }

    /// The JSON-RPC error code used for this kind.
    pub fn code(&self) -> i32 {
        match self {
            ToolErrorKind::UnknownTool => UNKNOWN_TOOL,
            ToolErrorKind::InvalidArguments => INVALID_PARAMS,
            ToolErrorKind::ExecutionFailed => EXECUTION_FAILED,
        }
    }

    /// Recovers the kind from an error object received over the wire.
    ///
    /// The tag is authoritative; the code is used as a fallback for peers that
    /// do not send one. `-32602` without a tag is not treated as a tool error
    /// because it is also the generic invalid-params code.
    pub fn from_rpc(error: &JsonRpcError) -> Option<Self> {
        match error.tag() {
            Some("unknown tool") => Some(ToolErrorKind::UnknownTool),
            Some("invalid arguments") => Some(ToolErrorKind::InvalidArguments),
            Some("execution failed") => Some(ToolErrorKind::ExecutionFailed),
            Some(_) => None,
            None => match error.code {
                UNKNOWN_TOOL => Some(ToolErrorKind::UnknownTool),
                EXECUTION_FAILED => Some(ToolErrorKind::ExecutionFailed),
                _ => None,
            },
        }
    }
}

/// Error raised by a tool registry for one invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// No tool is registered under this name
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The arguments failed schema validation
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool returned an error or panicked
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl ToolError {
    /// The kind of this error.
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::UnknownTool(_) => ToolErrorKind::UnknownTool,
            ToolError::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
            ToolError::ExecutionFailed(_) => ToolErrorKind::ExecutionFailed,
        }
    }

    /// The detail text without the kind prefix.
    pub fn detail(&self) -> &str {
        match self {
            ToolError::UnknownTool(detail)
            | ToolError::InvalidArguments(detail)
            | ToolError::ExecutionFailed(detail) => detail,
        }
    }

    /// Builds the JSON-RPC error object sent to the caller.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let kind = self.kind();
        JsonRpcError::new(
            kind.code(),
            &self.to_string(),
            Some(json!({ "tag": kind.tag(), "detail": self.detail() })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_survives_the_wire() {
        let errors = [
            ToolError::UnknownTool("divide".into()),
            ToolError::InvalidArguments("missing required parameter 'b'".into()),
            ToolError::ExecutionFailed("boom".into()),
        ];
        for error in errors {
            let rpc = error.to_rpc_error();
            let wire: JsonRpcError =
                serde_json::from_str(&serde_json::to_string(&rpc).unwrap()).unwrap();
            assert_eq!(ToolErrorKind::from_rpc(&wire), Some(error.kind()));
            assert_eq!(wire.code, error.kind().code());
        }
    }

    #[test]
    fn untagged_errors_fall_back_to_code() {
        let rpc = JsonRpcError::new(UNKNOWN_TOOL, "no such tool", None);
        assert_eq!(ToolErrorKind::from_rpc(&rpc), Some(ToolErrorKind::UnknownTool));

        let generic = JsonRpcError::invalid_params("bad params");
        assert_eq!(ToolErrorKind::from_rpc(&generic), None);
        assert_eq!(ToolErrorKind::from_rpc(&JsonRpcError::method_not_found("x")), None);
    }
}
