use crate::mcp::jsonrpc::JsonRpcHandler;
use crate::mcp::tools::error::ToolError;
use crate::mcp::tools::models::{Tool, ToolResult};
use crate::utils::error::{McpError, McpResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Request parameters for listing tools
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsParams {
    /// Optional cursor for pagination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Response for listing tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResponse {
    /// List of available tools
    pub tools: Vec<Tool>,

    /// Optional cursor for fetching next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Request parameters for calling a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Name of the tool to call
    pub name: String,

    /// Arguments to pass to the tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Source of tools served by a host
#[async_trait]
pub trait ToolsProvider: Send + Sync {
    /// Lists available tools
    async fn list_tools(&self, cursor: Option<&str>) -> McpResult<ListToolsResponse>;

    /// Calls a tool
    async fn call_tool(&self, name: &str, arguments: Option<&Value>) -> Result<ToolResult, ToolError>;
}

/// Handler for `tools/list` and `tools/call` requests
#[derive(Clone)]
pub struct ToolsHandler {
    /// Provider for tools functionality
    provider: Arc<dyn ToolsProvider>,
}

impl fmt::Debug for ToolsHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolsHandler").finish_non_exhaustive()
    }
}

fn parse_params<T>(params: Option<Value>) -> McpResult<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| McpError::InvalidParams(format!("Invalid params: {}", e))),
    }
}

impl ToolsHandler {
    /// Creates a new tools handler with the given provider
    pub fn new(provider: Arc<dyn ToolsProvider>) -> Self {
        Self { provider }
    }

    /// Registers methods with the JSON-RPC handler
    pub fn register_methods(&self, method_handler: &mut JsonRpcHandler) -> McpResult<()> {
        let list_provider = self.provider.clone();
        method_handler.register_method("tools/list", move |params| {
            let provider = list_provider.clone();
            async move {
                let params: ListToolsParams = parse_params(params)?;
                let response = provider.list_tools(params.cursor.as_deref()).await?;
                serde_json::to_value(response)
                    .map_err(|e| McpError::Serialization(format!("Serialization error: {}", e)))
            }
        })?;

        let call_provider = self.provider.clone();
        method_handler.register_method("tools/call", move |params| {
            let provider = call_provider.clone();
            async move {
                let params: CallToolParams = match params {
                    Some(value) => serde_json::from_value(value)
                        .map_err(|e| McpError::InvalidParams(format!("Invalid params: {}", e)))?,
                    None => {
                        return Err(McpError::InvalidParams(
                            "tools/call requires a tool name".to_string(),
                        ))
                    }
                };
                let result = provider
                    .call_tool(&params.name, params.arguments.as_ref())
                    .await?;
                serde_json::to_value(result)
                    .map_err(|e| McpError::Serialization(format!("Serialization error: {}", e)))
            }
        })?;

        Ok(())
    }
}
