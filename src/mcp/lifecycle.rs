//! Handshake and host state for the tool protocol
//!
//! This module implements the `initialize` handshake on both sides and the
//! state machine a tool host moves through:
//!
//! ```text
//! Unstarted --initialize--> Listening <--> Handling
//!     |                         |              |
//!     +-------------------------+--------------+--> Stopped
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::mcp::jsonrpc::JsonRpcHandler;
use crate::mcp::types::JsonRpcError;
use crate::utils::error::{McpError, McpResult};

/// Protocol revision spoken by this crate.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Methods a host answers before the handshake completes.
pub const PRE_HANDSHAKE_METHODS: [&str; 2] = ["initialize", "ping"];

/// State of a tool host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// Waiting for `initialize`
    Unstarted,
    /// Handshake done, waiting for the next request
    Listening,
    /// Running a request
    Handling,
    /// Input closed or termination signal received
    Stopped,
}

/// Name and version of one side of the connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Program name
    pub name: String,
    /// Program version
    pub version: String,
}

impl Implementation {
    /// Creates a new implementation record
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }
}

/// Identity of a tool host
pub type ServerInfo = Implementation;

/// Identity of a tool caller
pub type ClientInfo = Implementation;

/// Tools capability advertised by a host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the host notifies callers when its tool list changes
    #[serde(default)]
    pub list_changed: bool,
}

/// Capabilities advertised by a host in the `initialize` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Present when the host serves tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Non-standard capabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
}

/// Initialize request parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol revision requested by the caller
    pub protocol_version: String,
    /// Capabilities offered by the caller
    #[serde(default)]
    pub capabilities: Value,
    /// Caller identity
    pub client_info: ClientInfo,
}

/// Initialize result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision the host speaks
    pub protocol_version: String,
    /// Host capabilities
    pub capabilities: ServerCapabilities,
    /// Host identity
    pub server_info: ServerInfo,
    /// Optional usage hints for the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug)]
struct Session {
    state: HostState,
    session_id: Option<String>,
    client: Option<ClientInfo>,
}

/// Lifecycle manager for a tool host
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    server_info: ServerInfo,
    capabilities: ServerCapabilities,
    session: Arc<RwLock<Session>>,
}

impl LifecycleManager {
    /// Creates a manager in the `Unstarted` state
    pub fn new(server_info: ServerInfo, capabilities: ServerCapabilities) -> Self {
        Self {
            server_info,
            capabilities,
            session: Arc::new(RwLock::new(Session {
                state: HostState::Unstarted,
                session_id: None,
                client: None,
            })),
        }
    }

    /// Current host state
    pub async fn state(&self) -> HostState {
        self.session.read().await.state
    }

    /// Id assigned to the session by the last successful handshake
    pub async fn session_id(&self) -> Option<String> {
        self.session.read().await.session_id.clone()
    }

    /// Caller identity received in the handshake
    pub async fn client_info(&self) -> Option<ClientInfo> {
        self.session.read().await.client.clone()
    }

    /// Handles the `initialize` request: moves `Unstarted` to `Listening`.
    pub async fn complete_handshake(&self, params: InitializeParams) -> McpResult<InitializeResult> {
        let mut session = self.session.write().await;
        if session.state != HostState::Unstarted {
            return Err(McpError::Rpc(JsonRpcError::invalid_request(
                "server already initialized",
            )));
        }

        if params.protocol_version != PROTOCOL_VERSION {
            warn!(
                "Caller requested protocol {}, answering with {}",
                params.protocol_version, PROTOCOL_VERSION
            );
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        info!(
            session_id = %session_id,
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            "Handshake completed"
        );
        session.state = HostState::Listening;
        session.session_id = Some(session_id);
        session.client = Some(params.client_info);

        Ok(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: None,
        })
    }

    /// Moves `Listening` to `Handling`. Returns false, leaving the state
    /// alone, when the host is in any other state.
    pub async fn begin_request(&self) -> bool {
        let mut session = self.session.write().await;
        if session.state == HostState::Listening {
            session.state = HostState::Handling;
            true
        } else {
            false
        }
    }

    /// Moves `Handling` back to `Listening`.
    pub async fn end_request(&self) {
        let mut session = self.session.write().await;
        if session.state == HostState::Handling {
            session.state = HostState::Listening;
        }
    }

    /// Moves to `Stopped` from any state.
    pub async fn stop(&self) {
        let mut session = self.session.write().await;
        if session.state != HostState::Stopped {
            info!(from = ?session.state, "Host stopped");
            session.state = HostState::Stopped;
        }
    }

    /// Registers `initialize`, `ping` and the lifecycle notifications
    pub fn register_methods(&self, handler: &mut JsonRpcHandler) -> McpResult<()> {
        let lifecycle = self.clone();
        handler.register_method("initialize", move |params| {
            let lifecycle = lifecycle.clone();
            async move {
                let params = params.ok_or_else(|| {
                    McpError::InvalidParams("Missing initialization parameters".to_string())
                })?;
                let init_params: InitializeParams = serde_json::from_value(params).map_err(|e| {
                    McpError::InvalidParams(format!("Invalid initialization parameters: {}", e))
                })?;
                let result = lifecycle.complete_handshake(init_params).await?;
                serde_json::to_value(result).map_err(|e| {
                    McpError::Serialization(format!("Failed to serialize result: {}", e))
                })
            }
        })?;

        handler.register_method("ping", |_| async move { Ok(json!({})) })?;

        handler.register_notification("notifications/initialized", |_| {
            debug!("Caller confirmed initialization");
        })?;

        handler.register_notification("notifications/cancelled", |params| {
            let request_id = params
                .as_ref()
                .and_then(|p| p.get("requestId"))
                .cloned()
                .unwrap_or(Value::Null);
            debug!(request_id = %request_id, "Cancellation received; requests run to completion");
        })?;

        Ok(())
    }

    /// Builds the caller-side `initialize` parameters
    pub fn create_initialize_params(client_info: ClientInfo) -> InitializeParams {
        InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info,
        }
    }

    /// Reads the host's answer to `initialize`
    pub fn handle_initialize_response(result: Value) -> McpResult<InitializeResult> {
        let init_result: InitializeResult = serde_json::from_value(result).map_err(|e| {
            McpError::MalformedResponse(format!("Failed to deserialize InitializeResult: {}", e))
        })?;
        if init_result.protocol_version != PROTOCOL_VERSION {
            warn!(
                "Host speaks protocol {}, expected {}",
                init_result.protocol_version, PROTOCOL_VERSION
            );
        }
        Ok(init_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::types::{JsonRpcRequest, RequestId};

    fn manager() -> LifecycleManager {
        LifecycleManager::new(
            ServerInfo::new("test-host", "0.0.1"),
            ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                experimental: None,
            },
        )
    }

    #[tokio::test]
    async fn handshake_moves_to_listening_once() {
        let lifecycle = manager();
        assert_eq!(lifecycle.state().await, HostState::Unstarted);
        assert!(!lifecycle.begin_request().await);

        let params = LifecycleManager::create_initialize_params(ClientInfo::new("tester", "1.0"));
        let result = lifecycle.complete_handshake(params.clone()).await.unwrap();
        assert_eq!(result.protocol_version, PROTOCOL_VERSION);
        assert_eq!(result.server_info.name, "test-host");
        assert_eq!(lifecycle.state().await, HostState::Listening);
        assert!(lifecycle.session_id().await.is_some());
        assert_eq!(lifecycle.client_info().await.unwrap().name, "tester");

        let again = lifecycle.complete_handshake(params).await.unwrap_err();
        assert!(matches!(again, McpError::Rpc(ref e) if e.code == -32600));
    }

    #[tokio::test]
    async fn request_cycle_and_stop() {
        let lifecycle = manager();
        lifecycle
            .complete_handshake(LifecycleManager::create_initialize_params(ClientInfo::new(
                "tester", "1.0",
            )))
            .await
            .unwrap();

        assert!(lifecycle.begin_request().await);
        assert_eq!(lifecycle.state().await, HostState::Handling);
        lifecycle.end_request().await;
        assert_eq!(lifecycle.state().await, HostState::Listening);

        lifecycle.stop().await;
        assert_eq!(lifecycle.state().await, HostState::Stopped);
        assert!(!lifecycle.begin_request().await);
    }

    #[tokio::test]
    async fn initialize_result_wire_shape() {
        let lifecycle = manager();
        let mut handler = JsonRpcHandler::new();
        lifecycle.register_methods(&mut handler).unwrap();

        let params = serde_json::to_value(LifecycleManager::create_initialize_params(
            ClientInfo::new("tester", "1.0"),
        ))
        .unwrap();
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(params["clientInfo"]["name"], "tester");

        let response = handler
            .handle_request(JsonRpcRequest::new("initialize", Some(params), RequestId::Number(0)))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(result["serverInfo"]["version"], "0.0.1");

        let parsed = LifecycleManager::handle_initialize_response(result).unwrap();
        assert_eq!(parsed.server_info.name, "test-host");
    }
}
