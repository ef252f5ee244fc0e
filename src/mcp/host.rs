//! Tool host: serves a [`ToolRegistry`] over newline-delimited JSON-RPC.
//!
//! A single task reads a line, dispatches it and writes the response before
//! reading the next line, so responses leave in request order and only one
//! request is in flight.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_stdio::mcp::host::ToolHost;
//! use mcp_stdio::mcp::lifecycle::ServerInfo;
//! use mcp_stdio::tools::builtin::builtin_registry;
//!
//! fn main() -> mcp_stdio::McpResult<()> {
//!     let runtime = tokio::runtime::Runtime::new()?;
//!     let host = ToolHost::new(builtin_registry()?, ServerInfo::new("demo", "0.1.0"))?;
//!     let outcome = runtime.block_on(host.serve_stdio());
//!     runtime.shutdown_timeout(std::time::Duration::from_millis(200));
//!     outcome
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{error, info, instrument, warn};

use crate::mcp::jsonrpc::{IncomingMessage, JsonRpcHandler};
use crate::mcp::lifecycle::{
    HostState, LifecycleManager, ServerCapabilities, ServerInfo, ToolsCapability,
    PRE_HANDSHAKE_METHODS,
};
use crate::mcp::protocol::McpProtocol;
use crate::mcp::tools::{ToolRegistry, ToolsHandler};
use crate::mcp::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::telemetry;
use crate::utils::error::{McpError, McpResult};

/// Serves one tool registry to one caller
#[derive(Debug)]
pub struct ToolHost {
    handler: JsonRpcHandler,
    lifecycle: LifecycleManager,
    protocol: McpProtocol,
    registry: Arc<ToolRegistry>,
}

impl ToolHost {
    /// Creates a host owning `registry`
    pub fn new(registry: ToolRegistry, server_info: ServerInfo) -> McpResult<Self> {
        let capabilities = ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: false }),
            experimental: None,
        };
        let lifecycle = LifecycleManager::new(server_info, capabilities);
        Self::with_lifecycle(registry, lifecycle)
    }

    /// Creates a host with a preconfigured lifecycle manager
    pub fn with_lifecycle(registry: ToolRegistry, lifecycle: LifecycleManager) -> McpResult<Self> {
        let registry = Arc::new(registry);
        let mut handler = JsonRpcHandler::new();
        lifecycle.register_methods(&mut handler)?;
        ToolsHandler::new(registry.clone()).register_methods(&mut handler)?;

        Ok(Self {
            handler,
            lifecycle,
            protocol: McpProtocol::new(),
            registry,
        })
    }

    /// The served registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// The lifecycle manager tracking this host's state
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Current host state
    pub async fn state(&self) -> HostState {
        self.lifecycle.state().await
    }

    /// Processes one protocol line and returns the response to write, if any.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match JsonRpcHandler::decode_line(line) {
            Ok(IncomingMessage::Request(request)) => Some(self.handle_request(request).await),
            Ok(IncomingMessage::Notification(notification)) => {
                self.handler.handle_notification(notification).await;
                None
            }
            Ok(IncomingMessage::Response(response)) => {
                warn!("Ignoring unsolicited response with id {:?}", response.id);
                None
            }
            Err(error_response) => {
                warn!(
                    "Rejecting line: {}",
                    error_response
                        .error
                        .as_ref()
                        .map(|e| e.message.as_str())
                        .unwrap_or_default()
                );
                Some(error_response)
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match self.lifecycle.state().await {
            HostState::Unstarted if !PRE_HANDSHAKE_METHODS.contains(&request.method.as_str()) => {
                warn!(method = %request.method, "Request before initialize");
                return JsonRpcResponse::error(
                    JsonRpcError::server_not_initialized(),
                    Some(request.id),
                );
            }
            HostState::Stopped => {
                return JsonRpcResponse::error(
                    JsonRpcError::invalid_request("server stopped"),
                    Some(request.id),
                );
            }
            _ => {}
        }

        let handling = self.lifecycle.begin_request().await;
        let response = self.handler.handle_request(request).await;
        if handling {
            self.lifecycle.end_request().await;
        }
        response
    }

    /// Runs the read-dispatch-write loop until input ends or `shutdown`
    /// resolves, then moves to [`HostState::Stopped`].
    ///
    /// Per-request failures never end the loop. Only I/O errors on the
    /// streams do.
    #[instrument(skip_all)]
    pub async fn serve<R, W, S>(&self, reader: R, mut writer: W, shutdown: S) -> McpResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let mut reader = BufReader::new(reader);
        let mut pending = Vec::new();
        let mut lines_handled = 0u64;
        let mut error_responses = 0u64;
        tokio::pin!(shutdown);

        info!(tools = self.registry.len(), "Tool host listening");
        let outcome = loop {
            let read = tokio::select! {
                _ = &mut shutdown => {
                    info!("Termination signal received");
                    break Ok(());
                }
                read = self.protocol.read_line_async(&mut reader, &mut pending) => read,
            };

            let line = match read {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Input closed");
                    break Ok(());
                }
                Err(McpError::Io(e)) => {
                    error!("Failed to read from input: {}", e);
                    break Err(McpError::Io(e));
                }
                Err(e) => {
                    warn!("Unreadable line: {}", e);
                    error_responses += 1;
                    let response =
                        JsonRpcResponse::error(JsonRpcError::parse_error(&e.to_string()), None);
                    if let Err(e) = self.protocol.write_message_async(&mut writer, &response).await {
                        break Err(e);
                    }
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            lines_handled += 1;
            if let Some(response) = self.handle_line(&line).await {
                if response.error.is_some() {
                    error_responses += 1;
                }
                if let Err(e) = self.protocol.write_message_async(&mut writer, &response).await {
                    error!("Failed to write response: {}", e);
                    break Err(e);
                }
            }
        };

        self.lifecycle.stop().await;
        telemetry::add_metrics(HashMap::from([
            ("host_lines_handled", lines_handled as f64),
            ("host_error_responses", error_responses as f64),
        ]));
        outcome
    }

    /// Serves on the process stdin/stdout until stdin closes or SIGINT/SIGTERM
    /// arrives.
    ///
    /// Tokio reads stdin on a blocking thread that stays parked in `read`
    /// after a signal. Shut the runtime down with
    /// [`Runtime::shutdown_timeout`](tokio::runtime::Runtime::shutdown_timeout)
    /// afterwards, or dropping it waits for the next input byte.
    pub async fn serve_stdio(&self) -> McpResult<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout(), shutdown_signal())
            .await
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
