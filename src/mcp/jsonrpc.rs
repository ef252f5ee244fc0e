//! JSON-RPC 2.0 dispatch for the tool host.
//!
//! This module routes decoded envelopes to registered handlers. It handles:
//!
//! - Method and notification registration
//! - Classification of raw lines into requests, notifications and responses
//! - Mapping of handler failures (including panics) to JSON-RPC error objects
//!
//! Handlers are registered on a `&mut JsonRpcHandler` before serving starts, so
//! the method table is a plain map with no locking. Method handlers are async.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_stdio::mcp::jsonrpc::JsonRpcHandler;
//! use mcp_stdio::mcp::types::{JsonRpcRequest, RequestId};
//!
//! async fn example() -> mcp_stdio::McpResult<()> {
//!     let mut handler = JsonRpcHandler::new();
//!
//!     handler.register_method("echo", |params| async move {
//!         Ok(params.unwrap_or(serde_json::Value::Null))
//!     })?;
//!
//!     let request = JsonRpcRequest::new(
//!         "echo",
//!         Some(serde_json::json!("Hello, world!")),
//!         RequestId::Number(1),
//!     );
//!
//!     let response = handler.handle_request(request).await;
//!     println!("Result: {:?}", response.result);
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::mcp::types::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    JSONRPC_VERSION,
};
use crate::telemetry;
use crate::utils::error::{McpError, McpResult};

/// Handler for JSON-RPC method calls
///
/// Takes the optional `params` value of the request and resolves to the
/// `result` value or an error, which is converted with
/// [`McpError::to_rpc_error`].
pub type MethodHandler = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, McpResult<Value>> + Send + Sync>;

/// Handler for JSON-RPC notifications. Notifications never produce a response.
pub type NotificationHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// A decoded incoming line.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// A request that must be answered
    Request(JsonRpcRequest),
    /// A notification, never answered
    Notification(JsonRpcNotification),
    /// A response to a request this side sent
    Response(JsonRpcResponse),
}

/// JSON-RPC method table for the tool host
pub struct JsonRpcHandler {
    /// Registered method handlers mapped by method name
    methods: HashMap<String, MethodHandler>,
    /// Notification handlers mapped by notification name
    notification_handlers: HashMap<String, NotificationHandler>,
}

impl std::fmt::Debug for JsonRpcHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        let mut notifications: Vec<_> = self.notification_handlers.keys().collect();
        notifications.sort();
        f.debug_struct("JsonRpcHandler")
            .field("methods", &methods)
            .field("notifications", &notifications)
            .finish()
    }
}

impl Default for JsonRpcHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRpcHandler {
    /// Creates a new JSON-RPC handler with empty registrations
    pub fn new() -> Self {
        debug!("Creating new JSON-RPC handler");
        Self {
            methods: HashMap::new(),
            notification_handlers: HashMap::new(),
        }
    }

    /// Registers a method handler for a specified method name
    ///
    /// # Parameters
    ///
    /// * `name` - The method name to register
    /// * `handler` - An async function receiving the request `params`
    ///
    /// # Returns
    ///
    /// An error if a handler is already registered under `name`.
    pub fn register_method<F, Fut>(&mut self, name: &str, handler: F) -> McpResult<()>
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Value>> + Send + 'static,
    {
        if self.methods.contains_key(name) {
            return Err(McpError::InvalidState(format!(
                "method '{}' is already registered",
                name
            )));
        }
        let handler: MethodHandler = Arc::new(move |params| handler(params).boxed());
        self.methods.insert(name.to_string(), handler);
        debug!("Registered method handler for '{}'", name);
        Ok(())
    }

    /// Registers a notification handler for a specified notification type
    pub fn register_notification<F>(&mut self, name: &str, handler: F) -> McpResult<()>
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        if self.notification_handlers.contains_key(name) {
            return Err(McpError::InvalidState(format!(
                "notification '{}' is already registered",
                name
            )));
        }
        self.notification_handlers
            .insert(name.to_string(), Arc::new(handler));
        debug!("Registered notification handler for '{}'", name);
        Ok(())
    }

    /// Classifies one protocol line.
    ///
    /// On failure the error response to send back is returned: `-32700` with a
    /// `null` id for text that is not JSON, `-32600` for JSON that is not a
    /// valid envelope. The id is echoed when it can be read.
    pub fn decode_line(line: &str) -> Result<IncomingMessage, JsonRpcResponse> {
        let value: Value = serde_json::from_str(line).map_err(|e| {
            JsonRpcResponse::error(JsonRpcError::parse_error(&format!("Parse error: {}", e)), None)
        })?;

        let Some(object) = value.as_object() else {
            return Err(JsonRpcResponse::error(
                JsonRpcError::invalid_request("message must be a JSON object"),
                None,
            ));
        };

        let raw_id = object.get("id").filter(|id| !id.is_null()).cloned();
        let id = raw_id
            .clone()
            .and_then(|id| RequestId::deserialize(id).ok());
        let invalid = |message: String| {
            JsonRpcResponse::error(JsonRpcError::invalid_request(&message), id.clone())
        };

        if object.contains_key("method") {
            if raw_id.is_some() {
                serde_json::from_value::<JsonRpcRequest>(value.clone())
                    .map(IncomingMessage::Request)
                    .map_err(|e| invalid(format!("Invalid request: {}", e)))
            } else {
                serde_json::from_value::<JsonRpcNotification>(value.clone())
                    .map(IncomingMessage::Notification)
                    .map_err(|e| invalid(format!("Invalid notification: {}", e)))
            }
        } else if object.contains_key("result") || object.contains_key("error") {
            serde_json::from_value::<JsonRpcResponse>(value.clone())
                .map(IncomingMessage::Response)
                .map_err(|e| invalid(format!("Invalid response: {}", e)))
        } else {
            Err(invalid("message has no method".to_string()))
        }
    }

    /// Handles a JSON-RPC request and produces exactly one response
    ///
    /// This method processes a JSON-RPC request by:
    /// 1. Validating the JSON-RPC version
    /// 2. Looking up the registered method handler
    /// 3. Invoking the handler with the request parameters
    /// 4. Creating a response with the result or error
    ///
    /// A panicking handler yields an internal error response; the panic does
    /// not escape.
    #[instrument(skip(self, request), fields(method = %request.method, id = %request.id))]
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let _guard = telemetry::span_duration("handle_jsonrpc_request");

        if request.jsonrpc != JSONRPC_VERSION {
            warn!("Invalid JSON-RPC version: {}", request.jsonrpc);
            return JsonRpcResponse::error(
                JsonRpcError::invalid_request("Invalid JSON-RPC version"),
                Some(request.id),
            );
        }

        let Some(handler) = self.methods.get(&request.method).cloned() else {
            warn!("Method not found: {}", request.method);
            return JsonRpcResponse::error(
                JsonRpcError::method_not_found(&format!("Method '{}' not found", request.method)),
                Some(request.id),
            );
        };

        let outcome = AssertUnwindSafe(handler(request.params))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(result)) => {
                debug!("Method call successful");
                JsonRpcResponse::success(result, Some(request.id))
            }
            Ok(Err(error)) => {
                warn!("Method call failed: {}", error);
                JsonRpcResponse::error(error.to_rpc_error(), Some(request.id))
            }
            Err(_) => {
                warn!("Method handler panicked");
                JsonRpcResponse::error(
                    JsonRpcError::internal_error("method handler panicked"),
                    Some(request.id),
                )
            }
        }
    }

    /// Handles a JSON-RPC notification
    ///
    /// Unknown notifications are ignored, as are notifications with a wrong
    /// version string: there is no way to report an error for them.
    #[instrument(skip(self, notification), fields(method = %notification.method))]
    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        if notification.jsonrpc != JSONRPC_VERSION {
            warn!("Ignoring notification with JSON-RPC version {}", notification.jsonrpc);
            return;
        }
        match self.notification_handlers.get(&notification.method) {
            Some(handler) => handler(notification.params),
            None => debug!("No handler for notification method: {}", notification.method),
        }
    }
}
