use crate::mcp::tools::error::ToolError;
use crate::mcp::tools::handler::{ListToolsResponse, ToolsProvider};
use crate::mcp::tools::models::{Tool, ToolResult};
use crate::telemetry;
use crate::utils::error::{McpError, McpResult};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Validated tool arguments, with defaults filled in
pub type ToolArguments = Map<String, Value>;

/// The executable part of a registered tool
#[async_trait]
pub trait ToolFunction: Send + Sync {
    /// Runs the tool with validated arguments and returns its value
    async fn call(&self, arguments: ToolArguments) -> anyhow::Result<Value>;
}

struct SyncToolFunction<F>(F);

#[async_trait]
impl<F> ToolFunction for SyncToolFunction<F>
where
    F: Fn(&ToolArguments) -> anyhow::Result<Value> + Send + Sync,
{
    async fn call(&self, arguments: ToolArguments) -> anyhow::Result<Value> {
        (self.0)(&arguments)
    }
}

struct AsyncToolFunction<F>(F);

#[async_trait]
impl<F, Fut> ToolFunction for AsyncToolFunction<F>
where
    F: Fn(ToolArguments) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, arguments: ToolArguments) -> anyhow::Result<Value> {
        (self.0)(arguments).await
    }
}

struct RegisteredTool {
    descriptor: Tool,
    function: Arc<dyn ToolFunction>,
}

/// Mapping from tool name to descriptor and implementation.
///
/// Built once, then handed to a [`ToolHost`](crate::mcp::host::ToolHost),
/// which owns it for its lifetime. Names are unique.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool implementation under the descriptor's name
    pub fn register<F>(&mut self, tool: Tool, function: F) -> McpResult<()>
    where
        F: ToolFunction + 'static,
    {
        if self.tools.contains_key(&tool.name) {
            return Err(McpError::InvalidState(format!(
                "tool '{}' is already registered",
                tool.name
            )));
        }
        debug!("Registered tool '{}'", tool.name);
        self.tools.insert(
            tool.name.clone(),
            RegisteredTool {
                descriptor: tool,
                function: Arc::new(function),
            },
        );
        Ok(())
    }

    /// Registers a synchronous tool function
    pub fn register_fn<F>(&mut self, tool: Tool, function: F) -> McpResult<()>
    where
        F: Fn(&ToolArguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(tool, SyncToolFunction(function))
    }

    /// Registers an asynchronous tool function
    pub fn register_async<F, Fut>(&mut self, tool: Tool, function: F) -> McpResult<()>
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(tool, AsyncToolFunction(function))
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tool is registered
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns true if a tool is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All descriptors, sorted by name
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools
            .values()
            .map(|registered| registered.descriptor.clone())
            .collect()
    }

    /// Validates the arguments and runs the named tool.
    ///
    /// Errors and panics raised by the tool are returned as
    /// [`ToolError::ExecutionFailed`]; they never escape this call.
    #[instrument(skip(self, arguments), fields(tool = %name))]
    pub async fn invoke(&self, name: &str, arguments: Option<&Value>) -> Result<ToolResult, ToolError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let arguments = registered.descriptor.input_schema.validate(arguments)?;
        let function = registered.function.clone();

        let started = Instant::now();
        let outcome = AssertUnwindSafe(function.call(arguments))
            .catch_unwind()
            .await;
        telemetry::add_metric(
            "tool_call_duration_ms",
            started.elapsed().as_secs_f64() * 1000.0,
            &[("tool", name.to_string())],
        );

        match outcome {
            Ok(Ok(value)) => Ok(ToolResult::from_value(value)),
            Ok(Err(error)) => {
                warn!("Tool '{}' failed: {:#}", name, error);
                Err(ToolError::ExecutionFailed(format!("{:#}", error)))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Tool '{}' panicked: {}", name, message);
                Err(ToolError::ExecutionFailed(format!("tool panicked: {}", message)))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl ToolsProvider for ToolRegistry {
    async fn list_tools(&self, _cursor: Option<&str>) -> McpResult<ListToolsResponse> {
        Ok(ListToolsResponse {
            tools: ToolRegistry::list_tools(self),
            next_cursor: None,
        })
    }

    async fn call_tool(&self, name: &str, arguments: Option<&Value>) -> Result<ToolResult, ToolError> {
        self.invoke(name, arguments).await
    }
}
