//! Synchronous access to the async tool caller.
//!
//! [`BlockingBridge`] owns a small multi-thread runtime. Synchronous code hands
//! it a future and blocks until the future finishes or the bridge timeout
//! expires. A future that times out keeps running on the bridge runtime; the
//! caller only stops waiting for it.
//!
//! ```rust,no_run
//! use mcp_stdio::bridge::BlockingToolCaller;
//! use mcp_stdio::config::get_settings;
//! use serde_json::json;
//!
//! fn main() -> mcp_stdio::McpResult<()> {
//!     let settings = get_settings(None)?;
//!     let caller = BlockingToolCaller::from_settings(&settings)?;
//!     caller.start()?;
//!     let result = caller.call("sum-two-numbers", json!({"a": 1, "b": 2}))?;
//!     println!("{}", result.value());
//!     caller.disconnect()
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{BridgeSettings, Settings};
use crate::mcp::caller::{CallerConfig, HostCommand, ToolCaller};
use crate::mcp::lifecycle::InitializeResult;
use crate::mcp::tools::{Tool, ToolResult};
use crate::utils::error::{McpError, McpResult};

/// Runs futures to completion from synchronous code
pub struct BlockingBridge {
    runtime: Runtime,
    workers: usize,
    timeout: Duration,
}

impl fmt::Debug for BlockingBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingBridge")
            .field("workers", &self.workers)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BlockingBridge {
    /// Builds a bridge with `workers` runtime threads
    pub fn new(workers: usize, timeout: Duration) -> McpResult<Self> {
        let workers = workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("mcp-bridge")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            workers,
            timeout,
        })
    }

    /// Builds a bridge from the `bridge` config section
    pub fn from_settings(settings: &BridgeSettings) -> McpResult<Self> {
        Self::new(settings.workers, Duration::from_secs(settings.timeout_seconds))
    }

    /// Longest time [`run`](Self::run) blocks
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Handle to the bridge runtime, for spawning background work
    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// Runs `future` on the bridge runtime and blocks until it completes.
    ///
    /// Fails with [`McpError::Timeout`] after the bridge timeout, with
    /// [`McpError::Bridge`] if the future panics, and with
    /// [`McpError::InvalidState`] when called from inside an async runtime.
    pub fn run<F>(&self, future: F) -> McpResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if Handle::try_current().is_ok() {
            return Err(McpError::InvalidState(
                "blocking bridge called from inside an async runtime".to_string(),
            ));
        }

        let task = self.runtime.spawn(future);
        let timeout = self.timeout;
        self.runtime.block_on(async move {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(McpError::Bridge(e.to_string())),
                Err(_) => {
                    warn!("Bridged call did not finish within {:?}", timeout);
                    Err(McpError::Timeout)
                }
            }
        })
    }
}

/// A [`ToolCaller`] usable from synchronous code
#[derive(Debug)]
pub struct BlockingToolCaller {
    bridge: BlockingBridge,
    caller: Arc<Mutex<ToolCaller>>,
    call_timeout: Duration,
}

impl BlockingToolCaller {
    /// Wraps `caller`; each tool call waits at most `call_timeout`
    pub fn new(caller: ToolCaller, bridge: BlockingBridge, call_timeout: Duration) -> Self {
        Self {
            bridge,
            caller: Arc::new(Mutex::new(caller)),
            call_timeout,
        }
    }

    /// Builds the caller and bridge described by `settings`
    pub fn from_settings(settings: &Settings) -> McpResult<Self> {
        let command = HostCommand::from_settings(&settings.host)?;
        let config = CallerConfig {
            request_timeout: settings.host.read_timeout(),
            shutdown_grace: settings.host.shutdown_grace(),
            ..CallerConfig::default()
        };
        let bridge = BlockingBridge::from_settings(&settings.bridge)?;
        Ok(Self::new(
            ToolCaller::with_config(command, config),
            bridge,
            settings.host.read_timeout(),
        ))
    }

    /// The bridge driving this caller
    pub fn bridge(&self) -> &BlockingBridge {
        &self.bridge
    }

    /// Connects to the host and performs the handshake
    pub fn start(&self) -> McpResult<InitializeResult> {
        let caller = self.caller.clone();
        self.bridge.run(async move {
            let mut caller = caller.lock().await;
            if caller.is_connected() && caller.server_info().is_some() {
                debug!("Bridged caller already started");
                return caller
                    .server_info()
                    .cloned()
                    .ok_or_else(|| McpError::InvalidState("handshake result missing".to_string()));
            }
            caller.start().await
        })?
    }

    /// Lists the host's tools
    pub fn list_tools(&self) -> McpResult<Vec<Tool>> {
        let caller = self.caller.clone();
        let timeout = self.call_timeout;
        self.bridge
            .run(async move { caller.lock().await.list_tools(timeout).await })?
    }

    /// Calls a tool
    pub fn call(&self, name: &str, arguments: Value) -> McpResult<ToolResult> {
        let caller = self.caller.clone();
        let name = name.to_string();
        let timeout = self.call_timeout;
        self.bridge
            .run(async move { caller.lock().await.call(&name, arguments, timeout).await })?
    }

    /// Stops the host; safe to call more than once
    pub fn disconnect(&self) -> McpResult<()> {
        let caller = self.caller.clone();
        self.bridge
            .run(async move { caller.lock().await.disconnect().await })?
    }
}
