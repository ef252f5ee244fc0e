//! Tool caller: drives a tool host child process over its stdin/stdout.
//!
//! The caller writes one request line and reads until the matching response
//! line arrives. All request methods take `&mut self`, so a caller never has
//! more than one request in flight.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use mcp_stdio::mcp::caller::{HostCommand, ToolCaller};
//! use serde_json::json;
//!
//! async fn example() -> mcp_stdio::McpResult<()> {
//!     let mut caller = ToolCaller::new(HostCommand::new("tool-host"));
//!     caller.connect().await?;
//!     caller.initialize().await?;
//!
//!     let result = caller
//!         .call("sum-two-numbers", json!({"a": 15, "b": 27}), Duration::from_secs(10))
//!         .await?;
//!     println!("{}", result.value());
//!
//!     caller.disconnect().await
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::HostSettings;
use crate::mcp::lifecycle::{ClientInfo, InitializeResult, LifecycleManager};
use crate::mcp::protocol::{McpProtocol, DEFAULT_MAX_LINE_BYTES};
use crate::mcp::tools::{ListToolsResponse, Tool, ToolResult};
use crate::mcp::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::telemetry;
use crate::utils::error::{McpError, McpResult};

/// How to start a tool host process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    /// Executable to run
    pub program: String,
    /// Arguments passed before the script path
    pub args: Vec<String>,
    /// Script the program should run; checked for existence before spawning
    pub script: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Working directory of the child
    pub working_dir: Option<PathBuf>,
}

impl HostCommand {
    /// Runs `program` with no arguments
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            script: None,
            env: HashMap::new(),
            working_dir: None,
        }
    }

    /// Appends an argument
    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Sets the script path, passed as the last argument
    pub fn script(mut self, path: impl Into<PathBuf>) -> Self {
        self.script = Some(path.into());
        self
    }

    /// Adds an environment variable
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Builds the command from the `host` section of the settings
    pub fn from_settings(settings: &HostSettings) -> McpResult<Self> {
        let program = settings
            .command
            .as_deref()
            .ok_or_else(|| McpError::Config("host.command is not set".to_string()))?;
        Ok(Self {
            program: program.to_string(),
            args: settings.args.clone(),
            script: settings.script.as_ref().map(PathBuf::from),
            env: settings.env.clone(),
            working_dir: settings.working_dir.as_ref().map(PathBuf::from),
        })
    }

    fn to_command(&self) -> McpResult<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(script) = &self.script {
            if !script.is_file() {
                return Err(McpError::SpawnFailed(format!(
                    "script not found: {}",
                    script.display()
                )));
            }
            cmd.arg(script);
        }
        cmd.envs(&self.env);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

/// Caller-side settings
#[derive(Debug, Clone)]
pub struct CallerConfig {
    /// Identity sent in the handshake
    pub client_info: ClientInfo,
    /// Timeout for the handshake and for writing notifications
    pub request_timeout: Duration,
    /// How long `disconnect` waits for the host to exit before killing it
    pub shutdown_grace: Duration,
    /// Largest accepted response line
    pub max_line_bytes: usize,
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            client_info: ClientInfo::new("mcp-stdio-caller", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(2),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Connection {
    child: Option<Child>,
    writer: BoxedWriter,
    reader: BufReader<BoxedReader>,
    stderr_task: Option<JoinHandle<()>>,
}

/// Client side of the tool protocol
pub struct ToolCaller {
    command: Option<HostCommand>,
    config: CallerConfig,
    protocol: McpProtocol,
    connection: Option<Connection>,
    next_id: i64,
    abandoned: HashSet<RequestId>,
    pending_line: Vec<u8>,
    server: Option<InitializeResult>,
}

impl fmt::Debug for ToolCaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCaller")
            .field("command", &self.command)
            .field("connected", &self.connection.is_some())
            .field(
                "pid",
                &self
                    .connection
                    .as_ref()
                    .and_then(|c| c.child.as_ref())
                    .and_then(Child::id),
            )
            .field("next_id", &self.next_id)
            .field("abandoned", &self.abandoned.len())
            .finish()
    }
}

impl ToolCaller {
    /// Creates a caller that will spawn `command` on [`connect`](Self::connect)
    pub fn new(command: HostCommand) -> Self {
        Self::with_config(command, CallerConfig::default())
    }

    /// Creates a caller with custom settings
    pub fn with_config(command: HostCommand, config: CallerConfig) -> Self {
        let protocol = McpProtocol::with_max_line_bytes(config.max_line_bytes);
        Self {
            command: Some(command),
            config,
            protocol,
            connection: None,
            next_id: 1,
            abandoned: HashSet::new(),
            pending_line: Vec::new(),
            server: None,
        }
    }

    /// Creates a caller attached to already-open streams, e.g. an in-process
    /// host on a `tokio::io::duplex` pair. Such a caller cannot reconnect.
    pub fn from_streams<R, W>(reader: R, writer: W, config: CallerConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut caller = Self {
            command: None,
            protocol: McpProtocol::with_max_line_bytes(config.max_line_bytes),
            config,
            connection: None,
            next_id: 1,
            abandoned: HashSet::new(),
            pending_line: Vec::new(),
            server: None,
        };
        caller.connection = Some(Connection {
            child: None,
            writer: Box::new(writer),
            reader: BufReader::new(Box::new(reader)),
            stderr_task: None,
        });
        caller
    }

    /// Returns true while a host is attached
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Result of the last successful handshake
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server.as_ref()
    }

    /// Process id of the host child, if one is running
    pub fn host_pid(&self) -> Option<u32> {
        self.connection.as_ref()?.child.as_ref()?.id()
    }

    /// Spawns the host process. Does nothing if already connected.
    #[instrument(skip(self))]
    pub async fn connect(&mut self) -> McpResult<()> {
        if self.connection.is_some() {
            debug!("Already connected");
            return Ok(());
        }
        let command = self
            .command
            .as_ref()
            .ok_or_else(|| McpError::Config("no host command configured".to_string()))?;

        let mut cmd = command.to_command()?;
        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::SpawnFailed(format!("{}: {}", command.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("Failed to open host stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("Failed to open host stdout".to_string()))?;
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "tool_host", "{}", line);
                }
            })
        });

        info!(program = %command.program, pid = ?child.id(), "Tool host started");
        self.connection = Some(Connection {
            child: Some(child),
            writer: Box::new(stdin),
            reader: BufReader::new(Box::new(stdout)),
            stderr_task,
        });
        self.abandoned.clear();
        self.pending_line.clear();
        self.server = None;
        Ok(())
    }

    /// Performs the handshake and confirms it with `notifications/initialized`
    #[instrument(skip(self))]
    pub async fn initialize(&mut self) -> McpResult<InitializeResult> {
        let params = LifecycleManager::create_initialize_params(self.config.client_info.clone());
        let params = serde_json::to_value(params)
            .map_err(|e| McpError::Serialization(format!("Failed to encode params: {}", e)))?;
        let timeout = self.config.request_timeout;
        let result = self.request("initialize", Some(params), timeout).await?;
        let init_result = LifecycleManager::handle_initialize_response(result)?;
        self.notify("notifications/initialized", None).await?;

        info!(
            server = %init_result.server_info.name,
            version = %init_result.server_info.version,
            "Connected to tool host"
        );
        self.server = Some(init_result.clone());
        Ok(init_result)
    }

    /// Connects and initializes in one step
    pub async fn start(&mut self) -> McpResult<InitializeResult> {
        self.connect().await?;
        self.initialize().await
    }

    /// Checks that the host answers within `timeout`
    pub async fn ping(&mut self, timeout: Duration) -> McpResult<()> {
        self.request("ping", None, timeout).await.map(|_| ())
    }

    /// Lists the host's tools, waiting at most `timeout`
    pub async fn list_tools(&mut self, timeout: Duration) -> McpResult<Vec<Tool>> {
        let result = self.request("tools/list", Some(json!({})), timeout).await?;
        let response: ListToolsResponse = serde_json::from_value(result)
            .map_err(|e| McpError::MalformedResponse(format!("Invalid tools/list result: {}", e)))?;
        Ok(response.tools)
    }

    /// Calls a tool and waits at most `timeout` for its result.
    ///
    /// A tool failure reported by the host comes back as [`McpError::Rpc`];
    /// use [`ToolErrorKind::from_rpc`](crate::mcp::tools::ToolErrorKind::from_rpc)
    /// to recover its kind.
    #[instrument(skip(self, arguments))]
    pub async fn call(&mut self, name: &str, arguments: Value, timeout: Duration) -> McpResult<ToolResult> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.request("tools/call", Some(params), timeout).await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::MalformedResponse(format!("Invalid tools/call result: {}", e)))
    }

    /// Sends one request and waits for its response.
    ///
    /// `timeout` covers writing the request and reading the response. A
    /// request that could not be written in time leaves a partial line on the
    /// pipe, so the connection is dropped. A request that was written is not
    /// retracted: its id is remembered and a late response carrying it is
    /// skipped by a later request.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpResult<Value> {
        if self.connection.is_none() {
            return Err(McpError::NotConnected);
        }
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;
        let request = JsonRpcRequest::new(method, params, id.clone());

        let _guard = telemetry::span_duration("tool_caller_request");
        let mut sent = false;
        let exchange = async {
            self.send(&request).await?;
            sent = true;
            debug!(method, id = %id, "Request sent");
            self.read_response(&id).await
        };
        let outcome = tokio::time::timeout(timeout, exchange).await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                // the expected reply is still on its way only after a mismatch
                if matches!(e, McpError::IdMismatch { .. }) {
                    self.abandoned.insert(id);
                }
                return Err(e);
            }
            Err(_) if !sent => {
                warn!(method, id = %id, "Request not written within {:?}", timeout);
                self.drop_connection();
                return Err(McpError::Timeout);
            }
            Err(_) => {
                warn!(method, id = %id, "No response within {:?}", timeout);
                self.abandoned.insert(id);
                return Err(McpError::Timeout);
            }
        };
        response.into_result()
    }

    /// Sends a notification, waiting at most the configured request timeout
    /// for the host to take it
    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> McpResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.send(&notification)).await {
            Ok(sent) => sent,
            Err(_) => {
                warn!(method, "Notification not written within {:?}", timeout);
                self.drop_connection();
                Err(McpError::Timeout)
            }
        }
    }

    /// Writes one message line, dropping the connection if the pipe fails.
    async fn send<T: Serialize>(&mut self, message: &T) -> McpResult<()> {
        let connection = self.connection.as_mut().ok_or(McpError::NotConnected)?;
        let written = self
            .protocol
            .write_message_async(&mut connection.writer, message)
            .await;
        written.map_err(|e| self.handle_broken_connection(e))
    }

    async fn read_response(&mut self, expected: &RequestId) -> McpResult<JsonRpcResponse> {
        loop {
            let connection = self.connection.as_mut().ok_or(McpError::NotConnected)?;
            let read = self
                .protocol
                .read_line_async(&mut connection.reader, &mut self.pending_line)
                .await;

            let line = match read {
                Ok(Some(line)) => line,
                Ok(None) => {
                    return Err(self.handle_broken_connection(McpError::ConnectionClosed(
                        "host closed its output".to_string(),
                    )))
                }
                Err(e @ McpError::Io(_)) => return Err(self.handle_broken_connection(e)),
                Err(e) => return Err(McpError::MalformedResponse(e.to_string())),
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = JsonRpcResponse::from_bytes(line.as_bytes())
                .map_err(|e| McpError::MalformedResponse(format!("{}: {}", e, line)))?;
            response.validate()?;

            match &response.id {
                Some(id) if id == expected => return Ok(response),
                Some(id) if self.abandoned.remove(id) => {
                    debug!(id = %id, "Discarding late response to an abandoned request");
                }
                Some(id) => {
                    return Err(McpError::IdMismatch {
                        expected: expected.clone(),
                        actual: id.clone(),
                    })
                }
                None => {
                    // the host could not read our line
                    return match response.error {
                        Some(error) => Err(McpError::Rpc(error)),
                        None => Err(McpError::MalformedResponse(
                            "response without id".to_string(),
                        )),
                    };
                }
            }
        }
    }

    /// Drops the connection after a transport failure and maps the error.
    fn handle_broken_connection(&mut self, error: McpError) -> McpError {
        warn!("Connection to tool host lost: {}", error);
        self.drop_connection();
        match error {
            McpError::ConnectionClosed(_) => error,
            other => McpError::ConnectionClosed(other.to_string()),
        }
    }

    /// Kills the host without waiting and forgets the connection.
    fn drop_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Some(child) = connection.child.as_mut() {
                if let Err(e) = child.start_kill() {
                    debug!("Host already gone: {}", e);
                }
            }
            if let Some(task) = connection.stderr_task.take() {
                task.abort();
            }
        }
        self.server = None;
    }

    /// Closes the host's stdin, waits up to the grace period for it to exit,
    /// then kills it. Calling this when not connected does nothing.
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) -> McpResult<()> {
        let Some(connection) = self.connection.take() else {
            debug!("Not connected");
            return Ok(());
        };
        let Connection {
            child,
            writer,
            reader,
            stderr_task,
        } = connection;
        drop(writer);

        if let Some(mut child) = child {
            match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "Tool host exited"),
                Ok(Err(e)) => warn!("Failed to wait for tool host: {}", e),
                Err(_) => {
                    warn!(
                        "Tool host still running after {:?}, killing it",
                        self.config.shutdown_grace
                    );
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill tool host: {}", e);
                    }
                }
            }
        }
        drop(reader);
        if let Some(task) = stderr_task {
            task.abort();
        }

        self.abandoned.clear();
        self.pending_line.clear();
        self.server = None;
        Ok(())
    }
}
