use std::time::Duration;

use mcp_stdio::mcp::caller::{CallerConfig, HostCommand, ToolCaller};
use mcp_stdio::mcp::host::ToolHost;
use mcp_stdio::mcp::lifecycle::ServerInfo;
use mcp_stdio::mcp::tools::{InputSchema, Tool, ToolErrorKind, ToolRegistry};
use mcp_stdio::mcp::types::RequestId;
use mcp_stdio::McpError;
use serde_json::json;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

const CALL_TIMEOUT: Duration = Duration::from_secs(10);
const QUICK_TIMEOUT: Duration = Duration::from_millis(300);

fn host_binary() -> HostCommand {
    HostCommand::new(env!("CARGO_BIN_EXE_tool-host")).env("RUST_LOG", "debug")
}

fn quick_config() -> CallerConfig {
    CallerConfig {
        request_timeout: QUICK_TIMEOUT,
        shutdown_grace: QUICK_TIMEOUT,
        ..CallerConfig::default()
    }
}

/// Serves `registry` in-process and returns a caller attached to it.
fn in_process(registry: ToolRegistry) -> (ToolCaller, JoinHandle<()>) {
    let host = ToolHost::new(registry, ServerInfo::new("in-process", "0.1.0")).unwrap();
    let (caller_side, host_side) = duplex(64 * 1024);
    let (host_read, host_write) = tokio::io::split(host_side);
    let server = tokio::spawn(async move {
        let _ = host
            .serve(host_read, host_write, std::future::pending::<()>())
            .await;
    });
    let (read, write) = tokio::io::split(caller_side);
    (ToolCaller::from_streams(read, write, CallerConfig::default()), server)
}

fn slow_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register_async(
            Tool::new("slow", "Answers after 300 ms", InputSchema::new()),
            |_| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(json!("late"))
            },
        )
        .unwrap();
    registry
        .register_fn(
            Tool::new("fast", "Answers at once", InputSchema::new()),
            |_| Ok(json!("fast")),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn test_end_to_end_with_host_binary() {
    let mut caller = ToolCaller::new(host_binary());
    let init = caller.start().await.unwrap();
    assert_eq!(init.server_info.name, "mcp-stdio-tool-host");
    assert!(caller.host_pid().is_some());

    let names: Vec<String> = caller
        .list_tools(CALL_TIMEOUT)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert!(names.contains(&"sum-two-numbers".to_string()));
    assert!(!names.contains(&"divide".to_string()));

    let sum = caller
        .call("sum-two-numbers", json!({"a": 15, "b": 27}), CALL_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(sum.value(), json!(42));

    let product = caller
        .call("multiply-two-numbers", json!({"a": 8, "b": 7}), CALL_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(product.value(), json!(56));

    match caller
        .call("divide", json!({"a": 1, "b": 2}), CALL_TIMEOUT)
        .await
    {
        Err(McpError::Rpc(error)) => {
            assert_eq!(ToolErrorKind::from_rpc(&error), Some(ToolErrorKind::UnknownTool));
        }
        other => panic!("expected an rpc error, got {:?}", other),
    }

    // the host keeps serving after a failed call
    caller.ping(CALL_TIMEOUT).await.unwrap();

    caller.disconnect().await.unwrap();
    assert!(!caller.is_connected());
    caller.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let mut caller = ToolCaller::new(host_binary());
    caller.start().await.unwrap();
    let first_pid = caller.host_pid();
    caller.disconnect().await.unwrap();

    caller.start().await.unwrap();
    assert_ne!(caller.host_pid(), first_pid);
    let greeting = caller
        .call("greet", json!({"name": "Ana", "language": "fr"}), CALL_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(greeting.value(), json!("Bonjour Ana!"));
    caller.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_missing_program_is_spawn_failed() {
    let mut caller = ToolCaller::new(HostCommand::new("/nonexistent/dir/tool-host-missing"));
    let err = caller.connect().await.unwrap_err();
    assert!(matches!(err, McpError::SpawnFailed(_)), "got {:?}", err);
    assert!(!caller.is_connected());
}

#[tokio::test]
async fn test_missing_script_is_spawn_failed() {
    let command = HostCommand::new("python3").script("/nonexistent/dir/server.py");
    let mut caller = ToolCaller::new(command);
    let err = caller.connect().await.unwrap_err();
    assert!(matches!(err, McpError::SpawnFailed(ref msg) if msg.contains("server.py")));
}

#[tokio::test]
async fn test_requests_need_a_connection() {
    let mut caller = ToolCaller::new(host_binary());
    assert!(matches!(caller.ping(CALL_TIMEOUT).await, Err(McpError::NotConnected)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_echoing_host_is_malformed() {
    let mut caller = ToolCaller::with_config(HostCommand::new("cat"), quick_config());
    caller.connect().await.unwrap();

    // cat sends our own request back, which is not a valid response
    let err = caller.ping(QUICK_TIMEOUT).await.unwrap_err();
    assert!(matches!(err, McpError::MalformedResponse(_)), "got {:?}", err);
    caller.disconnect().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_silent_host_times_out_and_is_killed() {
    let command = HostCommand::new("sleep").arg("30");
    let mut caller = ToolCaller::with_config(command, quick_config());
    caller.connect().await.unwrap();

    let err = caller.ping(QUICK_TIMEOUT).await.unwrap_err();
    assert!(matches!(err, McpError::Timeout));

    tokio::time::timeout(Duration::from_secs(5), caller.disconnect())
        .await
        .expect("disconnect must not hang")
        .unwrap();
    assert!(!caller.is_connected());
    assert!(caller.server_info().is_none());

    // the killed host leaves nothing behind that blocks a fresh start
    caller.connect().await.unwrap();
    assert!(caller.is_connected());
    caller.disconnect().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_host_binary_exits_on_sigterm() {
    use std::process::Stdio;
    use tokio::process::Command;

    let mut child = Command::new(env!("CARGO_BIN_EXE_tool-host"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    // stdin stays open for the whole test
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    stdin
        .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n")
        .await
        .unwrap();
    let mut line = String::new();
    tokio::time::timeout(CALL_TIMEOUT, stdout.read_line(&mut line))
        .await
        .expect("host did not answer the ping")
        .unwrap();
    assert!(line.contains("\"id\":1"), "unexpected reply {}", line);
    // let the serving loop install its signal handlers
    tokio::time::sleep(Duration::from_millis(300)).await;

    let pid = child.id().unwrap().to_string();
    let sent = std::process::Command::new("kill")
        .args(["-TERM", &pid])
        .status()
        .unwrap();
    assert!(sent.success());

    let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
        .await
        .expect("host still running after SIGTERM")
        .unwrap();
    assert!(status.success(), "host exited with {}", status);
    drop(stdin);
}

#[tokio::test]
async fn test_call_timeout_covers_a_blocked_write() {
    // the host end is kept alive but never read, so the pipe fills up
    let (caller_side, _unread_host_side) = duplex(64);
    let (read, write) = tokio::io::split(caller_side);
    let mut caller = ToolCaller::from_streams(read, write, CallerConfig::default());

    let text = "x".repeat(10_000);
    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        caller.call("to-uppercase", json!({"text": text}), Duration::from_millis(100)),
    )
    .await
    .expect("call must give up after its own timeout");
    assert!(matches!(outcome, Err(McpError::Timeout)), "got {:?}", outcome);

    // a half-written line breaks the framing, so the connection is gone
    assert!(!caller.is_connected());
    assert!(matches!(
        caller.ping(CALL_TIMEOUT).await,
        Err(McpError::NotConnected)
    ));
}

#[tokio::test]
async fn test_late_response_is_discarded() {
    let (mut caller, _server) = in_process(slow_registry());
    caller.initialize().await.unwrap();

    let err = caller
        .call("slow", json!({}), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::Timeout));

    // the answer to "slow" arrives first and must be skipped
    let fast = caller.call("fast", json!({}), CALL_TIMEOUT).await.unwrap();
    assert_eq!(fast.value(), json!("fast"));
}

#[tokio::test]
async fn test_host_exit_is_connection_closed() {
    let (mut caller, server) = in_process(slow_registry());
    caller.initialize().await.unwrap();

    server.abort();
    let _ = server.await;

    let err = caller.ping(QUICK_TIMEOUT).await.unwrap_err();
    assert!(matches!(err, McpError::ConnectionClosed(_)), "got {:?}", err);
    assert!(!caller.is_connected());
}

#[tokio::test]
async fn test_wrong_id_is_id_mismatch() {
    let (caller_side, host_side) = duplex(4096);
    let fake_host = tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(host_side);
        let mut reader = BufReader::new(read);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"result\":{},\"id\":999}\n")
            .await
            .unwrap();
        // keep the pipe open until the caller has read the reply
        reader.read_line(&mut line).await.ok();
    });

    let (read, write) = tokio::io::split(caller_side);
    let mut caller = ToolCaller::from_streams(read, write, CallerConfig::default());
    match caller.ping(CALL_TIMEOUT).await {
        Err(McpError::IdMismatch { expected, actual }) => {
            assert_eq!(expected, RequestId::Number(1));
            assert_eq!(actual, RequestId::Number(999));
        }
        other => panic!("expected an id mismatch, got {:?}", other),
    }

    caller.disconnect().await.unwrap();
    fake_host.await.unwrap();
}

#[tokio::test]
async fn test_malformed_reply_is_not_awaited_again() {
    let (caller_side, host_side) = duplex(4096);
    let fake_host = tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(host_side);
        let mut reader = BufReader::new(read);
        let mut line = String::new();

        reader.read_line(&mut line).await.unwrap();
        // neither result nor error
        write.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1}\n").await.unwrap();

        line.clear();
        reader.read_line(&mut line).await.unwrap();
        write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"result\":{},\"id\":1}\n")
            .await
            .unwrap();

        line.clear();
        reader.read_line(&mut line).await.ok();
    });

    let (read, write) = tokio::io::split(caller_side);
    let mut caller = ToolCaller::from_streams(read, write, CallerConfig::default());

    let first = caller.ping(CALL_TIMEOUT).await;
    assert!(matches!(first, Err(McpError::MalformedResponse(_))), "got {:?}", first);

    // id 1 was answered already, so a second reply to it is not skipped
    match caller.ping(CALL_TIMEOUT).await {
        Err(McpError::IdMismatch { expected, actual }) => {
            assert_eq!(expected, RequestId::Number(2));
            assert_eq!(actual, RequestId::Number(1));
        }
        other => panic!("expected an id mismatch, got {:?}", other),
    }

    caller.disconnect().await.unwrap();
    fake_host.await.unwrap();
}
