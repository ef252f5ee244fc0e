//! Scripted demo session against a tool host.
//!
//! Usage: `tool-caller [HOST_PROGRAM [ARGS...]]`. Without arguments the host
//! is taken from the `host` config section, or else the `tool-host` binary
//! next to this executable.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use mcp_stdio::config::{get_settings, Settings};
use mcp_stdio::mcp::caller::{CallerConfig, HostCommand, ToolCaller};
use mcp_stdio::mcp::tools::ToolErrorKind;
use mcp_stdio::{init_telemetry, McpError, TelemetryConfig};
use serde_json::{json, Value};

/// Pause between demo steps
const PAUSE: Duration = Duration::from_secs(1);

fn sibling_host() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate the current executable")?;
    let dir = exe
        .parent()
        .context("current executable has no parent directory")?;
    Ok(dir.join(format!("tool-host{}", std::env::consts::EXE_SUFFIX)))
}

fn host_command(settings: &Settings) -> anyhow::Result<HostCommand> {
    let mut args = std::env::args().skip(1);
    if let Some(program) = args.next() {
        return Ok(args.fold(HostCommand::new(&program), |cmd, arg| cmd.arg(&arg)));
    }
    if settings.host.command.is_some() {
        return Ok(HostCommand::from_settings(&settings.host)?);
    }
    let host = sibling_host()?;
    Ok(HostCommand::new(&host.to_string_lossy()))
}

async fn step(caller: &mut ToolCaller, timeout: Duration, name: &str, arguments: Value) {
    println!("\n{} {} {}", "→".cyan(), name.bold(), arguments);
    match caller.call(name, arguments, timeout).await {
        Ok(result) => println!("  {} {}", "result:".green().bold(), result.value()),
        Err(McpError::Rpc(error)) => {
            let kind = ToolErrorKind::from_rpc(&error)
                .map(|k| k.tag())
                .unwrap_or("error");
            println!("  {} {} ({})", "error:".red().bold(), error.message, kind);
        }
        Err(e) => println!("  {} {}", "failed:".red().bold(), e),
    }
    tokio::time::sleep(PAUSE).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("MCP_STDIO_CONFIG").ok();
    let settings = get_settings(config_path.as_deref())?;
    init_telemetry(TelemetryConfig {
        service_name: "tool-caller".to_string(),
        log_level: settings.logger.level.clone(),
        ansi: settings.logger.ansi,
    })?;

    let command = host_command(&settings)?;
    let timeout = settings.host.read_timeout();
    let config = CallerConfig {
        request_timeout: timeout,
        shutdown_grace: settings.host.shutdown_grace(),
        ..CallerConfig::default()
    };
    let mut caller = ToolCaller::with_config(command, config);

    println!("{}", "Tool caller demo".bold().green());
    let init = caller.start().await?;
    println!(
        "Connected to {} {} (protocol {})",
        init.server_info.name.bold(),
        init.server_info.version,
        init.protocol_version
    );
    tokio::time::sleep(PAUSE).await;

    println!("\n{}", "Available tools:".bold());
    for tool in caller.list_tools(timeout).await? {
        println!("  • {} - {}", tool.name.cyan(), tool.description);
    }
    tokio::time::sleep(PAUSE).await;

    step(&mut caller, timeout, "sum-two-numbers", json!({"a": 15, "b": 27})).await;
    step(&mut caller, timeout, "multiply-two-numbers", json!({"a": 8, "b": 7})).await;
    step(&mut caller, timeout, "divide", json!({"a": 10, "b": 2})).await;
    step(&mut caller, timeout, "greet", json!({"name": "Juan"})).await;

    caller.disconnect().await?;
    println!("\n{}", "Disconnected".bold());
    Ok(())
}
