//! Serves the builtin tools (and the iNaturalist tools when built with the
//! `inaturalist` feature) on stdin/stdout.
//!
//! Settings are read from the file named by `MCP_STDIO_CONFIG`, or from the
//! default locations. Logs go to stderr.

use std::time::Duration;

use mcp_stdio::config::get_settings;
use mcp_stdio::mcp::lifecycle::ServerInfo;
use mcp_stdio::tools::default_registry;
use mcp_stdio::{init_telemetry, TelemetryConfig, ToolHost};
use tokio::runtime::Runtime;
use tracing::info;

/// Longest wait for runtime threads once serving has ended. The stdin reader
/// sits in a blocking read that only returns when input arrives.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);

fn main() -> anyhow::Result<()> {
    let runtime = Runtime::new()?;
    let outcome = runtime.block_on(serve());
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    outcome
}

async fn serve() -> anyhow::Result<()> {
    let config_path = std::env::var("MCP_STDIO_CONFIG").ok();
    let settings = get_settings(config_path.as_deref())?;

    init_telemetry(TelemetryConfig {
        service_name: "tool-host".to_string(),
        log_level: settings.logger.level.clone(),
        ansi: settings.logger.ansi,
    })?;

    let registry = default_registry()?;
    info!(tools = registry.len(), "Tools registered");

    let host = ToolHost::new(
        registry,
        ServerInfo::new("mcp-stdio-tool-host", env!("CARGO_PKG_VERSION")),
    )?;
    host.serve_stdio().await?;

    info!("Tool host stopped");
    Ok(())
}
