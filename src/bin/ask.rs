//! Sends one prompt to Gemini with the overload retry policy.
//!
//! Usage: `ask PROMPT...`. The API key is read from the environment variable
//! named in the `upstream` config section (`GOOGLE_API_KEY` by default).

use anyhow::bail;
use mcp_stdio::config::get_settings;
use mcp_stdio::upstream::gemini::GeminiClient;
use mcp_stdio::upstream::ask_with_retry;
use mcp_stdio::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        bail!("usage: ask PROMPT...");
    }

    let config_path = std::env::var("MCP_STDIO_CONFIG").ok();
    let settings = get_settings(config_path.as_deref())?;
    init_telemetry(TelemetryConfig {
        service_name: "ask".to_string(),
        log_level: settings.logger.level.clone(),
        ansi: settings.logger.ansi,
    })?;

    let client = GeminiClient::from_settings(&settings)?;
    let answer = ask_with_retry(&client, &prompt, &settings.retry_policy()).await;
    println!("{}", answer);
    Ok(())
}
