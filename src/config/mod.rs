use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::upstream::{Backoff, RetryPolicy};
use crate::utils::error::{McpError, McpResult};

/// Top-level settings, loaded from `mcp_stdio.config.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// How the caller starts the tool host
    #[serde(default)]
    pub host: HostSettings,

    /// Logging settings
    #[serde(default)]
    pub logger: LoggerSettings,

    /// Generative-language service settings
    #[serde(default)]
    pub upstream: UpstreamSettings,

    /// Blocking bridge settings
    #[serde(default)]
    pub bridge: BridgeSettings,
}

/// Settings for spawning a tool host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// Executable to run
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments for the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Script passed to the command as its last argument
    #[serde(default)]
    pub script: Option<String>,

    /// Environment variables to pass to the host
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory of the host
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Read timeout in seconds for each request
    #[serde(default = "default_read_timeout_seconds")]
    pub read_timeout_seconds: u64,

    /// Grace period in milliseconds between closing stdin and killing the host
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            script: None,
            env: HashMap::new(),
            working_dir: None,
            read_timeout_seconds: default_read_timeout_seconds(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl HostSettings {
    /// Per-request timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    /// Grace period used by `disconnect`
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Logger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level or filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit ANSI colour codes in log lines
    #[serde(default)]
    pub ansi: bool,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: false,
        }
    }
}

/// Settings for the generative-language service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSettings {
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// HTTP timeout in seconds
    #[serde(default = "default_upstream_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Attempts per prompt, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step in seconds
    #[serde(default = "default_backoff_step_seconds")]
    pub backoff_step_seconds: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            api_url: default_api_url(),
            timeout_seconds: default_upstream_timeout_seconds(),
            max_attempts: default_max_attempts(),
            backoff_step_seconds: default_backoff_step_seconds(),
        }
    }
}

/// Settings for the blocking bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Worker threads of the bridge runtime
    #[serde(default = "default_bridge_workers")]
    pub workers: usize,

    /// Longest time a synchronous call waits, in seconds
    #[serde(default = "default_bridge_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            workers: default_bridge_workers(),
            timeout_seconds: default_bridge_timeout_seconds(),
        }
    }
}

fn default_read_timeout_seconds() -> u64 {
    10
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_api_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_upstream_timeout_seconds() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_step_seconds() -> u64 {
    3
}

fn default_bridge_workers() -> usize {
    3
}

fn default_bridge_timeout_seconds() -> u64 {
    30
}

impl Settings {
    /// Reads the API key from the configured environment variable.
    ///
    /// A missing or blank key is a configuration error: components that talk
    /// to the generative service cannot start without it.
    pub fn require_api_key(&self) -> McpResult<String> {
        std::env::var(&self.upstream.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                McpError::Config(format!(
                    "environment variable {} is not set",
                    self.upstream.api_key_env
                ))
            })
    }

    /// Retry policy for upstream calls
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.upstream.max_attempts.max(1),
            backoff: Backoff::Linear {
                step: Duration::from_secs(self.upstream.backoff_step_seconds),
            },
        }
    }
}

/// Load settings from a YAML file
pub fn load_settings<P: AsRef<Path>>(path: P) -> McpResult<Settings> {
    let mut file = File::open(path)
        .map_err(|e| McpError::Config(format!("Failed to open config file: {}", e)))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| McpError::Config(format!("Failed to read config file: {}", e)))?;

    let settings: Settings = serde_yaml::from_str(&contents)
        .map_err(|e| McpError::Config(format!("Failed to parse config file: {}", e)))?;

    Ok(settings)
}

/// Load settings from `config_path`, or from the first config file found in
/// the usual locations, or fall back to defaults
pub fn get_settings(config_path: Option<&str>) -> McpResult<Settings> {
    match config_path {
        Some(path) => load_settings(path),
        None => {
            let default_paths = ["mcp_stdio.config.yaml", "config/mcp_stdio.config.yaml"];

            for path in default_paths {
                if Path::new(path).exists() {
                    return load_settings(path);
                }
            }

            Ok(Settings::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings.host.read_timeout(), Duration::from_secs(10));
        assert_eq!(settings.upstream.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(settings.bridge.workers, 3);
        assert_eq!(settings.bridge.timeout_seconds, 30);
        assert_eq!(settings.logger.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
host:
  command: python
  script: server.py
  env:
    PYTHONUNBUFFERED: "1"
upstream:
  max_attempts: 5
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.host.command.as_deref(), Some("python"));
        assert_eq!(settings.host.script.as_deref(), Some("server.py"));
        assert_eq!(settings.host.env["PYTHONUNBUFFERED"], "1");
        assert_eq!(settings.host.shutdown_grace(), Duration::from_millis(2000));

        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_after(1), Duration::from_secs(3));
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let mut settings = Settings::default();
        settings.upstream.api_key_env = "MCP_STDIO_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        let err = settings.require_api_key().unwrap_err();
        assert!(matches!(err, McpError::Config(ref msg) if msg.contains("MCP_STDIO_TEST_KEY")));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_settings("/nonexistent/mcp_stdio.config.yaml").unwrap_err();
        assert!(matches!(err, McpError::Config(_)));
    }
}
