//! Logging and metrics
//!
//! This module sets up `tracing` for the binaries and provides two small
//! helpers used across the crate:
//! - `add_metric` records a named value with tags under the `metrics` target
//! - `span_duration` logs how long an operation took when the guard drops
//!
//! Log output always goes to stderr: a tool host's stdout carries protocol
//! lines only.

use std::collections::HashMap;

use crate::utils::error::{McpError, McpResult};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Name of the service, recorded on startup
    pub service_name: String,
    /// Default log level or filter directive; `RUST_LOG` takes precedence
    pub log_level: String,
    /// Emit ANSI colour codes
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "mcp-stdio".to_string(),
            log_level: "info".to_string(),
            ansi: false,
        }
    }
}

/// Installs the global `tracing` subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> McpResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|e| McpError::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::info!(service = %config.service_name, "Logging initialized");
    Ok(())
}

/// Add a single metric with tags
pub fn add_metric(name: &str, value: f64, tags: &[(&str, String)]) {
    let tags_str = tags
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");

    tracing::debug!(
        target: "metrics",
        metric_name = %name,
        metric_value = %value,
        metric_tags = %tags_str,
        "Recorded metric"
    );
}

/// Add multiple metrics at once
pub fn add_metrics(metrics: HashMap<&'static str, f64>) {
    for (key, value) in metrics.iter() {
        add_metric(key, *value, &[]);
    }
}

/// A span duration tracker for measuring operation durations
pub fn span_duration(name: &'static str) -> impl Drop {
    let start = std::time::Instant::now();
    struct Guard {
        name: &'static str,
        start: std::time::Instant,
    }

    impl Drop for Guard {
        fn drop(&mut self) {
            let duration = self.start.elapsed();
            tracing::debug!(
                target: "metrics",
                duration_ms = duration.as_secs_f64() * 1000.0,
                operation = self.name,
                "Operation completed"
            );
        }
    }

    Guard { name, start }
}
