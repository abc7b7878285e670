//! Telemetry configuration from environment variables.

use std::env;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line.
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive.
    pub log_level: String,

    /// Whether to enable JSON formatted logs.
    pub json_logs: bool,

    /// Port of the status server exposing `/metrics`.
    pub metrics_port: u16,

    /// Network identifier (mainnet, sepolia, ...).
    pub network: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "bonder-node".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            metrics_port: 9100,
            network: "mainnet".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read configuration from the environment.
    ///
    /// JSON logs default on inside containers (`KUBERNETES_SERVICE_HOST` or
    /// `DOCKER_CONTAINER` set).
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("BN_SERVICE_NAME").unwrap_or_else(|_| "bonder-node".to_string()),

            log_level: env::var("BN_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("BN_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            metrics_port: env::var("BN_METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9100),

            network: env::var("BN_NETWORK").unwrap_or_else(|_| "mainnet".to_string()),
        }
    }
}
