//! Support Controller Configuration
//!
//! Loaded from the YAML file mounted from the controller's `ConfigMap`.

use crate::tasks::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main controller configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Requeue configuration
    #[serde(default)]
    pub requeue: RequeueConfig,

    /// Conflict retry policy for status writes
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Outbound HTTP configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Probe and metrics server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Requeue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequeueConfig {
    /// Seconds to wait before retrying a `Support` whose workflow failed
    #[serde(rename = "failedDelaySeconds", default = "default_failed_delay")]
    pub failed_delay_seconds: u64,
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Overall timeout applied to analysis and Argo CD requests
    #[serde(rename = "timeoutSeconds", default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

/// Probe and metrics server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(rename = "bindAddress", default = "default_bind_address")]
    pub bind_address: String,
}

fn default_failed_delay() -> u64 {
    10
}

fn default_http_timeout() -> u64 {
    300 // 5 minutes
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            failed_delay_seconds: default_failed_delay(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_http_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl ControllerConfig {
    /// Validate that configuration values are usable
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.retry.steps == 0 {
            return Err(anyhow::anyhow!("retry.steps must be at least 1"));
        }

        if self.retry.factor < 1.0 || self.retry.jitter < 0.0 {
            return Err(anyhow::anyhow!(
                "retry.factor must be >= 1.0 and retry.jitter must not be negative"
            ));
        }

        if self.http.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("http.timeoutSeconds must be greater than 0"));
        }

        self.bind_address()?;

        if let Some(namespace) = &self.namespace {
            if namespace.trim().is_empty() {
                return Err(anyhow::anyhow!("namespace must not be blank when set"));
            }
        }

        Ok(())
    }

    /// Load configuration from mounted ConfigMap file
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: ControllerConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;

        Ok(config)
    }

    #[must_use]
    pub fn failed_requeue_delay(&self) -> Duration {
        Duration::from_secs(self.requeue.failed_delay_seconds)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    pub fn bind_address(&self) -> Result<SocketAddr, anyhow::Error> {
        self.server.bind_address.parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid server.bindAddress '{}': {e}",
                self.server.bind_address
            )
        })
    }
}
