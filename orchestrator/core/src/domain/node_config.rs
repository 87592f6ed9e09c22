// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for cohort controller and daemon nodes:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Node identity and role
// - Network endpoints (bind, advertised host, controller endpoint)
// - Transport tuning (timeouts, inbox capacity, frame limit, emulated latency)
// - Logging and metrics settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::agent::AgentAddress;

pub const API_VERSION: &str = "cohort/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "cohort/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: NodeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    #[serde(default)]
    pub node: NodeIdentity,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Queue ID this node registers under. Defaults to the hostname.
    #[serde(default = "default_node_id")]
    pub id: String,

    #[serde(default)]
    pub role: NodeRole,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Controller,
    #[default]
    Daemon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface the TCP listeners bind to (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Host other nodes use to reach this node's queues
    #[serde(default = "default_advertised_host")]
    pub advertised_host: String,

    /// Well-known port of the node's own queue. `None` means the role default:
    /// 3000 for the controller, ephemeral for daemons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// `host:port` of the controller (daemons only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// Bound on each queue's inbox; senders wait when it is full
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Emulated latency for in-process pipes (0 = none)
    #[serde(default)]
    pub local_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("compact" or "json")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "cohort-node".to_string())
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_advertised_host() -> String {
    "127.0.0.1".to_string()
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_send_timeout() -> u64 {
    5000
}

fn default_inbox_capacity() -> usize {
    1024
}

fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

pub const DEFAULT_CONTROLLER_PORT: u16 = 3000;

impl Default for NodeIdentity {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            role: NodeRole::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            advertised_host: default_advertised_host(),
            port: None,
            controller_endpoint: None,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            send_timeout_ms: default_send_timeout(),
            inbox_capacity: default_inbox_capacity(),
            max_frame_bytes: default_max_frame_bytes(),
            local_delay_ms: 0,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// `None` when no latency is emulated.
    pub fn local_delay(&self) -> Option<Duration> {
        (self.local_delay_ms > 0).then(|| Duration::from_millis(self.local_delay_ms))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: default_node_id(),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. COHORT_CONFIG_PATH environment variable
    /// 2. ./cohort-config.yaml (working directory)
    /// 3. ~/.cohort/config.yaml (user home)
    /// 4. /etc/cohort/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("COHORT_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./cohort-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".cohort").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/cohort/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("COHORT_LOCAL_DELAY_MS") {
            match val.trim().parse() {
                Ok(ms) => {
                    tracing::info!("Environment override: COHORT_LOCAL_DELAY_MS={}", ms);
                    self.spec.transport.local_delay_ms = ms;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for COHORT_LOCAL_DELAY_MS: '{}'. Expected milliseconds. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("COHORT_SEND_TIMEOUT_MS") {
            match val.trim().parse() {
                Ok(ms) => {
                    tracing::info!("Environment override: COHORT_SEND_TIMEOUT_MS={}", ms);
                    self.spec.transport.send_timeout_ms = ms;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for COHORT_SEND_TIMEOUT_MS: '{}'. Expected milliseconds. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("COHORT_ADVERTISED_HOST") {
            if !val.trim().is_empty() {
                tracing::info!("Environment override: COHORT_ADVERTISED_HOST={}", val);
                self.spec.network.advertised_host = val.trim().to_string();
            }
        }
    }

    /// Port of this node's own queue, resolving the role default.
    pub fn queue_port(&self) -> u16 {
        self.spec.network.port.unwrap_or(match self.spec.node.role {
            NodeRole::Controller => DEFAULT_CONTROLLER_PORT,
            NodeRole::Daemon => 0,
        })
    }

    /// Parsed `network.controller_endpoint`, if set.
    pub fn controller_address(&self) -> anyhow::Result<Option<AgentAddress>> {
        match &self.spec.network.controller_endpoint {
            None => Ok(None),
            Some(endpoint) => AgentAddress::parse_endpoint(endpoint)
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("Invalid controller_endpoint '{}'. Expected host:port", endpoint)),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.spec.node.id.trim().is_empty() {
            anyhow::bail!("spec.node.id cannot be empty");
        }

        let transport = &self.spec.transport;
        if transport.connect_timeout_ms == 0 {
            anyhow::bail!("spec.transport.connect_timeout_ms must be greater than zero");
        }
        if transport.send_timeout_ms == 0 {
            anyhow::bail!("spec.transport.send_timeout_ms must be greater than zero");
        }
        if transport.inbox_capacity == 0 {
            anyhow::bail!("spec.transport.inbox_capacity must be greater than zero");
        }
        if transport.max_frame_bytes < 1024 {
            anyhow::bail!(
                "spec.transport.max_frame_bytes must be at least 1024 (got {})",
                transport.max_frame_bytes
            );
        }

        self.controller_address()?;

        let format = self.spec.observability.logging.format.as_str();
        if format != "compact" && format != "json" {
            anyhow::bail!("Invalid logging format: '{}'. Must be 'compact' or 'json'", format);
        }

        Ok(())
    }
}
