// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Synapse Configuration Types
//
// Defines the configuration schema for a Synapse node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Graph persistence and learning parameters
// - Discovery scoring weights
// - Research, neurogenesis and host pool settings
// - Network and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use synapse_cortex::application::{HebbianConfig, ScoringConfig, SnapshotSchedulerConfig};
use synapse_cortex::domain::graph::{MANUAL_INITIAL_WEIGHT, PROVISIONAL_INITIAL_WEIGHT};

pub const API_VERSION: &str = "synapse/v1";
pub const KIND: &str = "SynapseConfig";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynapseConfig {
    /// API version (must be "synapse/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "SynapseConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: SynapseConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynapseConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub hebbian: HebbianConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub host_pool: HostPoolConfig,

    #[serde(default)]
    pub health: HealthMonitorConfig,

    #[serde(default)]
    pub factory: FactoryConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Snapshot file; `None` keeps the graph in memory only
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: Option<PathBuf>,

    /// Snapshot after this many writes (0 disables)
    #[serde(default = "default_snapshot_every_writes")]
    pub snapshot_every_writes: u64,

    #[serde(default)]
    pub snapshots: SnapshotSchedulerConfig,

    /// Optional YAML seed applied on startup when the graph is empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,

    /// Initial weight for operator-registered HANDLES_CONCEPT edges
    #[serde(default = "default_manual_weight")]
    pub manual_edge_weight: f64,

    /// Initial weight for edges created by neurogenesis
    #[serde(default = "default_provisional_weight")]
    pub provisional_edge_weight: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            snapshot_every_writes: default_snapshot_every_writes(),
            snapshots: SnapshotSchedulerConfig::default(),
            seed_file: None,
            manual_edge_weight: default_manual_weight(),
            provisional_edge_weight: default_provisional_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Maximum number of agents consulted per concept
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,

    /// Per-source timeout
    #[serde(default = "default_research_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_sources: default_max_sources(),
            timeout: default_research_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// A candidate scoring at least this much means the concept is already handled
    #[serde(default = "default_adequate_score")]
    pub adequate_score: f64,

    /// Fact count at which a summary is treated as a fact base
    #[serde(default = "default_dense_fact_threshold")]
    pub dense_fact_threshold: usize,

    #[serde(default = "default_build_timeout", with = "humantime_serde")]
    pub build_timeout: Duration,

    /// Health polls after deployment before giving up
    #[serde(default = "default_health_attempts")]
    pub health_attempts: u32,

    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub health_interval: Duration,

    /// Timeout of a single health probe
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Finished attempts kept for inspection
    #[serde(default = "default_attempt_history")]
    pub attempt_history: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            adequate_score: default_adequate_score(),
            dense_fact_threshold: default_dense_fact_threshold(),
            build_timeout: default_build_timeout(),
            health_attempts: default_health_attempts(),
            health_interval: default_health_interval(),
            probe_timeout: default_probe_timeout(),
            attempt_history: default_attempt_history(),
        }
    }
}

/// What `acquire` does when every slot is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AcquireMode {
    /// Fail immediately with NoCapacity
    #[default]
    FailFast,
    /// Wait up to `timeout` for a slot to be released
    Block {
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostPoolConfig {
    /// Host name agents listen on and are addressed by
    #[serde(default = "default_pool_host")]
    pub host: String,

    #[serde(default = "default_base_port")]
    pub base_port: u16,

    #[serde(default = "default_pool_size")]
    pub size: u16,

    #[serde(default)]
    pub acquire: AcquireMode,
}

impl Default for HostPoolConfig {
    fn default() -> Self {
        Self {
            host: default_pool_host(),
            base_port: default_base_port(),
            size: default_pool_size(),
            acquire: AcquireMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_monitor_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Consecutive failures before an agent is marked Failed
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_monitor_interval(),
            failure_threshold: default_failure_threshold(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FactoryKind {
    /// Agents run as server tasks inside this process
    #[default]
    InProcess,
    /// Agents run as child processes started from `command`
    Subprocess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    #[serde(default)]
    pub kind: FactoryKind,

    /// Executable for subprocess agents; defaults to the running binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<PathBuf>,

    /// Arguments placed before `--manifest <path> --port <port>`
    #[serde(default = "default_factory_args")]
    pub args: Vec<String>,

    /// Where blueprint manifests for subprocess agents are written
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            kind: FactoryKind::default(),
            command: None,
            args: default_factory_args(),
            manifest_dir: default_manifest_dir(),
        }
    }
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
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus exposition
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_snapshot_path() -> Option<PathBuf> {
    Some(PathBuf::from("./data/graph.json"))
}

fn default_snapshot_every_writes() -> u64 {
    50
}

fn default_manual_weight() -> f64 {
    MANUAL_INITIAL_WEIGHT
}

fn default_provisional_weight() -> f64 {
    PROVISIONAL_INITIAL_WEIGHT
}

fn default_max_sources() -> usize {
    5
}

fn default_research_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_adequate_score() -> f64 {
    0.5
}

fn default_dense_fact_threshold() -> usize {
    5
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_health_attempts() -> u32 {
    30
}

fn default_health_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_attempt_history() -> usize {
    256
}

fn default_pool_host() -> String {
    "127.0.0.1".to_string()
}

fn default_base_port() -> u16 {
    9100
}

fn default_pool_size() -> u16 {
    16
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_factory_args() -> Vec<String> {
    vec!["agent".to_string(), "host".to_string()]
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("./data/agents")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for SynapseConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "synapse".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: SynapseConfigSpec::default(),
        }
    }
}

impl SynapseConfig {
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

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SYNAPSE_CONFIG_PATH environment variable
    /// 2. ./synapse-config.yaml (working directory)
    /// 3. ~/.synapse/config.yaml (user home)
    /// 4. /etc/synapse/config.yaml (system, Unix) or C:\ProgramData\Synapse\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SYNAPSE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./synapse-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".synapse").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/synapse/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Synapse\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("SYNAPSE_BIND_ADDRESS") {
            tracing::info!("Environment override: SYNAPSE_BIND_ADDRESS={}", val);
            self.spec.server.bind_address = val;
        }

        if let Some(val) = lookup("SYNAPSE_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: SYNAPSE_PORT={}", port);
                    self.spec.server.port = port;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for SYNAPSE_PORT: '{}'. Expected a port number. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("SYNAPSE_SNAPSHOT_PATH") {
            tracing::info!("Environment override: SYNAPSE_SNAPSHOT_PATH={}", val);
            self.spec.graph.snapshot_path = match val.to_lowercase().as_str() {
                "" | "none" | "memory" => None,
                _ => Some(PathBuf::from(val)),
            };
        }

        if let Some(val) = lookup("SYNAPSE_HOST_POOL_BASE_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: SYNAPSE_HOST_POOL_BASE_PORT={}", port);
                    self.spec.host_pool.base_port = port;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for SYNAPSE_HOST_POOL_BASE_PORT: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("SYNAPSE_HOST_POOL_SIZE") {
            match val.parse::<u16>() {
                Ok(size) => {
                    tracing::info!("Environment override: SYNAPSE_HOST_POOL_SIZE={}", size);
                    self.spec.host_pool.size = size;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for SYNAPSE_HOST_POOL_SIZE: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("SYNAPSE_FACTORY") {
            match val.to_lowercase().as_str() {
                "in_process" | "in-process" | "inprocess" => {
                    tracing::info!("Environment override: SYNAPSE_FACTORY=in_process");
                    self.spec.factory.kind = FactoryKind::InProcess;
                }
                "subprocess" => {
                    tracing::info!("Environment override: SYNAPSE_FACTORY=subprocess");
                    self.spec.factory.kind = FactoryKind::Subprocess;
                }
                _ => tracing::warn!(
                    "Invalid value for SYNAPSE_FACTORY: '{}'. Expected in_process/subprocess. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("SYNAPSE_LOG_LEVEL") {
            self.spec.observability.logging.level = val;
        }

        if let Some(val) = lookup("SYNAPSE_LOG_FORMAT") {
            self.spec.observability.logging.format = val;
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

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;
        spec.scoring.validate()?;
        spec.hebbian.validate()?;

        for (name, weight) in [
            ("graph.manual_edge_weight", spec.graph.manual_edge_weight),
            ("graph.provisional_edge_weight", spec.graph.provisional_edge_weight),
            ("lifecycle.adequate_score", spec.lifecycle.adequate_score),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, weight);
            }
        }

        if spec.research.max_sources == 0 {
            anyhow::bail!("research.max_sources must be at least 1");
        }
        if spec.research.timeout.is_zero() {
            anyhow::bail!("research.timeout must be greater than zero");
        }

        if spec.lifecycle.health_attempts == 0 {
            anyhow::bail!("lifecycle.health_attempts must be at least 1");
        }
        if spec.lifecycle.build_timeout.is_zero() {
            anyhow::bail!("lifecycle.build_timeout must be greater than zero");
        }

        if spec.host_pool.size == 0 {
            anyhow::bail!("host_pool.size must be at least 1");
        }
        if u32::from(spec.host_pool.base_port) + u32::from(spec.host_pool.size) > 65536 {
            anyhow::bail!(
                "host_pool ports {}..{} exceed the valid port range",
                spec.host_pool.base_port,
                u32::from(spec.host_pool.base_port) + u32::from(spec.host_pool.size)
            );
        }
        let pool_ports = spec.host_pool.base_port..spec.host_pool.base_port.saturating_add(spec.host_pool.size);
        if pool_ports.contains(&spec.server.port) {
            anyhow::bail!(
                "server.port {} falls inside the host pool port range",
                spec.server.port
            );
        }

        if spec.health.failure_threshold == 0 {
            anyhow::bail!("health.failure_threshold must be at least 1");
        }

        match spec.observability.logging.format.as_str() {
            "json" | "compact" | "pretty" => {}
            other => anyhow::bail!(
                "observability.logging.format must be json, compact or pretty, got '{}'",
                other
            ),
        }

        Ok(())
    }
}
