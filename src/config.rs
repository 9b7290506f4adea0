use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ConfigError;
use crate::quantity::{Version, parse_memory_bytes};

/* ============================= DEFAULTS ============================= */

pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BROKER_STATS_PORT: u16 = 9600;
pub const DEFAULT_MIN_VCPU: u64 = 4;
pub const DEFAULT_MIN_MEMORY: &str = "16G";

fn default_min_k8s_version() -> Version {
    Version::new(&[1, 20])
}

fn default_architectures() -> Vec<String> {
    vec!["amd64".to_string()]
}

fn default_min_vcpu() -> u64 {
    DEFAULT_MIN_VCPU
}

fn default_min_memory() -> String {
    DEFAULT_MIN_MEMORY.to_string()
}

fn default_api_timeout_seconds() -> u64 {
    DEFAULT_API_TIMEOUT.as_secs()
}

fn default_broker_stats_port() -> u16 {
    DEFAULT_BROKER_STATS_PORT
}

/* ============================= CHECK CONTEXT ============================= */

/// Per-run settings threaded through the engine and evaluators.
#[derive(Debug, Clone)]
pub struct CheckContext {
    /// Restrict custom resources and pods to one namespace. `None` means all namespaces.
    pub namespace: Option<String>,
    /// Bound on each cluster API call.
    pub api_timeout: Duration,
    /// Checks not finished by this instant are reported as cancelled.
    pub deadline: Option<Instant>,
    /// Fetch broker statistics from the diagnostics service.
    pub broker_stats: bool,
    pub broker_stats_port: u16,
}

impl Default for CheckContext {
    fn default() -> Self {
        Self {
            namespace: None,
            api_timeout: DEFAULT_API_TIMEOUT,
            deadline: None,
            broker_stats: false,
            broker_stats_port: DEFAULT_BROKER_STATS_PORT,
        }
    }
}

impl CheckContext {
    /// Per-call settings from the config file. The run itself has no deadline.
    pub fn from_file(file: &FileConfig) -> Self {
        Self {
            api_timeout: file.api_timeout(),
            broker_stats_port: file.broker_stats_port,
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    pub fn with_broker_stats(mut self, enabled: bool) -> Self {
        self.broker_stats = enabled;
        self
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/* ============================= PRE-DEPLOYMENT ============================= */

/// Thresholds for cluster readiness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreDeploymentConfig {
    #[serde(default = "default_min_k8s_version")]
    pub min_k8s_version: Version,

    #[serde(default = "default_architectures")]
    pub allowed_architectures: Vec<String>,

    #[serde(default = "default_min_vcpu")]
    pub min_vcpu: u64,

    /// Kubernetes quantity, e.g. `"16G"` or `"16Gi"`.
    #[serde(default = "default_min_memory")]
    pub min_memory: String,

    /// Only checked when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_kernel_version: Option<Version>,

    /// Only checked when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_classes: Vec<String>,

    /// Treat warnings as readiness failures.
    #[serde(default)]
    pub strict: bool,
}

impl Default for PreDeploymentConfig {
    fn default() -> Self {
        Self {
            min_k8s_version: default_min_k8s_version(),
            allowed_architectures: default_architectures(),
            min_vcpu: default_min_vcpu(),
            min_memory: default_min_memory(),
            min_kernel_version: None,
            storage_classes: Vec::new(),
            strict: false,
        }
    }
}

impl PreDeploymentConfig {
    pub fn min_memory_bytes(&self) -> Result<u64, ConfigError> {
        parse_memory_bytes(&self.min_memory).ok_or_else(|| ConfigError::Invalid {
            field: "minMemory".to_string(),
            message: format!("'{}' is not a memory quantity", self.min_memory),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.min_memory_bytes()?;
        if self.allowed_architectures.is_empty() {
            return Err(ConfigError::Invalid {
                field: "allowedArchitectures".to_string(),
                message: "at least one architecture is required".to_string(),
            });
        }
        Ok(())
    }
}

/* ============================= FILE CONFIG ============================= */

/// Optional YAML configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default)]
    pub pre_deployment: PreDeploymentConfig,

    #[serde(default = "default_api_timeout_seconds")]
    pub api_timeout_seconds: u64,

    #[serde(default = "default_broker_stats_port")]
    pub broker_stats_port: u16,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            pre_deployment: PreDeploymentConfig::default(),
            api_timeout_seconds: default_api_timeout_seconds(),
            broker_stats_port: default_broker_stats_port(),
        }
    }
}

impl FileConfig {
    pub fn from_yaml(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: FileConfig = serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.pre_deployment.validate()?;
        Ok(config)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_seconds)
    }
}

/// Load the config file, or defaults when no path is given.
pub fn load_file(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::from_yaml(&raw, path)
}

/* ============================= TESTS ============================= */
