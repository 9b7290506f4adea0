use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::status::Status;

/* ============================= CLUSTER ============================= */

/// Errors surfaced by a [`crate::cluster::ClusterClient`].
///
/// Evaluators branch on the category: connectivity is reported on the check,
/// not-found usually degrades to a warning or a skipped check.
#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    #[error("Unable to reach the cluster API: {0}")]
    Connectivity(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout { operation: String, after: Duration },

    #[error("Kubernetes API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Unable to decode response: {0}")]
    Decode(String),
}

impl ClusterError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        ClusterError::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, ClusterError::Connectivity(_) | ClusterError::Timeout { .. })
    }
}

impl From<kube::Error> for ClusterError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(resp) if resp.code == 404 => ClusterError::NotFound {
                kind: resp.reason,
                name: resp.message,
            },
            kube::Error::Api(resp) => ClusterError::Api {
                code: resp.code,
                message: resp.message,
            },
            kube::Error::HyperError(e) => ClusterError::Connectivity(e.to_string()),
            kube::Error::Service(e) => ClusterError::Connectivity(e.to_string()),
            kube::Error::SerdeError(e) => ClusterError::Decode(e.to_string()),
            other => ClusterError::Api {
                code: 0,
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        ClusterError::Decode(e.to_string())
    }
}

/* ============================= SUPPORT BUNDLE ============================= */

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Cannot collect a support bundle: {0}")]
    Connectivity(#[source] ClusterError),

    #[error("Bundle directory {0} does not exist or is not a directory")]
    InvalidDirectory(PathBuf),

    #[error("No services selected for the support bundle")]
    NoServices,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for BundleError {
    fn from(e: serde_yaml::Error) -> Self {
        BundleError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(e: serde_json::Error) -> Self {
        BundleError::Serialization(e.to_string())
    }
}

impl From<tempfile::PersistError> for BundleError {
    fn from(e: tempfile::PersistError) -> Self {
        BundleError::Io(e.error)
    }
}

/* ============================= CONFIG ============================= */

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

/* ============================= READINESS ============================= */

/// One failing pre-deployment observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessFailure {
    pub target: String,
    pub namespace: String,
    pub condition: String,
    pub status: Status,
    pub value: String,
}

impl fmt::Display for ReadinessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}) {}: {}",
            self.status, self.target, self.namespace, self.condition, self.value
        )
    }
}

/// Raised when pre-deployment checks fail and the caller asked to stop on failure.
#[derive(Debug, Clone, Error)]
pub struct ReadinessError {
    pub failures: Vec<ReadinessFailure>,
}

impl fmt::Display for ReadinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cluster readiness failed with {} issue(s):", self.failures.len())?;
        for failure in &self.failures {
            writeln!(f, "  - {failure}")?;
        }
        Ok(())
    }
}

/* ============================= TESTS ============================= */
