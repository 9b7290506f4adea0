//! Diagnostics for an edge platform deployed on Kubernetes: readiness and health
//! checks rendered as a report, plus support-bundle collection.

pub mod archive;
pub mod bundle;
pub mod catalog;
pub mod check;
pub mod cluster;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod evaluators;
pub mod projection;
pub mod quantity;
pub mod render;
pub mod resource;
pub mod stats;
pub mod status;

pub use catalog::{ResourceKind, Service};
pub use check::{ALL_NAMESPACES, Check, CheckManager, Evaluation, Report, TargetEntry};
pub use cluster::{ClusterClient, KubeCluster};
pub use config::{CheckContext, PreDeploymentConfig};
pub use engine::{CheckEngine, RunRequest};
pub use status::{DetailLevel, Status};
