//! Cluster readiness: Kubernetes version, node capacity, storage classes.

use k8s_openapi::api::core::v1::Node;
use serde_json::{Value, json};
use tracing::warn;

use crate::check::{ALL_NAMESPACES, Check, CheckManager, Evaluation};
use crate::config::PreDeploymentConfig;
use crate::display::Display;
use crate::error::ClusterError;
use crate::quantity::{Version, format_bytes, parse_cpu_millis, parse_memory_bytes};
use crate::status::{DetailLevel, Status};

use super::EvalContext;

pub const K8S_VERSION_CHECK: &str = "evalK8sVers";
pub const CLUSTER_NODES_CHECK: &str = "evalClusterNodes";
pub const STORAGE_CLASSES_CHECK: &str = "evalStorageClasses";

pub const K8S_TARGET: &str = "k8s";
pub const NODES_TARGET: &str = "cluster/nodes";
pub const STORAGE_CLASSES_TARGET: &str = "cluster/storage-classes";

/* ============================= K8S VERSION ============================= */

pub async fn evaluate_k8s_version(e: &EvalContext<'_>, config: &PreDeploymentConfig) -> Check {
    let mut check = CheckManager::new(K8S_VERSION_CHECK, "Evaluate Kubernetes server");
    let condition = format!("(k8s version)>={}", config.min_k8s_version);
    check.add_target(K8S_TARGET, ALL_NAMESPACES, Vec::<String>::new(), Some("Kubernetes server version"));

    match e.client.server_version().await {
        Ok(version) => {
            let status = if version >= config.min_k8s_version {
                Status::Success
            } else {
                Status::Error
            };
            check.add_condition_eval(
                K8S_TARGET,
                ALL_NAMESPACES,
                condition,
                Evaluation::new(status, version.to_string()),
            );
            if e.as_list {
                check.add_display(
                    K8S_TARGET,
                    ALL_NAMESPACES,
                    Display::new(0)
                        .plain("Require ")
                        .label(format!("k8s >={}", config.min_k8s_version))
                        .plain(", detected ")
                        .status(version.to_string(), status),
                );
            }
        }
        Err(err) => {
            warn!(error = %err, "server_version_failed");
            let message = if err.is_connectivity() {
                format!("Unable to fetch Kubernetes version: {err}")
            } else {
                err.to_string()
            };
            check.add_condition_eval(
                K8S_TARGET,
                ALL_NAMESPACES,
                condition,
                Evaluation::new(Status::Error, message.clone()),
            );
            if e.as_list {
                check.add_display(K8S_TARGET, ALL_NAMESPACES, Display::new(0).status(message, Status::Error));
            }
        }
    }
    check.into_check()
}

/* ============================= NODES ============================= */

struct NodeFacts<'n> {
    name: &'n str,
    architecture: Option<&'n str>,
    cpu: Option<&'n str>,
    memory: Option<&'n str>,
    kernel: Option<&'n str>,
}

impl<'n> NodeFacts<'n> {
    fn of(node: &'n Node) -> Self {
        let status = node.status.as_ref();
        let info = status.and_then(|s| s.node_info.as_ref());
        let allocatable = status.and_then(|s| s.allocatable.as_ref());
        Self {
            name: node.metadata.name.as_deref().unwrap_or(""),
            architecture: info.map(|i| i.architecture.as_str()).filter(|a| !a.is_empty()),
            kernel: info.map(|i| i.kernel_version.as_str()).filter(|k| !k.is_empty()),
            cpu: allocatable.and_then(|a| a.get("cpu")).map(|q| q.0.as_str()),
            memory: allocatable.and_then(|a| a.get("memory")).map(|q| q.0.as_str()),
        }
    }
}

pub async fn evaluate_cluster_nodes(
    e: &EvalContext<'_>,
    config: &PreDeploymentConfig,
) -> Result<Check, ClusterError> {
    let mut check = CheckManager::new(CLUSTER_NODES_CHECK, "Evaluate cluster nodes");
    let nodes = e.client.list_nodes().await?;

    let count_condition = format!("len({NODES_TARGET})>=1");
    if nodes.is_empty() {
        check.add_condition_eval(
            NODES_TARGET,
            ALL_NAMESPACES,
            count_condition,
            Evaluation::new(Status::Error, "No nodes detected."),
        );
        if e.as_list {
            check.add_display(
                NODES_TARGET,
                ALL_NAMESPACES,
                Display::new(0).status("No nodes detected.", Status::Error),
            );
        }
        return Ok(check.into_check());
    }
    check.add_condition_eval(
        NODES_TARGET,
        ALL_NAMESPACES,
        count_condition,
        Evaluation::new(Status::Success, nodes.len()),
    );

    let min_memory = config.min_memory_bytes().map_err(|err| ClusterError::Decode(err.to_string()))?;
    let min_cpu_millis = config.min_vcpu * 1000;
    let arch_condition = format!("info.architecture in ({})", config.allowed_architectures.join(","));
    let cpu_condition = format!("condition.cpu>={}", config.min_vcpu);
    let memory_condition = format!("condition.memory>={}", config.min_memory);
    let kernel_condition = config
        .min_kernel_version
        .as_ref()
        .map(|v| format!("info.kernel_version>={v}"));

    for node in &nodes {
        let facts = NodeFacts::of(node);
        let eval = |check: &mut CheckManager, condition: &str, status: Status, value: Value| {
            check.add_condition_eval(
                NODES_TARGET,
                ALL_NAMESPACES,
                condition,
                Evaluation::new(status, value).named(facts.name).of_kind("node"),
            );
        };

        let arch_status = match facts.architecture {
            Some(arch) if config.allowed_architectures.iter().any(|a| a == arch) => Status::Success,
            Some(_) => Status::Error,
            None => Status::Warning,
        };
        eval(&mut check, arch_condition.as_str(), arch_status, json!(facts.architecture));

        let cpu_millis = facts.cpu.and_then(parse_cpu_millis);
        let cpu_status = match cpu_millis {
            Some(m) if m >= min_cpu_millis => Status::Success,
            Some(_) => Status::Error,
            None => Status::Warning,
        };
        eval(&mut check, cpu_condition.as_str(), cpu_status, json!(facts.cpu));

        let memory_bytes = facts.memory.and_then(parse_memory_bytes);
        let memory_status = match memory_bytes {
            Some(b) if b >= min_memory => Status::Success,
            Some(_) => Status::Error,
            None => Status::Warning,
        };
        eval(&mut check, memory_condition.as_str(), memory_status, json!(facts.memory));

        let mut kernel_status = None;
        if let (Some(condition), Some(min_kernel)) = (&kernel_condition, &config.min_kernel_version) {
            let status = match facts.kernel.and_then(|k| k.parse::<Version>().ok()) {
                Some(v) if &v >= min_kernel => Status::Success,
                Some(_) => Status::Error,
                None => Status::Warning,
            };
            eval(&mut check, condition.as_str(), status, json!(facts.kernel));
            kernel_status = Some(status);
        }

        if e.as_list {
            let node_status = [arch_status, cpu_status, memory_status]
                .into_iter()
                .chain(kernel_status)
                .fold(Status::Success, Status::worst);
            let mut lines = vec![Display::new(0).plain("Node ").value(facts.name).status(
                format!(" {node_status}"),
                node_status,
            )];
            lines.push(
                Display::new(4)
                    .label("Architecture")
                    .plain(": ")
                    .status(facts.architecture.unwrap_or("N/A"), arch_status),
            );
            lines.push(
                Display::new(4)
                    .label("CPU")
                    .plain(": ")
                    .status(facts.cpu.unwrap_or("N/A"), cpu_status),
            );
            let memory_text = memory_bytes.map(format_bytes).unwrap_or_else(|| "N/A".to_string());
            lines.push(
                Display::new(4)
                    .label("Memory")
                    .plain(": ")
                    .status(memory_text, memory_status),
            );
            if let Some(status) = kernel_status {
                lines.push(
                    Display::new(4)
                        .label("Kernel")
                        .plain(": ")
                        .status(facts.kernel.unwrap_or("N/A"), status),
                );
            }
            if e.detail >= DetailLevel::Verbose
                && let Some(info) = node.status.as_ref().and_then(|s| s.node_info.as_ref())
            {
                lines.push(Display::field(4, "OS image", info.os_image.as_str()));
                lines.push(Display::field(4, "Kubelet", info.kubelet_version.as_str()));
                lines.push(Display::field(4, "Container runtime", info.container_runtime_version.as_str()));
            }
            check.add_displays(NODES_TARGET, ALL_NAMESPACES, lines);
        }
    }
    Ok(check.into_check())
}

/* ============================= STORAGE CLASSES ============================= */

/// Only meaningful when the config names at least one acceptable class.
pub async fn evaluate_storage_classes(
    e: &EvalContext<'_>,
    config: &PreDeploymentConfig,
) -> Result<Check, ClusterError> {
    let mut check = CheckManager::new(STORAGE_CLASSES_CHECK, "Evaluate storage classes");
    let classes = e.client.list_storage_classes().await?;
    let names: Vec<&str> = classes
        .iter()
        .filter_map(|sc| sc.metadata.name.as_deref())
        .collect();
    let accepted: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| config.storage_classes.iter().any(|want| want == n))
        .collect();

    let condition = format!("any(storageclass in ({}))", config.storage_classes.join(","));
    let (status, value) = if accepted.is_empty() {
        (
            Status::Error,
            json!(format!(
                "No storage class from ({}) detected.",
                config.storage_classes.join(", ")
            )),
        )
    } else {
        (Status::Success, json!(accepted))
    };
    check.add_condition_eval(
        STORAGE_CLASSES_TARGET,
        ALL_NAMESPACES,
        condition,
        Evaluation::new(status, value),
    );
    if e.as_list {
        let mut lines = vec![
            Display::new(0)
                .plain("Storage classes: ")
                .status(if accepted.is_empty() { "none acceptable" } else { "ok" }, status),
        ];
        for name in &names {
            let tone = if accepted.contains(name) { Status::Success } else { Status::Skipped };
            lines.push(Display::new(4).plain("- ").status(*name, tone));
        }
        check.add_displays(STORAGE_CLASSES_TARGET, ALL_NAMESPACES, lines);
    }
    Ok(check.into_check())
}
