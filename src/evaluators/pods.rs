use k8s_openapi::api::core::v1::Pod;
use serde_json::json;

use crate::catalog::{PodPrefix, Service};
use crate::check::{ALL_NAMESPACES, Check, CheckManager, Evaluation};
use crate::display::Display;
use crate::error::ClusterError;
use crate::status::Status;

use super::EvalContext;

/// Map a pod phase to a status. A missing phase is a warning.
pub fn phase_status(phase: Option<&str>) -> Status {
    match phase {
        Some("Running") | Some("Succeeded") => Status::Success,
        Some("Failed") => Status::Error,
        Some("Pending") | Some("Unknown") | None => Status::Warning,
        Some(_) => Status::Warning,
    }
}

fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or("")
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

/// Pod-health check for one service, one target per runtime prefix.
pub async fn evaluate_pods(e: &EvalContext<'_>, service: Service) -> Result<Check, ClusterError> {
    let mut check = CheckManager::new(
        service.pod_check_name(),
        format!("Evaluate {} runtime pods", service.title()),
    );
    let pods = e.client.list_pods(e.ctx.namespace.as_deref(), None).await?;
    let prefixes = service.descriptor().pod_prefixes;
    record_pod_health(&mut check, e, &pods, prefixes);
    Ok(check.into_check())
}

/// Record the phase of every pod matching each prefix.
///
/// Pods are matched to the longest prefix so `aio-opc-opc-*` does not also count toward a shorter one.
pub fn record_pod_health(check: &mut CheckManager, e: &EvalContext<'_>, pods: &[Pod], prefixes: &[PodPrefix]) {
    for prefix in prefixes {
        let target = format!("pod/{}", prefix.prefix);
        let matched: Vec<&Pod> = pods
            .iter()
            .filter(|p| best_prefix(pod_name(p), prefixes) == Some(prefix.prefix))
            .collect();

        if matched.is_empty() {
            if prefix.required {
                let message = format!("{} pod not detected.", prefix.prefix);
                check.add_condition_eval(
                    &target,
                    ALL_NAMESPACES,
                    format!("len({target})>=1"),
                    Evaluation::new(Status::Warning, message.clone()).of_kind("pod"),
                );
                if e.as_list {
                    check.add_display(&target, ALL_NAMESPACES, Display::new(0).status(message, Status::Warning));
                }
            }
            continue;
        }

        for pod in matched {
            let name = pod_name(pod);
            let namespace = pod.metadata.namespace.as_deref().unwrap_or(ALL_NAMESPACES);
            let phase = pod_phase(pod);
            let status = phase_status(phase);
            check.add_condition_eval(
                &target,
                namespace,
                "status.phase",
                Evaluation::new(status, json!({"name": name, "status.phase": phase}))
                    .named(name)
                    .of_kind("pod"),
            );
            if e.as_list {
                for display in pod_displays(e, pod, status) {
                    check.add_display(&target, namespace, display);
                }
            }
        }
    }
}

fn best_prefix<'p>(name: &str, prefixes: &'p [PodPrefix]) -> Option<&'p str> {
    prefixes
        .iter()
        .filter(|p| name.starts_with(p.prefix))
        .max_by_key(|p| p.prefix.len())
        .map(|p| p.prefix)
}

fn pod_displays(e: &EvalContext<'_>, pod: &Pod, status: Status) -> Vec<Display> {
    let phase = pod_phase(pod).unwrap_or("N/A");
    let mut out = vec![
        Display::new(2)
            .plain("Pod ")
            .value(pod_name(pod))
            .plain(" in phase ")
            .status(phase, status),
    ];
    if e.detail < crate::status::DetailLevel::Detail {
        return out;
    }
    if let Some(statuses) = pod.status.as_ref().and_then(|s| s.container_statuses.as_ref()) {
        let ready = statuses.iter().filter(|c| c.ready).count();
        out.push(Display::field(6, "Containers ready", format!("{ready}/{}", statuses.len())));
        let restarts: i32 = statuses.iter().map(|c| c.restart_count).sum();
        if restarts > 0 {
            out.push(Display::field(6, "Restarts", restarts.to_string()));
        }
    }
    if e.detail.is_verbose() {
        if let Some(node) = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) {
            out.push(Display::field(6, "Node", node));
        }
        if let Some(started) = pod.status.as_ref().and_then(|s| s.start_time.as_ref()) {
            out.push(Display::field(6, "Started", started.0.to_rfc3339()));
        }
    }
    out
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_mapping() {
        assert_eq!(phase_status(Some("Running")), Status::Success);
        assert_eq!(phase_status(Some("Succeeded")), Status::Success);
        assert_eq!(phase_status(Some("Pending")), Status::Warning);
        assert_eq!(phase_status(Some("Unknown")), Status::Warning);
        assert_eq!(phase_status(None), Status::Warning);
        assert_eq!(phase_status(Some("Failed")), Status::Error);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let prefixes = Service::Opcua.descriptor().pod_prefixes;
        assert_eq!(best_prefix("aio-opc-supervisor-abc", prefixes), Some("aio-opc-supervisor"));
        assert_eq!(best_prefix("aio-opc-opc.tcp-1-xyz", prefixes), Some("aio-opc-opc"));
        assert_eq!(best_prefix("coredns-1", prefixes), None);
    }
}
