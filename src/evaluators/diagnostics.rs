use serde_json::{Value, json};
use tracing::warn;

use crate::catalog::{DIAGNOSTICS_SERVICE_POD_PREFIX, ResourceKind};
use crate::check::{ALL_NAMESPACES, Check, CheckManager, Evaluation};
use crate::display::Display;
use crate::error::ClusterError;
use crate::projection::PropertySpec;
use crate::resource::Resource;
use crate::stats::fetch_stats;
use crate::status::Status;

use super::EvalContext;
use super::common::{Cardinality, KindRun, SpecProbe};

pub const BROKER_STATS_CHECK: &str = "evalBrokerStats";
pub const BROKER_STATS_TARGET: &str = "broker/stats";
pub const BROKER_STATS_DESCRIPTION: &str = "Evaluate MQTT broker statistics";

const DIAGNOSTIC_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.logLevel", "Log Level"),
    PropertySpec::new("spec.metricsPort", "Metrics Port"),
    PropertySpec::new("spec.dataExportFrequencySeconds", "Data Export Frequency (s)"),
    PropertySpec::verbose("spec.image", "Image"),
    PropertySpec::verbose("spec.logFormat", "Log Format"),
    PropertySpec::verbose("spec.maxDataStorageSize", "Max Data Storage Size"),
    PropertySpec::verbose("spec.staleDataTimeoutSeconds", "Stale Data Timeout (s)"),
];

pub async fn evaluate_diagnostic_services(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::DiagnosticService, e);
    let Some(groups) = run.collect(e, Cardinality::ExactlyOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            let mut probe = SpecProbe::new(&r);
            probe.optional_range("spec.metricsPort", 1, 65535);
            probe.optional_min("spec.dataExportFrequencySeconds", 1);
            probe.optional_str("spec.logLevel");
            run.probe(ns, "spec", &r, probe);

            run.status(e, ns, &r);
            run.project(e, ns, &r, DIAGNOSTIC_PROPERTIES);
        }
    }
    Ok(run.finish())
}

/* ============================= BROKER STATS ============================= */

/// Metrics shown when present, in order.
const REPORTED_METRICS: &[&str] = &[
    "aio_mq_publishes_received",
    "aio_mq_publishes_sent",
    "aio_mq_connected_sessions",
    "aio_mq_total_subscriptions",
    "aio_mq_store_retained_messages",
    "aio_mq_payload_check_total_messages_received",
    "aio_mq_payload_check_latency_last_value",
];

pub async fn evaluate_broker_stats(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut check = CheckManager::new(BROKER_STATS_CHECK, BROKER_STATS_DESCRIPTION);
    let pods = e.client.list_pods(e.ctx.namespace.as_deref(), None).await?;
    let running = pods.iter().find(|p| {
        p.metadata
            .name
            .as_deref()
            .is_some_and(|n| n.starts_with(DIAGNOSTICS_SERVICE_POD_PREFIX))
            && p.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
    });

    let condition = format!("reachable({DIAGNOSTICS_SERVICE_POD_PREFIX}:{})", e.ctx.broker_stats_port);
    let Some(pod) = running else {
        let message = format!("No running {DIAGNOSTICS_SERVICE_POD_PREFIX} pod detected.");
        record(&mut check, e, ALL_NAMESPACES, condition, Status::Warning, json!(message));
        return Ok(check.into_check());
    };
    let pod_name = pod.metadata.name.as_deref().unwrap_or("");
    let namespace = pod.metadata.namespace.as_deref().unwrap_or(ALL_NAMESPACES);

    let scrape = fetch_stats(e.client, namespace, pod_name, e.ctx.broker_stats_port);
    let outcome = match tokio::time::timeout(e.ctx.api_timeout, scrape).await {
        Ok(result) => result,
        Err(_) => Err(ClusterError::Timeout {
            operation: format!("scrape {pod_name}:{}", e.ctx.broker_stats_port),
            after: e.ctx.api_timeout,
        }),
    };
    let stats = match outcome {
        Ok(stats) => stats,
        Err(err) => {
            warn!(error = %err, pod = pod_name, "broker_stats_unavailable");
            let message = format!("Unable to fetch broker statistics: {err}");
            record(&mut check, e, namespace, condition, Status::Warning, json!(message));
            return Ok(check.into_check());
        }
    };
    record(&mut check, e, namespace, condition, Status::Success, json!(pod_name));

    for metric in REPORTED_METRICS {
        if let Some(v) = stats.get(metric) {
            record(&mut check, e, namespace, metric.to_string(), Status::Success, json!(v));
        }
    }

    for threshold in stats.thresholds() {
        let status = if threshold.met { Status::Success } else { Status::Warning };
        record(&mut check, e, namespace, threshold.condition, status, json!(threshold.value));
    }
    Ok(check.into_check())
}

fn record(
    check: &mut CheckManager,
    e: &EvalContext<'_>,
    namespace: &str,
    condition: String,
    status: Status,
    value: Value,
) {
    if e.as_list {
        let text = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        check.add_display(
            BROKER_STATS_TARGET,
            namespace,
            Display::new(2).label(condition.clone()).plain(": ").status(text, status),
        );
    }
    check.add_condition_eval(BROKER_STATS_TARGET, namespace, condition, Evaluation::new(status, value));
}
