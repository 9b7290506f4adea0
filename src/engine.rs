//! Check Engine: selects checks, runs them in catalog order, assembles the report.

use std::future::Future;

use serde_json::Value;
use tracing::{info, warn};

use crate::catalog::{ResourceKind, Service};
use crate::check::{ALL_NAMESPACES, Check, CheckManager, Evaluation, Report};
use crate::cluster::ClusterClient;
use crate::config::{CheckContext, PreDeploymentConfig};
use crate::display::Display;
use crate::error::{ClusterError, ReadinessError, ReadinessFailure};
use crate::evaluators::pre_deployment::{
    CLUSTER_NODES_CHECK, K8S_TARGET, K8S_VERSION_CHECK, NODES_TARGET, STORAGE_CLASSES_CHECK,
    STORAGE_CLASSES_TARGET, evaluate_cluster_nodes, evaluate_k8s_version, evaluate_storage_classes,
};
use crate::evaluators::diagnostics::{
    BROKER_STATS_CHECK, BROKER_STATS_DESCRIPTION, BROKER_STATS_TARGET, evaluate_broker_stats,
};
use crate::evaluators::{EvalContext, evaluate_kind, pods};
use crate::status::{DetailLevel, Status};

pub const CANCELLED: &str = "cancelled";

/* ============================= REQUEST ============================= */

/// Parameters for [`CheckEngine::run`].
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub title: Option<String>,
    /// Services to run post-deployment checks for. Empty means every service.
    pub services: Vec<Service>,
    pub pre_deployment: bool,
    pub post_deployment: bool,
    pub as_list: bool,
    pub detail: DetailLevel,
    /// Case-insensitive kind filter, e.g. `["broker", "brokerlistener"]`.
    pub resource_kinds: Option<Vec<String>>,
    /// Glob over `metadata.name`.
    pub resource_name: Option<String>,
    pub excluded: Vec<ResourceKind>,
    pub pre_config: PreDeploymentConfig,
}

impl RunRequest {
    /// Which phases run. Neither flag set means both.
    pub fn phases(&self) -> (bool, bool) {
        if !self.pre_deployment && !self.post_deployment {
            (true, true)
        } else {
            (self.pre_deployment, self.post_deployment)
        }
    }

    /// Requested services in catalog order.
    pub fn selected_services(&self) -> Vec<Service> {
        Service::ALL
            .into_iter()
            .filter(|s| self.services.is_empty() || self.services.contains(s))
            .collect()
    }
}

enum Outcome<T> {
    Done(T),
    Failed(ClusterError),
    Cancelled,
}

/* ============================= ENGINE ============================= */

pub struct CheckEngine<'a> {
    client: &'a dyn ClusterClient,
    ctx: CheckContext,
}

impl<'a> CheckEngine<'a> {
    pub fn new(client: &'a dyn ClusterClient, ctx: CheckContext) -> Self {
        Self { client, ctx }
    }

    fn eval_context(&self, as_list: bool, detail: DetailLevel, resource_name: Option<&str>) -> EvalContext<'_> {
        EvalContext::new(self.client, &self.ctx)
            .with_list(as_list)
            .with_detail(detail)
            .with_names(resource_name)
    }

    /// Await `fut` unless the deadline has passed or passes first.
    async fn within<T, F>(&self, fut: F) -> Outcome<T>
    where
        F: Future<Output = Result<T, ClusterError>>,
    {
        if self.ctx.is_expired() {
            return Outcome::Cancelled;
        }
        let result = match self.ctx.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => result,
                Err(_) => return Outcome::Cancelled,
            },
            None => fut.await,
        };
        match result {
            Ok(value) => Outcome::Done(value),
            Err(err) => Outcome::Failed(err),
        }
    }

    /// Run one evaluator, converting failure and cancellation into a check.
    async fn guarded<F>(&self, name: &str, description: &str, target: &str, fut: F) -> Check
    where
        F: Future<Output = Result<Check, ClusterError>>,
    {
        match self.within(fut).await {
            Outcome::Done(check) => check,
            Outcome::Failed(err) => {
                warn!(check = name, error = %err, "evaluator_failed");
                error_check(name, description, target, &err)
            }
            Outcome::Cancelled => {
                info!(check = name, "check_cancelled");
                cancelled_check(name, description, target)
            }
        }
    }

    /* ---------------- pre-deployment ---------------- */

    pub async fn run_pre_deployment(
        &self,
        as_list: bool,
        detail: DetailLevel,
        config: &PreDeploymentConfig,
    ) -> Vec<Check> {
        info!("pre_deployment_start");
        let e = self.eval_context(as_list, detail, None);
        let mut checks = Vec::new();

        checks.push(
            self.guarded(
                K8S_VERSION_CHECK,
                "Evaluate Kubernetes server",
                K8S_TARGET,
                async { Ok(evaluate_k8s_version(&e, config).await) },
            )
            .await,
        );
        checks.push(
            self.guarded(
                CLUSTER_NODES_CHECK,
                "Evaluate cluster nodes",
                NODES_TARGET,
                evaluate_cluster_nodes(&e, config),
            )
            .await,
        );
        if !config.storage_classes.is_empty() {
            checks.push(
                self.guarded(
                    STORAGE_CLASSES_CHECK,
                    "Evaluate storage classes",
                    STORAGE_CLASSES_TARGET,
                    evaluate_storage_classes(&e, config),
                )
                .await,
            );
        }
        checks
    }

    /* ---------------- post-deployment ---------------- */

    pub async fn run_post_deployment(
        &self,
        service: Service,
        as_list: bool,
        detail: DetailLevel,
        resource_kinds: Option<&[String]>,
        resource_name: Option<&str>,
        excluded: &[ResourceKind],
    ) -> Vec<Check> {
        info!(service = %service, "post_deployment_start");
        let api = service.api();
        let api_version = api.api_version();
        let enum_name = service.enumeration_check_name();
        let enum_description = format!("Enumerate {} API resources", service.title());

        let discovered = match self
            .within(self.client.list_api_resources(api.group, api.version))
            .await
        {
            Outcome::Done(resources) => resources,
            Outcome::Failed(err) if err.is_not_found() => {
                info!(service = %service, api = %api_version, "api_not_detected");
                return vec![missing_api_check(&enum_name, &enum_description, &api_version, as_list)];
            }
            Outcome::Failed(err) => {
                warn!(service = %service, error = %err, "api_discovery_failed");
                return vec![error_check(&enum_name, &enum_description, &api_version, &err)];
            }
            Outcome::Cancelled => {
                info!(service = %service, "check_cancelled");
                let mut checks = vec![cancelled_check(&enum_name, &enum_description, &api_version)];
                for kind in selected_kinds(service, resource_kinds, excluded) {
                    checks.push(cancelled_check(&kind.check_name(), kind.description(), &kind.target()));
                }
                if resource_kinds.is_none() {
                    checks.push(cancelled_check(
                        &service.pod_check_name(),
                        &pod_check_description(service),
                        &pod_check_target(service),
                    ));
                }
                if service == Service::Diagnostics && self.ctx.broker_stats {
                    checks.push(cancelled_check(
                        BROKER_STATS_CHECK,
                        BROKER_STATS_DESCRIPTION,
                        BROKER_STATS_TARGET,
                    ));
                }
                return checks;
            }
        };

        let present: Vec<ResourceKind> = discovered
            .iter()
            .filter(|r| !r.name.contains('/'))
            .filter_map(|r| ResourceKind::from_kind_name(&r.kind))
            .filter(|k| k.service() == service)
            .collect();

        let mut checks = vec![enumeration_check(
            service,
            &enum_name,
            &enum_description,
            &present,
            as_list,
        )];

        let e = self.eval_context(as_list, detail, resource_name);
        for kind in selected_kinds(service, resource_kinds, excluded) {
            if !present.contains(&kind) {
                checks.push(absent_kind_check(kind, &api_version, as_list));
                continue;
            }
            checks.push(
                self.guarded(
                    &kind.check_name(),
                    kind.description(),
                    &kind.target(),
                    evaluate_kind(kind, &e),
                )
                .await,
            );
        }

        if resource_kinds.is_none() {
            checks.push(
                self.guarded(
                    &service.pod_check_name(),
                    &pod_check_description(service),
                    &pod_check_target(service),
                    pods::evaluate_pods(&e, service),
                )
                .await,
            );
        }

        if service == Service::Diagnostics && self.ctx.broker_stats {
            checks.push(
                self.guarded(
                    BROKER_STATS_CHECK,
                    BROKER_STATS_DESCRIPTION,
                    BROKER_STATS_TARGET,
                    evaluate_broker_stats(&e),
                )
                .await,
            );
        }
        checks
    }

    /* ---------------- run ---------------- */

    pub async fn run(&self, request: &RunRequest) -> Report {
        let (pre, post) = request.phases();
        info!(pre, post, detail = ?request.detail, "check_run_start");
        let mut report = Report {
            title: request.title.clone(),
            ..Default::default()
        };

        if pre {
            report.pre_deployment = self
                .run_pre_deployment(request.as_list, request.detail, &request.pre_config)
                .await;
        }
        if post {
            for service in request.selected_services() {
                let checks = self
                    .run_post_deployment(
                        service,
                        request.as_list,
                        request.detail,
                        request.resource_kinds.as_deref(),
                        request.resource_name.as_deref(),
                        &request.excluded,
                    )
                    .await;
                report.post_deployment.extend(checks);
            }
        }
        info!(status = %report.status(), checks = report.checks().count(), "check_run_complete");
        report
    }
}

/// Catalog kinds of `service` that pass the kind filter and exclusions, in declaration order.
fn selected_kinds(service: Service, resource_kinds: Option<&[String]>, excluded: &[ResourceKind]) -> Vec<ResourceKind> {
    service
        .kinds()
        .iter()
        .copied()
        .filter(|kind| resource_kinds.is_none_or(|filter| filter.iter().any(|f| kind.matches_filter(f))))
        .filter(|kind| !excluded.contains(kind))
        .collect()
}

fn pod_check_description(service: Service) -> String {
    format!("Evaluate {} runtime pods", service.title())
}

fn pod_check_target(service: Service) -> String {
    format!("{service}/pods")
}

/* ============================= SYNTHETIC CHECKS ============================= */

/// A check with one error evaluation carrying `err`.
pub fn error_check(name: &str, description: &str, target: &str, err: &ClusterError) -> Check {
    let mut check = CheckManager::new(name, description);
    check.add_condition_eval(
        target,
        ALL_NAMESPACES,
        "evaluated",
        Evaluation::new(Status::Error, err.to_string()),
    );
    check.into_check()
}

/// A check that did not run before the deadline.
pub fn cancelled_check(name: &str, description: &str, target: &str) -> Check {
    let mut check = CheckManager::new(name, description);
    check.add_condition_eval(
        target,
        ALL_NAMESPACES,
        "evaluated",
        Evaluation::new(Status::Skipped, CANCELLED),
    );
    check.into_check()
}

fn missing_api_check(name: &str, description: &str, api_version: &str, as_list: bool) -> Check {
    let mut check = CheckManager::new(name, description);
    let message = format!("{api_version} API resources not detected on the cluster.");
    check.add_condition_eval(
        api_version,
        ALL_NAMESPACES,
        format!("discovered({api_version})"),
        Evaluation::new(Status::Skipped, message.clone()),
    );
    if as_list {
        check.add_display(api_version, ALL_NAMESPACES, Display::new(0).status(message, Status::Skipped));
    }
    check.into_check()
}

fn enumeration_check(
    service: Service,
    name: &str,
    description: &str,
    present: &[ResourceKind],
    as_list: bool,
) -> Check {
    let mut check = CheckManager::new(name, description);
    let api_version = service.api().api_version();
    if as_list {
        check.add_display(
            &api_version,
            ALL_NAMESPACES,
            Display::new(0).plain("Enumerate ").value(api_version.as_str()).plain(" API resources"),
        );
    }
    if present.is_empty() {
        check.add_condition_eval(
            &api_version,
            ALL_NAMESPACES,
            format!("discovered({api_version})"),
            Evaluation::new(Status::Warning, "No known resource kinds are served."),
        );
    }
    for kind in service.kinds().iter().filter(|k| present.contains(k)) {
        check.add_condition_eval(
            &api_version,
            ALL_NAMESPACES,
            format!("discovered({})", kind.plural()),
            Evaluation::new(Status::Success, kind.kind_name()).of_kind(kind.as_str()),
        );
        if as_list {
            check.add_display(
                &api_version,
                ALL_NAMESPACES,
                Display::new(4).status(kind.kind_name(), Status::Success),
            );
        }
    }
    check.into_check()
}

fn absent_kind_check(kind: ResourceKind, api_version: &str, as_list: bool) -> Check {
    let mut check = CheckManager::new(kind.check_name(), kind.description());
    let target = kind.target();
    let message = format!("{} is not served by {api_version}.", kind.kind_name());
    check.add_condition_eval(
        &target,
        ALL_NAMESPACES,
        format!("discovered({})", kind.plural()),
        Evaluation::new(Status::Skipped, message.clone()).of_kind(kind.as_str()),
    );
    if as_list {
        check.add_display(&target, ALL_NAMESPACES, Display::new(0).status(message, Status::Skipped));
    }
    check.into_check()
}

/* ============================= READINESS ============================= */

/// Fail when any evaluation is an error, or a warning under `strict`.
pub fn validate_readiness(checks: &[Check], strict: bool) -> Result<(), ReadinessError> {
    let mut failures = Vec::new();
    for check in checks {
        for (target, namespace, entry) in check.entries() {
            for (condition, evaluation) in entry.pairs() {
                if evaluation.status.is_failure(strict) {
                    failures.push(ReadinessFailure {
                        target: target.to_string(),
                        namespace: namespace.to_string(),
                        condition: condition.to_string(),
                        status: evaluation.status,
                        value: value_text(&evaluation.value),
                    });
                }
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ReadinessError { failures })
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "N/A".to_string(),
        other => other.to_string(),
    }
}

/* ============================= TESTS ============================= */
