//! Support Bundle Builder: concurrent best-effort collection into a zip archive.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use k8s_openapi::api::core::v1::Pod;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::archive::write_zip_atomically;
use crate::catalog::{ResourceKind, Service};
use crate::check::ALL_NAMESPACES;
use crate::cluster::{ClusterClient, WorkloadKind};
use crate::error::{BundleError, ClusterError};
use crate::resource::Resource;

pub const METRICS_GROUP: &str = "metrics.k8s.io";
pub const METRICS_VERSION: &str = "v1beta1";
const MIN_WORKERS: usize = 4;

/* ============================= TYPES ============================= */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSelection {
    /// Every service whose API group is served by the cluster.
    Auto,
    Services(Vec<Service>),
}

#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub services: ServiceSelection,
    /// Log window in seconds. Zero skips log collection.
    pub log_age_seconds: i64,
    pub bundle_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundleResult {
    pub bundle_path: PathBuf,
    pub services: Vec<Service>,
    /// Tolerated collection failures.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Yaml(Value),
    Json(Value),
    Text(String),
}

impl Payload {
    fn is_empty(&self) -> bool {
        match self {
            Payload::Yaml(v) | Payload::Json(v) => match v {
                Value::Null => true,
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                Value::String(s) => s.is_empty(),
                _ => false,
            },
            Payload::Text(s) => s.is_empty(),
        }
    }

    /// Serialized bytes, or `None` when the payload is empty.
    pub fn to_bytes(&self) -> Result<Option<Vec<u8>>, BundleError> {
        if self.is_empty() {
            return Ok(None);
        }
        let bytes = match self {
            Payload::Yaml(v) => serde_yaml::to_string(v)?.into_bytes(),
            Payload::Json(v) => serde_json::to_vec_pretty(v)?,
            Payload::Text(s) => s.clone().into_bytes(),
        };
        Ok(Some(bytes))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundleSlot {
    pub archive_path: String,
    pub payload: Payload,
}

/// One unit of collection work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    CustomResources { kind: ResourceKind },
    Pods { service: Service },
    Nodes,
    PodLog { namespace: String, pod: String, container: String },
    PodMetric { namespace: String, pod: String },
    Workloads { namespace: String, kind: WorkloadKind },
}

#[derive(Debug, Default)]
struct TaskOutput {
    slots: Vec<BundleSlot>,
    pods: Vec<Pod>,
}

impl Task {
    pub fn describe(&self) -> String {
        match self {
            Task::CustomResources { kind } => format!("custom resources {}", kind.plural()),
            Task::Pods { service } => format!("pods for {service}"),
            Task::Nodes => "nodes".to_string(),
            Task::PodLog { namespace, pod, container } => {
                format!("log of pod {namespace}/{pod} container {container}")
            }
            Task::PodMetric { namespace, pod } => format!("metrics of pod {namespace}/{pod}"),
            Task::Workloads { namespace, kind } => format!("{kind}s in namespace {namespace}"),
        }
    }

    async fn collect(&self, client: &dyn ClusterClient, log_age_seconds: i64) -> Result<TaskOutput, ClusterError> {
        let mut out = TaskOutput::default();
        match self {
            Task::CustomResources { kind } => {
                let api = kind.api();
                let items = client
                    .list_cluster_custom_objects(api.group, api.version, &kind.plural())
                    .await?;
                for item in items {
                    let r = Resource::new(&item);
                    let path = format!("{}/{}.{}.yaml", r.namespace(), kind.singular(), r.name());
                    out.slots.push(BundleSlot {
                        archive_path: path,
                        payload: Payload::Yaml(item.clone()),
                    });
                }
            }
            Task::Pods { service } => {
                let selector = service.descriptor().pod_label_selector;
                let pods = client.list_pods(None, Some(selector)).await?;
                for pod in &pods {
                    let namespace = pod.metadata.namespace.as_deref().unwrap_or(ALL_NAMESPACES);
                    let name = pod.metadata.name.as_deref().unwrap_or("");
                    out.slots.push(BundleSlot {
                        archive_path: format!("{namespace}/pod.{name}.yaml"),
                        payload: Payload::Yaml(serde_json::to_value(pod)?),
                    });
                }
                out.pods = pods;
            }
            Task::Nodes => {
                let nodes = client.list_nodes().await?;
                out.slots.push(BundleSlot {
                    archive_path: "nodes.yaml".to_string(),
                    payload: Payload::Yaml(serde_json::to_value(nodes)?),
                });
            }
            Task::PodLog { namespace, pod, container } => {
                let log = client
                    .read_pod_log(namespace, pod, container, log_age_seconds)
                    .await?;
                out.slots.push(BundleSlot {
                    archive_path: format!("{namespace}/pod.{pod}.{container}.log"),
                    payload: Payload::Text(log),
                });
            }
            Task::PodMetric { namespace, pod } => {
                match client
                    .get_namespaced_custom_object(METRICS_GROUP, METRICS_VERSION, namespace, "pods", pod)
                    .await
                {
                    Ok(metric) => out.slots.push(BundleSlot {
                        archive_path: format!("{namespace}/pod.{pod}.metric.yaml"),
                        payload: Payload::Yaml(metric),
                    }),
                    // No metrics server, or the pod has no sample yet.
                    Err(err) if err.is_not_found() => debug!(pod = %pod, "pod_metric_not_found"),
                    Err(err) => return Err(err),
                }
            }
            Task::Workloads { namespace, kind } => {
                let items = client.list_namespaced(*kind, namespace).await?;
                out.slots.push(BundleSlot {
                    archive_path: format!("{namespace}/{kind}s.json"),
                    payload: Payload::Json(Value::Array(items)),
                });
            }
        }
        Ok(out)
    }
}

/* ============================= PLANNING ============================= */

/// Tasks that need no prior results.
pub fn plan_initial(services: &[Service], kinds: &[ResourceKind]) -> Vec<Task> {
    let mut tasks = Vec::new();
    for service in services {
        for kind in service.kinds().iter().filter(|k| kinds.contains(k)) {
            tasks.push(Task::CustomResources { kind: *kind });
        }
        tasks.push(Task::Pods { service: *service });
    }
    tasks.push(Task::Nodes);
    tasks
}

/// Logs, metrics and namespace listings derived from the collected pods.
pub fn plan_followup(pods: &[Pod], log_age_seconds: i64) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut seen_pods = HashSet::new();
    let mut namespaces: Vec<String> = Vec::new();

    for pod in pods {
        let (Some(namespace), Some(name)) = (pod.metadata.namespace.as_deref(), pod.metadata.name.as_deref())
        else {
            continue;
        };
        if !seen_pods.insert((namespace.to_string(), name.to_string())) {
            continue;
        }
        if !namespaces.iter().any(|n| n == namespace) {
            namespaces.push(namespace.to_string());
        }
        if log_age_seconds > 0 {
            let spec = pod.spec.as_ref();
            let containers = spec
                .and_then(|s| s.init_containers.as_ref())
                .into_iter()
                .flatten()
                .chain(spec.map(|s| s.containers.iter()).into_iter().flatten());
            for container in containers {
                tasks.push(Task::PodLog {
                    namespace: namespace.to_string(),
                    pod: name.to_string(),
                    container: container.name.clone(),
                });
            }
        }
        tasks.push(Task::PodMetric {
            namespace: namespace.to_string(),
            pod: name.to_string(),
        });
    }

    for namespace in namespaces {
        for kind in WorkloadKind::ALL {
            tasks.push(Task::Workloads {
                namespace: namespace.clone(),
                kind,
            });
        }
    }
    tasks
}

/* ============================= BUILDER ============================= */

pub struct BundleBuilder {
    client: Arc<dyn ClusterClient>,
    cancel: CancellationToken,
    workers: usize,
    show_progress: bool,
}

impl BundleBuilder {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            client,
            cancel: CancellationToken::new(),
            workers: cpus.max(MIN_WORKERS),
            show_progress: false,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn build(&self, request: &BundleRequest) -> Result<BundleResult, BundleError> {
        if !request.bundle_dir.is_dir() {
            return Err(BundleError::InvalidDirectory(request.bundle_dir.clone()));
        }
        self.client
            .server_version()
            .await
            .map_err(BundleError::Connectivity)?;

        let mut warnings = Vec::new();
        let (services, kinds) = self.resolve_services(&request.services, &mut warnings).await?;
        info!(services = ?services, log_age = request.log_age_seconds, "support_bundle_start");

        let progress = self.progress_bar();
        let mut slots: IndexMap<String, Payload> = IndexMap::new();

        let initial = plan_initial(&services, &kinds);
        progress.set_length(initial.len() as u64);
        let (pods, skipped) = self
            .run_phase(initial, request.log_age_seconds, &progress, &mut slots, &mut warnings)
            .await;

        let mut skipped_total = skipped;
        if !self.cancel.is_cancelled() {
            let followup = plan_followup(&pods, request.log_age_seconds);
            progress.inc_length(followup.len() as u64);
            let (_, skipped) = self
                .run_phase(followup, request.log_age_seconds, &progress, &mut slots, &mut warnings)
                .await;
            skipped_total += skipped;
        }
        if self.cancel.is_cancelled() {
            warnings.push(format!("Collection cancelled; {skipped_total} task(s) not started."));
        }
        progress.finish_and_clear();

        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
        for (path, payload) in &slots {
            if let Some(bytes) = payload.to_bytes()? {
                entries.push((path.clone(), bytes));
            }
        }
        let file_name = format!("support_bundle_{}.zip", Utc::now().format("%Y%m%dT%H%M%SZ"));
        let bundle_path = write_zip_atomically(
            &request.bundle_dir,
            &file_name,
            entries.iter().map(|(p, b)| (p.as_str(), b.as_slice())),
        )?;
        info!(path = %bundle_path.display(), entries = entries.len(), warnings = warnings.len(), "support_bundle_written");

        Ok(BundleResult {
            bundle_path,
            services,
            warnings,
        })
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("{spinner} Collecting [{bar:40}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    }

    /// Pick services and the kinds each one serves.
    async fn resolve_services(
        &self,
        selection: &ServiceSelection,
        warnings: &mut Vec<String>,
    ) -> Result<(Vec<Service>, Vec<ResourceKind>), BundleError> {
        let candidates: Vec<Service> = match selection {
            ServiceSelection::Auto => Service::ALL.to_vec(),
            ServiceSelection::Services(list) => Service::ALL
                .into_iter()
                .filter(|s| list.contains(s))
                .collect(),
        };

        let mut services = Vec::new();
        let mut kinds = Vec::new();
        for service in candidates {
            let api = service.api();
            match self.client.list_api_resources(api.group, api.version).await {
                Ok(resources) => {
                    kinds.extend(
                        resources
                            .iter()
                            .filter(|r| !r.name.contains('/'))
                            .filter_map(|r| ResourceKind::from_kind_name(&r.kind))
                            .filter(|k| k.service() == service),
                    );
                    services.push(service);
                }
                Err(err) if err.is_connectivity() => return Err(BundleError::Connectivity(err)),
                Err(err) => {
                    debug!(service = %service, error = %err, "service_api_not_detected");
                    if *selection != ServiceSelection::Auto {
                        warnings.push(format!("{} API not detected: {err}", api.api_version()));
                        services.push(service);
                    }
                }
            }
        }
        if services.is_empty() {
            return Err(BundleError::NoServices);
        }
        Ok((services, kinds))
    }

    /// Run `tasks` on the worker pool and fold results into `slots` in plan order.
    ///
    /// Returns the pods collected in this phase and the number of tasks never started.
    async fn run_phase(
        &self,
        tasks: Vec<Task>,
        log_age_seconds: i64,
        progress: &ProgressBar,
        slots: &mut IndexMap<String, Payload>,
        warnings: &mut Vec<String>,
    ) -> (Vec<Pod>, usize) {
        let total = tasks.len();
        if total == 0 {
            return (Vec::new(), 0);
        }
        let queue: Arc<Mutex<VecDeque<(usize, Task)>>> =
            Arc::new(Mutex::new(tasks.into_iter().enumerate().collect()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handles = Vec::new();
        for _ in 0..self.workers.min(total) {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let client = Arc::clone(&self.client);
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = queue.lock().await.pop_front();
                    let Some((index, task)) = next else {
                        break;
                    };
                    let result = task.collect(client.as_ref(), log_age_seconds).await;
                    if tx.send((index, task, result)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut results: Vec<Option<(Task, Result<TaskOutput, ClusterError>)>> =
            (0..total).map(|_| None).collect();
        let mut completed = 0;
        while let Some((index, task, result)) = rx.recv().await {
            progress.inc(1);
            completed += 1;
            results[index] = Some((task, result));
        }
        for joined in join_all(handles).await {
            if let Err(err) = joined {
                debug!(error = %err, "bundle_worker_join_failed");
            }
        }

        let mut pods = Vec::new();
        for (task, result) in results.into_iter().flatten() {
            match result {
                Ok(output) => {
                    for slot in output.slots {
                        slots.entry(slot.archive_path).or_insert(slot.payload);
                    }
                    pods.extend(output.pods);
                }
                Err(err) => {
                    let what = task.describe();
                    debug!(task = %what, error = %err, "bundle_task_failed");
                    warnings.push(format!("Failed to collect {what}: {err}"));
                }
            }
        }
        (pods, total - completed)
    }
}

/* ============================= TESTS ============================= */
