use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, Node, NodeStatus, NodeSystemInfo, Pod, PodSpec, PodStatus,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, ObjectMeta};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use edge_diag::ClusterClient;
use edge_diag::catalog::{ResourceKind, Service};
use edge_diag::cluster::{PortStream, WorkloadKind};
use edge_diag::error::ClusterError;
use edge_diag::quantity::Version;

/// In-memory [`ClusterClient`] for tests. Every API read is recorded in `calls`.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeCluster {
    pub version: Option<Version>,
    pub unreachable: bool,
    pub nodes: Vec<Node>,
    pub storage_classes: Vec<StorageClass>,
    /// `group/version` -> served resources.
    pub apis: HashMap<String, Vec<APIResource>>,
    /// `(group, plural)` -> objects.
    pub objects: HashMap<(String, String), Vec<Value>>,
    pub pods: Vec<Pod>,
    pub logs: HashMap<(String, String), String>,
    pub failing_logs: HashSet<String>,
    pub metrics: HashMap<(String, String), Value>,
    pub workloads: HashMap<(WorkloadKind, String), Vec<Value>>,
    pub stats_response: Option<String>,
    /// Accept the metrics request but never answer it.
    pub stats_stall: bool,
    /// Added to every custom-object list.
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeCluster {
    pub fn new() -> Self {
        Self {
            version: Some("1.27".parse().unwrap()),
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.parse().unwrap());
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_storage_class(mut self, name: &str) -> Self {
        self.storage_classes.push(StorageClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            provisioner: "test".to_string(),
            ..Default::default()
        });
        self
    }

    /// Serve `kinds` under the service API group.
    pub fn with_api(mut self, service: Service, kinds: &[ResourceKind]) -> Self {
        let api = service.api();
        let resources = kinds
            .iter()
            .flat_map(|k| {
                [
                    api_resource(&k.plural(), k.kind_name()),
                    api_resource(&format!("{}/status", k.plural()), k.kind_name()),
                ]
            })
            .collect();
        self.apis.insert(api.api_version(), resources);
        self
    }

    /// Serve every kind of `service`.
    pub fn with_full_api(self, service: Service) -> Self {
        self.with_api(service, service.kinds())
    }

    pub fn with_object(mut self, kind: ResourceKind, object: Value) -> Self {
        self.objects
            .entry((kind.api().group.to_string(), kind.plural()))
            .or_default()
            .push(object);
        self
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_log(mut self, pod: &str, container: &str, text: &str) -> Self {
        self.logs
            .insert((pod.to_string(), container.to_string()), text.to_string());
        self
    }

    pub fn with_failing_log(mut self, pod: &str) -> Self {
        self.failing_logs.insert(pod.to_string());
        self
    }

    pub fn with_metric(mut self, namespace: &str, pod: &str, metric: Value) -> Self {
        self.metrics
            .insert((namespace.to_string(), pod.to_string()), metric);
        self
    }

    pub fn with_workloads(mut self, kind: WorkloadKind, namespace: &str, items: Vec<Value>) -> Self {
        self.workloads.insert((kind, namespace.to_string()), items);
        self
    }

    pub fn with_stats_response(mut self, response: &str) -> Self {
        self.stats_response = Some(response.to_string());
        self
    }

    pub fn with_stalled_stats(mut self) -> Self {
        self.stats_response = Some(String::new());
        self.stats_stall = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), ClusterError> {
        self.calls.lock().unwrap().push(call);
        if self.unreachable {
            return Err(ClusterError::Connectivity("connection refused".to_string()));
        }
        Ok(())
    }

    fn group_objects(&self, group: &str, plural: &str) -> Vec<Value> {
        self.objects
            .get(&(group.to_string(), plural.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn api_resource(name: &str, kind: &str) -> APIResource {
    APIResource {
        name: name.to_string(),
        kind: kind.to_string(),
        namespaced: true,
        singular_name: String::new(),
        verbs: vec!["get".to_string(), "list".to_string()],
        ..Default::default()
    }
}

fn in_namespace(object: &Value, namespace: &str) -> bool {
    object.pointer("/metadata/namespace").and_then(Value::as_str) == Some(namespace)
}

/// Equality-only label selector, e.g. `a=b,c=d`.
fn selector_matches(pod: &Pod, selector: &str) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        term.split_once('=')
            .is_some_and(|(k, v)| labels.get(k.trim()).map(String::as_str) == Some(v.trim()))
    })
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn server_version(&self) -> Result<Version, ClusterError> {
        self.record("server_version".to_string())?;
        self.version
            .clone()
            .ok_or_else(|| ClusterError::Api {
                code: 500,
                message: "version unavailable".to_string(),
            })
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        self.record("list_nodes".to_string())?;
        Ok(self.nodes.clone())
    }

    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>, ClusterError> {
        self.record("list_storage_classes".to_string())?;
        Ok(self.storage_classes.clone())
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        self.record(format!("list_pods:{}", namespace.unwrap_or("*")))?;
        Ok(self
            .pods
            .iter()
            .filter(|p| namespace.is_none() || p.metadata.namespace.as_deref() == namespace)
            .filter(|p| label_selector.is_none_or(|s| selector_matches(p, s)))
            .cloned()
            .collect())
    }

    async fn read_pod_log(
        &self,
        _namespace: &str,
        pod: &str,
        container: &str,
        _since_seconds: i64,
    ) -> Result<String, ClusterError> {
        self.record(format!("read_pod_log:{pod}/{container}"))?;
        if self.failing_logs.contains(pod) {
            return Err(ClusterError::Api {
                code: 500,
                message: format!("log stream for {pod} failed"),
            });
        }
        Ok(self
            .logs
            .get(&(pod.to_string(), container.to_string()))
            .cloned()
            .unwrap_or_else(|| format!("log line from {pod}/{container}\n")))
    }

    async fn list_namespaced(&self, kind: WorkloadKind, namespace: &str) -> Result<Vec<Value>, ClusterError> {
        self.record(format!("list_namespaced:{kind}:{namespace}"))?;
        Ok(self
            .workloads
            .get(&(kind, namespace.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_api_resources(&self, group: &str, version: &str) -> Result<Vec<APIResource>, ClusterError> {
        let api_version = format!("{group}/{version}");
        self.record(format!("list_api_resources:{api_version}"))?;
        self.apis
            .get(&api_version)
            .cloned()
            .ok_or_else(|| ClusterError::not_found("apigroup", api_version))
    }

    async fn list_cluster_custom_objects(
        &self,
        group: &str,
        _version: &str,
        plural: &str,
    ) -> Result<Vec<Value>, ClusterError> {
        self.record(format!("list_cluster_custom_objects:{plural}"))?;
        self.pause().await;
        Ok(self.group_objects(group, plural))
    }

    async fn list_namespaced_custom_objects(
        &self,
        group: &str,
        _version: &str,
        namespace: &str,
        plural: &str,
    ) -> Result<Vec<Value>, ClusterError> {
        self.record(format!("list_namespaced_custom_objects:{namespace}:{plural}"))?;
        self.pause().await;
        Ok(self
            .group_objects(group, plural)
            .into_iter()
            .filter(|o| in_namespace(o, namespace))
            .collect())
    }

    async fn get_namespaced_custom_object(
        &self,
        group: &str,
        _version: &str,
        namespace: &str,
        plural: &str,
        name: &str,
    ) -> Result<Value, ClusterError> {
        self.record(format!("get_namespaced_custom_object:{plural}:{namespace}/{name}"))?;
        if group == edge_diag::bundle::METRICS_GROUP {
            return self
                .metrics
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| ClusterError::not_found("podmetrics", name));
        }
        self.group_objects(group, plural)
            .into_iter()
            .find(|o| in_namespace(o, namespace) && o.pointer("/metadata/name").and_then(Value::as_str) == Some(name))
            .ok_or_else(|| ClusterError::not_found(plural, name))
    }

    async fn port_forward(&self, _namespace: &str, pod: &str, port: u16) -> Result<Box<dyn PortStream>, ClusterError> {
        self.record(format!("port_forward:{pod}:{port}"))?;
        let Some(response) = self.stats_response.clone() else {
            return Err(ClusterError::Connectivity(format!("cannot forward to {pod}:{port}")));
        };
        let stall = self.stats_stall;
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match server.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            if stall {
                std::future::pending::<()>().await;
            }
            let _ = server.write_all(response.as_bytes()).await;
            let _ = server.shutdown().await;
        });
        Ok(Box::new(client))
    }
}

/* ============================= FIXTURES ============================= */

#[allow(dead_code)]
pub fn make_node(name: &str, arch: &str, cpu: &str, memory: &str) -> Node {
    let allocatable = BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ]);
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            allocatable: Some(allocatable),
            node_info: Some(NodeSystemInfo {
                architecture: arch.to_string(),
                kernel_version: "5.15.0-1051-azure".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn make_pod(name: &str, namespace: &str, phase: &str, part_of: &str, containers: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                "app.kubernetes.io/part-of".to_string(),
                part_of.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: containers
                .iter()
                .map(|c| Container {
                    name: c.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}

/// Broker pod labeled the way the broker operator labels them.
#[allow(dead_code)]
pub fn make_broker_pod(name: &str, namespace: &str, phase: &str) -> Pod {
    make_pod(name, namespace, phase, "az-edge-broker", &["main"])
}

#[allow(dead_code)]
pub fn make_cr(kind: ResourceKind, name: &str, namespace: &str, spec: Value) -> Value {
    json!({
        "apiVersion": kind.api().api_version(),
        "kind": kind.kind_name(),
        "metadata": {"name": name, "namespace": namespace},
        "spec": spec,
    })
}

#[allow(dead_code)]
pub fn with_status(mut object: Value, status: Value) -> Value {
    object["status"] = status;
    object
}
