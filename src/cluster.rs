//! Cluster capability contract and its kube-rs implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Event, Node, Pod, Service};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;
use kube::api::{Api, DynamicObject, ListParams, LogParams};
use kube::config::KubeConfigOptions;
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::debug;

use crate::error::ClusterError;
use crate::quantity::Version;

/* ============================= TYPES ============================= */

/// Namespaced core/apps kinds the support bundle lists by namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    ReplicaSet,
    StatefulSet,
    Service,
    Event,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 6] = [
        WorkloadKind::Deployment,
        WorkloadKind::DaemonSet,
        WorkloadKind::ReplicaSet,
        WorkloadKind::StatefulSet,
        WorkloadKind::Service,
        WorkloadKind::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::DaemonSet => "daemonset",
            WorkloadKind::ReplicaSet => "replicaset",
            WorkloadKind::StatefulSet => "statefulset",
            WorkloadKind::Service => "service",
            WorkloadKind::Event => "event",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bidirectional byte stream to a pod port.
pub trait PortStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> PortStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/* ============================= CONTRACT ============================= */

/// Narrow set of cluster reads used by the checks and the support bundle.
///
/// Implementations must be safe to share between bundle workers.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn server_version(&self) -> Result<Version, ClusterError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError>;

    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>, ClusterError>;

    /// Pods in one namespace, or in all namespaces when `namespace` is `None`.
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError>;

    async fn read_pod_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        since_seconds: i64,
    ) -> Result<String, ClusterError>;

    async fn list_namespaced(
        &self,
        kind: WorkloadKind,
        namespace: &str,
    ) -> Result<Vec<Value>, ClusterError>;

    /// Resources served by `group/version`. A group the cluster does not serve is `NotFound`.
    async fn list_api_resources(
        &self,
        group: &str,
        version: &str,
    ) -> Result<Vec<APIResource>, ClusterError>;

    async fn list_cluster_custom_objects(
        &self,
        group: &str,
        version: &str,
        plural: &str,
    ) -> Result<Vec<Value>, ClusterError>;

    async fn list_namespaced_custom_objects(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
    ) -> Result<Vec<Value>, ClusterError>;

    async fn get_namespaced_custom_object(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        name: &str,
    ) -> Result<Value, ClusterError>;

    async fn port_forward(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<Box<dyn PortStream>, ClusterError>;
}

/* ============================= KUBE IMPLEMENTATION ============================= */

/// [`ClusterClient`] backed by a kube-rs client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    timeout: Duration,
}

impl KubeCluster {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Build a client from kubeconfig, optionally selecting a context.
    pub async fn connect(context: Option<&str>, timeout: Duration) -> Result<Self, ClusterError> {
        let options = KubeConfigOptions {
            context: context.map(String::from),
            ..Default::default()
        };
        let config = match Config::from_kubeconfig(&options).await {
            Ok(c) => c,
            Err(kubeconfig_err) => Config::incluster().map_err(|_| {
                ClusterError::Connectivity(format!("Failed to load kubeconfig: {kubeconfig_err}"))
            })?,
        };
        let client = Client::try_from(config)
            .map_err(|e| ClusterError::Connectivity(format!("Failed to build client: {e}")))?;
        Ok(Self::new(client, timeout))
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(ClusterError::from),
            Err(_) => Err(ClusterError::Timeout {
                operation: operation.to_string(),
                after: self.timeout,
            }),
        }
    }

    fn dynamic_resource(group: &str, version: &str, plural: &str) -> ApiResource {
        ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            api_version: format!("{group}/{version}"),
            kind: plural.to_string(),
            plural: plural.to_string(),
        }
    }

    async fn list_as_values<K>(&self, api: Api<K>, operation: &str) -> Result<Vec<Value>, ClusterError>
    where
        K: Clone + fmt::Debug + serde::de::DeserializeOwned + Serialize,
    {
        let list = self.bounded(operation, api.list(&ListParams::default())).await?;
        list.items
            .into_iter()
            .map(|item| serde_json::to_value(item).map_err(ClusterError::from))
            .collect()
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn server_version(&self) -> Result<Version, ClusterError> {
        let info = self
            .bounded("get server version", self.client.apiserver_version())
            .await?;
        Version::from_major_minor(&info.major, &info.minor).ok_or_else(|| {
            ClusterError::Decode(format!("unexpected server version {}.{}", info.major, info.minor))
        })
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(self
            .bounded("list nodes", api.list(&ListParams::default()))
            .await?
            .items)
    }

    async fn list_storage_classes(&self) -> Result<Vec<StorageClass>, ClusterError> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        Ok(self
            .bounded("list storage classes", api.list(&ListParams::default()))
            .await?
            .items)
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        Ok(self.bounded("list pods", api.list(&params)).await?.items)
    }

    async fn read_pod_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        since_seconds: i64,
    ) -> Result<String, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            since_seconds: Some(since_seconds),
            ..Default::default()
        };
        self.bounded("read pod log", api.logs(pod, &params)).await
    }

    async fn list_namespaced(
        &self,
        kind: WorkloadKind,
        namespace: &str,
    ) -> Result<Vec<Value>, ClusterError> {
        let client = self.client.clone();
        let operation = format!("list {kind}s");
        match kind {
            WorkloadKind::Deployment => {
                self.list_as_values(Api::<Deployment>::namespaced(client, namespace), &operation)
                    .await
            }
            WorkloadKind::DaemonSet => {
                self.list_as_values(Api::<DaemonSet>::namespaced(client, namespace), &operation)
                    .await
            }
            WorkloadKind::ReplicaSet => {
                self.list_as_values(Api::<ReplicaSet>::namespaced(client, namespace), &operation)
                    .await
            }
            WorkloadKind::StatefulSet => {
                self.list_as_values(Api::<StatefulSet>::namespaced(client, namespace), &operation)
                    .await
            }
            WorkloadKind::Service => {
                self.list_as_values(Api::<Service>::namespaced(client, namespace), &operation)
                    .await
            }
            WorkloadKind::Event => {
                self.list_as_values(Api::<Event>::namespaced(client, namespace), &operation)
                    .await
            }
        }
    }

    async fn list_api_resources(
        &self,
        group: &str,
        version: &str,
    ) -> Result<Vec<APIResource>, ClusterError> {
        let api_version = format!("{group}/{version}");
        debug!(api = %api_version, "list_api_resources");
        let list = self
            .bounded(
                "list api resources",
                self.client.list_api_group_resources(&api_version),
            )
            .await
            .map_err(|e| match e {
                ClusterError::NotFound { .. } => ClusterError::not_found("api", api_version.clone()),
                other => other,
            })?;
        Ok(list.resources)
    }

    async fn list_cluster_custom_objects(
        &self,
        group: &str,
        version: &str,
        plural: &str,
    ) -> Result<Vec<Value>, ClusterError> {
        let ar = Self::dynamic_resource(group, version, plural);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        self.list_as_values(api, &format!("list {plural}")).await
    }

    async fn list_namespaced_custom_objects(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
    ) -> Result<Vec<Value>, ClusterError> {
        let ar = Self::dynamic_resource(group, version, plural);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        self.list_as_values(api, &format!("list {plural}")).await
    }

    async fn get_namespaced_custom_object(
        &self,
        group: &str,
        version: &str,
        namespace: &str,
        plural: &str,
        name: &str,
    ) -> Result<Value, ClusterError> {
        let ar = Self::dynamic_resource(group, version, plural);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        let object = self
            .bounded(&format!("get {plural}/{name}"), api.get(name))
            .await
            .map_err(|e| match e {
                ClusterError::NotFound { .. } => ClusterError::not_found(plural, name),
                other => other,
            })?;
        Ok(serde_json::to_value(object)?)
    }

    async fn port_forward(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<Box<dyn PortStream>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut forwarder = self
            .bounded("port-forward", api.portforward(pod, &[port]))
            .await?;
        let stream = forwarder.take_stream(port).ok_or_else(|| {
            ClusterError::Connectivity(format!("no stream for port {port} on pod {pod}"))
        })?;
        Ok(Box::new(ForwardedStream {
            stream,
            _forwarder: forwarder,
        }))
    }
}

/// Keeps the forwarder alive for as long as the stream is in use.
struct ForwardedStream<S> {
    stream: S,
    _forwarder: kube::api::Portforwarder,
}

impl<S: AsyncRead + Unpin> AsyncRead for ForwardedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ForwardedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_kind_names() {
        let names: Vec<&str> = WorkloadKind::ALL.iter().map(WorkloadKind::as_str).collect();
        assert_eq!(
            names,
            vec!["deployment", "daemonset", "replicaset", "statefulset", "service", "event"]
        );
    }

    #[test]
    fn test_dynamic_resource_uses_plural() {
        let ar = KubeCluster::dynamic_resource("az-edge.com", "v1alpha4", "brokers");
        assert_eq!(ar.api_version, "az-edge.com/v1alpha4");
        assert_eq!(ar.plural, "brokers");
    }
}
