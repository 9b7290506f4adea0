use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/* ============================= TYPES ============================= */

/// An API group/version served by a platform service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiGroupVersion {
    pub group: &'static str,
    pub version: &'static str,
}

impl ApiGroupVersion {
    /// `"<group>/<version>"`, also used as the enumeration check's target key.
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }
}

impl fmt::Display for ApiGroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.version)
    }
}

/// Name prefix of a runtime pod. Required prefixes warn when no pod matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PodPrefix {
    pub prefix: &'static str,
    pub required: bool,
}

#[derive(Debug)]
pub struct ServiceDescriptor {
    pub service: Service,
    pub api: ApiGroupVersion,
    pub kinds: &'static [ResourceKind],
    pub pod_prefixes: &'static [PodPrefix],
    pub pod_label_selector: &'static str,
}

/* ============================= SERVICES ============================= */

/// Platform services in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Broker,
    Connector,
    Diagnostics,
    Opcua,
}

impl Service {
    pub const ALL: [Service; 4] = [
        Service::Broker,
        Service::Connector,
        Service::Diagnostics,
        Service::Opcua,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Broker => "broker",
            Service::Connector => "connector",
            Service::Diagnostics => "diagnostics",
            Service::Opcua => "opcua",
        }
    }

    /// Capitalized form used in check names (`enumerateBrokerApi`, `evalOpcuaPods`).
    pub fn title(&self) -> &'static str {
        match self {
            Service::Broker => "Broker",
            Service::Connector => "Connector",
            Service::Diagnostics => "Diagnostics",
            Service::Opcua => "Opcua",
        }
    }

    pub fn descriptor(&self) -> &'static ServiceDescriptor {
        match self {
            Service::Broker => &BROKER,
            Service::Connector => &CONNECTOR,
            Service::Diagnostics => &DIAGNOSTICS,
            Service::Opcua => &OPCUA,
        }
    }

    pub fn api(&self) -> ApiGroupVersion {
        self.descriptor().api
    }

    pub fn kinds(&self) -> &'static [ResourceKind] {
        self.descriptor().kinds
    }

    pub fn enumeration_check_name(&self) -> String {
        format!("enumerate{}Api", self.title())
    }

    pub fn pod_check_name(&self) -> String {
        format!("eval{}Pods", self.title())
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Service::ALL
            .into_iter()
            .find(|svc| svc.as_str() == lower)
            .ok_or_else(|| {
                let known: Vec<&str> = Service::ALL.iter().map(Service::as_str).collect();
                format!("unknown service '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

static BROKER: ServiceDescriptor = ServiceDescriptor {
    service: Service::Broker,
    api: ApiGroupVersion {
        group: "az-edge.com",
        version: "v1alpha4",
    },
    kinds: &[
        ResourceKind::Broker,
        ResourceKind::BrokerListener,
        ResourceKind::BrokerAuthentication,
        ResourceKind::BrokerAuthorization,
    ],
    pod_prefixes: &[
        PodPrefix { prefix: "aio-mq-dmqtt-frontend", required: true },
        PodPrefix { prefix: "aio-mq-dmqtt-backend", required: true },
        PodPrefix { prefix: "aio-mq-dmqtt-authentication", required: true },
        PodPrefix { prefix: "aio-mq-operator", required: true },
    ],
    pod_label_selector: "app.kubernetes.io/part-of=az-edge-broker",
};

static CONNECTOR: ServiceDescriptor = ServiceDescriptor {
    service: Service::Connector,
    api: ApiGroupVersion {
        group: "connectors.az-edge.com",
        version: "v1alpha4",
    },
    kinds: &[
        ResourceKind::MqttBridgeConnector,
        ResourceKind::MqttBridgeTopicMap,
        ResourceKind::DataLakeConnector,
        ResourceKind::KafkaConnector,
    ],
    pod_prefixes: &[
        PodPrefix { prefix: "aio-mq-mqttbridge", required: false },
        PodPrefix { prefix: "aio-mq-datalake", required: false },
        PodPrefix { prefix: "aio-mq-kafka-connector", required: false },
    ],
    pod_label_selector: "app.kubernetes.io/part-of=az-edge-connectors",
};

static DIAGNOSTICS: ServiceDescriptor = ServiceDescriptor {
    service: Service::Diagnostics,
    api: ApiGroupVersion {
        group: "diagnostics.az-edge.com",
        version: "v1alpha4",
    },
    kinds: &[ResourceKind::DiagnosticService],
    pod_prefixes: &[
        PodPrefix { prefix: "aio-mq-diagnostics-service", required: true },
        PodPrefix { prefix: "aio-mq-diagnostics-probe", required: true },
    ],
    pod_label_selector: "app.kubernetes.io/part-of=az-edge-diagnostics",
};

static OPCUA: ServiceDescriptor = ServiceDescriptor {
    service: Service::Opcua,
    api: ApiGroupVersion {
        group: "opcuabroker.az-edge.com",
        version: "v1beta1",
    },
    kinds: &[ResourceKind::AssetType],
    pod_prefixes: &[
        PodPrefix { prefix: "aio-opc-supervisor", required: true },
        PodPrefix { prefix: "aio-opc-admission-controller", required: true },
        PodPrefix { prefix: "aio-opc-opc", required: false },
    ],
    pod_label_selector: "app.kubernetes.io/part-of=az-edge-opcua",
};

/// Prefix of the pod that serves broker statistics.
pub const DIAGNOSTICS_SERVICE_POD_PREFIX: &str = "aio-mq-diagnostics-service";

/* ============================= RESOURCE KINDS ============================= */

/// Every custom-resource kind with an evaluator. Declaration order is evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Broker,
    BrokerListener,
    BrokerAuthentication,
    BrokerAuthorization,
    MqttBridgeConnector,
    MqttBridgeTopicMap,
    DataLakeConnector,
    KafkaConnector,
    DiagnosticService,
    AssetType,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Broker,
        ResourceKind::BrokerListener,
        ResourceKind::BrokerAuthentication,
        ResourceKind::BrokerAuthorization,
        ResourceKind::MqttBridgeConnector,
        ResourceKind::MqttBridgeTopicMap,
        ResourceKind::DataLakeConnector,
        ResourceKind::KafkaConnector,
        ResourceKind::DiagnosticService,
        ResourceKind::AssetType,
    ];

    /// Lowercase value matched against user filters and used as the archive singular.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Broker => "broker",
            ResourceKind::BrokerListener => "brokerlistener",
            ResourceKind::BrokerAuthentication => "brokerauthentication",
            ResourceKind::BrokerAuthorization => "brokerauthorization",
            ResourceKind::MqttBridgeConnector => "mqttbridgeconnector",
            ResourceKind::MqttBridgeTopicMap => "mqttbridgetopicmap",
            ResourceKind::DataLakeConnector => "datalakeconnector",
            ResourceKind::KafkaConnector => "kafkaconnector",
            ResourceKind::DiagnosticService => "diagnosticservice",
            ResourceKind::AssetType => "assettype",
        }
    }

    /// The `kind` reported by API discovery.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResourceKind::Broker => "Broker",
            ResourceKind::BrokerListener => "BrokerListener",
            ResourceKind::BrokerAuthentication => "BrokerAuthentication",
            ResourceKind::BrokerAuthorization => "BrokerAuthorization",
            ResourceKind::MqttBridgeConnector => "MqttBridgeConnector",
            ResourceKind::MqttBridgeTopicMap => "MqttBridgeTopicMap",
            ResourceKind::DataLakeConnector => "DataLakeConnector",
            ResourceKind::KafkaConnector => "KafkaConnector",
            ResourceKind::DiagnosticService => "DiagnosticService",
            ResourceKind::AssetType => "AssetType",
        }
    }

    pub fn plural(&self) -> String {
        format!("{}s", self.as_str())
    }

    pub fn singular(&self) -> &'static str {
        self.as_str()
    }

    pub fn service(&self) -> Service {
        match self {
            ResourceKind::Broker
            | ResourceKind::BrokerListener
            | ResourceKind::BrokerAuthentication
            | ResourceKind::BrokerAuthorization => Service::Broker,
            ResourceKind::MqttBridgeConnector
            | ResourceKind::MqttBridgeTopicMap
            | ResourceKind::DataLakeConnector
            | ResourceKind::KafkaConnector => Service::Connector,
            ResourceKind::DiagnosticService => Service::Diagnostics,
            ResourceKind::AssetType => Service::Opcua,
        }
    }

    pub fn api(&self) -> ApiGroupVersion {
        self.service().api()
    }

    /// Target key, e.g. `brokerlisteners.az-edge.com`.
    pub fn target(&self) -> String {
        format!("{}.{}", self.plural(), self.api().group)
    }

    pub fn check_name(&self) -> String {
        format!("eval{}s", self.kind_name())
    }

    pub fn description(&self) -> &'static str {
        match self {
            ResourceKind::Broker => "Evaluate MQTT broker",
            ResourceKind::BrokerListener => "Evaluate MQTT broker listeners",
            ResourceKind::BrokerAuthentication => "Evaluate MQTT broker authentication",
            ResourceKind::BrokerAuthorization => "Evaluate MQTT broker authorization",
            ResourceKind::MqttBridgeConnector => "Evaluate MQTT bridge connectors",
            ResourceKind::MqttBridgeTopicMap => "Evaluate MQTT bridge topic maps",
            ResourceKind::DataLakeConnector => "Evaluate data lake connectors",
            ResourceKind::KafkaConnector => "Evaluate Kafka connectors",
            ResourceKind::DiagnosticService => "Evaluate diagnostic service",
            ResourceKind::AssetType => "Evaluate OPC UA asset types",
        }
    }

    pub fn from_kind_name(kind: &str) -> Option<ResourceKind> {
        ResourceKind::ALL.into_iter().find(|k| k.kind_name() == kind)
    }

    /// Case-insensitive match of a user-supplied filter entry.
    pub fn matches_filter(&self, filter: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(filter.trim())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* ============================= TESTS ============================= */
