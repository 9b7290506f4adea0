//! Connector custom resources: MQTT bridge, data lake, Kafka.

use crate::catalog::ResourceKind;
use crate::check::Check;
use crate::error::ClusterError;
use crate::projection::PropertySpec;
use crate::resource::Resource;

use super::EvalContext;
use super::common::{Cardinality, KindRun, SpecProbe};

const BRIDGE_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.bridgeInstances", "Bridge Instances"),
    PropertySpec::new("spec.protocol", "Protocol"),
    PropertySpec::new("spec.remoteBrokerConnection.endpoint", "Remote Endpoint"),
    PropertySpec::verbose("spec.image", "Image"),
    PropertySpec::verbose("spec.localBrokerConnection", "Local Broker Connection"),
    PropertySpec::verbose("spec.remoteBrokerConnection", "Remote Broker Connection"),
    PropertySpec::verbose("spec.clientIdPrefix", "Client Id Prefix"),
];

const TOPIC_MAP_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.mqttBridgeConnectorRef", "Connector Ref"),
    PropertySpec::verbose("spec.routes", "Routes"),
];

const DATALAKE_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.instances", "Instances"),
    PropertySpec::new("spec.protocol", "Protocol"),
    PropertySpec::verbose("spec.image", "Image"),
    PropertySpec::verbose("spec.target", "Target"),
    PropertySpec::verbose("spec.localBrokerConnection", "Local Broker Connection"),
];

const KAFKA_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.instances", "Instances"),
    PropertySpec::new("spec.kafkaConnection.endpoint", "Kafka Endpoint"),
    PropertySpec::verbose("spec.image", "Image"),
    PropertySpec::verbose("spec.kafkaConnection", "Kafka Connection"),
    PropertySpec::verbose("spec.clientIdPrefix", "Client Id Prefix"),
];

const ROUTE_DIRECTIONS: &[&str] = &["local-to-remote", "remote-to-local"];

/* ============================= MQTT BRIDGE ============================= */

pub async fn evaluate_mqtt_bridge_connectors(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::MqttBridgeConnector, e);
    let Some(groups) = run.collect(e, Cardinality::AtLeastOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            let mut probe = SpecProbe::new(&r);
            probe.require_str("spec.image");
            probe.require_in("spec.protocol", &["v3", "v5"]);
            probe.require_str("spec.remoteBrokerConnection.endpoint");
            probe.require_min("spec.bridgeInstances", 1);
            run.probe(ns, "spec", &r, probe);

            if r.has("spec.remoteBrokerConnection.authentication") {
                run.one_of(
                    ns,
                    &r,
                    "spec.remoteBrokerConnection.authentication",
                    &["systemAssignedManagedIdentity", "x509"],
                );
            }

            run.status(e, ns, &r);
            run.project(e, ns, &r, BRIDGE_PROPERTIES);
        }
    }
    Ok(run.finish())
}

pub async fn evaluate_topic_maps(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::MqttBridgeTopicMap, e);
    let Some(groups) = run.collect(e, Cardinality::AtLeastOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            run.reference(
                e,
                ns,
                &r,
                "spec.mqttBridgeConnectorRef",
                ResourceKind::MqttBridgeConnector,
            )
            .await?;

            let mut probe = SpecProbe::new(&r);
            let routes = probe.require_items("spec.routes");
            for (i, route) in routes.iter().enumerate() {
                let direction = route.get("direction").and_then(|d| d.as_str());
                if !direction.is_some_and(|d| ROUTE_DIRECTIONS.contains(&d)) {
                    probe.problem(format!(
                        "routes[{i}].direction must be one of {}",
                        ROUTE_DIRECTIONS.join(", ")
                    ));
                }
                for field in ["source", "target"] {
                    if route.get(field).and_then(|v| v.as_str()).is_none_or(str::is_empty) {
                        probe.problem(format!("routes[{i}].{field} is required"));
                    }
                }
            }
            run.probe(ns, "spec.routes", &r, probe);

            run.status(e, ns, &r);
            run.project(e, ns, &r, TOPIC_MAP_PROPERTIES);
        }
    }
    Ok(run.finish())
}

/* ============================= DATA LAKE ============================= */

pub async fn evaluate_datalake_connectors(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::DataLakeConnector, e);
    let Some(groups) = run.collect(e, Cardinality::AtLeastOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            let mut probe = SpecProbe::new(&r);
            probe.require_str("spec.image");
            probe.require_str("spec.protocol");
            probe.require_min("spec.instances", 1);
            run.probe(ns, "spec", &r, probe);

            run.one_of(
                ns,
                &r,
                "spec.target",
                &["datalakeStorage", "fabricOneLake", "localStorage"],
            );

            run.status(e, ns, &r);
            run.project(e, ns, &r, DATALAKE_PROPERTIES);
        }
    }
    Ok(run.finish())
}

/* ============================= KAFKA ============================= */

pub async fn evaluate_kafka_connectors(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::KafkaConnector, e);
    let Some(groups) = run.collect(e, Cardinality::AtLeastOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            let mut probe = SpecProbe::new(&r);
            probe.require_str("spec.image");
            probe.require_str("spec.kafkaConnection.endpoint");
            probe.require_min("spec.instances", 1);
            run.probe(ns, "spec", &r, probe);

            if r.has("spec.kafkaConnection.authentication.authType") {
                run.one_of(
                    ns,
                    &r,
                    "spec.kafkaConnection.authentication.authType",
                    &["sasl", "systemAssignedManagedIdentity", "x509"],
                );
            }

            run.status(e, ns, &r);
            run.project(e, ns, &r, KAFKA_PROPERTIES);
        }
    }
    Ok(run.finish())
}
