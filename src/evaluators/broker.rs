//! MQTT broker custom resources.

use serde_json::Value;

use crate::catalog::ResourceKind;
use crate::check::Check;
use crate::error::ClusterError;
use crate::projection::PropertySpec;
use crate::resource::Resource;

use super::EvalContext;
use super::common::{Cardinality, KindRun, SpecProbe};

const BROKER_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.mode", "Broker Mode"),
    PropertySpec::new("spec.cardinality", "Cardinality"),
    PropertySpec::new("spec.diagnostics", "Diagnostics"),
    PropertySpec::verbose("spec.memoryProfile", "Memory Profile"),
    PropertySpec::verbose("spec.authImage", "Auth Image"),
    PropertySpec::verbose("spec.brokerImage", "Broker Image"),
    PropertySpec::verbose("spec.healthManagerImage", "Health Manager Image"),
];

const LISTENER_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.port", "Port"),
    PropertySpec::new("spec.serviceType", "Service Type"),
    PropertySpec::new("spec.authenticationEnabled", "Authentication Enabled"),
    PropertySpec::new("spec.authorizationEnabled", "Authorization Enabled"),
    PropertySpec::verbose("spec.serviceName", "Service Name"),
    PropertySpec::verbose("spec.tls", "TLS"),
];

const AUTHENTICATION_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.listenerRef", "Listener Refs"),
    PropertySpec::verbose("spec.authenticationMethods", "Authentication Methods"),
];

const AUTHORIZATION_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.listenerRef", "Listener Refs"),
    PropertySpec::verbose("spec.authorizationPolicies", "Authorization Policies"),
];

const AUTHENTICATION_METHODS: &[&str] = &["custom", "sat", "usernamePassword", "x509"];

/* ============================= BROKER ============================= */

pub async fn evaluate_brokers(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::Broker, e);
    let Some(groups) = run.collect(e, Cardinality::ExactlyOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            let distributed = r
                .str_at("spec.mode")
                .is_some_and(|m| m.eq_ignore_ascii_case("distributed"));
            if distributed {
                let mut probe = SpecProbe::new(&r);
                probe.require_min("spec.cardinality.frontend.replicas", 1);
                probe.require_min("spec.cardinality.backendChain.partitions", 1);
                probe.require_min("spec.cardinality.backendChain.redundancyFactor", 1);
                probe.require_min("spec.cardinality.backendChain.workers", 1);
                run.probe(ns, "spec.cardinality", &r, probe);
            }

            run.status(e, ns, &r);
            run.project(e, ns, &r, BROKER_PROPERTIES);
        }
    }
    Ok(run.finish())
}

/* ============================= LISTENER ============================= */

pub async fn evaluate_listeners(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::BrokerListener, e);
    let Some(groups) = run.collect(e, Cardinality::AtLeastOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            let mut probe = SpecProbe::new(&r);
            probe.require_str("spec.brokerRef");
            probe.optional_range("spec.port", 1, 65535);
            probe.optional_in("spec.serviceType", &["clusterIp", "loadBalancer", "nodePort"]);
            run.probe(ns, "spec", &r, probe);

            run.reference(e, ns, &r, "spec.brokerRef", ResourceKind::Broker).await?;

            if r.has("spec.tls") {
                run.one_of(ns, &r, "spec.tls", &["automatic", "manual"]);
            }

            run.status(e, ns, &r);
            run.project(e, ns, &r, LISTENER_PROPERTIES);
        }
    }
    Ok(run.finish())
}

/* ============================= AUTHENTICATION ============================= */

pub async fn evaluate_authentications(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::BrokerAuthentication, e);
    let Some(groups) = run.collect(e, Cardinality::AtLeastOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            run.reference_list(e, ns, &r, "spec.listenerRef", ResourceKind::BrokerListener)
                .await?;

            let methods = method_count(&r, "spec.authenticationMethods");
            if methods == 0 {
                let mut probe = SpecProbe::new(&r);
                probe.require_items("spec.authenticationMethods");
                run.probe(ns, "spec.authenticationMethods", &r, probe);
            }
            for i in 0..methods {
                run.one_of(ns, &r, &format!("spec.authenticationMethods.{i}"), AUTHENTICATION_METHODS);
            }

            run.status(e, ns, &r);
            run.project(e, ns, &r, AUTHENTICATION_PROPERTIES);
        }
    }
    Ok(run.finish())
}

fn method_count(r: &Resource<'_>, path: &str) -> usize {
    r.get(path).and_then(Value::as_array).map_or(0, Vec::len)
}

/* ============================= AUTHORIZATION ============================= */

pub async fn evaluate_authorizations(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::BrokerAuthorization, e);
    let Some(groups) = run.collect(e, Cardinality::AtLeastOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            run.reference_list(e, ns, &r, "spec.listenerRef", ResourceKind::BrokerListener)
                .await?;

            let mut probe = SpecProbe::new(&r);
            let rules = probe.require_items("spec.authorizationPolicies.rules");
            for (i, rule) in rules.iter().enumerate() {
                if !non_empty_container(rule.get("principals")) {
                    probe.problem(format!("rules[{i}].principals must not be empty"));
                }
                if !non_empty_container(rule.get("brokerResources")) {
                    probe.problem(format!("rules[{i}].brokerResources must not be empty"));
                }
            }
            run.probe(ns, "spec.authorizationPolicies.rules", &r, probe);

            run.status(e, ns, &r);
            run.project(e, ns, &r, AUTHORIZATION_PROPERTIES);
        }
    }
    Ok(run.finish())
}

fn non_empty_container(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        _ => false,
    }
}

/* ============================= TESTS ============================= */
