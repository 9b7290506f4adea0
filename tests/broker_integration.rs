mod common;

use common::{FakeCluster, make_cr, with_status};
use edge_diag::catalog::{ResourceKind, Service};
use edge_diag::check::{ALL_NAMESPACES, Check};
use edge_diag::config::CheckContext;
use edge_diag::engine::CheckEngine;
use edge_diag::evaluators::EvalContext;
use edge_diag::evaluators::broker::{evaluate_authentications, evaluate_authorizations, evaluate_brokers};
use edge_diag::{DetailLevel, Status};
use serde_json::json;

// ══════════════════════════════════════════════════════════════════
// Broker service evaluators (no cluster required)
// ══════════════════════════════════════════════════════════════════

const BROKERS: &str = "brokers.az-edge.com";
const LISTENERS: &str = "brokerlisteners.az-edge.com";

fn broker_cluster(broker_ref: &str) -> FakeCluster {
    FakeCluster::new()
        .with_full_api(Service::Broker)
        .with_object(ResourceKind::Broker, make_cr(ResourceKind::Broker, "b1", "ns1", json!({"mode": "auto"})))
        .with_object(
            ResourceKind::BrokerListener,
            make_cr(ResourceKind::BrokerListener, "l1", "ns1", json!({"brokerRef": broker_ref, "port": 1883})),
        )
}

async fn run_broker(cluster: &FakeCluster, kinds: Option<&[String]>) -> Vec<Check> {
    let engine = CheckEngine::new(cluster, CheckContext::default());
    engine
        .run_post_deployment(Service::Broker, false, DetailLevel::Summary, kinds, None, &[])
        .await
}

fn find<'c>(checks: &'c [Check], name: &str) -> &'c Check {
    checks.iter().find(|c| c.name == name).unwrap()
}

#[tokio::test]
async fn test_broker_with_valid_listener() {
    let cluster = broker_cluster("b1");
    let checks = run_broker(&cluster, None).await;

    let names: Vec<&str> = checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "enumerateBrokerApi",
            "evalBrokers",
            "evalBrokerListeners",
            "evalBrokerAuthentications",
            "evalBrokerAuthorizations",
            "evalBrokerPods",
        ]
    );

    let enumeration = find(&checks, "enumerateBrokerApi");
    assert_eq!(enumeration.status, Status::Success);
    assert_eq!(enumeration.evaluations().count(), 4);

    let broker = find(&checks, "evalBrokers");
    assert_eq!(broker.status, Status::Success);
    let entry = broker.target(BROKERS, "ns1").unwrap();
    assert_eq!(entry.conditions, vec!["len(brokers)==1"]);
    assert_eq!(entry.evaluations.len(), 1);

    let listener = find(&checks, "evalBrokerListeners");
    assert_eq!(listener.status, Status::Success);
    let entry = listener.target(LISTENERS, "ns1").unwrap();
    assert_eq!(entry.conditions, vec!["len(brokerlisteners)>=1", "spec", "valid(spec.brokerRef)"]);
    assert!(entry.evaluations.iter().all(|e| e.status == Status::Success));
    assert_eq!(entry.evaluations[2].value, json!({"spec.brokerRef": "b1"}));
}

#[tokio::test]
async fn test_listener_with_dangling_broker_ref() {
    let cluster = broker_cluster("does-not-exist");
    let checks = run_broker(&cluster, None).await;

    let listener = find(&checks, "evalBrokerListeners");
    assert_eq!(listener.status, Status::Error);
    let entry = listener.target(LISTENERS, "ns1").unwrap();
    let statuses: Vec<Status> = entry.evaluations.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![Status::Success, Status::Success, Status::Error]);
    assert_eq!(entry.evaluations[2].name.as_deref(), Some("l1"));
}

#[tokio::test]
async fn test_kind_filter_limits_checks_and_skips_pods() {
    let cluster = broker_cluster("b1");
    let filter = vec!["BrokerListener".to_string()];
    let checks = run_broker(&cluster, Some(&filter)).await;
    let names: Vec<&str> = checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["enumerateBrokerApi", "evalBrokerListeners"]);
}

#[tokio::test]
async fn test_missing_broker_api_is_single_skipped_target() {
    let cluster = FakeCluster::new();
    let checks = run_broker(&cluster, None).await;
    assert_eq!(checks.len(), 1);

    let check = &checks[0];
    assert_eq!(check.name, "enumerateBrokerApi");
    assert_eq!(check.status, Status::Skipped);
    assert_eq!(check.targets.len(), 1);
    let entry = check.target("az-edge.com/v1alpha4", ALL_NAMESPACES).unwrap();
    assert_eq!(entry.status, Status::Skipped);
    assert!(entry.evaluations.iter().all(|e| e.name.is_none()));
}

#[tokio::test]
async fn test_two_brokers_violate_cardinality() {
    let cluster = FakeCluster::new()
        .with_object(ResourceKind::Broker, make_cr(ResourceKind::Broker, "b1", "ns1", json!({})))
        .with_object(ResourceKind::Broker, make_cr(ResourceKind::Broker, "b2", "ns1", json!({})));
    let ctx = CheckContext::default();
    let e = EvalContext::new(&cluster, &ctx);

    let check = evaluate_brokers(&e).await.unwrap();
    assert_eq!(check.status, Status::Error);
    assert_eq!(check.target(BROKERS, "ns1").unwrap().evaluations[0].value, json!(2));
}

#[tokio::test]
async fn test_no_brokers_is_warning() {
    let cluster = FakeCluster::new();
    let ctx = CheckContext::default();
    let e = EvalContext::new(&cluster, &ctx);

    let check = evaluate_brokers(&e).await.unwrap();
    assert_eq!(check.status, Status::Warning);
    let entry = check.target(BROKERS, ALL_NAMESPACES).unwrap();
    assert_eq!(entry.evaluations[0].value, json!("No brokers detected in any namespace."));
}

#[tokio::test]
async fn test_distributed_broker_cardinality_and_status() {
    let broker = with_status(
        make_cr(
            ResourceKind::Broker,
            "b1",
            "ns1",
            json!({
                "mode": "distributed",
                "cardinality": {
                    "frontend": {"replicas": 2},
                    "backendChain": {"partitions": 0, "redundancyFactor": 2, "workers": 1}
                }
            }),
        ),
        json!({"runtimeStatus": {"status": "Running"}, "provisioningStatus": {"status": "Succeeded"}}),
    );
    let cluster = FakeCluster::new().with_object(ResourceKind::Broker, broker);
    let ctx = CheckContext::default();
    let e = EvalContext::new(&cluster, &ctx);

    let check = evaluate_brokers(&e).await.unwrap();
    let entry = check.target(BROKERS, "ns1").unwrap();
    assert_eq!(entry.conditions, vec!["len(brokers)==1", "spec.cardinality", "status"]);
    assert_eq!(entry.evaluations[1].status, Status::Error);
    assert!(
        entry.evaluations[1]
            .value
            .as_str()
            .unwrap()
            .contains("spec.cardinality.backendChain.partitions")
    );
    assert_eq!(entry.evaluations[2].status, Status::Success);
    assert_eq!(check.status, Status::Error);
}

#[tokio::test]
async fn test_starting_runtime_status_is_warning() {
    let broker = with_status(
        make_cr(ResourceKind::Broker, "b1", "ns1", json!({})),
        json!({"runtimeStatus": {"status": "Starting"}, "provisioningStatus": {"status": "Succeeded"}}),
    );
    let cluster = FakeCluster::new().with_object(ResourceKind::Broker, broker);
    let ctx = CheckContext::default();
    let e = EvalContext::new(&cluster, &ctx);

    let check = evaluate_brokers(&e).await.unwrap();
    assert_eq!(check.status, Status::Warning);
}

#[tokio::test]
async fn test_authentication_methods_one_of() {
    let listener = make_cr(ResourceKind::BrokerListener, "l1", "ns1", json!({"brokerRef": "b1"}));
    let authn = make_cr(
        ResourceKind::BrokerAuthentication,
        "authn",
        "ns1",
        json!({
            "listenerRef": ["l1"],
            "authenticationMethods": [
                {"sat": {"audiences": ["aio-mq"]}},
                {"x509": {}, "custom": {"endpoint": "https://auth"}}
            ]
        }),
    );
    let cluster = FakeCluster::new()
        .with_object(ResourceKind::BrokerListener, listener)
        .with_object(ResourceKind::BrokerAuthentication, authn);
    let ctx = CheckContext::default();
    let e = EvalContext::new(&cluster, &ctx);

    let check = evaluate_authentications(&e).await.unwrap();
    let entry = check.target("brokerauthentications.az-edge.com", "ns1").unwrap();
    assert_eq!(entry.conditions[1], "valid(spec.listenerRef)");
    assert_eq!(entry.evaluations[1].status, Status::Success);
    assert_eq!(
        entry.conditions[2],
        "oneOf(spec.authenticationMethods.0.custom, spec.authenticationMethods.0.sat, \
         spec.authenticationMethods.0.usernamePassword, spec.authenticationMethods.0.x509)"
    );
    assert_eq!(entry.evaluations[2].value, json!("sat"));
    assert_eq!(entry.evaluations[3].status, Status::Error);
    assert_eq!(check.status, Status::Error);
}

#[tokio::test]
async fn test_authorization_rules_must_name_principals() {
    let listener = make_cr(ResourceKind::BrokerListener, "l1", "ns1", json!({"brokerRef": "b1"}));
    let authz = make_cr(
        ResourceKind::BrokerAuthorization,
        "authz",
        "ns1",
        json!({
            "listenerRef": ["l1", "l2"],
            "authorizationPolicies": {"rules": [
                {"principals": {"usernames": ["u"]}, "brokerResources": [{"method": "Connect"}]},
                {"principals": {}, "brokerResources": [{"method": "Publish"}]}
            ]}
        }),
    );
    let cluster = FakeCluster::new()
        .with_object(ResourceKind::BrokerListener, listener)
        .with_object(ResourceKind::BrokerAuthorization, authz);
    let ctx = CheckContext::default();
    let e = EvalContext::new(&cluster, &ctx);

    let check = evaluate_authorizations(&e).await.unwrap();
    let entry = check.target("brokerauthorizations.az-edge.com", "ns1").unwrap();
    assert_eq!(entry.evaluations[1].value["missing"], json!(["l2"]));
    assert_eq!(entry.conditions[2], "spec.authorizationPolicies.rules");
    assert_eq!(
        entry.evaluations[2].value,
        json!("rules[1].principals must not be empty")
    );
}

#[tokio::test]
async fn test_name_filter_applies_to_resources() {
    let cluster = FakeCluster::new()
        .with_object(ResourceKind::Broker, make_cr(ResourceKind::Broker, "prod-broker", "ns1", json!({})))
        .with_object(ResourceKind::Broker, make_cr(ResourceKind::Broker, "test-broker", "ns2", json!({})));
    let ctx = CheckContext::default();
    let e = EvalContext::new(&cluster, &ctx).with_names(Some("PROD-*"));

    let check = evaluate_brokers(&e).await.unwrap();
    assert!(check.target(BROKERS, "ns1").is_some());
    assert!(check.target(BROKERS, "ns2").is_none());
}

#[tokio::test]
async fn test_namespace_scope_uses_namespaced_list() {
    let cluster = broker_cluster("b1");
    let ctx = CheckContext::default().with_namespace("ns1");
    let e = EvalContext::new(&cluster, &ctx);

    evaluate_brokers(&e).await.unwrap();
    assert!(
        cluster
            .calls()
            .contains(&"list_namespaced_custom_objects:ns1:brokers".to_string())
    );
}
