//! Per-kind evaluators and the sub-protocols they share.

pub mod broker;
pub mod common;
pub mod connector;
pub mod diagnostics;
pub mod opcua;
pub mod pods;
pub mod pre_deployment;

use crate::catalog::ResourceKind;
use crate::check::Check;
use crate::cluster::ClusterClient;
use crate::config::CheckContext;
use crate::error::ClusterError;
use crate::resource::NameFilter;
use crate::status::DetailLevel;

/// Everything an evaluator borrows for the duration of one call.
pub struct EvalContext<'a> {
    pub client: &'a dyn ClusterClient,
    pub ctx: &'a CheckContext,
    pub detail: DetailLevel,
    /// Accumulate displays for human output.
    pub as_list: bool,
    pub names: NameFilter,
}

impl<'a> EvalContext<'a> {
    pub fn new(client: &'a dyn ClusterClient, ctx: &'a CheckContext) -> Self {
        Self {
            client,
            ctx,
            detail: DetailLevel::Summary,
            as_list: false,
            names: NameFilter::any(),
        }
    }

    pub fn with_detail(mut self, detail: DetailLevel) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_list(mut self, as_list: bool) -> Self {
        self.as_list = as_list;
        self
    }

    pub fn with_names(mut self, pattern: Option<&str>) -> Self {
        self.names = NameFilter::new(pattern);
        self
    }
}

/// Run the evaluator registered for `kind`.
pub async fn evaluate_kind(kind: ResourceKind, e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    match kind {
        ResourceKind::Broker => broker::evaluate_brokers(e).await,
        ResourceKind::BrokerListener => broker::evaluate_listeners(e).await,
        ResourceKind::BrokerAuthentication => broker::evaluate_authentications(e).await,
        ResourceKind::BrokerAuthorization => broker::evaluate_authorizations(e).await,
        ResourceKind::MqttBridgeConnector => connector::evaluate_mqtt_bridge_connectors(e).await,
        ResourceKind::MqttBridgeTopicMap => connector::evaluate_topic_maps(e).await,
        ResourceKind::DataLakeConnector => connector::evaluate_datalake_connectors(e).await,
        ResourceKind::KafkaConnector => connector::evaluate_kafka_connectors(e).await,
        ResourceKind::DiagnosticService => diagnostics::evaluate_diagnostic_services(e).await,
        ResourceKind::AssetType => opcua::evaluate_asset_types(e).await,
    }
}
