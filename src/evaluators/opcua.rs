use serde_json::Value;

use crate::catalog::ResourceKind;
use crate::check::Check;
use crate::error::ClusterError;
use crate::projection::PropertySpec;
use crate::resource::Resource;

use super::EvalContext;
use super::common::{Cardinality, KindRun, SpecProbe};

const ASSET_TYPE_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("spec.name", "Name"),
    PropertySpec::new("spec.labels", "Labels"),
    PropertySpec::verbose("spec.description", "Description"),
    PropertySpec::verbose("spec.schema", "Schema"),
];

pub async fn evaluate_asset_types(e: &EvalContext<'_>) -> Result<Check, ClusterError> {
    let mut run = KindRun::new(ResourceKind::AssetType, e);
    let Some(groups) = run.collect(e, Cardinality::AtLeastOne).await? else {
        return Ok(run.finish());
    };

    for (ns, items) in &groups {
        for raw in items {
            let r = Resource::new(raw);
            run.header(ns, &r);

            let mut probe = SpecProbe::new(&r);
            match probe.require("spec.schema") {
                Some(Value::String(schema)) => {
                    if let Err(err) = serde_json::from_str::<Value>(schema) {
                        probe.problem(format!("spec.schema is not valid JSON: {err}"));
                    }
                }
                Some(Value::Object(_)) | None => {}
                Some(_) => probe.problem("spec.schema must be a JSON document"),
            }
            run.probe(ns, "spec.schema", &r, probe);

            run.status(e, ns, &r);
            run.project(e, ns, &r, ASSET_TYPE_PROPERTIES);
        }
    }
    Ok(run.finish())
}
