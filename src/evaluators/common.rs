//! Sub-protocols shared by every custom-resource evaluator.

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::catalog::ResourceKind;
use crate::check::{ALL_NAMESPACES, Check, CheckManager, Evaluation};
use crate::display::Display;
use crate::error::ClusterError;
use crate::projection::{PropertySpec, project, scalar};
use crate::resource::{Resource, as_u64, lookup};
use crate::status::Status;

use super::EvalContext;

/* ============================= FETCH ============================= */

/// List `kind` in scope and apply the name filter.
///
/// A plural the server does not serve is treated as an empty list.
pub async fn fetch_resources(e: &EvalContext<'_>, kind: ResourceKind) -> Result<Vec<Value>, ClusterError> {
    let api = kind.api();
    let plural = kind.plural();
    let listed = match e.ctx.namespace.as_deref() {
        Some(ns) => {
            e.client
                .list_namespaced_custom_objects(api.group, api.version, ns, &plural)
                .await
        }
        None => {
            e.client
                .list_cluster_custom_objects(api.group, api.version, &plural)
                .await
        }
    };
    let items = match listed {
        Ok(items) => items,
        Err(err) if err.is_not_found() => {
            debug!(kind = %kind, "custom_objects_not_found");
            Vec::new()
        }
        Err(err) => return Err(err),
    };
    Ok(items
        .into_iter()
        .filter(|raw| e.names.matches(Resource::new(raw).name()))
        .collect())
}

/// Group resources by namespace, keeping first-seen namespace order.
pub fn group_by_namespace(resources: Vec<Value>) -> IndexMap<String, Vec<Value>> {
    let mut groups: IndexMap<String, Vec<Value>> = IndexMap::new();
    for raw in resources {
        let ns = Resource::new(&raw).namespace().to_string();
        groups.entry(ns).or_default().push(raw);
    }
    groups
}

/* ============================= KIND RUN ============================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    AtLeastOne,
    ExactlyOne,
}

/// A check under construction for one resource kind.
pub struct KindRun {
    pub kind: ResourceKind,
    pub target: String,
    check: CheckManager,
    as_list: bool,
}

impl KindRun {
    pub fn new(kind: ResourceKind, e: &EvalContext<'_>) -> Self {
        Self {
            kind,
            target: kind.target(),
            check: CheckManager::new(kind.check_name(), kind.description()),
            as_list: e.as_list,
        }
    }

    pub fn finish(self) -> Check {
        self.check.into_check()
    }

    /// Record one condition and its evaluation against a named resource.
    pub fn eval(&mut self, namespace: &str, condition: impl Into<String>, status: Status, value: Value, name: &str) {
        let evaluation = Evaluation::new(status, value)
            .named(name)
            .of_kind(self.kind.as_str());
        self.check
            .add_condition_eval(&self.target, namespace, condition, evaluation);
    }

    pub fn display(&mut self, namespace: &str, display: Display) {
        if self.as_list {
            self.check.add_display(&self.target, namespace, display);
        }
    }

    pub fn displays(&mut self, namespace: &str, displays: Vec<Display>) {
        if self.as_list {
            self.check.add_displays(&self.target, namespace, displays);
        }
    }

    /// Fetch resources and record cardinality per namespace.
    ///
    /// Returns `None` after recording the absence warning when nothing is in scope.
    pub async fn collect(
        &mut self,
        e: &EvalContext<'_>,
        cardinality: Cardinality,
    ) -> Result<Option<IndexMap<String, Vec<Value>>>, ClusterError> {
        let resources = fetch_resources(e, self.kind).await?;
        let plural = self.kind.plural();
        let condition = match cardinality {
            Cardinality::AtLeastOne => format!("len({plural})>=1"),
            Cardinality::ExactlyOne => format!("len({plural})==1"),
        };

        if resources.is_empty() {
            let message = match e.ctx.namespace.as_deref() {
                Some(ns) => format!("No {plural} detected in namespace {ns}."),
                None => format!("No {plural} detected in any namespace."),
            };
            self.check.add_condition_eval(
                &self.target,
                ALL_NAMESPACES,
                condition,
                Evaluation::new(Status::Warning, message.clone()).of_kind(self.kind.as_str()),
            );
            self.display(ALL_NAMESPACES, Display::new(0).status(message, Status::Warning));
            return Ok(None);
        }

        let groups = group_by_namespace(resources);
        for (ns, items) in &groups {
            let count = items.len();
            let status = match cardinality {
                Cardinality::ExactlyOne if count != 1 => Status::Error,
                _ => Status::Success,
            };
            self.check.add_condition_eval(
                &self.target,
                ns,
                condition.clone(),
                Evaluation::new(status, count).of_kind(self.kind.as_str()),
            );
            let noun = if count == 1 { self.kind.kind_name().to_string() } else { plural.clone() };
            self.display(
                ns,
                Display::new(0)
                    .plain("Found ")
                    .status(count.to_string(), status)
                    .plain(format!(" {noun} in namespace "))
                    .value(ns.as_str()),
            );
        }
        Ok(Some(groups))
    }

    /// Header line introducing one resource.
    pub fn header(&mut self, namespace: &str, resource: &Resource<'_>) {
        let display = Display::new(2)
            .plain("- ")
            .plain(self.kind.kind_name())
            .plain(" ")
            .value(resource.name());
        self.display(namespace, display);
    }

    /// Project properties of `resource` under its header.
    pub fn project(&mut self, e: &EvalContext<'_>, namespace: &str, resource: &Resource<'_>, specs: &[PropertySpec]) {
        if !self.as_list {
            return;
        }
        let lines = project(resource.raw(), specs, e.detail, 6);
        self.displays(namespace, lines);
    }

    /* ---------------- status ---------------- */

    /// Evaluate `status.runtimeStatus` and `status.provisioningStatus` when a status object exists.
    pub fn status(&mut self, e: &EvalContext<'_>, namespace: &str, resource: &Resource<'_>) {
        let Some(status) = resource.status() else {
            return;
        };
        let (combined, value) = resource_status(status, e.detail.is_verbose());
        self.eval(namespace, "status", combined, value, resource.name());

        let mut line = Display::new(6).label("Status").plain(": ");
        for (field, label) in [("runtimeStatus", "runtime"), ("provisioningStatus", "provisioning")] {
            if let Some(raw) = lookup(status, &format!("{field}.status")).and_then(Value::as_str) {
                line = line
                    .plain(format!("{label} "))
                    .status(raw.to_string(), map_status_str(raw))
                    .plain(" ");
            }
        }
        self.display(namespace, line);
    }

    /* ---------------- cross references ---------------- */

    /// `valid(<ref_path>)`: the referenced `referent` must exist in the same namespace.
    pub async fn reference(
        &mut self,
        e: &EvalContext<'_>,
        namespace: &str,
        resource: &Resource<'_>,
        ref_path: &str,
        referent: ResourceKind,
    ) -> Result<(), ClusterError> {
        let condition = format!("valid({ref_path})");
        let Some(ref_name) = resource.str_at(ref_path).filter(|s| !s.is_empty()) else {
            self.eval(
                namespace,
                condition,
                Status::Error,
                Value::String(format!("{ref_path} is not set")),
                resource.name(),
            );
            return Ok(());
        };
        let exists = referent_exists(e, namespace, referent, ref_name).await?;
        let status = if exists { Status::Success } else { Status::Error };
        self.eval(namespace, condition, status, json!({ ref_path: ref_name }), resource.name());

        let suffix = if exists { " valid" } else { " not found" };
        self.display(
            namespace,
            Display::new(6)
                .label(referent.kind_name())
                .plain(" reference ")
                .value(ref_name)
                .status(suffix, status),
        );
        Ok(())
    }

    /// `valid(<ref_path>)` for a list of names. Every entry must exist.
    pub async fn reference_list(
        &mut self,
        e: &EvalContext<'_>,
        namespace: &str,
        resource: &Resource<'_>,
        ref_path: &str,
        referent: ResourceKind,
    ) -> Result<(), ClusterError> {
        let condition = format!("valid({ref_path})");
        let names: Vec<&str> = match resource.get(ref_path) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(single)) => vec![single.as_str()],
            _ => Vec::new(),
        };
        if names.is_empty() {
            self.eval(
                namespace,
                condition,
                Status::Error,
                Value::String(format!("{ref_path} is not set")),
                resource.name(),
            );
            return Ok(());
        }

        let mut missing = Vec::new();
        for name in &names {
            if !referent_exists(e, namespace, referent, name).await? {
                missing.push(*name);
            }
        }
        let status = if missing.is_empty() { Status::Success } else { Status::Error };
        let mut value = json!({ ref_path: names });
        if !missing.is_empty() {
            value["missing"] = json!(missing);
            self.display(
                namespace,
                Display::new(6)
                    .label(referent.kind_name())
                    .plain(" references not found: ")
                    .status(missing.join(", "), Status::Error),
            );
        }
        self.eval(namespace, condition, status, value, resource.name());
        Ok(())
    }

    /* ---------------- oneOf ---------------- */

    /// `oneOf(f1, f2, ...)` over fields relative to `base`, e.g. `spec.tls`.
    pub fn one_of(&mut self, namespace: &str, resource: &Resource<'_>, base: &str, fields: &[&str]) {
        let paths: Vec<String> = fields.iter().map(|f| format!("{base}.{f}")).collect();
        let condition = format!("oneOf({})", paths.join(", "));
        let present: Vec<&str> = fields
            .iter()
            .zip(paths.iter())
            .filter(|(_, path)| resource.has(path))
            .map(|(field, _)| *field)
            .collect();
        let (status, value) = one_of_outcome(&present, fields);
        self.eval(namespace, condition, status, value, resource.name());
        if status == Status::Error {
            self.display(
                namespace,
                Display::new(6).status(format!("{base}: expected exactly one of {}", fields.join(", ")), status),
            );
        }
    }

    /// `spec` style condition backed by a [`SpecProbe`].
    pub fn probe(&mut self, namespace: &str, condition: &str, resource: &Resource<'_>, probe: SpecProbe) {
        let problems = probe.problems.clone();
        let (status, value) = probe.outcome();
        self.eval(namespace, condition, status, value, resource.name());
        for problem in problems {
            self.display(namespace, Display::new(6).status(problem, Status::Error));
        }
    }
}

async fn referent_exists(
    e: &EvalContext<'_>,
    namespace: &str,
    referent: ResourceKind,
    name: &str,
) -> Result<bool, ClusterError> {
    let api = referent.api();
    match e
        .client
        .get_namespaced_custom_object(api.group, api.version, namespace, &referent.plural(), name)
        .await
    {
        Ok(_) => Ok(true),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) if err.is_connectivity() => Err(err),
        Err(err) => {
            debug!(error = %err, referent = %referent, name, "reference_lookup_failed");
            Ok(false)
        }
    }
}

/// Status and value for a `oneOf` condition given which fields are present.
pub fn one_of_outcome(present: &[&str], fields: &[&str]) -> (Status, Value) {
    match present.len() {
        1 => (Status::Success, Value::String(present[0].to_string())),
        0 => (
            Status::Error,
            Value::String(format!("none of {} is set", fields.join(", "))),
        ),
        n => (
            Status::Error,
            Value::String(format!("{n} of {} are set: {}", fields.join(", "), present.join(", "))),
        ),
    }
}

/* ============================= CUSTOM RESOURCE STATUS ============================= */

/// Map one substatus string.
pub fn map_status_str(raw: &str) -> Status {
    match raw.to_ascii_lowercase().as_str() {
        "running" | "succeeded" | "ok" => Status::Success,
        "starting" | "recovering" | "warn" | "warning" => Status::Warning,
        "failed" | "error" => Status::Error,
        _ => Status::Warning,
    }
}

/// Combined runtime/provisioning status of a resource `status` object.
///
/// Both substatuses missing is an error. One missing alongside a present one counts as a warning.
pub fn resource_status(status: &Value, verbose: bool) -> (Status, Value) {
    let mut value = Map::new();
    let mut observed = Vec::new();
    for field in ["runtimeStatus", "provisioningStatus"] {
        let raw = lookup(status, &format!("{field}.status")).and_then(Value::as_str);
        observed.push(raw.map(map_status_str));
        if let Some(raw) = raw {
            let mut sub = Map::new();
            sub.insert("status".to_string(), Value::String(raw.to_string()));
            if verbose
                && let Some(desc) = lookup(status, &format!("{field}.statusDescription"))
            {
                sub.insert("statusDescription".to_string(), desc.clone());
            }
            value.insert(field.to_string(), Value::Object(sub));
        }
    }
    let combined = match (observed[0], observed[1]) {
        (None, None) => Status::Error,
        (Some(a), Some(b)) => a.worst(b),
        (Some(a), None) | (None, Some(a)) => a.worst(Status::Warning),
    };
    if value.is_empty() {
        return (combined, Value::String("status not reported".to_string()));
    }
    (combined, Value::Object(value))
}

/* ============================= SPEC PROBE ============================= */

/// Collects field checks for one `spec`-style condition.
///
/// Each observed field lands in the evaluation value; any problem turns it into an error.
pub struct SpecProbe<'a> {
    raw: &'a Value,
    observed: Map<String, Value>,
    problems: Vec<String>,
}

impl<'a> SpecProbe<'a> {
    pub fn new(resource: &Resource<'a>) -> Self {
        Self {
            raw: resource.raw(),
            observed: Map::new(),
            problems: Vec::new(),
        }
    }

    fn observe(&mut self, path: &str) -> Option<&'a Value> {
        let value = lookup(self.raw, path).filter(|v| !v.is_null());
        if let Some(v) = value {
            self.observed.insert(path.to_string(), v.clone());
        }
        value
    }

    pub fn problem(&mut self, message: impl Into<String>) {
        self.problems.push(message.into());
    }

    pub fn require(&mut self, path: &str) -> Option<&'a Value> {
        let value = self.observe(path);
        if value.is_none() {
            self.problem(format!("missing {path}"));
        }
        value
    }

    /// Required non-empty string.
    pub fn require_str(&mut self, path: &str) -> Option<&'a str> {
        match self.require(path) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            Some(_) => {
                self.problem(format!("{path} must be a non-empty string"));
                None
            }
            None => None,
        }
    }

    /// Required integer `>= min`.
    pub fn require_min(&mut self, path: &str, min: u64) {
        if let Some(v) = self.require(path) {
            self.check_min(path, v, min);
        }
    }

    /// Integer `>= min` when present.
    pub fn optional_min(&mut self, path: &str, min: u64) {
        if let Some(v) = self.observe(path) {
            self.check_min(path, v, min);
        }
    }

    fn check_min(&mut self, path: &str, v: &Value, min: u64) {
        match as_u64(v) {
            Some(n) if n >= min => {}
            Some(n) => self.problem(format!("{path} must be >= {min} (got {n})")),
            None => self.problem(format!("{path} must be an integer")),
        }
    }

    /// Integer within `lo..=hi` when present.
    pub fn optional_range(&mut self, path: &str, lo: u64, hi: u64) {
        if let Some(v) = self.observe(path) {
            match as_u64(v) {
                Some(n) if (lo..=hi).contains(&n) => {}
                _ => self.problem(format!("{path} must be between {lo} and {hi} (got {})", scalar(v))),
            }
        }
    }

    /// Required string from a fixed set, compared case-insensitively.
    pub fn require_in(&mut self, path: &str, allowed: &[&str]) {
        if let Some(v) = self.require(path) {
            self.check_in(path, v, allowed);
        }
    }

    pub fn optional_in(&mut self, path: &str, allowed: &[&str]) {
        if let Some(v) = self.observe(path) {
            self.check_in(path, v, allowed);
        }
    }

    fn check_in(&mut self, path: &str, v: &Value, allowed: &[&str]) {
        let ok = v
            .as_str()
            .is_some_and(|s| allowed.iter().any(|a| a.eq_ignore_ascii_case(s)));
        if !ok {
            self.problem(format!("{path} must be one of {} (got {})", allowed.join(", "), scalar(v)));
        }
    }

    /// Non-empty string when present.
    pub fn optional_str(&mut self, path: &str) {
        if let Some(v) = self.observe(path)
            && !v.as_str().is_some_and(|s| !s.trim().is_empty())
        {
            self.problem(format!("{path} must be a non-empty string"));
        }
    }

    /// Required non-empty array; returns its items.
    pub fn require_items(&mut self, path: &str) -> &'a [Value] {
        match self.require(path) {
            Some(Value::Array(items)) if !items.is_empty() => items.as_slice(),
            Some(_) => {
                self.problem(format!("{path} must be a non-empty list"));
                &[]
            }
            None => &[],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn outcome(self) -> (Status, Value) {
        if self.problems.is_empty() {
            (Status::Success, Value::Object(self.observed))
        } else {
            (Status::Error, Value::String(self.problems.join("; ")))
        }
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substatus_mapping() {
        assert_eq!(map_status_str("Running"), Status::Success);
        assert_eq!(map_status_str("OK"), Status::Success);
        assert_eq!(map_status_str("Recovering"), Status::Warning);
        assert_eq!(map_status_str("Failed"), Status::Error);
        assert_eq!(map_status_str("Mystery"), Status::Warning);
    }

    #[test]
    fn test_both_substatuses_missing_is_error() {
        let (status, _) = resource_status(&json!({}), false);
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn test_runtime_and_provisioning_combined_by_worst() {
        let raw = json!({
            "runtimeStatus": {"status": "Running"},
            "provisioningStatus": {"status": "Failed", "statusDescription": "image pull"}
        });
        let (status, value) = resource_status(&raw, false);
        assert_eq!(status, Status::Error);
        assert!(value["provisioningStatus"].get("statusDescription").is_none());
    }

    #[test]
    fn test_verbose_attaches_description() {
        let raw = json!({"runtimeStatus": {"status": "Running", "statusDescription": "all good"}});
        let (status, value) = resource_status(&raw, true);
        assert_eq!(status, Status::Warning);
        assert_eq!(value["runtimeStatus"]["statusDescription"], "all good");
    }

    #[test]
    fn test_one_of_outcomes() {
        let fields = ["automatic", "manual"];
        assert_eq!(one_of_outcome(&["manual"], &fields).0, Status::Success);
        let (status, value) = one_of_outcome(&[], &fields);
        assert_eq!(status, Status::Error);
        assert_eq!(value, json!("none of automatic, manual is set"));
        let (status, value) = one_of_outcome(&fields, &fields);
        assert_eq!(status, Status::Error);
        assert!(value.as_str().unwrap().starts_with("2 of"));
    }

    #[test]
    fn test_group_by_namespace_keeps_order() {
        let groups = group_by_namespace(vec![
            json!({"metadata": {"name": "a", "namespace": "ns2"}}),
            json!({"metadata": {"name": "b", "namespace": "ns1"}}),
            json!({"metadata": {"name": "c", "namespace": "ns2"}}),
        ]);
        let keys: Vec<&str> = groups.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["ns2", "ns1"]);
        assert_eq!(groups["ns2"].len(), 2);
    }

    #[test]
    fn test_spec_probe_collects_problems() {
        let raw = json!({"spec": {"image": "img", "instances": 0, "protocol": "v4"}});
        let r = Resource::new(&raw);
        let mut probe = SpecProbe::new(&r);
        probe.require_str("spec.image");
        probe.require_min("spec.instances", 1);
        probe.require_in("spec.protocol", &["v3", "v5"]);
        probe.require("spec.endpoint");
        assert!(!probe.is_clean());
        let (status, value) = probe.outcome();
        assert_eq!(status, Status::Error);
        let msg = value.as_str().unwrap();
        assert!(msg.contains("spec.instances must be >= 1"));
        assert!(msg.contains("missing spec.endpoint"));
    }

    #[test]
    fn test_spec_probe_success_value_lists_observed() {
        let raw = json!({"spec": {"brokerRef": "b1", "port": 1883}});
        let r = Resource::new(&raw);
        let mut probe = SpecProbe::new(&r);
        probe.require_str("spec.brokerRef");
        probe.optional_range("spec.port", 1, 65535);
        let (status, value) = probe.outcome();
        assert_eq!(status, Status::Success);
        assert_eq!(value, json!({"spec.brokerRef": "b1", "spec.port": 1883}));
    }
}
