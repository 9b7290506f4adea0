use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::display::Display;
use crate::status::{Status, worst_of};

/* ============================= CONSTANTS ============================= */

/// Namespace key for cluster-scoped or cross-namespace targets.
pub const ALL_NAMESPACES: &str = "_all_";

/* ============================= DATA MODEL ============================= */

/// One observation, positionally matched to the condition at the same index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Evaluation {
    pub fn new(status: Status, value: impl Into<Value>) -> Self {
        Self {
            status,
            value: value.into(),
            name: None,
            kind: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn of_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub conditions: Vec<String>,
    pub evaluations: Vec<Evaluation>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub displays: Vec<Display>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TargetEntry {
    /// Pairs of `(condition, evaluation)` in positional order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &Evaluation)> {
        self.conditions
            .iter()
            .map(String::as_str)
            .zip(self.evaluations.iter())
    }

    pub fn is_consistent(&self) -> bool {
        self.conditions.len() == self.evaluations.len()
    }
}

/// Targets keyed by name, then by namespace key.
pub type Targets = IndexMap<String, IndexMap<String, TargetEntry>>;

/// The result of a single named check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub description: String,
    pub targets: Targets,
    pub status: Status,
}

impl Check {
    pub fn target(&self, target: &str, namespace: &str) -> Option<&TargetEntry> {
        self.targets.get(target).and_then(|ns| ns.get(namespace))
    }

    /// Every `(target, namespace, entry)` triple in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &TargetEntry)> {
        self.targets.iter().flat_map(|(target, namespaces)| {
            namespaces
                .iter()
                .map(move |(ns, entry)| (target.as_str(), ns.as_str(), entry))
        })
    }

    pub fn evaluations(&self) -> impl Iterator<Item = &Evaluation> {
        self.entries().flat_map(|(_, _, entry)| entry.evaluations.iter())
    }

    /// Worst status over every recorded evaluation.
    pub fn evaluated_status(&self) -> Status {
        worst_of(self.evaluations().map(|e| e.status))
    }

    pub fn without_displays(&self) -> Check {
        let mut copy = self.clone();
        for namespaces in copy.targets.values_mut() {
            for entry in namespaces.values_mut() {
                entry.displays.clear();
            }
        }
        copy
    }
}

/// The output of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub pre_deployment: Vec<Check>,
    pub post_deployment: Vec<Check>,
}

impl Report {
    /// Pre-deployment checks first, then post-deployment.
    pub fn checks(&self) -> impl Iterator<Item = &Check> {
        self.pre_deployment.iter().chain(self.post_deployment.iter())
    }

    pub fn status(&self) -> Status {
        worst_of(self.checks().map(|c| c.status))
    }

    pub fn as_record(&self, include_displays: bool) -> Report {
        if include_displays {
            return self.clone();
        }
        Report {
            title: self.title.clone(),
            pre_deployment: self.pre_deployment.iter().map(Check::without_displays).collect(),
            post_deployment: self.post_deployment.iter().map(Check::without_displays).collect(),
        }
    }

    /// Machine-readable form. Displays are always stripped.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.as_record(false))
    }
}

/* ============================= CHECK MANAGER ============================= */

/// Builder for a single check result.
///
/// Every status change goes through the same algebra: the namespace entry and the
/// check each keep the worst status they have ever seen.
#[derive(Debug, Clone)]
pub struct CheckManager {
    check: Check,
}

impl CheckManager {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            check: Check {
                name: name.into(),
                description: description.into(),
                targets: IndexMap::new(),
                status: Status::Success,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.check.name
    }

    pub fn status(&self) -> Status {
        self.check.status
    }

    fn entry(&mut self, target: &str, namespace: &str) -> &mut TargetEntry {
        self.check
            .targets
            .entry(target.to_string())
            .or_default()
            .entry(namespace.to_string())
            .or_default()
    }

    /// Create the `(target, namespace)` entry. Calling it again replaces the conditions
    /// and keeps any evaluations already recorded.
    pub fn add_target<I, S>(
        &mut self,
        target: &str,
        namespace: &str,
        conditions: I,
        description: Option<&str>,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.entry(target, namespace);
        entry.conditions = conditions.into_iter().map(Into::into).collect();
        if let Some(d) = description {
            entry.description = Some(d.to_string());
        }
    }

    pub fn add_target_conditions<I, S>(&mut self, target: &str, namespace: &str, conditions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry(target, namespace)
            .conditions
            .extend(conditions.into_iter().map(Into::into));
    }

    pub fn set_target_conditions<I, S>(&mut self, target: &str, namespace: &str, conditions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry(target, namespace).conditions = conditions.into_iter().map(Into::into).collect();
    }

    pub fn add_target_eval(&mut self, target: &str, namespace: &str, evaluation: Evaluation) {
        let status = evaluation.status;
        self.entry(target, namespace).evaluations.push(evaluation);
        self.set_target_status(target, namespace, status);
    }

    /// Append a condition and its evaluation together.
    pub fn add_condition_eval(
        &mut self,
        target: &str,
        namespace: &str,
        condition: impl Into<String>,
        evaluation: Evaluation,
    ) {
        self.entry(target, namespace).conditions.push(condition.into());
        self.add_target_eval(target, namespace, evaluation);
    }

    pub fn set_target_status(&mut self, target: &str, namespace: &str, status: Status) {
        let entry = self.entry(target, namespace);
        entry.status = entry.status.worst(status);
        self.check.status = self.check.status.worst(status);
    }

    pub fn add_display(&mut self, target: &str, namespace: &str, display: Display) {
        self.entry(target, namespace).displays.push(display);
    }

    pub fn add_displays<I>(&mut self, target: &str, namespace: &str, displays: I)
    where
        I: IntoIterator<Item = Display>,
    {
        self.entry(target, namespace).displays.extend(displays);
    }

    pub fn as_record(&self, include_displays: bool) -> Check {
        if include_displays {
            self.check.clone()
        } else {
            self.check.without_displays()
        }
    }

    pub fn into_check(self) -> Check {
        self.check
    }
}

/* ============================= TESTS ============================= */
