//! Accessors over untyped custom resources.

use serde_json::Value;
use wildmatch::WildMatch;

use crate::check::ALL_NAMESPACES;

/* ============================= ACCESSORS ============================= */

/// Borrowed view of a custom resource as returned by the cluster.
#[derive(Debug, Clone, Copy)]
pub struct Resource<'a> {
    raw: &'a Value,
}

impl<'a> Resource<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &'a Value {
        self.raw
    }

    pub fn name(&self) -> &'a str {
        self.str_at("metadata.name").unwrap_or("")
    }

    /// Namespace, or [`ALL_NAMESPACES`] for cluster-scoped objects.
    pub fn namespace(&self) -> &'a str {
        self.str_at("metadata.namespace").unwrap_or(ALL_NAMESPACES)
    }

    pub fn status(&self) -> Option<&'a Value> {
        self.get("status").filter(|v| v.is_object())
    }

    /// Dotted path lookup, e.g. `spec.tls.automatic`.
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        lookup(self.raw, path)
    }

    pub fn str_at(&self, path: &str) -> Option<&'a str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some_and(|v| !v.is_null())
    }
}

/// Dotted path lookup over any JSON value. Numeric segments index into arrays.
/// Empty path returns the value itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, key| match current {
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        other => other.get(key),
    })
}

/// Integers are sometimes stored as strings in hand-written manifests.
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/* ============================= NAME FILTER ============================= */

/// Case-insensitive glob over `metadata.name` supporting `*` and `?`.
#[derive(Debug)]
pub struct NameFilter {
    matcher: Option<WildMatch>,
}

impl NameFilter {
    pub fn new(pattern: Option<&str>) -> Self {
        Self {
            matcher: pattern
                .filter(|p| !p.is_empty())
                .map(|p| WildMatch::new(&p.to_lowercase())),
        }
    }

    pub fn any() -> Self {
        Self { matcher: None }
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.matcher {
            Some(m) => m.matches(&name.to_lowercase()),
            None => true,
        }
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listener() -> Value {
        json!({
            "metadata": {"name": "l1", "namespace": "ns1"},
            "spec": {"brokerRef": "b1", "port": "1883", "tls": {"automatic": {}}}
        })
    }

    #[test]
    fn test_metadata_accessors() {
        let raw = listener();
        let r = Resource::new(&raw);
        assert_eq!(r.name(), "l1");
        assert_eq!(r.namespace(), "ns1");
        assert!(r.status().is_none());
    }

    #[test]
    fn test_cluster_scoped_namespace() {
        let raw = json!({"metadata": {"name": "x"}});
        assert_eq!(Resource::new(&raw).namespace(), ALL_NAMESPACES);
    }

    #[test]
    fn test_dotted_lookup() {
        let raw = listener();
        let r = Resource::new(&raw);
        assert_eq!(r.str_at("spec.brokerRef"), Some("b1"));
        assert_eq!(r.get("spec.port").and_then(as_u64), Some(1883));
        assert!(r.has("spec.tls.automatic"));
        assert!(!r.has("spec.tls.manual"));
        assert!(lookup(&raw, "spec.missing.deep").is_none());
        let methods = json!({"spec": {"methods": [{"sat": {}}]}});
        assert!(lookup(&methods, "spec.methods.0.sat").is_some());
        assert!(lookup(&methods, "spec.methods.1").is_none());
    }

    #[test]
    fn test_name_filter_glob_case_insensitive() {
        let f = NameFilter::new(Some("Broker-*"));
        assert!(f.matches("broker-east"));
        assert!(f.matches("BROKER-west"));
        assert!(!f.matches("listener"));
        let q = NameFilter::new(Some("b?"));
        assert!(q.matches("b1"));
        assert!(!q.matches("b12"));
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(NameFilter::new(Some("")).matches("anything"));
        assert!(NameFilter::any().matches("anything"));
    }
}
