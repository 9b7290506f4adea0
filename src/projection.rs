use serde_json::Value;

use crate::display::Display;
use crate::resource::lookup;
use crate::status::DetailLevel;

/// Strings longer than this are moved onto their own indented line.
const LONG_STRING: usize = 50;

/// One projected field of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    pub path: &'static str,
    pub label: &'static str,
    pub verbose_only: bool,
}

impl PropertySpec {
    pub const fn new(path: &'static str, label: &'static str) -> Self {
        Self { path, label, verbose_only: false }
    }

    pub const fn verbose(path: &'static str, label: &'static str) -> Self {
        Self { path, label, verbose_only: true }
    }
}

/// Project `specs` from `resource` into display lines at `indent`.
///
/// Missing paths are skipped. Verbose-only specs are skipped below
/// [`DetailLevel::Verbose`].
pub fn project(resource: &Value, specs: &[PropertySpec], level: DetailLevel, indent: usize) -> Vec<Display> {
    let mut out = Vec::new();
    for spec in specs {
        if spec.verbose_only && !level.is_verbose() {
            continue;
        }
        let Some(value) = lookup(resource, spec.path) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        project_value(&mut out, spec.label, value, indent);
    }
    out
}

fn project_value(out: &mut Vec<Display>, label: &str, value: &Value, indent: usize) {
    match value {
        Value::Object(map) => {
            out.push(Display::new(indent).label(label));
            for (key, nested) in map {
                project_value(out, key, nested, indent + 4);
            }
        }
        Value::Array(items) if items.iter().any(Value::is_object) => {
            out.push(Display::new(indent).label(label));
            for (i, item) in items.iter().enumerate() {
                out.push(Display::new(indent + 2).muted(format!("- [{i}]")));
                match item {
                    Value::Object(map) => {
                        for (key, nested) in map {
                            project_value(out, key, nested, indent + 6);
                        }
                    }
                    other => out.push(Display::new(indent + 6).value(scalar(other))),
                }
            }
        }
        Value::Array(items) => {
            let joined: Vec<String> = items.iter().map(scalar).collect();
            out.push(Display::field(indent, label, joined.join(", ")));
        }
        Value::String(s) if s.chars().count() > LONG_STRING => {
            out.push(Display::new(indent).label(label).plain(":"));
            out.push(Display::new(indent + 4).value(s.clone()));
        }
        other => out.push(Display::field(indent, label, scalar(other))),
    }
}

/// Single-line text for a scalar value.
pub fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/* ============================= TESTS ============================= */
