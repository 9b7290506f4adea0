//! Terminal rendering of a [`Report`]. Pure: returns text, never prints.

use std::fmt::Write as _;

use owo_colors::OwoColorize;
use serde_json::Value;

use crate::check::{ALL_NAMESPACES, Check, Evaluation, Report, TargetEntry};
use crate::display::{Display, Tone};
use crate::projection::scalar;
use crate::status::{DetailLevel, Status};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub detail: DetailLevel,
    pub color: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            detail: DetailLevel::Summary,
            color: true,
        }
    }
}

/* ============================= STYLE ============================= */

pub fn glyph(status: Status) -> &'static str {
    match status {
        Status::Success => "✔",
        Status::Warning => "⚠",
        Status::Error => "✖",
        Status::Skipped => "○",
    }
}

fn paint_status(text: &str, status: Status, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match status {
        Status::Success => text.green().to_string(),
        Status::Warning => text.yellow().to_string(),
        Status::Error => text.red().to_string(),
        Status::Skipped => text.dimmed().to_string(),
    }
}

fn paint(text: &str, tone: Tone, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match tone {
        Tone::Plain => text.to_string(),
        Tone::Header => text.bold().to_string(),
        Tone::Label => text.cyan().to_string(),
        Tone::Value => text.bright_blue().to_string(),
        Tone::Muted => text.dimmed().to_string(),
        Tone::Status(status) => paint_status(text, status, true),
    }
}

fn render_display(display: &Display, base_indent: usize, color: bool) -> String {
    let mut line = " ".repeat(base_indent + display.indent);
    for span in &display.spans {
        line.push_str(&paint(&span.text, span.tone, color));
    }
    line
}

/* ============================= REPORT ============================= */

/// Evaluation counts per status across the whole report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub success: usize,
    pub warning: usize,
    pub error: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn of(report: &Report) -> Self {
        let mut counts = Self::default();
        for evaluation in report.checks().flat_map(Check::evaluations) {
            match evaluation.status {
                Status::Success => counts.success += 1,
                Status::Warning => counts.warning += 1,
                Status::Error => counts.error += 1,
                Status::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Success => self.success,
            Status::Warning => self.warning,
            Status::Error => self.error,
            Status::Skipped => self.skipped,
        }
    }
}

pub fn render_report(report: &Report, opts: &RenderOptions) -> String {
    let mut out = String::new();
    if let Some(title) = &report.title {
        let _ = writeln!(out, "{}", paint(title, Tone::Header, opts.color));
        let _ = writeln!(out);
    }

    let sections = [
        ("Pre-deployment checks", &report.pre_deployment),
        ("Post-deployment checks", &report.post_deployment),
    ];
    for (heading, checks) in sections {
        if checks.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}", paint(heading, Tone::Header, opts.color));
        for check in checks.iter() {
            out.push_str(&render_check(check, opts));
        }
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    }

    out.push_str(&render_summary(&StatusCounts::of(report), opts.color));
    out
}

pub fn render_check(check: &Check, opts: &RenderOptions) -> String {
    let mut out = String::new();
    let head = format!("{} {}", glyph(check.status), check.description);
    let _ = writeln!(out, "{}", paint_status(&head, check.status, opts.color));
    if opts.detail == DetailLevel::Summary {
        return out;
    }

    for (target, namespace, entry) in check.entries() {
        if ns_is_real(namespace) {
            let _ = writeln!(
                out,
                "  {} {}",
                paint("Namespace:", Tone::Label, opts.color),
                paint(namespace, Tone::Value, opts.color)
            );
        }
        if entry.displays.is_empty() {
            render_evaluations(&mut out, target, entry, opts);
        } else {
            for display in &entry.displays {
                let _ = writeln!(out, "{}", render_display(display, 4, opts.color));
            }
            if opts.detail.is_verbose() {
                render_evaluations(&mut out, target, entry, opts);
            }
        }
    }
    out
}

fn ns_is_real(namespace: &str) -> bool {
    namespace != ALL_NAMESPACES
}

fn render_evaluations(out: &mut String, target: &str, entry: &TargetEntry, opts: &RenderOptions) {
    for (condition, evaluation) in entry.pairs() {
        let _ = writeln!(out, "    {}", evaluation_line(target, condition, evaluation, opts.color));
        if opts.detail.is_verbose() && is_structured(&evaluation.value) {
            for line in yaml_lines(&evaluation.value) {
                let _ = writeln!(out, "        {}", paint(&line, Tone::Muted, opts.color));
            }
        }
    }
}

/// `✔ target: condition = value` on one line.
pub fn evaluation_line(target: &str, condition: &str, evaluation: &Evaluation, color: bool) -> String {
    let mark = paint_status(glyph(evaluation.status), evaluation.status, color);
    let subject = match &evaluation.name {
        Some(name) => format!("{target} [{name}]"),
        None => target.to_string(),
    };
    let value = if is_structured(&evaluation.value) {
        compact(&evaluation.value)
    } else {
        scalar(&evaluation.value)
    };
    format!(
        "{mark} {}: {} {}",
        paint(&subject, Tone::Label, color),
        condition,
        paint(&value, Tone::Value, color)
    )
}

fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn yaml_lines(value: &Value) -> Vec<String> {
    match serde_yaml::to_string(value) {
        Ok(text) => text.lines().map(str::to_string).collect(),
        Err(_) => vec![compact(value)],
    }
}

pub fn render_summary(counts: &StatusCounts, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", paint("Summary", Tone::Header, color));
    let mut parts = Vec::new();
    for status in Status::ALL {
        let text = format!("{} {} {}", glyph(status), counts.get(status), status);
        parts.push(paint_status(&text, status, color));
    }
    let _ = writeln!(out, "  {}", parts.join("   "));
    out
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckManager;
    use serde_json::json;

    fn sample_report() -> Report {
        let mut m = CheckManager::new("evalBrokers", "Evaluate MQTT broker");
        m.add_condition_eval(
            "brokers.az-edge.com",
            "ns1",
            "len(brokers)==1",
            Evaluation::new(Status::Success, 1),
        );
        m.add_condition_eval(
            "brokers.az-edge.com",
            "ns1",
            "status",
            Evaluation::new(Status::Warning, json!({"runtimeStatus": {"status": "Starting"}})).named("b1"),
        );
        Report {
            title: None,
            pre_deployment: Vec::new(),
            post_deployment: vec![m.into_check()],
        }
    }

    fn plain(detail: DetailLevel) -> RenderOptions {
        RenderOptions { detail, color: false }
    }

    #[test]
    fn test_summary_level_shows_only_check_line() {
        let text = render_check(&sample_report().post_deployment[0], &plain(DetailLevel::Summary));
        assert_eq!(text, "⚠ Evaluate MQTT broker\n");
    }

    #[test]
    fn test_detail_level_shows_evaluations() {
        let text = render_check(&sample_report().post_deployment[0], &plain(DetailLevel::Detail));
        assert!(text.contains("Namespace: ns1"));
        assert!(text.contains("✔ brokers.az-edge.com: len(brokers)==1 1"));
        assert!(text.contains("⚠ brokers.az-edge.com [b1]: status"));
        assert!(!text.contains("runtimeStatus:\n"));
    }

    #[test]
    fn test_verbose_level_prints_yaml() {
        let text = render_check(&sample_report().post_deployment[0], &plain(DetailLevel::Verbose));
        assert!(text.contains("        runtimeStatus:"));
        assert!(text.contains("          status: Starting"));
    }

    #[test]
    fn test_displays_replace_evaluation_lines() {
        let mut m = CheckManager::new("evalK8sVers", "Evaluate Kubernetes server");
        m.add_condition_eval("k8s", ALL_NAMESPACES, "(k8s version)>=1.20", Evaluation::new(Status::Success, "1.27"));
        m.add_display("k8s", ALL_NAMESPACES, Display::new(0).plain("Require k8s >=1.20, detected 1.27"));
        let text = render_check(&m.into_check(), &plain(DetailLevel::Detail));
        assert!(text.contains("    Require k8s >=1.20, detected 1.27"));
        assert!(!text.contains("(k8s version)"));
        assert!(!text.contains("Namespace:"));
    }

    #[test]
    fn test_summary_counts() {
        let report = sample_report();
        let counts = StatusCounts::of(&report);
        assert_eq!(counts, StatusCounts { success: 1, warning: 1, error: 0, skipped: 0 });
        let text = render_report(&report, &plain(DetailLevel::Summary));
        assert!(text.contains("✔ 1 success"));
        assert!(text.contains("✖ 0 error"));
    }

    #[test]
    fn test_color_only_when_enabled() {
        let colored = paint_status("x", Status::Error, true);
        assert!(colored.contains('\x1b'));
        assert_eq!(paint_status("x", Status::Error, false), "x");
    }
}
