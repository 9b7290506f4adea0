use serde::{Deserialize, Serialize};

use crate::status::Status;

/// Semantic style of a span. The renderer maps tones to colors; evaluators never
/// emit terminal escape codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Plain,
    Header,
    Label,
    Value,
    Muted,
    Status(Status),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub tone: Tone,
}

/// One line of human-readable output attached to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Display {
    pub indent: usize,
    pub spans: Vec<Span>,
}

impl Display {
    pub fn new(indent: usize) -> Self {
        Self { indent, spans: Vec::new() }
    }

    /// A single plain line.
    pub fn line(indent: usize, text: impl Into<String>) -> Self {
        Self::new(indent).plain(text)
    }

    /// `label: value` line.
    pub fn field(indent: usize, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(indent).label(label).plain(": ").value(value)
    }

    pub fn push(mut self, text: impl Into<String>, tone: Tone) -> Self {
        self.spans.push(Span { text: text.into(), tone });
        self
    }

    pub fn plain(self, text: impl Into<String>) -> Self {
        self.push(text, Tone::Plain)
    }

    pub fn header(self, text: impl Into<String>) -> Self {
        self.push(text, Tone::Header)
    }

    pub fn label(self, text: impl Into<String>) -> Self {
        self.push(text, Tone::Label)
    }

    pub fn value(self, text: impl Into<String>) -> Self {
        self.push(text, Tone::Value)
    }

    pub fn muted(self, text: impl Into<String>) -> Self {
        self.push(text, Tone::Muted)
    }

    pub fn status(self, text: impl Into<String>, status: Status) -> Self {
        self.push(text, Tone::Status(status))
    }

    /// Text with styling removed.
    pub fn plain_text(&self) -> String {
        let body: String = self.spans.iter().map(|s| s.text.as_str()).collect();
        format!("{}{}", " ".repeat(self.indent), body)
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_plain_text() {
        let d = Display::field(4, "Port", "1883");
        assert_eq!(d.plain_text(), "    Port: 1883");
    }

    #[test]
    fn test_builder_keeps_span_order() {
        let d = Display::new(0)
            .plain("Broker ")
            .value("b1")
            .status(" detected", Status::Success);
        let tones: Vec<Tone> = d.spans.iter().map(|s| s.tone).collect();
        assert_eq!(tones, vec![Tone::Plain, Tone::Value, Tone::Status(Status::Success)]);
    }
}
