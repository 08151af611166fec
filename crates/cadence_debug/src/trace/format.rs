//! Indented rendering of flow traces.

use std::fmt::Write;

use cadence_foundation::Fields;
use cadence_log::{ActionRecord, RecordKind};

use super::{FlowTrace, TraceNode};

// =============================================================================
// Tree Formatter
// =============================================================================

/// Renders a [`FlowTrace`] as an indented tree, one record per line.
///
/// Invocations print as `Concept/action`, completions add their variant.
#[derive(Clone, Debug)]
pub struct TreeFormatter {
    /// Whether to include record ids.
    pub show_ids: bool,
    /// Whether to include timestamps.
    pub show_timestamps: bool,
    /// Whether to include input and output fields.
    pub show_fields: bool,
    /// Whether to include the producing rule.
    pub show_rules: bool,
    /// Spaces per nesting level.
    pub indent: usize,
}

impl Default for TreeFormatter {
    fn default() -> Self {
        Self {
            show_ids: false,
            show_timestamps: false,
            show_fields: false,
            show_rules: false,
            indent: 2,
        }
    }
}

impl TreeFormatter {
    /// Creates a formatter with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to show record ids.
    #[must_use]
    pub fn with_ids(mut self) -> Self {
        self.show_ids = true;
        self
    }

    /// Builder method to show timestamps.
    #[must_use]
    pub fn with_timestamps(mut self) -> Self {
        self.show_timestamps = true;
        self
    }

    /// Builder method to show fields.
    #[must_use]
    pub fn with_fields(mut self) -> Self {
        self.show_fields = true;
        self
    }

    /// Builder method to show rules.
    #[must_use]
    pub fn with_rules(mut self) -> Self {
        self.show_rules = true;
        self
    }

    /// Builder method to set the indent width.
    #[must_use]
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Renders the whole trace.
    #[must_use]
    pub fn format(&self, trace: &FlowTrace) -> String {
        let mut out = String::new();
        for root in trace.roots() {
            self.write_node(&mut out, root, 0);
        }
        // Drop the trailing newline.
        out.pop();
        out
    }

    /// Renders one record without indentation.
    #[must_use]
    pub fn format_record(&self, record: &ActionRecord) -> String {
        let mut line = String::new();

        if self.show_ids {
            let _ = write!(line, "[{}] ", record.id());
        }

        match &record.kind {
            RecordKind::Invocation(inv) => {
                if self.show_timestamps {
                    let _ = write!(line, "{:>10} ", inv.timestamp.to_string());
                }
                let _ = write!(line, "-> {}/{}", inv.concept, inv.action);
                if self.show_fields && !inv.input.is_empty() {
                    let _ = write!(line, " {}", Self::format_fields(&inv.input));
                }
            }
            RecordKind::Completion(c) => {
                if self.show_timestamps {
                    let _ = write!(line, "{:>10} ", c.timestamp.to_string());
                }
                let _ = write!(line, "<- {}/{} {}", c.concept, c.action, c.variant);
                if self.show_fields && !c.output.is_empty() {
                    let _ = write!(line, " {}", Self::format_fields(&c.output));
                }
            }
        }

        if let Some(rule) = record.rule.as_ref().filter(|_| self.show_rules) {
            let _ = write!(line, " (via {rule})");
        }

        line
    }

    fn write_node(&self, out: &mut String, node: &TraceNode, level: usize) {
        let _ = writeln!(
            out,
            "{:width$}{}",
            "",
            self.format_record(&node.record),
            width = level * self.indent
        );
        for child in &node.children {
            self.write_node(out, child, level + 1);
        }
    }

    fn format_fields(fields: &Fields) -> String {
        let parts: Vec<_> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{{{}}}", parts.join(", "))
    }
}

// =============================================================================
// Tests
// =============================================================================
