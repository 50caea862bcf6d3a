//! Failure output reduction.
//!
//! Keeps only the lines of a failure's raw output that look like part of an
//! error report, so the prompt is not flooded with program chatter.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowercase markers that make a line repair-relevant.
pub const DIAGNOSTIC_MARKERS: [&str; 3] = ["error:", "exception:", "traceback"];

/// Repair-relevant lines extracted from a failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    lines: Vec<String>,

    /// True when no marker matched and the raw output was kept as-is.
    pub fallback: bool,
}

impl Diagnostic {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.is_empty())
    }

    /// Lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

fn is_marked(line: &str) -> bool {
    let lower = line.to_lowercase();
    DIAGNOSTIC_MARKERS.iter().any(|m| lower.contains(m))
}

/// Reduce raw failure output to its marked lines, in original order.
///
/// If no line carries a marker the raw text is returned unchanged.
pub fn extract(raw: &str) -> Diagnostic {
    let matched: Vec<String> = raw
        .split('\n')
        .filter(|line| is_marked(line))
        .map(str::to_string)
        .collect();

    if matched.is_empty() {
        return Diagnostic {
            lines: raw.split('\n').map(str::to_string).collect(),
            fallback: true,
        };
    }

    Diagnostic {
        lines: matched,
        fallback: false,
    }
}
