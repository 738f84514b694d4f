// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The `Result` tree: the structurally-identical mirror of the `Runnable`
//! tree that `run` produces, plus its binary and textual serialization.

use std::fmt::Write as _;

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::error::{BoxError, DecodedError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResultStatus {
    #[default]
    Unknown,
    Success,
    Skipped,
    Warning,
    Error,
}

/// The state handed from one `SerialBatch` child to the next.
#[derive(Debug, Clone)]
pub struct PreviousCommandStatus {
    pub state: ResultStatus,
    pub exit_code: i32,
    pub err: Option<BoxError>,
}

impl PreviousCommandStatus {
    /// The synthetic predecessor seen by the first child of a `SerialBatch`.
    pub fn initial() -> Self {
        PreviousCommandStatus {
            state: ResultStatus::Success,
            exit_code: 0,
            err: None,
        }
    }
}

/// One node's outcome. Mirrors the shape of the `Runnable` that produced it.
#[derive(Debug, Clone)]
pub struct Result {
    pub exit_code: i32,
    pub error: Option<BoxError>,
    pub status: ResultStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub label: String,
    pub children: Vec<Result>,
    /// Populated by a `FunctionCommand` to request that the enclosing
    /// `SerialBatch` redirect the cwd of its remaining siblings.
    pub new_cwd: Option<String>,
}

impl Result {
    pub fn new(label: impl Into<String>) -> Self {
        Result {
            exit_code: 0,
            error: None,
            status: ResultStatus::Unknown,
            stdout: Vec::new(),
            stderr: Vec::new(),
            label: label.into(),
            children: Vec::new(),
            new_cwd: None,
        }
    }

    pub fn success(label: impl Into<String>) -> Self {
        Result {
            status: ResultStatus::Success,
            ..Result::new(label)
        }
    }

    pub fn error(label: impl Into<String>, exit_code: i32, err: BoxError) -> Self {
        Result {
            status: ResultStatus::Error,
            exit_code,
            error: Some(err),
            ..Result::new(label)
        }
    }

    pub fn skipped(label: impl Into<String>, err: BoxError) -> Self {
        Result {
            status: ResultStatus::Skipped,
            error: Some(err),
            ..Result::new(label)
        }
    }

    pub fn has_error(&self) -> bool {
        self.status == ResultStatus::Error || self.children.iter().any(Result::has_error)
    }

    /// Wraps `children` into a single parent result the way `SerialBatch`
    /// and `ParallelBatch` both do: `Error` (with `exit_code = -1` and a
    /// `ChildrenHaveErrors` marker) if any descendant errored, else `Success`.
    pub fn aggregate(label: impl Into<String>, children: Vec<Result>) -> Result {
        let has_error = children.iter().any(Result::has_error);
        let mut parent = Result::new(label);
        parent.status = if has_error {
            ResultStatus::Error
        } else {
            ResultStatus::Success
        };
        parent.exit_code = if has_error { -1 } else { 0 };
        parent.error = if has_error {
            Some(Box::new(crate::error::RunError::ChildrenHaveErrors))
        } else {
            None
        };
        parent.children = children;
        parent
    }

    /// Compact binary encoding, used by [`encode`]/[`decode`].
    fn to_wire(&self) -> WireResult {
        WireResult {
            exit_code: self.exit_code,
            error_message: self.error.as_ref().map(|e| e.to_string()),
            status: self.status,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            label: self.label.clone(),
            children: self.children.iter().map(Result::to_wire).collect(),
            new_cwd: self.new_cwd.clone(),
        }
    }

    fn from_wire(wire: WireResult) -> Result {
        Result {
            exit_code: wire.exit_code,
            error: wire
                .error_message
                .map(|msg| Box::new(DecodedError(msg)) as BoxError),
            status: wire.status,
            stdout: wire.stdout,
            stderr: wire.stderr,
            label: wire.label,
            children: wire.children.into_iter().map(Result::from_wire).collect(),
            new_cwd: wire.new_cwd,
        }
    }

    /// Encodes this result to its compact binary form.
    pub fn encode(&self) -> std::result::Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.to_wire())
    }

    /// Decodes a result previously produced by [`Result::encode`]. Decoded
    /// errors become an opaque [`DecodedError`]: only the message, not the
    /// original error type, survives the round trip.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Result, bincode::Error> {
        bincode::deserialize::<WireResult>(bytes).map(Result::from_wire)
    }

    /// Renders this result (and its subtree) as an indented, optionally
    /// colored tree, per the options supplied.
    pub fn render_text(&self, options: &TextFormatOptions) -> String {
        let mut out = String::new();
        // The generic "children have errors" message is never informative at
        // any ancestor row, root included, so it is suppressed from the very
        // first call rather than only starting at depth 1.
        self.render_into(&mut out, 0, options, true);
        out
    }

    fn render_into(
        &self,
        out: &mut String,
        depth: usize,
        options: &TextFormatOptions,
        suppress_children_error_message: bool,
    ) {
        let indent = "  ".repeat(depth);
        let (glyph, colorize): (&str, fn(&str) -> colored::ColoredString) = match self.status {
            ResultStatus::Success => ("\u{2713}", |s| s.green()),
            ResultStatus::Error => ("\u{2717}", |s| s.red()),
            ResultStatus::Skipped => ("~", |s| s.yellow()),
            ResultStatus::Warning => ("!", |s| s.yellow()),
            ResultStatus::Unknown => ("?", |s| s.normal()),
        };
        let line = if self.exit_code != 0 {
            format!("{glyph} {} (exit code: {})", self.label, self.exit_code)
        } else {
            format!("{glyph} {}", self.label)
        };
        let line = if options.color {
            colorize(&line).to_string()
        } else {
            line
        };
        let _ = writeln!(out, "{indent}{line}");

        if let Some(err) = &self.error {
            let is_children_have_errors =
                err.downcast_ref::<crate::error::RunError>().is_some()
                    && matches!(
                        err.downcast_ref::<crate::error::RunError>(),
                        Some(crate::error::RunError::ChildrenHaveErrors)
                    );
            if !(suppress_children_error_message && is_children_have_errors) {
                let _ = writeln!(out, "{indent}  Error: {err}");
            }
        }

        let show_details = options.show_success_details || self.status != ResultStatus::Success;
        if show_details && options.include_stdout && !self.stdout.is_empty() {
            let _ = writeln!(
                out,
                "{indent}  stdout: {}",
                String::from_utf8_lossy(&self.stdout)
            );
        }
        if show_details && options.include_stderr && !self.stderr.is_empty() {
            let _ = writeln!(
                out,
                "{indent}  stderr: {}",
                String::from_utf8_lossy(&self.stderr)
            );
        }

        for child in &self.children {
            child.render_into(out, depth + 1, options, true);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextFormatOptions {
    pub include_stdout: bool,
    pub include_stderr: bool,
    pub show_success_details: bool,
    pub color: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireResult {
    exit_code: i32,
    error_message: Option<String>,
    status: ResultStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    label: String,
    children: Vec<WireResult>,
    new_cwd: Option<String>,
}

/// `HasError` over a forest, as seen at the top of a `Results` slice.
pub fn has_error(results: &[Result]) -> bool {
    results.iter().any(Result::has_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_is_success_when_no_child_errors() {
        let agg = Result::aggregate("outer", vec![Result::success("a"), Result::success("b")]);
        assert_eq!(agg.status, ResultStatus::Success);
        assert_eq!(agg.exit_code, 0);
    }

    #[test]
    fn aggregate_is_error_when_any_child_errors() {
        let err = Result::error("bad", 1, Box::new(crate::error::RunError::TimeoutExceeded));
        let agg = Result::aggregate("outer", vec![Result::success("a"), err]);
        assert_eq!(agg.status, ResultStatus::Error);
        assert_eq!(agg.exit_code, -1);
        assert!(agg.has_error());
    }

    #[test]
    fn binary_round_trip_preserves_message_not_type() {
        let original = Result::error(
            "leaf",
            7,
            Box::new(crate::error::RunError::TimeoutExceeded),
        );
        let bytes = original.encode().unwrap();
        let decoded = Result::decode(&bytes).unwrap();
        assert_eq!(decoded.exit_code, 7);
        assert_eq!(decoded.label, "leaf");
        assert_eq!(
            decoded.error.unwrap().to_string(),
            original.error.unwrap().to_string()
        );
    }

    #[test]
    fn render_text_includes_exit_code_when_nonzero() {
        let result = Result::error("bad", 2, Box::new(crate::error::RunError::TimeoutExceeded));
        let text = result.render_text(&TextFormatOptions::default());
        assert!(text.contains("exit code: 2"));
    }
}
