// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Small path and label helpers shared by the node implementations.

use std::path::{Path, PathBuf};

/// Joins `base` and `child` the way `BaseNode::cwd` resolution requires:
/// if `child` is absolute it wins outright, otherwise it is appended to
/// `base`.
pub fn join_cwd(base: &str, child: &str) -> String {
    if child.is_empty() {
        return base.to_string();
    }
    if Path::new(child).is_absolute() {
        return child.to_string();
    }
    let joined: PathBuf = Path::new(base).join(child);
    joined.to_string_lossy().into_owned()
}

/// Builds a dotted/braced full label for a node given its ancestor chain,
/// outermost first. Used by progress reporters when rendering an event
/// path as a single string for logs.
pub fn render_path(segments: &[String]) -> String {
    segments.join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_cwd_passes_through_absolute_child() {
        assert_eq!(join_cwd("/base", "/abs"), "/abs");
    }

    #[test]
    fn join_cwd_appends_relative_child() {
        assert_eq!(join_cwd("/base", "child"), "/base/child");
    }

    #[test]
    fn join_cwd_with_empty_child_keeps_base() {
        assert_eq!(join_cwd("/base", ""), "/base");
    }
}
