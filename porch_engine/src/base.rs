// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `BaseNode`: the identity/state every concrete node embeds — label, cwd,
//! run-condition, environment, parent back-reference, and progress
//! reporter. Concrete node types (`OSCommand`, `FunctionCommand`, the
//! batches) hold one of these and delegate the shared `Runnable` methods to
//! it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::reporter::SharedReporter;
use crate::result::PreviousCommandStatus;
use crate::runnable::Runnable;
use crate::util::join_cwd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunsOnCondition {
    Always,
    Success,
    Error,
    ExitCodes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    Run,
    Skip,
    Error,
}

pub struct BaseNode {
    label: Mutex<String>,
    cwd: Mutex<String>,
    runs_on_condition: Mutex<RunsOnCondition>,
    runs_on_exit_codes: Mutex<Vec<i32>>,
    env: Mutex<HashMap<String, String>>,
    parent: Mutex<Weak<dyn Runnable>>,
    reporter: Mutex<Option<SharedReporter>>,
}

impl BaseNode {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let label = if label.is_empty() {
            "Command".to_string()
        } else {
            label
        };
        BaseNode {
            label: Mutex::new(label),
            cwd: Mutex::new(String::new()),
            runs_on_condition: Mutex::new(RunsOnCondition::Success),
            runs_on_exit_codes: Mutex::new(vec![0]),
            env: Mutex::new(HashMap::new()),
            parent: Mutex::new(Weak::new()),
            reporter: Mutex::new(None),
        }
    }

    pub fn label(&self) -> String {
        self.label.lock().clone()
    }

    /// Implements the §4.1 cwd resolution algorithm.
    pub fn resolve_cwd(&self) -> String {
        let cwd = self.cwd.lock().clone();
        let parent = self.parent.lock().upgrade();
        if cwd.is_empty() {
            return match parent {
                Some(parent) => parent.cwd(),
                None => ".".to_string(),
            };
        }
        if Path::new(&cwd).is_absolute() {
            return cwd;
        }
        match parent {
            Some(parent) => join_cwd(&parent.cwd(), &cwd),
            None => join_cwd(".", &cwd),
        }
    }

    pub fn set_cwd(&self, cwd: impl Into<String>) {
        *self.cwd.lock() = cwd.into();
    }

    /// The stored cwd exactly as set, without resolving against the parent.
    /// Used by `deep_clone` implementations, which must copy the raw field
    /// rather than the resolved value (the clone's parent differs from the
    /// original's).
    pub fn raw_cwd(&self) -> String {
        self.cwd.lock().clone()
    }

    pub fn inherit_env(&self, parent_env: &HashMap<String, String>) {
        let mut env = self.env.lock();
        for (k, v) in parent_env {
            env.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn env_snapshot(&self) -> HashMap<String, String> {
        self.env.lock().clone()
    }

    pub fn set_env_var(&self, key: impl Into<String>, value: impl Into<String>) {
        self.env.lock().insert(key.into(), value.into());
    }

    pub fn set_parent(&self, parent: Weak<dyn Runnable>) {
        *self.parent.lock() = parent;
    }

    pub fn parent(&self) -> Option<Arc<dyn Runnable>> {
        self.parent.lock().upgrade()
    }

    pub fn set_progress_reporter(&self, reporter: Option<SharedReporter>) {
        *self.reporter.lock() = reporter;
    }

    pub fn reporter(&self) -> Option<SharedReporter> {
        self.reporter.lock().clone()
    }

    pub fn runs_on_condition(&self) -> RunsOnCondition {
        *self.runs_on_condition.lock()
    }

    pub fn set_runs_on_condition(&self, condition: RunsOnCondition) {
        *self.runs_on_condition.lock() = condition;
    }

    pub fn runs_on_exit_codes(&self) -> Vec<i32> {
        self.runs_on_exit_codes.lock().clone()
    }

    pub fn set_runs_on_exit_codes(&self, codes: Vec<i32>) {
        *self.runs_on_exit_codes.lock() = codes;
    }

    /// The §4.2 run-condition state machine.
    pub fn should_run(&self, prev: &PreviousCommandStatus) -> RunDecision {
        match self.runs_on_condition() {
            RunsOnCondition::Always => RunDecision::Run,
            RunsOnCondition::Success => {
                if prev.state == crate::result::ResultStatus::Success {
                    let is_intentional_skip = prev
                        .err
                        .as_ref()
                        .map(crate::error::is_skip_intentional)
                        .unwrap_or(false);
                    if is_intentional_skip {
                        RunDecision::Skip
                    } else {
                        RunDecision::Run
                    }
                } else {
                    RunDecision::Error
                }
            }
            RunsOnCondition::Error => {
                if prev.state == crate::result::ResultStatus::Error {
                    RunDecision::Run
                } else {
                    RunDecision::Error
                }
            }
            RunsOnCondition::ExitCodes => {
                if self.runs_on_exit_codes().contains(&prev.exit_code) {
                    RunDecision::Run
                } else {
                    RunDecision::Skip
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ResultStatus;

    #[test]
    fn empty_label_defaults_to_command() {
        let base = BaseNode::new("");
        assert_eq!(base.label(), "Command");
    }

    #[test]
    fn default_run_condition_is_success() {
        let base = BaseNode::new("n");
        assert_eq!(base.runs_on_condition(), RunsOnCondition::Success);
    }

    #[test]
    fn cwd_with_no_parent_and_empty_stored_cwd_is_dot() {
        let base = BaseNode::new("n");
        assert_eq!(base.resolve_cwd(), ".");
    }

    #[test]
    fn absolute_cwd_is_returned_verbatim() {
        let base = BaseNode::new("n");
        base.set_cwd("/abs/path");
        assert_eq!(base.resolve_cwd(), "/abs/path");
    }

    #[test]
    fn inherit_env_never_overwrites_child_keys() {
        let base = BaseNode::new("n");
        base.set_env_var("A", "child");
        let mut parent_env = HashMap::new();
        parent_env.insert("A".to_string(), "parent".to_string());
        parent_env.insert("B".to_string(), "parent".to_string());
        base.inherit_env(&parent_env);
        let env = base.env_snapshot();
        assert_eq!(env.get("A").unwrap(), "child");
        assert_eq!(env.get("B").unwrap(), "parent");
    }

    #[test]
    fn should_run_always_runs_regardless_of_previous_state() {
        let base = BaseNode::new("n");
        base.set_runs_on_condition(RunsOnCondition::Always);
        let prev = PreviousCommandStatus {
            state: ResultStatus::Error,
            exit_code: 1,
            err: None,
        };
        assert_eq!(base.should_run(&prev), RunDecision::Run);
    }

    #[test]
    fn should_run_exit_codes_skips_when_not_listed() {
        let base = BaseNode::new("n");
        base.set_runs_on_condition(RunsOnCondition::ExitCodes);
        base.set_runs_on_exit_codes(vec![0]);
        let prev = PreviousCommandStatus {
            state: ResultStatus::Success,
            exit_code: 5,
            err: None,
        };
        assert_eq!(base.should_run(&prev), RunDecision::Skip);
    }
}
