// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `SerialBatch`: ordered composition. Feeds each child the previous
//! child's status, and propagates a `FunctionCommand`'s directory change
//! forward to the remaining siblings.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::base::{BaseNode, RunDecision};
use crate::error::{is_skip_intentional, SkipIntentional, SkipOnError};
use crate::reporter::{ChildReporter, SharedReporter};
use crate::result::{PreviousCommandStatus, Result, ResultStatus};
use crate::runnable::{cancelled_before_run, RunContext, Results, Runnable};

pub struct SerialBatch {
    base: BaseNode,
    children: Mutex<Vec<Arc<dyn Runnable>>>,
}

impl SerialBatch {
    /// Builds a `SerialBatch` owning `children`, with each child's parent
    /// pointer set to the new batch.
    pub fn new(label: impl Into<String>, children: Vec<Arc<dyn Runnable>>) -> Arc<Self> {
        let batch = Arc::new(SerialBatch {
            base: BaseNode::new(label),
            children: Mutex::new(children),
        });
        let weak_self: Weak<dyn Runnable> = Arc::downgrade(&batch);
        for child in batch.children.lock().iter() {
            child.set_parent(weak_self.clone());
        }
        batch
    }

    pub fn set_env_var(&self, key: impl Into<String>, value: impl Into<String>) {
        self.base.set_env_var(key, value);
    }
}

#[async_trait]
impl Runnable for SerialBatch {
    async fn run(&self, ctx: RunContext) -> Results {
        if ctx.is_cancelled() {
            return vec![cancelled_before_run(&ctx, &self.base.label())];
        }

        let children = self.children.lock().clone();
        let parent_env = self.base.env_snapshot();
        let mut prev = PreviousCommandStatus::initial();
        let mut child_results: Vec<Result> = Vec::new();

        for (i, child) in children.iter().enumerate() {
            if ctx.is_cancelled() {
                break;
            }

            child.inherit_env(&parent_env);
            if let Some(reporter) = self.base.reporter() {
                child.set_progress_reporter(Some(Arc::new(ChildReporter::new(
                    reporter,
                    self.base.label(),
                ))));
            }

            match child.should_run(&prev) {
                RunDecision::Skip => {
                    child_results.push(Result::skipped(child.label(), Box::new(SkipIntentional)));
                    prev = PreviousCommandStatus {
                        state: ResultStatus::Skipped,
                        exit_code: prev.exit_code,
                        err: Some(Box::new(SkipIntentional)),
                    };
                }
                RunDecision::Error => {
                    child_results.push(Result::skipped(child.label(), Box::new(SkipOnError)));
                    prev = PreviousCommandStatus {
                        state: ResultStatus::Skipped,
                        exit_code: prev.exit_code,
                        err: Some(Box::new(SkipOnError)),
                    };
                }
                RunDecision::Run => {
                    let mut results = child.run(ctx.child()).await;
                    if let Some(first) = results.first() {
                        let is_intentional = first
                            .error
                            .as_ref()
                            .map(is_skip_intentional)
                            .unwrap_or(false);
                        let new_cwd = first.new_cwd.clone();
                        prev = PreviousCommandStatus {
                            state: first.status,
                            exit_code: first.exit_code,
                            err: if is_intentional {
                                Some(Box::new(SkipIntentional))
                            } else {
                                None
                            },
                        };
                        if let Some(new_cwd) = new_cwd {
                            for remaining in children.iter().skip(i + 1) {
                                remaining.set_cwd(new_cwd.clone());
                            }
                        }
                    } else {
                        prev = PreviousCommandStatus::initial();
                    }
                    child_results.append(&mut results);
                }
            }
        }

        vec![Result::aggregate(self.base.label(), child_results)]
    }

    fn label(&self) -> String {
        self.base.label()
    }

    fn cwd(&self) -> String {
        self.base.resolve_cwd()
    }

    fn set_cwd(&self, cwd: String) {
        self.base.set_cwd(cwd.clone());
        for child in self.children.lock().iter() {
            child.set_cwd(cwd.clone());
        }
    }

    fn inherit_env(&self, parent_env: &HashMap<String, String>) {
        self.base.inherit_env(parent_env);
    }

    fn set_parent(&self, parent: Weak<dyn Runnable>) {
        self.base.set_parent(parent);
    }

    fn parent(&self) -> Option<Arc<dyn Runnable>> {
        self.base.parent()
    }

    fn should_run(&self, prev: &PreviousCommandStatus) -> RunDecision {
        self.base.should_run(prev)
    }

    fn set_progress_reporter(&self, reporter: Option<SharedReporter>) {
        self.base.set_progress_reporter(reporter);
    }

    fn deep_clone(&self) -> Arc<dyn Runnable> {
        let cloned_children: Vec<Arc<dyn Runnable>> = self
            .children
            .lock()
            .iter()
            .map(|c| c.deep_clone())
            .collect();
        let batch = SerialBatch::new(self.base.label(), cloned_children);
        batch.base.set_cwd(self.base.raw_cwd());
        batch.base.inherit_env(&self.base.env_snapshot());
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os_command::OSCommand;
    use crate::signal::SignalBroker;

    fn ctx() -> RunContext {
        RunContext::new(Arc::new(SignalBroker::new()))
    }

    #[tokio::test]
    async fn echo_fail_echo_produces_expected_tree() {
        let batch = SerialBatch::new(
            "outer",
            vec![
                Arc::new(OSCommand::new("e1", "/bin/echo", vec!["ok".into()])),
                Arc::new(OSCommand::new("bad", "/usr/bin/false", vec![])),
                Arc::new(OSCommand::new("e2", "/bin/echo", vec!["never".into()])),
            ],
        );
        let results = batch.run(ctx()).await;
        let outer = &results[0];
        assert_eq!(outer.status, ResultStatus::Error);
        assert_eq!(outer.exit_code, -1);
        assert_eq!(outer.children.len(), 3);
        assert_eq!(outer.children[0].status, ResultStatus::Success);
        assert!(String::from_utf8_lossy(&outer.children[0].stdout).contains("ok"));
        assert_eq!(outer.children[1].status, ResultStatus::Error);
        assert_eq!(outer.children[2].status, ResultStatus::Skipped);
    }

    #[tokio::test]
    async fn skip_on_exit_code_skips_remaining_siblings() {
        let batch = SerialBatch::new(
            "outer",
            vec![
                Arc::new(
                    OSCommand::new("a", "/bin/sh", vec!["-c".into(), "exit 123".into()])
                        .with_skip_exit_codes(vec![123]),
                ),
                Arc::new(
                    OSCommand::new("b", "/bin/echo", vec!["hi".into()])
                        .with_runs_on_condition(crate::base::RunsOnCondition::Success),
                ),
            ],
        );
        let results = batch.run(ctx()).await;
        let outer = &results[0];
        assert_eq!(outer.status, ResultStatus::Success);
        assert_eq!(outer.exit_code, 0);
        assert_eq!(outer.children[0].status, ResultStatus::Success);
        assert_eq!(outer.children[1].status, ResultStatus::Skipped);
    }
}
