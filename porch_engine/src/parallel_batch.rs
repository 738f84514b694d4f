// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `ParallelBatch`: concurrent composition. Fans children out, waits for
//! all of them, and aggregates in declaration order regardless of
//! completion order. Does not apply per-child run-conditions (the notion
//! of "previous sibling" is ill-defined under concurrency) and does not
//! honor a child's `new_cwd` (no ordering between siblings to propagate to).

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::base::{BaseNode, RunDecision};
use crate::reporter::{ChildReporter, SharedReporter};
use crate::result::{PreviousCommandStatus, Result};
use crate::runnable::{cancelled_before_run, RunContext, Results, Runnable};

pub struct ParallelBatch {
    base: BaseNode,
    children: Mutex<Vec<Arc<dyn Runnable>>>,
}

impl ParallelBatch {
    pub fn new(label: impl Into<String>, children: Vec<Arc<dyn Runnable>>) -> Arc<Self> {
        let batch = Arc::new(ParallelBatch {
            base: BaseNode::new(label),
            children: Mutex::new(children),
        });
        let weak_self: Weak<dyn Runnable> = Arc::downgrade(&batch);
        for child in batch.children.lock().iter() {
            child.set_parent(weak_self.clone());
        }
        batch
    }
}

#[async_trait]
impl Runnable for ParallelBatch {
    async fn run(&self, ctx: RunContext) -> Results {
        if ctx.is_cancelled() {
            return vec![cancelled_before_run(&ctx, &self.base.label())];
        }

        let children = self.children.lock().clone();
        let parent_env = self.base.env_snapshot();
        for child in &children {
            child.inherit_env(&parent_env);
            if let Some(reporter) = self.base.reporter() {
                child.set_progress_reporter(Some(Arc::new(ChildReporter::new(
                    reporter,
                    self.base.label(),
                ))));
            }
        }

        let launches = children.iter().map(|child| child.run(ctx.child()));
        let per_child_results = futures::future::join_all(launches).await;
        let child_results: Vec<Result> = per_child_results.into_iter().flatten().collect();

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
        let batch = ParallelBatch::new(self.base.label(), cloned_children);
        batch.base.set_cwd(self.base.raw_cwd());
        batch.base.inherit_env(&self.base.env_snapshot());
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os_command::OSCommand;
    use crate::result::ResultStatus;
    use crate::signal::SignalBroker;
    use std::time::Instant;

    #[tokio::test]
    async fn two_sleeps_run_concurrently_and_preserve_order() {
        let batch = ParallelBatch::new(
            "p",
            vec![
                Arc::new(OSCommand::new("a", "/bin/sleep", vec!["0.1".into()])),
                Arc::new(OSCommand::new("b", "/bin/sleep", vec!["0.1".into()])),
            ],
        );
        let start = Instant::now();
        let results = batch
            .run(RunContext::new(Arc::new(SignalBroker::new())))
            .await;
        assert!(start.elapsed().as_secs_f64() < 0.18);
        let outer = &results[0];
        assert_eq!(outer.status, ResultStatus::Success);
        assert_eq!(outer.children.len(), 2);
        assert_eq!(outer.children[0].label, "a");
        assert_eq!(outer.children[1].label, "b");
    }
}
