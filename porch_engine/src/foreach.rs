// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `ForEachCommand`: materializes one `SerialBatch` per item produced by an
//! `ItemsProvider`, then executes the materialized batches serially or in
//! parallel.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::base::{BaseNode, RunDecision};
use crate::error::{BoxError, RunError};
use crate::parallel_batch::ParallelBatch;
use crate::reporter::{SharedReporter, TransparentReporter};
use crate::result::{PreviousCommandStatus, Result};
use crate::runnable::{cancelled_before_run, RunContext, Results, Runnable};
use crate::serial_batch::SerialBatch;
use crate::util::join_cwd;

#[async_trait]
pub trait ItemsProvider: Send + Sync {
    async fn items(&self, ctx: RunContext, cwd: String) -> std::result::Result<Vec<String>, BoxError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForEachMode {
    Serial,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CwdStrategy {
    None,
    ItemRelative,
}

pub type ErrorClassPredicate = Arc<dyn Fn(&BoxError) -> bool + Send + Sync>;

pub struct ForEachCommand {
    base: BaseNode,
    items_provider: Arc<dyn ItemsProvider>,
    commands: Vec<Arc<dyn Runnable>>,
    mode: ForEachMode,
    cwd_strategy: CwdStrategy,
    items_skip_on_errors: Vec<ErrorClassPredicate>,
}

impl ForEachCommand {
    pub fn new(
        label: impl Into<String>,
        items_provider: Arc<dyn ItemsProvider>,
        commands: Vec<Arc<dyn Runnable>>,
        mode: ForEachMode,
        cwd_strategy: CwdStrategy,
    ) -> Self {
        ForEachCommand {
            base: BaseNode::new(label),
            items_provider,
            commands,
            mode,
            cwd_strategy,
            items_skip_on_errors: Vec::new(),
        }
    }

    pub fn with_items_skip_on_errors(mut self, predicates: Vec<ErrorClassPredicate>) -> Self {
        self.items_skip_on_errors = predicates;
        self
    }

    fn materialize_batch(&self, item: &str) -> Arc<dyn Runnable> {
        let cloned_children: Vec<Arc<dyn Runnable>> =
            self.commands.iter().map(|c| c.deep_clone()).collect();
        let batch = SerialBatch::new(format!("[{item}]"), cloned_children);
        batch.set_env_var("ITEM", item);
        batch.inherit_env(&self.base.env_snapshot());
        match self.cwd_strategy {
            CwdStrategy::None => {}
            CwdStrategy::ItemRelative => {
                batch.set_cwd(join_cwd(&self.base.resolve_cwd(), item));
            }
        }
        batch
    }
}

#[async_trait]
impl Runnable for ForEachCommand {
    async fn run(&self, ctx: RunContext) -> Results {
        if ctx.is_cancelled() {
            return vec![cancelled_before_run(&ctx, &self.base.label())];
        }

        let label = self.base.label();
        let cwd = self.base.resolve_cwd();
        let items = match self.items_provider.items(ctx.child(), cwd).await {
            Ok(items) => items,
            Err(e) => {
                if self.items_skip_on_errors.iter().any(|pred| pred(&e)) {
                    return vec![Result::skipped(
                        label,
                        Box::new(RunError::ItemsProviderFailed(e.to_string())),
                    )];
                }
                return vec![Result::error(
                    label,
                    -1,
                    Box::new(RunError::ItemsProviderFailed(e.to_string())),
                )];
            }
        };

        if items.is_empty() {
            return vec![Result::success(label)];
        }

        let batches: Vec<Arc<dyn Runnable>> = items
            .iter()
            .map(|item| self.materialize_batch(item))
            .collect();

        let wrapper: Arc<dyn Runnable> = match self.mode {
            ForEachMode::Serial => SerialBatch::new(label, batches),
            ForEachMode::Parallel => ParallelBatch::new(label, batches),
        };

        if let Some(parent) = self.base.parent() {
            wrapper.set_parent(Arc::downgrade(&parent));
        }
        if let Some(reporter) = self.base.reporter() {
            wrapper.set_progress_reporter(Some(Arc::new(TransparentReporter::new(reporter))));
        }

        wrapper.run(ctx.child()).await
    }

    fn label(&self) -> String {
        self.base.label()
    }

    fn cwd(&self) -> String {
        self.base.resolve_cwd()
    }

    fn set_cwd(&self, cwd: String) {
        self.base.set_cwd(cwd);
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
        let cloned_commands: Vec<Arc<dyn Runnable>> =
            self.commands.iter().map(|c| c.deep_clone()).collect();
        let clone = ForEachCommand {
            base: BaseNode::new(self.base.label()),
            items_provider: self.items_provider.clone(),
            commands: cloned_commands,
            mode: self.mode,
            cwd_strategy: self.cwd_strategy,
            items_skip_on_errors: self.items_skip_on_errors.clone(),
        };
        clone.base.set_cwd(self.base.raw_cwd());
        clone.base.inherit_env(&self.base.env_snapshot());
        Arc::new(clone)
    }
}

/// Walks a directory (optionally including hidden entries) up to a maximum
/// depth, yielding paths relative to the walked root.
pub struct DirectoryItemsProvider {
    pub max_depth: usize,
    pub include_hidden: bool,
}

impl DirectoryItemsProvider {
    pub fn new(max_depth: usize, include_hidden: bool) -> Self {
        DirectoryItemsProvider {
            max_depth,
            include_hidden,
        }
    }
}

#[async_trait]
impl ItemsProvider for DirectoryItemsProvider {
    async fn items(&self, _ctx: RunContext, cwd: String) -> std::result::Result<Vec<String>, BoxError> {
        let max_depth = self.max_depth;
        let include_hidden = self.include_hidden;
        tokio::task::spawn_blocking(move || {
            let mut items = Vec::new();
            let walker = walkdir::WalkDir::new(&cwd).max_depth(max_depth).into_iter();
            for entry in walker.filter_entry(|e| {
                include_hidden
                    || e.file_name()
                        .to_str()
                        .map(|name| !name.starts_with('.'))
                        .unwrap_or(true)
            }) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    let relative = entry.path().strip_prefix(&cwd).unwrap_or(entry.path());
                    items.push(relative.to_string_lossy().into_owned());
                }
            }
            Ok(items)
        })
        .await
        .map_err(|e| Box::new(RunError::ItemsProviderFailed(e.to_string())) as BoxError)?
        .map_err(|e: walkdir::Error| Box::new(RunError::ItemsProviderFailed(e.to_string())) as BoxError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_command::FunctionCommand;
    use crate::os_command::OSCommand;
    use crate::result::ResultStatus;
    use crate::signal::SignalBroker;

    struct StaticItems(Vec<String>);

    #[async_trait]
    impl ItemsProvider for StaticItems {
        async fn items(&self, _ctx: RunContext, _cwd: String) -> std::result::Result<Vec<String>, BoxError> {
            Ok(self.0.clone())
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(Arc::new(SignalBroker::new()))
    }

    #[tokio::test]
    async fn empty_items_yields_single_success_with_no_children() {
        let foreach = ForEachCommand::new(
            "each",
            Arc::new(StaticItems(vec![])),
            vec![],
            ForEachMode::Serial,
            CwdStrategy::None,
        );
        let results = foreach.run(ctx()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Success);
        assert!(results[0].children.is_empty());
    }

    #[tokio::test]
    async fn three_items_run_in_parallel_each_echoing_its_item() {
        let template: Vec<Arc<dyn Runnable>> = vec![Arc::new(OSCommand::new(
            "echo",
            "/bin/sh",
            vec!["-c".into(), "echo $ITEM".into()],
        ))];
        let foreach = ForEachCommand::new(
            "each",
            Arc::new(StaticItems(vec!["x".into(), "y".into(), "z".into()])),
            template,
            ForEachMode::Parallel,
            CwdStrategy::None,
        );
        let results = foreach.run(ctx()).await;
        let outer = &results[0];
        assert_eq!(outer.status, ResultStatus::Success);
        assert_eq!(outer.children.len(), 3);
        for (i, item) in ["x", "y", "z"].iter().enumerate() {
            let batch_out = String::from_utf8_lossy(&outer.children[i].children[0].stdout);
            assert!(batch_out.contains(item));
        }
    }

    #[tokio::test]
    async fn deep_clone_does_not_share_template_state() {
        let template: Vec<Arc<dyn Runnable>> =
            vec![Arc::new(FunctionCommand::noop("f", porch_task_executor::Executor::new()))];
        let foreach = ForEachCommand::new(
            "each",
            Arc::new(StaticItems(vec!["a".into(), "b".into()])),
            template,
            ForEachMode::Serial,
            CwdStrategy::None,
        );
        let first = foreach.materialize_batch("a");
        let second = foreach.materialize_batch("b");
        assert_ne!(first.label(), second.label());
    }
}
