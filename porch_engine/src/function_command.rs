// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `FunctionCommand`: runs an in-process callback with panic recovery and
//! cancellation awareness, optionally publishing a new working directory to
//! its successors.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;

use crate::base::{BaseNode, RunDecision};
use crate::error::{BoxError, RunError};
use crate::reporter::{Event, EventType, SharedReporter};
use crate::result::{PreviousCommandStatus, Result};
use crate::runnable::{cancelled_before_run, RunContext, Results, Runnable};

/// What a function callback produces: an optional cwd redirection and an
/// optional error.
pub struct FunctionOutcome {
    pub new_cwd: Option<String>,
    pub err: Option<BoxError>,
}

impl FunctionOutcome {
    pub fn ok() -> Self {
        FunctionOutcome {
            new_cwd: None,
            err: None,
        }
    }

    pub fn ok_with_new_cwd(new_cwd: impl Into<String>) -> Self {
        FunctionOutcome {
            new_cwd: Some(new_cwd.into()),
            err: None,
        }
    }

    pub fn failed(err: BoxError) -> Self {
        FunctionOutcome {
            new_cwd: None,
            err: Some(err),
        }
    }
}

pub type FunctionFuture = Pin<Box<dyn Future<Output = FunctionOutcome> + Send>>;
pub type FunctionFn = Arc<dyn Fn(RunContext, String) -> FunctionFuture + Send + Sync>;

pub struct FunctionCommand {
    base: BaseNode,
    func: Option<FunctionFn>,
    executor: porch_task_executor::Executor,
}

impl FunctionCommand {
    pub fn new(
        label: impl Into<String>,
        executor: porch_task_executor::Executor,
        func: FunctionFn,
    ) -> Self {
        FunctionCommand {
            base: BaseNode::new(label),
            func: Some(func),
            executor,
        }
    }

    /// A `FunctionCommand` with no callback at all: `run` yields immediate
    /// success with no cwd change, per spec's "nil function" boundary case.
    pub fn noop(label: impl Into<String>, executor: porch_task_executor::Executor) -> Self {
        FunctionCommand {
            base: BaseNode::new(label),
            func: None,
            executor,
        }
    }

    fn report(&self, event_type: EventType, message: impl Into<String>) {
        if let Some(reporter) = self.base.reporter() {
            reporter.report(Event::new(vec![self.base.label()], event_type, message));
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl Runnable for FunctionCommand {
    async fn run(&self, ctx: RunContext) -> Results {
        if ctx.is_cancelled() {
            return vec![cancelled_before_run(&ctx, &self.base.label())];
        }

        let label = self.base.label();
        let Some(func) = self.func.clone() else {
            return vec![Result::success(label)];
        };

        self.report(EventType::Started, "running");

        let cwd = self.base.resolve_cwd();
        let task_ctx = ctx.child();
        let join_handle = self
            .executor
            .native_spawn(async move { std::panic::AssertUnwindSafe(func(task_ctx, cwd)).catch_unwind().await });

        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => {
                self.report(EventType::Failed, "cancelled");
                vec![Result::error(label, -1, Box::new(RunError::TimeoutExceeded))]
            }
            joined = join_handle => {
                match joined {
                    Ok(Ok(outcome)) => {
                        match outcome.err {
                            None => {
                                self.report(EventType::Completed, "completed");
                                let mut result = Result::success(label);
                                result.new_cwd = outcome.new_cwd;
                                vec![result]
                            }
                            Some(err) => {
                                self.report(EventType::Failed, err.to_string());
                                vec![Result::error(label, -1, err)]
                            }
                        }
                    }
                    Ok(Err(panic_payload)) => {
                        let msg = panic_message(panic_payload);
                        self.report(EventType::Failed, msg.clone());
                        vec![Result::error(label, -1, Box::new(RunError::FunctionPanicked(msg)))]
                    }
                    Err(join_err) => {
                        self.report(EventType::Failed, join_err.to_string());
                        vec![Result::error(label, -1, Box::new(RunError::WaitFailed(join_err.to_string())))]
                    }
                }
            }
        }
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

    fn inherit_env(&self, parent_env: &std::collections::HashMap<String, String>) {
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
        let clone = FunctionCommand {
            base: BaseNode::new(self.base.label()),
            func: self.func.clone(),
            executor: self.executor.to_borrowed(),
        };
        clone.base.set_cwd(self.base.raw_cwd());
        clone.base.inherit_env(&self.base.env_snapshot());
        Arc::new(clone)
    }
}

/// Copies the current working directory's tree into a freshly created
/// temporary directory and publishes that directory as `new_cwd`.
pub fn copy_cwd_to_temp(
    label: impl Into<String>,
    executor: porch_task_executor::Executor,
) -> FunctionCommand {
    let func: FunctionFn = Arc::new(|_ctx, cwd| {
        Box::pin(async move {
            let source = cwd.clone();
            let destination = match tokio::task::spawn_blocking(move || copy_tree_to_temp(&source))
                .await
            {
                Ok(Ok(dest)) => dest,
                Ok(Err(e)) => return FunctionOutcome::failed(Box::new(e)),
                Err(join_err) => {
                    return FunctionOutcome::failed(Box::new(RunError::WaitFailed(
                        join_err.to_string(),
                    )))
                }
            };
            FunctionOutcome::ok_with_new_cwd(destination)
        })
    });
    FunctionCommand::new(label, executor, func)
}

#[derive(Debug)]
struct CopyError(String);

impl std::fmt::Display for CopyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to copy cwd to temp: {}", self.0)
    }
}

impl std::error::Error for CopyError {}

fn copy_tree_to_temp(source: &str) -> std::result::Result<String, CopyError> {
    let workdir = tempfile::Builder::new()
        .prefix("porch-")
        .tempdir()
        .map_err(|e| CopyError(e.to_string()))?;
    let destination = workdir.keep();

    for entry in walkdir::WalkDir::new(source) {
        let entry = entry.map_err(|e| CopyError(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| CopyError(e.to_string()))?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| CopyError(e.to_string()))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CopyError(e.to_string()))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| CopyError(e.to_string()))?;
        }
    }

    Ok(destination.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ResultStatus;
    use std::path::Path;

    #[tokio::test]
    async fn noop_function_succeeds_without_changing_cwd() {
        let cmd = FunctionCommand::noop("noop", porch_task_executor::Executor::new());
        let results = cmd
            .run(RunContext::new(Arc::new(crate::signal::SignalBroker::new())))
            .await;
        assert_eq!(results[0].status, ResultStatus::Success);
        assert!(results[0].new_cwd.is_none());
    }

    #[tokio::test]
    async fn function_error_becomes_result_error() {
        let func: FunctionFn = Arc::new(|_ctx, _cwd| {
            Box::pin(async move {
                FunctionOutcome::failed(Box::new(RunError::ItemsProviderFailed("boom".into())))
            })
        });
        let cmd = FunctionCommand::new("f", porch_task_executor::Executor::new(), func);
        let results = cmd
            .run(RunContext::new(Arc::new(crate::signal::SignalBroker::new())))
            .await;
        assert_eq!(results[0].status, ResultStatus::Error);
    }

    #[tokio::test]
    async fn panicking_function_is_caught_and_converted_to_error() {
        let func: FunctionFn = Arc::new(|_ctx, _cwd| Box::pin(async move { panic!("boom") }));
        let cmd = FunctionCommand::new("f", porch_task_executor::Executor::new(), func);
        let results = cmd
            .run(RunContext::new(Arc::new(crate::signal::SignalBroker::new())))
            .await;
        assert_eq!(results[0].status, ResultStatus::Error);
    }

    #[tokio::test]
    async fn copy_cwd_to_temp_publishes_new_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), b"hi").unwrap();
        let cmd = copy_cwd_to_temp("copy", porch_task_executor::Executor::new());
        cmd.set_cwd(dir.path().to_string_lossy().into_owned());
        let results = cmd
            .run(RunContext::new(Arc::new(crate::signal::SignalBroker::new())))
            .await;
        assert_eq!(results[0].status, ResultStatus::Success);
        let new_cwd = results[0].new_cwd.as_ref().unwrap();
        assert!(Path::new(new_cwd).join("file.txt").exists());
    }
}
