// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `OSCommand`: supervises a single external process — pipes, signal
//! escalation, timeout, exit-code classification.

use std::collections::HashSet;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use nix::sys::signal::Signal;
use tokio::process::{Child, Command as TokioCommand};
use tokio_util::codec::{BytesCodec, FramedRead};

use crate::base::{BaseNode, RunDecision};
use crate::error::{RunError, SkipIntentional, SpawnError};
use crate::process_group::{signal_from_raw, signal_process_group, spawn_in_new_process_group};
use crate::reporter::{Event, EventType, SharedReporter};
use crate::result::{PreviousCommandStatus, Result, ResultStatus};
use crate::runnable::{cancelled_before_run, RunContext, Results, Runnable};

/// Per-pipe capture cap (see §5 "Buffer limits").
pub const MAX_PIPE_BUFFER: usize = 8 * 1024 * 1024;
/// "Still running" heartbeat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

pub type CleanupFn = Arc<
    dyn Fn(RunContext) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

pub struct OSCommand {
    base: BaseNode,
    path: String,
    args: Vec<String>,
    success_exit_codes: Vec<i32>,
    skip_exit_codes: Vec<i32>,
    cleanup: Option<CleanupFn>,
}

impl OSCommand {
    pub fn new(label: impl Into<String>, path: impl Into<String>, args: Vec<String>) -> Self {
        OSCommand {
            base: BaseNode::new(label),
            path: path.into(),
            args,
            success_exit_codes: vec![0],
            skip_exit_codes: Vec::new(),
            cleanup: None,
        }
    }

    pub fn with_success_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.success_exit_codes = codes;
        self
    }

    pub fn with_skip_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.skip_exit_codes = codes;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupFn) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    pub fn with_runs_on_condition(self, condition: crate::base::RunsOnCondition) -> Self {
        self.base.set_runs_on_condition(condition);
        self
    }

    fn build_command(&self) -> TokioCommand {
        let basename = Path::new(&self.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.clone());

        let mut command = TokioCommand::new(&self.path);
        command.arg0(basename);
        command.args(&self.args);
        command.current_dir(self.base.resolve_cwd());
        command.envs(self.base.env_snapshot());
        command.stdin(Stdio::inherit());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command
    }

    fn report(&self, event_type: EventType, message: impl Into<String>) {
        if let Some(reporter) = self.base.reporter() {
            reporter.report(Event::new(vec![self.base.label()], event_type, message));
        }
    }
}

async fn capture_pipe(
    pipe: impl tokio::io::AsyncRead + Unpin,
    pipe_name: &'static str,
) -> (Vec<u8>, Option<RunError>) {
    let mut buf = BytesMut::new();
    let mut overflowed = false;
    let mut read_error = None;
    let mut stream = FramedRead::new(pipe, BytesCodec::new());
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                if buf.len() >= MAX_PIPE_BUFFER {
                    overflowed = true;
                    continue;
                }
                let remaining = MAX_PIPE_BUFFER - buf.len();
                if bytes.len() > remaining {
                    buf.extend_from_slice(&bytes[..remaining]);
                    overflowed = true;
                } else {
                    buf.extend_from_slice(&bytes);
                }
            }
            Err(e) => {
                read_error = Some(e.to_string());
                break;
            }
        }
    }
    let err = if let Some(msg) = read_error {
        Some(RunError::FailedToReadBuffer(msg))
    } else if overflowed {
        Some(RunError::BufferOverflow {
            pipe: pipe_name,
            cap: MAX_PIPE_BUFFER,
        })
    } else {
        None
    };
    (buf.to_vec(), err)
}

enum WatchdogOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    DuplicateSignal(i32),
}

async fn supervise(child: &mut Child, ctx: &RunContext) -> (WatchdogOutcome, Option<i32>) {
    let subscription = ctx.signal_broker.subscribe();
    let mut forwarded_signals: HashSet<i32> = HashSet::new();
    let mut last_forwarded: Option<i32> = None;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_PERIOD);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancellation.cancelled() => {
                let _ = child.start_kill();
                return (WatchdogOutcome::TimedOut, last_forwarded);
            }

            maybe_signal = subscription.recv() => {
                let Some(sig) = maybe_signal else { continue };
                if forwarded_signals.contains(&sig) {
                    let _ = signal_process_group(child, Signal::SIGKILL);
                    return (WatchdogOutcome::DuplicateSignal(sig), last_forwarded);
                }
                forwarded_signals.insert(sig);
                last_forwarded = Some(sig);
                let _ = signal_process_group(child, signal_from_raw(sig));
            }

            status = child.wait() => {
                return (WatchdogOutcome::Exited(status), last_forwarded);
            }

            _ = heartbeat.tick() => {
                log::debug!("still running");
            }
        }
    }
}

#[async_trait]
impl Runnable for OSCommand {
    async fn run(&self, ctx: RunContext) -> Results {
        if ctx.is_cancelled() {
            return vec![cancelled_before_run(&ctx, &self.base.label())];
        }

        self.report(EventType::Started, "starting process");

        let mut child = match spawn_in_new_process_group(self.build_command()) {
            Ok(child) => child,
            Err(e) => {
                let result = Result::error(
                    self.base.label(),
                    -1,
                    Box::new(SpawnError::CouldNotStartProcess(e.to_string())),
                );
                self.report(EventType::Failed, e.to_string());
                return vec![result];
            }
        };

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let stdout_task = tokio::spawn(capture_pipe(stdout, "stdout"));
        let stderr_task = tokio::spawn(capture_pipe(stderr, "stderr"));

        let (outcome, last_signal) = supervise(&mut child, &ctx).await;

        let (stdout, stdout_err) = stdout_task.await.unwrap_or_default();
        let (stderr, stderr_err) = stderr_task.await.unwrap_or_default();

        if let Some(cleanup) = &self.cleanup {
            cleanup(ctx.child()).await;
        }

        let mut result = Result::new(self.base.label());
        result.stdout = stdout;
        result.stderr = stderr;

        match outcome {
            WatchdogOutcome::TimedOut => {
                result.exit_code = -1;
                result.status = ResultStatus::Error;
                result.error = Some(Box::new(RunError::TimeoutExceeded));
                self.report(EventType::Failed, "timed out");
            }
            WatchdogOutcome::DuplicateSignal(sig) => {
                result.exit_code = -1;
                result.status = ResultStatus::Error;
                result.error = Some(Box::new(RunError::DuplicateSignalReceived(sig)));
                self.report(EventType::Failed, format!("received signal {sig} twice"));
            }
            WatchdogOutcome::Exited(wait_result) => {
                match wait_result {
                    Err(e) => {
                        result.exit_code = -1;
                        result.status = ResultStatus::Error;
                        result.error = Some(Box::new(RunError::WaitFailed(e.to_string())));
                        self.report(EventType::Failed, e.to_string());
                    }
                    Ok(status) => {
                        let code = status
                            .code()
                            .or_else(|| status.signal().map(|s| -s))
                            .unwrap_or(-1);
                        if let Some(sig) = last_signal {
                            result.exit_code = -1;
                            result.status = ResultStatus::Error;
                            result.error = Some(Box::new(RunError::SignalReceived(sig)));
                            self.report(EventType::Failed, format!("forwarded signal {sig}"));
                        } else if self.success_exit_codes.contains(&code) {
                            result.exit_code = code;
                            result.status = ResultStatus::Success;
                            self.report(EventType::Completed, "completed");
                        } else if self.skip_exit_codes.contains(&code) {
                            result.exit_code = code;
                            result.status = ResultStatus::Success;
                            result.error = Some(Box::new(SkipIntentional));
                            self.report(EventType::Skipped, "intentional skip");
                        } else {
                            result.exit_code = code;
                            result.status = ResultStatus::Error;
                            self.report(EventType::Failed, format!("exit code {code}"));
                        }
                    }
                }
            }
        }

        if let Some(e) = stdout_err.or(stderr_err) {
            if result.status != ResultStatus::Error {
                result.status = ResultStatus::Error;
                result.exit_code = result.exit_code.max(-1);
            }
            result.error = Some(Box::new(e));
        }

        vec![result]
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
        let clone = OSCommand {
            base: BaseNode::new(self.base.label()),
            path: self.path.clone(),
            args: self.args.clone(),
            success_exit_codes: self.success_exit_codes.clone(),
            skip_exit_codes: self.skip_exit_codes.clone(),
            cleanup: self.cleanup.clone(),
        };
        clone.base.set_cwd(self.base.raw_cwd());
        clone.base.inherit_env(&self.base.env_snapshot());
        clone.base.set_runs_on_condition(self.base.runs_on_condition());
        clone.base.set_runs_on_exit_codes(self.base.runs_on_exit_codes());
        Arc::new(clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalBroker;

    fn ctx() -> RunContext {
        RunContext::new(Arc::new(SignalBroker::new()))
    }

    #[tokio::test]
    async fn echo_succeeds_with_captured_stdout() {
        let cmd = OSCommand::new("e1", "/bin/echo", vec!["ok".to_string()]);
        let results = cmd.run(ctx()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Success);
        assert_eq!(results[0].exit_code, 0);
        assert!(String::from_utf8_lossy(&results[0].stdout).contains("ok"));
    }

    #[tokio::test]
    async fn nonzero_exit_not_in_success_set_is_error() {
        let cmd = OSCommand::new("bad", "/usr/bin/false", vec![]);
        let results = cmd.run(ctx()).await;
        assert_eq!(results[0].status, ResultStatus::Error);
    }

    #[tokio::test]
    async fn exit_code_in_skip_set_yields_intentional_skip_marker() {
        let cmd = OSCommand::new("s", "/bin/sh", vec!["-c".to_string(), "exit 123".to_string()])
            .with_skip_exit_codes(vec![123]);
        let results = cmd.run(ctx()).await;
        assert_eq!(results[0].status, ResultStatus::Success);
        assert_eq!(results[0].exit_code, 123);
        assert!(crate::error::is_skip_intentional(
            results[0].error.as_ref().unwrap()
        ));
    }

    #[tokio::test]
    async fn adding_exit_code_to_success_set_makes_it_succeed() {
        let cmd = OSCommand::new("s", "/bin/sh", vec!["-c".to_string(), "exit 2".to_string()])
            .with_success_exit_codes(vec![0, 2]);
        let results = cmd.run(ctx()).await;
        assert_eq!(results[0].status, ResultStatus::Success);
        assert_eq!(results[0].exit_code, 2);
    }

    #[tokio::test]
    async fn cancelled_before_run_returns_single_error_result() {
        let context = ctx();
        context.cancellation.cancel();
        let cmd = OSCommand::new("c", "/bin/echo", vec!["never".to_string()]);
        let results = cmd.run(context).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Error);
    }
}
