// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Literal end-to-end scenarios from the engine's testable-properties
//! section, exercised as integration tests against the public API rather
//! than from within each module's own `#[cfg(test)]` block.

use std::sync::Arc;
use std::time::Duration;

use porch_engine::{
    copy_cwd_to_temp, OSCommand, ResultStatus, RunContext, Runnable, SerialBatch, SignalBroker,
};

fn ctx() -> RunContext {
    RunContext::new(Arc::new(SignalBroker::new()))
}

#[tokio::test]
async fn copy_cwd_to_temp_then_pwd_runs_in_the_published_directory() {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("marker.txt"), b"hello").unwrap();

    let copy = copy_cwd_to_temp("copy", porch_task_executor::Executor::new());
    let pwd = OSCommand::new("pwd", "/bin/sh", vec!["-c".to_string(), "pwd".to_string()]);

    let batch = SerialBatch::new(
        "outer",
        vec![Arc::new(copy), Arc::new(pwd)],
    );
    batch.set_cwd(source.path().to_string_lossy().into_owned());

    let results = batch.run(ctx()).await;
    let outer = &results[0];
    assert_eq!(outer.status, ResultStatus::Success);
    assert_eq!(outer.children.len(), 2);

    let copy_result = &outer.children[0];
    assert_eq!(copy_result.status, ResultStatus::Success);
    let new_cwd = copy_result
        .new_cwd
        .as_ref()
        .expect("copy_cwd_to_temp publishes new_cwd");
    assert!(std::path::Path::new(new_cwd).join("marker.txt").exists());

    let pwd_result = &outer.children[1];
    assert_eq!(pwd_result.status, ResultStatus::Success);
    let printed = String::from_utf8_lossy(&pwd_result.stdout);
    assert_eq!(printed.trim_end(), new_cwd.as_str());
}

#[tokio::test]
async fn sigint_then_second_sigint_escalates_to_duplicate_signal() {
    let broker = Arc::new(SignalBroker::new());
    let sleeper = OSCommand::new("sleeper", "/bin/sleep", vec!["10".to_string()]);
    let context = RunContext::new(broker.clone());

    let run = tokio::spawn({
        let context = context.clone();
        async move { sleeper.run(context).await }
    });

    // Give the child a moment to actually spawn before signaling it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    broker.deliver_for_test(libc::SIGINT);
    tokio::time::sleep(Duration::from_millis(100)).await;
    broker.deliver_for_test(libc::SIGINT);

    let results = run.await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ResultStatus::Error);
}
