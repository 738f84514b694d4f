// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A thin binary that builds a small `Runnable` tree directly in Rust code
//! and runs it, the way `process_executor` exercises the engine it sits
//! next to without itself being a configuration-file loader. Porch's
//! configuration-file loader and plugin registry are external collaborators
//! (see `spec.md` §6) and do not live in this crate.
//!
//! Usage:
//!   porch demo          run a small built-in example tree and print its result
//!   porch demo --fail    the same tree, but with a step that fails
//!
//! Exit code is `0` if the tree produced no errors, `1` otherwise, per
//! spec.md §6.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::control::SHOULD_COLORIZE;
use porch_engine::{
    FunctionCommand, OSCommand, ParallelBatch, Result as PorchResult, Runnable, RunContext,
    SerialBatch, SignalBroker, TextFormatOptions,
};

#[derive(Parser)]
#[command(name = "porch", about = "A declarative process orchestrator")]
struct Opt {
    #[command(subcommand)]
    command: Command,

    /// Include each command's captured stdout in the printed result tree.
    #[arg(long, global = true)]
    show_stdout: bool,

    /// Include each command's captured stderr in the printed result tree.
    #[arg(long, global = true)]
    show_stderr: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build and run a small example tree: a serial batch of shell commands
    /// and a parallel batch, wrapped around a `copy_cwd_to_temp` step.
    Demo {
        /// Make the demo's second step fail, to see error propagation.
        #[arg(long)]
        fail: bool,
    },
}

fn build_demo_tree(executor: &porch_task_executor::Executor, fail: bool) -> Arc<dyn Runnable> {
    let second_step = if fail {
        OSCommand::new("might-fail", "/bin/false", vec![])
    } else {
        OSCommand::new("might-fail", "/bin/echo", vec!["still going".to_string()])
    };

    let parallel = ParallelBatch::new(
        "fan-out",
        vec![
            Arc::new(OSCommand::new("sleep-a", "/bin/sleep", vec!["0.05".to_string()])),
            Arc::new(OSCommand::new("sleep-b", "/bin/sleep", vec!["0.05".to_string()])),
        ],
    );

    SerialBatch::new(
        "demo",
        vec![
            Arc::new(FunctionCommand::noop("announce", executor.to_borrowed())),
            Arc::new(second_step),
            parallel,
        ],
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    if std::env::var_os("NO_COLOR").is_some() {
        SHOULD_COLORIZE.set_override(false);
    } else if std::env::var_os("FORCE_COLOR").is_some() {
        SHOULD_COLORIZE.set_override(true);
    }

    let opt = Opt::parse();
    let executor = porch_task_executor::Executor::new();
    let signal_broker = Arc::new(SignalBroker::new());
    if let Err(e) = signal_broker.install() {
        log::warn!("failed to install signal handlers: {e}");
    }

    let Command::Demo { fail } = opt.command;
    let tree = build_demo_tree(&executor, fail);
    let ctx = RunContext::new(signal_broker);
    let results: Vec<PorchResult> = tree.run(ctx).await;

    let options = TextFormatOptions {
        include_stdout: opt.show_stdout,
        include_stderr: opt.show_stderr,
        show_success_details: false,
        color: SHOULD_COLORIZE.should_colorize(),
    };
    for result in &results {
        print!("{}", result.render_text(&options));
    }

    if porch_engine::has_error(&results) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
