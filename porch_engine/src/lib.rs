// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::too_many_arguments, clippy::new_without_default, clippy::redundant_field_names)]

//! The Porch execution engine: a tree of polymorphic `Runnable` nodes
//! (`OSCommand`, `FunctionCommand`, `SerialBatch`, `ParallelBatch`,
//! `ForEachCommand`) plus the `Result` tree they produce.
//!
//! This crate is deliberately silent on how a `Runnable` tree gets built —
//! that is a configuration-loading concern living outside the engine (see
//! `spec.md` §6). Callers construct a tree directly with the node
//! constructors in each module, assign progress reporters and a signal
//! broker, and call [`runnable::Runnable::run`] on the root.

pub mod base;
pub mod error;
pub mod foreach;
pub mod function_command;
pub mod os_command;
pub mod parallel_batch;
pub mod process_group;
pub mod reporter;
pub mod result;
pub mod runnable;
pub mod serial_batch;
pub mod signal;
pub mod util;

pub use base::{BaseNode, RunDecision, RunsOnCondition};
pub use error::{RunError, SkipIntentional, SkipOnError, SpawnError};
pub use foreach::{CwdStrategy, DirectoryItemsProvider, ForEachCommand, ForEachMode, ItemsProvider};
pub use function_command::{copy_cwd_to_temp, FunctionCommand, FunctionOutcome};
pub use os_command::OSCommand;
pub use parallel_batch::ParallelBatch;
pub use reporter::{Event, EventType, Reporter, SharedReporter};
pub use result::{has_error, PreviousCommandStatus, Result, ResultStatus, TextFormatOptions};
pub use runnable::{cancelled_before_run, RunContext, Results, Runnable};
pub use serial_batch::SerialBatch;
pub use signal::SignalBroker;
