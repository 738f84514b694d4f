// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Hand-rolled error types for the engine.
//!
//! The engine does not reach for a derive-macro error crate: every error
//! type here implements `Display`/`std::error::Error` directly, the way the
//! rest of this codebase's process-supervision layer does. Errors are
//! stored boxed inside a `Result` (see `crate::result`) rather than as a
//! single enum, because two of them — [`SkipIntentional`] and
//! [`SkipOnError`] — are not failures at all: they are markers read back out
//! of a `Success` result by the run-condition state machine.

use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures that occur before a child process ever starts running.
#[derive(Debug)]
pub enum SpawnError {
    CouldNotStartProcess(String),
    FailedToCreatePipe(String),
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::CouldNotStartProcess(msg) => {
                write!(f, "could not start process: {msg}")
            }
            SpawnError::FailedToCreatePipe(msg) => write!(f, "failed to create pipe: {msg}"),
        }
    }
}

impl std::error::Error for SpawnError {}

/// Abnormal conditions observed after a child process has started, or while
/// a composite is assembling its children's results.
#[derive(Debug)]
pub enum RunError {
    BufferOverflow { pipe: &'static str, cap: usize },
    FailedToReadBuffer(String),
    WaitFailed(String),
    FunctionPanicked(String),
    TimeoutExceeded,
    SignalReceived(i32),
    DuplicateSignalReceived(i32),
    ItemsProviderFailed(String),
    ChildrenHaveErrors,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::BufferOverflow { pipe, cap } => {
                write!(f, "{pipe} exceeded the {cap}-byte capture buffer and was truncated")
            }
            RunError::FailedToReadBuffer(msg) => write!(f, "failed to read child output: {msg}"),
            RunError::WaitFailed(msg) => write!(f, "failed to wait for child process: {msg}"),
            RunError::FunctionPanicked(msg) => write!(f, "function command panicked: {msg}"),
            RunError::TimeoutExceeded => write!(f, "exceeded the configured timeout"),
            RunError::SignalReceived(sig) => write!(f, "forwarded signal {sig} to child"),
            RunError::DuplicateSignalReceived(sig) => {
                write!(f, "received signal {sig} a second time, forcefully killed child")
            }
            RunError::ItemsProviderFailed(msg) => write!(f, "items provider failed: {msg}"),
            RunError::ChildrenHaveErrors => write!(f, "one or more children have errors"),
        }
    }
}

impl std::error::Error for RunError {}

/// Marks a `Success` result as an instruction to skip the remainder of the
/// enclosing `SerialBatch`. Produced by an `OSCommand` whose exit code
/// matched `skip_exit_codes`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipIntentional;

impl fmt::Display for SkipIntentional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "intentional skip")
    }
}

impl std::error::Error for SkipIntentional {}

/// Synthesized by a `SerialBatch` for a child whose run-condition required
/// an error that did not occur on the preceding sibling.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipOnError;

impl fmt::Display for SkipOnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped: preceding sibling did not error")
    }
}

impl std::error::Error for SkipOnError {}

/// What a binary-deserialized `Result`'s error becomes: the original error
/// *type* cannot be reconstructed, only its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedError(pub String);

impl fmt::Display for DecodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DecodedError {}

/// True if `err` (or a source in its chain) is the [`SkipIntentional`] marker.
pub fn is_skip_intentional(err: &BoxError) -> bool {
    err.downcast_ref::<SkipIntentional>().is_some()
}

/// True if `err` is the [`SkipOnError`] marker.
pub fn is_skip_on_error(err: &BoxError) -> bool {
    err.downcast_ref::<SkipOnError>().is_some()
}
