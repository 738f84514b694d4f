// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The `Runnable` capability and the context threaded through every call to
//! `run`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::base::RunDecision;
use crate::reporter::SharedReporter;
use crate::result::{PreviousCommandStatus, Result};
use crate::signal::SignalBroker;

pub type Results = Vec<Result>;

/// What spec.md calls `ctx`: cooperative cancellation plus a handle to the
/// process-wide signal broker, threaded top-down through every `run` call.
#[derive(Clone)]
pub struct RunContext {
    pub cancellation: CancellationToken,
    pub signal_broker: Arc<SignalBroker>,
}

impl RunContext {
    pub fn new(signal_broker: Arc<SignalBroker>) -> Self {
        RunContext {
            cancellation: CancellationToken::new(),
            signal_broker,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// A `RunContext` that is already cancelled, used by composites to
    /// produce the "cancelled before entering run" result described in
    /// spec §8's boundary behaviors.
    pub fn child(&self) -> RunContext {
        RunContext {
            cancellation: self.cancellation.clone(),
            signal_broker: self.signal_broker.clone(),
        }
    }
}

/// The polymorphic node capability. Every concrete node type (`OSCommand`,
/// `FunctionCommand`, `SerialBatch`, `ParallelBatch`, `ForEachCommand`)
/// implements this.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn run(&self, ctx: RunContext) -> Results;

    fn label(&self) -> String;
    fn cwd(&self) -> String;
    fn set_cwd(&self, cwd: String);
    fn inherit_env(&self, parent_env: &HashMap<String, String>);
    fn set_parent(&self, parent: Weak<dyn Runnable>);
    fn parent(&self) -> Option<Arc<dyn Runnable>>;
    fn should_run(&self, prev: &PreviousCommandStatus) -> RunDecision;
    fn set_progress_reporter(&self, reporter: Option<SharedReporter>);

    /// Produces a fresh node of the same concrete type: scalars and
    /// slice/map-valued fields are copied, function/provider pointers are
    /// shared, children are recursively cloned, and the parent pointer is
    /// left unset (the caller re-establishes it). See §4.10.
    fn deep_clone(&self) -> Arc<dyn Runnable>;
}

/// A context cancelled before any node's `run` observes it: produces the
/// single `Error` result spec §8 requires when a context is already
/// cancelled at entry.
pub fn cancelled_before_run(ctx: &RunContext, label: &str) -> Result {
    debug_assert!(ctx.is_cancelled());
    Result::error(
        label,
        -1,
        Box::new(crate::error::RunError::TimeoutExceeded),
    )
}
