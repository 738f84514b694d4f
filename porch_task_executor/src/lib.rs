// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
#![allow(clippy::match_ref_pats)]
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

//! A small wrapper around a shared `tokio` runtime handle.
//!
//! Every node in the engine (`OSCommand`'s watchdog, `FunctionCommand`'s
//! isolated task, the signal broker's fan-out loop) spawns work through this
//! type rather than calling `tokio::spawn` directly, so that a caller can
//! supply either a runtime it owns (a CLI binary) or one it merely borrows
//! (a test harness using `#[tokio::test]`).

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::{JoinError, JoinHandle};

/// Executors come in two flavors:
/// * "borrowed" — created with [`Executor::new`]. Will not be shut down when
///   all handles are dropped; used in unit tests where the `Runtime` is
///   created by `#[tokio::test]`.
/// * "owned" — created with [`Executor::new_owned`]. When all handles are
///   dropped, its `Runtime` is shut down, and [`Executor::shutdown`] can be
///   used to shut it down explicitly.
#[derive(Debug, Clone)]
pub struct Executor {
    runtime: Arc<Mutex<Option<Runtime>>>,
    handle: Handle,
}

impl Executor {
    /// Creates an Executor for an existing `tokio::Runtime` (generally
    /// provided by tokio's macros). The returned Executor has a lifecycle
    /// independent of the Runtime: dropping every clone will not shut it
    /// down, so the caller must keep the Runtime alive for at least as long
    /// as any Executor built from it.
    pub fn new() -> Executor {
        Self {
            runtime: Arc::new(Mutex::new(None)),
            handle: Handle::current(),
        }
    }

    /// Creates an Executor with its own owned multi-threaded `Runtime`.
    pub fn new_owned(num_worker_threads: usize) -> Result<Executor, String> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(num_worker_threads.max(1))
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to start the runtime: {e}"))?;

        let handle = runtime.handle().clone();
        Ok(Executor {
            runtime: Arc::new(Mutex::new(Some(runtime))),
            handle,
        })
    }

    /// Creates a clone of this Executor which is disconnected from shutdown
    /// events. See the `Executor` rustdoc.
    pub fn to_borrowed(&self) -> Executor {
        Self {
            runtime: Arc::new(Mutex::new(None)),
            handle: self.handle.clone(),
        }
    }

    /// Run a Future on the Runtime as a new Task, and return a Future handle
    /// to it. If the background Task panics, `rescue_join_error` converts
    /// the panic into a value of the same type the future would have
    /// produced.
    pub fn spawn<O: Send + 'static, F: Future<Output = O> + Send + 'static>(
        &self,
        future: F,
        rescue_join_error: impl FnOnce(JoinError) -> O,
    ) -> impl Future<Output = O> {
        self.native_spawn(future).map(|res| match res {
            Ok(o) => o,
            Err(e) => rescue_join_error(e),
        })
    }

    /// Run a Future on the Runtime as a new Task, and return a `JoinHandle`.
    pub fn native_spawn<O: Send + 'static, F: Future<Output = O> + Send + 'static>(
        &self,
        future: F,
    ) -> JoinHandle<O> {
        self.handle.spawn(future)
    }

    /// Run a Future and return its resolved Result. Must not be called from
    /// within a Future context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Spawn a blocking closure on the Runtime's blocking threadpool.
    pub fn native_spawn_blocking<F: FnOnce() -> R + Send + 'static, R: Send + 'static>(
        &self,
        f: F,
    ) -> JoinHandle<R> {
        self.handle.spawn_blocking(f)
    }

    /// Return a reference to this executor's runtime handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// A blocking call to shut down the Runtime associated with this "owned"
    /// Executor. If tasks do not shut down within `timeout`, they are
    /// leaked. Has no effect on "borrowed" Executors.
    pub fn shutdown(&self, timeout: Duration) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };

        let start = Instant::now();
        runtime.shutdown_timeout(timeout + Duration::from_millis(250));
        if start.elapsed() > timeout {
            log::warn!("Executor shutdown took unexpectedly long: tasks were likely leaked!");
        }
    }

    /// Returns true if `shutdown` has been called for this Executor. Always
    /// returns true for borrowed Executors.
    pub fn is_shutdown(&self) -> bool {
        self.runtime.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::Executor;
    use std::time::Duration;

    #[tokio::test]
    async fn borrowed_executor_runs_futures() {
        let executor = Executor::new();
        let value = executor.native_spawn(async { 1 + 1 }).await.unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn owned_executor_shuts_down() {
        let executor = Executor::new_owned(1).unwrap();
        assert!(!executor.is_shutdown());
        executor.shutdown(Duration::from_secs(1));
        assert!(executor.is_shutdown());
    }
}
