// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A process-wide fan-out of OS termination signals to every currently
//! running `OSCommand`.
//!
//! The broker itself never decides to kill anything: it only hands each
//! subscribed command a copy of the signal it observed. Escalation (forward
//! once, force-kill on a repeat) is entirely the subscriber's policy, kept
//! in `os_command`. Isolating the broker behind `subscribe`/`unsubscribe`
//! lets tests drive it with a synthetic signal instead of sending a real one
//! to the test process.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A signal number, using the same representation `nix::sys::signal::Signal`
/// exposes via `as i32` (e.g. `libc::SIGINT`, `libc::SIGTERM`).
pub type SignalNumber = i32;

struct Subscriber {
    sender: mpsc::UnboundedSender<SignalNumber>,
}

/// The live, process-wide set of subscribers. Construct one instance and
/// share it; `OSCommand` instances subscribe for the lifetime of their
/// child process.
pub struct SignalBroker {
    subscribers: Arc<Mutex<Vec<Weak<Subscriber>>>>,
}

/// A subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    _subscriber: Arc<Subscriber>,
    receiver: Mutex<mpsc::UnboundedReceiver<SignalNumber>>,
}

impl Subscription {
    /// Awaits the next signal delivered to this subscriber. Resolves to
    /// `None` only if the broker itself has been dropped.
    pub async fn recv(&self) -> Option<SignalNumber> {
        self.receiver.lock().recv().await
    }
}

impl SignalBroker {
    pub fn new() -> Self {
        SignalBroker {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Spawns a task that listens for SIGINT and SIGTERM on the current
    /// process and fans each one out to every live subscription.
    pub fn install(&self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let subscribers = self.subscribers.clone();
        Ok(tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = sigint.recv() => libc::SIGINT,
                    _ = sigterm.recv() => libc::SIGTERM,
                };
                Self::fan_out(&subscribers, received);
            }
        }))
    }

    fn fan_out(subscribers: &Arc<Mutex<Vec<Weak<Subscriber>>>>, signal_number: SignalNumber) {
        let mut guard = subscribers.lock();
        guard.retain(|weak| {
            if let Some(subscriber) = weak.upgrade() {
                let _ = subscriber.sender.send(signal_number);
                true
            } else {
                false
            }
        });
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriber = Arc::new(Subscriber { sender });
        self.subscribers.lock().push(Arc::downgrade(&subscriber));
        Subscription {
            _subscriber: subscriber,
            receiver: Mutex::new(receiver),
        }
    }

    /// Synthesizes a signal delivery without touching the real process's
    /// signal disposition. Exists so integration tests can drive escalation
    /// deterministically instead of sending a real signal to the test
    /// process (which would affect every other test running in it too).
    pub fn deliver_for_test(&self, signal_number: SignalNumber) {
        Self::fan_out(&self.subscribers, signal_number);
    }
}

impl Default for SignalBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_fanned_out_signals() {
        let broker = SignalBroker::new();
        let sub = broker.subscribe();
        broker.deliver_for_test(libc::SIGINT);
        assert_eq!(sub.recv().await, Some(libc::SIGINT));
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let broker = SignalBroker::new();
        {
            let _sub = broker.subscribe();
            assert_eq!(broker.subscribers.lock().len(), 1);
        }
        broker.deliver_for_test(libc::SIGINT);
        assert_eq!(broker.subscribers.lock().len(), 0);
    }
}
