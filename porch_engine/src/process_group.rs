// Copyright 2026 Porch project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Process-group helpers so a forwarded or escalated signal reaches a
//! child's own descendants (e.g. a shell's children) and not just the
//! immediate child.

use nix::sys::signal::{self, Signal};
use nix::unistd::{getpgid, Pid};
use tokio::process::{Child, Command};

/// Spawns `command` in a freshly created process group, so that it is safe
/// to signal the whole group later without racing the parent process'
/// own group.
pub fn spawn_in_new_process_group(mut command: Command) -> std::io::Result<Child> {
    command.kill_on_drop(true);
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_pgid| ())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        });
    }
    command.spawn()
}

fn pgid_of(child: &Child) -> Result<Pid, String> {
    let pid = child.id().ok_or_else(|| "process has no pid".to_string())?;
    getpgid(Some(Pid::from_raw(pid as i32)))
        .map_err(|e| format!("could not get process group id of child: {e}"))
}

/// Sends `sig` to every process in `child`'s process group.
pub fn signal_process_group(child: &Child, sig: Signal) -> Result<(), String> {
    let pgid = pgid_of(child)?;
    signal::kill(Pid::from_raw(-pgid.as_raw()), sig)
        .map_err(|e| format!("failed to signal child process group: {e}"))
}

/// `nix::sys::signal::Signal` from a raw number, as delivered by the signal
/// broker. Unrecognized numbers fall back to `SIGTERM`.
pub fn signal_from_raw(raw: i32) -> Signal {
    Signal::try_from(raw).unwrap_or(Signal::SIGTERM)
}
